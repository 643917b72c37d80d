pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use crate::config::CliConfig;

pub use crate::config::toml_config::AppConfig;
pub use crate::core::context::AppContext;
pub use crate::core::outbox::{FlushReport, OfflineQueue};
pub use crate::domain::requisition::{RequisitionService, WorkflowPolicy};
pub use crate::utils::error::{ApiError, ErpError, Result};
