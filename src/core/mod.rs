pub mod api;
pub mod backoff;
pub mod connectivity;
pub mod context;
pub mod csv_io;
pub mod deep_link;
pub mod http_client;
pub mod incident_queue;
pub mod memory;
pub mod outbox;
pub mod receipt_queue;
pub mod simulation;
pub mod storage;
pub mod worker;

pub use crate::domain::ports::{
    Checkpoint, Connectivity, KeyValueStore, QueueJob, RequisitionRepository,
};
pub use crate::utils::error::Result;
