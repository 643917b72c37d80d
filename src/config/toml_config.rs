use crate::core::backoff::BackoffPolicy;
use crate::domain::model::Platform;
use crate::domain::policy::Role;
use crate::domain::requisition::WorkflowPolicy;
use crate::utils::error::{ErpError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub outbox: OutboxConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: u64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: default_jitter_ms(),
            tick_seconds: default_tick_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub device_id: Option<String>,
    #[serde(default = "default_platform")]
    pub platform: String,
    #[serde(default = "default_app_version")]
    pub app_version: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_id: None,
            platform: default_platform(),
            app_version: default_app_version(),
        }
    }
}

/// Role lists as written in the file; empty means "use the built-in policy".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub approval_stages: Vec<String>,
    #[serde(default)]
    pub approve_roles: Vec<String>,
    #[serde(default)]
    pub reject_roles: Vec<String>,
    #[serde(default)]
    pub cancel_roles: Vec<String>,
}

fn default_base_url() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_data_dir() -> String {
    "./.mining-erp".to_string()
}

fn default_base_delay_ms() -> u64 {
    5_000
}

fn default_max_delay_ms() -> u64 {
    600_000
}

fn default_jitter_ms() -> u64 {
    2_000
}

fn default_tick_seconds() -> u64 {
    15
}

/// Longest retry delay the outbox accepts: one week.
pub const MAX_RETRY_DELAY_MS: u64 = 7 * 24 * 60 * 60 * 1000;

fn default_platform() -> String {
    "android".to_string()
}

fn default_app_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn parse_roles(field: &str, values: &[String]) -> Result<Vec<Role>> {
    values
        .iter()
        .map(|v| {
            v.parse::<Role>()
                .map_err(|_| ErpError::InvalidConfigValueError {
                    field: field.to_string(),
                    value: v.clone(),
                    reason: format!(
                        "Unknown role. Valid roles: {}",
                        Role::ALL.map(|r| r.as_str()).join(", ")
                    ),
                })
        })
        .collect()
}

impl AppConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(ErpError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| ErpError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the environment value. Unset variables are left as written.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| ErpError::ConfigError {
            message: format!("env substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_seconds)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.outbox.tick_seconds)
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            base_delay_ms: self.outbox.base_delay_ms,
            max_delay_ms: self.outbox.max_delay_ms,
            jitter_ms: self.outbox.jitter_ms,
        }
    }

    pub fn platform(&self) -> Result<Platform> {
        self.device.platform.parse()
    }

    /// Built-in workflow with any lists from `[workflow]` replacing their default.
    pub fn workflow_policy(&self) -> Result<WorkflowPolicy> {
        let mut policy = WorkflowPolicy::default();
        let w = &self.workflow;

        if !w.approval_stages.is_empty() {
            policy.approval_stages = parse_roles("workflow.approval_stages", &w.approval_stages)?;
        }
        if !w.approve_roles.is_empty() {
            policy.approve_roles = parse_roles("workflow.approve_roles", &w.approve_roles)?;
        }
        if !w.reject_roles.is_empty() {
            policy.reject_roles = parse_roles("workflow.reject_roles", &w.reject_roles)?;
        }
        if !w.cancel_roles.is_empty() {
            policy.cancel_roles = parse_roles("workflow.cancel_roles", &w.cancel_roles)?;
        }
        Ok(policy)
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_url("api.base_url", &self.api.base_url)?;
        validation::validate_range("api.timeout_seconds", self.api.timeout_seconds, 1, 300)?;
        validation::validate_path("storage.data_dir", &self.storage.data_dir)?;

        validation::validate_positive_number("outbox.base_delay_ms", self.outbox.base_delay_ms, 1)?;
        validation::validate_positive_number("outbox.tick_seconds", self.outbox.tick_seconds, 1)?;
        if self.outbox.max_delay_ms < self.outbox.base_delay_ms {
            return Err(ErpError::InvalidConfigValueError {
                field: "outbox.max_delay_ms".to_string(),
                value: self.outbox.max_delay_ms.to_string(),
                reason: "Must not be lower than outbox.base_delay_ms".to_string(),
            });
        }
        validation::validate_range(
            "outbox.max_delay_ms",
            self.outbox.max_delay_ms,
            1,
            MAX_RETRY_DELAY_MS,
        )?;
        validation::validate_range("outbox.jitter_ms", self.outbox.jitter_ms, 0, MAX_RETRY_DELAY_MS)?;

        self.platform().map_err(|_| ErpError::InvalidConfigValueError {
            field: "device.platform".to_string(),
            value: self.device.platform.clone(),
            reason: "Valid platforms: ios, android".to_string(),
        })?;

        self.workflow_policy()?;
        Ok(())
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
