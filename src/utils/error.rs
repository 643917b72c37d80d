use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Normalised shape of every failed HTTP interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiErrorKind {
    Http,
    Network,
    Timeout,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
    pub status: Option<u16>,
}

impl ApiError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Http,
            message: message.into(),
            status: Some(status),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Network,
            message: message.into(),
            status: None,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Timeout,
            message: message.into(),
            status: None,
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Unknown,
            message: message.into(),
            status: None,
        }
    }

    /// Builds an `Http` error from a non-success response body.
    ///
    /// Accepts the backend's error envelope (`{statusCode, message, error}`,
    /// where `message` may be a list of validation messages) and falls back to
    /// the raw body, then to the canonical reason phrase.
    pub fn from_response_body(status: u16, body: &str) -> Self {
        let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
        let message = parsed
            .as_ref()
            .and_then(|v| v.get("message"))
            .and_then(|m| match m {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Array(items) => {
                    let parts: Vec<&str> = items.iter().filter_map(|i| i.as_str()).collect();
                    if parts.is_empty() {
                        None
                    } else {
                        Some(parts.join("; "))
                    }
                }
                _ => None,
            })
            .or_else(|| {
                parsed
                    .as_ref()
                    .and_then(|v| v.get("error"))
                    .and_then(|e| e.as_str())
                    .map(str::to_string)
            })
            .or_else(|| {
                let trimmed = body.trim();
                (!trimmed.is_empty() && parsed.is_none()).then(|| trimmed.to_string())
            })
            .unwrap_or_else(|| {
                reqwest::StatusCode::from_u16(status)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("Request failed")
                    .to_string()
            });

        Self::http(status, message)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == Some(401)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout(err.to_string())
        } else if let Some(status) = err.status() {
            Self::http(status.as_u16(), err.to_string())
        } else if err.is_connect() || err.is_request() {
            Self::network(err.to_string())
        } else {
            Self::unknown(err.to_string())
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{:?} error ({}): {}", self.kind, status, self.message),
            None => write!(f, "{:?} error: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for ApiError {}

#[derive(Error, Debug)]
pub enum ErpError {
    #[error("API request failed: {0}")]
    Api(#[from] ApiError),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration field '{field}' is invalid: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Role {role} is not allowed to {action}")]
    Forbidden { role: String, action: String },

    #[error("Cannot {action} a record in status {status}")]
    InvalidTransition { action: String, status: String },

    #[error("{entity} '{id}' not found")]
    NotFound { entity: String, id: String },

    #[error("Storage error: {message}")]
    StorageError { message: String },
}

impl From<reqwest::Error> for ErpError {
    fn from(err: reqwest::Error) -> Self {
        ErpError::Api(ApiError::from(err))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Configuration,
    Validation,
    Authorization,
    Storage,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErpError {
    pub fn validation(message: impl Into<String>) -> Self {
        ErpError::ValidationError {
            message: message.into(),
        }
    }

    pub fn not_found(entity: &str, id: &str) -> Self {
        ErpError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ErpError::Api(api) if matches!(api.status, Some(401) | Some(403)) => {
                ErrorCategory::Authorization
            }
            ErpError::Api(_) => ErrorCategory::Network,
            ErpError::ConfigError { .. }
            | ErpError::ConfigValidationError { .. }
            | ErpError::InvalidConfigValueError { .. }
            | ErpError::MissingConfigError { .. } => ErrorCategory::Configuration,
            ErpError::ValidationError { .. } | ErpError::InvalidTransition { .. } => {
                ErrorCategory::Validation
            }
            ErpError::Forbidden { .. } => ErrorCategory::Authorization,
            ErpError::IoError(_) | ErpError::StorageError { .. } => ErrorCategory::Storage,
            ErpError::CsvError(_) | ErpError::SerializationError(_) | ErpError::NotFound { .. } => {
                ErrorCategory::Data
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Validation | ErrorCategory::Authorization | ErrorCategory::Data => {
                ErrorSeverity::High
            }
            ErrorCategory::Configuration | ErrorCategory::Storage => ErrorSeverity::Critical,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            ErpError::Api(api) => match api.kind {
                ApiErrorKind::Network => "Cannot reach the server. Check your connection.".into(),
                ApiErrorKind::Timeout => "The server took too long to respond.".into(),
                ApiErrorKind::Http if api.is_unauthorized() => {
                    "Your session has expired. Please sign in again.".into()
                }
                ApiErrorKind::Http if api.status == Some(403) => {
                    "You do not have access to this resource.".into()
                }
                _ => api.message.clone(),
            },
            ErpError::Forbidden { action, .. } => {
                format!("You are not allowed to {}.", action)
            }
            other => other.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Network => "Retry once connectivity is restored; queued items are kept",
            ErrorCategory::Configuration => "Check the configuration file and environment variables",
            ErrorCategory::Validation => "Correct the input and submit again",
            ErrorCategory::Authorization => "Sign in again or ask an administrator for access",
            ErrorCategory::Storage => "Check that the data directory exists and is writable",
            ErrorCategory::Data => "Check the referenced record or input file",
        }
    }
}

pub type Result<T> = std::result::Result<T, ErpError>;

pub type ApiResult<T> = std::result::Result<T, ApiError>;
