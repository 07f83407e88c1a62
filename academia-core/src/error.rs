//! Unified error handling for the session layer
//!
//! Login and registration failures are surfaced to callers; every other
//! variant is either mapped onto those two or swallowed at the resolver
//! boundary after being logged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};

pub type AuthResult<T> = Result<T, AuthError>;

/// Where and when a storage or configuration failure happened
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Correlates the log line with the error the caller sees
    pub error_id: String,
    pub timestamp: DateTime<Utc>,
    /// `fallback_store`, `config`, ...
    pub component: String,
    pub operation: Option<String>,
    /// Hints shown next to the error, most useful first
    pub recovery_suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: None,
            recovery_suggestions: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.recovery_suggestions.push(suggestion.to_string());
        self
    }
}

/// Main error type for session and identity resolution
#[derive(Error, Debug)]
pub enum AuthError {
    /// Neither the remote service nor the fallback credential table accepted the pair
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The remote service refused a sign-up; the message is shown to the user as-is
    #[error("{message}")]
    RegistrationFailed { message: String },

    /// A role strategy failed or produced malformed data
    #[error("Role resolution incomplete in {strategy}: {message}")]
    ResolutionIncomplete { strategy: String, message: String },

    /// The remote service answered and refused the request
    #[error("Request rejected: {message}")]
    Rejected { message: String },

    /// The remote service could not be reached or failed internally
    #[error("Service unavailable: {message}")]
    ServiceUnavailable {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AuthError {
    pub fn rejected<S: Into<String>>(message: S) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::ServiceUnavailable {
            message: message.into(),
            source: None,
        }
    }

    pub fn unavailable_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::ServiceUnavailable {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn incomplete<S: Into<String>, M: Into<String>>(strategy: S, message: M) -> Self {
        Self::ResolutionIncomplete {
            strategy: strategy.into(),
            message: message.into(),
        }
    }

    pub fn storage<S: Into<String>>(message: S, operation: &str) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
            context: ErrorContext::new("fallback_store")
                .with_operation(operation)
                .with_suggestion("Check that the fallback storage directory is writable"),
        }
    }

    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            AuthError::Storage { context, .. } => Some(context),
            AuthError::Config { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Transport-level failures; a later attempt may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AuthError::ServiceUnavailable { .. })
    }

    /// Log at a level matching how unusual the failure is
    pub fn log(&self) {
        match self {
            AuthError::InvalidCredentials | AuthError::Rejected { .. } => {
                debug!(error = %self, "Request refused");
            }
            AuthError::ResolutionIncomplete { strategy, .. } => {
                debug!(strategy = %strategy, error = %self, "Strategy produced no usable data");
            }
            AuthError::ServiceUnavailable { .. } => {
                warn!(error = %self, "Remote service unavailable (may be recoverable)");
            }
            _ => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Unexpected session layer failure"
                );
            }
        }
    }
}

#[macro_export]
macro_rules! config_error {
    ($msg:expr, $operation:expr) => {
        $crate::AuthError::Config {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new("config")
                .with_operation($operation)
                .with_suggestion("Check your configuration file"),
        }
    };
    ($msg:expr, $operation:expr, $source:expr) => {
        $crate::AuthError::Config {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
            context: $crate::ErrorContext::new("config")
                .with_operation($operation)
                .with_suggestion("Check your configuration file"),
        }
    };
}
