//! Error Taxonomy
//!
//! Every failure a queued mutation can produce is one of three kinds:
//! - `Domain`: invalid request or transition, shown verbatim to the sender
//! - `Oracle`: an external service failed, shown with a user-facing summary
//! - `Internal`: anything else, logged and shown as an unknown error

use thiserror::Error;

use crate::oracle::OracleError;

/// Fallback text for oracle failures with no specific message.
pub const GENERIC_ORACLE_MESSAGE: &str = "external service failed";

/// Errors raised while processing a mutation.
#[derive(Debug, Error)]
pub enum AppError {
    /// User-facing validation or state error.
    #[error("{0}")]
    Domain(String),

    /// External oracle or service failure.
    #[error("{message}: {source}")]
    Oracle {
        /// Message delivered to the client.
        message: String,
        /// Underlying failure, logged only.
        source: OracleError,
    },

    /// Unexpected failure. Never shown in detail.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Domain error with a message.
    pub fn domain(message: impl Into<String>) -> Self {
        Self::Domain(message.into())
    }

    /// Oracle failure presented to the user as `message`.
    pub fn oracle(message: impl Into<String>, source: OracleError) -> Self {
        Self::Oracle {
            message: message.into(),
            source,
        }
    }

    /// Text a client may see; `None` means "unknown error".
    pub fn user_message(&self) -> Option<String> {
        match self {
            Self::Domain(message) => Some(message.clone()),
            Self::Oracle { message, .. } => Some(message.clone()),
            Self::Internal(_) => None,
        }
    }
}

impl From<OracleError> for AppError {
    fn from(source: OracleError) -> Self {
        let message = match &source {
            OracleError::Api(info) => info.clone(),
            _ => GENERIC_ORACLE_MESSAGE.to_string(),
        };
        Self::Oracle { message, source }
    }
}
