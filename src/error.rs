//! Error types for gateway calls and configuration

use thiserror::Error;

/// Failure of a single market gateway call.
///
/// Both kinds are recoverable: the controller logs them and carries on with the
/// next tick. No distinction is drawn between permanent and transient causes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Transport, authentication or data-source failure
    #[error("gateway unavailable: {0}")]
    Unavailable(String),

    /// Exchange-side rejection of an order or stop-loss request
    #[error("gateway rejected request: {0}")]
    Rejected(String),
}

impl GatewayError {
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Unavailable(_) => "unavailable",
            GatewayError::Rejected(_) => "rejected",
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Bot configuration that violates a construction-time invariant. Fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {field} {reason}")]
    InvalidConfiguration { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidConfiguration {
            field,
            reason: reason.into(),
        }
    }
}
