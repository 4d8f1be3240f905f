use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BenchError {
    /// Invalid ratios, empty function families, inconsistent batching settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("operation failed: {0}")]
    Operation(String),

    /// An operation that exceeded its write or read budget.
    #[error("operation timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

impl BenchError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Timeouts count as operation failures.
    pub fn is_operation_failure(&self) -> bool {
        matches!(self, Self::Operation(_) | Self::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, BenchError>;
