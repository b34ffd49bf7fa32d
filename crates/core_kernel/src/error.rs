//! Kernel error type

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Settings that are individually valid but cannot work together
    #[error("inconsistent configuration: {0}")]
    Configuration(String),
}

impl CoreError {
    pub fn configuration(message: impl Into<String>) -> Self {
        CoreError::Configuration(message.into())
    }
}
