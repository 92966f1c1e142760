//! Error types shared by the snapio crates
//!
//! Covers identifier parsing and configuration problems. Remote service
//! and block read failures have their own error types in the client and
//! block crates.

use crate::types::EntityIdError;
use thiserror::Error;

/// Common result type for snapio operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for snapio
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid entity id: {0}")]
    InvalidEntityId(#[from] EntityIdError),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("failed to read configuration: {0}")]
    ConfigIo(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Check if this error was caused by bad configuration input
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::ConfigParse(_) | Self::ConfigIo(_)
        )
    }
}
