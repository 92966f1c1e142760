//! snapio Common - Shared types and configuration
//!
//! This crate provides the entity identifiers, reader configuration,
//! block checksums and common error type used by the snapshot block
//! reader crates.

pub mod checksum;
pub mod config;
pub mod error;
pub mod types;

pub use checksum::BlockChecksum;
pub use config::{ReaderConfig, UnallocatedBlockPolicy};
pub use error::{Error, Result};
pub use types::*;
