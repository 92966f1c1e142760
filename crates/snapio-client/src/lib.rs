//! snapio Client - Remote snapshot block service
//!
//! This crate defines the interface the block reader consumes from the
//! remote snapshot block service (block listing, single block fetch and
//! volume/snapshot descriptions), plus an in-memory implementation.

pub mod error;
pub mod memory;
pub mod service;

// Re-exports
pub use error::{ServiceError, ServiceResult};
pub use memory::{CallStats, MemoryBlockService};
pub use service::{
    BlockDescriptor, BlockStream, BlockToken, FetchedBlock, ListBlocksPage, ListBlocksRequest,
    SnapshotBlockService, SnapshotDescription, VolumeDescription, VolumePage,
};
