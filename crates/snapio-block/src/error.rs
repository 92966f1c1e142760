//! Block reader error types

use snapio_client::ServiceError;
use snapio_common::{EntityId, SnapshotId};
use thiserror::Error;

/// Block reader error
#[derive(Error, Debug)]
pub enum BlockError {
    /// Block operation on an entity without a snapshot component
    #[error("Entity {0} is not a snapshot")]
    NotASnapshot(EntityId),

    /// Remote listing, fetch or describe call failed
    #[error("Remote {operation} failed for {target}: {source}")]
    RemoteQuery {
        operation: &'static str,
        target: String,
        block_index: Option<u64>,
        #[source]
        source: ServiceError,
    },

    /// Block index absent from the snapshot's block index
    #[error("Block {block_index} not found in snapshot {snapshot_id}")]
    BlockNotFound {
        snapshot_id: SnapshotId,
        block_index: u64,
    },

    /// Fewer bytes returned for a block than the block size
    #[error(
        "Short read of block {block_index} in snapshot {snapshot_id}: expected {expected} bytes, got {actual}"
    )]
    ShortBlockRead {
        snapshot_id: SnapshotId,
        block_index: u64,
        expected: u64,
        actual: u64,
    },

    /// Block payload does not match its checksum
    #[error("Checksum mismatch for block {block_index} in snapshot {snapshot_id}")]
    ChecksumMismatch {
        snapshot_id: SnapshotId,
        block_index: u64,
    },

    /// Read stopped by its cancellation token
    #[error("Read of snapshot {snapshot_id} cancelled")]
    Cancelled { snapshot_id: SnapshotId },

    /// Caller buffer cannot hold the requested range
    #[error("Buffer of {actual} bytes cannot hold {required} bytes")]
    BufferTooSmall { required: u64, actual: u64 },

    /// Entity id of a storage type this manager does not handle
    #[error("Entity type {actual} is not handled by this manager (expected {expected})")]
    WrongEntityType { expected: String, actual: String },

    /// Remote service answered with something unusable
    #[error("Invalid response from snapshot service: {0}")]
    Protocol(String),

    /// Offset or size arithmetic overflowed
    #[error("Arithmetic overflow: {0}")]
    Overflow(String),

    /// Identifier or configuration error
    #[error(transparent)]
    Common(#[from] snapio_common::Error),
}

impl BlockError {
    /// Wrap a remote service error with the call it came from
    pub fn remote(
        operation: &'static str,
        target: impl Into<String>,
        block_index: Option<u64>,
        source: ServiceError,
    ) -> Self {
        Self::RemoteQuery {
            operation,
            target: target.into(),
            block_index,
            source,
        }
    }

    /// Check if re-issuing the failed operation may succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::RemoteQuery { source, .. } => source.is_retryable(),
            Self::ChecksumMismatch { .. } => true,
            _ => false,
        }
    }

    /// Check if the error means the block is not part of the snapshot
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        match self {
            Self::BlockNotFound { .. } => true,
            Self::RemoteQuery { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Block index the error refers to, if any
    #[must_use]
    pub const fn block_index(&self) -> Option<u64> {
        match self {
            Self::RemoteQuery { block_index, .. } => *block_index,
            Self::BlockNotFound { block_index, .. }
            | Self::ShortBlockRead { block_index, .. }
            | Self::ChecksumMismatch { block_index, .. } => Some(*block_index),
            _ => None,
        }
    }
}

/// Result type for block operations
pub type BlockResult<T> = Result<T, BlockError>;

/// Failed range read
///
/// Blocks before the failing one were written to the buffer in full and
/// are counted in `bytes_written`; a caller can resume by reading the
/// unread suffix of the range.
#[derive(Error, Debug)]
#[error("Range read stopped after {bytes_written} bytes: {error}")]
pub struct PartialRead {
    /// Bytes of complete blocks written before the failure
    pub bytes_written: u64,
    /// Cause of the failure
    #[source]
    pub error: BlockError,
}

impl From<BlockError> for PartialRead {
    fn from(error: BlockError) -> Self {
        Self {
            bytes_written: 0,
            error,
        }
    }
}
