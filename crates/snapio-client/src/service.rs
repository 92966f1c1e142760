//! Snapshot block service interface
//!
//! The block reader never talks to a concrete transport. It consumes this
//! trait, which mirrors the remote snapshot API: a paginated listing of
//! the blocks a snapshot has allocated, a fetch of one block by index and
//! token, and descriptions of volumes and snapshots.

use crate::error::ServiceResult;

use async_trait::async_trait;
use snapio_common::{BlockChecksum, SnapshotId, VolumeId};
use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use tokio::io::AsyncRead;

/// Volume tag holding the human-readable name
pub const NAME_TAG: &str = "Name";

/// Opaque handle required to fetch one block of a snapshot
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BlockToken(String);

impl BlockToken {
    /// Wrap a token returned by the service
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Get the token as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BlockToken {
    // Tokens are credentials for block data; keep them out of logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockToken(..)")
    }
}

/// One allocated block of a snapshot
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockDescriptor {
    /// Index of the block within the snapshot's block space
    pub block_index: u64,
    /// Token to pass to [`SnapshotBlockService::fetch_block`]
    pub block_token: BlockToken,
}

/// Request for one page of a snapshot's block index
#[derive(Clone, Debug)]
pub struct ListBlocksRequest {
    /// Snapshot to list
    pub snapshot_id: SnapshotId,
    /// First block index of interest
    pub starting_block_index: u64,
    /// Maximum descriptors to return
    pub max_results: u32,
    /// Continuation token from a previous page
    pub next_token: Option<String>,
}

impl ListBlocksRequest {
    /// Request the first page starting at `starting_block_index`
    #[must_use]
    pub fn new(snapshot_id: SnapshotId, starting_block_index: u64, max_results: u32) -> Self {
        Self {
            snapshot_id,
            starting_block_index,
            max_results,
            next_token: None,
        }
    }
}

/// One page of a snapshot's block index
#[derive(Clone, Debug)]
pub struct ListBlocksPage {
    /// Size of every block of the snapshot, in bytes
    pub block_size: u64,
    /// Volume size in provisioning units
    pub volume_size: u64,
    /// Allocated blocks in ascending index order
    pub blocks: Vec<BlockDescriptor>,
    /// Token for the next page, `None` on the last page
    pub next_token: Option<String>,
}

/// Byte stream of one block's payload
pub type BlockStream = Pin<Box<dyn AsyncRead + Send>>;

/// Result of fetching one block
pub struct FetchedBlock {
    /// Payload stream
    pub data: BlockStream,
    /// Payload length announced by the service
    pub data_length: u64,
    /// Checksum of the payload, if the service supplied one
    pub checksum: Option<BlockChecksum>,
}

impl fmt::Debug for FetchedBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchedBlock")
            .field("data_length", &self.data_length)
            .field("checksum", &self.checksum)
            .finish_non_exhaustive()
    }
}

/// Snapshot metadata
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotDescription {
    /// Snapshot id
    pub snapshot_id: SnapshotId,
    /// Source volume id
    pub volume_id: VolumeId,
    /// Free-form description
    pub description: String,
    /// Source volume size in provisioning units
    pub volume_size: u64,
}

/// Volume metadata
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VolumeDescription {
    /// Volume id
    pub volume_id: VolumeId,
    /// Size in provisioning units
    pub size: u64,
    /// User-defined tags
    pub tags: HashMap<String, String>,
}

impl VolumeDescription {
    /// Create a volume description without tags
    #[must_use]
    pub fn new(volume_id: VolumeId, size: u64) -> Self {
        Self {
            volume_id,
            size,
            tags: HashMap::new(),
        }
    }

    /// Set the name tag
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.tags.insert(NAME_TAG.to_string(), name.into());
        self
    }

    /// Value of the name tag
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.tags.get(NAME_TAG).map(String::as_str)
    }
}

/// One page of the volume listing
#[derive(Clone, Debug)]
pub struct VolumePage {
    /// Volumes on this page
    pub volumes: Vec<VolumeDescription>,
    /// Token for the next page, `None` on the last page
    pub next_token: Option<String>,
}

/// Remote snapshot block service
///
/// Implementations must be safe to share between handles and tasks; the
/// reader holds them as `Arc<dyn SnapshotBlockService>`.
#[async_trait]
pub trait SnapshotBlockService: Send + Sync {
    /// List one page of the blocks a snapshot has allocated
    async fn list_blocks(&self, request: ListBlocksRequest) -> ServiceResult<ListBlocksPage>;

    /// Fetch the payload of one block
    async fn fetch_block(
        &self,
        snapshot_id: &SnapshotId,
        block_index: u64,
        block_token: &BlockToken,
    ) -> ServiceResult<FetchedBlock>;

    /// Describe a snapshot
    async fn describe_snapshot(&self, snapshot_id: &SnapshotId)
    -> ServiceResult<SnapshotDescription>;

    /// Describe a volume
    async fn describe_volume(&self, volume_id: &VolumeId) -> ServiceResult<VolumeDescription>;

    /// List one page of volumes
    async fn list_volumes(
        &self,
        max_results: u32,
        next_token: Option<String>,
    ) -> ServiceResult<VolumePage>;

    /// List the snapshots taken of a volume
    async fn list_snapshots(&self, volume_id: &VolumeId)
    -> ServiceResult<Vec<SnapshotDescription>>;
}
