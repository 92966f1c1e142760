//! In-memory snapshot block service
//!
//! Holds volumes, snapshots and block payloads in process memory and
//! serves them through [`SnapshotBlockService`] with the same pagination
//! rules as the remote API. Every call is counted, which makes it the
//! stub of choice for verifying how many remote round trips a reader
//! makes.

use crate::error::{ServiceError, ServiceResult};
use crate::service::{
    BlockDescriptor, BlockToken, FetchedBlock, ListBlocksPage, ListBlocksRequest,
    SnapshotBlockService, SnapshotDescription, VolumeDescription, VolumePage,
};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use snapio_common::{BlockChecksum, SnapshotId, VolumeId};
use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// A stored block payload
#[derive(Debug, Clone)]
struct StoredBlock {
    token: BlockToken,
    data: Bytes,
    checksum: Option<BlockChecksum>,
}

/// A stored snapshot
#[derive(Debug, Clone)]
struct StoredSnapshot {
    description: SnapshotDescription,
    block_size: u64,
    /// Allocated blocks only; absent indices are unallocated
    blocks: BTreeMap<u64, StoredBlock>,
}

/// Per-operation call counters
#[derive(Debug, Default)]
struct CallCounters {
    list_blocks: AtomicU64,
    fetch_block: AtomicU64,
    describe_snapshot: AtomicU64,
    describe_volume: AtomicU64,
    list_volumes: AtomicU64,
    list_snapshots: AtomicU64,
}

/// Snapshot of the call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallStats {
    /// `list_blocks` calls
    pub list_blocks: u64,
    /// `fetch_block` calls
    pub fetch_block: u64,
    /// `describe_snapshot` calls
    pub describe_snapshot: u64,
    /// `describe_volume` calls
    pub describe_volume: u64,
    /// `list_volumes` calls
    pub list_volumes: u64,
    /// `list_snapshots` calls
    pub list_snapshots: u64,
}

/// In-memory [`SnapshotBlockService`]
pub struct MemoryBlockService {
    /// Volumes by ID, ordered for stable pagination
    volumes: RwLock<BTreeMap<VolumeId, VolumeDescription>>,
    /// Snapshots by ID
    snapshots: RwLock<HashMap<SnapshotId, StoredSnapshot>>,
    /// Token generation counter
    token_seq: AtomicU64,
    calls: CallCounters,
}

impl MemoryBlockService {
    /// Create an empty service
    pub fn new() -> Self {
        Self {
            volumes: RwLock::new(BTreeMap::new()),
            snapshots: RwLock::new(HashMap::new()),
            token_seq: AtomicU64::new(0),
            calls: CallCounters::default(),
        }
    }

    /// Add or replace a volume
    pub fn add_volume(&self, volume: VolumeDescription) {
        self.volumes.write().insert(volume.volume_id.clone(), volume);
    }

    /// Add an empty snapshot of an existing volume
    pub fn add_snapshot(
        &self,
        snapshot_id: SnapshotId,
        volume_id: &VolumeId,
        description: impl Into<String>,
        block_size: u64,
    ) -> ServiceResult<SnapshotDescription> {
        if block_size == 0 {
            return Err(ServiceError::invalid_request("block size must be positive"));
        }

        let volume_size = self
            .volumes
            .read()
            .get(volume_id)
            .map(|v| v.size)
            .ok_or_else(|| ServiceError::not_found(format!("volume {volume_id}")))?;

        let description = SnapshotDescription {
            snapshot_id: snapshot_id.clone(),
            volume_id: volume_id.clone(),
            description: description.into(),
            volume_size,
        };

        self.snapshots.write().insert(
            snapshot_id,
            StoredSnapshot {
                description: description.clone(),
                block_size,
                blocks: BTreeMap::new(),
            },
        );

        Ok(description)
    }

    /// Store a block payload with its SHA256 checksum
    ///
    /// The payload length is not checked against the snapshot's block
    /// size, so a short payload can be stored to model a truncated
    /// transfer.
    pub fn put_block(
        &self,
        snapshot_id: &SnapshotId,
        block_index: u64,
        data: impl Into<Bytes>,
    ) -> ServiceResult<BlockToken> {
        let data = data.into();
        let checksum = BlockChecksum::sha256(&data);
        self.put_block_with_checksum(snapshot_id, block_index, data, Some(checksum))
    }

    /// Store a block payload with an explicit (possibly wrong) checksum
    pub fn put_block_with_checksum(
        &self,
        snapshot_id: &SnapshotId,
        block_index: u64,
        data: impl Into<Bytes>,
        checksum: Option<BlockChecksum>,
    ) -> ServiceResult<BlockToken> {
        let mut snapshots = self.snapshots.write();
        let snapshot = snapshots
            .get_mut(snapshot_id)
            .ok_or_else(|| ServiceError::not_found(format!("snapshot {snapshot_id}")))?;

        let seq = self.token_seq.fetch_add(1, Ordering::Relaxed);
        let token = BlockToken::new(format!("{snapshot_id}/{block_index:016x}/{seq}"));

        snapshot.blocks.insert(
            block_index,
            StoredBlock {
                token: token.clone(),
                data: data.into(),
                checksum,
            },
        );

        Ok(token)
    }

    /// Current call counts
    pub fn stats(&self) -> CallStats {
        CallStats {
            list_blocks: self.calls.list_blocks.load(Ordering::Relaxed),
            fetch_block: self.calls.fetch_block.load(Ordering::Relaxed),
            describe_snapshot: self.calls.describe_snapshot.load(Ordering::Relaxed),
            describe_volume: self.calls.describe_volume.load(Ordering::Relaxed),
            list_volumes: self.calls.list_volumes.load(Ordering::Relaxed),
            list_snapshots: self.calls.list_snapshots.load(Ordering::Relaxed),
        }
    }

    /// Reset all call counts to zero
    pub fn reset_stats(&self) {
        for counter in [
            &self.calls.list_blocks,
            &self.calls.fetch_block,
            &self.calls.describe_snapshot,
            &self.calls.describe_volume,
            &self.calls.list_volumes,
            &self.calls.list_snapshots,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for MemoryBlockService {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_page_token(token: &str) -> ServiceResult<u64> {
    token
        .parse()
        .map_err(|_| ServiceError::invalid_request(format!("malformed page token {token:?}")))
}

#[async_trait]
impl SnapshotBlockService for MemoryBlockService {
    async fn list_blocks(&self, request: ListBlocksRequest) -> ServiceResult<ListBlocksPage> {
        self.calls.list_blocks.fetch_add(1, Ordering::Relaxed);

        if request.max_results == 0 {
            return Err(ServiceError::invalid_request("max_results must be positive"));
        }

        let start = match request.next_token.as_deref() {
            Some(token) => parse_page_token(token)?,
            None => request.starting_block_index,
        };

        let snapshots = self.snapshots.read();
        let snapshot = snapshots
            .get(&request.snapshot_id)
            .ok_or_else(|| ServiceError::not_found(format!("snapshot {}", request.snapshot_id)))?;

        let max_results = request.max_results as usize;
        let mut range = snapshot.blocks.range(start..);
        let blocks: Vec<BlockDescriptor> = range
            .by_ref()
            .take(max_results)
            .map(|(index, block)| BlockDescriptor {
                block_index: *index,
                block_token: block.token.clone(),
            })
            .collect();
        let next_token = range.next().map(|(index, _)| index.to_string());

        debug!(
            "list_blocks {} from {}: {} blocks, more={}",
            request.snapshot_id,
            start,
            blocks.len(),
            next_token.is_some()
        );

        Ok(ListBlocksPage {
            block_size: snapshot.block_size,
            volume_size: snapshot.description.volume_size,
            blocks,
            next_token,
        })
    }

    async fn fetch_block(
        &self,
        snapshot_id: &SnapshotId,
        block_index: u64,
        block_token: &BlockToken,
    ) -> ServiceResult<FetchedBlock> {
        self.calls.fetch_block.fetch_add(1, Ordering::Relaxed);

        let snapshots = self.snapshots.read();
        let snapshot = snapshots
            .get(snapshot_id)
            .ok_or_else(|| ServiceError::not_found(format!("snapshot {snapshot_id}")))?;
        let block = snapshot.blocks.get(&block_index).ok_or_else(|| {
            ServiceError::not_found(format!("block {block_index} of snapshot {snapshot_id}"))
        })?;

        if block.token != *block_token {
            return Err(ServiceError::invalid_request(format!(
                "block token does not match block {block_index} of snapshot {snapshot_id}"
            )));
        }

        Ok(FetchedBlock {
            data_length: block.data.len() as u64,
            checksum: block.checksum.clone(),
            data: Box::pin(Cursor::new(block.data.clone())),
        })
    }

    async fn describe_snapshot(
        &self,
        snapshot_id: &SnapshotId,
    ) -> ServiceResult<SnapshotDescription> {
        self.calls.describe_snapshot.fetch_add(1, Ordering::Relaxed);

        self.snapshots
            .read()
            .get(snapshot_id)
            .map(|s| s.description.clone())
            .ok_or_else(|| ServiceError::not_found(format!("snapshot {snapshot_id}")))
    }

    async fn describe_volume(&self, volume_id: &VolumeId) -> ServiceResult<VolumeDescription> {
        self.calls.describe_volume.fetch_add(1, Ordering::Relaxed);

        self.volumes
            .read()
            .get(volume_id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(format!("volume {volume_id}")))
    }

    async fn list_volumes(
        &self,
        max_results: u32,
        next_token: Option<String>,
    ) -> ServiceResult<VolumePage> {
        self.calls.list_volumes.fetch_add(1, Ordering::Relaxed);

        if max_results == 0 {
            return Err(ServiceError::invalid_request("max_results must be positive"));
        }

        let lower = match next_token {
            Some(token) => Bound::Included(VolumeId::new_unchecked(token)),
            None => Bound::Unbounded,
        };

        let volumes = self.volumes.read();
        let mut range = volumes.range((lower, Bound::Unbounded));

        let page: Vec<VolumeDescription> = range
            .by_ref()
            .take(max_results as usize)
            .map(|(_, v)| v.clone())
            .collect();
        let next_token = range.next().map(|(id, _)| id.to_string());

        Ok(VolumePage {
            volumes: page,
            next_token,
        })
    }

    async fn list_snapshots(
        &self,
        volume_id: &VolumeId,
    ) -> ServiceResult<Vec<SnapshotDescription>> {
        self.calls.list_snapshots.fetch_add(1, Ordering::Relaxed);

        let mut snapshots: Vec<SnapshotDescription> = self
            .snapshots
            .read()
            .values()
            .filter(|s| s.description.volume_id == *volume_id)
            .map(|s| s.description.clone())
            .collect();
        snapshots.sort_by(|a, b| a.snapshot_id.cmp(&b.snapshot_id));

        Ok(snapshots)
    }
}
