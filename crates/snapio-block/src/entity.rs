//! Entity handles
//!
//! A handle names a volume, or a snapshot of one, and answers metadata
//! queries about it. Handles naming a snapshot are also range readable.

use crate::cache::{BlockDescriptorCache, CacheStats};
use crate::error::{BlockError, BlockResult, PartialRead};
use crate::loader::BlockIndexLoader;
use crate::reader::RangeReader;

use async_trait::async_trait;
use snapio_client::SnapshotBlockService;
use snapio_common::{EntityId, ReaderConfig, SnapshotId, UnallocatedBlockPolicy};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Descriptive information about an entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityInfo {
    /// Entity id
    pub id: EntityId,
    /// Volume name tag, or snapshot description
    pub name: String,
    /// Size in bytes
    pub size_bytes: u64,
}

/// Storage entity that can be described and enumerated
#[async_trait]
pub trait Entity: Send + Sync {
    /// Entity id
    fn id(&self) -> &EntityId;

    /// Describe the entity
    async fn info(&self) -> BlockResult<EntityInfo>;

    /// Ids of the snapshots taken of the entity's volume
    async fn list_snapshots(&self) -> BlockResult<Vec<EntityId>>;

    /// Ids of sub-entities
    async fn components(&self) -> BlockResult<Vec<EntityId>> {
        Ok(Vec::new())
    }
}

/// Entity whose contents can be read as a run of fixed-size blocks
#[async_trait]
pub trait RangeReadable: Send + Sync {
    /// Size of one block in bytes
    async fn block_size(&self) -> BlockResult<u64>;

    /// Total size in bytes
    async fn capacity(&self) -> BlockResult<u64>;

    /// Read `num_blocks` blocks starting at `start_block` into `buffer`,
    /// giving up once `cancel` fires
    async fn read_cancellable(
        &self,
        start_block: u64,
        num_blocks: u64,
        buffer: &mut [u8],
        cancel: &CancellationToken,
    ) -> Result<u64, PartialRead>;

    /// Read `num_blocks` blocks starting at `start_block` into `buffer`
    async fn read(
        &self,
        start_block: u64,
        num_blocks: u64,
        buffer: &mut [u8],
    ) -> Result<u64, PartialRead> {
        self.read_cancellable(start_block, num_blocks, buffer, &CancellationToken::new())
            .await
    }

    /// Release cached state
    fn close(&self);
}

/// Handle on a volume or a snapshot
pub struct EntityHandle {
    id: EntityId,
    service: Arc<dyn SnapshotBlockService>,
    provisioning_unit_bytes: u64,
    unallocated: UnallocatedBlockPolicy,
    verify_checksums: bool,
    cache: BlockDescriptorCache,
    /// Present only when the id names a snapshot
    loader: Option<BlockIndexLoader>,
}

impl EntityHandle {
    /// Create a handle for `id`
    pub fn new(id: EntityId, service: Arc<dyn SnapshotBlockService>, config: &ReaderConfig) -> Self {
        let loader = id.snapshot_id().map(|snapshot_id| {
            BlockIndexLoader::new(
                Arc::clone(&service),
                snapshot_id.clone(),
                config.block_list_page_size,
            )
        });

        Self {
            id,
            service,
            provisioning_unit_bytes: config.provisioning_unit_bytes,
            unallocated: config.unallocated_blocks,
            verify_checksums: config.verify_checksums,
            cache: BlockDescriptorCache::new(),
            loader,
        }
    }

    /// Check if the handle names a snapshot
    pub const fn is_snapshot(&self) -> bool {
        self.loader.is_some()
    }

    /// Descriptor cache statistics
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn snapshot_loader(&self) -> BlockResult<&BlockIndexLoader> {
        self.loader
            .as_ref()
            .ok_or_else(|| BlockError::NotASnapshot(self.id.clone()))
    }

    fn size_in_bytes(&self, units: u64) -> BlockResult<u64> {
        units.checked_mul(self.provisioning_unit_bytes).ok_or_else(|| {
            BlockError::Overflow(format!(
                "size of {} ({units} units) exceeds u64 bytes",
                self.id
            ))
        })
    }

    async fn snapshot_info(&self, snapshot_id: &SnapshotId) -> BlockResult<EntityInfo> {
        let snapshot = self
            .service
            .describe_snapshot(snapshot_id)
            .await
            .map_err(|source| {
                BlockError::remote("describe_snapshot", format!("entity {}", self.id), None, source)
            })?;

        Ok(EntityInfo {
            id: self.id.clone(),
            size_bytes: self.size_in_bytes(snapshot.volume_size)?,
            name: snapshot.description,
        })
    }

    async fn volume_info(&self) -> BlockResult<EntityInfo> {
        let volume = self
            .service
            .describe_volume(self.id.volume_id())
            .await
            .map_err(|source| {
                BlockError::remote("describe_volume", format!("entity {}", self.id), None, source)
            })?;

        Ok(EntityInfo {
            id: self.id.clone(),
            size_bytes: self.size_in_bytes(volume.size)?,
            name: volume.name().unwrap_or_default().to_string(),
        })
    }
}

#[async_trait]
impl Entity for EntityHandle {
    fn id(&self) -> &EntityId {
        &self.id
    }

    async fn info(&self) -> BlockResult<EntityInfo> {
        match self.id.snapshot_id() {
            Some(snapshot_id) => self.snapshot_info(snapshot_id).await,
            None => self.volume_info().await,
        }
    }

    async fn list_snapshots(&self) -> BlockResult<Vec<EntityId>> {
        let snapshots = self
            .service
            .list_snapshots(self.id.volume_id())
            .await
            .map_err(|source| {
                BlockError::remote("list_snapshots", format!("entity {}", self.id), None, source)
            })?;

        let base = self.id.base();
        Ok(snapshots
            .into_iter()
            .map(|s| base.with_snapshot(s.snapshot_id))
            .collect())
    }
}

#[async_trait]
impl RangeReadable for EntityHandle {
    async fn block_size(&self) -> BlockResult<u64> {
        let loader = self.snapshot_loader()?;
        loader.ensure_block_size(&self.cache).await
    }

    async fn capacity(&self) -> BlockResult<u64> {
        Ok(self.info().await?.size_bytes)
    }

    async fn read_cancellable(
        &self,
        start_block: u64,
        num_blocks: u64,
        buffer: &mut [u8],
        cancel: &CancellationToken,
    ) -> Result<u64, PartialRead> {
        let loader = self.snapshot_loader()?;
        let reader = RangeReader {
            service: self.service.as_ref(),
            cache: &self.cache,
            loader,
            unallocated: self.unallocated,
            verify_checksums: self.verify_checksums,
        };
        reader.read(start_block, num_blocks, buffer, cancel).await
    }

    fn close(&self) {
        self.cache.clear();
        debug!("Closed handle {}", self.id);
    }
}
