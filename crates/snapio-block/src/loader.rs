//! Block index loader
//!
//! Lists the block index of one snapshot page by page, starting at the
//! first index a read is missing, and merges each page into the handle's
//! descriptor cache.

use crate::cache::{BlockDescriptorCache, CacheLookup};
use crate::error::{BlockError, BlockResult};

use snapio_client::{BlockDescriptor, ListBlocksRequest, SnapshotBlockService};
use snapio_common::SnapshotId;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// One loaded page of a snapshot's block index
#[derive(Debug, Clone)]
pub struct BlockPage {
    /// Block index the listing was started from
    pub start_index: u64,
    /// Block size reported with the page
    pub block_size: u64,
    /// Volume size in provisioning units
    pub volume_size: u64,
    /// Allocated blocks in ascending index order
    pub blocks: Vec<BlockDescriptor>,
    /// Token for the page that follows, `None` on the last page
    pub next_token: Option<String>,
}

impl BlockPage {
    /// Check if more descriptors follow this page
    #[must_use]
    pub const fn has_more(&self) -> bool {
        self.next_token.is_some()
    }

    /// Inclusive index range this page proves complete
    ///
    /// The last page covers everything from its start; an intermediate
    /// page covers up to its last descriptor. Continuation pages keep the
    /// listing's start, since every page before them was consumed.
    #[must_use]
    pub fn coverage(&self) -> Option<(u64, u64)> {
        if !self.has_more() {
            return Some((self.start_index, u64::MAX));
        }
        let last = self.blocks.last()?.block_index;
        (last >= self.start_index).then_some((self.start_index, last))
    }
}

/// Reject descriptors that are out of order or before the listing start
fn check_descriptor_order(
    snapshot_id: &SnapshotId,
    start_index: u64,
    blocks: &[BlockDescriptor],
) -> BlockResult<()> {
    let mut floor = start_index;
    for descriptor in blocks {
        if descriptor.block_index < floor {
            return Err(BlockError::Protocol(format!(
                "snapshot {snapshot_id} listed block {} out of order (listing from {start_index}, expected at least {floor})",
                descriptor.block_index
            )));
        }
        floor = descriptor.block_index.saturating_add(1);
    }
    Ok(())
}

/// Paginated loader for one snapshot's block index
pub struct BlockIndexLoader {
    service: Arc<dyn SnapshotBlockService>,
    snapshot_id: SnapshotId,
    page_size: u32,
    /// Serializes page loads so concurrent misses issue one listing
    load_gate: Mutex<()>,
}

impl BlockIndexLoader {
    /// Create a loader for a snapshot
    pub fn new(
        service: Arc<dyn SnapshotBlockService>,
        snapshot_id: SnapshotId,
        page_size: u32,
    ) -> Self {
        Self {
            service,
            snapshot_id,
            page_size,
            load_gate: Mutex::new(()),
        }
    }

    /// Snapshot this loader lists
    pub const fn snapshot_id(&self) -> &SnapshotId {
        &self.snapshot_id
    }

    /// Fetch the first page starting at `start_index` without touching any cache
    pub async fn fetch_page(&self, start_index: u64) -> BlockResult<BlockPage> {
        self.fetch_page_after(start_index, None).await
    }

    /// Fetch the page of the listing from `start_index` that `next_token` points at
    async fn fetch_page_after(
        &self,
        start_index: u64,
        next_token: Option<String>,
    ) -> BlockResult<BlockPage> {
        let mut request =
            ListBlocksRequest::new(self.snapshot_id.clone(), start_index, self.page_size);
        request.next_token = next_token;

        let page = self.service.list_blocks(request).await.map_err(|source| {
            BlockError::remote(
                "list_blocks",
                format!("snapshot {}", self.snapshot_id),
                Some(start_index),
                source,
            )
        })?;

        if page.block_size == 0 {
            return Err(BlockError::Protocol(format!(
                "snapshot {} reported a zero block size",
                self.snapshot_id
            )));
        }
        check_descriptor_order(&self.snapshot_id, start_index, &page.blocks)?;

        debug!(
            "Loaded {} descriptors of snapshot {} from block {} (more={})",
            page.blocks.len(),
            self.snapshot_id,
            start_index,
            page.next_token.is_some()
        );

        Ok(BlockPage {
            start_index,
            block_size: page.block_size,
            volume_size: page.volume_size,
            blocks: page.blocks,
            next_token: page.next_token,
        })
    }

    /// Resolve `block_index`, listing from there if needed
    ///
    /// Pages are followed until one covers the index, so the result is
    /// `Unknown` only if the service misbehaves. Concurrent callers missing
    /// the same index wait for one load and then answer from the cache.
    pub async fn load_into(
        &self,
        cache: &BlockDescriptorCache,
        block_index: u64,
    ) -> BlockResult<CacheLookup> {
        let _gate = self.load_gate.lock().await;

        // Another caller may have loaded it while we waited
        let lookup = cache.lookup(block_index);
        if lookup != CacheLookup::Unknown {
            return Ok(lookup);
        }

        let mut next_token = None;
        loop {
            let page = self
                .fetch_page_after(block_index, next_token.clone())
                .await?;
            cache.record_page(&page);

            let lookup = cache.lookup(block_index);
            if lookup != CacheLookup::Unknown {
                return Ok(lookup);
            }

            match page.next_token {
                Some(token) if Some(&token) == next_token.as_ref() => {
                    return Err(BlockError::Protocol(format!(
                        "block listing of snapshot {} repeated page token {token}",
                        self.snapshot_id
                    )));
                }
                Some(token) => {
                    debug!(
                        "Page from block {} of snapshot {} did not cover it, following token",
                        block_index, self.snapshot_id
                    );
                    next_token = Some(token);
                }
                None => return Ok(lookup),
            }
        }
    }

    /// Block size of the snapshot, loading the page at index 0 if unknown
    pub async fn ensure_block_size(&self, cache: &BlockDescriptorCache) -> BlockResult<u64> {
        if let Some(size) = cache.block_size() {
            return Ok(size);
        }

        let _gate = self.load_gate.lock().await;
        if let Some(size) = cache.block_size() {
            return Ok(size);
        }

        let page = self.fetch_page(0).await?;
        cache.record_page(&page);
        Ok(cache.block_size().unwrap_or(page.block_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapio_client::{MemoryBlockService, ServiceError, VolumeDescription};
    use snapio_common::VolumeId;

    fn setup(blocks: u64) -> (Arc<MemoryBlockService>, SnapshotId) {
        let service = Arc::new(MemoryBlockService::new());
        let volume_id = VolumeId::new("vol-1").unwrap();
        let snapshot_id = SnapshotId::new("snap-1").unwrap();
        service.add_volume(VolumeDescription::new(volume_id.clone(), 1));
        service
            .add_snapshot(snapshot_id.clone(), &volume_id, "test", 4096)
            .unwrap();
        for index in 0..blocks {
            service
                .put_block(&snapshot_id, index, vec![0u8; 4096])
                .unwrap();
        }
        (service, snapshot_id)
    }

    #[tokio::test]
    async fn test_fetch_page() {
        let (service, snapshot_id) = setup(250);
        let loader = BlockIndexLoader::new(service.clone(), snapshot_id, 100);

        let page = loader.fetch_page(0).await.unwrap();
        assert_eq!(page.blocks.len(), 100);
        assert!(page.has_more());
        assert_eq!(page.coverage(), Some((0, 99)));

        let tail = loader.fetch_page(200).await.unwrap();
        assert_eq!(tail.blocks.len(), 50);
        assert!(!tail.has_more());
        assert_eq!(tail.coverage(), Some((200, u64::MAX)));
        assert_eq!(service.stats().list_blocks, 2);
    }

    fn descriptors(indices: &[u64]) -> Vec<BlockDescriptor> {
        indices
            .iter()
            .map(|i| BlockDescriptor {
                block_index: *i,
                block_token: snapio_client::BlockToken::new(format!("tok-{i}")),
            })
            .collect()
    }

    #[test]
    fn test_descriptor_order() {
        let snapshot_id = SnapshotId::new("snap-1").unwrap();

        check_descriptor_order(&snapshot_id, 10, &descriptors(&[10, 11, 40])).unwrap();
        check_descriptor_order(&snapshot_id, 10, &[]).unwrap();

        // Before the listing start
        let err = check_descriptor_order(&snapshot_id, 10, &descriptors(&[9, 12])).unwrap_err();
        assert!(matches!(err, BlockError::Protocol(_)));

        // Descending
        let err = check_descriptor_order(&snapshot_id, 0, &descriptors(&[5, 3])).unwrap_err();
        assert!(matches!(err, BlockError::Protocol(_)));

        // Duplicate
        let err = check_descriptor_order(&snapshot_id, 0, &descriptors(&[2, 2])).unwrap_err();
        assert!(matches!(err, BlockError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_fetch_page_unknown_snapshot() {
        let (service, _) = setup(0);
        let loader = BlockIndexLoader::new(service, SnapshotId::new("snap-x").unwrap(), 100);

        let err = loader.fetch_page(7).await.unwrap_err();
        match err {
            BlockError::RemoteQuery {
                operation,
                block_index,
                source,
                ..
            } => {
                assert_eq!(operation, "list_blocks");
                assert_eq!(block_index, Some(7));
                assert!(matches!(source, ServiceError::NotFound(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_load_into_skips_resolved() {
        let (service, snapshot_id) = setup(10);
        let loader = BlockIndexLoader::new(service.clone(), snapshot_id, 100);
        let cache = BlockDescriptorCache::new();

        let lookup = loader.load_into(&cache, 3).await.unwrap();
        assert!(matches!(lookup, CacheLookup::Allocated(_)));
        assert_eq!(cache.len(), 7);

        // Index 20 lies in the tail covered by the last page
        let lookup = loader.load_into(&cache, 20).await.unwrap();
        assert_eq!(lookup, CacheLookup::Unallocated);
        assert_eq!(service.stats().list_blocks, 1);
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_page() {
        let (service, snapshot_id) = setup(10);
        let loader = BlockIndexLoader::new(service.clone(), snapshot_id, 100);
        let cache = BlockDescriptorCache::new();

        let (a, b) = tokio::join!(loader.load_into(&cache, 0), loader.load_into(&cache, 0));
        assert!(matches!(a.unwrap(), CacheLookup::Allocated(_)));
        assert!(matches!(b.unwrap(), CacheLookup::Allocated(_)));
        assert_eq!(service.stats().list_blocks, 1);
    }

    #[tokio::test]
    async fn test_ensure_block_size() {
        let (service, snapshot_id) = setup(3);
        let loader = BlockIndexLoader::new(service.clone(), snapshot_id, 100);
        let cache = BlockDescriptorCache::new();

        assert_eq!(loader.ensure_block_size(&cache).await.unwrap(), 4096);
        assert_eq!(loader.ensure_block_size(&cache).await.unwrap(), 4096);
        assert_eq!(service.stats().list_blocks, 1);
    }
}
