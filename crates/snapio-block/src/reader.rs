//! Range reader
//!
//! Copies a contiguous run of blocks into a caller buffer, block by block
//! in ascending order. The read stops at the first block it cannot deliver
//! in full; every block before it is complete in the buffer and counted.

use crate::cache::{BlockDescriptorCache, CacheLookup};
use crate::error::{BlockError, BlockResult, PartialRead};
use crate::loader::BlockIndexLoader;

use snapio_client::{BlockToken, FetchedBlock, ServiceError, SnapshotBlockService};
use snapio_common::{SnapshotId, UnallocatedBlockPolicy};
use std::future::Future;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Per-read view over a snapshot handle's service, cache and loader
pub struct RangeReader<'a> {
    pub(crate) service: &'a dyn SnapshotBlockService,
    pub(crate) cache: &'a BlockDescriptorCache,
    pub(crate) loader: &'a BlockIndexLoader,
    pub(crate) unallocated: UnallocatedBlockPolicy,
    pub(crate) verify_checksums: bool,
}

impl RangeReader<'_> {
    fn snapshot_id(&self) -> &SnapshotId {
        self.loader.snapshot_id()
    }

    /// Read `num_blocks` blocks starting at `start_block` into `buffer`
    ///
    /// Returns the bytes written, always `num_blocks * block_size` on
    /// success. On failure the error carries the bytes of the complete
    /// blocks written before the failing one.
    pub async fn read(
        &self,
        start_block: u64,
        num_blocks: u64,
        buffer: &mut [u8],
        cancel: &CancellationToken,
    ) -> Result<u64, PartialRead> {
        let mut bytes_written = 0;
        match self
            .read_blocks(start_block, num_blocks, buffer, cancel, &mut bytes_written)
            .await
        {
            Ok(()) => Ok(bytes_written),
            Err(error) => {
                debug!(
                    "Read of snapshot {} blocks {}+{} stopped after {} bytes: {}",
                    self.snapshot_id(),
                    start_block,
                    num_blocks,
                    bytes_written,
                    error
                );
                Err(PartialRead {
                    bytes_written,
                    error,
                })
            }
        }
    }

    async fn read_blocks(
        &self,
        start_block: u64,
        num_blocks: u64,
        buffer: &mut [u8],
        cancel: &CancellationToken,
        bytes_written: &mut u64,
    ) -> BlockResult<()> {
        if num_blocks == 0 {
            return Ok(());
        }

        let end_block = start_block.checked_add(num_blocks).ok_or_else(|| {
            BlockError::Overflow(format!(
                "block range {start_block}+{num_blocks} exceeds the block index space"
            ))
        })?;

        self.ensure_not_cancelled(cancel)?;

        // Resolving the first block loads a page, which also yields the block size
        let mut first = Some(self.resolve(start_block, cancel).await?);
        let block_size = match self.cache.block_size() {
            Some(size) => size,
            None => {
                self.cancellable(cancel, self.loader.ensure_block_size(self.cache))
                    .await?
            }
        };

        let required = num_blocks.checked_mul(block_size).ok_or_else(|| {
            BlockError::Overflow(format!(
                "{num_blocks} blocks of {block_size} bytes exceed the addressable size"
            ))
        })?;
        let required_len = usize::try_from(required).map_err(|_| {
            BlockError::Overflow(format!("{required} bytes exceed the addressable size"))
        })?;
        if buffer.len() < required_len {
            return Err(BlockError::BufferTooSmall {
                required,
                actual: buffer.len() as u64,
            });
        }

        let block_len = usize::try_from(block_size).map_err(|_| {
            BlockError::Overflow(format!("block size {block_size} exceeds the addressable size"))
        })?;

        debug!(
            "Reading snapshot {} blocks {}..{} ({} bytes)",
            self.snapshot_id(),
            start_block,
            end_block,
            required
        );

        for (block_index, slot) in (start_block..end_block).zip(buffer.chunks_exact_mut(block_len))
        {
            self.ensure_not_cancelled(cancel)?;

            let lookup = match first.take() {
                Some(lookup) => lookup,
                None => self.resolve(block_index, cancel).await?,
            };

            match lookup {
                CacheLookup::Allocated(token) => {
                    self.read_block(block_index, &token, slot, cancel).await?;
                }
                // Only a covering page proves the block absent
                CacheLookup::Unallocated
                    if self.unallocated == UnallocatedBlockPolicy::ZeroFill =>
                {
                    warn!(
                        "Block {} of snapshot {} unallocated, zero-filling",
                        block_index,
                        self.snapshot_id()
                    );
                    slot.fill(0);
                }
                CacheLookup::Unallocated | CacheLookup::Unknown => {
                    return Err(BlockError::BlockNotFound {
                        snapshot_id: self.snapshot_id().clone(),
                        block_index,
                    });
                }
            }

            *bytes_written += block_size;
        }

        Ok(())
    }

    /// Resolve a block's descriptor, loading a page on a cache miss
    async fn resolve(&self, block_index: u64, cancel: &CancellationToken) -> BlockResult<CacheLookup> {
        match self.cache.lookup(block_index) {
            CacheLookup::Unknown => {
                self.cancellable(cancel, self.loader.load_into(self.cache, block_index))
                    .await
            }
            hit => Ok(hit),
        }
    }

    /// Fetch one block into its slot of the caller buffer
    async fn read_block(
        &self,
        block_index: u64,
        token: &BlockToken,
        slot: &mut [u8],
        cancel: &CancellationToken,
    ) -> BlockResult<()> {
        let snapshot_id = self.snapshot_id();
        let remote = |source: ServiceError| {
            BlockError::remote(
                "fetch_block",
                format!("snapshot {snapshot_id}"),
                Some(block_index),
                source,
            )
        };

        let FetchedBlock {
            mut data,
            data_length,
            checksum,
        } = self
            .cancellable(cancel, async {
                self.service
                    .fetch_block(snapshot_id, block_index, token)
                    .await
                    .map_err(remote)
            })
            .await?;

        let expected = slot.len() as u64;
        if data_length < expected {
            return Err(BlockError::ShortBlockRead {
                snapshot_id: snapshot_id.clone(),
                block_index,
                expected,
                actual: data_length,
            });
        }

        let filled = self
            .cancellable(cancel, async {
                read_full(&mut data, slot)
                    .await
                    .map_err(|e| remote(ServiceError::Io(e)))
            })
            .await?;

        if filled < slot.len() {
            return Err(BlockError::ShortBlockRead {
                snapshot_id: snapshot_id.clone(),
                block_index,
                expected,
                actual: filled as u64,
            });
        }

        if self.verify_checksums
            && let Some(checksum) = checksum
            && !checksum.verify(slot)
        {
            warn!(
                "{} checksum mismatch for block {} of snapshot {}",
                checksum.algorithm(),
                block_index,
                snapshot_id
            );
            return Err(BlockError::ChecksumMismatch {
                snapshot_id: snapshot_id.clone(),
                block_index,
            });
        }

        Ok(())
    }

    fn ensure_not_cancelled(&self, cancel: &CancellationToken) -> BlockResult<()> {
        if cancel.is_cancelled() {
            return Err(BlockError::Cancelled {
                snapshot_id: self.snapshot_id().clone(),
            });
        }
        Ok(())
    }

    /// Run a remote step, abandoning it once the token is cancelled
    async fn cancellable<T>(
        &self,
        cancel: &CancellationToken,
        step: impl Future<Output = BlockResult<T>>,
    ) -> BlockResult<T> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(BlockError::Cancelled {
                snapshot_id: self.snapshot_id().clone(),
            }),
            result = step => result,
        }
    }
}

/// Read until `buf` is full or the stream ends
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
