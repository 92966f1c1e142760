//! Snapshot entity manager
//!
//! Entry point of the reader: owns the service connection and the reader
//! configuration, resolves entity ids into handles and enumerates the
//! volumes the service exposes.

use crate::entity::EntityHandle;
use crate::error::{BlockError, BlockResult};

use futures::stream::{self, Stream, TryStreamExt};
use snapio_client::SnapshotBlockService;
use snapio_common::{EntityId, ReaderConfig};
use std::sync::Arc;
use tracing::{debug, info};

/// Volume enumeration cursor
enum VolumeCursor {
    Start,
    Next(String),
    Done,
}

/// Manager for entities of one storage type
pub struct SnapshotEntityManager {
    service: Arc<dyn SnapshotBlockService>,
    config: ReaderConfig,
}

impl SnapshotEntityManager {
    /// Create a manager after validating `config`
    pub fn new(service: Arc<dyn SnapshotBlockService>, config: ReaderConfig) -> BlockResult<Self> {
        config.validate()?;

        info!(
            "Snapshot entity manager for type {} (block page {}, volume page {}, unallocated {:?})",
            config.type_tag,
            config.block_list_page_size,
            config.volume_list_page_size,
            config.unallocated_blocks
        );

        Ok(Self { service, config })
    }

    /// Storage type tag handled by this manager
    pub fn type_name(&self) -> &str {
        &self.config.type_tag
    }

    /// Reader configuration
    pub const fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Resolve an entity id into a handle
    pub fn entity(&self, id: EntityId) -> BlockResult<EntityHandle> {
        if id.type_tag() != self.config.type_tag {
            return Err(BlockError::WrongEntityType {
                expected: self.config.type_tag.clone(),
                actual: id.type_tag().to_string(),
            });
        }

        debug!("Opening handle {}", id);
        Ok(EntityHandle::new(id, Arc::clone(&self.service), &self.config))
    }

    /// Resolve an entity id that must name a snapshot
    pub fn snapshot_entity(&self, id: EntityId) -> BlockResult<EntityHandle> {
        if !id.has_snapshot() {
            return Err(BlockError::NotASnapshot(id));
        }
        self.entity(id)
    }

    /// Parse a textual entity id and resolve it into a handle
    pub fn parse_entity(&self, id: &str) -> BlockResult<EntityHandle> {
        let id: EntityId = id.parse().map_err(snapio_common::Error::from)?;
        self.entity(id)
    }

    /// Lazily enumerate the volumes the service exposes
    ///
    /// Pages of `volume_list_page_size` volumes are requested as the stream
    /// is polled. A failed page ends the stream after yielding its error.
    pub fn list_entities(&self) -> impl Stream<Item = BlockResult<EntityId>> + Send + '_ {
        let page_size = self.config.volume_list_page_size;
        let type_tag = self.config.type_tag.as_str();

        stream::try_unfold(VolumeCursor::Start, move |cursor| async move {
            let next_token = match cursor {
                VolumeCursor::Start => None,
                VolumeCursor::Next(token) => Some(token),
                VolumeCursor::Done => return Ok(None),
            };

            let page = self
                .service
                .list_volumes(page_size, next_token.clone())
                .await
                .map_err(|source| {
                    BlockError::remote("list_volumes", format!("type {type_tag}"), None, source)
                })?;

            debug!(
                "Listed {} volumes (more={})",
                page.volumes.len(),
                page.next_token.is_some()
            );

            let cursor = match page.next_token {
                Some(token) if Some(&token) == next_token.as_ref() => {
                    return Err(BlockError::Protocol(format!(
                        "volume listing repeated page token {token}"
                    )));
                }
                Some(token) => VolumeCursor::Next(token),
                None => VolumeCursor::Done,
            };

            Ok(Some((page.volumes, cursor)))
        })
        .map_ok(move |volumes| {
            stream::iter(
                volumes
                    .into_iter()
                    .map(move |volume| Ok(EntityId::new(type_tag, volume.volume_id))),
            )
        })
        .try_flatten()
    }
}
