//! Core type definitions for snapio
//!
//! Identifiers for volumes, snapshots and the entities built from them.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bytes in one GiB, the unit volume sizes are provisioned in
pub const BYTES_PER_GIB: u64 = 1024 * 1024 * 1024;

/// Separator between the components of a textual entity id
pub const ENTITY_ID_SEPARATOR: char = ':';

/// Identifier of a block storage volume
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct VolumeId(String);

impl VolumeId {
    /// Create a new volume id
    pub fn new(id: impl Into<String>) -> Result<Self, EntityIdError> {
        let id = id.into();
        if id.is_empty() {
            return Err(EntityIdError::MissingVolumeId);
        }
        validate_component(&id)?;
        Ok(Self(id))
    }

    /// Create without validation (internal use only)
    #[must_use]
    pub fn new_unchecked(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the volume id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VolumeId({})", self.0)
    }
}

/// Identifier of an immutable point-in-time snapshot
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct SnapshotId(String);

impl SnapshotId {
    /// Create a new snapshot id
    pub fn new(id: impl Into<String>) -> Result<Self, EntityIdError> {
        let id = id.into();
        if id.is_empty() {
            return Err(EntityIdError::EmptySnapshotId);
        }
        validate_component(&id)?;
        Ok(Self(id))
    }

    /// Create without validation (internal use only)
    #[must_use]
    pub fn new_unchecked(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the snapshot id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SnapshotId({})", self.0)
    }
}

fn validate_component(value: &str) -> Result<(), EntityIdError> {
    if value.contains(ENTITY_ID_SEPARATOR) {
        return Err(EntityIdError::InvalidChar(ENTITY_ID_SEPARATOR));
    }
    Ok(())
}

/// Addressable unit of backup: a volume, or a volume plus one snapshot
///
/// Identity is the full `(type, volume, snapshot)` triple, so a
/// snapshot-qualified id and the bare volume id it derives from are
/// distinct entities.
///
/// The textual form is `type:volume` or `type:volume:snapshot`:
///
/// ```
/// use snapio_common::EntityId;
///
/// let id: EntityId = "ebs:vol-06a67cc9:snap-0b3a6e1d".parse().unwrap();
/// assert!(id.has_snapshot());
/// assert_eq!(id.base().to_string(), "ebs:vol-06a67cc9");
/// ```
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId {
    type_tag: String,
    volume_id: VolumeId,
    snapshot_id: Option<SnapshotId>,
}

impl EntityId {
    /// Create an id for the live volume
    #[must_use]
    pub fn new(type_tag: impl Into<String>, volume_id: VolumeId) -> Self {
        Self {
            type_tag: type_tag.into(),
            volume_id,
            snapshot_id: None,
        }
    }

    /// Derive the id of one snapshot of this entity's volume
    #[must_use]
    pub fn with_snapshot(&self, snapshot_id: SnapshotId) -> Self {
        Self {
            type_tag: self.type_tag.clone(),
            volume_id: self.volume_id.clone(),
            snapshot_id: Some(snapshot_id),
        }
    }

    /// The id with any snapshot component removed
    #[must_use]
    pub fn base(&self) -> Self {
        Self::new(self.type_tag.clone(), self.volume_id.clone())
    }

    /// Storage type tag
    #[must_use]
    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    /// Base volume id
    #[must_use]
    pub const fn volume_id(&self) -> &VolumeId {
        &self.volume_id
    }

    /// Snapshot id, if the entity is snapshot-qualified
    #[must_use]
    pub const fn snapshot_id(&self) -> Option<&SnapshotId> {
        self.snapshot_id.as_ref()
    }

    /// Check whether this id refers to a snapshot
    #[must_use]
    pub const fn has_snapshot(&self) -> bool {
        self.snapshot_id.is_some()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{ENTITY_ID_SEPARATOR}{}", self.type_tag, self.volume_id)?;
        if let Some(snapshot_id) = &self.snapshot_id {
            write!(f, "{ENTITY_ID_SEPARATOR}{snapshot_id}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({self})")
    }
}

impl FromStr for EntityId {
    type Err = EntityIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(EntityIdError::Empty);
        }

        let parts: Vec<&str> = s.split(ENTITY_ID_SEPARATOR).collect();
        match parts.as_slice() {
            [type_tag, volume_id] => {
                let type_tag = validate_type_tag(type_tag)?;
                Ok(Self::new(type_tag, VolumeId::new(*volume_id)?))
            }
            [type_tag, volume_id, snapshot_id] => {
                let type_tag = validate_type_tag(type_tag)?;
                Ok(Self::new(type_tag, VolumeId::new(*volume_id)?)
                    .with_snapshot(SnapshotId::new(*snapshot_id)?))
            }
            [_] => Err(EntityIdError::MissingVolumeId),
            _ => Err(EntityIdError::TooManyComponents(parts.len())),
        }
    }
}

fn validate_type_tag(type_tag: &str) -> Result<&str, EntityIdError> {
    if type_tag.is_empty() {
        return Err(EntityIdError::MissingTypeTag);
    }
    Ok(type_tag)
}

/// Entity id parsing/validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntityIdError {
    #[error("entity id is empty")]
    Empty,
    #[error("missing type tag")]
    MissingTypeTag,
    #[error("missing volume id")]
    MissingVolumeId,
    #[error("snapshot id is empty")]
    EmptySnapshotId,
    #[error("expected at most 3 components, got {0}")]
    TooManyComponents(usize),
    #[error("id component contains invalid character: {0}")]
    InvalidChar(char),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_volume_id() {
        let id: EntityId = "ebs:vol-1".parse().unwrap();
        assert_eq!(id.type_tag(), "ebs");
        assert_eq!(id.volume_id().as_str(), "vol-1");
        assert!(!id.has_snapshot());
        assert_eq!(id.to_string(), "ebs:vol-1");
    }

    #[test]
    fn test_parse_snapshot_id() {
        let id: EntityId = "ebs:vol-06a67cc9ebac43807:snap-0b3a6e1d600effc8c"
            .parse()
            .unwrap();
        assert_eq!(
            id.snapshot_id().map(SnapshotId::as_str),
            Some("snap-0b3a6e1d600effc8c")
        );
        assert_eq!(
            id.to_string(),
            "ebs:vol-06a67cc9ebac43807:snap-0b3a6e1d600effc8c"
        );
    }

    #[test]
    fn test_snapshot_and_base_are_distinct() {
        let volume: EntityId = "ebs:vol-1".parse().unwrap();
        let snapshot = volume.with_snapshot(SnapshotId::new("snap-1").unwrap());

        assert_ne!(volume, snapshot);
        assert_eq!(snapshot.base(), volume);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<EntityId>(), Err(EntityIdError::Empty));
        assert_eq!("ebs".parse::<EntityId>(), Err(EntityIdError::MissingVolumeId));
        assert_eq!(":vol-1".parse::<EntityId>(), Err(EntityIdError::MissingTypeTag));
        assert_eq!("ebs::".parse::<EntityId>(), Err(EntityIdError::MissingVolumeId));
        assert_eq!(
            "ebs:vol-1:".parse::<EntityId>(),
            Err(EntityIdError::EmptySnapshotId)
        );
        assert_eq!(
            "ebs:vol-1:snap-1:extra".parse::<EntityId>(),
            Err(EntityIdError::TooManyComponents(4))
        );
    }

    #[test]
    fn test_component_rejects_separator() {
        assert_eq!(
            SnapshotId::new("snap:1"),
            Err(EntityIdError::InvalidChar(':'))
        );
    }
}
