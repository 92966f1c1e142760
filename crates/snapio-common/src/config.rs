//! Configuration types for the snapshot block reader

use crate::error::{Error, Result};
use crate::types::BYTES_PER_GIB;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default storage type tag for entity ids
pub const DEFAULT_TYPE_TAG: &str = "ebs";

/// Default number of block descriptors requested per listing page
pub const DEFAULT_BLOCK_LIST_PAGE_SIZE: u32 = 1000;

/// Default number of volumes requested per enumeration page
pub const DEFAULT_VOLUME_LIST_PAGE_SIZE: u32 = 1000;

/// Page size bounds accepted by the remote block listing
const BLOCK_LIST_PAGE_SIZE_RANGE: std::ops::RangeInclusive<u32> = 100..=10_000;

/// Page size bounds accepted by the remote volume listing
const VOLUME_LIST_PAGE_SIZE_RANGE: std::ops::RangeInclusive<u32> = 5..=1000;

/// What a range read does with a block index the snapshot never allocated
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnallocatedBlockPolicy {
    /// Fail the read with a block-not-found error
    #[default]
    Error,
    /// Fill the block's slot in the buffer with zeros
    ZeroFill,
}

/// Reader configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Storage type tag accepted by the entity manager
    pub type_tag: String,
    /// Block descriptors requested per listing page
    pub block_list_page_size: u32,
    /// Volumes requested per enumeration page
    pub volume_list_page_size: u32,
    /// Bytes per provisioning unit (volume sizes are described in GiB)
    pub provisioning_unit_bytes: u64,
    /// Handling of indices missing from the snapshot's block index
    pub unallocated_blocks: UnallocatedBlockPolicy,
    /// Verify block payloads against the checksum returned with them
    pub verify_checksums: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            type_tag: DEFAULT_TYPE_TAG.to_string(),
            block_list_page_size: DEFAULT_BLOCK_LIST_PAGE_SIZE,
            volume_list_page_size: DEFAULT_VOLUME_LIST_PAGE_SIZE,
            provisioning_unit_bytes: BYTES_PER_GIB,
            unallocated_blocks: UnallocatedBlockPolicy::Error,
            verify_checksums: true,
        }
    }
}

impl ReaderConfig {
    /// Parse and validate a TOML configuration
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Check that every value is usable
    pub fn validate(&self) -> Result<()> {
        if self.type_tag.is_empty() {
            return Err(Error::configuration("type_tag must not be empty"));
        }
        if self.type_tag.contains(crate::types::ENTITY_ID_SEPARATOR) {
            return Err(Error::configuration(format!(
                "type_tag must not contain '{}'",
                crate::types::ENTITY_ID_SEPARATOR
            )));
        }
        if !BLOCK_LIST_PAGE_SIZE_RANGE.contains(&self.block_list_page_size) {
            return Err(Error::configuration(format!(
                "block_list_page_size {} outside {:?}",
                self.block_list_page_size, BLOCK_LIST_PAGE_SIZE_RANGE
            )));
        }
        if !VOLUME_LIST_PAGE_SIZE_RANGE.contains(&self.volume_list_page_size) {
            return Err(Error::configuration(format!(
                "volume_list_page_size {} outside {:?}",
                self.volume_list_page_size, VOLUME_LIST_PAGE_SIZE_RANGE
            )));
        }
        if self.provisioning_unit_bytes == 0 {
            return Err(Error::configuration(
                "provisioning_unit_bytes must be positive",
            ));
        }
        Ok(())
    }
}
