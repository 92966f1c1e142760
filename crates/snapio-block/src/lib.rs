//! snapio Snapshot Block Reader
//!
//! This crate exposes point-in-time snapshots of block storage volumes as
//! randomly addressable block ranges, so a backup pipeline can copy
//! snapshot contents without speaking the remote block protocol.
//!
//! # Features
//!
//! - **Lazy block index**: descriptors are listed page by page, only for
//!   the ranges actually read
//! - **Sparse snapshots**: unallocated blocks are detected from page
//!   coverage and either rejected or zero-filled
//! - **Fail-fast range reads**: short or corrupt blocks stop the read and
//!   report how many bytes were written
//! - **Cancellation**: every remote call races a cancellation token
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │   Backup pipeline    │  (block-source-to-stream adapter)
//! └──────────┬───────────┘
//!            │ read(start, count, buf)
//! ┌──────────▼───────────┐
//! │    EntityHandle      │
//! │  - RangeReader       │
//! │  - BlockIndexLoader  │
//! │  - DescriptorCache   │
//! └──────────┬───────────┘
//!            │ list_blocks / fetch_block
//! ┌──────────▼───────────┐
//! │ SnapshotBlockService │  (remote snapshot API)
//! └──────────────────────┘
//! ```

pub mod cache;
pub mod entity;
pub mod error;
pub mod loader;
pub mod manager;
pub mod reader;

pub use cache::{BlockDescriptorCache, CacheLookup, CacheStats};
pub use entity::{Entity, EntityHandle, EntityInfo, RangeReadable};
pub use error::{BlockError, BlockResult, PartialRead};
pub use loader::{BlockIndexLoader, BlockPage};
pub use manager::SnapshotEntityManager;
