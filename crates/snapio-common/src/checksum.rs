//! Block payload checksums
//!
//! The remote snapshot service returns a checksum with every fetched
//! block; readers use it to detect corrupted transfers.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Checksum of one block's payload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockChecksum {
    /// SHA256 digest of the full block
    Sha256([u8; 32]),
}

impl BlockChecksum {
    /// Compute the SHA256 checksum of a block
    #[must_use]
    pub fn sha256(data: &[u8]) -> Self {
        Self::Sha256(Sha256::digest(data).into())
    }

    /// Verify data against this checksum
    #[must_use]
    pub fn verify(&self, data: &[u8]) -> bool {
        match self {
            Self::Sha256(expected) => {
                let actual: [u8; 32] = Sha256::digest(data).into();
                actual == *expected
            }
        }
    }

    /// Algorithm name, as reported by the remote service
    #[must_use]
    pub const fn algorithm(&self) -> &'static str {
        match self {
            Self::Sha256(_) => "SHA256",
        }
    }
}
