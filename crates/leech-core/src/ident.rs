// SPDX-License-Identifier: Apache-2.0
//! Block identifiers.
//!
//! A block's identity is the SHA-1 digest of its canonical JSON composition,
//! rendered as 40 lowercase hex characters wherever it crosses a file name,
//! a wire field, or a command line. The genesis id is the all-zero string —
//! the parent of the first real block on every chain.

use sha1::{Digest, Sha1};

use crate::error::Error;

/// A 20-byte SHA-1 block identifier.
///
/// Thin newtype over `[u8; 20]`; `Display` renders the canonical 40-char
/// lowercase hex form used on disk and on the wire.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct BlockId(pub [u8; 20]);

impl BlockId {
    /// The genesis identifier: 40 ASCII zeros in hex form.
    pub const GENESIS: BlockId = BlockId([0; 20]);

    /// View the id as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Returns `true` for the genesis id.
    #[must_use]
    pub fn is_genesis(&self) -> bool {
        *self == Self::GENESIS
    }

    /// The canonical 40-char lowercase hex rendering.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::str::FromStr for BlockId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)
            .map_err(|_| Error::Schema(format!("not a hex block id: '{s}'")))?;
        let bytes: [u8; 20] = bytes.try_into().map_err(|_| {
            Error::Schema(format!("block id must be 40 hex characters: '{s}'"))
        })?;
        Ok(BlockId(bytes))
    }
}

/// SHA-1 digest of `bytes` as a [`BlockId`].
///
/// The content is the identity: hashing the same canonical bytes always
/// yields the same id, and any single-byte change yields a different one.
#[must_use]
pub fn block_digest(bytes: &[u8]) -> BlockId {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    BlockId(hasher.finalize().into())
}
