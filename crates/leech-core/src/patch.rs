// SPDX-License-Identifier: Apache-2.0
//! Patch envelopes: the transport container for folded sub-chains.
//!
//! A patch carries a format version, the producer's chain tip at generation
//! time (`lastknown`), a timestamp, and the blocks themselves — after
//! folding, exactly one block whose parent is the ancestor the consumer
//! asked to diff against. The consumer records `lastknown` as its lastseen
//! pointer for the producing peer, so the next diff it requests picks up
//! where this patch ends.

use std::path::Path;

use leech_json::{Object, Value};

use crate::block::{wall_clock_seconds, Block};
use crate::chain;
use crate::error::{Error, Result};
use crate::ident::BlockId;

/// Wire format version; consumers reject anything else.
pub const PATCH_VERSION: u64 = 1;

/// A versioned container of blocks in transit between hosts.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    version: u64,
    lastknown: BlockId,
    timestamp: f64,
    blocks: Vec<Block>,
}

impl Patch {
    /// Create an empty patch advertising `lastknown` as the producer's tip.
    #[must_use]
    pub fn create(lastknown: BlockId) -> Patch {
        Patch {
            version: PATCH_VERSION,
            lastknown,
            timestamp: wall_clock_seconds(),
            blocks: Vec::new(),
        }
    }

    /// Append a block; blocks stay in insertion order on the wire.
    pub fn append_block(&mut self, block: Block) {
        self.blocks.push(block);
    }

    /// Format version carried by this patch.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The producer's chain tip when the patch was generated.
    #[must_use]
    pub fn lastknown(&self) -> BlockId {
        self.lastknown
    }

    /// Generation time, wall-clock seconds.
    #[must_use]
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// The carried blocks.
    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Canonical wire form:
    /// `{"version", "lastknown", "timestamp", "blocks"}`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut object = Object::new();
        object.insert(b"version".to_vec(), Value::Number(self.version as f64));
        object.insert(
            b"lastknown".to_vec(),
            Value::from(self.lastknown.to_hex().as_str()),
        );
        object.insert(b"timestamp".to_vec(), Value::Number(self.timestamp));
        object.insert(
            b"blocks".to_vec(),
            Value::Array(self.blocks.iter().map(Block::to_value).collect()),
        );
        Value::Object(object)
    }

    /// Serialize for transport or for a patch file on disk.
    #[must_use]
    pub fn to_bytes(&self, pretty: bool) -> Vec<u8> {
        let value = self.to_value();
        if pretty {
            leech_json::compose_pretty(&value)
        } else {
            leech_json::compose(&value)
        }
    }

    /// Parse received patch bytes, rejecting unsupported versions.
    ///
    /// # Errors
    /// `[PATCH_VERSION]` on a version other than [`PATCH_VERSION`];
    /// `[SCHEMA]` or a parse error on anything malformed.
    pub fn parse(bytes: &[u8]) -> Result<Patch> {
        let mut object = leech_json::parse(bytes)?.into_object().map_err(|other| {
            Error::Schema(format!("patch must be an object, found {}", other.type_name()))
        })?;

        let version = match object.remove(b"version") {
            Some(Value::Number(number)) if number >= 0.0 && number.fract() == 0.0 => {
                number as u64
            }
            _ => {
                return Err(Error::Schema(
                    "patch without an integer 'version'".to_owned(),
                ))
            }
        };
        if version != PATCH_VERSION {
            return Err(Error::Version {
                found: version,
                supported: PATCH_VERSION,
            });
        }
        let lastknown = match object.remove(b"lastknown") {
            Some(Value::String(bytes)) => std::str::from_utf8(&bytes)
                .map_err(|_| Error::Schema("patch lastknown is not UTF-8".to_owned()))?
                .parse::<BlockId>()?,
            _ => {
                return Err(Error::Schema(
                    "patch without a string 'lastknown'".to_owned(),
                ))
            }
        };
        let timestamp = match object.remove(b"timestamp") {
            Some(Value::Number(number)) => number,
            _ => {
                return Err(Error::Schema(
                    "patch without a numeric 'timestamp'".to_owned(),
                ))
            }
        };
        let blocks = match object.remove(b"blocks") {
            Some(Value::Array(values)) => values
                .into_iter()
                .map(Block::from_value)
                .collect::<Result<Vec<_>>>()?,
            _ => return Err(Error::Schema("patch without a 'blocks' array".to_owned())),
        };
        if let Some((key, _)) = object.iter().next() {
            return Err(Error::Schema(format!(
                "patch carries unknown field '{}'",
                String::from_utf8_lossy(key)
            )));
        }
        Ok(Patch {
            version,
            lastknown,
            timestamp,
            blocks,
        })
    }

    /// Record this patch's `lastknown` as the lastseen pointer for `peer`.
    ///
    /// # Errors
    /// I/O failure writing the pointer.
    pub fn update_lastseen(&self, work_dir: &Path, peer: &str) -> Result<()> {
        chain::lastseen_set(work_dir, peer, &self.lastknown)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn tip() -> BlockId {
        crate::ident::block_digest(b"tip")
    }

    // ── 1. wire round trip ───────────────────────────────────────────────

    #[test]
    fn wire_round_trip() {
        let mut patch = Patch::create(tip());
        patch.append_block(Block::create_at(BlockId::GENESIS, Vec::new(), 3.0));
        let reparsed = Patch::parse(&patch.to_bytes(false)).unwrap();
        assert_eq!(reparsed, patch);
        assert_eq!(reparsed.lastknown(), tip());
        assert_eq!(reparsed.blocks().len(), 1);
    }

    #[test]
    fn pretty_bytes_parse_too() {
        let patch = Patch::create(tip());
        assert_eq!(Patch::parse(&patch.to_bytes(true)).unwrap(), patch);
    }

    // ── 2. version gate ──────────────────────────────────────────────────

    #[test]
    fn rejects_version_mismatch() {
        let patch = Patch::create(tip());
        let text = String::from_utf8(patch.to_bytes(false)).unwrap();
        let bumped = text.replacen("\"version\":1", "\"version\":2", 1);
        let err = Patch::parse(bumped.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            Error::Version {
                found: 2,
                supported: PATCH_VERSION
            }
        ));
    }

    #[test]
    fn rejects_fractional_version() {
        let patch = Patch::create(tip());
        let text = String::from_utf8(patch.to_bytes(false)).unwrap();
        let bumped = text.replacen("\"version\":1", "\"version\":1.5", 1);
        assert!(Patch::parse(bumped.as_bytes()).is_err());
    }

    // ── 3. shape validation ──────────────────────────────────────────────

    #[test]
    fn rejects_malformed_envelopes() {
        assert!(Patch::parse(b"[]").is_err());
        assert!(Patch::parse(b"{\"version\":1}").is_err());
        assert!(Patch::parse(b"not json at all").is_err());
        let mut patch = Patch::create(tip());
        patch.append_block(Block::create_at(BlockId::GENESIS, Vec::new(), 3.0));
        let text = String::from_utf8(patch.to_bytes(false)).unwrap();
        let extra = text.replacen("\"version\"", "\"surprise\":true,\"version\"", 1);
        assert!(Patch::parse(extra.as_bytes()).is_err());
    }

    // ── 4. lastseen side effect ──────────────────────────────────────────

    #[test]
    fn update_lastseen_persists_lastknown() {
        let dir = tempfile::tempdir().unwrap();
        crate::files::ensure_dir(&dir.path().join("lastseen")).unwrap();
        let patch = Patch::create(tip());
        patch.update_lastseen(dir.path(), "peer-a").unwrap();
        assert_eq!(
            chain::lastseen_get(dir.path(), "peer-a").unwrap(),
            tip()
        );
    }
}
