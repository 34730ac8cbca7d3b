// SPDX-License-Identifier: Apache-2.0
//! Chain blocks: parent-linked, timestamped delta payloads.
//!
//! A block's id is the SHA-1 digest of its compact canonical JSON
//! composition, parent and timestamp included, so the id commits to the
//! whole ancestry-relevant content. Storage under `blocks/<id>` is
//! write-once: an existing file already holds these bytes by construction.
//! The optional pretty rendering only affects the stored file — digests are
//! always computed over the compact form, and a load re-verifies the id
//! from the parsed content.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use leech_json::{Object, Value};
use tracing::debug;

use crate::delta::Delta;
use crate::error::{Error, Result};
use crate::files;
use crate::ident::{block_digest, BlockId};

/// A block: parent pointer, wall-clock timestamp, ordered per-table deltas.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    parent: BlockId,
    timestamp: f64,
    payload: Vec<Delta>,
}

/// Wall-clock seconds since the Unix epoch, as carried in blocks and
/// patches.
pub(crate) fn wall_clock_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as f64)
        .unwrap_or(0.0)
}

impl Block {
    /// Create a block stamped with the current wall clock.
    #[must_use]
    pub fn create(parent: BlockId, payload: Vec<Delta>) -> Block {
        Self::create_at(parent, payload, wall_clock_seconds())
    }

    /// Create a block with an explicit timestamp.
    #[must_use]
    pub fn create_at(parent: BlockId, payload: Vec<Delta>, timestamp: f64) -> Block {
        Block {
            parent,
            timestamp,
            payload,
        }
    }

    /// Identifier of the parent block; genesis for the first real block.
    #[must_use]
    pub fn parent_id(&self) -> BlockId {
        self.parent
    }

    /// Creation time, wall-clock seconds.
    #[must_use]
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// The per-table deltas, in commit order.
    #[must_use]
    pub fn payload(&self) -> &[Delta] {
        &self.payload
    }

    /// Mutable access to the payload; used when folding chains.
    pub fn payload_mut(&mut self) -> &mut Vec<Delta> {
        &mut self.payload
    }

    /// Consume the block, keeping only its payload.
    #[must_use]
    pub fn take_payload(self) -> Vec<Delta> {
        self.payload
    }

    /// Content id: SHA-1 over the compact canonical composition.
    #[must_use]
    pub fn id(&self) -> BlockId {
        block_digest(&leech_json::compose(&self.to_value()))
    }

    /// Canonical wire form: `{"parent", "timestamp", "payload"}`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut object = Object::new();
        object.insert(b"parent".to_vec(), Value::from(self.parent.to_hex().as_str()));
        object.insert(b"timestamp".to_vec(), Value::Number(self.timestamp));
        object.insert(
            b"payload".to_vec(),
            Value::Array(self.payload.iter().map(Delta::to_value).collect()),
        );
        Value::Object(object)
    }

    /// Parse and validate the wire form.
    ///
    /// # Errors
    /// `[SCHEMA]` on a missing or mistyped field or an unknown field.
    pub fn from_value(value: Value) -> Result<Block> {
        let mut object = value.into_object().map_err(|other| {
            Error::Schema(format!("block must be an object, found {}", other.type_name()))
        })?;
        let parent = match object.remove(b"parent") {
            Some(Value::String(bytes)) => std::str::from_utf8(&bytes)
                .map_err(|_| Error::Schema("block parent id is not UTF-8".to_owned()))?
                .parse::<BlockId>()?,
            _ => return Err(Error::Schema("block without a string 'parent'".to_owned())),
        };
        let timestamp = match object.remove(b"timestamp") {
            Some(Value::Number(number)) => number,
            _ => {
                return Err(Error::Schema(
                    "block without a numeric 'timestamp'".to_owned(),
                ))
            }
        };
        let payload = match object.remove(b"payload") {
            Some(Value::Array(values)) => values
                .into_iter()
                .map(Delta::from_value)
                .collect::<Result<Vec<_>>>()?,
            _ => return Err(Error::Schema("block without a 'payload' array".to_owned())),
        };
        if let Some((key, _)) = object.iter().next() {
            return Err(Error::Schema(format!(
                "block carries unknown field '{}'",
                String::from_utf8_lossy(key)
            )));
        }
        Ok(Block {
            parent,
            timestamp,
            payload,
        })
    }

    /// Persist under `blocks/<id>`, returning the id.
    ///
    /// An already-present file is left intact: the name is the content
    /// hash, so equal names hold equal bytes.
    ///
    /// # Errors
    /// I/O failure writing the block file.
    pub fn store(&self, work_dir: &Path, pretty: bool) -> Result<BlockId> {
        let id = self.id();
        let path = block_path(work_dir, &id);
        if path.exists() {
            debug!(block_id = %id, "block already stored");
            return Ok(id);
        }
        let value = self.to_value();
        let bytes = if pretty {
            leech_json::compose_pretty(&value)
        } else {
            leech_json::compose(&value)
        };
        files::write_atomic(&path, &bytes)?;
        Ok(id)
    }

    /// Load `blocks/<id>` and verify that the content still hashes to `id`.
    ///
    /// # Errors
    /// `[CHAIN_INTEGRITY]` when the block is missing or its recomputed id
    /// differs from the requested one; parse errors for corrupt content.
    pub fn load(work_dir: &Path, id: &BlockId) -> Result<Block> {
        let path = block_path(work_dir, id);
        let Some(bytes) = files::read_optional(&path)? else {
            return Err(Error::Integrity(format!("block {id} is not in the store")));
        };
        let block = Block::from_value(leech_json::parse(&bytes)?)?;
        let computed = block.id();
        if computed != *id {
            return Err(Error::Integrity(format!(
                "block {id} is corrupt: content hashes to {computed}"
            )));
        }
        Ok(block)
    }
}

/// Path of a block file under the working directory.
#[must_use]
pub(crate) fn block_path(work_dir: &Path, id: &BlockId) -> PathBuf {
    work_dir.join("blocks").join(id.to_hex())
}
