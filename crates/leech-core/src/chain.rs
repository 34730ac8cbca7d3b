// SPDX-License-Identifier: Apache-2.0
//! Durable chain state under the working directory.
//!
//! Layout:
//!
//! ```text
//! <work_dir>/
//!   HEAD              current tip id, 40 hex chars
//!   blocks/<id>       immutable block files, name = content id
//!   snapshots/<tid>   one snapshot per configured table
//!   lastseen/<peer>   newest block id applied from each peer
//! ```
//!
//! HEAD and lastseen are single-writer pointer files updated via
//! temp + rename. A missing pointer file reads as genesis — a chain that
//! has never committed and a peer never heard from look the same as one
//! parked at the origin.

use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};
use crate::files;
use crate::ident::BlockId;

/// Read the current chain tip; genesis when no commit has happened yet.
///
/// # Errors
/// I/O failure, or a HEAD file that does not hold a block id.
pub fn head_get(work_dir: &Path) -> Result<BlockId> {
    read_pointer(&work_dir.join("HEAD"))
}

/// Atomically advance the chain tip.
///
/// # Errors
/// I/O failure writing the pointer.
pub fn head_set(work_dir: &Path, id: &BlockId) -> Result<()> {
    write_pointer(&work_dir.join("HEAD"), id)
}

/// Read the newest block id applied from `peer`; genesis when the peer has
/// never been applied.
///
/// # Errors
/// I/O failure, or a pointer file that does not hold a block id.
pub fn lastseen_get(work_dir: &Path, peer: &str) -> Result<BlockId> {
    read_pointer(&work_dir.join("lastseen").join(peer))
}

/// Atomically advance the lastseen pointer for `peer`.
///
/// # Errors
/// I/O failure writing the pointer.
pub fn lastseen_set(work_dir: &Path, peer: &str, id: &BlockId) -> Result<()> {
    write_pointer(&work_dir.join("lastseen").join(peer), id)
}

fn read_pointer(path: &Path) -> Result<BlockId> {
    let Some(bytes) = files::read_optional(path)? else {
        return Ok(BlockId::GENESIS);
    };
    let text = std::str::from_utf8(&bytes).map_err(|_| pointer_error(path))?;
    text.trim().parse().map_err(|_| pointer_error(path))
}

fn pointer_error(path: &Path) -> Error {
    Error::Integrity(format!(
        "pointer file {} does not hold a block id",
        path.display()
    ))
}

fn write_pointer(path: &Path, id: &BlockId) -> Result<()> {
    let mut bytes = id.to_hex().into_bytes();
    bytes.push(b'\n');
    files::write_atomic(path, &bytes)
}

/// Create the working-directory layout; existing directories are fine.
pub(crate) fn bootstrap(work_dir: &Path) -> Result<()> {
    files::ensure_dir(&work_dir.join("blocks"))?;
    files::ensure_dir(&work_dir.join("snapshots"))?;
    files::ensure_dir(&work_dir.join("lastseen"))
}

/// Every block id persisted in the store, sorted.
///
/// File names that are not block ids (stray temp files) are skipped.
///
/// # Errors
/// I/O failure listing the store.
pub fn list_block_ids(work_dir: &Path) -> Result<Vec<BlockId>> {
    let blocks = work_dir.join("blocks");
    let entries = std::fs::read_dir(&blocks).map_err(|source| Error::Io {
        path: blocks.clone(),
        source,
    })?;
    let mut ids = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| Error::Io {
            path: blocks.clone(),
            source,
        })?;
        let name = entry.file_name();
        match name.to_string_lossy().parse::<BlockId>() {
            Ok(id) => ids.push(id),
            Err(_) => debug!(file = %name.to_string_lossy(), "skipping non-block file"),
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

/// Resolve a caller-supplied hex prefix against the block store.
///
/// Succeeds iff exactly one persisted block id starts with `prefix`; zero
/// and several matches are both `None`. A full-length argument matches only
/// itself, and the genesis id resolves without being persisted.
///
/// # Errors
/// I/O failure listing the store.
pub fn resolve_id_argument(work_dir: &Path, argument: &str) -> Result<Option<BlockId>> {
    if let Ok(id) = argument.parse::<BlockId>() {
        if id.is_genesis() {
            return Ok(Some(id));
        }
        let found = list_block_ids(work_dir)?.contains(&id);
        return Ok(found.then_some(id));
    }
    if argument.is_empty() || !argument.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Ok(None);
    }
    let matches: Vec<BlockId> = list_block_ids(work_dir)?
        .into_iter()
        .filter(|id| id.to_hex().starts_with(argument))
        .collect();
    match matches.as_slice() {
        [only] => Ok(Some(*only)),
        _ => Ok(None),
    }
}
