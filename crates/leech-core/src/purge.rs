// SPDX-License-Identifier: Apache-2.0
//! Retention: prune chain blocks beyond the preferred depth.
//!
//! The walk keeps the newest `keep` blocks reachable from HEAD and removes
//! every older block file it encounters, stopping at genesis or at a gap
//! left by a previous purge. Diffing past a pruned boundary fails with an
//! integrity error; consumers that far behind request a rebase instead.

use tracing::{debug, info};

use crate::block::{self, Block};
use crate::chain;
use crate::error::Result;
use crate::files;
use crate::instance::Instance;

/// Prune using the instance's configured retention depth.
///
/// # Errors
/// I/O or parse failure on the walk.
pub fn purge(instance: &Instance) -> Result<usize> {
    purge_depth(instance.work_dir(), instance.preferred_chain_length())
}

/// Keep the newest `keep` blocks reachable from HEAD, delete the rest.
/// Returns the number of deleted blocks.
///
/// # Errors
/// I/O or parse failure on the walk.
pub fn purge_depth(work_dir: &std::path::Path, keep: usize) -> Result<usize> {
    let mut id = chain::head_get(work_dir)?;
    let mut kept = 0usize;
    let mut deleted = 0usize;

    while !id.is_genesis() {
        let path = block::block_path(work_dir, &id);
        let Some(bytes) = files::read_optional(&path)? else {
            // A previous purge already cut the chain here.
            debug!(block_id = %id, "reached pruned boundary");
            break;
        };
        let parent = Block::from_value(leech_json::parse(&bytes)?)?.parent_id();
        if kept < keep {
            kept += 1;
        } else {
            files::remove_file(&path)?;
            deleted += 1;
            debug!(block_id = %id, "pruned block");
        }
        id = parent;
    }

    info!(kept, deleted, "purge finished");
    Ok(deleted)
}
