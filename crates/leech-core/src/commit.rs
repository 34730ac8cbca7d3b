// SPDX-License-Identifier: Apache-2.0
//! The commit pipeline: snapshot every configured table, delta it against
//! the previous snapshot, and append one block carrying all the deltas.
//!
//! Snapshots are rewritten only for tables that actually changed; HEAD is
//! advanced only after the block is durable. A failure anywhere leaves HEAD
//! untouched — snapshots already rewritten stay rewritten, because the
//! adapter's state is ground truth and the chain is derived from it.

use tracing::{debug, info, trace};

use crate::adapter;
use crate::block::Block;
use crate::chain;
use crate::delta::{Delta, DeltaKind};
use crate::error::{Error, Result};
use crate::ident::BlockId;
use crate::instance::Instance;
use crate::purge;

/// Run one commit; returns the id of the appended block.
///
/// A block is appended even when nothing changed — an empty commit is a
/// legitimate chain entry.
///
/// # Errors
/// Any per-table load/delta failure, or a storage failure appending the
/// block; HEAD does not move on error.
pub fn commit(instance: &Instance) -> Result<BlockId> {
    let work_dir = instance.work_dir();
    let mut payload = Vec::new();
    let mut total_inserts = 0usize;
    let mut total_deletes = 0usize;
    let mut total_updates = 0usize;

    for table in instance.tables() {
        let adapter = adapter::adapter_for(table.adapter_name()).ok_or_else(|| {
            Error::Config(format!(
                "table '{}' names unknown adapter '{}'",
                table.id(),
                table.adapter_name()
            ))
        })?;

        let new_state = table.load_new_state(adapter)?;
        let old_state = table.load_old_state(work_dir)?;
        let delta = Delta::compute(table.id(), DeltaKind::Delta, &new_state, &old_state)?;
        debug!(
            table_id = table.id(),
            inserts = delta.num_inserts(),
            deletes = delta.num_deletes(),
            updates = delta.num_updates(),
            "computed table delta"
        );
        total_inserts += delta.num_inserts();
        total_deletes += delta.num_deletes();
        total_updates += delta.num_updates();

        if delta.is_empty() {
            trace!(table_id = table.id(), "zero changes, snapshot untouched");
        } else {
            table.store_new_state(work_dir, &new_state)?;
            debug!(table_id = table.id(), "stored new snapshot");
        }
        payload.push(delta);
    }

    let parent = chain::head_get(work_dir)?;
    let block = Block::create(parent, payload);
    let id = block.store(work_dir, instance.pretty_print())?;
    chain::head_set(work_dir, &id)?;

    info!(
        inserts = total_inserts,
        deletes = total_deletes,
        updates = total_updates,
        tables = instance.tables().len(),
        block_id = %id,
        "created commit"
    );

    if instance.auto_purge() {
        purge::purge(instance)?;
    }
    Ok(id)
}
