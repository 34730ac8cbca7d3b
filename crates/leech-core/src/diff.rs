// SPDX-License-Identifier: Apache-2.0
//! Patch generation: fold a span of the chain into one equivalent block.
//!
//! Starting from an empty block parked at HEAD, each parent on the walk is
//! loaded and the accumulated payload is folded into it, table by table,
//! until the folded block's parent is the ancestor the consumer asked for.
//! The result is a single block whose application equals applying every
//! block in the span oldest-first.
//!
//! `rebase` produces the same envelope from the persisted snapshots instead
//! of the chain: one block presenting the entire current state as inserts,
//! for consumers too far behind to walk the chain at all.

use leech_json::{Object, Value};
use tracing::debug;

use crate::block::Block;
use crate::chain;
use crate::delta::{Delta, DeltaKind};
use crate::error::Result;
use crate::ident::BlockId;
use crate::instance::Instance;
use crate::patch::Patch;

/// Build a patch covering everything between HEAD and `final_id`.
///
/// `final_id` is the newest block the consumer already holds (genesis for a
/// consumer with nothing). The returned bytes are the serialized patch; its
/// single block's parent equals `final_id`, and its `lastknown` field
/// advertises HEAD so the consumer knows where this patch leaves it.
///
/// # Errors
/// `[CHAIN_INTEGRITY]` when a block on the walk is missing or corrupt —
/// including a `final_id` that is not an ancestor of HEAD.
pub fn diff(instance: &Instance, final_id: &BlockId) -> Result<Vec<u8>> {
    let work_dir = instance.work_dir();
    let head = chain::head_get(work_dir)?;
    let folded = fold_chain(instance, head, final_id)?;

    let mut patch = Patch::create(head);
    patch.append_block(folded);
    Ok(patch.to_bytes(instance.pretty_print()))
}

fn fold_chain(instance: &Instance, head: BlockId, final_id: &BlockId) -> Result<Block> {
    let mut child = Block::create(head, Vec::new());
    loop {
        if child.parent_id() == *final_id {
            return Ok(child);
        }
        let mut parent = Block::load(instance.work_dir(), &child.parent_id())?;
        debug!(block_id = %child.parent_id(), "folding block into patch");

        for child_delta in child.take_payload() {
            let slot = parent
                .payload_mut()
                .iter_mut()
                .find(|parent_delta| parent_delta.table_id() == child_delta.table_id());
            match slot {
                Some(parent_delta) => {
                    let mut folded = child_delta;
                    folded.fold_parent(parent_delta)?;
                    *parent_delta = folded;
                }
                None => parent.payload_mut().push(child_delta),
            }
        }
        child = parent;
    }
}

/// Build a patch equivalent to a fresh dump of the persisted snapshots.
///
/// Every configured table contributes one `rebase`-kind delta presenting
/// its snapshot as inserts against an empty state. The block is parked at
/// HEAD, so a consumer applying it ends up aligned with this producer's
/// tip.
///
/// # Errors
/// Snapshot load failures or pointer I/O.
pub fn rebase(instance: &Instance) -> Result<Vec<u8>> {
    let work_dir = instance.work_dir();
    let empty = Value::Object(Object::new());
    let mut payload = Vec::new();
    for table in instance.tables() {
        let current = table.load_old_state(work_dir)?;
        let delta = Delta::compute(table.id(), DeltaKind::Rebase, &current, &empty)?;
        debug!(
            table_id = table.id(),
            inserts = delta.num_inserts(),
            "computed rebase delta"
        );
        payload.push(delta);
    }

    let head = chain::head_get(work_dir)?;
    let block = Block::create(head, payload);
    let mut patch = Patch::create(head);
    patch.append_block(block);
    Ok(patch.to_bytes(instance.pretty_print()))
}
