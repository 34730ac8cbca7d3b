// SPDX-License-Identifier: Apache-2.0
//! Patch application: route received row operations to table adapters.
//!
//! The lastseen pointer for the producing peer advances first — even an
//! apply that later aborts has told us what the producer's tip was. Each
//! delta then runs inside one adapter transaction: deletes, updates,
//! inserts, in that order. Deltas for tables this host does not consume are
//! skipped with a warning; a remote may well publish more than we care
//! about.
//!
//! Rows whose `uid_field` primary column carries this host's own
//! `uid_value` are suppressed: a host must not overwrite itself with a
//! stale view of its data observed elsewhere.

use tracing::{debug, warn};

use crate::adapter::{self, TableAdapter, TableTx};
use crate::delta::Delta;
use crate::error::{Error, Result};
use crate::instance::Instance;
use crate::patch::Patch;
use crate::table::TableDef;

/// Apply serialized patch bytes received from a peer.
///
/// `uid_field` names the primary column carrying host identity;
/// `uid_value` is this host's own identity and doubles as the peer key for
/// the lastseen registry.
///
/// # Errors
/// Parse/version failures, or the first adapter failure — the transaction
/// in flight is rolled back and no further blocks are processed.
pub fn apply(
    instance: &Instance,
    uid_field: &str,
    uid_value: &str,
    patch_bytes: &[u8],
) -> Result<()> {
    let patch = Patch::parse(patch_bytes)?;
    patch.update_lastseen(instance.work_dir(), uid_value)?;
    debug!(
        lastknown = %patch.lastknown(),
        blocks = patch.blocks().len(),
        "applying patch"
    );

    for block in patch.blocks() {
        for delta in block.payload() {
            let Some(table) = instance.table(delta.table_id()) else {
                warn!(
                    table_id = delta.table_id(),
                    "table is not configured here, skipping its delta"
                );
                continue;
            };
            let adapter = adapter::adapter_for(table.adapter_name()).ok_or_else(|| {
                Error::Config(format!(
                    "table '{}' names unknown adapter '{}'",
                    table.id(),
                    table.adapter_name()
                ))
            })?;
            apply_delta(table, adapter, delta, uid_field, uid_value)?;
        }
    }
    Ok(())
}

fn apply_delta(
    table: &TableDef,
    adapter: &dyn TableAdapter,
    delta: &Delta,
    uid_field: &str,
    uid_value: &str,
) -> Result<()> {
    let columns = table.columns();
    let mut tx = adapter.begin(table)?;
    let outcome = dispatch_rows(tx.as_mut(), table, &columns, delta, uid_field, uid_value);
    match outcome {
        Ok(()) => {
            tx.end(true)?;
            Ok(())
        }
        Err(err) => {
            if let Err(rollback) = tx.end(false) {
                warn!(table_id = table.id(), %rollback, "rollback also failed");
            }
            Err(err)
        }
    }
}

fn dispatch_rows(
    tx: &mut dyn TableTx,
    table: &TableDef,
    columns: &[String],
    delta: &Delta,
    uid_field: &str,
    uid_value: &str,
) -> Result<()> {
    for (key, value) in delta.deletes().iter() {
        if let Some(row) = dispatchable_row(table, key, value, uid_field, uid_value)? {
            tx.delete(table.id(), columns, &row)?;
        }
    }
    for (key, value) in delta.updates().iter() {
        if let Some(row) = dispatchable_row(table, key, value, uid_field, uid_value)? {
            tx.update(table.id(), columns, &row)?;
        }
    }
    for (key, value) in delta.inserts().iter() {
        if let Some(row) = dispatchable_row(table, key, value, uid_field, uid_value)? {
            tx.insert(table.id(), columns, &row)?;
        }
    }
    Ok(())
}

/// Rebuild the adapter-facing row for one state entry, or `None` when the
/// row refers to this host itself.
fn dispatchable_row(
    table: &TableDef,
    key: &[u8],
    value: &leech_json::Value,
    uid_field: &str,
    uid_value: &str,
) -> Result<Option<Vec<Vec<u8>>>> {
    let value = value.as_bytes().ok_or_else(|| {
        Error::Schema(format!(
            "table '{}': operation value for key '{}' is not a string",
            table.id(),
            String::from_utf8_lossy(key)
        ))
    })?;
    let row = table.row_from_entry(key, value)?;
    let own_row = table
        .primary_fields()
        .iter()
        .position(|field| field == uid_field)
        .is_some_and(|index| row[index] == uid_value.as_bytes());
    if own_row {
        debug!(
            table_id = table.id(),
            key = %String::from_utf8_lossy(key),
            "suppressing update to our own row"
        );
        return Ok(None);
    }
    Ok(Some(row))
}
