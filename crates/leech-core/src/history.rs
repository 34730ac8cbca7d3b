// SPDX-License-Identifier: Apache-2.0
//! Record history: what happened to one primary key over a time window.
//!
//! Walks the chain from HEAD toward genesis, scanning each in-window block
//! for operations on the requested key, and reports them newest-first as a
//! CSV table of `timestamp, block id, operation, subsidiary fields…`.
//! Deletes carry the row's last value before removal; inserts and updates
//! carry the new one.

use leech_json::Value;
use tracing::debug;

use crate::block::Block;
use crate::chain;
use crate::csv;
use crate::error::{Error, Result};
use crate::instance::Instance;
use crate::table::TableDef;

/// Collect the history of the row addressed by `primary_fields` in table
/// `table_id`, restricted to blocks stamped within `[from, to]`.
///
/// # Errors
/// `[CONFIG]` for an unconfigured table; `[CHAIN_INTEGRITY]` when the walk
/// hits a missing or corrupt block before reaching genesis.
pub fn history(
    instance: &Instance,
    table_id: &str,
    primary_fields: &[Vec<u8>],
    from: f64,
    to: f64,
) -> Result<Vec<u8>> {
    let table = instance.table(table_id).ok_or_else(|| {
        Error::Config(format!("table '{table_id}' is not configured"))
    })?;
    if primary_fields.len() != table.primary_fields().len() {
        return Err(Error::Schema(format!(
            "table '{table_id}': {} primary fields given, schema has {}",
            primary_fields.len(),
            table.primary_fields().len()
        )));
    }
    let key = csv::compose_record(primary_fields);

    let work_dir = instance.work_dir();
    let mut records: Vec<csv::Record> = Vec::new();
    let mut id = chain::head_get(work_dir)?;
    while !id.is_genesis() {
        let block = Block::load(work_dir, &id)?;
        if block.timestamp() >= from && block.timestamp() <= to {
            for delta in block.payload() {
                if delta.table_id() != table_id {
                    continue;
                }
                let operations = [
                    ("insert", delta.inserts().get(&key)),
                    ("delete", delta.deletes().get(&key)),
                    ("update", delta.updates().get(&key)),
                ];
                for (operation, value) in operations {
                    if let Some(value) = value {
                        records.push(history_record(
                            table,
                            block.timestamp(),
                            &id,
                            operation,
                            value,
                        )?);
                    }
                }
            }
        }
        id = block.parent_id();
    }

    debug!(
        table_id,
        key = %String::from_utf8_lossy(&key),
        hits = records.len(),
        "collected history"
    );
    Ok(csv::compose_table(&records))
}

fn history_record(
    table: &TableDef,
    timestamp: f64,
    block_id: &crate::ident::BlockId,
    operation: &str,
    value: &Value,
) -> Result<csv::Record> {
    let value = value.as_bytes().ok_or_else(|| {
        Error::Schema(format!(
            "table '{}': operation value is not a string",
            table.id()
        ))
    })?;
    let mut record = vec![
        format!("{timestamp}").into_bytes(),
        block_id.to_hex().into_bytes(),
        operation.as_bytes().to_vec(),
    ];
    if !table.subsidiary_fields().is_empty() {
        record.extend(csv::parse_record(value)?);
    }
    Ok(record)
}
