// SPDX-License-Identifier: Apache-2.0
//! Table adapters: the capability seam between the core and row storage.
//!
//! The core never touches table storage directly. It reads rows through
//! [`TableAdapter::read_state`] at commit time and writes rows through a
//! [`TableTx`] at patch-apply time. Adapters are a sealed set resolved by
//! name from the instance configuration; `"csv"` is built in.
//!
//! # Absence Semantics
//!
//! A missing source file is an empty table, not an error — a freshly
//! configured host has nothing yet, and a receiving host creates the
//! destination on first apply.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::csv;
use crate::files;
use crate::table::TableDef;

/// One table row: ordered column values, primary fields first.
pub type Row = Vec<Vec<u8>>;

/// Failure reported by an adapter callback.
///
/// Adapters are external collaborators; their failures travel as a
/// diagnostic string and abort the surrounding transaction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct AdapterError(String);

impl AdapterError {
    /// Wrap a diagnostic message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Read side of the adapter capability set.
pub trait TableAdapter {
    /// Return every row of the table behind `table`'s read locator.
    ///
    /// # Errors
    /// Any storage-level failure; a missing source is an empty table.
    fn read_state(&self, table: &TableDef) -> Result<Vec<Row>, AdapterError>;

    /// Open a write transaction against `table`'s write locator.
    ///
    /// # Errors
    /// Any storage-level failure opening the destination.
    fn begin(&self, table: &TableDef) -> Result<Box<dyn TableTx>, AdapterError>;
}

/// Write side of the adapter capability set; one value per open transaction.
///
/// `values` always carries a full row (primary fields then subsidiary
/// fields) in the order named by `columns`. Nothing is visible to readers
/// until [`end`](TableTx::end) is called with `ok = true`.
pub trait TableTx {
    /// Insert a row.
    ///
    /// # Errors
    /// Storage-level failure or a row that does not fit the table.
    fn insert(
        &mut self,
        table_id: &str,
        columns: &[String],
        values: &[Vec<u8>],
    ) -> Result<(), AdapterError>;

    /// Update the row addressed by the primary fields of `values`.
    ///
    /// # Errors
    /// Storage-level failure or a row that does not fit the table.
    fn update(
        &mut self,
        table_id: &str,
        columns: &[String],
        values: &[Vec<u8>],
    ) -> Result<(), AdapterError>;

    /// Delete the row addressed by the primary fields of `values`.
    ///
    /// # Errors
    /// Storage-level failure or a row that does not fit the table.
    fn delete(
        &mut self,
        table_id: &str,
        columns: &[String],
        values: &[Vec<u8>],
    ) -> Result<(), AdapterError>;

    /// Close the transaction; `ok = false` discards every buffered change.
    ///
    /// # Errors
    /// Storage-level failure while committing.
    fn end(self: Box<Self>, ok: bool) -> Result<(), AdapterError>;
}

/// Resolve a configured adapter name to its implementation.
#[must_use]
pub fn adapter_for(name: &str) -> Option<&'static dyn TableAdapter> {
    match name {
        "csv" => Some(&CsvAdapter),
        _ => None,
    }
}

/// Returns `true` when `name` resolves to a built-in adapter.
#[must_use]
pub fn is_known(name: &str) -> bool {
    adapter_for(name).is_some()
}

/// Built-in adapter for plain CSV files.
///
/// Rows are stored primary-then-subsidiary in schema order, one record per
/// line, no header. Transactions buffer an in-memory copy keyed by the
/// composed primary fields and rewrite the whole file atomically on a
/// successful end; records are written sorted by key so output is stable
/// across runs.
pub struct CsvAdapter;

impl CsvAdapter {
    fn load_rows(path: &Path) -> Result<Vec<Row>, AdapterError> {
        let content = match std::fs::read(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(AdapterError::new(format!("{}: {err}", path.display())));
            }
        };
        if content.is_empty() {
            return Ok(Vec::new());
        }
        csv::parse_table(&content)
            .map_err(|err| AdapterError::new(format!("{}: {err}", path.display())))
    }
}

impl TableAdapter for CsvAdapter {
    fn read_state(&self, table: &TableDef) -> Result<Vec<Row>, AdapterError> {
        Self::load_rows(Path::new(table.read_locator()))
    }

    fn begin(&self, table: &TableDef) -> Result<Box<dyn TableTx>, AdapterError> {
        let path = PathBuf::from(table.write_locator());
        let primary_len = table.primary_fields().len();
        let column_count = primary_len + table.subsidiary_fields().len();
        let mut rows = BTreeMap::new();
        for row in Self::load_rows(&path)? {
            if row.len() != column_count {
                return Err(AdapterError::new(format!(
                    "{}: row with {} columns in a {}-column table",
                    path.display(),
                    row.len(),
                    column_count
                )));
            }
            let key = csv::compose_record(&row[..primary_len]);
            rows.insert(key, row);
        }
        Ok(Box::new(CsvTx {
            path,
            primary_len,
            column_count,
            rows,
        }))
    }
}

struct CsvTx {
    path: PathBuf,
    primary_len: usize,
    column_count: usize,
    rows: BTreeMap<Vec<u8>, Row>,
}

impl CsvTx {
    fn key_of(&self, table_id: &str, values: &[Vec<u8>]) -> Result<Vec<u8>, AdapterError> {
        if values.len() != self.column_count {
            return Err(AdapterError::new(format!(
                "table '{table_id}': got {} values for {} columns",
                values.len(),
                self.column_count
            )));
        }
        Ok(csv::compose_record(&values[..self.primary_len]))
    }
}

impl TableTx for CsvTx {
    fn insert(
        &mut self,
        table_id: &str,
        _columns: &[String],
        values: &[Vec<u8>],
    ) -> Result<(), AdapterError> {
        let key = self.key_of(table_id, values)?;
        self.rows.insert(key, values.to_vec());
        Ok(())
    }

    fn update(
        &mut self,
        table_id: &str,
        columns: &[String],
        values: &[Vec<u8>],
    ) -> Result<(), AdapterError> {
        // Upsert: reconciliation converges on the incoming row whether or
        // not the local side already had it.
        self.insert(table_id, columns, values)
    }

    fn delete(
        &mut self,
        table_id: &str,
        _columns: &[String],
        values: &[Vec<u8>],
    ) -> Result<(), AdapterError> {
        let key = self.key_of(table_id, values)?;
        if self.rows.remove(&key).is_none() {
            tracing::warn!(
                table_id,
                key = %String::from_utf8_lossy(&key),
                "delete of a row that is not present"
            );
        }
        Ok(())
    }

    fn end(self: Box<Self>, ok: bool) -> Result<(), AdapterError> {
        if !ok {
            return Ok(());
        }
        let table: Vec<Row> = self.rows.into_values().collect();
        let bytes = csv::compose_table(&table);
        files::write_atomic(&self.path, &bytes)
            .map_err(|err| AdapterError::new(err.to_string()))
    }
}
