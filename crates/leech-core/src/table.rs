// SPDX-License-Identifier: Apache-2.0
//! Configured tables and their snapshot state.
//!
//! A table's state is a JSON object mapping the canonical CSV composition of
//! its primary fields to the canonical CSV composition of its subsidiary
//! fields. Rows arrive from the adapter primary-fields-first in schema
//! order; the schema carries the column names the adapter boundary needs
//! when rows are rehydrated during patch application.

use std::path::{Path, PathBuf};

use leech_json::{Object, Value};
use serde::Deserialize;
use tracing::debug;

use crate::adapter::TableAdapter;
use crate::csv;
use crate::error::{Error, Result};
use crate::files;

/// A configured table: identity, schema, locators, adapter.
///
/// Deserialized from the `tables` array of `leech.json` and validated by
/// [`TableDef::validate`] before use.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableDef {
    id: String,
    primary_fields: Vec<String>,
    subsidiary_fields: Vec<String>,
    read_locator: String,
    #[serde(default)]
    write_locator: String,
    #[serde(default = "default_adapter")]
    adapter: String,
}

fn default_adapter() -> String {
    "csv".to_owned()
}

impl TableDef {
    /// Unique table identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Ordered primary column names; never empty after validation.
    #[must_use]
    pub fn primary_fields(&self) -> &[String] {
        &self.primary_fields
    }

    /// Ordered subsidiary column names; may be empty.
    #[must_use]
    pub fn subsidiary_fields(&self) -> &[String] {
        &self.subsidiary_fields
    }

    /// Locator the adapter reads rows from at commit time.
    #[must_use]
    pub fn read_locator(&self) -> &str {
        &self.read_locator
    }

    /// Locator the adapter writes rows to at apply time.
    #[must_use]
    pub fn write_locator(&self) -> &str {
        &self.write_locator
    }

    /// Configured adapter name.
    #[must_use]
    pub fn adapter_name(&self) -> &str {
        &self.adapter
    }

    /// All column names, primary first, in schema order.
    #[must_use]
    pub fn columns(&self) -> Vec<String> {
        let mut columns = self.primary_fields.clone();
        columns.extend(self.subsidiary_fields.iter().cloned());
        columns
    }

    /// Check schema invariants and fill defaults.
    ///
    /// # Errors
    /// `[CONFIG]` when the id or primary set is empty, when a column is
    /// named in both the primary and subsidiary lists, or when a column
    /// name repeats.
    pub fn validate(&mut self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::Config("table with an empty id".to_owned()));
        }
        if self.primary_fields.is_empty() {
            return Err(Error::Config(format!(
                "table '{}' has no primary fields",
                self.id
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for column in self.primary_fields.iter().chain(&self.subsidiary_fields) {
            if !seen.insert(column.as_str()) {
                return Err(Error::Config(format!(
                    "table '{}' names column '{column}' twice",
                    self.id
                )));
            }
        }
        if self.write_locator.is_empty() {
            self.write_locator.clone_from(&self.read_locator);
        }
        Ok(())
    }

    fn snapshot_path(&self, work_dir: &Path) -> PathBuf {
        work_dir.join("snapshots").join(&self.id)
    }

    /// Read the current source rows through `adapter` into a state object.
    ///
    /// # Errors
    /// `[SCHEMA]` on a column-count mismatch or a duplicate primary key;
    /// `[ADAPTER]` when the read itself fails.
    pub fn load_new_state(&self, adapter: &dyn TableAdapter) -> Result<Value> {
        let expected = self.primary_fields.len() + self.subsidiary_fields.len();
        let mut state = Object::new();
        for (number, row) in adapter.read_state(self)?.into_iter().enumerate() {
            if row.len() != expected {
                return Err(Error::Schema(format!(
                    "table '{}': row {} has {} columns, schema has {expected}",
                    self.id,
                    number + 1,
                    row.len()
                )));
            }
            let key = csv::compose_record(&row[..self.primary_fields.len()]);
            let value = csv::compose_record(&row[self.primary_fields.len()..]);
            if state.insert(key.clone(), Value::String(value)).is_some() {
                return Err(Error::Schema(format!(
                    "table '{}': duplicate primary key '{}'",
                    self.id,
                    String::from_utf8_lossy(&key)
                )));
            }
        }
        Ok(Value::Object(state))
    }

    /// Load the previously committed snapshot; absent snapshot is an empty
    /// state.
    ///
    /// # Errors
    /// Parse or I/O failure reading an existing snapshot.
    pub fn load_old_state(&self, work_dir: &Path) -> Result<Value> {
        let path = self.snapshot_path(work_dir);
        let Some(bytes) = files::read_optional(&path)? else {
            debug!(table_id = %self.id, "no snapshot on disk, old state is empty");
            return Ok(Value::Object(Object::new()));
        };
        let state = leech_json::parse(&bytes)?;
        if state.as_object().is_none() {
            return Err(Error::Schema(format!(
                "snapshot of table '{}' is not an object",
                self.id
            )));
        }
        Ok(state)
    }

    /// Atomically replace the snapshot with `state`.
    ///
    /// # Errors
    /// I/O failure writing the snapshot.
    pub fn store_new_state(&self, work_dir: &Path, state: &Value) -> Result<()> {
        files::write_atomic(&self.snapshot_path(work_dir), &leech_json::compose(state))
    }

    /// Rebuild the full row behind a state entry: primary fields from `key`,
    /// subsidiary fields from `value`, in schema order.
    ///
    /// # Errors
    /// `[SCHEMA]` when either side does not decompose into the schema's
    /// field counts.
    pub fn row_from_entry(&self, key: &[u8], value: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut row = csv::parse_record(key)?;
        if row.len() != self.primary_fields.len() {
            return Err(Error::Schema(format!(
                "table '{}': key '{}' has {} fields, schema has {}",
                self.id,
                String::from_utf8_lossy(key),
                row.len(),
                self.primary_fields.len()
            )));
        }
        if self.subsidiary_fields.is_empty() {
            if !value.is_empty() {
                return Err(Error::Schema(format!(
                    "table '{}': non-empty value for a table without subsidiary fields",
                    self.id
                )));
            }
            return Ok(row);
        }
        let subsidiary = csv::parse_record(value)?;
        if subsidiary.len() != self.subsidiary_fields.len() {
            return Err(Error::Schema(format!(
                "table '{}': value '{}' has {} fields, schema has {}",
                self.id,
                String::from_utf8_lossy(value),
                subsidiary.len(),
                self.subsidiary_fields.len()
            )));
        }
        row.extend(subsidiary);
        Ok(row)
    }

    #[cfg(test)]
    pub(crate) fn for_tests(
        id: &str,
        primary: &[&str],
        subsidiary: &[&str],
        locator: &str,
    ) -> TableDef {
        let mut def = TableDef {
            id: id.to_owned(),
            primary_fields: primary.iter().map(|&f| f.to_owned()).collect(),
            subsidiary_fields: subsidiary.iter().map(|&f| f.to_owned()).collect(),
            read_locator: locator.to_owned(),
            write_locator: String::new(),
            adapter: "csv".to_owned(),
        };
        #[allow(clippy::unwrap_used)]
        def.validate().unwrap();
        def
    }
}
