// SPDX-License-Identifier: Apache-2.0
//! Per-table deltas: typed insert/delete/update sets and their fold rules.
//!
//! A delta is computed from two snapshots of one table with three set
//! operations:
//!
//! - `inserts` — keys present in the new state only, carrying the new value;
//! - `deletes` — keys present in the old state only, carrying the old value;
//! - `updates` — keys present in both with differing values, carrying the
//!   new one.
//!
//! The three key sets are pairwise disjoint by construction, and folding two
//! consecutive deltas preserves that invariant. Folding is what collapses a
//! span of chain blocks into a single equivalent one: applying the folded
//! delta must have the same observable effect as applying the parent delta
//! and then the child delta.

use leech_json::{Object, Value};

use crate::error::{Error, Result};

/// How a delta was produced; carried on the wire as its `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaKind {
    /// Difference between two consecutive snapshots.
    Delta,
    /// Full state at commit time against an empty old state.
    Snapshot,
    /// Full state replayed from the persisted snapshot.
    Rebase,
}

impl DeltaKind {
    /// The wire form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DeltaKind::Delta => "delta",
            DeltaKind::Snapshot => "snapshot",
            DeltaKind::Rebase => "rebase",
        }
    }

    /// Parse the wire form.
    ///
    /// # Errors
    /// `[SCHEMA]` for anything but the three known kinds.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        match bytes {
            b"delta" => Ok(DeltaKind::Delta),
            b"snapshot" => Ok(DeltaKind::Snapshot),
            b"rebase" => Ok(DeltaKind::Rebase),
            other => Err(Error::Schema(format!(
                "unknown delta type '{}'",
                String::from_utf8_lossy(other)
            ))),
        }
    }
}

/// The set of row operations one block carries for one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Delta {
    table_id: String,
    kind: DeltaKind,
    inserts: Object,
    deletes: Object,
    updates: Object,
}

impl Delta {
    /// Compute the delta between two state objects.
    ///
    /// For `Snapshot` and `Rebase` kinds the caller passes an empty old
    /// state, so the whole new state surfaces as inserts.
    ///
    /// # Errors
    /// `[SCHEMA]` when either state is not a JSON object.
    pub fn compute(
        table_id: &str,
        kind: DeltaKind,
        new_state: &Value,
        old_state: &Value,
    ) -> Result<Delta> {
        let new_state = state_object(table_id, new_state)?;
        let old_state = state_object(table_id, old_state)?;
        Ok(Delta {
            table_id: table_id.to_owned(),
            kind,
            inserts: new_state.keys_set_minus(old_state),
            deletes: old_state.keys_set_minus(new_state),
            updates: new_state.keys_intersect_values_set_minus(old_state),
        })
    }

    /// Table this delta belongs to.
    #[must_use]
    pub fn table_id(&self) -> &str {
        &self.table_id
    }

    /// How this delta was produced.
    #[must_use]
    pub fn kind(&self) -> DeltaKind {
        self.kind
    }

    /// Rows present only in the new state (key → new value).
    #[must_use]
    pub fn inserts(&self) -> &Object {
        &self.inserts
    }

    /// Rows present only in the old state (key → old value).
    #[must_use]
    pub fn deletes(&self) -> &Object {
        &self.deletes
    }

    /// Rows present in both states with changed values (key → new value).
    #[must_use]
    pub fn updates(&self) -> &Object {
        &self.updates
    }

    /// Number of insert operations.
    #[must_use]
    pub fn num_inserts(&self) -> usize {
        self.inserts.len()
    }

    /// Number of delete operations.
    #[must_use]
    pub fn num_deletes(&self) -> usize {
        self.deletes.len()
    }

    /// Number of update operations.
    #[must_use]
    pub fn num_updates(&self) -> usize {
        self.updates.len()
    }

    /// Returns `true` when the delta carries no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.deletes.is_empty() && self.updates.is_empty()
    }

    /// Fold `parent` into this delta, in place.
    ///
    /// `parent` is the chronologically earlier delta; after the fold, this
    /// delta is equivalent to applying `parent` first and itself second, and
    /// the caller discards `parent`. The folded delta keeps this delta's
    /// kind.
    ///
    /// # Errors
    /// `[CHAIN_INTEGRITY]` on any op pairing that cannot occur on a healthy
    /// chain: insert over an existing row, update or delete of a row that
    /// the parent already deleted, insert of a row the parent still holds.
    pub fn fold_parent(&mut self, parent: &Delta) -> Result<()> {
        if parent.table_id != self.table_id {
            return Err(Error::Integrity(format!(
                "cannot fold delta of table '{}' into table '{}'",
                parent.table_id, self.table_id
            )));
        }

        for (key, value) in parent.inserts.iter() {
            if self.inserts.contains_key(key) {
                return Err(merge_conflict(&self.table_id, "insert", "insert", key));
            }
            if let Some(updated) = self.updates.remove(key) {
                // insert then update: still an insert, with the newer value.
                self.inserts.insert(key.to_vec(), updated);
            } else if self.deletes.contains_key(key) {
                // insert then delete: the row never existed.
                self.deletes.remove(key);
            } else {
                self.inserts.insert(key.to_vec(), value.clone());
            }
        }

        for (key, value) in parent.updates.iter() {
            if self.inserts.contains_key(key) {
                return Err(merge_conflict(&self.table_id, "update", "insert", key));
            }
            if self.updates.contains_key(key) {
                // update then update: the newer value already won.
            } else if self.deletes.contains_key(key) {
                // update then delete: deletion stands, carrying the value the
                // parent recorded.
                self.deletes.insert(key.to_vec(), value.clone());
            } else {
                self.updates.insert(key.to_vec(), value.clone());
            }
        }

        for (key, value) in parent.deletes.iter() {
            if let Some(inserted) = self.inserts.remove(key) {
                // delete then insert: an update whose effective old value is
                // the one the parent deleted.
                self.updates.insert(key.to_vec(), inserted);
            } else if self.updates.contains_key(key) {
                return Err(merge_conflict(&self.table_id, "delete", "update", key));
            } else if self.deletes.contains_key(key) {
                return Err(merge_conflict(&self.table_id, "delete", "delete", key));
            } else {
                self.deletes.insert(key.to_vec(), value.clone());
            }
        }

        Ok(())
    }

    /// Canonical wire form: `{"id", "type", "inserts", "deletes", "updates"}`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut object = Object::new();
        object.insert(b"id".to_vec(), Value::from(self.table_id.as_str()));
        object.insert(b"type".to_vec(), Value::from(self.kind.as_str()));
        object.insert(b"inserts".to_vec(), Value::Object(self.inserts.clone()));
        object.insert(b"deletes".to_vec(), Value::Object(self.deletes.clone()));
        object.insert(b"updates".to_vec(), Value::Object(self.updates.clone()));
        Value::Object(object)
    }

    /// Parse and validate the wire form.
    ///
    /// # Errors
    /// `[SCHEMA]` on a missing or mistyped field, an unknown field, or an
    /// operation value that is not a string.
    pub fn from_value(value: Value) -> Result<Delta> {
        let mut object = value.into_object().map_err(|other| {
            Error::Schema(format!("delta must be an object, found {}", other.type_name()))
        })?;

        let table_id = match object.remove(b"id") {
            Some(Value::String(bytes)) => String::from_utf8(bytes)
                .map_err(|_| Error::Schema("delta id is not UTF-8".to_owned()))?,
            _ => return Err(Error::Schema("delta without a string 'id'".to_owned())),
        };
        let kind = match object.remove(b"type") {
            Some(Value::String(bytes)) => DeltaKind::parse(&bytes)?,
            _ => {
                return Err(Error::Schema(format!(
                    "delta for table '{table_id}' without a string 'type'"
                )))
            }
        };
        let inserts = operations(&mut object, &table_id, "inserts")?;
        let deletes = operations(&mut object, &table_id, "deletes")?;
        let updates = operations(&mut object, &table_id, "updates")?;
        if let Some((key, _)) = object.iter().next() {
            return Err(Error::Schema(format!(
                "delta for table '{table_id}' carries unknown field '{}'",
                String::from_utf8_lossy(key)
            )));
        }
        Ok(Delta {
            table_id,
            kind,
            inserts,
            deletes,
            updates,
        })
    }
}

fn state_object<'a>(table_id: &str, state: &'a Value) -> Result<&'a Object> {
    state.as_object().ok_or_else(|| {
        Error::Schema(format!(
            "state of table '{table_id}' must be an object, found {}",
            state.type_name()
        ))
    })
}

fn merge_conflict(table_id: &str, parent_op: &str, child_op: &str, key: &[u8]) -> Error {
    Error::Integrity(format!(
        "table '{table_id}': cannot fold {parent_op} followed by {child_op} for key '{}'",
        String::from_utf8_lossy(key)
    ))
}

fn operations(object: &mut Object, table_id: &str, field: &str) -> Result<Object> {
    let Some(value) = object.remove(field.as_bytes()) else {
        return Err(Error::Schema(format!(
            "delta for table '{table_id}' without '{field}'"
        )));
    };
    let operations = value.into_object().map_err(|other| {
        Error::Schema(format!(
            "delta field '{field}' of table '{table_id}' must be an object, found {}",
            other.type_name()
        ))
    })?;
    for (key, value) in operations.iter() {
        if value.as_bytes().is_none() {
            return Err(Error::Schema(format!(
                "table '{table_id}' {field} entry '{}' is not a string",
                String::from_utf8_lossy(key)
            )));
        }
    }
    Ok(operations)
}
