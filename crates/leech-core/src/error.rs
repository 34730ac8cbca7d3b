// SPDX-License-Identifier: Apache-2.0
//! Crate-wide error type.
//!
//! Every fallible operation in the core returns [`Result`]; nothing panics.
//! Variants group the failure kinds by consequence: format errors abort the
//! operation, integrity errors abort without touching state beyond what
//! earlier blocks already committed, adapter errors roll back the open
//! transaction, and I/O errors propagate with the offending path attached.

use std::path::PathBuf;

use crate::adapter::AdapterError;
use crate::csv::CsvError;

/// Errors surfaced by the leech core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// CSV parse failure (format error; position-carrying).
    #[error(transparent)]
    Csv(#[from] CsvError),

    /// JSON parse failure (format error; offset-carrying).
    #[error(transparent)]
    Json(#[from] leech_json::ParseError),

    /// Malformed configuration file or invalid table definition.
    #[error("[CONFIG] {0}")]
    Config(String),

    /// Structural violation in loaded data: column-count mismatch, duplicate
    /// primary key, malformed delta/block/patch shape.
    #[error("[SCHEMA] {0}")]
    Schema(String),

    /// Patch produced by an incompatible version.
    #[error("[PATCH_VERSION] unsupported patch version {found} (supported {supported})")]
    Version {
        /// Version carried by the incoming patch.
        found: u64,
        /// Version this consumer speaks.
        supported: u64,
    },

    /// Chain corruption: block id mismatch, missing parent, merge rule
    /// violation.
    #[error("[CHAIN_INTEGRITY] {0}")]
    Integrity(String),

    /// Filesystem failure with the path that produced it.
    #[error("[IO] {path}: {source}")]
    Io {
        /// Path of the failing read/write.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A table adapter reported a failure; the surrounding transaction was
    /// rolled back.
    #[error("[ADAPTER] {0}")]
    Adapter(#[from] AdapterError),
}

/// Result alias used across the crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;
