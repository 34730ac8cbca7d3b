// SPDX-License-Identifier: Apache-2.0
//! Instance configuration.
//!
//! An instance is a working directory plus the tables configured in
//! `<work_dir>/leech.json`:
//!
//! ```json
//! {
//!   "pretty_print": false,
//!   "preferred_chain_length": 256,
//!   "auto_purge": false,
//!   "tables": [
//!     {
//!       "id": "beatles",
//!       "primary_fields": ["firstname", "lastname"],
//!       "subsidiary_fields": ["born"],
//!       "read_locator": "beatles.csv",
//!       "write_locator": "beatles.csv",
//!       "adapter": "csv"
//!     }
//!   ]
//! }
//! ```
//!
//! `tables` is an array because configuration order is execution order:
//! commit walks the tables in the order they are listed. Loading an
//! instance also bootstraps the on-disk layout (`blocks/`, `snapshots/`,
//! `lastseen/`), which is idempotent.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::adapter;
use crate::chain;
use crate::error::{Error, Result};
use crate::files;
use crate::table::TableDef;

const CONFIG_FILE: &str = "leech.json";
const DEFAULT_CHAIN_LENGTH: usize = 256;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    pretty_print: bool,
    #[serde(default = "default_chain_length")]
    preferred_chain_length: usize,
    #[serde(default)]
    auto_purge: bool,
    tables: Vec<TableDef>,
}

fn default_chain_length() -> usize {
    DEFAULT_CHAIN_LENGTH
}

/// A loaded and validated instance.
#[derive(Debug)]
pub struct Instance {
    work_dir: PathBuf,
    pretty_print: bool,
    preferred_chain_length: usize,
    auto_purge: bool,
    tables: Vec<TableDef>,
}

impl Instance {
    /// Load `<work_dir>/leech.json`, validate it, and bootstrap the
    /// directory layout.
    ///
    /// # Errors
    /// `[CONFIG]` for a missing or malformed configuration, duplicate table
    /// ids, broken table schemas, or an unknown adapter name; I/O errors
    /// creating the layout.
    pub fn load(work_dir: &Path) -> Result<Instance> {
        let path = work_dir.join(CONFIG_FILE);
        let bytes = files::read_optional(&path)?.ok_or_else(|| {
            Error::Config(format!("no configuration at {}", path.display()))
        })?;
        let config: ConfigFile = serde_json::from_slice(&bytes)
            .map_err(|err| Error::Config(format!("{}: {err}", path.display())))?;

        let mut tables = config.tables;
        let mut seen = std::collections::HashSet::new();
        for table in &mut tables {
            table.validate()?;
            if !seen.insert(table.id().to_owned()) {
                return Err(Error::Config(format!(
                    "table id '{}' is configured twice",
                    table.id()
                )));
            }
            if !adapter::is_known(table.adapter_name()) {
                return Err(Error::Config(format!(
                    "table '{}' names unknown adapter '{}'",
                    table.id(),
                    table.adapter_name()
                )));
            }
        }

        chain::bootstrap(work_dir)?;
        Ok(Instance {
            work_dir: work_dir.to_path_buf(),
            pretty_print: config.pretty_print,
            preferred_chain_length: config.preferred_chain_length,
            auto_purge: config.auto_purge,
            tables,
        })
    }

    /// The working directory this instance owns.
    #[must_use]
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Whether blocks and emitted patches are rendered human-readable.
    #[must_use]
    pub fn pretty_print(&self) -> bool {
        self.pretty_print
    }

    /// Retention depth used by the purge pass.
    #[must_use]
    pub fn preferred_chain_length(&self) -> usize {
        self.preferred_chain_length
    }

    /// Whether a purge pass runs after each successful commit.
    #[must_use]
    pub fn auto_purge(&self) -> bool {
        self.auto_purge
    }

    /// Configured tables, in configuration (= execution) order.
    #[must_use]
    pub fn tables(&self) -> &[TableDef] {
        &self.tables
    }

    /// Look up a configured table by id.
    #[must_use]
    pub fn table(&self, table_id: &str) -> Option<&TableDef> {
        self.tables.iter().find(|table| table.id() == table_id)
    }
}
