// SPDX-License-Identifier: Apache-2.0
//! Filesystem helpers.
//!
//! Mutable pointer files (HEAD, lastseen, snapshots) are updated via
//! write-to-temp + rename so readers never observe a torn write. Absence is
//! part of the protocol for several files, so reads distinguish "not there"
//! from "failed".

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::{Error, Result};

/// Read a whole file; a missing file is `None`, any other failure an error.
pub(crate) fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(Error::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Atomically replace `path` with `bytes` (temp file + rename).
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let io_err = |source| Error::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);
    {
        let mut file = fs::File::create(&tmp).map_err(io_err)?;
        file.write_all(bytes).map_err(|source| Error::Io {
            path: tmp.clone(),
            source,
        })?;
        file.sync_all().map_err(|source| Error::Io {
            path: tmp.clone(),
            source,
        })?;
    }
    fs::rename(&tmp, path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Create `path` and its ancestors; existing directories are fine.
pub(crate) fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Remove a file.
pub(crate) fn remove_file(path: &Path) -> Result<()> {
    fs::remove_file(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ── 1. atomic write replaces content and leaves no temp file ─────────

    #[test]
    fn write_atomic_replaces_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pointer");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(read_optional(&path).unwrap(), Some(b"second".to_vec()));
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("pointer")]);
    }

    // ── 2. read_optional distinguishes absence from failure ──────────────

    #[test]
    fn read_optional_absence() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_optional(&dir.path().join("missing"))
            .unwrap()
            .is_none());
        let path = dir.path().join("present");
        write_atomic(&path, b"x").unwrap();
        assert_eq!(read_optional(&path).unwrap(), Some(b"x".to_vec()));
    }

    // ── 3. ensure_dir is idempotent ──────────────────────────────────────

    #[test]
    fn ensure_dir_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        ensure_dir(&nested).unwrap();
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }

    // ── 4. read_optional reports the path on a real failure ──────────────

    #[test]
    fn read_optional_error_carries_path() {
        let dir = tempfile::tempdir().unwrap();
        // A directory is readable as a path but not as a file, so this is a
        // failure rather than absence.
        let nested = dir.path().join("actually-a-dir");
        ensure_dir(&nested).unwrap();
        let err = read_optional(&nested).unwrap_err();
        assert!(err.to_string().contains("actually-a-dir"));
    }
}
