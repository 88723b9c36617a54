// SPDX-License-Identifier: MIT OR Apache-2.0
//! File-backed store for classes that must outlive a single agent run
//! (`put_persistent_class`, §4.3), matching the "small embedded key/value
//! store abstraction" guidance in the design notes without a database engine.

use fs2::FileExt;
use pa_error::{ErrorCode, PaError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// What happens to a persistent class entry once its expiry passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PersistencePolicy {
    /// The class is cleared and must be re-asserted.
    Reset,
    /// The class is kept defined even past expiry until explicitly cleared.
    Preserve,
}

/// A single persistent class entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistentClassEntry {
    /// Unix-epoch seconds after which the entry is considered expired.
    pub expires_unix_seconds: i64,
    /// What to do with the class once expired.
    pub policy: PersistencePolicy,
}

/// File-backed `class_name -> PersistentClassEntry` map, one document per
/// working directory under `state/persistent_classes.json`.
#[derive(Debug)]
pub struct PersistentClassStore {
    path: PathBuf,
}

impl PersistentClassStore {
    /// Opens (without yet reading) the store rooted at `workdir`.
    #[must_use]
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            path: workdir.into().join("state").join("persistent_classes.json"),
        }
    }

    fn lock_and_load(&self) -> Result<(File, BTreeMap<String, PersistentClassEntry>), PaError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(&self.path, e))?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| io_err(&self.path, e))?;
        file.lock_exclusive().map_err(|e| io_err(&self.path, e))?;

        let contents = fs::read_to_string(&self.path).map_err(|e| io_err(&self.path, e))?;
        let map = if contents.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(&contents).map_err(|e| {
                PaError::new(ErrorCode::IoCacheUnavailable, format!("malformed persistent class store: {e}"))
                    .with_context("path", self.path.display().to_string())
            })?
        };
        Ok((file, map))
    }

    fn save(&self, file: &File, map: &BTreeMap<String, PersistentClassEntry>) -> Result<(), PaError> {
        let json = serde_json::to_string_pretty(map).expect("BTreeMap<String, PersistentClassEntry> always serializes");
        fs::write(&self.path, json).map_err(|e| io_err(&self.path, e))?;
        file.unlock().ok();
        Ok(())
    }

    /// Inserts or replaces a persistent class entry.
    pub fn put(&self, name: &str, expires_unix_seconds: i64, policy: PersistencePolicy) -> Result<(), PaError> {
        let (file, mut map) = self.lock_and_load()?;
        map.insert(
            name.to_string(),
            PersistentClassEntry {
                expires_unix_seconds,
                policy,
            },
        );
        self.save(&file, &map)
    }

    /// Loads every still-valid entry, deleting expired `RESET` entries as a
    /// side effect (per §6: "entries with `now > expires` are deleted on
    /// scan"). `PRESERVE` entries past expiry are kept (they are reported as
    /// still defined) until explicitly removed.
    pub fn scan(&self, now_unix_seconds: i64) -> Result<BTreeMap<String, PersistentClassEntry>, PaError> {
        let (file, mut map) = self.lock_and_load()?;
        let before = map.len();
        map.retain(|_, entry| entry.policy == PersistencePolicy::Preserve || entry.expires_unix_seconds >= now_unix_seconds);
        if map.len() != before {
            self.save(&file, &map)?;
        } else {
            file.unlock().ok();
        }
        Ok(map)
    }

    /// Removes an entry regardless of expiry.
    pub fn remove(&self, name: &str) -> Result<(), PaError> {
        let (file, mut map) = self.lock_and_load()?;
        map.remove(name);
        self.save(&file, &map)
    }

    /// The document path, for diagnostics.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn io_err(path: &Path, e: std::io::Error) -> PaError {
    PaError::new(ErrorCode::IoCacheUnavailable, e.to_string()).with_context("path", path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_scan_returns_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentClassStore::new(dir.path());
        store.put("my_class", 2_000_000_000, PersistencePolicy::Reset).unwrap();
        let entries = store.scan(1_000_000_000).unwrap();
        assert!(entries.contains_key("my_class"));
    }

    #[test]
    fn expired_reset_entry_is_deleted_on_scan() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentClassStore::new(dir.path());
        store.put("stale", 1, PersistencePolicy::Reset).unwrap();
        let entries = store.scan(1_000_000_000).unwrap();
        assert!(!entries.contains_key("stale"));
        let entries_again = store.scan(1_000_000_000).unwrap();
        assert!(entries_again.is_empty());
    }

    #[test]
    fn expired_preserve_entry_survives_scan() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentClassStore::new(dir.path());
        store.put("sticky", 1, PersistencePolicy::Preserve).unwrap();
        let entries = store.scan(1_000_000_000).unwrap();
        assert!(entries.contains_key("sticky"));
    }
}
