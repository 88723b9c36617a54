// SPDX-License-Identifier: MIT OR Apache-2.0
//! [`PackageCache`]: the per-module, two-table on-disk cache (§3, §4.5,
//! §6). A file-backed JSON document per table
//! (`state/package_cache/<module>.installed.json`,
//! `<module>.updates.json`), guarded by the per-kind locks in `pa-ledger`.

use pa_error::{ErrorCode, PaError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Marker value written for an installed-package key.
pub const INSTALLED_MARKER: &str = "1";
/// The special key holding the human-readable inventory listing.
pub const INVENTORY_KEY: &str = "<inventory>";

/// One logical table (`installed` or `updates`) of a module's cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    /// Maps the four key-variants to [`INSTALLED_MARKER`].
    Installed,
    /// Maps `"N<name>"` to a concatenated `"V<ver>A<arch>\n"` line list.
    Updates,
}

/// The four key granularities a single `(name, version, arch)` record is
/// written under in the `installed` table, per §3's invariant: "after a
/// successful update, *all four* key variants are written for each
/// installed package".
#[must_use]
pub fn installed_key_variants(name: &str, version: Option<&str>, arch: Option<&str>) -> Vec<String> {
    let mut keys = vec![format!("N{name}")];
    if let Some(v) = version {
        keys.push(format!("N{name}V{v}"));
    }
    if let Some(a) = arch {
        keys.push(format!("N{name}A{a}"));
    }
    if let (Some(v), Some(a)) = (version, arch) {
        keys.push(format!("N{name}V{v}A{a}"));
    }
    keys
}

/// File-backed two-table cache for one package module.
#[derive(Debug)]
pub struct PackageCache {
    installed_path: PathBuf,
    updates_path: PathBuf,
}

impl PackageCache {
    /// Opens the cache rooted at `workdir` for `module`.
    #[must_use]
    pub fn new(workdir: &Path, module: &str) -> Self {
        let dir = workdir.join("state").join("package_cache");
        Self {
            installed_path: dir.join(format!("{module}.installed.json")),
            updates_path: dir.join(format!("{module}.updates.json")),
        }
    }

    fn path(&self, table: Table) -> &Path {
        match table {
            Table::Installed => &self.installed_path,
            Table::Updates => &self.updates_path,
        }
    }

    /// True if the `installed` database file exists — a missing file forces
    /// a cache update regardless of the lock state (§4.5, scenario 7).
    #[must_use]
    pub fn installed_database_exists(&self) -> bool {
        self.installed_path.exists()
    }

    fn load(&self, table: Table) -> Result<BTreeMap<String, String>, PaError> {
        let path = self.path(table);
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(io_err(path, e)),
        };
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&contents).map_err(|e| {
            PaError::new(ErrorCode::IoCacheUnavailable, format!("malformed cache table: {e}")).with_context("path", path.display().to_string())
        })
    }

    fn save(&self, table: Table, map: &BTreeMap<String, String>) -> Result<(), PaError> {
        let path = self.path(table);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_err(path, e))?;
        }
        let json = serde_json::to_string_pretty(map).expect("BTreeMap<String, String> always serializes");
        std::fs::write(path, json).map_err(|e| io_err(path, e))
    }

    /// Probes the cache for a package key. `version = None` ("latest") acts
    /// as a wildcard, probed as a NULL version (the `N<name>[A<arch>]`
    /// variant rather than the versioned one).
    pub fn is_present(&self, table: Table, name: &str, version: Option<&str>, arch: Option<&str>) -> Result<bool, PaError> {
        let map = self.load(table)?;
        let key = match (version, arch) {
            (Some(v), Some(a)) => format!("N{name}V{v}A{a}"),
            (Some(v), None) => format!("N{name}V{v}"),
            (None, Some(a)) => format!("N{name}A{a}"),
            (None, None) => format!("N{name}"),
        };
        Ok(map.contains_key(&key))
    }

    /// Reads the parsed `updates` entries for `name`: each `V<ver>A<arch>`
    /// line in the concatenated value.
    pub fn updates_for(&self, name: &str) -> Result<Vec<(String, String)>, PaError> {
        let map = self.load(Table::Updates)?;
        let Some(value) = map.get(&format!("N{name}")) else {
            return Ok(Vec::new());
        };
        Ok(value
            .lines()
            .filter_map(|line| {
                let rest = line.strip_prefix('V')?;
                let (version, arch) = rest.split_once('A')?;
                Some((version.to_string(), arch.to_string()))
            })
            .collect())
    }

    /// Replaces the whole `installed` table: clears it, then writes all
    /// four key variants for each record plus the `<inventory>` listing
    /// (§4.5's cache-update rule). Records missing `version` or `arch` are
    /// discarded by the caller before reaching this method.
    pub fn replace_installed(&self, records: &[(String, String, String)]) -> Result<(), PaError> {
        let mut map = BTreeMap::new();
        let mut inventory = Vec::new();
        for (name, version, arch) in records {
            for key in installed_key_variants(name, Some(version), Some(arch)) {
                map.insert(key, INSTALLED_MARKER.to_string());
            }
            inventory.push(format!("{name} {version} {arch}"));
        }
        map.insert(INVENTORY_KEY.to_string(), inventory.join(","));
        self.save(Table::Installed, &map)
    }

    /// Replaces the whole `updates` table: one `N<name>` key per package,
    /// value a concatenation of `"V<ver>A<arch>\n"` lines.
    pub fn replace_updates(&self, records: &[(String, Vec<(String, String)>)]) -> Result<(), PaError> {
        let mut map = BTreeMap::new();
        for (name, versions) in records {
            let value: String = versions.iter().map(|(v, a)| format!("V{v}A{a}\n")).collect();
            map.insert(format!("N{name}"), value);
        }
        self.save(Table::Updates, &map)
    }

    /// Marks a single package present in the `installed` table (used after
    /// a verified install, without re-running a full cache update).
    pub fn mark_installed(&self, name: &str, version: &str, arch: &str) -> Result<(), PaError> {
        let mut map = self.load(Table::Installed)?;
        for key in installed_key_variants(name, Some(version), Some(arch)) {
            map.insert(key, INSTALLED_MARKER.to_string());
        }
        self.save(Table::Installed, &map)
    }

    /// Removes a package from the `installed` table (used after a verified
    /// removal).
    pub fn mark_removed(&self, name: &str, version: Option<&str>, arch: Option<&str>) -> Result<(), PaError> {
        let mut map = self.load(Table::Installed)?;
        for key in installed_key_variants(name, version, arch) {
            map.remove(&key);
        }
        map.remove(&format!("N{name}"));
        self.save(Table::Installed, &map)
    }
}

fn io_err(path: &Path, e: std::io::Error) -> PaError {
    PaError::new(ErrorCode::IoCacheUnavailable, e.to_string()).with_context("path", path.display().to_string())
}
