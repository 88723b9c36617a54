// SPDX-License-Identifier: MIT OR Apache-2.0
//! [`PackageInfo`] and the request/response line protocol's key-value
//! vocabulary (§3, §4.5).

use std::collections::BTreeMap;

/// Whether a package is installed from a local file or a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageType {
    /// Installed from a local file (`File=<path>`).
    File,
    /// Installed from a configured repository (`Name=<pkg>`).
    Repo,
}

impl PackageType {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "file" => Some(Self::File),
            "repo" => Some(Self::Repo),
            _ => None,
        }
    }
}

/// `(name, version, arch, type)`. Freshly parsed from a wrapper response may
/// omit `version`/`arch` (backfilled from policy later) but must have `name`
/// and `type` (§3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    /// Package name. Never empty.
    pub name: String,
    /// Package version, if known.
    pub version: Option<String>,
    /// Package architecture, if known.
    pub arch: Option<String>,
    /// FILE or REPO.
    pub package_type: PackageType,
}

/// Error parsing a single `key=value` response block into a [`PackageInfo`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageInfoError {
    /// The response had no `Name=` line.
    MissingName,
    /// The response had no `PackageType=` line, or it wasn't `file`/`repo`.
    MissingOrInvalidType,
}

impl PackageInfo {
    /// Parses one record's worth of already-grouped `key=value` pairs (see
    /// [`crate::wrapper::parse_records`] for how a raw stdout blob is split
    /// into records).
    pub fn from_fields(fields: &BTreeMap<String, String>) -> Result<Self, PackageInfoError> {
        let name = fields.get("Name").filter(|s| !s.is_empty()).ok_or(PackageInfoError::MissingName)?;
        let package_type = fields
            .get("PackageType")
            .and_then(|s| PackageType::parse(s))
            .ok_or(PackageInfoError::MissingOrInvalidType)?;
        Ok(Self {
            name: name.clone(),
            version: fields.get("Version").cloned(),
            arch: fields.get("Architecture").cloned(),
            package_type,
        })
    }

    /// Fills in `version`/`arch` from the policy's requested values when the
    /// wrapper response omitted them (§4.5 step 2).
    pub fn backfill(&mut self, policy_version: Option<&str>, policy_arch: Option<&str>) {
        if self.version.is_none() {
            self.version = policy_version.map(str::to_string);
        }
        if self.arch.is_none() {
            self.arch = policy_arch.map(str::to_string);
        }
    }
}
