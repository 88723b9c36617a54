// SPDX-License-Identifier: MIT OR Apache-2.0
//! The present/absent per-promise convergence algorithms (§4.5).

use crate::cache::{PackageCache, Table};
use crate::info::{PackageInfo, PackageType};
use crate::wrapper::{PackageModuleWrapper, TimeoutConfig};
use pa_error::{CancelToken, ErrorCode, PaError};
use pa_ledger::Outcome;

/// The policy-level request a `packages` promise makes about one package.
#[derive(Debug, Clone)]
pub struct PackageRequest {
    /// The promiser: the package name.
    pub name: String,
    /// Requested version, or `None`/`"latest"` for the latest available.
    pub version: Option<String>,
    /// Requested architecture.
    pub arch: Option<String>,
    /// Whether this is a dry-run / warn-only promise (§4.5 step 5).
    pub warn_only: bool,
}

impl PackageRequest {
    fn is_latest(&self) -> bool {
        matches!(self.version.as_deref(), None | Some("latest"))
    }
}

/// Runs the `present` action for one package promise against `wrapper` and
/// `cache` (§4.5).
pub async fn present(
    wrapper: &PackageModuleWrapper,
    cache: &PackageCache,
    request: &PackageRequest,
    timeouts: TimeoutConfig,
    cancel: &CancelToken,
) -> Result<Outcome, PaError> {
    let data_lines = vec![format!("Name={}", request.name)];
    let response = wrapper.invoke("get-package-data", &data_lines, timeouts, cancel).await?;
    let records = crate::wrapper::group_into_records(&response);
    let fields = records.into_iter().next().ok_or_else(|| {
        PaError::new(ErrorCode::ProtocolMalformedResponse, "get-package-data returned no record")
            .with_context("module", wrapper.name())
    })?;
    let mut info = PackageInfo::from_fields(&fields).map_err(|_| {
        PaError::new(ErrorCode::ProtocolMalformedResponse, "get-package-data response missing name or type")
            .with_context("module", wrapper.name())
    })?;

    if info.package_type == PackageType::File && request.is_latest() {
        return Err(PaError::new(ErrorCode::ValidationTypeMismatch, "'latest' is not supported for FILE packages")
            .with_context("name", &request.name));
    }
    if info.package_type == PackageType::File
        && (info.version.as_deref() != request.version.as_deref() || info.arch.as_deref() != request.arch.as_deref())
    {
        return Ok(Outcome::Fail);
    }

    info.backfill(request.version.as_deref(), request.arch.as_deref());

    if request.warn_only {
        return Ok(Outcome::NotKeptWarn);
    }

    match info.package_type {
        PackageType::File => present_file(wrapper, cache, request, &info, timeouts, cancel).await,
        PackageType::Repo => present_repo(wrapper, cache, request, &info, timeouts, cancel).await,
    }
}

async fn present_file(
    wrapper: &PackageModuleWrapper,
    cache: &PackageCache,
    request: &PackageRequest,
    info: &PackageInfo,
    timeouts: TimeoutConfig,
    cancel: &CancelToken,
) -> Result<Outcome, PaError> {
    let cached = cache.is_present(Table::Installed, &request.name, info.version.as_deref(), info.arch.as_deref())?;
    if cached {
        return Ok(Outcome::Kept);
    }
    let install_lines = vec![format!("File={}", request.name)];
    wrapper.invoke("file-install", &install_lines, timeouts, cancel).await?;
    verify_install(cache, &request.name, info)
}

async fn present_repo(
    wrapper: &PackageModuleWrapper,
    cache: &PackageCache,
    request: &PackageRequest,
    info: &PackageInfo,
    timeouts: TimeoutConfig,
    cancel: &CancelToken,
) -> Result<Outcome, PaError> {
    let cached = cache.is_present(Table::Installed, &request.name, info.version.as_deref(), info.arch.as_deref())?;

    if !cached {
        let mut lines = vec![format!("Name={}", request.name)];
        if let Some(v) = &info.version {
            lines.push(format!("Version={v}"));
        }
        if let Some(a) = &info.arch {
            lines.push(format!("Architecture={a}"));
        }
        wrapper.invoke("repo-install", &lines, timeouts, cancel).await?;
        return verify_install(cache, &request.name, info);
    }

    if !request.is_latest() {
        return Ok(Outcome::Kept);
    }

    // Already installed and "latest" requested: check the updates cache.
    let updates = cache.updates_for(&request.name)?;
    if updates.is_empty() {
        return Ok(Outcome::Noop);
    }
    let installed: Vec<(String, String)> = updates
        .iter()
        .filter(|(v, a)| !cache.is_present(Table::Installed, &request.name, Some(v), Some(a)).unwrap_or(false))
        .cloned()
        .collect();
    if installed.is_empty() {
        return Ok(Outcome::Noop);
    }

    // Batch every not-yet-installed arch/version into one multi-record
    // repo-install request (§4.5, scenario 5) so that a package requested in
    // more than one architecture is applied atomically.
    let mut lines = Vec::new();
    for (version, arch) in &installed {
        lines.push(format!("Name={}", request.name));
        lines.push(format!("Version={version}"));
        lines.push(format!("Architecture={arch}"));
    }
    wrapper.invoke("repo-install", &lines, timeouts, cancel).await?;

    let mut all_verified = true;
    for (version, arch) in &installed {
        cache.mark_installed(&request.name, version, arch)?;
        let present = cache.is_present(Table::Installed, &request.name, Some(version), Some(arch))?;
        if !present {
            all_verified = false;
        }
    }
    Ok(if all_verified { Outcome::Repaired } else { Outcome::Fail })
}

fn verify_install(cache: &PackageCache, name: &str, info: &PackageInfo) -> Result<Outcome, PaError> {
    if let (Some(version), Some(arch)) = (&info.version, &info.arch) {
        cache.mark_installed(name, version, arch)?;
        let present = cache.is_present(Table::Installed, name, Some(version), Some(arch))?;
        return Ok(if present { Outcome::Repaired } else { Outcome::Fail });
    }
    Ok(Outcome::Fail)
}

/// Runs the `absent` action for one package promise (§4.5).
pub async fn absent(
    wrapper: &PackageModuleWrapper,
    cache: &PackageCache,
    request: &PackageRequest,
    timeouts: TimeoutConfig,
    cancel: &CancelToken,
) -> Result<Outcome, PaError> {
    if request.is_latest() {
        return Err(
            PaError::new(ErrorCode::ValidationTypeMismatch, "'latest' is not supported for package removal")
                .with_context("name", &request.name),
        );
    }
    let cached = cache.is_present(Table::Installed, &request.name, request.version.as_deref(), request.arch.as_deref())?;
    if !cached {
        return Ok(Outcome::Noop);
    }

    let mut lines = vec![format!("Name={}", request.name)];
    if let Some(v) = &request.version {
        lines.push(format!("Version={v}"));
    }
    if let Some(a) = &request.arch {
        lines.push(format!("Architecture={a}"));
    }
    wrapper.invoke("remove", &lines, timeouts, cancel).await?;

    cache.mark_removed(&request.name, request.version.as_deref(), request.arch.as_deref())?;
    let still_present = cache.is_present(Table::Installed, &request.name, request.version.as_deref(), request.arch.as_deref())?;
    Ok(if still_present { Outcome::Fail } else { Outcome::Change })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_latest_treats_none_and_literal_as_wildcard() {
        let req = PackageRequest {
            name: "bash".to_string(),
            version: None,
            arch: None,
            warn_only: false,
        };
        assert!(req.is_latest());
        let req_literal = PackageRequest {
            version: Some("latest".to_string()),
            ..req
        };
        assert!(req_literal.is_latest());
    }

    #[test]
    fn verify_install_fails_without_version_and_arch() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(dir.path(), "apt");
        let info = PackageInfo {
            name: "bash".to_string(),
            version: None,
            arch: None,
            package_type: PackageType::Repo,
        };
        let outcome = verify_install(&cache, "bash", &info).unwrap();
        assert_eq!(outcome, Outcome::Fail);
    }

    #[test]
    fn verify_install_reports_repaired_when_cache_confirms() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(dir.path(), "apt");
        let info = PackageInfo {
            name: "bash".to_string(),
            version: Some("5.2".to_string()),
            arch: Some("x86_64".to_string()),
            package_type: PackageType::Repo,
        };
        let outcome = verify_install(&cache, "bash", &info).unwrap();
        assert_eq!(outcome, Outcome::Repaired);
    }
}
