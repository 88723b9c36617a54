// SPDX-License-Identifier: MIT OR Apache-2.0
//! Whole-table cache refresh (§4.5 "Cache update"): acquires the per-kind
//! lock, dispatches `list-installed` / `list-updates` / `list-updates-local`
//! to the wrapper, discards incomplete records, and replaces the affected
//! table — plus the `<inventory>` listing for the `installed` table.

use crate::cache::PackageCache;
use crate::wrapper::{group_into_records, PackageModuleWrapper, TimeoutConfig};
use pa_error::{CancelToken, PaError};
use pa_ledger::{cache_lock_name, CacheKind, Lock, LockPolicy};
use std::path::Path;

/// Which `list-updates` variant to invoke when refreshing the `updates`
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatesSource {
    /// `list-updates`: consult the module's remote update source.
    Remote,
    /// `list-updates-local`: consult only locally cached update metadata.
    Local,
}

/// What a refresh call actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The lock was acquired (or bypassed) and the table was rewritten.
    Updated,
    /// The per-kind lock was younger than its `ifelapsed` window; the table
    /// was left untouched.
    SkippedTooSoon,
}

/// Refreshes the `installed` table by calling `list-installed`. A missing
/// database file forces the refresh regardless of the lock's `ifelapsed`
/// state (§4.5, scenario 7); `force` does the same unconditionally.
pub async fn refresh_installed_cache(
    workdir: &Path,
    wrapper: &PackageModuleWrapper,
    cache: &PackageCache,
    acquirer: &str,
    now_unix: i64,
    policy: LockPolicy,
    force: bool,
    timeouts: TimeoutConfig,
    cancel: &CancelToken,
) -> Result<RefreshOutcome, PaError> {
    let lock_name = cache_lock_name(CacheKind::Installed, wrapper.name());
    let forced = force || !cache.installed_database_exists();

    let Some(lock) = acquire(workdir, &lock_name, acquirer, now_unix, policy, forced, None, true)? else {
        return Ok(RefreshOutcome::SkippedTooSoon);
    };

    let response = wrapper.invoke("list-installed", &[], timeouts, cancel).await?;
    let records = group_into_records(&response);

    let mut rows = Vec::new();
    for record in records {
        let (Some(name), Some(version), Some(arch)) =
            (record.get("Name"), record.get("Version"), record.get("Architecture"))
        else {
            tracing::debug!(target: "pa.package", module = wrapper.name(), "discarding incomplete list-installed record");
            continue;
        };
        rows.push((name.clone(), version.clone(), arch.clone()));
    }

    cache.replace_installed(&rows)?;
    lock.release();
    tracing::info!(target: "pa.package", module = wrapper.name(), count = rows.len(), "installed cache refreshed");
    Ok(RefreshOutcome::Updated)
}

/// Refreshes the `updates` table by calling `list-updates` or
/// `list-updates-local` (§4.5). Per the open question in §9, an update
/// entry for a package the module does not report as installed is still
/// written to the `updates` table — this mirrors the source's behavior
/// rather than silently filtering it.
pub async fn refresh_updates_cache(
    workdir: &Path,
    wrapper: &PackageModuleWrapper,
    cache: &PackageCache,
    acquirer: &str,
    now_unix: i64,
    policy: LockPolicy,
    force: bool,
    source: UpdatesSource,
    timeouts: TimeoutConfig,
    cancel: &CancelToken,
) -> Result<RefreshOutcome, PaError> {
    let lock_name = cache_lock_name(CacheKind::Updates, wrapper.name());

    let Some(lock) = acquire(workdir, &lock_name, acquirer, now_unix, policy, force, None, true)? else {
        return Ok(RefreshOutcome::SkippedTooSoon);
    };

    let command = match source {
        UpdatesSource::Remote => "list-updates",
        UpdatesSource::Local => "list-updates-local",
    };
    let response = wrapper.invoke(command, &[], timeouts, cancel).await?;
    let records = group_into_records(&response);

    let mut by_name: std::collections::BTreeMap<String, Vec<(String, String)>> = std::collections::BTreeMap::new();
    for record in records {
        let (Some(name), Some(version), Some(arch)) =
            (record.get("Name"), record.get("Version"), record.get("Architecture"))
        else {
            tracing::debug!(target: "pa.package", module = wrapper.name(), command, "discarding incomplete update record");
            continue;
        };
        by_name.entry(name.clone()).or_default().push((version.clone(), arch.clone()));
    }
    let rows: Vec<(String, Vec<(String, String)>)> = by_name.into_iter().collect();

    cache.replace_updates(&rows)?;
    lock.release();
    tracing::info!(target: "pa.package", module = wrapper.name(), count = rows.len(), "updates cache refreshed");
    Ok(RefreshOutcome::Updated)
}

/// Acquires `name` unless `bypass_ifelapsed` is set, in which case the lock
/// is still taken (so concurrent refreshes still serialize) but its
/// `ifelapsed` skip is disabled by collapsing the policy to zero minutes.
/// `wait` is forwarded to [`Lock::acquire`] so a cache refresh racing another
/// refresh of the same table waits briefly rather than failing outright.
fn acquire(
    workdir: &Path,
    name: &str,
    acquirer: &str,
    now_unix: i64,
    policy: LockPolicy,
    bypass_ifelapsed: bool,
    promise_ref: Option<&str>,
    wait: bool,
) -> Result<Option<Lock>, PaError> {
    let effective = if bypass_ifelapsed {
        LockPolicy {
            ifelapsed_minutes: 0,
            ..policy
        }
    } else {
        policy
    };
    Lock::acquire(workdir, name, acquirer, now_unix, effective, promise_ref, wait)
}
