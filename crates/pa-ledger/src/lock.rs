// SPDX-License-Identifier: MIT OR Apache-2.0
//! File-backed named locks with `ifelapsed`/`expireafter`/steal semantics
//! (§4.4). Locks live under `<workdir>/state/locks/<name>.lock`: an advisory
//! `fs2` exclusive lock on the file plus a sidecar JSON record of
//! `(acquirer, acquire_time)` so `ifelapsed`/`expireafter` survive process
//! restarts.

use fs2::FileExt;
use pa_error::{ErrorCode, PaError};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Backoff between retries when `acquire` is called with `wait: true` and
/// the lock is held by a live, non-stale process.
const WAIT_RETRY_INTERVAL: Duration = Duration::from_millis(50);
/// Number of brief retries attempted before `wait: true` gives up.
const WAIT_RETRY_ATTEMPTS: u32 = 3;

/// `ifelapsed`/`expireafter` timing policy for a single named lock.
#[derive(Debug, Clone, Copy)]
pub struct LockPolicy {
    /// Minimum interval, in minutes, between repeated acquisitions.
    pub ifelapsed_minutes: i64,
    /// Age, in minutes, past which a held lock may be stolen.
    pub expireafter_minutes: i64,
}

/// A well-known global lock name: serializes package-cache updates and
/// repo/file install/remove operations across concurrent agent processes.
pub const PACKAGE_GLOBAL_LOCK: &str = "package_global";

/// Which package-module cache table a lock name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    /// The `installed` table.
    Installed,
    /// The `updates` table.
    Updates,
}

/// Per-kind cache-update lock name for a given package module.
#[must_use]
pub fn cache_lock_name(kind: CacheKind, module: &str) -> String {
    match kind {
        CacheKind::Installed => format!("package-cache-installed-{module}"),
        CacheKind::Updates => format!("package-cache-updates-{module}"),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockRecord {
    acquirer: String,
    acquire_time_unix: i64,
    /// The promise that requested this acquisition, if the caller named one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    promise_ref: Option<String>,
}

/// A held lock. The OS advisory lock is released when this value is dropped
/// (or explicitly via [`Lock::release`]); the sidecar acquire-time record
/// remains on disk so a later `ifelapsed` check still sees it.
pub struct Lock {
    file: File,
    path: PathBuf,
    name: String,
}

/// The result of a single, non-blocking acquisition attempt.
enum Attempt {
    /// `ifelapsed` has not yet passed; the caller should treat this as a
    /// no-op rather than an error.
    Skipped,
    /// The lock is held by another live process and not yet stealable.
    Contended,
    /// The lock was taken (freshly, or by stealing a stale holder).
    Granted(Lock),
}

impl Lock {
    /// Attempts to acquire the named lock under `workdir`, honoring
    /// `policy.ifelapsed_minutes` against the previous acquirer's recorded
    /// acquire time. Returns `Ok(None)` when the lock is being skipped as
    /// "too soon" rather than treating that as an error. A lock already held
    /// by a live process (via the OS advisory lock) is stolen once the
    /// recorded acquire time is older than `policy.expireafter_minutes`: the
    /// stale lock file is replaced with a fresh one, which drops the holder's
    /// OS-level lock on the old inode (§4.4).
    ///
    /// `promise_ref` names the promise this acquisition is on behalf of, kept
    /// in the sidecar record for diagnostics. When `wait` is set and the lock
    /// is genuinely contended (held by a live process, not yet stale), the
    /// acquisition retries a few times with a brief pause between attempts
    /// before failing, rather than failing on the first miss (§4.4: "wait
    /// briefly (if `wait`) or fail").
    pub fn acquire(
        workdir: &Path,
        name: &str,
        acquirer: &str,
        now_unix: i64,
        policy: LockPolicy,
        promise_ref: Option<&str>,
        wait: bool,
    ) -> Result<Option<Lock>, PaError> {
        let mut retries_left = if wait { WAIT_RETRY_ATTEMPTS } else { 0 };
        loop {
            match Self::try_once(workdir, name, acquirer, now_unix, policy, promise_ref)? {
                Attempt::Skipped => return Ok(None),
                Attempt::Granted(lock) => return Ok(Some(lock)),
                Attempt::Contended => {
                    if retries_left == 0 {
                        return Err(PaError::new(
                            ErrorCode::IoLockStoreUnavailable,
                            "lock is held by another process",
                        )
                        .with_context("lock", name));
                    }
                    retries_left -= 1;
                    tracing::debug!(target: "pa.lock", lock = name, retries_left, "lock contended, waiting briefly");
                    std::thread::sleep(WAIT_RETRY_INTERVAL);
                }
            }
        }
    }

    fn try_once(
        workdir: &Path,
        name: &str,
        acquirer: &str,
        now_unix: i64,
        policy: LockPolicy,
        promise_ref: Option<&str>,
    ) -> Result<Attempt, PaError> {
        let dir = workdir.join("state").join("locks");
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        let path = dir.join(format!("{name}.lock"));

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(|e| io_err(&path, e))?;

        let prev_record = read_record(&path)?;
        if let Some(prev) = &prev_record {
            let age_minutes = (now_unix - prev.acquire_time_unix) / 60;
            if age_minutes < policy.ifelapsed_minutes {
                return Ok(Attempt::Skipped);
            }
        }

        if file.try_lock_exclusive().is_err() {
            let stale = prev_record
                .as_ref()
                .is_some_and(|prev| (now_unix - prev.acquire_time_unix) / 60 >= policy.expireafter_minutes);
            if !stale {
                return Ok(Attempt::Contended);
            }
            tracing::warn!(target: "pa.lock", lock = name, "stealing lock older than expireafter");
            fs::remove_file(&path).map_err(|e| io_err(&path, e))?;
            file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(&path)
                .map_err(|e| io_err(&path, e))?;
            if file.try_lock_exclusive().is_err() {
                return Ok(Attempt::Contended);
            }
        }

        write_record(
            &path,
            &LockRecord {
                acquirer: acquirer.to_string(),
                acquire_time_unix: now_unix,
                promise_ref: promise_ref.map(str::to_string),
            },
        )?;

        tracing::debug!(target: "pa.lock", lock = name, acquirer, promise_ref = ?promise_ref, "lock acquired");
        Ok(Attempt::Granted(Lock {
            file,
            path,
            name: name.to_string(),
        }))
    }

    /// Releases the lock explicitly.
    pub fn release(self) {
        let _ = self.file.unlock();
        tracing::debug!(target: "pa.lock", lock = %self.name, path = %self.path.display(), "lock released");
    }
}

fn read_record(path: &Path) -> Result<Option<LockRecord>, PaError> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_err(path, e)),
    };
    if contents.trim().is_empty() {
        return Ok(None);
    }
    let record = serde_json::from_str(&contents)
        .map_err(|e| PaError::new(ErrorCode::IoLockStoreUnavailable, e.to_string()))?;
    Ok(Some(record))
}

fn write_record(path: &Path, record: &LockRecord) -> Result<(), PaError> {
    let json = serde_json::to_string(record).expect("LockRecord always serializes");
    fs::write(path, json).map_err(|e| io_err(path, e))
}

fn io_err(path: &Path, e: std::io::Error) -> PaError {
    PaError::new(ErrorCode::IoLockStoreUnavailable, e.to_string()).with_context("path", path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LENIENT: LockPolicy = LockPolicy {
        ifelapsed_minutes: 0,
        expireafter_minutes: 999_999,
    };

    #[test]
    fn first_acquisition_is_granted() {
        let dir = tempfile::tempdir().unwrap();
        let lock = Lock::acquire(dir.path(), "test", "agent-1", 1_000, LENIENT, None, false).unwrap();
        assert!(lock.is_some());
    }

    #[test]
    fn reacquire_within_ifelapsed_skips() {
        let dir = tempfile::tempdir().unwrap();
        let policy = LockPolicy {
            ifelapsed_minutes: 10,
            expireafter_minutes: 999_999,
        };
        let lock = Lock::acquire(dir.path(), "test", "agent-1", 1_000, policy, None, false).unwrap();
        assert!(lock.is_some());
        lock.unwrap().release();

        let second = Lock::acquire(dir.path(), "test", "agent-1", 1_000 + 60, policy, None, false).unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn reacquire_after_ifelapsed_elapsed_grants() {
        let dir = tempfile::tempdir().unwrap();
        let policy = LockPolicy {
            ifelapsed_minutes: 1,
            expireafter_minutes: 999_999,
        };
        Lock::acquire(dir.path(), "test", "agent-1", 1_000, policy, None, false)
            .unwrap()
            .unwrap()
            .release();
        let result = Lock::acquire(dir.path(), "test", "agent-1", 1_000 + 120, policy, None, false).unwrap();
        assert!(result.is_some());
    }

    #[test]
    fn held_lock_rejects_concurrent_acquire_without_wait() {
        let dir = tempfile::tempdir().unwrap();
        let _held = Lock::acquire(dir.path(), "test", "agent-1", 1_000, LENIENT, None, false)
            .unwrap()
            .unwrap();
        let err = Lock::acquire(dir.path(), "test", "agent-2", 1_000, LENIENT, None, false).unwrap_err();
        assert_eq!(err.code, ErrorCode::IoLockStoreUnavailable);
    }

    #[test]
    fn held_lock_within_expireafter_is_not_stolen() {
        let dir = tempfile::tempdir().unwrap();
        let policy = LockPolicy {
            ifelapsed_minutes: 0,
            expireafter_minutes: 60,
        };
        let _held = Lock::acquire(dir.path(), "test", "agent-1", 1_000, policy, None, false)
            .unwrap()
            .unwrap();
        let err = Lock::acquire(dir.path(), "test", "agent-2", 1_000 + 30 * 60, policy, None, false).unwrap_err();
        assert_eq!(err.code, ErrorCode::IoLockStoreUnavailable);
    }

    #[test]
    fn held_lock_past_expireafter_is_stolen() {
        let dir = tempfile::tempdir().unwrap();
        let policy = LockPolicy {
            ifelapsed_minutes: 0,
            expireafter_minutes: 60,
        };
        let held = Lock::acquire(dir.path(), "test", "agent-1", 1_000, policy, None, false)
            .unwrap()
            .unwrap();
        let stolen = Lock::acquire(dir.path(), "test", "agent-2", 1_000 + 61 * 60, policy, None, false).unwrap();
        assert!(stolen.is_some());
        drop(held);
    }

    #[test]
    fn promise_ref_is_accepted_and_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let lock = Lock::acquire(dir.path(), "test", "agent-1", 1_000, LENIENT, Some("promise-42"), false)
            .unwrap()
            .unwrap();
        lock.release();
    }

    #[test]
    fn wait_true_retries_and_succeeds_once_the_holder_releases() {
        let dir = tempfile::tempdir().unwrap();
        let dir_path = dir.path().to_path_buf();

        let held = Lock::acquire(&dir_path, "test", "agent-1", 1_000, LENIENT, None, false)
            .unwrap()
            .unwrap();
        let releaser_path = dir_path.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(WAIT_RETRY_INTERVAL);
            held.release();
            let _ = releaser_path;
        });

        let waited = Lock::acquire(&dir_path, "test", "agent-2", 1_000, LENIENT, None, true).unwrap();
        assert!(waited.is_some());
        handle.join().unwrap();
    }

    #[test]
    fn wait_true_still_fails_after_exhausting_retries() {
        let dir = tempfile::tempdir().unwrap();
        let _held = Lock::acquire(dir.path(), "test", "agent-1", 1_000, LENIENT, None, false)
            .unwrap()
            .unwrap();
        let err = Lock::acquire(dir.path(), "test", "agent-2", 1_000, LENIENT, None, true).unwrap_err();
        assert_eq!(err.code, ErrorCode::IoLockStoreUnavailable);
    }
}
