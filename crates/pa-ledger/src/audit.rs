// SPDX-License-Identifier: MIT OR Apache-2.0
//! The append-only promise audit trail (§3, §4.4): one JSONL record per
//! outcome, keyed by a high-resolution timestamp concatenated with the
//! current lock name — the same append-only JSONL shape the host backplane
//! uses for its protocol envelope stream, reused here for the audit trail.

use crate::outcome::Outcome;
use pa_error::{ErrorCode, PaError};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// A single audit entry. Keyed by `(high_res_timestamp, lock_name)` per §3;
/// the key is carried as a field rather than encoded into a map, since the
/// ledger itself is an append-only sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Nanosecond-resolution Unix timestamp of the outcome.
    pub timestamp_ns: i64,
    /// The lock name held (or attempted) while this outcome was produced.
    pub lock_name: String,
    /// Who/what performed the action (actuator or module name).
    pub operator: String,
    /// Free-text description, usually the promise's comment.
    pub comment: Option<String>,
    /// Source file the promise came from, if known.
    pub filename: Option<String>,
    /// Policy release/version string, if known.
    pub version: Option<String>,
    /// Source line, if known.
    pub line: Option<u32>,
    /// The outcome this record reports.
    pub status: Outcome,
}

/// Append-only JSONL ledger at `<workdir>/state/audit.jsonl`. Writing is
/// best-effort per §4.4: a missing or unwritable ledger does not abort the
/// triggering action — callers should log [`PaError`]s from [`AuditLedger::append`]
/// rather than propagate them as fatal.
#[derive(Debug)]
pub struct AuditLedger {
    path: PathBuf,
}

impl AuditLedger {
    /// Opens (without creating) the ledger file rooted at `workdir`.
    #[must_use]
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            path: workdir.into().join("state").join("audit.jsonl"),
        }
    }

    /// Appends one record to the ledger.
    pub fn append(&self, record: &AuditRecord) -> Result<(), PaError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_err(&self.path, e))?;
        }
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| io_err(&self.path, e))?;
        let line = serde_json::to_string(record).expect("AuditRecord always serializes");
        writeln!(file, "{line}").map_err(|e| io_err(&self.path, e))?;
        tracing::debug!(target: "pa.ledger", lock = %record.lock_name, status = ?record.status, "audit record appended");
        Ok(())
    }

    /// Reads every record currently in the ledger, in append order.
    /// Malformed lines are skipped rather than aborting the read — the
    /// ledger is diagnostic, not a source of truth for live evaluation.
    pub fn read_all(&self) -> Result<Vec<AuditRecord>, PaError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&self.path, e)),
        };
        Ok(contents
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect())
    }

    /// The ledger file path, for diagnostics.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn io_err(path: &Path, e: std::io::Error) -> PaError {
    PaError::new(ErrorCode::IoLockStoreUnavailable, e.to_string()).with_context("path", path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(status: Outcome, lock_name: &str) -> AuditRecord {
        AuditRecord {
            timestamp_ns: 1,
            lock_name: lock_name.to_string(),
            operator: "test-actuator".to_string(),
            comment: Some("a promise comment".to_string()),
            filename: None,
            version: None,
            line: None,
            status,
        }
    }

    #[test]
    fn append_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = AuditLedger::new(dir.path());
        ledger.append(&sample(Outcome::Kept, "package_global")).unwrap();
        ledger.append(&sample(Outcome::Repaired, "package_global")).unwrap();

        let records = ledger.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, Outcome::Kept);
        assert_eq!(records[1].status, Outcome::Repaired);
    }

    #[test]
    fn missing_ledger_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = AuditLedger::new(dir.path());
        assert!(ledger.read_all().unwrap().is_empty());
    }
}
