// SPDX-License-Identifier: MIT OR Apache-2.0
use pa_context::EvaluationContext;
use pa_ledger::{AuditLedger, AuditRecord, Lock, LockPolicy, Outcome, RunSummary, PACKAGE_GLOBAL_LOCK};

#[test]
fn global_lock_serializes_repeated_cache_updates() {
    let dir = tempfile::tempdir().unwrap();
    let policy = LockPolicy {
        ifelapsed_minutes: 0,
        expireafter_minutes: 60,
    };
    let lock = Lock::acquire(dir.path(), PACKAGE_GLOBAL_LOCK, "agent-1", 1_000, policy, None, false)
        .unwrap()
        .unwrap();
    let contended = Lock::acquire(dir.path(), PACKAGE_GLOBAL_LOCK, "agent-2", 1_000, policy, None, false);
    assert!(contended.is_err());
    lock.release();
    let granted = Lock::acquire(dir.path(), PACKAGE_GLOBAL_LOCK, "agent-2", 1_010, policy, None, false).unwrap();
    assert!(granted.is_some());
}

#[test]
fn outcome_to_audit_to_class_activation_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = EvaluationContext::new(dir.path());
    let ledger = AuditLedger::new(dir.path());

    let outcome = Outcome::Repaired;
    outcome.activate_classes(&mut ctx);
    assert!(ctx.is_defined_class("classes.change").unwrap());

    ledger
        .append(&AuditRecord {
            timestamp_ns: 42,
            lock_name: "package_global".to_string(),
            operator: "pa-package".to_string(),
            comment: Some("install zlib".to_string()),
            filename: Some("policy.cf".to_string()),
            version: Some("2024.1".to_string()),
            line: Some(10),
            status: outcome,
        })
        .unwrap();

    let records = ledger.read_all().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, Outcome::Repaired);

    let summary = RunSummary::from_outcomes(&[outcome], Some("2024.1".to_string()));
    assert_eq!(summary.repaired_pct, 100.0);
}
