// SPDX-License-Identifier: MIT OR Apache-2.0
use pa_policy::{Policy, Value};
use pa_validate::{validate_partial, validate_runnable, DefaultSyntaxRegistry};

#[test]
fn duplicate_bundle_scenario() {
    // Two bundles (ns="default", type="agent", name="foo").
    let mut policy = Policy::new();
    policy.append_bundle(None, "agent", "foo", vec![]);
    policy.append_bundle(None, "agent", "foo", vec![]);

    let registry = DefaultSyntaxRegistry::standard();
    let report = validate_partial(&policy, &registry);

    assert!(!report.success);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0]
        .message
        .contains("Duplicate definition of bundle foo with type agent"));
}

#[test]
fn duplicate_bundle_pair_cites_one_error_per_pair() {
    let mut policy = Policy::new();
    policy.append_bundle(None, "agent", "foo", vec![]);
    policy.append_bundle(None, "agent", "foo", vec![]);
    policy.append_bundle(None, "agent", "bar", vec![]);
    policy.append_bundle(None, "agent", "bar", vec![]);
    policy.append_bundle(None, "agent", "bar", vec![]);

    let registry = DefaultSyntaxRegistry::standard();
    let report = validate_partial(&policy, &registry);

    // foo: one duplicate pair -> 1 error. bar: third definition duplicates
    // the first occurrence already recorded -> 2 errors. Total 3.
    assert_eq!(report.errors.len(), 3);
}

#[test]
fn distinct_bundle_types_do_not_collide() {
    let mut policy = Policy::new();
    policy.append_bundle(None, "agent", "foo", vec![]);
    policy.append_bundle(None, "common", "foo", vec![]);

    let registry = DefaultSyntaxRegistry::standard();
    let report = validate_partial(&policy, &registry);
    assert!(report.success);
}

#[test]
fn clean_policy_validates_as_runnable() {
    let mut policy = Policy::new();
    policy
        .append_body(None, "perms", "mog", vec![])
        .append_constraint("mode", Value::string("644"), "any", false);
    policy
        .append_bundle(None, "agent", "main", vec![])
        .append_promise_type("files")
        .append_promise("/etc/foo", None, None, None)
        .unwrap()
        .append_constraint("perms", Value::symbol("mog"), true);

    let registry = DefaultSyntaxRegistry::standard();
    let report = validate_runnable(&policy, &registry, false);
    assert!(report.success, "expected a clean policy, got: {report}");
}

#[test]
fn reserved_name_and_dangling_reference_both_reported() {
    let mut policy = Policy::new();
    policy.append_bundle(None, "agent", "sys", vec![]);
    policy
        .append_bundle(None, "agent", "main", vec![])
        .append_promise_type("files")
        .append_promise("/etc/foo", None, None, None)
        .unwrap()
        .append_constraint("perms", Value::symbol("missing"), true);

    let registry = DefaultSyntaxRegistry::standard();
    let report = validate_runnable(&policy, &registry, false);
    assert!(!report.success);
    assert_eq!(report.errors.len(), 2);
}
