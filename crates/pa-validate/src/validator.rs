// SPDX-License-Identifier: MIT OR Apache-2.0
//! The partial and runnable validation passes (§4.2).

use crate::report::{ElementRef, PolicyError, ValidationReport};
use crate::syntax::{type_matches, SyntaxRegistry};
use pa_policy::{Bundle, Policy, RESERVED_BUNDLE_NAMES};
use std::collections::HashMap;

/// Bundle/body lvals resolved via `agent` then `common` when looking up a
/// bundle reference.
const BUNDLE_REF_FALLBACK_LVALS: &[&str] = &["usebundle", "home_bundle"];

/// Runs the partial checks: structural/semantic checks that always apply,
/// independent of whether the policy is about to be executed.
///
/// Checks: no duplicate bundle by `(ns, type, name)`; no duplicate body by
/// `(ns, type, name)` except bodies of type `"file"`; bundle names not in
/// the reserved set; a `control` body has no arguments; every body/promise
/// constraint whose `lval` resolves to a known syntax matches the expected
/// data type.
pub fn validate_partial(policy: &Policy, registry: &dyn SyntaxRegistry) -> ValidationReport {
    let mut report = ValidationReport::ok();

    check_duplicate_bundles(policy, &mut report);
    check_duplicate_bodies(policy, &mut report);
    check_reserved_bundle_names(policy, &mut report);
    check_control_body_args(policy, &mut report);
    check_body_constraint_types(policy, registry, &mut report);
    check_promise_constraint_types(policy, registry, &mut report);

    report
}

/// Runs the runnable checks in addition to the partial ones: these only
/// make sense when the policy is about to be evaluated.
///
/// Checks: no duplicate promise handle with identical `classes` anywhere in
/// the policy; every body-reference constraint points to an existing body
/// of the expected sub-type (namespace-aware); every literal (non-variable)
/// bundle-reference constraint points to an existing bundle; if
/// `require_comments` is set, every promise carries a comment.
pub fn validate_runnable(policy: &Policy, registry: &dyn SyntaxRegistry, require_comments: bool) -> ValidationReport {
    let mut report = validate_partial(policy, registry);

    check_duplicate_promise_handles(policy, &mut report);
    check_body_references(policy, registry, &mut report);
    check_bundle_references(policy, registry, &mut report);
    if require_comments {
        check_required_comments(policy, &mut report);
    }

    report
}

fn check_duplicate_bundles(policy: &Policy, report: &mut ValidationReport) {
    let mut seen: HashMap<(&str, &str, &str), &Bundle> = HashMap::new();
    for bundle in &policy.bundles {
        let key = bundle.key();
        if let Some(first) = seen.get(&key) {
            report.push(PolicyError::new(
                ElementRef::Bundle(key.0.to_string(), key.1.to_string(), key.2.to_string()),
                format!(
                    "Duplicate definition of bundle {} with type {} (first defined at line {:?}, again at line {:?})",
                    bundle.name, bundle.bundle_type, first.line, bundle.line
                ),
            ));
        } else {
            seen.insert(key, bundle);
        }
    }
}

fn check_duplicate_bodies(policy: &Policy, report: &mut ValidationReport) {
    let mut seen: HashMap<(&str, &str, &str), bool> = HashMap::new();
    for body in &policy.bodies {
        if body.body_type == "file" {
            continue;
        }
        let key = body.key();
        if seen.contains_key(&key) {
            report.push(PolicyError::new(
                ElementRef::Body(key.0.to_string(), key.1.to_string(), key.2.to_string()),
                format!("Duplicate definition of body {} with type {}", body.name, body.body_type),
            ));
        } else {
            seen.insert(key, true);
        }
    }
}

fn check_reserved_bundle_names(policy: &Policy, report: &mut ValidationReport) {
    for bundle in &policy.bundles {
        if RESERVED_BUNDLE_NAMES.contains(&bundle.name.as_str()) {
            report.push(PolicyError::new(
                ElementRef::Bundle(bundle.namespace.clone(), bundle.bundle_type.clone(), bundle.name.clone()),
                format!("'{}' is a reserved name and cannot be used as a bundle name", bundle.name),
            ));
        }
    }
}

fn check_control_body_args(policy: &Policy, report: &mut ValidationReport) {
    for body in &policy.bodies {
        if body.is_control() && !body.args.is_empty() {
            report.push(PolicyError::new(
                ElementRef::Body(body.namespace.clone(), body.body_type.clone(), body.name.clone()),
                "a 'control' body must not take arguments",
            ));
        }
    }
}

fn check_body_constraint_types(policy: &Policy, registry: &dyn SyntaxRegistry, report: &mut ValidationReport) {
    for body in &policy.bodies {
        for c in &body.conlist {
            if let Some(expected) = registry.body_constraint_type(&body.body_type, &c.lval) {
                if !type_matches(&expected, &c.rval) {
                    report.push(PolicyError::new(
                        ElementRef::Constraint {
                            owner: body.name.clone(),
                            lval: c.lval.clone(),
                        },
                        format!(
                            "constraint '{}' in body {} does not match expected type {:?}",
                            c.lval, body.name, expected
                        ),
                    ));
                }
            }
        }
    }
}

fn check_promise_constraint_types(policy: &Policy, registry: &dyn SyntaxRegistry, report: &mut ValidationReport) {
    for bundle in &policy.bundles {
        for pt in &bundle.promise_types {
            for promise in &pt.promises {
                for c in &promise.conlist {
                    if let Some(expected) = registry.promise_constraint_type(&pt.name, &c.lval) {
                        if !type_matches(&expected, &c.rval) {
                            report.push(PolicyError::new(
                                ElementRef::Promise {
                                    bundle: bundle.name.clone(),
                                    promise_type: pt.name.clone(),
                                    handle: promise.handle(),
                                },
                                format!(
                                    "constraint '{}' does not match expected type {:?}",
                                    c.lval, expected
                                ),
                            ));
                        }
                    }
                }
            }
        }
    }
}

fn check_duplicate_promise_handles(policy: &Policy, report: &mut ValidationReport) {
    let mut seen: HashMap<(String, String), (String, String)> = HashMap::new();
    for bundle in &policy.bundles {
        for pt in &bundle.promise_types {
            for promise in &pt.promises {
                let key = (promise.promiser.clone(), promise.classes.clone());
                if let Some((first_bundle, first_pt)) = seen.get(&key) {
                    report.push(PolicyError::new(
                        ElementRef::Promise {
                            bundle: bundle.name.clone(),
                            promise_type: pt.name.clone(),
                            handle: promise.handle(),
                        },
                        format!(
                            "duplicate promise handle '{}' (also defined in {}.{})",
                            promise.handle(),
                            first_bundle,
                            first_pt
                        ),
                    ));
                } else {
                    seen.insert(key, (bundle.name.clone(), pt.name.clone()));
                }
            }
        }
    }
}

fn check_body_references(policy: &Policy, registry: &dyn SyntaxRegistry, report: &mut ValidationReport) {
    for bundle in &policy.bundles {
        for pt in &bundle.promise_types {
            for promise in &pt.promises {
                for c in &promise.conlist {
                    let Some(expected) = registry.promise_constraint_type(&pt.name, &c.lval) else {
                        continue;
                    };
                    let crate::syntax::DataType::BodyRef(body_type) = expected else {
                        continue;
                    };
                    let Some(name) = c.rval.as_scalar_text() else {
                        continue;
                    };
                    if policy.get_body(Some(&bundle.namespace), &body_type, name).is_none() {
                        report.push(PolicyError::new(
                            ElementRef::Promise {
                                bundle: bundle.name.clone(),
                                promise_type: pt.name.clone(),
                                handle: promise.handle(),
                            },
                            format!("'{}' does not resolve to a body of type '{}'", name, body_type),
                        ));
                    }
                }
            }
        }
    }
}

fn check_bundle_references(policy: &Policy, registry: &dyn SyntaxRegistry, report: &mut ValidationReport) {
    for bundle in &policy.bundles {
        for pt in &bundle.promise_types {
            for promise in &pt.promises {
                for c in &promise.conlist {
                    let Some(expected) = registry.promise_constraint_type(&pt.name, &c.lval) else {
                        continue;
                    };
                    if expected != crate::syntax::DataType::BundleRef {
                        continue;
                    }
                    // Only literal (non-variable) symbols are checked; a
                    // function call or a variable-interpolated name can't be
                    // resolved statically.
                    let Some(name) = c.rval.as_scalar_text() else {
                        continue;
                    };
                    let found = if BUNDLE_REF_FALLBACK_LVALS.contains(&c.lval.as_str()) {
                        policy.get_bundle(Some(&bundle.namespace), "agent", name).is_some()
                            || policy.get_bundle(Some(&bundle.namespace), "common", name).is_some()
                    } else {
                        policy.get_bundle(Some(&bundle.namespace), &c.lval, name).is_some()
                    };
                    if !found {
                        report.push(PolicyError::new(
                            ElementRef::Promise {
                                bundle: bundle.name.clone(),
                                promise_type: pt.name.clone(),
                                handle: promise.handle(),
                            },
                            format!("'{name}' does not resolve to an existing bundle"),
                        ));
                    }
                }
            }
        }
    }
}

fn check_required_comments(policy: &Policy, report: &mut ValidationReport) {
    for bundle in &policy.bundles {
        for pt in &bundle.promise_types {
            for promise in &pt.promises {
                if promise.comment.is_none() {
                    report.push(PolicyError::new(
                        ElementRef::Promise {
                            bundle: bundle.name.clone(),
                            promise_type: pt.name.clone(),
                            handle: promise.handle(),
                        },
                        "common.control require_comments is set but this promise has no comment",
                    ));
                }
            }
        }
    }
}
