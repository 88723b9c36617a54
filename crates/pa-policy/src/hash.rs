// SPDX-License-Identifier: MIT OR Apache-2.0
//! Content hashing for policy entities (§4.1).
//!
//! Hashing is implemented by folding a `Sha256` hasher over each entity's
//! identifying fields and its children's hashes, in declaration order —
//! the same "canonicalize, then digest" shape the agent's receipt-hashing
//! code uses for audit records.

use crate::model::{Body, Bundle, Constraint, Policy, Promise, PromiseType};
use crate::value::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// A 32-byte SHA-256 digest identifying a policy entity's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityHash(pub [u8; 32]);

impl fmt::Display for EntityHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

fn digest_value(hasher: &mut Sha256, value: &Value) {
    match value {
        Value::Scalar { kind, value } => {
            hasher.update(b"scalar");
            hasher.update([*kind as u8]);
            hasher.update(value.as_bytes());
        }
        Value::List { value } => {
            hasher.update(b"list");
            for v in value {
                digest_value(hasher, v);
            }
        }
        Value::FnCall { name, arguments } => {
            hasher.update(b"fncall");
            hasher.update(name.as_bytes());
            for v in arguments {
                digest_value(hasher, v);
            }
        }
        Value::Container { value } => {
            hasher.update(b"container");
            hasher.update(value.to_string().as_bytes());
        }
        Value::NoPromisee => {
            hasher.update(b"nopromisee");
        }
    }
}

fn digest_constraint(hasher: &mut Sha256, c: &Constraint) {
    hasher.update(c.lval.as_bytes());
    hasher.update(c.classes.as_bytes());
    digest_value(hasher, &c.rval);
}

fn digest_promise(hasher: &mut Sha256, p: &Promise) {
    hasher.update(p.promiser.as_bytes());
    digest_value(hasher, &p.promisee);
    for c in &p.conlist {
        digest_constraint(hasher, c);
    }
}

fn digest_promise_type(hasher: &mut Sha256, pt: &PromiseType) {
    hasher.update(pt.name.as_bytes());
    for p in &pt.promises {
        digest_promise(hasher, p);
    }
}

fn digest_bundle(hasher: &mut Sha256, b: &Bundle) {
    hasher.update(b.bundle_type.as_bytes());
    hasher.update(b.namespace.as_bytes());
    hasher.update(b.name.as_bytes());
    for a in &b.args {
        hasher.update(a.as_bytes());
    }
    for pt in &b.promise_types {
        digest_promise_type(hasher, pt);
    }
}

fn digest_body(hasher: &mut Sha256, b: &Body) {
    hasher.update(b.body_type.as_bytes());
    hasher.update(b.namespace.as_bytes());
    hasher.update(b.name.as_bytes());
    for a in &b.args {
        hasher.update(a.as_bytes());
    }
    for c in &b.conlist {
        digest_constraint(hasher, c);
    }
}

/// Hashes a single promise (its promiser, promisee, and each constraint).
#[must_use]
pub fn hash_promise(p: &Promise) -> EntityHash {
    let mut hasher = Sha256::new();
    digest_promise(&mut hasher, p);
    EntityHash(hasher.finalize().into())
}

/// Hashes a bundle (type, namespace, name, args, and each promise type).
#[must_use]
pub fn hash_bundle(b: &Bundle) -> EntityHash {
    let mut hasher = Sha256::new();
    digest_bundle(&mut hasher, b);
    EntityHash(hasher.finalize().into())
}

/// Hashes a body (type, namespace, name, args, and each constraint).
#[must_use]
pub fn hash_body(b: &Body) -> EntityHash {
    let mut hasher = Sha256::new();
    digest_body(&mut hasher, b);
    EntityHash(hasher.finalize().into())
}

/// Hashes a whole policy: folds `hash(body)` for every body, then
/// `hash(bundle)` for every bundle, in declaration order.
#[must_use]
pub fn hash_policy(policy: &Policy) -> EntityHash {
    let mut hasher = Sha256::new();
    for b in &policy.bodies {
        digest_body(&mut hasher, b);
    }
    for b in &policy.bundles {
        digest_bundle(&mut hasher, b);
    }
    EntityHash(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Policy;

    #[test]
    fn copy_hashes_equal_to_original() {
        let mut policy = Policy::new();
        let bundle = policy.append_bundle(None, "agent", "main", vec![]);
        let pt = bundle.append_promise_type("files");
        pt.append_promise("/etc/foo", None, None, None).unwrap();

        let copy = policy.clone();
        assert_eq!(hash_policy(&policy), hash_policy(&copy));
        assert_eq!(policy, copy);
    }

    #[test]
    fn different_promiser_changes_hash() {
        let mut a = Policy::new();
        a.append_bundle(None, "agent", "main", vec![])
            .append_promise_type("files")
            .append_promise("/etc/foo", None, None, None)
            .unwrap();

        let mut b = Policy::new();
        b.append_bundle(None, "agent", "main", vec![])
            .append_promise_type("files")
            .append_promise("/etc/bar", None, None, None)
            .unwrap();

        assert_ne!(hash_policy(&a), hash_policy(&b));
    }
}
