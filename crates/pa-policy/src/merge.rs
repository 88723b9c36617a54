// SPDX-License-Identifier: MIT OR Apache-2.0
//! Policy merge, deep copy, and structural comparison (§4.1).

use crate::model::Policy;

impl Policy {
    /// Concatenates `self.bundles ++ other.bundles` and `self.bodies ++
    /// other.bodies` into a new policy. Duplicate `(namespace, type, name)`
    /// keys are *not* de-duplicated here — `pa-validate` flags them later.
    #[must_use]
    pub fn merge(&self, other: &Policy) -> Policy {
        let mut bundles = self.bundles.clone();
        bundles.extend(other.bundles.iter().cloned());
        let mut bodies = self.bodies.clone();
        bodies.extend(other.bodies.iter().cloned());
        Policy {
            release_id: self.release_id.clone().or_else(|| other.release_id.clone()),
            bundles,
            bodies,
        }
    }

    /// A deep copy preserving insertion order. Equivalent to [`Clone::clone`]
    /// — named explicitly because §8 requires `compare(copy(p), p) == 0`.
    #[must_use]
    pub fn deep_copy(&self) -> Policy {
        self.clone()
    }

    /// Structural comparison. Returns `true` when `self` and `other` are
    /// equal, including insertion order — the Rust analogue of
    /// `compare(a, b) == 0`.
    #[must_use]
    pub fn compare(&self, other: &Policy) -> bool {
        self == other
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn bundle_policy(ns: &str, name: &str) -> Policy {
        let mut p = Policy::new();
        p.append_bundle(Some(ns.into()), "agent", name, vec![])
            .append_promise_type("files")
            .append_promise("/etc/foo", None, None, None)
            .unwrap()
            .append_constraint("mode", Value::string("644"), false);
        p
    }

    #[test]
    fn copy_compares_equal() {
        let p = bundle_policy("default", "main");
        assert!(p.compare(&p.deep_copy()));
    }

    #[test]
    fn merge_concatenates_without_dedup() {
        let a = bundle_policy("default", "main");
        let b = bundle_policy("default", "main");
        let merged = a.merge(&b);
        assert_eq!(merged.bundles.len(), 2);
        assert_eq!(merged.bundles[0], merged.bundles[1]);
    }
}
