// SPDX-License-Identifier: MIT OR Apache-2.0
//! The expected-data-type registry consulted by the per-constraint typing
//! checks in §4.2, and the typing rule that compares an [`Value`] against
//! an expected [`DataType`].

use pa_policy::Value;
use std::collections::BTreeMap;

/// The data type a constraint's `lval` expects of its `rval`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    /// A single scalar.
    Scalar,
    /// A list.
    List,
    /// Either a scalar or a list.
    ScalarOrList,
    /// An opaque container (data) tree.
    Container,
    /// Must name an existing body of the given body-type.
    BodyRef(String),
    /// Must name an existing bundle (searched `agent` then `common` when
    /// the lval itself doesn't pin a specific bundle type).
    BundleRef,
}

/// Returns whether `actual` satisfies `expected`, per the typing matrix in
/// §4.2: a function call matches any expected type (its result type isn't
/// known statically); a scalar matches `Scalar` and `ScalarOrList`; a list
/// matches `List` and `ScalarOrList`; a container matches `Container` only;
/// all other pairings are mismatches. Reference types ([`DataType::BodyRef`]
/// / [`DataType::BundleRef`]) are checked for syntactic shape here (they
/// need a scalar symbol) — existence is checked separately by the runnable
/// pass, which has the whole policy to search.
#[must_use]
pub fn type_matches(expected: &DataType, actual: &Value) -> bool {
    if actual.is_fncall() {
        return true;
    }
    match expected {
        DataType::Scalar => actual.is_scalar(),
        DataType::List => actual.is_list(),
        DataType::ScalarOrList => actual.is_scalar() || actual.is_list(),
        DataType::Container => actual.is_container(),
        DataType::BodyRef(_) | DataType::BundleRef => actual.is_scalar(),
    }
}

/// Looks up the expected [`DataType`] for a given body-type/lval or
/// promise-type/lval pair.
pub trait SyntaxRegistry {
    /// Expected type of `lval` within a body of the given `body_type`, if
    /// the registry knows about it. `None` means "no opinion" — the
    /// validator skips the typing check for unrecognized lvals rather than
    /// failing closed, since the full CFEngine syntax table is not
    /// reproduced here (see `pa-validate`'s README).
    fn body_constraint_type(&self, body_type: &str, lval: &str) -> Option<DataType>;

    /// Expected type of `lval` within a promise of the given `promise_type`.
    fn promise_constraint_type(&self, promise_type: &str, lval: &str) -> Option<DataType>;
}

/// A small, hand-populated syntax table covering the lvals exercised by
/// this workspace's tests and the routing-actuator example. Production
/// deployments supply their own [`SyntaxRegistry`] generated from the full
/// promise-type syntax table (out of scope here, like the policy-language
/// parser itself).
#[derive(Debug, Default)]
pub struct DefaultSyntaxRegistry {
    body_types: BTreeMap<(String, String), DataType>,
    promise_types: BTreeMap<(String, String), DataType>,
}

impl DefaultSyntaxRegistry {
    /// A registry with the handful of well-known lvals this crate's own
    /// promise types (`files`, `packages`, `routing`) and common bodies
    /// (`perms`, `package_module`) use.
    #[must_use]
    pub fn standard() -> Self {
        let mut reg = Self::default();
        reg.register_body("perms", "mode", DataType::Scalar);
        reg.register_body("perms", "owners", DataType::ScalarOrList);
        reg.register_body("package_method", "package_changes", DataType::Scalar);
        reg.register_body("package_method", "package_module", DataType::Scalar);

        reg.register_promise("files", "perms", DataType::BodyRef("perms".into()));
        reg.register_promise("files", "ifvarclass", DataType::Scalar);
        reg.register_promise("files", "comment", DataType::Scalar);
        reg.register_promise("files", "usebundle", DataType::BundleRef);
        reg.register_promise("files", "home_bundle", DataType::BundleRef);

        reg.register_promise("packages", "package_policy", DataType::Scalar);
        reg.register_promise("packages", "package_version", DataType::Scalar);
        reg.register_promise("packages", "package_architecture", DataType::Scalar);
        reg.register_promise(
            "packages",
            "package_method",
            DataType::BodyRef("package_method".into()),
        );
        reg.register_promise("packages", "comment", DataType::Scalar);

        reg.register_promise("routing", "routing_session", DataType::Scalar);
        reg.register_promise("routing", "comment", DataType::Scalar);
        reg
    }

    /// Registers the expected type for `lval` within a body of `body_type`.
    pub fn register_body(&mut self, body_type: impl Into<String>, lval: impl Into<String>, ty: DataType) {
        self.body_types.insert((body_type.into(), lval.into()), ty);
    }

    /// Registers the expected type for `lval` within a promise of
    /// `promise_type`.
    pub fn register_promise(
        &mut self,
        promise_type: impl Into<String>,
        lval: impl Into<String>,
        ty: DataType,
    ) {
        self.promise_types.insert((promise_type.into(), lval.into()), ty);
    }
}

impl SyntaxRegistry for DefaultSyntaxRegistry {
    fn body_constraint_type(&self, body_type: &str, lval: &str) -> Option<DataType> {
        self.body_types.get(&(body_type.to_string(), lval.to_string())).cloned()
    }

    fn promise_constraint_type(&self, promise_type: &str, lval: &str) -> Option<DataType> {
        self.promise_types
            .get(&(promise_type.to_string(), lval.to_string()))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fncall_matches_everything() {
        let v = Value::fncall("f", vec![]);
        assert!(type_matches(&DataType::Scalar, &v));
        assert!(type_matches(&DataType::List, &v));
        assert!(type_matches(&DataType::Container, &v));
    }

    #[test]
    fn standard_registry_knows_the_package_module_lval() {
        let reg = DefaultSyntaxRegistry::standard();
        assert_eq!(
            reg.body_constraint_type("package_method", "package_module"),
            Some(DataType::Scalar)
        );
    }

    #[test]
    fn scalar_and_list_matrix() {
        let scalar = Value::string("x");
        let list = Value::list(vec![]);
        let container = Value::container(serde_json::json!({}));

        assert!(type_matches(&DataType::Scalar, &scalar));
        assert!(!type_matches(&DataType::Scalar, &list));
        assert!(type_matches(&DataType::ScalarOrList, &scalar));
        assert!(type_matches(&DataType::ScalarOrList, &list));
        assert!(!type_matches(&DataType::Container, &scalar));
        assert!(type_matches(&DataType::Container, &container));
    }
}
