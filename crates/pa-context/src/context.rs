// SPDX-License-Identifier: MIT OR Apache-2.0
//! [`EvaluationContext`]: the process-wide structure actuators evaluate
//! promises against.

use crate::classes::{is_defined_class, ClassSet};
use crate::persistent::{PersistencePolicy, PersistentClassStore};
use crate::variables::{VariableEntry, VariableScopes};
use pa_error::PaError;
use pa_policy::Value;
use std::path::PathBuf;

/// The evaluation context threaded through every actuator call: the current
/// class set, the variable scopes, and a handle to the on-disk persistent
/// class store.
#[derive(Debug)]
pub struct EvaluationContext {
    classes: ClassSet,
    variables: VariableScopes,
    persistent: PersistentClassStore,
}

impl EvaluationContext {
    /// A fresh context rooted at `workdir` (the agent's working directory,
    /// containing `inputs/`, `state/`, `package_modules/`).
    #[must_use]
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            classes: ClassSet::new(),
            variables: VariableScopes::new(),
            persistent: PersistentClassStore::new(workdir),
        }
    }

    /// Evaluates a class boolean expression against the current class set.
    pub fn is_defined_class(&self, expr: &str) -> Result<bool, PaError> {
        is_defined_class(&self.classes, expr)
    }

    /// Defines a hard class (and its hierarchical suffixes). `tags` is
    /// accepted for API parity with the source collaborator interface but is
    /// not otherwise interpreted here.
    pub fn put_hard_class(&mut self, name: &str, _tags: &[String]) {
        self.classes.define(name);
    }

    /// Defines a class that should survive past this run, recorded in the
    /// persistent class store with the given TTL and retention policy.
    pub fn put_persistent_class(
        &mut self,
        name: &str,
        ttl_minutes: i64,
        policy: PersistenceClassPolicy,
        now_unix_seconds: i64,
    ) -> Result<(), PaError> {
        self.classes.define(name);
        self.persistent.put(
            name,
            now_unix_seconds + ttl_minutes * 60,
            match policy {
                PersistenceClassPolicy::Reset => PersistencePolicy::Reset,
                PersistenceClassPolicy::Preserve => PersistencePolicy::Preserve,
            },
        )
    }

    /// Loads every still-valid persistent class into the live class set.
    /// Call once at startup, after construction.
    pub fn load_persistent_classes(&mut self, now_unix_seconds: i64) -> Result<(), PaError> {
        let entries = self.persistent.scan(now_unix_seconds)?;
        for name in entries.keys() {
            self.classes.define(name);
        }
        Ok(())
    }

    /// Looks up a variable.
    #[must_use]
    pub fn variable_get(&self, scope: &str, name: &str) -> Option<&VariableEntry> {
        self.variables.get(scope, name)
    }

    /// Defines or replaces a variable, tagged with its declared type.
    pub fn variable_put_special(
        &mut self,
        scope: impl Into<String>,
        name: impl Into<String>,
        value: Value,
        datatype: impl Into<String>,
        tags: Vec<String>,
    ) {
        self.variables.put_special(scope, name, value, datatype, tags);
    }

    /// Clears all variables local to a bundle scope (called when the
    /// evaluator finishes a bundle).
    pub fn clear_bundle_scope(&mut self, bundle_name: &str) {
        self.variables.clear_scope(bundle_name);
    }
}

/// Retention policy for a persistent class, mirrored from
/// [`crate::persistent::PersistencePolicy`] to keep the public
/// [`EvaluationContext`] API independent of the store's on-disk shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceClassPolicy {
    /// The class is cleared once its TTL expires.
    Reset,
    /// The class is kept defined past its TTL until explicitly removed.
    Preserve,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hard_class_is_queryable_via_expression() {
        let mut ctx = EvaluationContext::new(tempfile::tempdir().unwrap().path());
        ctx.put_hard_class("linux.prod", &[]);
        assert!(ctx.is_defined_class("linux.prod").unwrap());
        assert!(ctx.is_defined_class("prod").unwrap());
    }

    #[test]
    fn persistent_class_round_trips_through_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = EvaluationContext::new(dir.path());
        ctx.put_persistent_class("survives", 60, PersistenceClassPolicy::Preserve, 1_000)
            .unwrap();
        assert!(ctx.is_defined_class("survives").unwrap());

        let mut ctx2 = EvaluationContext::new(dir.path());
        ctx2.load_persistent_classes(1_000_000).unwrap();
        assert!(ctx2.is_defined_class("survives").unwrap());
    }

    #[test]
    fn variable_put_and_get() {
        let mut ctx = EvaluationContext::new(tempfile::tempdir().unwrap().path());
        ctx.variable_put_special("this", "promiser", Value::string("/etc/foo"), "string", vec![]);
        assert_eq!(
            ctx.variable_get("this", "promiser").unwrap().value,
            Value::string("/etc/foo")
        );
    }
}
