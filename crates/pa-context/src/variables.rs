// SPDX-License-Identifier: MIT OR Apache-2.0
//! Scoped variable storage (`variable_get` / `variable_put_special`, §4.3).

use pa_policy::Value;
use std::collections::BTreeMap;

/// Scope names the evaluator recognizes beyond a bundle's own scope.
pub const RESERVED_SCOPES: &[&str] = &["sys", "const", "mon", "this", "remote_access"];

/// A single variable entry: its value, declared data type, and tags.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableEntry {
    /// The stored value.
    pub value: Value,
    /// The declared type name (`"string"`, `"slist"`, ... as the source
    /// grammar spells it); kept as text since §9 leaves the full type table
    /// out of scope.
    pub datatype: String,
    /// Classification tags attached at definition time.
    pub tags: Vec<String>,
}

/// Variables grouped by scope name (`sys`, `const`, `mon`, `this`,
/// `<bundle>`, `remote_access`, `control_<agent>`, ...).
#[derive(Debug, Clone, Default)]
pub struct VariableScopes {
    scopes: BTreeMap<String, BTreeMap<String, VariableEntry>>,
}

impl VariableScopes {
    /// An empty scope table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up `name` within `scope`.
    #[must_use]
    pub fn get(&self, scope: &str, name: &str) -> Option<&VariableEntry> {
        self.scopes.get(scope).and_then(|vars| vars.get(name))
    }

    /// Defines or replaces a variable within `scope`, tagging it with a
    /// datatype and arbitrary tags (per `variable_put_special`).
    pub fn put_special(
        &mut self,
        scope: impl Into<String>,
        name: impl Into<String>,
        value: Value,
        datatype: impl Into<String>,
        tags: Vec<String>,
    ) {
        self.scopes.entry(scope.into()).or_default().insert(
            name.into(),
            VariableEntry {
                value,
                datatype: datatype.into(),
                tags,
            },
        );
    }

    /// Clears every variable in `scope` (used when a bundle's local scope is
    /// torn down at the end of evaluation).
    pub fn clear_scope(&mut self, scope: &str) {
        self.scopes.remove(scope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let mut vars = VariableScopes::new();
        vars.put_special("this", "promiser", Value::string("/etc/foo"), "string", vec![]);
        let entry = vars.get("this", "promiser").unwrap();
        assert_eq!(entry.value, Value::string("/etc/foo"));
        assert_eq!(entry.datatype, "string");
    }

    #[test]
    fn unknown_scope_or_name_is_none() {
        let vars = VariableScopes::new();
        assert!(vars.get("this", "missing").is_none());
    }

    #[test]
    fn clear_scope_drops_all_entries() {
        let mut vars = VariableScopes::new();
        vars.put_special("main", "x", Value::string("1"), "string", vec![]);
        vars.clear_scope("main");
        assert!(vars.get("main", "x").is_none());
    }
}
