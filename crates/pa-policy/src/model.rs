// SPDX-License-Identifier: MIT OR Apache-2.0
//! Policy entity model: [`Policy`], [`Bundle`], [`Body`], [`PromiseType`],
//! [`Promise`], and [`Constraint`].

use crate::value::Value;
use pa_error::{ErrorCode, PaError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Bundle/body names that cannot be used as a bundle name.
pub const RESERVED_BUNDLE_NAMES: &[&str] = &["sys", "const", "mon", "edit", "match", "this"];

/// The default namespace used when one is not given.
pub const DEFAULT_NAMESPACE: &str = "default";

/// The default class expression for a promise with no explicit context.
pub const DEFAULT_CLASSES: &str = "any";

/// `lval`s whose `rval` merges (conjoins) rather than replaces on a second
/// append to the same [`Promise`].
pub const MERGING_LVALS: &[&str] = &["ifvarclass", "if"];

/// A `(lval, rval, classes, references_body)` tuple owned either by a
/// [`Promise`] or a [`Body`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Constraint {
    /// Left-hand attribute name.
    pub lval: String,
    /// Right-hand value.
    pub rval: Value,
    /// The context expression this constraint is scoped to.
    pub classes: String,
    /// True if `rval` is expected to name a body (type-checked accordingly).
    pub references_body: bool,
    /// Source line, when known.
    pub line: Option<u32>,
}

impl Constraint {
    fn new(lval: impl Into<String>, rval: Value, classes: impl Into<String>, references_body: bool) -> Self {
        Self {
            lval: lval.into(),
            rval,
            classes: classes.into(),
            references_body,
            line: None,
        }
    }
}

/// The atomic assertion: a resource (`promiser`) shall hold a property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Promise {
    /// The resource this promise is about. Non-empty; not an empty variable
    /// reference such as `$()`.
    pub promiser: String,
    /// Optional promisee (the party the promise is made to).
    #[serde(default = "Value::no_promisee_default")]
    pub promisee: Value,
    /// The context expression under which this promise fires.
    pub classes: String,
    /// Ordered constraints.
    pub conlist: Vec<Constraint>,
    /// Optional comment (required when `require_comments` is set).
    pub comment: Option<String>,
    /// Source line, when known.
    pub line: Option<u32>,
}

impl Value {
    fn no_promisee_default() -> Value {
        Value::NoPromisee
    }
}

/// Error constructing a [`Promise`]: an empty or empty-variable-reference
/// promiser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidPromiser;

impl Promise {
    /// Construct a promise. Rejects an empty promiser or the empty variable
    /// reference `$()`.
    pub fn new(
        promiser: impl Into<String>,
        promisee: Option<Value>,
        classes: Option<String>,
        varclasses: Option<Value>,
    ) -> Result<Self, InvalidPromiser> {
        let promiser = promiser.into();
        if promiser.is_empty() || promiser == "$()" {
            return Err(InvalidPromiser);
        }
        let mut promise = Promise {
            promiser,
            promisee: promisee.unwrap_or(Value::NoPromisee),
            classes: classes.unwrap_or_else(|| DEFAULT_CLASSES.to_string()),
            conlist: Vec::new(),
            comment: None,
            line: None,
        };
        if let Some(vc) = varclasses {
            promise.append_constraint("ifvarclass", vc, false);
        }
        Ok(promise)
    }

    /// Append a constraint, applying the `ifvarclass`/`if` merge rule from
    /// §4.1: a second append of a merging lval conjoins rather than
    /// replaces. Any other lval is simply appended (including a second
    /// distinct constraint with the same lval — promises keep the full
    /// ordered sequence, unlike bodies).
    pub fn append_constraint(&mut self, lval: impl Into<String>, rval: Value, references_body: bool) {
        let lval = lval.into();
        if MERGING_LVALS.contains(&lval.as_str()) {
            if let Some(existing) = self
                .conlist
                .iter_mut()
                .find(|c| MERGING_LVALS.contains(&c.lval.as_str()))
            {
                existing.rval = merge_if_rval(&existing.rval, &rval);
                existing.lval = lval;
                return;
            }
        }
        self.conlist
            .push(Constraint::new(lval, rval, self.classes.clone(), references_body));
    }

    /// Sets the source line.
    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    /// Sets the comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// A stable key for this promise, used for audit-record keying and the
    /// duplicate-handle runnable check. Combines the promiser and the
    /// context expression — the pair the policy model treats as the
    /// promise's "handle" in the absence of an explicit parser-assigned one.
    #[must_use]
    pub fn handle(&self) -> String {
        format!("{}::{}", self.promiser, self.classes)
    }
}

/// Merges two `ifvarclass`/`if` rvals per §4.1: Scalar+Scalar conjoins into
/// `(prev).(new)`; Scalar+FnCall conjoins into `and(prev, new)`. Any other
/// combination is a contract violation (callers only ever merge scalars and
/// function calls into this lval).
fn merge_if_rval(prev: &Value, new: &Value) -> Value {
    match (prev, new) {
        (Value::Scalar { value: p, .. }, Value::Scalar { value: n, .. }) => {
            Value::symbol(format!("({p}).({n})"))
        }
        (Value::Scalar { value: p, .. }, Value::FnCall { .. }) => {
            Value::fncall("and", vec![Value::symbol(p.clone()), new.clone()])
        }
        (Value::FnCall { .. }, _) => Value::fncall("and", vec![prev.clone(), new.clone()]),
        _ => {
            // Contract violation per §9: anything else is a programming error.
            panic!(
                "unreachable: ifvarclass/if merge only ever combines scalars and function calls, got {prev:?} + {new:?}"
            );
        }
    }
}

/// A named subsection inside a [`Bundle`] (e.g. `files`, `packages`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PromiseType {
    /// The promise type name.
    pub name: String,
    /// Source line, when known.
    pub line: Option<u32>,
    /// Ordered promises.
    pub promises: Vec<Promise>,
}

impl PromiseType {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            line: None,
            promises: Vec::new(),
        }
    }

    /// Append a promise built from the given components.
    pub fn append_promise(
        &mut self,
        promiser: impl Into<String>,
        promisee: Option<Value>,
        classes: Option<String>,
        varclasses: Option<Value>,
    ) -> Result<&mut Promise, InvalidPromiser> {
        let promise = Promise::new(promiser, promisee, classes, varclasses)?;
        self.promises.push(promise);
        Ok(self.promises.last_mut().expect("just pushed"))
    }
}

/// A named group of [`PromiseType`] collections, parameterized by an ordered
/// sequence of argument names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Bundle {
    /// Namespace; `"default"` unless otherwise specified.
    pub namespace: String,
    /// Bundle type: `agent|server|common|edit_line|edit_xml|knowledge|routing`.
    pub bundle_type: String,
    /// Bundle name. Must not be a [`RESERVED_BUNDLE_NAMES`] entry.
    pub name: String,
    /// Originating source path, if any.
    pub source_path: Option<String>,
    /// Ordered formal argument names.
    pub args: Vec<String>,
    /// Owned promise-type sections.
    pub promise_types: Vec<PromiseType>,
    /// Source line, when known.
    pub line: Option<u32>,
}

impl Bundle {
    /// Construct a new, empty bundle. Does not itself reject a reserved
    /// name — see `pa-validate` for that check, which runs over a complete
    /// [`Policy`] and can report a precise [`PaError`] for the offending
    /// bundle.
    pub fn new(
        namespace: Option<String>,
        bundle_type: impl Into<String>,
        name: impl Into<String>,
        args: Vec<String>,
    ) -> Self {
        Self {
            namespace: namespace.unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            bundle_type: bundle_type.into(),
            name: name.into(),
            source_path: None,
            args,
            promise_types: Vec::new(),
            line: None,
        }
    }

    /// Returns `(namespace, bundle_type, name)`.
    #[must_use]
    pub fn key(&self) -> (&str, &str, &str) {
        (&self.namespace, &self.bundle_type, &self.name)
    }

    /// Append a promise type, returning the existing one if `name` is
    /// already present (append-only builders never silently drop promises
    /// already attached to a re-opened promise type).
    pub fn append_promise_type(&mut self, name: impl Into<String>) -> &mut PromiseType {
        let name = name.into();
        if let Some(idx) = self.promise_types.iter().position(|pt| pt.name == name) {
            return &mut self.promise_types[idx];
        }
        self.promise_types.push(PromiseType::new(name));
        self.promise_types.last_mut().expect("just pushed")
    }

    /// True if `name` is reserved and cannot be used as a bundle name.
    #[must_use]
    pub fn is_reserved_name(name: &str) -> bool {
        RESERVED_BUNDLE_NAMES.contains(&name)
    }
}

/// A reusable, named attribute set referenced by name+type from promises.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Body {
    /// Namespace; `"default"` unless otherwise specified.
    pub namespace: String,
    /// Body type (the syntax category promises reference it by).
    pub body_type: String,
    /// Body name.
    pub name: String,
    /// Originating source path, if any.
    pub source_path: Option<String>,
    /// Ordered formal argument names. Must be empty when `name == "control"`.
    pub args: Vec<String>,
    /// Ordered constraints.
    pub conlist: Vec<Constraint>,
    /// Source line, when known.
    pub line: Option<u32>,
}

impl Body {
    /// Construct a new, empty body.
    pub fn new(
        namespace: Option<String>,
        body_type: impl Into<String>,
        name: impl Into<String>,
        args: Vec<String>,
    ) -> Self {
        Self {
            namespace: namespace.unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            body_type: body_type.into(),
            name: name.into(),
            source_path: None,
            args,
            conlist: Vec::new(),
            line: None,
        }
    }

    /// Returns `(namespace, body_type, name)`.
    #[must_use]
    pub fn key(&self) -> (&str, &str, &str) {
        (&self.namespace, &self.body_type, &self.name)
    }

    /// True if this is a `control` body — which must have no arguments.
    #[must_use]
    pub fn is_control(&self) -> bool {
        self.name == "control"
    }

    /// Append a constraint. Within a body, `(lval, classes)` is unique: a
    /// second append with an identical `classes` replaces the earlier
    /// constraint rather than appending a duplicate.
    pub fn append_constraint(
        &mut self,
        lval: impl Into<String>,
        rval: Value,
        classes: impl Into<String>,
        references_body: bool,
    ) {
        let lval = lval.into();
        let classes = classes.into();
        if let Some(existing) = self
            .conlist
            .iter_mut()
            .find(|c| c.lval == lval && c.classes == classes)
        {
            existing.rval = rval;
            existing.references_body = references_body;
            return;
        }
        self.conlist.push(Constraint::new(lval, rval, classes, references_body));
    }
}

/// The root entity: an ordered sequence of bundles and bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct Policy {
    /// Opaque release identifier, if the policy set declares one.
    pub release_id: Option<String>,
    /// Owned bundles, in declaration order.
    pub bundles: Vec<Bundle>,
    /// Owned bodies, in declaration order.
    pub bodies: Vec<Body>,
}

impl Policy {
    /// An empty policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a bundle and return a mutable reference to it.
    pub fn append_bundle(
        &mut self,
        namespace: Option<String>,
        bundle_type: impl Into<String>,
        name: impl Into<String>,
        args: Vec<String>,
    ) -> &mut Bundle {
        self.bundles.push(Bundle::new(namespace, bundle_type, name, args));
        self.bundles.last_mut().expect("just pushed")
    }

    /// Append a body and return a mutable reference to it.
    pub fn append_body(
        &mut self,
        namespace: Option<String>,
        body_type: impl Into<String>,
        name: impl Into<String>,
        args: Vec<String>,
    ) -> &mut Body {
        self.bodies.push(Body::new(namespace, body_type, name, args));
        self.bodies.last_mut().expect("just pushed")
    }

    /// Look up a bundle by `(namespace, bundle_type, name)`. `namespace =
    /// None` matches any namespace. `name` may be namespace-qualified
    /// (`ns:local`); when qualified, the namespace prefix is stripped before
    /// comparing against the bundle's local name, and the lookup only
    /// succeeds if the bundle's namespace matches the qualifying prefix.
    #[must_use]
    pub fn get_bundle(&self, namespace: Option<&str>, bundle_type: &str, name: &str) -> Option<&Bundle> {
        let (qualifier, local) = split_qualified(name);
        self.bundles.iter().find(|b| {
            b.bundle_type == bundle_type
                && b.name == local
                && match qualifier {
                    Some(q) => b.namespace == q,
                    None => namespace.is_none_or(|ns| b.namespace == ns),
                }
        })
    }

    /// Look up a body by `(namespace, body_type, name)`, with the same
    /// qualified-name semantics as [`Policy::get_bundle`].
    #[must_use]
    pub fn get_body(&self, namespace: Option<&str>, body_type: &str, name: &str) -> Option<&Body> {
        let (qualifier, local) = split_qualified(name);
        self.bodies.iter().find(|b| {
            b.body_type == body_type
                && b.name == local
                && match qualifier {
                    Some(q) => b.namespace == q,
                    None => namespace.is_none_or(|ns| b.namespace == ns),
                }
        })
    }
}

fn split_qualified(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((ns, local)) => (Some(ns), local),
        None => (None, name),
    }
}

/// Raised when a constraint's declared parent tag doesn't match the kind of
/// container it was actually appended to. A [`pa_error::ErrorCategory::Contract`]
/// condition — callers should treat this as unreachable in correct code.
#[must_use]
pub fn contract_violation(message: impl Into<String>) -> PaError {
    PaError::new(ErrorCode::ContractParentMismatch, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promise_rejects_empty_promiser() {
        assert!(Promise::new("", None, None, None).is_err());
        assert!(Promise::new("$()", None, None, None).is_err());
        assert!(Promise::new("/etc/foo", None, None, None).is_ok());
    }

    #[test]
    fn promise_default_classes_is_any() {
        let p = Promise::new("/etc/foo", None, None, None).unwrap();
        assert_eq!(p.classes, "any");
    }

    #[test]
    fn ifvarclass_scalar_scalar_merges() {
        let mut p = Promise::new("/etc/foo", None, None, None).unwrap();
        p.append_constraint("ifvarclass", Value::symbol("linux"), false);
        p.append_constraint("ifvarclass", Value::symbol("prod"), false);
        assert_eq!(p.conlist.len(), 1);
        assert_eq!(p.conlist[0].rval, Value::symbol("(linux).(prod)"));
    }

    #[test]
    fn ifvarclass_scalar_fncall_merges() {
        let mut p = Promise::new("/etc/foo", None, None, None).unwrap();
        p.append_constraint("ifvarclass", Value::symbol("linux"), false);
        p.append_constraint(
            "if",
            Value::fncall("isgreaterthan", vec![Value::symbol("x"), Value::string("3")]),
            false,
        );
        assert_eq!(p.conlist.len(), 1);
        match &p.conlist[0].rval {
            Value::FnCall { name, arguments } => {
                assert_eq!(name, "and");
                assert_eq!(arguments.len(), 2);
            }
            other => panic!("expected fncall, got {other:?}"),
        }
    }

    #[test]
    fn non_merging_lval_just_appends() {
        let mut p = Promise::new("/etc/foo", None, None, None).unwrap();
        p.append_constraint("mode", Value::string("644"), false);
        p.append_constraint("owner", Value::string("root"), false);
        assert_eq!(p.conlist.len(), 2);
    }

    #[test]
    fn bundle_append_promise_type_is_idempotent() {
        let mut b = Bundle::new(None, "agent", "main", vec![]);
        let idx1 = b.append_promise_type("files") as *const _ as usize;
        let idx2 = b.append_promise_type("files") as *const _ as usize;
        assert_eq!(idx1, idx2);
        assert_eq!(b.promise_types.len(), 1);
    }

    #[test]
    fn body_append_constraint_replaces_same_classes() {
        let mut body = Body::new(None, "file_perms", "mog", vec![]);
        body.append_constraint("mode", Value::string("644"), "any", false);
        body.append_constraint("mode", Value::string("600"), "any", false);
        assert_eq!(body.conlist.len(), 1);
        assert_eq!(body.conlist[0].rval, Value::string("600"));

        body.append_constraint("mode", Value::string("400"), "linux", false);
        assert_eq!(body.conlist.len(), 2);
    }

    #[test]
    fn get_bundle_qualified_name() {
        let mut policy = Policy::new();
        policy.append_bundle(Some("ns1".into()), "agent", "foo", vec![]);
        assert!(policy.get_bundle(None, "agent", "ns1:foo").is_some());
        assert!(policy.get_bundle(Some("ns2"), "agent", "foo").is_none());
        assert!(policy.get_bundle(None, "agent", "foo").is_some());
    }

    #[test]
    fn is_reserved_name_checks() {
        assert!(Bundle::is_reserved_name("sys"));
        assert!(!Bundle::is_reserved_name("myagent"));
    }
}
