// SPDX-License-Identifier: MIT OR Apache-2.0
//! The dynamic `rval` type carried by every [`crate::Constraint`].

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Whether a [`Value::Scalar`] is a quoted string literal or a bare
/// identifier (a variable reference, a body/bundle name, a class name).
///
/// The source grammar distinguishes the two lexically; once in the AST both
/// are just text, so the distinction is carried as a tag rather than
/// re-derived from content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    /// A quoted string literal.
    String,
    /// A bare identifier (symbol): a variable, class, or body/bundle name.
    Symbol,
}

/// The dynamic value carried by a promise or body constraint's `rval`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type")]
pub enum Value {
    /// A single scalar: either a quoted string or a bare symbol.
    #[serde(rename = "string")]
    Scalar {
        /// The scalar's kind (string literal vs. symbol).
        #[serde(default, skip_serializing_if = "is_string_kind")]
        kind: ScalarKind,
        /// The scalar text.
        value: String,
    },
    /// An ordered list of values.
    #[serde(rename = "list")]
    List {
        /// List elements.
        value: Vec<Value>,
    },
    /// A function call with an ordered argument list.
    #[serde(rename = "functionCall")]
    FnCall {
        /// Function name.
        name: String,
        /// Argument values, in order.
        arguments: Vec<Value>,
    },
    /// An opaque JSON-like tree, used by `data` container bodies.
    #[serde(rename = "container")]
    Container {
        /// The raw JSON tree.
        value: serde_json::Value,
    },
    /// No promisee was given for a promise.
    #[serde(rename = "noPromisee")]
    NoPromisee,
}

fn is_string_kind(kind: &ScalarKind) -> bool {
    matches!(kind, ScalarKind::String)
}

impl Value {
    /// A quoted string-literal scalar.
    pub fn string(s: impl Into<String>) -> Self {
        Value::Scalar {
            kind: ScalarKind::String,
            value: s.into(),
        }
    }

    /// A bare-symbol scalar (variable reference, class name, body/bundle name).
    pub fn symbol(s: impl Into<String>) -> Self {
        Value::Scalar {
            kind: ScalarKind::Symbol,
            value: s.into(),
        }
    }

    /// An ordered list of values.
    #[must_use]
    pub fn list(items: Vec<Value>) -> Self {
        Value::List { value: items }
    }

    /// A function-call value.
    pub fn fncall(name: impl Into<String>, arguments: Vec<Value>) -> Self {
        Value::FnCall {
            name: name.into(),
            arguments,
        }
    }

    /// An opaque container (data) tree.
    #[must_use]
    pub fn container(tree: serde_json::Value) -> Self {
        Value::Container { value: tree }
    }

    /// True if this is a [`Value::Scalar`].
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        matches!(self, Value::Scalar { .. })
    }

    /// True if this is a [`Value::List`].
    #[must_use]
    pub fn is_list(&self) -> bool {
        matches!(self, Value::List { .. })
    }

    /// True if this is a [`Value::FnCall`].
    #[must_use]
    pub fn is_fncall(&self) -> bool {
        matches!(self, Value::FnCall { .. })
    }

    /// True if this is a [`Value::Container`].
    #[must_use]
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Container { .. })
    }

    /// Returns the scalar text, if this is a [`Value::Scalar`].
    #[must_use]
    pub fn as_scalar_text(&self) -> Option<&str> {
        match self {
            Value::Scalar { value, .. } => Some(value.as_str()),
            _ => None,
        }
    }

    /// Renders this value the way the policy pretty-printer does: scalars are
    /// quoted and escaped (`\` before `'`/`"`), lists are `{ a, b, c }`,
    /// function calls are `name(args)`, and containers/`NoPromisee` use a
    /// best-effort textual form (containers are not normally pretty-printed
    /// inline in the source grammar).
    #[must_use]
    pub fn to_pretty_string(&self) -> String {
        match self {
            Value::Scalar {
                kind: ScalarKind::Symbol,
                value,
            } => value.clone(),
            Value::Scalar {
                kind: ScalarKind::String,
                value,
            } => format!("\"{}\"", escape_scalar(value)),
            Value::List { value } => {
                let inner: Vec<String> = value.iter().map(Value::to_pretty_string).collect();
                format!("{{ {} }}", inner.join(", "))
            }
            Value::FnCall { name, arguments } => {
                let inner: Vec<String> = arguments.iter().map(Value::to_pretty_string).collect();
                format!("{name}({})", inner.join(", "))
            }
            Value::Container { value } => value.to_string(),
            Value::NoPromisee => String::new(),
        }
    }
}

/// Escapes `'` and `"` with a leading `\`, per the pretty-printer rule.
#[must_use]
pub fn escape_scalar(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '\'' || c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
