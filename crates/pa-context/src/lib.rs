// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

/// The hierarchical class set and its boolean-expression evaluator.
pub mod classes;
/// [`EvaluationContext`], the type actuators are evaluated against.
pub mod context;
/// The file-backed persistent class store.
pub mod persistent;
/// Scoped variable storage.
pub mod variables;

pub use classes::{is_defined_class, ClassSet};
pub use context::{EvaluationContext, PersistenceClassPolicy};
pub use persistent::{PersistencePolicy, PersistentClassEntry, PersistentClassStore};
pub use variables::{VariableEntry, VariableScopes, RESERVED_SCOPES};
