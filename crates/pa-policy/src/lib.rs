// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! pa-policy
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Content hashing for policy entities.
pub mod hash;
mod merge;
/// The entity model: [`Policy`], [`Bundle`], [`Body`], [`PromiseType`],
/// [`Promise`], and [`Constraint`].
pub mod model;
/// Round-trip JSON serialization and pretty-printing.
pub mod serialize;
/// The dynamic `rval` value type.
pub mod value;

pub use hash::{hash_body, hash_bundle, hash_policy, hash_promise, EntityHash};
pub use model::{
    contract_violation, Body, Bundle, Constraint, InvalidPromiser, Policy, Promise, PromiseType,
    DEFAULT_CLASSES, DEFAULT_NAMESPACE, MERGING_LVALS, RESERVED_BUNDLE_NAMES,
};
pub use serialize::PolicyJsonError;
pub use value::{ScalarKind, Value};
