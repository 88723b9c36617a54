// SPDX-License-Identifier: MIT OR Apache-2.0
//! [`PolicyError`] and [`ValidationReport`].

use serde::Serialize;
use std::fmt;

/// A reference to the policy element an error is about, precise enough to
/// let a caller locate it without a back-pointer into the AST (per the
/// arena/index guidance in §9).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ElementRef {
    /// A bundle, identified by `(namespace, bundle_type, name)`.
    Bundle(String, String, String),
    /// A body, identified by `(namespace, body_type, name)`.
    Body(String, String, String),
    /// A promise, identified by its owning bundle and its handle.
    Promise {
        /// Owning bundle name.
        bundle: String,
        /// Promise type name.
        promise_type: String,
        /// [`pa_policy::Promise::handle`] of the promise.
        handle: String,
    },
    /// A single constraint within a promise or body.
    Constraint {
        /// Owning bundle or body name.
        owner: String,
        /// The constraint's `lval`.
        lval: String,
    },
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementRef::Bundle(ns, ty, name) => write!(f, "bundle {name} (ns={ns}, type={ty})"),
            ElementRef::Body(ns, ty, name) => write!(f, "body {name} (ns={ns}, type={ty})"),
            ElementRef::Promise {
                bundle,
                promise_type,
                handle,
            } => write!(f, "promise {handle} in {bundle}.{promise_type}"),
            ElementRef::Constraint { owner, lval } => write!(f, "constraint {lval} in {owner}"),
        }
    }
}

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyError {
    /// The offending element.
    pub element_ref: ElementRef,
    /// Human-readable description.
    pub message: String,
}

impl PolicyError {
    /// Construct a new error.
    pub fn new(element_ref: ElementRef, message: impl Into<String>) -> Self {
        Self {
            element_ref,
            message: message.into(),
        }
    }
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.element_ref, self.message)
    }
}

impl std::error::Error for PolicyError {}

/// The ordered sequence of [`PolicyError`]s produced by a validation pass,
/// plus the overall success flag.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    /// True iff `errors` is empty.
    pub success: bool,
    /// Errors found, in discovery order.
    pub errors: Vec<PolicyError>,
}

impl ValidationReport {
    /// An empty, successful report.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            success: true,
            errors: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, error: PolicyError) {
        self.success = false;
        self.errors.push(error);
    }

    /// Merge another report's errors into this one.
    pub fn extend(&mut self, other: ValidationReport) {
        for e in other.errors {
            self.push(e);
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.success {
            return write!(f, "policy valid");
        }
        writeln!(f, "{} error(s):", self.errors.len())?;
        for e in &self.errors {
            writeln!(f, "  - {e}")?;
        }
        Ok(())
    }
}
