// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! pa-error
#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The process-wide cancellation flag (§5).
pub mod cancel;
pub use cancel::CancelToken;

/// Broad family an [`ErrorCode`] belongs to, matching the four error kinds
/// distinguished by the agent's error handling design: bad input discovered
/// before a run starts, a wire/subprocess protocol failure, an I/O failure,
/// or a programming-error that must abort the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Structural/semantic errors in a policy, discovered before execution.
    Validation,
    /// Wrapper/subprocess protocol failure: bad exit code, malformed
    /// response, timeout, unsupported API version.
    Protocol,
    /// Database, lock store, or subprocess-spawn failure.
    Io,
    /// Programming error (parent/child mismatch, unreachable state).
    /// Only this category may abort the run.
    Contract,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::Protocol => "protocol",
            Self::Io => "io",
            Self::Contract => "contract",
        };
        f.write_str(s)
    }
}

/// Machine-readable, stable error code.
///
/// Each variant serialises to a `SCREAMING_SNAKE_CASE` string that will not
/// change across patch releases, so audit records and CLI `--inform` output
/// remain diffable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // -- Validation --
    /// Duplicate bundle or body definition.
    ValidationDuplicateDefinition,
    /// Reference to an undefined body or bundle.
    ValidationUndefinedReference,
    /// A reserved identifier was used where it is forbidden.
    ValidationReservedName,
    /// A constraint's rval does not match the data type its lval expects.
    ValidationTypeMismatch,
    /// `require_comments` is set and a promise has no comment.
    ValidationMissingComment,
    /// A class boolean expression could not be parsed.
    ValidationMalformedExpression,

    // -- Protocol --
    /// Package module wrapper rejected: missing executable or bad handshake.
    ProtocolWrapperUnavailable,
    /// `supports-api-version` returned something other than `1`.
    ProtocolUnsupportedApiVersion,
    /// Wrapper exited with a non-zero status.
    ProtocolWrapperExitFailure,
    /// Wrapper stdout could not be parsed into the expected response keys.
    ProtocolMalformedResponse,
    /// Wrapper I/O exceeded `PACKAGE_PROMISE_SCRIPT_TIMEOUT_SEC`.
    ProtocolTimeout,
    /// Subprocess I/O was abandoned because the process-wide cancellation
    /// flag fired mid-read.
    ProtocolCancelled,

    // -- Io --
    /// Cache database file could not be read or written.
    IoCacheUnavailable,
    /// Lock store file could not be read or written.
    IoLockStoreUnavailable,
    /// Underlying subprocess could not be spawned.
    IoSpawnFailed,

    // -- Contract --
    /// A constraint's parent tag did not match the expected owner kind.
    ContractParentMismatch,
    /// Code reached a state the model asserts is unreachable.
    ContractUnreachable,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ValidationDuplicateDefinition
            | Self::ValidationUndefinedReference
            | Self::ValidationReservedName
            | Self::ValidationTypeMismatch
            | Self::ValidationMissingComment
            | Self::ValidationMalformedExpression => ErrorCategory::Validation,

            Self::ProtocolWrapperUnavailable
            | Self::ProtocolUnsupportedApiVersion
            | Self::ProtocolWrapperExitFailure
            | Self::ProtocolMalformedResponse
            | Self::ProtocolTimeout
            | Self::ProtocolCancelled => ErrorCategory::Protocol,

            Self::IoCacheUnavailable | Self::IoLockStoreUnavailable | Self::IoSpawnFailed => {
                ErrorCategory::Io
            }

            Self::ContractParentMismatch | Self::ContractUnreachable => ErrorCategory::Contract,
        }
    }

    /// True for [`ErrorCategory::Contract`] codes — the only category that
    /// should abort the run rather than reduce to a per-promise `Outcome`.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.category() == ErrorCategory::Contract
    }
}

/// A single structured error: a stable [`ErrorCode`], a message, and
/// arbitrary key/value context for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaError {
    /// Stable machine-readable code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Arbitrary diagnostic context (file, line, lval, module name, ...).
    pub context: BTreeMap<String, String>,
}

impl PaError {
    /// Start building an error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    /// Attach a key/value context entry, fluent-style.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Returns the error's [`ErrorCategory`].
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }
}

impl fmt::Display for PaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)?;
        if !self.context.is_empty() {
            write!(f, " (")?;
            for (i, (k, v)) in self.context.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{k}={v}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl std::error::Error for PaError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_mapping_is_stable() {
        assert_eq!(
            ErrorCode::ValidationDuplicateDefinition.category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            ErrorCode::ProtocolTimeout.category(),
            ErrorCategory::Protocol
        );
        assert_eq!(ErrorCode::IoSpawnFailed.category(), ErrorCategory::Io);
        assert!(ErrorCode::ContractUnreachable.is_fatal());
        assert!(!ErrorCode::ValidationReservedName.is_fatal());
    }

    #[test]
    fn display_includes_context() {
        let e = PaError::new(ErrorCode::ValidationReservedName, "bundle name reserved")
            .with_context("name", "sys");
        let s = e.to_string();
        assert!(s.contains("bundle name reserved"));
        assert!(s.contains("name=sys"));
    }

    #[test]
    fn serializes_screaming_snake_case() {
        let v = serde_json::to_value(ErrorCode::ProtocolUnsupportedApiVersion).unwrap();
        assert_eq!(v, serde_json::json!("PROTOCOL_UNSUPPORTED_API_VERSION"));
    }
}
