// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! pa-actuator
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod routing;
mod subprocess;

pub use routing::{apply as routing_apply, compute_diff as routing_compute_diff, RoutingActuator, RoutingCommand, RoutingSection, RoutingState};
pub use subprocess::{run_subprocess, SubprocessOutput};

use async_trait::async_trait;
use pa_context::EvaluationContext;
use pa_error::CancelToken;
use pa_ledger::Outcome;
use pa_policy::Promise;

/// The contract every promise-type handler implements (§4.6): given the
/// evaluation context and a single already-class-filtered promise, converge
/// its promiser toward the state its constraints describe and report what
/// happened.
///
/// Implementations own their own query/diff/apply strategy; `pa-actuator`
/// only fixes the shape every one of them presents to the bundle evaluator,
/// plus a shared [`run_subprocess`] helper for the common case of shelling
/// out to an external tool.
#[async_trait]
pub trait Actuator: Send + Sync {
    /// The promise type this actuator handles (e.g. `"packages"`,
    /// `"routing"`), matched against a [`pa_policy::PromiseType`]'s name.
    fn promise_type(&self) -> &str;

    /// Converges `promise`'s promiser toward the state described by its
    /// constraints, mutating `ctx` only through its public methods
    /// (variable/class side effects), and returns the outcome to be
    /// recorded in the audit ledger and rolled into the run summary.
    /// `cancel` is the process-wide termination flag (§5); implementations
    /// that shell out must poll it and abandon in-flight subprocess I/O
    /// once it fires.
    async fn keep_promise(&self, ctx: &mut EvaluationContext, promise: &Promise, cancel: &CancelToken) -> Outcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysKept;

    #[async_trait]
    impl Actuator for AlwaysKept {
        fn promise_type(&self) -> &str {
            "noop"
        }

        async fn keep_promise(&self, _ctx: &mut EvaluationContext, _promise: &Promise, _cancel: &CancelToken) -> Outcome {
            Outcome::Kept
        }
    }

    #[tokio::test]
    async fn a_trivial_actuator_reports_kept() {
        let actuator = AlwaysKept;
        let mut ctx = EvaluationContext::new(std::env::temp_dir());
        let promise = Promise {
            promiser: "anything".to_string(),
            promisee: pa_policy::Value::NoPromisee,
            classes: "any".to_string(),
            conlist: Vec::new(),
            comment: None,
            line: None,
        };
        let outcome = actuator.keep_promise(&mut ctx, &promise, &CancelToken::new()).await;
        assert_eq!(outcome, Outcome::Kept);
        assert_eq!(actuator.promise_type(), "noop");
    }
}
