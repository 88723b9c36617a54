// SPDX-License-Identifier: MIT OR Apache-2.0
//! The promise [`Outcome`] taxonomy and the class-activation side effects
//! that follow each outcome (§4.4, §4.7).

use pa_context::EvaluationContext;
use serde::{Deserialize, Serialize};

/// The terminal classification of a single promise evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// The promise was already satisfied; nothing changed.
    Kept,
    /// The promise was not satisfied and the actuator repaired it.
    Repaired,
    /// Not repaired: a warning-only / dry-run convergence check.
    NotKeptWarn,
    /// Not repaired: the operation timed out.
    NotKeptTimeout,
    /// Not repaired: the operation failed.
    NotKeptFail,
    /// Not repaired: the operation was denied (permissions, policy).
    NotKeptDenied,
    /// Not repaired: the operation was interrupted (cancellation).
    NotKeptInterrupt,
    /// Equivalent to kept, used where "no applicable action" is distinct
    /// from "checked and already correct" in the source taxonomy.
    Noop,
    /// Equivalent to repaired, used for actuators that only report "a
    /// change occurred" rather than a verified repair.
    Change,
    /// Generic "not repaired", used where no finer sub-reason applies.
    Fail,
}

/// The three-valued rollup §4.7 and §8 describe for run summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rollup {
    /// `KEPT` or `NOOP`.
    Kept,
    /// `REPAIRED` or `CHANGE`.
    Repaired,
    /// Every `NOT_KEPT_*` variant, plus `FAIL`.
    NotRepaired,
}

impl Outcome {
    /// Reduces this outcome to its three-valued rollup classification.
    #[must_use]
    pub fn rollup(self) -> Rollup {
        match self {
            Outcome::Kept | Outcome::Noop => Rollup::Kept,
            Outcome::Repaired | Outcome::Change => Rollup::Repaired,
            Outcome::NotKeptWarn
            | Outcome::NotKeptTimeout
            | Outcome::NotKeptFail
            | Outcome::NotKeptDenied
            | Outcome::NotKeptInterrupt
            | Outcome::Fail => Rollup::NotRepaired,
        }
    }

    /// Applies the class-activation side effects prescribed for this
    /// outcome (§4.4) to `ctx`.
    pub fn activate_classes(self, ctx: &mut EvaluationContext) {
        match self {
            Outcome::Repaired | Outcome::Change => {
                ctx.put_hard_class("classes.change", &[]);
                ctx.put_hard_class("classes.persist", &[]);
            }
            Outcome::NotKeptTimeout => ctx.put_hard_class("classes.timeout", &[]),
            Outcome::NotKeptFail | Outcome::Fail => ctx.put_hard_class("classes.failure", &[]),
            Outcome::NotKeptDenied => ctx.put_hard_class("classes.denied", &[]),
            Outcome::NotKeptInterrupt => ctx.put_hard_class("classes.interrupt", &[]),
            Outcome::Kept | Outcome::Noop => ctx.put_hard_class("classes.kept", &[]),
            Outcome::NotKeptWarn => {}
        }
    }
}
