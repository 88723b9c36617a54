// SPDX-License-Identifier: MIT OR Apache-2.0
//! [`RunSummary`]: the end-of-run percentages rollup (§4.7, §7).

use crate::outcome::{Outcome, Rollup};
use std::fmt;

/// The kept/repaired/not-repaired percentages for a single evaluation run,
/// emitted at `INFORM` level by `pa-cli` after the run completes.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Percentage of promises rolled up as kept.
    pub kept_pct: f64,
    /// Percentage of promises rolled up as repaired.
    pub repaired_pct: f64,
    /// Percentage of promises rolled up as not repaired.
    pub not_repaired_pct: f64,
    /// The policy's reported release/version string, if any.
    pub policy_version: Option<String>,
}

impl RunSummary {
    /// Builds a summary from the ordered list of outcomes produced by a run.
    /// An empty run reports all-zero percentages rather than dividing by
    /// zero.
    #[must_use]
    pub fn from_outcomes(outcomes: &[Outcome], policy_version: Option<String>) -> Self {
        if outcomes.is_empty() {
            return Self {
                kept_pct: 0.0,
                repaired_pct: 0.0,
                not_repaired_pct: 0.0,
                policy_version,
            };
        }
        let total = outcomes.len() as f64;
        let mut kept = 0usize;
        let mut repaired = 0usize;
        let mut not_repaired = 0usize;
        for outcome in outcomes {
            match outcome.rollup() {
                Rollup::Kept => kept += 1,
                Rollup::Repaired => repaired += 1,
                Rollup::NotRepaired => not_repaired += 1,
            }
        }
        Self {
            kept_pct: 100.0 * kept as f64 / total,
            repaired_pct: 100.0 * repaired as f64 / total,
            not_repaired_pct: 100.0 * not_repaired as f64 / total,
            policy_version,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "kept={:.1}% repaired={:.1}% not-repaired={:.1}%",
            self.kept_pct, self.repaired_pct, self.not_repaired_pct
        )?;
        if let Some(version) = &self.policy_version {
            write!(f, " (policy version {version})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentages_sum_to_one_hundred() {
        let outcomes = vec![Outcome::Kept, Outcome::Repaired, Outcome::NotKeptFail, Outcome::Kept];
        let summary = RunSummary::from_outcomes(&outcomes, None);
        assert!((summary.kept_pct - 50.0).abs() < 1e-9);
        assert!((summary.repaired_pct - 25.0).abs() < 1e-9);
        assert!((summary.not_repaired_pct - 25.0).abs() < 1e-9);
    }

    #[test]
    fn empty_run_is_all_zero() {
        let summary = RunSummary::from_outcomes(&[], None);
        assert_eq!(summary.kept_pct, 0.0);
        assert_eq!(summary.repaired_pct, 0.0);
        assert_eq!(summary.not_repaired_pct, 0.0);
    }

    #[test]
    fn display_includes_policy_version() {
        let summary = RunSummary::from_outcomes(&[Outcome::Kept], Some("2024.1".to_string()));
        assert!(summary.to_string().contains("2024.1"));
    }
}
