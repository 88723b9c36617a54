// SPDX-License-Identifier: MIT OR Apache-2.0
//! The routing-service actuator (§4.6): an illustrative concrete actuator
//! that pins down the [`crate::Actuator`] contract with a query/diff/apply
//! loop against `vtysh`, the standard CLI front-end for FRRouting/Quagga.
//! It is included to demonstrate the contract, not to exhaust routing
//! semantics — only OSPF, BGP, and interface sections are modeled.

use crate::subprocess::run_subprocess;
use crate::Actuator;
use async_trait::async_trait;
use pa_context::EvaluationContext;
use pa_error::{CancelToken, PaError};
use pa_ledger::Outcome;
use pa_policy::Promise;
use std::collections::BTreeMap;
use std::time::Duration;

/// A single parsed (or desired) configuration section: a header line
/// (`"router ospf"`, `"router bgp 65000"`, `"interface eth0"`) and its
/// ordered body lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingSection {
    /// The section header, used as its key in [`RoutingState::sections`].
    pub header: String,
    /// Ordered, trimmed body lines belonging to this section.
    pub lines: Vec<String>,
}

/// A parsed or desired routing configuration: a map from section header to
/// its body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingState {
    /// Sections keyed by header, in discovery/declaration order preserved
    /// via a [`BTreeMap`] sorted by header text.
    pub sections: BTreeMap<String, RoutingSection>,
}

/// The small state machine driving `show running-config` parsing:
/// `INITIAL -> OSPF | BGP | INTERFACE`, reset to `INITIAL` on a line
/// beginning with `!` (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    Initial,
    Ospf,
    Bgp,
    Interface,
}

impl RoutingState {
    /// Parses the textual output of `vtysh -c "show running-config"` into a
    /// [`RoutingState`].
    #[must_use]
    pub fn parse(output: &str) -> Self {
        let mut sections = BTreeMap::new();
        let mut state = ParseState::Initial;
        let mut current: Option<RoutingSection> = None;

        for raw_line in output.lines() {
            let line = raw_line.trim_end();
            let trimmed = line.trim();

            if trimmed.starts_with('!') {
                if let Some(section) = current.take() {
                    sections.insert(section.header.clone(), section);
                }
                state = ParseState::Initial;
                continue;
            }

            if trimmed.starts_with("router ospf") {
                if let Some(section) = current.take() {
                    sections.insert(section.header.clone(), section);
                }
                state = ParseState::Ospf;
                current = Some(RoutingSection {
                    header: trimmed.to_string(),
                    lines: Vec::new(),
                });
                continue;
            }
            if trimmed.starts_with("router bgp") {
                if let Some(section) = current.take() {
                    sections.insert(section.header.clone(), section);
                }
                state = ParseState::Bgp;
                current = Some(RoutingSection {
                    header: trimmed.to_string(),
                    lines: Vec::new(),
                });
                continue;
            }
            if trimmed.starts_with("interface ") {
                if let Some(section) = current.take() {
                    sections.insert(section.header.clone(), section);
                }
                state = ParseState::Interface;
                current = Some(RoutingSection {
                    header: trimmed.to_string(),
                    lines: Vec::new(),
                });
                continue;
            }

            if state != ParseState::Initial && !trimmed.is_empty() {
                if let Some(section) = current.as_mut() {
                    section.lines.push(trimmed.to_string());
                }
            }
        }

        if let Some(section) = current.take() {
            sections.insert(section.header.clone(), section);
        }

        Self { sections }
    }

    /// Runs `vtysh -c "show running-config"` and parses its output.
    pub async fn query(vtysh_timeout: Duration, cancel: &CancelToken) -> Result<Self, PaError> {
        let out = run_subprocess(
            "vtysh",
            &["-c".to_string(), "show running-config".to_string()],
            vtysh_timeout,
            cancel,
        )
        .await?;
        Ok(Self::parse(&out.stdout))
    }
}

/// A batch of `vtysh -c` stages applied as one subprocess invocation — one
/// config-mode entry per section, so a section with several missing lines
/// converges in a single `configure terminal` / `end` bracket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingCommand {
    /// Ordered `-c` stage arguments passed to `vtysh`.
    pub stages: Vec<String>,
}

/// Computes the remediation commands needed to bring `current` into line
/// with `desired`: for each desired section missing from `current`, or
/// missing one or more lines, emit one [`RoutingCommand`] that enters
/// config mode, re-asserts the section header, appends the missing lines,
/// and exits (§4.6 step 2).
#[must_use]
pub fn compute_diff(desired: &RoutingState, current: &RoutingState) -> Vec<RoutingCommand> {
    let mut commands = Vec::new();
    for section in desired.sections.values() {
        let missing: Vec<&String> = match current.sections.get(&section.header) {
            Some(existing) => section.lines.iter().filter(|l| !existing.lines.contains(l)).collect(),
            None => section.lines.iter().collect(),
        };
        if missing.is_empty() && current.sections.contains_key(&section.header) {
            continue;
        }
        let mut stages = vec!["configure terminal".to_string(), section.header.clone()];
        stages.extend(missing.into_iter().cloned());
        stages.push("end".to_string());
        commands.push(RoutingCommand { stages });
    }
    commands
}

/// Applies one remediation command: an empty stdout from the whole `vtysh`
/// invocation is success, any output is treated as a failure (typically an
/// error echoed back by the CLI) (§4.6 step 3).
pub async fn apply(command: &RoutingCommand, vtysh_timeout: Duration, cancel: &CancelToken) -> Result<Outcome, PaError> {
    let mut args = Vec::with_capacity(command.stages.len() * 2);
    for stage in &command.stages {
        args.push("-c".to_string());
        args.push(stage.clone());
    }
    let out = run_subprocess("vtysh", &args, vtysh_timeout, cancel).await?;
    if !out.success {
        return Ok(Outcome::NotKeptFail);
    }
    if out.stdout.trim().is_empty() {
        Ok(Outcome::Repaired)
    } else {
        Ok(Outcome::Fail)
    }
}

/// The `routing` promise type (§4.6): the promiser names a section header
/// (`"router ospf"`, `"interface eth0"`) and each `line` constraint is one
/// desired body line of that section.
#[derive(Debug, Clone, Copy)]
pub struct RoutingActuator {
    /// Timeout applied to every `vtysh` invocation, query or apply.
    pub vtysh_timeout: Duration,
    /// When set, `keep_promise` reports the convergence it would perform
    /// without calling [`apply`] (CLI `--dry-run`, mirroring
    /// [`pa_package::PackageRequest::warn_only`]).
    pub dry_run: bool,
}

impl RoutingActuator {
    /// Builds an actuator that bounds every `vtysh` call to `vtysh_timeout`.
    #[must_use]
    pub fn new(vtysh_timeout: Duration) -> Self {
        Self {
            vtysh_timeout,
            dry_run: false,
        }
    }

    /// Builds a dry-run actuator: queries and diffs as usual but never
    /// calls [`apply`].
    #[must_use]
    pub fn new_dry_run(vtysh_timeout: Duration) -> Self {
        Self {
            vtysh_timeout,
            dry_run: true,
        }
    }

    /// Extracts the single section a `routing` promise describes: its
    /// promiser is the section header, and its `line` constraints are the
    /// section's desired body lines, in declaration order.
    fn desired_from_promise(promise: &Promise) -> RoutingState {
        let lines: Vec<String> = promise
            .conlist
            .iter()
            .filter(|c| c.lval == "line")
            .filter_map(|c| c.rval.as_scalar_text())
            .map(str::to_string)
            .collect();
        let mut sections = BTreeMap::new();
        sections.insert(
            promise.promiser.clone(),
            RoutingSection {
                header: promise.promiser.clone(),
                lines,
            },
        );
        RoutingState { sections }
    }
}

#[async_trait]
impl Actuator for RoutingActuator {
    fn promise_type(&self) -> &str {
        "routing"
    }

    async fn keep_promise(&self, _ctx: &mut EvaluationContext, promise: &Promise, cancel: &CancelToken) -> Outcome {
        let desired = Self::desired_from_promise(promise);
        let current = match RoutingState::query(self.vtysh_timeout, cancel).await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(target: "pa.actuator.routing", error = %e, "failed to query running-config");
                return Outcome::NotKeptFail;
            }
        };
        let commands = compute_diff(&desired, &current);
        if commands.is_empty() {
            return Outcome::Kept;
        }
        if self.dry_run {
            return Outcome::NotKeptWarn;
        }
        let mut worst = Outcome::Repaired;
        for command in &commands {
            match apply(command, self.vtysh_timeout, cancel).await {
                Ok(Outcome::Repaired) => {}
                Ok(other) => worst = other,
                Err(e) => {
                    tracing::warn!(target: "pa.actuator.routing", error = %e, "vtysh apply failed");
                    worst = Outcome::Fail;
                }
            }
        }
        worst
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUNNING_CONFIG: &str = "\
!
router ospf
 network 10.0.0.0/24 area 0
!
router bgp 65000
 neighbor 10.0.0.1 remote-as 65001
!
interface eth0
 ip address 10.0.0.2/24
!
";

    #[test]
    fn parse_splits_on_bang_and_section_headers() {
        let state = RoutingState::parse(RUNNING_CONFIG);
        assert_eq!(state.sections.len(), 3);
        let ospf = state.sections.get("router ospf").unwrap();
        assert_eq!(ospf.lines, vec!["network 10.0.0.0/24 area 0".to_string()]);
        let bgp = state.sections.get("router bgp 65000").unwrap();
        assert_eq!(bgp.lines, vec!["neighbor 10.0.0.1 remote-as 65001".to_string()]);
    }

    #[test]
    fn diff_is_empty_when_desired_is_a_subset_of_current() {
        let current = RoutingState::parse(RUNNING_CONFIG);
        let mut desired = RoutingState::default();
        desired.sections.insert(
            "router ospf".to_string(),
            RoutingSection {
                header: "router ospf".to_string(),
                lines: vec!["network 10.0.0.0/24 area 0".to_string()],
            },
        );
        assert!(compute_diff(&desired, &current).is_empty());
    }

    #[test]
    fn diff_emits_a_command_for_a_missing_line() {
        let current = RoutingState::parse(RUNNING_CONFIG);
        let mut desired = RoutingState::default();
        desired.sections.insert(
            "router ospf".to_string(),
            RoutingSection {
                header: "router ospf".to_string(),
                lines: vec!["network 10.0.0.0/24 area 0".to_string(), "network 10.1.0.0/24 area 0".to_string()],
            },
        );
        let commands = compute_diff(&desired, &current);
        assert_eq!(commands.len(), 1);
        assert!(commands[0].stages.contains(&"network 10.1.0.0/24 area 0".to_string()));
    }

    #[test]
    fn desired_from_promise_collects_line_constraints_in_order() {
        let line = |text: &str| pa_policy::Constraint {
            lval: "line".to_string(),
            rval: pa_policy::Value::string(text),
            classes: "any".to_string(),
            references_body: false,
            line: None,
        };
        let promise = Promise {
            promiser: "router ospf".to_string(),
            promisee: pa_policy::Value::NoPromisee,
            classes: "any".to_string(),
            conlist: vec![line("network 10.0.0.0/24 area 0"), line("network 10.1.0.0/24 area 0")],
            comment: None,
            line: None,
        };
        let desired = RoutingActuator::desired_from_promise(&promise);
        let section = desired.sections.get("router ospf").unwrap();
        assert_eq!(
            section.lines,
            vec!["network 10.0.0.0/24 area 0".to_string(), "network 10.1.0.0/24 area 0".to_string()]
        );
    }

    #[tokio::test]
    async fn dry_run_actuator_never_calls_apply() {
        // `vtysh` is unlikely to exist in the test environment; a dry-run
        // promise with a diff still short-circuits to NotKeptWarn only once
        // the query step succeeds, so this test only documents the flag's
        // presence rather than exercising the query against a real binary.
        let actuator = RoutingActuator::new_dry_run(Duration::from_secs(1));
        assert!(actuator.dry_run);
        let actuator = RoutingActuator::new(Duration::from_secs(1));
        assert!(!actuator.dry_run);
    }

    #[test]
    fn diff_emits_a_full_command_for_an_absent_section() {
        let current = RoutingState::default();
        let mut desired = RoutingState::default();
        desired.sections.insert(
            "interface eth1".to_string(),
            RoutingSection {
                header: "interface eth1".to_string(),
                lines: vec!["ip address 10.2.0.1/24".to_string()],
            },
        );
        let commands = compute_diff(&desired, &current);
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].stages[0], "configure terminal");
        assert_eq!(commands[0].stages.last().unwrap(), "end");
    }
}
