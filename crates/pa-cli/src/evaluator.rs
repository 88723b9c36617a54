// SPDX-License-Identifier: MIT OR Apache-2.0
//! The `run` subcommand's evaluation loop: walks every `agent` bundle's
//! promise types in declaration order, applies the context/class filter,
//! dispatches `packages` promises through the `pa-package` engine and
//! `routing` promises through [`pa_actuator::RoutingActuator`], and records
//! each [`Outcome`] to the audit ledger (best-effort) and the class set.

use pa_actuator::{Actuator, RoutingActuator};
use pa_context::EvaluationContext;
use pa_error::{CancelToken, PaError};
use pa_ledger::{AuditLedger, AuditRecord, Lock, LockPolicy, Outcome, PACKAGE_GLOBAL_LOCK};
use pa_package::{absent, present, refresh_installed_cache, refresh_updates_cache, PackageCache, PackageModuleWrapper, PackageRequest, TimeoutConfig, UpdatesSource};
use pa_policy::{Bundle, Policy, Promise};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::time::Duration;

/// Options threaded through a single `run` invocation, gathered from CLI
/// flags and the loaded [`crate::config::CliConfig`].
pub struct EvalOptions {
    /// Class names passed via `--negate`. A promise whose context
    /// expression is exactly one of these names is skipped outright,
    /// rather than evaluated against the live class set — `pa_context`
    /// exposes no dynamic "undefine" operation, so this is a simplified,
    /// CLI-local stand-in for full class negation.
    pub negated_classes: BTreeSet<String>,
    /// `--no-lock`: skip the per-module cache refresh that would otherwise
    /// run once before a module's first dispatch.
    pub no_lock: bool,
    /// `--dry-run`: packages run `warn_only`, routing never calls `apply`.
    pub dry_run: bool,
    /// The agent's working directory (`inputs/`, `state/`, `package_modules/`).
    pub workdir: PathBuf,
    /// Identity recorded as the lock acquirer.
    pub acquirer: String,
    /// Unix timestamp used for lock `ifelapsed`/`expireafter` comparisons.
    pub now_unix: i64,
    /// Default lock policy (`--no-lock` aside) for package-cache refreshes.
    pub lock_policy: LockPolicy,
    /// Wrapper subprocess I/O timeouts.
    pub package_timeouts: TimeoutConfig,
    /// Timeout applied to every `vtysh` invocation.
    pub vtysh_timeout: Duration,
}

/// Per-module wrapper/cache pair, spawned and cache-refreshed at most once
/// per run.
struct PackageModule {
    wrapper: PackageModuleWrapper,
    cache: PackageCache,
}

/// Runs every promise in every `agent` bundle's promise types, in
/// declaration order, returning the ordered list of outcomes produced.
/// Stops early (with a final [`Outcome::NotKeptInterrupt`]) if `cancel` is
/// set between promises.
pub async fn evaluate_policy(
    policy: &Policy,
    ctx: &mut EvaluationContext,
    ledger: &AuditLedger,
    options: &EvalOptions,
    cancel: &CancelToken,
) -> Vec<Outcome> {
    let mut outcomes = Vec::new();
    let mut modules: HashMap<String, PackageModule> = HashMap::new();

    'bundles: for bundle in &policy.bundles {
        if bundle.bundle_type != "agent" {
            continue;
        }
        for promise_type in &bundle.promise_types {
            for promise in &promise_type.promises {
                if cancel.is_cancelled() {
                    outcomes.push(Outcome::NotKeptInterrupt);
                    break 'bundles;
                }

                if options.negated_classes.contains(&promise.classes) {
                    continue;
                }
                match ctx.is_defined_class(&promise.classes) {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(e) => {
                        tracing::warn!(target: "pa.cli.evaluator", error = %e, expr = %promise.classes, "malformed class expression, skipping promise");
                        continue;
                    }
                }

                let outcome = match promise_type.name.as_str() {
                    "packages" => dispatch_package(policy, ctx, promise, options, &mut modules, cancel).await,
                    "routing" => dispatch_routing(ctx, promise, options, cancel).await,
                    other => {
                        tracing::debug!(target: "pa.cli.evaluator", promise_type = other, "no actuator registered for promise type, skipping");
                        continue;
                    }
                };

                outcome.activate_classes(ctx);
                record(ledger, bundle, &promise_type.name, promise, policy, outcome);
                outcomes.push(outcome);
            }
        }
        ctx.clear_bundle_scope(&bundle.name);
    }

    outcomes
}

fn record(ledger: &AuditLedger, bundle: &Bundle, promise_type: &str, promise: &Promise, policy: &Policy, status: Outcome) {
    let record = AuditRecord {
        timestamp_ns: chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0),
        lock_name: promise_type.to_string(),
        operator: promise_type.to_string(),
        comment: promise.comment.clone(),
        filename: bundle.source_path.clone(),
        version: policy.release_id.clone(),
        line: promise.line,
        status,
    };
    if let Err(e) = ledger.append(&record) {
        tracing::warn!(target: "pa.cli.evaluator", error = %e, "failed to append audit record");
    }
}

fn constraint_scalar<'a>(promise: &'a Promise, lval: &str) -> Option<&'a str> {
    promise.conlist.iter().find(|c| c.lval == lval).and_then(|c| c.rval.as_scalar_text())
}

async fn dispatch_package(
    policy: &Policy,
    _ctx: &mut EvaluationContext,
    promise: &Promise,
    options: &EvalOptions,
    modules: &mut HashMap<String, PackageModule>,
    cancel: &CancelToken,
) -> Outcome {
    let Some(method_ref) = constraint_scalar(promise, "package_method") else {
        tracing::warn!(target: "pa.cli.evaluator", promiser = %promise.promiser, "packages promise has no package_method constraint");
        return Outcome::Fail;
    };
    let Some(method_body) = policy.get_body(None, "package_method", method_ref) else {
        tracing::warn!(target: "pa.cli.evaluator", body = method_ref, "package_method body not found");
        return Outcome::Fail;
    };
    let Some(module_name) = method_body
        .conlist
        .iter()
        .find(|c| c.lval == "package_module")
        .and_then(|c| c.rval.as_scalar_text())
    else {
        tracing::warn!(target: "pa.cli.evaluator", body = method_ref, "package_method body has no package_module constraint");
        return Outcome::Fail;
    };

    if !modules.contains_key(module_name) {
        match spawn_module(module_name, options, cancel).await {
            Ok(module) => {
                modules.insert(module_name.to_string(), module);
            }
            Err(e) => {
                tracing::warn!(target: "pa.cli.evaluator", module = module_name, error = %e, "failed to prepare package module");
                return Outcome::NotKeptFail;
            }
        }
    }
    let module = modules.get(module_name).expect("just inserted");

    let request = PackageRequest {
        name: promise.promiser.clone(),
        version: constraint_scalar(promise, "package_version").map(str::to_string),
        arch: constraint_scalar(promise, "package_architecture").map(str::to_string),
        warn_only: options.dry_run,
    };
    let action = constraint_scalar(promise, "package_policy").unwrap_or("present");

    let global_lock = acquire_global_lock(options, Some(&promise.handle()));
    let result = if action == "absent" {
        absent(&module.wrapper, &module.cache, &request, options.package_timeouts, cancel).await
    } else {
        present(&module.wrapper, &module.cache, &request, options.package_timeouts, cancel).await
    };
    if let Some(lock) = global_lock {
        lock.release();
    }

    match result {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!(target: "pa.cli.evaluator", module = module_name, name = %request.name, error = %e, "package convergence failed");
            Outcome::NotKeptFail
        }
    }
}

/// Acquires the single global `package_global` lock (§4.4) that serializes
/// package-cache updates and repo/file install/remove operations across
/// concurrent agent processes. Waits briefly on contention rather than
/// failing outright. Logs and proceeds unlocked if acquisition still fails
/// or is skipped under `ifelapsed` — the per-module cache lock still
/// protects the cache file itself.
fn acquire_global_lock(options: &EvalOptions, promise_ref: Option<&str>) -> Option<Lock> {
    match Lock::acquire(
        &options.workdir,
        PACKAGE_GLOBAL_LOCK,
        &options.acquirer,
        options.now_unix,
        options.lock_policy,
        promise_ref,
        true,
    ) {
        Ok(lock) => lock,
        Err(e) => {
            tracing::warn!(target: "pa.cli.evaluator", error = %e, "failed to acquire package_global lock, proceeding unlocked");
            None
        }
    }
}

async fn spawn_module(name: &str, options: &EvalOptions, cancel: &CancelToken) -> Result<PackageModule, PaError> {
    let wrapper = PackageModuleWrapper::spawn(&options.workdir, name, options.package_timeouts, cancel).await?;
    let cache = PackageCache::new(&options.workdir, name);

    if !options.no_lock {
        let global_lock = acquire_global_lock(options, None);
        let result = async {
            refresh_installed_cache(
                &options.workdir,
                &wrapper,
                &cache,
                &options.acquirer,
                options.now_unix,
                options.lock_policy,
                false,
                options.package_timeouts,
                cancel,
            )
            .await?;
            refresh_updates_cache(
                &options.workdir,
                &wrapper,
                &cache,
                &options.acquirer,
                options.now_unix,
                options.lock_policy,
                false,
                UpdatesSource::Remote,
                options.package_timeouts,
                cancel,
            )
            .await
        }
        .await;
        if let Some(lock) = global_lock {
            lock.release();
        }
        result?;
    }

    Ok(PackageModule { wrapper, cache })
}

async fn dispatch_routing(ctx: &mut EvaluationContext, promise: &Promise, options: &EvalOptions, cancel: &CancelToken) -> Outcome {
    let actuator = if options.dry_run {
        RoutingActuator::new_dry_run(options.vtysh_timeout)
    } else {
        RoutingActuator::new(options.vtysh_timeout)
    };
    actuator.keep_promise(ctx, promise, cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_scalar_finds_the_matching_lval() {
        let mut promise = Promise::new("bash", None, None, None).unwrap();
        promise.append_constraint("package_version", pa_policy::Value::string("5.2"), false);
        assert_eq!(constraint_scalar(&promise, "package_version"), Some("5.2"));
        assert_eq!(constraint_scalar(&promise, "package_architecture"), None);
    }
}
