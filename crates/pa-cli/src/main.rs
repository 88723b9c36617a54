// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]

mod config;
mod evaluator;
mod logging;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use evaluator::EvalOptions;
use pa_context::EvaluationContext;
use pa_error::CancelToken;
use pa_ledger::{AuditLedger, Outcome, RunSummary};
use pa_policy::Policy;
use pa_validate::{validate_runnable, DefaultSyntaxRegistry};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Exit code for a run that failed fatally or was interrupted.
const EXIT_RUNTIME_ERROR: i32 = 1;

/// A FRRouting-style `vtysh` call timeout. Not yet configurable from
/// `promise-agent.toml` — §4.5's `[package]` section covers the wrapper
/// protocol only, and `routing` promises have no equivalent config surface
/// in spec.md.
const VTYSH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "promise-agent", version, about = "A CFEngine-style declarative configuration-management agent")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate a policy against the live environment.
    Run {
        /// Path to the policy JSON file to load.
        #[arg(long)]
        file: PathBuf,

        /// Comma-separated classes to define before evaluation.
        #[arg(long, value_delimiter = ',')]
        define: Vec<String>,

        /// Comma-separated classes to treat as undefined regardless of
        /// context, even if otherwise defined.
        #[arg(long, value_delimiter = ',')]
        negate: Vec<String>,

        /// Skip the per-module package-cache refresh before dispatch.
        #[arg(long)]
        no_lock: bool,

        /// Print `INFORM`-level log lines.
        #[arg(long)]
        inform: bool,

        /// Print `VERBOSE`-level log lines.
        #[arg(long)]
        verbose: bool,

        /// Compute and report convergence without applying any change.
        #[arg(long)]
        dry_run: bool,
    },

    /// Diagnostic subcommands that don't execute a policy.
    Policy {
        #[command(subcommand)]
        action: PolicyCommands,
    },
}

#[derive(Subcommand, Debug)]
enum PolicyCommands {
    /// Runs the validator against a policy JSON file without executing it.
    Validate {
        /// Path to the policy JSON file.
        file: PathBuf,
    },
    /// Round-trips a policy JSON file through the pretty-printer.
    Print {
        /// Path to the policy JSON file.
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let (verbose, inform) = match &cli.command {
        Commands::Run { verbose, inform, .. } => (*verbose, *inform),
        Commands::Policy { .. } => (false, false),
    };
    logging::init_tracing(verbose, inform);

    let result = match cli.command {
        Commands::Run {
            file,
            define,
            negate,
            no_lock,
            inform,
            verbose,
            dry_run,
        } => cmd_run(&file, define, negate, no_lock, inform, verbose, dry_run).await,
        Commands::Policy { action } => match action {
            PolicyCommands::Validate { file } => cmd_policy_validate(&file),
            PolicyCommands::Print { file } => cmd_policy_print(&file),
        },
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(EXIT_RUNTIME_ERROR);
    }
}

fn load_policy(file: &Path) -> Result<Policy> {
    let content = std::fs::read_to_string(file).with_context(|| format!("read policy file '{}'", file.display()))?;
    let json: serde_json::Value =
        serde_json::from_str(&content).with_context(|| format!("parse JSON in '{}'", file.display()))?;
    Policy::from_json(&json).map_err(|e| anyhow::anyhow!("{e}"))
}

fn cmd_policy_validate(file: &Path) -> Result<()> {
    let policy = load_policy(file)?;
    let registry = DefaultSyntaxRegistry::standard();
    let report = validate_runnable(&policy, &registry, false);
    println!("{report}");
    if !report.success {
        anyhow::bail!("policy validation failed with {} error(s)", report.errors.len());
    }
    Ok(())
}

fn cmd_policy_print(file: &Path) -> Result<()> {
    let policy = load_policy(file)?;
    print!("{}", policy.to_pretty_string());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_run(
    file: &Path,
    define: Vec<String>,
    negate: Vec<String>,
    no_lock: bool,
    inform_flag: bool,
    verbose_flag: bool,
    dry_run: bool,
) -> Result<()> {
    let policy = load_policy(file)?;

    let registry = DefaultSyntaxRegistry::standard();
    let report = validate_runnable(&policy, &registry, false);
    if !report.success {
        for error in &report.errors {
            logging::error(error);
        }
        anyhow::bail!("policy failed validation; run aborted before execution");
    }

    let workdir = std::env::current_dir().context("determine working directory")?;
    let config_path = workdir.join("promise-agent.toml");
    let cli_config = config::load_config(&config_path)?;
    if let Err(errors) = config::validate_config(&cli_config) {
        for e in &errors {
            logging::error(format!("config: {e}"));
        }
        anyhow::bail!("invalid configuration in '{}'", config_path.display());
    }

    let now_unix = chrono::Utc::now().timestamp();

    let mut ctx = EvaluationContext::new(workdir.clone());
    ctx.load_persistent_classes(now_unix).map_err(|e| anyhow::anyhow!("{e}"))?;
    for class in &define {
        ctx.put_hard_class(class, &[]);
    }

    let cancel = CancelToken::new();
    install_signal_handlers(cancel.clone());

    let options = EvalOptions {
        negated_classes: negate.into_iter().collect::<BTreeSet<_>>(),
        no_lock,
        dry_run,
        workdir: workdir.clone(),
        acquirer: format!("promise-agent[{}]", std::process::id()),
        now_unix,
        lock_policy: cli_config.to_lock_policy(),
        package_timeouts: cli_config.to_timeout_config(),
        vtysh_timeout: VTYSH_TIMEOUT,
    };

    let ledger = AuditLedger::new(&workdir);
    let outcomes = evaluator::evaluate_policy(&policy, &mut ctx, &ledger, &options, &cancel).await;

    let interrupted = matches!(outcomes.last(), Some(Outcome::NotKeptInterrupt));
    let summary = RunSummary::from_outcomes(&outcomes, policy.release_id.clone());
    logging::inform(inform_flag || verbose_flag, &summary);
    println!("{summary}");

    if interrupted {
        anyhow::bail!("run interrupted");
    }
    Ok(())
}

fn install_signal_handlers(cancel: CancelToken) {
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }
    #[cfg(unix)]
    {
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            let Ok(mut term) = signal(SignalKind::terminate()) else {
                return;
            };
            let Ok(mut hup) = signal(SignalKind::hangup()) else {
                return;
            };
            tokio::select! {
                _ = term.recv() => {}
                _ = hup.recv() => {}
            }
            cancel.cancel();
        });
    }
}
