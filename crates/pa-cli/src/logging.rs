// SPDX-License-Identifier: MIT OR Apache-2.0
//! The stable `VERBOSE`/`INFORM`/`ERROR` log levels (§7), layered on top of
//! a `tracing_subscriber` `EnvFilter` the way the teacher's `abp-cli::main`
//! drives `RUST_LOG` from a `--debug` flag — here driven by `--verbose` /
//! `--inform` instead. The fixed `"V: "`/`"R: "`/`"E: "` prefixes come from
//! the original `src/logging.c` prefix table.

use tracing_subscriber::EnvFilter;

/// Installs the global `tracing_subscriber` with a filter level chosen from
/// the CLI's verbosity flags: `--verbose` enables debug-level tracing,
/// `--inform` enables info-level, neither leaves only warnings and errors.
pub fn init_tracing(verbose: bool, inform: bool) {
    let filter = if verbose {
        EnvFilter::new("pa=debug")
    } else if inform {
        EnvFilter::new("pa=info")
    } else {
        EnvFilter::new("pa=warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Prints a `VERBOSE`-level line with the stable `"V: "` prefix, only when
/// `--verbose` is set.
pub fn verbose(enabled: bool, message: impl std::fmt::Display) {
    if enabled {
        println!("V: {message}");
    }
}

/// Prints an `INFORM`-level line with the stable `"R: "` prefix (the
/// original tool's prefix for "run-level" informational output), shown
/// whenever `--inform` or `--verbose` is set.
pub fn inform(enabled: bool, message: impl std::fmt::Display) {
    if enabled {
        println!("R: {message}");
    }
}

/// Prints an `ERROR`-level line with the stable `"E: "` prefix. Always
/// shown, to stderr.
pub fn error(message: impl std::fmt::Display) {
    eprintln!("E: {message}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_and_inform_are_gated_by_their_flag() {
        // These only exercise the gate, not captured stdout.
        verbose(false, "suppressed");
        verbose(true, "shown");
        inform(false, "suppressed");
        inform(true, "shown");
    }
}
