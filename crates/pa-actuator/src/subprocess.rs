// SPDX-License-Identifier: MIT OR Apache-2.0
//! A single shared subprocess helper every actuator runs external commands
//! through (§4.6), spawned with `tokio::process::Command` the same way the
//! host backplane's sidecar client and the package-module wrapper drive
//! external executables: stdin not used, stdout/stderr piped, stderr
//! drained to `tracing::warn!`, the whole invocation bounded by a timeout.

use pa_error::{CancelToken, ErrorCode, PaError};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::time::Instant;

/// Tick interval at which the cancellation flag is polled while reading a
/// subprocess's stdout, matching the package wrapper's termination-check
/// cadence.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// The captured result of one `run_subprocess` invocation.
#[derive(Debug, Clone)]
pub struct SubprocessOutput {
    /// Captured stdout, not yet trimmed.
    pub stdout: String,
    /// Whether the process exited with status 0.
    pub success: bool,
}

/// Runs `command` with `args`, waiting up to `timeout` for it to exit.
/// Stderr is drained line-by-line to `tracing::warn!` rather than captured,
/// matching the wrapper protocol's treatment of diagnostic output. `cancel`
/// is polled at every read tick (§5); the current I/O is abandoned as soon
/// as it fires rather than waiting for `timeout` to elapse.
pub async fn run_subprocess(command: &str, args: &[String], timeout: Duration, cancel: &CancelToken) -> Result<SubprocessOutput, PaError> {
    let mut child = Command::new(command)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| PaError::new(ErrorCode::IoSpawnFailed, e.to_string()).with_context("command", command))?;

    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let s = line.trim_end();
                        if !s.is_empty() {
                            tracing::warn!(target: "pa.actuator.stderr", "{s}");
                        }
                    }
                    Err(_) => break,
                }
            }
        });
    }

    let mut stdout = child.stdout.take().map(BufReader::new);
    let deadline = Instant::now() + timeout;

    let mut buf = String::new();
    let mut chunk = [0u8; 4096];
    let outcome: Result<(), PaError> = loop {
        if cancel.is_cancelled() {
            break Err(PaError::new(ErrorCode::ProtocolCancelled, "subprocess I/O abandoned on cancellation")
                .with_context("command", command));
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break Err(PaError::new(ErrorCode::ProtocolTimeout, "subprocess I/O exceeded its timeout")
                .with_context("command", command));
        }
        let Some(reader) = stdout.as_mut() else {
            break Ok(());
        };
        match tokio::time::timeout(CANCEL_POLL_INTERVAL.min(remaining), reader.read(&mut chunk)).await {
            Ok(Ok(0)) => break Ok(()),
            Ok(Ok(n)) => buf.push_str(&String::from_utf8_lossy(&chunk[..n])),
            Ok(Err(_)) => break Ok(()),
            Err(_) => continue,
        }
    };

    if let Err(e) = outcome {
        let _ = child.kill().await;
        return Err(e);
    }
    let stdout = buf;

    let status = child
        .wait()
        .await
        .map_err(|e| PaError::new(ErrorCode::IoSpawnFailed, e.to_string()).with_context("command", command))?;

    Ok(SubprocessOutput {
        stdout,
        success: status.success(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_of_a_successful_command() {
        let out = run_subprocess("echo", &["hello".to_string()], Duration::from_secs(5), &CancelToken::new())
            .await
            .unwrap();
        assert!(out.success);
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn reports_failure_of_a_nonzero_exit() {
        let out = run_subprocess("false", &[], Duration::from_secs(5), &CancelToken::new()).await.unwrap();
        assert!(!out.success);
    }

    #[tokio::test]
    async fn missing_executable_is_a_spawn_error() {
        let err = run_subprocess("pa-actuator-definitely-not-a-real-binary", &[], Duration::from_secs(5), &CancelToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::IoSpawnFailed);
    }

    #[tokio::test]
    async fn cancellation_is_observed_before_the_command_exits() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = run_subprocess("sleep", &["5".to_string()], Duration::from_secs(5), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ProtocolCancelled);
    }
}
