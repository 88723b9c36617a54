// SPDX-License-Identifier: MIT OR Apache-2.0
//! The package-module wrapper subprocess protocol (§4.5, §6): one subprocess
//! invocation per command, `key=value` lines on stdin, an unordered sequence
//! of `key=value` lines on stdout, spawned with `tokio::process::Command`
//! the same way the host backplane's sidecar client drives external
//! executables — stdin/stdout piped, stderr piped and drained to
//! `tracing::warn!`.

use pa_error::{CancelToken, ErrorCode, PaError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::time::Instant;

/// Timeouts governing wrapper subprocess I/O (§4.5). Field names match the
/// environment-style constants of the same name in the original source.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutConfig {
    /// Overall budget for a single wrapper invocation's I/O, in seconds.
    pub package_promise_script_timeout_sec: u64,
    /// Poll interval, in seconds, at which cancellation is checked while
    /// waiting on wrapper I/O.
    pub package_promise_termination_check_sec: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            package_promise_script_timeout_sec: 600,
            package_promise_termination_check_sec: 30,
        }
    }
}

/// `(path, name, api_version, body_ref)`. `api_version` must equal `1`;
/// construction rejects any other value (§3, scenario 6).
#[derive(Debug, Clone)]
pub struct PackageModuleWrapper {
    path: PathBuf,
    name: String,
    api_version: u32,
    body_ref: Option<String>,
}

/// The supported API version; `supports-api-version` must answer exactly
/// this value.
pub const SUPPORTED_API_VERSION: u32 = 1;

impl PackageModuleWrapper {
    /// Resolves the wrapper at `<workdir>/package_modules/<name>` and
    /// negotiates its API version with a single `supports-api-version`
    /// invocation. Rejects a missing executable or an unsupported version —
    /// no further wrapper invocations occur if this returns an error.
    pub async fn spawn(workdir: &Path, name: &str, timeouts: TimeoutConfig, cancel: &CancelToken) -> Result<Self, PaError> {
        let path = workdir.join("package_modules").join(name);
        if !path.exists() {
            return Err(PaError::new(ErrorCode::ProtocolWrapperUnavailable, "wrapper executable not found")
                .with_context("module", name)
                .with_context("path", path.display().to_string()));
        }

        let response = run_command(&path, "supports-api-version", "", timeouts, cancel).await?;
        let api_version: u32 = response
            .trim()
            .parse()
            .map_err(|_| malformed(name, "supports-api-version did not return an integer"))?;
        if api_version != SUPPORTED_API_VERSION {
            return Err(PaError::new(
                ErrorCode::ProtocolUnsupportedApiVersion,
                format!("wrapper reports api_version={api_version}, expected {SUPPORTED_API_VERSION}"),
            )
            .with_context("module", name));
        }

        Ok(Self {
            path,
            name: name.to_string(),
            api_version,
            body_ref: None,
        })
    }

    /// Attaches the `package_method` body this wrapper was configured from,
    /// for diagnostics.
    #[must_use]
    pub fn with_body_ref(mut self, body_ref: impl Into<String>) -> Self {
        self.body_ref = Some(body_ref.into());
        self
    }

    /// The module name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The negotiated API version (always [`SUPPORTED_API_VERSION`] for a
    /// successfully constructed wrapper).
    #[must_use]
    pub fn api_version(&self) -> u32 {
        self.api_version
    }

    /// Runs `command` with the given request lines on stdin, returning the
    /// parsed response as an ordered list of key-value pairs (request keys
    /// are repeatable, e.g. multiple `options=`, so pairs are kept as a
    /// `Vec` rather than collapsed into a map).
    pub async fn invoke(
        &self,
        command: &str,
        request_lines: &[String],
        timeouts: TimeoutConfig,
        cancel: &CancelToken,
    ) -> Result<Vec<(String, String)>, PaError> {
        let stdin = request_lines.join("\n");
        let stdout = run_command(&self.path, command, &stdin, timeouts, cancel).await?;
        Ok(parse_lines(&stdout))
    }
}

fn malformed(module: &str, message: impl Into<String>) -> PaError {
    PaError::new(ErrorCode::ProtocolMalformedResponse, message.into()).with_context("module", module)
}

/// Splits an unordered `key=value\n` stdout blob into ordered pairs,
/// ignoring blank lines and lines without an `=`.
fn parse_lines(stdout: &str) -> Vec<(String, String)> {
    stdout
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Groups an ordered key-value sequence into records: a new `Name=` line
/// concludes the previous record (§4.5's cache-update parsing rule).
#[must_use]
pub fn group_into_records(pairs: &[(String, String)]) -> Vec<BTreeMap<String, String>> {
    let mut records = Vec::new();
    let mut current = BTreeMap::new();
    for (k, v) in pairs {
        if k == "Name" && current.contains_key("Name") {
            records.push(std::mem::take(&mut current));
        }
        current.insert(k.clone(), v.clone());
    }
    if !current.is_empty() {
        records.push(current);
    }
    records
}

async fn run_command(path: &Path, command: &str, stdin_payload: &str, timeouts: TimeoutConfig, cancel: &CancelToken) -> Result<String, PaError> {
    let mut child = Command::new(path)
        .arg(command)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| PaError::new(ErrorCode::IoSpawnFailed, e.to_string()).with_context("path", path.display().to_string()))?;

    if let Some(mut stdin) = child.stdin.take() {
        let payload = if stdin_payload.is_empty() {
            String::new()
        } else {
            format!("{stdin_payload}\n")
        };
        let _ = stdin.write_all(payload.as_bytes()).await;
        drop(stdin);
    }

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
                            tracing::warn!(target: "pa.package.stderr", "{s}");
                        }
                    }
                    Err(_) => break,
                }
            }
        });
    }

    let mut stdout = child.stdout.take().map(BufReader::new);
    let deadline = Instant::now() + Duration::from_secs(timeouts.package_promise_script_timeout_sec);
    let tick = Duration::from_secs(timeouts.package_promise_termination_check_sec.max(1));

    // Selects on {stdout-readable, tick-timer, cancel-flag}: read in
    // tick-sized slices so a cancellation request is never blocked on for
    // longer than one termination-check interval.
    let mut buf = String::new();
    let mut chunk = [0u8; 4096];
    let outcome: Result<(), PaError> = loop {
        if cancel.is_cancelled() {
            break Err(PaError::new(ErrorCode::ProtocolCancelled, "wrapper I/O abandoned on cancellation")
                .with_context("path", path.display().to_string()));
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break Err(PaError::new(ErrorCode::ProtocolTimeout, "wrapper I/O exceeded the script timeout")
                .with_context("path", path.display().to_string()));
        }
        let Some(reader) = stdout.as_mut() else {
            break Ok(());
        };
        match tokio::time::timeout(tick.min(remaining), reader.read(&mut chunk)).await {
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
    let output = buf;

    let status = child.wait().await.map_err(|e| PaError::new(ErrorCode::IoSpawnFailed, e.to_string()))?;
    if !status.success() {
        return Err(PaError::new(ErrorCode::ProtocolWrapperExitFailure, format!("exit status {status}"))
            .with_context("path", path.display().to_string())
            .with_context("command", command));
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_lines_ignores_blank_and_unkeyed() {
        let pairs = parse_lines("Name=bash\n\nVersion=5.2\nnotakeyvalue");
        assert_eq!(pairs, vec![("Name".to_string(), "bash".to_string()), ("Version".to_string(), "5.2".to_string())]);
    }

    #[test]
    fn group_into_records_splits_on_repeated_name() {
        let pairs = vec![
            ("Name".to_string(), "bash".to_string()),
            ("Version".to_string(), "5.2".to_string()),
            ("Architecture".to_string(), "x86_64".to_string()),
            ("Name".to_string(), "zlib".to_string()),
            ("Version".to_string(), "1.3".to_string()),
        ];
        let records = group_into_records(&pairs);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("Name").unwrap(), "bash");
        assert_eq!(records[1].get("Name").unwrap(), "zlib");
    }

    #[tokio::test]
    async fn spawn_rejects_missing_wrapper() {
        let dir = tempfile::tempdir().unwrap();
        let err = PackageModuleWrapper::spawn(dir.path(), "apt", TimeoutConfig::default(), &CancelToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ProtocolWrapperUnavailable);
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn invoke_is_abandoned_when_cancelled_before_the_call() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let modules = dir.path().join("package_modules");
        std::fs::create_dir_all(&modules).unwrap();
        let path = modules.join("slow");
        std::fs::write(&path, "#!/bin/sh\nif [ \"$1\" = supports-api-version ]; then echo 1; exit 0; fi\nsleep 5\n").unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();

        let wrapper = PackageModuleWrapper::spawn(dir.path(), "slow", TimeoutConfig::default(), &CancelToken::new())
            .await
            .unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();
        let timeouts = TimeoutConfig {
            package_promise_script_timeout_sec: 5,
            package_promise_termination_check_sec: 1,
        };
        let err = wrapper.invoke("list-installed", &[], timeouts, &cancel).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ProtocolCancelled);
    }
}
