// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration loading and validation for the promise agent CLI: an
//! optional `promise-agent.toml`, merged over built-in defaults, supplying
//! package-engine timeouts and lock `ifelapsed`/`expireafter` overrides.

use pa_ledger::LockPolicy;
use pa_package::TimeoutConfig;
use schemars::JsonSchema;
use serde::Deserialize;
use std::fmt;
use std::path::Path;

fn default_script_timeout_sec() -> u64 {
    TimeoutConfig::default().package_promise_script_timeout_sec
}

fn default_termination_check_sec() -> u64 {
    TimeoutConfig::default().package_promise_termination_check_sec
}

fn default_ifelapsed_minutes() -> i64 {
    0
}

fn default_expireafter_minutes() -> i64 {
    60
}

/// Top-level configuration for the agent, loaded from `promise-agent.toml`.
#[derive(Debug, Clone, Deserialize, Default, JsonSchema)]
pub struct CliConfig {
    /// Package-module wrapper timeouts.
    #[serde(default)]
    pub package: PackageSection,
    /// Named-lock `ifelapsed`/`expireafter` overrides.
    #[serde(default)]
    pub lock: LockSection,
}

/// `[package]` section: wrapper I/O timeouts (§4.5).
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct PackageSection {
    /// Overall budget for a single wrapper invocation's I/O, in seconds.
    #[serde(default = "default_script_timeout_sec")]
    pub script_timeout_sec: u64,
    /// Poll interval, in seconds, at which cancellation is checked.
    #[serde(default = "default_termination_check_sec")]
    pub termination_check_sec: u64,
}

impl Default for PackageSection {
    fn default() -> Self {
        Self {
            script_timeout_sec: default_script_timeout_sec(),
            termination_check_sec: default_termination_check_sec(),
        }
    }
}

/// `[lock]` section: default `ifelapsed`/`expireafter` policy for named
/// locks that don't carry their own body-level override.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct LockSection {
    /// Minimum interval, in minutes, between repeated acquisitions.
    #[serde(default = "default_ifelapsed_minutes")]
    pub ifelapsed_minutes: i64,
    /// Age, in minutes, past which a held lock may be stolen.
    #[serde(default = "default_expireafter_minutes")]
    pub expireafter_minutes: i64,
}

impl Default for LockSection {
    fn default() -> Self {
        Self {
            ifelapsed_minutes: default_ifelapsed_minutes(),
            expireafter_minutes: default_expireafter_minutes(),
        }
    }
}

impl CliConfig {
    /// Converts the `[package]` section to the `pa-package` timeout type.
    #[must_use]
    pub fn to_timeout_config(&self) -> TimeoutConfig {
        TimeoutConfig {
            package_promise_script_timeout_sec: self.package.script_timeout_sec,
            package_promise_termination_check_sec: self.package.termination_check_sec,
        }
    }

    /// Converts the `[lock]` section to the `pa-ledger` lock policy type.
    #[must_use]
    pub fn to_lock_policy(&self) -> LockPolicy {
        LockPolicy {
            ifelapsed_minutes: self.lock.ifelapsed_minutes,
            expireafter_minutes: self.lock.expireafter_minutes,
        }
    }
}

/// Errors found during configuration validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A timeout value of zero or an unreasonably large value.
    InvalidTimeout {
        /// The offending field name.
        field: String,
        /// The offending value.
        value: u64,
    },
    /// A negative lock-policy value.
    InvalidLockPolicy {
        /// The offending field name.
        field: String,
        /// The offending value.
        value: i64,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidTimeout { field, value } => {
                write!(f, "invalid {field}: {value}s (must be 1..=86400)")
            }
            ConfigError::InvalidLockPolicy { field, value } => {
                write!(f, "invalid {field}: {value} (must be >= 0)")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

const MAX_TIMEOUT_SECS: u64 = 86_400;

/// Loads and parses a TOML configuration file. Returns the all-default
/// config if `path` doesn't exist.
pub fn load_config(path: &Path) -> anyhow::Result<CliConfig> {
    if !path.exists() {
        return Ok(CliConfig::default());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config file '{}': {e}", path.display()))?;
    let config: CliConfig = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("failed to parse config file '{}': {e}", path.display()))?;
    Ok(config)
}

/// Validates a parsed configuration, returning any semantic errors found.
pub fn validate_config(config: &CliConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.package.script_timeout_sec == 0 || config.package.script_timeout_sec > MAX_TIMEOUT_SECS {
        errors.push(ConfigError::InvalidTimeout {
            field: "package.script_timeout_sec".to_string(),
            value: config.package.script_timeout_sec,
        });
    }
    if config.package.termination_check_sec == 0 || config.package.termination_check_sec > MAX_TIMEOUT_SECS {
        errors.push(ConfigError::InvalidTimeout {
            field: "package.termination_check_sec".to_string(),
            value: config.package.termination_check_sec,
        });
    }
    if config.lock.ifelapsed_minutes < 0 {
        errors.push(ConfigError::InvalidLockPolicy {
            field: "lock.ifelapsed_minutes".to_string(),
            value: config.lock.ifelapsed_minutes,
        });
    }
    if config.lock.expireafter_minutes < 0 {
        errors.push(ConfigError::InvalidLockPolicy {
            field: "lock.expireafter_minutes".to_string(),
            value: config.lock.expireafter_minutes,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = CliConfig::default();
        validate_config(&config).unwrap();
    }

    #[test]
    fn zero_timeout_is_invalid() {
        let mut config = CliConfig::default();
        config.package.script_timeout_sec = 0;
        let errs = validate_config(&config).unwrap_err();
        assert!(errs.iter().any(|e| matches!(e, ConfigError::InvalidTimeout { .. })));
    }

    #[test]
    fn negative_lock_policy_is_invalid() {
        let mut config = CliConfig::default();
        config.lock.expireafter_minutes = -1;
        let errs = validate_config(&config).unwrap_err();
        assert!(errs.iter().any(|e| matches!(e, ConfigError::InvalidLockPolicy { .. })));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("promise-agent.toml")).unwrap();
        assert_eq!(config.package.script_timeout_sec, default_script_timeout_sec());
    }

    #[test]
    fn parses_example_config() {
        let content = r#"
[package]
script_timeout_sec = 120
termination_check_sec = 10

[lock]
ifelapsed_minutes = 5
expireafter_minutes = 30
"#;
        let config: CliConfig = toml::from_str(content).unwrap();
        assert_eq!(config.package.script_timeout_sec, 120);
        assert_eq!(config.lock.expireafter_minutes, 30);
    }

    #[test]
    fn conversion_methods_map_fields() {
        let config = CliConfig::default();
        let timeouts = config.to_timeout_config();
        assert_eq!(timeouts.package_promise_script_timeout_sec, config.package.script_timeout_sec);
        let policy = config.to_lock_policy();
        assert_eq!(policy.expireafter_minutes, config.lock.expireafter_minutes);
    }
}
