//! Engine configuration types for flowgate.
//!
//! `EngineConfig` represents the `flowgate.toml` file that sets the default
//! step budget, the default bash timeout and working directory, and whether
//! traces are exported via OpenTelemetry.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default number of steps (nested included) examined before a run aborts.
pub const DEFAULT_MAX_STEPS: u32 = 50;

/// Default bash step timeout.
pub const DEFAULT_BASH_TIMEOUT_MS: u64 = 120_000;

/// Lower clamp for bash step timeouts.
pub const MIN_BASH_TIMEOUT_MS: u64 = 1_000;

/// Upper clamp for bash step timeouts.
pub const MAX_BASH_TIMEOUT_MS: u64 = 600_000;

/// Top-level engine configuration. All fields have defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Step budget used when a run's payload does not override it.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// Timeout applied to bash steps that do not declare `timeoutMs`.
    #[serde(default = "default_bash_timeout_ms")]
    pub bash_timeout_ms: u64,

    /// Working directory for bash steps without `cwd` (process cwd when unset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_cwd: Option<PathBuf>,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[serde(default)]
    pub otel: bool,
}

fn default_max_steps() -> u32 {
    DEFAULT_MAX_STEPS
}

fn default_bash_timeout_ms() -> u64 {
    DEFAULT_BASH_TIMEOUT_MS
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            bash_timeout_ms: default_bash_timeout_ms(),
            default_cwd: None,
            otel: false,
        }
    }
}

impl EngineConfig {
    /// The configured bash timeout, clamped to the permitted range.
    pub fn clamped_bash_timeout_ms(&self) -> u64 {
        clamp_bash_timeout_ms(self.bash_timeout_ms)
    }
}

/// Clamp a bash timeout to `[MIN_BASH_TIMEOUT_MS, MAX_BASH_TIMEOUT_MS]`.
pub fn clamp_bash_timeout_ms(timeout_ms: u64) -> u64 {
    timeout_ms.clamp(MIN_BASH_TIMEOUT_MS, MAX_BASH_TIMEOUT_MS)
}
