//! Configuration types.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::provider::ProviderId;
use crate::terminal::{TerminalSize, DEFAULT_BUFFER_CAPACITY};

/// Top-level configuration file contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub terminal: TerminalConfig,
    pub preflight: PreflightConfig,
    pub providers: ProvidersConfig,
}

/// Settings applied to every spawned terminal session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Bytes of scrollback kept per session.
    pub buffer_capacity: usize,
    /// Columns used when a request omits or zeroes the width.
    pub default_cols: u16,
    /// Rows used when a request omits or zeroes the height.
    pub default_rows: u16,
    /// Shell program; falls back to `$SHELL` (or `COMSPEC` on Windows).
    pub shell: Option<String>,
    /// Arguments passed to the shell.
    pub shell_args: Vec<String>,
    /// Extra variables removed from the child environment.
    pub strip_env: Vec<String>,
}

fn default_shell_args() -> Vec<String> {
    if cfg!(windows) {
        Vec::new()
    } else {
        vec!["-l".to_string()]
    }
}

impl Default for TerminalConfig {
    fn default() -> Self {
        let size = TerminalSize::default();
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            default_cols: size.cols,
            default_rows: size.rows,
            shell: None,
            shell_args: default_shell_args(),
            strip_env: Vec::new(),
        }
    }
}

impl TerminalConfig {
    /// Fallback size for session creation. Zero values fall back to 80x24.
    #[must_use]
    pub fn default_size(&self) -> TerminalSize {
        TerminalSize::or_fallback(self.default_cols, self.default_rows, TerminalSize::default())
    }
}

/// Settings for provider readiness checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreflightConfig {
    /// Upper bound for a version probe, in seconds.
    pub timeout_secs: u64,
    /// Credentials file; defaults to the user config directory.
    pub credentials_file: Option<PathBuf>,
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            credentials_file: None,
        }
    }
}

impl PreflightConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Per-provider overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub claude: ProviderOverride,
    pub codex: ProviderOverride,
}

impl ProvidersConfig {
    #[must_use]
    pub fn get(&self, id: ProviderId) -> &ProviderOverride {
        match id {
            ProviderId::Claude => &self.claude,
            ProviderId::Codex => &self.codex,
        }
    }
}

/// User-supplied adjustments to a built-in provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderOverride {
    /// Absolute path to the CLI binary, checked before the search paths.
    pub binary: Option<PathBuf>,
    /// Extra environment passed to sessions running this provider.
    pub env: HashMap<String, String>,
}
