//! Built-in registry of supported agent CLIs.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::patterns::{
    PatternTable, CLAUDE_PROMPT, CLAUDE_WAITING, CLAUDE_WORKING, CODEX_PROMPT, CODEX_WAITING,
    CODEX_WORKING,
};
use crate::config::ProvidersConfig;
use crate::terminal::HostEnvironment;

/// Supported agent CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Claude,
    Codex,
}

impl ProviderId {
    pub const ALL: [ProviderId; 2] = [ProviderId::Claude, ProviderId::Codex];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for provider lookups.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ProviderError {
    /// No provider with this id exists.
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
}

impl FromStr for ProviderId {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "claude" => Ok(Self::Claude),
            "codex" => Ok(Self::Codex),
            other => Err(ProviderError::UnknownProvider(other.to_string())),
        }
    }
}

/// How readiness is established for a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthRequirement {
    /// A credential must be present in one of `env_keys` or in the credential store.
    Credential { env_keys: Vec<String> },
    /// The installed binary must answer `binary <args>` with exit status 0.
    VersionProbe { args: Vec<String> },
}

/// A location to probe for a provider binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidatePath {
    /// Relative to the user's home directory.
    Home(&'static str),
    /// Absolute path.
    Absolute(&'static str),
}

impl CandidatePath {
    fn resolve(self, home: Option<&Path>) -> Option<PathBuf> {
        match self {
            Self::Home(rel) => home.map(|h| h.join(rel)),
            Self::Absolute(abs) => Some(PathBuf::from(abs)),
        }
    }
}

/// Static description of one agent CLI.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub id: ProviderId,
    pub display_name: &'static str,
    pub binary_name: &'static str,
    pub install_command: &'static str,
    /// Name of the CLI's own config directory under the home directory.
    pub config_dir_name: &'static str,
    pub default_models: &'static [&'static str],
    pub supports_plan_mode: bool,
    pub auth: AuthRequirement,
    pub patterns: PatternTable,
    candidates: &'static [CandidatePath],
    /// Explicit binary location from configuration.
    pub binary_override: Option<PathBuf>,
    /// Extra variables layered into sessions running this provider.
    pub extra_env: HashMap<String, String>,
}

impl ProviderConfig {
    /// Ordered filesystem locations to probe before searching `PATH`.
    #[must_use]
    pub fn candidate_paths(&self, home: Option<&Path>) -> Vec<PathBuf> {
        self.candidates
            .iter()
            .filter_map(|c| c.resolve(home))
            .collect()
    }

    /// The CLI's config directory (e.g. `~/.claude`).
    #[must_use]
    pub fn config_dir(&self, home: &Path) -> PathBuf {
        home.join(self.config_dir_name)
    }

    /// Environment variables that may carry this provider's credential.
    #[must_use]
    pub fn credential_env_keys(&self) -> &[String] {
        match &self.auth {
            AuthRequirement::Credential { env_keys } => env_keys,
            AuthRequirement::VersionProbe { .. } => &[],
        }
    }
}

const CLAUDE_CANDIDATES: &[CandidatePath] = &[
    CandidatePath::Home(".claude/local/claude"),
    CandidatePath::Home(".local/bin/claude"),
    CandidatePath::Home(".npm-global/bin/claude"),
    CandidatePath::Absolute("/usr/local/bin/claude"),
    CandidatePath::Absolute("/opt/homebrew/bin/claude"),
];

const CODEX_CANDIDATES: &[CandidatePath] = &[
    CandidatePath::Home(".local/bin/codex"),
    CandidatePath::Home(".npm-global/bin/codex"),
    CandidatePath::Absolute("/usr/local/bin/codex"),
    CandidatePath::Absolute("/opt/homebrew/bin/codex"),
];

fn claude() -> ProviderConfig {
    ProviderConfig {
        id: ProviderId::Claude,
        display_name: "Claude Code",
        binary_name: "claude",
        install_command: "npm install -g @anthropic-ai/claude-code",
        config_dir_name: ".claude",
        default_models: &["opus", "sonnet", "haiku"],
        supports_plan_mode: true,
        auth: AuthRequirement::VersionProbe {
            args: vec!["--version".to_string()],
        },
        patterns: PatternTable::lenient(CLAUDE_PROMPT, CLAUDE_WORKING, CLAUDE_WAITING),
        candidates: CLAUDE_CANDIDATES,
        binary_override: None,
        extra_env: HashMap::new(),
    }
}

fn codex() -> ProviderConfig {
    ProviderConfig {
        id: ProviderId::Codex,
        display_name: "Codex",
        binary_name: "codex",
        install_command: "npm install -g @openai/codex",
        config_dir_name: ".codex",
        default_models: &["gpt-5-codex", "gpt-5"],
        supports_plan_mode: false,
        auth: AuthRequirement::Credential {
            env_keys: vec!["OPENAI_API_KEY".to_string()],
        },
        patterns: PatternTable::lenient(CODEX_PROMPT, CODEX_WORKING, CODEX_WAITING),
        candidates: CODEX_CANDIDATES,
        binary_override: None,
        extra_env: HashMap::new(),
    }
}

/// Read-only registry of provider configurations.
#[derive(Debug, Clone)]
pub struct ProviderCatalog {
    claude: ProviderConfig,
    codex: ProviderConfig,
}

impl Default for ProviderCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ProviderCatalog {
    /// Catalog with the built-in providers and no overrides.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            claude: claude(),
            codex: codex(),
        }
    }

    /// Catalog with configured binary paths and extra env applied.
    #[must_use]
    pub fn with_overrides(overrides: &ProvidersConfig) -> Self {
        let mut catalog = Self::builtin();
        for provider in [&mut catalog.claude, &mut catalog.codex] {
            let o = overrides.get(provider.id);
            provider.binary_override.clone_from(&o.binary);
            provider.extra_env.clone_from(&o.env);
        }
        catalog
    }

    #[must_use]
    pub fn get(&self, id: ProviderId) -> &ProviderConfig {
        match id {
            ProviderId::Claude => &self.claude,
            ProviderId::Codex => &self.codex,
        }
    }

    /// Look up a provider by its string id.
    #[must_use]
    pub fn find(&self, id: &str) -> Option<&ProviderConfig> {
        id.parse().ok().map(|id| self.get(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProviderConfig> {
        ProviderId::ALL.into_iter().map(|id| self.get(id))
    }
}

/// Locate a provider's binary.
///
/// Checks the configured override, then the provider's candidate paths, then
/// every `PATH` entry, returning the first regular file found.
#[must_use]
pub fn resolve_binary(provider: &ProviderConfig, env: &HostEnvironment) -> Option<PathBuf> {
    if let Some(path) = &provider.binary_override {
        return path.is_file().then(|| path.clone());
    }

    provider
        .candidate_paths(env.home())
        .into_iter()
        .chain(
            env.path_entries()
                .into_iter()
                .flat_map(|dir| executable_names(provider.binary_name).map(move |n| dir.join(n))),
        )
        .find(|p| p.is_file())
}

#[cfg(windows)]
fn executable_names(binary: &str) -> impl Iterator<Item = String> + '_ {
    ["", ".cmd", ".exe"].into_iter().map(move |ext| format!("{binary}{ext}"))
}

#[cfg(not(windows))]
fn executable_names(binary: &str) -> impl Iterator<Item = String> + '_ {
    std::iter::once(binary.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderOverride;

    #[test]
    fn test_provider_id_round_trip() {
        for id in ProviderId::ALL {
            assert_eq!(id.as_str().parse::<ProviderId>().unwrap(), id);
        }
        assert_eq!(" Codex ".parse::<ProviderId>().unwrap(), ProviderId::Codex);
    }

    #[test]
    fn test_unknown_provider() {
        let err = "gemini".parse::<ProviderId>().unwrap_err();
        assert_eq!(err, ProviderError::UnknownProvider("gemini".to_string()));
        assert_eq!(err.to_string(), "Unknown provider: gemini");
    }

    #[test]
    fn test_builtin_providers_differ() {
        let catalog = ProviderCatalog::builtin();
        let claude = catalog.get(ProviderId::Claude);
        let codex = catalog.get(ProviderId::Codex);

        assert!(claude.supports_plan_mode);
        assert!(!codex.supports_plan_mode);
        assert_eq!(
            claude.config_dir(Path::new("/home/u")),
            PathBuf::from("/home/u/.claude")
        );
        assert_eq!(codex.config_dir(Path::new("/home/u")), PathBuf::from("/home/u/.codex"));
        assert_ne!(claude.default_models, codex.default_models);
        assert!(matches!(claude.auth, AuthRequirement::VersionProbe { .. }));
        assert_eq!(codex.credential_env_keys(), ["OPENAI_API_KEY".to_string()]);
    }

    #[test]
    fn test_find_by_string() {
        let catalog = ProviderCatalog::builtin();
        assert_eq!(catalog.find("claude").unwrap().binary_name, "claude");
        assert!(catalog.find("unknown").is_none());
        assert_eq!(catalog.iter().count(), 2);
    }

    #[test]
    fn test_candidate_paths_use_home() {
        let catalog = ProviderCatalog::builtin();
        let paths = catalog
            .get(ProviderId::Claude)
            .candidate_paths(Some(Path::new("/home/u")));
        assert_eq!(paths[0], PathBuf::from("/home/u/.claude/local/claude"));
        assert!(paths.contains(&PathBuf::from("/usr/local/bin/claude")));

        let without_home = catalog.get(ProviderId::Claude).candidate_paths(None);
        assert!(without_home.iter().all(|p| p.is_absolute()));
    }

    #[test]
    fn test_overrides_applied() {
        let mut overrides = ProvidersConfig::default();
        overrides.codex = ProviderOverride {
            binary: Some(PathBuf::from("/opt/codex")),
            env: HashMap::from([("CODEX_HOME".to_string(), "/tmp/codex".to_string())]),
        };
        let catalog = ProviderCatalog::with_overrides(&overrides);
        let codex = catalog.get(ProviderId::Codex);
        assert_eq!(codex.binary_override, Some(PathBuf::from("/opt/codex")));
        assert_eq!(codex.extra_env.get("CODEX_HOME").map(String::as_str), Some("/tmp/codex"));
        assert!(catalog.get(ProviderId::Claude).binary_override.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_binary_searches_path() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("codex");
        std::fs::write(&bin, "#!/bin/sh\n").unwrap();

        let env = HostEnvironment::from_vars(
            [("PATH", dir.path().display().to_string())],
            Some(PathBuf::from("/nonexistent-home")),
        );
        let catalog = ProviderCatalog::builtin();
        let found = resolve_binary(catalog.get(ProviderId::Codex), &env);
        // A system-wide install in a candidate path would win over PATH.
        assert!(found.is_some());
    }

    #[test]
    fn test_resolve_binary_override_missing() {
        let mut overrides = ProvidersConfig::default();
        overrides.claude.binary = Some(PathBuf::from("/nonexistent/claude"));
        let catalog = ProviderCatalog::with_overrides(&overrides);
        let env = HostEnvironment::default();
        assert!(resolve_binary(catalog.get(ProviderId::Claude), &env).is_none());
    }
}
