//! Child environment construction.
//!
//! Sessions never inherit the host environment directly. A snapshot of it is
//! sanitized (markers that tell a CLI it is running inside another agent are
//! removed) and then overlaid with provider-specific variables.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Variables set by coding-agent CLIs for their own children. Leaving them in
/// place makes a nested `claude`/`codex` believe it is a sub-process.
pub const AGENT_MARKER_VARS: &[&str] = &[
    "CLAUDECODE",
    "CLAUDE_CODE_ENTRYPOINT",
    "CLAUDE_CODE_SSE_PORT",
    "CODEX_SANDBOX",
    "CODEX_SANDBOX_NETWORK_DISABLED",
    "CODEX_MANAGED_BY_NPM",
];

/// Variables forced on every session.
const TERMINAL_VARS: &[(&str, &str)] = &[("TERM", "xterm-256color"), ("COLORTERM", "truecolor")];

/// Snapshot of the host process environment and home directory.
#[derive(Debug, Clone, Default)]
pub struct HostEnvironment {
    vars: HashMap<String, String>,
    home: Option<PathBuf>,
}

impl HostEnvironment {
    /// Capture the current process environment.
    #[must_use]
    pub fn capture() -> Self {
        Self {
            vars: std::env::vars().collect(),
            home: dirs::home_dir(),
        }
    }

    /// Build an environment from explicit values (for tests and embedding).
    #[must_use]
    pub fn from_vars<I, K, V>(vars: I, home: Option<PathBuf>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            home,
        }
    }

    /// Look up a variable, treating empty values as unset.
    #[must_use]
    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    #[must_use]
    pub fn vars(&self) -> &HashMap<String, String> {
        &self.vars
    }

    #[must_use]
    pub fn home(&self) -> Option<&Path> {
        self.home.as_deref()
    }

    /// Set a variable on the snapshot.
    pub fn set_var(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// The user's interactive shell.
    #[must_use]
    pub fn default_shell(&self) -> String {
        #[cfg(windows)]
        {
            self.var("COMSPEC")
                .map_or_else(|| "powershell.exe".to_string(), str::to_string)
        }

        #[cfg(not(windows))]
        {
            self.var("SHELL")
                .map_or_else(|| "/bin/bash".to_string(), str::to_string)
        }
    }

    /// Entries of `PATH`, in order.
    #[must_use]
    pub fn path_entries(&self) -> Vec<PathBuf> {
        self.var("PATH")
            .map(|p| std::env::split_paths(p).collect())
            .unwrap_or_default()
    }
}

/// Build a child environment.
///
/// Keys in `strip` are removed from both `base` and `overlay`. Overlay
/// entries are added only where `base` has no non-empty value. Terminal
/// capability variables are always set.
#[must_use]
pub fn build_environment<S: AsRef<str>>(
    base: &HashMap<String, String>,
    overlay: &HashMap<String, String>,
    strip: &[S],
) -> HashMap<String, String> {
    let stripped = |key: &str| strip.iter().any(|s| s.as_ref() == key);

    let mut env: HashMap<String, String> = base
        .iter()
        .filter(|(k, _)| !stripped(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    for (key, value) in overlay {
        if stripped(key) {
            continue;
        }
        let already_set = env.get(key).is_some_and(|v| !v.is_empty());
        if !already_set {
            env.insert(key.clone(), value.clone());
        }
    }

    for (key, value) in TERMINAL_VARS {
        env.insert((*key).to_string(), (*value).to_string());
    }

    env
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn strips_agent_markers() {
        let base = map(&[("PATH", "/usr/bin"), ("CLAUDECODE", "1"), ("CODEX_SANDBOX", "seatbelt")]);
        let env = build_environment(&base, &HashMap::new(), AGENT_MARKER_VARS);
        assert_eq!(env.get("PATH").map(String::as_str), Some("/usr/bin"));
        assert!(!env.contains_key("CLAUDECODE"));
        assert!(!env.contains_key("CODEX_SANDBOX"));
    }

    #[test]
    fn overlay_adds_missing_keys() {
        let base = map(&[("HOME", "/home/u")]);
        let overlay = map(&[("OPENAI_API_KEY", "sk-test")]);
        let env = build_environment(&base, &overlay, AGENT_MARKER_VARS);
        assert_eq!(env.get("OPENAI_API_KEY").map(String::as_str), Some("sk-test"));
    }

    #[test]
    fn overlay_does_not_replace_existing_value() {
        let base = map(&[("OPENAI_API_KEY", "from-shell")]);
        let overlay = map(&[("OPENAI_API_KEY", "from-store")]);
        let env = build_environment(&base, &overlay, AGENT_MARKER_VARS);
        assert_eq!(
            env.get("OPENAI_API_KEY").map(String::as_str),
            Some("from-shell")
        );
    }

    #[test]
    fn overlay_fills_empty_value() {
        let base = map(&[("OPENAI_API_KEY", "")]);
        let overlay = map(&[("OPENAI_API_KEY", "from-store")]);
        let env = build_environment(&base, &overlay, AGENT_MARKER_VARS);
        assert_eq!(
            env.get("OPENAI_API_KEY").map(String::as_str),
            Some("from-store")
        );
    }

    #[test]
    fn stripped_keys_cannot_come_back_through_overlay() {
        let overlay = map(&[("CLAUDECODE", "1")]);
        let env = build_environment(&HashMap::new(), &overlay, AGENT_MARKER_VARS);
        assert!(!env.contains_key("CLAUDECODE"));
    }

    #[test]
    fn terminal_vars_are_forced() {
        let base = map(&[("TERM", "dumb")]);
        let env = build_environment(&base, &HashMap::new(), &[] as &[&str]);
        assert_eq!(env.get("TERM").map(String::as_str), Some("xterm-256color"));
        assert_eq!(env.get("COLORTERM").map(String::as_str), Some("truecolor"));
    }

    #[test]
    fn host_environment_treats_empty_as_unset() {
        let host = HostEnvironment::from_vars([("EMPTY", ""), ("SET", "x")], None);
        assert_eq!(host.var("EMPTY"), None);
        assert_eq!(host.var("SET"), Some("x"));
        assert_eq!(host.var("MISSING"), None);
    }

    #[cfg(not(windows))]
    #[test]
    fn default_shell_falls_back_to_bash() {
        let host = HostEnvironment::from_vars(Vec::<(String, String)>::new(), None);
        assert_eq!(host.default_shell(), "/bin/bash");

        let host = HostEnvironment::from_vars([("SHELL", "/bin/zsh")], None);
        assert_eq!(host.default_shell(), "/bin/zsh");
    }

    #[cfg(unix)]
    #[test]
    fn path_entries_split_on_colon() {
        let host = HostEnvironment::from_vars([("PATH", "/usr/local/bin:/usr/bin")], None);
        assert_eq!(
            host.path_entries(),
            vec![PathBuf::from("/usr/local/bin"), PathBuf::from("/usr/bin")]
        );
    }
}
