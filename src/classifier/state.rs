//! Coarse activity state inferred from a CLI's terminal output.

use std::fmt;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::provider::{ProviderCatalog, ProviderConfig, ProviderId};

/// Non-blank lines at the end of the output searched for waiting patterns.
pub const WAITING_WINDOW_LINES: usize = 6;

/// Trailing bytes of output searched for working patterns.
pub const WORKING_WINDOW_BYTES: usize = 2000;

/// Inferred state of a supervised CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CliState {
    /// The CLI is busy producing output.
    Working,
    /// The CLI shows a prompt or asks the user something.
    Waiting,
    /// Nothing recognisable. Carries no information.
    Unknown,
}

impl CliState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Working => "working",
            Self::Waiting => "waiting",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CliState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification result with the pattern that decided it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub state: CliState,
    /// Source of the first matching pattern, if any.
    pub pattern: Option<String>,
}

impl Classification {
    fn unknown() -> Self {
        Self {
            state: CliState::Unknown,
            pattern: None,
        }
    }

    fn matched(state: CliState, re: &Regex) -> Self {
        Self {
            state,
            pattern: Some(re.as_str().to_string()),
        }
    }
}

fn ansi_regex() -> Option<&'static Regex> {
    static ANSI: OnceLock<Option<Regex>> = OnceLock::new();
    ANSI.get_or_init(|| {
        // CSI, OSC (BEL or ST terminated), then two-byte escapes.
        Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[@-Z\\-_]")
            .inspect_err(|e| tracing::warn!(error = %e, "Failed to compile ANSI pattern"))
            .ok()
    })
    .as_ref()
}

/// Remove terminal escape sequences and carriage returns.
#[must_use]
pub fn strip_ansi(text: &str) -> String {
    match ansi_regex() {
        Some(re) => re.replace_all(text, "").replace('\r', ""),
        None => text.replace('\r', ""),
    }
}

/// The last `n` non-blank lines, each with trailing whitespace removed.
fn waiting_window(text: &str, n: usize) -> String {
    let mut lines: Vec<&str> = text
        .lines()
        .rev()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .take(n)
        .collect();
    lines.reverse();
    lines.join("\n")
}

/// The last `n` bytes of `text`, widened to the next char boundary.
fn working_window(text: &str, n: usize) -> &str {
    let mut start = text.len().saturating_sub(n);
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

/// Classify output for one provider and report the deciding pattern.
///
/// Waiting patterns are tried first against the last few non-blank lines,
/// then the provider's prompt pattern against the last non-blank line alone;
/// a prompt on screen means the program is not doing work. Working patterns
/// are then tried against the trailing [`WORKING_WINDOW_BYTES`].
#[must_use]
pub fn classify_detailed(provider: &ProviderConfig, text: &str) -> Classification {
    let clean = strip_ansi(text);

    let tail = waiting_window(&clean, WAITING_WINDOW_LINES);
    if let Some(re) = provider.patterns.waiting().iter().find(|re| re.is_match(&tail)) {
        return Classification::matched(CliState::Waiting, re);
    }
    let last_line = tail.rsplit('\n').next().unwrap_or_default();
    if let Some(re) = provider.patterns.prompt().filter(|re| re.is_match(last_line)) {
        return Classification::matched(CliState::Waiting, re);
    }

    let recent = working_window(&clean, WORKING_WINDOW_BYTES);
    if let Some(re) = provider.patterns.working().iter().find(|re| re.is_match(recent)) {
        return Classification::matched(CliState::Working, re);
    }

    Classification::unknown()
}

/// Classify output for one provider.
#[must_use]
pub fn classify(provider: &ProviderConfig, text: &str) -> CliState {
    classify_detailed(provider, text).state
}

/// Classifier bound to a provider catalog.
#[derive(Debug, Clone)]
pub struct StateClassifier {
    catalog: Arc<ProviderCatalog>,
}

impl StateClassifier {
    #[must_use]
    pub fn new(catalog: Arc<ProviderCatalog>) -> Self {
        Self { catalog }
    }

    #[must_use]
    pub fn classify(&self, provider: ProviderId, text: &str) -> CliState {
        let state = classify(self.catalog.get(provider), text);
        tracing::trace!(provider = %provider, state = %state, "Classified output");
        state
    }

    #[must_use]
    pub fn classify_detailed(&self, provider: ProviderId, text: &str) -> Classification {
        classify_detailed(self.catalog.get(provider), text)
    }
}
