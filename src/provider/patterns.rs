//! Regex tables used to infer a CLI's state from its terminal output.

use regex::Regex;

/// Error type for pattern compilation.
#[derive(thiserror::Error, Debug)]
pub enum PatternError {
    /// Invalid regex pattern.
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Compiled pattern tables for one provider.
#[derive(Debug, Clone)]
pub struct PatternTable {
    prompt: Option<Regex>,
    working: Vec<Regex>,
    waiting: Vec<Regex>,
}

impl PatternTable {
    /// Compile a table from pattern strings.
    ///
    /// # Errors
    ///
    /// Returns `PatternError::InvalidPattern` if any pattern fails to compile.
    pub fn new(prompt: &str, working: &[&str], waiting: &[&str]) -> Result<Self, PatternError> {
        Ok(Self {
            prompt: Some(Regex::new(prompt)?),
            working: working
                .iter()
                .map(|p| Regex::new(p))
                .collect::<Result<_, _>>()?,
            waiting: waiting
                .iter()
                .map(|p| Regex::new(p))
                .collect::<Result<_, _>>()?,
        })
    }

    /// Compile built-in tables, skipping (and logging) patterns that fail.
    pub(crate) fn lenient(prompt: &str, working: &[&str], waiting: &[&str]) -> Self {
        let compile = |patterns: &[&str]| -> Vec<Regex> {
            patterns
                .iter()
                .filter_map(|p| match Regex::new(p) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        tracing::warn!(pattern = %p, error = %e, "Failed to compile state pattern");
                        None
                    }
                })
                .collect()
        };

        let prompt = Regex::new(prompt)
            .inspect_err(|e| {
                tracing::warn!(pattern = %prompt, error = %e, "Failed to compile prompt pattern");
            })
            .ok();

        Self {
            prompt,
            working: compile(working),
            waiting: compile(waiting),
        }
    }

    /// Pattern matching the CLI's idle input prompt.
    #[must_use]
    pub fn prompt(&self) -> Option<&Regex> {
        self.prompt.as_ref()
    }

    /// Patterns indicating the CLI is busy, in evaluation order.
    #[must_use]
    pub fn working(&self) -> &[Regex] {
        &self.working
    }

    /// Patterns indicating the CLI waits for the user, in evaluation order.
    #[must_use]
    pub fn waiting(&self) -> &[Regex] {
        &self.waiting
    }
}

/// Braille and star spinner frames used by agent CLIs.
pub(crate) const SPINNER_GLYPHS: &str = r"[⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏✻✽✶✳✢∗]";

/// A trailing shell prompt (`$`, `#`, or `host%`; not a progress percentage).
pub(crate) const SHELL_PROMPT: &str = r"(?:[$#]|[^\d\s%]%)\s*$";

pub(crate) const CLAUDE_PROMPT: &str = r"(?m)^\s*[>❯]\s*$";

pub(crate) const CLAUDE_WORKING: &[&str] = &[
    r"(?i)esc to interrupt",
    SPINNER_GLYPHS,
    r"(?i)\b(thinking|pondering|reading|writing|running|searching|analyzing|editing|updating|compiling|building|installing|testing)\b[^\n]*(…|\.\.\.)",
    r"(?i)\b(npm|pnpm|yarn|cargo|pip|go|make)\s+(install|build|test|run)\b",
    r"(?m)^\s*⏺ (Bash|Read|Write|Edit|Update|Search|Task)\(",
];

pub(crate) const CLAUDE_WAITING: &[&str] = &[
    r"(?i)do you want to (proceed|continue|make this edit|create|allow)",
    r"(?m)^\s*❯\s*\d+\.\s+(Yes|No)",
    r"(?i)\(y/n\)|\[y/N\]|\[Y/n\]",
    r"(?i)press enter to continue",
    r"(?i)waiting for (your )?(input|approval|response)",
    SHELL_PROMPT,
];

pub(crate) const CODEX_PROMPT: &str = r"(?m)^\s*[›▌>]\s*$";

pub(crate) const CODEX_WORKING: &[&str] = &[
    r"(?i)esc to interrupt",
    SPINNER_GLYPHS,
    r"(?i)\bworking\b\s*\(",
    r"(?i)\b(thinking|exploring|running|reading|editing|searching|applying patch)\b",
    r"(?i)\b(npm|pnpm|yarn|cargo|pip|go|make)\s+(install|build|test|run)\b",
];

pub(crate) const CODEX_WAITING: &[&str] = &[
    r"(?i)allow (command|codex)",
    r"(?i)approve (this|the) (command|change|patch)",
    r"(?i)\(y/n\)|\[y/N\]|\[Y/n\]",
    r"(?i)press enter to (confirm|continue)",
    SHELL_PROMPT,
];
