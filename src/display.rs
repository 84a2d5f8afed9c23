//! Colored CLI display utilities.
//!
//! Session status lines go to stderr so that terminal output forwarded to
//! stdout stays byte-for-byte intact.

use std::io::{self, Write};

use chrono::Utc;
use owo_colors::OwoColorize;

use crate::classifier::{Classification, CliState};
use crate::preflight::Readiness;
use crate::provider::ProviderConfig;
use crate::terminal::{SessionId, TerminalSize};

/// Get current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Truncate a string to at most `max_chars` characters, adding an ellipsis.
#[must_use]
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    if max_chars <= 3 {
        return "...".to_string();
    }
    let head: String = s.chars().take(max_chars - 3).collect();
    format!("{head}...")
}

/// Print one catalog entry with its resolved binary, if any.
pub fn print_provider(
    provider: &ProviderConfig,
    binary: Option<&std::path::Path>,
    home: Option<&std::path::Path>,
) {
    let location = match binary {
        Some(path) => path.display().to_string().green().to_string(),
        None => "not installed".red().to_string(),
    };
    println!(
        "{} {} ({})",
        provider.id.as_str().cyan().bold(),
        provider.display_name,
        location
    );
    println!(
        "    models: {}  plan mode: {}",
        provider.default_models.join(", ").dimmed(),
        if provider.supports_plan_mode { "yes" } else { "no" }
    );
    if let Some(home) = home {
        println!("    config: {}", provider.config_dir(home).display().dimmed());
    }
    if binary.is_none() {
        println!("    install: {}", provider.install_command.dimmed());
    }
    let _ = io::stdout().flush();
}

/// Print a preflight result.
pub fn print_readiness(provider: &ProviderConfig, readiness: &Readiness) {
    let ts = timestamp();
    if readiness.ready {
        println!(
            "{} {} {} - {}",
            ts.dimmed(),
            "[CHECK]".magenta().bold(),
            provider.display_name.cyan(),
            "ready".green()
        );
    } else {
        println!(
            "{} {} {} - {}: {}",
            ts.dimmed(),
            "[CHECK]".magenta().bold(),
            provider.display_name.cyan(),
            "not ready".red(),
            readiness.reason.as_deref().unwrap_or("unknown reason")
        );
    }
    let _ = io::stdout().flush();
}

/// Print a classifier verdict.
pub fn print_classification(classification: &Classification) {
    let state = match classification.state {
        CliState::Working => "working".yellow().bold().to_string(),
        CliState::Waiting => "waiting".green().bold().to_string(),
        CliState::Unknown => "unknown".dimmed().to_string(),
    };
    match &classification.pattern {
        Some(pattern) => println!("{state} {}", truncate(pattern, 60).dimmed()),
        None => println!("{state}"),
    }
    let _ = io::stdout().flush();
}

/// Print session start information.
pub fn print_session_start(id: &SessionId, size: TerminalSize) {
    eprintln!(
        "{} {} {} {}x{}",
        timestamp().dimmed(),
        "[SESSION]".blue().bold(),
        id.as_str().cyan(),
        size.cols,
        size.rows
    );
}

/// Print session exit information.
pub fn print_session_exit(id: &SessionId, exit_code: i32) {
    let code = if exit_code == 0 {
        exit_code.green().to_string()
    } else {
        exit_code.red().to_string()
    };
    eprintln!(
        "{} {} {} exited with code {}",
        timestamp().dimmed(),
        "[SESSION]".blue().bold(),
        id.as_str().cyan(),
        code
    );
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), message);
}
