//! agent-terminal - PTY sessions, output buffering and state detection for agent CLIs.

pub mod classifier;
pub mod config;
pub mod display;
pub mod preflight;
pub mod provider;
pub mod terminal;
