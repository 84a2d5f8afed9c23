//! Integration tests for agent-terminal.

#[cfg(unix)]
mod terminal;
