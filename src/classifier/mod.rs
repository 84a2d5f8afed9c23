//! Heuristic classification of agent CLI output.

mod state;

pub use state::*;
