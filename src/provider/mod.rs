//! Provider catalog: supported agent CLIs and their output patterns.

mod catalog;
mod patterns;

pub use catalog::*;
pub use patterns::{PatternError, PatternTable};
