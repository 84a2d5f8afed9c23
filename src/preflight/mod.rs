//! Provider readiness checks and credential lookup.

mod check;
mod credentials;

pub use check::*;
pub use credentials::*;
