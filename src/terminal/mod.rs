//! Terminal sessions: PTY processes, output buffering, routing and teardown.

mod env;
mod error;
mod events;
mod lifecycle;
mod pty;
mod registry;
mod ring_buffer;
mod types;

pub use env::*;
pub use error::*;
pub use events::*;
pub use lifecycle::*;
pub use pty::*;
pub use registry::*;
pub use ring_buffer::*;
pub use types::*;
