//! Session events and per-surface routing.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::{SessionId, SurfaceId};

/// Event pushed to the surface that owns a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Output produced by the session's process.
    Data { session_id: SessionId, data: String },
    /// The session's process exited.
    Exit { session_id: SessionId, exit_code: i32 },
}

impl SessionEvent {
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::Data { session_id, .. } | Self::Exit { session_id, .. } => session_id,
        }
    }
}

/// Delivers session events to UI surfaces.
///
/// Each registered surface gets its own unbounded channel, so events for one
/// session arrive in production order and a slow surface never blocks another.
#[derive(Debug, Default)]
pub struct SurfaceRouter {
    surfaces: Mutex<HashMap<SurfaceId, mpsc::UnboundedSender<SessionEvent>>>,
}

impl SurfaceRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a surface and return its event stream.
    ///
    /// Registering an id again replaces the previous stream.
    pub fn register(&self, surface: SurfaceId) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut surfaces = self.surfaces.lock().unwrap_or_else(PoisonError::into_inner);
        if surfaces.insert(surface.clone(), tx).is_some() {
            tracing::debug!(surface = %surface, "Replaced existing surface registration");
        }
        rx
    }

    /// Forget a surface. Returns whether it was registered.
    pub fn unregister(&self, surface: &SurfaceId) -> bool {
        let mut surfaces = self.surfaces.lock().unwrap_or_else(PoisonError::into_inner);
        surfaces.remove(surface).is_some()
    }

    #[must_use]
    pub fn is_registered(&self, surface: &SurfaceId) -> bool {
        let surfaces = self.surfaces.lock().unwrap_or_else(PoisonError::into_inner);
        surfaces.contains_key(surface)
    }

    /// Send an event to `surface`.
    ///
    /// Returns `false` if the surface is unknown or its receiver is gone; a
    /// closed receiver also unregisters the surface.
    pub fn emit(&self, surface: &SurfaceId, event: SessionEvent) -> bool {
        let mut surfaces = self.surfaces.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = surfaces.get(surface) else {
            tracing::trace!(surface = %surface, session_id = %event.session_id(), "No surface for event");
            return false;
        };
        if tx.send(event).is_err() {
            tracing::debug!(surface = %surface, "Surface receiver dropped, unregistering");
            surfaces.remove(surface);
            return false;
        }
        true
    }
}
