//! Teardown of sessions driven by UI lifecycle events.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{SessionRegistry, SurfaceId};

/// Lifecycle notifications from the UI host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A window or renderer was destroyed.
    SurfaceDestroyed(SurfaceId),
    /// The application is shutting down.
    AppQuitting,
}

/// Disposes sessions when their owning surface goes away or the app quits.
///
/// All disposal funnels through `SessionRegistry::stop`, so a session whose
/// own exit races with forced teardown is stopped only once.
#[derive(Debug, Clone)]
pub struct LifecycleSupervisor {
    registry: SessionRegistry,
}

impl LifecycleSupervisor {
    #[must_use]
    pub fn new(registry: SessionRegistry) -> Self {
        Self { registry }
    }

    /// Apply one event. Returns the number of sessions disposed.
    pub fn handle(&self, event: &LifecycleEvent) -> usize {
        match event {
            LifecycleEvent::SurfaceDestroyed(surface) => {
                let stopped = self.registry.stop_owned_by(surface);
                self.registry.router().unregister(surface);
                tracing::info!(surface = %surface, stopped, "Surface destroyed");
                stopped
            }
            LifecycleEvent::AppQuitting => {
                let stopped = self.registry.stop_all();
                tracing::info!(stopped, "Application quitting, all sessions stopped");
                stopped
            }
        }
    }

    /// Consume lifecycle events until the channel closes, `cancel` fires, or
    /// the application quits. Remaining sessions are stopped on the way out.
    pub async fn run(self, mut events: mpsc::Receiver<LifecycleEvent>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!("Lifecycle supervisor cancelled");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => {
                        self.handle(&event);
                        if event == LifecycleEvent::AppQuitting {
                            return;
                        }
                    }
                    None => {
                        tracing::debug!("Lifecycle channel closed");
                        break;
                    }
                },
            }
        }
        self.handle(&LifecycleEvent::AppQuitting);
    }

    /// Run the supervisor on the current runtime.
    #[must_use]
    pub fn spawn(
        self,
        events: mpsc::Receiver<LifecycleEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(events, cancel))
    }
}
