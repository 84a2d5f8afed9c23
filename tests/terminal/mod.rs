//! Terminal session tests against real pseudo-terminals.

mod lifecycle_test;
mod registry_test;

use std::sync::Arc;
use std::time::Duration;

use agent_terminal::config::TerminalConfig;
use agent_terminal::terminal::{
    HostEnvironment, SessionEvent, SessionId, SessionRegistry, SurfaceRouter,
};
use tokio::sync::mpsc;

pub const WAIT: Duration = Duration::from_secs(10);

/// Terminal config that starts `/bin/sh` without login arguments.
pub fn sh_config() -> TerminalConfig {
    TerminalConfig {
        shell: Some("/bin/sh".to_string()),
        shell_args: Vec::new(),
        ..TerminalConfig::default()
    }
}

/// Registry over `config` with a fresh router.
pub fn registry_with(
    config: TerminalConfig,
    host: HostEnvironment,
) -> (SessionRegistry, Arc<SurfaceRouter>) {
    let router = Arc::new(SurfaceRouter::new());
    let registry = SessionRegistry::new(config, host, Arc::clone(&router));
    (registry, router)
}

/// Registry that starts `/bin/sh` without login arguments.
pub fn sh_registry(host: HostEnvironment) -> (SessionRegistry, Arc<SurfaceRouter>) {
    registry_with(sh_config(), host)
}

/// Host environment with only `PATH` and `HOME` carried over.
pub fn minimal_host() -> HostEnvironment {
    let vars = ["PATH", "HOME"]
        .into_iter()
        .filter_map(|k| std::env::var(k).ok().map(|v| (k.to_string(), v)));
    HostEnvironment::from_vars(vars, std::env::temp_dir().into())
}

/// Poll `condition` until it holds or the wait limit passes.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

/// Collect data for `id` until its exit event. Returns the output and exit code.
pub async fn collect_until_exit(
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
    id: &SessionId,
) -> (String, i32) {
    let mut output = String::new();
    loop {
        let event = tokio::time::timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for session events")
            .expect("event channel closed");
        match event {
            SessionEvent::Data { session_id, data } if &session_id == id => output.push_str(&data),
            SessionEvent::Exit {
                session_id,
                exit_code,
            } if &session_id == id => return (output, exit_code),
            _ => {}
        }
    }
}
