//! Session registry.
//!
//! Owns every live terminal session, keyed by `SessionId`, and mediates all
//! operations on them. Each session gets one pump task that moves PTY output
//! into the session's ring buffer and on to the owning surface.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::env::{build_environment, HostEnvironment, AGENT_MARKER_VARS};
use super::pty::{PtyOutput, PtyProcess, PtySpawn, Utf8Decoder};
use super::{
    RingBuffer, SessionEvent, SessionId, SessionInfo, SurfaceId, SurfaceRouter, TerminalError,
    TerminalSize,
};
use crate::config::TerminalConfig;
use crate::provider::ProviderId;

/// Program and arguments to run instead of the user's shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl SessionCommand {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// Parameters for `SessionRegistry::create`.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    /// Columns; zero falls back to the configured default.
    pub cols: u16,
    /// Rows; zero falls back to the configured default.
    pub rows: u16,
    /// Additive overlay on the sanitized host environment.
    pub env: HashMap<String, String>,
    /// Surface that receives this session's events.
    pub owner: SurfaceId,
    /// Provider the caller intends to drive in this session.
    pub provider: Option<ProviderId>,
    /// Program to run; `None` starts the user's shell.
    pub command: Option<SessionCommand>,
    /// Working directory; defaults to the home directory.
    pub cwd: Option<PathBuf>,
}

impl CreateRequest {
    #[must_use]
    pub fn new(owner: impl Into<SurfaceId>) -> Self {
        Self {
            cols: 0,
            rows: 0,
            env: HashMap::new(),
            owner: owner.into(),
            provider: None,
            command: None,
            cwd: None,
        }
    }

    #[must_use]
    pub fn size(mut self, cols: u16, rows: u16) -> Self {
        self.cols = cols;
        self.rows = rows;
        self
    }

    #[must_use]
    pub fn env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    #[must_use]
    pub fn provider(mut self, provider: ProviderId) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn command(mut self, command: SessionCommand) -> Self {
        self.command = Some(command);
        self
    }

    #[must_use]
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

struct Session {
    seq: u64,
    process: Arc<PtyProcess>,
    size: TerminalSize,
    owner: SurfaceId,
    provider: Option<ProviderId>,
    buffer: Arc<Mutex<RingBuffer>>,
    pump: Option<JoinHandle<()>>,
    created_at: DateTime<Utc>,
}

impl Session {
    /// Release the output subscription, then the process.
    fn dispose(&mut self) -> Result<(), TerminalError> {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.process.kill()
    }
}

struct Inner {
    sessions: Mutex<HashMap<SessionId, Session>>,
    next_id: AtomicU64,
    router: Arc<SurfaceRouter>,
    host: HostEnvironment,
    config: TerminalConfig,
}

impl Inner {
    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionId, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let sessions = self
            .sessions
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for (id, mut session) in sessions.drain() {
            if let Err(e) = session.dispose() {
                tracing::warn!(session_id = %id, error = %e, "Failed to dispose session on shutdown");
            }
        }
    }
}

/// Registry of live terminal sessions.
///
/// Cloning is cheap; all clones share the same sessions.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .finish_non_exhaustive()
    }
}

impl SessionRegistry {
    /// Create a registry that routes events through `router`.
    #[must_use]
    pub fn new(config: TerminalConfig, host: HostEnvironment, router: Arc<SurfaceRouter>) -> Self {
        Self {
            inner: Arc::new(Inner {
                sessions: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                router,
                host,
                config,
            }),
        }
    }

    /// The router this registry emits to.
    #[must_use]
    pub fn router(&self) -> &Arc<SurfaceRouter> {
        &self.inner.router
    }

    /// Spawn a new session.
    ///
    /// # Errors
    ///
    /// Returns `TerminalError::SpawnFailed` if the process cannot be started.
    /// Nothing is registered and no id is consumed in that case.
    pub async fn create(&self, request: CreateRequest) -> Result<SessionId, TerminalError> {
        let size = TerminalSize::or_fallback(request.cols, request.rows, self.inner.config.default_size());
        let spec = self.spawn_spec(&request, size);
        let program = spec.program.clone();

        let (process, output) = tokio::task::spawn_blocking(move || PtyProcess::spawn(&spec))
            .await
            .map_err(|e| TerminalError::spawn(format!("spawn task failed: {e}")))?
            .inspect_err(|e| tracing::warn!(program = %program, error = %e, "Session spawn failed"))?;

        let pid = process.pid();
        let seq = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let id = SessionId::from_counter(seq);
        let buffer = Arc::new(Mutex::new(RingBuffer::new(self.inner.config.buffer_capacity)));

        let mut sessions = self.inner.sessions();
        let pump = tokio::spawn(pump_output(
            Arc::downgrade(&self.inner),
            id.clone(),
            request.owner.clone(),
            Arc::clone(&buffer),
            output,
        ));
        sessions.insert(
            id.clone(),
            Session {
                seq,
                process: Arc::new(process),
                size,
                owner: request.owner.clone(),
                provider: request.provider,
                buffer,
                pump: Some(pump),
                created_at: Utc::now(),
            },
        );
        drop(sessions);

        tracing::info!(
            session_id = %id,
            owner = %request.owner,
            program = %program,
            pid = ?pid,
            cols = size.cols,
            rows = size.rows,
            "Session created"
        );
        Ok(id)
    }

    fn spawn_spec(&self, request: &CreateRequest, size: TerminalSize) -> PtySpawn {
        let config = &self.inner.config;
        let host = &self.inner.host;

        let (program, args) = match &request.command {
            Some(command) => (command.program.clone(), command.args.clone()),
            None => (
                config.shell.clone().unwrap_or_else(|| host.default_shell()),
                config.shell_args.clone(),
            ),
        };

        let strip: Vec<&str> = AGENT_MARKER_VARS
            .iter()
            .copied()
            .chain(config.strip_env.iter().map(String::as_str))
            .collect();
        let env = build_environment(host.vars(), &request.env, &strip);

        let mut spec = PtySpawn::new(program).args(args).env(env).size(size);
        if let Some(dir) = request.cwd.clone().or_else(|| host.home().map(PathBuf::from)) {
            spec = spec.cwd(dir);
        }
        spec
    }

    /// Forward input to a session. Unknown or exited sessions are ignored.
    pub fn write(&self, id: &SessionId, data: &[u8]) {
        let process = {
            let sessions = self.inner.sessions();
            match sessions.get(id) {
                Some(session) => Arc::clone(&session.process),
                None => return ignore_unknown(id, "write"),
            }
        };

        match process.write(data) {
            Ok(()) => {}
            Err(TerminalError::ProcessExited) => {
                tracing::debug!(session_id = %id, "Write to exited session ignored");
            }
            Err(e) => tracing::warn!(session_id = %id, error = %e, "Write to session failed"),
        }
    }

    /// Write `text` followed by a carriage return.
    pub fn send_line(&self, id: &SessionId, text: &str) {
        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\r');
        self.write(id, line.as_bytes());
    }

    /// Resize a session. Zero dimensions and unknown ids are ignored.
    pub fn resize(&self, id: &SessionId, cols: u16, rows: u16) {
        let Some(size) = TerminalSize::checked(cols, rows) else {
            tracing::debug!(session_id = %id, cols, rows, "Ignoring invalid resize");
            return;
        };

        let mut sessions = self.inner.sessions();
        let Some(session) = sessions.get_mut(id) else {
            return ignore_unknown(id, "resize");
        };
        if session.process.has_exited() {
            tracing::debug!(session_id = %id, "Resize of exited session ignored");
            return;
        }

        match session.process.resize(size) {
            Ok(()) => {
                session.size = size;
                tracing::debug!(session_id = %id, cols, rows, "Session resized");
            }
            Err(e) => tracing::warn!(session_id = %id, error = %e, "Resize failed"),
        }
    }

    /// Buffered output: everything, or only the last `max_lines` lines.
    ///
    /// `Some(0)` is treated like `None` and returns the whole buffer.
    /// Unknown sessions yield an empty string.
    #[must_use]
    pub fn read_buffer(&self, id: &SessionId, max_lines: Option<usize>) -> String {
        let buffer = {
            let sessions = self.inner.sessions();
            match sessions.get(id) {
                Some(session) => Arc::clone(&session.buffer),
                None => {
                    ignore_unknown(id, "read");
                    return String::new();
                }
            }
        };
        let buffer = buffer.lock().unwrap_or_else(PoisonError::into_inner);
        match max_lines {
            Some(lines) if lines > 0 => buffer.tail(lines),
            _ => buffer.snapshot(),
        }
    }

    /// Dispose a session and remove it. Returns whether it was live.
    ///
    /// Disposal failures are logged, never returned.
    pub fn stop(&self, id: &SessionId) -> bool {
        let mut sessions = self.inner.sessions();
        let Some(session) = sessions.get_mut(id) else {
            ignore_unknown(id, "stop");
            return false;
        };

        if let Err(e) = session.dispose() {
            let err = TerminalError::Disposal {
                id: id.clone(),
                message: e.to_string(),
            };
            tracing::warn!(error = %err, "Session disposal failed");
        }
        sessions.remove(id);
        drop(sessions);

        tracing::info!(session_id = %id, "Session stopped");
        true
    }

    /// Stop every session owned by `owner`. Returns how many were stopped.
    pub fn stop_owned_by(&self, owner: &SurfaceId) -> usize {
        let ids: Vec<SessionId> = {
            let sessions = self.inner.sessions();
            sessions
                .iter()
                .filter(|(_, s)| &s.owner == owner)
                .map(|(id, _)| id.clone())
                .collect()
        };
        ids.iter().filter(|id| self.stop(id)).count()
    }

    /// Stop every session. Returns how many were stopped.
    pub fn stop_all(&self) -> usize {
        let ids: Vec<SessionId> = self.inner.sessions().keys().cloned().collect();
        ids.iter().filter(|id| self.stop(id)).count()
    }

    /// Snapshot of live sessions in creation order.
    #[must_use]
    pub fn list(&self) -> Vec<SessionInfo> {
        let sessions = self.inner.sessions();
        let mut entries: Vec<(u64, SessionInfo)> = sessions
            .iter()
            .map(|(id, s)| {
                (
                    s.seq,
                    SessionInfo {
                        id: id.clone(),
                        cols: s.size.cols,
                        rows: s.size.rows,
                        owner: s.owner.clone(),
                        provider: s.provider,
                        created_at: s.created_at,
                    },
                )
            })
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, info)| info).collect()
    }

    #[must_use]
    pub fn contains(&self, id: &SessionId) -> bool {
        self.inner.sessions().contains_key(id)
    }

    /// Provider recorded for a session at creation.
    #[must_use]
    pub fn provider_of(&self, id: &SessionId) -> Option<ProviderId> {
        self.inner.sessions().get(id).and_then(|s| s.provider)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.sessions().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn ignore_unknown(id: &SessionId, op: &'static str) {
    let err = TerminalError::UnknownSession { id: id.clone() };
    tracing::debug!(error = %err, op, "Operation on unknown session ignored");
}

async fn pump_output(
    registry: Weak<Inner>,
    id: SessionId,
    owner: SurfaceId,
    buffer: Arc<Mutex<RingBuffer>>,
    mut output: mpsc::UnboundedReceiver<PtyOutput>,
) {
    let mut decoder = Utf8Decoder::new();

    while let Some(message) = output.recv().await {
        let Some(inner) = registry.upgrade() else {
            break;
        };

        match message {
            PtyOutput::Data(bytes) => {
                buffer
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .append(&bytes);
                let data = decoder.decode(&bytes);
                if !data.is_empty() {
                    inner.router.emit(
                        &owner,
                        SessionEvent::Data {
                            session_id: id.clone(),
                            data,
                        },
                    );
                }
            }
            PtyOutput::Exit(exit_code) => {
                let rest = decoder.finish();
                if !rest.is_empty() {
                    inner.router.emit(
                        &owner,
                        SessionEvent::Data {
                            session_id: id.clone(),
                            data: rest,
                        },
                    );
                }
                tracing::info!(session_id = %id, exit_code, "Session process exited");
                inner.router.emit(
                    &owner,
                    SessionEvent::Exit {
                        session_id: id.clone(),
                        exit_code,
                    },
                );
                SessionRegistry { inner }.stop(&id);
                break;
            }
        }
    }
}
