//! Pseudo-terminal process wrapper using portable-pty.
//!
//! A `PtyProcess` owns the master side of one PTY and a killer for its
//! child. Output and exit are delivered as `PtyOutput` messages on an
//! unbounded channel fed by two blocking threads: one reading the master,
//! one waiting on the child.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use tokio::sync::mpsc;

use super::{TerminalError, TerminalSize};

/// Read chunk size for the output thread.
const READ_CHUNK: usize = 4096;

/// How long the exit waiter lets the reader drain before reporting exit.
pub const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(200);

/// Exit code reported when the child's status could not be collected.
pub const UNKNOWN_EXIT_CODE: i32 = -1;

/// Message produced by a running PTY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PtyOutput {
    /// Raw bytes read from the master, in production order.
    Data(Vec<u8>),
    /// The child exited; always the last message.
    Exit(i32),
}

/// What to run inside a new PTY.
#[derive(Debug, Clone)]
pub struct PtySpawn {
    pub program: String,
    pub args: Vec<String>,
    /// Complete environment for the child; the host environment is not inherited.
    pub env: HashMap<String, String>,
    pub cwd: Option<PathBuf>,
    pub size: TerminalSize,
}

impl PtySpawn {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
            size: TerminalSize::default(),
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

    #[must_use]
    pub fn env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    #[must_use]
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    #[must_use]
    pub fn size(mut self, size: TerminalSize) -> Self {
        self.size = size;
        self
    }

    fn command(&self) -> CommandBuilder {
        let mut cmd = CommandBuilder::new(&self.program);
        cmd.args(&self.args);
        cmd.env_clear();
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &self.cwd {
            cmd.cwd(dir);
        }
        cmd
    }
}

/// A running process attached to a pseudo-terminal.
pub struct PtyProcess {
    /// Kept for resize; `MasterPty` is not `Sync`.
    master: Mutex<Box<dyn MasterPty + Send>>,
    writer: Mutex<Box<dyn Write + Send>>,
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
    pid: Option<u32>,
    exited: Arc<AtomicBool>,
    killed: AtomicBool,
}

impl std::fmt::Debug for PtyProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyProcess")
            .field("pid", &self.pid)
            .field("exited", &self.has_exited())
            .finish_non_exhaustive()
    }
}

fn pty_size(size: TerminalSize) -> PtySize {
    PtySize {
        rows: size.rows,
        cols: size.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

impl PtyProcess {
    /// Open a PTY and spawn `spec` inside it.
    ///
    /// Returns the process and the receiving end of its output channel.
    ///
    /// # Errors
    ///
    /// Returns `TerminalError::SpawnFailed` if the PTY cannot be opened, the
    /// program cannot be started, or the I/O threads cannot be created. No
    /// child is left running on error.
    pub fn spawn(
        spec: &PtySpawn,
    ) -> Result<(Self, mpsc::UnboundedReceiver<PtyOutput>), TerminalError> {
        let pair = native_pty_system()
            .openpty(pty_size(spec.size))
            .map_err(|e| TerminalError::spawn(format!("failed to open PTY: {e}")))?;

        let mut child = pair
            .slave
            .spawn_command(spec.command())
            .map_err(|e| TerminalError::spawn(format!("{}: {e}", spec.program)))?;
        drop(pair.slave);

        let pid = child.process_id();
        let killer = child.clone_killer();

        let io = pair
            .master
            .try_clone_reader()
            .and_then(|reader| Ok((reader, pair.master.take_writer()?)));
        let (reader, writer) = match io {
            Ok(io) => io,
            Err(e) => {
                kill_and_reap(child.as_mut());
                return Err(TerminalError::spawn(format!("failed to attach to PTY: {e}")));
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let exited = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = std_mpsc::channel::<()>();

        let reader_tx = tx.clone();
        let reader_thread = thread::Builder::new()
            .name(format!("pty-reader-{}", pid.unwrap_or_default()))
            .spawn(move || read_loop(reader, &reader_tx, done_tx));
        if let Err(e) = reader_thread {
            kill_and_reap(child.as_mut());
            return Err(TerminalError::spawn(format!("failed to start reader: {e}")));
        }

        // The child is handed over only once the waiter thread exists, so a
        // failed thread spawn still leaves it here to be reaped.
        let (child_tx, child_rx) = std_mpsc::channel::<Box<dyn Child + Send + Sync>>();
        let waiter_exited = Arc::clone(&exited);
        let waiter_thread = thread::Builder::new()
            .name(format!("pty-waiter-{}", pid.unwrap_or_default()))
            .spawn(move || {
                let Ok(mut child) = child_rx.recv() else {
                    return;
                };
                let code = match child.wait() {
                    Ok(status) => i32::try_from(status.exit_code()).unwrap_or(UNKNOWN_EXIT_CODE),
                    Err(e) => {
                        tracing::debug!(error = %e, "Failed to collect PTY child status");
                        UNKNOWN_EXIT_CODE
                    }
                };
                waiter_exited.store(true, Ordering::SeqCst);
                // Either the reader finishes or the grace period elapses.
                let _ = done_rx.recv_timeout(EXIT_DRAIN_GRACE);
                let _ = tx.send(PtyOutput::Exit(code));
            });
        if let Err(e) = waiter_thread {
            kill_and_reap(child.as_mut());
            return Err(TerminalError::spawn(format!("failed to start waiter: {e}")));
        }
        if let Err(std_mpsc::SendError(mut child)) = child_tx.send(child) {
            kill_and_reap(child.as_mut());
            return Err(TerminalError::spawn("waiter exited before taking the child"));
        }

        tracing::debug!(
            program = %spec.program,
            pid = ?pid,
            cols = spec.size.cols,
            rows = spec.size.rows,
            "PTY spawned"
        );

        Ok((
            Self {
                master: Mutex::new(pair.master),
                writer: Mutex::new(writer),
                killer: Mutex::new(killer),
                pid,
                exited,
                killed: AtomicBool::new(false),
            },
            rx,
        ))
    }

    /// OS process id of the child, if known.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the child has exited or been killed.
    #[must_use]
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst) || self.killed.load(Ordering::SeqCst)
    }

    /// Write bytes to the child's input.
    ///
    /// # Errors
    ///
    /// Returns `TerminalError::ProcessExited` once the child is gone, or an
    /// I/O error if the write fails.
    pub fn write(&self, data: &[u8]) -> Result<(), TerminalError> {
        if self.has_exited() {
            return Err(TerminalError::ProcessExited);
        }
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(data)?;
        writer.flush()?;
        Ok(())
    }

    /// Resize the terminal.
    ///
    /// # Errors
    ///
    /// Returns `TerminalError::Resize` if the PTY rejects the new size.
    pub fn resize(&self, size: TerminalSize) -> Result<(), TerminalError> {
        let master = self.master.lock().unwrap_or_else(PoisonError::into_inner);
        master
            .resize(pty_size(size))
            .map_err(|e| TerminalError::Resize(e.to_string()))
    }

    /// Kill the child. Calling this more than once is harmless.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the signal could not be delivered to a child
    /// that has not yet exited.
    pub fn kill(&self) -> Result<(), TerminalError> {
        if self.killed.swap(true, Ordering::SeqCst) || self.exited.load(Ordering::SeqCst) {
            return Ok(());
        }
        let mut killer = self.killer.lock().unwrap_or_else(PoisonError::into_inner);
        killer.kill()?;
        Ok(())
    }
}

/// Kill a child that never got a waiter thread and collect its status.
fn kill_and_reap(child: &mut (dyn Child + Send + Sync)) {
    if let Err(e) = child.kill() {
        tracing::debug!(error = %e, "Failed to kill PTY child");
    }
    match child.wait() {
        Ok(status) => tracing::debug!(exit_code = status.exit_code(), "Reaped PTY child"),
        Err(e) => tracing::debug!(error = %e, "Failed to reap PTY child"),
    }
}

fn read_loop(
    mut reader: Box<dyn Read + Send>,
    tx: &mpsc::UnboundedSender<PtyOutput>,
    _done: std_mpsc::Sender<()>,
) {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf) {
            // EIO on Linux once the slave side closes.
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if tx.send(PtyOutput::Data(buf[..n].to_vec())).is_err() {
                    break;
                }
            }
        }
    }
    // `_done` drops here, releasing the exit waiter.
}

/// Incremental UTF-8 decoder that holds back a sequence split across reads.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a chunk, keeping any incomplete trailing sequence for the next call.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let split = match std::str::from_utf8(&self.pending) {
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            _ => self.pending.len(),
        };
        let rest = self.pending.split_off(split);
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending = rest;
        text
    }

    /// Flush whatever is still pending, lossily.
    pub fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}
