//! PTY-backed remote-shell sessions.
//!
//! A session is one remote-shell client process running under a
//! pseudo-terminal. Output is read by a dedicated thread for the whole life of
//! the session. The thread appends every chunk to the bounded scrollback and
//! hands a copy to the attached consumer, if there is one. It never waits on
//! anybody, so a detached session keeps draining its pty.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use hosts::HostDescriptor;
use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use thiserror::Error;
use tokio::sync::{mpsc, watch};

/// Live pty output for an attached consumer. Yields `None` once the pty
/// reached end of file.
pub type OutputStream = mpsc::UnboundedReceiver<Bytes>;

use super::scrollback::ScrollbackBuffer;

/// Unique identifier for a session. Assigned monotonically, never reused.
pub type SessionId = u64;

/// Errors that can occur during session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The remote-shell process or its pty could not be started.
    #[error("failed to connect to {alias}: {reason}")]
    ConnectionError { alias: String, reason: String },

    /// The pty did not come up within the connect timeout.
    #[error("connection to {alias} timed out after {}s", .timeout.as_secs())]
    ConnectionTimeout { alias: String, timeout: Duration },

    /// Attach was attempted on a session whose process has exited.
    #[error("session {0} has ended")]
    SessionEnded(String),

    /// Reading from or writing to a pty or the terminal failed.
    #[error("I/O failure: {0}")]
    IoFailure(String),

    /// A session or host number outside the current range.
    #[error("{0}")]
    InvalidAddressing(String),

    /// Failed to resize the PTY.
    #[error("failed to resize PTY: {0}")]
    Resize(String),

    /// Failed to signal the process.
    #[error("failed to terminate session: {0}")]
    Terminate(String),
}

/// Buffer size for reading from the PTY.
pub const PTY_READ_BUFFER_SIZE: usize = 4096;

/// Output state shared by a session and its reader thread.
#[derive(Debug)]
struct OutputLog {
    scrollback: ScrollbackBuffer,
    consumer: Option<mpsc::UnboundedSender<Bytes>>,
    closed: bool,
}

type SharedOutput = Arc<Mutex<OutputLog>>;

fn lock_output(output: &SharedOutput) -> std::sync::MutexGuard<'_, OutputLog> {
    output.lock().unwrap_or_else(|p| p.into_inner())
}

/// Program and arguments for a remote-shell client process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Interactive session to `host`.
    pub fn for_host(program: &str, host: &HostDescriptor) -> Self {
        Self::new(program, host.ssh_args())
    }

    /// One-shot `command` on `host`.
    pub fn for_host_command(program: &str, host: &HostDescriptor, command: &str) -> Self {
        Self::new(program, host.ssh_args_with_command(command))
    }
}

/// A freshly spawned child and the master side of its pty.
pub struct SpawnedPty {
    pub master: Box<dyn MasterPty + Send>,
    pub child: Box<dyn Child + Send + Sync>,
}

/// Starts processes under a pseudo-terminal.
pub trait PtySpawner: Send + Sync {
    fn spawn(&self, spec: &CommandSpec, size: PtySize) -> Result<SpawnedPty, SessionError>;
}

/// Spawner backed by the platform's native pty system.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativePtySpawner;

impl PtySpawner for NativePtySpawner {
    fn spawn(&self, spec: &CommandSpec, size: PtySize) -> Result<SpawnedPty, SessionError> {
        let connection_error = |e: anyhow::Error| SessionError::ConnectionError {
            alias: spec.args.last().cloned().unwrap_or_default(),
            reason: e.to_string(),
        };

        let pair = native_pty_system()
            .openpty(size)
            .map_err(connection_error)?;

        let mut cmd = CommandBuilder::new(&spec.program);
        cmd.args(&spec.args);

        let child = pair.slave.spawn_command(cmd).map_err(connection_error)?;

        // Only the child holds the slave, so the master sees EOF when it exits.
        drop(pair.slave);

        Ok(SpawnedPty {
            master: pair.master,
            child,
        })
    }
}

/// Builds a `PtySize` from `(rows, cols)`.
pub fn pty_size(rows: u16, cols: u16) -> PtySize {
    PtySize {
        rows,
        cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// A remote-shell session.
///
/// The exit monitor owns `active`; the reader thread owns the output log.
pub struct Session {
    id: SessionId,
    host: HostDescriptor,
    pid: Option<u32>,
    active: AtomicBool,
    master: Mutex<Option<Box<dyn MasterPty + Send>>>,
    writer: Mutex<Option<Box<dyn Write + Send>>>,
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
    output: SharedOutput,
    exited: watch::Sender<bool>,
}

impl Session {
    /// Wraps a spawned pty and starts its output reader thread.
    ///
    /// Returns the child so the caller can monitor its exit.
    pub fn start(
        id: SessionId,
        host: HostDescriptor,
        spawned: SpawnedPty,
        scrollback_limit: usize,
    ) -> Result<(Arc<Self>, Box<dyn Child + Send + Sync>), SessionError> {
        let SpawnedPty { master, mut child } = spawned;

        let output = Arc::new(Mutex::new(OutputLog {
            scrollback: ScrollbackBuffer::with_limit(scrollback_limit),
            consumer: None,
            closed: false,
        }));

        let io = master
            .try_clone_reader()
            .and_then(|reader| Ok((reader, master.take_writer()?)))
            .map_err(|e| e.to_string())
            .and_then(|(reader, writer)| {
                spawn_output_reader(id, reader, Arc::clone(&output)).map_err(|e| e.to_string())?;
                Ok(writer)
            });

        let writer = match io {
            Ok(writer) => writer,
            Err(reason) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SessionError::ConnectionError {
                    alias: host.alias,
                    reason,
                });
            }
        };

        let (exited, _) = watch::channel(false);
        let session = Session {
            id,
            pid: child.process_id(),
            killer: Mutex::new(child.clone_killer()),
            host,
            active: AtomicBool::new(true),
            master: Mutex::new(Some(master)),
            writer: Mutex::new(Some(writer)),
            output,
            exited,
        };

        tracing::info!(
            session_id = session.id,
            alias = %session.host.alias,
            pid = ?session.pid,
            "Session started"
        );

        Ok((Arc::new(session), child))
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn alias(&self) -> &str {
        &self.host.alias
    }

    pub fn host(&self) -> &HostDescriptor {
        &self.host
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the process is still running.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// `"alive"` or `"ended"`.
    pub fn status_label(&self) -> &'static str {
        if self.is_active() {
            "alive"
        } else {
            "ended"
        }
    }

    /// Records process exit. Returns `true` only for the first call.
    pub fn mark_ended(&self) -> bool {
        let was_active = self.active.swap(false, Ordering::SeqCst);
        if was_active {
            self.exited.send_replace(true);
        }
        was_active
    }

    /// Waits until the process has exited.
    pub async fn wait_ended(&self) {
        let mut rx = self.exited.subscribe();
        let _ = rx.wait_for(|exited| *exited).await;
    }

    /// Writes input to the pty.
    pub fn write_input(&self, data: &[u8]) -> Result<(), SessionError> {
        let mut guard = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        let writer = guard
            .as_mut()
            .ok_or_else(|| SessionError::IoFailure("pty closed".to_string()))?;
        writer
            .write_all(data)
            .and_then(|_| writer.flush())
            .map_err(|e| SessionError::IoFailure(e.to_string()))
    }

    /// Takes over the live output.
    ///
    /// Returns the last `replay_bytes` of scrollback together with a stream
    /// of everything read after it, with no gap or overlap between the two.
    /// A previous subscriber stops receiving output.
    pub fn subscribe_output(&self, replay_bytes: usize) -> (Vec<u8>, OutputStream) {
        let mut log = lock_output(&self.output);
        let replay = log.scrollback.replay_tail(replay_bytes).to_vec();
        let (tx, rx) = mpsc::unbounded_channel();
        // After EOF the sender is dropped right away and the stream ends.
        if !log.closed {
            log.consumer = Some(tx);
        }
        (replay, rx)
    }

    /// Stops forwarding live output. The scrollback keeps growing.
    pub fn unsubscribe_output(&self) {
        lock_output(&self.output).consumer = None;
    }

    /// Whether the pty reached end of file.
    pub fn output_closed(&self) -> bool {
        lock_output(&self.output).closed
    }

    /// Resizes the pty.
    pub fn resize(&self, rows: u16, cols: u16) -> Result<(), SessionError> {
        let guard = self.master.lock().unwrap_or_else(|p| p.into_inner());
        let master = guard
            .as_ref()
            .ok_or_else(|| SessionError::Resize("pty closed".to_string()))?;
        master
            .resize(pty_size(rows, cols))
            .map_err(|e| SessionError::Resize(e.to_string()))?;
        tracing::trace!(session_id = self.id, rows, cols, "Resized pty");
        Ok(())
    }

    /// Appends captured output to the scrollback.
    pub fn append_scrollback(&self, bytes: &[u8]) {
        lock_output(&self.output).scrollback.append(bytes);
    }

    /// Runs `f` with the scrollback locked.
    pub fn with_scrollback<R>(&self, f: impl FnOnce(&ScrollbackBuffer) -> R) -> R {
        let log = lock_output(&self.output);
        f(&log.scrollback)
    }

    /// Terminates the process and closes the pty.
    ///
    /// Sends SIGTERM and waits up to `grace` for the exit monitor to observe
    /// the exit. There is no escalation beyond that.
    pub async fn terminate(&self, grace: Duration) -> Result<(), SessionError> {
        let result = if self.is_active() {
            let signalled = self.signal_terminate();
            if tokio::time::timeout(grace, self.wait_ended()).await.is_err() {
                tracing::warn!(
                    session_id = self.id,
                    alias = %self.host.alias,
                    "Process still running after close grace period"
                );
            }
            signalled
        } else {
            Ok(())
        };

        self.close_pty();
        tracing::info!(session_id = self.id, alias = %self.host.alias, "Session closed");
        result
    }

    #[cfg(unix)]
    fn signal_terminate(&self) -> Result<(), SessionError> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = self.pid {
            match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                Ok(()) => return Ok(()),
                Err(nix::errno::Errno::ESRCH) => return Ok(()),
                Err(e) => {
                    tracing::debug!(
                        session_id = self.id,
                        error = %e,
                        "SIGTERM failed, using killer"
                    );
                }
            }
        }
        self.kill()
    }

    #[cfg(not(unix))]
    fn signal_terminate(&self) -> Result<(), SessionError> {
        self.kill()
    }

    fn kill(&self) -> Result<(), SessionError> {
        self.killer
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .kill()
            .map_err(|e| SessionError::Terminate(e.to_string()))
    }

    fn close_pty(&self) {
        self.writer.lock().unwrap_or_else(|p| p.into_inner()).take();
        self.master.lock().unwrap_or_else(|p| p.into_inner()).take();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("alias", &self.host.alias)
            .field("pid", &self.pid)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Reads the pty until EOF. Nothing in here blocks on a consumer.
fn spawn_output_reader(
    id: SessionId,
    mut reader: Box<dyn Read + Send>,
    output: SharedOutput,
) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name(format!("sshtui-pty-{}", id))
        .spawn(move || {
            let mut buffer = [0u8; PTY_READ_BUFFER_SIZE];
            loop {
                match reader.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(n) => {
                        let chunk = &buffer[..n];
                        let mut log = lock_output(&output);
                        log.scrollback.append(chunk);
                        let gone = log
                            .consumer
                            .as_ref()
                            .is_some_and(|tx| tx.send(Bytes::copy_from_slice(chunk)).is_err());
                        if gone {
                            log.consumer = None;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        // EIO is how Linux reports a hung-up pty.
                        tracing::debug!(session_id = id, error = %e, "PTY read ended");
                        break;
                    }
                }
            }
            let mut log = lock_output(&output);
            log.closed = true;
            log.consumer = None;
            drop(log);
            tracing::debug!(session_id = id, "PTY output reader finished");
        })?;
    Ok(())
}
