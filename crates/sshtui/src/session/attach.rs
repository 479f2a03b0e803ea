//! Attach engine.
//!
//! Bridges one session's pseudo-terminal with the controlling terminal until
//! the operator presses the detach key, input closes, or the session's
//! output ends. Raw mode is held by a guard for the whole bridged phase, so
//! it is restored on every exit path including a fault in a copy task.

use std::io::Write;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::pty::{OutputStream, Session, SessionError};
use crate::console::{boxed, lock_writer, Console, RawModeGuard, CLEAR_SCREEN};
use crate::config::DEFAULT_REPLAY_BYTES;

/// The detach keystroke (Ctrl+Space / Ctrl+@).
pub const DETACH_SENTINEL: u8 = 0;

/// Separates replayed scrollback from live output.
pub const REPLAY_MARKER: &str = "\n--- [Scrollback end, live session resumed] ---\n";

/// Printed after every attach cycle.
pub const DETACH_NOTICE: &str = "\n\n[Detached]\n";

/// Why an attach cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetachReason {
    /// The operator pressed the detach key.
    Detached,
    /// Controlling-terminal input reached end of file.
    InputClosed,
    /// The session's pty reached end of file.
    OutputClosed,
    /// A copy task failed to read or write.
    IoFailure(String),
    /// A copy task panicked.
    Fault(String),
}

/// Attach-cycle settings.
#[derive(Debug, Clone, Copy)]
pub struct AttachOptions {
    /// Scrollback bytes replayed before going live.
    pub replay_bytes: usize,
}

impl Default for AttachOptions {
    fn default() -> Self {
        Self {
            replay_bytes: DEFAULT_REPLAY_BYTES,
        }
    }
}

/// Splits an input chunk at the detach sentinel.
///
/// Returns the bytes to forward and whether the sentinel was seen. Nothing
/// from the sentinel onward is forwarded.
pub fn split_at_sentinel(chunk: &[u8]) -> (&[u8], bool) {
    match chunk.iter().position(|&b| b == DETACH_SENTINEL) {
        Some(pos) => (&chunk[..pos], true),
        None => (chunk, false),
    }
}

/// Runs one attach cycle.
///
/// Callers must not attach the same session twice concurrently.
pub async fn attach(
    session: &Arc<Session>,
    console: &Console,
    options: AttachOptions,
) -> Result<DetachReason, SessionError> {
    if !session.is_active() {
        return Err(SessionError::SessionEnded(session.alias().to_string()));
    }

    let live = show_banner(session, console, options.replay_bytes)?;

    match console.terminal.size() {
        Ok((rows, cols)) => {
            if let Err(e) = session.resize(rows, cols) {
                tracing::warn!(session_id = session.id(), error = %e, "Initial resize failed");
            }
        }
        Err(e) => tracing::debug!(error = %e, "Terminal size unavailable"),
    }

    let resize_cancel = CancellationToken::new();
    spawn_resize_forwarder(session, console, resize_cancel.clone());

    let guard = match RawModeGuard::acquire(Arc::clone(&console.terminal)) {
        Ok(guard) => guard,
        Err(e) => {
            resize_cancel.cancel();
            return Err(SessionError::IoFailure(e.to_string()));
        }
    };

    tracing::info!(session_id = session.id(), alias = %session.alias(), "Attached");

    let reason = match AssertUnwindSafe(bridge(session, console, live))
        .catch_unwind()
        .await
    {
        Ok(reason) => reason,
        Err(panic) => DetachReason::Fault(panic_message(panic.as_ref())),
    };

    session.unsubscribe_output();
    resize_cancel.cancel();
    drop(guard);
    console.input.drain().await;

    match &reason {
        DetachReason::Fault(msg) => {
            tracing::error!(session_id = session.id(), fault = %msg, "Attach fault")
        }
        other => tracing::info!(session_id = session.id(), reason = ?other, "Detached"),
    }

    if let Err(e) = console.write_block(DETACH_NOTICE.as_bytes()) {
        tracing::warn!(error = %e, "Failed to print detach notice");
    }

    Ok(reason)
}

/// Prints the banner and the replay, and returns the live output that follows it.
fn show_banner(
    session: &Session,
    console: &Console,
    replay_bytes: usize,
) -> Result<OutputStream, SessionError> {
    let (replay, live) = session.subscribe_output(replay_bytes);
    let mut out = console.lock_output();
    let mut write = || -> std::io::Result<()> {
        let title = format!("Connected: {}", session.alias());
        let banner = boxed(&[title.as_str(), "Ctrl+Space to detach"]);
        write!(out, "{}{}\n\n", CLEAR_SCREEN, banner)?;

        if !replay.is_empty() {
            out.write_all(&replay)?;
            out.write_all(REPLAY_MARKER.as_bytes())?;
        }
        out.flush()
    };
    write().map_err(|e| SessionError::IoFailure(e.to_string()))?;
    Ok(live)
}

fn spawn_resize_forwarder(session: &Arc<Session>, console: &Console, cancel: CancellationToken) {
    let mut resizes = console.terminal.watch_resize(cancel.clone());
    let terminal = Arc::clone(&console.terminal);
    let session = Arc::clone(session);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = resizes.recv() => {
                    if event.is_none() {
                        break;
                    }
                    if let Ok((rows, cols)) = terminal.size() {
                        if let Err(e) = session.resize(rows, cols) {
                            tracing::debug!(session_id = session.id(), error = %e, "Resize failed");
                        }
                    }
                }
            }
        }
    });
}

/// Runs both copy directions until the first one finishes.
async fn bridge(
    session: &Arc<Session>,
    console: &Console,
    mut live: OutputStream,
) -> DetachReason {
    let mut tasks = JoinSet::new();

    let input = Arc::clone(&console.input);
    let target = Arc::clone(session);
    tasks.spawn(async move {
        loop {
            let Some(chunk) = input.read_chunk().await else {
                return DetachReason::InputClosed;
            };
            let (forward, detach) = split_at_sentinel(&chunk);
            if !forward.is_empty() {
                if let Err(e) = target.write_input(forward) {
                    return DetachReason::IoFailure(e.to_string());
                }
            }
            if detach {
                return DetachReason::Detached;
            }
        }
    });

    // The reader thread has already put every chunk in the scrollback.
    let output = Arc::clone(&console.output);
    tasks.spawn(async move {
        loop {
            let Some(chunk) = live.recv().await else {
                return DetachReason::OutputClosed;
            };
            let mut out = lock_writer(&output);
            if let Err(e) = out.write_all(&chunk).and_then(|_| out.flush()) {
                return DetachReason::IoFailure(e.to_string());
            }
            drop(out);
        }
    });

    let reason = match tasks.join_next().await {
        Some(Ok(reason)) => reason,
        Some(Err(e)) if e.is_panic() => {
            DetachReason::Fault(panic_message(e.into_panic().as_ref()))
        }
        Some(Err(e)) => DetachReason::Fault(e.to_string()),
        None => DetachReason::InputClosed,
    };

    // The other direction must be stopped before raw mode is released.
    tasks.shutdown().await;
    reason
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
