//! Controlling-terminal input hub.
//!
//! Exactly one background thread reads stdin and publishes chunks on a
//! channel. Every consumer (menu prompts, the attach input copy, multi-host
//! passphrase forwarding) pulls from the same hub, so no reader is ever left
//! blocked on the file descriptor after the consumer that started it is gone.

use std::io::Read;

use bytes::{Bytes, BytesMut};
use tokio::sync::{mpsc, Mutex};

/// Read buffer size for the stdin thread.
pub const STDIN_BUFFER_SIZE: usize = 1024;

/// Channel capacity between the stdin thread and consumers.
const INPUT_CHANNEL_CAPACITY: usize = 64;

struct InputState {
    rx: mpsc::Receiver<Bytes>,
    /// Bytes received but not yet handed out (remainder of a line read).
    pending: BytesMut,
}

/// Shared source of controlling-terminal input.
pub struct TerminalInput {
    state: Mutex<InputState>,
}

impl TerminalInput {
    /// Starts the stdin reader thread.
    pub fn stdin() -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel(INPUT_CHANNEL_CAPACITY);

        std::thread::Builder::new()
            .name("sshtui-stdin".to_string())
            .spawn(move || {
                let stdin = std::io::stdin();
                let mut stdin = stdin.lock();
                let mut buffer = [0u8; STDIN_BUFFER_SIZE];
                loop {
                    match stdin.read(&mut buffer) {
                        Ok(0) => {
                            tracing::debug!("stdin reached EOF");
                            break;
                        }
                        Ok(n) => {
                            if tx.blocking_send(Bytes::copy_from_slice(&buffer[..n])).is_err() {
                                break;
                            }
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            tracing::warn!(error = %e, "stdin read failed");
                            break;
                        }
                    }
                }
            })?;

        Ok(Self::from_receiver(rx))
    }

    /// Builds a hub over an arbitrary chunk source.
    pub fn from_receiver(rx: mpsc::Receiver<Bytes>) -> Self {
        Self {
            state: Mutex::new(InputState {
                rx,
                pending: BytesMut::new(),
            }),
        }
    }

    /// Returns the next chunk of input, or `None` once input is closed.
    ///
    /// Cancel-safe: a chunk is never lost if the returned future is dropped.
    pub async fn read_chunk(&self) -> Option<Bytes> {
        let mut state = self.state.lock().await;
        if !state.pending.is_empty() {
            return Some(state.pending.split().freeze());
        }
        state.rx.recv().await
    }

    /// Reads one line, without its terminator.
    ///
    /// Bytes after the line terminator are kept for the next read. Returns
    /// `None` at end of input when nothing is buffered.
    pub async fn read_line(&self) -> Option<String> {
        let mut state = self.state.lock().await;
        loop {
            if let Some(pos) = state.pending.iter().position(|&b| b == b'\n') {
                let line = state.pending.split_to(pos + 1);
                return Some(decode_line(&line[..pos]));
            }

            match state.rx.recv().await {
                Some(chunk) => state.pending.extend_from_slice(&chunk),
                None if state.pending.is_empty() => return None,
                None => {
                    let line = state.pending.split();
                    return Some(decode_line(&line));
                }
            }
        }
    }

    /// Discards everything buffered without waiting for more input.
    ///
    /// Returns the number of bytes discarded.
    pub async fn drain(&self) -> usize {
        let mut state = self.state.lock().await;
        let mut discarded = state.pending.len();
        state.pending.clear();
        while let Ok(chunk) = state.rx.try_recv() {
            discarded += chunk.len();
        }
        if discarded > 0 {
            tracing::debug!(bytes = discarded, "Drained pending terminal input");
        }
        discarded
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let line = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(line).into_owned()
}
