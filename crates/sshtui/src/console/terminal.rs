//! Raw-mode capability of the controlling terminal.

use std::sync::Arc;

use crossterm::terminal::{disable_raw_mode, enable_raw_mode, is_raw_mode_enabled, size};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum TerminalError {
    #[error("failed to enable raw mode: {0}")]
    EnableRawMode(#[source] std::io::Error),

    #[error("failed to query terminal size: {0}")]
    Size(#[source] std::io::Error),
}

/// Terminal mode observed before raw mode was acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviousMode {
    was_raw: bool,
}

impl PreviousMode {
    pub fn new(was_raw: bool) -> Self {
        Self { was_raw }
    }

    pub fn was_raw(&self) -> bool {
        self.was_raw
    }
}

/// The controlling terminal as seen by the attach engine.
pub trait ControllingTerminal: Send + Sync {
    /// Switches to character-at-a-time, unechoed input.
    fn acquire_raw(&self) -> Result<PreviousMode, TerminalError>;

    /// Returns to the mode captured by `acquire_raw`.
    fn restore(&self, previous: PreviousMode);

    /// Current dimensions as `(rows, cols)`.
    fn size(&self) -> Result<(u16, u16), TerminalError>;

    /// Emits one notification per terminal resize until `cancel` fires.
    fn watch_resize(&self, cancel: CancellationToken) -> mpsc::Receiver<()>;
}

/// The process's real terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrosstermTerminal;

impl ControllingTerminal for CrosstermTerminal {
    fn acquire_raw(&self) -> Result<PreviousMode, TerminalError> {
        let was_raw = is_raw_mode_enabled().map_err(TerminalError::EnableRawMode)?;
        if !was_raw {
            enable_raw_mode().map_err(TerminalError::EnableRawMode)?;
        }
        Ok(PreviousMode::new(was_raw))
    }

    fn restore(&self, previous: PreviousMode) {
        if previous.was_raw() {
            return;
        }
        if let Err(e) = disable_raw_mode() {
            tracing::error!(error = %e, "Failed to restore terminal mode");
        }
    }

    fn size(&self) -> Result<(u16, u16), TerminalError> {
        // crossterm reports (cols, rows)
        let (cols, rows) = size().map_err(TerminalError::Size)?;
        Ok((rows, cols))
    }

    fn watch_resize(&self, cancel: CancellationToken) -> mpsc::Receiver<()> {
        let (tx, rx) = mpsc::channel(4);

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            match signal(SignalKind::window_change()) {
                Ok(mut sigwinch) => {
                    tokio::spawn(async move {
                        loop {
                            tokio::select! {
                                _ = cancel.cancelled() => break,
                                received = sigwinch.recv() => {
                                    if received.is_none() || tx.send(()).await.is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to register SIGWINCH handler");
                }
            }
        }

        #[cfg(not(unix))]
        {
            drop((tx, cancel));
        }

        rx
    }
}

/// Holds raw mode for its lifetime.
///
/// Restores the previous mode exactly once when dropped, including while
/// unwinding.
pub struct RawModeGuard {
    terminal: Arc<dyn ControllingTerminal>,
    previous: Option<PreviousMode>,
}

impl RawModeGuard {
    pub fn acquire(terminal: Arc<dyn ControllingTerminal>) -> Result<Self, TerminalError> {
        let previous = terminal.acquire_raw()?;
        Ok(Self {
            terminal,
            previous: Some(previous),
        })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.terminal.restore(previous);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingTerminal {
        acquired: AtomicUsize,
        restored: AtomicUsize,
    }

    impl ControllingTerminal for CountingTerminal {
        fn acquire_raw(&self) -> Result<PreviousMode, TerminalError> {
            self.acquired.fetch_add(1, Ordering::SeqCst);
            Ok(PreviousMode::new(false))
        }

        fn restore(&self, _previous: PreviousMode) {
            self.restored.fetch_add(1, Ordering::SeqCst);
        }

        fn size(&self) -> Result<(u16, u16), TerminalError> {
            Ok((24, 80))
        }

        fn watch_resize(&self, _cancel: CancellationToken) -> mpsc::Receiver<()> {
            mpsc::channel(1).1
        }
    }

    #[test]
    fn test_guard_restores_once_on_drop() {
        let terminal = Arc::new(CountingTerminal::default());
        {
            let _guard = RawModeGuard::acquire(terminal.clone()).unwrap();
            assert_eq!(terminal.acquired.load(Ordering::SeqCst), 1);
            assert_eq!(terminal.restored.load(Ordering::SeqCst), 0);
        }
        assert_eq!(terminal.restored.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_guard_restores_on_panic() {
        let terminal = Arc::new(CountingTerminal::default());
        let t = terminal.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = RawModeGuard::acquire(t).unwrap();
            panic!("fault while raw");
        }));
        assert!(result.is_err());
        assert_eq!(terminal.restored.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_previous_mode() {
        assert!(PreviousMode::new(true).was_raw());
        assert!(!PreviousMode::new(false).was_raw());
    }
}
