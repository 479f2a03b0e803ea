//! Top-level coordinator.
//!
//! Owns the host directory, the session registry and the multi-host executor,
//! runs the menu, and guarantees that every session is closed before
//! [`Orchestrator::run`] returns, whether the menu ended on `q`, on end of
//! input, or because the process received SIGTERM or SIGHUP.

use anyhow::{Context, Result};
use hosts::HostDirectory;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::config::Config;
use crate::console::Console;
use crate::multihost::MultiHostExecutor;
use crate::session::SessionRegistry;
use crate::ui::Menu;

/// Why the orchestrator stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownCause {
    /// The operator quit or input closed.
    MenuExited,
    /// SIGTERM or SIGHUP.
    Signal,
}

/// Listens for SIGTERM and SIGHUP and broadcasts a shutdown notice.
pub struct SignalHandler {
    shutdown_sender: broadcast::Sender<()>,
}

impl SignalHandler {
    pub fn new() -> (Self, broadcast::Receiver<()>) {
        let (shutdown_sender, shutdown_receiver) = broadcast::channel(1);
        (Self { shutdown_sender }, shutdown_receiver)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_sender.subscribe()
    }

    /// Waits for the first signal, then notifies subscribers.
    ///
    /// If the handlers cannot be registered this never notifies.
    pub async fn run(self) {
        let (mut sigterm, mut sighup) =
            match (signal(SignalKind::terminate()), signal(SignalKind::hangup())) {
                (Ok(term), Ok(hup)) => (term, hup),
                (Err(e), _) | (_, Err(e)) => {
                    error!("Failed to register signal handlers: {}", e);
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
            _ = sighup.recv() => info!("Received SIGHUP, shutting down"),
        }

        let _ = self.shutdown_sender.send(());
    }
}

pub struct Orchestrator {
    config: Config,
    directory: HostDirectory,
    registry: SessionRegistry,
    executor: MultiHostExecutor,
}

impl Orchestrator {
    /// Builds every component from `config`, reading the host directory.
    pub fn new(config: Config) -> Result<Self> {
        let directory = HostDirectory::load(&config.ssh.config_path).with_context(|| {
            format!(
                "Failed to load host directory from {}",
                config.ssh.config_path.display()
            )
        })?;
        info!(hosts = directory.len(), "Loaded host directory");

        let registry = SessionRegistry::from_config(&config);
        let executor = MultiHostExecutor::native(config.ssh.program.clone());
        Ok(Self::with_parts(config, directory, registry, executor))
    }

    pub fn with_parts(
        config: Config,
        directory: HostDirectory,
        registry: SessionRegistry,
        executor: MultiHostExecutor,
    ) -> Self {
        Self {
            config,
            directory,
            registry,
            executor,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn directory(&self) -> &HostDirectory {
        &self.directory
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn executor(&self) -> &MultiHostExecutor {
        &self.executor
    }

    /// Runs the menu until it exits or `shutdown` fires, then closes all
    /// sessions.
    pub async fn run(
        &self,
        console: &Console,
        mut shutdown: broadcast::Receiver<()>,
    ) -> ShutdownCause {
        let menu = Menu {
            config: &self.config,
            directory: &self.directory,
            registry: &self.registry,
            executor: &self.executor,
            console,
        };

        let cause = tokio::select! {
            _ = menu.run() => ShutdownCause::MenuExited,
            _ = shutdown.recv() => ShutdownCause::Signal,
        };
        info!(?cause, "Menu finished");

        self.shutdown().await;
        cause
    }

    /// Closes every registered session.
    pub async fn shutdown(&self) -> usize {
        let closed = self.registry.close_all().await;
        info!(closed, "All sessions closed");
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;
    use tokio::sync::mpsc;

    use crate::console::{ControllingTerminal, PreviousMode, TerminalError, TerminalInput};
    use crate::session::{NativePtySpawner, RegistrySettings};
    use tokio_util::sync::CancellationToken;

    struct NullTerminal;

    impl ControllingTerminal for NullTerminal {
        fn acquire_raw(&self) -> Result<PreviousMode, TerminalError> {
            Ok(PreviousMode::new(false))
        }

        fn restore(&self, _previous: PreviousMode) {}

        fn size(&self) -> Result<(u16, u16), TerminalError> {
            Ok((24, 80))
        }

        fn watch_resize(&self, _cancel: CancellationToken) -> mpsc::Receiver<()> {
            mpsc::channel(1).1
        }
    }

    fn console(rx: mpsc::Receiver<Bytes>) -> Console {
        let output: Box<dyn std::io::Write + Send> = Box::new(std::io::sink());
        Console::new(
            Arc::new(TerminalInput::from_receiver(rx)),
            Arc::new(Mutex::new(output)),
            Arc::new(NullTerminal),
        )
    }

    fn orchestrator() -> Orchestrator {
        let settings = RegistrySettings {
            program: "/bin/cat".to_string(),
            ..RegistrySettings::default()
        };
        Orchestrator::with_parts(
            Config::default(),
            HostDirectory::parse("Host a\n"),
            SessionRegistry::new(Arc::new(NativePtySpawner), settings),
            MultiHostExecutor::native("/bin/sh"),
        )
    }

    #[tokio::test]
    async fn test_quit_returns_menu_exited() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(Bytes::from_static(b"q\n")).await.unwrap();
        let (_handler, shutdown) = SignalHandler::new();

        let orchestrator = orchestrator();
        let cause = orchestrator.run(&console(rx), shutdown).await;
        assert_eq!(cause, ShutdownCause::MenuExited);
    }

    #[tokio::test]
    async fn test_shutdown_notice_closes_sessions() {
        let (_tx, rx) = mpsc::channel(4);
        let (handler, shutdown) = SignalHandler::new();
        let orchestrator = orchestrator();

        let host = orchestrator.directory().hosts()[0].clone();
        orchestrator.registry().create(&host, (24, 80)).await.unwrap();
        assert_eq!(orchestrator.registry().len().await, 1);

        handler.shutdown_sender.send(()).unwrap();
        let cause = orchestrator.run(&console(rx), shutdown).await;

        assert_eq!(cause, ShutdownCause::Signal);
        assert!(orchestrator.registry().is_empty().await);
    }

    #[test]
    fn test_new_with_missing_ssh_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.ssh.config_path = dir.path().join("missing");

        let orchestrator = Orchestrator::new(config).unwrap();
        assert!(orchestrator.directory().is_empty());
    }
}
