//! The interactive command loop.

use std::sync::Arc;

use hosts::HostDirectory;

use crate::config::Config;
use crate::console::{boxed, Console, CLEAR_SCREEN};
use crate::multihost::{DisplayMode, MultiHostExecutor};
use crate::session::{attach, AttachOptions, DetachReason, Session, SessionError, SessionRegistry};

use super::forwards::show_forwards;
use super::pager::run_pager;
use super::select::select_hosts;

/// Fallback pty size when the terminal cannot be queried.
const DEFAULT_SIZE: (u16, u16) = (24, 80);

/// One line typed at the main prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuCommand {
    /// Connect to host number N (1-based).
    Connect(usize),
    /// Resume session number N (1-based position).
    Resume(usize),
    ViewScrollback,
    MultiHost,
    Forwards,
    CloseActive,
    Quit,
    /// Empty line: redraw.
    Refresh,
    Unknown(String),
}

impl MenuCommand {
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        match input {
            "" => MenuCommand::Refresh,
            "v" => MenuCommand::ViewScrollback,
            "m" => MenuCommand::MultiHost,
            "f" => MenuCommand::Forwards,
            "x" => MenuCommand::CloseActive,
            "q" => MenuCommand::Quit,
            other => {
                if let Some(number) = other.strip_prefix('!') {
                    return match number.parse() {
                        Ok(n) => MenuCommand::Resume(n),
                        Err(_) => MenuCommand::Unknown(other.to_string()),
                    };
                }
                match other.parse() {
                    Ok(n) => MenuCommand::Connect(n),
                    Err(_) => MenuCommand::Unknown(other.to_string()),
                }
            }
        }
    }
}

/// Parses `!N` or `N` as a session position.
fn parse_session_number(input: &str) -> Option<usize> {
    let input = input.trim();
    input.strip_prefix('!').unwrap_or(input).parse().ok()
}

/// Renders the main screen.
pub fn render_menu(directory: &HostDirectory, sessions: &[(usize, Arc<Session>)]) -> String {
    let mut screen = format!("{}{}\n\n", CLEAR_SCREEN, boxed(&["sshtui - Session Manager"]));

    if !sessions.is_empty() {
        screen.push_str("Active Sessions:\n");
        for (position, session) in sessions {
            screen.push_str(&format!(
                "  [!{}] {} ({})\n",
                position,
                session.alias(),
                session.status_label()
            ));
        }
        screen.push('\n');
    }

    screen.push_str("Connections:\n");
    if directory.is_empty() {
        screen.push_str("  No hosts found in ssh config\n");
    }
    for (idx, host) in directory.hosts().iter().enumerate() {
        screen.push_str(&format!("  [{}] {}", idx + 1, host.alias));
        if let Some(hostname) = &host.hostname {
            screen.push_str(&format!(" ({})", hostname));
        }
        screen.push_str(&host.forward_summary());
        screen.push('\n');
    }

    screen.push_str("\nCommands:\n");
    screen.push_str("  [number]  - Connect to host\n");
    screen.push_str("  [!number] - Resume session\n");
    screen.push_str("  v         - View scrollback/history\n");
    screen.push_str("  m         - Multi-host command\n");
    screen.push_str("  f         - Port forward info\n");
    screen.push_str("  x         - Close active session\n");
    screen.push_str("  q         - Quit all\n");
    screen.push_str("\nIn session: Ctrl+Space to detach\n\n> ");
    screen
}

/// The main menu and everything it drives.
pub struct Menu<'a> {
    pub config: &'a Config,
    pub directory: &'a HostDirectory,
    pub registry: &'a SessionRegistry,
    pub executor: &'a MultiHostExecutor,
    pub console: &'a Console,
}

impl Menu<'_> {
    /// Runs until `q` or end of input.
    pub async fn run(&self) {
        loop {
            let sessions = self.registry.list_ordered().await;
            self.console.print(&render_menu(self.directory, &sessions));

            let Some(input) = self.console.input.read_line().await else {
                tracing::info!("Input closed, leaving menu");
                return;
            };

            let command = MenuCommand::parse(&input);
            tracing::debug!(?command, "Menu command");

            match command {
                MenuCommand::Quit => return,
                MenuCommand::Refresh => {}
                MenuCommand::Connect(number) => self.connect(number).await,
                MenuCommand::Resume(number) => self.resume(number).await,
                MenuCommand::ViewScrollback => self.view_scrollback().await,
                MenuCommand::MultiHost => self.multi_host().await,
                MenuCommand::Forwards => {
                    show_forwards(self.console, self.directory, self.registry).await
                }
                MenuCommand::CloseActive => {
                    if let Some(session) = self.registry.close_active().await {
                        tracing::info!(session_id = session.id(), "Closed active session");
                    }
                }
                MenuCommand::Unknown(input) => {
                    self.console
                        .pause(&format!("Unknown command: {}.", input))
                        .await
                }
            }
        }
    }

    async fn report(&self, error: &SessionError) {
        tracing::warn!(error = %error, "Menu operation failed");
        self.console.pause(&format!("\nError: {}.", error)).await;
    }

    async fn connect(&self, number: usize) {
        let Some(host) = self.directory.at(number) else {
            let error = SessionError::InvalidAddressing(format!("Invalid host number: {}", number));
            return self.report(&error).await;
        };

        self.console.print(&format!("\nConnecting to {}...\n", host.alias));
        let size = self.console.terminal.size().unwrap_or(DEFAULT_SIZE);
        match self.registry.create(host, size).await {
            Ok(session) => self.attach(&session).await,
            Err(e) => self.report(&e).await,
        }
    }

    async fn resume(&self, number: usize) {
        match self.registry.session_at(number).await {
            Ok(session) => self.attach(&session).await,
            Err(e) => self.report(&e).await,
        }
    }

    async fn attach(&self, session: &Arc<Session>) {
        let options = AttachOptions {
            replay_bytes: self.config.session.replay_bytes,
        };
        match attach(session, self.console, options).await {
            Ok(DetachReason::Fault(msg)) => {
                self.console
                    .pause(&format!("Session fault: {}. Terminal state restored.", msg))
                    .await
            }
            Ok(DetachReason::IoFailure(msg)) => {
                tracing::debug!(
                    session_id = session.id(),
                    error = %msg,
                    "Attach ended on I/O failure"
                )
            }
            Ok(_) => {}
            Err(e) => self.report(&e).await,
        }
    }

    async fn view_scrollback(&self) {
        if self.registry.is_empty().await {
            return self.console.pause("No sessions.").await;
        }
        let Some(reply) = self.console.prompt("\nSession number (!N): ").await else {
            return;
        };
        let Some(number) = parse_session_number(&reply) else {
            let error =
                SessionError::InvalidAddressing(format!("Invalid session number: {}", reply));
            return self.report(&error).await;
        };

        let session = match self.registry.session_at(number).await {
            Ok(session) => session,
            Err(e) => return self.report(&e).await,
        };

        let lines = session.with_scrollback(|s| (!s.is_empty()).then(|| s.snapshot_lines()));
        match lines {
            Some(lines) => {
                run_pager(self.console, session.alias(), lines, self.config.pager.page_size).await
            }
            None => self.console.pause("No scrollback available.").await,
        }
    }

    async fn multi_host(&self) {
        if self.directory.is_empty() {
            return self.console.pause("No hosts configured.").await;
        }

        let Some(hosts) = select_hosts(self.console, self.directory).await else {
            return;
        };
        if hosts.is_empty() {
            return self.console.pause("No hosts selected.").await;
        }

        let Some(command) = self.console.prompt("\nEnter command to execute: ").await else {
            return;
        };
        if command.is_empty() {
            return;
        }

        let Some(mode) = self
            .console
            .prompt(concat!(
                "\nDisplay mode:\n",
                "  [1] Live streaming (see output as it arrives)\n",
                "  [2] Collected results (all at once)\n",
                "> "
            ))
            .await
        else {
            return;
        };
        let mode = if mode == "1" {
            DisplayMode::Live
        } else {
            DisplayMode::Collected
        };

        self.executor.run(&hosts, &command, mode, self.console).await;
        self.console.pause("\nExecution complete.").await;
    }
}
