//! # sshtui Library
//!
//! Multiplexes interactive remote-shell sessions from a single terminal.
//!
//! ## Overview
//!
//! Each session is a remote-shell client running on its own pseudo-terminal.
//! Sessions keep running while the operator is elsewhere; everything they
//! print is captured in a bounded scrollback so that it can be replayed on
//! reattach or browsed in a pager.
//!
//! - **Sessions**: spawn, attach, detach (Ctrl+Space), resume, close
//! - **Scrollback**: bounded per-session history with replay and search
//! - **Multi-Host Execution**: run one command on many hosts at once, with
//!   live or collected output
//! - **Host Directory**: hosts and port forwards from `~/.ssh/config`
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      Orchestrator                       │
//! ├─────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌──────────────────┐   ┌───────────┐  │
//! │  │   Menu    │──▶│ Session Registry │──▶│  Session  │  │
//! │  └───────────┘   └──────────────────┘   └───────────┘  │
//! │        │                                      ▲         │
//! │        ▼                                      │         │
//! │  ┌───────────────────┐   ┌─────────────────────────┐   │
//! │  │ Multi-Host Exec.  │   │      Attach Engine      │   │
//! │  └───────────────────┘   └─────────────────────────┘   │
//! │  ┌───────────────────────────────────────────────────┐  │
//! │  │      Console (input hub, raw mode, output)        │  │
//! │  └───────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sshtui::{Config, Console, Orchestrator, SignalHandler};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!     let orchestrator = Orchestrator::new(config)?;
//!     let console = Console::stdio()?;
//!
//!     let (signals, shutdown) = SignalHandler::new();
//!     tokio::spawn(signals.run());
//!
//!     orchestrator.run(&console, shutdown).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`console`]: Terminal input hub, output and raw mode
//! - [`session`]: Scrollback, sessions, registry and the attach engine
//! - [`multihost`]: Concurrent command execution on many hosts
//! - [`ui`]: Menu, host selection, forward overview and pager
//! - [`orchestrator`]: Wiring and shutdown

pub mod config;
pub mod console;
pub mod multihost;
pub mod orchestrator;
pub mod session;
pub mod ui;

// Re-export the host directory for convenience
pub use hosts;

pub use config::{Config, ConfigError};
pub use console::{Console, ControllingTerminal, CrosstermTerminal, RawModeGuard, TerminalInput};
pub use multihost::{DisplayMode, HostOutcome, MultiHostExecutor};
pub use orchestrator::{Orchestrator, ShutdownCause, SignalHandler};
pub use session::{
    attach, AttachOptions, DetachReason, ScrollbackBuffer, Session, SessionError, SessionId,
    SessionRegistry,
};
