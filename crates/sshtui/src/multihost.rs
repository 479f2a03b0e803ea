//! Multi-host command execution.
//!
//! Runs one command on several hosts at once, each in its own short-lived
//! pseudo-terminal so that passphrase prompts can be answered from the
//! controlling terminal. These processes never enter the session registry.

use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;
use std::sync::Arc;

use hosts::HostDescriptor;
use tokio::task::JoinHandle;

use crate::console::{boxed, lock_writer, Console, CLEAR_SCREEN};
use crate::session::{
    pty_size, CommandSpec, NativePtySpawner, PtySpawner, SpawnedPty, PTY_READ_BUFFER_SIZE,
};

/// Horizontal rule between host sections.
pub const HOST_RULE: &str = "─────────────────────────────────────────";

/// How per-host results are shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DisplayMode {
    /// Print each host's output as soon as that host finishes.
    Live,
    /// Print every host's output in selection order once all have finished.
    Collected,
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayMode::Live => write!(f, "live"),
            DisplayMode::Collected => write!(f, "collected"),
        }
    }
}

impl FromStr for DisplayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" | "1" => Ok(DisplayMode::Live),
            "collected" | "2" => Ok(DisplayMode::Collected),
            other => Err(format!("unknown display mode: {}", other)),
        }
    }
}

/// What one host produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostOutcome {
    pub alias: String,
    pub output: Vec<u8>,
    /// Set when the process could not be started.
    pub error: Option<String>,
    pub exit_code: Option<u32>,
}

impl HostOutcome {
    fn failed(alias: &str, error: String) -> Self {
        Self {
            alias: alias.to_string(),
            output: Vec::new(),
            error: Some(error),
            exit_code: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.exit_code == Some(0)
    }

    /// The host's section of a report: rule, header, error and output.
    pub fn render(&self) -> Vec<u8> {
        let mut block = format!("{}\nHost: {}\n", HOST_RULE, self.alias).into_bytes();
        if let Some(error) = &self.error {
            block.extend_from_slice(format!("Error: {}\n", error).as_bytes());
        }
        block.push(b'\n');
        block.extend_from_slice(&self.output);
        block.push(b'\n');
        block
    }
}

/// Fans a command out to many hosts.
pub struct MultiHostExecutor {
    spawner: Arc<dyn PtySpawner>,
    program: String,
}

impl MultiHostExecutor {
    pub fn new(spawner: Arc<dyn PtySpawner>, program: impl Into<String>) -> Self {
        Self {
            spawner,
            program: program.into(),
        }
    }

    /// Executor spawning real pseudo-terminals.
    pub fn native(program: impl Into<String>) -> Self {
        Self::new(Arc::new(NativePtySpawner), program)
    }

    /// Runs `command` on every host concurrently.
    ///
    /// Returns one outcome per host in selection order, whatever the display
    /// mode. An empty host list does nothing.
    pub async fn run(
        &self,
        hosts: &[HostDescriptor],
        command: &str,
        mode: DisplayMode,
        console: &Console,
    ) -> Vec<HostOutcome> {
        if hosts.is_empty() {
            return Vec::new();
        }

        let title = match mode {
            DisplayMode::Live => "Multi-Host Execution (Live)",
            DisplayMode::Collected => "Multi-Host Execution (Collecting...)",
        };
        let mut header = format!("{}{}\n\n", CLEAR_SCREEN, boxed(&[title]));
        if mode == DisplayMode::Live {
            header.push_str(&format!("Command: {}\n\n", command));
        }
        console.print(&header);

        let size = console.terminal.size().unwrap_or((24, 80));
        tracing::info!(hosts = hosts.len(), command, %mode, "Starting multi-host execution");

        let tasks: Vec<JoinHandle<HostOutcome>> = hosts
            .iter()
            .map(|host| {
                let spec = CommandSpec::for_host_command(&self.program, host, command);
                let alias = host.alias.clone();
                let spawner = Arc::clone(&self.spawner);
                let console = console.clone();
                tokio::spawn(async move {
                    let outcome = run_host(spawner, spec, &alias, size, &console).await;
                    report_finished(&outcome, mode, &console);
                    outcome
                })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(tasks.len());
        for (task, host) in tasks.into_iter().zip(hosts) {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(e) => HostOutcome::failed(&host.alias, format!("task failed: {}", e)),
            };
            outcomes.push(outcome);
        }

        let mut footer = Vec::new();
        if mode == DisplayMode::Collected {
            footer.extend_from_slice(CLEAR_SCREEN.as_bytes());
            footer.extend_from_slice(format!("{}\n\n", boxed(&["Multi-Host Results"])).as_bytes());
            footer.extend_from_slice(format!("Command: {}\n\n", command).as_bytes());
            for outcome in &outcomes {
                footer.extend_from_slice(&outcome.render());
            }
        }
        footer.extend_from_slice(format!("{}\n", HOST_RULE).as_bytes());
        if let Err(e) = console.write_block(&footer) {
            tracing::warn!(error = %e, "Failed to print multi-host report");
        }

        tracing::info!(
            hosts = outcomes.len(),
            failed = outcomes.iter().filter(|o| o.error.is_some()).count(),
            "Multi-host execution finished"
        );
        outcomes
    }
}

/// Prints what a finished host contributes while the others still run.
fn report_finished(outcome: &HostOutcome, mode: DisplayMode, console: &Console) {
    let block = match mode {
        DisplayMode::Live => outcome.render(),
        DisplayMode::Collected if outcome.error.is_none() => {
            format!("  ✓ {}\n", outcome.alias).into_bytes()
        }
        DisplayMode::Collected => return,
    };
    let mut out = lock_writer(&console.output);
    if let Err(e) = out.write_all(&block).and_then(|_| out.flush()) {
        tracing::warn!(alias = %outcome.alias, error = %e, "Failed to print host output");
    }
}

async fn run_host(
    spawner: Arc<dyn PtySpawner>,
    spec: CommandSpec,
    alias: &str,
    size: (u16, u16),
    console: &Console,
) -> HostOutcome {
    tracing::debug!(alias, args = ?spec.args, "Spawning host command");

    let spawned =
        tokio::task::spawn_blocking(move || spawner.spawn(&spec, pty_size(size.0, size.1))).await;
    let SpawnedPty { master, mut child } = match spawned {
        Ok(Ok(spawned)) => spawned,
        Ok(Err(e)) => {
            tracing::warn!(alias, error = %e, "Host command failed to start");
            return HostOutcome::failed(alias, e.to_string());
        }
        Err(e) => return HostOutcome::failed(alias, e.to_string()),
    };

    let io = master
        .try_clone_reader()
        .and_then(|reader| Ok((reader, master.take_writer()?)));
    let (mut reader, mut writer) = match io {
        Ok(io) => io,
        Err(e) => {
            let _ = child.kill();
            let _ = child.wait();
            return HostOutcome::failed(alias, e.to_string());
        }
    };

    // Competes with the other hosts for each input chunk.
    let input = Arc::clone(&console.input);
    let forwarder = tokio::spawn(async move {
        while let Some(chunk) = input.read_chunk().await {
            if writer.write_all(&chunk).and_then(|_| writer.flush()).is_err() {
                break;
            }
        }
    });

    let capture = tokio::task::spawn_blocking(move || {
        let mut output = Vec::new();
        let mut buffer = [0u8; PTY_READ_BUFFER_SIZE];
        loop {
            match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => output.extend_from_slice(&buffer[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        let exit_code = child.wait().ok().map(|status| status.exit_code());
        (output, exit_code)
    })
    .await;

    forwarder.abort();
    drop(master);

    match capture {
        Ok((output, exit_code)) => {
            tracing::debug!(alias, bytes = output.len(), ?exit_code, "Host command finished");
            HostOutcome {
                alias: alias.to_string(),
                output,
                error: None,
                exit_code,
            }
        }
        Err(e) => HostOutcome::failed(alias, e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_mode_parse() {
        assert_eq!("1".parse::<DisplayMode>().unwrap(), DisplayMode::Live);
        assert_eq!("live".parse::<DisplayMode>().unwrap(), DisplayMode::Live);
        assert_eq!("Collected".parse::<DisplayMode>().unwrap(), DisplayMode::Collected);
        assert!("stream".parse::<DisplayMode>().is_err());
        assert_eq!(DisplayMode::Live.to_string(), "live");
    }

    #[test]
    fn test_render_success() {
        let outcome = HostOutcome {
            alias: "web".to_string(),
            output: b"up 3 days".to_vec(),
            error: None,
            exit_code: Some(0),
        };
        assert!(outcome.succeeded());
        let text = String::from_utf8(outcome.render()).unwrap();
        assert_eq!(text, format!("{}\nHost: web\n\nup 3 days\n", HOST_RULE));
    }

    #[test]
    fn test_render_error() {
        let outcome = HostOutcome::failed("db", "refused".to_string());
        assert!(!outcome.succeeded());
        let text = String::from_utf8(outcome.render()).unwrap();
        assert!(text.contains("Host: db\nError: refused\n"));
    }
}
