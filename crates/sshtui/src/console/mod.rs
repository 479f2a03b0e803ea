//! The controlling terminal: input hub, output sink and raw-mode capability.

pub mod input;
pub mod terminal;

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

pub use input::TerminalInput;
pub use terminal::{
    ControllingTerminal, CrosstermTerminal, PreviousMode, RawModeGuard, TerminalError,
};

/// Lock-protected output so that whole blocks are written atomically.
pub type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Clear screen and home the cursor.
pub const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

/// Everything that talks to the operator's terminal.
#[derive(Clone)]
pub struct Console {
    pub input: Arc<TerminalInput>,
    pub output: SharedWriter,
    pub terminal: Arc<dyn ControllingTerminal>,
}

impl Console {
    pub fn new(
        input: Arc<TerminalInput>,
        output: SharedWriter,
        terminal: Arc<dyn ControllingTerminal>,
    ) -> Self {
        Self {
            input,
            output,
            terminal,
        }
    }

    /// The process's own stdin, stdout and terminal.
    pub fn stdio() -> io::Result<Self> {
        let output: Box<dyn Write + Send> = Box::new(io::stdout());
        Ok(Self::new(
            Arc::new(TerminalInput::stdin()?),
            Arc::new(Mutex::new(output)),
            Arc::new(CrosstermTerminal),
        ))
    }

    /// Locks the output, recovering from a poisoned lock.
    pub fn lock_output(&self) -> MutexGuard<'_, Box<dyn Write + Send>> {
        lock_writer(&self.output)
    }

    /// Writes and flushes one block without interleaving.
    pub fn write_block(&self, bytes: &[u8]) -> io::Result<()> {
        let mut out = self.lock_output();
        out.write_all(bytes)?;
        out.flush()
    }

    /// Prints text, logging instead of failing.
    pub fn print(&self, text: &str) {
        if let Err(e) = self.write_block(text.as_bytes()) {
            tracing::warn!(error = %e, "Failed to write to terminal");
        }
    }

    /// Prints a prompt and reads the reply line, trimmed.
    pub async fn prompt(&self, text: &str) -> Option<String> {
        self.print(text);
        self.input
            .read_line()
            .await
            .map(|line| line.trim().to_string())
    }

    /// Shows a one-line message and waits for Enter.
    pub async fn pause(&self, message: &str) {
        self.print(&format!("{} Press Enter...", message));
        let _ = self.input.read_line().await;
    }
}

/// Draws `lines` inside a 42-column box.
pub fn boxed(lines: &[&str]) -> String {
    let rule = "═".repeat(40);
    let mut out = format!("╔{}╗\n", rule);
    for line in lines {
        out.push_str(&format!("║ {:<39}║\n", line));
    }
    out.push_str(&format!("╚{}╝", rule));
    out
}

/// Locks a shared writer, recovering from a poisoned lock.
pub fn lock_writer(writer: &SharedWriter) -> MutexGuard<'_, Box<dyn Write + Send>> {
    writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
