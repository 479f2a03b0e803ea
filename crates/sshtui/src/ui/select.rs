//! Host selection for multi-host commands.

use hosts::{HostDescriptor, HostDirectory};

use crate::console::{boxed, Console, CLEAR_SCREEN};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectCommand {
    /// Toggle the 1-based host number.
    Toggle(usize),
    All,
    Clear,
    Done,
    Cancel,
    Unknown(String),
}

impl SelectCommand {
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        match input {
            "a" => SelectCommand::All,
            "c" => SelectCommand::Clear,
            "d" => SelectCommand::Done,
            "q" => SelectCommand::Cancel,
            other => match other.parse::<usize>() {
                Ok(number) => SelectCommand::Toggle(number),
                Err(_) => SelectCommand::Unknown(other.to_string()),
            },
        }
    }
}

/// Result of applying a selection command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectStep {
    Continue,
    Done(Vec<HostDescriptor>),
    Cancelled,
}

/// Checked/unchecked state for every host in the directory.
#[derive(Debug, Clone)]
pub struct HostSelection<'a> {
    directory: &'a HostDirectory,
    selected: Vec<bool>,
    notice: Option<String>,
}

impl<'a> HostSelection<'a> {
    pub fn new(directory: &'a HostDirectory) -> Self {
        Self {
            directory,
            selected: vec![false; directory.len()],
            notice: None,
        }
    }

    pub fn is_selected(&self, number: usize) -> bool {
        number
            .checked_sub(1)
            .and_then(|idx| self.selected.get(idx))
            .copied()
            .unwrap_or(false)
    }

    /// Selected hosts in directory order.
    pub fn chosen(&self) -> Vec<HostDescriptor> {
        self.directory
            .hosts()
            .iter()
            .zip(&self.selected)
            .filter(|&(_, &on)| on)
            .map(|(host, _)| host.clone())
            .collect()
    }

    pub fn apply(&mut self, command: SelectCommand) -> SelectStep {
        self.notice = None;
        match command {
            SelectCommand::Toggle(number) => match number.checked_sub(1) {
                Some(idx) if idx < self.selected.len() => self.selected[idx] = !self.selected[idx],
                _ => self.notice = Some(format!("Invalid host number: {}", number)),
            },
            SelectCommand::All => self.selected.iter_mut().for_each(|s| *s = true),
            SelectCommand::Clear => self.selected.iter_mut().for_each(|s| *s = false),
            SelectCommand::Done => return SelectStep::Done(self.chosen()),
            SelectCommand::Cancel => return SelectStep::Cancelled,
            SelectCommand::Unknown(input) if input.is_empty() => {}
            SelectCommand::Unknown(input) => {
                self.notice = Some(format!("Unknown command: {}", input))
            }
        }
        SelectStep::Continue
    }

    pub fn render(&self) -> String {
        let mut screen = format!("{}{}\n\n", CLEAR_SCREEN, boxed(&["Select Hosts"]));
        for (idx, host) in self.directory.hosts().iter().enumerate() {
            let marker = if self.selected[idx] { "[X]" } else { "[ ]" };
            screen.push_str(&format!("  {} [{}] {}", marker, idx + 1, host.alias));
            if let Some(hostname) = &host.hostname {
                screen.push_str(&format!(" ({})", hostname));
            }
            screen.push('\n');
        }
        screen.push_str("\nCommands:\n");
        screen.push_str("  [number]  - Toggle selection\n");
        screen.push_str("  a         - Select all\n");
        screen.push_str("  c         - Clear all\n");
        screen.push_str("  d         - Done (execute)\n");
        screen.push_str("  q         - Cancel\n");
        if let Some(notice) = &self.notice {
            screen.push_str(&format!("\n{}\n", notice));
        }
        screen.push_str("\n> ");
        screen
    }
}

/// Interactive selection. `None` when cancelled or input closes.
pub async fn select_hosts(
    console: &Console,
    directory: &HostDirectory,
) -> Option<Vec<HostDescriptor>> {
    let mut selection = HostSelection::new(directory);
    loop {
        console.print(&selection.render());
        let input = console.input.read_line().await?;
        match selection.apply(SelectCommand::parse(&input)) {
            SelectStep::Continue => {}
            SelectStep::Done(hosts) => return Some(hosts),
            SelectStep::Cancelled => return None,
        }
    }
}
