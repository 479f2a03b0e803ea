//! Scrollback pager.
//!
//! A line-based viewer over a snapshot of a session's scrollback with
//! paging and case-insensitive search.

use crate::console::{boxed, Console, CLEAR_SCREEN};

const REVERSE_VIDEO: &str = "\x1b[7m";
const RESET: &str = "\x1b[0m";

/// One pager command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PagerCommand {
    PageDown,
    PageUp,
    Top,
    Bottom,
    Search(String),
    NextMatch,
    PrevMatch,
    Quit,
    Unknown(String),
}

impl PagerCommand {
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if let Some(term) = input.strip_prefix('/') {
            return PagerCommand::Search(term.to_string());
        }
        match input {
            "" | "j" => PagerCommand::PageDown,
            "k" => PagerCommand::PageUp,
            "g" => PagerCommand::Top,
            "G" => PagerCommand::Bottom,
            "n" => PagerCommand::NextMatch,
            "N" => PagerCommand::PrevMatch,
            "q" => PagerCommand::Quit,
            other => PagerCommand::Unknown(other.to_string()),
        }
    }
}

/// Pager state over a fixed set of lines.
#[derive(Debug, Clone)]
pub struct Pager {
    title: String,
    lines: Vec<String>,
    page_size: usize,
    top: usize,
    term: Option<String>,
    matches: Vec<usize>,
    match_index: Option<usize>,
}

impl Pager {
    pub fn new(title: impl Into<String>, lines: Vec<String>, page_size: usize) -> Self {
        Self {
            title: title.into(),
            lines,
            page_size: page_size.max(1),
            top: 0,
            term: None,
            matches: Vec::new(),
            match_index: None,
        }
    }

    /// Index of the first visible line.
    pub fn top(&self) -> usize {
        self.top
    }

    pub fn visible(&self) -> &[String] {
        let end = (self.top + self.page_size).min(self.lines.len());
        &self.lines[self.top..end]
    }

    /// Line indices matching the current search.
    pub fn matches(&self) -> &[usize] {
        &self.matches
    }

    /// 1-based position of the match cursor.
    pub fn current_match(&self) -> Option<usize> {
        self.match_index.map(|idx| idx + 1)
    }

    /// Applies a command. Returns `false` when the pager should close.
    pub fn apply(&mut self, command: &PagerCommand) -> bool {
        match command {
            PagerCommand::Quit => return false,
            PagerCommand::PageDown => {
                if self.top + self.page_size < self.lines.len() {
                    self.top += self.page_size;
                }
            }
            PagerCommand::PageUp => self.top = self.top.saturating_sub(self.page_size),
            PagerCommand::Top => self.top = 0,
            PagerCommand::Bottom => self.top = self.lines.len().saturating_sub(self.page_size),
            PagerCommand::Search(term) => self.search(term),
            PagerCommand::NextMatch => self.step_match(true),
            PagerCommand::PrevMatch => self.step_match(false),
            PagerCommand::Unknown(_) => {}
        }
        true
    }

    /// Starts a new search. An empty term clears the search.
    fn search(&mut self, term: &str) {
        self.matches.clear();
        self.match_index = None;
        if term.is_empty() {
            self.term = None;
            return;
        }

        let needle = term.to_lowercase();
        self.matches = self
            .lines
            .iter()
            .enumerate()
            .filter(|(_, line)| line.to_lowercase().contains(&needle))
            .map(|(idx, _)| idx)
            .collect();
        self.term = Some(term.to_string());

        if let Some(&first) = self.matches.first() {
            self.match_index = Some(0);
            self.top = first;
        }
    }

    fn step_match(&mut self, forward: bool) {
        let count = self.matches.len();
        let Some(current) = self.match_index else {
            return;
        };
        let next = if forward {
            (current + 1) % count
        } else {
            (current + count - 1) % count
        };
        self.match_index = Some(next);
        self.top = self.matches[next];
    }

    /// `[Line a/b] [Match i/n] Command: `
    pub fn status_line(&self) -> String {
        let mut status = format!("[Line {}/{}] ", self.top + 1, self.lines.len());
        if let Some(current) = self.current_match() {
            status.push_str(&format!("[Match {}/{}] ", current, self.matches.len()));
        }
        status.push_str("Command: ");
        status
    }

    /// The whole screen for the current state.
    pub fn render(&self) -> String {
        let title = format!("Scrollback: {}", self.title);
        let mut header = vec![title];
        if let Some(term) = &self.term {
            header.push(format!("Search: {}", term));
            header.push(format!("Matches: {}", self.matches.len()));
        }
        let header: Vec<&str> = header.iter().map(String::as_str).collect();

        let mut screen = format!("{}{}\n\n", CLEAR_SCREEN, boxed(&header));
        let needle = self.term.as_deref().map(str::to_lowercase);
        for line in self.visible() {
            match &needle {
                Some(needle) => screen.push_str(&highlight(line, needle)),
                None => screen.push_str(line),
            }
            screen.push('\n');
        }
        screen.push('\n');
        screen.push_str(&self.status_line());
        screen
    }
}

/// Wraps every case-insensitive occurrence of `needle` in reverse video.
///
/// `needle` must already be lowercase.
pub fn highlight(line: &str, needle: &str) -> String {
    if needle.is_empty() {
        return line.to_string();
    }

    let mut out = String::with_capacity(line.len());
    let mut pos = 0;
    while pos < line.len() {
        if let Some(end) = match_end(line, pos, needle) {
            out.push_str(REVERSE_VIDEO);
            out.push_str(&line[pos..end]);
            out.push_str(RESET);
            pos = end;
            continue;
        }
        match line[pos..].chars().next() {
            Some(ch) => {
                out.push(ch);
                pos += ch.len_utf8();
            }
            None => break,
        }
    }
    out
}

/// End offset of a match of `needle` starting at `start`, if any.
fn match_end(line: &str, start: usize, needle: &str) -> Option<usize> {
    let mut rest = needle;
    for (offset, ch) in line[start..].char_indices() {
        if rest.is_empty() {
            return Some(start + offset);
        }
        let lowered: String = ch.to_lowercase().collect();
        rest = rest.strip_prefix(lowered.as_str())?;
    }
    rest.is_empty().then_some(line.len())
}

/// Runs the pager until `q` or end of input.
pub async fn run_pager(console: &Console, title: &str, lines: Vec<String>, page_size: usize) {
    let mut pager = Pager::new(title, lines, page_size);
    loop {
        console.print(&pager.render());
        let Some(input) = console.input.read_line().await else {
            return;
        };
        if !pager.apply(&PagerCommand::parse(&input)) {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(count: usize) -> Vec<String> {
        (1..=count).map(|i| format!("line {}", i)).collect()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(PagerCommand::parse(""), PagerCommand::PageDown);
        assert_eq!(PagerCommand::parse(" j "), PagerCommand::PageDown);
        assert_eq!(PagerCommand::parse("k"), PagerCommand::PageUp);
        assert_eq!(PagerCommand::parse("g"), PagerCommand::Top);
        assert_eq!(PagerCommand::parse("G"), PagerCommand::Bottom);
        assert_eq!(PagerCommand::parse("n"), PagerCommand::NextMatch);
        assert_eq!(PagerCommand::parse("N"), PagerCommand::PrevMatch);
        assert_eq!(PagerCommand::parse("q"), PagerCommand::Quit);
        assert_eq!(
            PagerCommand::parse("/Error x"),
            PagerCommand::Search("Error x".to_string())
        );
        assert_eq!(PagerCommand::parse("z"), PagerCommand::Unknown("z".to_string()));
    }

    #[test]
    fn test_paging() {
        let mut pager = Pager::new("web", numbered(45), 20);
        assert_eq!(pager.visible().len(), 20);

        pager.apply(&PagerCommand::PageDown);
        assert_eq!(pager.top(), 20);
        pager.apply(&PagerCommand::PageDown);
        assert_eq!(pager.top(), 40);
        assert_eq!(pager.visible().len(), 5);

        // No page starts past the end.
        pager.apply(&PagerCommand::PageDown);
        assert_eq!(pager.top(), 40);

        pager.apply(&PagerCommand::PageUp);
        assert_eq!(pager.top(), 20);
        pager.apply(&PagerCommand::PageUp);
        pager.apply(&PagerCommand::PageUp);
        assert_eq!(pager.top(), 0);

        pager.apply(&PagerCommand::Bottom);
        assert_eq!(pager.top(), 25);
        pager.apply(&PagerCommand::Top);
        assert_eq!(pager.top(), 0);
    }

    #[test]
    fn test_bottom_with_short_buffer() {
        let mut pager = Pager::new("web", numbered(5), 20);
        pager.apply(&PagerCommand::Bottom);
        assert_eq!(pager.top(), 0);
    }

    #[test]
    fn test_search_is_case_insensitive_and_jumps() {
        let mut lines = numbered(50);
        lines[7] = "ERROR: disk full".to_string();
        lines[30] = "minor error".to_string();
        lines[41] = "Error again".to_string();

        let mut pager = Pager::new("web", lines, 20);
        pager.apply(&PagerCommand::Search("error".to_string()));
        assert_eq!(pager.matches(), &[7, 30, 41]);
        assert_eq!(pager.current_match(), Some(1));
        assert_eq!(pager.top(), 7);
    }

    #[test]
    fn test_match_cursor_wraps() {
        let lines = vec!["a x".to_string(), "b".to_string(), "c X".to_string()];
        let mut pager = Pager::new("web", lines, 1);
        pager.apply(&PagerCommand::Search("x".to_string()));

        pager.apply(&PagerCommand::NextMatch);
        assert_eq!(pager.current_match(), Some(2));
        assert_eq!(pager.top(), 2);

        pager.apply(&PagerCommand::NextMatch);
        assert_eq!(pager.current_match(), Some(1));
        assert_eq!(pager.top(), 0);

        pager.apply(&PagerCommand::PrevMatch);
        assert_eq!(pager.current_match(), Some(2));
    }

    #[test]
    fn test_new_search_resets_cursor() {
        let lines = vec!["x".to_string(), "x".to_string(), "y".to_string()];
        let mut pager = Pager::new("web", lines, 1);
        pager.apply(&PagerCommand::Search("x".to_string()));
        pager.apply(&PagerCommand::NextMatch);
        assert_eq!(pager.current_match(), Some(2));

        pager.apply(&PagerCommand::Search("Y".to_string()));
        assert_eq!(pager.current_match(), Some(1));
        assert_eq!(pager.top(), 2);
    }

    #[test]
    fn test_search_without_matches() {
        let mut pager = Pager::new("web", numbered(30), 10);
        pager.apply(&PagerCommand::PageDown);
        pager.apply(&PagerCommand::Search("absent".to_string()));
        assert!(pager.matches().is_empty());
        assert_eq!(pager.current_match(), None);
        assert_eq!(pager.top(), 10);

        // n/N are no-ops without matches.
        pager.apply(&PagerCommand::NextMatch);
        assert_eq!(pager.top(), 10);
    }

    #[test]
    fn test_quit() {
        let mut pager = Pager::new("web", numbered(3), 10);
        assert!(pager.apply(&PagerCommand::Unknown("?".to_string())));
        assert!(!pager.apply(&PagerCommand::Quit));
    }

    #[test]
    fn test_highlight() {
        assert_eq!(
            highlight("Error and error", "error"),
            "\x1b[7mError\x1b[0m and \x1b[7merror\x1b[0m"
        );
        assert_eq!(highlight("nothing", "error"), "nothing");
        assert_eq!(highlight("ünïcode ok", "ok"), "ünïcode \x1b[7mok\x1b[0m");
    }

    #[test]
    fn test_status_line() {
        let mut pager = Pager::new("web", numbered(30), 10);
        assert_eq!(pager.status_line(), "[Line 1/30] Command: ");
        pager.apply(&PagerCommand::Search("line 2".to_string()));
        assert_eq!(pager.status_line(), "[Line 2/30] [Match 1/11] Command: ");
    }

    #[test]
    fn test_render_shows_search_header() {
        let mut pager = Pager::new("web", numbered(3), 10);
        pager.apply(&PagerCommand::Search("line 3".to_string()));
        let screen = pager.render();
        assert!(screen.contains("Scrollback: web"));
        assert!(screen.contains("Search: line 3"));
        assert!(screen.contains("Matches: 1"));
        assert!(screen.contains("\x1b[7mline 3\x1b[0m"));
    }
}
