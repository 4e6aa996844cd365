// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeSet;
use std::fmt::Write;
use std::path::{Path, PathBuf};

use tracing::warn;

use super::entry::{LogEntry, load_entries};
use super::error::Result;

pub const DEFAULT_LIMIT: usize = 20;

const TITLE: &str = "Change Log Monitor";
const HELP: &str = "Keys: up/k, down/j to move | enter to select | r to reload | q to quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Up,
    Down,
    Toggle,
    Reload,
    Quit,
}

impl Key {
    /// Map one line of terminal input to a key. An empty line is enter.
    pub fn parse(input: &str) -> Option<Key> {
        match input.trim() {
            "up" | "k" => Some(Key::Up),
            "down" | "j" => Some(Key::Down),
            "" | "enter" => Some(Key::Toggle),
            "r" => Some(Key::Reload),
            "q" | "ctrl+c" => Some(Key::Quit),
            _ => None,
        }
    }
}

/// Whether the viewer should keep running after a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Snapshot of the log plus cursor and selection.
#[derive(Debug)]
pub struct ViewerState {
    path: PathBuf,
    entries: Vec<LogEntry>,
    cursor: usize,
    selected: BTreeSet<usize>,
}

impl ViewerState {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = load_entries(&path)?;
        Ok(Self::with_entries(path, entries))
    }

    pub fn with_entries(path: impl Into<PathBuf>, entries: Vec<LogEntry>) -> Self {
        Self {
            path: path.into(),
            entries,
            cursor: 0,
            selected: BTreeSet::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_selected(&self, idx: usize) -> bool {
        self.selected.contains(&idx)
    }

    pub fn selected(&self) -> impl Iterator<Item = &LogEntry> {
        self.selected.iter().filter_map(|&i| self.entries.get(i))
    }

    pub fn handle_key(&mut self, key: Key) -> Flow {
        match key {
            Key::Up => {
                self.cursor = self.cursor.saturating_sub(1);
            }
            Key::Down => {
                if self.cursor + 1 < self.entries.len() {
                    self.cursor += 1;
                }
            }
            Key::Toggle => {
                if !self.entries.is_empty() && !self.selected.remove(&self.cursor) {
                    self.selected.insert(self.cursor);
                }
            }
            Key::Reload => self.reload(),
            Key::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    /// Re-read the file. On failure the current entries stay.
    fn reload(&mut self) {
        match load_entries(&self.path) {
            Ok(entries) => {
                self.entries = entries;
                self.cursor = 0;
            }
            Err(e) => warn!(path = ?self.path, error = %e, "Reload failed, keeping current entries"),
        }
    }

    /// Text view of at most `limit` entries.
    pub fn render(&self, limit: usize) -> String {
        if self.entries.is_empty() {
            return format!(
                "No logs found in {}.\nRun the file monitor first!\n\nPress 'q' to quit.\n",
                self.path.display()
            );
        }

        let mut out = String::new();
        let _ = write!(out, "{}\n\n{}\n\n", TITLE, HELP);

        for (i, entry) in self.entries.iter().take(limit).enumerate() {
            let cursor = if i == self.cursor { "> " } else { "  " };
            let mark = if self.is_selected(i) { "[x]" } else { "[ ]" };
            let _ = writeln!(
                out,
                "{}{} [{}] {} - {}",
                cursor, mark, entry.timestamp, entry.change, entry.file
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn entries(n: usize) -> Vec<LogEntry> {
        (0..n)
            .map(|i| LogEntry {
                timestamp: format!("t{}", i),
                file: format!("f{}.txt", i),
                change: "modified".to_string(),
            })
            .collect()
    }

    #[test]
    fn key_parsing() {
        assert_eq!(Key::parse("k"), Some(Key::Up));
        assert_eq!(Key::parse("down\n"), Some(Key::Down));
        assert_eq!(Key::parse(""), Some(Key::Toggle));
        assert_eq!(Key::parse("r"), Some(Key::Reload));
        assert_eq!(Key::parse("q"), Some(Key::Quit));
        assert_eq!(Key::parse("zz"), None);
        assert_eq!(Key::parse("x"), None);
    }

    #[test]
    fn cursor_is_clamped() {
        let mut state = ViewerState::with_entries("log.json", entries(3));
        state.handle_key(Key::Up);
        assert_eq!(state.cursor(), 0);

        for _ in 0..5 {
            state.handle_key(Key::Down);
        }
        assert_eq!(state.cursor(), 2);
    }

    #[test]
    fn toggle_selects_and_deselects() {
        let mut state = ViewerState::with_entries("log.json", entries(3));
        state.handle_key(Key::Down);
        state.handle_key(Key::Toggle);
        assert!(state.is_selected(1));
        assert_eq!(state.selected().count(), 1);

        state.handle_key(Key::Toggle);
        assert!(!state.is_selected(1));

        let mut empty = ViewerState::with_entries("log.json", Vec::new());
        empty.handle_key(Key::Toggle);
        assert_eq!(empty.selected().count(), 0);
    }

    #[test]
    fn quit_ends_the_session() {
        let mut state = ViewerState::with_entries("log.json", entries(1));
        assert_eq!(state.handle_key(Key::Down), Flow::Continue);
        assert_eq!(state.handle_key(Key::Quit), Flow::Quit);
    }

    #[test]
    fn reload_resets_cursor_and_keeps_selection() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("changes_log.json");
        fs::write(
            &path,
            "{\"timestamp\":\"t1\",\"file\":\"a\",\"change\":\"created\"}\n\
             {\"timestamp\":\"t2\",\"file\":\"b\",\"change\":\"created\"}\n",
        )
        .unwrap();

        let mut state = ViewerState::load(&path).unwrap();
        assert_eq!(state.entries().len(), 2);
        state.handle_key(Key::Down);
        state.handle_key(Key::Toggle);

        fs::write(
            &path,
            "{\"timestamp\":\"t1\",\"file\":\"a\",\"change\":\"created\"}\n\
             {\"timestamp\":\"t2\",\"file\":\"b\",\"change\":\"created\"}\n\
             {\"timestamp\":\"t3\",\"file\":\"c\",\"change\":\"deleted\"}\n",
        )
        .unwrap();
        state.handle_key(Key::Reload);

        assert_eq!(state.entries().len(), 3);
        assert_eq!(state.entries()[0].timestamp, "t3");
        assert_eq!(state.cursor(), 0);
        assert!(state.is_selected(1));
    }

    #[test]
    fn failed_reload_keeps_entries() {
        let dir = TempDir::new().unwrap();
        let mut state = ViewerState::with_entries(dir.path(), entries(2));
        state.handle_key(Key::Down);
        state.handle_key(Key::Reload);
        assert_eq!(state.entries().len(), 2);
        assert_eq!(state.cursor(), 1);
    }

    #[test]
    fn render_marks_cursor_and_selection() {
        let mut state = ViewerState::with_entries("log.json", entries(2));
        state.handle_key(Key::Toggle);
        state.handle_key(Key::Down);

        let view = state.render(DEFAULT_LIMIT);
        assert!(view.starts_with("Change Log Monitor\n\n"));
        assert!(view.contains("  [x] [t0] modified - f0.txt\n"));
        assert!(view.contains("> [ ] [t1] modified - f1.txt\n"));
    }

    #[test]
    fn render_limits_rows() {
        let state = ViewerState::with_entries("log.json", entries(30));
        let view = state.render(DEFAULT_LIMIT);
        assert_eq!(view.lines().filter(|l| l.contains(" - f")).count(), 20);
    }

    #[test]
    fn render_empty_state_names_file() {
        let state = ViewerState::with_entries("/app/dat/changes_log.json", Vec::new());
        assert!(
            state
                .render(DEFAULT_LIMIT)
                .starts_with("No logs found in /app/dat/changes_log.json.")
        );
    }
}
