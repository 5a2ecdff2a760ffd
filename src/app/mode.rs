//! Modal contexts of the dashboard, ordered by input precedence.
//!
//! Exactly one mode is active: the top of a [`ModeStack`] whose base is always
//! [`Mode::Main`]. A mode can only be pushed above a mode of lower precedence,
//! so at most one dialog is ever open and leaving a mode hands control back to
//! whatever was active before it.

use std::collections::BTreeSet;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::browser::LocalBrowser;

#[derive(Debug, Clone)]
pub enum Mode {
    AddTorrent(AddDialog),
    Relocate(RelocateDialog),
    ConfirmDelete(DeleteDialog),
    FilterInput(FilterInput),
    FilterSelect(FilterMenu),
    ColumnConfig { cursor: usize },
    Details { hash: String },
    Main,
}

impl Mode {
    /// 1 is the highest precedence.
    pub fn precedence(&self) -> u8 {
        match self {
            Mode::AddTorrent(_) => 1,
            Mode::Relocate(_) => 2,
            Mode::ConfirmDelete(_) => 3,
            Mode::FilterInput(_) => 4,
            Mode::FilterSelect(_) => 5,
            Mode::ColumnConfig { .. } => 6,
            Mode::Details { .. } => 7,
            Mode::Main => 8,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Mode::AddTorrent(_) => "ADD",
            Mode::Relocate(_) => "MOVE",
            Mode::ConfirmDelete(_) => "DELETE",
            Mode::FilterInput(_) => "SEARCH",
            Mode::FilterSelect(_) => "FILTER",
            Mode::ColumnConfig { .. } => "COLUMNS",
            Mode::Details { .. } => "DETAILS",
            Mode::Main => "NORMAL",
        }
    }

    pub fn is_dialog(&self) -> bool {
        self.precedence() <= 3
    }
}

#[derive(Debug, Clone)]
pub struct ModeStack {
    stack: Vec<Mode>,
}

impl Default for ModeStack {
    fn default() -> Self {
        Self {
            stack: vec![Mode::Main],
        }
    }
}

impl ModeStack {
    pub fn active(&self) -> &Mode {
        self.stack.last().unwrap_or(&Mode::Main)
    }

    pub fn active_mut(&mut self) -> &mut Mode {
        if self.stack.is_empty() {
            self.stack.push(Mode::Main);
        }
        let top = self.stack.len() - 1;
        &mut self.stack[top]
    }

    /// Pushes `mode` if it outranks the active mode. Returns whether it was pushed.
    pub fn push(&mut self, mode: Mode) -> bool {
        if mode.precedence() >= self.active().precedence() {
            return false;
        }
        self.stack.push(mode);
        true
    }

    /// Leaves the active mode. The main view is never popped.
    pub fn pop(&mut self) -> Option<Mode> {
        if self.stack.len() <= 1 {
            return None;
        }
        self.stack.pop()
    }

    /// Modes from the base up; later entries are drawn on top.
    pub fn iter(&self) -> impl Iterator<Item = &Mode> {
        self.stack.iter()
    }

    pub fn details_hash(&self) -> Option<&str> {
        self.stack.iter().rev().find_map(|mode| match mode {
            Mode::Details { hash } => Some(hash.as_str()),
            _ => None,
        })
    }

    /// Drops the details view wherever it sits; modes above it stay open.
    pub fn close_details(&mut self) -> bool {
        let before = self.stack.len();
        self.stack
            .retain(|mode| !matches!(mode, Mode::Details { .. }));
        self.stack.len() != before
    }

    pub fn relocate_mut(&mut self) -> Option<&mut RelocateDialog> {
        self.stack.iter_mut().rev().find_map(|mode| match mode {
            Mode::Relocate(dialog) => Some(dialog),
            _ => None,
        })
    }
}

/// Single-line text entry with the cursor pinned to the end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextInput {
    buffer: String,
}

impl TextInput {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            buffer: initial.into(),
        }
    }

    pub fn value(&self) -> &str {
        &self.buffer
    }

    pub fn set(&mut self, value: impl Into<String>) {
        self.buffer = value.into();
    }

    pub fn insert_str(&mut self, text: &str) {
        self.buffer
            .extend(text.chars().filter(|c| !c.is_control()));
    }

    /// Applies an editing key. Returns false for keys that are not edits.
    pub fn edit(&mut self, key: &KeyEvent) -> bool {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('u') if ctrl => self.buffer.clear(),
            KeyCode::Char('w') if ctrl => {
                let trimmed = self.buffer.trim_end().len();
                self.buffer.truncate(trimmed);
                let cut = self
                    .buffer
                    .rfind(|c: char| c.is_whitespace() || c == '/')
                    .map_or(0, |index| index + 1);
                self.buffer.truncate(cut);
            }
            KeyCode::Char(_) if ctrl => return false,
            KeyCode::Char(c) => self.buffer.push(c),
            KeyCode::Backspace => {
                self.buffer.pop();
            }
            _ => return false,
        }
        true
    }
}

#[derive(Debug, Clone)]
pub struct FilterInput {
    pub input: TextInput,
    /// Text to restore when the edit is cancelled.
    pub previous: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    State,
    Category,
    Tracker,
    Tag,
}

impl FilterKind {
    pub fn title(self) -> &'static str {
        match self {
            FilterKind::State => "Filter by state",
            FilterKind::Category => "Filter by category",
            FilterKind::Tracker => "Filter by tracker",
            FilterKind::Tag => "Filter by tag",
        }
    }

    /// Category filtering accepts at most one value.
    pub fn single(self) -> bool {
        matches!(self, FilterKind::Category)
    }
}

#[derive(Debug, Clone)]
pub struct FilterMenu {
    pub kind: FilterKind,
    pub options: Vec<String>,
    pub cursor: usize,
    pub chosen: BTreeSet<String>,
}

impl FilterMenu {
    pub fn new(kind: FilterKind, options: Vec<String>, chosen: BTreeSet<String>) -> Self {
        let cursor = options
            .iter()
            .position(|option| chosen.contains(option))
            .unwrap_or(0);
        Self {
            kind,
            options,
            cursor,
            chosen,
        }
    }

    pub fn highlighted(&self) -> Option<&str> {
        self.options.get(self.cursor).map(String::as_str)
    }

    pub fn move_cursor(&mut self, delta: isize) {
        self.cursor = step(self.cursor, delta, self.options.len());
    }

    pub fn toggle_highlighted(&mut self) {
        let Some(option) = self.highlighted().map(str::to_string) else {
            return;
        };
        if self.chosen.remove(&option) {
            return;
        }
        if self.kind.single() {
            self.chosen.clear();
        }
        self.chosen.insert(option);
    }

    /// Values to apply on confirm: the chosen set, or the highlighted option alone.
    pub fn selection(&self) -> BTreeSet<String> {
        if !self.chosen.is_empty() {
            return self.chosen.clone();
        }
        self.highlighted()
            .map(|option| BTreeSet::from([option.to_string()]))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub enum AddSource {
    Browse(LocalBrowser),
    Url(TextInput),
}

#[derive(Debug, Clone)]
pub struct AddDialog {
    pub source: AddSource,
}

#[derive(Debug, Clone)]
pub struct DeleteDialog {
    pub hashes: Vec<String>,
    pub label: String,
    pub delete_files: bool,
}

#[derive(Debug, Clone)]
pub struct RelocateDialog {
    /// Session id; directory listings for other sessions are dropped.
    pub generation: u64,
    pub hashes: Vec<String>,
    pub label: String,
    pub path: TextInput,
    pub browser: Option<RemoteBrowser>,
}

#[derive(Debug, Clone, Default)]
pub struct RemoteBrowser {
    pub path: String,
    pub entries: Vec<String>,
    pub cursor: usize,
    pub loading: bool,
    pub error: Option<String>,
}

impl RemoteBrowser {
    pub fn loading(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            loading: true,
            ..Self::default()
        }
    }

    pub fn highlighted(&self) -> Option<&str> {
        self.entries.get(self.cursor).map(String::as_str)
    }

    pub fn move_cursor(&mut self, delta: isize) {
        self.cursor = step(self.cursor, delta, self.entries.len());
    }
}

/// Parent of a remote path, accepting both separators. The root is its own parent.
pub fn parent_path(path: &str) -> String {
    let trimmed = path.trim_end_matches(['/', '\\']);
    if trimmed.is_empty() {
        return "/".to_string();
    }
    match trimmed.rfind(['/', '\\']) {
        Some(0) => "/".to_string(),
        Some(index) => {
            let parent = &trimmed[..index];
            if parent.ends_with(':') {
                format!("{parent}{}", &trimmed[index..=index])
            } else {
                parent.to_string()
            }
        }
        None => trimmed.to_string(),
    }
}

pub(crate) fn step(current: usize, delta: isize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let max = len as isize - 1;
    (current as isize + delta).clamp(0, max) as usize
}
