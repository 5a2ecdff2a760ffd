//! Key handling for each mode. Only the active mode sees a key; `Ctrl+C` is
//! the one binding honoured everywhere.

use std::collections::BTreeSet;

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::{browser::LocalBrowser, filter};

use super::{
    mode::{
        parent_path, AddDialog, AddSource, DeleteDialog, FilterInput, FilterKind, FilterMenu,
        Mode, RelocateDialog, RemoteBrowser, TextInput,
    },
    App, BannerLevel, Command,
};

enum DialogAction {
    None,
    /// Emit a command and keep the dialog open.
    Request(Command),
    /// Emit a command and close the dialog.
    Submit(Command),
    Cancel,
}

enum FilterAction {
    None,
    Changed(String),
    Apply,
    Cancel(String),
}

enum MenuAction {
    None,
    Apply(FilterKind, BTreeSet<String>),
    Clear(FilterKind),
    Cancel,
}

impl App {
    pub(super) fn handle_key(&mut self, key: KeyEvent) -> Vec<Command> {
        if key.kind == KeyEventKind::Release {
            return Vec::new();
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return self.quit();
        }
        if self.show_help {
            if matches!(
                key.code,
                KeyCode::Char('?') | KeyCode::Char('q') | KeyCode::Esc | KeyCode::Enter
            ) {
                self.show_help = false;
            }
            return Vec::new();
        }
        match self.modes.active() {
            Mode::AddTorrent(_) => self.handle_add_key(key),
            Mode::Relocate(_) => self.handle_relocate_key(key),
            Mode::ConfirmDelete(_) => self.handle_delete_key(key),
            Mode::FilterInput(_) => self.handle_filter_input_key(key),
            Mode::FilterSelect(_) => self.handle_filter_menu_key(key),
            Mode::ColumnConfig { .. } => self.handle_column_key(key),
            Mode::Details { .. } => self.handle_details_key(key),
            Mode::Main => self.handle_main_key(key),
        }
    }

    pub(super) fn handle_paste(&mut self, text: String) {
        let text = text.trim_end_matches(['\r', '\n']);
        match self.modes.active_mut() {
            Mode::FilterInput(state) => {
                state.input.insert_str(text);
                let value = state.input.value().to_string();
                self.filter.text = value;
                self.rederive();
            }
            Mode::AddTorrent(AddDialog {
                source: AddSource::Url(input),
            }) => input.insert_str(text),
            Mode::Relocate(dialog) if dialog.browser.is_none() => dialog.path.insert_str(text),
            Mode::Main => {
                self.modes.push(Mode::AddTorrent(AddDialog {
                    source: AddSource::Url(TextInput::new(text.trim())),
                }));
            }
            _ => {}
        }
    }

    fn quit(&mut self) -> Vec<Command> {
        self.should_quit = true;
        vec![Command::Quit]
    }

    fn handle_main_key(&mut self, key: KeyEvent) -> Vec<Command> {
        match key.code {
            KeyCode::Char('q') => return self.quit(),
            KeyCode::Up | KeyCode::Char('k') => self.move_cursor(-1),
            KeyCode::Down | KeyCode::Char('j') => self.move_cursor(1),
            KeyCode::PageUp => self.move_cursor(-self.page_size()),
            KeyCode::PageDown => self.move_cursor(self.page_size()),
            KeyCode::Home => self.set_cursor(0),
            KeyCode::End => self.set_cursor(usize::MAX),
            KeyCode::Enter => {
                if let Some(hash) = self.selected().map(|torrent| torrent.hash.clone()) {
                    self.modes.push(Mode::Details { hash });
                }
            }
            KeyCode::Esc => {
                if !self.filter.text.is_empty() {
                    self.filter.text.clear();
                    self.rederive();
                }
            }
            KeyCode::Char('r') => {
                if let Some(command) = self.request_sync() {
                    self.set_banner(BannerLevel::Info, "Refreshing…");
                    return vec![command];
                }
            }
            KeyCode::Char('/') => {
                let previous = self.filter.text.clone();
                self.modes.push(Mode::FilterInput(FilterInput {
                    input: TextInput::new(previous.clone()),
                    previous,
                }));
            }
            KeyCode::Char('?') => self.show_help = true,
            KeyCode::Char('p') => {
                let hashes = self.targets();
                return self.mutate(hashes, Command::Pause);
            }
            KeyCode::Char('u') => {
                let hashes = self.targets();
                return self.mutate(hashes, Command::Resume);
            }
            KeyCode::Char('d') => {
                let hashes = self.targets();
                self.open_delete(hashes);
            }
            KeyCode::Char('m') => {
                let hashes = self.targets();
                self.open_relocate(hashes);
            }
            KeyCode::Char('a') => {
                self.modes.push(Mode::AddTorrent(AddDialog {
                    source: AddSource::Browse(LocalBrowser::open_default()),
                }));
            }
            KeyCode::Char('C') => {
                self.modes.push(Mode::ColumnConfig { cursor: 0 });
            }
            KeyCode::Char('s') => self.open_filter_menu(FilterKind::State),
            KeyCode::Char('c') => self.open_filter_menu(FilterKind::Category),
            KeyCode::Char('t') => self.open_filter_menu(FilterKind::Tracker),
            KeyCode::Char('T') => self.open_filter_menu(FilterKind::Tag),
            KeyCode::Char('x') => {
                if !self.filter.is_empty() {
                    self.filter.clear();
                    self.rederive();
                }
            }
            KeyCode::Char(' ') => {
                if let Some(hash) = self.selected().map(|torrent| torrent.hash.clone()) {
                    if !self.marked.remove(&hash) {
                        self.marked.insert(hash);
                    }
                    self.move_cursor(1);
                }
            }
            KeyCode::Char('<') => self.shift_sort_column(-1),
            KeyCode::Char('>') => self.shift_sort_column(1),
            KeyCode::Char('i') => {
                self.sort.direction = self.sort.direction.flipped();
                self.rederive();
            }
            _ => {}
        }
        Vec::new()
    }

    fn handle_details_key(&mut self, key: KeyEvent) -> Vec<Command> {
        let Some(hash) = self.modes.details_hash().map(str::to_string) else {
            return Vec::new();
        };
        if !self.mirror.contains(&hash) {
            self.modes.pop();
            return Vec::new();
        }
        let hashes = vec![hash];
        match key.code {
            KeyCode::Esc | KeyCode::Enter => {
                self.modes.pop();
            }
            KeyCode::Char('?') => self.show_help = true,
            KeyCode::Char('p') => return self.mutate(hashes, Command::Pause),
            KeyCode::Char('u') => return self.mutate(hashes, Command::Resume),
            KeyCode::Char('d') => self.open_delete(hashes),
            KeyCode::Char('m') => self.open_relocate(hashes),
            _ => {}
        }
        Vec::new()
    }

    fn handle_column_key(&mut self, key: KeyEvent) -> Vec<Command> {
        let len = self.columns.len();
        let Mode::ColumnConfig { cursor } = self.modes.active_mut() else {
            return Vec::new();
        };
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => *cursor = super::mode::step(*cursor, -1, len),
            KeyCode::Down | KeyCode::Char('j') => *cursor = super::mode::step(*cursor, 1, len),
            KeyCode::Char(' ') => {
                let index = *cursor;
                if let Some(key) = self.columns.get(index).map(|column| column.key) {
                    self.columns.toggle(key);
                }
            }
            KeyCode::Enter => {
                let index = *cursor;
                if let Some(key) = self.columns.get(index).map(|column| column.key) {
                    self.sort.select(key);
                    self.rederive();
                }
            }
            KeyCode::Esc | KeyCode::Char('C') => {
                self.modes.pop();
            }
            _ => {}
        }
        Vec::new()
    }

    fn handle_filter_menu_key(&mut self, key: KeyEvent) -> Vec<Command> {
        let Mode::FilterSelect(menu) = self.modes.active_mut() else {
            return Vec::new();
        };
        let action = match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                menu.move_cursor(-1);
                MenuAction::None
            }
            KeyCode::Down | KeyCode::Char('j') => {
                menu.move_cursor(1);
                MenuAction::None
            }
            KeyCode::Char(' ') => {
                menu.toggle_highlighted();
                MenuAction::None
            }
            KeyCode::Enter => MenuAction::Apply(menu.kind, menu.selection()),
            KeyCode::Backspace | KeyCode::Delete => MenuAction::Clear(menu.kind),
            KeyCode::Esc => MenuAction::Cancel,
            _ => MenuAction::None,
        };
        match action {
            MenuAction::Apply(kind, values) => {
                self.modes.pop();
                self.set_filter_values(kind, values);
            }
            MenuAction::Clear(kind) => {
                self.modes.pop();
                self.set_filter_values(kind, BTreeSet::new());
            }
            MenuAction::Cancel => {
                self.modes.pop();
            }
            MenuAction::None => {}
        }
        Vec::new()
    }

    fn handle_filter_input_key(&mut self, key: KeyEvent) -> Vec<Command> {
        let Mode::FilterInput(state) = self.modes.active_mut() else {
            return Vec::new();
        };
        let action = match key.code {
            KeyCode::Enter => FilterAction::Apply,
            KeyCode::Esc => FilterAction::Cancel(state.previous.clone()),
            _ if state.input.edit(&key) => FilterAction::Changed(state.input.value().to_string()),
            _ => FilterAction::None,
        };
        match action {
            FilterAction::Changed(text) => {
                self.filter.text = text;
                self.rederive();
            }
            FilterAction::Apply => {
                self.modes.pop();
                let trimmed = self.filter.text.trim().to_string();
                if trimmed != self.filter.text {
                    self.filter.text = trimmed;
                    self.rederive();
                }
            }
            FilterAction::Cancel(previous) => {
                self.modes.pop();
                self.filter.text = previous;
                self.rederive();
            }
            FilterAction::None => {}
        }
        Vec::new()
    }

    fn handle_delete_key(&mut self, key: KeyEvent) -> Vec<Command> {
        let Mode::ConfirmDelete(dialog) = self.modes.active_mut() else {
            return Vec::new();
        };
        let action = match key.code {
            KeyCode::Char('f') => {
                dialog.delete_files = !dialog.delete_files;
                DialogAction::None
            }
            KeyCode::Char('y') | KeyCode::Enter => DialogAction::Submit(Command::Delete {
                hashes: dialog.hashes.clone(),
                delete_files: dialog.delete_files,
            }),
            KeyCode::Char('n') | KeyCode::Esc => DialogAction::Cancel,
            _ => DialogAction::None,
        };
        self.finish_dialog(action)
    }

    fn handle_relocate_key(&mut self, key: KeyEvent) -> Vec<Command> {
        let Mode::Relocate(dialog) = self.modes.active_mut() else {
            return Vec::new();
        };
        let generation = dialog.generation;
        let action = match dialog.browser.as_mut() {
            None => match key.code {
                KeyCode::Enter => {
                    let path = dialog.path.value().trim().to_string();
                    if path.is_empty() {
                        DialogAction::None
                    } else {
                        DialogAction::Submit(Command::SetLocation {
                            hashes: dialog.hashes.clone(),
                            path,
                        })
                    }
                }
                KeyCode::Esc => DialogAction::Cancel,
                KeyCode::Tab => {
                    let path = match dialog.path.value().trim() {
                        "" => "/".to_string(),
                        value => value.to_string(),
                    };
                    dialog.browser = Some(RemoteBrowser::loading(path.clone()));
                    DialogAction::Request(Command::ListDirectories { generation, path })
                }
                _ => {
                    dialog.path.edit(&key);
                    DialogAction::None
                }
            },
            Some(browser) => match key.code {
                KeyCode::Up | KeyCode::Char('k') => {
                    browser.move_cursor(-1);
                    DialogAction::None
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    browser.move_cursor(1);
                    DialogAction::None
                }
                KeyCode::Enter | KeyCode::Right | KeyCode::Char('l') => {
                    match browser.highlighted().map(str::to_string) {
                        Some(path) => {
                            *browser = RemoteBrowser::loading(path.clone());
                            DialogAction::Request(Command::ListDirectories { generation, path })
                        }
                        None => DialogAction::None,
                    }
                }
                KeyCode::Backspace | KeyCode::Left | KeyCode::Char('h') => {
                    let path = parent_path(&browser.path);
                    if path == browser.path {
                        DialogAction::None
                    } else {
                        *browser = RemoteBrowser::loading(path.clone());
                        DialogAction::Request(Command::ListDirectories { generation, path })
                    }
                }
                KeyCode::Char(' ') => {
                    let chosen = browser
                        .highlighted()
                        .map(str::to_string)
                        .unwrap_or_else(|| browser.path.clone());
                    dialog.path.set(chosen);
                    dialog.browser = None;
                    DialogAction::None
                }
                KeyCode::Tab => {
                    let current = browser.path.clone();
                    dialog.path.set(current);
                    dialog.browser = None;
                    DialogAction::None
                }
                KeyCode::Esc => {
                    dialog.browser = None;
                    DialogAction::None
                }
                _ => DialogAction::None,
            },
        };
        self.finish_dialog(action)
    }

    fn handle_add_key(&mut self, key: KeyEvent) -> Vec<Command> {
        let Mode::AddTorrent(dialog) = self.modes.active_mut() else {
            return Vec::new();
        };
        let action = match &mut dialog.source {
            AddSource::Browse(browser) => match key.code {
                KeyCode::Up | KeyCode::Char('k') => {
                    browser.move_cursor(-1);
                    DialogAction::None
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    browser.move_cursor(1);
                    DialogAction::None
                }
                KeyCode::Enter | KeyCode::Right | KeyCode::Char('l') => {
                    match browser.highlighted().cloned() {
                        Some(entry) if entry.is_dir => {
                            browser.enter(entry.path);
                            DialogAction::None
                        }
                        Some(entry) if key.code == KeyCode::Enter => {
                            DialogAction::Submit(Command::AddFile(entry.path))
                        }
                        _ => DialogAction::None,
                    }
                }
                KeyCode::Backspace | KeyCode::Left | KeyCode::Char('h') => {
                    browser.parent();
                    DialogAction::None
                }
                KeyCode::Tab => {
                    dialog.source = AddSource::Url(TextInput::default());
                    DialogAction::None
                }
                KeyCode::Esc => DialogAction::Cancel,
                _ => DialogAction::None,
            },
            AddSource::Url(input) => match key.code {
                KeyCode::Enter => {
                    let url = input.value().trim().to_string();
                    if url.is_empty() {
                        DialogAction::None
                    } else {
                        DialogAction::Submit(Command::AddUrl(url))
                    }
                }
                KeyCode::Tab => {
                    dialog.source = AddSource::Browse(LocalBrowser::open_default());
                    DialogAction::None
                }
                KeyCode::Esc => DialogAction::Cancel,
                _ => {
                    input.edit(&key);
                    DialogAction::None
                }
            },
        };
        self.finish_dialog(action)
    }

    fn finish_dialog(&mut self, action: DialogAction) -> Vec<Command> {
        match action {
            DialogAction::None => Vec::new(),
            DialogAction::Request(command) => vec![command],
            DialogAction::Submit(command) => {
                self.modes.pop();
                vec![command]
            }
            DialogAction::Cancel => {
                self.modes.pop();
                Vec::new()
            }
        }
    }

    /// Marked torrents, or the highlighted one when nothing is marked.
    fn targets(&self) -> Vec<String> {
        if !self.marked.is_empty() {
            return self.marked.iter().cloned().collect();
        }
        self.selected()
            .map(|torrent| vec![torrent.hash.clone()])
            .unwrap_or_default()
    }

    fn target_label(&self, hashes: &[String]) -> String {
        match hashes {
            [hash] => self
                .mirror
                .torrent(hash)
                .map(|torrent| torrent.name.clone())
                .unwrap_or_else(|| hash.clone()),
            _ => super::count(hashes.len()),
        }
    }

    fn mutate(
        &mut self,
        hashes: Vec<String>,
        command: impl FnOnce(Vec<String>) -> Command,
    ) -> Vec<Command> {
        if hashes.is_empty() {
            self.set_banner(BannerLevel::Info, "No torrent selected");
            return Vec::new();
        }
        vec![command(hashes)]
    }

    fn open_delete(&mut self, hashes: Vec<String>) {
        if hashes.is_empty() {
            self.set_banner(BannerLevel::Info, "No torrent selected");
            return;
        }
        let label = self.target_label(&hashes);
        self.modes.push(Mode::ConfirmDelete(DeleteDialog {
            hashes,
            label,
            delete_files: false,
        }));
    }

    fn open_relocate(&mut self, hashes: Vec<String>) {
        let Some(first) = hashes.first() else {
            self.set_banner(BannerLevel::Info, "No torrent selected");
            return;
        };
        let initial = self
            .mirror
            .torrent(first)
            .map(|torrent| torrent.save_path.clone())
            .unwrap_or_default();
        let label = self.target_label(&hashes);
        self.next_generation += 1;
        self.modes.push(Mode::Relocate(RelocateDialog {
            generation: self.next_generation,
            hashes,
            label,
            path: TextInput::new(initial),
            browser: None,
        }));
    }

    fn open_filter_menu(&mut self, kind: FilterKind) {
        let mirror = &self.mirror;
        let (options, chosen) = match kind {
            FilterKind::State => (
                filter::state_options(mirror.torrents()),
                self.filter.states.clone(),
            ),
            FilterKind::Category => {
                let mut options: BTreeSet<String> =
                    filter::categories(mirror.torrents()).into_iter().collect();
                options.extend(mirror.categories().map(|category| category.name.clone()));
                let chosen = self.filter.category.iter().cloned().collect();
                (options.into_iter().collect(), chosen)
            }
            FilterKind::Tracker => (
                filter::tracker_domains(mirror.torrents()),
                self.filter.trackers.clone(),
            ),
            FilterKind::Tag => {
                let mut options: BTreeSet<String> =
                    filter::tags(mirror.torrents()).into_iter().collect();
                options.extend(mirror.tags().map(str::to_string));
                (options.into_iter().collect(), self.filter.tags.clone())
            }
        };
        self.modes
            .push(Mode::FilterSelect(FilterMenu::new(kind, options, chosen)));
    }

    fn set_filter_values(&mut self, kind: FilterKind, values: BTreeSet<String>) {
        match kind {
            FilterKind::State => self.filter.states = values,
            FilterKind::Category => self.filter.category = values.into_iter().next(),
            FilterKind::Tracker => self.filter.trackers = values,
            FilterKind::Tag => self.filter.tags = values,
        }
        self.rederive();
    }

    fn shift_sort_column(&mut self, delta: isize) {
        let visible = self.columns.visible_keys();
        if visible.is_empty() {
            return;
        }
        let len = visible.len() as isize;
        let next = match visible.iter().position(|key| *key == self.sort.key) {
            Some(index) => (index as isize + delta).rem_euclid(len) as usize,
            None => 0,
        };
        self.sort.key = visible[next];
        self.rederive();
    }
}
