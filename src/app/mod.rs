//! Dashboard core: a pure `(state, event) -> (state, commands)` machine.
//!
//! The runtime in `tui` feeds [`AppEvent`]s in one at a time and executes the
//! returned [`Command`]s off the loop thread; their results come back as
//! further events. Nothing in here performs network I/O.

mod input;
pub mod mode;

use std::{
    collections::BTreeSet,
    fmt,
    path::PathBuf,
    time::{Duration, Instant},
};

use crossterm::event::KeyEvent;
use log::{debug, warn};

use crate::{
    client::{ClientError, ClientResult},
    columns::ColumnSet,
    config::UiConfig,
    filter::{self, FilterSpec},
    model::{SyncDelta, Torrent},
    sort::{self, SortSpec},
    sync::Mirror,
};

use mode::{Mode, ModeStack};

const ERROR_BANNER_TTL: Duration = Duration::from_secs(5);
const SUCCESS_BANNER_TTL: Duration = Duration::from_secs(3);

pub enum AppEvent {
    Key(KeyEvent),
    Paste(String),
    Resize { width: u16, height: u16 },
    PollTick,
    UiTick(Instant),
    RefreshDue,
    Synced(ClientResult<SyncDelta>),
    Mutated {
        command: Command,
        result: ClientResult<()>,
    },
    DirectoryListing {
        generation: u64,
        path: String,
        result: ClientResult<Vec<String>>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Sync { rid: i64 },
    Pause(Vec<String>),
    Resume(Vec<String>),
    Delete {
        hashes: Vec<String>,
        delete_files: bool,
    },
    AddFile(PathBuf),
    AddUrl(String),
    SetLocation {
        hashes: Vec<String>,
        path: String,
    },
    ListDirectories {
        generation: u64,
        path: String,
    },
    ScheduleRefresh(Duration),
    Quit,
}

impl Command {
    fn success_text(&self) -> String {
        match self {
            Command::Pause(hashes) => format!("Paused {}", count(hashes.len())),
            Command::Resume(hashes) => format!("Resumed {}", count(hashes.len())),
            Command::Delete {
                hashes,
                delete_files,
            } => {
                let suffix = if *delete_files { " and their files" } else { "" };
                format!("Deleted {}{suffix}", count(hashes.len()))
            }
            Command::AddFile(path) => format!("Added {}", path.display()),
            Command::AddUrl(_) => "Torrent URL added".to_string(),
            Command::SetLocation { hashes, path } => {
                format!("Moving {} to {path}", count(hashes.len()))
            }
            other => format!("{other}"),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Command::Sync { .. } => "Sync",
            Command::Pause(_) => "Pause",
            Command::Resume(_) => "Resume",
            Command::Delete { .. } => "Delete",
            Command::AddFile(_) | Command::AddUrl(_) => "Add",
            Command::SetLocation { .. } => "Move",
            Command::ListDirectories { .. } => "Browse",
            Command::ScheduleRefresh(_) => "Refresh",
            Command::Quit => "Quit",
        };
        f.write_str(verb)
    }
}

fn count(n: usize) -> String {
    if n == 1 {
        "1 torrent".to_string()
    } else {
        format!("{n} torrents")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    pub text: String,
    pub level: BannerLevel,
    pub shown_at: Instant,
}

impl Banner {
    fn ttl(&self) -> Duration {
        match self.level {
            BannerLevel::Error => ERROR_BANNER_TTL,
            BannerLevel::Info | BannerLevel::Success => SUCCESS_BANNER_TTL,
        }
    }

    fn expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.shown_at) >= self.ttl()
    }
}

pub struct App {
    config: UiConfig,
    mirror: Mirror,
    filter: FilterSpec,
    sort: SortSpec,
    columns: ColumnSet,
    modes: ModeStack,
    view: Vec<String>,
    cursor: usize,
    selected_hash: Option<String>,
    marked: BTreeSet<String>,
    banner: Option<Banner>,
    show_help: bool,
    sync_in_flight: bool,
    synced_once: bool,
    next_generation: u64,
    terminal_size: (u16, u16),
    should_quit: bool,
}

impl App {
    pub fn new(config: &UiConfig) -> Self {
        Self {
            config: config.clone(),
            mirror: Mirror::new(),
            filter: FilterSpec::default(),
            sort: config.sort,
            columns: ColumnSet::with_visible(&config.columns),
            modes: ModeStack::default(),
            view: Vec::new(),
            cursor: 0,
            selected_hash: None,
            marked: BTreeSet::new(),
            banner: None,
            show_help: false,
            sync_in_flight: false,
            synced_once: false,
            next_generation: 0,
            terminal_size: (0, 0),
            should_quit: false,
        }
    }

    /// Commands to run before the first event: an initial full sync.
    pub fn start(&mut self) -> Vec<Command> {
        self.set_banner(BannerLevel::Info, "Connecting…");
        self.request_sync().into_iter().collect()
    }

    pub fn update(&mut self, event: AppEvent) -> Vec<Command> {
        match event {
            AppEvent::Key(key) => self.handle_key(key),
            AppEvent::Paste(text) => {
                self.handle_paste(text);
                Vec::new()
            }
            AppEvent::Resize { width, height } => {
                self.terminal_size = (width, height);
                Vec::new()
            }
            AppEvent::PollTick | AppEvent::RefreshDue => self.request_sync().into_iter().collect(),
            AppEvent::UiTick(now) => {
                self.expire_banner(now);
                Vec::new()
            }
            AppEvent::Synced(result) => {
                self.apply_sync(result);
                Vec::new()
            }
            AppEvent::Mutated { command, result } => self.finish_mutation(command, result),
            AppEvent::DirectoryListing {
                generation,
                path,
                result,
            } => {
                self.apply_listing(generation, path, result);
                Vec::new()
            }
        }
    }

    pub fn mirror(&self) -> &Mirror {
        &self.mirror
    }

    pub fn filter(&self) -> &FilterSpec {
        &self.filter
    }

    pub fn sort(&self) -> &SortSpec {
        &self.sort
    }

    pub fn columns(&self) -> &ColumnSet {
        &self.columns
    }

    pub fn modes(&self) -> &ModeStack {
        &self.modes
    }

    pub fn banner(&self) -> Option<&Banner> {
        self.banner.as_ref()
    }

    pub fn show_help(&self) -> bool {
        self.show_help
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn is_marked(&self, hash: &str) -> bool {
        self.marked.contains(hash)
    }

    pub fn marked_count(&self) -> usize {
        self.marked.len()
    }

    pub fn has_synced(&self) -> bool {
        self.synced_once
    }

    /// Filtered and sorted torrents, in display order.
    pub fn visible(&self) -> impl Iterator<Item = &Torrent> {
        self.view.iter().filter_map(|hash| self.mirror.torrent(hash))
    }

    pub fn visible_len(&self) -> usize {
        self.view.len()
    }

    pub fn cursor(&self) -> Option<usize> {
        if self.view.is_empty() {
            None
        } else {
            Some(self.cursor)
        }
    }

    pub fn selected(&self) -> Option<&Torrent> {
        let hash = self.view.get(self.cursor)?;
        self.mirror.torrent(hash)
    }

    pub fn details(&self) -> Option<&Torrent> {
        self.mirror.torrent(self.modes.details_hash()?)
    }

    fn request_sync(&mut self) -> Option<Command> {
        if self.sync_in_flight {
            return None;
        }
        self.sync_in_flight = true;
        Some(Command::Sync {
            rid: self.mirror.rid(),
        })
    }

    fn apply_sync(&mut self, result: ClientResult<SyncDelta>) {
        self.sync_in_flight = false;
        match result {
            Ok(delta) => {
                let outcome = self.mirror.apply(delta);
                if !outcome.applied {
                    return;
                }
                debug!(
                    "sync rid={} changed {} torrents",
                    self.mirror.rid(),
                    outcome.changed
                );
                if !self.synced_once {
                    self.synced_once = true;
                    self.set_banner(
                        BannerLevel::Success,
                        format!("Connected: {}", count(self.mirror.len())),
                    );
                }
                self.marked.retain(|hash| self.mirror.contains(hash));
                let details_gone = self
                    .modes
                    .details_hash()
                    .is_some_and(|hash| !self.mirror.contains(hash));
                if details_gone {
                    self.modes.close_details();
                }
                self.rederive();
            }
            Err(err) => {
                warn!("sync failed: {err}");
                self.mirror.reset();
                self.set_banner(BannerLevel::Error, format!("Sync failed: {err}"));
            }
        }
    }

    fn finish_mutation(&mut self, command: Command, result: ClientResult<()>) -> Vec<Command> {
        match result {
            Ok(()) => {
                if let Command::Delete { hashes, .. } = &command {
                    for hash in hashes {
                        self.marked.remove(hash);
                    }
                }
                self.set_banner(BannerLevel::Success, command.success_text());
                vec![Command::ScheduleRefresh(self.config.refresh_delay)]
            }
            Err(err) => {
                warn!("{command} failed: {err}");
                self.set_banner(BannerLevel::Error, format!("{command} failed: {err}"));
                Vec::new()
            }
        }
    }

    fn apply_listing(&mut self, generation: u64, path: String, result: ClientResult<Vec<String>>) {
        let Some(dialog) = self.modes.relocate_mut() else {
            return;
        };
        if dialog.generation != generation {
            return;
        }
        let Some(browser) = dialog.browser.as_mut() else {
            return;
        };
        if browser.path != path {
            return;
        }
        browser.loading = false;
        browser.cursor = 0;
        match result {
            Ok(entries) => {
                browser.entries = entries;
                browser.error = None;
            }
            Err(err) => {
                browser.entries.clear();
                browser.error = Some(listing_error(&err));
            }
        }
    }

    /// Recomputes the filtered, sorted view and keeps the cursor on the same torrent.
    fn rederive(&mut self) {
        let mut view = filter::apply(self.mirror.torrents(), &self.filter);
        sort::sort(&mut view, &self.sort);
        self.view = view.into_iter().map(|torrent| torrent.hash.clone()).collect();

        if self.view.is_empty() {
            self.cursor = 0;
            self.selected_hash = None;
            return;
        }
        if let Some(target) = &self.selected_hash {
            if let Some(position) = self.view.iter().position(|hash| hash == target) {
                self.cursor = position;
                return;
            }
        }
        self.cursor = self.cursor.min(self.view.len() - 1);
        self.selected_hash = self.view.get(self.cursor).cloned();
    }

    fn move_cursor(&mut self, delta: isize) {
        self.set_cursor(mode::step(self.cursor, delta, self.view.len()));
    }

    fn set_cursor(&mut self, index: usize) {
        if self.view.is_empty() {
            return;
        }
        self.cursor = index.min(self.view.len() - 1);
        self.selected_hash = self.view.get(self.cursor).cloned();
    }

    fn set_banner(&mut self, level: BannerLevel, text: impl Into<String>) {
        self.banner = Some(Banner {
            text: text.into(),
            level,
            shown_at: Instant::now(),
        });
    }

    fn expire_banner(&mut self, now: Instant) {
        if self.banner.as_ref().is_some_and(|banner| banner.expired(now)) {
            self.banner = None;
        }
    }

    fn page_size(&self) -> isize {
        // Header, footer and table chrome take roughly eight rows.
        (self.terminal_size.1 as isize - 8).max(1)
    }
}

fn listing_error(err: &ClientError) -> String {
    match err {
        ClientError::HttpStatus(status) if status.as_u16() == 404 => {
            "Directory browsing is not supported by this server".to_string()
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyModifiers};

    use crate::{model::TorrentPatch, sort::SortKey};

    fn key(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn ctrl(c: char) -> AppEvent {
        AppEvent::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL))
    }

    fn patch(name: &str, state: &str) -> TorrentPatch {
        TorrentPatch {
            name: Some(name.to_string()),
            state: Some(state.to_string()),
            save_path: Some("/data".to_string()),
            ..TorrentPatch::default()
        }
    }

    fn delta(rid: i64, full: bool, torrents: Vec<(&str, TorrentPatch)>) -> SyncDelta {
        SyncDelta {
            rid,
            full_update: full,
            torrents: torrents
                .into_iter()
                .map(|(hash, patch)| (hash.to_string(), patch))
                .collect(),
            ..SyncDelta::default()
        }
    }

    fn synced(torrents: Vec<(&str, TorrentPatch)>) -> App {
        let mut app = App::new(&UiConfig::default());
        app.start();
        app.update(AppEvent::Synced(Ok(delta(1, true, torrents))));
        app
    }

    fn visible_names(app: &App) -> Vec<String> {
        app.visible().map(|torrent| torrent.name.clone()).collect()
    }

    #[test]
    fn polls_are_not_reissued_while_one_is_in_flight() {
        let mut app = App::new(&UiConfig::default());
        assert_eq!(app.start(), vec![Command::Sync { rid: 0 }]);
        assert!(app.update(AppEvent::PollTick).is_empty());
        app.update(AppEvent::Synced(Ok(delta(7, true, vec![]))));
        assert_eq!(app.update(AppEvent::PollTick), vec![Command::Sync { rid: 7 }]);
    }

    #[test]
    fn failed_sync_shows_error_and_forces_full_resync() {
        let mut app = synced(vec![("h1", patch("one", "downloading"))]);
        app.update(AppEvent::PollTick);
        app.update(AppEvent::Synced(Err(ClientError::Api("boom".into()))));
        assert_eq!(app.banner().unwrap().level, BannerLevel::Error);
        assert_eq!(app.mirror().len(), 1);
        assert_eq!(app.update(AppEvent::PollTick), vec![Command::Sync { rid: 0 }]);

        let later = app.banner().unwrap().shown_at + Duration::from_secs(6);
        app.update(AppEvent::UiTick(later));
        assert!(app.banner().is_none());
    }

    #[test]
    fn pausing_a_downloading_torrent_end_to_end() {
        let mut app = synced(vec![("h1", patch("ubuntu.iso", "downloading"))]);
        assert_eq!(app.selected().unwrap().hash, "h1");

        let commands = app.update(key(KeyCode::Char('p')));
        assert_eq!(commands, vec![Command::Pause(vec!["h1".to_string()])]);

        let commands = app.update(AppEvent::Mutated {
            command: commands[0].clone(),
            result: Ok(()),
        });
        assert_eq!(
            commands,
            vec![Command::ScheduleRefresh(Duration::from_millis(750))]
        );
        assert_eq!(app.banner().unwrap().level, BannerLevel::Success);

        assert_eq!(app.update(AppEvent::RefreshDue), vec![Command::Sync { rid: 1 }]);
        app.update(AppEvent::Synced(Ok(delta(
            2,
            false,
            vec![(
                "h1",
                TorrentPatch {
                    state: Some("pausedDL".to_string()),
                    ..TorrentPatch::default()
                },
            )],
        ))));
        let torrent = app.selected().unwrap();
        assert_eq!(torrent.state, "pausedDL");
        assert_eq!(torrent.name, "ubuntu.iso");
        assert_eq!(app.mirror().rid(), 2);
    }

    #[test]
    fn failed_mutation_does_not_schedule_a_refresh() {
        let mut app = synced(vec![("h1", patch("one", "downloading"))]);
        let commands = app.update(AppEvent::Mutated {
            command: Command::Resume(vec!["h1".to_string()]),
            result: Err(ClientError::Api("nope".into())),
        });
        assert!(commands.is_empty());
        assert!(app.banner().unwrap().text.starts_with("Resume failed"));
    }

    #[test]
    fn add_dialog_consumes_keys_before_main_view() {
        let mut app = synced(vec![("h1", patch("one", "downloading"))]);
        app.update(AppEvent::Paste("magnet:?xt=".to_string()));
        assert!(matches!(app.modes().active(), Mode::AddTorrent(_)));

        assert!(app.update(key(KeyCode::Char('q'))).is_empty());
        assert!(app.update(key(KeyCode::Char('p'))).is_empty());
        assert!(!app.should_quit());
        let Mode::AddTorrent(mode::AddDialog {
            source: mode::AddSource::Url(input),
        }) = app.modes().active()
        else {
            panic!("expected url entry");
        };
        assert_eq!(input.value(), "magnet:?xt=qp");

        assert_eq!(
            app.update(key(KeyCode::Enter)),
            vec![Command::AddUrl("magnet:?xt=qp".to_string())]
        );
        assert!(matches!(app.modes().active(), Mode::Main));
    }

    #[test]
    fn add_dialog_shields_main_view_state_in_both_sources() {
        let mut app = synced(vec![
            ("h1", patch("alpha", "downloading")),
            ("h2", patch("beta", "pausedDL")),
        ]);
        let filter = app.filter().clone();
        let sort = *app.sort();
        let columns = app.columns().clone();

        for to_url in [false, true] {
            app.update(key(KeyCode::Char('a')));
            if to_url {
                app.update(key(KeyCode::Tab));
            }
            for c in "sxCi<>/ctTpud mr?q".chars() {
                assert!(app.update(key(KeyCode::Char(c))).is_empty());
                assert!(matches!(app.modes().active(), Mode::AddTorrent(_)));
            }
            let Mode::AddTorrent(mode::AddDialog { source }) = app.modes().active() else {
                panic!("expected add dialog");
            };
            assert_eq!(matches!(source, mode::AddSource::Url(_)), to_url);
            assert_eq!(app.filter(), &filter);
            assert_eq!(app.sort(), &sort);
            assert_eq!(app.columns(), &columns);
            assert_eq!(app.marked_count(), 0);
            assert!(!app.show_help());
            assert!(!app.should_quit());

            assert!(app.update(key(KeyCode::Esc)).is_empty());
            assert!(matches!(app.modes().active(), Mode::Main));
        }
    }

    #[test]
    fn paused_torrent_moves_from_active_to_paused_filter() {
        let mut app = App::new(&UiConfig::default());
        app.start();
        app.update(key(KeyCode::Char('s')));
        app.update(key(KeyCode::Enter));
        assert_eq!(app.filter().states, BTreeSet::from(["active".to_string()]));

        app.update(AppEvent::Synced(Ok(delta(
            1,
            true,
            vec![("h1", patch("A", "downloading"))],
        ))));
        assert_eq!(visible_names(&app), vec!["A"]);

        app.update(AppEvent::Synced(Ok(delta(
            2,
            false,
            vec![(
                "h1",
                TorrentPatch {
                    state: Some("pausedDL".to_string()),
                    ..TorrentPatch::default()
                },
            )],
        ))));
        assert_eq!(app.visible_len(), 0);

        app.update(key(KeyCode::Char('s')));
        app.update(key(KeyCode::Char(' ')));
        app.update(key(KeyCode::Down));
        app.update(key(KeyCode::Enter));
        assert_eq!(app.filter().states, BTreeSet::from(["paused".to_string()]));
        let torrent = app.selected().unwrap();
        assert_eq!((torrent.hash.as_str(), torrent.name.as_str()), ("h1", "A"));
        assert_eq!(torrent.state, "pausedDL");
    }

    #[test]
    fn ctrl_c_quits_from_any_mode() {
        let mut app = synced(vec![("h1", patch("one", "downloading"))]);
        app.update(key(KeyCode::Char('d')));
        assert!(matches!(app.modes().active(), Mode::ConfirmDelete(_)));
        assert_eq!(app.update(ctrl('c')), vec![Command::Quit]);
        assert!(app.should_quit());
    }

    #[test]
    fn delete_dialog_confirms_with_files() {
        let mut app = synced(vec![("h1", patch("one", "downloading"))]);
        app.update(key(KeyCode::Char('d')));
        app.update(key(KeyCode::Char('f')));
        assert_eq!(
            app.update(key(KeyCode::Char('y'))),
            vec![Command::Delete {
                hashes: vec!["h1".to_string()],
                delete_files: true,
            }]
        );
        assert!(matches!(app.modes().active(), Mode::Main));

        app.update(key(KeyCode::Char('d')));
        assert!(app.update(key(KeyCode::Esc)).is_empty());
        assert!(matches!(app.modes().active(), Mode::Main));
    }

    #[test]
    fn relocate_drops_listings_from_other_sessions() {
        let mut app = synced(vec![("h1", patch("one", "downloading"))]);
        app.update(key(KeyCode::Char('m')));
        assert_eq!(
            app.update(key(KeyCode::Tab)),
            vec![Command::ListDirectories {
                generation: 1,
                path: "/data".to_string(),
            }]
        );

        let listing = |generation: u64, path: &str| AppEvent::DirectoryListing {
            generation,
            path: path.to_string(),
            result: Ok(vec![format!("{path}/movies")]),
        };
        app.update(listing(0, "/data"));
        app.update(listing(1, "/elsewhere"));
        let browser = app.modes.relocate_mut().unwrap().browser.clone().unwrap();
        assert!(browser.loading);
        assert!(browser.entries.is_empty());

        app.update(listing(1, "/data"));
        assert_eq!(
            app.update(key(KeyCode::Enter)),
            vec![Command::ListDirectories {
                generation: 1,
                path: "/data/movies".to_string(),
            }]
        );

        app.update(key(KeyCode::Esc));
        app.update(key(KeyCode::Esc));
        assert!(matches!(app.modes().active(), Mode::Main));
        app.update(listing(1, "/data/movies"));

        app.update(key(KeyCode::Char('m')));
        let dialog = app.modes.relocate_mut().unwrap();
        assert_eq!(dialog.generation, 2);
        assert!(dialog.browser.is_none());
    }

    #[test]
    fn relocate_submits_the_typed_path() {
        let mut app = synced(vec![("h1", patch("one", "downloading"))]);
        app.update(key(KeyCode::Char('m')));
        app.update(ctrl('u'));
        app.update(AppEvent::Paste("/mnt/archive".to_string()));
        assert_eq!(
            app.update(key(KeyCode::Enter)),
            vec![Command::SetLocation {
                hashes: vec!["h1".to_string()],
                path: "/mnt/archive".to_string(),
            }]
        );
    }

    #[test]
    fn selection_follows_the_torrent_across_resorts() {
        let mut app = synced(vec![
            ("h1", patch("alpha", "downloading")),
            ("h2", patch("beta", "downloading")),
            ("h3", patch("gamma", "downloading")),
        ]);
        app.update(key(KeyCode::Down));
        assert_eq!(app.selected().unwrap().hash, "h2");

        app.update(AppEvent::Synced(Ok(delta(
            2,
            false,
            vec![(
                "h2",
                TorrentPatch {
                    name: Some("zulu".to_string()),
                    ..TorrentPatch::default()
                },
            )],
        ))));
        assert_eq!(visible_names(&app), vec!["alpha", "gamma", "zulu"]);
        assert_eq!(app.cursor(), Some(2));
        assert_eq!(app.selected().unwrap().hash, "h2");
    }

    #[test]
    fn marks_drive_mutations_and_are_pruned() {
        let mut app = synced(vec![
            ("h1", patch("alpha", "downloading")),
            ("h2", patch("beta", "downloading")),
        ]);
        app.update(key(KeyCode::Char(' ')));
        app.update(key(KeyCode::Char(' ')));
        assert_eq!(app.marked_count(), 2);
        assert_eq!(
            app.update(key(KeyCode::Char('u'))),
            vec![Command::Resume(vec!["h1".to_string(), "h2".to_string()])]
        );

        let mut removal = delta(2, false, vec![]);
        removal.torrents_removed = vec!["h1".to_string()];
        app.update(AppEvent::Synced(Ok(removal)));
        assert_eq!(app.marked_count(), 1);
        assert!(app.is_marked("h2"));
    }

    #[test]
    fn details_close_when_the_torrent_disappears() {
        let mut app = synced(vec![("h1", patch("alpha", "downloading"))]);
        app.update(key(KeyCode::Enter));
        assert_eq!(app.details().unwrap().hash, "h1");

        let mut removal = delta(2, false, vec![]);
        removal.torrents_removed = vec!["h1".to_string()];
        app.update(AppEvent::Synced(Ok(removal)));
        assert!(matches!(app.modes().active(), Mode::Main));
        assert!(app.selected().is_none());
    }

    #[test]
    fn details_below_a_dialog_close_when_the_torrent_disappears() {
        let mut app = synced(vec![
            ("h1", patch("alpha", "downloading")),
            ("h2", patch("beta", "downloading")),
        ]);
        app.update(key(KeyCode::Enter));
        app.update(key(KeyCode::Char('m')));
        assert!(matches!(app.modes().active(), Mode::Relocate(_)));

        let mut removal = delta(2, false, vec![]);
        removal.torrents_removed = vec!["h1".to_string()];
        app.update(AppEvent::Synced(Ok(removal)));
        assert!(matches!(app.modes().active(), Mode::Relocate(_)));
        assert!(app.details().is_none());

        app.update(key(KeyCode::Esc));
        assert!(matches!(app.modes().active(), Mode::Main));
        assert_eq!(app.selected().unwrap().hash, "h2");
    }

    #[test]
    fn filter_input_is_live_and_escape_restores() {
        let mut app = synced(vec![
            ("h1", patch("Ubuntu", "downloading")),
            ("h2", patch("Debian", "pausedDL")),
        ]);
        app.update(key(KeyCode::Char('/')));
        app.update(key(KeyCode::Char('u')));
        app.update(key(KeyCode::Char('b')));
        assert_eq!(visible_names(&app), vec!["Ubuntu"]);
        app.update(key(KeyCode::Esc));
        assert_eq!(app.visible_len(), 2);

        app.update(key(KeyCode::Char('/')));
        app.update(key(KeyCode::Char('d')));
        app.update(key(KeyCode::Enter));
        assert_eq!(app.filter().text, "d");
        assert_eq!(visible_names(&app), vec!["Debian"]);
        app.update(key(KeyCode::Esc));
        assert_eq!(app.visible_len(), 2);
    }

    #[test]
    fn state_menu_applies_logical_groups() {
        let mut app = synced(vec![
            ("h1", patch("alpha", "downloading")),
            ("h2", patch("beta", "pausedDL")),
            ("h3", patch("gamma", "stalledUP")),
        ]);
        app.update(key(KeyCode::Char('s')));
        app.update(key(KeyCode::Down));
        app.update(key(KeyCode::Enter));
        assert_eq!(app.filter().states, BTreeSet::from(["paused".to_string()]));
        assert_eq!(visible_names(&app), vec!["beta"]);

        app.update(key(KeyCode::Char('x')));
        assert_eq!(app.visible_len(), 3);
    }

    #[test]
    fn sort_keys_move_across_visible_columns() {
        let mut app = synced(vec![
            ("h1", patch("alpha", "downloading")),
            ("h2", patch("beta", "downloading")),
        ]);
        app.update(key(KeyCode::Char('i')));
        assert_eq!(visible_names(&app), vec!["beta", "alpha"]);

        app.update(key(KeyCode::Char('>')));
        assert_eq!(app.sort().key, SortKey::Size);
        app.update(key(KeyCode::Char('<')));
        app.update(key(KeyCode::Char('<')));
        assert_eq!(app.sort().key, SortKey::Category);
    }

    #[test]
    fn column_configurator_toggles_and_sorts() {
        let mut app = synced(vec![("h1", patch("alpha", "downloading"))]);
        app.update(key(KeyCode::Char('C')));
        app.update(key(KeyCode::Down));
        app.update(key(KeyCode::Char(' ')));
        assert!(!app.columns().is_visible(SortKey::Size));
        app.update(key(KeyCode::Enter));
        assert_eq!(app.sort().key, SortKey::Size);
        app.update(key(KeyCode::Char('C')));
        assert!(matches!(app.modes().active(), Mode::Main));
    }

    #[test]
    fn help_overlay_swallows_keys() {
        let mut app = synced(vec![("h1", patch("alpha", "downloading"))]);
        app.update(key(KeyCode::Char('?')));
        assert!(app.show_help());
        assert!(app.update(key(KeyCode::Char('p'))).is_empty());
        app.update(key(KeyCode::Char('q')));
        assert!(!app.show_help());
        assert!(!app.should_quit());
    }
}
