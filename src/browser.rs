use std::{
    fs,
    path::{Path, PathBuf},
};

use log::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserEntry {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
}

/// Picks a `.torrent` file from the local file system.
#[derive(Debug, Clone)]
pub struct LocalBrowser {
    pub dir: PathBuf,
    pub entries: Vec<BrowserEntry>,
    pub cursor: usize,
    pub error: Option<String>,
}

impl LocalBrowser {
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        let mut browser = Self {
            dir: dir.into(),
            entries: Vec::new(),
            cursor: 0,
            error: None,
        };
        browser.reload();
        browser
    }

    /// Starts in the home directory, or the working directory when there is none.
    pub fn open_default() -> Self {
        let dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::open(dir)
    }

    pub fn highlighted(&self) -> Option<&BrowserEntry> {
        self.entries.get(self.cursor)
    }

    pub fn move_cursor(&mut self, delta: isize) {
        self.cursor = crate::app::mode::step(self.cursor, delta, self.entries.len());
    }

    pub fn enter(&mut self, dir: PathBuf) {
        self.dir = dir;
        self.cursor = 0;
        self.reload();
    }

    pub fn parent(&mut self) {
        let Some(parent) = self.dir.parent().map(Path::to_path_buf) else {
            return;
        };
        let previous = self.dir.clone();
        self.enter(parent);
        if let Some(index) = self.entries.iter().position(|entry| entry.path == previous) {
            self.cursor = index;
        }
    }

    fn reload(&mut self) {
        match read_entries(&self.dir) {
            Ok(entries) => {
                self.entries = entries;
                self.error = None;
            }
            Err(err) => {
                debug!("cannot list {}: {err}", self.dir.display());
                self.entries.clear();
                self.error = Some(err.to_string());
            }
        }
    }
}

/// Directories first, then `.torrent` files; hidden entries are skipped.
fn read_entries(dir: &Path) -> std::io::Result<Vec<BrowserEntry>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let path = entry.path();
        let is_dir = path.is_dir();
        if !is_dir && !is_torrent_file(&path) {
            continue;
        }
        entries.push(BrowserEntry { name, path, is_dir });
    }
    entries.sort_by(|a, b| {
        b.is_dir
            .cmp(&a.is_dir)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
    Ok(entries)
}

pub fn is_torrent_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("torrent"))
}
