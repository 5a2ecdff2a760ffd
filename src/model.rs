use std::{collections::BTreeMap, time::Duration};

use serde::Deserialize;
use time::OffsetDateTime;

/// ETA value the service reports for "never".
pub const ETA_INFINITY: i64 = 8_640_000;

/// One mirrored torrent, keyed by its info-hash.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Torrent {
    pub hash: String,
    pub name: String,
    pub size: i64,
    pub progress: f64,
    pub state: String,
    pub dl_speed: i64,
    pub up_speed: i64,
    pub seeds: i64,
    pub peers: i64,
    pub ratio: f64,
    pub eta: i64,
    pub category: String,
    pub tags: String,
    pub tracker: String,
    pub added_on: i64,
    pub completion_on: i64,
    pub save_path: String,
}

/// Sparse torrent record: `None` means "unchanged".
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TorrentPatch {
    pub name: Option<String>,
    pub size: Option<i64>,
    pub progress: Option<f64>,
    pub state: Option<String>,
    #[serde(rename = "dlspeed")]
    pub dl_speed: Option<i64>,
    #[serde(rename = "upspeed")]
    pub up_speed: Option<i64>,
    #[serde(rename = "num_seeds")]
    pub seeds: Option<i64>,
    #[serde(rename = "num_leechs")]
    pub peers: Option<i64>,
    pub ratio: Option<f64>,
    pub eta: Option<i64>,
    pub category: Option<String>,
    pub tags: Option<String>,
    pub tracker: Option<String>,
    pub added_on: Option<i64>,
    pub completion_on: Option<i64>,
    pub save_path: Option<String>,
}

macro_rules! merge_fields {
    ($target:expr, $patch:expr, $changed:ident; $($field:ident),+ $(,)?) => {
        $(
            if let Some(value) = $patch.$field {
                if $target.$field != value {
                    $target.$field = value;
                    $changed = true;
                }
            }
        )+
    };
}

impl Torrent {
    /// Builds a torrent from a patch; absent fields take their zero value.
    pub fn from_patch(hash: &str, patch: TorrentPatch) -> Self {
        let mut torrent = Torrent {
            hash: hash.to_string(),
            ..Torrent::default()
        };
        torrent.merge(patch);
        torrent
    }

    /// Overwrites every field present in `patch`. Returns whether anything changed.
    pub fn merge(&mut self, patch: TorrentPatch) -> bool {
        let mut changed = false;
        merge_fields!(self, patch, changed;
            name, size, progress, state, dl_speed, up_speed, seeds, peers, ratio, eta,
            category, tags, tracker, added_on, completion_on, save_path,
        );
        changed
    }

    pub fn eta(&self) -> Option<i64> {
        if self.eta < 0 || self.eta >= ETA_INFINITY {
            None
        } else {
            Some(self.eta)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Category {
    pub name: String,
    pub save_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CategoryPatch {
    pub name: Option<String>,
    #[serde(rename = "savePath", alias = "save_path")]
    pub save_path: Option<String>,
}

impl Category {
    pub fn merge(&mut self, patch: CategoryPatch) -> bool {
        let mut changed = false;
        merge_fields!(self, patch, changed; name, save_path);
        changed
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerState {
    pub connection_status: String,
    pub dht_nodes: i64,
    pub dl_speed: i64,
    pub up_speed: i64,
    pub dl_total: i64,
    pub up_total: i64,
    pub free_disk: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerStatePatch {
    pub connection_status: Option<String>,
    pub dht_nodes: Option<i64>,
    #[serde(rename = "dl_info_speed")]
    pub dl_speed: Option<i64>,
    #[serde(rename = "up_info_speed")]
    pub up_speed: Option<i64>,
    #[serde(rename = "dl_info_data")]
    pub dl_total: Option<i64>,
    #[serde(rename = "up_info_data")]
    pub up_total: Option<i64>,
    #[serde(rename = "free_space_on_disk")]
    pub free_disk: Option<i64>,
}

impl ServerState {
    pub fn merge(&mut self, patch: ServerStatePatch) -> bool {
        let mut changed = false;
        merge_fields!(self, patch, changed;
            connection_status, dht_nodes, dl_speed, up_speed, dl_total, up_total, free_disk,
        );
        changed
    }
}

/// One `sync/maindata` message.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SyncDelta {
    pub rid: i64,
    pub full_update: bool,
    pub torrents: BTreeMap<String, TorrentPatch>,
    pub torrents_removed: Vec<String>,
    pub categories: BTreeMap<String, CategoryPatch>,
    pub categories_removed: Vec<String>,
    pub tags: Vec<String>,
    pub tags_removed: Vec<String>,
    pub server_state: Option<ServerStatePatch>,
}

pub fn format_speed(value: i64) -> String {
    const UNITS: [&str; 5] = ["B/s", "KiB/s", "MiB/s", "GiB/s", "TiB/s"];
    let (magnitude, unit) = scale(value, UNITS.len());
    format!("{:.1} {}", magnitude, UNITS[unit])
}

pub fn format_bytes(value: i64) -> String {
    const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    let (magnitude, unit) = scale(value, UNITS.len());
    format!("{:.1} {}", magnitude, UNITS[unit])
}

fn scale(value: i64, units: usize) -> (f64, usize) {
    let mut magnitude = value.max(0) as f64;
    let mut unit = 0;
    while magnitude >= 1024.0 && unit < units - 1 {
        magnitude /= 1024.0;
        unit += 1;
    }
    (magnitude, unit)
}

pub fn format_progress(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

pub fn format_ratio(value: f64) -> String {
    if value < 0.0 {
        "∞".to_string()
    } else {
        format!("{value:.2}")
    }
}

pub fn format_eta(seconds: Option<i64>) -> String {
    match seconds {
        None => "∞".to_string(),
        Some(raw) if raw < 0 => "∞".to_string(),
        Some(raw) => {
            let duration = Duration::from_secs(raw as u64);
            let days = duration.as_secs() / 86_400;
            let hours = (duration.as_secs() % 86_400) / 3_600;
            let minutes = (duration.as_secs() % 3_600) / 60;
            let seconds = duration.as_secs() % 60;
            if days > 0 {
                format!("{}d{}h", days, hours)
            } else if hours > 0 {
                format!("{}h{}m", hours, minutes)
            } else if minutes > 0 {
                format!("{}m", minutes)
            } else {
                format!("{}s", seconds)
            }
        }
    }
}

/// Formats a unix timestamp as `YYYY-MM-DD HH:MM` (UTC). Non-positive values mean "never".
pub fn format_timestamp(value: i64) -> String {
    if value <= 0 {
        return "-".to_string();
    }
    match OffsetDateTime::from_unix_timestamp(value) {
        Ok(at) => format!(
            "{:04}-{:02}-{:02} {:02}:{:02}",
            at.year(),
            u8::from(at.month()),
            at.day(),
            at.hour(),
            at.minute()
        ),
        Err(_) => "-".to_string(),
    }
}
