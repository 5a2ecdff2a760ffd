use std::{cmp::Ordering, fmt, str::FromStr};

use serde::Deserialize;

use crate::{filter::tracker_domain, model::Torrent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Name,
    Size,
    Progress,
    State,
    DlSpeed,
    UpSpeed,
    Seeds,
    Peers,
    Ratio,
    Eta,
    Category,
    Tags,
    Tracker,
    AddedOn,
    CompletedOn,
    SavePath,
}

impl SortKey {
    pub const ALL: [SortKey; 16] = [
        SortKey::Name,
        SortKey::Size,
        SortKey::Progress,
        SortKey::State,
        SortKey::DlSpeed,
        SortKey::UpSpeed,
        SortKey::Seeds,
        SortKey::Peers,
        SortKey::Ratio,
        SortKey::Eta,
        SortKey::Category,
        SortKey::Tags,
        SortKey::Tracker,
        SortKey::AddedOn,
        SortKey::CompletedOn,
        SortKey::SavePath,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Name => "name",
            SortKey::Size => "size",
            SortKey::Progress => "progress",
            SortKey::State => "state",
            SortKey::DlSpeed => "dl_speed",
            SortKey::UpSpeed => "up_speed",
            SortKey::Seeds => "seeds",
            SortKey::Peers => "peers",
            SortKey::Ratio => "ratio",
            SortKey::Eta => "eta",
            SortKey::Category => "category",
            SortKey::Tags => "tags",
            SortKey::Tracker => "tracker",
            SortKey::AddedOn => "added_on",
            SortKey::CompletedOn => "completed_on",
            SortKey::SavePath => "save_path",
        }
    }

    /// Natural ordering of the field behind this key.
    pub fn compare(self, a: &Torrent, b: &Torrent) -> Ordering {
        match self {
            SortKey::Name => cmp_text(&a.name, &b.name),
            SortKey::Size => a.size.cmp(&b.size),
            SortKey::Progress => a.progress.total_cmp(&b.progress),
            SortKey::State => cmp_text(&a.state, &b.state),
            SortKey::DlSpeed => a.dl_speed.cmp(&b.dl_speed),
            SortKey::UpSpeed => a.up_speed.cmp(&b.up_speed),
            SortKey::Seeds => a.seeds.cmp(&b.seeds),
            SortKey::Peers => a.peers.cmp(&b.peers),
            SortKey::Ratio => a.ratio.total_cmp(&b.ratio),
            SortKey::Eta => a.eta.cmp(&b.eta),
            SortKey::Category => cmp_text(&a.category, &b.category),
            SortKey::Tags => cmp_text(&a.tags, &b.tags),
            SortKey::Tracker => cmp_text(&tracker_domain(&a.tracker), &tracker_domain(&b.tracker)),
            SortKey::AddedOn => a.added_on.cmp(&b.added_on),
            SortKey::CompletedOn => a.completion_on.cmp(&b.completion_on),
            SortKey::SavePath => cmp_text(&a.save_path, &b.save_path),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        SortKey::ALL
            .into_iter()
            .find(|key| key.as_str() == normalized)
            .ok_or_else(|| format!("unknown column '{value}'"))
    }
}

fn cmp_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn flipped(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }

    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }

    pub fn arrow(self) -> &'static str {
        match self {
            SortDirection::Ascending => "▲",
            SortDirection::Descending => "▼",
        }
    }
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Ascending),
            "desc" | "descending" => Ok(SortDirection::Descending),
            other => Err(format!("unknown sort direction '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub key: SortKey,
    pub direction: SortDirection,
    pub secondary: Option<SortKey>,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            key: SortKey::Name,
            direction: SortDirection::Ascending,
            secondary: None,
        }
    }
}

impl SortSpec {
    /// Re-selecting the current key flips the direction; a new key starts ascending.
    pub fn select(&mut self, key: SortKey) {
        if self.key == key {
            self.direction = self.direction.flipped();
        } else {
            self.key = key;
            self.direction = SortDirection::Ascending;
        }
    }
}

pub fn compare(a: &Torrent, b: &Torrent, spec: &SortSpec) -> Ordering {
    let primary = spec.direction.apply(spec.key.compare(a, b));
    match spec.secondary {
        Some(secondary) => {
            primary.then_with(|| spec.direction.apply(secondary.compare(a, b)))
        }
        None => primary,
    }
}

/// Stable sort: complete ties keep their input order.
pub fn sort(torrents: &mut [&Torrent], spec: &SortSpec) {
    torrents.sort_by(|a, b| compare(a, b, spec));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn torrent(hash: &str, name: &str, size: i64) -> Torrent {
        Torrent {
            hash: hash.to_string(),
            name: name.to_string(),
            size,
            ..Torrent::default()
        }
    }

    fn hashes(list: &[&Torrent]) -> Vec<String> {
        list.iter().map(|t| t.hash.clone()).collect()
    }

    #[test]
    fn names_compare_case_insensitively() {
        let torrents = [torrent("1", "beta", 0), torrent("2", "Alpha", 0)];
        let mut view: Vec<&Torrent> = torrents.iter().collect();
        sort(&mut view, &SortSpec::default());
        assert_eq!(hashes(&view), vec!["2", "1"]);
    }

    #[test]
    fn numeric_keys_compare_numerically_and_direction_flips() {
        let torrents = [
            torrent("a", "x", 900),
            torrent("b", "x", 10_000),
            torrent("c", "x", 20),
        ];
        let mut view: Vec<&Torrent> = torrents.iter().collect();
        let mut spec = SortSpec {
            key: SortKey::Size,
            ..SortSpec::default()
        };
        sort(&mut view, &spec);
        assert_eq!(hashes(&view), vec!["c", "a", "b"]);
        spec.direction = SortDirection::Descending;
        sort(&mut view, &spec);
        assert_eq!(hashes(&view), vec!["b", "a", "c"]);
    }

    #[test]
    fn secondary_key_breaks_ties_only() {
        let torrents = [
            torrent("a", "same", 3),
            torrent("b", "same", 1),
            torrent("c", "first", 9),
        ];
        let mut view: Vec<&Torrent> = torrents.iter().collect();
        let spec = SortSpec {
            key: SortKey::Name,
            direction: SortDirection::Ascending,
            secondary: Some(SortKey::Size),
        };
        sort(&mut view, &spec);
        assert_eq!(hashes(&view), vec!["c", "b", "a"]);
    }

    #[test]
    fn sorting_twice_is_stable() {
        let torrents = [
            torrent("a", "x", 5),
            torrent("b", "y", 5),
            torrent("c", "z", 1),
            torrent("d", "w", 5),
        ];
        let mut view: Vec<&Torrent> = torrents.iter().collect();
        let spec = SortSpec {
            key: SortKey::Size,
            direction: SortDirection::Descending,
            secondary: None,
        };
        sort(&mut view, &spec);
        let first = hashes(&view);
        assert_eq!(first, vec!["a", "b", "d", "c"]);
        sort(&mut view, &spec);
        assert_eq!(hashes(&view), first);
    }

    #[test]
    fn select_cycles_or_resets_direction() {
        let mut spec = SortSpec::default();
        spec.select(SortKey::Name);
        assert_eq!(spec.direction, SortDirection::Descending);
        spec.select(SortKey::Name);
        assert_eq!(spec.direction, SortDirection::Ascending);
        spec.select(SortKey::Name);
        spec.select(SortKey::Ratio);
        assert_eq!(spec.key, SortKey::Ratio);
        assert_eq!(spec.direction, SortDirection::Ascending);
    }

    #[test]
    fn keys_parse_from_config_strings() {
        assert_eq!("dl-speed".parse::<SortKey>(), Ok(SortKey::DlSpeed));
        assert_eq!("Added_On".parse::<SortKey>(), Ok(SortKey::AddedOn));
        assert!("bogus".parse::<SortKey>().is_err());
        assert_eq!("desc".parse::<SortDirection>(), Ok(SortDirection::Descending));
    }
}
