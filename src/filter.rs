use std::collections::BTreeSet;

use reqwest::Url;

use crate::model::Torrent;

/// Logical state groups, in the order they are offered in the state menu.
pub const STATE_GROUPS: [&str; 6] = [
    "active",
    "paused",
    "completed",
    "queued",
    "stalled",
    "checking",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    pub states: BTreeSet<String>,
    pub trackers: BTreeSet<String>,
    pub category: Option<String>,
    pub tags: BTreeSet<String>,
    pub text: String,
}

impl FilterSpec {
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
            && self.trackers.is_empty()
            && self.category.is_none()
            && self.tags.is_empty()
            && self.text.is_empty()
    }

    pub fn clear(&mut self) {
        *self = FilterSpec::default();
    }

    /// Short human readable summary for the status line.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if !self.states.is_empty() {
            parts.push(format!("state={}", join(&self.states)));
        }
        if let Some(category) = &self.category {
            parts.push(format!("category={category}"));
        }
        if !self.trackers.is_empty() {
            parts.push(format!("tracker={}", join(&self.trackers)));
        }
        if !self.tags.is_empty() {
            parts.push(format!("tag={}", join(&self.tags)));
        }
        if !self.text.is_empty() {
            parts.push(format!("/{}", self.text));
        }
        if parts.is_empty() {
            "(no filter)".to_string()
        } else {
            parts.join(" ")
        }
    }
}

fn join(values: &BTreeSet<String>) -> String {
    values.iter().cloned().collect::<Vec<_>>().join(",")
}

/// Whether `state` belongs to `token`, which is either a logical group or a literal state.
pub fn state_matches(token: &str, state: &str) -> bool {
    match token {
        "active" => matches!(
            state,
            "downloading" | "uploading" | "allocating" | "metaDL" | "forcedDL" | "forcedUP"
        ),
        "paused" => state.starts_with("paused") || state.starts_with("stopped"),
        "completed" => matches!(state, "uploading" | "stalledUP" | "forcedUP" | "queuedUP"),
        "queued" => matches!(state, "queuedDL" | "queuedUP" | "queuedForChecking"),
        "stalled" => matches!(state, "stalledDL" | "stalledUP"),
        "checking" => matches!(
            state,
            "checkingDL" | "checkingUP" | "checkingResumeData" | "queuedForChecking"
        ),
        literal => literal == state,
    }
}

pub fn matches(torrent: &Torrent, spec: &FilterSpec) -> bool {
    if !spec.states.is_empty()
        && !spec
            .states
            .iter()
            .any(|token| state_matches(token, &torrent.state))
    {
        return false;
    }
    if !spec.trackers.is_empty() && !spec.trackers.contains(&tracker_domain(&torrent.tracker)) {
        return false;
    }
    if let Some(category) = &spec.category {
        if &torrent.category != category {
            return false;
        }
    }
    if !spec.tags.is_empty() && !split_tags(&torrent.tags).any(|tag| spec.tags.contains(tag)) {
        return false;
    }
    if !spec.text.is_empty()
        && !torrent
            .name
            .to_lowercase()
            .contains(&spec.text.to_lowercase())
    {
        return false;
    }
    true
}

/// Keeps the torrents matching `spec`, preserving input order.
pub fn apply<'a, I>(torrents: I, spec: &FilterSpec) -> Vec<&'a Torrent>
where
    I: IntoIterator<Item = &'a Torrent>,
{
    torrents
        .into_iter()
        .filter(|torrent| matches(torrent, spec))
        .collect()
}

/// Host part of a tracker URL; bare `host:port` values are accepted too.
pub fn tracker_domain(tracker: &str) -> String {
    let trimmed = tracker.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if let Ok(url) = Url::parse(trimmed) {
        if let Some(host) = url.host_str() {
            return host.to_ascii_lowercase();
        }
    }
    let without_scheme = trimmed
        .split_once("://")
        .map_or(trimmed, |(_, rest)| rest);
    let authority = without_scheme.split('/').next().unwrap_or_default();
    let host = authority.rsplit('@').next().unwrap_or_default();
    host.split(':').next().unwrap_or_default().to_ascii_lowercase()
}

pub fn split_tags(tags: &str) -> impl Iterator<Item = &str> {
    tags.split(',').map(str::trim).filter(|tag| !tag.is_empty())
}

pub fn tracker_domains<'a, I>(torrents: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a Torrent>,
{
    collect_sorted(torrents.into_iter().map(|t| tracker_domain(&t.tracker)))
}

pub fn categories<'a, I>(torrents: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a Torrent>,
{
    collect_sorted(torrents.into_iter().map(|t| t.category.clone()))
}

pub fn tags<'a, I>(torrents: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a Torrent>,
{
    collect_sorted(
        torrents
            .into_iter()
            .flat_map(|t| split_tags(&t.tags).map(str::to_string)),
    )
}

pub fn states<'a, I>(torrents: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a Torrent>,
{
    collect_sorted(torrents.into_iter().map(|t| t.state.clone()))
}

/// Logical groups first, then the literal states currently present.
pub fn state_options<'a, I>(torrents: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a Torrent>,
{
    STATE_GROUPS
        .iter()
        .map(|group| group.to_string())
        .chain(states(torrents))
        .collect()
}

fn collect_sorted(values: impl Iterator<Item = String>) -> Vec<String> {
    values
        .filter(|value| !value.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn torrent(hash: &str, state: &str) -> Torrent {
        Torrent {
            hash: hash.to_string(),
            name: format!("Torrent {hash}"),
            state: state.to_string(),
            ..Torrent::default()
        }
    }

    fn spec_with_states(states: &[&str]) -> FilterSpec {
        FilterSpec {
            states: states.iter().map(|s| s.to_string()).collect(),
            ..FilterSpec::default()
        }
    }

    fn sample() -> Vec<Torrent> {
        ["downloading", "uploading", "pausedDL", "pausedUP", "stalledUP", "queuedUP"]
            .iter()
            .map(|state| torrent(state, state))
            .collect()
    }

    fn states_of(list: &[&Torrent]) -> Vec<String> {
        list.iter().map(|t| t.state.clone()).collect()
    }

    #[test]
    fn active_group_membership() {
        let torrents = sample();
        let filtered = apply(&torrents, &spec_with_states(&["active"]));
        assert_eq!(states_of(&filtered), vec!["downloading", "uploading"]);
    }

    #[test]
    fn completed_group_membership() {
        let torrents = sample();
        let filtered = apply(&torrents, &spec_with_states(&["completed"]));
        assert_eq!(states_of(&filtered), vec!["uploading", "stalledUP", "queuedUP"]);
    }

    #[test]
    fn remaining_groups() {
        assert!(state_matches("paused", "pausedUP"));
        assert!(state_matches("paused", "stoppedDL"));
        assert!(!state_matches("completed", "pausedUP"));
        assert!(state_matches("queued", "queuedForChecking"));
        assert!(state_matches("checking", "queuedForChecking"));
        assert!(state_matches("stalled", "stalledDL"));
        assert!(!state_matches("stalled", "downloading"));
        assert!(state_matches("error", "error"));
        assert!(!state_matches("error", "missingFiles"));
    }

    #[test]
    fn state_tokens_are_disjoined() {
        let torrents = sample();
        let filtered = apply(&torrents, &spec_with_states(&["stalled", "pausedDL"]));
        assert_eq!(states_of(&filtered), vec!["pausedDL", "stalledUP"]);
    }

    #[test]
    fn dimensions_are_conjoined() {
        let mut a = torrent("a", "downloading");
        a.category = "tv".into();
        a.name = "Show S01".into();
        let mut b = torrent("b", "downloading");
        b.category = "movies".into();
        let torrents = vec![a, b];
        let spec = FilterSpec {
            category: Some("tv".into()),
            text: "s01".into(),
            ..spec_with_states(&["active"])
        };
        let filtered = apply(&torrents, &spec);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].hash, "a");

        let spec = FilterSpec {
            text: "nothing".into(),
            ..spec
        };
        assert!(apply(&torrents, &spec).is_empty());
    }

    #[test]
    fn filtering_is_idempotent() {
        let torrents = sample();
        let spec = FilterSpec {
            text: "torrent".into(),
            ..spec_with_states(&["completed", "pausedDL"])
        };
        let once = apply(&torrents, &spec);
        let twice = apply(once.iter().copied(), &spec);
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_spec_matches_everything() {
        let torrents = sample();
        assert_eq!(apply(&torrents, &FilterSpec::default()).len(), torrents.len());
    }

    #[test]
    fn tracker_filter_uses_domain_only() {
        assert_eq!(
            tracker_domain("udp://tracker.example.org:1337/announce"),
            "tracker.example.org"
        );
        assert_eq!(
            tracker_domain("https://Open.Tracker.net/announce?passkey=1"),
            "open.tracker.net"
        );
        assert_eq!(tracker_domain("tracker.local:6969"), "tracker.local");
        assert_eq!(tracker_domain(""), "");

        let mut t = torrent("a", "uploading");
        t.tracker = "http://tracker.example.org:80/announce".into();
        let spec = FilterSpec {
            trackers: ["tracker.example.org".to_string()].into_iter().collect(),
            ..FilterSpec::default()
        };
        assert!(matches(&t, &spec));
    }

    #[test]
    fn tag_filter_requires_overlap() {
        let mut t = torrent("a", "uploading");
        t.tags = "linux, iso ,  ".into();
        let spec = |tag: &str| FilterSpec {
            tags: [tag.to_string()].into_iter().collect(),
            ..FilterSpec::default()
        };
        assert!(matches(&t, &spec("iso")));
        assert!(!matches(&t, &spec("is")));
    }

    #[test]
    fn menu_helpers_are_sorted_and_deduplicated() {
        let mut a = torrent("a", "uploading");
        a.tracker = "udp://b.example:1/announce".into();
        a.category = "tv".into();
        a.tags = "x, y".into();
        let mut b = torrent("b", "downloading");
        b.tracker = "http://a.example/announce".into();
        b.tags = "y".into();
        let mut c = torrent("c", "uploading");
        c.tracker = "udp://b.example:2/announce".into();
        c.category = "tv".into();
        let torrents = vec![a, b, c];

        assert_eq!(tracker_domains(&torrents), vec!["a.example", "b.example"]);
        assert_eq!(categories(&torrents), vec!["tv"]);
        assert_eq!(tags(&torrents), vec!["x", "y"]);
        assert_eq!(states(&torrents), vec!["downloading", "uploading"]);
        let options = state_options(&torrents);
        assert_eq!(options[0], "active");
        assert_eq!(options.last().map(String::as_str), Some("uploading"));
    }

    #[test]
    fn describe_lists_active_dimensions() {
        assert_eq!(FilterSpec::default().describe(), "(no filter)");
        let spec = FilterSpec {
            category: Some("tv".into()),
            text: "abc".into(),
            ..spec_with_states(&["active"])
        };
        assert_eq!(spec.describe(), "state=active category=tv /abc");
    }
}
