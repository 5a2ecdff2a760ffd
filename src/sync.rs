//! Local mirror of the remote session, kept current by `sync/maindata` deltas.
//!
//! A delta is either a full snapshot (`full_update`) that replaces everything,
//! or an incremental patch set. Incremental torrent patches merge field by
//! field; unknown ids are created from the patch and removals of unknown ids
//! are ignored, so applying a delta never fails.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::model::{Category, ServerState, SyncDelta, Torrent};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Torrents created, modified or removed by the delta.
    pub changed: usize,
    /// False when the delta was stale and dropped.
    pub applied: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mirror {
    rid: i64,
    torrents: BTreeMap<String, Torrent>,
    categories: BTreeMap<String, Category>,
    tags: BTreeSet<String>,
    server: ServerState,
}

impl Mirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cursor to send with the next sync request.
    pub fn rid(&self) -> i64 {
        self.rid
    }

    /// Forces the next request to ask for a full snapshot.
    pub fn reset(&mut self) {
        self.rid = 0;
    }

    pub fn torrents(&self) -> impl Iterator<Item = &Torrent> {
        self.torrents.values()
    }

    pub fn torrent(&self, hash: &str) -> Option<&Torrent> {
        self.torrents.get(hash)
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.torrents.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.torrents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.torrents.is_empty()
    }

    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.values()
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    pub fn server(&self) -> &ServerState {
        &self.server
    }

    pub fn apply(&mut self, delta: SyncDelta) -> SyncOutcome {
        if delta.full_update {
            return self.replace(delta);
        }
        if delta.rid < self.rid {
            debug!("dropping stale delta rid={} (cursor {})", delta.rid, self.rid);
            return SyncOutcome::default();
        }
        self.rid = delta.rid;

        let mut touched = BTreeSet::new();
        for (hash, patch) in delta.torrents {
            match self.torrents.get_mut(&hash) {
                Some(existing) => {
                    if existing.merge(patch) {
                        touched.insert(hash);
                    }
                }
                None => {
                    let torrent = Torrent::from_patch(&hash, patch);
                    self.torrents.insert(hash.clone(), torrent);
                    touched.insert(hash);
                }
            }
        }
        for hash in delta.torrents_removed {
            if self.torrents.remove(&hash).is_some() {
                touched.insert(hash);
            }
        }

        for (name, patch) in delta.categories {
            let category = self
                .categories
                .entry(name.clone())
                .or_insert_with(|| Category {
                    name,
                    ..Category::default()
                });
            category.merge(patch);
        }
        for name in delta.categories_removed {
            self.categories.remove(&name);
        }

        self.tags.extend(delta.tags);
        for tag in delta.tags_removed {
            self.tags.remove(&tag);
        }

        if let Some(patch) = delta.server_state {
            self.server.merge(patch);
        }

        SyncOutcome {
            changed: touched.len(),
            applied: true,
        }
    }

    fn replace(&mut self, delta: SyncDelta) -> SyncOutcome {
        debug!(
            "full resync rid={} with {} torrents",
            delta.rid,
            delta.torrents.len()
        );
        let torrents: BTreeMap<String, Torrent> = delta
            .torrents
            .into_iter()
            .map(|(hash, patch)| {
                let torrent = Torrent::from_patch(&hash, patch);
                (hash, torrent)
            })
            .collect();
        let dropped = self
            .torrents
            .keys()
            .filter(|hash| !torrents.contains_key(*hash))
            .count();
        let changed = dropped
            + torrents
                .iter()
                .filter(|(hash, torrent)| self.torrents.get(*hash) != Some(torrent))
                .count();

        let categories = delta
            .categories
            .into_iter()
            .map(|(name, patch)| {
                let mut category = Category {
                    name: name.clone(),
                    ..Category::default()
                };
                category.merge(patch);
                (name, category)
            })
            .collect();

        let mut server = ServerState::default();
        if let Some(patch) = delta.server_state {
            server.merge(patch);
        }

        *self = Mirror {
            rid: delta.rid,
            torrents,
            categories,
            tags: delta.tags.into_iter().collect(),
            server,
        };
        SyncOutcome {
            changed,
            applied: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CategoryPatch, ServerStatePatch, TorrentPatch};

    fn patch(name: Option<&str>, state: Option<&str>) -> TorrentPatch {
        TorrentPatch {
            name: name.map(str::to_string),
            state: state.map(str::to_string),
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

    #[test]
    fn full_delta_replaces_everything() {
        let mut mirror = Mirror::new();
        mirror.apply(delta(
            1,
            true,
            vec![("a", patch(Some("A"), None)), ("b", patch(Some("B"), None))],
        ));
        let outcome = mirror.apply(delta(5, true, vec![("c", patch(Some("C"), None))]));
        assert!(outcome.applied);
        assert_eq!(outcome.changed, 3);
        let hashes: Vec<_> = mirror.torrents().map(|t| t.hash.as_str()).collect();
        assert_eq!(hashes, vec!["c"]);
        assert_eq!(mirror.rid(), 5);
    }

    #[test]
    fn full_delta_is_idempotent() {
        let full = SyncDelta {
            categories: [(
                "tv".to_string(),
                CategoryPatch {
                    save_path: Some("/tv".into()),
                    ..CategoryPatch::default()
                },
            )]
            .into_iter()
            .collect(),
            tags: vec!["x".into()],
            ..delta(
                3,
                true,
                vec![("a", patch(Some("A"), Some("uploading")))],
            )
        };
        let mut once = Mirror::new();
        once.apply(full.clone());
        let mut twice = Mirror::new();
        twice.apply(full.clone());
        let second = twice.apply(full);
        assert_eq!(once, twice);
        assert_eq!(second.changed, 0);
    }

    #[test]
    fn incremental_merge_keeps_absent_fields() {
        let mut mirror = Mirror::new();
        mirror.apply(delta(1, true, vec![("h1", patch(Some("A"), Some("downloading")))]));
        let outcome = mirror.apply(delta(2, false, vec![("h1", patch(None, Some("pausedDL")))]));
        assert_eq!(outcome.changed, 1);
        let torrent = mirror.torrent("h1").unwrap();
        assert_eq!(torrent.name, "A");
        assert_eq!(torrent.state, "pausedDL");
    }

    #[test]
    fn merge_into_unknown_id_creates_it() {
        let mut mirror = Mirror::new();
        mirror.apply(delta(1, false, vec![("new", patch(None, Some("metaDL")))]));
        let torrent = mirror.torrent("new").unwrap();
        assert_eq!(torrent.name, "");
        assert_eq!(torrent.size, 0);
        assert_eq!(torrent.state, "metaDL");
    }

    #[test]
    fn removal_of_unknown_id_is_a_no_op() {
        let mut mirror = Mirror::new();
        mirror.apply(delta(1, true, vec![("a", patch(Some("A"), None))]));
        let outcome = mirror.apply(SyncDelta {
            torrents_removed: vec!["ghost".into()],
            ..delta(2, false, vec![])
        });
        assert!(outcome.applied);
        assert_eq!(outcome.changed, 0);
        assert_eq!(mirror.len(), 1);
    }

    #[test]
    fn removal_wins_over_merge_in_the_same_delta() {
        let mut mirror = Mirror::new();
        mirror.apply(delta(1, true, vec![("a", patch(Some("A"), None))]));
        mirror.apply(SyncDelta {
            torrents_removed: vec!["a".into(), "b".into()],
            ..delta(
                2,
                false,
                vec![("a", patch(Some("A2"), None)), ("b", patch(Some("B"), None))],
            )
        });
        assert!(mirror.is_empty());
    }

    #[test]
    fn cursor_follows_the_last_delta_and_never_decreases() {
        let mut mirror = Mirror::new();
        for rid in [1, 2, 4, 9] {
            mirror.apply(delta(rid, rid == 1, vec![]));
            assert_eq!(mirror.rid(), rid);
        }
        let stale = mirror.apply(delta(3, false, vec![("late", patch(Some("L"), None))]));
        assert!(!stale.applied);
        assert_eq!(mirror.rid(), 9);
        assert!(!mirror.contains("late"));
    }

    #[test]
    fn reset_requests_a_full_resync() {
        let mut mirror = Mirror::new();
        mirror.apply(delta(12, true, vec![]));
        mirror.reset();
        assert_eq!(mirror.rid(), 0);
    }

    #[test]
    fn auxiliary_collections_follow_the_same_discipline() {
        let mut mirror = Mirror::new();
        mirror.apply(SyncDelta {
            categories: [
                ("tv".to_string(), CategoryPatch::default()),
                ("iso".to_string(), CategoryPatch::default()),
            ]
            .into_iter()
            .collect(),
            tags: vec!["a".into(), "b".into()],
            server_state: Some(ServerStatePatch {
                connection_status: Some("connected".into()),
                dht_nodes: Some(300),
                ..ServerStatePatch::default()
            }),
            ..delta(1, true, vec![])
        });
        mirror.apply(SyncDelta {
            categories: [(
                "tv".to_string(),
                CategoryPatch {
                    save_path: Some("/tv".into()),
                    ..CategoryPatch::default()
                },
            )]
            .into_iter()
            .collect(),
            categories_removed: vec!["iso".into(), "missing".into()],
            tags: vec!["c".into()],
            tags_removed: vec!["a".into()],
            server_state: Some(ServerStatePatch {
                dht_nodes: Some(310),
                ..ServerStatePatch::default()
            }),
            ..delta(2, false, vec![])
        });
        let categories: Vec<_> = mirror
            .categories()
            .map(|c| (c.name.as_str(), c.save_path.as_str()))
            .collect();
        assert_eq!(categories, vec![("tv", "/tv")]);
        assert_eq!(mirror.tags().collect::<Vec<_>>(), vec!["b", "c"]);
        assert_eq!(mirror.server().connection_status, "connected");
        assert_eq!(mirror.server().dht_nodes, 310);
    }
}
