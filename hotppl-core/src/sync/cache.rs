//! Live state cache.
//!
//! Client-local copy of the server's last broadcast. Snapshots replace it
//! wholesale; sync events replace one slice at a time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys a leaderboard slice may be wrapped in.
const LEADERBOARD_KEYS: [&str; 1] = ["leaderboard"];
/// Keys a trending slice may be wrapped in.
const TRENDING_KEYS: [&str; 2] = ["trending_submissions", "trending"];

/// Last-known server state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LiveState {
    /// Ranked entries, best first
    pub leaderboard: Vec<Value>,
    /// Named counters (`active_users`, `total_votes`, ...)
    pub live_stats: Map<String, Value>,
    /// Trending submissions, in server order
    pub trending: Vec<Value>,
    /// Per-user stats carried in snapshots
    pub user_stats: Map<String, Value>,
    /// Submission id to latest vote count
    pub vote_counts: BTreeMap<String, i64>,
    /// Number of `submission_created` events seen since the last snapshot
    pub submissions_seen: u64,
    /// Payload of the most recent `submission_created` event
    pub latest_submission: Option<Value>,
}

/// A leaderboard row as rendered by the site.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub scene_name: String,
    #[serde(default)]
    pub vote_count: i64,
}

/// A trending row as rendered by the site.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendingEntry {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub votes: i64,
}

impl LiveState {
    /// Builds a fresh cache from a `connection_established` payload.
    ///
    /// Slices missing from the payload start out empty.
    pub fn from_snapshot(data: &Value) -> Self {
        Self {
            leaderboard: extract_list(data, &LEADERBOARD_KEYS).unwrap_or_default(),
            live_stats: extract_object(data, "live_stats").unwrap_or_default(),
            trending: extract_list(data, &TRENDING_KEYS).unwrap_or_default(),
            user_stats: extract_object(data, "user_stats").unwrap_or_default(),
            ..Self::default()
        }
    }

    /// Replaces the leaderboard from a `leaderboard_updated` payload.
    ///
    /// Returns the new slice, or `None` if the payload has the wrong shape.
    pub(crate) fn apply_leaderboard(&mut self, data: &Value) -> Option<Value> {
        let entries = list_slice(data, &LEADERBOARD_KEYS)?;
        self.leaderboard = entries;
        Some(Value::Array(self.leaderboard.clone()))
    }

    pub(crate) fn apply_trending(&mut self, data: &Value) -> Option<Value> {
        let entries = list_slice(data, &TRENDING_KEYS)?;
        self.trending = entries;
        Some(Value::Array(self.trending.clone()))
    }

    pub(crate) fn apply_live_stats(&mut self, data: &Value) -> Option<Value> {
        let stats = data.as_object()?;
        self.live_stats = stats.clone();
        Some(Value::Object(self.live_stats.clone()))
    }

    /// Records a vote count change. Needs `submission_id` and
    /// `new_vote_count` in the payload.
    pub(crate) fn apply_vote(&mut self, data: &Value) -> Option<Value> {
        let submission_id = match data.get("submission_id")? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let count = data.get("new_vote_count")?.as_i64()?;
        self.vote_counts.insert(submission_id, count);
        Some(data.clone())
    }

    pub(crate) fn apply_submission(&mut self, data: &Value) -> Option<Value> {
        if !data.is_object() {
            return None;
        }
        self.submissions_seen += 1;
        self.latest_submission = Some(data.clone());
        Some(data.clone())
    }

    /// Leaderboard rows that deserialize as [`LeaderboardEntry`]; others are skipped.
    pub fn leaderboard_entries(&self) -> Vec<LeaderboardEntry> {
        typed_entries(&self.leaderboard)
    }

    pub fn trending_entries(&self) -> Vec<TrendingEntry> {
        typed_entries(&self.trending)
    }

    /// Integer value of a live stat, if present.
    pub fn stat(&self, name: &str) -> Option<i64> {
        self.live_stats.get(name).and_then(Value::as_i64)
    }

    pub fn vote_count(&self, submission_id: &str) -> Option<i64> {
        self.vote_counts.get(submission_id).copied()
    }
}

/// A list slice from an event payload: a bare array, or an array under one
/// of `keys`.
fn list_slice(data: &Value, keys: &[&str]) -> Option<Vec<Value>> {
    match data {
        Value::Array(items) => Some(items.clone()),
        _ => extract_list(data, keys),
    }
}

fn extract_list(data: &Value, keys: &[&str]) -> Option<Vec<Value>> {
    keys.iter()
        .find_map(|key| data.get(*key).and_then(Value::as_array))
        .cloned()
}

fn extract_object(data: &Value, key: &str) -> Option<Map<String, Value>> {
    data.get(key).and_then(Value::as_object).cloned()
}

fn typed_entries<T: for<'de> Deserialize<'de>>(items: &[Value]) -> Vec<T> {
    items
        .iter()
        .filter_map(|item| serde_json::from_value(item.clone()).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_snapshot_preserves_order() {
        let state = LiveState::from_snapshot(&json!({
            "leaderboard": [{"username": "a"}, {"username": "b"}, {"username": "c"}],
            "live_stats": {"active_users": 12}
        }));

        assert_eq!(
            state.leaderboard,
            vec![json!({"username": "a"}), json!({"username": "b"}), json!({"username": "c"})]
        );
        assert_eq!(state.stat("active_users"), Some(12));
        assert!(state.trending.is_empty());
    }

    #[test]
    fn test_from_snapshot_replaces_everything() {
        let mut state = LiveState::default();
        state.apply_vote(&json!({"submission_id": "s1", "new_vote_count": 4}));
        state.apply_submission(&json!({"creator": "x", "scene": "y"}));

        let state = LiveState::from_snapshot(&json!({"leaderboard": []}));
        assert!(state.vote_counts.is_empty());
        assert_eq!(state.submissions_seen, 0);
    }

    #[test]
    fn test_apply_leaderboard_shapes() {
        let mut state = LiveState::default();

        let slice = state
            .apply_leaderboard(&json!({"leaderboard": [{"username": "a"}]}))
            .unwrap();
        assert_eq!(slice, json!([{"username": "a"}]));

        let slice = state.apply_leaderboard(&json!([{"username": "b"}])).unwrap();
        assert_eq!(slice, json!([{"username": "b"}]));
        assert_eq!(state.leaderboard, vec![json!({"username": "b"})]);

        assert!(state.apply_leaderboard(&json!({"rows": []})).is_none());
        assert_eq!(state.leaderboard, vec![json!({"username": "b"})]);
    }

    #[test]
    fn test_apply_trending_shapes() {
        let mut state = LiveState::default();
        state
            .apply_trending(&json!({"trending_submissions": [{"title": "t1"}]}))
            .unwrap();
        assert_eq!(state.trending, vec![json!({"title": "t1"})]);

        state.apply_trending(&json!({"trending": []})).unwrap();
        assert!(state.trending.is_empty());
    }

    #[test]
    fn test_apply_live_stats_requires_object() {
        let mut state = LiveState::default();
        assert!(state.apply_live_stats(&json!([1, 2])).is_none());
        state
            .apply_live_stats(&json!({"total_votes": 9}))
            .unwrap();
        assert_eq!(state.stat("total_votes"), Some(9));
    }

    #[test]
    fn test_apply_vote() {
        let mut state = LiveState::default();
        state
            .apply_vote(&json!({"submission_id": 17, "new_vote_count": 5}))
            .unwrap();
        assert_eq!(state.vote_count("17"), Some(5));

        assert!(state.apply_vote(&json!({"submission_id": "x"})).is_none());
        assert_eq!(state.vote_count("x"), None);
    }

    #[test]
    fn test_typed_entries_skip_malformed_rows() {
        let state = LiveState::from_snapshot(&json!({
            "leaderboard": [
                {"username": "ana", "scene_name": "rooftop", "vote_count": 31},
                "garbage",
                {"username": "bo", "vote_count": "many"}
            ]
        }));

        assert_eq!(
            state.leaderboard_entries(),
            vec![LeaderboardEntry {
                username: "ana".to_string(),
                scene_name: "rooftop".to_string(),
                vote_count: 31,
            }]
        );
    }
}
