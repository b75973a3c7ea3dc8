//! Delta Engine
//!
//! The controller polls with a watermark (`deltasince`) and only wants the
//! nodes that changed or vanished since then. Snapshots of earlier polls are
//! kept in a small history stored as vApp metadata; this module computes
//! against it and never performs I/O.

use super::node::Node;
use crate::vcd::error::VcdResult;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// vApp metadata key holding the serialized history
pub const HISTORY_KEY: &str = "vtm_history";

/// Slack added to the caller's watermark when picking a baseline
pub const WATERMARK_GRACE_SECS: i64 = 10;

/// Snapshots keyed by epoch seconds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History(BTreeMap<i64, Vec<Node>>);

impl History {
    pub fn from_json(json: &str) -> VcdResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> VcdResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn timestamps(&self) -> Vec<i64> {
        self.0.keys().copied().collect()
    }

    pub fn snapshot(&self, timestamp: i64) -> Option<&[Node]> {
        self.0.get(&timestamp).map(Vec::as_slice)
    }

    /// Newest snapshot taken no later than `since` plus the grace period,
    /// falling back to the oldest one
    pub fn baseline(&self, since: i64) -> Option<&[Node]> {
        let cutoff = since.saturating_add(WATERMARK_GRACE_SECS);
        self.0
            .range(..=cutoff)
            .next_back()
            .or_else(|| self.0.iter().next())
            .map(|(_, nodes)| nodes.as_slice())
    }

    /// Keep only the newest snapshot, then add `nodes` under `now`
    pub fn record(&mut self, now: i64, nodes: Vec<Node>) {
        while self.0.len() >= 2 {
            self.0.pop_first();
        }
        self.0.insert(now, nodes);
    }
}

/// Nodes of `old` that changed or are gone from `current`.
///
/// Changed nodes carry their current value and gone nodes are marked
/// destroyed. Nodes only present in `current` are not reported.
pub fn compute_delta(old: &[Node], current: &[Node]) -> Vec<Node> {
    let live: HashMap<&str, &Node> = current.iter().map(|n| (n.name.as_str(), n)).collect();

    old.iter()
        .filter_map(|before| match live.get(before.name.as_str()) {
            Some(now) if *now != before => Some((*now).clone()),
            Some(_) => None,
            None => Some(before.clone().destroyed()),
        })
        .collect()
}

/// Run one delta step against the stored history.
///
/// Returns the nodes to report and the history to write back. Without any
/// stored history the whole snapshot is reported.
pub fn advance(
    stored: Option<History>,
    since: i64,
    now: i64,
    nodes: Vec<Node>,
) -> (Vec<Node>, History) {
    let Some(mut history) = stored.filter(|h| !h.is_empty()) else {
        let mut history = History::default();
        history.record(now, nodes.clone());
        return (nodes, history);
    };

    let delta = history
        .baseline(since)
        .map(|old| compute_delta(old, &nodes))
        .unwrap_or_default();

    history.record(now, nodes);
    (delta, history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::node::NodeState;

    fn node(name: &str, ip: &str) -> Node {
        Node {
            uniq_id: format!("urn:vcloud:vm:{name}"),
            name: name.to_string(),
            sizeid: "small".to_string(),
            public_ip: ip.to_string(),
            private_ip: ip.to_string(),
            status: NodeState::Active,
            complete: 100,
            created: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_vanished_node_is_reported_destroyed_and_new_node_is_not() {
        let mut history = History::default();
        history.record(100, vec![node("A", "10.0.0.1"), node("B", "10.0.0.2")]);

        let live = vec![node("A", "10.0.0.1"), node("C", "10.0.0.3")];
        let (delta, history) = advance(Some(history), 95, 200, live);

        assert_eq!(delta.len(), 1);
        assert_eq!(delta[0].name, "B");
        assert_eq!(delta[0].status, NodeState::Destroyed);
        assert_eq!(delta[0].complete, 100);
        assert_eq!(history.timestamps(), vec![100, 200]);
    }

    #[test]
    fn test_changed_node_reports_current_value() {
        let old = vec![node("A", "")];
        let live = vec![node("A", "10.0.0.1")];
        let delta = compute_delta(&old, &live);
        assert_eq!(delta, live);
        assert!(compute_delta(&live, &live).is_empty());
    }

    #[test]
    fn test_first_run_reports_everything() {
        let live = vec![node("A", "10.0.0.1")];
        let (delta, history) = advance(None, 0, 500, live.clone());
        assert_eq!(delta, live);
        assert_eq!(history.timestamps(), vec![500]);
    }

    #[test]
    fn test_retention_keeps_two_newest() {
        let mut history = History::default();
        for t in [100, 200, 300] {
            history.record(t, vec![node("A", "10.0.0.1")]);
            assert!(history.len() <= 2);
        }
        assert_eq!(history.timestamps(), vec![200, 300]);
    }

    #[test]
    fn test_baseline_selection() {
        let mut history = History::default();
        history.record(100, vec![node("A", "1")]);
        history.record(200, vec![node("B", "2")]);

        assert_eq!(history.baseline(195).unwrap()[0].name, "B");
        assert_eq!(history.baseline(150).unwrap()[0].name, "A");
        // nothing old enough: the oldest snapshot is used
        assert_eq!(history.baseline(10).unwrap()[0].name, "A");
    }

    #[test]
    fn test_json_keys_are_epoch_strings() {
        let mut history = History::default();
        history.record(1700000000, vec![node("A", "10.0.0.1")]);
        let json = history.to_json().unwrap();
        assert!(json.starts_with("{\"1700000000\":["));
        assert_eq!(History::from_json(&json).unwrap(), history);
    }
}
