//! Stack update status feed

use crate::models::StackUpdateStatus;
use std::collections::BTreeMap;
use std::time::Duration;

/// Interval between two pushes on the feed
pub const FEED_TICK: Duration = Duration::from_secs(1);

/// Update statuses grouped by state, then by stack name
pub type FeedSnapshot = BTreeMap<String, BTreeMap<String, StackUpdateStatus>>;

/// Group queue entries as `{ status: { stackName: entry } }`.
///
/// When a stack appears twice under one status (same name on two endpoints)
/// the most recent entry wins.
pub fn group_by_status(entries: Vec<StackUpdateStatus>) -> FeedSnapshot {
    let mut snapshot = FeedSnapshot::new();
    for entry in entries {
        let group = snapshot.entry(entry.status.as_str().to_string()).or_default();
        match group.get(&entry.stack_name) {
            Some(existing) if existing.timestamp > entry.timestamp => {}
            _ => {
                group.insert(entry.stack_name.clone(), entry);
            }
        }
    }
    snapshot
}
