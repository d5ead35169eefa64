//! Reconciliation of persisted stack settings with the live stack set
//!
//! A pass runs strictly in order: insert settings for newly observed stacks,
//! refresh stale stack ids, prune orphans, then renumber priorities so new
//! stacks occupy the front of the order. Every step is safe to re-run: a pass
//! interrupted half-way converges on the next one.

use crate::models::{StackDto, StackSettings, UNASSIGNED_PRIORITY};
use crate::settings::store::SettingsStore;
use crate::utils::errors::{AppError, AppResult};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Changes required to bring the persisted settings in line with the live stacks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// New rows in alphabetical order, all with the unassigned priority
    pub to_add: Vec<StackSettings>,
    /// Existing rows whose stack id changed upstream
    pub to_refresh: Vec<StackSettings>,
    /// Names of orphaned rows
    pub to_remove: Vec<String>,
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub refreshed: Vec<String>,
    pub renumbered: usize,
    pub failures: usize,
}

impl ReconcileReport {
    pub fn changed(&self) -> bool {
        !self.added.is_empty()
            || !self.removed.is_empty()
            || !self.refreshed.is_empty()
            || self.renumbered > 0
    }
}

/// Compute the add, refresh and remove sets.
///
/// A new stack defaults to auto-start when it already has containers.
pub fn plan(live: &[StackDto], persisted: &[StackSettings]) -> ReconcilePlan {
    let known: HashMap<&str, &StackSettings> = persisted
        .iter()
        .map(|row| (row.stack_name.as_str(), row))
        .collect();

    let mut seen = HashSet::new();
    let mut plan = ReconcilePlan::default();

    for stack in live {
        // the same stack may be reported by several endpoints
        if !seen.insert(stack.name.as_str()) {
            continue;
        }
        match known.get(stack.name.as_str()) {
            None => plan.to_add.push(StackSettings::new(
                stack.name.clone(),
                stack.id,
                UNASSIGNED_PRIORITY,
                !stack.containers.is_empty(),
            )),
            Some(row) if row.stack_id != stack.id => {
                let mut row = (*row).clone();
                row.stack_id = stack.id;
                plan.to_refresh.push(row);
            }
            Some(_) => {}
        }
    }

    plan.to_add.sort_by(|a, b| a.stack_name.cmp(&b.stack_name));

    plan.to_remove = persisted
        .iter()
        .filter(|row| !seen.contains(row.stack_name.as_str()))
        .map(|row| row.stack_name.clone())
        .collect();

    plan
}

/// Assign priorities to unassigned rows.
///
/// Unassigned rows take `0..k` in alphabetical order; every other row moves
/// back by `k`. Returns only the rows whose priority changed.
pub fn renumber(rows: &[StackSettings]) -> Vec<StackSettings> {
    let mut fresh: Vec<&StackSettings> = rows.iter().filter(|r| r.is_unassigned()).collect();
    if fresh.is_empty() {
        return Vec::new();
    }
    fresh.sort_by(|a, b| a.stack_name.cmp(&b.stack_name));
    let shift = fresh.len() as i64;

    let mut changed: Vec<StackSettings> = fresh
        .into_iter()
        .zip(0..)
        .map(|(row, priority)| StackSettings {
            priority,
            ..row.clone()
        })
        .collect();

    changed.extend(rows.iter().filter(|r| !r.is_unassigned()).map(|row| StackSettings {
        priority: row.priority + shift,
        ..row.clone()
    }));

    changed
}

/// Move `name` to `target` in the priority order and renumber every row densely from 0.
///
/// Returns the complete reordered list.
pub fn reorder(rows: &[StackSettings], name: &str, target: i64) -> AppResult<Vec<StackSettings>> {
    let mut ordered = sorted_by_priority(rows.to_vec());
    let index = ordered
        .iter()
        .position(|row| row.stack_name == name)
        .ok_or_else(|| AppError::SettingsNotFound(name.to_string()))?;

    let moved = ordered.remove(index);
    let target = target.clamp(0, ordered.len() as i64) as usize;
    ordered.insert(target, moved);

    for (priority, row) in ordered.iter_mut().enumerate() {
        row.priority = priority as i64;
    }
    Ok(ordered)
}

/// Ascending priority; ties broken by name so the order is stable
pub fn sorted_by_priority(mut rows: Vec<StackSettings>) -> Vec<StackSettings> {
    rows.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.stack_name.cmp(&b.stack_name))
    });
    rows
}

/// Applies reconciliation passes against a settings store
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn SettingsStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn SettingsStore> {
        &self.store
    }

    /// Run one pass. Failing to read settings aborts; per-row write failures are logged and counted.
    pub async fn reconcile(&self, live: &[StackDto]) -> AppResult<ReconcileReport> {
        let persisted = self.store.get_all().await?;
        let plan = plan(live, &persisted);
        let mut report = ReconcileReport::default();

        for row in plan.to_add {
            info!("Adding settings for new stack {}", row.stack_name);
            let name = row.stack_name.clone();
            match self.store.create(row).await {
                Ok(()) => report.added.push(name),
                Err(AppError::SettingsConflict(msg)) => {
                    // a concurrent pass inserted it first
                    warn!("Settings for stack {} already exist: {}", name, msg);
                }
                Err(e) => {
                    error!("Failed to add settings for stack {}: {}", name, e);
                    report.failures += 1;
                }
            }
        }

        for row in plan.to_refresh {
            let name = row.stack_name.clone();
            debug!("Refreshing stack id of {} to {}", name, row.stack_id);
            match self.store.replace(&name, row).await {
                Ok(()) => report.refreshed.push(name),
                Err(e) => {
                    warn!("Failed to refresh stack id of {}: {}", name, e);
                    report.failures += 1;
                }
            }
        }

        for name in plan.to_remove {
            info!("Removing orphaned stack settings {}", name);
            match self.store.delete(&name).await {
                Ok(()) => report.removed.push(name),
                // already gone, e.g. a concurrent pass pruned it
                Err(AppError::SettingsNotFound(_)) => {}
                Err(e) => {
                    error!("Failed to delete orphaned stack {}: {}", name, e);
                    report.failures += 1;
                }
            }
        }

        let persisted = self.store.get_all().await?;
        let renumbered = renumber(&persisted);
        if !renumbered.is_empty() {
            let count = renumbered.len();
            match self.store.replace_many(renumbered).await {
                Ok(()) => report.renumbered = count,
                Err(e) => {
                    error!("Failed to renumber stack priorities: {}", e);
                    report.failures += 1;
                }
            }
        }

        if report.changed() {
            info!(
                "Reconciled settings: {} added, {} removed, {} refreshed, {} renumbered",
                report.added.len(),
                report.removed.len(),
                report.refreshed.len(),
                report.renumbered
            );
        }
        Ok(report)
    }

    /// Move one stack to a new priority and persist the dense order in one batch
    pub async fn move_stack(&self, name: &str, target: i64) -> AppResult<Vec<StackSettings>> {
        let rows = self.store.get_all().await?;
        let ordered = reorder(&rows, name, target)?;
        self.store.replace_many(ordered.clone()).await?;
        info!("Moved stack {} to priority {}", name, target);
        Ok(ordered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::store::LocalSettingsStore;
    use crate::testing::container;
    use std::time::Duration;

    fn live(names: &[&str]) -> Vec<StackDto> {
        names
            .iter()
            .zip(1..)
            .map(|(name, id)| StackDto::new(id, *name))
            .collect()
    }

    fn reconciler() -> Reconciler {
        Reconciler::new(Arc::new(LocalSettingsStore::in_memory(Duration::from_secs(1))))
    }

    async fn priorities(reconciler: &Reconciler) -> HashMap<String, i64> {
        reconciler
            .store()
            .get_all()
            .await
            .unwrap()
            .into_iter()
            .map(|row| (row.stack_name, row.priority))
            .collect()
    }

    #[tokio::test]
    async fn test_alphabetical_tie_break() {
        let reconciler = reconciler();
        reconciler.reconcile(&live(&["zeta", "alpha", "mike"])).await.unwrap();

        let prio = priorities(&reconciler).await;
        assert_eq!(prio["alpha"], 0);
        assert_eq!(prio["mike"], 1);
        assert_eq!(prio["zeta"], 2);
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let reconciler = reconciler();
        let stacks = live(&["b", "a", "c"]);
        let first = reconciler.reconcile(&stacks).await.unwrap();
        assert_eq!(first.added.len(), 3);
        let before = priorities(&reconciler).await;

        let second = reconciler.reconcile(&stacks).await.unwrap();
        assert!(!second.changed());
        assert_eq!(second, ReconcileReport::default());
        assert_eq!(priorities(&reconciler).await, before);
    }

    #[tokio::test]
    async fn test_orphans_are_pruned() {
        let reconciler = reconciler();
        reconciler
            .store()
            .create(StackSettings::new("gone", 4, 0, true))
            .await
            .unwrap();

        let report = reconciler.reconcile(&[]).await.unwrap();
        assert_eq!(report.removed, vec!["gone"]);
        assert!(reconciler.store().get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_new_stacks_take_the_front() {
        let reconciler = reconciler();
        reconciler
            .store()
            .create(StackSettings::new("old", 1, 0, false))
            .await
            .unwrap();

        reconciler.reconcile(&live(&["old", "new"])).await.unwrap();

        let prio = priorities(&reconciler).await;
        assert_eq!(prio["new"], 0);
        assert_eq!(prio["old"], 1);
    }

    #[tokio::test]
    async fn test_auto_start_default_and_stale_id() {
        let reconciler = reconciler();
        reconciler
            .store()
            .create(StackSettings::new("media", 3, 0, true))
            .await
            .unwrap();

        let mut stacks = vec![StackDto::new(8, "media"), StackDto::new(9, "empty"), StackDto::new(10, "full")];
        stacks[2].containers.push(container("c1", "nginx", "exited"));

        let report = reconciler.reconcile(&stacks).await.unwrap();
        assert_eq!(report.refreshed, vec!["media"]);

        let store = reconciler.store();
        let media = store.get_by_name("media").await.unwrap();
        assert_eq!(media.stack_id, 8);
        assert_eq!(media.priority, 2);
        assert!(!store.get_by_name("empty").await.unwrap().auto_start);
        assert!(store.get_by_name("full").await.unwrap().auto_start);
    }

    #[test]
    fn test_renumber_recovers_partial_pass() {
        // rows left unassigned by an interrupted pass are numbered on the next one
        let rows = vec![
            StackSettings::new("b", 1, UNASSIGNED_PRIORITY, true),
            StackSettings::new("x", 2, 0, true),
            StackSettings::new("a", 3, UNASSIGNED_PRIORITY, true),
        ];
        let changed: HashMap<String, i64> = renumber(&rows)
            .into_iter()
            .map(|r| (r.stack_name, r.priority))
            .collect();
        assert_eq!(changed["a"], 0);
        assert_eq!(changed["b"], 1);
        assert_eq!(changed["x"], 2);

        assert!(renumber(&[StackSettings::new("x", 2, 0, true)]).is_empty());
    }

    #[test]
    fn test_plan_ignores_duplicate_live_names() {
        let stacks = vec![StackDto::new(1, "web"), StackDto::new(2, "web")];
        let plan = plan(&stacks, &[]);
        assert_eq!(plan.to_add.len(), 1);
        assert!(plan.to_remove.is_empty());
    }

    #[test]
    fn test_reorder_moves_and_densifies() {
        let rows = vec![
            StackSettings::new("a", 1, 0, true),
            StackSettings::new("b", 2, 3, true),
            StackSettings::new("c", 3, 7, true),
        ];
        let ordered = reorder(&rows, "c", 0).unwrap();
        let names: Vec<_> = ordered.iter().map(|r| (r.stack_name.as_str(), r.priority)).collect();
        assert_eq!(names, vec![("c", 0), ("a", 1), ("b", 2)]);

        assert!(matches!(
            reorder(&rows, "missing", 0),
            Err(AppError::SettingsNotFound(_))
        ));
    }
}
