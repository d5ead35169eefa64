//! Auto-start and stop-all control runs

use crate::control::guard::{SingleFlight, STOP_ALL, SYNC, SYNC_AUTOSTART};
use crate::models::{StackAction, StackDto, StackSettings};
use crate::settings::{sorted_by_priority, ReconcileReport, Reconciler};
use crate::sync::{index_by_name, StackInventory};
use crate::utils::errors::AppResult;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const CONTROL_GUARD_TTL: Duration = Duration::from_secs(60);
const SYNC_GUARD_TTL: Duration = Duration::from_secs(120);

/// What a control run did to each stack
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlReport {
    pub started: Vec<String>,
    pub restarted: Vec<String>,
    pub stopped: Vec<String>,
    pub protected: Vec<String>,
    pub unchanged: Vec<String>,
    /// Settings without a live stack on the endpoint
    pub missing: Vec<String>,
    pub failures: Vec<String>,
}

/// Decision for one auto-start stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoStartAction {
    /// Never instantiated: plain start
    Start,
    /// Every container stopped: stop then start
    Restart,
    None,
}

/// Pick the auto-start action for a live stack
pub fn autostart_action(stack: &StackDto) -> AutoStartAction {
    if stack.containers.is_empty() {
        AutoStartAction::Start
    } else if stack.any_running() {
        AutoStartAction::None
    } else {
        AutoStartAction::Restart
    }
}

pub struct AutoStartController {
    inventory: Arc<StackInventory>,
    reconciler: Reconciler,
    flights: SingleFlight,
}

impl AutoStartController {
    pub fn new(inventory: Arc<StackInventory>, reconciler: Reconciler, flights: SingleFlight) -> Self {
        Self {
            inventory,
            reconciler,
            flights,
        }
    }

    /// Reconcile settings with the live stacks of `endpoint_ids`
    pub async fn trigger_sync(&self, endpoint_ids: &[i64]) -> AppResult<ReconcileReport> {
        let _guard = self.flights.acquire(SYNC, SYNC_GUARD_TTL)?;
        let live = self.inventory.live_stacks_of(endpoint_ids).await?;
        self.reconciler.reconcile(&live).await
    }

    /// Bring auto-start stacks back up, in ascending priority order
    pub async fn sync_autostart_state(&self, endpoint_id: i64) -> AppResult<ControlReport> {
        let _guard = self.flights.acquire(SYNC_AUTOSTART, CONTROL_GUARD_TTL)?;
        let (live, settings) = self.prepare(endpoint_id).await?;
        let live = index_by_name(&live);
        let mut report = ControlReport::default();

        for setting in sorted_by_priority(settings).into_iter().filter(|s| s.auto_start) {
            let name = setting.stack_name;
            let Some(stack) = live.get(name.as_str()) else {
                info!("Auto-start: {} has no live stack, no action", name);
                report.missing.push(name);
                continue;
            };
            if self.inventory.is_protected(stack) {
                info!("Auto-start: not modifying protected stack {}", name);
                report.protected.push(name);
                continue;
            }

            match autostart_action(stack) {
                AutoStartAction::None => report.unchanged.push(name),
                AutoStartAction::Start => {
                    if self.issue(endpoint_id, stack, StackAction::Start).await {
                        info!("Auto-start: started {}", name);
                        report.started.push(name);
                    } else {
                        report.failures.push(name);
                    }
                }
                AutoStartAction::Restart => {
                    let stopped = self.issue(endpoint_id, stack, StackAction::Stop).await;
                    let started = self.issue(endpoint_id, stack, StackAction::Start).await;
                    if stopped && started {
                        info!("Auto-start: restored {}", name);
                        report.restarted.push(name);
                    } else {
                        report.failures.push(name);
                    }
                }
            }
        }

        info!(
            "Auto-start sync on endpoint {}: {} started, {} restored, {} failures",
            endpoint_id,
            report.started.len(),
            report.restarted.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Stop every stack in descending priority order
    pub async fn stop_all_stacks(&self, endpoint_id: i64) -> AppResult<ControlReport> {
        let _guard = self.flights.acquire(STOP_ALL, CONTROL_GUARD_TTL)?;
        let (live, settings) = self.prepare(endpoint_id).await?;
        let live = index_by_name(&live);
        let mut report = ControlReport::default();

        for setting in sorted_by_priority(settings).into_iter().rev() {
            let name = setting.stack_name;
            let Some(stack) = live.get(name.as_str()) else {
                report.missing.push(name);
                continue;
            };
            if self.inventory.is_protected(stack) {
                info!("Stop-all: not modifying protected stack {}", name);
                report.protected.push(name);
                continue;
            }

            if self.issue(endpoint_id, stack, StackAction::Stop).await {
                info!("Stop-all: stopped {}", name);
                report.stopped.push(name);
            } else {
                report.failures.push(name);
            }
        }

        info!(
            "Stop-all on endpoint {}: {} stopped, {} failures",
            endpoint_id,
            report.stopped.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Live stacks plus reconciled settings; either fetch failing aborts the run
    async fn prepare(&self, endpoint_id: i64) -> AppResult<(Vec<StackDto>, Vec<StackSettings>)> {
        let live = self.inventory.live_stacks(endpoint_id).await?;
        if let Err(e) = self.reconciler.reconcile(&live).await {
            warn!("Reconciliation before control run failed: {}", e);
        }
        let settings = self.reconciler.store().get_all().await?;
        Ok((live, settings))
    }

    /// Issue one stack action; "already in that state" counts as success
    async fn issue(&self, endpoint_id: i64, stack: &StackDto, action: StackAction) -> bool {
        match self
            .inventory
            .upstream()
            .start_or_stop_stack(endpoint_id, stack.id, action)
            .await
        {
            Ok(_) => true,
            Err(e) if e.is_conflict() => {
                info!("Stack {} already in {} state", stack.name, action);
                true
            }
            Err(e) => {
                error!("Failed to {} stack {}: {}", action, stack.name, e);
                false
            }
        }
    }
}
