//! Stack settings: persistence and reconciliation with live stacks

pub mod reconcile;
pub mod store;

pub use reconcile::{plan, renumber, reorder, sorted_by_priority, ReconcilePlan, ReconcileReport, Reconciler};
pub use store::{LocalSettingsStore, SettingsStore};
