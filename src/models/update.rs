//! In-flight stack update bookkeeping

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stack update lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateState {
    Queued,
    Done,
    Error,
}

impl UpdateState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateState::Queued => "queued",
            UpdateState::Done => "done",
            UpdateState::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, UpdateState::Queued)
    }
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one stack update operation, pushed to the status feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackUpdateStatus {
    pub endpoint_id: i64,
    pub stack_id: i64,
    pub stack_name: String,
    pub status: UpdateState,
    pub details: String,
    pub timestamp: i64,
}

impl StackUpdateStatus {
    /// Queue key of an update for one stack on one endpoint
    pub fn operation_id(endpoint_id: i64, stack_id: i64) -> String {
        format!("update-stack-{}-{}", endpoint_id, stack_id)
    }
}
