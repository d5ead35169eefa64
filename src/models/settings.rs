//! Persisted per-stack operator preferences

use serde::{Deserialize, Serialize};

/// Priority of a freshly inserted row that has not been renumbered yet
pub const UNASSIGNED_PRIORITY: i64 = -1;

/// Per-stack settings, keyed by stack name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackSettings {
    pub stack_name: String,
    #[serde(default)]
    pub stack_id: i64,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub auto_start: bool,
}

impl StackSettings {
    pub fn new(stack_name: impl Into<String>, stack_id: i64, priority: i64, auto_start: bool) -> Self {
        Self {
            stack_name: stack_name.into(),
            stack_id,
            priority,
            auto_start,
        }
    }

    pub fn is_unassigned(&self) -> bool {
        self.priority == UNASSIGNED_PRIORITY
    }
}

/// Image excluded from update checks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoredImage {
    pub name: String,
}
