//! Live stack and container representation

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Compose label that ties a container to its stack
pub const STACK_LABEL: &str = "com.docker.compose.project";

/// Docker state string of a running container
pub const CONTAINER_RUNNING: &str = "running";

/// Whether a container's image is up to date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImageStatus {
    #[default]
    NotRequested,
    Outdated,
    Updated,
    Preparing,
    Skipped,
    Error,
}

impl ImageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageStatus::NotRequested => "not_requested",
            ImageStatus::Outdated => "outdated",
            ImageStatus::Updated => "updated",
            ImageStatus::Preparing => "preparing",
            ImageStatus::Skipped => "skipped",
            ImageStatus::Error => "error",
        }
    }

    /// Statuses that may be kept as last-known-good data
    pub fn is_known_good(&self) -> bool {
        !matches!(self, ImageStatus::Error | ImageStatus::NotRequested)
    }
}

impl fmt::Display for ImageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A container as exposed to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDto {
    pub id: String,
    pub name: String,
    pub image: String,
    pub up_to_date: ImageStatus,
    pub status: String,
    pub networks: Vec<String>,
    pub ports: Vec<String>,
    pub labels: HashMap<String, serde_json::Value>,
}

impl ContainerDto {
    pub fn is_running(&self) -> bool {
        self.status == CONTAINER_RUNNING
    }

    /// Name of the stack this container belongs to, if labelled
    pub fn stack_name(&self) -> Option<&str> {
        self.labels.get(STACK_LABEL).and_then(|v| v.as_str())
    }
}

/// A live stack joined with its persisted settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackDto {
    pub id: i64,
    pub name: String,
    pub containers: Vec<ContainerDto>,
    pub priority: i64,
    pub auto_start: bool,
}

impl StackDto {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            containers: Vec::new(),
            priority: 0,
            auto_start: false,
        }
    }

    pub fn any_running(&self) -> bool {
        self.containers.iter().any(|c| c.is_running())
    }
}

/// Stack lifecycle action understood by the control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackAction {
    Start,
    Stop,
}

impl StackAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            StackAction::Start => "start",
            StackAction::Stop => "stop",
        }
    }
}

impl fmt::Display for StackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container lifecycle action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerAction {
    Start,
    Stop,
    Kill,
    Restart,
    Pause,
    Resume,
}

impl ContainerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerAction::Start => "start",
            ContainerAction::Stop => "stop",
            ContainerAction::Kill => "kill",
            ContainerAction::Restart => "restart",
            ContainerAction::Pause => "pause",
            ContainerAction::Resume => "resume",
        }
    }
}

impl FromStr for ContainerAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(ContainerAction::Start),
            "stop" => Ok(ContainerAction::Stop),
            "kill" => Ok(ContainerAction::Kill),
            "restart" => Ok(ContainerAction::Restart),
            "pause" => Ok(ContainerAction::Pause),
            "resume" => Ok(ContainerAction::Resume),
            other => Err(format!("unknown container action '{}'", other)),
        }
    }
}

impl fmt::Display for ContainerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
