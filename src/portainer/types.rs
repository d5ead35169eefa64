//! Portainer wire types
//!
//! Responses are decoded into typed structs at the boundary; a missing or
//! mistyped field becomes an `UpstreamRejected` error instead of a panic.

use crate::models::{ContainerDto, ImageStatus};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::warn;

/// Portainer environment (managed Docker host)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PortainerEndpoint {
    pub id: i64,
    pub name: String,
}

/// Stack environment variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

/// Stack as returned by `/stacks` and `/stacks/{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PortainerStack {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub endpoint_id: i64,
    #[serde(default)]
    pub env: Option<Vec<EnvVar>>,
    #[serde(default)]
    pub webhook: Option<String>,
}

/// Body of `/stacks/{id}/file`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StackFileResponse {
    pub stack_file_content: String,
}

/// Body of the image status endpoints
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageStatusResponse {
    pub status: ImageStatus,
    #[serde(default)]
    pub message: Option<String>,
}

impl ImageStatusResponse {
    /// The reported status; an `error` status is logged with Portainer's message
    pub fn into_status(self, subject: &str) -> ImageStatus {
        if self.status == ImageStatus::Error {
            warn!(
                "Portainer reports an image status error for {}: {}",
                subject,
                self.message.as_deref().unwrap_or("no details")
            );
        }
        self.status
    }
}

/// Stack returned by start/stop/update calls
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StackRef {
    pub id: i64,
    pub name: String,
}

/// Container returned by a recreate call
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerRef {
    pub id: String,
}

/// Error payload returned by Portainer
#[derive(Debug, Default, Deserialize)]
pub struct PortainerErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub details: String,
}

/// Payload of `PUT /stacks/{id}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StackUpdateRequest {
    #[serde(rename = "id")]
    pub id: i64,
    pub env: Vec<EnvVar>,
    pub prune: bool,
    pub pull_image: bool,
    pub stack_file_content: String,
    pub webhook: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DockerPort {
    #[serde(default)]
    pub private_port: Option<u16>,
    #[serde(default)]
    pub public_port: Option<u16>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DockerNetworkSettings {
    #[serde(default)]
    pub networks: Option<HashMap<String, serde_json::Value>>,
}

/// Entry of the Docker `/containers/json` listing
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DockerContainer {
    pub id: String,
    #[serde(default)]
    pub names: Vec<String>,
    pub image: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub ports: Vec<DockerPort>,
    #[serde(default)]
    pub network_settings: Option<DockerNetworkSettings>,
    #[serde(default)]
    pub labels: Option<HashMap<String, serde_json::Value>>,
}

impl From<DockerContainer> for ContainerDto {
    fn from(container: DockerContainer) -> Self {
        // unique published ports, public -> private
        let published: BTreeMap<u16, u16> = container
            .ports
            .iter()
            .filter_map(|p| Some((p.public_port?, p.private_port?)))
            .collect();
        let ports = published
            .into_iter()
            .map(|(public, private)| format!("{}:{}", public, private))
            .collect();

        let networks: BTreeSet<String> = container
            .network_settings
            .and_then(|settings| settings.networks)
            .map(|networks| networks.into_keys().collect())
            .unwrap_or_default();

        let name = container
            .names
            .first()
            .map(|n| n.strip_prefix('/').unwrap_or(n).to_string())
            .unwrap_or_default();

        ContainerDto {
            id: container.id,
            name,
            image: container.image,
            up_to_date: ImageStatus::NotRequested,
            status: container.state,
            networks: networks.into_iter().collect(),
            ports,
            labels: container.labels.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_docker_container_conversion() {
        let raw = serde_json::json!({
            "Id": "abc123",
            "Names": ["/media-jellyfin-1"],
            "Image": "jellyfin/jellyfin:latest",
            "State": "running",
            "Ports": [
                {"PrivatePort": 8096, "PublicPort": 8096, "Type": "tcp"},
                {"PrivatePort": 8096, "PublicPort": 8096, "Type": "tcp", "IP": "::"},
                {"PrivatePort": 1900, "Type": "udp"}
            ],
            "NetworkSettings": {"Networks": {"media_default": {}, "bridge": {}}},
            "Labels": {"com.docker.compose.project": "media"}
        });

        let container: DockerContainer = serde_json::from_value(raw).unwrap();
        let dto = ContainerDto::from(container);

        assert_eq!(dto.name, "media-jellyfin-1");
        assert_eq!(dto.ports, vec!["8096:8096"]);
        assert_eq!(dto.networks, vec!["bridge", "media_default"]);
        assert_eq!(dto.stack_name(), Some("media"));
        assert!(dto.is_running());
        assert_eq!(dto.up_to_date, ImageStatus::NotRequested);
    }

    #[test]
    fn test_container_with_null_labels() {
        let raw = serde_json::json!({
            "Id": "x",
            "Names": ["/x"],
            "Image": "busybox",
            "State": "exited",
            "Labels": null
        });
        let dto = ContainerDto::from(serde_json::from_value::<DockerContainer>(raw).unwrap());
        assert!(dto.labels.is_empty());
        assert_eq!(dto.stack_name(), None);
    }

    #[test]
    fn test_update_request_field_names() {
        let request = StackUpdateRequest {
            id: 7,
            env: vec![EnvVar {
                name: "TZ".to_string(),
                value: "UTC".to_string(),
            }],
            prune: true,
            pull_image: false,
            stack_file_content: "services:\n  app:\n    image: \"nginx\"\n".to_string(),
            webhook: String::new(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["Prune"], true);
        assert_eq!(value["PullImage"], false);
        assert_eq!(value["Env"][0]["name"], "TZ");
        assert!(value["StackFileContent"].as_str().unwrap().contains("\"nginx\""));
    }
}
