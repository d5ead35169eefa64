//! Portainer HTTP client

use crate::models::{ContainerAction, ContainerDto, ImageStatus, StackAction, STACK_LABEL};
use crate::portainer::types::{
    ContainerRef, DockerContainer, ImageStatusResponse, PortainerEndpoint, PortainerErrorBody,
    PortainerStack, StackFileResponse, StackRef, StackUpdateRequest,
};
use crate::portainer::ControlPlane;
use crate::utils::errors::{AppError, AppResult};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error, info};

const API_KEY_HEADER: &str = "X-API-Key";

/// Portainer client
pub struct PortainerClient {
    base_url: String,
    api_key: String,
    client: Client,
}

impl PortainerClient {
    /// Create a new Portainer client; every request is bounded by `timeout`
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to create Portainer HTTP client: {}", e)))?;

        Ok(PortainerClient {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and decode a JSON body, mapping error payloads to `UpstreamRejected`
    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> AppResult<T> {
        let response = request.header(API_KEY_HEADER, &self.api_key).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(rejection(status, &body));
        }

        serde_json::from_slice(&body).map_err(|e| {
            error!("Malformed {} response from Portainer: {}", what, e);
            AppError::rejected(status.as_u16(), format!("malformed {} response: {}", what, e))
        })
    }
}

/// Turn a non-success response into a structured rejection
fn rejection(status: StatusCode, body: &[u8]) -> AppError {
    let message = match serde_json::from_slice::<PortainerErrorBody>(body) {
        Ok(payload) if !payload.message.is_empty() => {
            if payload.details.is_empty() {
                payload.message
            } else {
                format!("{}: {}", payload.message, payload.details)
            }
        }
        _ => {
            let text = String::from_utf8_lossy(body);
            let text = text.trim();
            if text.is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                text.chars().take(512).collect()
            }
        }
    };
    AppError::rejected(status.as_u16(), message)
}

#[async_trait]
impl ControlPlane for PortainerClient {
    async fn list_endpoints(&self) -> AppResult<Vec<PortainerEndpoint>> {
        let request = self.client.get(self.url("/endpoints"));
        self.send_json(request, "endpoints").await
    }

    async fn list_stacks(&self, endpoint_id: i64) -> AppResult<Vec<PortainerStack>> {
        let filters = json!({ "EndpointId": endpoint_id }).to_string();
        let request = self
            .client
            .get(self.url("/stacks"))
            .query(&[("filters", filters)]);

        let stacks: Vec<PortainerStack> = self.send_json(request, "stacks").await?;
        debug!("Fetched {} stacks for endpoint {}", stacks.len(), endpoint_id);
        Ok(stacks)
    }

    async fn list_containers(&self, endpoint_id: i64, stack_name: Option<&str>) -> AppResult<Vec<ContainerDto>> {
        let mut query = vec![("all", "true".to_string())];
        if let Some(stack_name) = stack_name {
            let label = format!("{}={}", STACK_LABEL, stack_name);
            query.push(("filters", json!({ "label": [label] }).to_string()));
        }

        let request = self
            .client
            .get(self.url(&format!("/endpoints/{}/docker/containers/json", endpoint_id)))
            .query(&query);

        let containers: Vec<DockerContainer> = self.send_json(request, "containers").await?;
        Ok(containers.into_iter().map(ContainerDto::from).collect())
    }

    async fn stack_image_status(&self, stack_id: i64) -> AppResult<ImageStatus> {
        debug!("Fetching images status for stack {}", stack_id);
        let request = self
            .client
            .get(self.url(&format!("/stacks/{}/images_status", stack_id)));
        let response: ImageStatusResponse = self.send_json(request, "stack images status").await?;
        Ok(response.into_status(&format!("stack {}", stack_id)))
    }

    async fn container_image_status(&self, endpoint_id: i64, container_id: &str) -> AppResult<ImageStatus> {
        debug!(
            "Fetching image status for container {} in endpoint {}",
            container_id, endpoint_id
        );
        let request = self.client.get(self.url(&format!(
            "/docker/{}/containers/{}/image_status",
            endpoint_id, container_id
        )));
        let response: ImageStatusResponse = self.send_json(request, "container image status").await?;
        Ok(response.into_status(&format!("container {}", container_id)))
    }

    async fn start_or_stop_stack(&self, endpoint_id: i64, stack_id: i64, action: StackAction) -> AppResult<String> {
        let request = self
            .client
            .post(self.url(&format!("/stacks/{}/{}", stack_id, action)))
            .query(&[("endpointId", endpoint_id)])
            .json(&json!({ "endpointId": endpoint_id, "id": stack_id.to_string() }));

        let stack: StackRef = self.send_json(request, "stack").await?;
        info!("Stack {} ({}) {} requested", stack.name, stack_id, action);
        Ok(stack.name)
    }

    async fn get_stack(&self, stack_id: i64) -> AppResult<PortainerStack> {
        let request = self.client.get(self.url(&format!("/stacks/{}", stack_id)));
        self.send_json(request, "stack").await
    }

    async fn get_stack_file(&self, stack_id: i64) -> AppResult<String> {
        let request = self.client.get(self.url(&format!("/stacks/{}/file", stack_id)));
        let file: StackFileResponse = self.send_json(request, "stack file").await?;
        Ok(file.stack_file_content)
    }

    async fn update_stack(&self, endpoint_id: i64, stack_id: i64, payload: &StackUpdateRequest) -> AppResult<i64> {
        let request = self
            .client
            .put(self.url(&format!("/stacks/{}", stack_id)))
            .query(&[("endpointId", endpoint_id)])
            .json(payload);

        let stack: StackRef = self.send_json(request, "stack").await?;
        info!("Stack {} updated", stack.name);
        Ok(stack.id)
    }

    async fn recreate_container(&self, endpoint_id: i64, container_id: &str, pull_image: bool) -> AppResult<String> {
        let request = self
            .client
            .post(self.url(&format!(
                "/docker/{}/containers/{}/recreate",
                endpoint_id, container_id
            )))
            .json(&json!({ "PullImage": pull_image }));

        let container: ContainerRef = self.send_json(request, "container").await?;
        Ok(container.id)
    }

    async fn manage_container(&self, endpoint_id: i64, container_id: &str, action: ContainerAction) -> AppResult<()> {
        // Docker names the resume operation "unpause"
        let verb = match action {
            ContainerAction::Resume => "unpause",
            other => other.as_str(),
        };

        let response = self
            .client
            .post(self.url(&format!(
                "/endpoints/{}/docker/containers/{}/{}",
                endpoint_id, container_id, verb
            )))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&json!({}))
            .send()
            .await?;

        if response.status() != StatusCode::NO_CONTENT {
            let status = response.status();
            let body = response.bytes().await?;
            return Err(rejection(status, &body));
        }
        Ok(())
    }
}
