//! Control plane access
//!
//! `ControlPlane` is the seam every core component talks to; `PortainerClient`
//! is the HTTP implementation used in production.

pub mod client;
pub mod types;

pub use client::PortainerClient;
pub use types::{EnvVar, PortainerEndpoint, PortainerStack, StackUpdateRequest};

use crate::models::{ContainerAction, ContainerDto, ImageStatus, StackAction};
use crate::utils::errors::AppResult;
use async_trait::async_trait;

/// Operations consumed from the Portainer API
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn list_endpoints(&self) -> AppResult<Vec<PortainerEndpoint>>;

    async fn list_stacks(&self, endpoint_id: i64) -> AppResult<Vec<PortainerStack>>;

    /// Containers of an endpoint, optionally restricted to one stack
    async fn list_containers(&self, endpoint_id: i64, stack_name: Option<&str>) -> AppResult<Vec<ContainerDto>>;

    /// Aggregate verdict for every image of a stack
    async fn stack_image_status(&self, stack_id: i64) -> AppResult<ImageStatus>;

    async fn container_image_status(&self, endpoint_id: i64, container_id: &str) -> AppResult<ImageStatus>;

    /// Start or stop a stack and return its name.
    ///
    /// A stack already in the requested state yields `UpstreamRejected` with status 409.
    async fn start_or_stop_stack(&self, endpoint_id: i64, stack_id: i64, action: StackAction) -> AppResult<String>;

    async fn get_stack(&self, stack_id: i64) -> AppResult<PortainerStack>;

    async fn get_stack_file(&self, stack_id: i64) -> AppResult<String>;

    /// Redeploy a stack and return its (possibly new) id
    async fn update_stack(&self, endpoint_id: i64, stack_id: i64, payload: &StackUpdateRequest) -> AppResult<i64>;

    /// Recreate a container and return the new container id
    async fn recreate_container(&self, endpoint_id: i64, container_id: &str, pull_image: bool) -> AppResult<String>;

    async fn manage_container(&self, endpoint_id: i64, container_id: &str, action: ContainerAction) -> AppResult<()>;
}

/// Look an endpoint up by name; `None` when no endpoint carries that name
pub async fn endpoint_id(upstream: &dyn ControlPlane, name: &str) -> AppResult<Option<i64>> {
    let endpoints = upstream.list_endpoints().await?;
    Ok(endpoints.into_iter().find(|e| e.name == name).map(|e| e.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeControlPlane;

    #[tokio::test]
    async fn test_endpoint_lookup_by_name() {
        let fake = FakeControlPlane::new();
        fake.add_endpoint(1, "local");
        fake.add_endpoint(3, "nas");

        assert_eq!(endpoint_id(&fake, "nas").await.unwrap(), Some(3));
        assert_eq!(endpoint_id(&fake, "cloud").await.unwrap(), None);
    }
}
