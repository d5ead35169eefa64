//! Stack update queue
//!
//! At most one queued update exists per (endpoint, stack). Entries stay visible
//! for 30 minutes while queued and for 7 days once done or failed.

use crate::cache::{StatusCache, TtlCache};
use crate::models::{StackUpdateStatus, UpdateState};
use crate::portainer::{ControlPlane, StackUpdateRequest};
use crate::utils::errors::{AppError, AppResult};
use crate::utils::time::current_timestamp_secs;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

pub const QUEUED_TTL: Duration = Duration::from_secs(30 * 60);
pub const TERMINAL_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Clone)]
pub struct StackUpdater {
    upstream: Arc<dyn ControlPlane>,
    cache: Arc<StatusCache>,
    queue: Arc<TtlCache<String, StackUpdateStatus>>,
}

impl StackUpdater {
    pub fn new(upstream: Arc<dyn ControlPlane>, cache: Arc<StatusCache>) -> Self {
        Self {
            upstream,
            cache,
            queue: Arc::new(TtlCache::new(Some(QUEUED_TTL))),
        }
    }

    fn in_flight(&self, operation_id: &str) -> bool {
        self.queue
            .get(&operation_id.to_string())
            .map_or(false, |entry| !entry.status.is_terminal())
    }

    /// Queue a redeploy of one stack and run it in the background.
    ///
    /// Returns the queued entry. Fails with `AlreadyInProgress` while an update
    /// of the same stack is still queued.
    pub async fn enqueue(
        &self,
        endpoint_id: i64,
        stack_id: i64,
        prune: bool,
        pull_image: bool,
    ) -> AppResult<StackUpdateStatus> {
        let operation_id = StackUpdateStatus::operation_id(endpoint_id, stack_id);
        if self.in_flight(&operation_id) {
            return Err(AppError::AlreadyInProgress(operation_id));
        }

        let stack = self.upstream.get_stack(stack_id).await?;
        if stack.endpoint_id != endpoint_id {
            return Err(AppError::BadRequest(format!(
                "stack {} belongs to endpoint {}, not {}",
                stack_id, stack.endpoint_id, endpoint_id
            )));
        }
        let stack_file_content = self.upstream.get_stack_file(stack_id).await?;

        let payload = StackUpdateRequest {
            id: stack_id,
            env: stack.env.unwrap_or_default(),
            prune,
            pull_image,
            stack_file_content,
            webhook: stack.webhook.unwrap_or_default(),
        };

        let queued = StackUpdateStatus {
            endpoint_id,
            stack_id,
            stack_name: stack.name,
            status: UpdateState::Queued,
            details: String::new(),
            timestamp: current_timestamp_secs(),
        };

        // the early check and the prep fetches are not atomic, this insert is
        self.queue
            .try_insert(
                operation_id.clone(),
                queued.clone(),
                Some(QUEUED_TTL),
                |existing| existing.status.is_terminal(),
            )
            .map_err(|_| AppError::AlreadyInProgress(operation_id.clone()))?;

        info!("Queued update of stack {} ({})", queued.stack_name, operation_id);

        let updater = self.clone();
        let entry = queued.clone();
        std::mem::drop(tokio::spawn(async move {
            let result = updater
                .upstream
                .update_stack(endpoint_id, stack_id, &payload)
                .await;
            updater.finish(operation_id, entry, result);
        }));

        Ok(queued)
    }

    fn finish(&self, operation_id: String, mut entry: StackUpdateStatus, result: AppResult<i64>) {
        match result {
            Ok(new_id) => {
                info!("Stack {} updated", entry.stack_name);
                entry.status = UpdateState::Done;
                entry.details = "Stack updated successfully".to_string();
                if new_id != entry.stack_id {
                    self.cache.invalidate_stack(new_id);
                }
            }
            Err(e) => {
                error!("Update of stack {} failed: {}", entry.stack_name, e);
                entry.status = UpdateState::Error;
                entry.details = e.to_string();
            }
        }
        self.cache.invalidate_stack(entry.stack_id);
        entry.timestamp = current_timestamp_secs();
        self.queue.set_with_ttl(operation_id, entry, Some(TERMINAL_TTL));
    }

    pub fn status(&self, endpoint_id: i64, stack_id: i64) -> Option<StackUpdateStatus> {
        self.queue
            .get(&StackUpdateStatus::operation_id(endpoint_id, stack_id))
    }

    /// Every entry still within its TTL
    pub fn snapshot(&self) -> Vec<StackUpdateStatus> {
        self.queue.snapshot().into_iter().map(|(_, entry)| entry).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ImageStatus;
    use crate::testing::FakeControlPlane;

    fn updater(fake: Arc<FakeControlPlane>) -> (StackUpdater, Arc<StatusCache>) {
        let cache = Arc::new(StatusCache::new(Duration::from_secs(60)));
        (StackUpdater::new(fake, cache.clone()), cache)
    }

    async fn wait_terminal(updater: &StackUpdater, endpoint_id: i64, stack_id: i64) -> StackUpdateStatus {
        for _ in 0..100 {
            if let Some(entry) = updater.status(endpoint_id, stack_id) {
                if entry.status.is_terminal() {
                    return entry;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("update of stack {} never finished", stack_id);
    }

    #[tokio::test]
    async fn test_second_enqueue_rejected_while_queued() {
        let fake = Arc::new(FakeControlPlane::new());
        fake.add_stack(1, 7, "media");
        let gate = fake.gate_update_stack();
        let (updater, cache) = updater(fake.clone());
        cache.set_stack_status(7, ImageStatus::Outdated);

        let queued = updater.enqueue(1, 7, true, true).await.unwrap();
        assert_eq!(queued.status, UpdateState::Queued);
        assert_eq!(queued.stack_name, "media");

        gate.entered.notified().await;
        let second = updater.enqueue(1, 7, true, true).await;
        assert!(matches!(second, Err(AppError::AlreadyInProgress(_))));
        assert_eq!(updater.snapshot().len(), 1);

        gate.release.notify_one();
        let done = wait_terminal(&updater, 1, 7).await;
        assert_eq!(done.status, UpdateState::Done);
        assert_eq!(cache.stack_status(7), None);

        // terminal entries no longer block
        assert!(updater.enqueue(1, 7, false, false).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_update_is_recorded() {
        let fake = Arc::new(FakeControlPlane::new());
        fake.add_stack(1, 8, "broken");
        fake.fail_update_stack();
        let (updater, _cache) = updater(fake.clone());

        updater.enqueue(1, 8, false, true).await.unwrap();
        let entry = wait_terminal(&updater, 1, 8).await;
        assert_eq!(entry.status, UpdateState::Error);
        assert!(!entry.details.is_empty());
    }

    #[tokio::test]
    async fn test_payload_carries_stack_definition() {
        let fake = Arc::new(FakeControlPlane::new());
        fake.add_stack(1, 9, "web");
        fake.set_stack_file(9, "services:\n  web:\n    image: nginx\n");
        let (updater, _cache) = updater(fake.clone());

        updater.enqueue(1, 9, true, false).await.unwrap();
        wait_terminal(&updater, 1, 9).await;

        let payload = fake.last_update_payload().unwrap();
        assert_eq!(payload.id, 9);
        assert!(payload.prune);
        assert!(!payload.pull_image);
        assert!(payload.stack_file_content.contains("nginx"));
    }

    #[tokio::test]
    async fn test_missing_stack_fails_without_queue_entry() {
        let fake = Arc::new(FakeControlPlane::new());
        let (updater, _cache) = updater(fake);
        assert!(updater.enqueue(1, 42, false, false).await.is_err());
        assert!(updater.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_endpoint_mismatch_is_rejected() {
        let fake = Arc::new(FakeControlPlane::new());
        fake.add_stack(2, 7, "media");
        let (updater, _cache) = updater(fake.clone());

        let result = updater.enqueue(1, 7, false, true).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert!(updater.snapshot().is_empty());
        assert!(fake.last_update_payload().is_none());
    }
}
