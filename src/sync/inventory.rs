//! Live stack assembly and on-demand image status resolution

use crate::cache::StatusCache;
use crate::models::{ContainerDto, ImageStatus, StackDto};
use crate::portainer::ControlPlane;
use crate::settings::SettingsStore;
use crate::utils::errors::AppResult;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// True when `image` is `entry` itself, or `entry` carries no tag or digest
/// and `image` is that repository at any tag or digest.
pub fn image_matches(entry: &str, image: &str) -> bool {
    if image == entry {
        return true;
    }
    let last_segment = entry.rsplit('/').next().unwrap_or(entry);
    if entry.contains('@') || last_segment.contains(':') {
        return false;
    }
    image
        .strip_prefix(entry)
        .map_or(false, |rest| rest.starts_with(':') || rest.starts_with('@'))
}

/// Counters of one status resolution pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveStats {
    pub fetched: usize,
    pub failed: usize,
    pub from_cache: usize,
    pub aggregate_skips: usize,
}

pub const DEFAULT_FETCH_CONCURRENCY: usize = 8;

/// Builds `StackDto`s from the control plane and fills in image statuses
pub struct StackInventory {
    upstream: Arc<dyn ControlPlane>,
    store: Arc<dyn SettingsStore>,
    cache: Arc<StatusCache>,
    protected_images: Vec<String>,
    fetch_concurrency: usize,
}

impl StackInventory {
    pub fn new(
        upstream: Arc<dyn ControlPlane>,
        store: Arc<dyn SettingsStore>,
        cache: Arc<StatusCache>,
        protected_images: Vec<String>,
    ) -> Self {
        Self {
            upstream,
            store,
            cache,
            protected_images,
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
        }
    }

    /// Cap on container status requests in flight during one pass
    pub fn with_fetch_concurrency(mut self, limit: usize) -> Self {
        self.fetch_concurrency = limit.max(1);
        self
    }

    pub fn upstream(&self) -> &Arc<dyn ControlPlane> {
        &self.upstream
    }

    pub fn cache(&self) -> &Arc<StatusCache> {
        &self.cache
    }

    /// A stack is protected when one of its containers runs a protected image
    pub fn is_protected(&self, stack: &StackDto) -> bool {
        stack.containers.iter().any(|c| {
            self.protected_images
                .iter()
                .any(|entry| image_matches(entry, &c.image))
        })
    }

    /// Stacks of an endpoint with their containers, statuses left unrequested
    pub async fn live_stacks(&self, endpoint_id: i64) -> AppResult<Vec<StackDto>> {
        let stacks = self.upstream.list_stacks(endpoint_id).await?;
        let containers = self.upstream.list_containers(endpoint_id, None).await?;

        let mut by_stack: HashMap<String, Vec<ContainerDto>> = HashMap::new();
        for container in containers {
            if let Some(name) = container.stack_name().map(str::to_string) {
                by_stack.entry(name).or_default().push(container);
            }
        }

        let mut result: Vec<StackDto> = stacks
            .into_iter()
            .map(|stack| {
                let mut dto = StackDto::new(stack.id, stack.name);
                dto.containers = by_stack.remove(&dto.name).unwrap_or_default();
                dto.containers.sort_by(|a, b| a.name.cmp(&b.name));
                dto
            })
            .collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));

        debug!("Assembled {} stacks for endpoint {}", result.len(), endpoint_id);
        Ok(result)
    }

    /// Live stacks of several endpoints, concatenated
    pub async fn live_stacks_of(&self, endpoint_ids: &[i64]) -> AppResult<Vec<StackDto>> {
        let mut all = Vec::new();
        for endpoint_id in endpoint_ids {
            all.extend(self.live_stacks(*endpoint_id).await?);
        }
        Ok(all)
    }

    /// Live stacks joined with persisted priority and auto-start, in priority order
    pub async fn stacks(&self, endpoint_id: i64, with_status: bool) -> AppResult<Vec<StackDto>> {
        let mut stacks = self.live_stacks(endpoint_id).await?;

        let settings: HashMap<String, (i64, bool)> = self
            .store
            .get_all()
            .await?
            .into_iter()
            .map(|s| (s.stack_name, (s.priority, s.auto_start)))
            .collect();

        for stack in stacks.iter_mut() {
            if let Some((priority, auto_start)) = settings.get(&stack.name) {
                stack.priority = *priority;
                stack.auto_start = *auto_start;
            }
        }
        stacks.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));

        if with_status {
            self.resolve_statuses(endpoint_id, &mut stacks, false).await?;
        }
        Ok(stacks)
    }

    /// Containers of one stack, with statuses
    pub async fn containers(&self, endpoint_id: i64, stack_name: &str) -> AppResult<Vec<ContainerDto>> {
        let mut containers = self.upstream.list_containers(endpoint_id, Some(stack_name)).await?;
        let ignored = self.ignored_images().await?;
        let mut stats = ResolveStats::default();
        self.resolve_containers(endpoint_id, &mut containers, &ignored, false, &mut stats)
            .await;
        Ok(containers)
    }

    /// Image status of a single container, from cache when possible
    pub async fn container_status(&self, endpoint_id: i64, container_id: &str) -> AppResult<ImageStatus> {
        let lookup = self.cache.lookup(container_id);
        if let (false, Some(status)) = (lookup.needs_fetch(), lookup.status()) {
            return Ok(status);
        }
        match self.upstream.container_image_status(endpoint_id, container_id).await {
            Ok(status) => {
                self.cache.record(container_id, status);
                Ok(status)
            }
            Err(e) => {
                self.cache.record_failure(container_id);
                Err(e)
            }
        }
    }

    async fn ignored_images(&self) -> AppResult<Vec<String>> {
        Ok(self
            .store
            .ignored_images()
            .await?
            .into_iter()
            .map(|i| i.name)
            .collect())
    }

    /// Fill in `up_to_date` for every container of `stacks`.
    ///
    /// With `refresh` every container not already known to be outdated in the
    /// fallback tier is fetched again, live-tier hits included; otherwise
    /// cached answers are reused.
    pub async fn resolve_statuses(
        &self,
        endpoint_id: i64,
        stacks: &mut [StackDto],
        refresh: bool,
    ) -> AppResult<ResolveStats> {
        let ignored = self.ignored_images().await?;
        let mut stats = ResolveStats::default();

        for stack in stacks.iter_mut() {
            mark_ignored(&mut stack.containers, &ignored);

            let known_outdated = stack
                .containers
                .iter()
                .any(|c| self.cache.get_fallback(&c.id) == Some(ImageStatus::Outdated));

            if !known_outdated && self.stack_is_updated(stack.id, refresh).await {
                for container in stack.containers.iter_mut() {
                    if container.up_to_date == ImageStatus::Skipped {
                        continue;
                    }
                    container.up_to_date = ImageStatus::Updated;
                    self.cache.set_fallback(&container.id, ImageStatus::Updated);
                }
                stats.aggregate_skips += 1;
                continue;
            }

            self.resolve_containers(endpoint_id, &mut stack.containers, &ignored, refresh, &mut stats)
                .await;
        }
        Ok(stats)
    }

    /// Aggregate check; any failure reads as "not known to be updated"
    async fn stack_is_updated(&self, stack_id: i64, refresh: bool) -> bool {
        if !refresh {
            if let Some(status) = self.cache.stack_status(stack_id) {
                return status == ImageStatus::Updated;
            }
        }
        match self.upstream.stack_image_status(stack_id).await {
            Ok(status) => {
                self.cache.set_stack_status(stack_id, status);
                status == ImageStatus::Updated
            }
            Err(e) => {
                warn!("Aggregate image status of stack {} failed: {}", stack_id, e);
                false
            }
        }
    }

    /// Per-container resolution; at most `fetch_concurrency` live fetches run at once
    async fn resolve_containers(
        &self,
        endpoint_id: i64,
        containers: &mut [ContainerDto],
        ignored: &[String],
        refresh: bool,
        stats: &mut ResolveStats,
    ) {
        mark_ignored(containers, ignored);

        let mut pending = Vec::new();
        for (index, container) in containers.iter_mut().enumerate() {
            if container.up_to_date == ImageStatus::Skipped {
                continue;
            }
            let cached = if refresh {
                self.cache
                    .get_fallback(&container.id)
                    .filter(|status| *status == ImageStatus::Outdated)
            } else {
                let lookup = self.cache.lookup(&container.id);
                if lookup.needs_fetch() {
                    None
                } else {
                    lookup.status()
                }
            };
            match cached {
                Some(status) => {
                    container.up_to_date = status;
                    stats.from_cache += 1;
                }
                None => pending.push((index, container.id.clone())),
            }
        }

        let upstream = &self.upstream;
        let results: Vec<_> = stream::iter(pending)
            .map(|(index, id)| async move {
                let result = upstream.container_image_status(endpoint_id, &id).await;
                (index, id, result)
            })
            .buffer_unordered(self.fetch_concurrency)
            .collect()
            .await;

        for (index, id, result) in results {
            let status = match result {
                Ok(status) => {
                    self.cache.record(&id, status);
                    stats.fetched += 1;
                    status
                }
                Err(e) => {
                    warn!("Image status of container {} failed: {}", id, e);
                    self.cache.record_failure(&id);
                    stats.failed += 1;
                    self.cache.get_fallback(&id).unwrap_or(ImageStatus::Error)
                }
            };
            containers[index].up_to_date = status;
        }
    }
}

fn mark_ignored(containers: &mut [ContainerDto], ignored: &[String]) {
    for container in containers.iter_mut() {
        if ignored.iter().any(|entry| image_matches(entry, &container.image)) {
            container.up_to_date = ImageStatus::Skipped;
        }
    }
}

/// Group stacks by name for quick joins
pub fn index_by_name(stacks: &[StackDto]) -> BTreeMap<&str, &StackDto> {
    stacks.iter().map(|s| (s.name.as_str(), s)).collect()
}
