//! Scripted control plane for unit tests

use crate::models::{ContainerAction, ContainerDto, ImageStatus, StackAction, STACK_LABEL};
use crate::portainer::{ControlPlane, PortainerEndpoint, PortainerStack, StackUpdateRequest};
use crate::utils::errors::{AppError, AppResult};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Container with no stack label
pub fn container(id: &str, image: &str, state: &str) -> ContainerDto {
    ContainerDto {
        id: id.to_string(),
        name: format!("{}-1", id),
        image: image.to_string(),
        up_to_date: ImageStatus::NotRequested,
        status: state.to_string(),
        networks: vec![],
        ports: vec![],
        labels: HashMap::new(),
    }
}

/// Container labelled as part of `stack`
pub fn container_in(id: &str, stack: &str, image: &str, state: &str) -> ContainerDto {
    let mut c = container(id, image, state);
    c.labels
        .insert(STACK_LABEL.to_string(), serde_json::Value::String(stack.to_string()));
    c
}

/// Pauses a call until released. `entered` fires once the call is blocked.
#[derive(Clone, Default)]
pub struct Gate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl Gate {
    async fn pass(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

#[derive(Default)]
struct Script {
    endpoints: Vec<PortainerEndpoint>,
    stacks: Vec<PortainerStack>,
    containers: Vec<(i64, ContainerDto)>,
    stack_status: HashMap<i64, ImageStatus>,
    container_status: HashMap<String, ImageStatus>,
    failing_containers: HashSet<String>,
    conflicting_stacks: HashSet<i64>,
    failing_stacks: HashSet<i64>,
    stack_files: HashMap<i64, String>,
    list_stacks_fails: bool,
    update_fails: bool,
    list_stacks_gate: Option<Gate>,
    update_gate: Option<Gate>,
    stack_actions: Vec<(i64, StackAction)>,
    container_actions: Vec<(String, ContainerAction)>,
    last_update: Option<StackUpdateRequest>,
}

#[derive(Default)]
pub struct FakeControlPlane {
    script: Mutex<Script>,
    stack_status_calls: AtomicUsize,
    container_status_calls: AtomicUsize,
    container_status_in_flight: AtomicUsize,
    container_status_peak: AtomicUsize,
}

impl FakeControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    pub fn add_endpoint(&self, id: i64, name: &str) {
        self.script().endpoints.push(PortainerEndpoint {
            id,
            name: name.to_string(),
        });
    }

    pub fn add_stack(&self, endpoint_id: i64, id: i64, name: &str) {
        self.script().stacks.push(PortainerStack {
            id,
            name: name.to_string(),
            endpoint_id,
            env: Some(vec![]),
            webhook: None,
        });
    }

    pub fn add_container(&self, endpoint_id: i64, container: ContainerDto) {
        self.script().containers.push((endpoint_id, container));
    }

    pub fn set_stack_status(&self, stack_id: i64, status: ImageStatus) {
        self.script().stack_status.insert(stack_id, status);
    }

    pub fn set_container_status(&self, container_id: &str, status: ImageStatus) {
        self.script()
            .container_status
            .insert(container_id.to_string(), status);
    }

    pub fn fail_container_status(&self, container_id: &str) {
        self.script()
            .failing_containers
            .insert(container_id.to_string());
    }

    pub fn set_stack_file(&self, stack_id: i64, content: &str) {
        self.script().stack_files.insert(stack_id, content.to_string());
    }

    /// Answer 409 to start/stop of this stack
    pub fn conflict_on(&self, stack_id: i64) {
        self.script().conflicting_stacks.insert(stack_id);
    }

    pub fn fail_stack_action(&self, stack_id: i64) {
        self.script().failing_stacks.insert(stack_id);
    }

    pub fn fail_list_stacks(&self) {
        self.script().list_stacks_fails = true;
    }

    pub fn restore_list_stacks(&self) {
        self.script().list_stacks_fails = false;
    }

    pub fn fail_update_stack(&self) {
        self.script().update_fails = true;
    }

    /// Block the next `list_stacks` call
    pub fn gate_list_stacks(&self) -> Gate {
        let gate = Gate::default();
        self.script().list_stacks_gate = Some(gate.clone());
        gate
    }

    /// Block the next `update_stack` call
    pub fn gate_update_stack(&self) -> Gate {
        let gate = Gate::default();
        self.script().update_gate = Some(gate.clone());
        gate
    }

    pub fn stack_actions(&self) -> Vec<(i64, StackAction)> {
        self.script().stack_actions.clone()
    }

    pub fn container_actions(&self) -> Vec<(String, ContainerAction)> {
        self.script().container_actions.clone()
    }

    pub fn last_update_payload(&self) -> Option<StackUpdateRequest> {
        self.script().last_update.clone()
    }

    /// Most container status requests observed in flight at once
    pub fn container_status_peak(&self) -> usize {
        self.container_status_peak.load(Ordering::SeqCst)
    }

    pub fn stack_status_calls(&self) -> usize {
        self.stack_status_calls.load(Ordering::SeqCst)
    }

    pub fn container_status_calls(&self) -> usize {
        self.container_status_calls.load(Ordering::SeqCst)
    }

    fn find_stack(&self, stack_id: i64) -> AppResult<PortainerStack> {
        self.script()
            .stacks
            .iter()
            .find(|s| s.id == stack_id)
            .cloned()
            .ok_or_else(|| AppError::rejected(404, format!("stack {} not found", stack_id)))
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn list_endpoints(&self) -> AppResult<Vec<PortainerEndpoint>> {
        Ok(self.script().endpoints.clone())
    }

    async fn list_stacks(&self, endpoint_id: i64) -> AppResult<Vec<PortainerStack>> {
        let gate = self.script().list_stacks_gate.take();
        if let Some(gate) = gate {
            gate.pass().await;
        }

        let script = self.script();
        if script.list_stacks_fails {
            return Err(AppError::rejected(500, "stacks unavailable"));
        }
        Ok(script
            .stacks
            .iter()
            .filter(|s| s.endpoint_id == endpoint_id)
            .cloned()
            .collect())
    }

    async fn list_containers(&self, endpoint_id: i64, stack_name: Option<&str>) -> AppResult<Vec<ContainerDto>> {
        Ok(self
            .script()
            .containers
            .iter()
            .filter(|(e, _)| *e == endpoint_id)
            .map(|(_, c)| c)
            .filter(|c| stack_name.map_or(true, |name| c.stack_name() == Some(name)))
            .cloned()
            .collect())
    }

    async fn stack_image_status(&self, stack_id: i64) -> AppResult<ImageStatus> {
        self.stack_status_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .script()
            .stack_status
            .get(&stack_id)
            .copied()
            .unwrap_or(ImageStatus::Outdated))
    }

    async fn container_image_status(&self, _endpoint_id: i64, container_id: &str) -> AppResult<ImageStatus> {
        self.container_status_calls.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.container_status_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.container_status_peak.fetch_max(in_flight, Ordering::SeqCst);
        // let sibling requests start before this one answers
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        self.container_status_in_flight.fetch_sub(1, Ordering::SeqCst);

        let script = self.script();
        if script.failing_containers.contains(container_id) {
            return Err(AppError::rejected(500, "registry unreachable"));
        }
        Ok(script
            .container_status
            .get(container_id)
            .copied()
            .unwrap_or(ImageStatus::Updated))
    }

    async fn start_or_stop_stack(&self, _endpoint_id: i64, stack_id: i64, action: StackAction) -> AppResult<String> {
        let mut script = self.script();
        script.stack_actions.push((stack_id, action));
        if script.conflicting_stacks.contains(&stack_id) {
            return Err(AppError::rejected(409, "stack is already in that state"));
        }
        if script.failing_stacks.contains(&stack_id) {
            return Err(AppError::rejected(500, "compose failed"));
        }
        script
            .stacks
            .iter()
            .find(|s| s.id == stack_id)
            .map(|s| s.name.clone())
            .ok_or_else(|| AppError::rejected(404, "stack not found"))
    }

    async fn get_stack(&self, stack_id: i64) -> AppResult<PortainerStack> {
        self.find_stack(stack_id)
    }

    async fn get_stack_file(&self, stack_id: i64) -> AppResult<String> {
        self.find_stack(stack_id)?;
        Ok(self
            .script()
            .stack_files
            .get(&stack_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn update_stack(&self, _endpoint_id: i64, stack_id: i64, payload: &StackUpdateRequest) -> AppResult<i64> {
        let gate = self.script().update_gate.take();
        if let Some(gate) = gate {
            gate.pass().await;
        }

        let mut script = self.script();
        script.last_update = Some(payload.clone());
        if script.update_fails {
            return Err(AppError::rejected(500, "pull failed"));
        }
        Ok(stack_id)
    }

    async fn recreate_container(&self, _endpoint_id: i64, container_id: &str, _pull_image: bool) -> AppResult<String> {
        Ok(format!("{}-new", container_id))
    }

    async fn manage_container(&self, _endpoint_id: i64, container_id: &str, action: ContainerAction) -> AppResult<()> {
        self.script()
            .container_actions
            .push((container_id.to_string(), action));
        Ok(())
    }
}
