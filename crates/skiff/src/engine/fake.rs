//! In-memory engine that records every call.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use skiff_common::{labels, ImageReference, SkiffError, SkiffResult};
use tokio_util::sync::CancellationToken;

use super::{
    AuthConfig, ContainerDescriptor, ContainerOperations, CreateRequest, Engine,
    ImageBuildConfig, ImageOperations, NetworkOperations, OutputConsumer, OutputStream,
    SystemOperations,
};

/// One recorded engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ExistsWithId(String),
    ListByLabels(Vec<(String, String)>),
    Inspect(String),
    ExitCode(String),
    Run(String),
    Start(String),
    Stop(String),
    Remove(String),
    Attach(String),
    Exec(String, Vec<String>),
    ExtractArchive(String, String),
    ImageExists(String),
    ImageCreate(String),
    ImageBuild(String),
    NetworkCreate(String),
    NetworkDelete(String),
    IsWindows,
}

/// How an injected removal failure is reported.
#[derive(Debug, Clone)]
pub enum RemoveFailure {
    /// The engine's auto-remove got there first; the container disappears.
    Race,
    /// Any other rejection.
    Rejected(String),
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    containers: BTreeMap<String, ContainerDescriptor>,
    images: BTreeSet<String>,
    networks: BTreeMap<String, String>,
    archives: Vec<(String, String, Bytes)>,
    remove_failures: HashMap<String, RemoveFailure>,
    output: Vec<(OutputStream, Vec<u8>)>,
    fail_image_create: bool,
    fail_run: bool,
    fail_list: bool,
    windows: bool,
    exit_code: i64,
    next_id: u64,
    latency: Option<Duration>,
}

/// Shared fake; clones observe the same state.
#[derive(Clone, Default)]
pub struct FakeEngine {
    state: Arc<Mutex<State>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// An [`Engine`] backed by this fake.
    pub fn engine(&self) -> Engine {
        Engine::new(self.clone())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn with_image(self, name: &str) -> Self {
        self.lock().images.insert(name.to_string());
        self
    }

    /// Seed a container with the given labels and state.
    pub fn with_container(self, id: &str, labels: &[(&str, &str)], state: &str) -> Self {
        let descriptor = ContainerDescriptor {
            id: id.to_string(),
            names: vec![id.to_string()],
            image: "busybox:latest".to_string(),
            state: state.to_string(),
            labels: labels
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            created: None,
        };
        self.lock().containers.insert(id.to_string(), descriptor);
        self
    }

    pub fn with_output(self, stream: OutputStream, data: &[u8]) -> Self {
        self.lock().output.push((stream, data.to_vec()));
        self
    }

    pub fn with_exit_code(self, code: i64) -> Self {
        self.lock().exit_code = code;
        self
    }

    pub fn with_windows(self) -> Self {
        self.lock().windows = true;
        self
    }

    /// Delay image lookups, pulls, listings and removals by `latency`.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = Some(latency);
        self
    }

    pub fn fail_remove(&self, id: &str, failure: RemoveFailure) {
        self.lock()
            .remove_failures
            .insert(id.to_string(), failure);
    }

    pub fn fail_image_create(&self) {
        self.lock().fail_image_create = true;
    }

    pub fn fail_run(&self) {
        self.lock().fail_run = true;
    }

    pub fn fail_list(&self) {
        self.lock().fail_list = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    pub fn has_container(&self, id: &str) -> bool {
        self.lock().containers.contains_key(id)
    }

    pub fn container(&self, id: &str) -> Option<ContainerDescriptor> {
        self.lock().containers.get(id).cloned()
    }

    pub fn archives(&self) -> Vec<(String, String, Bytes)> {
        self.lock().archives.clone()
    }

    fn record(&self, call: Call) -> MutexGuard<'_, State> {
        let mut state = self.lock();
        state.calls.push(call);
        state
    }

    /// Record `call` when it starts, then wait out the configured latency.
    async fn enter(&self, call: Call) -> MutexGuard<'_, State> {
        let latency = {
            let mut state = self.lock();
            state.calls.push(call);
            state.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.lock()
    }

    fn require(state: &State, id: &str) -> SkiffResult<()> {
        if state.containers.contains_key(id) {
            Ok(())
        } else {
            Err(SkiffError::ContainerNotFound { id: id.to_string() })
        }
    }
}

#[async_trait]
impl ContainerOperations for FakeEngine {
    async fn exists_with_id(&self, id: &str) -> SkiffResult<bool> {
        let state = self.record(Call::ExistsWithId(id.to_string()));
        Ok(state.containers.contains_key(id))
    }

    async fn list_by_labels(
        &self,
        filter: &[(String, String)],
    ) -> SkiffResult<Vec<ContainerDescriptor>> {
        let state = self.enter(Call::ListByLabels(filter.to_vec())).await;
        if state.fail_list {
            return Err(SkiffError::EngineUnreachable {
                endpoint: "fake".to_string(),
                message: "list failed".to_string(),
            });
        }
        Ok(state
            .containers
            .values()
            .filter(|c| labels::matches(&c.labels, filter))
            .cloned()
            .collect())
    }

    async fn inspect(&self, id: &str) -> SkiffResult<ContainerDescriptor> {
        let state = self.record(Call::Inspect(id.to_string()));
        state
            .containers
            .get(id)
            .cloned()
            .ok_or_else(|| SkiffError::ContainerNotFound { id: id.to_string() })
    }

    async fn exit_code(&self, id: &str) -> SkiffResult<i64> {
        let state = self.record(Call::ExitCode(id.to_string()));
        Self::require(&state, id)?;
        Ok(state.exit_code)
    }

    async fn run(&self, request: &CreateRequest) -> SkiffResult<String> {
        let mut state = self.record(Call::Run(request.image.clone()));
        if state.fail_run || !state.images.contains(&request.image) {
            return Err(SkiffError::ContainerCreateFailed {
                image: request.image.clone(),
                message: "rejected by fake engine".to_string(),
            });
        }
        state.next_id += 1;
        let id = format!("c{:011}", state.next_id);
        let descriptor = ContainerDescriptor {
            id: id.clone(),
            names: request.name.iter().cloned().collect(),
            image: request.image.clone(),
            state: "running".to_string(),
            labels: request.labels.clone(),
            created: None,
        };
        state.containers.insert(id.clone(), descriptor);
        Ok(id)
    }

    async fn start(&self, id: &str) -> SkiffResult<()> {
        let mut state = self.record(Call::Start(id.to_string()));
        Self::require(&state, id)?;
        if let Some(container) = state.containers.get_mut(id) {
            container.state = "running".to_string();
        }
        Ok(())
    }

    async fn stop(&self, id: &str, _timeout_secs: u64) -> SkiffResult<()> {
        let mut state = self.record(Call::Stop(id.to_string()));
        Self::require(&state, id)?;
        if let Some(container) = state.containers.get_mut(id) {
            container.state = "exited".to_string();
        }
        Ok(())
    }

    async fn remove(&self, id: &str) -> SkiffResult<()> {
        let mut state = self.enter(Call::Remove(id.to_string())).await;
        match state.remove_failures.get(id).cloned() {
            Some(RemoveFailure::Race) => {
                state.containers.remove(id);
                Err(SkiffError::RemovalInProgress { id: id.to_string() })
            }
            Some(RemoveFailure::Rejected(message)) => Err(SkiffError::Engine {
                operation: "remove container".to_string(),
                status: 500,
                message,
            }),
            None => state
                .containers
                .remove(id)
                .map(|_| ())
                .ok_or_else(|| SkiffError::ContainerNotFound { id: id.to_string() }),
        }
    }

    async fn attach(
        &self,
        id: &str,
        consumer: &dyn OutputConsumer,
        cancel: &CancellationToken,
    ) -> SkiffResult<()> {
        let output = {
            let state = self.record(Call::Attach(id.to_string()));
            Self::require(&state, id)?;
            state.output.clone()
        };
        for (stream, data) in output {
            if cancel.is_cancelled() {
                break;
            }
            consumer.consume(stream, &data);
        }
        Ok(())
    }

    async fn exec(&self, id: &str, command: &[String]) -> SkiffResult<i64> {
        let state = self.record(Call::Exec(id.to_string(), command.to_vec()));
        Self::require(&state, id)?;
        Ok(state.exit_code)
    }

    async fn extract_archive(&self, id: &str, path: &str, archive: Bytes) -> SkiffResult<()> {
        let mut state = self.record(Call::ExtractArchive(id.to_string(), path.to_string()));
        Self::require(&state, id)?;
        state
            .archives
            .push((id.to_string(), path.to_string(), archive));
        Ok(())
    }
}

#[async_trait]
impl ImageOperations for FakeEngine {
    async fn exists_with_name(&self, name: &str) -> SkiffResult<bool> {
        let state = self.enter(Call::ImageExists(name.to_string())).await;
        Ok(state.images.contains(name))
    }

    async fn create(&self, image: &ImageReference, _auth: Option<&AuthConfig>) -> SkiffResult<()> {
        let name = image.full_name();
        let mut state = self.enter(Call::ImageCreate(name.clone())).await;
        if state.fail_image_create {
            return Err(SkiffError::ImageBuildFailed {
                reference: name,
                message: "pull access denied".to_string(),
            });
        }
        state.images.insert(name);
        Ok(())
    }

    async fn build(&self, config: &ImageBuildConfig) -> SkiffResult<String> {
        let name = config.image.full_name();
        let mut state = self.record(Call::ImageBuild(name.clone()));
        state.images.insert(name.clone());
        Ok(name)
    }
}

#[async_trait]
impl NetworkOperations for FakeEngine {
    async fn create(&self, name: &str) -> SkiffResult<String> {
        let mut state = self.record(Call::NetworkCreate(name.to_string()));
        let id = format!("n{}", state.networks.len() + 1);
        state.networks.insert(id.clone(), name.to_string());
        Ok(id)
    }

    async fn delete(&self, id: &str) -> SkiffResult<()> {
        let mut state = self.record(Call::NetworkDelete(id.to_string()));
        state
            .networks
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| SkiffError::NetworkOperationFailed {
                network: id.to_string(),
                message: "no such network".to_string(),
            })
    }
}

#[async_trait]
impl SystemOperations for FakeEngine {
    async fn is_windows_engine_enabled(&self) -> SkiffResult<bool> {
        let state = self.record(Call::IsWindows);
        Ok(state.windows)
    }
}
