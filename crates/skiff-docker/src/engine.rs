//! [`DockerEngine`]: the engine facade over `bollard`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::auth::DockerCredentials;
use bollard::container::{
    AttachContainerOptions, AttachContainerResults, Config, CreateContainerOptions,
    InspectContainerOptions, ListContainersOptions, LogOutput, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions, UploadToContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::{BuildImageOptions, CreateImageOptions};
use bollard::models::{
    ContainerInspectResponse, ContainerSummary, HostConfig, NetworkCreateResponse,
};
use bollard::network::CreateNetworkOptions;
use bollard::{API_DEFAULT_VERSION, Docker};
use bytes::Bytes;
use futures::StreamExt;
use skiff::engine::{
    AuthConfig, ContainerDescriptor, ContainerOperations, CreateRequest, Engine,
    ImageBuildConfig, ImageOperations, NetworkOperations, OutputConsumer, OutputStream,
    SystemOperations,
};
use skiff_common::{EngineEndpoint, ImageReference, ImageTag, SkiffConfig, SkiffError, SkiffResult};
use tokio_util::sync::CancellationToken;

use crate::context::pack_context;
use crate::translate::{
    container_error, create_error, engine_error, image_error, is_not_found, network_error,
};

/// Docker Engine API client implementing every engine sub-client.
///
/// Cloning shares the underlying connection pool.
#[derive(Debug, Clone)]
pub struct DockerEngine {
    docker: Docker,
    endpoint: String,
}

impl DockerEngine {
    /// Connect to the endpoint in `config`.
    ///
    /// No request is made; use [`ping`](Self::ping) to check reachability.
    ///
    /// # Errors
    ///
    /// Returns [`SkiffError::EngineUnreachable`] if the transport cannot be set up.
    pub fn connect(config: &SkiffConfig) -> SkiffResult<Self> {
        let endpoint = config.endpoint.label();
        let timeout = config.request_timeout_secs;
        let unreachable = |e: bollard::errors::Error| SkiffError::EngineUnreachable {
            endpoint: endpoint.clone(),
            message: e.to_string(),
        };

        let docker = match &config.endpoint {
            EngineEndpoint::Local => Docker::connect_with_local_defaults()
                .map(|docker| docker.with_timeout(Duration::from_secs(timeout))),
            EngineEndpoint::Unix(path) => {
                Docker::connect_with_socket(&path.to_string_lossy(), timeout, API_DEFAULT_VERSION)
            }
            EngineEndpoint::Tcp(address) => Docker::connect_with_http(
                &format!("tcp://{address}"),
                timeout,
                API_DEFAULT_VERSION,
            ),
        }
        .map_err(unreachable)?;

        tracing::debug!(endpoint = %endpoint, "Connected to Docker engine");
        Ok(Self::from_docker(docker, endpoint))
    }

    /// Connect and verify the engine answers.
    ///
    /// # Errors
    ///
    /// Returns [`SkiffError::EngineUnreachable`] if the engine does not respond.
    pub async fn connect_and_ping(config: &SkiffConfig) -> SkiffResult<Self> {
        let engine = Self::connect(config)?;
        engine.ping().await?;
        Ok(engine)
    }

    /// Wrap an existing `bollard` client.
    pub fn from_docker(docker: Docker, endpoint: impl Into<String>) -> Self {
        Self {
            docker,
            endpoint: endpoint.into(),
        }
    }

    /// Endpoint label used in errors.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Check the engine responds.
    ///
    /// # Errors
    ///
    /// Returns [`SkiffError::EngineUnreachable`] if it does not.
    pub async fn ping(&self) -> SkiffResult<()> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| SkiffError::EngineUnreachable {
                endpoint: self.endpoint.clone(),
                message: e.to_string(),
            })
    }

    /// Bundle into the facade consumed by [`skiff::SkiffClient`].
    #[must_use]
    pub fn into_engine(self) -> Engine {
        Engine::new(self)
    }

    async fn inspect_raw(&self, id: &str) -> SkiffResult<ContainerInspectResponse> {
        self.docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| container_error(e, &self.endpoint, "inspect container", id))
    }

    async fn discard_failed(&self, id: &str) {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        if let Err(e) = self.docker.remove_container(id, Some(options)).await {
            tracing::warn!(container = %id, error = %e, "Failed to discard unstarted container");
        }
    }
}

fn summary_descriptor(summary: ContainerSummary) -> ContainerDescriptor {
    ContainerDescriptor {
        id: summary.id.unwrap_or_default(),
        names: summary
            .names
            .unwrap_or_default()
            .into_iter()
            .map(|name| name.trim_start_matches('/').to_string())
            .collect(),
        image: summary.image.unwrap_or_default(),
        state: summary.state.unwrap_or_default(),
        labels: summary.labels.unwrap_or_default().into_iter().collect(),
        created: summary.created,
    }
}

fn created_network_id(name: &str, response: NetworkCreateResponse) -> SkiffResult<String> {
    if let Some(warning) = response.warning.as_deref().filter(|w| !w.is_empty()) {
        tracing::warn!(network = %name, "{warning}");
    }
    response
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| SkiffError::NetworkOperationFailed {
            network: name.to_string(),
            message: "engine reported no network ID".to_string(),
        })
}

fn inspect_descriptor(response: ContainerInspectResponse) -> ContainerDescriptor {
    let config = response.config.unwrap_or_default();
    ContainerDescriptor {
        id: response.id.unwrap_or_default(),
        names: response
            .name
            .map(|name| vec![name.trim_start_matches('/').to_string()])
            .unwrap_or_default(),
        image: config.image.unwrap_or_default(),
        state: response
            .state
            .and_then(|state| state.status)
            .map(|status| status.to_string())
            .unwrap_or_default(),
        labels: config.labels.unwrap_or_default().into_iter().collect(),
        created: None,
    }
}

fn non_empty(values: &[String]) -> Option<Vec<String>> {
    (!values.is_empty()).then(|| values.to_vec())
}

fn credentials(auth: &AuthConfig) -> DockerCredentials {
    DockerCredentials {
        username: auth.username.clone(),
        password: auth.password.clone(),
        serveraddress: auth.server_address.clone(),
        identitytoken: auth.identity_token.clone(),
        ..Default::default()
    }
}

#[async_trait]
impl ContainerOperations for DockerEngine {
    async fn exists_with_id(&self, id: &str) -> SkiffResult<bool> {
        match self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(container_error(e, &self.endpoint, "inspect container", id)),
        }
    }

    async fn list_by_labels(
        &self,
        filter: &[(String, String)],
    ) -> SkiffResult<Vec<ContainerDescriptor>> {
        let labels = filter
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        let options = ListContainersOptions {
            all: true,
            filters: HashMap::from([("label".to_string(), labels)]),
            ..Default::default()
        };

        let summaries = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| engine_error(e, &self.endpoint, "list containers"))?;
        tracing::debug!(count = summaries.len(), "Listed labelled containers");
        Ok(summaries.into_iter().map(summary_descriptor).collect())
    }

    async fn inspect(&self, id: &str) -> SkiffResult<ContainerDescriptor> {
        self.inspect_raw(id).await.map(inspect_descriptor)
    }

    async fn exit_code(&self, id: &str) -> SkiffResult<i64> {
        self.inspect_raw(id)
            .await?
            .state
            .and_then(|state| state.exit_code)
            .ok_or_else(|| SkiffError::Internal {
                message: format!("Engine reported no exit code for container {id}"),
            })
    }

    async fn run(&self, request: &CreateRequest) -> SkiffResult<String> {
        let options = request.name.as_ref().map(|name| CreateContainerOptions {
            name: name.clone(),
            platform: None,
        });
        let config = Config {
            image: Some(request.image.clone()),
            env: non_empty(&request.env),
            cmd: non_empty(&request.command),
            entrypoint: non_empty(&request.entrypoint),
            working_dir: request.working_dir.clone(),
            labels: Some(request.labels.clone().into_iter().collect()),
            exposed_ports: (!request.exposed_ports.is_empty()).then(|| {
                request
                    .exposed_ports
                    .iter()
                    .map(|port| (port.clone(), HashMap::new()))
                    .collect()
            }),
            host_config: Some(HostConfig {
                auto_remove: Some(request.auto_remove),
                ..Default::default()
            }),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(options, config)
            .await
            .map_err(|e| create_error(e, &self.endpoint, &request.image))?;
        for warning in &created.warnings {
            tracing::warn!(container = %created.id, warning = %warning, "Engine warning");
        }

        if let Err(e) = self
            .docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
        {
            self.discard_failed(&created.id).await;
            return Err(create_error(e, &self.endpoint, &request.image));
        }

        tracing::debug!(container = %created.id, image = %request.image, "Created and started container");
        Ok(created.id)
    }

    async fn start(&self, id: &str) -> SkiffResult<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| container_error(e, &self.endpoint, "start container", id))
    }

    async fn stop(&self, id: &str, timeout_secs: u64) -> SkiffResult<()> {
        let options = StopContainerOptions {
            t: i64::try_from(timeout_secs).unwrap_or(i64::MAX),
        };
        self.docker
            .stop_container(id, Some(options))
            .await
            .map_err(|e| container_error(e, &self.endpoint, "stop container", id))
    }

    async fn remove(&self, id: &str) -> SkiffResult<()> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| container_error(e, &self.endpoint, "remove container", id))
    }

    async fn attach(
        &self,
        id: &str,
        consumer: &dyn OutputConsumer,
        cancel: &CancellationToken,
    ) -> SkiffResult<()> {
        let options = AttachContainerOptions::<String> {
            stdout: Some(true),
            stderr: Some(true),
            stream: Some(true),
            logs: Some(true),
            ..Default::default()
        };
        let AttachContainerResults { mut output, .. } = self
            .docker
            .attach_container(id, Some(options))
            .await
            .map_err(|e| container_error(e, &self.endpoint, "attach container", id))?;

        loop {
            let frame = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                frame = output.next() => frame,
            };
            match frame {
                Some(Ok(LogOutput::StdOut { message } | LogOutput::Console { message })) => {
                    consumer.consume(OutputStream::Stdout, &message);
                }
                Some(Ok(LogOutput::StdErr { message })) => {
                    consumer.consume(OutputStream::Stderr, &message);
                }
                Some(Ok(LogOutput::StdIn { .. })) => {}
                Some(Err(e)) => {
                    return Err(container_error(e, &self.endpoint, "attach container", id));
                }
                None => break,
            }
        }
        Ok(())
    }

    async fn exec(&self, id: &str, command: &[String]) -> SkiffResult<i64> {
        let options = CreateExecOptions {
            cmd: Some(command.to_vec()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };
        let exec = self
            .docker
            .create_exec(id, options)
            .await
            .map_err(|e| container_error(e, &self.endpoint, "create exec", id))?;

        let started = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| container_error(e, &self.endpoint, "start exec", id))?;
        if let StartExecResults::Attached { mut output, .. } = started {
            while let Some(frame) = output.next().await {
                let frame =
                    frame.map_err(|e| container_error(e, &self.endpoint, "start exec", id))?;
                tracing::trace!(container = %id, output = %frame, "Exec output");
            }
        }

        let inspected = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| engine_error(e, &self.endpoint, "inspect exec"))?;
        inspected.exit_code.ok_or_else(|| SkiffError::Internal {
            message: format!("Exec {} in container {id} reported no exit code", exec.id),
        })
    }

    async fn extract_archive(&self, id: &str, path: &str, archive: Bytes) -> SkiffResult<()> {
        let options = UploadToContainerOptions {
            path: path.to_string(),
            ..Default::default()
        };
        self.docker
            .upload_to_container(id, Some(options), archive)
            .await
            .map_err(|e| container_error(e, &self.endpoint, "extract archive", id))
    }
}

#[async_trait]
impl ImageOperations for DockerEngine {
    async fn exists_with_name(&self, name: &str) -> SkiffResult<bool> {
        match self.docker.inspect_image(name).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(engine_error(e, &self.endpoint, "inspect image")),
        }
    }

    async fn create(&self, image: &ImageReference, auth: Option<&AuthConfig>) -> SkiffResult<()> {
        let reference = image.full_name();
        let options = match &image.reference {
            ImageTag::Tag(tag) => CreateImageOptions {
                from_image: image.name(),
                tag: tag.clone(),
                ..Default::default()
            },
            ImageTag::Digest(_) => CreateImageOptions {
                from_image: reference.clone(),
                ..Default::default()
            },
        };

        let mut progress = self
            .docker
            .create_image(Some(options), None, auth.map(credentials));
        while let Some(info) = progress.next().await {
            let info = info.map_err(|e| image_error(e, &self.endpoint, &reference))?;
            if let Some(error) = info.error {
                return Err(SkiffError::ImageBuildFailed {
                    reference,
                    message: error,
                });
            }
            tracing::trace!(image = %reference, status = ?info.status, "Pull progress");
        }

        tracing::debug!(image = %reference, "Pulled image");
        Ok(())
    }

    async fn build(&self, config: &ImageBuildConfig) -> SkiffResult<String> {
        let reference = config.image.full_name();
        let context = pack_context(&config.context)?;
        let options = BuildImageOptions {
            dockerfile: config.dockerfile.clone(),
            t: reference.clone(),
            rm: config.remove_intermediate,
            nocache: config.no_cache,
            buildargs: config.build_args.clone().into_iter().collect(),
            labels: config.labels.clone().into_iter().collect(),
            ..Default::default()
        };

        let mut progress = self.docker.build_image(options, None, Some(context));
        while let Some(info) = progress.next().await {
            let info = info.map_err(|e| image_error(e, &self.endpoint, &reference))?;
            if let Some(error) = info.error {
                return Err(SkiffError::ImageBuildFailed {
                    reference,
                    message: error,
                });
            }
            if let Some(line) = info.stream.as_deref().map(str::trim_end) {
                if !line.is_empty() {
                    tracing::debug!(image = %reference, "{line}");
                }
            }
        }

        Ok(reference)
    }
}

#[async_trait]
impl NetworkOperations for DockerEngine {
    async fn create(&self, name: &str) -> SkiffResult<String> {
        let options = CreateNetworkOptions {
            name: name.to_string(),
            ..Default::default()
        };
        let response = self
            .docker
            .create_network(options)
            .await
            .map_err(|e| network_error(e, &self.endpoint, name))?;
        created_network_id(name, response)
    }

    async fn delete(&self, id: &str) -> SkiffResult<()> {
        self.docker
            .remove_network(id)
            .await
            .map_err(|e| network_error(e, &self.endpoint, id))
    }
}

#[async_trait]
impl SystemOperations for DockerEngine {
    async fn is_windows_engine_enabled(&self) -> SkiffResult<bool> {
        let info = self
            .docker
            .info()
            .await
            .map_err(|e| engine_error(e, &self.endpoint, "engine info"))?;
        Ok(info
            .os_type
            .is_some_and(|os| os.eq_ignore_ascii_case("windows")))
    }
}
