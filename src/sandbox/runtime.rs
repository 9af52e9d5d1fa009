//! Docker runtime for sandbox database engines
//!
//! One ephemeral PostgreSQL container per sandbox, published on a single host
//! port and configured with the sandbox-only credential triple.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, PortBinding};
use bollard::Docker;
use futures::StreamExt;
use secrecy::ExposeSecret;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::error::{Result, SandboxError};
use super::types::SandboxInfo;
use crate::config::SandboxConfig;

/// Engine port inside the container
pub const ENGINE_PORT: &str = "5432/tcp";
/// Label carrying the owning student id
pub const LABEL_STUDENT: &str = "sqlsandbox.student";
/// Label carrying the source database id
pub const LABEL_DATABASE: &str = "sqlsandbox.database";

/// Seconds the engine gets to shut down before being killed
const STOP_TIMEOUT_SECS: i64 = 5;

/// What to create for one sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSpec {
    pub name: String,
    pub port: u16,
    pub labels: HashMap<String, String>,
}

impl InstanceSpec {
    pub fn for_sandbox(info: &SandboxInfo) -> Self {
        let labels = HashMap::from([
            (LABEL_STUDENT.to_string(), info.student_id.to_string()),
            (LABEL_DATABASE.to_string(), info.source_database_id.to_string()),
        ]);
        InstanceSpec {
            name: info.name.clone(),
            port: info.port,
            labels,
        }
    }
}

/// An instance as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeInstance {
    pub id: String,
    pub name: String,
    pub running: bool,
}

/// Control surface over the container runtime.
///
/// `stop` and `remove` succeed when the instance is already gone.
#[async_trait]
pub trait RuntimeController: Send + Sync {
    /// Create a named instance and return its runtime id.
    async fn create(&self, spec: &InstanceSpec) -> Result<String>;

    async fn start(&self, runtime_id: &str) -> Result<()>;

    async fn stop(&self, runtime_id: &str) -> Result<()>;

    async fn remove(&self, runtime_id: &str) -> Result<()>;

    /// All instances, running or not, whose name starts with `prefix`.
    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<RuntimeInstance>>;
}

/// Docker-backed runtime
pub struct DockerRuntime {
    /// Docker client
    docker: Docker,
    /// Sandbox configuration
    config: SandboxConfig,
}

impl DockerRuntime {
    /// Connect to the local Docker daemon and make sure the image is present
    pub async fn new(config: &SandboxConfig) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| SandboxError::Runtime {
            reason: format!("Failed to connect to Docker: {}", e),
        })?;

        // Verify connection
        docker.ping().await.map_err(|e| SandboxError::Runtime {
            reason: format!("Docker ping failed: {}", e),
        })?;

        info!("Sandbox runtime connected to Docker");

        let runtime = DockerRuntime {
            docker,
            config: config.clone(),
        };

        if config.pull_image {
            runtime.ensure_image().await?;
        }

        Ok(runtime)
    }

    /// Pull the sandbox image unless a local tag already matches
    async fn ensure_image(&self) -> Result<()> {
        let images = self
            .docker
            .list_images::<String>(None)
            .await
            .map_err(|e| SandboxError::Runtime {
                reason: format!("Failed to list images: {}", e),
            })?;

        let target = qualified_image(&self.config.image);
        let image_exists = images
            .iter()
            .any(|img| img.repo_tags.iter().any(|tag| *tag == target));

        if image_exists {
            return Ok(());
        }

        info!("Pulling sandbox image: {}", target);

        let options = CreateImageOptions {
            from_image: target.clone(),
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!("Pull status: {}", status);
                    }
                }
                Err(e) => {
                    return Err(SandboxError::Runtime {
                        reason: format!("Failed to pull image {}: {}", target, e),
                    });
                }
            }
        }

        info!("Image {} pulled", target);
        Ok(())
    }

    fn container_config(&self, spec: &InstanceSpec) -> Config<String> {
        let credentials = &self.config.credentials;
        let env = vec![
            format!("POSTGRES_USER={}", credentials.user),
            format!("POSTGRES_PASSWORD={}", credentials.password.expose_secret()),
            format!("POSTGRES_DB={}", credentials.database),
        ];

        let exposed_ports = HashMap::from([(ENGINE_PORT.to_string(), HashMap::new())]);
        let port_bindings = HashMap::from([(
            ENGINE_PORT.to_string(),
            Some(vec![PortBinding {
                host_ip: Some(self.config.host.clone()),
                host_port: Some(spec.port.to_string()),
            }]),
        )]);

        Config {
            image: Some(self.config.image.clone()),
            env: Some(env),
            exposed_ports: Some(exposed_ports),
            labels: Some(spec.labels.clone()),
            host_config: Some(HostConfig {
                port_bindings: Some(port_bindings),
                memory: parse_memory_limit(&self.config.memory_limit),
                nano_cpus: Some((self.config.cpu_limit * 1_000_000_000.0) as i64),
                auto_remove: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

#[async_trait]
impl RuntimeController for DockerRuntime {
    async fn create(&self, spec: &InstanceSpec) -> Result<String> {
        let options = CreateContainerOptions {
            name: spec.name.as_str(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), self.container_config(spec))
            .await
            .map_err(|e| SandboxError::RuntimeCreation {
                reason: format!("Failed to create container {}: {}", spec.name, e),
            })?;

        for warning in &response.warnings {
            warn!("Docker warning for {}: {}", spec.name, warning);
        }
        debug!("Created container {} ({})", spec.name, response.id);
        Ok(response.id)
    }

    async fn start(&self, runtime_id: &str) -> Result<()> {
        self.docker
            .start_container(runtime_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| SandboxError::RuntimeCreation {
                reason: format!("Failed to start container {}: {}", short_id(runtime_id), e),
            })?;

        debug!("Started container {}", short_id(runtime_id));
        Ok(())
    }

    async fn stop(&self, runtime_id: &str) -> Result<()> {
        let options = StopContainerOptions {
            t: STOP_TIMEOUT_SECS,
        };
        match self.docker.stop_container(runtime_id, Some(options)).await {
            Ok(()) => {
                debug!("Stopped container {}", short_id(runtime_id));
                Ok(())
            }
            Err(e) if is_already_gone(&e) => {
                debug!("Container {} already stopped: {}", short_id(runtime_id), e);
                Ok(())
            }
            Err(e) => Err(SandboxError::Runtime {
                reason: format!("Failed to stop container {}: {}", short_id(runtime_id), e),
            }),
        }
    }

    async fn remove(&self, runtime_id: &str) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        match self.docker.remove_container(runtime_id, Some(options)).await {
            Ok(()) => {
                debug!("Removed container {}", short_id(runtime_id));
                Ok(())
            }
            Err(e) if is_already_gone(&e) => {
                warn!("Container {} already gone: {}", short_id(runtime_id), e);
                Ok(())
            }
            Err(e) => Err(SandboxError::Runtime {
                reason: format!("Failed to remove container {}: {}", short_id(runtime_id), e),
            }),
        }
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<RuntimeInstance>> {
        let options = ListContainersOptions {
            all: true,
            filters: HashMap::from([("name".to_string(), vec![prefix.to_string()])]),
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| SandboxError::Runtime {
                reason: format!("Failed to list containers: {}", e),
            })?;

        // Docker's name filter is a substring match
        Ok(containers
            .into_iter()
            .filter_map(|container| {
                let id = container.id?;
                let name = container
                    .names?
                    .into_iter()
                    .map(|n| n.trim_start_matches('/').to_string())
                    .find(|n| n.starts_with(prefix))?;
                Some(RuntimeInstance {
                    id,
                    name,
                    running: container.state.as_deref() == Some("running"),
                })
            })
            .collect())
    }
}

/// 404 (no such container), 304 (already stopped), 409 (removal in progress)
fn is_already_gone(err: &DockerError) -> bool {
    matches!(
        err,
        DockerError::DockerResponseServerError {
            status_code: 304 | 404 | 409,
            ..
        }
    )
}

fn short_id(runtime_id: &str) -> &str {
    runtime_id.get(..12).unwrap_or(runtime_id)
}

/// Append `:latest` when the image reference carries no tag or digest.
fn qualified_image(image: &str) -> String {
    let last_segment = image.rsplit('/').next().unwrap_or(image);
    if last_segment.contains(':') || last_segment.contains('@') {
        image.to_string()
    } else {
        format!("{}:latest", image)
    }
}

/// Parse a memory limit string (e.g., "512m", "1g") to bytes
pub fn parse_memory_limit(limit: &str) -> Option<i64> {
    let limit = limit.trim().to_lowercase();
    let (num_str, multiplier) = if let Some(n) = limit.strip_suffix("gb").or_else(|| limit.strip_suffix('g')) {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = limit.strip_suffix("mb").or_else(|| limit.strip_suffix('m')) {
        (n, 1024 * 1024)
    } else if let Some(n) = limit.strip_suffix("kb").or_else(|| limit.strip_suffix('k')) {
        (n, 1024)
    } else {
        (limit.strip_suffix('b').unwrap_or(&limit), 1)
    };

    let num: i64 = num_str.trim().parse().ok()?;
    num.checked_mul(multiplier)
}
