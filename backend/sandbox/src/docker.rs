//! Docker-backed `DeploymentDriver`: container lifecycle via the Docker Engine
//! API (`bollard`), not shelled CLI invocations, for typed error handling and
//! streaming exec access.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::models::{ContainerCreateBody, HostConfig, PortBinding};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, InspectContainerOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::Docker;
use futures::{StreamExt, TryStreamExt};
use rockhold_core::{parse_memory_size, DeploymentDriver, DeploymentSpec, ExecResult, PortMapping, Result, SandboxError};
use tracing::{debug, info, warn};

/// Fixed port the in-container agent binary listens on.
pub const AGENT_INTERNAL_PORT: u16 = 8700;

pub struct DockerDeploymentDriver {
    docker: Docker,
}

impl DockerDeploymentDriver {
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| SandboxError::Internal(anyhow::anyhow!("failed to connect to Docker daemon: {e}")))?;
        Ok(Self { docker })
    }

    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }

    fn container_name(id: &str) -> String {
        format!("rockhold-sandbox-{}", sanitize_id(id))
    }

    async fn pull_image_if_missing(&self, image: &str) -> Result<()> {
        if self.docker.inspect_image(image).await.is_ok() {
            return Ok(());
        }
        info!(image, "pulling sandbox image");
        let options = Some(CreateImageOptions {
            from_image: Some(image.to_string()),
            ..Default::default()
        });
        let mut stream = self.docker.create_image(options, None, None);
        while let Some(progress) = stream.try_next().await.map_err(|e| {
            SandboxError::LaunchFailed(format!("image_pull failed for {image}: {e}"))
        })? {
            debug!(?progress, "image pull progress");
        }
        Ok(())
    }
}

#[async_trait]
impl DeploymentDriver for DockerDeploymentDriver {
    async fn start(&self, id: &str, spec: &DeploymentSpec) -> Result<PortMapping> {
        self.pull_image_if_missing(&spec.image).await?;

        let memory_bytes = parse_memory_size(&spec.memory)
            .map_err(|e| SandboxError::InvalidArgument(e.to_string()))?;
        let cpu_quota = (spec.cpus * 100_000.0) as i64;

        let container_name = Self::container_name(id);
        let internal_port_key = format!("{}/tcp", AGENT_INTERNAL_PORT);

        let exposed_ports = vec![internal_port_key.clone()];

        let mut port_bindings = HashMap::new();
        port_bindings.insert(
            internal_port_key.clone(),
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: None,
            }]),
        );

        let env: Vec<String> = spec
            .env
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();

        let host_config = HostConfig {
            memory: Some(memory_bytes as i64),
            cpu_quota: Some(cpu_quota),
            cpu_period: Some(100_000),
            port_bindings: Some(port_bindings),
            publish_all_ports: Some(false),
            ..Default::default()
        };

        let config = ContainerCreateBody {
            image: Some(spec.image.clone()),
            env: Some(env),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            labels: Some(HashMap::from([(
                "managed-by".to_string(),
                "rockhold".to_string(),
            )])),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: Some(container_name.clone()),
            ..Default::default()
        };

        self.docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| SandboxError::LaunchFailed(format!("docker_run create failed: {e}")))?;

        self.docker
            .start_container(&container_name, None::<StartContainerOptions>)
            .await
            .map_err(|e| {
                if e.to_string().to_lowercase().contains("no space") {
                    SandboxError::ResourceExhausted(format!("docker_run start failed: {e}"))
                } else {
                    SandboxError::LaunchFailed(format!("docker_run start failed: {e}"))
                }
            })?;

        let inspect = self
            .docker
            .inspect_container(&container_name, None::<InspectContainerOptions>)
            .await
            .map_err(|e| SandboxError::LaunchFailed(format!("inspect after start failed: {e}")))?;

        let mut mapping = PortMapping::new();
        if let Some(ports) = inspect.network_settings.and_then(|n| n.ports) {
            if let Some(Some(bindings)) = ports.get(&internal_port_key) {
                if let Some(binding) = bindings.first() {
                    if let Some(host_port) = &binding.host_port {
                        if let Ok(port) = host_port.parse::<u16>() {
                            mapping.insert(AGENT_INTERNAL_PORT, port);
                        }
                    }
                }
            }
        }
        if mapping.is_empty() {
            return Err(SandboxError::LaunchFailed(
                "docker_run succeeded but no host port was bound for the agent port".to_string(),
            ));
        }

        info!(sandbox_id = id, container = %container_name, ?mapping, "sandbox container started");
        Ok(mapping)
    }

    async fn stop(&self, id: &str) -> Result<()> {
        let container_name = Self::container_name(id);
        let _ = self
            .docker
            .stop_container(&container_name, None::<StopContainerOptions>)
            .await;
        match self
            .docker
            .remove_container(
                &container_name,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(()) => {}
            Err(e) if e.to_string().contains("404") => {}
            Err(e) => warn!(sandbox_id = id, error = %e, "container removal failed, treating stop as best-effort"),
        }
        Ok(())
    }

    async fn exec(&self, id: &str, cmd: &str) -> Result<ExecResult> {
        let container_name = Self::container_name(id);
        let exec_options = CreateExecOptions {
            cmd: Some(vec!["sh".to_string(), "-c".to_string(), cmd.to_string()]),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(&container_name, exec_options)
            .await
            .map_err(|e| SandboxError::Internal(anyhow::anyhow!("create_exec failed: {e}")))?;

        let start_result = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| SandboxError::Internal(anyhow::anyhow!("start_exec failed: {e}")))?;

        let mut stdout = String::new();
        let mut stderr = String::new();
        if let StartExecResults::Attached { mut output, .. } = start_result {
            while let Some(msg) = output.next().await {
                match msg {
                    Ok(LogOutput::StdOut { message }) => stdout.push_str(&String::from_utf8_lossy(&message)),
                    Ok(LogOutput::StdErr { message }) => stderr.push_str(&String::from_utf8_lossy(&message)),
                    Ok(_) => {}
                    Err(e) => {
                        stderr.push_str(&format!("\n[exec stream error: {e}]"));
                        break;
                    }
                }
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| SandboxError::Internal(anyhow::anyhow!("inspect_exec failed: {e}")))?;

        Ok(ExecResult {
            exit_code: inspect.exit_code.unwrap_or(-1),
            stdout,
            stderr,
            timed_out: false,
        })
    }

    async fn is_available(&self) -> bool {
        self.docker.ping().await.is_ok()
    }
}

fn sanitize_id(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}
