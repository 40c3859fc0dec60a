//! Docker API wrapper using the bollard crate.
//!
//! This module provides the container operations the isolation backend
//! needs: create a hardened one-shot container, run it to completion,
//! capture its combined output, and destroy it.

use std::collections::HashMap;

use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, KillContainerOptions, LogOutput,
    LogsOptions, RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use futures::StreamExt;

use crate::error::DockerError;
use crate::execution::resources::ExecutionLimits;

/// Mount point of the session workspace inside the container.
pub const CONTAINER_WORKDIR: &str = "/workspace";

/// Size of the scratch tmpfs mounted at `/tmp`.
const TMPFS_OPTIONS: &str = "rw,noexec,nosuid,size=256m";

/// Configuration for creating a one-shot sandbox container.
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    /// Unique name for the container.
    pub name: String,
    /// Docker image to use.
    pub image: String,
    /// Command to run in the container.
    pub cmd: Vec<String>,
    /// Environment variables (`KEY=value`).
    pub env: Vec<String>,
    /// Working directory inside the container.
    pub working_dir: String,
    /// Resource limits for the container.
    pub limits: ExecutionLimits,
    /// Bind mounts (`host:container[:mode]` format).
    pub binds: Vec<String>,
    /// Network mode (e.g., "none", "bridge").
    pub network_mode: String,
    /// Whether the container root filesystem is read-only.
    pub readonly_rootfs: bool,
    /// User to run as (`uid:gid`), `None` for the image default.
    pub user: Option<String>,
}

impl ContainerConfig {
    /// Creates a locked-down configuration: no network, read-only root
    /// filesystem, and the working directory at [`CONTAINER_WORKDIR`].
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            cmd: Vec::new(),
            env: vec![
                "HOME=/tmp".to_string(),
                "PYTHONUNBUFFERED=1".to_string(),
                "PYTHONDONTWRITEBYTECODE=1".to_string(),
            ],
            working_dir: CONTAINER_WORKDIR.to_string(),
            limits: ExecutionLimits::default(),
            binds: Vec::new(),
            network_mode: "none".to_string(),
            readonly_rootfs: true,
            user: None,
        }
    }

    /// Sets explicit resource limits.
    pub fn with_limits(mut self, limits: ExecutionLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Sets the command to run in the container.
    pub fn with_cmd(mut self, cmd: Vec<String>) -> Self {
        self.cmd = cmd;
        self
    }

    /// Sets the user to run as.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Binds `host_dir` read-write at [`CONTAINER_WORKDIR`].
    pub fn with_workspace(mut self, host_dir: &std::path::Path) -> Self {
        self.binds
            .push(format!("{}:{}:rw", host_dir.display(), CONTAINER_WORKDIR));
        self
    }

    /// Builds the bollard container configuration.
    fn container_config(&self) -> Config<String> {
        Config {
            image: Some(self.image.clone()),
            cmd: Some(self.cmd.clone()),
            env: Some(self.env.clone()),
            working_dir: Some(self.working_dir.clone()),
            user: self.user.clone(),
            host_config: Some(self.host_config()),
            network_disabled: Some(self.network_mode == "none"),
            tty: Some(false),
            attach_stdin: Some(false),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        }
    }

    /// Builds the bollard host configuration.
    fn host_config(&self) -> HostConfig {
        let mut tmpfs = HashMap::new();
        tmpfs.insert("/tmp".to_string(), TMPFS_OPTIONS.to_string());

        HostConfig {
            memory: Some(self.limits.memory_bytes()),
            // Equal to memory: no swap headroom past the ceiling.
            memory_swap: Some(self.limits.memory_bytes()),
            cpu_period: Some(self.limits.cpu_period()),
            cpu_quota: Some(self.limits.cpu_quota()),
            pids_limit: Some(self.limits.pids_limit()),
            network_mode: Some(self.network_mode.clone()),
            binds: if self.binds.is_empty() {
                None
            } else {
                Some(self.binds.clone())
            },
            readonly_rootfs: Some(self.readonly_rootfs),
            tmpfs: Some(tmpfs),
            cap_drop: Some(vec!["ALL".to_string()]),
            security_opt: Some(vec!["no-new-privileges".to_string()]),
            ..Default::default()
        }
    }
}

/// Docker client wrapper for sandbox container operations.
pub struct DockerClient {
    docker: Docker,
}

impl DockerClient {
    /// Creates a new Docker client connecting to the local Docker daemon.
    ///
    /// # Errors
    ///
    /// Returns `DockerError::DaemonUnavailable` if the Docker daemon is not accessible.
    pub fn new() -> Result<Self, DockerError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| DockerError::DaemonUnavailable(format!("Failed to connect: {e}")))?;

        Ok(Self { docker })
    }

    /// Creates a new Docker client from an existing bollard Docker instance.
    pub fn from_docker(docker: Docker) -> Self {
        Self { docker }
    }

    /// Checks that the daemon answers.
    pub async fn ping(&self) -> Result<(), DockerError> {
        self.docker
            .ping()
            .await
            .map_err(|e| DockerError::DaemonUnavailable(e.to_string()))?;
        Ok(())
    }

    /// Creates a new container with the given configuration.
    ///
    /// # Returns
    ///
    /// The container ID on success.
    pub async fn create_container(&self, config: &ContainerConfig) -> Result<String, DockerError> {
        let options = CreateContainerOptions {
            name: config.name.clone(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), config.container_config())
            .await
            .map_err(|e| DockerError::RunFailed(format!("Failed to create container: {e}")))?;

        Ok(response.id)
    }

    /// Starts a container by ID.
    pub async fn start_container(&self, id: &str) -> Result<(), DockerError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| DockerError::RunFailed(format!("Failed to start container: {e}")))?;

        Ok(())
    }

    /// Sends SIGKILL to a running container.
    pub async fn kill_container(&self, id: &str) -> Result<(), DockerError> {
        let options = KillContainerOptions { signal: "SIGKILL" };

        self.docker
            .kill_container(id, Some(options))
            .await
            .map_err(|e| DockerError::RunFailed(format!("Failed to kill container: {e}")))?;

        Ok(())
    }

    /// Removes a container by ID.
    ///
    /// # Arguments
    ///
    /// * `id` - Container ID
    /// * `force` - Force removal even if running
    pub async fn remove_container(&self, id: &str, force: bool) -> Result<(), DockerError> {
        let options = RemoveContainerOptions {
            force,
            v: true, // Remove anonymous volumes
            ..Default::default()
        };

        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| DockerError::RunFailed(format!("Failed to remove container: {e}")))?;

        Ok(())
    }

    /// Waits for a container to stop running.
    ///
    /// # Returns
    ///
    /// The exit code of the container. A non-zero exit is a normal result
    /// here, not an error.
    pub async fn wait_container(&self, id: &str) -> Result<i64, DockerError> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };

        let mut stream = self.docker.wait_container(id, Some(options));

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports non-zero exits as an error carrying the code.
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(DockerError::RunFailed(format!(
                "Error waiting for container: {e}"
            ))),
            None => Err(DockerError::RunFailed(
                "Container wait stream ended without a status".to_string(),
            )),
        }
    }

    /// Gets logs from a container.
    ///
    /// # Returns
    ///
    /// Combined stdout and stderr, in the order the daemon delivered them.
    pub async fn get_logs(&self, id: &str) -> Result<String, DockerError> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: false,
            timestamps: false,
            ..Default::default()
        };

        let mut logs = self.docker.logs(id, Some(options));
        let mut output = String::new();

        while let Some(chunk) = logs.next().await {
            match chunk {
                Ok(LogOutput::StdOut { message })
                | Ok(LogOutput::StdErr { message })
                | Ok(LogOutput::Console { message }) => {
                    output.push_str(&String::from_utf8_lossy(&message));
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(DockerError::LogsFailed(e.to_string()));
                }
            }
        }

        Ok(output)
    }

    /// Returns true when the daemon reports the container was OOM-killed.
    pub async fn oom_killed(&self, id: &str) -> Result<bool, DockerError> {
        let info = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| {
                if e.to_string().contains("No such container") {
                    DockerError::ContainerNotFound { id: id.to_string() }
                } else {
                    DockerError::RunFailed(format!("Failed to inspect container: {e}"))
                }
            })?;

        Ok(info
            .state
            .and_then(|state| state.oom_killed)
            .unwrap_or(false))
    }

    /// Pulls a Docker image from a registry.
    ///
    /// # Arguments
    ///
    /// * `image` - Image name with optional tag (e.g., "pytorch/pytorch:latest")
    pub async fn pull_image(&self, image: &str) -> Result<(), DockerError> {
        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            result.map_err(|e| DockerError::ImagePullFailed {
                image: image.to_string(),
                reason: e.to_string(),
            })?;
        }

        Ok(())
    }

    /// Checks if an image exists locally.
    pub async fn image_exists(&self, image: &str) -> bool {
        self.docker.inspect_image(image).await.is_ok()
    }
}
