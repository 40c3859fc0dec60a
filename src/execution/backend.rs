//! Isolation backends.
//!
//! [`IsolationBackend`] is the seam between the runner and the sandboxing
//! runtime. The production implementation is [`DockerBackend`]; tests
//! substitute an in-memory fake.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::DockerError;
use crate::execution::docker_client::{ContainerConfig, DockerClient, CONTAINER_WORKDIR};
use crate::execution::resources::ExecutionLimits;
use crate::workspace::SessionId;

/// Interpreter used to run the staged script.
const SCRIPT_INTERPRETER: &str = "python";

/// Non-root identity used when the workspace owner cannot be reused.
const FALLBACK_SANDBOX_USER: &str = "1000:1000";

/// Everything a backend needs to run one staged script.
#[derive(Debug, Clone)]
pub struct ExecutionSpec {
    /// Session that owns the workspace.
    pub session_id: SessionId,
    /// Absolute host path of the workspace directory.
    pub workspace_dir: PathBuf,
    /// Bare file name of the script inside the workspace.
    pub script_name: String,
    /// Runtime image.
    pub image: String,
    /// Resource limits, including the wall-clock bound.
    pub limits: ExecutionLimits,
}

impl ExecutionSpec {
    /// Command line that runs the script inside the sandbox.
    pub fn command(&self) -> Vec<String> {
        vec![
            SCRIPT_INTERPRETER.to_string(),
            format!("{}/{}", CONTAINER_WORKDIR, self.script_name),
        ]
    }
}

/// What a backend observed while running a script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawExecution {
    /// Combined stdout/stderr, possibly partial when timed out.
    pub output: String,
    /// Exit code, absent when the process was killed on timeout.
    pub exit_code: Option<i64>,
    /// The runtime reported an out-of-memory kill.
    pub oom_killed: bool,
    /// The wall-clock bound elapsed and the sandbox was killed.
    pub timed_out: bool,
}

/// A sandboxing runtime able to run one script with no durable side effects.
///
/// Implementations must enforce `spec.limits` (memory and wall clock) and
/// destroy the sandbox instance before returning, on every path. Errors are
/// reserved for failures of the runtime itself; a script that crashes is a
/// normal `RawExecution` with a non-zero exit code.
#[async_trait]
pub trait IsolationBackend: Send + Sync {
    /// Runs the staged script described by `spec`.
    async fn execute(&self, spec: &ExecutionSpec) -> Result<RawExecution, DockerError>;
}

/// Isolation backend running each script in a fresh Docker container.
pub struct DockerBackend {
    client: Arc<DockerClient>,
}

impl DockerBackend {
    /// Creates a backend connected to the local Docker daemon.
    pub fn connect() -> Result<Self, DockerError> {
        Ok(Self::new(Arc::new(DockerClient::new()?)))
    }

    /// Creates a backend from an existing client.
    pub fn new(client: Arc<DockerClient>) -> Self {
        Self { client }
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &DockerClient {
        &self.client
    }

    async fn ensure_image(&self, image: &str) -> Result<(), DockerError> {
        if !self.client.image_exists(image).await {
            info!(image = %image, "Pulling runtime image");
            self.client.pull_image(image).await?;
        }
        Ok(())
    }

    /// Starts the container, waits with the wall-clock bound, and captures output.
    async fn run_container(
        &self,
        id: &str,
        spec: &ExecutionSpec,
    ) -> Result<RawExecution, DockerError> {
        self.client.start_container(id).await?;

        let waited =
            tokio::time::timeout(spec.limits.timeout(), self.client.wait_container(id)).await;

        let (exit_code, timed_out) = match waited {
            Ok(code) => (Some(code?), false),
            Err(_) => {
                warn!(
                    session_id = %spec.session_id,
                    timeout_secs = spec.limits.timeout_seconds,
                    "Execution timed out, killing container"
                );
                if let Err(e) = self.client.kill_container(id).await {
                    warn!(session_id = %spec.session_id, error = %e, "Failed to kill container");
                }
                (None, true)
            }
        };

        let output = output_after_run(self.client.get_logs(id).await, timed_out, spec)?;

        let oom_killed = if timed_out {
            false
        } else {
            match self.client.oom_killed(id).await {
                Ok(killed) => killed,
                Err(e) => {
                    warn!(session_id = %spec.session_id, error = %e, "Failed to inspect container state");
                    false
                }
            }
        };

        Ok(RawExecution {
            output,
            exit_code,
            oom_killed,
            timed_out,
        })
    }
}

#[async_trait]
impl IsolationBackend for DockerBackend {
    async fn execute(&self, spec: &ExecutionSpec) -> Result<RawExecution, DockerError> {
        self.ensure_image(&spec.image).await?;

        let config = ContainerConfig::new(format!("r2r-{}", spec.session_id), &spec.image)
            .with_limits(spec.limits.clone())
            .with_workspace(&spec.workspace_dir)
            .with_user(sandbox_user(&spec.workspace_dir))
            .with_cmd(spec.command());

        let id = self.client.create_container(&config).await?;
        debug!(session_id = %spec.session_id, container = %id, "Container created");

        let result = self.run_container(&id, spec).await;

        // The container is destroyed whether the script exited zero,
        // non-zero, timed out, or the runtime failed mid-run.
        if let Err(e) = self.client.remove_container(&id, true).await {
            warn!(session_id = %spec.session_id, container = %id, error = %e, "Failed to remove container");
        }

        result
    }
}

/// Keeps a timed-out run classified as such when its logs cannot be read.
fn output_after_run(
    logs: Result<String, DockerError>,
    timed_out: bool,
    spec: &ExecutionSpec,
) -> Result<String, DockerError> {
    match logs {
        Ok(output) => Ok(output),
        Err(e) if timed_out => {
            warn!(session_id = %spec.session_id, error = %e, "Failed to read logs of killed container");
            Ok(String::new())
        }
        Err(e) => Err(e),
    }
}

/// Runs the sandbox as the workspace owner so the host can delete whatever
/// the script leaves behind. A root-owned workspace falls back to a fixed
/// unprivileged id.
#[cfg(unix)]
fn sandbox_user(workspace_dir: &Path) -> String {
    use std::os::unix::fs::MetadataExt;

    match std::fs::metadata(workspace_dir) {
        Ok(meta) if meta.uid() != 0 => format!("{}:{}", meta.uid(), meta.gid()),
        _ => FALLBACK_SANDBOX_USER.to_string(),
    }
}

#[cfg(not(unix))]
fn sandbox_user(_workspace_dir: &Path) -> String {
    FALLBACK_SANDBOX_USER.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_for(workspace_dir: PathBuf) -> ExecutionSpec {
        ExecutionSpec {
            session_id: SessionId::generate(),
            workspace_dir,
            script_name: "verify_abc.py".to_string(),
            image: "pytorch/pytorch:latest".to_string(),
            limits: ExecutionLimits::default(),
        }
    }

    #[test]
    fn test_spec_command_targets_workspace() {
        let spec = ExecutionSpec {
            session_id: SessionId::generate(),
            workspace_dir: PathBuf::from("/var/tmp/r2r/session-x"),
            script_name: "verify_abc.py".to_string(),
            image: "pytorch/pytorch:latest".to_string(),
            limits: ExecutionLimits::default(),
        };

        assert_eq!(
            spec.command(),
            vec!["python".to_string(), "/workspace/verify_abc.py".to_string()]
        );
    }

    #[test]
    fn test_log_failure_after_timeout_keeps_empty_output() {
        let spec = spec_for(PathBuf::from("/var/tmp/r2r/session-x"));

        let output = output_after_run(
            Err(DockerError::LogsFailed("container is gone".to_string())),
            true,
            &spec,
        )
        .unwrap();
        assert!(output.is_empty());

        let completed = output_after_run(
            Err(DockerError::LogsFailed("container is gone".to_string())),
            false,
            &spec,
        );
        assert!(matches!(completed, Err(DockerError::LogsFailed(_))));

        let partial = output_after_run(Ok("LOSS_START: 1.0\n".to_string()), true, &spec).unwrap();
        assert_eq!(partial, "LOSS_START: 1.0\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_sandbox_user_is_never_root() {
        use std::os::unix::fs::MetadataExt;

        let temp = tempfile::TempDir::new().unwrap();
        let meta = std::fs::metadata(temp.path()).unwrap();
        let user = sandbox_user(temp.path());

        if meta.uid() == 0 {
            assert_eq!(user, FALLBACK_SANDBOX_USER);
        } else {
            assert_eq!(user, format!("{}:{}", meta.uid(), meta.gid()));
        }
        assert_eq!(
            sandbox_user(Path::new("/nonexistent/r2r/session-x")),
            FALLBACK_SANDBOX_USER
        );
    }

    #[test]
    fn test_raw_execution_default() {
        let raw = RawExecution::default();
        assert!(raw.output.is_empty());
        assert_eq!(raw.exit_code, None);
        assert!(!raw.oom_killed);
        assert!(!raw.timed_out);
    }
}
