//! Isolation runner: stages untrusted code into a workspace and executes it.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};
use uuid::Uuid;

use crate::execution::backend::{ExecutionSpec, IsolationBackend, RawExecution};
use crate::execution::resources::ExecutionLimits;
use crate::execution::result::{ExecutionOutcome, ExecutionResult};
use crate::metrics;
use crate::workspace::{SessionId, Workspace};

/// Extra time granted to a backend past the script's own timeout before
/// the runner gives up on it.
const BACKSTOP_GRACE: Duration = Duration::from_secs(30);

/// Runs untrusted scripts through an [`IsolationBackend`].
///
/// `run` never fails: every failure of the isolation layer is folded into
/// an [`ExecutionResult`] with a diagnostic output.
#[derive(Clone)]
pub struct IsolationRunner {
    backend: Arc<dyn IsolationBackend>,
    image: String,
}

impl IsolationRunner {
    /// Creates a runner using `backend` and the given runtime image.
    pub fn new(backend: Arc<dyn IsolationBackend>, image: impl Into<String>) -> Self {
        Self {
            backend,
            image: image.into(),
        }
    }

    /// Returns the runtime image.
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Writes `code` into a single file in `workspace`, runs it under
    /// `limits`, and captures the combined output.
    ///
    /// The staged file is removed before returning, on every path.
    pub async fn run(
        &self,
        code: &str,
        workspace: &Workspace,
        limits: &ExecutionLimits,
    ) -> ExecutionResult {
        let started = Instant::now();
        let session_id = workspace.session_id().clone();
        let script_name = format!("verify_{}.py", Uuid::new_v4().simple());

        let script_path = match workspace.write_file(&script_name, code) {
            Ok(path) => path,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Failed to stage script");
                return self.finish(ExecutionResult::infrastructure_error(
                    session_id,
                    e,
                    started.elapsed(),
                ));
            }
        };

        let spec = ExecutionSpec {
            session_id: session_id.clone(),
            workspace_dir: workspace.path().to_path_buf(),
            script_name,
            image: self.image.clone(),
            limits: limits.clone(),
        };

        let backstop = limits.timeout().saturating_add(BACKSTOP_GRACE);
        let result = match tokio::time::timeout(backstop, self.backend.execute(&spec)).await {
            Ok(Ok(raw)) => classify(session_id, raw, limits, started.elapsed()),
            Ok(Err(e)) => {
                warn!(session_id = %session_id, error = %e, "Isolation layer failed");
                ExecutionResult::infrastructure_error(session_id, e, started.elapsed())
            }
            Err(_) => {
                warn!(
                    session_id = %session_id,
                    backstop_secs = backstop.as_secs(),
                    "Isolation backend did not return in time, abandoning execution"
                );
                ExecutionResult::new(
                    session_id,
                    String::new(),
                    ExecutionOutcome::TimedOut {
                        after_secs: limits.timeout_seconds,
                    },
                    started.elapsed(),
                )
            }
        };

        remove_script(&script_path, result.session_id());
        self.finish(result)
    }

    fn finish(&self, result: ExecutionResult) -> ExecutionResult {
        metrics::record_execution(
            result.outcome().label(),
            result.duration_ms() as f64 / 1000.0,
        );
        info!(
            session_id = %result.session_id(),
            outcome = %result.outcome(),
            duration_ms = result.duration_ms(),
            output_bytes = result.output().len(),
            "Execution finished"
        );
        result
    }
}

/// Maps what the backend observed onto an outcome kind.
fn classify(
    session_id: SessionId,
    raw: RawExecution,
    limits: &ExecutionLimits,
    elapsed: Duration,
) -> ExecutionResult {
    let outcome = if raw.timed_out {
        ExecutionOutcome::TimedOut {
            after_secs: limits.timeout_seconds,
        }
    } else if raw.oom_killed {
        ExecutionOutcome::MemoryExceeded
    } else {
        ExecutionOutcome::Completed {
            exit_code: raw.exit_code.unwrap_or(-1),
        }
    };

    ExecutionResult::new(session_id, raw.output, outcome, elapsed)
}

fn remove_script(path: &Path, session_id: &SessionId) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(
            session_id = %session_id,
            path = %path.display(),
            error = %e,
            "Failed to remove staged script"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DockerError;
    use crate::execution::result::EXECUTION_ERROR_PREFIX;
    use crate::workspace::WorkspaceManager;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records the staged script and replies with a canned execution.
    struct ScriptedBackend {
        reply: Result<RawExecution, String>,
        seen: Mutex<Option<(String, String)>>,
    }

    impl ScriptedBackend {
        fn new(reply: Result<RawExecution, String>) -> Self {
            Self {
                reply,
                seen: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl IsolationBackend for ScriptedBackend {
        async fn execute(&self, spec: &ExecutionSpec) -> Result<RawExecution, DockerError> {
            let staged = fs::read_to_string(spec.workspace_dir.join(&spec.script_name))
                .unwrap_or_default();
            *self.seen.lock().unwrap() = Some((spec.script_name.clone(), staged));
            match &self.reply {
                Ok(raw) => Ok(raw.clone()),
                Err(msg) => Err(DockerError::DaemonUnavailable(msg.clone())),
            }
        }
    }

    struct HangingBackend;

    #[async_trait]
    impl IsolationBackend for HangingBackend {
        async fn execute(&self, _spec: &ExecutionSpec) -> Result<RawExecution, DockerError> {
            tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
            Ok(RawExecution::default())
        }
    }

    fn staged_files(workspace: &Workspace) -> usize {
        fs::read_dir(workspace.path()).unwrap().count()
    }

    #[tokio::test]
    async fn test_run_captures_output_and_removes_script() {
        let temp = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(temp.path());
        let workspace = manager.acquire(&SessionId::generate()).unwrap();
        let backend = Arc::new(ScriptedBackend::new(Ok(RawExecution {
            output: "LOSS_START: 0.9\nLOSS_END: 0.1\n".to_string(),
            exit_code: Some(0),
            ..Default::default()
        })));
        let runner = IsolationRunner::new(backend.clone(), "python:3.11-slim");

        let result = runner
            .run("print('hi')", &workspace, &ExecutionLimits::default())
            .await;

        assert!(result.succeeded());
        assert_eq!(result.output(), "LOSS_START: 0.9\nLOSS_END: 0.1\n");
        assert_eq!(result.session_id(), workspace.session_id());

        let (script_name, staged) = backend.seen.lock().unwrap().clone().unwrap();
        assert!(script_name.starts_with("verify_"));
        assert!(script_name.ends_with(".py"));
        assert_eq!(staged, "print('hi')");
        assert_eq!(staged_files(&workspace), 0);

        manager.release(&workspace);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_completed_not_error() {
        let temp = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(temp.path());
        let workspace = manager.acquire(&SessionId::generate()).unwrap();
        let backend = Arc::new(ScriptedBackend::new(Ok(RawExecution {
            output: "SyntaxError: invalid syntax".to_string(),
            exit_code: Some(1),
            ..Default::default()
        })));
        let runner = IsolationRunner::new(backend, "python:3.11-slim");

        let result = runner
            .run("def (", &workspace, &ExecutionLimits::default())
            .await;

        assert!(!result.succeeded());
        assert_eq!(
            result.outcome(),
            &ExecutionOutcome::Completed { exit_code: 1 }
        );
        manager.release(&workspace);
    }

    #[tokio::test]
    async fn test_infrastructure_failure_becomes_diagnostic() {
        let temp = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(temp.path());
        let workspace = manager.acquire(&SessionId::generate()).unwrap();
        let backend = Arc::new(ScriptedBackend::new(Err("connection refused".to_string())));
        let runner = IsolationRunner::new(backend, "python:3.11-slim");

        let result = runner
            .run("print(1)", &workspace, &ExecutionLimits::default())
            .await;

        assert!(result.output().starts_with(EXECUTION_ERROR_PREFIX));
        assert!(result.output().contains("connection refused"));
        assert_eq!(result.outcome(), &ExecutionOutcome::InfrastructureError);
        assert_eq!(staged_files(&workspace), 0);
        manager.release(&workspace);
    }

    #[tokio::test]
    async fn test_timeout_and_oom_classification() {
        let temp = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(temp.path());
        let workspace = manager.acquire(&SessionId::generate()).unwrap();
        let limits = ExecutionLimits::default().with_timeout_seconds(7);

        let timed_out = IsolationRunner::new(
            Arc::new(ScriptedBackend::new(Ok(RawExecution {
                output: "LOSS_START: 2.0\n".to_string(),
                timed_out: true,
                ..Default::default()
            }))),
            "img",
        )
        .run("while True: pass", &workspace, &limits)
        .await;
        assert_eq!(
            timed_out.outcome(),
            &ExecutionOutcome::TimedOut { after_secs: 7 }
        );
        assert_eq!(timed_out.output(), "LOSS_START: 2.0\n");

        let oom = IsolationRunner::new(
            Arc::new(ScriptedBackend::new(Ok(RawExecution {
                output: "Killed".to_string(),
                exit_code: Some(137),
                oom_killed: true,
                ..Default::default()
            }))),
            "img",
        )
        .run("x = ' ' * 10**12", &workspace, &limits)
        .await;
        assert_eq!(oom.outcome(), &ExecutionOutcome::MemoryExceeded);

        manager.release(&workspace);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backstop_abandons_hung_backend() {
        let temp = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(temp.path());
        let workspace = manager.acquire(&SessionId::generate()).unwrap();
        let runner = IsolationRunner::new(Arc::new(HangingBackend), "img");
        let limits = ExecutionLimits::default().with_timeout_seconds(1);

        let result = runner.run("import time", &workspace, &limits).await;

        assert_eq!(
            result.outcome(),
            &ExecutionOutcome::TimedOut { after_secs: 1 }
        );
        assert!(result.output().is_empty());
        assert_eq!(staged_files(&workspace), 0);
        manager.release(&workspace);
    }

    #[tokio::test]
    async fn test_unbounded_timeout_does_not_overflow_backstop() {
        let temp = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(temp.path());
        let workspace = manager.acquire(&SessionId::generate()).unwrap();
        let backend = Arc::new(ScriptedBackend::new(Ok(RawExecution {
            exit_code: Some(0),
            ..Default::default()
        })));
        let runner = IsolationRunner::new(backend, "img");
        let limits = ExecutionLimits::default().with_timeout_seconds(u64::MAX);

        let result = runner.run("print(1)", &workspace, &limits).await;

        assert_eq!(result.outcome(), &ExecutionOutcome::Completed { exit_code: 0 });
        manager.release(&workspace);
    }

    #[tokio::test]
    async fn test_missing_workspace_is_infrastructure_error() {
        let temp = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(temp.path());
        let workspace = manager.acquire(&SessionId::generate()).unwrap();
        fs::remove_dir_all(workspace.path()).unwrap();
        let backend = Arc::new(ScriptedBackend::new(Ok(RawExecution::default())));
        let runner = IsolationRunner::new(backend.clone(), "img");

        let result = runner
            .run("print(1)", &workspace, &ExecutionLimits::default())
            .await;

        assert_eq!(result.outcome(), &ExecutionOutcome::InfrastructureError);
        assert!(result.output().starts_with(EXECUTION_ERROR_PREFIX));
        assert!(backend.seen.lock().unwrap().is_none());
        manager.release(&workspace);
    }
}
