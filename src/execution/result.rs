//! Results of sandboxed executions.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::workspace::SessionId;

/// Prefix of every diagnostic produced when the isolation layer itself fails.
pub const EXECUTION_ERROR_PREFIX: &str = "Execution Error: ";

/// How a sandboxed execution ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// The script ran to completion and exited with `exit_code`.
    Completed { exit_code: i64 },
    /// The sandbox killed the script for exceeding its memory ceiling.
    MemoryExceeded,
    /// The script exceeded its wall-clock bound and was killed.
    TimedOut { after_secs: u64 },
    /// The isolation layer failed before or while running the script.
    InfrastructureError,
}

impl ExecutionOutcome {
    /// Short label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ExecutionOutcome::Completed { .. } => "completed",
            ExecutionOutcome::MemoryExceeded => "memory_exceeded",
            ExecutionOutcome::TimedOut { .. } => "timed_out",
            ExecutionOutcome::InfrastructureError => "infrastructure_error",
        }
    }
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionOutcome::Completed { exit_code } => write!(f, "completed (exit {})", exit_code),
            ExecutionOutcome::MemoryExceeded => write!(f, "memory limit exceeded"),
            ExecutionOutcome::TimedOut { after_secs } => write!(f, "timed out after {}s", after_secs),
            ExecutionOutcome::InfrastructureError => write!(f, "infrastructure error"),
        }
    }
}

/// Captured output of one sandboxed execution. Immutable once built.
///
/// The output is evidence for downstream stages, never a verdict: a script
/// printing "success" does not make the execution succeed.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    session_id: SessionId,
    output: String,
    outcome: ExecutionOutcome,
    duration_ms: u64,
    finished_at: DateTime<Utc>,
}

impl ExecutionResult {
    /// Creates a result with an explicit outcome.
    pub fn new(
        session_id: SessionId,
        output: impl Into<String>,
        outcome: ExecutionOutcome,
        duration: Duration,
    ) -> Self {
        Self {
            session_id,
            output: output.into(),
            outcome,
            duration_ms: duration.as_millis() as u64,
            finished_at: Utc::now(),
        }
    }

    /// Creates a result for a failure of the isolation layer itself.
    ///
    /// The output is a diagnostic beginning with [`EXECUTION_ERROR_PREFIX`].
    pub fn infrastructure_error(
        session_id: SessionId,
        error: impl fmt::Display,
        duration: Duration,
    ) -> Self {
        Self::new(
            session_id,
            format!("{}{}", EXECUTION_ERROR_PREFIX, error),
            ExecutionOutcome::InfrastructureError,
            duration,
        )
    }

    /// Returns the originating session.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Returns the combined stdout/stderr text (may be empty).
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Returns how the execution ended.
    pub fn outcome(&self) -> &ExecutionOutcome {
        &self.outcome
    }

    /// Returns the wall-clock duration in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// Returns when the result was captured.
    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    /// True only when the script ran to completion with exit code zero.
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, ExecutionOutcome::Completed { exit_code: 0 })
    }
}
