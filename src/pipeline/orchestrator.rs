//! Verification pipeline orchestrator.
//!
//! Sequences one session end to end:
//! acquire workspace → run → extract → judge → aggregate → release.
//!
//! [`VerificationPipeline::verify`] is the single failure boundary. It never
//! returns an error and never panics outward; every failure becomes a
//! [`PipelineResponse::Error`] carrying the session id and a message.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use crate::error::{ConfigError, JudgeError, WorkspaceError};
use crate::execution::{ExecutionLimits, ExecutionOutcome, ExecutionResult, IsolationRunner};
use crate::judge::{Judge, JudgeInput};
use crate::metrics;
use crate::verification::{aggregate_text, extract, FinalVerdict, NumericProof, VerdictLabel};
use crate::workspace::{SessionId, Workspace, WorkspaceManager};

use super::config::{validate_limits, PipelineConfig};

/// Errors that end a session without a verdict.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The per-request limits were rejected.
    #[error("Invalid execution limits: {0}")]
    InvalidLimits(#[source] ConfigError),

    /// The session workspace could not be prepared.
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    /// The qualitative judge failed.
    #[error(transparent)]
    Judge(#[from] JudgeError),

    /// A stage panicked.
    #[error("Pipeline stage panicked: {0}")]
    Panicked(String),
}

/// Input for one verification session.
#[derive(Debug, Clone, Default)]
pub struct VerificationRequest {
    /// Untrusted program text.
    pub code: String,
    /// Description of the claim, handed to the judge as context.
    pub summary: String,
    /// Limits for this run; the pipeline defaults apply when absent.
    pub limits: Option<ExecutionLimits>,
}

impl VerificationRequest {
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            limits: None,
        }
    }

    pub fn with_limits(mut self, limits: ExecutionLimits) -> Self {
        self.limits = Some(limits);
        self
    }
}

/// Text artifact of a single stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepContent {
    pub content: String,
}

impl StepContent {
    fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Intermediate artifacts, in stage order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSteps {
    /// The claim summary.
    pub researcher: StepContent,
    /// The code that was executed.
    pub coder: StepContent,
    /// Captured execution output.
    pub execution: StepContent,
    /// Judge text.
    pub verifier: StepContent,
}

/// Verdict and evidence summary of a completed session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportMetadata {
    pub session_id: SessionId,
    pub is_authentic: bool,
    pub verdict_label: VerdictLabel,
    pub loss_start: Option<f64>,
    pub loss_end: Option<f64>,
    pub execution_outcome: ExecutionOutcome,
    pub execution_duration_ms: u64,
}

/// Complete result of a successful session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationReport {
    pub metadata: ReportMetadata,
    pub steps: ReportSteps,
}

impl VerificationReport {
    fn build(
        request: &VerificationRequest,
        execution: &ExecutionResult,
        proof: NumericProof,
        judge_text: String,
        verdict: &FinalVerdict,
    ) -> Self {
        Self {
            metadata: ReportMetadata {
                session_id: execution.session_id().clone(),
                is_authentic: verdict.is_authentic,
                verdict_label: verdict.label,
                loss_start: proof.start,
                loss_end: proof.end,
                execution_outcome: execution.outcome().clone(),
                execution_duration_ms: execution.duration_ms(),
            },
            steps: ReportSteps {
                researcher: StepContent::new(request.summary.as_str()),
                coder: StepContent::new(request.code.as_str()),
                execution: StepContent::new(execution.output()),
                verifier: StepContent::new(judge_text),
            },
        }
    }
}

/// What the caller receives: a full report or a single error object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineResponse {
    Success(VerificationReport),
    Error {
        session_id: SessionId,
        message: String,
    },
}

impl PipelineResponse {
    /// `"success"` or `"error"`.
    pub fn status(&self) -> &'static str {
        match self {
            PipelineResponse::Success(_) => "success",
            PipelineResponse::Error { .. } => "error",
        }
    }

    pub fn session_id(&self) -> &SessionId {
        match self {
            PipelineResponse::Success(report) => &report.metadata.session_id,
            PipelineResponse::Error { session_id, .. } => session_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PipelineResponse::Success(_))
    }

    pub fn report(&self) -> Option<&VerificationReport> {
        match self {
            PipelineResponse::Success(report) => Some(report),
            PipelineResponse::Error { .. } => None,
        }
    }

    /// Verdict label, or `"none"` for error responses.
    fn verdict_metric_label(&self) -> &'static str {
        match self {
            PipelineResponse::Success(report) => report.metadata.verdict_label.as_str(),
            PipelineResponse::Error { .. } => "none",
        }
    }
}

/// Runs verification sessions against injected collaborators.
#[derive(Clone)]
pub struct VerificationPipeline {
    workspaces: WorkspaceManager,
    runner: IsolationRunner,
    judge: Arc<dyn Judge>,
    default_limits: ExecutionLimits,
}

impl std::fmt::Debug for VerificationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationPipeline")
            .field("workspace_root", &self.workspaces.root())
            .field("image", &self.runner.image())
            .field("default_limits", &self.default_limits)
            .finish_non_exhaustive()
    }
}

impl VerificationPipeline {
    pub fn new(
        workspaces: WorkspaceManager,
        runner: IsolationRunner,
        judge: Arc<dyn Judge>,
        default_limits: ExecutionLimits,
    ) -> Self {
        Self {
            workspaces,
            runner,
            judge,
            default_limits,
        }
    }

    /// Wires a pipeline from configuration and the two external capabilities.
    pub fn from_config(
        config: &PipelineConfig,
        backend: Arc<dyn crate::execution::IsolationBackend>,
        judge: Arc<dyn Judge>,
    ) -> Self {
        Self::new(
            WorkspaceManager::new(config.workspace_root.clone()),
            IsolationRunner::new(backend, config.image.clone()),
            judge,
            config.limits.clone(),
        )
    }

    pub fn default_limits(&self) -> &ExecutionLimits {
        &self.default_limits
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    /// Verifies `request` in a fresh session.
    pub async fn verify(&self, request: VerificationRequest) -> PipelineResponse {
        let session_id = SessionId::generate();
        self.verify_session(session_id, &request).await
    }

    #[instrument(skip_all, fields(session_id = %session_id))]
    async fn verify_session(
        &self,
        session_id: SessionId,
        request: &VerificationRequest,
    ) -> PipelineResponse {
        info!(session_id = %session_id, code_bytes = request.code.len(), "Verification started");

        let stages = AssertUnwindSafe(self.run_session(&session_id, request)).catch_unwind();
        let outcome = match stages.await {
            Ok(result) => result,
            Err(payload) => Err(PipelineError::Panicked(panic_message(payload.as_ref()))),
        };

        let response = match outcome {
            Ok(report) => {
                info!(
                    session_id = %session_id,
                    verdict = %report.metadata.verdict_label,
                    outcome = %report.metadata.execution_outcome,
                    "Verification finished"
                );
                PipelineResponse::Success(report)
            }
            Err(e) => {
                error!(session_id = %session_id, error = %e, "Verification failed");
                PipelineResponse::Error {
                    session_id,
                    message: e.to_string(),
                }
            }
        };

        metrics::record_verification(response.status(), response.verdict_metric_label());
        response
    }

    async fn run_session(
        &self,
        session_id: &SessionId,
        request: &VerificationRequest,
    ) -> Result<VerificationReport, PipelineError> {
        let limits = match &request.limits {
            Some(limits) => {
                validate_limits(limits).map_err(PipelineError::InvalidLimits)?;
                limits.clone()
            }
            None => self.default_limits.clone(),
        };

        let workspace = self.workspaces.acquire(session_id)?;
        // Dropping the workspace also removes it, so cancellation and panics
        // below are covered too.
        let result = self.run_stages(&workspace, request, &limits).await;
        self.workspaces.release(&workspace);
        result
    }

    async fn run_stages(
        &self,
        workspace: &Workspace,
        request: &VerificationRequest,
        limits: &ExecutionLimits,
    ) -> Result<VerificationReport, PipelineError> {
        let session_id = workspace.session_id();

        let execution = self.runner.run(&request.code, workspace, limits).await;

        let proof = extract(execution.output());
        debug!(
            session_id = %session_id,
            loss_start = ?proof.start,
            loss_end = ?proof.end,
            "Extracted numeric evidence"
        );

        let judge_text = self
            .judge
            .judge(&JudgeInput::new(&request.summary, execution.output()))
            .await?;

        let verdict = aggregate_text(&judge_text, &proof);
        debug!(
            session_id = %session_id,
            qualitative_claim = verdict.qualitative_claim,
            numeric_proof = verdict.numeric_proof,
            "Aggregated verdict"
        );

        Ok(VerificationReport::build(
            request, &execution, proof, judge_text, &verdict,
        ))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
