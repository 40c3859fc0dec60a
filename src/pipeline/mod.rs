//! Verification pipeline.
//!
//! # Pipeline Flow
//!
//! 1. **Workspace**: a fresh directory is acquired for the session
//! 2. **Execution**: the untrusted script runs in the isolation backend
//! 3. **Extraction**: `LOSS_START`/`LOSS_END` markers are read from the output
//! 4. **Judgment**: the judge reads the summary and the output
//! 5. **Aggregation**: qualitative claim OR numeric decrease
//! 6. **Release**: the workspace is removed, whatever happened above
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use r2r::execution::DockerBackend;
//! use r2r::judge::StaticJudge;
//! use r2r::pipeline::{PipelineConfig, VerificationPipeline, VerificationRequest};
//!
//! let config = PipelineConfig::from_env()?;
//! let pipeline = VerificationPipeline::from_config(
//!     &config,
//!     Arc::new(DockerBackend::connect()?),
//!     Arc::new(StaticJudge::new("NOT_VERIFIED")),
//! );
//!
//! let response = pipeline
//!     .verify(VerificationRequest::new("print('LOSS_START: 1.0')", "linear model"))
//!     .await;
//! println!("{}", serde_json::to_string_pretty(&response)?);
//! ```

pub mod config;
pub mod orchestrator;

pub use config::{validate_limits, PipelineConfig, DEFAULT_IMAGE};
pub use orchestrator::{
    PipelineError, PipelineResponse, ReportMetadata, ReportSteps, StepContent,
    VerificationPipeline, VerificationReport, VerificationRequest,
};
