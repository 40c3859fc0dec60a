//! r2r: isolated execution and hybrid verification of generated training code.
//!
//! This library runs untrusted scripts in resource-capped containers, reads
//! the loss markers they print, and reconciles that evidence with a
//! qualitative judgment into a single authenticity verdict.

// Core modules
pub mod cli;
pub mod error;
pub mod execution;
pub mod judge;
pub mod llm;
pub mod metrics;
pub mod pipeline;
pub mod utils;
pub mod verification;
pub mod workspace;

// Re-export commonly used error types
pub use error::{ConfigError, DockerError, JudgeError, LlmError, WorkspaceError};

pub use execution::{ExecutionLimits, ExecutionOutcome, ExecutionResult, IsolationRunner};
pub use pipeline::{PipelineConfig, PipelineResponse, VerificationPipeline, VerificationRequest};
pub use verification::{FinalVerdict, NumericProof, VerdictLabel};
pub use workspace::{SessionId, WorkspaceManager};
