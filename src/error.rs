//! Error types for r2r operations.
//!
//! Defines error types for the major subsystems:
//! - Docker sandbox infrastructure
//! - Ephemeral workspace management
//! - LLM API interactions
//! - Qualitative judgment collaborators
//! - Pipeline configuration

use thiserror::Error;

/// Errors that can occur during Docker operations.
#[derive(Debug, Error)]
pub enum DockerError {
    #[error("Docker daemon not available: {0}")]
    DaemonUnavailable(String),

    #[error("Failed to pull image '{image}': {reason}")]
    ImagePullFailed { image: String, reason: String },

    #[error("Docker run failed: {0}")]
    RunFailed(String),

    #[error("Container '{id}' not found")]
    ContainerNotFound { id: String },

    #[error("Failed to read container output: {0}")]
    LogsFailed(String),

    #[error("Container execution timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while managing ephemeral workspaces.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Failed to create workspace root '{path}': {source}")]
    RootUnavailable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Workspace '{0}' already exists")]
    Collision(String),

    #[error("Failed to create workspace '{path}': {source}")]
    CreateFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write script into workspace '{path}': {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API base URL: LITELLM_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },
}

/// Errors raised by a qualitative judgment collaborator.
///
/// These are pipeline-fatal: the orchestrator never fabricates a verdict
/// when the judge cannot answer.
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("Judge model '{model}' failed: {source}")]
    Llm {
        model: String,
        #[source]
        source: LlmError,
    },

    #[error("Judge returned an empty response")]
    EmptyResponse,

    #[error("Judge unavailable: {0}")]
    Unavailable(String),
}

/// Errors that can occur while building the pipeline configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_docker_error_messages() {
        let err = DockerError::ImagePullFailed {
            image: "pytorch/pytorch:latest".to_string(),
            reason: "manifest unknown".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to pull image 'pytorch/pytorch:latest': manifest unknown"
        );

        let err = DockerError::Timeout { seconds: 30 };
        assert!(err.to_string().contains("30 seconds"));
    }

    #[test]
    fn test_judge_error_wraps_llm_error() {
        let err = JudgeError::Llm {
            model: "llama-3.1-8b-instant".to_string(),
            source: LlmError::RateLimited("slow down".to_string()),
        };
        let message = err.to_string();
        assert!(message.contains("llama-3.1-8b-instant"));
        assert!(message.contains("Rate limited"));
    }
}
