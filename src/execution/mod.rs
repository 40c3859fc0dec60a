//! Isolated execution layer for untrusted scripts.
//!
//! This module stages a script into a session workspace and runs it inside
//! a resource-capped, network-less container using the bollard crate.
//!
//! # Architecture
//!
//! ```text
//! IsolationRunner ──► IsolationBackend (trait) ──► DockerBackend ──► DockerClient
//!      │                                                │
//!      └─ stage script, backstop timeout, classify      └─ create → start → wait(timeout)
//!                                                          → logs → inspect → remove
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use r2r::execution::{DockerBackend, ExecutionLimits, IsolationRunner};
//!
//! let runner = IsolationRunner::new(Arc::new(DockerBackend::connect()?), "pytorch/pytorch:latest");
//! let result = runner.run(code, &workspace, &ExecutionLimits::default()).await;
//! println!("{}: {}", result.outcome(), result.output());
//! ```

pub mod backend;
pub mod docker_client;
pub mod resources;
pub mod result;
pub mod runner;

pub use backend::{DockerBackend, ExecutionSpec, IsolationBackend, RawExecution};
pub use docker_client::{ContainerConfig, DockerClient, CONTAINER_WORKDIR};
pub use resources::ExecutionLimits;
pub use result::{ExecutionOutcome, ExecutionResult, EXECUTION_ERROR_PREFIX};
pub use runner::IsolationRunner;
