//! Metrics module for Prometheus-based monitoring.
//!
//! # Example
//!
//! ```ignore
//! use r2r::metrics::{export_metrics, init_metrics};
//!
//! init_metrics().expect("Failed to initialize metrics");
//! // ... run verifications ...
//! println!("{}", export_metrics());
//! ```

pub mod prometheus;

pub use self::prometheus::{
    export_metrics, init_metrics, record_execution, record_verification, workspace_opened,
    WorkspaceGauge, ACTIVE_WORKSPACES, EXECUTION_DURATION, REGISTRY, VERIFICATIONS_TOTAL,
};
