//! Prometheus metrics registration and export.
//!
//! Metrics live in `OnceLock` statics. Until [`init_metrics`] has been
//! called every recording helper is a no-op, so library users and tests
//! that never initialize metrics pay nothing.

use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};

/// Global Prometheus registry for all r2r metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Total verification runs, labeled by response status and verdict label.
pub static VERIFICATIONS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Sandboxed execution duration in seconds, labeled by outcome kind.
pub static EXECUTION_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Number of workspaces currently on disk.
pub static ACTIVE_WORKSPACES: OnceLock<Gauge> = OnceLock::new();

/// Serializes [`init_metrics`] so concurrent callers register exactly once.
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Initialize all metrics and register them with the registry.
///
/// Calling this more than once, from any number of threads, is harmless;
/// only the first call registers.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric construction or registration fails.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let _guard = INIT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let verifications_total = CounterVec::new(
        Opts::new("r2r_verifications_total", "Total verification runs"),
        &["status", "verdict"],
    )?;

    let execution_duration = HistogramVec::new(
        HistogramOpts::new(
            "r2r_execution_duration_seconds",
            "Sandboxed execution duration in seconds",
        )
        .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        &["outcome"],
    )?;

    let active_workspaces = Gauge::new(
        "r2r_active_workspaces",
        "Number of session workspaces currently on disk",
    )?;

    registry.register(Box::new(verifications_total.clone()))?;
    registry.register(Box::new(execution_duration.clone()))?;
    registry.register(Box::new(active_workspaces.clone()))?;

    let _ = VERIFICATIONS_TOTAL.set(verifications_total);
    let _ = EXECUTION_DURATION.set(execution_duration);
    let _ = ACTIVE_WORKSPACES.set(active_workspaces);
    let _ = REGISTRY.set(registry);

    Ok(())
}

/// Export all registered metrics in the Prometheus text format.
///
/// Returns an empty string when metrics were never initialized.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return String::new();
    };

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Records one finished verification run.
pub fn record_verification(status: &str, verdict: &str) {
    if let Some(counter) = VERIFICATIONS_TOTAL.get() {
        counter.with_label_values(&[status, verdict]).inc();
    }
}

/// Records the duration of one sandboxed execution.
pub fn record_execution(outcome: &str, seconds: f64) {
    if let Some(histogram) = EXECUTION_DURATION.get() {
        histogram.with_label_values(&[outcome]).observe(seconds);
    }
}

/// One workspace's contribution to `r2r_active_workspaces`.
///
/// Only a workspace counted when it was opened is decremented when it
/// closes, so initializing metrics while sessions are in flight never
/// drives the gauge below zero. Closing twice decrements once.
pub struct WorkspaceGauge {
    gauge: Option<Gauge>,
    closed: AtomicBool,
}

impl WorkspaceGauge {
    fn open(gauge: Option<&Gauge>) -> Self {
        if let Some(gauge) = gauge {
            gauge.inc();
        }
        Self {
            gauge: gauge.cloned(),
            closed: AtomicBool::new(false),
        }
    }

    /// Removes this workspace from the gauge.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(gauge) = &self.gauge {
            gauge.dec();
        }
    }
}

impl fmt::Debug for WorkspaceGauge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkspaceGauge")
            .field("counted", &self.gauge.is_some())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

/// Notes that a workspace directory was created.
pub fn workspace_opened() -> WorkspaceGauge {
    WorkspaceGauge::open(ACTIVE_WORKSPACES.get())
}
