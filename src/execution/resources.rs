//! Resource limits for sandboxed script execution.
//!
//! The defaults mirror the ceiling the verification pipeline has always
//! applied (a 1 GiB memory cap) and add the wall-clock bound every run needs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Execution resource limits for one sandboxed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLimits {
    /// Memory limit in megabytes. Swap is disabled, so this is a hard ceiling.
    pub memory_mb: u64,
    /// CPU cores available (e.g., 0.5, 1.0, 2.0).
    pub cpu_cores: f64,
    /// Maximum number of processes allowed inside the sandbox.
    pub max_processes: u64,
    /// Wall-clock timeout in seconds before the sandbox is killed.
    pub timeout_seconds: u64,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            memory_mb: 1024,
            cpu_cores: 1.0,
            max_processes: 256,
            timeout_seconds: 300, // 5 minutes
        }
    }
}

impl ExecutionLimits {
    /// Creates new execution limits with the given parameters.
    pub fn new(memory_mb: u64, cpu_cores: f64, max_processes: u64, timeout_seconds: u64) -> Self {
        Self {
            memory_mb,
            cpu_cores,
            max_processes,
            timeout_seconds,
        }
    }

    /// Sets the memory ceiling in MB.
    pub fn with_memory_mb(mut self, mb: u64) -> Self {
        self.memory_mb = mb;
        self
    }

    /// Sets the CPU limit.
    pub fn with_cpu_cores(mut self, cores: f64) -> Self {
        self.cpu_cores = cores;
        self
    }

    /// Sets the wall-clock timeout.
    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Returns memory limit in bytes, saturating at `i64::MAX`.
    pub fn memory_bytes(&self) -> i64 {
        self.memory_mb
            .checked_mul(1024 * 1024)
            .and_then(|bytes| i64::try_from(bytes).ok())
            .unwrap_or(i64::MAX)
    }

    /// Returns the process cap in Docker's signed unit, saturating at `i64::MAX`.
    pub fn pids_limit(&self) -> i64 {
        i64::try_from(self.max_processes).unwrap_or(i64::MAX)
    }

    /// Returns CPU period in microseconds (fixed at 100ms).
    pub fn cpu_period(&self) -> i64 {
        100_000
    }

    /// Returns CPU quota based on cores allocated.
    ///
    /// Formula: quota = period * cores
    /// e.g., 1.0 core = 100000 quota (100% of one CPU)
    pub fn cpu_quota(&self) -> i64 {
        (self.cpu_period() as f64 * self.cpu_cores) as i64
    }

    /// Returns the wall-clock bound as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = ExecutionLimits::default();
        assert_eq!(limits.memory_mb, 1024);
        assert_eq!(limits.cpu_cores, 1.0);
        assert_eq!(limits.max_processes, 256);
        assert_eq!(limits.timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_builder() {
        let limits = ExecutionLimits::default()
            .with_memory_mb(2048)
            .with_cpu_cores(2.0)
            .with_timeout_seconds(60);

        assert_eq!(limits.memory_mb, 2048);
        assert_eq!(limits.cpu_cores, 2.0);
        assert_eq!(limits.timeout_seconds, 60);
    }

    #[test]
    fn test_memory_bytes_conversion() {
        let limits = ExecutionLimits::new(512, 1.0, 100, 300);
        assert_eq!(limits.memory_bytes(), 512 * 1024 * 1024);
    }

    #[test]
    fn test_oversized_limits_saturate_instead_of_wrapping() {
        let limits = ExecutionLimits::new(1 << 44, 1.0, u64::MAX, 300);
        assert_eq!(limits.memory_bytes(), i64::MAX);
        assert_eq!(limits.pids_limit(), i64::MAX);

        let huge = ExecutionLimits::default().with_memory_mb(u64::MAX);
        assert_eq!(huge.memory_bytes(), i64::MAX);
    }

    #[test]
    fn test_cpu_quota_calculation() {
        let limits = ExecutionLimits::new(512, 2.0, 100, 300);
        assert_eq!(limits.cpu_period(), 100_000);
        assert_eq!(limits.cpu_quota(), 200_000); // 2 cores = 2 * period

        let half = ExecutionLimits::new(512, 0.5, 100, 300);
        assert_eq!(half.cpu_quota(), 50_000);
    }
}
