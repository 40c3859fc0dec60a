//! Pipeline configuration.
//!
//! Values come from defaults, then `R2R_*` environment variables, then
//! whatever the CLI overrides on top.

use std::path::PathBuf;

use crate::error::ConfigError;
use crate::execution::ExecutionLimits;
use crate::llm::DEFAULT_MODEL;

/// Default runtime image for untrusted scripts.
pub const DEFAULT_IMAGE: &str = "pytorch/pytorch:latest";

/// Configuration for the verification pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Directory under which per-session workspaces are created.
    pub workspace_root: PathBuf,
    /// Docker image used to run scripts.
    pub image: String,
    /// Limits applied when a request carries none of its own.
    pub limits: ExecutionLimits,
    /// Model asked for the qualitative verdict.
    pub judge_model: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workspace_root: std::env::temp_dir().join("r2r-workspaces"),
            image: DEFAULT_IMAGE.to_string(),
            limits: ExecutionLimits::default(),
            judge_model: DEFAULT_MODEL.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `R2R_WORKSPACE_ROOT`: Workspace root (default: `<tmp>/r2r-workspaces`)
    /// - `R2R_IMAGE`: Docker image (default: pytorch/pytorch:latest)
    /// - `R2R_MEMORY_MB`: Memory ceiling per run (default: 1024)
    /// - `R2R_CPU_CORES`: CPU cores per run (default: 1.0)
    /// - `R2R_MAX_PROCESSES`: Process limit per run (default: 256)
    /// - `R2R_TIMEOUT_SECS`: Wall-clock bound per run (default: 300)
    /// - `R2R_JUDGE_MODEL`: Judge model (default: llama-3.1-8b-instant)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(val) = lookup("R2R_WORKSPACE_ROOT") {
            config.workspace_root = PathBuf::from(val);
        }

        if let Some(val) = lookup("R2R_IMAGE") {
            config.image = val;
        }

        if let Some(val) = lookup("R2R_MEMORY_MB") {
            config.limits.memory_mb = parse_env_value(&val, "R2R_MEMORY_MB")?;
        }

        if let Some(val) = lookup("R2R_CPU_CORES") {
            config.limits.cpu_cores = parse_env_value(&val, "R2R_CPU_CORES")?;
        }

        if let Some(val) = lookup("R2R_MAX_PROCESSES") {
            config.limits.max_processes = parse_env_value(&val, "R2R_MAX_PROCESSES")?;
        }

        if let Some(val) = lookup("R2R_TIMEOUT_SECS") {
            config.limits.timeout_seconds = parse_env_value(&val, "R2R_TIMEOUT_SECS")?;
        }

        if let Some(val) = lookup("R2R_JUDGE_MODEL") {
            config.judge_model = val;
        }

        config.resolve_workspace_root()?;
        config.validate()?;
        Ok(config)
    }

    /// Makes a relative workspace root absolute against the current directory.
    pub fn resolve_workspace_root(&mut self) -> Result<(), ConfigError> {
        if self.workspace_root.is_relative() {
            self.workspace_root = std::env::current_dir()?.join(&self.workspace_root);
        }
        Ok(())
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.image.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "image cannot be empty".to_string(),
            ));
        }

        validate_limits(&self.limits)?;

        if self.judge_model.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "judge_model cannot be empty".to_string(),
            ));
        }

        if self.workspace_root.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "workspace_root cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder method to set the workspace root.
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    /// Builder method to set the Docker image.
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// Builder method to set the default execution limits.
    pub fn with_limits(mut self, limits: ExecutionLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Builder method to set the judge model.
    pub fn with_judge_model(mut self, model: impl Into<String>) -> Self {
        self.judge_model = model.into();
        self
    }
}

/// Largest accepted memory ceiling (1 TiB).
pub const MAX_MEMORY_MB: u64 = 1024 * 1024;

/// Largest accepted process cap.
pub const MAX_PROCESSES: u64 = 1 << 22;

/// Largest accepted wall-clock bound (24 hours).
pub const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Rejects limits that would make every run fail or run unbounded.
pub fn validate_limits(limits: &ExecutionLimits) -> Result<(), ConfigError> {
    if limits.memory_mb == 0 || limits.memory_mb > MAX_MEMORY_MB {
        return Err(ConfigError::ValidationFailed(format!(
            "memory_mb must be between 1 and {}",
            MAX_MEMORY_MB
        )));
    }

    if !(limits.cpu_cores > 0.0) || !limits.cpu_cores.is_finite() {
        return Err(ConfigError::ValidationFailed(
            "cpu_cores must be a positive number".to_string(),
        ));
    }

    if limits.max_processes == 0 || limits.max_processes > MAX_PROCESSES {
        return Err(ConfigError::ValidationFailed(format!(
            "max_processes must be between 1 and {}",
            MAX_PROCESSES
        )));
    }

    if limits.timeout_seconds == 0 || limits.timeout_seconds > MAX_TIMEOUT_SECS {
        return Err(ConfigError::ValidationFailed(format!(
            "timeout_seconds must be between 1 and {}",
            MAX_TIMEOUT_SECS
        )));
    }

    Ok(())
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.image, "pytorch/pytorch:latest");
        assert_eq!(config.limits.memory_mb, 1024);
        assert_eq!(config.limits.timeout_seconds, 300);
        assert_eq!(config.judge_model, "llama-3.1-8b-instant");
        assert!(config.workspace_root.ends_with("r2r-workspaces"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = PipelineConfig::from_lookup(lookup_from(&[
            ("R2R_WORKSPACE_ROOT", "/srv/r2r"),
            ("R2R_IMAGE", "python:3.11-slim"),
            ("R2R_MEMORY_MB", "512"),
            ("R2R_CPU_CORES", "0.5"),
            ("R2R_MAX_PROCESSES", "64"),
            ("R2R_TIMEOUT_SECS", " 60 "),
            ("R2R_JUDGE_MODEL", "llama-3.3-70b-versatile"),
        ]))
        .unwrap();

        assert_eq!(config.workspace_root, PathBuf::from("/srv/r2r"));
        assert_eq!(config.image, "python:3.11-slim");
        assert_eq!(config.limits, ExecutionLimits::new(512, 0.5, 64, 60));
        assert_eq!(config.judge_model, "llama-3.3-70b-versatile");
    }

    #[test]
    fn test_from_lookup_empty_uses_defaults() {
        let config = PipelineConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.limits, ExecutionLimits::default());
        assert!(config.workspace_root.is_absolute());
    }

    #[test]
    fn test_invalid_number_names_key() {
        let err = PipelineConfig::from_lookup(lookup_from(&[("R2R_MEMORY_MB", "1g")]))
            .unwrap_err();
        match err {
            ConfigError::InvalidValue { key, .. } => assert_eq!(key, "R2R_MEMORY_MB"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_relative_root_is_resolved() {
        let config =
            PipelineConfig::from_lookup(lookup_from(&[("R2R_WORKSPACE_ROOT", "scratch")]))
                .unwrap();
        assert!(config.workspace_root.is_absolute());
        assert!(config.workspace_root.ends_with("scratch"));
    }

    #[test]
    fn test_validation_rejects_bad_limits() {
        let zero_memory = PipelineConfig::default()
            .with_limits(ExecutionLimits::default().with_memory_mb(0));
        assert!(zero_memory
            .validate()
            .unwrap_err()
            .to_string()
            .contains("memory_mb"));

        let zero_timeout = PipelineConfig::default()
            .with_limits(ExecutionLimits::default().with_timeout_seconds(0));
        assert!(zero_timeout.validate().is_err());

        let no_cpu =
            PipelineConfig::default().with_limits(ExecutionLimits::default().with_cpu_cores(0.0));
        assert!(no_cpu.validate().is_err());

        let nan_cpu = PipelineConfig::default()
            .with_limits(ExecutionLimits::default().with_cpu_cores(f64::NAN));
        assert!(nan_cpu.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_oversized_limits() {
        let huge_memory = ExecutionLimits::default().with_memory_mb(1 << 44);
        assert!(validate_limits(&huge_memory)
            .unwrap_err()
            .to_string()
            .contains("memory_mb"));

        let huge_timeout = ExecutionLimits::default().with_timeout_seconds(u64::MAX);
        assert!(validate_limits(&huge_timeout)
            .unwrap_err()
            .to_string()
            .contains("timeout_seconds"));

        let huge_pids = ExecutionLimits::new(512, 1.0, u64::MAX, 60);
        assert!(validate_limits(&huge_pids).is_err());

        let at_caps = ExecutionLimits::new(MAX_MEMORY_MB, 1.0, MAX_PROCESSES, MAX_TIMEOUT_SECS);
        assert!(validate_limits(&at_caps).is_ok());
    }

    #[test]
    fn test_validation_rejects_empty_image() {
        let config = PipelineConfig::default().with_image("  ");
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("image"));
    }
}
