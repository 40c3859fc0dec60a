//! CLI command definitions for r2r.
//!
//! `verify` runs untrusted code through the full pipeline, `extract` applies
//! the evidence extraction and aggregation to an existing log, and `doctor`
//! checks the Docker setup.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use crate::execution::{DockerBackend, DockerClient};
use crate::judge::{Judge, JudgeConfig, LlmJudge, StaticJudge};
use crate::llm::LiteLlmClient;
use crate::metrics;
use crate::pipeline::{PipelineConfig, PipelineResponse, VerificationPipeline, VerificationRequest};
use crate::utils::unwrap_code_block;
use crate::verification::{aggregate_text, extract, FinalVerdict, NumericProof};

/// Execute untrusted training code in isolation and verify its loss claim.
#[derive(Parser)]
#[command(name = "r2r")]
#[command(about = "Run untrusted training code in a sandbox and verify that its loss decreases")]
#[command(version)]
#[command(
    long_about = "r2r runs a generated training script inside a resource-capped Docker container,\nreads the LOSS_START/LOSS_END markers it prints, and combines them with a judge's\nverdict into a single AUTHENTIC / NOT_VERIFIED label.\n\nExample usage:\n  r2r verify --code train.py --summary paper.txt --json"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run a script in the sandbox and produce a verdict.
    Verify(VerifyArgs),

    /// Extract loss markers from an existing log without executing anything.
    Extract(ExtractArgs),

    /// Check that the Docker daemon is reachable and the runtime image is present.
    Doctor(DoctorArgs),
}

/// Arguments for `r2r verify`.
#[derive(Parser, Debug)]
pub struct VerifyArgs {
    /// File containing the code to run. Markdown fences are stripped.
    #[arg(short, long)]
    pub code: String,

    /// File containing the claim summary handed to the judge.
    #[arg(short, long)]
    pub summary: Option<String>,

    /// Fixed judge text. Without it the LLM judge is used (needs LITELLM_API_BASE).
    #[arg(long)]
    pub verdict_text: Option<String>,

    /// Docker image to run the script in.
    #[arg(long, env = "R2R_IMAGE")]
    pub image: Option<String>,

    /// Memory ceiling in MB.
    #[arg(long, env = "R2R_MEMORY_MB")]
    pub memory_mb: Option<u64>,

    /// CPU cores.
    #[arg(long, env = "R2R_CPU_CORES")]
    pub cpu_cores: Option<f64>,

    /// Wall-clock bound in seconds.
    #[arg(long, env = "R2R_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Directory under which session workspaces are created.
    #[arg(long, env = "R2R_WORKSPACE_ROOT")]
    pub workspace_root: Option<String>,

    /// Model used by the LLM judge.
    #[arg(long, env = "R2R_JUDGE_MODEL")]
    pub judge_model: Option<String>,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,

    /// Print Prometheus metrics to stderr after the run.
    #[arg(long)]
    pub metrics: bool,
}

/// Arguments for `r2r extract`.
#[derive(Parser, Debug)]
pub struct ExtractArgs {
    /// Log file to scan.
    #[arg(long)]
    pub log: String,

    /// Judge text to aggregate with the extracted evidence.
    #[arg(long)]
    pub verdict_text: Option<String>,

    /// Print the result as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `r2r doctor`.
#[derive(Parser, Debug)]
pub struct DoctorArgs {
    /// Image to check. Defaults to the configured runtime image.
    #[arg(long, env = "R2R_IMAGE")]
    pub image: Option<String>,

    /// Pull the image when it is missing.
    #[arg(long)]
    pub pull: bool,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Verify(args) => run_verify_command(args).await,
        Commands::Extract(args) => run_extract_command(args),
        Commands::Doctor(args) => run_doctor_command(args).await,
    }
}

// ============================================================================
// Verify
// ============================================================================

/// Layers CLI flags over the environment configuration.
fn build_config(args: &VerifyArgs) -> anyhow::Result<PipelineConfig> {
    let mut config = PipelineConfig::from_env().context("Invalid R2R_* configuration")?;

    if let Some(ref image) = args.image {
        config.image = image.clone();
    }
    if let Some(memory_mb) = args.memory_mb {
        config.limits.memory_mb = memory_mb;
    }
    if let Some(cpu_cores) = args.cpu_cores {
        config.limits.cpu_cores = cpu_cores;
    }
    if let Some(timeout_secs) = args.timeout_secs {
        config.limits.timeout_seconds = timeout_secs;
    }
    if let Some(ref root) = args.workspace_root {
        config.workspace_root = root.into();
    }
    if let Some(ref model) = args.judge_model {
        config.judge_model = model.clone();
    }

    config.resolve_workspace_root()?;
    config.validate()?;
    Ok(config)
}

fn build_judge(args: &VerifyArgs, config: &PipelineConfig) -> anyhow::Result<Arc<dyn Judge>> {
    if let Some(ref text) = args.verdict_text {
        return Ok(Arc::new(StaticJudge::new(text.clone())));
    }

    let client = LiteLlmClient::from_env()
        .context("LLM judge needs LITELLM_API_BASE; pass --verdict-text to use a fixed verdict")?;
    let judge_config = JudgeConfig::default().with_model(config.judge_model.clone());
    Ok(Arc::new(LlmJudge::new(Arc::new(client), judge_config)))
}

fn read_text(path: &str, what: &str) -> anyhow::Result<String> {
    fs::read_to_string(Path::new(path)).with_context(|| format!("Failed to read {} '{}'", what, path))
}

async fn run_verify_command(args: VerifyArgs) -> anyhow::Result<()> {
    if args.metrics {
        metrics::init_metrics().context("Failed to register metrics")?;
    }

    let config = build_config(&args)?;
    let code = unwrap_code_block(&read_text(&args.code, "code file")?);
    let summary = match args.summary {
        Some(ref path) => read_text(path, "summary file")?,
        None => String::new(),
    };

    let judge = build_judge(&args, &config)?;
    let backend = DockerBackend::connect().context("Failed to connect to Docker")?;
    let pipeline = VerificationPipeline::from_config(&config, Arc::new(backend), judge);

    info!(
        image = %config.image,
        memory_mb = config.limits.memory_mb,
        timeout_secs = config.limits.timeout_seconds,
        "Starting verification"
    );

    let response = pipeline.verify(VerificationRequest::new(code, summary)).await;

    if args.json {
        let json_output = serde_json::to_string_pretty(&response)
            .map_err(|e| anyhow::anyhow!("Failed to serialize JSON output: {}", e))?;
        println!("{}", json_output);
    } else {
        print_response(&response);
    }

    if args.metrics {
        eprintln!("{}", metrics::export_metrics());
    }

    match response {
        PipelineResponse::Success(_) => Ok(()),
        PipelineResponse::Error {
            session_id,
            message,
        } => anyhow::bail!("Verification session {} failed: {}", session_id, message),
    }
}

fn print_response(response: &PipelineResponse) {
    match response {
        PipelineResponse::Success(report) => {
            let meta = &report.metadata;
            println!("\n=== Verification Result ===");
            println!("Session:    {}", meta.session_id);
            println!("Verdict:    {}", meta.verdict_label);
            println!("Execution:  {} in {}ms", meta.execution_outcome, meta.execution_duration_ms);
            println!("Loss start: {}", format_loss(meta.loss_start));
            println!("Loss end:   {}", format_loss(meta.loss_end));
            println!("\n--- Judge ---\n{}", report.steps.verifier.content.trim());
            println!("\n--- Output ---\n{}", report.steps.execution.content.trim_end());
        }
        PipelineResponse::Error {
            session_id,
            message,
        } => {
            println!("\n=== Verification Failed ===");
            println!("Session: {}", session_id);
            println!("Error:   {}", message);
        }
    }
}

fn format_loss(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

// ============================================================================
// Extract
// ============================================================================

/// Result of `r2r extract`.
#[derive(Debug, Clone, Serialize)]
struct ExtractOutput {
    loss_start: Option<f64>,
    loss_end: Option<f64>,
    loss_decreased: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    verdict: Option<FinalVerdict>,
}

impl ExtractOutput {
    fn from_log(log: &str, verdict_text: Option<&str>) -> Self {
        let proof: NumericProof = extract(log);
        Self {
            loss_start: proof.start,
            loss_end: proof.end,
            loss_decreased: proof.shows_decrease(),
            verdict: verdict_text.map(|text| aggregate_text(text, &proof)),
        }
    }
}

fn run_extract_command(args: ExtractArgs) -> anyhow::Result<()> {
    let log = read_text(&args.log, "log file")?;
    let output = ExtractOutput::from_log(&log, args.verdict_text.as_deref());

    if args.json {
        let json_output = serde_json::to_string_pretty(&output)
            .map_err(|e| anyhow::anyhow!("Failed to serialize JSON output: {}", e))?;
        println!("{}", json_output);
        return Ok(());
    }

    println!("Loss start:     {}", format_loss(output.loss_start));
    println!("Loss end:       {}", format_loss(output.loss_end));
    println!("Loss decreased: {}", output.loss_decreased);
    if let Some(verdict) = output.verdict {
        println!("Verdict:        {}", verdict.label);
    }
    Ok(())
}

// ============================================================================
// Doctor
// ============================================================================

async fn run_doctor_command(args: DoctorArgs) -> anyhow::Result<()> {
    let image = match args.image {
        Some(image) => image,
        None => PipelineConfig::from_env()?.image,
    };

    let client = DockerClient::new().context("Failed to create Docker client")?;
    client
        .ping()
        .await
        .context("Docker daemon is not reachable")?;
    println!("✓ Docker daemon reachable");

    if client.image_exists(&image).await {
        println!("✓ Image {} present", image);
        return Ok(());
    }

    if !args.pull {
        warn!(image = %image, "Runtime image missing");
        anyhow::bail!("Image {} is not present; rerun with --pull to fetch it", image);
    }

    println!("… Pulling {}", image);
    client.pull_image(&image).await?;
    println!("✓ Image {} pulled", image);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verify_args_parse() {
        let cli = Cli::try_parse_from([
            "r2r",
            "--log-level",
            "debug",
            "verify",
            "--code",
            "train.py",
            "--verdict-text",
            "NOT_VERIFIED",
            "--timeout-secs",
            "30",
            "--json",
        ])
        .unwrap();

        assert_eq!(cli.log_level, "debug");
        match cli.command {
            Commands::Verify(args) => {
                assert_eq!(args.code, "train.py");
                assert_eq!(args.verdict_text.as_deref(), Some("NOT_VERIFIED"));
                assert_eq!(args.timeout_secs, Some(30));
                assert!(args.json);
                assert!(args.summary.is_none());
            }
            _ => panic!("expected verify"),
        }
    }

    #[test]
    fn test_verify_flags_read_r2r_env() {
        let command = Cli::command();
        let verify = command
            .find_subcommand("verify")
            .expect("verify subcommand should exist");
        let env_of = |id: &str| {
            verify
                .get_arguments()
                .find(|arg| arg.get_id() == id)
                .and_then(|arg| arg.get_env())
                .and_then(|env| env.to_str())
                .map(str::to_string)
        };

        assert_eq!(env_of("image").as_deref(), Some("R2R_IMAGE"));
        assert_eq!(env_of("memory_mb").as_deref(), Some("R2R_MEMORY_MB"));
        assert_eq!(env_of("cpu_cores").as_deref(), Some("R2R_CPU_CORES"));
        assert_eq!(env_of("timeout_secs").as_deref(), Some("R2R_TIMEOUT_SECS"));
        assert_eq!(env_of("workspace_root").as_deref(), Some("R2R_WORKSPACE_ROOT"));
        assert_eq!(env_of("judge_model").as_deref(), Some("R2R_JUDGE_MODEL"));
        assert_eq!(env_of("code"), None);
    }

    #[test]
    fn test_verify_requires_code() {
        assert!(Cli::try_parse_from(["r2r", "verify"]).is_err());
    }

    #[test]
    fn test_extract_output_with_verdict() {
        let output = ExtractOutput::from_log(
            "epoch 1\nLOSS_START: 0.9\nepoch 2\nLOSS_END: 0.1\n",
            Some("Verdict: NOT_VERIFIED"),
        );

        assert_eq!(output.loss_start, Some(0.9));
        assert_eq!(output.loss_end, Some(0.1));
        assert!(output.loss_decreased);
        let verdict = output.verdict.unwrap();
        assert!(verdict.is_authentic);

        let json = serde_json::to_string_pretty(&output).expect("serialization should succeed");
        assert!(json.contains("\"loss_decreased\": true"));
    }

    #[test]
    fn test_extract_output_without_verdict_omits_field() {
        let output = ExtractOutput::from_log("Error: syntax error", None);
        assert!(output.loss_start.is_none());
        assert!(!output.loss_decreased);

        let json = serde_json::to_string(&output).unwrap();
        assert!(!json.contains("verdict"));
    }

    #[test]
    fn test_format_loss() {
        assert_eq!(format_loss(Some(0.5)), "0.5");
        assert_eq!(format_loss(None), "-");
    }
}
