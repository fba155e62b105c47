//! Command-line entry point.
//!
//! # Startup sequence
//!
//! 1. Parse the command line.
//! 2. Initialise logging (`-v` raises the default filter to `debug`).
//! 3. Load [`AppConfig`] (defaults on first run) and apply environment
//!    overrides for secrets.
//! 4. Build the tokio runtime and install the Ctrl+C handler, which cancels
//!    the job token.
//! 5. Run the command and map the outcome to an exit code.
//!
//! | Exit code | Meaning |
//! |-----------|---------|
//! | 0 | job completed |
//! | 1 | job failed (resumable) |
//! | 2 | state corruption |
//! | 3 | invalid invocation or configuration |

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use narrator::config::{AppConfig, AppPaths, ProviderPreference};
use narrator::pipeline::{
    FailureKind, JobOptions, JobResult, JobStore, PipelineError, PipelineOrchestrator,
};
use narrator::voice::VoiceOverrides;
use tokio_util::sync::CancellationToken;

const EXIT_FAILED: u8 = 1;
const EXIT_CORRUPT: u8 = 2;
const EXIT_INVALID: u8 = 3;

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Debug, Parser)]
#[command(name = "narrator", version, about = "Turn documents into multi-voice audiobooks")]
struct Cli {
    /// Log at debug level (RUST_LOG still wins).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start a new job from a source document.
    Generate(GenerateArgs),
    /// Continue a job from its first unfinished stage.
    Resume {
        job_id: String,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Print the persisted state of a job.
    Status {
        job_id: String,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Write the default settings file.
    InitConfig {
        #[arg(long)]
        config: Option<PathBuf>,
        /// Replace an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Args)]
struct CommonArgs {
    /// Directory holding job workspaces.
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Settings file to use instead of the platform default.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct GenerateArgs {
    source: PathBuf,
    #[arg(long)]
    job_id: Option<String>,
    #[arg(long)]
    max_segment_chars: Option<usize>,
    #[arg(long, value_enum)]
    provider: Option<ProviderArg>,
    #[arg(long)]
    synthesis_attempts: Option<u32>,
    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProviderArg {
    Auto,
    Cloud,
    Local,
}

impl From<ProviderArg> for ProviderPreference {
    fn from(arg: ProviderArg) -> Self {
        match arg {
            ProviderArg::Auto => ProviderPreference::Auto,
            ProviderArg::Cloud => ProviderPreference::Cloud,
            ProviderArg::Local => ProviderPreference::Local,
        }
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match run(cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_INVALID)
        }
    }
}

fn run(command: Command) -> Result<ExitCode> {
    match command {
        Command::Generate(args) => generate(args),
        Command::Resume { job_id, common } => {
            let config = load_config(common.config.as_deref())?;
            let output = output_dir(&common, &config);
            let orchestrator = orchestrator(config)?;
            execute(
                orchestrator.cancel_token(),
                orchestrator.resume(&output, &job_id),
            )
        }
        Command::Status { job_id, common } => status(&job_id, &common),
        Command::InitConfig { config, force } => init_config(config, force),
    }
}

fn generate(args: GenerateArgs) -> Result<ExitCode> {
    if !args.source.is_file() {
        bail!("source document {} does not exist", args.source.display());
    }
    let config = load_config(args.common.config.as_deref())?;
    let output = output_dir(&args.common, &config);

    let mut options = JobOptions::from_config(&config);
    if let Some(chars) = args.max_segment_chars {
        if chars == 0 {
            bail!("--max-segment-chars must be positive");
        }
        options.max_segment_chars = chars;
    }
    if let Some(provider) = args.provider {
        options.provider = provider.into();
    }
    if let Some(attempts) = args.synthesis_attempts {
        options.retry.synthesis_attempts = attempts.max(1);
    }

    let orchestrator = orchestrator(config)?;
    let cancel = orchestrator.cancel_token();
    match &args.job_id {
        Some(id) => execute(
            cancel,
            orchestrator.generate_with_id(id, &args.source, &output, options),
        ),
        None => execute(cancel, orchestrator.generate(&args.source, &output, options)),
    }
}

fn status(job_id: &str, common: &CommonArgs) -> Result<ExitCode> {
    let config = load_config(common.config.as_deref())?;
    let store = JobStore::new(output_dir(common, &config));
    match store.load(job_id) {
        Ok(job) => {
            println!("{}", serde_json::to_string_pretty(&job)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => Ok(report_error(&e)),
    }
}

fn init_config(path: Option<PathBuf>, force: bool) -> Result<ExitCode> {
    let path = path.unwrap_or_else(|| AppPaths::new().settings_file);
    if path.exists() && !force {
        bail!("{} already exists (use --force to replace it)", path.display());
    }
    AppConfig::default().save_to(&path)?;
    println!("wrote {}", path.display());
    Ok(ExitCode::SUCCESS)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let mut config = match path {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => AppConfig::load().context("loading settings")?,
    };
    config.apply_env_overrides();
    Ok(config)
}

fn output_dir(common: &CommonArgs, config: &AppConfig) -> PathBuf {
    common
        .output
        .clone()
        .unwrap_or_else(|| config.resolved_jobs_dir())
}

fn orchestrator(config: AppConfig) -> Result<PipelineOrchestrator> {
    let overrides = VoiceOverrides::load().context("loading voice overrides")?;
    Ok(PipelineOrchestrator::new(Arc::new(config), overrides))
}

/// Run one orchestrator call on a fresh runtime with Ctrl+C wired to
/// `cancel`.
fn execute(
    cancel: CancellationToken,
    job: impl Future<Output = Result<JobResult, PipelineError>>,
) -> Result<ExitCode> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("creating tokio runtime")?;

    rt.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupt received; stopping after the current step");
            cancel.cancel();
        }
    });

    let outcome = rt.block_on(job);
    rt.shutdown_background();
    match outcome {
        Ok(result) => Ok(report(&result)),
        Err(e) => Ok(report_error(&e)),
    }
}

fn report(result: &JobResult) -> ExitCode {
    println!("job {}: {:?}", result.job_id, result.status);
    if let Some(path) = &result.final_artifact {
        println!("output: {}", path.display());
    }
    match &result.error {
        None if result.succeeded() => ExitCode::SUCCESS,
        None => ExitCode::from(EXIT_FAILED),
        Some(failure) => {
            eprintln!("{failure}");
            eprintln!("resume with: narrator resume {}", result.job_id);
            ExitCode::from(EXIT_FAILED)
        }
    }
}

fn report_error(error: &PipelineError) -> ExitCode {
    eprintln!("error: {error}");
    match error.kind() {
        FailureKind::StateCorruption => ExitCode::from(EXIT_CORRUPT),
        FailureKind::InvalidInput | FailureKind::JobNotFound | FailureKind::JobBusy => {
            ExitCode::from(EXIT_INVALID)
        }
        _ => ExitCode::from(EXIT_FAILED),
    }
}
