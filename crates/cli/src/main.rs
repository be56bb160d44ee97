//! `pipeline-runner` CLI entry-point.
//!
//! Available sub-commands:
//! - `run`      — execute a pipeline file and print its trace as JSON.
//! - `validate` — check a pipeline file without running anything.
//! - `worker`   — (hidden) worker-process entry used by isolated steps.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use engine::{IsolationSettings, PipelineDefinition, StageScheduler};
use isolate::{IsolatedExecutor, IsolationConfig, SelfExecLauncher};
use steps::{ShellStep, Step};

#[derive(Parser)]
#[command(
    name = "pipeline-runner",
    about = "Run CI pipelines stage by stage",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a pipeline definition file.
    Run {
        /// Path to the pipeline JSON file.
        path: PathBuf,
        #[command(flatten)]
        timeouts: TimeoutArgs,
    },
    /// Validate a pipeline definition file.
    Validate {
        /// Path to the pipeline JSON file.
        path: PathBuf,
    },
    /// Run one isolated job and write its result envelope to stdout.
    #[command(hide = true)]
    Worker {
        job: String,
        /// Job arguments as a JSON array.
        #[arg(long, default_value = "[]")]
        args: String,
    },
}

/// Defaults for isolated steps that don't set their own timeouts.
#[derive(Args, Debug, Clone, Copy)]
struct TimeoutArgs {
    /// Initial wait for an isolated step's worker, in seconds.
    #[arg(long, env = "PIPELINE_STEP_TIMEOUT_SECS", default_value_t = 10.0)]
    step_timeout: f64,
    /// Ceiling the doubling wait may reach, in seconds.
    #[arg(long, env = "PIPELINE_STEP_MAX_TIMEOUT_SECS", default_value_t = 80.0)]
    step_max_timeout: f64,
}

impl TimeoutArgs {
    fn config(&self) -> Result<IsolationConfig> {
        Ok(IsolationConfig {
            timeout: seconds(self.step_timeout, "--step-timeout")?,
            max_timeout: seconds(self.step_max_timeout, "--step-max-timeout")?,
        })
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Logs go to stderr: a worker's stdout is its result channel.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { path, timeouts } => {
            let definition = load(&path)?;
            run(&definition, timeouts.config()?).await
        }
        Command::Validate { path } => {
            let definition = load(&path)?;
            let plan = definition
                .to_plan(|def| Arc::new(ShellStep::new(&def.id, &def.command)) as Arc<dyn Step>)?;
            println!(
                "Pipeline '{}' is valid: {} stage(s), {} step(s)",
                definition.name,
                plan.stages().len(),
                plan.step_count()
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::Worker { job, args } => {
            isolate::worker::serve(&steps::builtin_jobs(), &job, &args, std::io::stdout().lock())
                .context("failed to write worker result")?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run(definition: &PipelineDefinition, defaults: IsolationConfig) -> Result<ExitCode> {
    let mut isolation: HashMap<&str, IsolationConfig> = HashMap::new();
    for def in definition.steps() {
        if let Some(settings) = &def.isolation {
            isolation.insert(def.id.as_str(), step_isolation(settings, &defaults)?);
        }
    }

    let executor = if isolation.is_empty() {
        None
    } else {
        Some(IsolatedExecutor::new(Arc::new(SelfExecLauncher::current_exe()?)))
    };

    let plan = definition.to_plan(|def| {
        let step = ShellStep::new(&def.id, &def.command);
        let step = match (&executor, isolation.get(def.id.as_str())) {
            (Some(executor), Some(config)) => step.isolated(executor.clone(), *config),
            _ => step,
        };
        Arc::new(step) as Arc<dyn Step>
    })?;

    info!(
        "running pipeline '{}' ({} stages, {} steps)",
        definition.name,
        plan.stages().len(),
        plan.step_count()
    );
    let trace = StageScheduler::new().execute(&plan).await;

    println!("{}", serde_json::to_string_pretty(&trace)?);

    if trace.has_failure() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn load(path: &Path) -> Result<PipelineDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    PipelineDefinition::from_json(&content)
        .with_context(|| format!("invalid pipeline file {}", path.display()))
}

fn step_isolation(
    settings: &IsolationSettings,
    defaults: &IsolationConfig,
) -> Result<IsolationConfig> {
    Ok(IsolationConfig {
        timeout: match settings.timeout_secs {
            Some(secs) => seconds(secs, "timeout_secs")?,
            None => defaults.timeout,
        },
        max_timeout: match settings.max_timeout_secs {
            Some(secs) => seconds(secs, "max_timeout_secs")?,
            None => defaults.max_timeout,
        },
    })
}

fn seconds(value: f64, what: &str) -> Result<Duration> {
    match Duration::try_from_secs_f64(value) {
        Ok(duration) if !duration.is_zero() => Ok(duration),
        _ => bail!("{what} must be a positive number of seconds, got {value}"),
    }
}
