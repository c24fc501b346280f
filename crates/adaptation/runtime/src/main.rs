//! maple-adapt - replay recorded metrics through the adaptation loop
//!
//! Runs with the dry-run collaborators: every safety check passes and
//! strategies are reported as executed without side effects.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;

use maple_adaptation_runtime::{
    init_tracing, AdaptationConfig, AdaptationService, Collaborators, ComponentRegistration,
    PersistenceConfig,
};
use maple_adaptation_types::{Context, MetricSnapshot};

/// Adaptive decision loop CLI
#[derive(Parser)]
#[command(name = "maple-adapt")]
#[command(about = "Replay metric snapshots through the adaptive decision loop", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "ADAPT_CONFIG", global = true)]
    config: Option<String>,

    /// Log level (overrides the configured one)
    #[arg(long, env = "ADAPT_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Feed a JSON-lines snapshot file through one component's loop
    Replay {
        /// Component registration (JSON)
        #[arg(short, long)]
        registration: PathBuf,

        /// Snapshots, one JSON object per line
        #[arg(short, long)]
        snapshots: PathBuf,

        /// Persist component state as JSON files in this directory
        #[arg(long)]
        state_dir: Option<PathBuf>,

        /// Print decisions as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    ShowConfig,
}

/// One line of a replay file.
#[derive(Deserialize)]
struct ReplayLine {
    metrics: BTreeMap<String, f64>,
    #[serde(default)]
    sample_sets: BTreeMap<String, Vec<f64>>,
    #[serde(default)]
    context: Option<Context>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AdaptationConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    init_tracing(&config.logging).context("installing tracing subscriber")?;

    match cli.command {
        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Replay {
            registration,
            snapshots,
            state_dir,
            json,
        } => {
            if let Some(dir) = state_dir {
                config.persistence = PersistenceConfig::JsonFile { dir };
            }
            replay(config, &registration, &snapshots, json).await
        }
    }
}

async fn replay(
    config: AdaptationConfig,
    registration: &Path,
    snapshots: &Path,
    json: bool,
) -> Result<()> {
    let registration: ComponentRegistration = serde_json::from_str(
        &fs::read_to_string(registration)
            .with_context(|| format!("reading {}", registration.display()))?,
    )
    .context("parsing registration")?;
    let component_id = registration.component_id.clone();

    let service = AdaptationService::new(config, Collaborators::dry_run())?;
    service.register(registration).await?;

    let input = fs::read_to_string(snapshots)
        .with_context(|| format!("reading {}", snapshots.display()))?;
    for (lineno, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let entry: ReplayLine = serde_json::from_str(line)
            .with_context(|| format!("{}:{}: malformed snapshot", snapshots.display(), lineno + 1))?;

        let mut snapshot = MetricSnapshot::new(component_id.clone(), entry.metrics);
        for (metric, samples) in entry.sample_sets {
            snapshot = snapshot.with_samples(metric, samples);
        }
        let result = match entry.context {
            Some(context) => service.submit_with_context(snapshot, context).await,
            None => service.submit(snapshot).await,
        };

        match result {
            Ok(decision) if json => println!("{}", serde_json::to_string(&decision)?),
            Ok(decision) => println!(
                "{:>4}  {:<18} conf={:.3} delta={:+.4} rule={}{}",
                lineno + 1,
                decision.action.to_string(),
                decision.confidence,
                decision.delta,
                decision.rule,
                decision
                    .strategy_id
                    .as_deref()
                    .map(|s| format!(" strategy={}", s))
                    .unwrap_or_default()
            ),
            Err(e) if e.is_rejected_input() => {
                eprintln!("{:>4}  rejected: {}", lineno + 1, e);
            }
            Err(e) => return Err(e.into()),
        }
    }

    let summary = service.get_summary(&component_id).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    service.deregister(&component_id).await?;
    Ok(())
}
