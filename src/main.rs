//! political-pulse: binary entrypoint.
//! `cycle` for cron-style single runs, `daemon` for the in-process
//! scheduler, `status` to inspect what the last cycles did.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use political_pulse::ingest::scheduler::{spawn_scheduler, SchedulerCfg};
use political_pulse::{telemetry, Pipeline, PipelineConfig, Scope};

#[derive(Parser, Debug)]
#[command(name = "political-pulse", version, about = "Political engagement ingestion pipeline")]
struct Cli {
    /// Config file (TOML or JSON); overrides POLITICAL_PULSE_CONFIG.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the dashboard files.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run exactly one cycle and exit.
    Cycle {
        #[arg(long, value_enum, default_value_t = Scope::All)]
        scope: Scope,
    },
    /// Run both cadences until Ctrl-C.
    Daemon,
    /// Print the persisted fetch status.
    Status,
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    if let Some(path) = &cli.config {
        std::env::set_var(political_pulse::config::pipeline::ENV_CONFIG_PATH, path);
    }
    let mut cfg = PipelineConfig::load_default()?;
    if let Some(dir) = &cli.data_dir {
        cfg.data_dir = dir.clone();
    }
    Ok(cfg)
}

async fn run(cli: Cli) -> Result<()> {
    let cfg = load_config(&cli)?;
    if cfg.metrics_textfile.is_some() {
        telemetry::install_metrics()?;
    }

    match cli.command {
        Command::Cycle { scope } => {
            let pipeline = Pipeline::from_config(cfg)?;
            tokio::select! {
                res = pipeline.run_cycle(scope) => {
                    let report = res?;
                    if !report.locked_out.is_empty() {
                        warn!(locked_out = ?report.locked_out, "some sections were skipped");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    warn!("interrupted; in-flight cycle abandoned, committed files untouched");
                }
            }
        }
        Command::Daemon => {
            let sched = SchedulerCfg::from(&cfg);
            let pipeline = Arc::new(Pipeline::from_config(cfg)?);
            let (tx, rx) = oneshot::channel();
            let handle = spawn_scheduler(pipeline, sched, rx);
            info!(
                aggregates_secs = sched.aggregates_every.as_secs(),
                live_secs = sched.live_every.as_secs(),
                "daemon started"
            );
            tokio::signal::ctrl_c()
                .await
                .context("listening for ctrl-c")?;
            info!("shutdown requested");
            let _ = tx.send(());
            handle.await.context("scheduler task panicked")?;
        }
        Command::Status => {
            let pipeline = Pipeline::from_config(cfg)?;
            let store = pipeline.store();
            let status = store.load_status()?;
            let political = store.load_political()?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            println!(
                "history_points={} placeholders={}",
                political.history.len(),
                political.history.iter().filter(|p| p.is_placeholder).count()
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    telemetry::init_tracing(telemetry::wants_json(cli.log_json));

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = ?e, "political-pulse failed");
            ExitCode::FAILURE
        }
    }
}
