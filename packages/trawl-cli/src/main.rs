//! trawl command line: run targets once, validate configuration, or keep
//! running them on a schedule.

mod schedule;
mod settings;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trawl::{
    CompiledTarget, CsvStore, FetchClient, FetchPolicy, InMemoryMetrics, JsonlStore, LogNotifier,
    RecordCleaner, RecordTransformer, RequestPacer, ReqwestTransport, RobotsGuard, RunOptions,
    RunOrchestrator, RunResult, WebhookNotifier,
};

use settings::{Settings, StorageSettings};

#[derive(Parser)]
#[command(name = "trawl", about = "Scheduled web extraction", version)]
struct Cli {
    /// Path to the settings file
    #[arg(short, long, global = true, default_value = "trawl.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one target (or all targets) once
    Run {
        /// Target name; omit to run every configured target
        target: Option<String>,

        /// Walk and process but skip storage
        #[arg(long)]
        dry_run: bool,

        /// Cancel the run after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Check that the settings file loads and every target compiles
    Validate,

    /// Run scheduled jobs until interrupted
    Schedule,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,trawl=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(&cli.config)?;

    match cli.command {
        Commands::Run {
            target,
            dry_run,
            timeout_secs,
        } => {
            let targets = compile_targets(&settings, target.as_deref())?;
            let metrics = Arc::new(InMemoryMetrics::new());
            let orchestrator = build_orchestrator(&settings)?.with_metrics(metrics.clone());

            let cancel = cancel_on_ctrl_c();
            if let Some(secs) = timeout_secs {
                let handle = cancel.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_secs(secs)).await;
                    warn!(timeout_secs = secs, "run timeout reached, cancelling");
                    handle.cancel();
                });
            }
            let options = RunOptions { dry_run, cancel };

            let results = orchestrator.run_all(&targets, &options).await;
            for result in &results {
                print_result(result);
            }

            let totals = metrics.snapshot();
            info!(
                pages_fetched = totals.pages_fetched,
                pages_failed = totals.pages_failed,
                records_stored = totals.records_stored,
                runs_succeeded = totals.runs_succeeded,
                runs_partial = totals.runs_partial,
                runs_failed = totals.runs_failed,
                "all runs finished"
            );

            let exit = results
                .iter()
                .map(|r| r.status.exit_code())
                .max()
                .unwrap_or(0);
            std::process::exit(exit);
        }
        Commands::Validate => {
            let targets = compile_targets(&settings, None)?;
            for target in &targets {
                info!(
                    target = target.name(),
                    seeds = target.seeds.len(),
                    "target ok"
                );
            }
            println!(
                "configuration ok: {} target(s), storage `{}`",
                targets.len(),
                storage_name(&settings.storage)
            );
            Ok(())
        }
        Commands::Schedule => {
            if !settings.schedule.enabled {
                anyhow::bail!("schedule is not enabled in the settings file");
            }
            let targets = compile_targets(&settings, None)?;
            let orchestrator = Arc::new(build_orchestrator(&settings)?);
            let cancel = cancel_on_ctrl_c();

            info!(jobs = settings.schedule.jobs.len(), "scheduler starting");
            schedule::run_schedule(&settings.schedule, targets, orchestrator, cancel).await
        }
    }
}

fn compile_targets(settings: &Settings, name: Option<&str>) -> Result<Vec<CompiledTarget>> {
    settings
        .select_targets(name)?
        .into_iter()
        .map(|config| {
            let name = config.name.clone();
            CompiledTarget::compile(config)
                .with_context(|| format!("compiling target `{name}`"))
        })
        .collect()
}

fn build_orchestrator(settings: &Settings) -> Result<RunOrchestrator> {
    let policy = settings.scraper.clone();

    let transport = Arc::new(ReqwestTransport::new(&policy)?);
    let pacer = Arc::new(RequestPacer::new(policy.rate_limit(), policy.jitter_max()));
    let client = Arc::new(FetchClient::new(
        transport.clone(),
        pacer,
        FetchPolicy::from_policy(&policy),
    ));
    let robots = Arc::new(RobotsGuard::new(transport, policy.timeout()));

    let mut orchestrator = RunOrchestrator::new(client, robots, policy)
        .with_cleaner(Arc::new(RecordCleaner::new(settings.cleaner.clone())))
        .with_transformer(Arc::new(RecordTransformer::new(
            settings.transformer.clone(),
        )));

    orchestrator = match &settings.storage {
        StorageSettings::Jsonl { path } => orchestrator.with_store(Arc::new(JsonlStore::new(path))),
        StorageSettings::Csv { path, delimiter } => {
            orchestrator.with_store(Arc::new(CsvStore::new(path).with_delimiter(*delimiter)))
        }
        StorageSettings::Memory => {
            warn!("memory storage configured; records will not outlive the process");
            orchestrator.with_store(Arc::new(trawl::MemoryStore::new()))
        }
    };

    orchestrator = match &settings.notifications.webhook {
        Some(url) => orchestrator
            .with_notifier(Arc::new(WebhookNotifier::new(url).map_err(
                |e| anyhow::anyhow!("webhook notifier: {e}"),
            )?)),
        None => orchestrator.with_notifier(Arc::new(LogNotifier)),
    };

    Ok(orchestrator)
}

fn storage_name(storage: &StorageSettings) -> &'static str {
    match storage {
        StorageSettings::Jsonl { .. } => "jsonl",
        StorageSettings::Csv { .. } => "csv",
        StorageSettings::Memory => "memory",
    }
}

/// A token that fires on the first Ctrl-C. A second Ctrl-C kills the
/// process the usual way.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let handle = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight work");
            handle.cancel();
        }
    });
    cancel
}

fn print_result(result: &RunResult) {
    println!(
        "{}: {:?} ({} pages fetched, {} failed, {} records stored, {} errors, {:.1}s)",
        result.target,
        result.status,
        result.counts.pages_fetched,
        result.counts.pages_failed,
        result.counts.records_stored,
        result.errors.len(),
        Duration::from_millis(result.duration_ms).as_secs_f64(),
    );
    for error in &result.errors {
        println!("  - [{:?}] {}", error.kind, error.message);
    }
}
