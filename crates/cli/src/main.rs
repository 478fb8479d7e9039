//! `crm-workflows` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`    start the API server (and, by default, the resume scheduler).
//! - `worker`   run only the resume scheduler.
//! - `migrate`  run pending database migrations.
//! - `validate` validate a workflow definition file.

mod config;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use engine::collaborators::postgres_collaborators;
use engine::{PgStore, Scheduler, WorkflowDefinition, WorkflowEngine, WorkflowStore};
use steps::{Collaborators, StepRegistry, StepSettings};

use crate::config::AppConfig;

#[derive(Parser)]
#[command(
    name = "crm-workflows",
    about = "Event-driven workflow engine for CRM automation",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server.
    Serve {
        /// Overrides WORKFLOWS_HOST / WORKFLOWS_PORT.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Resume due timed waits; no HTTP surface.
    Worker,
    /// Run pending database migrations.
    Migrate {
        /// Overrides WORKFLOWS_DATABASE_URL.
        #[arg(long)]
        database_url: Option<String>,
    },
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::from_env().context("invalid WORKFLOWS_* configuration")?;

    match cli.command {
        Command::Serve { bind } => serve(config, bind).await,
        Command::Worker => worker(config).await,
        Command::Migrate { database_url } => {
            let url = database_url.unwrap_or_else(|| config.database_url.clone());
            let pool = db::connect(&url, 2)
                .await
                .context("failed to connect to database")?;
            db::pool::run_migrations(&pool).await.context("migration failed")?;
            info!("Migrations applied successfully");
            Ok(())
        }
        Command::Validate { path } => validate(&path),
    }
}

async fn serve(config: AppConfig, bind: Option<String>) -> anyhow::Result<()> {
    let bind = bind.unwrap_or_else(|| config.bind_address());
    let engine = build_engine(&config).await?;
    let stop = shutdown_channel();

    let scheduler = config.run_scheduler.then(|| {
        tokio::spawn(Scheduler::new(Arc::clone(&engine)).run(stopped(stop.clone())))
    });

    info!(version = env!("CARGO_PKG_VERSION"), "Starting API server on {bind}");
    api::serve(&bind, api::AppState::new(engine), stopped(stop))
        .await
        .with_context(|| format!("API server on {bind} failed"))?;

    if let Some(handle) = scheduler {
        handle.await.context("scheduler task aborted")?;
    }
    info!("Shutdown complete");
    Ok(())
}

async fn worker(config: AppConfig) -> anyhow::Result<()> {
    let engine = build_engine(&config).await?;
    let stop = shutdown_channel();

    info!("Starting resume worker");
    Scheduler::new(engine).run(stopped(stop)).await;
    Ok(())
}

fn validate(path: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    let definition: WorkflowDefinition =
        serde_json::from_str(&content).context("invalid workflow JSON")?;

    let registry = StepRegistry::builtin(Collaborators::disconnected(), StepSettings::default());
    let (workflow, mut steps) = definition.into_parts();

    match engine::validate_steps(&steps, &registry) {
        Ok(()) => {
            steps.sort_by_key(|s| s.sort_order);
            let order: Vec<String> = steps
                .iter()
                .map(|s| format!("{} ({})", s.sort_order, s.step_type))
                .collect();
            println!(
                "✅ Workflow \"{}\" on {} is valid. Execution order: {}",
                workflow.name,
                workflow.trigger_type,
                order.join(" -> ")
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Validation failed: {e}");
            std::process::exit(1);
        }
    }
}

async fn build_engine(config: &AppConfig) -> anyhow::Result<Arc<WorkflowEngine>> {
    let pool = db::connect(&config.database_url, config.max_connections)
        .await
        .context("failed to connect to database")?;

    let collaborators = postgres_collaborators(pool.clone(), config.http_timeout())
        .context("failed to build step collaborators")?;
    let registry = StepRegistry::builtin(collaborators, config.step_settings());
    let store: Arc<dyn WorkflowStore> = Arc::new(PgStore::new(pool));

    info!(step_types = ?registry.step_types(), "Engine ready");
    Ok(Arc::new(WorkflowEngine::new(store, registry, config.engine())))
}

/// Flips to `true` once on Ctrl+C or SIGTERM.
fn shutdown_channel() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = tx.send(true);
    });
    rx
}

fn stopped(mut rx: watch::Receiver<bool>) -> impl Future<Output = ()> + Send + 'static {
    async move {
        let _ = rx.wait_for(|stop| *stop).await;
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, starting graceful shutdown"),
    }
}
