//! Casework Workflow Engine
//!
//! Listens for case events, task completions and operator commands on NATS
//! and drives workflow executions stored in PostgreSQL.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use casework_engine::{
    config::{AppConfig, DatabaseConfig},
    db::{create_pool, health_check, init_schema},
    engine::{Collaborators, TaskBridge, WorkflowEngine},
    nats::{Intake, NatsNotifier},
    services::{AiAdvisor, DisabledAdvisor, HttpAdvisor},
    store::PgStore,
};

#[derive(Parser, Debug)]
#[command(name = "casework-engine", version, about = "Case-management workflow engine")]
struct Cli {
    /// Apply the database schema before starting
    #[arg(long)]
    init_schema: bool,

    /// Load environment variables from this file instead of `.env`
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,
}

/// Initialize tracing/logging.
fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,casework_engine=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn build_advisor(config: &AppConfig) -> anyhow::Result<Arc<dyn AiAdvisor>> {
    match HttpAdvisor::from_config(config)? {
        Some(advisor) => {
            tracing::info!(model = %config.ai_model, "AI advisor enabled");
            Ok(Arc::new(advisor))
        }
        None => {
            tracing::info!("AI advisor not configured, review and classification steps will skip");
            Ok(Arc::new(DisabledAdvisor))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load environment variables from .env file if present
    match &cli.env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("failed to load env file {}", path.display()))?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    let app_config = AppConfig::from_env().context("invalid CASEWORK_* configuration")?;
    init_tracing(app_config.log_json);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        server = %app_config.server_name,
        "Starting casework workflow engine"
    );

    let db_config = DatabaseConfig::from_env().context("invalid POSTGRES_* configuration")?;
    let db_pool = create_pool(&db_config).await?;
    anyhow::ensure!(health_check(&db_pool).await, "database health check failed");
    if cli.init_schema || app_config.init_schema {
        init_schema(&db_pool).await?;
        tracing::info!("Database schema applied");
    }

    let nats_url = app_config
        .nats_url
        .clone()
        .context("CASEWORK_NATS_URL is required to receive workflow events")?;
    let nats = async_nats::ConnectOptions::new()
        .name(&app_config.server_name)
        .connect(nats_url.as_str())
        .await
        .with_context(|| format!("failed to connect to NATS at {}", nats_url))?;
    tracing::info!(url = %nats_url, "Connected to NATS");

    let notifier = NatsNotifier::new(nats.clone(), &app_config.notification_subject).await?;
    let advisor = build_advisor(&app_config)?;
    let store = Arc::new(PgStore::new(db_pool));

    let engine = Arc::new(
        WorkflowEngine::new(Collaborators::from_store(store, Arc::new(notifier), advisor))
            .with_staff_role(&app_config.staff_role),
    );
    let bridge = Arc::new(TaskBridge::new(engine.clone()));

    let recovered = engine
        .recover()
        .await
        .context("failed to recover interrupted executions")?;
    if !recovered.is_empty() {
        tracing::info!(count = recovered.len(), "Interrupted executions recovered");
    }

    Intake::new(engine, bridge)
        .run(nats, &app_config, shutdown_signal())
        .await?;

    tracing::info!("Engine shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
