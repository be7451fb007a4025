use std::net::SocketAddr;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod context;
mod db;
mod engine;
mod errors;
mod ledger;
mod metrics;
mod models;
mod orchestrator;
mod risk;
mod seed;
mod trigger_monitor;
mod utils;

use crate::config::EngineConfig;
use crate::context::EngineContext;
use crate::orchestrator::TradingService;
use crate::trigger_monitor::TriggerMonitor;

#[derive(Parser)]
#[command(name = "spotclob-engine", about = "Spot CLOB matching engine, risk-gate, and settlement ledger")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the matching engine, trigger monitor, and HTTP health/metrics surface. Default.
    Serve,
    /// Apply pending schema migrations and exit.
    Migrate,
    /// Populate demo trading pairs, users, and starting balances.
    Seed,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::load()?;
    tracing::info!(database_url = %redact(&config.database_url), "loaded configuration");

    let pool = db::connect(&config.database_url).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Migrate => {
            tracing::info!("running pending migrations");
            db::run_migrations(&pool).await?;
            tracing::info!("migrations applied");
        }
        Command::Seed => {
            db::run_migrations(&pool).await?;
            tracing::info!("seeding demo data");
            seed::run(&pool).await?;
            tracing::info!("seed complete");
        }
        Command::Serve => serve(config, pool).await?,
    }

    Ok(())
}

async fn serve(config: EngineConfig, pool: sqlx::PgPool) -> anyhow::Result<()> {
    db::run_migrations(&pool).await?;

    let metrics_handle = metrics::init_metrics();

    let http_port = config.http_port;
    let trigger_enabled = config.trigger_monitor_enabled;
    let trigger_tick_secs = config.trigger_tick_interval_secs;

    let ctx = EngineContext::new(config, pool);
    let service = TradingService::new(ctx);

    if trigger_enabled {
        tracing::info!(tick_interval_secs = trigger_tick_secs, "starting trigger monitor");
        TriggerMonitor::new(service.clone(), Duration::from_secs(trigger_tick_secs)).start();
    } else {
        tracing::info!("trigger monitor disabled");
    }

    let state = api::AppState { service, metrics_handle };
    let app = api::routes::create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], http_port));
    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Strips credentials from a connection string before it is logged.
fn redact(database_url: &str) -> String {
    match database_url.find('@') {
        Some(at) => match database_url.find("://") {
            Some(scheme_end) => format!("{}://***{}", &database_url[..scheme_end], &database_url[at..]),
            None => "***".to_string(),
        },
        None => database_url.to_string(),
    }
}
