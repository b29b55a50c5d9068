use std::path::PathBuf;

use book_club::{
    config::Config,
    database,
    server::{AppState, app},
    utils::init_log,
};
use clap::Parser;
use tracing::info;

#[derive(Debug, Parser)]
#[command(author, version, about = "Book club API server")]
struct Args {
    /// TOML config file; BOOK_CLUB_* environment variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short, long)]
    database: Option<String>,
    #[arg(short = 'H', long)]
    host: Option<String>,
    #[arg(short, long)]
    port: Option<u16>,
    /// Write daily-rotated logs here instead of stdout
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(database) = args.database {
        config.database_url = database;
    }
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if args.log_dir.is_some() {
        config.log_dir = args.log_dir;
    }
    let _guard = init_log(config.log_dir.clone(), &config.log_level)?;

    let pool = database::connect(&config.database_url).await?;
    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(pool, config)?;

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Starting server at http://{addr}");
    info!("OpenAPI document at http://{addr}/api-docs/openapi.json");
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
