use anyhow::{Context, Result};
use clap::Parser;
use shared::{api, Config, StoryStore};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "serve-stories")]
#[command(about = "Serve stored Hacker News stories over a read-only JSON API")]
struct Args {
    /// Port to listen on (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;
    let port = args.port.unwrap_or(config.port);

    let store = StoryStore::open(&config.database_url)?;
    let app = api::router(store);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;
    info!(port, database = %config.database_url, "Serving stories");

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
