mod auth;
mod clock;
mod config;
mod error;
mod handlers;
mod metrics;
mod models;
mod rate_limit;
mod secrets;
mod state;

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::clock::SystemClock;
use crate::config::{Args, Settings};
use crate::rate_limit::{Policy, RateLimiterRegistry, sweeper};
use crate::state::AppState;

// this is main async function with tokio
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // parse cli arguments
    let args = Args::parse();
    let limits = args.limits()?;
    let sweep_every = args.sweep_every()?;

    // secrets first, then settings on top of them
    let secrets = secrets::collect(&args.secret_sources()).await;
    let settings = Settings::load(&args.env_file, secrets)?;
    settings.ensure_dirs()?;
    tracing::debug!(?settings, "settings resolved");

    if settings.api_key.is_empty() {
        tracing::warn!("API_KEY is not set; every guarded request will be rejected");
    }

    let limiters = Arc::new(RateLimiterRegistry::new(limits, Arc::new(SystemClock)));
    for policy in Policy::ALL {
        let config = limiters.get(policy).config();
        tracing::info!(
            %policy,
            limit = config.limit(),
            window_secs = config.window().as_secs(),
            "rate limit policy"
        );
    }

    // spawn the background sweeper
    tokio::spawn(sweeper(Arc::clone(&limiters), sweep_every));

    let app_name = settings.app_name.clone();
    let state = Arc::new(AppState::new(settings, limiters));
    let app = handlers::router(state);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(app = %app_name, %addr, "gateway listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
