use std::sync::Arc;

use anyhow::Context;
use clap::Parser; // for cli
use tracing_subscriber::EnvFilter;

use portal_gateway::clock::SystemClock;
use portal_gateway::config::Args;
use portal_gateway::handlers;
use portal_gateway::state::AppState;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

// this is main async function with tokio
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // parse cli arguments
    let args = Args::parse();
    init_tracing(args.log_json);

    let store = args.build_store();
    let portal = args.portal();

    // creating shared state, this also starts the live feeds
    let state = Arc::new(AppState::new(store, Arc::new(SystemClock), portal));
    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!(port = args.port, "gateway running on http://localhost:{}", args.port);
    tracing::info!(store = %args.store, "document store");
    tracing::info!(
        quota = portal.course_quota,
        "course submissions limited per author per calendar month"
    );

    axum::serve(listener, app)
        .await
        .context("server error")?;
    Ok(())
}
