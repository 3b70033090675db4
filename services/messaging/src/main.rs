use anyhow::Context as _;
use sea_orm::Database;
use tracing::info;

use courier_core::tracing::init_tracing;
use courier_messaging::config::MessagingConfig;
use courier_messaging::infra::flow::load_flow;
use courier_messaging::router::build_router;
use courier_messaging::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("courier_messaging=info,tower_http=info");

    let config = MessagingConfig::from_env()?;

    let db = Database::connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    let flow = load_flow(&config.flow_definition_path)?;
    let state = AppState::new(db, &config, flow)?;

    // Retry worker
    let worker = state.retry_worker();
    let poll_interval = config.worker_poll_interval;
    tokio::spawn(async move { worker.run(poll_interval).await });

    // HTTP server
    let router = build_router(state);
    let http_addr = format!("0.0.0.0:{}", config.messaging_port);
    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("failed to bind {http_addr}"))?;

    info!("messaging service listening on {http_addr}");
    axum::serve(listener, router).await.context("server error")?;
    Ok(())
}
