use anyhow::Result;
use std::net::SocketAddr;
use tracing::info;

use chat2pay_api::{build_router, config::Settings, state::AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,chat2pay_api=debug".to_string()),
        )
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .init();

    info!("🚀 Starting chat2pay API...");

    let settings = Settings::load()?;
    info!(
        "✅ Configuration loaded (storage={:?}, llm={:?})",
        settings.storage.backend, settings.llm.provider
    );

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    let state = AppState::from_settings(settings).await?;
    let app = build_router(state);

    info!("🎯 Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
