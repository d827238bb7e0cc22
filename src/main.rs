use std::{net::SocketAddr, sync::Arc};

use canopy::{
    common::{AnyResult, banner, logger},
    configs::Config,
    engine::SoundscapeEngine,
    server::AppState,
    transport,
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> AnyResult<()> {
    banner::print_banner(&banner::BannerInfo::default());

    let config = Config::load().inspect_err(|e| eprintln!("Failed to load configuration: {}", e))?;
    logger::init(config.logging.as_ref());

    let engine = SoundscapeEngine::from_config(&config)?;
    engine.start();
    info!(
        "Loaded {} channels and {} forests",
        engine.player().catalog().len(),
        config.forests.len()
    );

    let address: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let state = Arc::new(AppState::new(engine.clone(), config));
    let app = transport::http_server::router(state);

    let listener = tokio::net::TcpListener::bind(address).await?;
    info!("Canopy listening on {}", address);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    engine.teardown().await;
    info!("Bye");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
    }
    info!("Shutdown requested");
}
