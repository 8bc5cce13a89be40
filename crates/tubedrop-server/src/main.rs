use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use tubedrop_client::YtDlpFetcher;
use tubedrop_core::{DownloadService, SystemClock};
use tubedrop_server::config::ServerConfig;
use tubedrop_server::routes;
use tubedrop_server::state::AppState;

const DEFAULT_DIRECTIVES: &str = "tubedrop_core=info,tubedrop_client=info,tubedrop_server=info,tower_http=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES)),
        )
        .with_target(false)
        .init();

    let config = ServerConfig::from_env()?;
    let addr = format!("0.0.0.0:{}", config.port);

    let fetcher = YtDlpFetcher::new(config.ytdlp_config())?;
    let service = DownloadService::new(fetcher, SystemClock, config.service_config());
    tracing::info!(
        workspace = %service.config().workspace_root.display(),
        ytdlp = %config.ytdlp_path.display(),
        "Download service ready"
    );

    let cancel = CancellationToken::new();
    let janitor = service.janitor().clone();
    let janitor_token = cancel.clone();
    let janitor_handle = tokio::spawn(async move { janitor.run(janitor_token).await });

    let state = Arc::new(AppState::new(service));

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!("Starting server on {addr}");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    let _ = janitor_handle.await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for CTRL+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
