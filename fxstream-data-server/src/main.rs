use fxstream_data::{
    feed::{self, FeedConfig},
    EngineConfig, FxEngine,
};
use std::sync::Arc;
use tokio::{net::TcpListener, sync::watch};
use tracing::{info, warn};

mod config;
mod session;
mod store;

use config::ServerConfig;
use store::FileAlertStore;

#[tokio::main]
async fn main() {
    init_logging();

    let config = ServerConfig::from_env();
    info!(?config.listen_addr, feed_url = %config.feed_url, "starting fxstream-data server");
    if config.api_key.is_empty() {
        warn!("TIINGO_API_KEY is empty, upstream subscribe will be rejected");
    }

    let alert_store = Arc::new(FileAlertStore::new(config.alert_store_path.clone()));
    let engine = Arc::new(FxEngine::new(
        EngineConfig {
            candle_capacity: config.candle_capacity,
            queue_capacity: config.queue_capacity,
        },
        alert_store,
    ));

    // Alert durability is best-effort: a broken store never stops ingest.
    if let Err(error) = engine.load_alerts().await {
        warn!(%error, "failed to load alerts from store, starting empty");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let feed_config = FeedConfig {
        url: config.feed_url.clone(),
        api_key: config.api_key.clone(),
        stale_after: config.stale_after,
        ..FeedConfig::default()
    };
    let (feed_handle, mut feed_state) = feed::spawn(engine.clone(), feed_config, shutdown_rx);

    tokio::spawn(async move {
        while feed_state.changed().await.is_ok() {
            let state = *feed_state.borrow();
            info!(?state, "feed connection state");
        }
    });

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .expect("failed to bind websocket listener");
    info!("listening on ws://{}", config.listen_addr);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    info!(%peer_addr, "new websocket connection");
                    tokio::spawn(session::handle_connection(engine.clone(), stream, peer_addr));
                }
                Err(error) => warn!(%error, "failed to accept connection"),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = feed_handle.await;
    info!("server stopped");
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
