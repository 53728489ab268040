//! Upstream feed supervisor.
//!
//! Owns the connection lifecycle against the upstream quote feed:
//! connect, subscribe, read, and reconnect with capped exponential
//! backoff and jitter. A read idle past the staleness threshold is
//! treated as silent stream death - the cache is marked stale and the
//! connection torn down so the supervisor can re-establish it.

use crate::{error::FeedError, pipeline::FxEngine};
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::watch,
    time::Instant,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

pub mod tiingo;

/// Connection lifecycle states of the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Backoff,
}

/// Supervisor configuration.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Upstream WebSocket endpoint.
    pub url: String,
    /// API key sent in the subscribe frame.
    pub api_key: String,
    /// Upstream quote-throttling level.
    pub threshold_level: u8,
    /// Read-idle period after which the cache is marked stale and the
    /// connection recycled.
    pub stale_after: Duration,
    pub backoff_base: Duration,
    pub backoff_ceiling: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: "wss://api.tiingo.com/fx".to_string(),
            api_key: String::new(),
            threshold_level: 5,
            stale_after: Duration::from_secs(60),
            backoff_base: Duration::from_millis(500),
            backoff_ceiling: Duration::from_secs(30),
        }
    }
}

/// Spawn the supervisor task. Returns its handle and a watch receiver of
/// the connection state for observability.
pub fn spawn(
    engine: Arc<FxEngine>,
    config: FeedConfig,
    shutdown: watch::Receiver<bool>,
) -> (tokio::task::JoinHandle<()>, watch::Receiver<ConnectionState>) {
    let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
    let handle = tokio::spawn(async move {
        run(engine, config, state_tx, shutdown).await;
    });
    (handle, state_rx)
}

async fn run(
    engine: Arc<FxEngine>,
    config: FeedConfig,
    state_tx: watch::Sender<ConnectionState>,
    mut shutdown: watch::Receiver<bool>,
) {
    let endpoint = match url::Url::parse(&config.url) {
        Ok(endpoint) => endpoint,
        Err(error) => {
            let error = FeedError::from(error);
            error!(%error, url = %config.url, "invalid feed url, supervisor not starting");
            let _ = state_tx.send(ConnectionState::Disconnected);
            return;
        }
    };

    info!(url = %endpoint, "starting feed supervisor");
    let mut attempt: u32 = 0;
    let mut last_data = Instant::now();

    loop {
        if *shutdown.borrow() {
            break;
        }
        let _ = state_tx.send(ConnectionState::Connecting);

        match connect_async(endpoint.as_str()).await {
            Ok((ws_stream, _)) => {
                info!("connected to upstream feed");
                let _ = state_tx.send(ConnectionState::Connected);
                attempt = 0;
                last_data = Instant::now();

                let (mut write, mut read) = ws_stream.split();
                let subscribe =
                    tiingo::subscribe_frame(&config.api_key, config.threshold_level);
                match write.send(Message::Text(subscribe.into())).await {
                    Ok(()) => {
                        read_stream(&engine, &config, &mut read, &mut last_data, &mut shutdown)
                            .await;
                    }
                    Err(error) => {
                        error!(%error, "failed to send subscribe frame");
                    }
                }
            }
            Err(error) => {
                error!(%error, url = %config.url, "failed to connect to upstream feed");
            }
        }

        if *shutdown.borrow() {
            break;
        }
        let _ = state_tx.send(ConnectionState::Backoff);
        attempt += 1;
        if last_data.elapsed() >= config.stale_after {
            engine.mark_stale();
        }

        let delay = backoff_delay(attempt, config.backoff_base, config.backoff_ceiling);
        debug!(?delay, attempt, "reconnecting after backoff");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
        if last_data.elapsed() >= config.stale_after {
            engine.mark_stale();
        }
    }

    let _ = state_tx.send(ConnectionState::Disconnected);
    info!("feed supervisor stopped");
}

/// Drive one established connection until it dies, goes silent, or
/// shutdown is requested.
async fn read_stream<S>(
    engine: &FxEngine,
    config: &FeedConfig,
    read: &mut S,
    last_data: &mut Instant,
    shutdown: &mut watch::Receiver<bool>,
) where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            next = tokio::time::timeout(config.stale_after, read.next()) => {
                match next {
                    Err(_) => {
                        warn!(
                            threshold_secs = config.stale_after.as_secs(),
                            "no upstream data within staleness threshold, marking cache stale and reconnecting"
                        );
                        engine.mark_stale();
                        return;
                    }
                    Ok(None) => {
                        info!("upstream stream ended");
                        return;
                    }
                    Ok(Some(Ok(Message::Text(text)))) => {
                        *last_data = Instant::now();
                        engine.ingest_frame(&text);
                    }
                    Ok(Some(Ok(Message::Close(_)))) => {
                        warn!("upstream closed connection");
                        return;
                    }
                    Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => {
                        *last_data = Instant::now();
                    }
                    Ok(Some(Ok(_))) => {}
                    Ok(Some(Err(error))) => {
                        let feed_error = FeedError::from(error);
                        error!(%feed_error, "upstream websocket error");
                        if feed_error.is_terminal() {
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Capped exponential backoff with half jitter: the delay for attempt `n`
/// lies in `[capped / 2, capped]` where `capped = min(base * 2^(n-1),
/// ceiling)`.
fn backoff_delay(attempt: u32, base: Duration, ceiling: Duration) -> Duration {
    let exp = base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1).min(16)));
    let capped = exp.min(ceiling);
    let half = capped / 2;
    half + rand::rng().random_range(Duration::ZERO..=half)
}
