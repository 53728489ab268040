use std::{net::SocketAddr, path::PathBuf, time::Duration};

/// Server configuration, read from the environment with sane defaults.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// WebSocket listen address (`FX_WS_ADDR`, default 0.0.0.0:9001).
    pub listen_addr: SocketAddr,
    /// Upstream feed endpoint (`TIINGO_WS_URL`).
    pub feed_url: String,
    /// Upstream API key (`TIINGO_API_KEY`).
    pub api_key: String,
    /// Per-client outbound queue capacity (`FX_QUEUE_CAPACITY`).
    pub queue_capacity: usize,
    /// Closed candles kept per series (`FX_CANDLE_CAPACITY`).
    pub candle_capacity: usize,
    /// Feed silence threshold before the cache is marked stale
    /// (`FX_STALE_AFTER_SECS`).
    pub stale_after: Duration,
    /// JSON file backing the alert store (`FX_ALERT_STORE`).
    pub alert_store_path: PathBuf,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            listen_addr: env_or("FX_WS_ADDR", "0.0.0.0:9001".parse().unwrap()),
            feed_url: std::env::var("TIINGO_WS_URL")
                .unwrap_or_else(|_| "wss://api.tiingo.com/fx".to_string()),
            api_key: std::env::var("TIINGO_API_KEY").unwrap_or_default(),
            queue_capacity: env_or("FX_QUEUE_CAPACITY", 256),
            candle_capacity: env_or("FX_CANDLE_CAPACITY", 500),
            stale_after: Duration::from_secs(env_or("FX_STALE_AFTER_SECS", 60)),
            alert_store_path: env_or("FX_ALERT_STORE", PathBuf::from("alerts.json")),
        }
    }
}
