//! The ingest pipeline and read-side API.
//!
//! One logical ingest path: upstream frame -> normalisation/validation ->
//! price cache -> candle aggregation -> alert evaluation -> hub fan-out,
//! sequential per tick. The cache is always updated before alerts run, so
//! an alert can never fire against the cache's prior value. Nothing on
//! this path blocks on network I/O - fan-out is an enqueue onto per-client
//! queues drained elsewhere.

use crate::{
    alert::{
        engine::AlertEngine,
        store::{AlertStore, StoreWriter},
        Alert, AlertSpec,
    },
    cache::PriceCache,
    candle::{aggregator::CandleAggregator, Candle, Timeframe, DEFAULT_SERIES_CAPACITY},
    error::StoreError,
    feed::tiingo::{self, UpstreamMessage},
    hub::{BroadcastHub, ClientHandle, ClientId, ClientKind, DEFAULT_QUEUE_CAPACITY},
    indicator::{self, IndicatorReport},
    instrument,
    protocol::{ClientMessage, ServerMessage},
    tick::{PriceState, Tick},
};
use chrono::Utc;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use tracing::{debug, info, warn};

/// Spread above this fraction of the bid is treated as bad upstream data.
const MAX_SPREAD_FRACTION: f64 = 0.01;

/// Bounds for the `limit` parameter of candle series reads.
const MAX_SERIES_LIMIT: usize = 500;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Closed candles retained per (instrument, timeframe).
    pub candle_capacity: usize,
    /// Per-client outbound queue capacity.
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            candle_capacity: DEFAULT_SERIES_CAPACITY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// The assembled engine: authoritative in-memory market state plus the
/// fan-out hub, shared behind an `Arc` between the ingest task, client
/// sessions and read-side callers.
pub struct FxEngine {
    cache: Arc<PriceCache>,
    candles: CandleAggregator,
    alerts: AlertEngine,
    hub: BroadcastHub,
    store: Arc<dyn AlertStore>,
    store_writer: StoreWriter,
    stale: AtomicBool,
    rejected_ticks: AtomicU64,
}

impl FxEngine {
    /// Build the engine over a durable alert store. Must be called within
    /// a tokio runtime (the store writer task spawns immediately).
    pub fn new(config: EngineConfig, store: Arc<dyn AlertStore>) -> Self {
        let cache = Arc::new(PriceCache::new());
        Self {
            cache: cache.clone(),
            candles: CandleAggregator::new(config.candle_capacity),
            alerts: AlertEngine::new(),
            hub: BroadcastHub::new(cache, config.queue_capacity),
            store_writer: StoreWriter::spawn(store.clone()),
            store,
            stale: AtomicBool::new(false),
            rejected_ticks: AtomicU64::new(0),
        }
    }

    /// Load all non-triggered alerts from the durable store. Called once
    /// at startup; a store failure leaves the engine empty but running.
    pub async fn load_alerts(&self) -> Result<usize, StoreError> {
        let alerts = self.store.load_armed().await?;
        let count = alerts.len();
        self.alerts.load(alerts);
        info!(count, "alerts loaded from store");
        Ok(count)
    }

    // ==================== Ingest path ====================

    /// Ingest one raw upstream frame. Malformed frames are dropped
    /// individually; the stream continues.
    pub fn ingest_frame(&self, raw: &str) {
        match tiingo::parse(raw, Utc::now()) {
            Ok(UpstreamMessage::Quote(quote)) => {
                let tick = Tick::new(&quote.ticker, quote.bid, quote.ask, quote.time);
                self.process_tick(tick);
            }
            Ok(UpstreamMessage::Heartbeat | UpstreamMessage::Ignore) => {}
            Ok(UpstreamMessage::Info) => debug!("upstream info frame"),
            Ok(UpstreamMessage::UpstreamError(message)) => {
                warn!(%message, "upstream error frame");
            }
            Err(error) => {
                debug!(%error, "discarded malformed upstream frame");
            }
        }
    }

    /// Validate and commit one tick. Returns whether it was accepted.
    ///
    /// Rejected ticks leave the cache and candle series untouched and are
    /// never seen by the alert engine.
    pub fn process_tick(&self, tick: Tick) -> bool {
        if tick.bid <= 0.0 || tick.ask <= 0.0 {
            return self.reject(&tick, "non-positive price");
        }
        if tick.bid > tick.ask {
            return self.reject(&tick, "bid above ask");
        }
        if tick.spread() / tick.bid > MAX_SPREAD_FRACTION {
            return self.reject(&tick, "spread over sanity bound");
        }
        if self
            .cache
            .last_time(&tick.instrument)
            .is_some_and(|last| tick.time < last)
        {
            return self.reject(&tick, "out of order");
        }

        // Cache first: alerts must see the tick the cache just committed.
        let state = self.cache.update(&tick);
        self.candles.update(&tick);

        if self.stale.swap(false, Ordering::AcqRel) {
            // First tick after a stale period: re-baseline instead of
            // evaluating, so a price gap across the outage cannot fire
            // spurious crossings.
            self.cache.mark_live();
            info!(instrument = %tick.instrument, "feed live again, alert evaluation resumed");
            self.alerts.rebaseline(&tick);
        } else {
            for trigger in self.alerts.evaluate(&tick) {
                self.store_writer.remove(trigger.alert_id);
                self.hub.publish_alert(&trigger);
            }
        }

        self.hub.publish_price(&state);
        true
    }

    fn reject(&self, tick: &Tick, reason: &'static str) -> bool {
        self.rejected_ticks.fetch_add(1, Ordering::Relaxed);
        debug!(
            instrument = %tick.instrument,
            bid = tick.bid,
            ask = tick.ask,
            reason,
            "tick rejected"
        );
        false
    }

    /// Mark the cache stale and suspend alert evaluation until data flows
    /// again. Invoked by the feed supervisor past the silence threshold.
    pub fn mark_stale(&self) {
        if !self.stale.swap(true, Ordering::AcqRel) {
            self.cache.mark_stale();
            warn!("price cache marked stale, alert evaluation suspended");
        }
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    /// Count of ticks dropped by validation since startup.
    pub fn rejected_ticks(&self) -> u64 {
        self.rejected_ticks.load(Ordering::Relaxed)
    }

    // ==================== Read-side API ====================

    pub fn price(&self, symbol: &str) -> Option<PriceState> {
        self.cache.get(&instrument::normalise(symbol))
    }

    pub fn prices(&self) -> Vec<PriceState> {
        self.cache.snapshot()
    }

    /// Candle series, oldest first, open candle included. `limit` is
    /// clamped to 1..=500.
    pub fn candles(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Vec<Candle> {
        let limit = limit.clamp(1, MAX_SERIES_LIMIT);
        self.candles
            .series(&instrument::normalise(symbol), timeframe, limit)
    }

    /// Indicator report over the closed candles of (symbol, timeframe).
    pub fn indicators(&self, symbol: &str, timeframe: Timeframe) -> IndicatorReport {
        let symbol = instrument::normalise(symbol);
        let closed = self
            .candles
            .closed_series(&symbol, timeframe, MAX_SERIES_LIMIT);
        indicator::analyze(symbol, timeframe, &closed, Utc::now())
    }

    // ==================== Alerts ====================

    pub fn create_alert(&self, spec: AlertSpec) -> Alert {
        let alert = self.alerts.insert(spec);
        self.store_writer.persist(&alert);
        alert
    }

    pub fn delete_alert(&self, id: u64) -> Option<Alert> {
        let alert = self.alerts.remove(id)?;
        self.store_writer.remove(id);
        Some(alert)
    }

    pub fn re_arm_alert(&self, id: u64) -> bool {
        if self.alerts.re_arm(id) {
            // Armed again means durable again.
            if let Some(alert) = self.alerts.get(id) {
                self.store_writer.persist(&alert);
            }
            true
        } else {
            false
        }
    }

    pub fn alerts_for_user(&self, user_id: u64) -> Vec<Alert> {
        self.alerts.alerts_for_user(user_id)
    }

    pub fn armed_alerts(&self) -> Vec<Alert> {
        self.alerts.all_armed()
    }

    // ==================== Clients ====================

    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }

    /// Register a streaming client: snapshot first, then live updates.
    pub fn connect_client(&self, kind: ClientKind) -> ClientHandle {
        self.hub.connect(kind)
    }

    pub fn disconnect_client(&self, id: ClientId) {
        self.hub.disconnect(id);
    }

    /// Apply one parsed client message. Unknown messages are ignored
    /// without a reply.
    pub fn handle_client_message(&self, id: ClientId, message: ClientMessage) {
        match message {
            ClientMessage::SubscribeAll => {
                self.hub.registry().subscribe_all(id);
                self.hub.reply(id, ServerMessage::subscribed_all());
            }
            ClientMessage::Subscribe { symbols } => {
                self.hub.registry().subscribe(id, &symbols);
                self.hub.reply(id, ServerMessage::subscribed_to(&symbols));
            }
            ClientMessage::Unsubscribe { symbols } => {
                self.hub.registry().unsubscribe(id, &symbols);
            }
            ClientMessage::GetPrice { symbol } => match self.price(&symbol) {
                Some(state) => self.hub.reply(id, ServerMessage::price(state)),
                None => self.hub.reply(
                    id,
                    ServerMessage::Error {
                        message: format!("Unknown symbol: {symbol}"),
                    },
                ),
            },
            ClientMessage::Ping => self.hub.reply(id, ServerMessage::Pong),
            ClientMessage::Unknown => {}
        }
    }
}

impl std::fmt::Debug for FxEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FxEngine")
            .field("instruments", &self.cache.len())
            .field("alerts", &self.alerts.len())
            .field("clients", &self.hub.registry().len())
            .field("stale", &self.is_stale())
            .finish()
    }
}
