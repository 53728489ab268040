//! # FxStream-Data
//! Real-time FX market data engine: normalised tick ingest, latest-value
//! price cache, multi-timeframe candle aggregation, on-demand technical
//! indicators, price alerts and backpressure-aware WebSocket fan-out.
//!
//! ## Architecture
//! A single logical ingest pipeline feeds every component in order:
//!
//! ```text
//! Feed Supervisor -> Tick Normaliser -> { Price Cache, Candle Aggregator }
//!                 -> Alert Engine -> Broadcast Hub -> subscribed clients
//! ```
//!
//! * [`feed`] owns the upstream connection lifecycle (reconnect, backoff,
//!   staleness detection) and frame parsing.
//! * [`pipeline::FxEngine`] validates ticks and commits them to the
//!   [`cache`] and [`candle`] series before the [`alert`] engine sees
//!   them, then fans updates out through the [`hub`].
//! * [`indicator`] derives reports from closed candles on demand.
//! * [`protocol`] defines the JSON wire contract with streaming clients.
//!
//! Fan-out is decoupled from ingest: each client has a private bounded
//! queue drained by its own writer task, so one stalled consumer can
//! never delay tick processing or delivery to others.

pub mod alert;
pub mod cache;
pub mod candle;
pub mod error;
pub mod feed;
pub mod hub;
pub mod indicator;
pub mod instrument;
pub mod pipeline;
pub mod protocol;
pub mod tick;

pub use crate::{
    alert::{Alert, AlertCondition, AlertSpec, AlertState, AlertTriggered},
    candle::{Candle, Timeframe},
    error::{FeedError, StoreError},
    pipeline::{EngineConfig, FxEngine},
    tick::{PriceState, Tick},
};
