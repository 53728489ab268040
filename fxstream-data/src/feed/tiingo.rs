//! Parsing of raw Tiingo FX WebSocket frames.
//!
//! Frames are tagged by `messageType`: "A" carries a quote payload as a
//! positional array, "H" is a heartbeat, "I" an informational response to
//! the subscribe request and "E" an upstream error.
//!
//! ### Raw quote frame example
//! ```json
//! {
//!     "messageType": "A",
//!     "service": "fx",
//!     "data": ["Q", "eurusd", "2024-01-05T12:00:00.123456+00:00",
//!              1000000, 1.09210, 1.09215, 1000000, 1.09220]
//! }
//! ```
//! Array positions: kind, ticker, timestamp, bid size, bid, mid, ask size,
//! ask.

use crate::error::FeedError;
use chrono::{DateTime, Utc};
use serde_json::Value;
use smol_str::SmolStr;

/// One upstream frame, classified.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamMessage {
    Quote(RawQuote),
    Heartbeat,
    /// Subscription/connection info, logged and otherwise ignored.
    Info,
    /// Upstream-reported error payload.
    UpstreamError(String),
    /// Anything unrecognised or non-quote; discarded without a log storm.
    Ignore,
}

/// A raw quote as published upstream, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawQuote {
    pub ticker: SmolStr,
    pub bid: f64,
    pub ask: f64,
    pub time: DateTime<Utc>,
}

/// Build the subscribe frame sent immediately after connecting.
pub fn subscribe_frame(api_key: &str, threshold_level: u8) -> String {
    serde_json::json!({
        "eventName": "subscribe",
        "authorization": api_key,
        "eventData": { "thresholdLevel": threshold_level }
    })
    .to_string()
}

/// Parse one raw frame. `received_at` stamps quotes whose timestamp field
/// is missing or unparseable.
pub fn parse(raw: &str, received_at: DateTime<Utc>) -> Result<UpstreamMessage, FeedError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|error| FeedError::Parse(error.to_string()))?;

    match value.get("messageType").and_then(Value::as_str) {
        Some("A") => Ok(parse_quote(&value, received_at)),
        Some("H") => Ok(UpstreamMessage::Heartbeat),
        Some("I") => Ok(UpstreamMessage::Info),
        Some("E") => Ok(UpstreamMessage::UpstreamError(
            value
                .get("response")
                .map(Value::to_string)
                .unwrap_or_else(|| value.to_string()),
        )),
        _ => Ok(UpstreamMessage::Ignore),
    }
}

fn parse_quote(value: &Value, received_at: DateTime<Utc>) -> UpstreamMessage {
    let Some(data) = value.get("data").and_then(Value::as_array) else {
        return UpstreamMessage::Ignore;
    };
    // Only "Q" (top-of-book quote) updates carry bid/ask.
    if data.first().and_then(Value::as_str) != Some("Q") || data.len() < 8 {
        return UpstreamMessage::Ignore;
    }

    let Some(ticker) = data.get(1).and_then(Value::as_str) else {
        return UpstreamMessage::Ignore;
    };
    let (Some(bid), Some(ask)) = (
        data.get(4).and_then(Value::as_f64),
        data.get(7).and_then(Value::as_f64),
    ) else {
        return UpstreamMessage::Ignore;
    };

    let time = data
        .get(2)
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|parsed| parsed.with_timezone(&Utc))
        .unwrap_or(received_at);

    UpstreamMessage::Quote(RawQuote {
        ticker: SmolStr::from(ticker),
        bid,
        ask,
        time,
    })
}
