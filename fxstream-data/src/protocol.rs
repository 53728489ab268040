//! JSON wire protocol between the server and its streaming clients.
//!
//! Messages are tagged by a `type` field. Unknown client message types
//! deserialise into [`ClientMessage::Unknown`] and are ignored without a
//! reply, so malformed clients cannot amplify log or reply noise.

use crate::{alert::AlertTriggered, tick::PriceState};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Messages a client may send over its streaming connection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Receive updates for every instrument.
    SubscribeAll,
    /// Restrict updates to the given symbols.
    Subscribe { symbols: Vec<String> },
    /// Remove symbols from an explicit subscription set.
    Unsubscribe { symbols: Vec<String> },
    /// One-shot price read over the stream.
    GetPrice { symbol: String },
    Ping,
    #[serde(other)]
    Unknown,
}

/// Messages the server pushes to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full price snapshot, sent once on connect before live updates.
    Snapshot { data: HashMap<String, PriceState> },
    /// One live price update.
    Price { data: PriceState },
    /// A fired alert. Never dropped from an outbound queue.
    AlertTriggered { data: AlertTriggered },
    /// Acknowledgement of a subscription change.
    Subscribed { symbols: serde_json::Value },
    Pong,
    /// Only sent in reply to `get_price` for an unknown symbol.
    Error { message: String },
}

impl ServerMessage {
    pub fn snapshot(states: Vec<PriceState>) -> Self {
        Self::Snapshot {
            data: states
                .into_iter()
                .map(|state| (state.symbol.to_string(), state))
                .collect(),
        }
    }

    pub fn price(state: PriceState) -> Self {
        Self::Price { data: state }
    }

    pub fn subscribed_all() -> Self {
        Self::Subscribed {
            symbols: serde_json::Value::from("all"),
        }
    }

    pub fn subscribed_to(symbols: &[String]) -> Self {
        Self::Subscribed {
            symbols: serde_json::json!(symbols),
        }
    }

    /// Whether the hub may drop this message from a saturated queue in
    /// favour of newer data. Alert triggers are never supersede-able.
    pub fn is_droppable(&self) -> bool {
        !matches!(self, ServerMessage::AlertTriggered { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_deserialise() {
        struct TestCase {
            input: &'static str,
            expected: ClientMessage,
        }

        let tests = vec![
            // TC0: subscribe_all
            TestCase {
                input: r#"{"type": "subscribe_all"}"#,
                expected: ClientMessage::SubscribeAll,
            },
            // TC1: subscribe with symbols
            TestCase {
                input: r#"{"type": "subscribe", "symbols": ["EURUSD", "gbpusd"]}"#,
                expected: ClientMessage::Subscribe {
                    symbols: vec!["EURUSD".to_string(), "gbpusd".to_string()],
                },
            },
            // TC2: get_price
            TestCase {
                input: r#"{"type": "get_price", "symbol": "XAUUSD"}"#,
                expected: ClientMessage::GetPrice {
                    symbol: "XAUUSD".to_string(),
                },
            },
            // TC3: ping
            TestCase {
                input: r#"{"type": "ping"}"#,
                expected: ClientMessage::Ping,
            },
            // TC4: unknown type is ignored, not an error
            TestCase {
                input: r#"{"type": "render_chart", "symbol": "EURUSD"}"#,
                expected: ClientMessage::Unknown,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = serde_json::from_str::<ClientMessage>(test.input);
            assert_eq!(actual.ok(), Some(test.expected), "TC{} failed", index);
        }
    }

    #[test]
    fn test_server_message_wire_shape() {
        let message = ServerMessage::Pong;
        assert_eq!(serde_json::to_string(&message).unwrap(), r#"{"type":"pong"}"#);

        let message = ServerMessage::subscribed_all();
        assert_eq!(
            serde_json::to_string(&message).unwrap(),
            r#"{"type":"subscribed","symbols":"all"}"#
        );
    }

    #[test]
    fn test_droppable_classification() {
        use crate::alert::{Alert, AlertCondition, AlertSpec, AlertState};
        use chrono::Utc;

        let mut alert = Alert::new(
            1,
            AlertSpec {
                guild_id: 1,
                user_id: 2,
                channel_id: 3,
                symbol: "eurusd".into(),
                condition: AlertCondition::Above,
                target_price: 1.1,
            },
            Utc::now(),
        );
        alert.state = AlertState::Triggered;

        let trigger = ServerMessage::AlertTriggered {
            data: AlertTriggered::new(&alert, 1.2, Utc::now()),
        };
        assert!(!trigger.is_droppable());
        assert!(ServerMessage::Pong.is_droppable());
    }
}
