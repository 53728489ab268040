use crate::instrument;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// One validated bid/ask quote for an instrument at a point in time.
///
/// Produced by the tick normaliser from raw upstream frames; everything
/// downstream (cache, candles, alerts, fan-out) consumes these.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    /// Normalised uppercase instrument code.
    pub instrument: SmolStr,
    pub bid: f64,
    pub ask: f64,
    pub time: DateTime<Utc>,
}

impl Tick {
    pub fn new(instrument: impl AsRef<str>, bid: f64, ask: f64, time: DateTime<Utc>) -> Self {
        Self {
            instrument: instrument::normalise(instrument.as_ref()),
            bid,
            ask,
            time,
        }
    }

    /// Mid price, the value candles and alerts are built from.
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }
}

/// Latest known price state for one instrument.
///
/// Exactly one live instance per instrument, owned by the
/// [`PriceCache`](crate::cache::PriceCache). Serialises directly into the
/// wire `snapshot` / `price` payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceState {
    pub symbol: SmolStr,
    pub bid: f64,
    pub ask: f64,
    pub mid: f64,
    pub spread: f64,
    pub spread_pips: f64,
    pub timestamp: DateTime<Utc>,
    /// Set when the upstream feed has gone silent past the staleness
    /// threshold. Stale prices are still served, never cleared.
    #[serde(default)]
    pub stale: bool,
}

impl From<&Tick> for PriceState {
    fn from(tick: &Tick) -> Self {
        let spread = tick.spread();
        Self {
            symbol: tick.instrument.clone(),
            bid: tick.bid,
            ask: tick.ask,
            mid: tick.mid(),
            spread,
            spread_pips: spread / instrument::pip_size(&tick.instrument),
            timestamp: tick.time,
            stale: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(symbol: &str, bid: f64, ask: f64) -> Tick {
        Tick::new(symbol, bid, ask, Utc::now())
    }

    #[test]
    fn test_mid_and_spread() {
        let t = tick("eurusd", 1.0920, 1.0922);
        assert!((t.mid() - 1.0921).abs() < 1e-12);
        assert!((t.spread() - 0.0002).abs() < 1e-12);
        assert_eq!(t.instrument, "EURUSD");
    }

    #[test]
    fn test_spread_pips_by_class() {
        struct TestCase {
            input: Tick,
            expected_pips: f64,
        }

        let tests = vec![
            // TC0: standard pair, 2 pips
            TestCase {
                input: tick("eurusd", 1.0920, 1.0922),
                expected_pips: 2.0,
            },
            // TC1: JPY cross, 3 pips
            TestCase {
                input: tick("usdjpy", 151.20, 151.23),
                expected_pips: 3.0,
            },
            // TC2: gold, 50 pips
            TestCase {
                input: tick("xauusd", 2000.0, 2000.5),
                expected_pips: 50.0,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let state = PriceState::from(&test.input);
            assert!(
                (state.spread_pips - test.expected_pips).abs() < 1e-6,
                "TC{} failed: {} != {}",
                index,
                state.spread_pips,
                test.expected_pips
            );
            assert!(!state.stale, "TC{} failed", index);
        }
    }
}
