//! On-demand technical indicators derived from a closed-candle series.
//!
//! Computation happens per request, never per tick. Each field that lacks
//! sufficient history is `None` - an incomplete report is a partial result,
//! not an error.

use crate::candle::{Candle, Timeframe};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

pub mod calc;
pub mod wilder;

/// Trend classification from the SMA(20)/SMA(50) relationship.
///
/// The single source of truth for trend labels; see [`Trend::classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Bullish,
    Bearish,
    Neutral,
}

impl Trend {
    pub fn classify(sma_20: Option<f64>, sma_50: Option<f64>) -> Self {
        match (sma_20, sma_50) {
            (Some(fast), Some(slow)) if fast > slow => Trend::Bullish,
            (Some(fast), Some(slow)) if fast < slow => Trend::Bearish,
            _ => Trend::Neutral,
        }
    }
}

/// RSI threshold classification: >= 70 overbought, <= 30 oversold.
///
/// The single source of truth for RSI labels; see [`RsiSignal::classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RsiSignal {
    Overbought,
    Oversold,
    Neutral,
}

impl RsiSignal {
    pub fn classify(rsi_14: Option<f64>) -> Self {
        match rsi_14 {
            Some(value) if value >= 70.0 => RsiSignal::Overbought,
            Some(value) if value <= 30.0 => RsiSignal::Oversold,
            _ => RsiSignal::Neutral,
        }
    }
}

/// Indicator snapshot for one (instrument, timeframe).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorReport {
    pub symbol: SmolStr,
    pub timeframe: Timeframe,
    pub timestamp: DateTime<Utc>,

    // Moving averages
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub sma_200: Option<f64>,
    pub ema_12: Option<f64>,
    pub ema_26: Option<f64>,

    // Oscillators
    pub rsi_14: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_histogram: Option<f64>,

    // Volatility
    pub atr_14: Option<f64>,
    pub bollinger_upper: Option<f64>,
    pub bollinger_middle: Option<f64>,
    pub bollinger_lower: Option<f64>,

    // Trend strength
    pub adx_14: Option<f64>,

    pub trend: Trend,
    pub rsi_signal: RsiSignal,
}

/// Compute the full report from CLOSED candles, oldest first.
///
/// Callers holding a series that still ends with the open candle must trim
/// it first (the engine read-path does).
pub fn analyze(
    symbol: SmolStr,
    timeframe: Timeframe,
    candles: &[Candle],
    now: DateTime<Utc>,
) -> IndicatorReport {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

    let sma_20 = calc::sma(&closes, 20);
    let sma_50 = calc::sma(&closes, 50);
    let rsi_14 = wilder::rsi(&closes, 14);
    let macd = calc::macd(&closes, 12, 26, 9);
    let bollinger = calc::bollinger(&closes, 20, 2.0);

    IndicatorReport {
        symbol,
        timeframe,
        timestamp: now,
        sma_20,
        sma_50,
        sma_200: calc::sma(&closes, 200),
        ema_12: calc::ema(&closes, 12),
        ema_26: calc::ema(&closes, 26),
        rsi_14,
        macd: macd.map(|(line, _, _)| line),
        macd_signal: macd.map(|(_, signal, _)| signal),
        macd_histogram: macd.map(|(_, _, histogram)| histogram),
        atr_14: wilder::atr(candles, 14),
        bollinger_upper: bollinger.map(|(upper, _, _)| upper),
        bollinger_middle: bollinger.map(|(_, middle, _)| middle),
        bollinger_lower: bollinger.map(|(_, _, lower)| lower),
        adx_14: wilder::adx(candles, 14),
        trend: Trend::classify(sma_20, sma_50),
        rsi_signal: RsiSignal::classify(rsi_14),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candles(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, close)| Candle {
                instrument: "EURUSD".into(),
                timeframe: Timeframe::H1,
                open_time: DateTime::from_timestamp(i as i64 * 3600, 0).unwrap(),
                open: *close,
                high: close + 0.5,
                low: close - 0.5,
                close: *close,
            })
            .collect()
    }

    #[test]
    fn test_partial_report_on_short_history() {
        let series = candles(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0,
                               11.0, 12.0, 13.0, 14.0, 15.0, 16.0, 17.0, 18.0, 19.0, 20.0,
                               21.0, 22.0]);
        let report = analyze("EURUSD".into(), Timeframe::H1, &series, Utc::now());

        // 22 closes: SMA20 present, SMA50/200 and MACD absent, RSI present.
        assert!(report.sma_20.is_some());
        assert_eq!(report.sma_50, None);
        assert_eq!(report.sma_200, None);
        assert_eq!(report.macd, None);
        assert!(report.rsi_14.is_some());
        assert!(report.atr_14.is_some());
        assert!(report.bollinger_middle.is_some());
        assert_eq!(report.adx_14, None);
    }

    #[test]
    fn test_signal_labels() {
        struct TestCase {
            sma_20: Option<f64>,
            sma_50: Option<f64>,
            rsi: Option<f64>,
            expected_trend: Trend,
            expected_rsi: RsiSignal,
        }

        let tests = vec![
            // TC0: fast above slow, hot RSI
            TestCase {
                sma_20: Some(1.2),
                sma_50: Some(1.1),
                rsi: Some(70.0),
                expected_trend: Trend::Bullish,
                expected_rsi: RsiSignal::Overbought,
            },
            // TC1: fast below slow, washed-out RSI
            TestCase {
                sma_20: Some(1.0),
                sma_50: Some(1.1),
                rsi: Some(30.0),
                expected_trend: Trend::Bearish,
                expected_rsi: RsiSignal::Oversold,
            },
            // TC2: missing inputs stay neutral
            TestCase {
                sma_20: Some(1.0),
                sma_50: None,
                rsi: None,
                expected_trend: Trend::Neutral,
                expected_rsi: RsiSignal::Neutral,
            },
            // TC3: mid-range RSI is neutral
            TestCase {
                sma_20: Some(1.1),
                sma_50: Some(1.1),
                rsi: Some(50.0),
                expected_trend: Trend::Neutral,
                expected_rsi: RsiSignal::Neutral,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            assert_eq!(
                Trend::classify(test.sma_20, test.sma_50),
                test.expected_trend,
                "TC{} failed",
                index
            );
            assert_eq!(
                RsiSignal::classify(test.rsi),
                test.expected_rsi,
                "TC{} failed",
                index
            );
        }
    }

    #[test]
    fn test_rising_series_is_bullish() {
        let closes: Vec<f64> = (1..=60).map(f64::from).collect();
        let report = analyze("EURUSD".into(), Timeframe::H1, &candles(&closes), Utc::now());
        assert_eq!(report.trend, Trend::Bullish);
        assert_eq!(report.rsi_signal, RsiSignal::Overbought);
        assert!(report.macd.is_some());
        assert!(report.adx_14.is_some());
    }
}
