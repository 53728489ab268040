//! Wilder-smoothed oscillators: RSI, ATR, ADX.

use crate::candle::Candle;
use itertools::Itertools;

/// Relative Strength Index over closes, Wilder smoothing of average
/// gain/loss. Returns 100 when the average loss is zero.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let changes: Vec<f64> = closes
        .iter()
        .tuple_windows()
        .map(|(prev, next)| next - prev)
        .collect();

    let mut avg_gain = changes[..period].iter().filter(|c| **c > 0.0).sum::<f64>() / period as f64;
    let mut avg_loss = -changes[..period].iter().filter(|c| **c < 0.0).sum::<f64>() / period as f64;

    let w = period as f64;
    for change in &changes[period..] {
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        avg_gain = (avg_gain * (w - 1.0) + gain) / w;
        avg_loss = (avg_loss * (w - 1.0) + loss) / w;
    }

    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// True range of a candle given the previous close.
fn true_range(candle: &Candle, prev_close: f64) -> f64 {
    (candle.high - candle.low)
        .max((candle.high - prev_close).abs())
        .max((candle.low - prev_close).abs())
}

/// Average True Range, Wilder smoothing. Needs `period + 1` candles.
pub fn atr(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    let ranges: Vec<f64> = candles
        .iter()
        .tuple_windows()
        .map(|(prev, next)| true_range(next, prev.close))
        .collect();

    let w = period as f64;
    let mut value = ranges[..period].iter().sum::<f64>() / w;
    for tr in &ranges[period..] {
        value = (value * (w - 1.0) + tr) / w;
    }
    Some(value)
}

/// Average Directional Index.
///
/// +DM/-DM and TR are Wilder-smoothed with the running-sum form
/// (`s = s - s/n + x`), DI lines derived from them, and the resulting DX
/// series Wilder-smoothed into the ADX. Needs `2 * period + 1` candles.
pub fn adx(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < 2 * period + 1 {
        return None;
    }

    let mut plus_dm = Vec::with_capacity(candles.len() - 1);
    let mut minus_dm = Vec::with_capacity(candles.len() - 1);
    let mut ranges = Vec::with_capacity(candles.len() - 1);

    for (prev, next) in candles.iter().tuple_windows() {
        let up_move = next.high - prev.high;
        let down_move = prev.low - next.low;
        plus_dm.push(if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        });
        minus_dm.push(if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        });
        ranges.push(true_range(next, prev.close));
    }

    let w = period as f64;
    let mut smoothed_plus = plus_dm[..period].iter().sum::<f64>();
    let mut smoothed_minus = minus_dm[..period].iter().sum::<f64>();
    let mut smoothed_tr = ranges[..period].iter().sum::<f64>();

    let dx_of = |plus: f64, minus: f64, tr: f64| -> f64 {
        if tr <= 0.0 {
            return 0.0;
        }
        let di_plus = plus / tr * 100.0;
        let di_minus = minus / tr * 100.0;
        let di_sum = di_plus + di_minus;
        if di_sum == 0.0 {
            0.0
        } else {
            (di_plus - di_minus).abs() / di_sum * 100.0
        }
    };

    let mut dx_values = vec![dx_of(smoothed_plus, smoothed_minus, smoothed_tr)];
    for i in period..ranges.len() {
        smoothed_plus = smoothed_plus - smoothed_plus / w + plus_dm[i];
        smoothed_minus = smoothed_minus - smoothed_minus / w + minus_dm[i];
        smoothed_tr = smoothed_tr - smoothed_tr / w + ranges[i];
        dx_values.push(dx_of(smoothed_plus, smoothed_minus, smoothed_tr));
    }

    let mut value = dx_values[..period].iter().sum::<f64>() / w;
    for dx in &dx_values[period..] {
        value = (value * (w - 1.0) + dx) / w;
    }
    Some(value)
}
