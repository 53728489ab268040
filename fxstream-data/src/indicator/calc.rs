//! Moving-average family: SMA, SMA-seeded EMA, MACD, Bollinger Bands.

/// Simple moving average of the last `period` values.
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    Some(values[values.len() - period..].iter().sum::<f64>() / period as f64)
}

/// Population standard deviation (ddof = 0) of the last `period` values.
pub fn stddev_pop(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    let mean = window.iter().sum::<f64>() / period as f64;
    let variance = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / period as f64;
    Some(variance.sqrt())
}

/// Exponential moving average with smoothing factor `2 / (period + 1)`,
/// seeded with the SMA of the first `period` values.
pub fn ema(values: &[f64], period: usize) -> Option<f64> {
    ema_series(values, period).and_then(|series| series.last().copied())
}

/// Full EMA series starting from its SMA seed.
///
/// Entry `i` corresponds to input index `period - 1 + i`.
fn ema_series(values: &[f64], period: usize) -> Option<Vec<f64>> {
    if period == 0 || values.len() < period {
        return None;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;
    let mut series = Vec::with_capacity(values.len() - period + 1);
    series.push(seed);
    let mut current = seed;
    for value in &values[period..] {
        current = alpha * value + (1.0 - alpha) * current;
        series.push(current);
    }
    Some(series)
}

/// MACD line, signal line and histogram.
///
/// line = EMA(fast) - EMA(slow); signal = EMA(signal_period) of the line;
/// histogram = line - signal. Needs `slow + signal_period - 1` values.
pub fn macd(
    values: &[f64],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> Option<(f64, f64, f64)> {
    let fast_series = ema_series(values, fast)?;
    let slow_series = ema_series(values, slow)?;

    // Align both series on the slow EMA's first defined index.
    let line: Vec<f64> = fast_series[slow - fast..]
        .iter()
        .zip(&slow_series)
        .map(|(f, s)| f - s)
        .collect();

    let signal = ema(&line, signal_period)?;
    let macd_line = *line.last()?;
    Some((macd_line, signal, macd_line - signal))
}

/// Bollinger Bands: SMA(period) +/- `num_std` population deviations.
pub fn bollinger(values: &[f64], period: usize, num_std: f64) -> Option<(f64, f64, f64)> {
    let middle = sma(values, period)?;
    let std = stddev_pop(values, period)?;
    Some((middle + num_std * std, middle, middle - num_std * std))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma_reference() {
        assert_eq!(sma(&[1.0, 2.0, 3.0], 3), Some(2.0));
        assert_eq!(sma(&[1.0, 2.0], 3), None);
        // Only the last `period` values count.
        assert_eq!(sma(&[100.0, 1.0, 2.0, 3.0], 3), Some(2.0));
    }

    #[test]
    fn test_ema_sma_seeded() {
        // Seed = SMA(10, 11, 12) = 11; then 0.5 * 13 + 0.5 * 11 = 12.
        let value = ema(&[10.0, 11.0, 12.0, 13.0], 3).unwrap();
        assert!((value - 12.0).abs() < 1e-10);

        // Linear ramp 1..=40: EMA(12) settles to price - lag, lag = (n-1)/2.
        let ramp: Vec<f64> = (1..=40).map(f64::from).collect();
        let value = ema(&ramp, 12).unwrap();
        assert!((value - 34.5).abs() < 1e-9);
    }

    #[test]
    fn test_macd_reference() {
        // Constant series: every EMA equals the constant, MACD all zero.
        let flat = vec![5.0; 40];
        let (line, signal, histogram) = macd(&flat, 12, 26, 9).unwrap();
        assert!(line.abs() < 1e-12);
        assert!(signal.abs() < 1e-12);
        assert!(histogram.abs() < 1e-12);

        // Linear ramp: line settles to slow_lag - fast_lag = 7, histogram -> 0.
        let ramp: Vec<f64> = (1..=40).map(f64::from).collect();
        let (line, signal, histogram) = macd(&ramp, 12, 26, 9).unwrap();
        assert!((line - 7.0).abs() < 1e-9);
        assert!((signal - 7.0).abs() < 1e-9);
        assert!(histogram.abs() < 1e-9);
    }

    #[test]
    fn test_macd_insufficient_history() {
        // Needs slow + signal - 1 = 34 values.
        let short: Vec<f64> = (1..=33).map(f64::from).collect();
        assert_eq!(macd(&short, 12, 26, 9), None);
        let enough: Vec<f64> = (1..=34).map(f64::from).collect();
        assert!(macd(&enough, 12, 26, 9).is_some());
    }

    #[test]
    fn test_bollinger_reference() {
        let values: Vec<f64> = (1..=20).map(f64::from).collect();
        let (upper, middle, lower) = bollinger(&values, 20, 2.0).unwrap();
        assert!((middle - 10.5).abs() < 1e-12);
        assert!((upper - 22.032562594670797).abs() < 1e-9);
        assert!((lower - -1.0325625946707966).abs() < 1e-9);
    }
}
