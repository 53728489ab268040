use super::{Candle, CandleSeries, Timeframe};
use crate::tick::Tick;
use fnv::FnvHashMap;
use parking_lot::RwLock;
use smol_str::SmolStr;

/// Buckets accepted ticks into per-timeframe OHLC series for every
/// instrument.
///
/// Mutated only on the ingest path; `series` reads run concurrently and
/// always observe a fully-applied tick, never a half-updated candle.
#[derive(Debug)]
pub struct CandleAggregator {
    capacity: usize,
    inner: RwLock<FnvHashMap<SmolStr, Vec<CandleSeries>>>,
}

impl CandleAggregator {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: RwLock::new(FnvHashMap::default()),
        }
    }

    /// Apply one accepted tick to every configured timeframe.
    pub fn update(&self, tick: &Tick) {
        let mid = tick.mid();
        let mut inner = self.inner.write();
        let series = inner.entry(tick.instrument.clone()).or_insert_with(|| {
            Timeframe::ALL
                .into_iter()
                .map(|tf| CandleSeries::new(tick.instrument.clone(), tf, self.capacity))
                .collect()
        });
        for s in series.iter_mut() {
            s.apply(mid, tick.time);
        }
    }

    /// Most recent `limit` candles for (instrument, timeframe), oldest
    /// first, including the still-open candle. See [`CandleSeries::recent`].
    pub fn series(&self, instrument: &str, timeframe: Timeframe, limit: usize) -> Vec<Candle> {
        let inner = self.inner.read();
        inner
            .get(instrument)
            .and_then(|all| {
                Timeframe::ALL
                    .iter()
                    .position(|tf| *tf == timeframe)
                    .and_then(|idx| all.get(idx))
            })
            .map(|series| series.recent(limit))
            .unwrap_or_default()
    }

    /// Most recent `limit` closed candles only, for indicator computation.
    pub fn closed_series(&self, instrument: &str, timeframe: Timeframe, limit: usize) -> Vec<Candle> {
        let inner = self.inner.read();
        inner
            .get(instrument)
            .and_then(|all| {
                Timeframe::ALL
                    .iter()
                    .position(|tf| *tf == timeframe)
                    .and_then(|idx| all.get(idx))
            })
            .map(|series| series.closed_recent(limit))
            .unwrap_or_default()
    }

    pub fn known_instruments(&self) -> Vec<SmolStr> {
        self.inner.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn tick_at(secs: i64, bid: f64, ask: f64) -> Tick {
        Tick::new("eurusd", bid, ask, DateTime::from_timestamp(secs, 0).unwrap())
    }

    #[test]
    fn test_all_timeframes_built_from_ticks() {
        let agg = CandleAggregator::new(500);
        agg.update(&tick_at(60, 1.10, 1.12));
        agg.update(&tick_at(120, 1.11, 1.13));

        // 1m rolled over into a second bucket; 1h still one open candle.
        assert_eq!(agg.series("EURUSD", Timeframe::M1, 10).len(), 2);
        let h1 = agg.series("EURUSD", Timeframe::H1, 10);
        assert_eq!(h1.len(), 1);
        assert!((h1[0].open - 1.11).abs() < 1e-12);
        assert!((h1[0].close - 1.12).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_instrument_is_empty() {
        let agg = CandleAggregator::new(500);
        assert!(agg.series("GBPUSD", Timeframe::M1, 10).is_empty());
    }
}
