use crate::tick::{PriceState, Tick};
use chrono::{DateTime, Utc};
use fnv::FnvHashMap;
use parking_lot::RwLock;
use smol_str::SmolStr;

/// Latest-value price cache, one [`PriceState`] per instrument.
///
/// Mutated only on the ingest path; read concurrently by snapshot requests
/// and the read-side API. No historical retention.
#[derive(Debug, Default)]
pub struct PriceCache {
    inner: RwLock<FnvHashMap<SmolStr, PriceState>>,
}

impl PriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replace the instrument's state with the given tick,
    /// returning the committed state.
    pub fn update(&self, tick: &Tick) -> PriceState {
        let state = PriceState::from(tick);
        self.inner
            .write()
            .insert(tick.instrument.clone(), state.clone());
        state
    }

    pub fn get(&self, instrument: &str) -> Option<PriceState> {
        self.inner.read().get(instrument).cloned()
    }

    /// Timestamp of the last accepted tick for an instrument, used by the
    /// normaliser to drop out-of-order ticks.
    pub fn last_time(&self, instrument: &str) -> Option<DateTime<Utc>> {
        self.inner.read().get(instrument).map(|state| state.timestamp)
    }

    /// Full mapping of known instruments, used for new-connection bootstrap
    /// and read-side queries.
    pub fn snapshot(&self) -> Vec<PriceState> {
        self.inner.read().values().cloned().collect()
    }

    /// Flag every entry stale. Data is kept and served - recent-but-stale
    /// prices beat no prices for display purposes.
    pub fn mark_stale(&self) {
        for state in self.inner.write().values_mut() {
            state.stale = true;
        }
    }

    pub fn mark_live(&self) {
        for state in self.inner.write().values_mut() {
            state.stale = false;
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
