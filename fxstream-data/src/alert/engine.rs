use super::{Alert, AlertSpec, AlertState, AlertTriggered};
use crate::tick::Tick;
use chrono::Utc;
use fnv::FnvHashMap;
use parking_lot::RwLock;
use smol_str::SmolStr;
use tracing::info;

/// Holds every registered alert and evaluates accepted ticks against the
/// armed ones.
///
/// Evaluation cost is O(alerts for the tick's instrument) via a
/// per-instrument index - this runs on the hot ingest path.
#[derive(Debug, Default)]
pub struct AlertEngine {
    inner: RwLock<AlertBook>,
}

#[derive(Debug, Default)]
struct AlertBook {
    next_id: u64,
    by_id: FnvHashMap<u64, Alert>,
    by_symbol: FnvHashMap<SmolStr, Vec<u64>>,
}

impl AlertBook {
    fn index(&mut self, alert: &Alert) {
        self.by_symbol
            .entry(alert.symbol.clone())
            .or_default()
            .push(alert.id);
    }

    fn unindex(&mut self, alert: &Alert) {
        if let Some(ids) = self.by_symbol.get_mut(&alert.symbol) {
            ids.retain(|id| *id != alert.id);
            if ids.is_empty() {
                self.by_symbol.remove(&alert.symbol);
            }
        }
    }
}

impl AlertEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bulk-load alerts from the durable store at startup. Ids are
    /// preserved; the id counter resumes past the highest seen.
    pub fn load(&self, alerts: Vec<Alert>) {
        let mut book = self.inner.write();
        for alert in alerts {
            book.next_id = book.next_id.max(alert.id + 1);
            book.index(&alert);
            book.by_id.insert(alert.id, alert);
        }
    }

    /// Register a new armed alert and return it.
    pub fn insert(&self, spec: AlertSpec) -> Alert {
        let mut book = self.inner.write();
        book.next_id += 1;
        let alert = Alert::new(book.next_id, spec, Utc::now());
        info!(
            alert_id = alert.id,
            symbol = %alert.symbol,
            condition = %alert.condition,
            target = alert.target_price,
            "alert created"
        );
        book.index(&alert);
        book.by_id.insert(alert.id, alert.clone());
        alert
    }

    /// Remove an alert by id, returning it if it existed.
    pub fn remove(&self, id: u64) -> Option<Alert> {
        let mut book = self.inner.write();
        let alert = book.by_id.remove(&id)?;
        book.unindex(&alert);
        Some(alert)
    }

    /// Reset a triggered alert back to armed, clearing its crossing
    /// baseline so it must observe a fresh price first.
    pub fn re_arm(&self, id: u64) -> bool {
        let mut book = self.inner.write();
        match book.by_id.get_mut(&id) {
            Some(alert) => {
                alert.state = AlertState::Armed;
                alert.triggered_at = None;
                alert.prev_mid = None;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: u64) -> Option<Alert> {
        self.inner.read().by_id.get(&id).cloned()
    }

    pub fn alerts_for_user(&self, user_id: u64) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self
            .inner
            .read()
            .by_id
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        alerts.sort_by_key(|a| a.id);
        alerts
    }

    pub fn all_armed(&self) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self
            .inner
            .read()
            .by_id
            .values()
            .filter(|a| a.is_armed())
            .cloned()
            .collect();
        alerts.sort_by_key(|a| a.id);
        alerts
    }

    /// Evaluate one accepted tick against the armed alerts for its
    /// instrument. Firing alerts transition to `Triggered` and stop
    /// evaluating; every armed alert's baseline advances to this mid.
    pub fn evaluate(&self, tick: &Tick) -> Vec<AlertTriggered> {
        let mid = tick.mid();
        let mut book = self.inner.write();
        let Some(ids) = book.by_symbol.get(&tick.instrument).cloned() else {
            return Vec::new();
        };

        let mut triggered = Vec::new();
        for id in ids {
            let Some(alert) = book.by_id.get_mut(&id) else {
                continue;
            };
            if !alert.is_armed() {
                continue;
            }

            if alert.condition_met(mid) {
                alert.state = AlertState::Triggered;
                alert.triggered_at = Some(tick.time);
                info!(
                    alert_id = alert.id,
                    symbol = %alert.symbol,
                    condition = %alert.condition,
                    target = alert.target_price,
                    price = mid,
                    "alert triggered"
                );
                triggered.push(AlertTriggered::new(alert, mid, tick.time));
            }
            alert.prev_mid = Some(mid);
        }
        triggered
    }

    /// Advance baselines for the tick's instrument WITHOUT evaluating
    /// conditions. Used for the first tick after a stale period, so a
    /// price gap across the outage cannot fire spurious crossings.
    pub fn rebaseline(&self, tick: &Tick) {
        let mid = tick.mid();
        let mut book = self.inner.write();
        let Some(ids) = book.by_symbol.get(&tick.instrument).cloned() else {
            return;
        };
        for id in ids {
            if let Some(alert) = book.by_id.get_mut(&id) {
                if alert.is_armed() {
                    alert.prev_mid = Some(mid);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertCondition;
    use chrono::{DateTime, Utc};

    fn spec(symbol: &str, condition: AlertCondition, target: f64) -> AlertSpec {
        AlertSpec {
            guild_id: 1,
            user_id: 2,
            channel_id: 3,
            symbol: symbol.into(),
            condition,
            target_price: target,
        }
    }

    fn tick_at(secs: i64, symbol: &str, mid: f64) -> Tick {
        // Zero spread keeps mid exact.
        Tick::new(symbol, mid, mid, DateTime::from_timestamp(secs, 0).unwrap())
    }

    #[test]
    fn test_above_fires_once_then_suppresses() {
        let engine = AlertEngine::new();
        let alert = engine.insert(spec("xauusd", AlertCondition::Above, 2000.0));

        // [1999, 2001, 2002]: fires on the first mid >= 2000 only.
        assert!(engine.evaluate(&tick_at(1, "xauusd", 1999.0)).is_empty());
        let fired = engine.evaluate(&tick_at(2, "xauusd", 2001.0));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].alert_id, alert.id);
        assert!((fired[0].triggered_price - 2001.0).abs() < 1e-12);
        assert!(engine.evaluate(&tick_at(3, "xauusd", 2002.0)).is_empty());

        assert_eq!(engine.get(alert.id).unwrap().state, AlertState::Triggered);
    }

    #[test]
    fn test_cross_up_requires_baseline_and_fires_once() {
        let engine = AlertEngine::new();
        engine.insert(spec("eurusd", AlertCondition::CrossUp, 1.1000));

        // First tick above target only records the baseline.
        assert!(engine.evaluate(&tick_at(1, "eurusd", 1.1005)).is_empty());

        let engine = AlertEngine::new();
        engine.insert(spec("eurusd", AlertCondition::CrossUp, 1.1000));

        assert!(engine.evaluate(&tick_at(1, "eurusd", 1.0990)).is_empty());
        let fired = engine.evaluate(&tick_at(2, "eurusd", 1.1005));
        assert_eq!(fired.len(), 1);
        // Already triggered: no re-fire.
        assert!(engine.evaluate(&tick_at(3, "eurusd", 1.1010)).is_empty());
    }

    #[test]
    fn test_cross_down() {
        let engine = AlertEngine::new();
        engine.insert(spec("usdjpy", AlertCondition::CrossDown, 150.00));

        assert!(engine.evaluate(&tick_at(1, "usdjpy", 150.50)).is_empty());
        let fired = engine.evaluate(&tick_at(2, "usdjpy", 149.90));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].condition, AlertCondition::CrossDown);
    }

    #[test]
    fn test_only_matching_instrument_evaluated() {
        let engine = AlertEngine::new();
        engine.insert(spec("eurusd", AlertCondition::Above, 1.0));
        assert!(engine.evaluate(&tick_at(1, "gbpusd", 2.0)).is_empty());
    }

    #[test]
    fn test_re_arm_clears_baseline() {
        let engine = AlertEngine::new();
        let alert = engine.insert(spec("eurusd", AlertCondition::CrossUp, 1.1000));

        engine.evaluate(&tick_at(1, "eurusd", 1.0990));
        engine.evaluate(&tick_at(2, "eurusd", 1.1005));
        assert_eq!(engine.get(alert.id).unwrap().state, AlertState::Triggered);

        assert!(engine.re_arm(alert.id));
        let rearmed = engine.get(alert.id).unwrap();
        assert_eq!(rearmed.state, AlertState::Armed);
        assert_eq!(rearmed.prev_mid, None);

        // Needs a fresh baseline below target before it can fire again.
        assert!(engine.evaluate(&tick_at(3, "eurusd", 1.1008)).is_empty());
        assert!(engine.evaluate(&tick_at(4, "eurusd", 1.0990)).is_empty());
        assert_eq!(engine.evaluate(&tick_at(5, "eurusd", 1.1002)).len(), 1);
    }

    #[test]
    fn test_load_resumes_id_counter() {
        let engine = AlertEngine::new();
        let mut preloaded = Alert::new(7, spec("eurusd", AlertCondition::Above, 1.2), Utc::now());
        preloaded.state = AlertState::Armed;
        engine.load(vec![preloaded]);

        let next = engine.insert(spec("gbpusd", AlertCondition::Below, 1.1));
        assert!(next.id > 7);
        assert_eq!(engine.len(), 2);
    }
}
