use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::str::FromStr;

pub mod engine;
pub mod store;

/// Trigger rule of a price alert, evaluated against tick mid prices.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum AlertCondition {
    /// mid >= target.
    #[display("above")]
    Above,
    /// mid <= target.
    #[display("below")]
    Below,
    /// previous mid < target AND mid >= target.
    #[display("cross_up")]
    CrossUp,
    /// previous mid > target AND mid <= target.
    #[display("cross_down")]
    CrossDown,
}

impl AlertCondition {
    /// Crossing conditions need a recorded baseline before they can fire.
    pub fn is_crossing(&self) -> bool {
        matches!(self, AlertCondition::CrossUp | AlertCondition::CrossDown)
    }
}

impl FromStr for AlertCondition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "above" => Ok(AlertCondition::Above),
            "below" => Ok(AlertCondition::Below),
            "cross_up" => Ok(AlertCondition::CrossUp),
            "cross_down" => Ok(AlertCondition::CrossDown),
            other => Err(format!("unknown alert condition: {other}")),
        }
    }
}

/// Alert lifecycle: awaiting its condition vs already fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    Armed,
    Triggered,
}

/// Identity of an alert as clients know it: who asked, where to notify,
/// and what to watch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSpec {
    pub guild_id: u64,
    pub user_id: u64,
    pub channel_id: u64,
    pub symbol: SmolStr,
    pub condition: AlertCondition,
    pub target_price: f64,
}

/// A registered price alert.
///
/// Every condition fires at most once: the alert transitions to
/// `Triggered` and stops evaluating until explicitly re-armed or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: u64,
    pub guild_id: u64,
    pub user_id: u64,
    pub channel_id: u64,
    pub symbol: SmolStr,
    pub condition: AlertCondition,
    pub target_price: f64,
    pub state: AlertState,
    pub created_at: DateTime<Utc>,
    pub triggered_at: Option<DateTime<Utc>>,
    /// Last mid observed for this alert, the crossing-detection baseline.
    /// Runtime state only, never persisted.
    #[serde(skip)]
    pub prev_mid: Option<f64>,
}

impl Alert {
    pub fn new(id: u64, spec: AlertSpec, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            guild_id: spec.guild_id,
            user_id: spec.user_id,
            channel_id: spec.channel_id,
            symbol: crate::instrument::normalise(&spec.symbol),
            condition: spec.condition,
            target_price: spec.target_price,
            state: AlertState::Armed,
            created_at,
            triggered_at: None,
            prev_mid: None,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.state == AlertState::Armed
    }

    /// Whether the current mid satisfies the condition given the stored
    /// baseline. Pure check; does not mutate state.
    pub fn condition_met(&self, mid: f64) -> bool {
        match self.condition {
            AlertCondition::Above => mid >= self.target_price,
            AlertCondition::Below => mid <= self.target_price,
            AlertCondition::CrossUp => self
                .prev_mid
                .is_some_and(|prev| prev < self.target_price && mid >= self.target_price),
            AlertCondition::CrossDown => self
                .prev_mid
                .is_some_and(|prev| prev > self.target_price && mid <= self.target_price),
        }
    }
}

/// Event emitted when an alert fires, carrying the alert's full context
/// plus the triggering price. Serialises into the `alert_triggered` wire
/// payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertTriggered {
    pub alert_id: u64,
    pub guild_id: u64,
    pub user_id: u64,
    pub channel_id: u64,
    pub symbol: SmolStr,
    pub condition: AlertCondition,
    pub target_price: f64,
    pub triggered_price: f64,
    pub triggered_at: DateTime<Utc>,
}

impl AlertTriggered {
    pub fn new(alert: &Alert, triggered_price: f64, triggered_at: DateTime<Utc>) -> Self {
        Self {
            alert_id: alert.id,
            guild_id: alert.guild_id,
            user_id: alert.user_id,
            channel_id: alert.channel_id,
            symbol: alert.symbol.clone(),
            condition: alert.condition,
            target_price: alert.target_price,
            triggered_price,
            triggered_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(condition: AlertCondition, target: f64) -> Alert {
        Alert::new(
            1,
            AlertSpec {
                guild_id: 10,
                user_id: 20,
                channel_id: 30,
                symbol: "eurusd".into(),
                condition,
                target_price: target,
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_condition_met() {
        struct TestCase {
            condition: AlertCondition,
            target: f64,
            prev_mid: Option<f64>,
            mid: f64,
            expected: bool,
        }

        let tests = vec![
            // TC0: above fires at the target itself
            TestCase {
                condition: AlertCondition::Above,
                target: 2000.0,
                prev_mid: None,
                mid: 2000.0,
                expected: true,
            },
            // TC1: above does not fire below target
            TestCase {
                condition: AlertCondition::Below,
                target: 1.10,
                prev_mid: None,
                mid: 1.11,
                expected: false,
            },
            // TC2: cross_up needs a baseline below target
            TestCase {
                condition: AlertCondition::CrossUp,
                target: 1.1000,
                prev_mid: Some(1.0990),
                mid: 1.1005,
                expected: true,
            },
            // TC3: cross_up without baseline records only
            TestCase {
                condition: AlertCondition::CrossUp,
                target: 1.1000,
                prev_mid: None,
                mid: 1.1005,
                expected: false,
            },
            // TC4: cross_up with baseline already at/above target
            TestCase {
                condition: AlertCondition::CrossUp,
                target: 1.1000,
                prev_mid: Some(1.1001),
                mid: 1.1005,
                expected: false,
            },
            // TC5: cross_down straddling downwards
            TestCase {
                condition: AlertCondition::CrossDown,
                target: 1.1000,
                prev_mid: Some(1.1010),
                mid: 1.0995,
                expected: true,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let mut a = alert(test.condition, test.target);
            a.prev_mid = test.prev_mid;
            assert_eq!(a.condition_met(test.mid), test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_condition_parse_display_roundtrip() {
        for condition in [
            AlertCondition::Above,
            AlertCondition::Below,
            AlertCondition::CrossUp,
            AlertCondition::CrossDown,
        ] {
            let parsed: AlertCondition = condition.to_string().parse().unwrap();
            assert_eq!(parsed, condition);
        }
        assert!("sideways".parse::<AlertCondition>().is_err());
    }
}
