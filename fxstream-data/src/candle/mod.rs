use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{collections::VecDeque, str::FromStr};

pub mod aggregator;

/// Default bounded capacity of one candle series.
pub const DEFAULT_SERIES_CAPACITY: usize = 500;

/// Fixed candle bucket duration.
///
/// Each timeframe is built directly from ticks - no roll-up from one
/// timeframe into another, which would compound rounding drift.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, derive_more::Display,
)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    #[display("1m")]
    M1,
    #[serde(rename = "5m")]
    #[display("5m")]
    M5,
    #[serde(rename = "15m")]
    #[display("15m")]
    M15,
    #[serde(rename = "1h")]
    #[display("1h")]
    H1,
    #[serde(rename = "4h")]
    #[display("4h")]
    H4,
}

impl Timeframe {
    /// Every supported timeframe, the set the aggregator builds per tick.
    pub const ALL: [Timeframe; 5] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::H1,
        Timeframe::H4,
    ];

    pub fn duration_secs(&self) -> i64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::H1 => 3600,
            Timeframe::H4 => 14400,
        }
    }

    /// Start of the bucket containing `time`:
    /// `floor(epoch / duration) * duration`.
    pub fn bucket_open(&self, time: DateTime<Utc>) -> DateTime<Utc> {
        let secs = self.duration_secs();
        let bucket = time.timestamp().div_euclid(secs) * secs;
        DateTime::from_timestamp(bucket, 0).expect("bucket start in range")
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Timeframe::M1),
            "5m" => Ok(Timeframe::M5),
            "15m" => Ok(Timeframe::M15),
            "1h" => Ok(Timeframe::H1),
            "4h" => Ok(Timeframe::H4),
            other => Err(format!("unknown timeframe: {other}")),
        }
    }
}

/// OHLC summary of mid-price movement within one fixed time bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub instrument: SmolStr,
    pub timeframe: Timeframe,
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    fn open_at(instrument: SmolStr, timeframe: Timeframe, open_time: DateTime<Utc>, mid: f64) -> Self {
        Self {
            instrument,
            timeframe,
            open_time,
            open: mid,
            high: mid,
            low: mid,
            close: mid,
        }
    }

    fn absorb(&mut self, mid: f64) {
        self.high = self.high.max(mid);
        self.low = self.low.min(mid);
        self.close = mid;
    }
}

/// Bounded, time-ordered candle series for one (instrument, timeframe).
///
/// Holds at most `capacity` closed candles (oldest evicted on overflow)
/// plus the still-open candle for the current bucket.
#[derive(Debug)]
pub struct CandleSeries {
    instrument: SmolStr,
    timeframe: Timeframe,
    capacity: usize,
    closed: VecDeque<Candle>,
    open: Option<Candle>,
}

impl CandleSeries {
    pub fn new(instrument: SmolStr, timeframe: Timeframe, capacity: usize) -> Self {
        Self {
            instrument,
            timeframe,
            capacity,
            closed: VecDeque::with_capacity(capacity),
            open: None,
        }
    }

    /// Apply one accepted mid price. Returns the candle closed by this
    /// tick, if its bucket rolled over.
    pub fn apply(&mut self, mid: f64, time: DateTime<Utc>) -> Option<Candle> {
        let bucket = self.timeframe.bucket_open(time);

        match self.open.as_mut() {
            None => {
                self.open = Some(Candle::open_at(
                    self.instrument.clone(),
                    self.timeframe,
                    bucket,
                    mid,
                ));
                None
            }
            Some(current) if bucket == current.open_time => {
                current.absorb(mid);
                None
            }
            Some(current) if bucket < current.open_time => {
                // Bucket already closed; series order is strictly increasing.
                None
            }
            Some(_) => {
                let completed = self
                    .open
                    .replace(Candle::open_at(
                        self.instrument.clone(),
                        self.timeframe,
                        bucket,
                        mid,
                    ))
                    .expect("open candle present");
                self.closed.push_back(completed.clone());
                if self.closed.len() > self.capacity {
                    self.closed.pop_front();
                }
                Some(completed)
            }
        }
    }

    /// Most recent `limit` candles, oldest first, INCLUDING the still-open
    /// candle if present. Callers needing only closed candles must trim
    /// the final entry themselves.
    pub fn recent(&self, limit: usize) -> Vec<Candle> {
        let mut out: Vec<Candle> = Vec::with_capacity(limit.min(self.closed.len() + 1));
        let open_extra = usize::from(self.open.is_some());
        let take_closed = limit.saturating_sub(open_extra).min(self.closed.len());
        out.extend(self.closed.iter().skip(self.closed.len() - take_closed).cloned());
        if let Some(open) = &self.open {
            if limit > 0 {
                out.push(open.clone());
            }
        }
        out
    }

    /// Most recent `limit` CLOSED candles, oldest first. Used by the
    /// indicator engine, which must never see the mutable open candle.
    pub fn closed_recent(&self, limit: usize) -> Vec<Candle> {
        let take = limit.min(self.closed.len());
        self.closed
            .iter()
            .skip(self.closed.len() - take)
            .cloned()
            .collect()
    }

    pub fn closed_len(&self) -> usize {
        self.closed.len()
    }
}
