//! Detected signal events.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Rule family a signal came from. Declaration order is the report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SignalKind {
    CrossOver,
    CrossUnder,
    ThresholdBuy,
    ThresholdSell,
    ThresholdCrossUnder,
}

impl SignalKind {
    pub const ALL: [SignalKind; 5] = [
        SignalKind::CrossOver,
        SignalKind::CrossUnder,
        SignalKind::ThresholdBuy,
        SignalKind::ThresholdSell,
        SignalKind::ThresholdCrossUnder,
    ];

    /// Name used in configuration files and result-table headers.
    pub fn config_name(&self) -> &'static str {
        match self {
            SignalKind::CrossOver => "cross_over",
            SignalKind::CrossUnder => "cross_under",
            SignalKind::ThresholdBuy => "threshold_buy",
            SignalKind::ThresholdSell => "threshold_sell",
            SignalKind::ThresholdCrossUnder => "threshold_cross_under",
        }
    }

    /// Short flag shown in alert rows.
    pub fn flag(&self) -> &'static str {
        match self {
            SignalKind::CrossOver | SignalKind::ThresholdBuy => "BUY",
            SignalKind::CrossUnder | SignalKind::ThresholdSell => "SELL",
            SignalKind::ThresholdCrossUnder => "CROSS",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignalKind::CrossOver => "CrossOver",
            SignalKind::CrossUnder => "CrossUnder",
            SignalKind::ThresholdBuy => "ThresholdBuy",
            SignalKind::ThresholdSell => "ThresholdSell",
            SignalKind::ThresholdCrossUnder => "ThresholdCrossUnder",
        };
        f.write_str(name)
    }
}

impl FromStr for SignalKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        SignalKind::ALL
            .into_iter()
            .find(|k| k.config_name() == wanted)
            .ok_or_else(|| format!("unknown rule '{}'", s.trim()))
    }
}

/// Indicator values that made a rule fire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SignalPayload {
    Cross { fast: f64, slow: f64 },
    Threshold { trend: f64, oscillator: f64 },
    Level { previous: f64, current: f64 },
}

impl fmt::Display for SignalPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalPayload::Cross { fast, slow } => write!(f, "fast={:.2} slow={:.2}", fast, slow),
            SignalPayload::Threshold { trend, oscillator } => {
                write!(f, "r2={:.3} rsi={:.1}", trend, oscillator)
            }
            SignalPayload::Level { previous, current } => {
                write!(f, "{:.3} -> {:.3}", previous, current)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub kind: SignalKind,
    pub payload: SignalPayload,
}

/// Every kind that fired for one symbol on one bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRow {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub kinds: BTreeSet<SignalKind>,
}

impl ResultRow {
    /// Space-separated BUY/SELL/CROSS flags, deduplicated.
    pub fn flags(&self) -> String {
        let mut flags: Vec<&str> = Vec::new();
        for kind in &self.kinds {
            if !flags.contains(&kind.flag()) {
                flags.push(kind.flag());
            }
        }
        flags.join(" ")
    }
}

/// Collapses signals into one row per (symbol, timestamp), keeping the order
/// in which each pair first appears.
pub fn group_by_bar(signals: &[Signal]) -> Vec<ResultRow> {
    let mut index: BTreeMap<(&str, DateTime<Utc>), usize> = BTreeMap::new();
    let mut rows: Vec<ResultRow> = Vec::new();
    for signal in signals {
        let key = (signal.symbol.as_str(), signal.timestamp);
        match index.get(&key) {
            Some(&i) => {
                rows[i].kinds.insert(signal.kind);
            }
            None => {
                index.insert(key, rows.len());
                rows.push(ResultRow {
                    symbol: signal.symbol.clone(),
                    timestamp: signal.timestamp,
                    kinds: BTreeSet::from([signal.kind]),
                });
            }
        }
    }
    rows
}
