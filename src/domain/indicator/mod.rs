//! Technical indicator implementations.
//!
//! This module provides the types that tie the individual indicator
//! functions together:
//! - `IndicatorType`: identity + parameters of a computed column (map key)
//! - `IndicatorSettings`: which columns to compute for a series
//! - `IndicatorFrame`: every computed column, index-aligned with the bars
//!
//! Missing values are `None`, never zero.

pub mod linreg;
pub mod r_squared;
pub mod rsi;

use crate::domain::error::ScanError;
use crate::domain::ohlcv::Bar;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndicatorType {
    Close,
    LinReg(usize),
    R2(usize),
    R2Smoothed { length: usize, smoothing: usize },
    Rsi(usize),
}

impl IndicatorType {
    /// Column header used in derived-frame files.
    pub fn column_name(&self) -> String {
        match self {
            IndicatorType::Close => "close".to_string(),
            IndicatorType::LinReg(n) => format!("reg{}", n),
            IndicatorType::R2(_) => "r2".to_string(),
            IndicatorType::R2Smoothed { .. } => "r2_smoothed".to_string(),
            IndicatorType::Rsi(n) => format!("rsi_{}", n),
        }
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Close => write!(f, "close"),
            IndicatorType::LinReg(n) => write!(f, "linreg({})", n),
            IndicatorType::R2(n) => write!(f, "R2({})", n),
            IndicatorType::R2Smoothed { length, smoothing } => {
                write!(f, "R2({}) smoothed {}", length, smoothing)
            }
            IndicatorType::Rsi(n) => write!(f, "rsi{}", n),
        }
    }
}

/// Price the R² columns are computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSource {
    Close,
    Hl2,
}

impl PriceSource {
    pub fn extract(&self, bar: &Bar) -> f64 {
        match self {
            PriceSource::Close => bar.close,
            PriceSource::Hl2 => bar.hl2(),
        }
    }
}

impl FromStr for PriceSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "close" => Ok(PriceSource::Close),
            "hl2" => Ok(PriceSource::Hl2),
            other => Err(format!("unknown price source '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSettings {
    /// Every linear-regression length to compute, fast/slow pair included.
    pub linreg_lengths: Vec<usize>,
    pub r2_length: usize,
    pub r2_smoothing: usize,
    pub r2_source: PriceSource,
    pub rsi_length: usize,
}

impl Default for IndicatorSettings {
    fn default() -> Self {
        Self {
            linreg_lengths: vec![25, 50],
            r2_length: 25,
            r2_smoothing: 3,
            r2_source: PriceSource::Hl2,
            rsi_length: 14,
        }
    }
}

impl IndicatorSettings {
    pub fn r2_type(&self) -> IndicatorType {
        IndicatorType::R2(self.r2_length)
    }

    pub fn r2_smoothed_type(&self) -> IndicatorType {
        IndicatorType::R2Smoothed {
            length: self.r2_length,
            smoothing: self.r2_smoothing,
        }
    }

    pub fn rsi_type(&self) -> IndicatorType {
        IndicatorType::Rsi(self.rsi_length)
    }
}

#[derive(Debug, Clone)]
pub struct IndicatorFrame {
    pub timestamps: Vec<DateTime<Utc>>,
    pub columns: BTreeMap<IndicatorType, Vec<Option<f64>>>,
}

impl IndicatorFrame {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn column(&self, indicator: IndicatorType) -> Option<&[Option<f64>]> {
        self.columns.get(&indicator).map(Vec::as_slice)
    }

    /// Value of `indicator` at `index`; `Ok(None)` while the column is still
    /// warming up, `Err` when the column was never computed.
    pub fn value(
        &self,
        symbol: &str,
        indicator: IndicatorType,
        index: usize,
    ) -> Result<Option<f64>, ScanError> {
        let column = self.column(indicator).ok_or_else(|| {
            ScanError::indicator(symbol, format!("{} was not computed", indicator))
        })?;
        Ok(column.get(index).copied().flatten())
    }
}

/// Computes every column named by `settings` over `bars`.
pub fn compute_frame(
    symbol: &str,
    bars: &[Bar],
    settings: &IndicatorSettings,
) -> Result<IndicatorFrame, ScanError> {
    if settings.linreg_lengths.contains(&0) {
        return Err(ScanError::indicator(symbol, "linreg length must be positive"));
    }
    if settings.r2_length < 2 || settings.r2_smoothing == 0 || settings.rsi_length == 0 {
        return Err(ScanError::indicator(symbol, "indicator lengths out of range"));
    }

    let close: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let r2_input: Vec<f64> = bars.iter().map(|b| settings.r2_source.extract(b)).collect();

    let mut columns = BTreeMap::new();
    columns.insert(IndicatorType::Close, close.iter().copied().map(Some).collect());
    for &length in &settings.linreg_lengths {
        columns.insert(IndicatorType::LinReg(length), linreg::linreg(&close, length));
    }
    let r2 = r_squared::rolling_r2(&r2_input, settings.r2_length);
    let smoothed = r_squared::smoothed_r2(&r2, settings.r2_smoothing);
    columns.insert(settings.r2_type(), r2);
    columns.insert(settings.r2_smoothed_type(), smoothed);
    columns.insert(settings.rsi_type(), rsi::rsi(&close, settings.rsi_length));

    Ok(IndicatorFrame {
        timestamps: bars.iter().map(|b| b.timestamp).collect(),
        columns,
    })
}
