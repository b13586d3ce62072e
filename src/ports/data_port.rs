//! Market data access port trait.

use crate::domain::error::ScanError;
use crate::domain::ohlcv::{Bar, Interval};
use std::collections::HashMap;

/// Bars per symbol. Symbols without data may be absent.
pub type BarMap = HashMap<String, Vec<Bar>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub symbols: Vec<String>,
    pub interval: Interval,
    /// Calendar days of history ending now.
    pub period_days: u32,
}

impl FetchRequest {
    /// Cache identity of one symbol's series under this request's period and
    /// interval.
    pub fn symbol_key(&self, symbol: &str) -> String {
        format!("{}|{}d|{}", symbol, self.period_days, self.interval)
    }

    /// Same period and interval for a different symbol set.
    pub fn with_symbols(&self, symbols: Vec<String>) -> Self {
        Self {
            symbols,
            ..self.clone()
        }
    }
}

/// Implementations are shared by the scan's worker threads, so all outbound
/// throttling lives inside the one instance.
pub trait DataPort: Send + Sync {
    /// Fetches bars for every requested symbol. A symbol with no data is
    /// omitted rather than failing the batch; `Err` means the whole batch
    /// could not be fetched.
    fn fetch_bars(&self, request: &FetchRequest) -> Result<BarMap, ScanError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_key_names_period_and_interval() {
        let request = FetchRequest {
            symbols: vec!["MSFT".into(), "AAPL".into()],
            interval: "60m".parse().unwrap(),
            period_days: 30,
        };
        assert_eq!(request.symbol_key("AAPL"), "AAPL|30d|60m");
        let daily = FetchRequest {
            interval: "1d".parse().unwrap(),
            ..request.clone()
        };
        assert_ne!(daily.symbol_key("AAPL"), request.symbol_key("AAPL"));

        let narrowed = request.with_symbols(vec!["NVDA".into()]);
        assert_eq!(narrowed.symbols, vec!["NVDA"]);
        assert_eq!(narrowed.period_days, 30);
    }
}
