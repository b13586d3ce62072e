//! Bar cache in front of any [`DataPort`].
//!
//! Series are cached per symbol, so a batch hits for the symbols it shares
//! with earlier requests and only the rest go to the inner port. An optional
//! [`BarStore`] keeps series across runs.

use crate::domain::error::ScanError;
use crate::domain::ohlcv::Bar;
use crate::ports::bar_store_port::BarStore;
use crate::ports::data_port::{BarMap, DataPort, FetchRequest};
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Reuses series for the same (symbol, period, interval) within `ttl`.
/// Failed fetches are not cached. A zero `ttl` disables caching.
pub struct CachingDataPort<D> {
    inner: D,
    ttl: Duration,
    entries: DashMap<String, (Instant, Vec<Bar>)>,
    store: Option<Box<dyn BarStore>>,
}

impl<D: DataPort> CachingDataPort<D> {
    pub fn new(inner: D, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: DashMap::new(),
            store: None,
        }
    }

    pub fn with_store(mut self, store: Box<dyn BarStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Series held in memory.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn cached(&self, key: &str) -> Option<Vec<Bar>> {
        if let Some(entry) = self.entries.get(key) {
            let (stored_at, bars) = entry.value();
            if stored_at.elapsed() < self.ttl {
                return Some(bars.clone());
            }
        }
        let store = self.store.as_ref()?;
        match store.load(key, self.ttl) {
            Ok(Some(bars)) => {
                self.entries
                    .insert(key.to_string(), (Instant::now(), bars.clone()));
                Some(bars)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, reason = %e, "bar cache read failed");
                None
            }
        }
    }

    fn remember(&self, key: String, bars: &[Bar]) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&key, bars) {
                warn!(key = %key, reason = %e, "bar cache write failed");
            }
        }
        self.entries.insert(key, (Instant::now(), bars.to_vec()));
    }
}

impl<D: DataPort> DataPort for CachingDataPort<D> {
    fn fetch_bars(&self, request: &FetchRequest) -> Result<BarMap, ScanError> {
        if self.ttl.is_zero() {
            return self.inner.fetch_bars(request);
        }

        let mut found = BarMap::new();
        let mut missing = Vec::new();
        for symbol in &request.symbols {
            match self.cached(&request.symbol_key(symbol)) {
                Some(bars) => {
                    found.insert(symbol.clone(), bars);
                }
                None => missing.push(symbol.clone()),
            }
        }
        debug!(
            hits = found.len(),
            misses = missing.len(),
            "bar cache lookup"
        );
        if missing.is_empty() {
            return Ok(found);
        }

        let fetched = self.inner.fetch_bars(&request.with_symbols(missing))?;
        for (symbol, bars) in fetched {
            self.remember(request.symbol_key(&symbol), &bars);
            found.insert(symbol, bars);
        }
        Ok(found)
    }
}
