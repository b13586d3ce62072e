#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use spxscan::adapters::file_config_adapter::FileConfigAdapter;
use spxscan::domain::config::ScanConfig;
use spxscan::domain::error::ScanError;
use spxscan::domain::indicator::IndicatorFrame;
pub use spxscan::domain::ohlcv::{Bar, Interval};
use spxscan::domain::scan_state::ScanState;
use spxscan::domain::signal::{ResultRow, SignalKind};
use spxscan::ports::artifact_port::ArtifactPort;
use spxscan::ports::data_port::{BarMap, DataPort, FetchRequest};
use spxscan::ports::notify_port::NotifyPort;
use spxscan::ports::state_port::StatePort;
use spxscan::ports::universe_port::UniversePort;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Closes whose linreg(2) crosses above linreg(3) on the second-to-last bar.
pub const CROSS_UP: [f64; 7] = [10.0, 9.0, 8.0, 7.0, 5.0, 9.0, 12.0];

/// Wednesday 2024-03-06 10:00 in New York.
pub fn open_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 6, 15, 0, 0).unwrap()
}

/// Saturday 2024-03-09 10:00 in New York.
pub fn weekend_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 9, 15, 0, 0).unwrap()
}

/// Hourly bars whose last bar is stamped `end`.
pub fn hourly_bars(closes: &[f64], end: DateTime<Utc>) -> Vec<Bar> {
    let n = closes.len() as i64;
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Bar {
            timestamp: end - Duration::hours(n - 1 - i as i64),
            open: close,
            high: close + 0.5,
            low: close - 0.5,
            close,
            volume: 1000.0,
        })
        .collect()
}

/// Short indicator lengths so a handful of bars is enough history.
pub fn scan_config(symbols: &str, extra: &str) -> ScanConfig {
    let content = format!(
        "[universe]\nsymbols = {}\n\
         [indicators]\nfast_length = 2\nslow_length = 3\nr2_length = 3\nr2_smoothing = 1\nrsi_length = 2\n\
         {}",
        symbols, extra
    );
    let adapter = FileConfigAdapter::from_string(&content).unwrap();
    ScanConfig::from_config(&adapter).unwrap()
}

pub struct MockUniverse {
    pub symbols: Vec<String>,
    pub fail: bool,
}

impl MockUniverse {
    pub fn new(symbols: &[&str]) -> Self {
        Self {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            symbols: Vec::new(),
            fail: true,
        }
    }
}

impl UniversePort for MockUniverse {
    fn fetch_symbols(&self) -> Result<Vec<String>, ScanError> {
        if self.fail {
            return Err(ScanError::UniverseFetch {
                reason: "index page unavailable".into(),
            });
        }
        Ok(self.symbols.clone())
    }
}

pub struct MockDataPort {
    pub data: HashMap<String, Vec<Bar>>,
    pub fail_batches: bool,
    pub calls: AtomicUsize,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            fail_batches: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_batches = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(&self, request: &FetchRequest) -> Result<BarMap, ScanError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_batches {
            return Err(ScanError::symbol_data("batch", "HTTP 429"));
        }
        Ok(request
            .symbols
            .iter()
            .filter_map(|s| self.data.get(s).map(|bars| (s.clone(), bars.clone())))
            .collect())
    }
}

#[derive(Default)]
pub struct RecordingArtifacts {
    pub symbols: Mutex<Vec<String>>,
    pub frames: Mutex<Vec<(String, Interval, usize)>>,
    pub results: Mutex<Vec<ResultRow>>,
    pub result_kinds: Mutex<Vec<SignalKind>>,
}

impl ArtifactPort for RecordingArtifacts {
    fn write_symbols(&self, symbols: &[String]) -> Result<(), ScanError> {
        *self.symbols.lock().unwrap() = symbols.to_vec();
        Ok(())
    }

    fn write_frame(
        &self,
        symbol: &str,
        interval: Interval,
        bars: &[Bar],
        frame: &IndicatorFrame,
    ) -> Result<(), ScanError> {
        assert_eq!(bars.len(), frame.len());
        self.frames
            .lock()
            .unwrap()
            .push((symbol.to_string(), interval, bars.len()));
        Ok(())
    }

    fn write_results(&self, rows: &[ResultRow], kinds: &[SignalKind]) -> Result<(), ScanError> {
        *self.results.lock().unwrap() = rows.to_vec();
        *self.result_kinds.lock().unwrap() = kinds.to_vec();
        Ok(())
    }
}

pub struct RecordingNotifier {
    pub sent: RefCell<Vec<String>>,
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            sent: RefCell::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            sent: RefCell::new(Vec::new()),
            fail: true,
        }
    }

    pub fn count(&self) -> usize {
        self.sent.borrow().len()
    }
}

impl NotifyPort for RecordingNotifier {
    fn send(&self, text: &str) -> Result<(), ScanError> {
        if self.fail {
            return Err(ScanError::Notify {
                reason: "chat unreachable".into(),
            });
        }
        self.sent.borrow_mut().push(text.to_string());
        Ok(())
    }
}

pub struct MemoryStateStore {
    pub state: RefCell<ScanState>,
    pub saves: RefCell<usize>,
    pub fail_saves: bool,
}

impl MemoryStateStore {
    pub fn new(state: ScanState) -> Self {
        Self {
            state: RefCell::new(state),
            saves: RefCell::new(0),
            fail_saves: false,
        }
    }

    /// A store whose writes fail, as with a read-only state file.
    pub fn failing_saves(state: ScanState) -> Self {
        Self {
            fail_saves: true,
            ..Self::new(state)
        }
    }

    pub fn current(&self) -> ScanState {
        self.state.borrow().clone()
    }
}

impl StatePort for MemoryStateStore {
    fn load(&self) -> Result<ScanState, ScanError> {
        Ok(self.state.borrow().clone())
    }

    fn save(&self, state: &ScanState) -> Result<(), ScanError> {
        if self.fail_saves {
            return Err(ScanError::State {
                reason: "scan_state.ini: permission denied".into(),
            });
        }
        *self.state.borrow_mut() = state.clone();
        *self.saves.borrow_mut() += 1;
        Ok(())
    }
}
