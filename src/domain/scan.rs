//! Scan orchestration.
//!
//! One run: market clock gate, minimum-interval guard, universe fetch, batched
//! bar fetch on a bounded worker pool, per-symbol resample and indicator and
//! signal pass, recent-window filter, alert dispatch, state update.
//!
//! A failure inside one symbol's pass never aborts the run. The symbol is
//! logged, recorded in [`ScanReport::skipped`] and left out of the results.
//! A state file that cannot be written is reported in
//! [`ScanReport::state_error`]; the scan itself still counts as done.

use crate::domain::alert::{AlertDispatcher, DispatchOutcome, NotifyChannels};
use crate::domain::config::ScanConfig;
use crate::domain::error::ScanError;
use crate::domain::indicator::compute_frame;
use crate::domain::ohlcv::{round_ohlc, validate_series, Bar};
use crate::domain::recent_window;
use crate::domain::resample::Resampler;
use crate::domain::rule::Rule;
use crate::domain::rule_eval::detect;
use crate::domain::scan_state::ScanState;
use crate::domain::signal::{group_by_bar, Signal};
use crate::ports::artifact_port::ArtifactPort;
use crate::ports::data_port::{DataPort, FetchRequest};
use crate::ports::notify_port::NotifyPort;
use crate::ports::state_port::StatePort;
use crate::ports::universe_port::UniversePort;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::thread;
use tracing::{debug, info, warn};

/// Symbols per data request.
pub const BATCH_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Completed,
    MarketClosed,
    SkippedRecentRun,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedSymbol {
    pub symbol: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct ScanReport {
    pub status: ScanStatus,
    pub symbols_total: usize,
    pub scanned: usize,
    pub skipped: Vec<SkippedSymbol>,
    /// Signals inside the recent window, in universe order.
    pub signals: Vec<Signal>,
    /// Outcome per notification channel. Empty unless the scan completed.
    pub dispatch: BTreeMap<String, DispatchOutcome>,
    /// Set when the updated state could not be persisted.
    pub state_error: Option<String>,
}

impl ScanReport {
    fn idle(status: ScanStatus) -> Self {
        Self {
            status,
            symbols_total: 0,
            scanned: 0,
            skipped: Vec::new(),
            signals: Vec::new(),
            dispatch: BTreeMap::new(),
            state_error: None,
        }
    }

    pub fn dispatch_outcome(&self, channel: &str) -> Option<&DispatchOutcome> {
        self.dispatch.get(channel)
    }
}

enum SymbolOutcome {
    Scanned(Vec<Signal>),
    Skipped(String),
}

/// Per-symbol work shared by every worker thread.
struct SymbolPipeline<'a> {
    config: &'a ScanConfig,
    data: &'a dyn DataPort,
    artifacts: &'a dyn ArtifactPort,
    rules: &'a [Rule],
    resampler: Option<Resampler>,
}

impl SymbolPipeline<'_> {
    fn run_batch(&self, batch: Vec<(usize, String)>) -> Vec<(usize, SymbolOutcome)> {
        let request = FetchRequest {
            symbols: batch.iter().map(|(_, s)| s.clone()).collect(),
            interval: self.config.base_interval,
            period_days: self.config.history_days,
        };
        let mut bars = match self.data.fetch_bars(&request) {
            Ok(bars) => bars,
            Err(e) => {
                warn!(symbols = request.symbols.len(), reason = %e, "batch fetch failed");
                return batch
                    .into_iter()
                    .map(|(i, _)| (i, SymbolOutcome::Skipped(e.to_string())))
                    .collect();
            }
        };

        batch
            .into_iter()
            .map(|(i, symbol)| {
                let outcome = match bars.remove(&symbol) {
                    None => Err(ScanError::symbol_data(&symbol, "no data returned")),
                    Some(series) => self.process(&symbol, series),
                };
                let outcome = match outcome {
                    Ok(signals) => SymbolOutcome::Scanned(signals),
                    Err(e) => {
                        warn!(symbol = %symbol, reason = %e, "skipping symbol");
                        SymbolOutcome::Skipped(e.to_string())
                    }
                };
                (i, outcome)
            })
            .collect()
    }

    fn process(&self, symbol: &str, bars: Vec<Bar>) -> Result<Vec<Signal>, ScanError> {
        validate_series(symbol, &bars)?;
        let mut bars = match &self.resampler {
            Some(resampler) => resampler.resample(&bars),
            None => bars,
        };
        bars.retain(Bar::is_complete);
        if bars.is_empty() {
            return Err(ScanError::symbol_data(symbol, "no complete bars"));
        }
        if let Some(precision) = self.config.price_precision {
            round_ohlc(&mut bars, precision);
        }

        let frame = compute_frame(symbol, &bars, &self.config.indicators)?;
        let detection = detect(symbol, &frame, self.rules);
        debug!(
            symbol = %symbol,
            bars = bars.len(),
            signals = detection.signals.len(),
            "symbol scanned"
        );

        if let Err(e) =
            self.artifacts
                .write_frame(symbol, self.config.target_interval, &bars, &frame)
        {
            warn!(symbol = %symbol, reason = %e, "frame not written");
        }
        Ok(detection.signals)
    }
}

pub struct ScanOrchestrator<'a> {
    config: &'a ScanConfig,
    universe: &'a dyn UniversePort,
    data: &'a dyn DataPort,
    artifacts: &'a dyn ArtifactPort,
    notifiers: NotifyChannels<'a>,
    rules: Vec<Rule>,
    resampler: Option<Resampler>,
}

impl<'a> ScanOrchestrator<'a> {
    pub fn new(
        config: &'a ScanConfig,
        universe: &'a dyn UniversePort,
        data: &'a dyn DataPort,
        artifacts: &'a dyn ArtifactPort,
        notifier: &'a dyn NotifyPort,
    ) -> Result<Self, ScanError> {
        let resampler = if config.needs_resample() {
            Some(Resampler::new(
                config.base_interval,
                config.target_interval,
                config.timezone,
            )?)
        } else {
            None
        };
        Ok(Self {
            config,
            universe,
            data,
            artifacts,
            notifiers: NotifyChannels::new(notifier),
            rules: config.rules(),
            resampler,
        })
    }

    /// Registers the notifier for a routed channel. Channels without one
    /// are sent through the main notifier.
    pub fn with_channel(mut self, channel: &str, notifier: &'a dyn NotifyPort) -> Self {
        self.notifiers.insert(channel, notifier);
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Loads state, scans, and saves the state when the scan changed it.
    /// A failed save is logged and carried in the report; the alerts it
    /// covers have already gone out.
    pub fn run(
        &self,
        store: &dyn StatePort,
        now: DateTime<Utc>,
        force: bool,
    ) -> Result<ScanReport, ScanError> {
        let state = store.load()?;
        let (mut report, updated) = self.scan(now, state.clone(), force)?;
        if updated != state {
            if let Err(e) = store.save(&updated) {
                warn!(reason = %e, "scan state not saved");
                report.state_error = Some(e.to_string());
            }
        }
        Ok(report)
    }

    /// One scan against `state`, returning the report and the state to
    /// persist. `force` bypasses the market clock and the minimum interval.
    pub fn scan(
        &self,
        now: DateTime<Utc>,
        mut state: ScanState,
        force: bool,
    ) -> Result<(ScanReport, ScanState), ScanError> {
        let config = self.config;
        if !force && !config.clock.is_open(now, config.timezone) {
            info!(now = %now.with_timezone(&config.timezone), "market closed, nothing to do");
            return Ok((ScanReport::idle(ScanStatus::MarketClosed), state));
        }
        if let Some(min_interval) = config.min_run_interval {
            if !force && state.ran_within(now, min_interval) {
                info!(last_run_at = ?state.last_run_at, "previous run too recent, skipping");
                return Ok((ScanReport::idle(ScanStatus::SkippedRecentRun), state));
            }
        }

        let symbols = self.universe.fetch_symbols()?;
        if symbols.is_empty() {
            warn!("universe is empty, nothing to scan");
        }
        info!(symbols = symbols.len(), interval = %config.target_interval, "scan started");
        if let Err(e) = self.artifacts.write_symbols(&symbols) {
            warn!(reason = %e, "symbol list not written");
        }

        let outcomes = self.process_all(&symbols);
        let mut signals = Vec::new();
        let mut skipped = Vec::new();
        let mut scanned = 0;
        for (symbol, outcome) in symbols.iter().zip(outcomes) {
            match outcome {
                SymbolOutcome::Scanned(found) => {
                    scanned += 1;
                    signals.extend(found);
                }
                SymbolOutcome::Skipped(reason) => skipped.push(SkippedSymbol {
                    symbol: symbol.clone(),
                    reason,
                }),
            }
        }

        let total = signals.len();
        let recent = recent_window::filter(signals, now, config.lookback_window());
        debug!(total, recent = recent.len(), "recent window applied");

        let rows = group_by_bar(&recent);
        if let Err(e) = self.artifacts.write_results(&rows, &config.rule_kinds) {
            warn!(reason = %e, "results not written");
        }

        let dispatcher = AlertDispatcher::new(&self.notifiers, &config.alert, config.timezone);
        let dispatch = dispatcher.dispatch(&recent, &self.rules, &mut state, now);
        state.record_run(now, config.timezone);

        info!(
            scanned,
            skipped = skipped.len(),
            signals = recent.len(),
            "scan finished"
        );
        let report = ScanReport {
            status: ScanStatus::Completed,
            symbols_total: symbols.len(),
            scanned,
            skipped,
            signals: recent,
            dispatch,
            state_error: None,
        };
        Ok((report, state))
    }

    /// Runs every symbol through the pipeline on at most `workers` threads.
    /// Outcomes come back in universe order.
    fn process_all(&self, symbols: &[String]) -> Vec<SymbolOutcome> {
        if symbols.is_empty() {
            return Vec::new();
        }
        let pipeline = SymbolPipeline {
            config: self.config,
            data: self.data,
            artifacts: self.artifacts,
            rules: &self.rules,
            resampler: self.resampler,
        };
        let batches: VecDeque<Vec<(usize, String)>> = symbols
            .iter()
            .cloned()
            .enumerate()
            .collect::<Vec<_>>()
            .chunks(BATCH_SIZE)
            .map(<[_]>::to_vec)
            .collect();
        let workers = self.config.workers.min(batches.len()).max(1);
        let queue = Mutex::new(batches);
        let results = Mutex::new(Vec::with_capacity(symbols.len()));

        thread::scope(|scope| {
            for _ in 0..workers {
                let (pipeline, queue, results) = (&pipeline, &queue, &results);
                scope.spawn(move || {
                    loop {
                        let next = queue.lock().pop_front();
                        let Some(batch) = next else { break };
                        let done = pipeline.run_batch(batch);
                        results.lock().extend(done);
                    }
                });
            }
        });

        let mut results = results.into_inner();
        results.sort_by_key(|(i, _)| *i);
        results.into_iter().map(|(_, outcome)| outcome).collect()
    }
}
