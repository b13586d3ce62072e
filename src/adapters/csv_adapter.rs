//! CSV file adapters: offline bar source, symbol-list universe and the
//! artifact store for symbol lists, derived frames and result tables.

use crate::domain::error::ScanError;
use crate::domain::indicator::{IndicatorFrame, IndicatorType};
use crate::domain::ohlcv::{Bar, Interval};
use crate::domain::signal::{ResultRow, SignalKind};
use crate::domain::universe::normalize_symbols;
use crate::ports::artifact_port::ArtifactPort;
use crate::ports::data_port::{BarMap, DataPort, FetchRequest};
use crate::ports::universe_port::UniversePort;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct BarRecord {
    timestamp: String,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<f64>,
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
        .ok_or_else(|| format!("invalid timestamp '{}'", raw))
}

/// Reads bars from `<dir>/<SYMBOL>_<interval>.csv`. Columns: timestamp
/// (RFC 3339 or YYYY-MM-DD), open, high, low, close, volume. Empty cells are
/// read as missing.
pub struct CsvDataAdapter {
    base_path: PathBuf,
}

impl CsvDataAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str, interval: Interval) -> PathBuf {
        self.base_path.join(format!("{}_{}.csv", symbol, interval))
    }

    fn read_bars(&self, path: &Path, period_days: u32) -> Result<Vec<Bar>, String> {
        let mut rdr = csv::Reader::from_path(path).map_err(|e| e.to_string())?;
        let mut bars = Vec::new();
        for result in rdr.deserialize() {
            let record: BarRecord = result.map_err(|e| format!("CSV parse error: {}", e))?;
            bars.push(Bar {
                timestamp: parse_timestamp(&record.timestamp)?,
                open: record.open.unwrap_or(f64::NAN),
                high: record.high.unwrap_or(f64::NAN),
                low: record.low.unwrap_or(f64::NAN),
                close: record.close.unwrap_or(f64::NAN),
                volume: record.volume.unwrap_or(f64::NAN),
            });
        }
        bars.sort_by_key(|b| b.timestamp);

        // History is counted back from the newest bar in the file.
        if let Some(last) = bars.last().map(|b| b.timestamp) {
            let cutoff = last - Duration::days(period_days as i64);
            bars.retain(|b| b.timestamp > cutoff);
        }
        Ok(bars)
    }
}

impl DataPort for CsvDataAdapter {
    fn fetch_bars(&self, request: &FetchRequest) -> Result<BarMap, ScanError> {
        let mut map = BarMap::new();
        for symbol in &request.symbols {
            let path = self.csv_path(symbol, request.interval);
            if !path.exists() {
                debug!(symbol = %symbol, path = %path.display(), "no bar file");
                continue;
            }
            match self.read_bars(&path, request.period_days) {
                Ok(bars) if !bars.is_empty() => {
                    map.insert(symbol.clone(), bars);
                }
                Ok(_) => debug!(symbol = %symbol, "bar file is empty"),
                Err(reason) => warn!(symbol = %symbol, reason = %reason, "unreadable bar file"),
            }
        }
        Ok(map)
    }
}

/// Universe read from a CSV file with a `Ticker` column. Without such a
/// header the first column is used.
pub struct CsvUniverse {
    path: PathBuf,
}

impl CsvUniverse {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl UniversePort for CsvUniverse {
    fn fetch_symbols(&self) -> Result<Vec<String>, ScanError> {
        let fail = |reason: String| ScanError::UniverseFetch {
            reason: format!("{}: {}", self.path.display(), reason),
        };
        let mut rdr = csv::Reader::from_path(&self.path).map_err(|e| fail(e.to_string()))?;
        let column = rdr
            .headers()
            .map_err(|e| fail(e.to_string()))?
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case("ticker"))
            .unwrap_or(0);

        let mut raw = Vec::new();
        for record in rdr.records() {
            let record = record.map_err(|e| fail(e.to_string()))?;
            if let Some(symbol) = record.get(column) {
                raw.push(symbol.to_string());
            }
        }
        normalize_symbols(raw).map_err(|e| fail(e.to_string()))
    }
}

/// Writes scan artifacts under one output directory.
pub struct CsvArtifactStore {
    dir: PathBuf,
    results_file: PathBuf,
}

impl CsvArtifactStore {
    pub fn new(dir: PathBuf, results_file: PathBuf) -> Self {
        Self { dir, results_file }
    }

    pub fn symbols_path(&self) -> PathBuf {
        self.dir.join("symbols.csv")
    }

    pub fn frame_path(&self, symbol: &str, interval: Interval) -> PathBuf {
        self.dir.join(format!("{}_{}_data.csv", symbol, interval))
    }

    fn write_rows<I>(&self, path: &Path, header: Vec<String>, rows: I) -> Result<(), ScanError>
    where
        I: IntoIterator<Item = Vec<String>>,
    {
        let fail = |reason: String| ScanError::Artifact {
            path: path.display().to_string(),
            reason,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| fail(e.to_string()))?;
        }
        let mut wtr = csv::Writer::from_path(path).map_err(|e| fail(e.to_string()))?;
        wtr.write_record(&header).map_err(|e| fail(e.to_string()))?;
        for row in rows {
            wtr.write_record(&row).map_err(|e| fail(e.to_string()))?;
        }
        wtr.flush().map_err(|e| fail(e.to_string()))
    }
}

fn cell(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => v.to_string(),
        _ => String::new(),
    }
}

impl ArtifactPort for CsvArtifactStore {
    fn write_symbols(&self, symbols: &[String]) -> Result<(), ScanError> {
        self.write_rows(
            &self.symbols_path(),
            vec!["Ticker".to_string()],
            symbols.iter().map(|s| vec![s.clone()]),
        )
    }

    fn write_frame(
        &self,
        symbol: &str,
        interval: Interval,
        bars: &[Bar],
        frame: &IndicatorFrame,
    ) -> Result<(), ScanError> {
        let columns: Vec<(&IndicatorType, &Vec<Option<f64>>)> = frame
            .columns
            .iter()
            .filter(|(t, _)| **t != IndicatorType::Close)
            .collect();

        let mut header: Vec<String> = ["timestamp", "open", "high", "low", "close", "volume"]
            .into_iter()
            .map(String::from)
            .collect();
        header.extend(columns.iter().map(|(t, _)| t.column_name()));

        let rows = bars.iter().enumerate().map(|(i, bar)| {
            let mut row = vec![
                bar.timestamp.to_rfc3339(),
                cell(Some(bar.open)),
                cell(Some(bar.high)),
                cell(Some(bar.low)),
                cell(Some(bar.close)),
                cell(Some(bar.volume)),
            ];
            row.extend(columns.iter().map(|(_, values)| cell(values.get(i).copied().flatten())));
            row
        });
        self.write_rows(&self.frame_path(symbol, interval), header, rows)
    }

    fn write_results(&self, rows: &[ResultRow], kinds: &[SignalKind]) -> Result<(), ScanError> {
        let mut header = vec!["symbol".to_string(), "timestamp".to_string()];
        header.extend(kinds.iter().map(|k| k.config_name().to_string()));

        let records = rows.iter().map(|row| {
            let mut record = vec![row.symbol.clone(), row.timestamp.to_rfc3339()];
            record.extend(
                kinds
                    .iter()
                    .map(|k| String::from(if row.kinds.contains(k) { "1" } else { "0" })),
            );
            record
        });
        self.write_rows(&self.results_file, header, records)
    }
}
