//! Typed scan configuration.
//!
//! Built once from a [`ConfigPort`] and validated before anything is fetched.
//! Every field has a default except the universe, which must name an index
//! `source`, an inline `symbols` list or a `symbols_file`.

use crate::domain::alert::{AlertPolicy, MAIN_CHANNEL};
use crate::domain::error::ScanError;
use crate::domain::indicator::{IndicatorSettings, PriceSource};
use crate::domain::market_clock::MarketClock;
use crate::domain::ohlcv::Interval;
use crate::domain::recent_window::lookback_for;
use crate::domain::rule::{build_rules, parse_rule_kinds, Rule, Thresholds};
use crate::domain::signal::SignalKind;
use crate::domain::universe::{parse_symbols, IndexList};
use crate::ports::config_port::ConfigPort;
use chrono::{Duration, NaiveTime};
use chrono_tz::Tz;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_TIMEZONE: &str = "US/Eastern";

const MAX_HISTORY_DAYS: i64 = 3650;
const MAX_LOOKBACK: i64 = 10_000;
/// Upper bound for minute-valued keys: one leap year.
const MAX_SETTING_MINUTES: i64 = 366 * 24 * 60;

#[derive(Debug, Clone, PartialEq)]
pub enum UniverseSource {
    Inline(Vec<String>),
    File(PathBuf),
    Index(IndexList),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataProvider {
    Yahoo,
    Csv { dir: PathBuf },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataSettings {
    pub provider: DataProvider,
    pub max_requests: u32,
    pub per_seconds: u64,
    pub cache_ttl_seconds: u64,
    /// SQLite file keeping fetched bars across runs. `None` keeps the cache
    /// in memory only.
    pub cache_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputSettings {
    pub dir: PathBuf,
    pub results_file: PathBuf,
    pub state_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    pub timezone: Tz,
    pub clock: MarketClock,
    pub base_interval: Interval,
    pub target_interval: Interval,
    pub history_days: u32,
    /// Count of lookback units; see [`Interval::lookback_unit`].
    pub lookback: u32,
    /// `lookback` units of the target interval.
    pub recent_window: Duration,
    pub workers: usize,
    /// `None` disables rounding.
    pub price_precision: Option<u32>,
    pub min_run_interval: Option<Duration>,
    pub universe: UniverseSource,
    pub indicators: IndicatorSettings,
    pub fast_length: usize,
    pub slow_length: usize,
    pub rule_kinds: Vec<SignalKind>,
    pub thresholds: Thresholds,
    pub alert: AlertPolicy,
    pub data: DataSettings,
    pub output: OutputSettings,
}

impl ScanConfig {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, ScanError> {
        let timezone = parse_timezone(
            &config
                .get_string("scan", "timezone")
                .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
        )?;

        let open = parse_time(config, "market_open", "09:30")?;
        let close = parse_time(config, "market_close", "16:00")?;
        if open >= close {
            return Err(ScanError::invalid(
                "scan",
                "market_open",
                "market_open must be before market_close",
            ));
        }

        let base_interval = parse_interval(config, "base_interval", None)?;
        let target_interval = parse_interval(config, "target_interval", Some(base_interval))?;
        if !base_interval.divides(target_interval) {
            return Err(ScanError::invalid(
                "scan",
                "target_interval",
                format!(
                    "{} does not evenly divide {}",
                    base_interval, target_interval
                ),
            ));
        }

        let history_days = bounded(config, "scan", "history_days", 30, MAX_HISTORY_DAYS)? as u32;
        let lookback = bounded(config, "scan", "lookback", 2, MAX_LOOKBACK)? as u32;
        let recent_window = lookback_for(target_interval, lookback).ok_or_else(|| {
            ScanError::invalid("scan", "lookback", "lookback window is out of range")
        })?;
        let workers = positive(config, "scan", "workers", 4)? as usize;
        let precision = config.get_int("scan", "price_precision", 2);
        let price_precision = (precision >= 0).then_some(precision.min(12) as u32);
        let min_run = minutes_setting(config, "scan", "min_run_interval_minutes", 0)?;
        let min_run_interval = (!min_run.is_zero()).then_some(min_run);

        let universe = parse_universe(config)?;

        let fast_length = positive(config, "indicators", "fast_length", 25)? as usize;
        let slow_length = positive(config, "indicators", "slow_length", 50)? as usize;
        if fast_length == slow_length {
            return Err(ScanError::invalid(
                "indicators",
                "slow_length",
                "fast_length and slow_length must differ",
            ));
        }
        let mut linreg_lengths = vec![fast_length, slow_length];
        for extra in parse_lengths(config, "extra_linreg_lengths")? {
            if !linreg_lengths.contains(&extra) {
                linreg_lengths.push(extra);
            }
        }
        let r2_length = positive(config, "indicators", "r2_length", 25)? as usize;
        if r2_length < 2 {
            return Err(ScanError::invalid(
                "indicators",
                "r2_length",
                "r2_length must be at least 2",
            ));
        }
        let r2_source: PriceSource = config
            .get_string("indicators", "r2_source")
            .unwrap_or_else(|| "hl2".to_string())
            .parse()
            .map_err(|e: String| ScanError::invalid("indicators", "r2_source", e))?;
        let indicators = IndicatorSettings {
            linreg_lengths,
            r2_length,
            r2_smoothing: positive(config, "indicators", "r2_smoothing", 3)? as usize,
            r2_source,
            rsi_length: positive(config, "indicators", "rsi_length", 14)? as usize,
        };

        let rule_kinds = match config.get_string("signals", "rules") {
            Some(list) if !list.trim().is_empty() && list.trim() != "all" => {
                parse_rule_kinds(&list)
                    .map_err(|e| ScanError::invalid("signals", "rules", e.to_string()))?
            }
            _ => SignalKind::ALL.to_vec(),
        };
        let thresholds = parse_thresholds(config)?;

        let cooldown = minutes_setting(config, "alert", "cooldown_minutes", 120)?;
        let alert = AlertPolicy {
            title: config
                .get_string("alert", "title")
                .unwrap_or_else(|| format!("Signals ({})", target_interval)),
            cooldown,
            notify_on_empty: config.get_bool("alert", "notify_on_empty", false),
            routes: parse_routes(config)?,
        };

        let dir = PathBuf::from(
            config
                .get_string("output", "dir")
                .unwrap_or_else(|| "stockdata".to_string()),
        );
        let data = parse_data(config, &dir)?;
        let results_file = dir.join(
            config
                .get_string("output", "results_file")
                .unwrap_or_else(|| format!("results_{}.csv", target_interval)),
        );
        let state_file = dir.join(
            config
                .get_string("output", "state_file")
                .unwrap_or_else(|| "scan_state.ini".to_string()),
        );

        Ok(Self {
            timezone,
            clock: MarketClock::new(open, close),
            base_interval,
            target_interval,
            history_days,
            lookback,
            recent_window,
            workers,
            price_precision,
            min_run_interval,
            universe,
            indicators,
            fast_length,
            slow_length,
            rule_kinds,
            thresholds,
            alert,
            data,
            output: OutputSettings {
                dir,
                results_file,
                state_file,
            },
        })
    }

    pub fn rules(&self) -> Vec<Rule> {
        build_rules(
            &self.rule_kinds,
            &self.indicators,
            self.fast_length,
            self.slow_length,
            &self.thresholds,
        )
    }

    /// Width of the recent-signal window.
    pub fn lookback_window(&self) -> Duration {
        self.recent_window
    }

    pub fn needs_resample(&self) -> bool {
        self.base_interval != self.target_interval
    }
}

pub fn parse_timezone(name: &str) -> Result<Tz, ScanError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| ScanError::invalid("scan", "timezone", format!("unknown timezone '{}'", name)))
}

fn parse_time(config: &dyn ConfigPort, key: &str, default: &str) -> Result<NaiveTime, ScanError> {
    let raw = config
        .get_string("scan", key)
        .unwrap_or_else(|| default.to_string());
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|_| ScanError::invalid("scan", key, format!("expected HH:MM, got '{}'", raw)))
}

fn parse_interval(
    config: &dyn ConfigPort,
    key: &str,
    default: Option<Interval>,
) -> Result<Interval, ScanError> {
    match (config.get_string("scan", key), default) {
        (Some(raw), _) => raw
            .parse()
            .map_err(|e: String| ScanError::invalid("scan", key, e)),
        (None, Some(interval)) => Ok(interval),
        (None, None) => "60m"
            .parse()
            .map_err(|e: String| ScanError::invalid("scan", key, e)),
    }
}

fn positive(config: &dyn ConfigPort, section: &str, key: &str, default: i64) -> Result<i64, ScanError> {
    let value = config.get_int(section, key, default);
    if value <= 0 {
        return Err(ScanError::invalid(
            section,
            key,
            format!("{} must be positive", key),
        ));
    }
    Ok(value)
}

fn bounded(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
    max: i64,
) -> Result<i64, ScanError> {
    let value = positive(config, section, key, default)?;
    if value > max {
        return Err(ScanError::invalid(
            section,
            key,
            format!("{} must be at most {}", key, max),
        ));
    }
    Ok(value)
}

/// A non-negative count of minutes, at most one leap year.
fn minutes_setting(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<Duration, ScanError> {
    let value = config.get_int(section, key, default);
    if !(0..=MAX_SETTING_MINUTES).contains(&value) {
        return Err(ScanError::invalid(
            section,
            key,
            format!("{} must be between 0 and {}", key, MAX_SETTING_MINUTES),
        ));
    }
    Duration::try_minutes(value)
        .ok_or_else(|| ScanError::invalid(section, key, format!("{} is out of range", key)))
}

fn parse_lengths(config: &dyn ConfigPort, key: &str) -> Result<Vec<usize>, ScanError> {
    let raw = match config.get_string("indicators", key) {
        Some(raw) if !raw.trim().is_empty() => raw,
        _ => return Ok(Vec::new()),
    };
    raw.split(',')
        .map(|token| match token.trim().parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(ScanError::invalid(
                "indicators",
                key,
                format!("'{}' is not a positive length", token.trim()),
            )),
        })
        .collect()
}

fn parse_thresholds(config: &dyn ConfigPort) -> Result<Thresholds, ScanError> {
    let defaults = Thresholds::default();
    let thresholds = Thresholds {
        r2_high: config.get_double("signals", "r2_high", defaults.r2_high),
        rsi_oversold: config.get_double("signals", "rsi_oversold", defaults.rsi_oversold),
        rsi_overbought: config.get_double("signals", "rsi_overbought", defaults.rsi_overbought),
        r2_cross: config.get_double("signals", "r2_cross", defaults.r2_cross),
    };

    for (key, value) in [("r2_high", thresholds.r2_high), ("r2_cross", thresholds.r2_cross)] {
        if !(value > 0.0 && value <= 1.0) {
            return Err(ScanError::invalid(
                "signals",
                key,
                format!("{} must be in (0, 1], got {}", key, value),
            ));
        }
    }
    for (key, value) in [
        ("rsi_oversold", thresholds.rsi_oversold),
        ("rsi_overbought", thresholds.rsi_overbought),
    ] {
        if !(0.0..=100.0).contains(&value) {
            return Err(ScanError::invalid(
                "signals",
                key,
                format!("{} must be in [0, 100], got {}", key, value),
            ));
        }
    }
    if thresholds.rsi_oversold >= thresholds.rsi_overbought {
        return Err(ScanError::invalid(
            "signals",
            "rsi_oversold",
            "rsi_oversold must be below rsi_overbought",
        ));
    }
    Ok(thresholds)
}

/// `[channels]` maps a rule name to the channel its alerts go to.
fn parse_routes(config: &dyn ConfigPort) -> Result<BTreeMap<SignalKind, String>, ScanError> {
    let mut routes = BTreeMap::new();
    for kind in SignalKind::ALL {
        let Some(raw) = config.get_string("channels", kind.config_name()) else {
            continue;
        };
        let channel = raw.trim().to_lowercase();
        let valid = !channel.is_empty()
            && channel
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(ScanError::invalid(
                "channels",
                kind.config_name(),
                format!("'{}' is not a valid channel name", raw.trim()),
            ));
        }
        if channel != MAIN_CHANNEL {
            routes.insert(kind, channel);
        }
    }
    Ok(routes)
}

fn parse_universe(config: &dyn ConfigPort) -> Result<UniverseSource, ScanError> {
    if let Some(source) = config
        .get_string("universe", "source")
        .filter(|s| !s.trim().is_empty())
    {
        return source
            .parse()
            .map(UniverseSource::Index)
            .map_err(|e: String| ScanError::invalid("universe", "source", e));
    }
    let inline = config
        .get_string("universe", "symbols")
        .filter(|s| !s.trim().is_empty());
    let file = config
        .get_string("universe", "symbols_file")
        .filter(|s| !s.trim().is_empty());

    match (inline, file) {
        (Some(list), _) => parse_symbols(&list)
            .map(UniverseSource::Inline)
            .map_err(|e| ScanError::invalid("universe", "symbols", e.to_string())),
        (None, Some(path)) => Ok(UniverseSource::File(PathBuf::from(path.trim()))),
        (None, None) => Err(ScanError::ConfigMissing {
            section: "universe".to_string(),
            key: "symbols".to_string(),
        }),
    }
}

fn parse_data(config: &dyn ConfigPort, output_dir: &Path) -> Result<DataSettings, ScanError> {
    let provider = match config
        .get_string("data", "provider")
        .map(|p| p.trim().to_lowercase())
        .as_deref()
    {
        None | Some("yahoo") => DataProvider::Yahoo,
        Some("csv") => {
            let dir = config
                .get_string("data", "csv_dir")
                .ok_or_else(|| ScanError::ConfigMissing {
                    section: "data".to_string(),
                    key: "csv_dir".to_string(),
                })?;
            DataProvider::Csv {
                dir: PathBuf::from(dir.trim()),
            }
        }
        Some(other) => {
            return Err(ScanError::invalid(
                "data",
                "provider",
                format!("unknown provider '{}'", other),
            ));
        }
    };
    let cache_ttl = config.get_int("data", "cache_ttl_seconds", 300);
    if cache_ttl < 0 {
        return Err(ScanError::invalid(
            "data",
            "cache_ttl_seconds",
            "cache_ttl_seconds must be non-negative",
        ));
    }
    let cache_file = match config.get_string("data", "cache_file") {
        Some(name) if name.trim().eq_ignore_ascii_case("none") => None,
        Some(name) if !name.trim().is_empty() => Some(output_dir.join(name.trim())),
        _ => Some(output_dir.join("bar_cache.sqlite")),
    };
    Ok(DataSettings {
        provider,
        max_requests: positive(config, "data", "max_requests", 2)? as u32,
        per_seconds: positive(config, "data", "per_seconds", 5)? as u64,
        cache_ttl_seconds: cache_ttl as u64,
        cache_file,
    })
}
