//! CLI definition and dispatch.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

use crate::adapters::cache_adapter::CachingDataPort;
use crate::adapters::csv_adapter::{CsvArtifactStore, CsvDataAdapter, CsvUniverse};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::ini_state_adapter::IniStateStore;
use crate::adapters::rate_limiter::RateLimiter;
use crate::adapters::sqlite_cache_adapter::SqliteBarStore;
use crate::adapters::telegram_adapter::{LogNotifier, TelegramNotifier};
use crate::adapters::wikipedia_adapter::WikipediaUniverse;
use crate::adapters::yahoo_adapter::YahooAdapter;
use crate::domain::config::{parse_timezone, DataProvider, ScanConfig, UniverseSource};
use crate::domain::error::ScanError;
use crate::domain::scan::{ScanOrchestrator, ScanReport, ScanStatus};
use crate::domain::universe::StaticUniverse;
use crate::ports::data_port::DataPort;
use crate::ports::notify_port::NotifyPort;
use crate::ports::universe_port::UniversePort;

pub const ENV_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
pub const ENV_CHAT_ID: &str = "TELEGRAM_CHAT_ID";
pub const ENV_TIMEZONE: &str = "SCAN_TIMEZONE";

#[derive(Parser, Debug)]
#[command(name = "spxscan", about = "Scheduled equity signal scanner")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one scan
    Scan {
        #[arg(short, long)]
        config: PathBuf,
        /// Ignore the market clock and the minimum run interval
        #[arg(long)]
        force: bool,
        /// Evaluate as of this RFC 3339 instant instead of the wall clock
        #[arg(long)]
        now: Option<String>,
    },
    /// Validate a configuration file and print the resolved rules
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show whether the market session is open
    MarketStatus {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        now: Option<String>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Scan { config, force, now } => run_scan(&config, force, now.as_deref()),
        Command::Validate { config } => run_validate(&config),
        Command::MarketStatus { config, now } => run_market_status(&config, now.as_deref()),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(reason = %e, "command failed");
            eprintln!("error: {e}");
            ExitCode::from(&e)
        }
    }
}

/// Loads and validates the configuration file, then applies the
/// `SCAN_TIMEZONE` override when it is set.
pub fn load_config(path: &Path) -> Result<ScanConfig, ScanError> {
    let adapter = FileConfigAdapter::from_file(path)?;
    let config = ScanConfig::from_config(&adapter)?;
    apply_timezone_override(config, std::env::var(ENV_TIMEZONE).ok().as_deref())
}

pub fn apply_timezone_override(
    mut config: ScanConfig,
    timezone: Option<&str>,
) -> Result<ScanConfig, ScanError> {
    if let Some(name) = timezone.filter(|n| !n.trim().is_empty()) {
        config.timezone = parse_timezone(name)?;
    }
    Ok(config)
}

pub fn parse_now(now: Option<&str>) -> Result<DateTime<Utc>, ScanError> {
    match now {
        None => Ok(Utc::now()),
        Some(raw) => DateTime::parse_from_rfc3339(raw.trim())
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| ScanError::invalid("cli", "now", format!("'{}': {}", raw, e))),
    }
}

/// Chat notifier when both credentials are present, otherwise a notifier
/// that only logs.
pub fn build_notifier(
    bot_token: Option<String>,
    chat_id: Option<String>,
) -> Result<Box<dyn NotifyPort>, ScanError> {
    match (
        bot_token.filter(|t| !t.trim().is_empty()),
        chat_id.filter(|c| !c.trim().is_empty()),
    ) {
        (Some(token), Some(chat)) => Ok(Box::new(TelegramNotifier::new(token, chat)?)),
        _ => {
            warn!("{} or {} not set, alerts go to the log", ENV_BOT_TOKEN, ENV_CHAT_ID);
            Ok(Box::new(LogNotifier))
        }
    }
}

/// Environment variable holding `suffix` for a routed channel, e.g.
/// `CROSS_TELEGRAM_BOT_TOKEN` for channel `cross`.
pub fn channel_env(channel: &str, suffix: &str) -> String {
    format!("{}_{}", channel.to_uppercase(), suffix)
}

/// Chat notifier for a routed channel. `None` when its credentials are not
/// both set, in which case the channel shares the main notifier.
pub fn build_channel_notifier(
    channel: &str,
    bot_token: Option<String>,
    chat_id: Option<String>,
) -> Result<Option<Box<dyn NotifyPort>>, ScanError> {
    match (
        bot_token.filter(|t| !t.trim().is_empty()),
        chat_id.filter(|c| !c.trim().is_empty()),
    ) {
        (Some(token), Some(chat)) => Ok(Some(Box::new(TelegramNotifier::new(token, chat)?))),
        _ => {
            warn!(
                channel,
                "{} or {} not set, channel uses the main chat",
                channel_env(channel, ENV_BOT_TOKEN),
                channel_env(channel, ENV_CHAT_ID)
            );
            Ok(None)
        }
    }
}

pub fn build_universe(source: &UniverseSource) -> Result<Box<dyn UniversePort>, ScanError> {
    Ok(match source {
        UniverseSource::Inline(symbols) => Box::new(StaticUniverse::new(symbols.clone())),
        UniverseSource::File(path) => Box::new(CsvUniverse::new(path.clone())),
        UniverseSource::Index(index) => Box::new(WikipediaUniverse::new(*index)?),
    })
}

/// The configured bar source behind the bar cache. Yahoo requests share one
/// rate limiter for the whole process, and their series are kept in the
/// cache file between runs when one is configured and can be opened.
pub fn build_data_port(config: &ScanConfig) -> Result<Box<dyn DataPort>, ScanError> {
    let ttl = Duration::from_secs(config.data.cache_ttl_seconds);
    Ok(match &config.data.provider {
        DataProvider::Yahoo => {
            let limiter = Arc::new(RateLimiter::new(
                config.data.max_requests,
                Duration::from_secs(config.data.per_seconds),
            ));
            let cache = CachingDataPort::new(YahooAdapter::new(limiter)?, ttl);
            match config.data.cache_file.as_deref().filter(|_| !ttl.is_zero()) {
                None => Box::new(cache),
                Some(path) => match SqliteBarStore::open(path) {
                    Ok(store) => Box::new(cache.with_store(Box::new(store))),
                    Err(e) => {
                        warn!(path = %path.display(), reason = %e, "bar cache unavailable, using memory only");
                        Box::new(cache)
                    }
                },
            }
        }
        DataProvider::Csv { dir } => {
            Box::new(CachingDataPort::new(CsvDataAdapter::new(dir.clone()), ttl))
        }
    })
}

fn run_scan(config_path: &Path, force: bool, now: Option<&str>) -> Result<(), ScanError> {
    let now = parse_now(now)?;
    let config = load_config(config_path)?;

    let universe = build_universe(&config.universe)?;
    let data = build_data_port(&config)?;
    let artifacts = CsvArtifactStore::new(
        config.output.dir.clone(),
        config.output.results_file.clone(),
    );
    let notifier = build_notifier(
        std::env::var(ENV_BOT_TOKEN).ok(),
        std::env::var(ENV_CHAT_ID).ok(),
    )?;
    let channels: BTreeSet<&str> = config.alert.routes.values().map(String::as_str).collect();
    let mut channel_notifiers = Vec::new();
    for channel in channels {
        if let Some(notifier) = build_channel_notifier(
            channel,
            std::env::var(channel_env(channel, ENV_BOT_TOKEN)).ok(),
            std::env::var(channel_env(channel, ENV_CHAT_ID)).ok(),
        )? {
            channel_notifiers.push((channel, notifier));
        }
    }
    let state = IniStateStore::new(config.output.state_file.clone());

    let mut orchestrator = ScanOrchestrator::new(
        &config,
        universe.as_ref(),
        data.as_ref(),
        &artifacts,
        notifier.as_ref(),
    )?;
    for (channel, notifier) in &channel_notifiers {
        orchestrator = orchestrator.with_channel(channel, notifier.as_ref());
    }
    let report = orchestrator.run(&state, now, force)?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &ScanReport) {
    match report.status {
        ScanStatus::MarketClosed => println!("Market closed, scan skipped"),
        ScanStatus::SkippedRecentRun => println!("Previous run too recent, scan skipped"),
        ScanStatus::Completed => {
            println!(
                "Scanned {} of {} symbols, {} recent signals",
                report.scanned,
                report.symbols_total,
                report.signals.len()
            );
            for skipped in &report.skipped {
                println!("  skipped {}: {}", skipped.symbol, skipped.reason);
            }
            for (channel, outcome) in &report.dispatch {
                println!("Alert [{}]: {:?}", channel, outcome);
            }
            if let Some(reason) = &report.state_error {
                println!("Warning: scan state not saved: {}", reason);
            }
        }
    }
}

fn run_validate(config_path: &Path) -> Result<(), ScanError> {
    eprintln!("Loading config from {}", config_path.display());
    let config = load_config(config_path)?;

    println!("Timezone:  {}", config.timezone);
    println!(
        "Session:   {} - {}",
        config.clock.open.format("%H:%M"),
        config.clock.close.format("%H:%M")
    );
    println!(
        "Bars:      {} -> {} over {} days",
        config.base_interval, config.target_interval, config.history_days
    );
    match &config.universe {
        UniverseSource::Inline(symbols) => println!("Universe:  {}", symbols.join(", ")),
        UniverseSource::File(path) => println!("Universe:  {}", path.display()),
        UniverseSource::Index(index) => println!("Universe:  {} ({})", index, index.url()),
    }
    println!("Rules:");
    for rule in config.rules() {
        println!(
            "  {:<22} {:<8} {}",
            rule.kind().config_name(),
            config.alert.channel_for(rule.kind()),
            rule.describe()
        );
    }
    println!("Configuration is valid");
    Ok(())
}

fn run_market_status(config_path: &Path, now: Option<&str>) -> Result<(), ScanError> {
    let now = parse_now(now)?;
    let config = load_config(config_path)?;
    let local = now.with_timezone(&config.timezone);
    let status = if config.clock.is_open(now, config.timezone) {
        "open"
    } else {
        "closed"
    };
    println!("{} market {}", local.format("%Y-%m-%d %H:%M %Z"), status);
    Ok(())
}
