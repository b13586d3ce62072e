//! Alert formatting, throttling and dispatch.
//!
//! Each rule kind is routed to a named channel; kinds without a route go to
//! [`MAIN_CHANNEL`]. Every channel is throttled on its own cooldown. The
//! dispatcher only updates the [`ScanState`] it is handed; persisting it is
//! the orchestrator's job.

use crate::domain::rule::Rule;
use crate::domain::scan_state::ScanState;
use crate::domain::signal::{group_by_bar, Signal, SignalKind};
use crate::ports::notify_port::NotifyPort;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use chrono_tz::Tz;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

pub const MAIN_CHANNEL: &str = "main";

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M %Z";

/// Renders the alert text: the title, then one section per rule kind with the
/// rule definition as header and a row per (symbol, timestamp).
pub fn format_alert(title: &str, signals: &[Signal], rules: &[Rule], timezone: Tz) -> String {
    let mut text = format!("{}\n", title);
    if signals.is_empty() {
        text.push_str("No signals.\n");
        return text;
    }

    let flags: HashMap<(String, DateTime<Utc>), String> = group_by_bar(signals)
        .into_iter()
        .map(|row| {
            let flags = row.flags();
            ((row.symbol, row.timestamp), flags)
        })
        .collect();

    for kind in SignalKind::ALL {
        let section: Vec<&Signal> = signals.iter().filter(|s| s.kind == kind).collect();
        if section.is_empty() {
            continue;
        }
        let header = rules
            .iter()
            .find(|r| r.kind() == kind)
            .map(Rule::describe)
            .unwrap_or_default();
        text.push_str(&format!("\n[{}] {}\n", kind, header));
        for signal in section {
            let local = signal.timestamp.with_timezone(&timezone);
            let row_flags = flags
                .get(&(signal.symbol.clone(), signal.timestamp))
                .map(String::as_str)
                .unwrap_or(kind.flag());
            text.push_str(&format!(
                "{} {} {} {}\n",
                signal.symbol,
                local.format(TIME_FORMAT),
                row_flags,
                signal.payload
            ));
        }
    }
    text
}

/// True if nothing has been sent yet or at least `cooldown` has elapsed.
pub fn throttle(
    last_sent: Option<DateTime<FixedOffset>>,
    now: DateTime<Utc>,
    cooldown: Duration,
) -> bool {
    match last_sent {
        None => true,
        Some(last) => now.signed_duration_since(last) >= cooldown,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertPolicy {
    pub title: String,
    pub cooldown: Duration,
    /// Send a "no signals" message when nothing fired on a channel.
    pub notify_on_empty: bool,
    /// Channel per rule kind; unlisted kinds use [`MAIN_CHANNEL`].
    pub routes: BTreeMap<SignalKind, String>,
}

impl AlertPolicy {
    pub fn channel_for(&self, kind: SignalKind) -> &str {
        self.routes
            .get(&kind)
            .map(String::as_str)
            .unwrap_or(MAIN_CHANNEL)
    }

    /// Channels the given rules report to, each once. The main channel comes
    /// first when used; the rest follow rule order.
    pub fn channels(&self, rules: &[Rule]) -> Vec<&str> {
        let mut channels: Vec<&str> = Vec::new();
        for rule in rules {
            let channel = self.channel_for(rule.kind());
            if !channels.contains(&channel) {
                channels.push(channel);
            }
        }
        match channels.iter().position(|c| *c == MAIN_CHANNEL) {
            Some(index) => {
                let main = channels.remove(index);
                channels.insert(0, main);
            }
            None if channels.is_empty() => channels.push(MAIN_CHANNEL),
            None => {}
        }
        channels
    }
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            title: "Scan alerts".to_string(),
            cooldown: Duration::minutes(120),
            notify_on_empty: false,
            routes: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    Throttled,
    SuppressedEmpty,
    Failed(String),
}

/// Notifiers by channel name. A channel without its own notifier falls back
/// to the main one.
pub struct NotifyChannels<'a> {
    main: &'a dyn NotifyPort,
    named: BTreeMap<String, &'a dyn NotifyPort>,
}

impl<'a> NotifyChannels<'a> {
    pub fn new(main: &'a dyn NotifyPort) -> Self {
        Self {
            main,
            named: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, channel: &str, notifier: &'a dyn NotifyPort) {
        self.named.insert(channel.to_string(), notifier);
    }

    pub fn get(&self, channel: &str) -> &'a dyn NotifyPort {
        if channel == MAIN_CHANNEL {
            return self.main;
        }
        match self.named.get(channel) {
            Some(notifier) => *notifier,
            None => {
                debug!(channel, "no notifier for channel, using main");
                self.main
            }
        }
    }
}

pub struct AlertDispatcher<'a> {
    channels: &'a NotifyChannels<'a>,
    policy: &'a AlertPolicy,
    timezone: Tz,
}

impl<'a> AlertDispatcher<'a> {
    pub fn new(channels: &'a NotifyChannels<'a>, policy: &'a AlertPolicy, timezone: Tz) -> Self {
        Self {
            channels,
            policy,
            timezone,
        }
    }

    /// Splits `signals` by channel and dispatches each part. Every channel
    /// the rules report to gets an outcome, keyed by channel name.
    pub fn dispatch(
        &self,
        signals: &[Signal],
        rules: &[Rule],
        state: &mut ScanState,
        now: DateTime<Utc>,
    ) -> BTreeMap<String, DispatchOutcome> {
        self.policy
            .channels(rules)
            .into_iter()
            .map(|channel| {
                let batch: Vec<Signal> = signals
                    .iter()
                    .filter(|s| self.policy.channel_for(s.kind) == channel)
                    .cloned()
                    .collect();
                let outcome = self.dispatch_channel(channel, &batch, rules, state, now);
                (channel.to_string(), outcome)
            })
            .collect()
    }

    /// A failed send is logged and leaves the channel's last alert untouched
    /// so the next run retries.
    fn dispatch_channel(
        &self,
        channel: &str,
        signals: &[Signal],
        rules: &[Rule],
        state: &mut ScanState,
        now: DateTime<Utc>,
    ) -> DispatchOutcome {
        if signals.is_empty() && !self.policy.notify_on_empty {
            info!(channel, "no signals, alert suppressed");
            return DispatchOutcome::SuppressedEmpty;
        }
        let last_sent = state.last_alert_for(channel);
        if !throttle(last_sent, now, self.policy.cooldown) {
            info!(channel, last_alert_at = ?last_sent, "alert throttled");
            return DispatchOutcome::Throttled;
        }

        let text = format_alert(&self.policy.title, signals, rules, self.timezone);
        match self.channels.get(channel).send(&text) {
            Ok(()) => {
                state.record_alert_for(channel, now, self.timezone);
                info!(channel, signals = signals.len(), "alert sent");
                DispatchOutcome::Sent
            }
            Err(e) => {
                warn!(channel, reason = %e, "alert not sent");
                DispatchOutcome::Failed(e.to_string())
            }
        }
    }
}
