//! Rule evaluation and signal detection.
//!
//! # Evaluation Semantics
//!
//! - Every rule is evaluated independently at every bar; several may fire on
//!   the same bar.
//! - Cross rules and `ThresholdCrossUnder` need the previous bar and never
//!   fire at index 0.
//! - A missing operand (indicator still warming up) means the rule does not
//!   fire. A column that was never computed is an error for that rule only.

use crate::domain::error::ScanError;
use crate::domain::indicator::{IndicatorFrame, IndicatorType};
use crate::domain::rule::Rule;
use crate::domain::signal::{Signal, SignalPayload};
use tracing::warn;

/// Evaluates `rule` at `index`, returning the payload when it fires.
pub fn evaluate(
    rule: &Rule,
    symbol: &str,
    frame: &IndicatorFrame,
    index: usize,
) -> Result<Option<SignalPayload>, ScanError> {
    let at = |indicator: IndicatorType, i: usize| frame.value(symbol, indicator, i);
    let prev = |indicator: IndicatorType| -> Result<Option<f64>, ScanError> {
        match index.checked_sub(1) {
            Some(i) => at(indicator, i),
            None => Ok(None),
        }
    };

    let payload = match rule {
        Rule::CrossOver { fast, slow } => {
            let (f, s, fp, sp) = (at(*fast, index)?, at(*slow, index)?, prev(*fast)?, prev(*slow)?);
            match (f, s, fp, sp) {
                (Some(f), Some(s), Some(fp), Some(sp)) if f > s && fp <= sp => {
                    Some(SignalPayload::Cross { fast: f, slow: s })
                }
                _ => None,
            }
        }
        Rule::CrossUnder { fast, slow } => {
            let (f, s, fp, sp) = (at(*fast, index)?, at(*slow, index)?, prev(*fast)?, prev(*slow)?);
            match (f, s, fp, sp) {
                (Some(f), Some(s), Some(fp), Some(sp)) if f < s && fp >= sp => {
                    Some(SignalPayload::Cross { fast: f, slow: s })
                }
                _ => None,
            }
        }
        Rule::ThresholdBuy {
            trend,
            oscillator,
            trend_min,
            oscillator_max,
        } => match (at(*trend, index)?, at(*oscillator, index)?) {
            (Some(t), Some(o)) if t > *trend_min && o < *oscillator_max => {
                Some(SignalPayload::Threshold {
                    trend: t,
                    oscillator: o,
                })
            }
            _ => None,
        },
        Rule::ThresholdSell {
            trend,
            oscillator,
            trend_min,
            oscillator_min,
        } => match (at(*trend, index)?, at(*oscillator, index)?) {
            (Some(t), Some(o)) if t > *trend_min && o > *oscillator_min => {
                Some(SignalPayload::Threshold {
                    trend: t,
                    oscillator: o,
                })
            }
            _ => None,
        },
        Rule::ThresholdCrossUnder { operand, level } => {
            match (prev(*operand)?, at(*operand, index)?) {
                (Some(p), Some(c)) if p > *level && c <= *level => Some(SignalPayload::Level {
                    previous: p,
                    current: c,
                }),
                _ => None,
            }
        }
    };
    Ok(payload)
}

/// Runs `rule` over every bar of `frame`.
pub fn rule_signals(
    rule: &Rule,
    symbol: &str,
    frame: &IndicatorFrame,
) -> Result<Vec<Signal>, ScanError> {
    for indicator in rule.indicators() {
        if frame.column(indicator).is_none() {
            return Err(ScanError::indicator(
                symbol,
                format!("{} needs {}, which was not computed", rule.kind(), indicator),
            ));
        }
    }

    let mut signals = Vec::new();
    for (index, timestamp) in frame.timestamps.iter().enumerate() {
        if let Some(payload) = evaluate(rule, symbol, frame, index)? {
            signals.push(Signal {
                symbol: symbol.to_string(),
                timestamp: *timestamp,
                kind: rule.kind(),
                payload,
            });
        }
    }
    Ok(signals)
}

#[derive(Debug, Default)]
pub struct Detection {
    pub signals: Vec<Signal>,
    pub rule_errors: Vec<ScanError>,
}

/// Runs every rule over `frame`. A failing rule is logged and skipped; the
/// others still run. Signals come back ordered by (timestamp, kind).
pub fn detect(symbol: &str, frame: &IndicatorFrame, rules: &[Rule]) -> Detection {
    let mut detection = Detection::default();
    for rule in rules {
        match rule_signals(rule, symbol, frame) {
            Ok(signals) => detection.signals.extend(signals),
            Err(e) => {
                warn!(symbol = %symbol, rule = %rule.kind(), reason = %e, "skipping rule");
                detection.rule_errors.push(e);
            }
        }
    }
    detection
        .signals
        .sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.kind.cmp(&b.kind)));
    detection
}
