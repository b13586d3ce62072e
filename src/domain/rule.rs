//! Signal rule definitions.
//!
//! A rule is a pure function of one or two indicator columns plus fixed
//! thresholds, evaluated at a bar and the bar before it. Which rules run is
//! chosen by configuration; all of them share one evaluation path.
//!
//! R² thresholds are on the unit scale [0, 1], RSI thresholds on [0, 100].

use crate::domain::indicator::{IndicatorSettings, IndicatorType};
use crate::domain::signal::SignalKind;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    CrossOver {
        fast: IndicatorType,
        slow: IndicatorType,
    },
    CrossUnder {
        fast: IndicatorType,
        slow: IndicatorType,
    },
    ThresholdBuy {
        trend: IndicatorType,
        oscillator: IndicatorType,
        trend_min: f64,
        oscillator_max: f64,
    },
    ThresholdSell {
        trend: IndicatorType,
        oscillator: IndicatorType,
        trend_min: f64,
        oscillator_min: f64,
    },
    ThresholdCrossUnder {
        operand: IndicatorType,
        level: f64,
    },
}

impl Rule {
    pub fn kind(&self) -> SignalKind {
        match self {
            Rule::CrossOver { .. } => SignalKind::CrossOver,
            Rule::CrossUnder { .. } => SignalKind::CrossUnder,
            Rule::ThresholdBuy { .. } => SignalKind::ThresholdBuy,
            Rule::ThresholdSell { .. } => SignalKind::ThresholdSell,
            Rule::ThresholdCrossUnder { .. } => SignalKind::ThresholdCrossUnder,
        }
    }

    /// One-line definition used as the alert section header.
    pub fn describe(&self) -> String {
        match self {
            Rule::CrossOver { fast, slow } => format!("{} crosses above {}", fast, slow),
            Rule::CrossUnder { fast, slow } => format!("{} crosses below {}", fast, slow),
            Rule::ThresholdBuy {
                trend,
                oscillator,
                trend_min,
                oscillator_max,
            } => format!(
                "{} > {:.2} and {} < {}",
                trend, trend_min, oscillator, oscillator_max
            ),
            Rule::ThresholdSell {
                trend,
                oscillator,
                trend_min,
                oscillator_min,
            } => format!(
                "{} > {:.2} and {} > {}",
                trend, trend_min, oscillator, oscillator_min
            ),
            Rule::ThresholdCrossUnder { operand, level } => {
                format!("{} crosses under {:.2}", operand, level)
            }
        }
    }

    pub fn indicators(&self) -> Vec<IndicatorType> {
        match self {
            Rule::CrossOver { fast, slow } | Rule::CrossUnder { fast, slow } => vec![*fast, *slow],
            Rule::ThresholdBuy {
                trend, oscillator, ..
            }
            | Rule::ThresholdSell {
                trend, oscillator, ..
            } => vec![*trend, *oscillator],
            Rule::ThresholdCrossUnder { operand, .. } => vec![*operand],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub r2_high: f64,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub r2_cross: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            r2_high: 0.90,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            r2_cross: 0.90,
        }
    }
}

/// Builds the rule for each requested kind over the configured indicators.
/// The cross rules compare `linreg(fast)` against `linreg(slow)`.
pub fn build_rules(
    kinds: &[SignalKind],
    settings: &IndicatorSettings,
    fast_length: usize,
    slow_length: usize,
    thresholds: &Thresholds,
) -> Vec<Rule> {
    let fast = IndicatorType::LinReg(fast_length);
    let slow = IndicatorType::LinReg(slow_length);
    kinds
        .iter()
        .map(|kind| match kind {
            SignalKind::CrossOver => Rule::CrossOver { fast, slow },
            SignalKind::CrossUnder => Rule::CrossUnder { fast, slow },
            SignalKind::ThresholdBuy => Rule::ThresholdBuy {
                trend: settings.r2_smoothed_type(),
                oscillator: settings.rsi_type(),
                trend_min: thresholds.r2_high,
                oscillator_max: thresholds.rsi_oversold,
            },
            SignalKind::ThresholdSell => Rule::ThresholdSell {
                trend: settings.r2_smoothed_type(),
                oscillator: settings.rsi_type(),
                trend_min: thresholds.r2_high,
                oscillator_min: thresholds.rsi_overbought,
            },
            SignalKind::ThresholdCrossUnder => Rule::ThresholdCrossUnder {
                operand: settings.r2_smoothed_type(),
                level: thresholds.r2_cross,
            },
        })
        .collect()
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum RuleListError {
    #[error("empty token in rule list")]
    EmptyToken,

    #[error("duplicate rule: {0}")]
    Duplicate(String),

    #[error("{0}")]
    Unknown(String),
}

/// Parses a comma-separated list of rule names, preserving order.
pub fn parse_rule_kinds(input: &str) -> Result<Vec<SignalKind>, RuleListError> {
    let mut kinds = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(RuleListError::EmptyToken);
        }
        let kind: SignalKind = trimmed.parse().map_err(RuleListError::Unknown)?;
        if !seen.insert(kind) {
            return Err(RuleListError::Duplicate(kind.config_name().to_string()));
        }
        kinds.push(kind);
    }

    Ok(kinds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rule_kinds_basic() {
        let kinds = parse_rule_kinds("cross_over, cross_under").unwrap();
        assert_eq!(kinds, vec![SignalKind::CrossOver, SignalKind::CrossUnder]);
    }

    #[test]
    fn parse_rule_kinds_empty_token() {
        assert_eq!(
            parse_rule_kinds("cross_over,,cross_under"),
            Err(RuleListError::EmptyToken)
        );
    }

    #[test]
    fn parse_rule_kinds_duplicate() {
        assert_eq!(
            parse_rule_kinds("threshold_buy,THRESHOLD_BUY"),
            Err(RuleListError::Duplicate("threshold_buy".into()))
        );
    }

    #[test]
    fn parse_rule_kinds_unknown() {
        assert!(matches!(
            parse_rule_kinds("cross_over,macd"),
            Err(RuleListError::Unknown(_))
        ));
    }

    #[test]
    fn build_rules_uses_configured_columns() {
        let settings = IndicatorSettings::default();
        let rules = build_rules(
            &SignalKind::ALL,
            &settings,
            25,
            50,
            &Thresholds::default(),
        );
        assert_eq!(rules.len(), 5);
        assert_eq!(
            rules[0],
            Rule::CrossOver {
                fast: IndicatorType::LinReg(25),
                slow: IndicatorType::LinReg(50)
            }
        );
        assert_eq!(
            rules[4].indicators(),
            vec![settings.r2_smoothed_type()]
        );
        for (rule, kind) in rules.iter().zip(SignalKind::ALL) {
            assert_eq!(rule.kind(), kind);
        }
    }

    #[test]
    fn describe_rules() {
        let settings = IndicatorSettings {
            r2_length: 14,
            ..IndicatorSettings::default()
        };
        let rules = build_rules(
            &[SignalKind::CrossOver, SignalKind::ThresholdBuy, SignalKind::ThresholdCrossUnder],
            &settings,
            25,
            50,
            &Thresholds::default(),
        );
        assert_eq!(rules[0].describe(), "linreg(25) crosses above linreg(50)");
        assert_eq!(rules[1].describe(), "R2(14) smoothed 3 > 0.90 and rsi14 < 30");
        assert_eq!(rules[2].describe(), "R2(14) smoothed 3 crosses under 0.90");
    }
}
