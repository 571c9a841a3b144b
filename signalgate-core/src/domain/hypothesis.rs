use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Comparison operator of a falsification rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparator {
    /// Whether `value <op> threshold` holds.
    pub fn holds(&self, value: f64, threshold: f64) -> bool {
        match self {
            Comparator::Lt => value < threshold,
            Comparator::Le => value <= threshold,
            Comparator::Gt => value > threshold,
            Comparator::Ge => value >= threshold,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
        }
    }
}

/// Errors from parsing a declared falsification rule.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleParseError {
    #[error("rule is empty")]
    Empty,
    #[error("no comparator found in '{0}'")]
    MissingComparator(String),
    #[error("invalid metric name '{0}'")]
    InvalidMetric(String),
    #[error("invalid threshold '{0}'")]
    InvalidThreshold(String),
}

/// A declarative falsification rule: the hypothesis is falsified when
/// `metric <comparator> threshold` holds for the observed outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FalsificationRule {
    pub metric: String,
    pub comparator: Comparator,
    pub threshold: f64,
}

impl FalsificationRule {
    /// Whether the rule fires for an observed metric value.
    pub fn triggers(&self, observed: f64) -> bool {
        observed.is_finite() && self.comparator.holds(observed, self.threshold)
    }
}

impl fmt::Display for FalsificationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.metric, self.comparator.symbol(), self.threshold)
    }
}

impl FromStr for FalsificationRule {
    type Err = RuleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if text.is_empty() {
            return Err(RuleParseError::Empty);
        }

        let pos = text
            .find(['<', '>'])
            .ok_or_else(|| RuleParseError::MissingComparator(text.to_string()))?;
        let rest = &text[pos..];
        let (comparator, op_len) = if rest.starts_with("<=") {
            (Comparator::Le, 2)
        } else if rest.starts_with(">=") {
            (Comparator::Ge, 2)
        } else if rest.starts_with('<') {
            (Comparator::Lt, 1)
        } else {
            (Comparator::Gt, 1)
        };

        let metric = text[..pos].trim();
        let valid_metric = !metric.is_empty()
            && metric
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_metric {
            return Err(RuleParseError::InvalidMetric(metric.to_string()));
        }

        let raw_threshold = text[pos + op_len..].trim();
        let threshold = raw_threshold
            .parse::<f64>()
            .ok()
            .filter(|t| t.is_finite())
            .ok_or_else(|| RuleParseError::InvalidThreshold(raw_threshold.to_string()))?;

        Ok(Self {
            metric: metric.to_ascii_lowercase(),
            comparator,
            threshold,
        })
    }
}

/// Falsification criteria as declared at hypothesis birth.
///
/// The rule is parsed once here. A malformed rule is kept as raw text with
/// `rule = None`; the gate then relies on its statistical thresholds alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FalsificationCriteria {
    pub raw: String,
    pub rule: Option<FalsificationRule>,
    pub min_sample_size: Option<u32>,
}

impl FalsificationCriteria {
    pub fn declare(raw: impl Into<String>, min_sample_size: Option<u32>) -> Self {
        let raw = raw.into();
        let rule = if raw.trim().is_empty() {
            None
        } else {
            match raw.parse::<FalsificationRule>() {
                Ok(rule) => Some(rule),
                Err(e) => {
                    tracing::warn!(rule = %raw, error = %e, "malformed falsification rule treated as absent");
                    None
                }
            }
        };
        Self {
            raw,
            rule,
            min_sample_size,
        }
    }

    pub fn none() -> Self {
        Self {
            raw: String::new(),
            rule: None,
            min_sample_size: None,
        }
    }

    pub fn is_well_formed(&self) -> bool {
        self.rule.is_some()
    }
}

/// Canonical hypothesis record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    pub id: String,
    pub statement: String,
    #[serde(default)]
    pub rationale: String,
    pub target_asset: String,
    #[serde(default)]
    pub regime_filter: Option<String>,
    pub current_confidence: f64,
    pub falsification: FalsificationCriteria,
    #[serde(default)]
    pub take_profit_pct: Option<f64>,
    #[serde(default)]
    pub trial_count: u32,
    #[serde(default)]
    pub prior_hypotheses_count: u32,
    #[serde(default)]
    pub parameter_count: u32,
    #[serde(default)]
    pub birth_score: Option<f64>,
    pub created_at: DateTime<Utc>,

    // ── Written by the promotion gate ──
    #[serde(default)]
    pub tier1_result: Option<String>,
    #[serde(default)]
    pub deflated_sharpe_estimate: Option<f64>,
    #[serde(default)]
    pub pbo_probability: Option<f64>,
    #[serde(default)]
    pub family_inflation_risk: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_less_than() {
        let rule: FalsificationRule = "win_rate < 0.45".parse().unwrap();
        assert_eq!(rule.metric, "win_rate");
        assert_eq!(rule.comparator, Comparator::Lt);
        assert!((rule.threshold - 0.45).abs() < 1e-12);
    }

    #[test]
    fn two_char_operators_win() {
        let rule: FalsificationRule = "sharpe>=1.5".parse().unwrap();
        assert_eq!(rule.comparator, Comparator::Ge);
        let rule: FalsificationRule = "pbo <= 0.2".parse().unwrap();
        assert_eq!(rule.comparator, Comparator::Le);
    }

    #[test]
    fn metric_is_normalized() {
        let rule: FalsificationRule = "  Win_Rate > 0.9 ".parse().unwrap();
        assert_eq!(rule.metric, "win_rate");
        assert_eq!(rule.to_string(), "win_rate > 0.9");
    }

    #[test]
    fn malformed_rules_are_rejected() {
        assert_eq!("".parse::<FalsificationRule>(), Err(RuleParseError::Empty));
        assert!(matches!(
            "win_rate = 0.4".parse::<FalsificationRule>(),
            Err(RuleParseError::MissingComparator(_))
        ));
        assert!(matches!(
            "< 0.4".parse::<FalsificationRule>(),
            Err(RuleParseError::InvalidMetric(_))
        ));
        assert!(matches!(
            "win rate < 0.4".parse::<FalsificationRule>(),
            Err(RuleParseError::InvalidMetric(_))
        ));
        assert!(matches!(
            "win_rate < abc".parse::<FalsificationRule>(),
            Err(RuleParseError::InvalidThreshold(_))
        ));
    }

    #[test]
    fn rule_triggers() {
        let rule: FalsificationRule = "win_rate < 0.45".parse().unwrap();
        assert!(rule.triggers(0.40));
        assert!(!rule.triggers(0.45));
        assert!(!rule.triggers(f64::NAN));
    }

    #[test]
    fn malformed_criteria_keep_raw_text() {
        let c = FalsificationCriteria::declare("win_rate ~ 0.4", Some(20));
        assert!(c.rule.is_none());
        assert_eq!(c.raw, "win_rate ~ 0.4");
        assert_eq!(c.min_sample_size, Some(20));
        assert!(!c.is_well_formed());
    }

    #[test]
    fn empty_criteria_have_no_rule() {
        let c = FalsificationCriteria::declare("   ", None);
        assert!(c.rule.is_none());
    }
}
