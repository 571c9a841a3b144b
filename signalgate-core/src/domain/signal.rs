use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::hashing::{content_hash, ContentHash};

/// Lifecycle state of a signal. Only `Dormant` signals form the evaluable population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    Dormant,
    Active,
    Retired,
}

impl Lifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::Dormant => "dormant",
            Lifecycle::Active => "active",
            Lifecycle::Retired => "retired",
        }
    }
}

impl FromStr for Lifecycle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dormant" => Ok(Lifecycle::Dormant),
            "active" => Ok(Lifecycle::Active),
            "retired" => Ok(Lifecycle::Retired),
            other => Err(format!("unknown lifecycle state '{other}'")),
        }
    }
}

/// Quality tier, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    C,
    B,
    A,
    S,
}

impl Tier {
    /// Tiers in ascending order, matching the cut-point bins.
    pub const ASCENDING: [Tier; 4] = [Tier::C, Tier::B, Tier::A, Tier::S];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::C => "C",
            Tier::B => "B",
            Tier::A => "A",
            Tier::S => "S",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "C" => Ok(Tier::C),
            "B" => Ok(Tier::B),
            "A" => Ok(Tier::A),
            "S" => Ok(Tier::S),
            other => Err(format!("unknown tier '{other}'")),
        }
    }
}

/// Boolean confluence factors carried by a signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactorFlags {
    pub price: bool,
    pub volume: bool,
    pub regime: bool,
    pub temporal: bool,
    pub catalyst: bool,
    pub testable: bool,
}

/// An evaluated trading signal.
///
/// Raw fields come from the signal producer; `quality_score` and `tier` are
/// the only fields the scorer writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub confluence_factor_count: i64,
    pub sitc_nodes_completed: i64,
    pub sitc_nodes_total: i64,
    /// Single category or pipe-delimited list (`"momentum|flow"`).
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub factors: FactorFlags,
    pub regime: Option<String>,
    pub lifecycle: Lifecycle,
    #[serde(default)]
    pub quality_score: Option<f64>,
    #[serde(default)]
    pub tier: Option<Tier>,
}

/// The raw, producer-owned fields of a signal (everything the scorer reads).
#[derive(Debug, Serialize)]
struct RawFields<'a> {
    id: &'a str,
    confluence_factor_count: i64,
    sitc_nodes_completed: i64,
    sitc_nodes_total: i64,
    category: &'a str,
    created_at: &'a DateTime<Utc>,
    factors: &'a FactorFlags,
    regime: Option<&'a str>,
}

impl Signal {
    /// Hash of the raw fields only; derived outputs never change the input hash.
    pub fn input_hash(&self) -> ContentHash {
        content_hash(&RawFields {
            id: &self.id,
            confluence_factor_count: self.confluence_factor_count,
            sitc_nodes_completed: self.sitc_nodes_completed,
            sitc_nodes_total: self.sitc_nodes_total,
            category: &self.category,
            created_at: &self.created_at,
            factors: &self.factors,
            regime: self.regime.as_deref(),
        })
    }

    /// Regime label used for the diversity snapshot.
    pub fn regime_label(&self) -> &str {
        match self.regime.as_deref().map(str::trim) {
            Some(label) if !label.is_empty() => label,
            _ => "unknown",
        }
    }

    /// Individual categories of a pipe-delimited category string.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.category
            .split('|')
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_signal() -> Signal {
        Signal {
            id: "sig-1".into(),
            confluence_factor_count: 4,
            sitc_nodes_completed: 3,
            sitc_nodes_total: 5,
            category: "momentum| flow".into(),
            created_at: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
            factors: FactorFlags::default(),
            regime: Some("trending".into()),
            lifecycle: Lifecycle::Dormant,
            quality_score: None,
            tier: None,
        }
    }

    #[test]
    fn input_hash_ignores_derived_fields() {
        let a = sample_signal();
        let mut b = sample_signal();
        b.quality_score = Some(0.9);
        b.tier = Some(Tier::S);
        assert_eq!(a.input_hash(), b.input_hash());
    }

    #[test]
    fn input_hash_tracks_raw_fields() {
        let a = sample_signal();
        let mut b = sample_signal();
        b.factors.catalyst = true;
        assert_ne!(a.input_hash(), b.input_hash());
    }

    #[test]
    fn categories_split_on_pipe() {
        let s = sample_signal();
        assert_eq!(s.categories().collect::<Vec<_>>(), vec!["momentum", "flow"]);
    }

    #[test]
    fn missing_regime_is_unknown() {
        let mut s = sample_signal();
        s.regime = Some("  ".into());
        assert_eq!(s.regime_label(), "unknown");
        s.regime = None;
        assert_eq!(s.regime_label(), "unknown");
    }

    #[test]
    fn tier_ordering() {
        assert!(Tier::C < Tier::B && Tier::B < Tier::A && Tier::A < Tier::S);
        assert_eq!("A".parse::<Tier>().unwrap(), Tier::A);
    }

    #[test]
    fn lifecycle_parses_case_insensitively() {
        assert_eq!("Dormant".parse::<Lifecycle>().unwrap(), Lifecycle::Dormant);
        assert!("zombie".parse::<Lifecycle>().is_err());
    }
}
