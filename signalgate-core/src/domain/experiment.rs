use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Lifecycle of an experiment with respect to the promotion gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExperimentStatus {
    /// Accumulating outcomes; not yet evaluated.
    Running,
    /// The gate has run at least once.
    Evaluated,
}

impl ExperimentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentStatus::Running => "RUNNING",
            ExperimentStatus::Evaluated => "EVALUATED",
        }
    }
}

impl FromStr for ExperimentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(ExperimentStatus::Running),
            "EVALUATED" => Ok(ExperimentStatus::Evaluated),
            other => Err(format!("unknown experiment status '{other}'")),
        }
    }
}

/// One running instantiation of a hypothesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: String,
    pub hypothesis_id: String,
    pub status: ExperimentStatus,
    pub started_at: DateTime<Utc>,
}

/// A single observed outcome. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub experiment_id: String,
    pub won: bool,
    /// Return in percent (1.5 = +1.5%).
    pub return_pct: f64,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}
