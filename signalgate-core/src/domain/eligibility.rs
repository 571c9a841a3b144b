//! Capital eligibility granted by the promotion gate.
//!
//! A record can only be constructed fail-closed: not eligible, shadow mode,
//! live capital and leverage blocked. Unlocking later stages is a separate
//! governance action outside this workspace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Where a promoted hypothesis may run.
///
/// The gate only ever writes `Shadow`. `Paper` and `Live` are set on the
/// ledger row by governance and are read back here; a later gate PASS never
/// resets them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionMode {
    Shadow,
    /// Set by governance only.
    Paper,
    /// Set by governance only.
    Live,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Shadow => "SHADOW",
            ExecutionMode::Paper => "PAPER",
            ExecutionMode::Live => "LIVE",
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SHADOW" => Ok(ExecutionMode::Shadow),
            "PAPER" => Ok(ExecutionMode::Paper),
            "LIVE" => Ok(ExecutionMode::Live),
            other => Err(format!("unknown execution mode '{other}'")),
        }
    }
}

/// Eligibility entry written on a gate PASS.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EligibilityRecord {
    hypothesis_id: String,
    experiment_id: String,
    granted_by: String,
    is_eligible: bool,
    execution_mode: ExecutionMode,
    live_capital_blocked: bool,
    leverage_blocked: bool,
    created_at: DateTime<Utc>,
}

impl EligibilityRecord {
    /// The only constructor: shadow-paper eligibility with every capital path blocked.
    pub fn shadow_only(
        hypothesis_id: impl Into<String>,
        experiment_id: impl Into<String>,
        granted_by: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            hypothesis_id: hypothesis_id.into(),
            experiment_id: experiment_id.into(),
            granted_by: granted_by.into(),
            is_eligible: false,
            execution_mode: ExecutionMode::Shadow,
            live_capital_blocked: true,
            leverage_blocked: true,
            created_at,
        }
    }

    pub fn hypothesis_id(&self) -> &str {
        &self.hypothesis_id
    }

    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    pub fn granted_by(&self) -> &str {
        &self.granted_by
    }

    pub fn is_eligible(&self) -> bool {
        self.is_eligible
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        self.execution_mode
    }

    pub fn live_capital_blocked(&self) -> bool {
        self.live_capital_blocked
    }

    pub fn leverage_blocked(&self) -> bool {
        self.leverage_blocked
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
