//! SQLite ledger — the shared store every batch job reads and writes.
//!
//! Reads go through `Ledger` directly. Writes only happen inside
//! `Ledger::unit_of_work`, which commits when the closure returns `Ok` and
//! rolls back on `Err` (or unwinding, when the transaction is dropped).

mod rows;
mod schema;
mod unit_of_work;

pub use rows::{EligibilityRow, HardStopRow, PromotionAuditRow, ScoreAuditRow, ShadowRow};
pub use unit_of_work::UnitOfWork;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use signalgate_core::domain::{
    Experiment, FactorFlags, FalsificationCriteria, FalsificationRule, Hypothesis, Outcome, Signal,
};

/// Errors from the ledger.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialize: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Invalid(String),
}

/// Connection to the ledger database.
pub struct Ledger {
    conn: Connection,
}

impl Ledger {
    /// Open (or create) a ledger file and ensure the schema exists.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        if !mode.eq_ignore_ascii_case("wal") {
            tracing::warn!(path = %path.display(), journal_mode = %mode, "ledger not in WAL mode");
        }
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(schema::SCHEMA)?;
        Ok(Self { conn })
    }

    /// Run `f` inside one transaction. `Ok` commits, `Err` rolls back.
    pub fn unit_of_work<T, F>(&mut self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&UnitOfWork<'_>) -> Result<T, StoreError>,
    {
        let uow = UnitOfWork::new(self.conn.transaction()?);
        let value = f(&uow)?;
        uow.commit()?;
        Ok(value)
    }

    // ─── Signals ─────────────────────────────────────────────────────

    pub fn signals(&self) -> Result<Vec<Signal>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT {SIGNAL_COLUMNS} FROM signals ORDER BY id ASC"))?;
        let rows = stmt.query_map([], signal_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn signal(&self, id: &str) -> Result<Option<Signal>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT {SIGNAL_COLUMNS} FROM signals WHERE id = ?1"))?;
        Ok(stmt.query_row([id], signal_from_row).optional()?)
    }

    pub fn score_audit(&self, signal_id: &str) -> Result<Vec<ScoreAuditRow>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT signal_id, input_hash, formula_hash, quality_score, tier,
                    sitc_pct, factor_pct, category_pct, recency_pct, scored_at
             FROM signal_score_audit WHERE signal_id = ?1 ORDER BY scored_at ASC",
        )?;
        let rows = stmt.query_map([signal_id], |row| {
            Ok(ScoreAuditRow {
                signal_id: row.get(0)?,
                input_hash: row.get(1)?,
                formula_hash: row.get(2)?,
                quality_score: row.get(3)?,
                tier: parse_col(row, 4)?,
                sitc_pct: row.get(5)?,
                factor_pct: row.get(6)?,
                category_pct: row.get(7)?,
                recency_pct: row.get(8)?,
                scored_at: row.get(9)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn hard_stops(&self) -> Result<Vec<HardStopRow>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT occurred_at, distribution, dominant_regime, non_dominant_pct,
                    threshold_pct, blocked_count, formula_hash
             FROM scoring_hard_stops ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(HardStopRow {
                occurred_at: row.get(0)?,
                distribution: json_col::<BTreeMap<String, usize>>(row, 1)?,
                dominant_regime: row.get(2)?,
                non_dominant_pct: row.get(3)?,
                threshold_pct: row.get(4)?,
                blocked_count: count_col(row, 5)?,
                formula_hash: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ─── Hypotheses / experiments / outcomes ─────────────────────────

    pub fn hypotheses(&self) -> Result<Vec<Hypothesis>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT {HYPOTHESIS_COLUMNS} FROM hypotheses ORDER BY id ASC"))?;
        let rows = stmt.query_map([], hypothesis_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn hypothesis(&self, id: &str) -> Result<Option<Hypothesis>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT {HYPOTHESIS_COLUMNS} FROM hypotheses WHERE id = ?1"))?;
        Ok(stmt.query_row([id], hypothesis_from_row).optional()?)
    }

    pub fn experiments(&self) -> Result<Vec<Experiment>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, hypothesis_id, status, started_at FROM experiments ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], experiment_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn experiment(&self, id: &str) -> Result<Option<Experiment>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, hypothesis_id, status, started_at FROM experiments WHERE id = ?1",
        )?;
        Ok(stmt.query_row([id], experiment_from_row).optional()?)
    }

    /// Other experiments already run for the same hypothesis.
    pub fn prior_experiment_count(&self, hypothesis_id: &str, experiment_id: &str) -> Result<u32, StoreError> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM experiments WHERE hypothesis_id = ?1 AND id <> ?2",
            params![hypothesis_id, experiment_id],
            |row| row.get(0),
        )?;
        u32::try_from(n).map_err(|_| StoreError::Invalid(format!("experiment count {n} out of range")))
    }

    /// Outcomes of an experiment in chronological order.
    pub fn outcomes(&self, experiment_id: &str) -> Result<Vec<Outcome>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT experiment_id, won, return_pct, opened_at, closed_at
             FROM outcomes WHERE experiment_id = ?1 ORDER BY opened_at ASC, id ASC",
        )?;
        let rows = stmt.query_map([experiment_id], |row| {
            Ok(Outcome {
                experiment_id: row.get(0)?,
                won: row.get(1)?,
                return_pct: row.get(2)?,
                opened_at: row.get(3)?,
                closed_at: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn outcome_count(&self, experiment_id: &str) -> Result<usize, StoreError> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM outcomes WHERE experiment_id = ?1",
            [experiment_id],
            |row| row.get(0),
        )?;
        usize::try_from(n).map_err(|_| StoreError::Invalid(format!("outcome count {n} out of range")))
    }

    // ─── Shadow evaluations ──────────────────────────────────────────

    pub fn shadow_evaluation(&self, content_hash: &str) -> Result<Option<ShadowRow>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT content_hash, hypothesis_id, target_asset, phase_a_score, phase_b_score,
                    phase_c_score, final_score, phase_a_capped, decision, confidence, evaluated_at
             FROM shadow_evaluations WHERE content_hash = ?1",
        )?;
        let row = stmt
            .query_row([content_hash], |row| {
                Ok(ShadowRow {
                    content_hash: row.get(0)?,
                    hypothesis_id: row.get(1)?,
                    target_asset: row.get(2)?,
                    phase_a_score: row.get(3)?,
                    phase_b_score: row.get(4)?,
                    phase_c_score: row.get(5)?,
                    final_score: row.get(6)?,
                    phase_a_capped: row.get(7)?,
                    decision: parse_col(row, 8)?,
                    confidence: parse_col(row, 9)?,
                    evaluated_at: row.get(10)?,
                })
            })
            .optional()?;
        Ok(row)
    }

    pub fn shadow_evaluation_count(&self) -> Result<usize, StoreError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM shadow_evaluations", [], |row| row.get(0))?;
        usize::try_from(n).map_err(|_| StoreError::Invalid(format!("shadow count {n} out of range")))
    }

    /// Shadow-ledger N: WOULD_REJECT evaluations for `asset` in `[since, until]`,
    /// other than `exclude_hash`.
    pub fn shadow_rejections(
        &self,
        asset: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        exclude_hash: &str,
    ) -> Result<u32, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT evaluated_at FROM shadow_evaluations
             WHERE target_asset = ?1 AND decision = 'WOULD_REJECT' AND content_hash <> ?2",
        )?;
        let times = stmt.query_map(params![asset.trim().to_ascii_uppercase(), exclude_hash], |row| {
            row.get::<_, DateTime<Utc>>(0)
        })?;
        let mut n = 0u32;
        for t in times {
            let t = t?;
            if t >= since && t <= until {
                n += 1;
            }
        }
        Ok(n)
    }

    // ─── Promotion audit / eligibility ───────────────────────────────

    pub fn promotion_audit(&self, hypothesis_id: &str, gate_name: &str) -> Result<Option<PromotionAuditRow>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT hypothesis_id, gate_name, experiment_id, verdict, falsified, deflated_sharpe,
                    pbo, family_risk, win_rate, metrics, failure_reason, input_hash, evaluated_at
             FROM promotion_audit WHERE hypothesis_id = ?1 AND gate_name = ?2",
        )?;
        let row = stmt
            .query_row(params![hypothesis_id, gate_name], |row| {
                Ok(PromotionAuditRow {
                    hypothesis_id: row.get(0)?,
                    gate_name: row.get(1)?,
                    experiment_id: row.get(2)?,
                    verdict: parse_col(row, 3)?,
                    falsified: row.get(4)?,
                    deflated_sharpe: row.get(5)?,
                    pbo: row.get(6)?,
                    family_risk: row.get(7)?,
                    win_rate: row.get(8)?,
                    metrics: row.get(9)?,
                    failure_reason: row.get(10)?,
                    input_hash: row.get(11)?,
                    evaluated_at: row.get(12)?,
                })
            })
            .optional()?;
        Ok(row)
    }

    pub fn promotion_audit_count(&self) -> Result<usize, StoreError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM promotion_audit", [], |row| row.get(0))?;
        usize::try_from(n).map_err(|_| StoreError::Invalid(format!("audit count {n} out of range")))
    }

    /// Hypotheses with any promotion audit entry, under any gate name.
    pub fn audited_hypotheses(&self) -> Result<BTreeSet<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT DISTINCT hypothesis_id FROM promotion_audit")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<BTreeSet<_>, _>>()?)
    }

    pub fn eligibility(&self, hypothesis_id: &str) -> Result<Option<EligibilityRow>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT hypothesis_id, experiment_id, granted_by, is_eligible, execution_mode,
                    live_capital_blocked, leverage_blocked, created_at
             FROM eligibility WHERE hypothesis_id = ?1",
        )?;
        let row = stmt
            .query_row([hypothesis_id], |row| {
                Ok(EligibilityRow {
                    hypothesis_id: row.get(0)?,
                    experiment_id: row.get(1)?,
                    granted_by: row.get(2)?,
                    is_eligible: row.get(3)?,
                    execution_mode: parse_col(row, 4)?,
                    live_capital_blocked: row.get(5)?,
                    leverage_blocked: row.get(6)?,
                    created_at: row.get(7)?,
                })
            })
            .optional()?;
        Ok(row)
    }

    pub fn eligibility_count(&self) -> Result<usize, StoreError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM eligibility", [], |row| row.get(0))?;
        usize::try_from(n).map_err(|_| StoreError::Invalid(format!("eligibility count {n} out of range")))
    }

    pub fn heartbeat_count(&self, job: &str) -> Result<usize, StoreError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM heartbeats WHERE job = ?1", [job], |row| row.get(0))?;
        usize::try_from(n).map_err(|_| StoreError::Invalid(format!("heartbeat count {n} out of range")))
    }
}

// ─── Row mapping ─────────────────────────────────────────────────────

const SIGNAL_COLUMNS: &str = "id, confluence_factor_count, sitc_nodes_completed, sitc_nodes_total, \
    category, created_at, factor_price, factor_volume, factor_regime, factor_temporal, \
    factor_catalyst, factor_testable, regime, lifecycle, quality_score, tier";

const HYPOTHESIS_COLUMNS: &str = "id, statement, rationale, target_asset, regime_filter, \
    current_confidence, falsification_raw, falsification_rule, min_sample_size, take_profit_pct, \
    trial_count, prior_hypotheses_count, parameter_count, birth_score, created_at, tier1_result, \
    deflated_sharpe_estimate, pbo_probability, family_inflation_risk";

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

/// Parse a TEXT column through `FromStr`.
fn parse_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

fn json_col<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e.to_string()))
}

fn count_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<usize> {
    let n: i64 = row.get(idx)?;
    usize::try_from(n).map_err(|_| conversion_error(idx, format!("negative count {n}")))
}

fn signal_from_row(row: &Row<'_>) -> rusqlite::Result<Signal> {
    let tier: Option<String> = row.get(15)?;
    let tier = match tier {
        Some(t) => Some(t.parse().map_err(|e| conversion_error(15, e))?),
        None => None,
    };
    Ok(Signal {
        id: row.get(0)?,
        confluence_factor_count: row.get(1)?,
        sitc_nodes_completed: row.get(2)?,
        sitc_nodes_total: row.get(3)?,
        category: row.get(4)?,
        created_at: row.get(5)?,
        factors: FactorFlags {
            price: row.get(6)?,
            volume: row.get(7)?,
            regime: row.get(8)?,
            temporal: row.get(9)?,
            catalyst: row.get(10)?,
            testable: row.get(11)?,
        },
        regime: row.get(12)?,
        lifecycle: parse_col(row, 13)?,
        quality_score: row.get(14)?,
        tier,
    })
}

fn hypothesis_from_row(row: &Row<'_>) -> rusqlite::Result<Hypothesis> {
    let rule: Option<String> = row.get(7)?;
    let rule = match rule {
        Some(json) => Some(
            serde_json::from_str::<FalsificationRule>(&json).map_err(|e| conversion_error(7, e.to_string()))?,
        ),
        None => None,
    };
    Ok(Hypothesis {
        id: row.get(0)?,
        statement: row.get(1)?,
        rationale: row.get(2)?,
        target_asset: row.get(3)?,
        regime_filter: row.get(4)?,
        current_confidence: row.get(5)?,
        falsification: FalsificationCriteria {
            raw: row.get(6)?,
            rule,
            min_sample_size: row.get(8)?,
        },
        take_profit_pct: row.get(9)?,
        trial_count: row.get(10)?,
        prior_hypotheses_count: row.get(11)?,
        parameter_count: row.get(12)?,
        birth_score: row.get(13)?,
        created_at: row.get(14)?,
        tier1_result: row.get(15)?,
        deflated_sharpe_estimate: row.get(16)?,
        pbo_probability: row.get(17)?,
        family_inflation_risk: row.get(18)?,
    })
}

fn experiment_from_row(row: &Row<'_>) -> rusqlite::Result<Experiment> {
    Ok(Experiment {
        id: row.get(0)?,
        hypothesis_id: row.get(1)?,
        status: parse_col(row, 2)?,
        started_at: row.get(3)?,
    })
}
