//! Ledger schema. Every statement is idempotent.

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS signals (
    id TEXT PRIMARY KEY,
    confluence_factor_count INTEGER NOT NULL,
    sitc_nodes_completed INTEGER NOT NULL,
    sitc_nodes_total INTEGER NOT NULL,
    category TEXT NOT NULL,
    created_at TEXT NOT NULL,
    factor_price INTEGER NOT NULL,
    factor_volume INTEGER NOT NULL,
    factor_regime INTEGER NOT NULL,
    factor_temporal INTEGER NOT NULL,
    factor_catalyst INTEGER NOT NULL,
    factor_testable INTEGER NOT NULL,
    regime TEXT,
    lifecycle TEXT NOT NULL,
    quality_score REAL,
    tier TEXT
);
CREATE INDEX IF NOT EXISTS idx_signals_lifecycle ON signals(lifecycle);

CREATE TABLE IF NOT EXISTS hypotheses (
    id TEXT PRIMARY KEY,
    statement TEXT NOT NULL,
    rationale TEXT NOT NULL,
    target_asset TEXT NOT NULL,
    regime_filter TEXT,
    current_confidence REAL NOT NULL,
    falsification_raw TEXT NOT NULL,
    falsification_rule TEXT,
    min_sample_size INTEGER,
    take_profit_pct REAL,
    trial_count INTEGER NOT NULL,
    prior_hypotheses_count INTEGER NOT NULL,
    parameter_count INTEGER NOT NULL,
    birth_score REAL,
    created_at TEXT NOT NULL,
    tier1_result TEXT,
    deflated_sharpe_estimate REAL,
    pbo_probability REAL,
    family_inflation_risk REAL
);

CREATE TABLE IF NOT EXISTS experiments (
    id TEXT PRIMARY KEY,
    hypothesis_id TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_experiments_hypothesis ON experiments(hypothesis_id);

CREATE TABLE IF NOT EXISTS outcomes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    experiment_id TEXT NOT NULL,
    won INTEGER NOT NULL,
    return_pct REAL NOT NULL,
    opened_at TEXT NOT NULL,
    closed_at TEXT,
    UNIQUE (experiment_id, opened_at)
);

CREATE TABLE IF NOT EXISTS signal_score_audit (
    signal_id TEXT NOT NULL,
    input_hash TEXT NOT NULL,
    formula_hash TEXT NOT NULL,
    quality_score REAL NOT NULL,
    tier TEXT NOT NULL,
    sitc_pct REAL NOT NULL,
    factor_pct REAL NOT NULL,
    category_pct REAL NOT NULL,
    recency_pct REAL NOT NULL,
    sub_metrics TEXT NOT NULL,
    scored_at TEXT NOT NULL,
    PRIMARY KEY (signal_id, input_hash, formula_hash)
);

CREATE TABLE IF NOT EXISTS scoring_hard_stops (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    occurred_at TEXT NOT NULL,
    distribution TEXT NOT NULL,
    dominant_regime TEXT,
    non_dominant_pct REAL NOT NULL,
    threshold_pct REAL NOT NULL,
    blocked_count INTEGER NOT NULL,
    formula_hash TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS shadow_evaluations (
    content_hash TEXT PRIMARY KEY,
    hypothesis_id TEXT NOT NULL,
    target_asset TEXT NOT NULL,
    current_regime TEXT,
    phase_a_score REAL NOT NULL,
    phase_b_score REAL NOT NULL,
    phase_c_score REAL NOT NULL,
    breakdown TEXT NOT NULL,
    final_score REAL NOT NULL,
    phase_a_capped INTEGER NOT NULL,
    decision TEXT NOT NULL,
    confidence TEXT NOT NULL,
    evaluated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_shadow_asset_time ON shadow_evaluations(target_asset, evaluated_at);

CREATE TABLE IF NOT EXISTS promotion_audit (
    hypothesis_id TEXT NOT NULL,
    gate_name TEXT NOT NULL,
    experiment_id TEXT,
    verdict TEXT NOT NULL,
    falsified INTEGER NOT NULL,
    deflated_sharpe REAL,
    pbo REAL,
    family_risk REAL,
    win_rate REAL,
    metrics TEXT,
    failure_reason TEXT,
    input_hash TEXT NOT NULL,
    evaluated_at TEXT NOT NULL,
    PRIMARY KEY (hypothesis_id, gate_name)
);

CREATE TABLE IF NOT EXISTS eligibility (
    hypothesis_id TEXT PRIMARY KEY,
    experiment_id TEXT NOT NULL,
    granted_by TEXT NOT NULL,
    is_eligible INTEGER NOT NULL,
    execution_mode TEXT NOT NULL,
    live_capital_blocked INTEGER NOT NULL,
    leverage_blocked INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS heartbeats (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job TEXT NOT NULL,
    ran_at TEXT NOT NULL
);
";
