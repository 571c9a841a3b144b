use chrono::{DateTime, Duration, TimeZone, Utc};
use signalgate_core::domain::{
    ExecutionMode, Experiment, ExperimentStatus, FalsificationCriteria, Hypothesis, Outcome,
};
use signalgate_core::{GateConfig, GateVerdict, OverfittingPromotionGate, EXPLORATION_GATE_NAME, GATE_NAME};
use signalgate_runner::{run_exploration, run_gate, GateTarget, Ledger, RunOptions};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 5, 14, 0, 0).unwrap()
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap()
}

fn hypothesis(id: &str) -> Hypothesis {
    Hypothesis {
        id: id.into(),
        statement: "BTC funding rate above 0.05% predicts a 2% price drop within 48 hours.".into(),
        rationale: "Crowded longs pay funding because leverage is one-sided.".into(),
        target_asset: "BTC".into(),
        regime_filter: None,
        current_confidence: 0.6,
        falsification: FalsificationCriteria::declare("win_rate < 0.45", Some(30)),
        take_profit_pct: Some(2.0),
        trial_count: 3,
        prior_hypotheses_count: 1,
        parameter_count: 2,
        birth_score: None,
        created_at: t0(),
        tier1_result: None,
        deflated_sharpe_estimate: None,
        pbo_probability: None,
        family_inflation_risk: None,
    }
}

/// `n` outcomes cycling through `returns`; a positive return is a win.
fn outcomes(experiment_id: &str, returns: &[f64], n: usize) -> Vec<Outcome> {
    (0..n)
        .map(|i| {
            let r = returns[i % returns.len()];
            Outcome {
                experiment_id: experiment_id.into(),
                won: r > 0.0,
                return_pct: r,
                opened_at: t0() + Duration::hours(6 * i as i64),
                closed_at: Some(t0() + Duration::hours(6 * i as i64 + 4)),
            }
        })
        .collect()
}

/// Win rate 0.8, deflated Sharpe near 3.5, zero PBO, family risk ~0.14.
const STRONG: [f64; 5] = [2.0, 1.5, -1.0, 2.5, 1.0];
/// Win rate 0.4.
const WEAK: [f64; 5] = [3.0, -0.5, 3.0, -0.5, -0.5];

fn seed(ledger: &mut Ledger, h: &Hypothesis, experiment_id: &str, outs: &[Outcome]) {
    let exp = Experiment {
        id: experiment_id.into(),
        hypothesis_id: h.id.clone(),
        status: ExperimentStatus::Running,
        started_at: t0(),
    };
    ledger
        .unit_of_work(|uow| {
            uow.upsert_hypothesis(h)?;
            uow.insert_experiment(&exp)?;
            for o in outs {
                uow.insert_outcome(o)?;
            }
            Ok(())
        })
        .unwrap();
}

fn gate() -> OverfittingPromotionGate {
    OverfittingPromotionGate::new(GateConfig::default())
}

#[test]
fn pass_creates_fail_closed_shadow_eligibility() {
    let mut ledger = Ledger::open_in_memory().unwrap();
    let h = hypothesis("hyp-1");
    seed(&mut ledger, &h, "exp-1", &outcomes("exp-1", &STRONG, 40));

    let run = run_gate(&mut ledger, &gate(), GateTarget::AllReady, RunOptions::new(now())).unwrap();
    assert_eq!(run.report.passed, 1);
    assert!(run.report.all_passed());
    let eval = &run.evaluations[0];
    assert_eq!(eval.verdict, GateVerdict::Pass);
    assert!(eval.metrics.deflated_sharpe >= 1.0);
    assert_eq!(eval.metrics.pbo, 0.0);
    assert!((eval.metrics.family_risk - (1.0 - 0.95f64.powi(3))).abs() < 1e-12);

    let elig = ledger.eligibility("hyp-1").unwrap().unwrap();
    assert_eq!(elig.experiment_id, "exp-1");
    assert_eq!(elig.granted_by, GATE_NAME);
    assert!(!elig.is_eligible);
    assert_eq!(elig.execution_mode, ExecutionMode::Shadow);
    assert!(elig.live_capital_blocked);
    assert!(elig.leverage_blocked);

    let audit = ledger.promotion_audit("hyp-1", GATE_NAME).unwrap().unwrap();
    assert_eq!(audit.verdict, GateVerdict::Pass);
    assert!(!audit.falsified);
    assert_eq!(audit.failure_reason, None);
    assert_eq!(audit.win_rate, Some(0.8));

    let stored = ledger.hypothesis("hyp-1").unwrap().unwrap();
    assert_eq!(stored.tier1_result.as_deref(), Some("PASS"));
    assert_eq!(stored.deflated_sharpe_estimate, Some(eval.metrics.deflated_sharpe));
    assert_eq!(stored.pbo_probability, Some(0.0));
    assert_eq!(
        ledger.experiment("exp-1").unwrap().unwrap().status,
        ExperimentStatus::Evaluated
    );
}

#[test]
fn triggered_rule_falsifies_without_eligibility() {
    let mut ledger = Ledger::open_in_memory().unwrap();
    let h = hypothesis("hyp-1");
    seed(&mut ledger, &h, "exp-1", &outcomes("exp-1", &WEAK, 40));

    let run = run_gate(&mut ledger, &gate(), GateTarget::AllReady, RunOptions::new(now())).unwrap();
    assert_eq!(run.report.failed, 1);
    let eval = &run.evaluations[0];
    assert!(eval.falsified);
    assert_eq!(eval.verdict, GateVerdict::Falsified);
    assert!((eval.metrics.win_rate - 0.40).abs() < 1e-12);

    let audit = ledger.promotion_audit("hyp-1", GATE_NAME).unwrap().unwrap();
    assert!(audit.falsified);
    let reason = audit.failure_reason.unwrap();
    assert!(reason.contains("falsified: win_rate < 0.45 (observed 0.4000)"), "{reason}");
    assert_eq!(run.report.failures[0].reason, reason);
    assert!(ledger.eligibility("hyp-1").unwrap().is_none());
}

#[test]
fn every_violated_threshold_is_listed() {
    let mut ledger = Ledger::open_in_memory().unwrap();
    let mut h = hypothesis("hyp-1");
    h.parameter_count = 10;
    h.falsification = FalsificationCriteria::none();
    // alternating fold win rates break PBO too
    let mut outs = outcomes("exp-1", &[1.0], 16);
    outs.extend(outcomes("exp-1", &[-1.0], 16).into_iter().map(|mut o| {
        o.opened_at += Duration::days(30);
        o.closed_at = None;
        o
    }));
    seed(&mut ledger, &h, "exp-1", &outs);

    let run = run_gate(&mut ledger, &gate(), GateTarget::AllReady, RunOptions::new(now())).unwrap();
    let eval = &run.evaluations[0];
    assert_eq!(eval.verdict, GateVerdict::Fail);
    let reason = eval.failure_reason().unwrap();
    assert!(reason.contains("pbo"), "{reason}");
    assert!(reason.contains("family_risk 0.5000 > 0.3000"), "{reason}");
    assert!(ledger.eligibility("hyp-1").unwrap().is_none());
}

#[test]
fn rerun_with_unchanged_outcomes_leaves_an_identical_audit_row() {
    let mut ledger = Ledger::open_in_memory().unwrap();
    let h = hypothesis("hyp-1");
    seed(&mut ledger, &h, "exp-1", &outcomes("exp-1", &STRONG, 40));

    run_gate(&mut ledger, &gate(), GateTarget::AllReady, RunOptions::new(now())).unwrap();
    let first = ledger.promotion_audit("hyp-1", GATE_NAME).unwrap().unwrap();
    let first_elig = ledger.eligibility("hyp-1").unwrap().unwrap();

    let later = RunOptions::new(now() + Duration::days(2));
    run_gate(&mut ledger, &gate(), GateTarget::Force("exp-1"), later).unwrap();
    let second = ledger.promotion_audit("hyp-1", GATE_NAME).unwrap().unwrap();

    assert_eq!(first, second);
    assert_eq!(ledger.promotion_audit_count().unwrap(), 1);
    assert_eq!(ledger.eligibility("hyp-1").unwrap().unwrap(), first_elig);
}

#[test]
fn default_run_skips_experiments_below_min_sample_size() {
    let mut ledger = Ledger::open_in_memory().unwrap();
    let h = hypothesis("hyp-1");
    seed(&mut ledger, &h, "exp-1", &outcomes("exp-1", &STRONG, 29));

    let run = run_gate(&mut ledger, &gate(), GateTarget::AllReady, RunOptions::new(now())).unwrap();
    assert_eq!(run.report.total(), 0);
    assert!(run.evaluations.is_empty());
    assert_eq!(ledger.promotion_audit_count().unwrap(), 0);
    assert_eq!(
        ledger.experiment("exp-1").unwrap().unwrap().status,
        ExperimentStatus::Running
    );

    // --force bypasses the precondition
    let run = run_gate(&mut ledger, &gate(), GateTarget::Force("exp-1"), RunOptions::new(now())).unwrap();
    assert_eq!(run.evaluations.len(), 1);
    assert_eq!(ledger.promotion_audit_count().unwrap(), 1);
}

#[test]
fn forcing_an_unknown_experiment_is_an_error() {
    let mut ledger = Ledger::open_in_memory().unwrap();
    assert!(run_gate(&mut ledger, &gate(), GateTarget::Force("nope"), RunOptions::new(now())).is_err());
}

#[test]
fn check_mode_evaluates_but_writes_nothing() {
    let mut ledger = Ledger::open_in_memory().unwrap();
    let h = hypothesis("hyp-1");
    seed(&mut ledger, &h, "exp-1", &outcomes("exp-1", &STRONG, 40));

    let run = run_gate(
        &mut ledger,
        &gate(),
        GateTarget::AllReady,
        RunOptions::new(now()).dry_run(true),
    )
    .unwrap();
    assert_eq!(run.evaluations[0].verdict, GateVerdict::Pass);
    assert_eq!(ledger.promotion_audit_count().unwrap(), 0);
    assert_eq!(ledger.eligibility_count().unwrap(), 0);
    assert_eq!(ledger.hypothesis("hyp-1").unwrap().unwrap().tier1_result, None);
    assert_eq!(
        ledger.experiment("exp-1").unwrap().unwrap().status,
        ExperimentStatus::Running
    );
    assert_eq!(ledger.heartbeat_count("promotion_gate").unwrap(), 0);
}

#[test]
fn later_pass_refreshes_experiment_but_keeps_eligibility_origin() {
    let mut ledger = Ledger::open_in_memory().unwrap();
    let h = hypothesis("hyp-1");
    seed(&mut ledger, &h, "exp-1", &outcomes("exp-1", &STRONG, 40));
    run_gate(&mut ledger, &gate(), GateTarget::AllReady, RunOptions::new(now())).unwrap();

    seed(&mut ledger, &h, "exp-2", &outcomes("exp-2", &STRONG, 40));
    let run = run_gate(
        &mut ledger,
        &gate(),
        GateTarget::AllReady,
        RunOptions::new(now() + Duration::days(7)),
    )
    .unwrap();
    assert_eq!(run.evaluations.len(), 1);
    assert_eq!(run.evaluations[0].experiment_id, "exp-2");

    let elig = ledger.eligibility("hyp-1").unwrap().unwrap();
    assert_eq!(elig.experiment_id, "exp-2");
    assert_eq!(elig.created_at, now());
    assert_eq!(ledger.eligibility_count().unwrap(), 1);
}

#[test]
fn forced_exploration_audits_top_birth_scores_without_eligibility() {
    let mut ledger = Ledger::open_in_memory().unwrap();
    ledger
        .unit_of_work(|uow| {
            for i in 0..20 {
                let mut h = hypothesis(&format!("hyp-{i:02}"));
                h.birth_score = Some(i as f64 * 0.05);
                uow.upsert_hypothesis(&h)?;
            }
            Ok(())
        })
        .unwrap();

    let run = run_exploration(&mut ledger, &GateConfig::default(), RunOptions::new(now())).unwrap();
    assert_eq!(run.selected, vec!["hyp-19".to_string()]);
    assert!((run.cutoff.unwrap() - 0.9025).abs() < 1e-9);

    let row = ledger.promotion_audit("hyp-19", EXPLORATION_GATE_NAME).unwrap().unwrap();
    assert_eq!(row.verdict, GateVerdict::ExplorationPass);
    assert_eq!(row.experiment_id, None);
    assert_eq!(row.deflated_sharpe, None);
    assert!(row.metrics.unwrap().contains("cutoff"));
    assert_eq!(ledger.eligibility_count().unwrap(), 0);

    // already audited: nothing left to explore
    let again = run_exploration(&mut ledger, &GateConfig::default(), RunOptions::new(now())).unwrap();
    assert!(again.selected.is_empty());
    assert_eq!(ledger.promotion_audit_count().unwrap(), 1);
}

#[test]
fn exploration_skips_hypotheses_the_gate_already_audited() {
    let mut ledger = Ledger::open_in_memory().unwrap();
    let mut top = hypothesis("hyp-top");
    top.birth_score = Some(0.99);
    seed(&mut ledger, &top, "exp-1", &outcomes("exp-1", &WEAK, 40));
    let mut low = hypothesis("hyp-low");
    low.birth_score = Some(0.10);
    ledger.unit_of_work(|uow| uow.upsert_hypothesis(&low)).unwrap();

    run_gate(&mut ledger, &gate(), GateTarget::AllReady, RunOptions::new(now())).unwrap();
    let run = run_exploration(&mut ledger, &GateConfig::default(), RunOptions::new(now())).unwrap();
    assert!(run.selected.is_empty());
    assert!(ledger
        .promotion_audit("hyp-top", EXPLORATION_GATE_NAME)
        .unwrap()
        .is_none());
}
