//! SignalGate CLI — batch jobs over the evidence ledger.
//!
//! Commands:
//! - `score` — percentile quality scoring (exit 2 on a regime-diversity hard stop)
//! - `shadow` — non-binding three-phase shadow evaluation of every hypothesis
//! - `gate` — overfitting promotion gate (exit 1 if any evaluated experiment failed)
//! - `explore` — forced-exploration pass for top birth scores
//! - `ingest` — load signals, hypotheses and outcomes into the ledger
//!
//! `--check` on any job evaluates and reports without writing.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use signalgate_core::{EvidenceConfig, OverfittingPromotionGate, PercentileQualityScorer, ShadowGatekeeper};
use signalgate_runner::{
    ingest_hypotheses, ingest_outcomes, ingest_signals, run_exploration, run_gate, run_scoring, run_shadow,
    BatchReport, GateTarget, Ledger, RunOptions, ScoringRun,
};

const EXIT_OK: i32 = 0;
const EXIT_FAILURES: i32 = 1;
const EXIT_HARD_STOP: i32 = 2;

#[derive(Parser)]
#[command(
    name = "signalgate",
    about = "SignalGate CLI — evidence quality scoring and promotion gating"
)]
struct Cli {
    /// Ledger database file.
    #[arg(long, global = true, default_value = "signalgate.db")]
    db: PathBuf,

    /// TOML configuration. Defaults apply for anything omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print the report as JSON instead of text.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rescore dormant signals against the current population.
    Score {
        /// Dry run: evaluate and report, write nothing.
        #[arg(long, default_value_t = false)]
        check: bool,
    },
    /// Shadow-evaluate every hypothesis (never gates anything).
    Shadow {
        /// Current market regime label.
        #[arg(long)]
        regime: Option<String>,

        /// Dry run: evaluate and report, write nothing.
        #[arg(long, default_value_t = false)]
        check: bool,
    },
    /// Run the promotion gate over ready experiments.
    Gate {
        /// Dry run: evaluate and report, write nothing.
        #[arg(long, default_value_t = false)]
        check: bool,

        /// Evaluate this experiment regardless of status or sample size.
        #[arg(long)]
        force: Option<String>,
    },
    /// Forced-exploration pass for top birth scores with no audit history.
    Explore {
        /// Dry run: evaluate and report, write nothing.
        #[arg(long, default_value_t = false)]
        check: bool,
    },
    /// Load external feeds into the ledger.
    Ingest {
        /// Signals CSV.
        #[arg(long)]
        signals: Option<PathBuf>,

        /// Hypotheses, one JSON object per line.
        #[arg(long)]
        hypotheses: Option<PathBuf>,

        /// Outcomes CSV (experiments are created on first sight).
        #[arg(long)]
        outcomes: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let mut ledger = Ledger::open(&cli.db).with_context(|| format!("open ledger {}", cli.db.display()))?;
    let now = Utc::now();
    tracing::debug!(db = %cli.db.display(), "ledger open");

    let code = match cli.command {
        Commands::Score { check } => {
            let scorer = PercentileQualityScorer::new(config.scorer);
            let run = run_scoring(&mut ledger, &scorer, RunOptions::new(now).dry_run(check))
                .context("scoring run")?;
            run_score_output(&run, cli.json)?
        }
        Commands::Shadow { regime, check } => {
            let gatekeeper = ShadowGatekeeper::new(config.shadow);
            let report = run_shadow(
                &mut ledger,
                &gatekeeper,
                regime.as_deref(),
                RunOptions::new(now).dry_run(check),
            )
            .context("shadow run")?;
            emit(&report, &report, cli.json)?;
            report_code(&report)
        }
        Commands::Gate { check, force } => {
            let gate = OverfittingPromotionGate::new(config.gate);
            let target = match force.as_deref() {
                Some(id) => GateTarget::Force(id),
                None => GateTarget::AllReady,
            };
            let run = run_gate(&mut ledger, &gate, target, RunOptions::new(now).dry_run(check))
                .context("promotion gate run")?;
            emit(&run, &run.report, cli.json)?;
            report_code(&run.report)
        }
        Commands::Explore { check } => {
            let run = run_exploration(&mut ledger, &config.gate, RunOptions::new(now).dry_run(check))
                .context("forced exploration run")?;
            emit(&run, &run.report, cli.json)?;
            report_code(&run.report)
        }
        Commands::Ingest {
            signals,
            hypotheses,
            outcomes,
        } => run_ingest(&mut ledger, signals, hypotheses, outcomes, cli.json)?,
    };

    std::process::exit(code);
}

fn load_config(path: Option<&Path>) -> Result<EvidenceConfig> {
    match path {
        Some(p) => EvidenceConfig::from_file(p).with_context(|| format!("load config {}", p.display())),
        None => Ok(EvidenceConfig::default()),
    }
}

fn run_score_output(run: &ScoringRun, json: bool) -> Result<i32> {
    match run {
        ScoringRun::Scored(report) => {
            emit(run, report, json)?;
            Ok(report_code(report))
        }
        ScoringRun::HardStopped(stop) => {
            if json {
                println!("{}", serde_json::to_string_pretty(run)?);
            } else {
                eprintln!(
                    "HARD STOP: non-dominant regime share {:.2}% < {:.2}% (dominant: {}); {} signals left unscored",
                    stop.non_dominant_pct,
                    stop.threshold_pct,
                    stop.dominant_regime.as_deref().unwrap_or("none"),
                    stop.blocked_count
                );
            }
            Ok(EXIT_HARD_STOP)
        }
    }
}

fn run_ingest(
    ledger: &mut Ledger,
    signals: Option<PathBuf>,
    hypotheses: Option<PathBuf>,
    outcomes: Option<PathBuf>,
    json: bool,
) -> Result<i32> {
    if signals.is_none() && hypotheses.is_none() && outcomes.is_none() {
        bail!("ingest needs at least one of --signals, --hypotheses, --outcomes");
    }

    // hypotheses before outcomes, so experiments point at known hypotheses
    let mut reports = Vec::new();
    if let Some(path) = signals {
        reports.push(ingest_signals(ledger, &path).context("ingest signals")?);
    }
    if let Some(path) = hypotheses {
        reports.push(ingest_hypotheses(ledger, &path).context("ingest hypotheses")?);
    }
    if let Some(path) = outcomes {
        reports.push(ingest_outcomes(ledger, &path).context("ingest outcomes")?);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            println!("{report}");
        }
    }
    Ok(if reports.iter().all(BatchReport::all_passed) {
        EXIT_OK
    } else {
        EXIT_FAILURES
    })
}

/// Print `value` as JSON, or the report as text.
fn emit<T: Serialize>(value: &T, report: &BatchReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{report}");
    }
    Ok(())
}

fn report_code(report: &BatchReport) -> i32 {
    if report.all_passed() {
        EXIT_OK
    } else {
        EXIT_FAILURES
    }
}
