//! Domain types: signals, hypotheses, experiments, outcomes, eligibility.

pub mod eligibility;
pub mod experiment;
pub mod hypothesis;
pub mod signal;

pub use eligibility::{EligibilityRecord, ExecutionMode};
pub use experiment::{Experiment, ExperimentStatus, Outcome};
pub use hypothesis::{Comparator, FalsificationCriteria, FalsificationRule, Hypothesis, RuleParseError};
pub use signal::{FactorFlags, Lifecycle, Signal, Tier};
