pub mod curve;
pub mod error;
pub mod gate;
pub mod normalize;
pub mod report;
pub mod types;

pub use curve::ScoringCurve;
pub use error::EvalError;
pub use report::{AggregateReport, ScoreRecord};
pub use types::{CaseSpec, CorrectnessCheck, FailureKind, Measurement, RunOutcome};
