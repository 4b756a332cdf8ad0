use serde::{Deserialize, Serialize};
use std::fmt;

use crate::curve::ScoringCurve;

/// Placeholder substituted with the 1-based repetition index in case args.
pub const RUN_PLACEHOLDER: &str = "{run}";

/// Performance value recorded for cases whose runs failed.
pub const NOT_APPLICABLE: f64 = -1.0;

/// A single benchmark scenario with its own calibration constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseSpec {
    pub id: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Hard wall-clock limit for one invocation.
    pub timeout_secs: f64,
    /// Limit applied to the averaged measurement, if any.
    #[serde(default)]
    pub time_limit_secs: Option<f64>,
    pub full_score: f64,
    pub weight: f64,
    pub curve: ScoringCurve,
    #[serde(default)]
    pub check: CorrectnessCheck,
}

impl CaseSpec {
    /// Points this case can contribute before the suite scale is applied.
    pub fn max_points(&self) -> f64 {
        self.weight * self.full_score
    }

    /// Arguments for the given repetition, with `{run}` expanded.
    pub fn args_for_run(&self, run: u32) -> Vec<String> {
        let run = run.to_string();
        self.args
            .iter()
            .map(|a| a.replace(RUN_PLACEHOLDER, &run))
            .collect()
    }
}

/// How a run's output is checked before its performance is trusted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CorrectnessCheck {
    /// Exit status only.
    #[default]
    None,
    /// Integer answer printed by the program must equal `expected`.
    ExactAnswer { expected: i64 },
    /// Output file must match the reference file within tolerance.
    ToleranceFile { output: String, reference: String },
}

/// Classification of a case that scored zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    CompileError,
    RuntimeError,
    TimeLimitExceeded,
    WrongAnswer,
    FileNotFound,
    MissingAnswer,
}

impl FailureKind {
    /// Human-readable status written to the `info` field.
    pub fn info(&self) -> &'static str {
        match self {
            FailureKind::CompileError => "Compile Error",
            FailureKind::RuntimeError => "Runtime Error",
            FailureKind::TimeLimitExceeded => "Time Limit Exceeded",
            FailureKind::WrongAnswer => "Wrong Answer",
            FailureKind::FileNotFound => "File not found",
            FailureKind::MissingAnswer => "Missing Answer",
        }
    }

    /// `performance` written for a failed case: 0 when nothing was run at all.
    pub fn recorded_performance(&self) -> f64 {
        match self {
            FailureKind::CompileError | FailureKind::FileNotFound => 0.0,
            _ => NOT_APPLICABLE,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.info())
    }
}

/// Performance extracted from one run, or averaged over several.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub performance: f64,
    pub answer: Option<i64>,
}

impl Measurement {
    pub fn new(performance: f64) -> Self {
        Self {
            performance,
            answer: None,
        }
    }

    pub fn with_answer(mut self, answer: i64) -> Self {
        self.answer = Some(answer);
        self
    }

    /// Arithmetic mean of the samples; `None` when empty.
    pub fn average(samples: &[Measurement]) -> Option<Measurement> {
        if samples.is_empty() {
            return None;
        }
        let total: f64 = samples.iter().map(|m| m.performance).sum();
        Some(Measurement {
            performance: total / samples.len() as f64,
            answer: samples.last().and_then(|m| m.answer),
        })
    }
}

pub type RunOutcome = Result<Measurement, FailureKind>;
