//! Performance-to-score curves.
//!
//! Every curve maps a measured performance onto a fraction in `[0, 1]`;
//! a case's score is that fraction times its full score. Inputs outside a
//! curve's domain score zero rather than panicking.

use serde::{Deserialize, Serialize};

use crate::error::EvalError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ScoringCurve {
    /// Linear between `zero` and `full`. Either orientation is allowed:
    /// `zero < full` rewards larger values, `zero > full` rewards smaller ones.
    Linear { zero: f64, full: f64 },
    /// `full_time * (base_time - t) / (t * (base_time - full_time))`.
    InverseTime { full_time: f64, base_time: f64 },
    /// Linear in `ln t` between `full_time` and `baseline`.
    LogInterpolation { full_time: f64, baseline: f64 },
}

impl ScoringCurve {
    /// Fraction of the full score earned at performance `p`.
    pub fn fraction(&self, p: f64) -> f64 {
        if !p.is_finite() {
            return 0.0;
        }
        let raw = match *self {
            ScoringCurve::Linear { zero, full } => {
                if full == zero {
                    return 0.0;
                }
                (p - zero) / (full - zero)
            }
            ScoringCurve::InverseTime {
                full_time,
                base_time,
            } => {
                if p <= 0.0 || base_time <= full_time {
                    return 0.0;
                }
                full_time * (base_time - p) / (p * (base_time - full_time))
            }
            ScoringCurve::LogInterpolation {
                full_time,
                baseline,
            } => {
                if full_time <= 0.0 || baseline <= full_time {
                    return 0.0;
                }
                if p <= full_time {
                    return 1.0;
                }
                if p >= baseline {
                    return 0.0;
                }
                1.0 - (p.ln() - full_time.ln()) / (baseline.ln() - full_time.ln())
            }
        };
        if raw.is_nan() {
            0.0
        } else {
            raw.clamp(0.0, 1.0)
        }
    }

    /// Score in `[0, full_score]`.
    pub fn score(&self, p: f64, full_score: f64) -> f64 {
        full_score * self.fraction(p)
    }

    pub fn validate(&self) -> Result<(), EvalError> {
        match *self {
            ScoringCurve::Linear { zero, full } if zero == full || !(zero - full).is_finite() => {
                Err(EvalError::Config(format!(
                    "linear curve needs distinct finite bounds, got zero={zero} full={full}"
                )))
            }
            ScoringCurve::InverseTime {
                full_time,
                base_time,
            } if full_time <= 0.0 || base_time <= full_time => Err(EvalError::Config(format!(
                "inverse-time curve needs 0 < full_time < base_time, got {full_time} and {base_time}"
            ))),
            ScoringCurve::LogInterpolation {
                full_time,
                baseline,
            } if full_time <= 0.0 || baseline <= full_time => Err(EvalError::Config(format!(
                "log curve needs 0 < full_time < baseline, got {full_time} and {baseline}"
            ))),
            _ => Ok(()),
        }
    }
}
