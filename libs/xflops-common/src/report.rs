//! Per-case score records and their weighted aggregate.
//!
//! **Scoring Rules:**
//! - total = scale * Σ weight * score over records with `zero_flag == 0`
//! - max_total = scale * Σ weight * full_score over every case
//! - zero-flagged records contribute exactly 0, whatever their performance

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EvalError;
use crate::types::{CaseSpec, FailureKind};

pub const ACCEPTED: &str = "Accepted";

/// One line of the result file. `score` is derived and never serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub info: String,
    pub performance: f64,
    pub zero_flag: u8,
    #[serde(skip)]
    pub score: f64,
}

impl ScoreRecord {
    pub fn accepted(performance: f64, score: f64) -> Self {
        Self {
            info: ACCEPTED.to_string(),
            performance,
            zero_flag: 0,
            score,
        }
    }

    pub fn failed(kind: FailureKind) -> Self {
        Self {
            info: kind.info().to_string(),
            performance: kind.recorded_performance(),
            zero_flag: 1,
            score: 0.0,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.zero_flag != 0
    }

    /// Score that actually counts toward the total.
    pub fn effective_score(&self) -> f64 {
        if self.is_zero() {
            0.0
        } else {
            self.score
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportEntry {
    pub id: String,
    pub weight: f64,
    pub full_score: f64,
    pub record: ScoreRecord,
}

impl ReportEntry {
    pub fn contribution(&self) -> f64 {
        self.weight * self.record.effective_score()
    }
}

/// Records in evaluation order plus the global scale.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateReport {
    pub scale: f64,
    pub entries: Vec<ReportEntry>,
}

impl Default for AggregateReport {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl AggregateReport {
    pub fn new(scale: f64) -> Self {
        Self {
            scale,
            entries: Vec::new(),
        }
    }

    /// Same failure for every case, e.g. after a compile error.
    pub fn all_failed(cases: &[CaseSpec], scale: f64, kind: FailureKind) -> Self {
        let mut report = Self::new(scale);
        for case in cases {
            report.push(case, ScoreRecord::failed(kind));
        }
        report
    }

    pub fn push(&mut self, case: &CaseSpec, record: ScoreRecord) {
        self.push_points(&case.id, case.weight, case.full_score, record);
    }

    /// Add a record that is not backed by a `CaseSpec`.
    pub fn push_points(&mut self, id: &str, weight: f64, full_score: f64, record: ScoreRecord) {
        debug!(
            case = id,
            info = %record.info,
            performance = record.performance,
            score = record.score,
            "Recorded case"
        );
        self.entries.push(ReportEntry {
            id: id.to_string(),
            weight,
            full_score,
            record,
        });
    }

    /// Append another report's entries, folding its scale into the weights.
    pub fn merge(&mut self, other: AggregateReport) {
        let ratio = if self.scale == 0.0 {
            0.0
        } else {
            other.scale / self.scale
        };
        for mut entry in other.entries {
            entry.weight *= ratio;
            self.entries.push(entry);
        }
    }

    pub fn get(&self, id: &str) -> Option<&ScoreRecord> {
        self.entries.iter().find(|e| e.id == id).map(|e| &e.record)
    }

    pub fn total(&self) -> f64 {
        let sum: f64 = self.entries.iter().map(ReportEntry::contribution).sum();
        self.scale * sum
    }

    pub fn max_total(&self) -> f64 {
        let sum: f64 = self.entries.iter().map(|e| e.weight * e.full_score).sum();
        self.scale * sum
    }

    /// Result-file view: case id to record, keys sorted.
    pub fn records(&self) -> BTreeMap<&str, &ScoreRecord> {
        self.entries
            .iter()
            .map(|e| (e.id.as_str(), &e.record))
            .collect()
    }

    pub fn to_yaml(&self) -> Result<String, EvalError> {
        Ok(serde_yaml::to_string(&self.records())?)
    }

    pub fn write_yaml(&self, path: &Path) -> Result<(), EvalError> {
        fs::write(path, self.to_yaml()?)?;
        debug!(path = %path.display(), entries = self.entries.len(), "Result file written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::ScoringCurve;
    use crate::types::CorrectnessCheck;

    fn make_case(id: &str, full_score: f64, weight: f64) -> CaseSpec {
        CaseSpec {
            id: id.to_string(),
            args: vec![id.to_string()],
            timeout_secs: 10.0,
            time_limit_secs: None,
            full_score,
            weight,
            curve: ScoringCurve::Linear { zero: 0.0, full: 1.0 },
            check: CorrectnessCheck::None,
        }
    }

    #[test]
    fn test_ratio_weights() {
        let mut report = AggregateReport::new(1.0);
        report.push(&make_case("-s", 100.0, 0.2), ScoreRecord::accepted(24.0, 50.0));
        report.push(&make_case("-m", 100.0, 0.3), ScoreRecord::accepted(38.0, 100.0));
        report.push(&make_case("-l", 100.0, 0.5), ScoreRecord::failed(FailureKind::WrongAnswer));

        assert!((report.total() - 40.0).abs() < 1e-9);
        assert!((report.max_total() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_absolute_points() {
        let mut report = AggregateReport::new(1.0);
        report.push(&make_case("random.10.in", 10.0, 1.0), ScoreRecord::accepted(0.5, 10.0));
        report.push(&make_case("random.500000000.in", 35.0, 1.0), ScoreRecord::accepted(20.0, 17.5));
        assert_eq!(report.total(), 27.5);
        assert_eq!(report.max_total(), 45.0);
    }

    #[test]
    fn test_zero_flag_contributes_nothing() {
        let mut report = AggregateReport::new(1.0);
        let mut record = ScoreRecord::failed(FailureKind::TimeLimitExceeded);
        // a stale score must not leak into the total
        record.score = 99.0;
        record.performance = 1.0;
        report.push(&make_case("0", 100.0, 1.0), record);
        assert_eq!(report.total(), 0.0);
        assert_eq!(report.max_total(), 100.0);
    }

    #[test]
    fn test_all_failed() {
        let cases = vec![make_case("a", 15.0, 1.0), make_case("b", 20.0, 1.0)];
        let report = AggregateReport::all_failed(&cases, 1.0, FailureKind::CompileError);
        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.get("b").unwrap().info, "Compile Error");
        // nothing ran, so nothing was measured
        assert_eq!(report.get("b").unwrap().performance, 0.0);
        assert_eq!(report.total(), 0.0);
    }

    #[test]
    fn test_merge_keeps_other_scale() {
        let mut a = AggregateReport::new(1.0);
        a.push_points("omp_1024", 1.0, 15.0, ScoreRecord::accepted(2.0, 15.0));
        let mut b = AggregateReport::new(2.0);
        b.push_points("mpi", 1.0, 20.0, ScoreRecord::accepted(20.0, 20.0));
        a.merge(b);
        assert_eq!(a.total(), 55.0);
        assert_eq!(a.max_total(), 55.0);
    }

    #[test]
    fn test_yaml_layout() {
        let mut report = AggregateReport::new(1.0);
        report.push(&make_case("omp_4096", 20.0, 1.0), ScoreRecord::accepted(12.5, 10.0));
        report.push(&make_case("omp_1024", 15.0, 1.0), ScoreRecord::failed(FailureKind::RuntimeError));
        let yaml = report.to_yaml().unwrap();

        assert!(yaml.find("omp_1024").unwrap() < yaml.find("omp_4096").unwrap());
        assert!(yaml.contains("info: Runtime Error"));
        assert!(yaml.contains("zero_flag: 1"));
        assert!(!yaml.contains("score"));
        assert!(!yaml.contains('&'));
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.yaml");
        let mut report = AggregateReport::new(1.0);
        report.push(&make_case("mpi", 40.0, 1.0), ScoreRecord::accepted(25.0, 25.0));
        report.write_yaml(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let records: BTreeMap<String, ScoreRecord> = serde_yaml::from_str(&text).unwrap();
        assert_eq!(records["mpi"].performance, 25.0);
        assert_eq!(records["mpi"].zero_flag, 0);
        assert_eq!(records["mpi"].info, "Accepted");
    }
}
