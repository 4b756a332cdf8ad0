//! Correctness gates run before a performance number is trusted.

use std::fs;
use std::path::Path;

use tracing::warn;

use crate::error::EvalError;

/// Mean absolute error bound for tolerance comparisons (exclusive).
pub const TOLERANCE_EPSILON: f64 = 1e-6;

/// Outcome of a pairwise numeric comparison of two outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct ToleranceReport {
    /// Line pairs visited; the shorter input bounds this.
    pub compared: usize,
    /// Pairs that were not textually identical.
    pub differing: usize,
    pub mean_abs_error: f64,
    pub length_mismatch: bool,
    /// A differing line could not be read as a float.
    pub unparseable: bool,
}

impl ToleranceReport {
    pub fn passed(&self, epsilon: f64) -> bool {
        if self.unparseable {
            return false;
        }
        self.differing == 0 || self.mean_abs_error < epsilon
    }
}

/// Compare newline-separated floats pair by pair.
///
/// Textually identical lines count as equal and are left out of the mean.
/// Comparison stops at the shorter input.
pub fn compare_tolerance(output: &str, reference: &str) -> ToleranceReport {
    let out_lines: Vec<&str> = output.split_inclusive('\n').collect();
    let ref_lines: Vec<&str> = reference.split_inclusive('\n').collect();

    let mut total = 0.0;
    let mut differing = 0usize;
    let mut unparseable = false;

    for (a, b) in out_lines.iter().zip(ref_lines.iter()) {
        if a == b {
            continue;
        }
        differing += 1;
        match (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
            (Ok(x), Ok(y)) => total += (x - y).abs(),
            _ => {
                unparseable = true;
                break;
            }
        }
    }

    ToleranceReport {
        compared: out_lines.len().min(ref_lines.len()),
        differing,
        mean_abs_error: if differing == 0 {
            0.0
        } else {
            total / differing as f64
        },
        length_mismatch: out_lines.len() != ref_lines.len(),
        unparseable,
    }
}

/// Tolerance gate over two files. A missing file is an error, not a mismatch.
pub fn tolerance_match_files(
    output: &Path,
    reference: &Path,
    epsilon: f64,
) -> Result<bool, EvalError> {
    let read = |p: &Path| {
        fs::read_to_string(p).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => EvalError::MissingFile(p.to_path_buf()),
            _ => EvalError::Io(e),
        })
    };
    let report = compare_tolerance(&read(output)?, &read(reference)?);
    if report.length_mismatch {
        warn!(
            output = %output.display(),
            reference = %reference.display(),
            compared = report.compared,
            "Output and reference differ in length; compared common prefix only"
        );
    }
    Ok(report.passed(epsilon))
}

pub fn exact_answer(expected: i64, actual: Option<i64>) -> bool {
    actual == Some(expected)
}

/// Whether the last non-empty line of a self-test log contains `marker`.
pub fn self_test_passed(stdout: &str, marker: &str) -> bool {
    stdout
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .map(|l| l.contains(marker))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_identical_outputs_pass() {
        let text = "1.0\n2.5\n-3.25\n";
        let report = compare_tolerance(text, text);
        assert_eq!(report.differing, 0);
        assert!(report.passed(TOLERANCE_EPSILON));
    }

    #[test]
    fn test_small_difference_passes() {
        let report = compare_tolerance("1.0000001\n2.0\n", "1.0\n2.0\n");
        assert_eq!(report.differing, 1);
        assert!(report.passed(TOLERANCE_EPSILON));
    }

    #[test]
    fn test_mean_only_over_differing_lines() {
        // one differing line with error 1e-5, many identical lines
        let mut out = String::new();
        let mut reference = String::new();
        for _ in 0..100 {
            out.push_str("0.5\n");
            reference.push_str("0.5\n");
        }
        out.push_str("1.00001\n");
        reference.push_str("1.0\n");
        let report = compare_tolerance(&out, &reference);
        assert_eq!(report.differing, 1);
        assert!(!report.passed(TOLERANCE_EPSILON));
    }

    #[test]
    fn test_epsilon_is_exclusive() {
        let report = ToleranceReport {
            compared: 1,
            differing: 1,
            mean_abs_error: TOLERANCE_EPSILON,
            length_mismatch: false,
            unparseable: false,
        };
        assert!(!report.passed(TOLERANCE_EPSILON));

        let report = compare_tolerance("0.25\n", "0.5\n");
        assert!(report.passed(0.25 + 1e-12));
        assert!(!report.passed(0.25));
    }

    #[test]
    fn test_equal_value_different_text_counts_as_differing() {
        let report = compare_tolerance("1.0\n2.0", "1.0\n2.0\n");
        assert_eq!(report.differing, 1);
        assert_eq!(report.mean_abs_error, 0.0);
        assert!(report.passed(TOLERANCE_EPSILON));
    }

    #[test]
    fn test_length_mismatch_truncates() {
        let report = compare_tolerance("1.0\n2.0\n", "1.0\n2.0\n3.0\n");
        assert!(report.length_mismatch);
        assert_eq!(report.compared, 2);
        assert!(report.passed(TOLERANCE_EPSILON));
    }

    #[test]
    fn test_unparseable_line_fails() {
        let report = compare_tolerance("nan?\n", "1.0\n");
        assert!(report.unparseable);
        assert!(!report.passed(TOLERANCE_EPSILON));
    }

    #[test]
    fn test_files_missing_output_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let reference = dir.path().join("ref1.data");
        std::fs::write(&reference, "1.0\n").unwrap();
        let err = tolerance_match_files(&dir.path().join("out1.data"), &reference, TOLERANCE_EPSILON)
            .unwrap_err();
        assert!(matches!(err, EvalError::MissingFile(_)));
    }

    #[test]
    fn test_files_compare() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out2.data");
        let reference = dir.path().join("ref2.data");
        let mut f = std::fs::File::create(&out).unwrap();
        writeln!(f, "0.3333333").unwrap();
        std::fs::write(&reference, "0.33333333\n").unwrap();
        assert!(tolerance_match_files(&out, &reference, TOLERANCE_EPSILON).unwrap());
    }

    #[test]
    fn test_exact_answer() {
        assert!(exact_answer(329014, Some(329014)));
        assert!(!exact_answer(329014, Some(329015)));
        assert!(!exact_answer(329014, None));
    }

    #[test]
    fn test_self_test_marker_on_last_line() {
        assert!(self_test_passed("running...\nAll tests PASSED\n\n", "PASSED"));
        assert!(!self_test_passed("PASSED\nFAILED test 7\n", "PASSED"));
        assert!(!self_test_passed("", "PASSED"));
    }
}
