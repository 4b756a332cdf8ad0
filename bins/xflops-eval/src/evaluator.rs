/// Run Evaluator - Suite-Agnostic Scoring Logic
///
/// **Core Responsibility:**
/// Turn raw run outputs into measurements, and measurements into score records.
///
/// **Critical Properties:**
/// - Knows nothing about process spawning or CPU placement
/// - Pure functions: (raw output, case) → outcome → ScoreRecord
///
/// **Classification Order:**
/// 1. Timeout
/// 2. Runtime error (non-zero exit)
/// 3. Missing performance figure or answer
/// 4. Exact-answer mismatch
use lazy_static::lazy_static;
use regex::Regex;
use xflops_common::gate;
use xflops_common::{
    AggregateReport, CaseSpec, CorrectnessCheck, FailureKind, Measurement, RunOutcome,
    ScoreRecord,
};

use crate::config::OutputFormat;
use crate::engine::RawRunOutput;

lazy_static! {
    static ref TIME_MILLIS: Regex = Regex::new(r"^\s*Time:\s*([0-9.eE+\-]+)\s*ms\s*$").unwrap();
    static ref SOLVE_TIME: Regex = Regex::new(r"^solve Time\s*([0-9.eE\-]+)$").unwrap();
    static ref COMPLETED_TIER: Regex = Regex::new(r"Succesfully completed tier: (\d+)").unwrap();
    static ref SIMULATION_ENDS: Regex =
        Regex::new(r"total simulation ends in\s*([0-9.eE+\-]+)\s*sec").unwrap();
}

/// Extract the measurement a program reports on stdout.
pub fn parse_output(format: OutputFormat, stdout: &str) -> Option<Measurement> {
    match format {
        OutputFormat::TimeMillis => {
            let line = stdout.lines().rev().find(|l| !l.trim().is_empty())?;
            let caps = TIME_MILLIS.captures(line)?;
            caps[1].parse().ok().map(Measurement::new)
        }
        OutputFormat::SolveTime => {
            let mut lines = stdout.lines();
            let caps = SOLVE_TIME.captures(lines.next()?.trim_end())?;
            let time: f64 = caps[1].parse().ok()?;
            let answer: i64 = lines.next()?.trim().parse().ok()?;
            Some(Measurement::new(time).with_answer(answer))
        }
        OutputFormat::CompletedTier => {
            let caps = COMPLETED_TIER.captures_iter(stdout).last()?;
            caps[1].parse::<u32>().ok().map(|t| Measurement::new(t as f64))
        }
        OutputFormat::SimulationEnds => {
            let caps = SIMULATION_ENDS.captures(stdout)?;
            caps[1].parse().ok().map(Measurement::new)
        }
    }
}

/// Classify one run of a case.
pub fn classify_run(raw: &RawRunOutput, format: OutputFormat, check: &CorrectnessCheck) -> RunOutcome {
    if raw.timed_out {
        return Err(FailureKind::TimeLimitExceeded);
    }
    if raw.runtime_error() {
        return Err(FailureKind::RuntimeError);
    }
    let measurement = parse_output(format, &raw.stdout).ok_or(FailureKind::MissingAnswer)?;

    if let CorrectnessCheck::ExactAnswer { expected } = check {
        if !gate::exact_answer(*expected, measurement.answer) {
            return Err(FailureKind::WrongAnswer);
        }
    }
    Ok(measurement)
}

/// Apply the averaged-time limit, if the case has one.
pub fn enforce_time_limit(case: &CaseSpec, measurement: Measurement) -> RunOutcome {
    match case.time_limit_secs {
        Some(limit) if measurement.performance > limit => Err(FailureKind::TimeLimitExceeded),
        _ => Ok(measurement),
    }
}

/// Score a case from its final outcome. Failed cases never reach the curve.
pub fn score_case(case: &CaseSpec, outcome: &RunOutcome) -> ScoreRecord {
    match outcome {
        Ok(m) => ScoreRecord::accepted(m.performance, case.curve.score(m.performance, case.full_score)),
        Err(kind) => ScoreRecord::failed(*kind),
    }
}

/// Per-case score lines and the total. Zero-weight cases are not listed.
pub fn summary_lines(title: &str, report: &AggregateReport) -> Vec<String> {
    let mut lines: Vec<String> = report
        .entries
        .iter()
        .filter(|entry| entry.weight != 0.0)
        .map(|entry| {
            if entry.record.is_zero() {
                format!(
                    "{} : {:.2} / {:.2}\t({})",
                    entry.id, 0.0, entry.full_score, entry.record.info
                )
            } else {
                format!(
                    "{} : {:.2} / {:.2}\tperformance: {}",
                    entry.id, entry.record.score, entry.full_score, entry.record.performance
                )
            }
        })
        .collect();
    lines.push(format!("{} : {:.2} / {:.2}", title, report.total(), report.max_total()));
    lines
}

pub fn print_summary(title: &str, report: &AggregateReport) {
    println!("------score--------");
    for line in summary_lines(title, report) {
        println!("{}", line);
    }
}
