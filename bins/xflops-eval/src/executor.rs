/// Suite Executor - High-Level Orchestration
///
/// **Responsibility:**
/// Coordinate execution engine and evaluator to produce a suite report.
///
/// **Architecture:**
/// 1. Use LocalEngine to build and run the submission (engine.rs)
/// 2. Use the evaluator to classify and score each case (evaluator.rs)
/// 3. Return the aggregated report
///
/// This module is the glue layer - it knows nothing about:
/// - How processes are spawned or pinned (engine's job)
/// - How outputs are parsed or scored (evaluator's job)
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};
use xflops_common::gate::{self, TOLERANCE_EPSILON};
use xflops_common::{
    AggregateReport, CaseSpec, CorrectnessCheck, EvalError, FailureKind, Measurement, RunOutcome,
};

use crate::config::{EvalConfig, SuiteConfig, SuiteConfigManager};
use crate::engine::LocalEngine;
use crate::evaluator;
use crate::preconditions;

/// Outcome of one scored suite.
pub struct SuiteRun {
    pub report: AggregateReport,
    pub compile_failed: bool,
}

/// Preconditions, build, measure, score. A compile error is recorded, not raised.
pub async fn evaluate_suite(
    manager: &SuiteConfigManager,
    cfg: &EvalConfig,
    name: &str,
) -> Result<SuiteRun> {
    let suite = manager.get_config(name)?;
    let cores = preconditions::verify(&suite.preconditions)?;

    match run_suite(suite, cfg, cores).await {
        Ok(report) => Ok(SuiteRun {
            report,
            compile_failed: false,
        }),
        Err(e) => match e.downcast_ref::<EvalError>() {
            Some(EvalError::CompileError(preview)) => {
                warn!(suite = name, error = %preview, "Compilation failed");
                println!("Compilation failed");
                Ok(SuiteRun {
                    report: AggregateReport::all_failed(
                        &suite.cases,
                        suite.scale,
                        FailureKind::CompileError,
                    ),
                    compile_failed: true,
                })
            }
            _ => Err(e),
        },
    }
}

/// Build the suite and evaluate every case.
///
/// A compile error is returned as `EvalError::CompileError` so the caller can
/// record it and stop. A failed self-test is not a compile error: every case
/// is recorded as `Wrong Answer` instead.
pub async fn run_suite(
    suite: &SuiteConfig,
    cfg: &EvalConfig,
    cores: Vec<usize>,
) -> Result<AggregateReport> {
    suite.validate()?;
    println!("→ Evaluating {}", suite.name);
    info!(
        suite = %suite.name,
        cases = suite.cases.len(),
        tries = cfg.repetitions(suite),
        warmup = cfg.warmup_for(suite),
        "Starting suite"
    );

    let engine = LocalEngine::new(suite.source_path(&cfg.root), suite.launcher.clone(), cores);

    println!("  Compiling...");
    let build = engine.compile(&suite.build).await?;

    if let Some(marker) = &suite.build.pass_marker {
        if !gate::self_test_passed(&build.stdout, marker) {
            warn!(suite = %suite.name, marker = %marker, "Self-test did not pass");
            println!("  Self-test failed, all cases are marked wrong");
            return Ok(AggregateReport::all_failed(
                &suite.cases,
                suite.scale,
                FailureKind::WrongAnswer,
            ));
        }
    } else if !build.success {
        println!("{}", build.stderr);
        return Err(EvalError::CompileError(build.error_preview().to_string()).into());
    }

    let mut report = AggregateReport::new(suite.scale);
    for case in &suite.cases {
        println!("  Running case {}", case.id);
        let outcome = measure_case(&engine, suite, cfg, case).await;
        match &outcome {
            Ok(m) => info!(case = %case.id, performance = m.performance, "Case measured"),
            Err(kind) => warn!(case = %case.id, failure = %kind, "Case failed"),
        }
        report.push(case, evaluator::score_case(case, &outcome));
    }

    info!(
        suite = %suite.name,
        score = report.total(),
        max_score = report.max_total(),
        "Suite completed"
    );
    Ok(report)
}

/// Warm-up, repetitions, averaging, then the post-run gates.
async fn measure_case(
    engine: &LocalEngine,
    suite: &SuiteConfig,
    cfg: &EvalConfig,
    case: &CaseSpec,
) -> RunOutcome {
    let timeout = Duration::from_secs_f64(case.timeout_secs);

    if cfg.warmup_for(suite) {
        run_and_classify(engine, suite, case, 1, timeout).await?;
    }

    let mut samples = Vec::new();
    for run in 1..=cfg.repetitions(suite) {
        samples.push(run_and_classify(engine, suite, case, run, timeout).await?);
    }

    let measurement = Measurement::average(&samples).ok_or(FailureKind::MissingAnswer)?;
    let measurement = evaluator::enforce_time_limit(case, measurement)?;

    if let CorrectnessCheck::ToleranceFile { output, reference } = &case.check {
        let output = engine.workdir().join(output);
        let reference = engine.workdir().join(reference);
        match gate::tolerance_match_files(&output, &reference, TOLERANCE_EPSILON) {
            Ok(true) => {}
            Ok(false) => return Err(FailureKind::WrongAnswer),
            Err(e) => {
                warn!(case = %case.id, error = %e, "Tolerance check failed");
                return Err(e.failure_kind().unwrap_or(FailureKind::WrongAnswer));
            }
        }
    }
    Ok(measurement)
}

async fn run_and_classify(
    engine: &LocalEngine,
    suite: &SuiteConfig,
    case: &CaseSpec,
    run: u32,
    timeout: Duration,
) -> RunOutcome {
    let args = case.args_for_run(run);
    match engine.run_once(&suite.program, &args, timeout).await {
        Ok(raw) => evaluator::classify_run(&raw, suite.output, &case.check),
        Err(e) => {
            warn!(case = %case.id, run, error = %e, "Failed to run program");
            Err(FailureKind::RuntimeError)
        }
    }
}
