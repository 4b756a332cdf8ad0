// N-body question selection: OpenMP timing (question 1) and MPI answers (question 2)
use anyhow::Result;
use tracing::info;
use xflops_common::AggregateReport;

use crate::config::{EvalConfig, SuiteConfigManager};
use crate::evaluator;
use crate::executor::{self, SuiteRun};
use crate::mpi;

pub const SUITE: &str = "nbody";

/// Evaluate the selected questions, print their scores and write `result.yaml`.
///
/// `question` 0 runs both, 1 only OpenMP, 2 only MPI. A compile error in
/// question 1 is recorded and question 2 is still graded.
pub async fn run(
    manager: &SuiteConfigManager,
    cfg: &EvalConfig,
    question: u8,
) -> Result<SuiteRun> {
    let mut report = AggregateReport::default();
    let mut lines = Vec::new();
    let mut compile_failed = false;

    if question != 2 {
        let banner = "=".repeat(20);
        println!("{}begin to evaluate question 1{}", banner, banner);
        let omp = executor::evaluate_suite(manager, cfg, SUITE).await?;
        evaluator::print_summary("question 1", &omp.report);
        println!("{}finish to evaluate question 1{}", banner, banner);

        lines.push(format!(
            "question 1 score : {:.2}/{:.0}",
            omp.report.total(),
            omp.report.max_total()
        ));
        compile_failed = omp.compile_failed;
        report.merge(omp.report);
    }
    if question != 1 {
        let mpi_report = mpi::evaluate(&cfg.root)?;
        lines.push(format!(
            "question 2 score : {:.2}/{:.0}",
            mpi_report.total(),
            mpi_report.max_total()
        ));
        report.merge(mpi_report);
    }

    for line in &lines {
        println!("{}", line);
    }
    if question == 0 {
        println!("total score : {:.2}/{:.0}", report.total(), report.max_total());
    }

    report.write_yaml(&cfg.result_path())?;
    info!(path = %cfg.result_path().display(), score = report.total(), "Result written");
    Ok(SuiteRun {
        report,
        compile_failed,
    })
}
