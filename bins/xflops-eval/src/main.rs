mod config;
mod engine;
mod evaluator;
mod executor;
mod hpl;
mod mpi;
mod nbody;
mod preconditions;
mod suites;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::{EvalConfig, SuiteConfigManager};
use tracing::{error, info};
use xflops_common::EvalError;

#[derive(Parser)]
#[command(name = "xflops-eval")]
#[command(about = "xflops evaluator - build, run and score HPC assignments", long_about = None)]
struct Cli {
    /// Number of times to run each case
    #[arg(short = 't', long, global = true, default_value = "5")]
    tries: u32,

    /// Do not run warmup cases
    #[arg(long, global = true, default_value = "false")]
    no_warmup: bool,

    /// Assignment directory (result.yaml is written here)
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// JSON file replacing the built-in suite definitions
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bit-vector rotation (everybit)
    Bithack,
    /// Gradient descent kernels
    Gd,
    /// Clustering with exact answers
    Cluster,
    /// N-body simulation: OpenMP timing and MPI communication answers
    Nbody {
        /// Question to evaluate: 0 both, 1 OpenMP, 2 MPI
        #[arg(short = 'c', default_value = "0", value_parser = clap::value_parser!(u8).range(0..=2))]
        question: u8,
    },
    /// Build HPL and submit the benchmark job
    Hpl,
    /// List configured suites
    List {
        /// Print the full suite definitions as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_line_number(true)
        .init();

    let cli = Cli::parse();

    let manager = match &cli.config {
        Some(path) => SuiteConfigManager::load(path).map_err(|e| {
            error!("Failed to load suite configurations: {:#}", e);
            e
        })?,
        None => SuiteConfigManager::builtin(),
    };

    if let Commands::List { json } = cli.command {
        if json {
            println!("{}", manager.to_json()?);
        } else {
            for name in manager.list_suites() {
                let suite = manager.get_config(&name)?;
                println!("{:<10} {} cases, max {:.2}", name, suite.cases.len(), suite.max_total());
            }
        }
        return Ok(());
    }

    let cfg = EvalConfig::new(cli.root.clone(), cli.tries, !cli.no_warmup)?;
    info!(root = %cfg.root.display(), tries = cfg.tries, warmup = cfg.warmup, "xflops evaluator starting");

    let result = match cli.command {
        Commands::Bithack => run_single(&manager, &cfg, "bithack").await,
        Commands::Gd => run_single(&manager, &cfg, "gd").await,
        Commands::Cluster => run_single(&manager, &cfg, "cluster").await,
        Commands::Nbody { question } => match nbody::run(&manager, &cfg, question).await {
            Ok(run) if run.compile_failed && question == 1 => std::process::exit(1),
            other => other.map(|_| ()),
        },
        Commands::Hpl => hpl::build_and_submit(&cfg.root).await,
        Commands::List { .. } => Ok(()),
    };

    if let Err(e) = result {
        match e.downcast_ref::<EvalError>() {
            Some(fatal) if fatal.is_fatal() => {
                error!(error = %fatal, "Evaluation aborted");
                println!("{}", fatal);
                std::process::exit(1);
            }
            _ => return Err(e),
        }
    }
    Ok(())
}

async fn run_single(manager: &SuiteConfigManager, cfg: &EvalConfig, name: &str) -> Result<()> {
    let run = executor::evaluate_suite(manager, cfg, name).await?;
    evaluator::print_summary("total score", &run.report);
    run.report.write_yaml(&cfg.result_path())?;
    info!(path = %cfg.result_path().display(), score = run.report.total(), "Result written");

    if run.compile_failed {
        std::process::exit(1);
    }
    Ok(())
}
