mod commands;

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use commands::Choice;

#[derive(Parser)]
#[command(name = "xflops-submit")]
#[command(about = "Package xflops assignments into a submission archive", long_about = None)]
struct Cli {
    /// Directory holding submit.yaml and the question directories
    #[arg(short, long, default_value = ".")]
    work_dir: PathBuf,

    /// Question index to submit (-1 for all); prompts when omitted
    #[arg(short, long, allow_hyphen_values = true)]
    choice: Option<i64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let questions = commands::load_manifest(&cli.work_dir)?;

    let index = match cli.choice {
        Some(index) => index,
        None => prompt(&commands::menu(&questions))?,
    };
    let choice = Choice::from_index(index, questions.len())?;

    commands::submit(&cli.work_dir, &questions, choice)?;
    Ok(())
}

fn prompt(menu: &str) -> Result<i64> {
    print!("{}\nchoose index to submit\n>>>", menu);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    input
        .trim()
        .parse()
        .with_context(|| format!("Invalid index: {}", input.trim()))
}
