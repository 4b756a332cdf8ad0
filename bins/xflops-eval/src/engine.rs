/// Execution Engine - Local Process Execution
///
/// **Core Responsibility:**
/// Build the submission and run it with a hard wall-clock limit, capturing raw output.
///
/// **Critical Architectural Boundary:**
/// - Engine knows HOW to execute (working directory, CPU placement, timeouts)
/// - Engine does NOT parse performance figures
/// - Engine does NOT evaluate correctness
/// - Engine returns raw outputs for the Evaluator to judge
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use lazy_static::lazy_static;
use regex::{NoExpand, Regex};
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::config::{BuildStep, Launcher};

lazy_static! {
    static ref CFLAGS_LINE: Regex = Regex::new(r"(?m)^(CFLAGS\s*=\s*)(.*)$").unwrap();
}

/// Raw output of one program invocation
#[derive(Debug, Clone, Default)]
pub struct RawRunOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub execution_time_ms: u64,
    pub timed_out: bool,
}

impl RawRunOutput {
    pub fn runtime_error(&self) -> bool {
        !self.timed_out && self.exit_code != Some(0)
    }
}

#[derive(Debug, Clone)]
pub struct CompilationResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CompilationResult {
    /// First line of the diagnostics, for logs.
    pub fn error_preview(&self) -> &str {
        self.stderr
            .lines()
            .chain(self.stdout.lines())
            .find(|l| !l.trim().is_empty())
            .unwrap_or("")
    }
}

/// Local process engine rooted at a suite's source directory
pub struct LocalEngine {
    workdir: PathBuf,
    launcher: Launcher,
    cores: Vec<usize>,
}

impl LocalEngine {
    pub fn new(workdir: PathBuf, launcher: Launcher, cores: Vec<usize>) -> Self {
        Self {
            workdir,
            launcher,
            cores,
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Run the build command; a non-zero exit is reported, not raised.
    #[instrument(skip(self, build), fields(workdir = %self.workdir.display()))]
    pub async fn compile(&self, build: &BuildStep) -> Result<CompilationResult> {
        let (program, args) = match build.command.split_first() {
            Some(split) => split,
            None => bail!("Empty build command"),
        };

        if build.makeflag_rewrite {
            rewrite_makefile_flags(&self.workdir)?;
        }

        let start = Instant::now();
        let output = Command::new(program)
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .await
            .with_context(|| format!("Failed to spawn build command `{}`", program))?;

        let result = CompilationResult {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        let compilation_time_ms = start.elapsed().as_millis() as u64;

        if result.success {
            info!(compilation_time_ms, "Compilation succeeded");
        } else {
            warn!(
                compilation_time_ms,
                error_preview = result.error_preview(),
                "Compilation failed"
            );
        }
        Ok(result)
    }

    /// Run the program once under the configured launcher.
    ///
    /// **Safety Guarantees:**
    /// - Hard timeout via `tokio::time::timeout`; the child is killed when it fires
    /// - Exit status captured for runtime error classification
    /// - Spawn failures surface as `Err`, not as a runtime error
    #[instrument(skip_all, fields(program = %program, timeout_ms = timeout.as_millis() as u64))]
    pub async fn run_once(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<RawRunOutput> {
        let (command, argv) = self.launcher.command(&self.cores, program, args);
        debug!(command = %command, argv = ?argv, "Spawning run");

        let child = Command::new(&command)
            .args(&argv)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn `{}`", command))?;

        let start = Instant::now();
        let result = tokio::time::timeout(timeout, child.wait_with_output()).await;
        let execution_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(output) => {
                let output = output.context("Failed to collect program output")?;
                let code = output.status.code();
                if code != Some(0) {
                    warn!(exit_code = ?code, execution_time_ms, "Program exited abnormally");
                }
                Ok(RawRunOutput {
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    exit_code: code,
                    execution_time_ms,
                    timed_out: false,
                })
            }
            Err(_) => {
                // the dropped future owned the child; kill_on_drop reaps it
                warn!(execution_time_ms, "Execution timed out - process killed");
                Ok(RawRunOutput {
                    stdout: String::new(),
                    stderr: String::from("[Execution timed out]"),
                    exit_code: None,
                    execution_time_ms,
                    timed_out: true,
                })
            }
        }
    }
}

/// Replace every `CFLAGS = ...` line in `Makefile` with the first line of `Makeflag`.
pub fn rewrite_makefile_flags(dir: &Path) -> Result<()> {
    let flag_path = dir.join("Makeflag");
    let makefile_path = dir.join("Makefile");

    let flags = std::fs::read_to_string(&flag_path)
        .with_context(|| format!("Failed to read {}", flag_path.display()))?;
    let flag_line = flags.split('\n').next().unwrap_or("").trim_end_matches('\r');

    let makefile = std::fs::read_to_string(&makefile_path)
        .with_context(|| format!("Failed to read {}", makefile_path.display()))?;
    let rewritten = CFLAGS_LINE.replace_all(&makefile, NoExpand(flag_line));

    std::fs::write(&makefile_path, rewritten.as_bytes())
        .with_context(|| format!("Failed to write {}", makefile_path.display()))?;
    debug!(flags = flag_line, "Makefile CFLAGS rewritten");
    Ok(())
}
