/// HPL Build & Submit
///
/// **Flow:**
/// 1. Check the submission files under `source_code/submit`
/// 2. Generate `make.sh` from `make_env.json` and install `Make.xflops`
/// 3. Build (parallel, then one serial retry), logging to `evaluate.log`
/// 4. Stage `HPL.dat` and `hpl.slurm`, hand the job to `sbatch`
///
/// No score is produced; the benchmark result comes from the batch job.
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::Deserialize;
use tokio::process::Command;
use tracing::{info, warn};
use xflops_common::EvalError;

pub const CRITICAL_FILES: [&str; 4] = ["make_env.json", "Make.xflops", "hpl.slurm", "HPL.dat"];
const MAKE_PARALLEL: &str = "make arch=xflops -j";
const MAKE_SERIAL: &str = "make arch=xflops";

lazy_static! {
    static ref MODULE_NAME: Regex = Regex::new(r"^[a-zA-Z0-9_./\-]+$").unwrap();
    static ref TOPDIR: Regex = Regex::new(r"TOPdir([\s]*)=[\s]*(.*)\n").unwrap();
}

#[derive(Debug, Deserialize)]
pub struct MakeEnv {
    pub modules: Vec<String>,
}

/// Directory layout of an HPL assignment.
pub struct HplLayout {
    pub submit: PathBuf,
    pub hpl: PathBuf,
    pub log: PathBuf,
}

impl HplLayout {
    pub fn new(root: &Path) -> Self {
        Self {
            submit: root.join("source_code").join("submit"),
            hpl: root.join("source_code").join("hpl-2.3"),
            log: root.join("evaluate.log"),
        }
    }
}

pub async fn build_and_submit(root: &Path) -> Result<()> {
    let layout = HplLayout::new(root);
    build(&layout).await?;
    submit(&layout).await
}

pub fn check_files(submit: &Path) -> Result<(), EvalError> {
    let missing: Vec<&str> = CRITICAL_FILES
        .iter()
        .copied()
        .filter(|f| !submit.join(f).is_file())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(EvalError::Config(format!("Missing file: {:?}", missing)))
    }
}

pub fn load_modules(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let env: MakeEnv =
        serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))?;
    for module in &env.modules {
        if !MODULE_NAME.is_match(module) {
            bail!("Module {} is invalid", module);
        }
    }
    Ok(env.modules)
}

/// `module load` lines followed by the make invocations.
pub fn make_script(modules: &[String], parallel: bool) -> String {
    let mut script: String = modules
        .iter()
        .map(|m| format!("module load '{}'\n", m))
        .collect();
    if parallel {
        // the HPL makefiles race on the first parallel pass; a second pass finishes the job
        script.push_str(MAKE_PARALLEL);
        script.push('\n');
        script.push_str(MAKE_PARALLEL);
    } else {
        script.push_str(MAKE_SERIAL);
    }
    script
}

/// Point `TOPdir` at the HPL tree. Exactly one assignment must be present.
pub fn rewrite_topdir(makefile: &str, hpl_dir: &Path) -> Result<String, EvalError> {
    let count = TOPDIR.find_iter(makefile).count();
    if count != 1 {
        return Err(EvalError::Config(format!(
            "replace error: expected one TOPdir assignment, found {}",
            count
        )));
    }
    let top = hpl_dir.display().to_string();
    Ok(TOPDIR
        .replace(makefile, |caps: &Captures| format!("TOPdir{}= {}\n", &caps[1], top))
        .into_owned())
}

/// Remove outputs of earlier builds so nothing stale is linked.
pub fn remove_previous_build(hpl: &Path) {
    let mut targets = vec![hpl.join("bin"), hpl.join("lib")];
    for group in ["src", "testing"] {
        if let Ok(entries) = fs::read_dir(hpl.join(group)) {
            targets.extend(entries.flatten().map(|e| e.path().join("xflops")));
        }
    }
    for target in targets.iter().filter(|t| t.exists()) {
        if let Err(e) = fs::remove_dir_all(target) {
            warn!(path = %target.display(), error = %e, "Failed to remove previous build output");
        }
    }
}

async fn run_make(hpl: &Path, log: &File) -> Result<bool> {
    let status = Command::new("bash")
        .arg("make.sh")
        .current_dir(hpl)
        .stdout(Stdio::from(log.try_clone()?))
        .stderr(Stdio::from(log.try_clone()?))
        .status()
        .await
        .context("Failed to run make.sh")?;
    Ok(status.success())
}

pub async fn build(layout: &HplLayout) -> Result<()> {
    check_files(&layout.submit)?;

    let modules = load_modules(&layout.submit.join("make_env.json"))?;
    let script_path = layout.hpl.join("make.sh");
    fs::write(&script_path, make_script(&modules, true))
        .with_context(|| format!("Failed to write {}", script_path.display()))?;

    let makefile = fs::read_to_string(layout.submit.join("Make.xflops"))
        .context("Failed to read Make.xflops")?;
    let hpl_abs = fs::canonicalize(&layout.hpl).unwrap_or_else(|_| layout.hpl.clone());
    fs::write(layout.hpl.join("Make.xflops"), rewrite_topdir(&makefile, &hpl_abs)?)
        .context("Failed to install Make.xflops")?;

    remove_previous_build(&layout.hpl);

    let mut log = File::create(&layout.log)
        .with_context(|| format!("Failed to create {}", layout.log.display()))?;
    info!(modules = ?modules, log = %layout.log.display(), "Building HPL");

    if !run_make(&layout.hpl, &log).await? {
        use std::io::Write;
        writeln!(log, "\n\n{}Fall back to serial{}\n", "=".repeat(20), "=".repeat(20))?;
        println!("Compile parallel error, fall back to serial");
        warn!("Parallel HPL build failed, retrying serially");

        fs::write(&script_path, make_script(&modules, false))?;
        if !run_make(&layout.hpl, &log).await? {
            return Err(EvalError::CompileError("Compile error".to_string()).into());
        }
    }

    for generated in ["Make.xflops", "make.sh"] {
        let _ = fs::remove_file(layout.hpl.join(generated));
    }
    println!("Compile success!");
    Ok(())
}

pub async fn submit(layout: &HplLayout) -> Result<()> {
    fs::copy(
        layout.submit.join("HPL.dat"),
        layout.hpl.join("bin").join("xflops").join("HPL.dat"),
    )
    .context("Failed to stage HPL.dat")?;
    let slurm = layout.hpl.join("hpl.slurm");
    fs::copy(layout.submit.join("hpl.slurm"), &slurm).context("Failed to stage hpl.slurm")?;

    let status = Command::new("sbatch")
        .args(["--time=1:00:00", "hpl.slurm"])
        .current_dir(&layout.hpl)
        .status()
        .await;
    let _ = fs::remove_file(&slurm);

    let status = status.context("Failed to run sbatch")?;
    if !status.success() {
        warn!(code = ?status.code(), "sbatch rejected the job");
    } else {
        info!("HPL job submitted");
    }
    Ok(())
}
