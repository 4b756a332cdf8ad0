/// Startup Preconditions
///
/// Checked once, before anything is compiled. A failure here aborts the
/// whole evaluation; nothing is re-validated per case.
use std::collections::BTreeMap;
use std::process::{Command, Stdio};

use nix::sched::{sched_getaffinity, CpuSet};
use nix::unistd::Pid;
use tracing::{debug, info};
use xflops_common::EvalError;

use crate::config::{CoreRequirement, Preconditions};

/// Verify the suite's preconditions and return the cores runs are pinned to.
pub fn verify(pre: &Preconditions) -> Result<Vec<usize>, EvalError> {
    let hint = pre.hint.as_deref().unwrap_or("check your toolchain setup");

    check_env(&pre.env, |k| std::env::var(k).ok())
        .map_err(|e| EvalError::Precondition(format!("{} ({})", hint, e)))?;

    let cores = match pre.cores {
        Some(req) => {
            let available = available_cores()?;
            debug!(available = available.len(), "Read CPU affinity mask");
            select_cores(&available, req)?
        }
        None => Vec::new(),
    };

    if let Some(compiler) = &pre.compiler {
        if !compiler_available(compiler) {
            return Err(EvalError::Precondition(format!(
                "`{} --version` failed: {}",
                compiler, hint
            )));
        }
    }

    if !cores.is_empty() {
        info!(cores = %format_cores(&cores), "Using cores");
    }
    Ok(cores)
}

pub fn compiler_available(compiler: &str) -> bool {
    Command::new(compiler)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Cores in this process's affinity mask.
pub fn available_cores() -> Result<Vec<usize>, EvalError> {
    let mask = sched_getaffinity(Pid::from_raw(0))
        .map_err(|e| EvalError::Precondition(format!("Failed to read CPU affinity: {}", e)))?;
    Ok((0..CpuSet::count())
        .filter(|&i| mask.is_set(i).unwrap_or(false))
        .collect())
}

pub fn select_cores(available: &[usize], req: CoreRequirement) -> Result<Vec<usize>, EvalError> {
    match req {
        CoreRequirement::AtLeast(n) if available.len() >= n => Ok(available[..n].to_vec()),
        CoreRequirement::Exactly(n) if available.len() == n => Ok(available.to_vec()),
        CoreRequirement::AtLeast(n) | CoreRequirement::Exactly(n) => {
            Err(EvalError::Precondition(format!(
                "No enough cores: need {} but now is {}",
                n,
                available.len()
            )))
        }
    }
}

/// Every required variable must be present with exactly the given value.
pub fn check_env<F>(required: &BTreeMap<String, String>, lookup: F) -> Result<(), String>
where
    F: Fn(&str) -> Option<String>,
{
    for (key, expected) in required {
        match lookup(key) {
            Some(actual) if &actual == expected => {}
            Some(actual) => return Err(format!("{}={} but {} is required", key, actual, expected)),
            None => return Err(format!("{} is not set", key)),
        }
    }
    Ok(())
}

pub fn format_cores(cores: &[usize]) -> String {
    cores
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
