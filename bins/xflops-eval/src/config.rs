// Suite configuration management for the xflops evaluator
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use xflops_common::CaseSpec;

use crate::suites;

/// Checks that must hold before any build or measurement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Preconditions {
    /// Compiler that must answer `--version`.
    #[serde(default)]
    pub compiler: Option<String>,
    /// Environment variables that must be set to exactly these values.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub cores: Option<CoreRequirement>,
    /// Printed when the compiler or environment check fails.
    #[serde(default)]
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoreRequirement {
    /// Pin to the first `n` usable cores.
    AtLeast(usize),
    /// The affinity mask must contain exactly `n` cores.
    Exactly(usize),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildStep {
    pub command: Vec<String>,
    /// When set, the build doubles as a self-test whose last line must contain this marker.
    #[serde(default)]
    pub pass_marker: Option<String>,
    /// Replace the Makefile's `CFLAGS` line with the first line of `Makeflag`.
    #[serde(default)]
    pub makeflag_rewrite: bool,
}

/// How runs are placed on CPUs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Launcher {
    #[default]
    Direct,
    /// `taskset -c <pinned cores>`
    Taskset,
    /// `numactl --physcpubind=all --interleave=<nodes>`
    Numactl { interleave: String },
}

impl Launcher {
    /// Program and arguments actually spawned.
    pub fn command(&self, cores: &[usize], program: &str, args: &[String]) -> (String, Vec<String>) {
        let (launcher, mut argv) = match self {
            Launcher::Direct => return (program.to_string(), args.to_vec()),
            Launcher::Taskset => {
                let list: Vec<String> = cores.iter().map(|c| c.to_string()).collect();
                ("taskset", vec!["-c".to_string(), list.join(",")])
            }
            Launcher::Numactl { interleave } => (
                "numactl",
                vec![
                    "--physcpubind=all".to_string(),
                    format!("--interleave={}", interleave),
                ],
            ),
        };
        argv.push(program.to_string());
        argv.extend(args.iter().cloned());
        (launcher.to_string(), argv)
    }
}

/// Where the performance figure (and answer) is found in stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Last line `Time: <float>ms`.
    TimeMillis,
    /// `solve Time <float>` then an integer answer line.
    SolveTime,
    /// `Succesfully completed tier: <int>`.
    CompletedTier,
    /// `total simulation ends in <float> sec`.
    SimulationEnds,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementPolicy {
    /// Whether this suite honours the warm-up run at all.
    #[serde(default = "default_true")]
    pub warmup: bool,
    /// Fixed repetition count, overriding `-t`.
    #[serde(default)]
    pub repetitions: Option<u32>,
}

impl Default for MeasurementPolicy {
    fn default() -> Self {
        Self {
            warmup: true,
            repetitions: None,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteConfig {
    pub name: String,
    /// Build and run directory, relative to the assignment root.
    pub source_dir: String,
    pub program: String,
    #[serde(default)]
    pub preconditions: Preconditions,
    pub build: BuildStep,
    #[serde(default)]
    pub launcher: Launcher,
    #[serde(default)]
    pub measurement: MeasurementPolicy,
    pub output: OutputFormat,
    #[serde(default = "default_scale")]
    pub scale: f64,
    pub cases: Vec<CaseSpec>,
}

fn default_scale() -> f64 {
    1.0
}

/// Longest hard timeout a case may ask for.
pub const MAX_TIMEOUT_SECS: f64 = 24.0 * 3600.0;

impl SuiteConfig {
    pub fn source_path(&self, root: &Path) -> PathBuf {
        root.join(&self.source_dir)
    }

    pub fn max_total(&self) -> f64 {
        self.scale * self.cases.iter().map(CaseSpec::max_points).sum::<f64>()
    }

    pub fn validate(&self) -> Result<()> {
        if self.build.command.is_empty() {
            bail!("Suite '{}' has an empty build command", self.name);
        }
        if self.cases.is_empty() {
            bail!("Suite '{}' has no cases", self.name);
        }
        if self.launcher == Launcher::Taskset && self.preconditions.cores.is_none() {
            bail!("Suite '{}' uses taskset but requires no cores", self.name);
        }
        for case in &self.cases {
            if !(case.timeout_secs > 0.0 && case.timeout_secs <= MAX_TIMEOUT_SECS) {
                bail!(
                    "Case '{}' in '{}' needs a timeout in (0, {}] seconds, got {}",
                    case.id,
                    self.name,
                    MAX_TIMEOUT_SECS,
                    case.timeout_secs
                );
            }
            if case.weight > 0.0 {
                case.curve
                    .validate()
                    .with_context(|| format!("Case '{}' in '{}'", case.id, self.name))?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SuitesJson {
    suites: Vec<SuiteConfig>,
}

/// Suite configuration manager
#[derive(Clone)]
pub struct SuiteConfigManager {
    configs: HashMap<String, SuiteConfig>,
}

impl SuiteConfigManager {
    /// Load suite configurations from a JSON file
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Suite config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let suites_json: SuitesJson = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        Self::from_suites(suites_json.suites)
    }

    /// Built-in assignment definitions
    pub fn builtin() -> Self {
        let configs = suites::builtin()
            .into_iter()
            .map(|s| (s.name.clone(), s))
            .collect();
        Self { configs }
    }

    pub fn from_suites(suites: Vec<SuiteConfig>) -> Result<Self> {
        let mut configs = HashMap::new();
        for suite in suites {
            suite.validate()?;
            configs.insert(suite.name.clone(), suite);
        }
        Ok(Self { configs })
    }

    /// Get configuration for a specific suite
    pub fn get_config(&self, name: &str) -> Result<&SuiteConfig> {
        self.configs
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("No configuration found for suite: {}", name))
    }

    /// List all configured suites
    pub fn list_suites(&self) -> Vec<String> {
        let mut names: Vec<String> = self.configs.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn to_json(&self) -> Result<String> {
        let mut suites: Vec<SuiteConfig> = self.configs.values().cloned().collect();
        suites.sort_by(|a, b| a.name.cmp(&b.name));
        serde_json::to_string_pretty(&SuitesJson { suites }).context("Failed to serialize suites")
    }
}

/// Run-wide settings, validated once at startup.
#[derive(Debug, Clone)]
pub struct EvalConfig {
    /// Assignment directory; `result.yaml` is written here.
    pub root: PathBuf,
    pub tries: u32,
    pub warmup: bool,
}

impl EvalConfig {
    pub fn new(root: PathBuf, tries: u32, warmup: bool) -> Result<Self> {
        if tries == 0 {
            bail!("Number of tries must be greater than 0, but now it's {}", tries);
        }
        if !root.is_dir() {
            bail!("Assignment directory not found: {}", root.display());
        }
        Ok(Self { root, tries, warmup })
    }

    pub fn repetitions(&self, suite: &SuiteConfig) -> u32 {
        suite.measurement.repetitions.unwrap_or(self.tries)
    }

    pub fn warmup_for(&self, suite: &SuiteConfig) -> bool {
        self.warmup && suite.measurement.warmup
    }

    pub fn result_path(&self) -> PathBuf {
        self.root.join("result.yaml")
    }
}
