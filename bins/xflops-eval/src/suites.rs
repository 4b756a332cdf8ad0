// Built-in assignment definitions
use std::collections::BTreeMap;
use xflops_common::{CaseSpec, CorrectnessCheck, ScoringCurve};

use crate::config::{
    BuildStep, CoreRequirement, Launcher, MeasurementPolicy, OutputFormat, Preconditions,
    SuiteConfig,
};

const BISHENG_HINT: &str = "make sure you have run `module load bisheng/2.5.0`";
const ENV_HINT: &str = "make sure you have run `source env.sh`";

pub fn builtin() -> Vec<SuiteConfig> {
    vec![bithack(), gd(), cluster(), nbody()]
}

/// Bit-vector rotation: the score follows the highest tier completed.
fn bithack() -> SuiteConfig {
    let tiers = [("-s", 14.0, 34.0, 0.2), ("-m", 16.0, 38.0, 0.3), ("-l", 18.0, 43.0, 0.5)];
    let cases = tiers
        .iter()
        .map(|&(flag, zero, full, weight)| CaseSpec {
            id: flag.to_string(),
            args: vec![flag.to_string()],
            timeout_secs: 600.0,
            time_limit_secs: None,
            full_score: 100.0,
            weight,
            curve: ScoringCurve::Linear { zero, full },
            check: CorrectnessCheck::None,
        })
        .collect();

    SuiteConfig {
        name: "bithack".to_string(),
        source_dir: "source_code/everybit".to_string(),
        program: "./everybit".to_string(),
        preconditions: Preconditions {
            compiler: Some("clang".to_string()),
            hint: Some(BISHENG_HINT.to_string()),
            ..Default::default()
        },
        build: BuildStep {
            command: vec!["make".to_string(), "testquiet".to_string()],
            pass_marker: Some("PASSED".to_string()),
            makeflag_rewrite: false,
        },
        launcher: Launcher::Direct,
        measurement: MeasurementPolicy {
            warmup: false,
            repetitions: Some(1),
        },
        output: OutputFormat::CompletedTier,
        scale: 1.0,
        cases,
    }
}

/// Gradient descent on 4 pinned cores; case 0 is an unscored sanity check.
fn gd() -> SuiteConfig {
    let ratio = [0.0, 0.25, 0.25, 0.25, 0.25];
    let full_time = [0.0, 75.0, 75.0, 2500.0, 1000.0];
    let base_time = [0.0, 3000.0, 3000.0, 20000.0, 6000.0];

    let cases = (0..5)
        .map(|i| CaseSpec {
            id: i.to_string(),
            args: vec![format!("conf{}.data", i), format!("out{}.data", i)],
            timeout_secs: 30.0,
            time_limit_secs: None,
            full_score: 100.0,
            weight: ratio[i],
            curve: ScoringCurve::InverseTime {
                full_time: full_time[i],
                base_time: base_time[i],
            },
            check: CorrectnessCheck::ToleranceFile {
                output: format!("out{}.data", i),
                reference: format!("ref{}.data", i),
            },
        })
        .collect();

    SuiteConfig {
        name: "gd".to_string(),
        source_dir: "source_code".to_string(),
        program: "./gd".to_string(),
        preconditions: Preconditions {
            compiler: Some("clang++".to_string()),
            cores: Some(CoreRequirement::AtLeast(4)),
            hint: Some(BISHENG_HINT.to_string()),
            ..Default::default()
        },
        build: BuildStep {
            command: ["clang++", "-O3", "-fopenmp", "gd.cpp", "main.cpp", "-o", "gd"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            pass_marker: None,
            makeflag_rewrite: false,
        },
        launcher: Launcher::Taskset,
        measurement: MeasurementPolicy::default(),
        output: OutputFormat::TimeMillis,
        scale: 1.0,
        cases,
    }
}

/// Clustering: exact answers, averaged time must stay under the limit.
fn cluster() -> SuiteConfig {
    // (input, full score, answer, time limit, full-score time)
    let table: [(&str, f64, i64, f64, f64); 5] = [
        ("random.10.in", 10.0, 329014, 1.001, 1.0),
        ("random.100000.in", 10.0, 4991683583, 1.001, 1.0),
        ("random.500000.in", 10.0, 24980718446, 1.001, 1.0),
        ("random.500000000.in", 35.0, 25000642464863, 24.0, 16.0),
        ("random.10000000000.in", 35.0, 70504880369618, 85.0, 45.0),
    ];

    let cases = table
        .iter()
        .map(|&(input, full_score, answer, limit, full)| CaseSpec {
            id: input.to_string(),
            args: vec![input.to_string()],
            timeout_secs: 90.0,
            time_limit_secs: Some(limit),
            full_score,
            weight: 1.0,
            curve: ScoringCurve::Linear { zero: limit, full },
            check: CorrectnessCheck::ExactAnswer { expected: answer },
        })
        .collect();

    let mut env = BTreeMap::new();
    env.insert("OMP_PROC_BIND".to_string(), "true".to_string());
    env.insert("OMP_NUM_THREADS".to_string(), "128".to_string());

    SuiteConfig {
        name: "cluster".to_string(),
        source_dir: "source_code".to_string(),
        program: "./cluster".to_string(),
        preconditions: Preconditions {
            compiler: Some("clang".to_string()),
            env,
            cores: Some(CoreRequirement::Exactly(128)),
            hint: Some(ENV_HINT.to_string()),
        },
        build: BuildStep {
            command: vec!["make".to_string()],
            pass_marker: None,
            makeflag_rewrite: false,
        },
        launcher: Launcher::Numactl {
            interleave: "0,1,2,3".to_string(),
        },
        measurement: MeasurementPolicy::default(),
        output: OutputFormat::SolveTime,
        scale: 1.0,
        cases,
    }
}

/// N-body OpenMP question; each repetition reads its own input file.
fn nbody() -> SuiteConfig {
    // (id, particles, baseline = timeout, full-score time, full score)
    let table = [
        ("omp_1024", 1024, 30.0, 3.0, 15.0),
        ("omp_4096", 4096, 360.0, 6.0, 20.0),
        ("omp_8192", 8192, 360.0, 20.0, 25.0),
    ];

    let cases = table
        .iter()
        .map(|&(id, particles, baseline, full_time, full_score)| CaseSpec {
            id: id.to_string(),
            args: vec![format!("ref_data/{}_{{run}}.ref", particles)],
            timeout_secs: baseline,
            time_limit_secs: None,
            full_score,
            weight: 1.0,
            curve: ScoringCurve::LogInterpolation {
                full_time,
                baseline,
            },
            check: CorrectnessCheck::None,
        })
        .collect();

    SuiteConfig {
        name: "nbody".to_string(),
        source_dir: "source_code".to_string(),
        program: "./nbody_simulator_omp".to_string(),
        preconditions: Preconditions {
            compiler: Some("clang++".to_string()),
            cores: Some(CoreRequirement::Exactly(128)),
            hint: Some(BISHENG_HINT.to_string()),
            ..Default::default()
        },
        build: BuildStep {
            command: vec!["make".to_string(), "omp".to_string()],
            pass_marker: None,
            makeflag_rewrite: true,
        },
        launcher: Launcher::Direct,
        measurement: MeasurementPolicy::default(),
        output: OutputFormat::SimulationEnds,
        scale: 1.0,
        cases,
    }
}
