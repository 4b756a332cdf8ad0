// MPI communication question: graded by normalized line hashes, not by running code
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};
use xflops_common::normalize::{
    grade_sections, parse_sections, ReferenceAnswers, SectionStatus, SectionWeight,
};
use xflops_common::{AggregateReport, FailureKind, ScoreRecord};

pub const CASE_ID: &str = "mpi";
pub const FULL_SCORE: f64 = 40.0;
const ANSWER_FILE: &str = "source_code/my_mpi_comm.txt";
const REFERENCE_FILE: &str = "reference_answers.yaml";

pub fn section_weights() -> Vec<SectionWeight> {
    [
        ("TODO: 广播粒子数据到所有进程", 10.0),
        ("TODO: 同步所有进程模拟的信息", 15.0),
        (
            "TODO: 归约所有进程计算的局部动量分量和能量（4次归约操作，到0号进程）",
            15.0,
        ),
    ]
    .iter()
    .map(|&(header, points)| SectionWeight {
        header: header.to_string(),
        points,
    })
    .collect()
}

/// Grade `source_code/my_mpi_comm.txt` under `root` against `reference_answers.yaml`.
pub fn evaluate(root: &Path) -> Result<AggregateReport> {
    let answer_path = root.join(ANSWER_FILE);
    let mut report = AggregateReport::default();

    let text = match fs::read_to_string(&answer_path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            println!("Error: {} not found.", answer_path.display());
            report.push_points(
                CASE_ID,
                1.0,
                FULL_SCORE,
                ScoreRecord::failed(FailureKind::FileNotFound),
            );
            return Ok(report);
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", answer_path.display()))
        }
    };

    let reference_path = root.join(REFERENCE_FILE);
    let reference_text = fs::read_to_string(&reference_path)
        .with_context(|| format!("Failed to read {}", reference_path.display()))?;
    let reference = ReferenceAnswers::from_yaml(&reference_text)
        .with_context(|| format!("Failed to parse {}", reference_path.display()))?;

    let score = grade(&text, &reference, &section_weights());
    info!(score, "MPI answers graded");
    report.push_points(CASE_ID, 1.0, FULL_SCORE, ScoreRecord::accepted(score, score));
    Ok(report)
}

/// Sum of the points of every section whose lines hash to the reference set.
pub fn grade(text: &str, reference: &ReferenceAnswers, weights: &[SectionWeight]) -> f64 {
    let answers: BTreeMap<String, Vec<String>> = parse_sections(text);
    let mut score = 0.0;
    for section in grade_sections(&answers, reference, weights) {
        match section.status {
            SectionStatus::Correct => score += section.points,
            SectionStatus::Wrong => {
                warn!(section = %section.header, "Section answer mismatch");
                println!("Wrong answer in {}", section.header);
            }
            SectionStatus::Missing => println!("Missing answer for {}", section.header),
        }
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use xflops_common::normalize::hash_lines;

    const BCAST: &str = "TODO: 广播粒子数据到所有进程";
    const SYNC: &str = "TODO: 同步所有进程模拟的信息";

    fn reference() -> ReferenceAnswers {
        let mut answers = BTreeMap::new();
        answers.insert(
            BCAST.to_string(),
            vec!["MPI_Bcast(particles, N*sizeof(Particle), MPI_BYTE, 0, MPI_COMM_WORLD);".to_string()],
        );
        answers.insert(
            SYNC.to_string(),
            vec!["MPI_Barrier(MPI_COMM_WORLD);".to_string()],
        );
        ReferenceAnswers(
            answers
                .iter()
                .map(|(header, lines)| (header.clone(), hash_lines(lines)))
                .collect(),
        )
    }

    fn write_fixture(root: &Path, answers: Option<&str>) {
        fs::create_dir_all(root.join("source_code")).unwrap();
        fs::write(
            root.join(REFERENCE_FILE),
            serde_yaml::to_string(&reference()).unwrap(),
        )
        .unwrap();
        if let Some(text) = answers {
            fs::write(root.join(ANSWER_FILE), text).unwrap();
        }
    }

    #[test]
    fn test_equivalent_spellings_score() {
        let text = format!(
            "{}\n  MPI_Bcast(&particles, sizeof(Particle) * N, MPI_BYTE, 0, MPI_COMM_WORLD);\n\n{}\nMPI_Barrier( MPI_COMM_WORLD );\n",
            BCAST, SYNC
        );
        assert_eq!(grade(&text, &reference(), &section_weights()), 25.0);
    }

    #[test]
    fn test_sections_score_independently() {
        let text = format!("{}\nMPI_Bcast(particles, 1, MPI_BYTE, 0, MPI_COMM_WORLD);\n{}\nMPI_Barrier(MPI_COMM_WORLD);\n", BCAST, SYNC);
        assert_eq!(grade(&text, &reference(), &section_weights()), 15.0);

        let only_bcast = format!(
            "{}\nMPI_Bcast(particles,N*sizeof(Particle),MPI_BYTE,0,MPI_COMM_WORLD);\n",
            BCAST
        );
        assert_eq!(grade(&only_bcast, &reference(), &section_weights()), 10.0);
    }

    #[test]
    fn test_extra_line_is_wrong() {
        let text = format!(
            "{}\nMPI_Barrier(MPI_COMM_WORLD);\nMPI_Barrier(MPI_COMM_WORLD);\nfoo();\n",
            SYNC
        );
        assert_eq!(grade(&text, &reference(), &section_weights()), 0.0);
    }

    #[test]
    fn test_evaluate_writes_mpi_record() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), Some(&format!("{}\nMPI_Barrier(MPI_COMM_WORLD);\n", SYNC)));
        let report = evaluate(dir.path()).unwrap();
        let record = report.get(CASE_ID).unwrap();
        assert_eq!(record.info, "Accepted");
        assert_eq!(record.performance, 15.0);
        assert_eq!(report.total(), 15.0);
        assert_eq!(report.max_total(), FULL_SCORE);
    }

    #[test]
    fn test_missing_answer_file() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), None);
        let report = evaluate(dir.path()).unwrap();
        let record = report.get(CASE_ID).unwrap();
        assert_eq!(record.info, "File not found");
        assert_eq!(record.zero_flag, 1);
        assert_eq!(record.performance, 0.0);
        assert_eq!(report.total(), 0.0);
    }

    #[test]
    fn test_missing_reference_is_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("source_code")).unwrap();
        fs::write(dir.path().join(ANSWER_FILE), "TODO: x\n").unwrap();
        assert!(evaluate(dir.path()).is_err());
    }
}
