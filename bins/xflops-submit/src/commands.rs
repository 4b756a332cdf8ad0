// Packaging commands for xflops submissions
use anyhow::{bail, Context, Result};
use serde_yaml::{Mapping, Value};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const MANIFEST_FILE: &str = "submit.yaml";
pub const SUBMIT_DIR: &str = "xflops2024_submit";
pub const WRITEUP: &str = "writeup.md";

/// Question directory and the files it submits, in manifest order.
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub name: String,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    All,
    Single(usize),
}

impl Choice {
    /// `-1` selects every question, otherwise a 0-based index.
    pub fn from_index(index: i64, count: usize) -> Result<Self> {
        match index {
            -1 => Ok(Choice::All),
            i if i >= 0 && (i as usize) < count => Ok(Choice::Single(i as usize)),
            i => bail!("Invalid choice {}: expected -1 or 0..{}", i, count),
        }
    }
}

/// Parse `submit.yaml`, keeping the question order of the file.
pub fn parse_manifest(text: &str) -> Result<Vec<Question>> {
    let mapping: Mapping = serde_yaml::from_str(text).context("Invalid submit manifest")?;
    let mut questions = Vec::with_capacity(mapping.len());
    for (key, value) in mapping {
        let name = match key {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            other => bail!("Invalid question name: {:?}", other),
        };
        let files: Vec<String> = match value {
            Value::Null => Vec::new(),
            v => serde_yaml::from_value(v)
                .with_context(|| format!("Question '{}' must list file paths", name))?,
        };
        questions.push(Question { name, files });
    }
    Ok(questions)
}

pub fn load_manifest(work_dir: &Path) -> Result<Vec<Question>> {
    let path = work_dir.join(MANIFEST_FILE);
    let text = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_manifest(&text)
}

/// Lines shown by the interactive prompt.
pub fn menu(questions: &[Question]) -> String {
    let mut lines: Vec<String> = questions
        .iter()
        .enumerate()
        .map(|(i, q)| format!("{}: {}", i, q.name))
        .collect();
    lines.push("-1: ALL".to_string());
    lines.join("\n")
}

/// Archive base name and the path archived, relative to the work dir.
pub fn archive_target(questions: &[Question], choice: Choice) -> (String, PathBuf) {
    match choice {
        Choice::All => (SUBMIT_DIR.to_string(), PathBuf::from(SUBMIT_DIR)),
        Choice::Single(i) => {
            let name = questions[i].name.clone();
            let member = Path::new(SUBMIT_DIR).join(&name);
            (name, member)
        }
    }
}

/// Copy each question's writeup and listed files into the staging tree.
///
/// Listed files are flattened to their file name. Missing files are reported
/// and skipped; the returned list holds one warning per missing file.
pub fn stage(work_dir: &Path, questions: &[Question]) -> Result<Vec<String>> {
    let staging = work_dir.join(SUBMIT_DIR);
    let mut warnings = Vec::new();

    for question in questions {
        let src_dir = work_dir.join(&question.name);
        let dst_dir = staging.join(&question.name);
        fs::create_dir_all(&dst_dir)
            .with_context(|| format!("Failed to create {}", dst_dir.display()))?;

        let listed = std::iter::once(WRITEUP).chain(question.files.iter().map(String::as_str));
        for file in listed {
            let src = src_dir.join(file);
            if !src.is_file() {
                let warning = format!("WARNING: {}'s file : {} not found", question.name, file);
                println!("{}", warning);
                warnings.push(warning);
                continue;
            }
            let file_name = file.rsplit('/').next().unwrap_or(file);
            fs::copy(&src, dst_dir.join(file_name))
                .with_context(|| format!("Failed to copy {}", src.display()))?;
            debug!(question = %question.name, file, "Staged file");
        }
    }
    Ok(warnings)
}

/// Write `<name>.tar` containing `member` (a path relative to `work_dir`).
pub fn write_archive(work_dir: &Path, name: &str, member: &Path) -> Result<PathBuf> {
    let archive_path = work_dir.join(format!("{}.tar", name));
    let file = File::create(&archive_path)
        .with_context(|| format!("Failed to create {}", archive_path.display()))?;
    let mut builder = tar::Builder::new(file);
    builder
        .append_dir_all(member, work_dir.join(member))
        .with_context(|| format!("Failed to archive {}", member.display()))?;
    builder.into_inner()?.sync_all()?;
    Ok(archive_path)
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Stage the chosen questions, archive them and print the checksum.
pub fn submit(work_dir: &Path, questions: &[Question], choice: Choice) -> Result<PathBuf> {
    let (name, member) = archive_target(questions, choice);
    let selected: &[Question] = match choice {
        Choice::All => questions,
        Choice::Single(i) => &questions[i..=i],
    };

    let staging = work_dir.join(SUBMIT_DIR);
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    let archive = work_dir.join(format!("{}.tar", name));
    if archive.exists() {
        fs::remove_file(&archive)?;
    }
    fs::create_dir_all(&staging)?;

    let warnings = stage(work_dir, selected)?;
    let archive = write_archive(work_dir, &name, &member)?;
    let digest = sha256_file(&archive)?;

    info!(archive = %archive.display(), missing = warnings.len(), "Submission packed");
    println!("sha256({}.tar) : {}", name, digest);
    Ok(archive)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = "Bithack:\n  - source_code/everybit/everybit.c\nGD:\n  - source_code/gd.cpp\n  - source_code/missing.cpp\nHPL:\n";

    fn fixture(dir: &Path) -> Vec<Question> {
        fs::create_dir_all(dir.join("Bithack/source_code/everybit")).unwrap();
        fs::write(dir.join("Bithack/writeup.md"), "# bithack\n").unwrap();
        fs::write(dir.join("Bithack/source_code/everybit/everybit.c"), "int main(){}\n").unwrap();
        fs::create_dir_all(dir.join("GD/source_code")).unwrap();
        fs::write(dir.join("GD/source_code/gd.cpp"), "// gd\n").unwrap();
        parse_manifest(MANIFEST).unwrap()
    }

    fn archive_entries(path: &Path) -> Vec<String> {
        let mut archive = tar::Archive::new(File::open(path).unwrap());
        let mut names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().trim_end_matches('/').to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_manifest_keeps_order_and_null_lists() {
        let questions = parse_manifest(MANIFEST).unwrap();
        let names: Vec<&str> = questions.iter().map(|q| q.name.as_str()).collect();
        assert_eq!(names, vec!["Bithack", "GD", "HPL"]);
        assert!(questions[2].files.is_empty());
        assert_eq!(menu(&questions), "0: Bithack\n1: GD\n2: HPL\n-1: ALL");
    }

    #[test]
    fn test_choice_bounds() {
        assert_eq!(Choice::from_index(-1, 3).unwrap(), Choice::All);
        assert_eq!(Choice::from_index(2, 3).unwrap(), Choice::Single(2));
        assert!(Choice::from_index(3, 3).is_err());
        assert!(Choice::from_index(-2, 3).is_err());
    }

    #[test]
    fn test_stage_flattens_and_warns() {
        let dir = tempfile::tempdir().unwrap();
        let questions = fixture(dir.path());
        let warnings = stage(dir.path(), &questions[1..2]).unwrap();

        assert!(dir.path().join(SUBMIT_DIR).join("GD").join("gd.cpp").is_file());
        assert_eq!(
            warnings,
            vec![
                "WARNING: GD's file : writeup.md not found",
                "WARNING: GD's file : source_code/missing.cpp not found",
            ]
        );
    }

    #[test]
    fn test_submit_single_question() {
        let dir = tempfile::tempdir().unwrap();
        let questions = fixture(dir.path());
        let archive = submit(dir.path(), &questions, Choice::Single(0)).unwrap();

        assert_eq!(archive, dir.path().join("Bithack.tar"));
        assert_eq!(
            archive_entries(&archive),
            vec![
                "xflops2024_submit/Bithack",
                "xflops2024_submit/Bithack/everybit.c",
                "xflops2024_submit/Bithack/writeup.md",
            ]
        );
    }

    #[test]
    fn test_submit_all_replaces_previous_staging() {
        let dir = tempfile::tempdir().unwrap();
        let questions = fixture(dir.path());
        fs::create_dir_all(dir.path().join(SUBMIT_DIR).join("stale")).unwrap();
        fs::write(dir.path().join("xflops2024_submit.tar"), "old").unwrap();

        let archive = submit(dir.path(), &questions, Choice::All).unwrap();
        let entries = archive_entries(&archive);
        assert!(entries.contains(&"xflops2024_submit/GD/gd.cpp".to_string()));
        assert!(entries.contains(&"xflops2024_submit/HPL".to_string()));
        assert!(!entries.iter().any(|e| e.contains("stale")));
    }

    #[test]
    fn test_sha256_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "abc").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
