//! Order-insensitive comparison of short code answers.
//!
//! Each answer line is canonicalised, hashed with SHA3-512 and collected into
//! a set. A section is correct when its hash set equals the reference set.

use std::collections::{BTreeMap, BTreeSet};

use lazy_static::lazy_static;
use regex::{NoExpand, Regex};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_512};

use crate::error::EvalError;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref ADDRESS_OF_PARTICLES: Regex = Regex::new(r"&((?:local_)?particles)\b").unwrap();
    static ref PRODUCT: Regex = Regex::new(r"\w+\s*\*\s*\w+").unwrap();
    /// Commutative size expressions and the operand order they are rewritten to.
    static ref SIZE_PRODUCTS: Vec<(Regex, &'static str)> = vec![
        (Regex::new(r"local_n\*sizeof\(Particle\)").unwrap(), "local_n*sizeof(Particle)"),
        (Regex::new(r"sizeof\(Particle\)\*local_n").unwrap(), "local_n*sizeof(Particle)"),
        (Regex::new(r"N\*sizeof\(Particle\)").unwrap(), "N*sizeof(Particle)"),
        (Regex::new(r"sizeof\(Particle\)\*N").unwrap(), "N*sizeof(Particle)"),
    ];
}

/// Canonical form of one answer line.
pub fn normalize_code_line(line: &str) -> String {
    let mut line = WHITESPACE.replace_all(line, "").into_owned();
    line = ADDRESS_OF_PARTICLES.replace_all(&line, "$1").into_owned();

    for (pattern, canonical) in SIZE_PRODUCTS.iter() {
        if pattern.is_match(&line) {
            line = pattern.replace_all(&line, NoExpand(canonical)).into_owned();
        }
    }

    sort_product_operands(&line)
}

/// Sort the operands of every `a*b` product lexicographically.
fn sort_product_operands(line: &str) -> String {
    let products: Vec<String> = PRODUCT
        .find_iter(line)
        .map(|m| m.as_str().to_string())
        .collect();

    let mut out = line.to_string();
    for product in products {
        let mut terms: Vec<&str> = product.split('*').collect();
        terms.sort_unstable();
        out = out.replace(&product, &terms.join("*"));
    }
    out
}

/// Lowercase hex SHA3-512 digest.
pub fn sha3_512_hex(text: &str) -> String {
    let mut hasher = Sha3_512::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn hash_line(line: &str) -> String {
    sha3_512_hex(&normalize_code_line(line))
}

pub fn hash_lines<'a, I>(lines: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a String>,
{
    lines.into_iter().map(|l| hash_line(l)).collect()
}

/// Split an answer file into `TODO` sections.
///
/// A trimmed line starting with `TODO` opens a section (reopening one clears
/// it); subsequent non-empty lines belong to the open section. Lines before
/// the first header are ignored.
pub fn parse_sections(text: &str) -> BTreeMap<String, Vec<String>> {
    let mut sections: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut current: Option<String> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.starts_with("TODO") {
            sections.insert(line.to_string(), Vec::new());
            current = Some(line.to_string());
        } else if let Some(header) = &current {
            if !line.is_empty() {
                if let Some(lines) = sections.get_mut(header) {
                    lines.push(line.to_string());
                }
            }
        }
    }
    sections
}

/// Reference hash sets keyed by section header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceAnswers(pub BTreeMap<String, BTreeSet<String>>);

impl ReferenceAnswers {
    pub fn from_yaml(text: &str) -> Result<Self, EvalError> {
        Ok(serde_yaml::from_str(text)?)
    }
}

/// Points awarded for one section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionWeight {
    pub header: String,
    pub points: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionStatus {
    Correct,
    Wrong,
    Missing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SectionGrade {
    pub header: String,
    pub status: SectionStatus,
    pub points: f64,
}

/// Grade every reference section independently; points are summed.
///
/// Sections without a configured weight are worth nothing.
pub fn grade_sections(
    answers: &BTreeMap<String, Vec<String>>,
    reference: &ReferenceAnswers,
    weights: &[SectionWeight],
) -> Vec<SectionGrade> {
    reference
        .0
        .iter()
        .map(|(header, expected)| {
            let status = match answers.get(header) {
                None => SectionStatus::Missing,
                Some(lines) if &hash_lines(lines) == expected => SectionStatus::Correct,
                Some(_) => SectionStatus::Wrong,
            };
            let points = match status {
                SectionStatus::Correct => weights
                    .iter()
                    .find(|w| &w.header == header)
                    .map(|w| w.points)
                    .unwrap_or(0.0),
                _ => 0.0,
            };
            SectionGrade {
                header: header.clone(),
                status,
                points,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_from(answers: &BTreeMap<String, Vec<String>>) -> ReferenceAnswers {
        ReferenceAnswers(
            answers
                .iter()
                .map(|(header, lines)| (header.clone(), hash_lines(lines)))
                .collect(),
        )
    }

    #[test]
    fn test_whitespace_removed() {
        assert_eq!(
            normalize_code_line("  MPI_Barrier( MPI_COMM_WORLD ) ;  "),
            "MPI_Barrier(MPI_COMM_WORLD);"
        );
    }

    #[test]
    fn test_address_of_particles_dropped() {
        assert_eq!(
            normalize_code_line("MPI_Bcast(&particles, 1, T, 0, c);"),
            "MPI_Bcast(particles,1,T,0,c);"
        );
        assert_eq!(
            normalize_code_line("f(&local_particles[0]);"),
            "f(local_particles[0]);"
        );
        // other identifiers keep their address-of
        assert_eq!(normalize_code_line("f(&energy);"), "f(&energy);");
        assert_eq!(normalize_code_line("f(&particles_tmp);"), "f(&particles_tmp);");
    }

    #[test]
    fn test_sizeof_products_canonical() {
        assert_eq!(
            normalize_code_line("malloc(sizeof(Particle) * local_n)"),
            normalize_code_line("malloc(local_n*sizeof(Particle))")
        );
        assert_eq!(
            normalize_code_line("memcpy(a, b, sizeof(Particle)*N)"),
            "memcpy(a,b,N*sizeof(Particle))"
        );
    }

    #[test]
    fn test_generic_products_sorted() {
        assert_eq!(normalize_code_line("x = n * count;"), "x=count*n;");
        assert_eq!(
            normalize_code_line("x = count*n;"),
            normalize_code_line("x = n * count;")
        );
        // uppercase sorts before lowercase
        assert_eq!(normalize_code_line("y = local_n*N;"), "y=N*local_n;");
    }

    #[test]
    fn test_hash_is_sha3_512_hex() {
        let digest = sha3_512_hex("");
        assert_eq!(digest.len(), 128);
        assert!(digest.starts_with("a69f73cca23a9ac5"));
    }

    #[test]
    fn test_parse_sections() {
        let text = "preamble\nTODO: A\n  line1 \n\nline2\nTODO: B\nline3\nTODO: A\nline4\n";
        let sections = parse_sections(text);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections["TODO: A"], vec!["line4"]);
        assert_eq!(sections["TODO: B"], vec!["line3"]);
    }

    #[test]
    fn test_grade_sections_order_insensitive() {
        let mut key = BTreeMap::new();
        key.insert(
            "TODO: bcast".to_string(),
            vec![
                "MPI_Bcast(particles, N*sizeof(Particle), MPI_BYTE, 0, MPI_COMM_WORLD);".to_string(),
                "MPI_Barrier(MPI_COMM_WORLD);".to_string(),
            ],
        );
        key.insert("TODO: reduce".to_string(), vec!["MPI_Reduce(a);".to_string()]);
        let reference = reference_from(&key);

        let mut student = BTreeMap::new();
        student.insert(
            "TODO: bcast".to_string(),
            vec![
                "MPI_Barrier( MPI_COMM_WORLD );".to_string(),
                "MPI_Bcast(&particles, sizeof(Particle) * N, MPI_BYTE, 0, MPI_COMM_WORLD);"
                    .to_string(),
            ],
        );
        let weights = vec![
            SectionWeight {
                header: "TODO: bcast".to_string(),
                points: 10.0,
            },
            SectionWeight {
                header: "TODO: reduce".to_string(),
                points: 15.0,
            },
        ];

        let grades = grade_sections(&student, &reference, &weights);
        assert_eq!(grades.len(), 2);
        assert_eq!(grades[0].status, SectionStatus::Correct);
        assert_eq!(grades[0].points, 10.0);
        assert_eq!(grades[1].status, SectionStatus::Missing);
        assert_eq!(grades[1].points, 0.0);
    }

    #[test]
    fn test_extra_line_is_wrong() {
        let mut key = BTreeMap::new();
        key.insert("TODO: s".to_string(), vec!["a();".to_string()]);
        let reference = reference_from(&key);

        let mut student = BTreeMap::new();
        student.insert("TODO: s".to_string(), vec!["a();".to_string(), "b();".to_string()]);
        let grades = grade_sections(&student, &reference, &[]);
        assert_eq!(grades[0].status, SectionStatus::Wrong);
    }

    #[test]
    fn test_reference_yaml() {
        let yaml = "\"TODO: s\":\n  - abc\n  - def\n";
        let reference = ReferenceAnswers::from_yaml(yaml).unwrap();
        assert_eq!(reference.0["TODO: s"].len(), 2);
    }
}
