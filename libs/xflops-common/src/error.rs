//! Error taxonomy shared by the evaluation binaries.
//!
//! Compile errors and unmet preconditions are fatal for a run. Everything
//! else is caught per case and folded into a zero-flagged `ScoreRecord`.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::types::FailureKind;

#[derive(Error, Debug)]
pub enum EvalError {
    #[error("Compile Error: {0}")]
    CompileError(String),

    #[error("File not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl EvalError {
    /// Fatal errors abort the whole evaluation instead of a single case.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EvalError::CompileError(_) | EvalError::Precondition(_) | EvalError::Config(_)
        )
    }

    /// Per-case classification, if this error describes a case outcome.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            EvalError::CompileError(_) => Some(FailureKind::CompileError),
            EvalError::MissingFile(_) => Some(FailureKind::FileNotFound),
            _ => None,
        }
    }
}
