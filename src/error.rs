//src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while formatting a reference database.
#[derive(Error, Debug)]
pub enum RefDbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{path}: first header matches neither the UNITE nor the SILVA format")]
    InvalidDialect { path: PathBuf },

    #[error("Invalid character(s) {chars:?} are present in sequence {id} in input file {path}")]
    InvalidSequence {
        chars: Vec<char>,
        id: String,
        path: PathBuf,
    },

    #[error("{path}:{line}: malformed record: {reason}")]
    MalformedRecord {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("{id} not in taxonomy file")]
    MissingLineage { id: String },

    #[error("classifier training failed after duplicate-taxa rebuild: {0}")]
    TrainerRejected(String),

    #[error("classifier training failed: {0}")]
    Trainer(String),
}

pub type Result<T> = std::result::Result<T, RefDbError>;

/// Outcome reported by an external classifier trainer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrainError {
    /// The trainer refused the taxonomy because one name has several parents.
    #[error("duplicate taxon name: {0}")]
    DuplicateTaxonName(String),

    #[error("{0}")]
    Failed(String),
}
