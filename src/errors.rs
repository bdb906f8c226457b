//! error type shared by all modules of the crate.
//!
//! Configuration errors are detected before any work starts, lookup errors are
//! local to one gather task, io/json/csv errors are fatal for the operation that raised them.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SigError {
    /// missing or contradictory flags, non positive chunk size, empty collection ...
    #[error("configuration error : {0}")]
    Config(String),

    /// the two sketches cannot be compared (ksize, molecule, seed or scaled differ)
    #[error("incompatible sketches {left} and {right} : {reason}")]
    Incompatible {
        left: String,
        right: String,
        reason: String,
    },

    /// a signature could not be re-located by its md5 in a freshly loaded database
    #[error("no signature with md5 {md5} in database {db}")]
    Lookup { md5: String, db: String },

    #[error("cannot decode signature file {path} : {reason}")]
    Parse { path: String, reason: String },

    /// an operation on a sketch was refused by sourmash
    #[error("sketch error : {0}")]
    Sketch(String),

    /// a writer received records after its final flush
    #[error("result writer for {0:?} is already closed")]
    Closed(PathBuf),

    /// a worker ended without delivering all its results
    #[error("worker pool error : {0}")]
    Pool(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
} // end of SigError

pub type Result<T> = std::result::Result<T, SigError>;

impl From<sourmash::Error> for SigError {
    fn from(e: sourmash::Error) -> Self {
        SigError::Sketch(e.to_string())
    }
}

impl SigError {
    /// true for errors that must stop a run before any output is produced
    pub fn is_config(&self) -> bool {
        matches!(self, SigError::Config(_) | SigError::Incompatible { .. })
    }
}
