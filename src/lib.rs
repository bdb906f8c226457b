//! Comparison of large sourmash signature collections.
//!
//! - [matrix] computes all pairwise comparisons between a row collection and a column collection,
//!   processing rows in chunks on a worker pool and writing a dense or sparse csv incrementally.
//! - [gather] runs, for every signature of a collection, a greedy decomposition against a database,
//!   one output file per signature, skipping signatures already processed.
//!
//! Signatures are read from sourmash json files (possibly gzipped), directories of such files,
//! or text files listing them, see [store].

pub mod errors;
pub mod gather;
pub mod matrix;
pub mod pool;
pub mod progress;
pub mod sketch;
pub mod store;
pub mod utils;

pub use errors::{Result, SigError};
