//! Chunked pairwise comparison of two signature collections.
//!
//! The column collection is loaded once and stays fixed for the whole run, the dense header is built from it.
//! Row sketches are read lazily and cut into chunks. Each chunk is handed to the worker pool, one task per row,
//! every task comparing its row against all columns. Results come back in row order to this thread,
//! which alone updates progress and appends to the output.
//!
//! Outputs are csv files, either a dense matrix (one line per row sketch, one value per column sketch)
//! or a sparse list of non zero pairs.

pub mod chunk;
pub mod writer;

use std::time::SystemTime;

use cpu_time::ProcessTime;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SigError};
use crate::pool::WorkerPool;
use crate::progress::ProgressState;
use crate::sketch::{Metric, NamedSketch};
use crate::store::{max_scaled, SketchStore};
use crate::utils::parameters::MatrixParams;

pub use chunk::{resolve_chunk_size, ChunkScheduler};
pub use writer::{CsvRecord, Header, ResultRow, ResultWriter, SparseEntry, WriterState, WriterSummary};

/// output format of a matrix run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputMode {
    Dense,
    Sparse,
}

impl OutputMode {
    /// exactly one of the two flags must be set
    pub fn from_flags(dense: bool, sparse: bool) -> Result<Self> {
        match (dense, sparse) {
            (true, false) => Ok(OutputMode::Dense),
            (false, true) => Ok(OutputMode::Sparse),
            (true, true) => Err(SigError::Config("--dense and --sparse are mutually exclusive".to_string())),
            (false, false) => Err(SigError::Config("must choose either --dense or --sparse".to_string())),
        }
    }
}

/// compares one row against every column, values in column order
pub fn compute_dense_row(row: &NamedSketch, columns: &[NamedSketch], metric: Metric) -> Result<ResultRow> {
    let values = columns.iter().map(|c| metric.compute(row, c)).collect::<Result<Vec<f64>>>()?;
    Ok(ResultRow {
        name: row.name().to_string(),
        values,
    })
}

/// compares one row against every column, keeping only non zero values
pub fn compute_sparse_row(row: &NamedSketch, columns: &[NamedSketch], metric: Metric) -> Result<Vec<SparseEntry>> {
    let mut entries = Vec::new();
    for c in columns {
        let value = metric.compute(row, c)?;
        if value > 0. {
            entries.push(SparseEntry {
                source: row.name().to_string(),
                target: c.name().to_string(),
                value,
            });
        }
    }
    log::trace!("row {} : {} non zero entries", row.name(), entries.len());
    Ok(entries)
} // end of compute_sparse_row

/// counts reported at the end of a run
#[derive(Clone, Debug)]
pub struct MatrixSummary {
    pub nb_rows: usize,
    pub nb_columns: usize,
    pub nb_chunks: usize,
    pub chunk_size: usize,
    /// rows (dense) or entries (sparse) written
    pub writer: WriterSummary,
    pub elapsed_s: f64,
    pub cpu_s: f64,
}

fn log_memory(nb_chunk: usize) {
    if log::log_enabled!(log::Level::Debug) {
        if let Some(usage) = memory_stats::memory_stats() {
            log::debug!("chunk {} : physical memory {} Mb", nb_chunk, usage.physical_mem / 1_000_000);
        }
    }
}

/// loads columns and returns them with the selection rows must be read with, so that rows and columns
/// share the same scaled.
fn load_columns(params: &MatrixParams) -> Result<(Vec<NamedSketch>, crate::utils::Selection)> {
    let selection = *params.get_selection();
    println!("Loading sketches from: {:?}", params.get_columns());
    let columns = SketchStore::open(params.get_columns(), &selection)?.load_all()?;
    if columns.is_empty() {
        return Err(SigError::Config(format!(
            "no sketch matching selection in {:?}",
            params.get_columns()
        )));
    }
    let row_selection = match selection.get_scaled() {
        Some(_) => selection,
        None => {
            let scaled = max_scaled(&columns).unwrap_or(0);
            if scaled == 0 {
                selection
            } else {
                selection.with_scaled(scaled)
            }
        }
    };
    let columns = match row_selection.get_scaled() {
        Some(s) => columns
            .iter()
            .map(|c| c.downsample_scaled(s))
            .collect::<Result<Vec<NamedSketch>>>()?,
        None => columns,
    };
    Ok((columns, row_selection))
} // end of load_columns

/// runs a whole pairwise comparison as described by params
pub fn run_matrix(params: &MatrixParams) -> Result<MatrixSummary> {
    let start_t = SystemTime::now();
    let cpu_start = ProcessTime::now();
    //
    let (columns, row_selection) = load_columns(params)?;
    let rows = SketchStore::open(params.get_rows(), &row_selection)?;
    // same files, same selection : every column is a row
    let nb_rows = if params.is_self_comparison() {
        columns.len()
    } else {
        rows.count()?
    };
    println!("'{}' contains {} sketches", params.get_rows().display(), nb_rows);
    if nb_rows == 0 {
        return Err(SigError::Config(format!("no sketch matching selection in {:?}", params.get_rows())));
    }
    let chunk_size = resolve_chunk_size(params.get_chunk_size(), params.get_fraction(), nb_rows)?;
    log::info!("run_matrix nb rows : {}, nb columns : {}, chunk size : {}", nb_rows, columns.len(), chunk_size);
    //
    let pool = WorkerPool::new(params.get_nb_threads())?;
    println!("Computing and writing to '{}'...", params.get_output().display());
    println!("    Using {} cpus in parallel", pool.nb_workers());
    let mut progress = ProgressState::new(nb_rows, chunk_size);
    let metric = params.get_metric();
    let mut scheduler = ChunkScheduler::new(rows.sketches(), chunk_size)?;
    //
    let writer_summary = match params.get_mode() {
        OutputMode::Dense => {
            let names = columns.iter().map(|c| c.name().to_string()).collect();
            let mut writer = ResultWriter::<ResultRow>::new(params.get_output(), Header::Dense(names), metric, chunk_size)?;
            writer.open()?;
            while let Some(chunk) = scheduler.next() {
                let chunk = chunk?;
                println!("\nProcessing chunk of size {}...\n", chunk.len());
                pool.run_ordered(
                    &chunk,
                    |row| compute_dense_row(row, &columns, metric),
                    |_, result| {
                        progress.record(&result.name);
                        writer.push(result)
                    },
                )?;
                log_memory(scheduler.nb_chunks());
            }
            writer.close()?
        }
        OutputMode::Sparse => {
            let mut writer =
                ResultWriter::<SparseEntry>::new(params.get_output(), Header::Sparse(metric), metric, chunk_size)?;
            writer.open()?;
            while let Some(chunk) = scheduler.next() {
                let chunk = chunk?;
                println!("\nProcessing chunk of size {}...\n", chunk.len());
                pool.run_ordered(
                    &chunk,
                    |row| Ok((row.name().to_string(), compute_sparse_row(row, &columns, metric)?)),
                    |_, (name, entries)| {
                        progress.record(&name);
                        writer.extend(entries)
                    },
                )?;
                log_memory(scheduler.nb_chunks());
            }
            writer.close()?
        }
    };
    //
    if progress.get_nb_done() != nb_rows {
        log::warn!("processed {} rows, collection count was {}", progress.get_nb_done(), nb_rows);
    }
    let cpu_s = cpu_start.elapsed().as_secs_f64();
    let elapsed_s = start_t.elapsed().map(|d| d.as_secs_f64()).unwrap_or(0.);
    log::info!("run_matrix : total cpu time(s) {:.2e}, elapsed time(s) {:.2e}", cpu_s, elapsed_s);
    //
    Ok(MatrixSummary {
        nb_rows: progress.get_nb_done(),
        nb_columns: columns.len(),
        nb_chunks: scheduler.nb_chunks(),
        chunk_size,
        writer: writer_summary,
        elapsed_s,
        cpu_s,
    })
} // end of run_matrix

//=========================================================================================

#[cfg(test)]
mod tests {

    use super::*;
    use crate::sketch::scaled_minhash;
    use crate::utils::Moltype;

    fn named(name: &str, hashes: &[u64]) -> NamedSketch {
        NamedSketch::new(name, "", scaled_minhash(31, 1, Moltype::Dna, hashes))
    }

    #[test]
    fn test_mode_flags() {
        assert_eq!(OutputMode::from_flags(true, false).unwrap(), OutputMode::Dense);
        assert_eq!(OutputMode::from_flags(false, true).unwrap(), OutputMode::Sparse);
        assert!(OutputMode::from_flags(true, true).unwrap_err().is_config());
        assert!(OutputMode::from_flags(false, false).unwrap_err().is_config());
    }

    #[test]
    fn test_rows() {
        let columns = vec![named("c1", &[1, 2, 3]), named("c2", &[7, 8]), named("c3", &[3, 9])];
        let row = named("r", &[1, 3, 4]);
        let dense = compute_dense_row(&row, &columns, Metric::Intersect).unwrap();
        assert_eq!(dense.name, "r");
        assert_eq!(dense.values, vec![2., 0., 1.]);
        let sparse = compute_sparse_row(&row, &columns, Metric::Intersect).unwrap();
        assert_eq!(sparse.len(), 2);
        assert_eq!(sparse[0].target, "c1");
        assert_eq!(sparse[1].target, "c3");
        assert!(sparse.iter().all(|e| e.value > 0.));
    }

    #[test]
    fn test_incompatible_row_is_error() {
        let columns = vec![named("c1", &[1, 2, 3])];
        let row = NamedSketch::new("r", "", scaled_minhash(21, 1, Moltype::Dna, &[1]));
        assert!(compute_dense_row(&row, &columns, Metric::Jaccard).is_err());
        assert!(compute_sparse_row(&row, &columns, Metric::Jaccard).is_err());
    }
} // end of mod tests
