//! Greedy decomposition of a query sketch into database matches.
//!
//! Database entries whose overlap with the query reaches the threshold are prefetched.
//! Then, repeatedly, the candidate sharing the most hashes with what remains of the query is reported
//! and its hashes are removed from the query, until no candidate reaches the threshold.
//! Ties are broken on md5 so that results do not depend on database order.
//!
//! The per sketch dispatch of gather runs over a whole collection is in [dispatch].

pub mod dispatch;

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use sourmash::signature::SigsTrait;

use crate::errors::{Result, SigError};
use crate::sketch::{KmerMinHash, NamedSketch};

pub use dispatch::{DispatchSummary, GatherDispatcher, GatherTask, TaskOutcome};

/// csv header of gather outputs, in field order of [GatherResult]
pub const GATHER_COLUMNS: [&str; 12] = [
    "intersect_bp",
    "f_orig_query",
    "f_match",
    "f_unique_to_query",
    "unique_intersect_bp",
    "remaining_bp",
    "gather_result_rank",
    "name",
    "md5",
    "filename",
    "query_name",
    "query_md5",
];

/// one reported match
#[derive(Clone, Debug, Serialize)]
pub struct GatherResult {
    /// overlap with the whole query, in bp
    pub intersect_bp: u64,
    /// fraction of the query covered by the match
    pub f_orig_query: f64,
    /// fraction of the match covered by the query
    pub f_match: f64,
    /// fraction of the query covered by this match and no previous one
    pub f_unique_to_query: f64,
    pub unique_intersect_bp: u64,
    /// query bp not yet assigned after this match
    pub remaining_bp: u64,
    pub gather_result_rank: usize,
    pub name: String,
    pub md5: String,
    pub filename: String,
    pub query_name: String,
    pub query_md5: String,
}

// shared hashes of two sketches at the same scaled
fn overlap(a: &KmerMinHash, b: &KmerMinHash) -> Result<u64> {
    Ok(a.count_common(b, false)?)
}

/// true when an overlap of nb_hashes at scaled reaches threshold_bp. A zero overlap never does.
fn above_threshold(nb_hashes: u64, scaled: u64, threshold_bp: u64) -> bool {
    nb_hashes > 0 && nb_hashes * scaled >= threshold_bp
}

/// database entries sharing at least threshold_bp with the query, each compared at the coarser
/// of the two scaled values
pub fn prefetch<'a>(query: &NamedSketch, db: &'a [NamedSketch], threshold_bp: u64) -> Result<Vec<&'a NamedSketch>> {
    let mut found = Vec::new();
    for m in db {
        if let Some(reason) = compatible_ignoring_scaled(query, m) {
            log::debug!("prefetch : skipping {} : {}", m.name(), reason);
            continue;
        }
        let scaled = query.scaled().max(m.scaled()).max(1);
        let q = query.downsample_scaled(scaled)?;
        let md = m.downsample_scaled(scaled)?;
        if above_threshold(overlap(q.minhash(), md.minhash())?, scaled, threshold_bp) {
            found.push(m);
        }
    }
    log::debug!("prefetch {} : {} candidates out of {}", query.name(), found.len(), db.len());
    Ok(found)
} // end of prefetch

// sketches of different scaled are comparable after downsampling, everything else must match
fn compatible_ignoring_scaled(a: &NamedSketch, b: &NamedSketch) -> Option<String> {
    if !a.is_scaled() || !b.is_scaled() {
        return Some("gather needs scaled sketches".to_string());
    }
    let scaled = a.scaled().max(b.scaled());
    match (a.downsample_scaled(scaled), b.downsample_scaled(scaled)) {
        (Ok(x), Ok(y)) => x.minhash().check_compatible(y.minhash()).err().map(|e| e.to_string()),
        _ => Some("cannot downsample".to_string()),
    }
}

/// runs gather of query against db. An empty result is a normal outcome.
/// Every reported match covers at least threshold_bp of the query not covered by previous matches.
pub fn gather(query: &NamedSketch, db: &[NamedSketch], threshold_bp: u64) -> Result<Vec<GatherResult>> {
    if !query.is_scaled() {
        return Err(SigError::Config(format!("query {} is not a scaled sketch", query.name())));
    }
    let candidates = prefetch(query, db, threshold_bp)?;
    if candidates.is_empty() {
        log::info!("gather {} : no database entry above threshold {} bp", query.name(), threshold_bp);
        return Ok(Vec::new());
    }
    // every sketch at the common resolution
    let scaled = candidates
        .iter()
        .map(|c| c.scaled())
        .chain(std::iter::once(query.scaled()))
        .max()
        .unwrap_or(1)
        .max(1);
    let query_ds = query.downsample_scaled(scaled)?;
    let mut candidates = candidates
        .into_iter()
        .map(|c| c.downsample_scaled(scaled))
        .collect::<Result<Vec<NamedSketch>>>()?;
    let orig_query = query_ds.minhash();
    let orig_len = orig_query.size();
    if orig_len == 0 {
        return Ok(Vec::new());
    }
    let mut remaining = orig_query.clone();
    let mut results = Vec::new();
    //
    loop {
        let mut overlaps = Vec::with_capacity(candidates.len());
        for (i, c) in candidates.iter().enumerate() {
            let unique = overlap(&remaining, c.minhash())?;
            if above_threshold(unique, scaled, threshold_bp) {
                overlaps.push((i, unique));
            }
        }
        // best overlap with what remains, smallest md5 on ties
        let best = overlaps.into_iter().max_by(|a, b| {
            a.1.cmp(&b.1)
                .then_with(|| candidates[b.0].md5sum().cmp(candidates[a.0].md5sum()))
        });
        let (rank_in_candidates, unique) = match best {
            Some(b) => b,
            None => break,
        };
        let best = candidates.swap_remove(rank_in_candidates);
        let intersect = overlap(orig_query, best.minhash())?;
        for h in best.minhash().mins() {
            remaining.remove_hash(h);
        }
        let nb_remaining = remaining.size() as u64;
        let result = GatherResult {
            intersect_bp: intersect * scaled,
            f_orig_query: intersect as f64 / orig_len as f64,
            f_match: intersect as f64 / best.size().max(1) as f64,
            f_unique_to_query: unique as f64 / orig_len as f64,
            unique_intersect_bp: unique * scaled,
            remaining_bp: nb_remaining * scaled,
            gather_result_rank: results.len(),
            name: best.name().to_string(),
            md5: best.md5sum().to_string(),
            filename: best.filename().to_string(),
            query_name: query.name().to_string(),
            query_md5: query.md5sum().to_string(),
        };
        log::debug!(
            "gather {} rank {} : {} unique bp {}",
            query.name(),
            result.gather_result_rank,
            result.name,
            result.unique_intersect_bp
        );
        results.push(result);
        if nb_remaining == 0 {
            break;
        }
    }
    log::info!(
        "gather {} : {} matches, {:.3} of query unassigned",
        query.name(),
        results.len(),
        remaining.size() as f64 / orig_len as f64
    );
    Ok(results)
} // end of gather

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

fn write_records<W: Write>(writer: W, results: &[GatherResult]) -> Result<W> {
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    wtr.write_record(GATHER_COLUMNS)?;
    for r in results {
        wtr.serialize(r)?;
    }
    wtr.into_inner().map_err(|e| SigError::Io(e.into_error()))
}

/// Writes gather results as csv, gzipped if compress is set. The header is written even with no result.
/// Data goes to a temporary sibling that is renamed at the end, so path only exists once complete.
pub fn write_gather_csv(path: &Path, results: &[GatherResult], compress: bool) -> Result<()> {
    let tmp = tmp_path(path);
    let file = BufWriter::new(File::create(&tmp)?);
    let res = if compress {
        write_records(GzEncoder::new(file, Compression::default()), results)
            .and_then(|enc| enc.finish().map_err(SigError::Io))
            .and_then(|mut f| f.flush().map_err(SigError::Io))
    } else {
        write_records(file, results).and_then(|mut f| f.flush().map_err(SigError::Io))
    };
    if let Err(e) = res {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, path)?;
    log::debug!("wrote {} gather results in {:?}", results.len(), path);
    Ok(())
} // end of write_gather_csv

//=========================================================================================

#[cfg(test)]
mod tests {

    use super::*;
    use crate::sketch::scaled_minhash;
    use crate::utils::parameters::Moltype;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn named_scaled(name: &str, scaled: u64, hashes: &[u64]) -> NamedSketch {
        NamedSketch::new(name, &format!("{}.sig", name), scaled_minhash(31, scaled, Moltype::Dna, hashes))
    }

    fn named(name: &str, hashes: &[u64]) -> NamedSketch {
        named_scaled(name, 1, hashes)
    }

    fn range(a: u64, b: u64) -> Vec<u64> {
        (a..b).collect()
    }

    #[test]
    fn test_threshold_applies_to_unique_overlap_in_bp() {
        // 6 query hashes at scaled 30000, threshold 50000 bp : a match needs 2 unique hashes
        let query = named_scaled("q", 30000, &range(1, 7));
        let db = vec![named_scaled("big", 30000, &range(1, 5)), named_scaled("small", 30000, &[4, 5])];
        assert_eq!(prefetch(&query, &db, 50000).unwrap().len(), 2);
        let results = gather(&query, &db, 50000).unwrap();
        let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["big"]);
        assert_eq!(results[0].unique_intersect_bp, 120000);
        assert!(results.iter().all(|r| r.unique_intersect_bp >= 50000));
        // lowering the threshold to one hash lets small in
        let results = gather(&query, &db, 30000).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].name, "small");
        assert_eq!(results[1].unique_intersect_bp, 30000);
    }

    #[test]
    fn test_mixed_scaled_candidates() {
        let query = named_scaled("q", 10, &range(1, 41));
        let coarse = named_scaled("coarse", 20, &range(1, 21));
        let results = gather(&query, &[coarse], 1).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].unique_intersect_bp, 20 * 20);
    }

    #[test]
    fn test_greedy_decomposition() {
        let query = named("q", &range(0, 100));
        let db = vec![
            named("big", &range(0, 60)),
            named("overlapping", &range(50, 90)),
            named("tiny", &range(95, 97)),
            named("unrelated", &range(1000, 1100)),
        ];
        let results = gather(&query, &db, 5).unwrap();
        let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["big", "overlapping"]);
        assert_eq!(results[0].intersect_bp, 60);
        assert_eq!(results[0].unique_intersect_bp, 60);
        assert_eq!(results[0].remaining_bp, 40);
        assert_eq!(results[1].intersect_bp, 40);
        assert_eq!(results[1].unique_intersect_bp, 30);
        assert_eq!(results[1].remaining_bp, 10);
        assert!((results[1].f_orig_query - 0.4).abs() < 1e-12);
        assert!((results[1].f_unique_to_query - 0.3).abs() < 1e-12);
        assert!((results[1].f_match - 1.).abs() < 1e-12);
        assert_eq!(results[1].gather_result_rank, 1);
        assert_eq!(results[1].query_name, "q");
    }

    #[test]
    fn test_query_in_db_matches_itself() {
        let query = named("q", &range(0, 20));
        let db = vec![named("other", &range(0, 10)), query.clone()];
        let results = gather(&query, &db, 1).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].md5, query.md5sum());
        assert_eq!(results[0].remaining_bp, 0);
    }

    #[test]
    fn test_no_match() {
        let query = named("q", &range(0, 20));
        let db = vec![named("far", &range(100, 120))];
        assert!(gather(&query, &db, 1).unwrap().is_empty());
    }

    #[test]
    fn test_write_csv() {
        let dir = tempfile::tempdir().unwrap();
        let query = named("q", &range(0, 10));
        let results = gather(&query, &[query.clone()], 1).unwrap();
        let plain = dir.path().join("q.gather.csv");
        write_gather_csv(&plain, &results, false).unwrap();
        let content = fs::read_to_string(&plain).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next().unwrap(), GATHER_COLUMNS.join(","));
        assert!(lines.next().unwrap().starts_with("10,1.0,1.0,1.0,10,0,0,q,"));
        assert!(!tmp_path(&plain).exists());
        //
        let gz = dir.path().join("q.gather.csv.gz");
        write_gather_csv(&gz, &[], true).unwrap();
        let mut decoded = String::new();
        GzDecoder::new(File::open(&gz).unwrap()).read_to_string(&mut decoded).unwrap();
        assert_eq!(decoded, format!("{}\n", GATHER_COLUMNS.join(",")));
    }
} // end of mod tests
