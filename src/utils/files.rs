//! This file contains directory exploration, signature file selection and output path derivation

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

/// suffix of per signature gather outputs
pub const GATHER_SUFFIX: &str = ".gather.csv";

/// returns a file system safe identifier: alphanumeric characters and `-._` are kept, anything else becomes `_`.
/// All output paths derived from a signature name must go through this function so that
/// skipping of already processed signatures is consistent across runs.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || "-._".contains(c) {
                c
            } else {
                '_'
            }
        })
        .collect()
} // end of sanitize_name

/// returns the plain and compressed candidate gather outputs for a signature name
pub fn gather_output_paths(outdir: &Path, name: &str) -> (PathBuf, PathBuf) {
    let plain = outdir.join(format!("{}{}", sanitize_name(name), GATHER_SUFFIX));
    let mut gz = plain.clone().into_os_string();
    gz.push(".gz");
    (plain, PathBuf::from(gz))
} // end of gather_output_paths

/// path where a query signature is saved before its gather
pub fn query_sig_path(outdir: &Path, name: &str) -> PathBuf {
    outdir.join(format!("{}.query.sig", sanitize_name(name)))
}

// returns true if file is a signature file (possibly gzipped)
pub fn is_signature_file(path: &Path) -> bool {
    let filename = match path.file_name().and_then(|f| f.to_str()) {
        Some(f) => f,
        None => return false,
    };
    [".sig", ".sig.gz", ".json", ".json.gz"]
        .iter()
        .any(|suffix| filename.ends_with(suffix))
} // end of is_signature_file

/// returns true if file is a text file listing signature paths, one per line
pub fn is_path_list(path: &Path) -> bool {
    matches!(path.extension().and_then(|e| e.to_str()), Some("txt") | Some("pathlist"))
}

/// scan directory recursively, collecting signature files.
/// Entries are sorted in each directory so that collections are always iterated in the same order.
pub fn collect_signature_files(dir: &Path, found: &mut Vec<PathBuf>) -> io::Result<usize> {
    let mut nb_found = 0;
    //
    let mut entries = fs::read_dir(dir)?
        .map(|e| e.map(|e| e.path()))
        .collect::<io::Result<Vec<PathBuf>>>()?;
    entries.sort();
    for path in entries {
        if path.is_dir() {
            nb_found += collect_signature_files(&path, found)?;
        } else if is_signature_file(&path) {
            log::trace!("collect_signature_files found {:?}", path);
            found.push(path);
            nb_found += 1;
        }
    }
    //
    Ok(nb_found)
} // end of collect_signature_files

/// Reads a list of file paths (one per line) from a text file.
/// Relative paths are taken relative to the list location.
pub fn read_path_list(filepath: &Path) -> io::Result<Vec<PathBuf>> {
    let reader = BufReader::new(File::open(filepath)?);
    let base = filepath.parent().unwrap_or_else(|| Path::new(""));
    let mut paths = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let p = PathBuf::from(line);
        if p.is_absolute() {
            paths.push(p);
        } else {
            paths.push(base.join(p));
        }
    }
    Ok(paths)
} // end of read_path_list

//=========================================================================================

// end of mod tests
