//! Access to a signature collection.
//!
//! A collection locator is a signature file (json, possibly gzipped), a directory scanned recursively
//! for signature files, or a text file listing signature paths.
//! Sketches are produced lazily, one signature file at a time, so that iterating over a collection
//! never needs more memory than its largest file.

use std::path::{Path, PathBuf};

use crate::errors::{Result, SigError};
use crate::sketch::{NamedSketch, Signature};
use crate::utils::files::{collect_signature_files, is_path_list, read_path_list};
use crate::utils::parameters::Selection;

/// reads all signatures of one file, json possibly compressed
pub fn load_signature_file(path: &Path) -> Result<Vec<Signature>> {
    log::trace!("loading signature file {:?}", path);
    Signature::from_path(path).map_err(|e| SigError::Parse {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
} // end of load_signature_file

/// A signature collection with a selection filter.
pub struct SketchStore {
    locator: PathBuf,
    selection: Selection,
    files: Vec<PathBuf>,
}

impl SketchStore {
    /// resolves the locator to a list of signature files. No signature is loaded yet.
    pub fn open(locator: &Path, selection: &Selection) -> Result<Self> {
        if !locator.exists() {
            return Err(SigError::Config(format!("collection {:?} does not exist", locator)));
        }
        let files = if locator.is_dir() {
            let mut found = Vec::new();
            let nb = collect_signature_files(locator, &mut found)?;
            log::debug!("found {} signature files in directory {:?}", nb, locator);
            found
        } else if is_path_list(locator) {
            read_path_list(locator)?
        } else {
            vec![locator.to_path_buf()]
        };
        log::info!("collection {:?} : {} signature file(s)", locator, files.len());
        Ok(SketchStore {
            locator: locator.to_path_buf(),
            selection: *selection,
            files,
        })
    } // end of open

    pub fn locator(&self) -> &Path {
        &self.locator
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn nb_files(&self) -> usize {
        self.files.len()
    }

    /// lazy, ordered iteration over the selected sketches
    pub fn sketches(&self) -> SketchIter<'_> {
        SketchIter {
            store: self,
            next_file: 0,
            pending: Vec::new().into_iter(),
            failed: false,
            nb_skipped: 0,
        }
    }

    /// number of selected sketches. This needs a pass over the collection.
    pub fn count(&self) -> Result<usize> {
        let mut nb = 0;
        for s in self.sketches() {
            s?;
            nb += 1;
        }
        log::debug!("collection {:?} contains {} selected sketches", self.locator, nb);
        Ok(nb)
    }

    /// loads all selected sketches in memory
    pub fn load_all(&self) -> Result<Vec<NamedSketch>> {
        let sketches = self.sketches().collect::<Result<Vec<NamedSketch>>>()?;
        log::info!("loaded {} sketches from {:?}", sketches.len(), self.locator);
        Ok(sketches)
    }

    /// scans the collection for a sketch with given md5
    pub fn find_by_md5(&self, md5: &str) -> Result<NamedSketch> {
        for s in self.sketches() {
            let s = s?;
            if s.md5sum() == md5 {
                return Ok(s);
            }
        }
        Err(SigError::Lookup {
            md5: md5.to_string(),
            db: self.locator.display().to_string(),
        })
    } // end of find_by_md5
} // end of impl SketchStore

/// looks up a sketch by md5 in an already loaded collection
pub fn find_by_md5<'a>(sketches: &'a [NamedSketch], md5: &str, db: &Path) -> Result<&'a NamedSketch> {
    sketches.iter().find(|s| s.md5sum() == md5).ok_or_else(|| SigError::Lookup {
        md5: md5.to_string(),
        db: db.display().to_string(),
    })
}

/// largest scaled of a set of sketches, the common resolution they can all be downsampled to
pub fn max_scaled(sketches: &[NamedSketch]) -> Option<u64> {
    sketches.iter().map(|s| s.scaled()).max()
}

//==========================================================================================

/// Iterator over the selected sketches of a store. Signature files are loaded one at a time.
/// After an error the iterator ends.
pub struct SketchIter<'a> {
    store: &'a SketchStore,
    next_file: usize,
    pending: std::vec::IntoIter<NamedSketch>,
    failed: bool,
    nb_skipped: usize,
}

impl<'a> SketchIter<'a> {
    /// number of signatures without a sketch matching the selection, so far
    pub fn nb_skipped(&self) -> usize {
        self.nb_skipped
    }
}

impl<'a> Iterator for SketchIter<'a> {
    type Item = Result<NamedSketch>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(s) = self.pending.next() {
                return Some(Ok(s));
            }
            if self.failed || self.next_file >= self.store.files.len() {
                return None;
            }
            let path = &self.store.files[self.next_file];
            self.next_file += 1;
            let signatures = match load_signature_file(path) {
                Ok(sigs) => sigs,
                Err(e) => {
                    log::error!("cannot load signature file {:?} : {}", path, e);
                    self.failed = true;
                    return Some(Err(e));
                }
            };
            let mut selected = Vec::with_capacity(signatures.len());
            for sig in &signatures {
                match NamedSketch::select(sig, &self.store.selection) {
                    Some(s) => selected.push(s),
                    None => {
                        self.nb_skipped += 1;
                        log::warn!("signature {} in {:?} has no sketch matching selection, skipped", sig.name(), path);
                    }
                }
            }
            self.pending = selected.into_iter();
        }
    } // end of next
} // end of impl Iterator for SketchIter

//=========================================================================================

#[cfg(test)]
mod tests {

    use super::*;
    use crate::sketch::{dump_signatures, scaled_minhash};
    use crate::utils::parameters::Moltype;
    use std::fs::{self, File};
    use std::io::Write;

    fn write_sig(path: &Path, sketches: &[NamedSketch]) {
        let file = File::create(path).unwrap();
        if path.extension().and_then(|e| e.to_str()) == Some("gz") {
            let mut enc = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            dump_signatures(sketches, &mut enc).unwrap();
            enc.finish().unwrap().flush().unwrap();
        } else {
            dump_signatures(sketches, file).unwrap();
        }
    }

    fn named(name: &str, ksize: u32, hashes: &[u64]) -> NamedSketch {
        NamedSketch::new(name, "", scaled_minhash(ksize, 1, Moltype::Dna, hashes))
    }

    #[test]
    fn test_directory_collection_order_and_selection() {
        let dir = tempfile::tempdir().unwrap();
        write_sig(&dir.path().join("a.sig"), &[named("a1", 31, &[1, 2]), named("a2", 21, &[3])]);
        write_sig(&dir.path().join("b.sig.gz"), &[named("b1", 31, &[4])]);
        let selection = Selection::new(Some(31), None, None).unwrap();
        let store = SketchStore::open(dir.path(), &selection).unwrap();
        assert_eq!(store.nb_files(), 2);
        let names: Vec<String> = store.sketches().map(|s| s.unwrap().name().to_string()).collect();
        assert_eq!(names, vec!["a1", "b1"]);
        assert_eq!(store.count().unwrap(), 2);
        let mut iter = store.sketches();
        while iter.next().is_some() {}
        assert_eq!(iter.nb_skipped(), 1);
    }

    #[test]
    fn test_find_by_md5() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.sig");
        let target = named("t", 31, &[7, 8, 9]);
        write_sig(&path, &[named("o", 31, &[1]), target.clone()]);
        let store = SketchStore::open(&path, &Selection::default()).unwrap();
        let found = store.find_by_md5(target.md5sum()).unwrap();
        assert_eq!(found.name(), "t");
        let missing = store.find_by_md5("0000");
        assert!(matches!(missing, Err(SigError::Lookup { .. })));
        let all = store.load_all().unwrap();
        assert!(find_by_md5(&all, target.md5sum(), &path).is_ok());
        assert!(find_by_md5(&all, "0000", &path).is_err());
    }

    #[test]
    fn test_bad_file_stops_iteration() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.sig"), "not json").unwrap();
        write_sig(&dir.path().join("b.sig"), &[named("b", 31, &[1])]);
        let store = SketchStore::open(dir.path(), &Selection::default()).unwrap();
        let items: Vec<Result<NamedSketch>> = store.sketches().collect();
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(SigError::Parse { .. })));
        assert!(SketchStore::open(&dir.path().join("none"), &Selection::default()).is_err());
    }
} // end of mod tests
