//! The named sketch handled by the comparison engines.
//!
//! Signature files are sourmash json, decoded by the sourmash crate. A signature may hold several sketches
//! (ksize, molecule), the selection keeps one of them and pairs it with the signature identity.

use std::io::Write;

use sourmash::encodings::HashFunctions;
use sourmash::signature::{Signature, SigsTrait};
use sourmash::sketch::minhash::{max_hash_for_scaled, KmerMinHash};
use sourmash::sketch::Sketch;

use crate::errors::{Result, SigError};
use crate::utils::parameters::{Moltype, Selection};

/// scaled of a FracMinHash sketch, 0 for a num sketch.
/// Rounded, as max_hash is itself a truncated u64::MAX / scaled.
pub fn scaled_of(minhash: &KmerMinHash) -> u64 {
    match minhash.max_hash() {
        0 => 0,
        max_hash => (u64::MAX as f64 / max_hash as f64).round() as u64,
    }
}

/// true for FracMinHash sketches (as opposed to fixed size "num" sketches)
pub fn is_scaled(minhash: &KmerMinHash) -> bool {
    minhash.num() == 0 && minhash.max_hash() != 0
}

/// a scaled sketch with default seed holding hashes below max_hash
pub fn scaled_minhash(ksize: u32, scaled: u64, moltype: Moltype, hashes: &[u64]) -> KmerMinHash {
    let hash_function: HashFunctions = moltype.hash_function();
    let mut minhash = KmerMinHash::builder()
        .num(0u32)
        .ksize(ksize)
        .hash_function(hash_function)
        .max_hash(max_hash_for_scaled(scaled))
        .build();
    for &h in hashes {
        minhash.add_hash(h);
    }
    minhash
} // end of scaled_minhash

/// A sketch together with the identity of the signature it comes from.
/// This is the unit the store yields and the comparison engines handle.
#[derive(Clone, Debug)]
pub struct NamedSketch {
    name: String,
    filename: String,
    md5: String,
    minhash: KmerMinHash,
}

impl NamedSketch {
    pub fn new(name: &str, filename: &str, minhash: KmerMinHash) -> Self {
        NamedSketch {
            name: name.to_string(),
            filename: filename.to_string(),
            md5: minhash.md5sum(),
            minhash,
        }
    }

    /// first sketch of the signature accepted by the selection, downsampled as required
    pub fn select(signature: &Signature, selection: &Selection) -> Option<NamedSketch> {
        signature.sketches().into_iter().find_map(|sketch| match sketch {
            Sketch::MinHash(mh) => selection
                .apply(&mh)
                .map(|mh| NamedSketch::new(&signature.name(), &signature.filename(), mh)),
            _ => {
                log::trace!("signature {} : skipping a sketch that is not a MinHash", signature.name());
                None
            }
        })
    } // end of select

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn md5sum(&self) -> &str {
        &self.md5
    }

    pub fn minhash(&self) -> &KmerMinHash {
        &self.minhash
    }

    /// number of hashes
    pub fn size(&self) -> usize {
        self.minhash.size()
    }

    pub fn scaled(&self) -> u64 {
        scaled_of(&self.minhash)
    }

    pub fn is_scaled(&self) -> bool {
        is_scaled(&self.minhash)
    }

    /// same identity, sketch downsampled to scaled. Scaled can only grow.
    pub fn downsample_scaled(&self, scaled: u64) -> Result<NamedSketch> {
        if !self.is_scaled() {
            return Err(SigError::Config(format!(
                "cannot downsample num sketch {} to scaled {}",
                self.name, scaled
            )));
        }
        let current = self.scaled();
        if scaled < current {
            return Err(SigError::Config(format!(
                "cannot downsample {} with scaled {} to a smaller scaled {}",
                self.name, current, scaled
            )));
        }
        if scaled == current {
            return Ok(self.clone());
        }
        let minhash = self.minhash.downsample_scaled(scaled)?;
        Ok(NamedSketch::new(&self.name, &self.filename, minhash))
    } // end of downsample_scaled

    /// back to a one sketch signature, for dumping
    pub fn to_signature(&self) -> Signature {
        let mut signature = Signature::default();
        signature.set_name(&self.name);
        signature.set_filename(&self.filename);
        signature.push(Sketch::MinHash(self.minhash.clone()));
        signature
    }
} // end of impl NamedSketch

/// dumps sketches as one sourmash json file holding a list of signatures
pub fn dump_signatures<W: Write>(sketches: &[NamedSketch], writer: W) -> Result<()> {
    let signatures: Vec<Signature> = sketches.iter().map(|s| s.to_signature()).collect();
    serde_json::to_writer(writer, &signatures)?;
    Ok(())
}

//=========================================================================================

// end of mod tests
