//! structures related to processing parameters
//!
//! All parameters are validated once, at construction, and are then passed by reference (or cloned)
//! to every task. They are json serialized so that a run can be documented next to its outputs.

use std::fs::OpenOptions;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use std::str::FromStr;

use clap::{Arg, ArgAction, ArgMatches};
use serde::{Deserialize, Serialize};
use serde_json::to_writer;
use sourmash::encodings::HashFunctions;
use sourmash::signature::SigsTrait;
use strum_macros::{Display, EnumString};

use crate::errors::{Result, SigError};
use crate::matrix::OutputMode;
use crate::sketch::{is_scaled, scaled_of, KmerMinHash, Metric};

/// molecule type of a sketch, as written in the `molecule` field of sourmash signatures
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
pub enum Moltype {
    #[strum(to_string = "DNA", serialize = "dna")]
    Dna,
    #[strum(to_string = "protein", serialize = "PROTEIN")]
    Protein,
    #[strum(to_string = "dayhoff", serialize = "DAYHOFF")]
    Dayhoff,
    #[strum(to_string = "hp", serialize = "HP")]
    Hp,
}

impl Moltype {
    /// the sourmash hash function of sketches of this molecule type
    pub fn hash_function(&self) -> HashFunctions {
        match self {
            Moltype::Dna => HashFunctions::Murmur64Dna,
            Moltype::Protein => HashFunctions::Murmur64Protein,
            Moltype::Dayhoff => HashFunctions::Murmur64Dayhoff,
            Moltype::Hp => HashFunctions::Murmur64Hp,
        }
    }

    pub fn matches(&self, minhash: &KmerMinHash) -> bool {
        minhash.hash_function() == self.hash_function()
    }
}

//===========================================================

/// a structure to filter the sketches we keep from a signature collection.
/// Sketches must match ksize and molecule, and have a scaled value not larger than the requested scaled
/// (they are then downsampled to it).
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    ksize: Option<u32>,
    moltype: Option<Moltype>,
    scaled: Option<u64>,
}

impl Selection {
    pub fn new(ksize: Option<u32>, moltype: Option<Moltype>, scaled: Option<u64>) -> Result<Self> {
        if ksize == Some(0) {
            return Err(SigError::Config("ksize must be positive".to_string()));
        }
        if scaled == Some(0) {
            return Err(SigError::Config("scaled must be positive".to_string()));
        }
        Ok(Selection { ksize, moltype, scaled })
    } // end of new

    pub fn get_ksize(&self) -> Option<u32> {
        self.ksize
    }

    pub fn get_moltype(&self) -> Option<Moltype> {
        self.moltype
    }

    pub fn get_scaled(&self) -> Option<u64> {
        self.scaled
    }

    /// same selection with another scaled value
    pub fn with_scaled(&self, scaled: u64) -> Self {
        Selection { scaled: Some(scaled), ..*self }
    }

    /// builds the selection from the options declared by [selection_args]
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let ksize = matches.get_one::<u32>("ksize").copied();
        let moltype = match matches.get_one::<String>("moltype") {
            Some(m) => Some(Moltype::from_str(m).map_err(|_| SigError::Config(format!("unknown moltype {}", m)))?),
            None => None,
        };
        let scaled = matches.get_one::<u64>("scaled").copied();
        Selection::new(ksize, moltype, scaled)
    } // end of from_matches

    /// returns true if the sketch can be kept, possibly after downsampling
    pub fn accepts(&self, minhash: &KmerMinHash) -> bool {
        if let Some(k) = self.ksize {
            if minhash.ksize() as u64 != k as u64 {
                return false;
            }
        }
        if let Some(m) = self.moltype {
            if !m.matches(minhash) {
                return false;
            }
        }
        if let Some(s) = self.scaled {
            if !is_scaled(minhash) || scaled_of(minhash) > s {
                return false;
            }
        }
        true
    } // end of accepts

    /// returns the sketch downsampled to the selection scaled, None if not accepted
    pub fn apply(&self, minhash: &KmerMinHash) -> Option<KmerMinHash> {
        if !self.accepts(minhash) {
            return None;
        }
        match self.scaled {
            Some(s) if s != scaled_of(minhash) => match minhash.downsample_scaled(s) {
                Ok(mh) => Some(mh),
                Err(e) => {
                    log::warn!("cannot downsample sketch to scaled {} : {}", s, e);
                    None
                }
            },
            _ => Some(minhash.clone()),
        }
    } // end of apply
} // end of impl Selection

/// the ksize, moltype and scaled options read by [Selection::from_matches]
pub fn selection_args() -> Vec<Arg> {
    vec![
        Arg::new("ksize")
            .short('k')
            .long("ksize")
            .help("select sketches with this kmer size")
            .action(ArgAction::Set)
            .value_parser(clap::value_parser!(u32)),
        Arg::new("moltype")
            .long("moltype")
            .help("select sketches of this molecule type : DNA, protein, dayhoff or hp")
            .action(ArgAction::Set)
            .value_parser(clap::value_parser!(String)),
        Arg::new("scaled")
            .long("scaled")
            .help("downsample sketches to this scaled")
            .action(ArgAction::Set)
            .value_parser(clap::value_parser!(u64)),
    ]
} // end of selection_args

//===========================================================

fn dump_params_json<T: Serialize>(params: &T, filepath: &Path) -> Result<()> {
    log::info!("dumping parameters in json file : {:?}", filepath);
    //
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(filepath)
        .map_err(|e| {
            log::error!("parameters dump : could not open file {:?}", filepath.as_os_str());
            SigError::Io(e)
        })?;
    let mut writer = BufWriter::new(file);
    to_writer(&mut writer, params)?;
    Ok(())
} // end of dump_params_json

fn reload_params_json<T: serde::de::DeserializeOwned>(filepath: &Path) -> Result<T> {
    log::info!("reloading parameters from json file : {:?}", filepath);
    let file = OpenOptions::new().read(true).open(filepath).map_err(|e| {
        log::error!("parameters reload : could not open file {:?}", filepath.as_os_str());
        SigError::Io(e)
    })?;
    let reader = BufReader::new(file);
    let params: T = serde_json::from_reader(reader)?;
    Ok(params)
} // end of reload_params_json

//===========================================================

/// Gathers parameters of a pairwise comparison run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatrixParams {
    /// collection giving the rows, iterated lazily
    rows: PathBuf,
    /// collection giving the columns, loaded once
    columns: PathBuf,
    /// csv destination
    output: PathBuf,
    mode: OutputMode,
    /// explicit chunk size, if not given it is derived from fraction
    chunk_size: Option<usize>,
    /// fraction of the row collection processed at a time
    fraction: f64,
    nb_threads: usize,
    selection: Selection,
    metric: Metric,
} // end of MatrixParams

impl MatrixParams {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rows: PathBuf,
        columns: PathBuf,
        output: PathBuf,
        mode: OutputMode,
        chunk_size: Option<i64>,
        fraction: f64,
        nb_threads: usize,
        selection: Selection,
        metric: Metric,
    ) -> Result<Self> {
        let chunk_size = match chunk_size {
            Some(c) if c <= 0 => {
                return Err(SigError::Config(format!("chunk size must be >= 1, got {}", c)));
            }
            Some(c) => Some(c as usize),
            None => None,
        };
        if !fraction.is_finite() || fraction <= 0. {
            return Err(SigError::Config(format!("fraction must be a positive number, got {}", fraction)));
        }
        if nb_threads == 0 {
            return Err(SigError::Config("number of threads must be >= 1".to_string()));
        }
        Ok(MatrixParams {
            rows,
            columns,
            output,
            mode,
            chunk_size,
            fraction,
            nb_threads,
            selection,
            metric,
        })
    } // end of new

    pub fn get_rows(&self) -> &Path {
        &self.rows
    }

    pub fn get_columns(&self) -> &Path {
        &self.columns
    }

    pub fn get_output(&self) -> &Path {
        &self.output
    }

    pub fn get_mode(&self) -> OutputMode {
        self.mode
    }

    pub fn get_chunk_size(&self) -> Option<usize> {
        self.chunk_size
    }

    pub fn get_fraction(&self) -> f64 {
        self.fraction
    }

    pub fn get_nb_threads(&self) -> usize {
        self.nb_threads
    }

    pub fn get_selection(&self) -> &Selection {
        &self.selection
    }

    pub fn get_metric(&self) -> Metric {
        self.metric
    }

    /// true when rows and columns come from the same collection, columns are then not loaded twice
    pub fn is_self_comparison(&self) -> bool {
        self.rows == self.columns
    }

    pub fn dump_json(&self, filepath: &Path) -> Result<()> {
        dump_params_json(self, filepath)
    }

    pub fn reload_json(filepath: &Path) -> Result<Self> {
        reload_params_json(filepath)
    }
} // end of impl MatrixParams

//=====================================================================================

/// default minimum overlap, in base pairs, for a database entry to be reported by gather
pub const DEFAULT_THRESHOLD_BP: u64 = 50_000;

/// Parameters of a gather dispatch run. One value is built from the command line and passed to every task.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatherParams {
    /// collection whose every signature is gathered
    data: PathBuf,
    /// reference database each query is gathered against
    db: PathBuf,
    outdir: PathBuf,
    /// write .gather.csv.gz instead of .gather.csv
    compress: bool,
    nb_threads: usize,
    threshold_bp: u64,
    /// load the database once and share it read only between workers instead of reloading it in each task
    shared_db: bool,
    /// dump the re-located query signature next to its gather output
    save_query: bool,
    selection: Selection,
} // end of GatherParams

impl GatherParams {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        data: PathBuf,
        db: Option<PathBuf>,
        outdir: PathBuf,
        compress: bool,
        nb_threads: usize,
        threshold_bp: u64,
        shared_db: bool,
        save_query: bool,
        selection: Selection,
    ) -> Result<Self> {
        if nb_threads == 0 {
            return Err(SigError::Config("number of threads must be >= 1".to_string()));
        }
        let db = db.unwrap_or_else(|| data.clone());
        Ok(GatherParams {
            data,
            db,
            outdir,
            compress,
            nb_threads,
            threshold_bp,
            shared_db,
            save_query,
            selection,
        })
    } // end of new

    pub fn get_data(&self) -> &Path {
        &self.data
    }

    pub fn get_db(&self) -> &Path {
        &self.db
    }

    pub fn get_outdir(&self) -> &Path {
        &self.outdir
    }

    pub fn get_compress(&self) -> bool {
        self.compress
    }

    pub fn get_nb_threads(&self) -> usize {
        self.nb_threads
    }

    pub fn get_threshold_bp(&self) -> u64 {
        self.threshold_bp
    }

    pub fn get_shared_db(&self) -> bool {
        self.shared_db
    }

    pub fn get_save_query(&self) -> bool {
        self.save_query
    }

    pub fn get_selection(&self) -> &Selection {
        &self.selection
    }

    /// true when queries are gathered against their own collection
    pub fn is_intra(&self) -> bool {
        self.data == self.db
    }

    pub fn dump_json(&self, filepath: &Path) -> Result<()> {
        dump_params_json(self, filepath)
    }

    pub fn reload_json(filepath: &Path) -> Result<Self> {
        reload_params_json(filepath)
    }
} // end of impl GatherParams

//=========================================================================================

// end of mod tests
