//! sigmatrix : pairwise comparison of two signature collections.
//!
//! sigmatrix sketch1 sketch2 -o output (--dense | --sparse) \[--chunk-size n\] \[-f fraction\] \[-c cpus\]
//!           \[-k ksize\] \[--moltype m\] \[--scaled s\] \[--metric intersect|intersect_bp|jaccard\]
//!
//! - sketch1 : row collection, a signature file (json, possibly gzipped), a directory or a text file listing signature files.
//!   It is read lazily, fraction (or chunk-size) of it at a time.
//! - sketch2 : column collection, loaded once. Can be the same as sketch1.
//!
//! --dense writes one line per row sketch with one value per column sketch, --sparse writes only
//! non zero (source,target,value) triplets. One of the two is required.
//!
//! --chunk-size : number of row sketches processed at a time. If not given, it is fraction * number of row sketches
//!
//! -c : number of threads. With 1 thread computations are done sequentially. Default is the number of cpus.
//!
//! Parameters of the run are dumped in sigmatrix.params.json in the directory of the output.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use clap::{Arg, ArgAction, ArgGroup, ArgMatches, Command};
use env_logger::Builder;

use sigcompare::matrix::{run_matrix, OutputMode};
use sigcompare::sketch::Metric;
use sigcompare::utils::{selection_args, MatrixParams, Selection};

// install a logger facility
pub fn init_log() -> u64 {
    Builder::from_default_env().init();
    println!("\n ************** initializing logger *****************\n");
    1
}

#[doc(hidden)]
fn parse_matrix(matches: &ArgMatches) -> Result<MatrixParams, anyhow::Error> {
    log::debug!("in parse_matrix");
    //
    let rows = PathBuf::from(matches.get_one::<String>("sketch1").context("sketch1 is mandatory")?);
    let columns = PathBuf::from(matches.get_one::<String>("sketch2").context("sketch2 is mandatory")?);
    let output = PathBuf::from(matches.get_one::<String>("output").context("output is mandatory")?);
    let mode = OutputMode::from_flags(matches.get_flag("dense"), matches.get_flag("sparse"))?;
    let chunk_size = matches.get_one::<i64>("chunk_size").copied();
    let fraction = *matches.get_one::<f64>("fraction").context("fraction has a default value")?;
    let nb_cpus = num_cpus::get();
    let nb_threads = matches.get_one::<usize>("cpus").copied().unwrap_or(nb_cpus);
    if nb_threads > nb_cpus {
        log::warn!("asked for {} threads, machine has {} cpus", nb_threads, nb_cpus);
    }
    let metric_str = matches.get_one::<String>("metric").context("metric has a default value")?;
    let metric = Metric::from_str(metric_str).map_err(|_| anyhow::anyhow!("unknown metric {}", metric_str))?;
    let selection = Selection::from_matches(matches)?;
    //
    let params = MatrixParams::new(rows, columns, output, mode, chunk_size, fraction, nb_threads, selection, metric)?;
    Ok(params)
} // end of parse_matrix

fn main() -> Result<(), anyhow::Error> {
    let _ = init_log();
    //
    let matches = Command::new("sigmatrix")
        .version("0.1.0")
        .about("Chunked parallel pairwise comparison of sourmash signature collections")
        .arg(
            Arg::new("sketch1")
                .help("row collection : signature file, directory or list of signature files")
                .required(true)
                .value_parser(clap::value_parser!(String)),
        )
        .arg(
            Arg::new("sketch2")
                .help("column collection, loaded once")
                .required(true)
                .value_parser(clap::value_parser!(String)),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("OUTPUT")
                .help("csv file to write")
                .required(true)
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(String)),
        )
        .arg(Arg::new("dense").long("dense").help("dense output file").action(ArgAction::SetTrue))
        .arg(Arg::new("sparse").long("sparse").help("sparse output file").action(ArgAction::SetTrue))
        .group(ArgGroup::new("mode").args(["dense", "sparse"]).required(true).multiple(false))
        .arg(
            Arg::new("chunk_size")
                .long("chunk-size")
                .value_name("N")
                .help("number of row sketches processed at a time, overrides fraction")
                .action(ArgAction::Set)
                .allow_negative_numbers(true)
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("fraction")
                .short('f')
                .long("fraction")
                .help("fraction of the row sketches to process at a time")
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(f64))
                .default_value("1.0"),
        )
        .arg(
            Arg::new("cpus")
                .short('c')
                .long("cpus")
                .help("number of threads, default is the number of cpus")
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("metric")
                .long("metric")
                .help("intersect, intersect_bp or jaccard")
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(String))
                .default_value("intersect_bp"),
        )
        .args(selection_args())
        .get_matches();
    //
    let params = parse_matrix(&matches)?;
    log::info!("sigmatrix parameters : {:?}", params);
    //
    let outdir = params.get_output().parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    params
        .dump_json(&outdir.join("sigmatrix.params.json"))
        .context("could not dump run parameters")?;
    //
    let summary = run_matrix(&params).with_context(|| format!("comparison writing {:?} failed", params.get_output()))?;
    println!(
        "\n done : {} rows x {} columns, {} chunks of size {}, {} records written in {} flushes",
        summary.nb_rows, summary.nb_columns, summary.nb_chunks, summary.chunk_size, summary.writer.nb_records, summary.writer.nb_flushes
    );
    println!(" elapsed time(s) {:.2e}, cpu time(s) {:.2e}", summary.elapsed_s, summary.cpu_s);
    //
    Ok(())
} // end of main
