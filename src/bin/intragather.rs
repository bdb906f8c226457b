//! intragather : gather every signature of a collection against a database.
//!
//! intragather data --outdir dir \[--db db\] \[--gzip\] \[--threads n\] \[--threshold-bp bp\] \[--shared-db\] \[--save-query\]
//!             \[-k ksize\] \[--moltype m\] \[--scaled s\]
//!
//! - data : signature file, directory or text file listing signature files. Each selected signature is a query.
//! - --db : database the queries are gathered against. Default is data itself.
//! - --outdir : one file `<name>.gather.csv` (or `.gather.csv.gz` with --gzip) per query, the name being sanitized.
//!   A query whose output already exists (compressed or not) is skipped, so an interrupted run can be relaunched as is.
//!
//! By default each task reloads the database. --shared-db loads it once and shares it between threads.
//! --save-query dumps each query as `<name>.query.sig` in outdir.
//!
//! The process exits with code 1 if one task failed, after all tasks have been run.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use env_logger::Builder;

use sigcompare::gather::GatherDispatcher;
use sigcompare::utils::{selection_args, GatherParams, Selection};

// install a logger facility
pub fn init_log() -> u64 {
    Builder::from_default_env().init();
    println!("\n ************** initializing logger *****************\n");
    1
}

#[doc(hidden)]
fn parse_gather(matches: &ArgMatches) -> Result<GatherParams, anyhow::Error> {
    log::debug!("in parse_gather");
    //
    let data = PathBuf::from(matches.get_one::<String>("data").context("data is mandatory")?);
    let db = matches.get_one::<String>("db").map(PathBuf::from);
    let outdir = PathBuf::from(matches.get_one::<String>("outdir").context("outdir is mandatory")?);
    let nb_threads = *matches.get_one::<usize>("threads").context("threads has a default value")?;
    let threshold_bp = *matches.get_one::<u64>("threshold_bp").context("threshold-bp has a default value")?;
    let selection = Selection::from_matches(matches)?;
    //
    let params = GatherParams::new(
        data,
        db,
        outdir,
        matches.get_flag("gzip"),
        nb_threads,
        threshold_bp,
        matches.get_flag("shared_db"),
        matches.get_flag("save_query"),
        selection,
    )?;
    Ok(params)
} // end of parse_gather

fn main() -> Result<(), anyhow::Error> {
    let _ = init_log();
    //
    let matches = Command::new("intragather")
        .version("0.1.0")
        .about("Per signature gather of a collection against a database, restartable")
        .arg(
            Arg::new("data")
                .help("signature collection : file, directory or list of signature files")
                .required(true)
                .value_parser(clap::value_parser!(String)),
        )
        .arg(
            Arg::new("db")
                .long("db")
                .help("database to gather against, default is data")
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(String)),
        )
        .arg(
            Arg::new("outdir")
                .long("outdir")
                .value_name("DIR")
                .help("directory for output csv files")
                .required(true)
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(String)),
        )
        .arg(Arg::new("gzip").long("gzip").help("gzip outputs").action(ArgAction::SetTrue))
        .arg(
            Arg::new("threads")
                .long("threads")
                .help("number of threads for parallel processing")
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(usize))
                .default_value("1"),
        )
        .arg(
            Arg::new("threshold_bp")
                .long("threshold-bp")
                .help("minimum overlap in bp for a database entry to be reported")
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(u64))
                .default_value("50000"),
        )
        .arg(
            Arg::new("shared_db")
                .long("shared-db")
                .help("load the database once and share it between threads")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("save_query")
                .long("save-query")
                .help("dump each query signature in outdir")
                .action(ArgAction::SetTrue),
        )
        .args(selection_args())
        .get_matches();
    //
    let params = parse_gather(&matches)?;
    log::info!("intragather parameters : {:?}", params);
    std::fs::create_dir_all(params.get_outdir()).with_context(|| format!("cannot create {:?}", params.get_outdir()))?;
    params
        .dump_json(&params.get_outdir().join("intragather.params.json"))
        .context("could not dump run parameters")?;
    //
    let mut dispatcher = GatherDispatcher::new(params);
    let summary = dispatcher.run().context("gather dispatch failed")?;
    println!(
        "\n done : {} completed, {} skipped, {} failed",
        summary.nb_completed, summary.nb_skipped, summary.nb_failed
    );
    if summary.has_failures() {
        log::error!("{} gather task(s) failed", summary.nb_failed);
        std::process::exit(1);
    }
    //
    Ok(())
} // end of main
