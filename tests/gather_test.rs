mod common;

use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;

use sigcompare::gather::{GatherDispatcher, GatherTask, TaskOutcome};
use sigcompare::store::load_signature_file;
use sigcompare::utils::{GatherParams, Selection};

use common::{log_init_test, read_lines, sketch, write_sigs};

fn params(data: &Path, db: Option<PathBuf>, outdir: &Path, compress: bool, threads: usize, shared_db: bool, save_query: bool) -> GatherParams {
    GatherParams::new(
        data.to_path_buf(),
        db,
        outdir.to_path_buf(),
        compress,
        threads,
        5,
        shared_db,
        save_query,
        Selection::default(),
    )
    .unwrap()
}

// file name -> content, for every file of a directory
fn snapshot(dir: &Path) -> BTreeMap<String, Vec<u8>> {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| {
            let path = e.unwrap().path();
            (path.file_name().unwrap().to_string_lossy().to_string(), fs::read(&path).unwrap())
        })
        .collect()
}

fn collection(dir: &Path) -> PathBuf {
    let path = dir.join("collection.sig");
    write_sigs(
        &path,
        &[
            sketch("genome A/1", 0..100),
            sketch("genome_B", 40..120),
            sketch("plasmid", 200..230),
            sketch("lonely", 1000..1003),
        ],
    );
    path
}

#[test]
fn intra_gather_then_rerun_skips_everything() {
    log_init_test();
    let dir = tempfile::tempdir().unwrap();
    let data = collection(dir.path());
    let outdir = dir.path().join("out");
    //
    let mut dispatcher = GatherDispatcher::new(params(&data, None, &outdir, false, 2, false, false));
    let summary = dispatcher.run().unwrap();
    assert_eq!(summary.nb_completed, 4);
    assert_eq!(summary.nb_skipped, 0);
    assert!(!summary.has_failures());
    for name in ["genome_A_1", "genome_B", "plasmid", "lonely"] {
        assert!(outdir.join(format!("{}.gather.csv", name)).exists(), "missing output for {}", name);
    }
    // first match of a query is itself
    let lines = read_lines(&outdir.join("genome_A_1.gather.csv"));
    assert_eq!(lines[0][0], "intersect_bp");
    assert_eq!(lines[1][7], "genome A/1");
    assert_eq!(lines[1][10], "genome A/1");
    // below threshold : header only
    assert_eq!(read_lines(&outdir.join("lonely.gather.csv")).len(), 1);
    //
    let before = snapshot(&outdir);
    let mut dispatcher = GatherDispatcher::new(params(&data, None, &outdir, false, 2, false, false));
    let summary = dispatcher.run().unwrap();
    assert_eq!(summary.nb_skipped, 4);
    assert_eq!(summary.nb_completed + summary.nb_failed, 0);
    assert_eq!(snapshot(&outdir), before);
}

#[test]
fn compressed_outputs_and_mixed_restart() {
    log_init_test();
    let dir = tempfile::tempdir().unwrap();
    let data = collection(dir.path());
    let outdir = dir.path().join("out");
    fs::create_dir_all(&outdir).unwrap();
    // a previous uncompressed run already did plasmid
    fs::write(outdir.join("plasmid.gather.csv"), "done before\n").unwrap();
    //
    let mut dispatcher = GatherDispatcher::new(params(&data, None, &outdir, true, 1, false, false));
    let summary = dispatcher.run().unwrap();
    assert_eq!(summary.nb_completed, 3);
    assert_eq!(summary.nb_skipped, 1);
    assert!(!outdir.join("plasmid.gather.csv.gz").exists());
    assert!(!outdir.join("genome_B.gather.csv").exists());
    let mut content = String::new();
    GzDecoder::new(fs::File::open(outdir.join("genome_B.gather.csv.gz")).unwrap())
        .read_to_string(&mut content)
        .unwrap();
    assert!(content.starts_with("intersect_bp,f_orig_query"));
    assert!(content.contains("genome_B"));
}

#[test]
fn lookup_failure_is_local_to_its_task() {
    log_init_test();
    let dir = tempfile::tempdir().unwrap();
    let data = collection(dir.path());
    let outdir = dir.path().join("out");
    fs::create_dir_all(&outdir).unwrap();
    let dispatcher = GatherDispatcher::new(params(&data, None, &outdir, false, 1, false, false));
    let mut tasks = dispatcher.build_tasks().unwrap();
    assert_eq!(tasks.len(), 4);
    tasks.push(GatherTask::new("ghost", "00000000000000000000000000000000", &data, &outdir));
    //
    let outcomes: Vec<TaskOutcome> = tasks.iter().map(|t| dispatcher.run_task(t)).collect();
    match &outcomes[4] {
        TaskOutcome::Failed { name, reason } => {
            assert_eq!(name, "ghost");
            assert!(reason.contains("no signature with md5"));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(outcomes[..4].iter().all(|o| matches!(o, TaskOutcome::Completed { .. })));
    assert!(!outdir.join("ghost.gather.csv").exists());
}

#[test]
fn separate_database_with_shared_load_and_saved_queries() {
    log_init_test();
    let dir = tempfile::tempdir().unwrap();
    let queries = dir.path().join("queries.sig");
    write_sigs(&queries, &[sketch("q1", 0..50), sketch("q2", 100..140)]);
    let db = dir.path().join("refs.sig");
    write_sigs(&db, &[sketch("ref_low", 0..30), sketch("ref_high", 25..60), sketch("ref_far", 100..130)]);
    //
    let isolated = dir.path().join("isolated");
    let summary = GatherDispatcher::new(params(&queries, Some(db.clone()), &isolated, false, 2, false, true)).run().unwrap();
    assert_eq!(summary.nb_completed, 2);
    let shared = dir.path().join("shared");
    let summary = GatherDispatcher::new(params(&queries, Some(db.clone()), &shared, false, 2, true, false)).run().unwrap();
    assert_eq!(summary.nb_completed, 2);
    //
    for name in ["q1.gather.csv", "q2.gather.csv"] {
        assert_eq!(fs::read(isolated.join(name)).unwrap(), fs::read(shared.join(name)).unwrap());
    }
    let q1: Vec<String> = read_lines(&isolated.join("q1.gather.csv"))[1..].iter().map(|l| l[7].clone()).collect();
    assert_eq!(q1, vec!["ref_low", "ref_high"]);
    let q2 = read_lines(&isolated.join("q2.gather.csv"));
    assert_eq!(q2[1][7], "ref_far");
    assert_eq!(q2[1][0], "30");
    // saved query reloads as the same sketch
    let saved = load_signature_file(&isolated.join("q1.query.sig")).unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].name(), "q1");
    assert!(!shared.join("q1.query.sig").exists());
}

#[test]
fn colliding_output_names_keep_the_first_signature_with_many_threads() {
    log_init_test();
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("dups.sig");
    let mut sketches = Vec::new();
    for i in 0..4u64 {
        sketches.push(sketch(&format!("dup x{}", i), (i * 100)..(i * 100 + 20)));
        sketches.push(sketch(&format!("dup/x{}", i), (i * 100 + 50)..(i * 100 + 70)));
    }
    write_sigs(&data, &sketches);
    //
    for run in 0..5 {
        let outdir = dir.path().join(format!("out{}", run));
        let summary = GatherDispatcher::new(params(&data, None, &outdir, false, 4, false, false)).run().unwrap();
        assert_eq!(summary.nb_completed, 4);
        assert_eq!(summary.nb_skipped, 4);
        assert!(!summary.has_failures());
        for i in 0..4 {
            let lines = read_lines(&outdir.join(format!("dup_x{}.gather.csv", i)));
            assert_eq!(lines[1][10], format!("dup x{}", i));
        }
        assert!(fs::read_dir(&outdir).unwrap().all(|e| !e.unwrap().path().to_string_lossy().ends_with(".tmp")));
    }
}
