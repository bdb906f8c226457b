#![allow(dead_code)]

use std::fs::File;
use std::path::Path;

use sigcompare::sketch::{dump_signatures, scaled_minhash, NamedSketch};
use sigcompare::utils::Moltype;

pub fn log_init_test() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn sketch(name: &str, hashes: impl IntoIterator<Item = u64>) -> NamedSketch {
    sketch_scaled(name, 1, hashes)
}

pub fn sketch_scaled(name: &str, scaled: u64, hashes: impl IntoIterator<Item = u64>) -> NamedSketch {
    let hashes: Vec<u64> = hashes.into_iter().collect();
    NamedSketch::new(name, &format!("{}.fa", name), scaled_minhash(31, scaled, Moltype::Dna, &hashes))
}

/// writes sketches as one sourmash json file holding a list of signatures
pub fn write_sigs(path: &Path, sketches: &[NamedSketch]) {
    let file = File::create(path).unwrap();
    dump_signatures(sketches, file).unwrap();
}

/// csv lines split on commas, header included. Fields in tests never contain commas.
pub fn read_lines(path: &Path) -> Vec<Vec<String>> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| l.split(',').map(|f| f.to_string()).collect())
        .collect()
}
