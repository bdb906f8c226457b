//! sketches (sourmash FracMinHash) as handled by the engines, and the comparison kernel

pub mod compare;
pub mod signature;

pub use compare::{intersection_size, similarity, union_size, Metric};
pub use signature::{dump_signatures, is_scaled, scaled_minhash, scaled_of, NamedSketch};

pub use sourmash::signature::Signature;
pub use sourmash::sketch::minhash::KmerMinHash;
