//! contains utils used in parsing dirs and parameters

pub mod files;
pub mod parameters;

pub use files::*;
pub use parameters::*;
