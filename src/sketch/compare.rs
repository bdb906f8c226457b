//! stateless comparison kernel between two sketches.
//!
//! All functions are pure and can be called from any worker thread.
//! Comparing sketches with different ksize, molecule, seed or scaled is an error, never a number.

use serde::{Deserialize, Serialize};
use sourmash::signature::SigsTrait;
use strum_macros::{Display, EnumString};

use super::signature::NamedSketch;
use crate::errors::{Result, SigError};

fn check_compatible(a: &NamedSketch, b: &NamedSketch) -> Result<()> {
    a.minhash().check_compatible(b.minhash()).map_err(|e| SigError::Incompatible {
        left: a.name().to_string(),
        right: b.name().to_string(),
        reason: e.to_string(),
    })
}

/// number of hashes shared by a and b
pub fn intersection_size(a: &NamedSketch, b: &NamedSketch) -> Result<u64> {
    check_compatible(a, b)?;
    Ok(a.minhash().count_common(b.minhash(), false)?)
}

/// number of distinct hashes in a or b
pub fn union_size(a: &NamedSketch, b: &NamedSketch) -> Result<u64> {
    let common = intersection_size(a, b)?;
    Ok(a.size() as u64 + b.size() as u64 - common)
}

/// Jaccard index estimated on hashes. Two empty sketches have similarity 0.
pub fn similarity(a: &NamedSketch, b: &NamedSketch) -> Result<f64> {
    check_compatible(a, b)?;
    if a.size() == 0 && b.size() == 0 {
        return Ok(0.);
    }
    Ok(a.minhash().jaccard(b.minhash())?)
} // end of similarity

//==========================================================================================

/// value written for each pair in matrix outputs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
pub enum Metric {
    /// number of shared hashes
    #[strum(serialize = "intersect")]
    Intersect,
    /// number of shared hashes times scaled, an estimate of shared k-mers
    #[strum(serialize = "intersect_bp")]
    IntersectBp,
    #[strum(serialize = "jaccard")]
    Jaccard,
}

impl Metric {
    /// column title in sparse outputs
    pub fn column_name(&self) -> String {
        self.to_string()
    }

    pub fn compute(&self, a: &NamedSketch, b: &NamedSketch) -> Result<f64> {
        match self {
            Metric::Intersect => Ok(intersection_size(a, b)? as f64),
            Metric::IntersectBp => {
                let common = intersection_size(a, b)?;
                Ok((common * a.scaled().max(1)) as f64)
            }
            Metric::Jaccard => similarity(a, b),
        }
    } // end of compute

    /// counts are written as integers, similarities as floats
    pub fn format(&self, value: f64) -> String {
        match self {
            Metric::Intersect | Metric::IntersectBp => format!("{}", value as u64),
            Metric::Jaccard => format!("{}", value),
        }
    }
} // end of impl Metric

//=========================================================================================

// end of mod tests
