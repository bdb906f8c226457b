//! slicing of a lazy row sequence into bounded, ordered chunks.

use crate::errors::{Result, SigError};

/// chunk size to use: the explicit value if given, else max(1, round(nb_total * fraction))
pub fn resolve_chunk_size(explicit: Option<usize>, fraction: f64, nb_total: usize) -> Result<usize> {
    match explicit {
        Some(0) => Err(SigError::Config("chunk size must be >= 1".to_string())),
        Some(c) => Ok(c),
        None => {
            if !fraction.is_finite() || fraction <= 0. {
                return Err(SigError::Config(format!("fraction must be a positive number, got {}", fraction)));
            }
            let c = (nb_total as f64 * fraction).round() as usize;
            Ok(c.max(1))
        }
    }
} // end of resolve_chunk_size

/// Consumes a fallible item source incrementally and yields chunks of at most chunk_size items.
/// Only the chunk being built is held in memory. A source error is yielded once, then iteration ends.
pub struct ChunkScheduler<I> {
    source: I,
    chunk_size: usize,
    done: bool,
    nb_chunks: usize,
}

impl<I> ChunkScheduler<I> {
    pub fn new(source: I, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(SigError::Config("chunk size must be >= 1".to_string()));
        }
        Ok(ChunkScheduler {
            source,
            chunk_size,
            done: false,
            nb_chunks: 0,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// number of chunks yielded so far
    pub fn nb_chunks(&self) -> usize {
        self.nb_chunks
    }
} // end of impl ChunkScheduler

impl<I, T> Iterator for ChunkScheduler<I>
where
    I: Iterator<Item = Result<T>>,
{
    type Item = Result<Vec<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut chunk = Vec::with_capacity(self.chunk_size);
        while chunk.len() < self.chunk_size {
            match self.source.next() {
                Some(Ok(item)) => chunk.push(item),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        if chunk.is_empty() {
            return None;
        }
        self.nb_chunks += 1;
        log::debug!("chunk {} of size {}", self.nb_chunks, chunk.len());
        Some(Ok(chunk))
    } // end of next
} // end of impl Iterator for ChunkScheduler

//=========================================================================================

// end of mod tests
