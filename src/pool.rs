//! worker pool running one task per item of a chunk.
//!
//! With one worker, tasks are run strictly sequentially in the calling thread, no thread pool is built.
//! With more workers, tasks run on a rayon pool and results come back through a bounded crossbeam channel
//! to the calling thread, which is the only one to see them. The ordered mode reassembles results
//! in submission order before handing them to the consumer.
//!
//! Tasks only get shared references to their inputs, so there is no mutable state between workers.

use std::collections::BTreeMap;

use crossbeam_channel::Receiver;
use rayon::prelude::*;

use crate::errors::{Result, SigError};

#[derive(Debug)]
pub struct WorkerPool {
    nb_workers: usize,
    /// None in sequential mode
    pool: Option<rayon::ThreadPool>,
}

impl WorkerPool {
    pub fn new(nb_workers: usize) -> Result<Self> {
        if nb_workers == 0 {
            return Err(SigError::Config("number of workers must be >= 1".to_string()));
        }
        let pool = if nb_workers == 1 {
            log::info!("worker pool : sequential mode");
            None
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(nb_workers)
                .build()
                .map_err(|e| SigError::Pool(e.to_string()))?;
            log::info!("worker pool : nb threads in pool : {}", pool.current_num_threads());
            Some(pool)
        };
        Ok(WorkerPool { nb_workers, pool })
    } // end of new

    pub fn nb_workers(&self) -> usize {
        self.nb_workers
    }

    pub fn is_sequential(&self) -> bool {
        self.pool.is_none()
    }

    /// runs task on each item, consumer receives (rank, result) in submission order.
    /// The first error, from a task or from the consumer, stops the run and is returned.
    pub fn run_ordered<T, R, F, C>(&self, items: &[T], task: F, mut consume: C) -> Result<()>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> Result<R> + Sync,
        C: FnMut(usize, R) -> Result<()>,
    {
        match &self.pool {
            None => {
                for (rank, item) in items.iter().enumerate() {
                    let res = task(item)?;
                    consume(rank, res)?;
                }
                Ok(())
            }
            Some(pool) => self.run_parallel(pool, items, &task, |receiver| collect_ordered(receiver, items.len(), &mut consume)),
        }
    } // end of run_ordered

    /// runs task on each item, consumer receives (rank, result) in completion order
    pub fn run_unordered<T, R, F, C>(&self, items: &[T], task: F, mut consume: C) -> Result<()>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> Result<R> + Sync,
        C: FnMut(usize, R) -> Result<()>,
    {
        match &self.pool {
            None => {
                for (rank, item) in items.iter().enumerate() {
                    let res = task(item)?;
                    consume(rank, res)?;
                }
                Ok(())
            }
            Some(pool) => self.run_parallel(pool, items, &task, |receiver| {
                let mut nb_received = 0;
                for (rank, res) in receiver.iter() {
                    consume(rank, res?)?;
                    nb_received += 1;
                }
                check_all_received(nb_received, items.len())
            }),
        }
    } // end of run_unordered

    // producer thread submits tasks to the rayon pool, the calling thread runs the collector.
    // The receiver is moved into the collector so that an early return unblocks the producer.
    fn run_parallel<T, R, F, Coll>(&self, pool: &rayon::ThreadPool, items: &[T], task: &F, collector: Coll) -> Result<()>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> Result<R> + Sync,
        Coll: FnOnce(Receiver<(usize, Result<R>)>) -> Result<()>,
    {
        let (sender, receiver) = crossbeam_channel::bounded::<(usize, Result<R>)>(2 * self.nb_workers);
        std::thread::scope(|scope| {
            scope.spawn(move || {
                pool.install(|| {
                    let res = items.par_iter().enumerate().try_for_each_with(sender, |sender, (rank, item)| {
                        sender.send((rank, task(item))).map_err(|_| ())
                    });
                    if res.is_err() {
                        log::debug!("collector stopped, remaining tasks not submitted");
                    }
                });
            });
            collector(receiver)
        })
    } // end of run_parallel
} // end of impl WorkerPool

fn check_all_received(nb_received: usize, nb_expected: usize) -> Result<()> {
    if nb_received != nb_expected {
        return Err(SigError::Pool(format!(
            "received {} results, expected {}",
            nb_received, nb_expected
        )));
    }
    Ok(())
}

// results arrive in any order, they are kept until all results of lower rank have been consumed
fn collect_ordered<R, C>(receiver: Receiver<(usize, Result<R>)>, nb_expected: usize, consume: &mut C) -> Result<()>
where
    C: FnMut(usize, R) -> Result<()>,
{
    let mut waiting = BTreeMap::<usize, R>::new();
    let mut next_rank = 0;
    for (rank, res) in receiver.iter() {
        waiting.insert(rank, res?);
        while let Some(r) = waiting.remove(&next_rank) {
            consume(next_rank, r)?;
            next_rank += 1;
        }
    }
    log::trace!("collect_ordered, max nb results waiting : {}", waiting.len());
    check_all_received(next_rank, nb_expected)
} // end of collect_ordered

//=========================================================================================

// end of mod tests
