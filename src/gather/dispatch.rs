//! Runs gather for every signature of a collection, one output file per signature.
//!
//! A signature whose output (plain or gzipped) already exists is skipped, so an interrupted run
//! can be restarted on the same output directory.
//! By default each task reloads the database and re-locates its query by md5, tasks share nothing.
//! With shared_db the database is loaded once and shared read only between workers.
//! When several signatures map to the same output file, only the first one in collection order is
//! gathered, the others are skipped whatever the number of threads.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use cpu_time::ProcessTime;
use fxhash::FxHashMap;

use super::{gather, write_gather_csv};
use crate::errors::{Result, SigError};
use crate::pool::WorkerPool;
use crate::progress::ProgressState;
use crate::sketch::{dump_signatures, NamedSketch};
use crate::store::{find_by_md5, SketchStore};
use crate::utils::files::{gather_output_paths, query_sig_path};
use crate::utils::parameters::GatherParams;

/// what one gather run needs to know, built before any work starts
#[derive(Clone, Debug)]
pub struct GatherTask {
    pub name: String,
    pub md5: String,
    /// database the query is gathered against
    pub db: PathBuf,
    pub out_csv: PathBuf,
    pub out_csv_gz: PathBuf,
    /// name of an earlier signature of the collection writing the same output
    pub shadowed_by: Option<String>,
}

impl GatherTask {
    pub fn new(name: &str, md5: &str, db: &Path, outdir: &Path) -> Self {
        let (out_csv, out_csv_gz) = gather_output_paths(outdir, name);
        GatherTask {
            name: name.to_string(),
            md5: md5.to_string(),
            db: db.to_path_buf(),
            out_csv,
            out_csv_gz,
            shadowed_by: None,
        }
    }

    /// true if a previous run already produced one of the outputs
    pub fn is_done(&self) -> bool {
        self.out_csv.exists() || self.out_csv_gz.exists()
    }

    /// the single file this task writes
    pub fn destination(&self, compress: bool) -> &Path {
        if compress {
            &self.out_csv_gz
        } else {
            &self.out_csv
        }
    }
} // end of impl GatherTask

/// terminal state of a task
#[derive(Clone, Debug, PartialEq)]
pub enum TaskOutcome {
    Skipped { name: String, existing: PathBuf },
    Completed { name: String, nb_matches: usize },
    Failed { name: String, reason: String },
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskOutcome::Skipped { existing, .. } => write!(f, "Skipping {}: file already exists.", existing.display()),
            TaskOutcome::Completed { name, nb_matches } => write!(f, "Processed {} ({} matches)", name, nb_matches),
            TaskOutcome::Failed { name, reason } => write!(f, "Failed {}: {}", name, reason),
        }
    }
}

/// counts of task outcomes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub nb_completed: usize,
    pub nb_skipped: usize,
    pub nb_failed: usize,
}

impl DispatchSummary {
    fn add(&mut self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Skipped { .. } => self.nb_skipped += 1,
            TaskOutcome::Completed { .. } => self.nb_completed += 1,
            TaskOutcome::Failed { .. } => self.nb_failed += 1,
        }
    }

    pub fn nb_tasks(&self) -> usize {
        self.nb_completed + self.nb_skipped + self.nb_failed
    }

    pub fn has_failures(&self) -> bool {
        self.nb_failed > 0
    }
}

// collections loaded once in shared mode. queries and db are the same Arc for an intra run.
struct SharedCollections {
    queries: Arc<Vec<NamedSketch>>,
    db: Arc<Vec<NamedSketch>>,
}

pub struct GatherDispatcher {
    params: GatherParams,
    shared: Option<SharedCollections>,
}

impl GatherDispatcher {
    pub fn new(params: GatherParams) -> Self {
        GatherDispatcher { params, shared: None }
    }

    pub fn get_params(&self) -> &GatherParams {
        &self.params
    }

    /// one task per selected signature of the data collection, in collection order.
    /// A task whose output is already claimed by an earlier task is marked as shadowed.
    pub fn build_tasks(&self) -> Result<Vec<GatherTask>> {
        let data = self.params.get_data();
        println!("loading sketches from file '{}'", data.display());
        let store = SketchStore::open(data, self.params.get_selection())?;
        let mut tasks = Vec::new();
        let mut owners = FxHashMap::<PathBuf, String>::default();
        for s in store.sketches() {
            let s = s?;
            let mut task = GatherTask::new(s.name(), s.md5sum(), self.params.get_db(), self.params.get_outdir());
            match owners.get(&task.out_csv) {
                Some(owner) => {
                    log::warn!(
                        "signature {} (md5 {}) shares its output {:?} with {}, it will be skipped",
                        s.name(),
                        s.md5sum(),
                        task.out_csv,
                        owner
                    );
                    task.shadowed_by = Some(owner.clone());
                }
                None => {
                    owners.insert(task.out_csv.clone(), s.name().to_string());
                }
            }
            tasks.push(task);
        }
        println!("'{}' contains {} signatures", data.display(), tasks.len());
        Ok(tasks)
    } // end of build_tasks

    fn load_shared(&mut self) -> Result<()> {
        let selection = self.params.get_selection();
        let queries = Arc::new(SketchStore::open(self.params.get_data(), selection)?.load_all()?);
        let db = if self.params.is_intra() {
            Arc::clone(&queries)
        } else {
            Arc::new(SketchStore::open(self.params.get_db(), selection)?.load_all()?)
        };
        log::info!("shared collections loaded, nb queries : {}, db size : {}", queries.len(), db.len());
        self.shared = Some(SharedCollections { queries, db });
        Ok(())
    }

    // re-locates the query and runs gather. Errors end up in the task outcome.
    fn gather_task(&self, task: &GatherTask) -> Result<usize> {
        let (query, results) = match &self.shared {
            Some(shared) => {
                let query = find_by_md5(&shared.queries, &task.md5, self.params.get_data())?;
                self.save_query(task, query)?;
                (query.clone(), gather(query, &shared.db, self.params.get_threshold_bp())?)
            }
            None => {
                let selection = self.params.get_selection();
                let db = SketchStore::open(&task.db, selection)?.load_all()?;
                log::debug!("task {} : reloaded {} sketches from {:?}", task.name, db.len(), task.db);
                let query = if self.params.is_intra() {
                    find_by_md5(&db, &task.md5, &task.db)?.clone()
                } else {
                    SketchStore::open(self.params.get_data(), selection)?.find_by_md5(&task.md5)?
                };
                self.save_query(task, &query)?;
                let results = gather(&query, &db, self.params.get_threshold_bp())?;
                (query, results)
            }
        };
        write_gather_csv(task.destination(self.params.get_compress()), &results, self.params.get_compress())?;
        log::debug!("task {} : query {} done", task.name, query.md5sum());
        Ok(results.len())
    } // end of gather_task

    fn save_query(&self, task: &GatherTask, query: &NamedSketch) -> Result<()> {
        if !self.params.get_save_query() {
            return Ok(());
        }
        let path = query_sig_path(self.params.get_outdir(), &task.name);
        let file = fs::File::create(&path)?;
        dump_signatures(std::slice::from_ref(query), file)?;
        Ok(())
    }

    /// runs one task. Never returns an error, a failure is a task outcome.
    pub fn run_task(&self, task: &GatherTask) -> TaskOutcome {
        if let Some(owner) = &task.shadowed_by {
            log::debug!("task {} : output {:?} belongs to {}", task.name, task.out_csv, owner);
            return TaskOutcome::Skipped {
                name: task.name.clone(),
                existing: task.destination(self.params.get_compress()).to_path_buf(),
            };
        }
        if task.out_csv.exists() {
            return TaskOutcome::Skipped {
                name: task.name.clone(),
                existing: task.out_csv.clone(),
            };
        }
        if task.out_csv_gz.exists() {
            return TaskOutcome::Skipped {
                name: task.name.clone(),
                existing: task.out_csv_gz.clone(),
            };
        }
        match self.gather_task(task) {
            Ok(nb_matches) => TaskOutcome::Completed {
                name: task.name.clone(),
                nb_matches,
            },
            Err(e) => {
                if matches!(e, SigError::Lookup { .. }) {
                    log::warn!("task {} : {}", task.name, e);
                } else {
                    log::error!("task {} failed : {}", task.name, e);
                }
                TaskOutcome::Failed {
                    name: task.name.clone(),
                    reason: e.to_string(),
                }
            }
        }
    } // end of run_task

    /// runs all tasks and returns outcome counts
    pub fn run(&mut self) -> Result<DispatchSummary> {
        let start_t = SystemTime::now();
        let cpu_start = ProcessTime::now();
        //
        fs::create_dir_all(self.params.get_outdir())?;
        let tasks = self.build_tasks()?;
        let nb_pending = tasks.iter().filter(|t| t.shadowed_by.is_none() && !t.is_done()).count();
        log::info!("{} tasks, {} already done", tasks.len(), tasks.len() - nb_pending);
        if self.params.get_shared_db() && nb_pending > 0 {
            self.load_shared()?;
        }
        let pool = WorkerPool::new(self.params.get_nb_threads())?;
        let mut progress = ProgressState::new(tasks.len(), (tasks.len() / 10).max(1));
        let mut summary = DispatchSummary::default();
        let nb_tasks = tasks.len();
        //
        let dispatcher: &GatherDispatcher = self;
        pool.run_unordered(
            &tasks,
            |task| Ok(dispatcher.run_task(task)),
            |_, outcome| {
                summary.add(&outcome);
                println!("[{}/{}] {}", summary.nb_tasks(), nb_tasks, outcome);
                let label = match &outcome {
                    TaskOutcome::Skipped { name, .. } | TaskOutcome::Completed { name, .. } | TaskOutcome::Failed { name, .. } => name,
                };
                progress.record(label);
                Ok(())
            },
        )?;
        //
        let cpu_s = cpu_start.elapsed().as_secs_f64();
        let elapsed_s = start_t.elapsed().map(|d| d.as_secs_f64()).unwrap_or(0.);
        log::info!(
            "gather dispatch : completed {}, skipped {}, failed {}, cpu time(s) {:.2e}, elapsed time(s) {:.2e}",
            summary.nb_completed,
            summary.nb_skipped,
            summary.nb_failed,
            cpu_s,
            elapsed_s
        );
        Ok(summary)
    } // end of run
} // end of impl GatherDispatcher

//=========================================================================================

// end of mod tests
