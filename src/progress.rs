//! throughput and remaining time estimation.
//!
//! After each completed task we recompute elapsed time, mean time per task and
//! eta = mean * (nb_total - nb_done). A report is emitted every `cadence` completed tasks.
//! Reporting only reads the state, it never feeds back into the data path.

use std::fmt;
use std::time::{Duration, Instant};

/// format a duration as h:mm:ss
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// A progress line, emitted at fixed cadence.
#[derive(Clone, Debug)]
pub struct ProgressReport {
    /// local wall clock time of emission
    pub timestamp: String,
    pub nb_done: usize,
    pub nb_total: usize,
    pub elapsed: Duration,
    pub mean_per_task: Duration,
    pub eta: Duration,
    /// identification of the last completed task
    pub label: String,
}

impl fmt::Display for ProgressReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] Processed {}/{} sketches ({}), Elapsed: {}, ETA: {}",
            self.timestamp,
            self.nb_done,
            self.nb_total,
            self.label,
            format_duration(self.elapsed),
            format_duration(self.eta)
        )
    }
}

pub struct ProgressState {
    start: Instant,
    nb_done: usize,
    nb_total: usize,
    cadence: usize,
    /// as of the last recorded task
    mean_per_task: Duration,
    eta: Duration,
}

impl ProgressState {
    /// cadence is clamped to 1
    pub fn new(nb_total: usize, cadence: usize) -> Self {
        ProgressState {
            start: Instant::now(),
            nb_done: 0,
            nb_total,
            cadence: cadence.max(1),
            mean_per_task: Duration::ZERO,
            eta: Duration::ZERO,
        }
    }

    pub fn get_nb_done(&self) -> usize {
        self.nb_done
    }

    pub fn get_nb_total(&self) -> usize {
        self.nb_total
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn get_mean_per_task(&self) -> Duration {
        self.mean_per_task
    }

    pub fn get_eta(&self) -> Duration {
        self.eta
    }

    /// mean time per task and eta for a given elapsed time
    pub fn estimate(&self, elapsed: Duration) -> (Duration, Duration) {
        if self.nb_done == 0 {
            return (Duration::ZERO, Duration::ZERO);
        }
        let mean = elapsed.div_f64(self.nb_done as f64);
        let nb_left = self.nb_total.saturating_sub(self.nb_done);
        (mean, mean.mul_f64(nb_left as f64))
    } // end of estimate

    /// registers a completed task and updates the estimates.
    /// Returns the report when one is due, after printing it.
    pub fn record(&mut self, label: &str) -> Option<ProgressReport> {
        self.nb_done += 1;
        let elapsed = self.start.elapsed();
        let (mean_per_task, eta) = self.estimate(elapsed);
        self.mean_per_task = mean_per_task;
        self.eta = eta;
        if self.nb_done % self.cadence != 0 {
            return None;
        }
        let report = ProgressReport {
            timestamp: chrono::Local::now().format("%H:%M:%S").to_string(),
            nb_done: self.nb_done,
            nb_total: self.nb_total,
            elapsed,
            mean_per_task: self.mean_per_task,
            eta: self.eta,
            label: label.to_string(),
        };
        println!("{}", report);
        log::debug!("mean time per task : {:.3e} s", self.mean_per_task.as_secs_f64());
        Some(report)
    } // end of record
} // end of impl ProgressState

//=========================================================================================

// end of mod tests
