//! buffered, append only csv writer for matrix results.
//!
//! State machine : Empty -> Accumulating -> Flushing -> Accumulating ... -> Flushing (final) -> Closed.
//! The first access truncates the destination and writes the header, every later write is an append.
//! A flush happens when the buffer holds `threshold` records and once more at close.
//! Records are written once and in the order they were pushed.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::{Result, SigError};
use crate::sketch::Metric;

/// a dense matrix row : row name and one value per column
#[derive(Clone, Debug, PartialEq)]
pub struct ResultRow {
    pub name: String,
    pub values: Vec<f64>,
}

/// a non zero pair of a sparse output
#[derive(Clone, Debug, PartialEq)]
pub struct SparseEntry {
    pub source: String,
    pub target: String,
    pub value: f64,
}

/// a record that can be appended to a csv buffer
pub trait CsvRecord {
    fn to_fields(&self, metric: Metric) -> Vec<String>;
}

impl CsvRecord for ResultRow {
    fn to_fields(&self, metric: Metric) -> Vec<String> {
        let mut fields = Vec::with_capacity(self.values.len() + 1);
        fields.push(self.name.clone());
        fields.extend(self.values.iter().map(|v| metric.format(*v)));
        fields
    }
}

impl CsvRecord for SparseEntry {
    fn to_fields(&self, metric: Metric) -> Vec<String> {
        vec![self.source.clone(), self.target.clone(), metric.format(self.value)]
    }
}

/// header line of an output
#[derive(Clone, Debug)]
pub enum Header {
    /// column sketch names, in column order
    Dense(Vec<String>),
    Sparse(Metric),
}

impl Header {
    /// dense : empty first cell then quoted column names. sparse : source,target,metric
    pub fn render(&self) -> String {
        match self {
            Header::Dense(names) => {
                let quoted: Vec<String> = names.iter().map(|n| format!("\"{}\"", n.replace('"', "\"\""))).collect();
                format!(",{}\n", quoted.join(","))
            }
            Header::Sparse(metric) => format!("source,target,{}\n", metric.column_name()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriterState {
    Empty,
    Accumulating,
    Flushing,
    Closed,
}

/// what a writer did, returned at close
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriterSummary {
    pub nb_records: usize,
    pub nb_flushes: usize,
}

pub struct ResultWriter<R> {
    path: PathBuf,
    header: Header,
    metric: Metric,
    /// number of buffered records triggering a flush
    threshold: usize,
    buffer: Vec<R>,
    state: WriterState,
    summary: WriterSummary,
}

impl<R: CsvRecord> ResultWriter<R> {
    pub fn new(path: &Path, header: Header, metric: Metric, threshold: usize) -> Result<Self> {
        if threshold == 0 {
            return Err(SigError::Config("flush threshold must be >= 1".to_string()));
        }
        Ok(ResultWriter {
            path: path.to_path_buf(),
            header,
            metric,
            threshold,
            buffer: Vec::with_capacity(threshold),
            state: WriterState::Empty,
            summary: WriterSummary::default(),
        })
    } // end of new

    pub fn state(&self) -> WriterState {
        self.state
    }

    pub fn nb_buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// truncates the destination and writes the header. Done at first push if not called explicitly,
    /// calling it early makes an unwritable destination fail before any computation.
    pub fn open(&mut self) -> Result<()> {
        match self.state {
            WriterState::Empty => {}
            WriterState::Closed => return Err(SigError::Closed(self.path.clone())),
            _ => return Ok(()),
        }
        if self.path.exists() {
            log::info!("output file {:?} exists, it is truncated", self.path);
        }
        let mut file = OpenOptions::new().write(true).create(true).truncate(true).open(&self.path)?;
        file.write_all(self.header.render().as_bytes())?;
        self.state = WriterState::Accumulating;
        Ok(())
    } // end of open

    pub fn push(&mut self, record: R) -> Result<()> {
        self.open()?;
        self.buffer.push(record);
        if self.buffer.len() >= self.threshold {
            self.flush()?;
        }
        Ok(())
    }

    pub fn extend<It: IntoIterator<Item = R>>(&mut self, records: It) -> Result<()> {
        for r in records {
            self.push(r)?;
        }
        Ok(())
    }

    /// appends buffered records in one write and clears the buffer
    pub fn flush(&mut self) -> Result<()> {
        self.open()?;
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.state = WriterState::Flushing;
        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
        for r in &self.buffer {
            wtr.write_record(r.to_fields(self.metric))?;
        }
        let bytes = wtr.into_inner().map_err(|e| SigError::Io(e.into_error()))?;
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(&bytes)?;
        //
        self.summary.nb_records += self.buffer.len();
        self.summary.nb_flushes += 1;
        log::debug!("flushed {} records to {:?}, total : {}", self.buffer.len(), self.path, self.summary.nb_records);
        self.buffer.clear();
        self.state = WriterState::Accumulating;
        Ok(())
    } // end of flush

    /// final flush. The header is written even if no record was pushed.
    pub fn close(&mut self) -> Result<WriterSummary> {
        if self.state == WriterState::Closed {
            return Err(SigError::Closed(self.path.clone()));
        }
        self.flush()?;
        self.state = WriterState::Closed;
        log::info!("closed {:?}, nb records : {}, nb flushes : {}", self.path, self.summary.nb_records, self.summary.nb_flushes);
        Ok(self.summary)
    } // end of close
} // end of impl ResultWriter

//=========================================================================================

#[cfg(test)]
mod tests {

    use super::*;
    use std::fs;

    fn row(name: &str, values: &[f64]) -> ResultRow {
        ResultRow {
            name: name.to_string(),
            values: values.to_vec(),
        }
    }

    #[test]
    fn test_header_render() {
        let h = Header::Dense(vec!["a".to_string(), "b \"x\"".to_string()]);
        assert_eq!(h.render(), ",\"a\",\"b \"\"x\"\"\"\n");
        assert_eq!(Header::Sparse(Metric::IntersectBp).render(), "source,target,intersect_bp\n");
    }

    #[test]
    fn test_state_machine_and_flush_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.csv");
        fs::write(&path, "stale content\n").unwrap();
        let header = Header::Dense(vec!["c1".to_string(), "c2".to_string()]);
        let mut writer = ResultWriter::new(&path, header, Metric::Intersect, 2).unwrap();
        assert_eq!(writer.state(), WriterState::Empty);
        writer.push(row("r1", &[1., 2.])).unwrap();
        assert_eq!(writer.state(), WriterState::Accumulating);
        assert_eq!(writer.nb_buffered(), 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), ",\"c1\",\"c2\"\n");
        writer.push(row("r2", &[3., 4.])).unwrap();
        assert_eq!(writer.nb_buffered(), 0);
        writer.push(row("r,3", &[5., 6.])).unwrap();
        let summary = writer.close().unwrap();
        assert_eq!(summary, WriterSummary { nb_records: 3, nb_flushes: 2 });
        assert_eq!(writer.state(), WriterState::Closed);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            ",\"c1\",\"c2\"\nr1,1,2\nr2,3,4\n\"r,3\",5,6\n"
        );
        assert!(matches!(writer.push(row("late", &[0., 0.])), Err(SigError::Closed(_))));
        assert!(writer.close().is_err());
    }

    #[test]
    fn test_empty_output_has_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.csv");
        let mut writer = ResultWriter::<SparseEntry>::new(&path, Header::Sparse(Metric::Jaccard), Metric::Jaccard, 5).unwrap();
        let summary = writer.close().unwrap();
        assert_eq!(summary.nb_records, 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), "source,target,jaccard\n");
    }

    #[test]
    fn test_unwritable_destination() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing_dir").join("s.csv");
        let mut writer = ResultWriter::<SparseEntry>::new(&path, Header::Sparse(Metric::Jaccard), Metric::Jaccard, 5).unwrap();
        assert!(matches!(writer.open(), Err(SigError::Io(_))));
        assert!(ResultWriter::<SparseEntry>::new(&path, Header::Sparse(Metric::Jaccard), Metric::Jaccard, 0).is_err());
    }
} // end of mod tests
