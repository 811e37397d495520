//! Checkpoint stores for flushed cold-chain samples.
//!
//! Each flush carries the thinned cold-chain rows gathered since the previous
//! flush together with a snapshot of the acceptance table and of every
//! slot's Fisher diagonal. Stores append the samples and replace the
//! summary, so the persisted sample count grows by exactly one flush's worth
//! of rows per call.

use crate::acceptance::AcceptanceTable;
use crate::{Error, Result};
use ndarray::{concatenate, Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

const SAMPLES_FILE: &str = "samples.bin";
const SUMMARY_FILE: &str = "summary.bin";

/// One batch of output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flush {
    /// Zero-based flush counter
    pub index: usize,
    /// Elementary steps recorded so far
    pub iteration: usize,
    pub param_names: Vec<String>,
    pub temperatures: Vec<f64>,
    /// Thinned cold-chain samples, one row per kept step
    pub samples: Array2<f64>,
    pub log_likelihood: Array1<f64>,
    pub acceptance: AcceptanceTable,
    /// Fisher diagonal per slot, one row per slot
    pub fisher: Array2<f64>,
}

/// Destination for flushes.
pub trait CheckpointWriter {
    fn write(&mut self, flush: &Flush) -> Result<()>;
}

/// Everything persisted so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRun {
    pub param_names: Vec<String>,
    pub temperatures: Vec<f64>,
    pub samples: Array2<f64>,
    pub log_likelihood: Array1<f64>,
    /// Summary of the latest flush
    pub acceptance: AcceptanceTable,
    pub fisher: Array2<f64>,
    pub n_flushes: usize,
    pub iteration: usize,
}

impl StoredRun {
    fn from_flush(flush: &Flush) -> Self {
        Self {
            param_names: flush.param_names.clone(),
            temperatures: flush.temperatures.clone(),
            samples: flush.samples.clone(),
            log_likelihood: flush.log_likelihood.clone(),
            acceptance: flush.acceptance.clone(),
            fisher: flush.fisher.clone(),
            n_flushes: 1,
            iteration: flush.iteration,
        }
    }

    fn append(&mut self, flush: &Flush) -> Result<()> {
        if flush.param_names != self.param_names {
            return Err(Error::Checkpoint(format!(
                "flush {} has parameters {:?}, store holds {:?}",
                flush.index, flush.param_names, self.param_names
            )));
        }
        self.samples = concatenate(Axis(0), &[self.samples.view(), flush.samples.view()])
            .map_err(|e| Error::Checkpoint(format!("Failed to append samples: {}", e)))?;
        self.log_likelihood = concatenate(
            Axis(0),
            &[self.log_likelihood.view(), flush.log_likelihood.view()],
        )
        .map_err(|e| Error::Checkpoint(format!("Failed to append log-likelihoods: {}", e)))?;
        self.acceptance = flush.acceptance.clone();
        self.fisher = flush.fisher.clone();
        self.n_flushes += 1;
        self.iteration = flush.iteration;
        Ok(())
    }

    pub fn n_samples(&self) -> usize {
        self.samples.nrows()
    }

    /// Samples of one named parameter.
    pub fn column(&self, name: &str) -> Option<Array1<f64>> {
        let i = self.param_names.iter().position(|n| n == name)?;
        Some(self.samples.column(i).to_owned())
    }
}

/// Keeps everything in memory. Used by tests and short runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    run: Option<StoredRun>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run(&self) -> Option<&StoredRun> {
        self.run.as_ref()
    }

    pub fn into_run(self) -> Option<StoredRun> {
        self.run
    }

    pub fn n_samples(&self) -> usize {
        self.run.as_ref().map_or(0, StoredRun::n_samples)
    }
}

impl CheckpointWriter for MemoryStore {
    fn write(&mut self, flush: &Flush) -> Result<()> {
        match self.run.as_mut() {
            Some(run) => run.append(flush),
            None => {
                self.run = Some(StoredRun::from_flush(flush));
                Ok(())
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SampleFrame {
    index: usize,
    samples: Array2<f64>,
    log_likelihood: Array1<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Summary {
    param_names: Vec<String>,
    temperatures: Vec<f64>,
    acceptance: AcceptanceTable,
    fisher: Array2<f64>,
    n_flushes: usize,
    iteration: usize,
}

/// Writes flushes to a directory.
///
/// `samples.bin` is a sequence of bincode frames, one per flush, and is
/// truncated by the first flush of a run. `summary.bin` is rewritten on
/// every flush.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    n_flushes: usize,
}

impl FileStore {
    /// Create the output directory if needed.
    pub fn create<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| {
            Error::Checkpoint(format!("Failed to create {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir, n_flushes: 0 })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read a run written by a [`FileStore`].
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<StoredRun> {
        let dir = dir.as_ref();
        let file = File::open(dir.join(SUMMARY_FILE))
            .map_err(|e| Error::Checkpoint(format!("Failed to open summary: {}", e)))?;
        let summary: Summary = bincode::deserialize_from(BufReader::new(file))
            .map_err(|e| Error::Checkpoint(format!("Failed to deserialize summary: {}", e)))?;

        let file = File::open(dir.join(SAMPLES_FILE))
            .map_err(|e| Error::Checkpoint(format!("Failed to open samples: {}", e)))?;
        let mut reader = BufReader::new(file);
        let mut samples = Vec::new();
        let mut log_likelihood = Vec::new();
        let mut n_params = summary.param_names.len();
        while !reader.fill_buf()?.is_empty() {
            let frame: SampleFrame = bincode::deserialize_from(&mut reader).map_err(|e| {
                Error::Checkpoint(format!("Failed to deserialize sample frame: {}", e))
            })?;
            n_params = frame.samples.ncols();
            samples.extend(frame.samples.iter().copied());
            log_likelihood.extend(frame.log_likelihood.iter().copied());
        }
        let samples = Array2::from_shape_vec((log_likelihood.len(), n_params), samples)
            .map_err(|e| Error::Checkpoint(format!("Corrupt sample frames: {}", e)))?;

        Ok(StoredRun {
            param_names: summary.param_names,
            temperatures: summary.temperatures,
            samples,
            log_likelihood: Array1::from(log_likelihood),
            acceptance: summary.acceptance,
            fisher: summary.fisher,
            n_flushes: summary.n_flushes,
            iteration: summary.iteration,
        })
    }
}

impl CheckpointWriter for FileStore {
    fn write(&mut self, flush: &Flush) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(self.n_flushes > 0)
            .truncate(self.n_flushes == 0)
            .open(self.dir.join(SAMPLES_FILE))
            .map_err(|e| Error::Checkpoint(format!("Failed to open samples: {}", e)))?;
        let mut writer = BufWriter::new(file);
        let frame = SampleFrame {
            index: flush.index,
            samples: flush.samples.clone(),
            log_likelihood: flush.log_likelihood.clone(),
        };
        bincode::serialize_into(&mut writer, &frame)
            .map_err(|e| Error::Checkpoint(format!("Failed to serialize samples: {}", e)))?;
        writer.flush()?;

        self.n_flushes += 1;
        let summary = Summary {
            param_names: flush.param_names.clone(),
            temperatures: flush.temperatures.clone(),
            acceptance: flush.acceptance.clone(),
            fisher: flush.fisher.clone(),
            n_flushes: self.n_flushes,
            iteration: flush.iteration,
        };
        let file = File::create(self.dir.join(SUMMARY_FILE))
            .map_err(|e| Error::Checkpoint(format!("Failed to create summary: {}", e)))?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, &summary)
            .map_err(|e| Error::Checkpoint(format!("Failed to serialize summary: {}", e)))?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;

    fn flush(index: usize, rows: usize) -> Flush {
        let start = (index * rows) as f64;
        Flush {
            index,
            iteration: (index + 1) * rows,
            param_names: vec!["a".to_string(), "b".to_string()],
            temperatures: vec![1.0, 2.0],
            samples: Array::from_shape_fn((rows, 2), |(i, j)| start + i as f64 + 0.5 * j as f64),
            log_likelihood: Array::from_shape_fn(rows, |i| -(start + i as f64)),
            acceptance: AcceptanceTable {
                rows: vec!["pt_swap".to_string()],
                accepted: Array2::from_elem((1, 2), index as u64),
                rejected: Array2::zeros((1, 2)),
            },
            fisher: Array2::from_elem((2, 2), 0.1 * (index + 1) as f64),
        }
    }

    #[test]
    fn test_memory_store_appends() {
        let mut store = MemoryStore::new();
        assert_eq!(store.n_samples(), 0);
        for i in 0..3 {
            store.write(&flush(i, 4)).unwrap();
            assert_eq!(store.n_samples(), 4 * (i + 1));
        }
        let run = store.run().unwrap();
        assert_eq!(run.n_flushes, 3);
        assert_eq!(run.iteration, 12);
        assert_eq!(run.log_likelihood.to_vec(), (0..12).map(|v| -(v as f64)).collect::<Vec<_>>());
        assert_eq!(run.acceptance.accepted[[0, 0]], 2);
        assert_eq!(run.column("b").unwrap()[5], 5.5);
        assert!(run.column("c").is_none());
    }

    #[test]
    fn test_memory_store_rejects_mismatched_names() {
        let mut store = MemoryStore::new();
        store.write(&flush(0, 2)).unwrap();
        let mut other = flush(1, 2);
        other.param_names.reverse();
        assert!(store.write(&other).is_err());
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::create(dir.path().join("run")).unwrap();
        let mut memory = MemoryStore::new();
        for i in 0..3 {
            store.write(&flush(i, 5)).unwrap();
            memory.write(&flush(i, 5)).unwrap();
        }
        let loaded = FileStore::load(store.dir()).unwrap();
        assert_eq!(&loaded, memory.run().unwrap());
    }

    #[test]
    fn test_new_file_store_truncates_old_samples() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::create(dir.path()).unwrap();
        for i in 0..4 {
            store.write(&flush(i, 3)).unwrap();
        }
        let mut store = FileStore::create(dir.path()).unwrap();
        store.write(&flush(0, 3)).unwrap();
        let loaded = FileStore::load(dir.path()).unwrap();
        assert_eq!(loaded.n_samples(), 3);
        assert_eq!(loaded.n_flushes, 1);
    }
}
