//! CSV Sample Files
//!
//! Loads archive samples from CSV files with a header row and the columns
//! `name,timestamp,value`, one row per sample:
//!
//! ```text
//! name,timestamp,value
//! IBCAD00CRCUR6,0,5.0
//! IBCAD00CRCUR6,10,15.0
//! HALLD:p,0,2.0
//! ```

use super::{FetchResult, MemorySource, Sample, SampleSource};
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct SampleRow {
    name: String,
    timestamp: i64,
    value: f64,
}

/// Sample source loaded from a CSV file
#[derive(Debug, Clone)]
pub struct CsvSource {
    samples: MemorySource,
    path: Option<PathBuf>,
}

impl CsvSource {
    /// Load every sample in the file at `path`
    pub fn open(path: &Path) -> FetchResult<Self> {
        let file = std::fs::File::open(path)?;
        let mut source = Self::from_reader(file)?;
        source.path = Some(path.to_path_buf());

        tracing::info!(
            path = %path.display(),
            variables = source.samples.len(),
            samples = source.samples.sample_count(),
            "Loaded CSV samples"
        );
        Ok(source)
    }

    /// Load samples from CSV text
    pub fn parse_str(data: &str) -> FetchResult<Self> {
        Self::from_reader(data.as_bytes())
    }

    /// Load samples from any reader
    pub fn from_reader<R: Read>(reader: R) -> FetchResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut samples = MemorySource::new();
        for row in reader.deserialize() {
            let row: SampleRow = row?;
            samples.push(&row.name, Sample::new(row.timestamp, row.value));
        }

        Ok(Self {
            samples,
            path: None,
        })
    }

    /// File the samples were loaded from
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Loaded samples
    pub fn samples(&self) -> &MemorySource {
        &self.samples
    }

    /// Unwrap into the in-memory source
    pub fn into_inner(self) -> MemorySource {
        self.samples
    }
}

impl SampleSource for CsvSource {
    fn fetch(&self, name: &str, t0: i64, t1: i64) -> FetchResult<Vec<Sample>> {
        self.samples.fetch(name, t0, t1)
    }
}
