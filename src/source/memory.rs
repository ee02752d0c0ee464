//! In-memory sample source

use super::{window, FetchError, FetchResult, Sample, SampleSource};
use std::collections::HashMap;

/// Sample source backed by in-memory series, one per variable
///
/// Each series is kept sorted by timestamp; samples sharing a timestamp keep
/// their insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    variables: HashMap<String, Vec<Sample>>,
}

impl MemorySource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: add a variable from `(timestamp, value)` pairs
    pub fn with_variable<I>(mut self, name: impl Into<String>, samples: I) -> Self
    where
        I: IntoIterator<Item = (i64, f64)>,
    {
        self.insert(name, samples.into_iter().map(Sample::from).collect());
        self
    }

    /// Replace the series of a variable
    pub fn insert(&mut self, name: impl Into<String>, mut samples: Vec<Sample>) {
        samples.sort_by_key(|s| s.timestamp);
        self.variables.insert(name.into(), samples);
    }

    /// Append one sample, keeping the series ordered
    pub fn push(&mut self, name: &str, sample: Sample) {
        let series = self.variables.entry(name.to_string()).or_default();
        let at = series.partition_point(|s| s.timestamp <= sample.timestamp);
        series.insert(at, sample);
    }

    /// Full series of a variable
    pub fn samples(&self, name: &str) -> Option<&[Sample]> {
        self.variables.get(name).map(Vec::as_slice)
    }

    /// Variable names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.variables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Total number of samples across all variables
    pub fn sample_count(&self) -> usize {
        self.variables.values().map(Vec::len).sum()
    }
}

impl SampleSource for MemorySource {
    fn fetch(&self, name: &str, t0: i64, t1: i64) -> FetchResult<Vec<Sample>> {
        let series = self
            .variables
            .get(name)
            .ok_or_else(|| FetchError::VariableNotFound(name.to_string()))?;
        Ok(window(series, t0, t1).to_vec())
    }
}
