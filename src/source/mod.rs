//! Sample Sources
//!
//! A sample source supplies the raw `(timestamp, value)` samples of a named
//! archive variable. The range evaluator only ever talks to the
//! [`SampleSource`] trait:
//!
//! - **memory**: variables held in memory
//! - **csv**: `name,timestamp,value` files loaded into memory
//! - **sqlite**: archive database with a channel directory
//! - **cache**: window cache wrapping any other source
//!
//! # Contract
//!
//! `fetch(name, t0, t1)` returns samples ordered by non-decreasing timestamp.
//! The first sample should lie at or before `t0` so the value valid at the
//! start of the window is known; samples at or after `t1` may be omitted.

mod cache;
mod csv_file;
mod error;
mod memory;
mod sqlite;

pub use cache::{CacheStats, CachedSource};
pub use csv_file::CsvSource;
pub use error::{FetchError, FetchResult};
pub use memory::MemorySource;
pub use sqlite::{ChannelDescriptor, SqliteSource};

use serde::{Deserialize, Serialize};

/// A single archived value
///
/// The value holds from `timestamp` until the next sample of the same
/// variable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    /// Archive timestamp
    pub timestamp: i64,
    /// Recorded value
    pub value: f64,
}

impl Sample {
    /// Create a new sample
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

impl From<(i64, f64)> for Sample {
    fn from((timestamp, value): (i64, f64)) -> Self {
        Self { timestamp, value }
    }
}

/// Supplier of ordered samples for archive variables
pub trait SampleSource {
    /// Fetch the samples of `name` covering `[t0, t1)`
    fn fetch(&self, name: &str, t0: i64, t1: i64) -> FetchResult<Vec<Sample>>;
}

impl<S: SampleSource + ?Sized> SampleSource for &S {
    fn fetch(&self, name: &str, t0: i64, t1: i64) -> FetchResult<Vec<Sample>> {
        (**self).fetch(name, t0, t1)
    }
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn fetch(&self, name: &str, t0: i64, t1: i64) -> FetchResult<Vec<Sample>> {
        (**self).fetch(name, t0, t1)
    }
}

/// Slice an ordered sample list down to the window `[t0, t1)`.
///
/// Keeps the last sample at or before `t0` (if any) followed by every sample
/// before `t1`.
pub(crate) fn window(samples: &[Sample], t0: i64, t1: i64) -> &[Sample] {
    let first = samples
        .partition_point(|s| s.timestamp <= t0)
        .saturating_sub(1);
    let last = samples.partition_point(|s| s.timestamp < t1).max(first);
    &samples[first..last]
}
