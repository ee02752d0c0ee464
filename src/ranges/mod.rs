//! Interval Streams
//!
//! Evaluation of parsed queries over archive time windows:
//!
//! - **Evaluator**: expression tree to lazy stream of contiguous intervals
//! - **Compress**: drop `false` intervals, merge touching equal ones
//! - **Subsample**: keep the samples of a series inside true intervals
//!
//! # Example
//!
//! ```rust
//! use archiveql::query::parse;
//! use archiveql::ranges::{compress, evaluate, Interval};
//! use archiveql::source::MemorySource;
//!
//! let source = MemorySource::new()
//!     .with_variable("A", [(0, 5.0), (10, 15.0), (20, 8.0)])
//!     .with_variable("B", [(0, 2.0), (15, 6.0)]);
//! let expr = parse("A > 10 && B < 5").unwrap();
//!
//! let ranges: Vec<Interval> = compress(evaluate(&expr, &source, 0, 30))
//!     .collect::<Result<_, _>>()
//!     .unwrap();
//! assert_eq!(ranges, vec![Interval::new(10, 15, true)]);
//! ```

mod compress;
mod evaluator;
mod interval;
mod subsample;

pub use compress::{compress, Compress};
pub use evaluator::{evaluate, Ranges};
pub use interval::{Interval, Value, ValueKind};
pub use subsample::subsample;
