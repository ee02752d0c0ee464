//! # archiveql
//!
//! A query language over time-series archive variables. A query such as
//! `IBCAD00CRCUR6 > 50 && HALLD:p < 5` is parsed into an expression tree and
//! evaluated over a time window into the intervals where it holds.
//!
//! ## Modules
//!
//! - [`query`]: Query language AST, parser and errors
//! - [`ranges`]: Lazy interval evaluation, compression and sub-sampling
//! - [`source`]: Sample sources (memory, CSV, SQLite archive, window cache)
//! - [`archive`]: Query-level operations over a sample source
//! - [`time`]: Archive timestamps and time strings
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust
//! use archiveql::{Archive, Interval, MemorySource, Sample};
//!
//! let archive = Archive::new(
//!     MemorySource::new()
//!         .with_variable("A", [(0, 5.0), (10, 15.0), (20, 8.0)])
//!         .with_variable("B", [(0, 2.0), (15, 6.0)]),
//! );
//!
//! // Where does the condition hold?
//! let ranges = archive.find_ranges_vec("A > 10 && B < 5", 0, 30).unwrap();
//! assert_eq!(ranges, vec![Interval::new(10, 15, true)]);
//!
//! // Samples of A recorded while it held
//! let samples = archive.fetch("A", 0, 30, Some("A > 10 && B < 5")).unwrap();
//! assert_eq!(samples, vec![Sample::new(10, 15.0)]);
//! ```

pub mod archive;
pub mod config;
pub mod query;
pub mod ranges;
pub mod source;
pub mod time;

// Re-export top-level types for convenience
pub use archive::{Archive, Query};

pub use config::{
    Config, ConfigError, LoadReport, LoggingConfig, SourceConfig, SourceKind, TimeConfig,
};

pub use query::{
    parse, BinaryOp, EvaluationError, Expr, QueryError, QueryResult, SyntaxError, UnaryOp,
};

pub use ranges::{compress, evaluate, subsample, Interval, Ranges, Value, ValueKind};

pub use source::{
    CacheStats, CachedSource, ChannelDescriptor, CsvSource, FetchError, FetchResult,
    MemorySource, Sample, SampleSource, SqliteSource,
};

pub use time::{format_time, parse_time, TimeError, EPICS_SECOND};
