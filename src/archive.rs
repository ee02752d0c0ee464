//! Archive facade
//!
//! Query-level operations over one sample source: interval searches from
//! query text and conditional fetches of a single variable.

use crate::query::{parse, Expr, QueryResult};
use crate::ranges::{compress, evaluate, subsample, Compress, Interval, Ranges};
use crate::source::{Sample, SampleSource};

/// Parsed query, owned so its interval streams can borrow it
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    text: String,
    expr: Expr,
}

impl Query {
    /// Parse query text
    pub fn new(text: &str) -> QueryResult<Self> {
        Ok(Self {
            text: text.to_string(),
            expr: parse(text)?,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }
}

/// Query operations over a sample source
pub struct Archive<S> {
    source: S,
    prefetch: bool,
}

impl<S: SampleSource> Archive<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            prefetch: false,
        }
    }

    /// Fetch every variable of a query over the whole window before
    /// evaluating it, so a caching source answers the per-interval fetches
    pub fn with_prefetch(mut self, prefetch: bool) -> Self {
        self.prefetch = prefetch;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Raw interval stream of `query` over `[t0, t1)`
    pub fn search_ranges<'a>(&'a self, query: &'a Query, t0: i64, t1: i64) -> Ranges<'a> {
        if self.prefetch {
            self.warm(query.expr(), t0, t1);
        }
        tracing::debug!(query = query.text(), t0, t1, "Searching ranges");
        evaluate(query.expr(), &self.source, t0, t1)
    }

    /// Compressed interval stream of `query` over `[t0, t1)`: only the spans
    /// where the query holds a non-false value, merged
    pub fn find_ranges<'a>(&'a self, query: &'a Query, t0: i64, t1: i64) -> Compress<Ranges<'a>> {
        compress(self.search_ranges(query, t0, t1))
    }

    /// Collect the compressed intervals of query text
    pub fn find_ranges_vec(&self, text: &str, t0: i64, t1: i64) -> QueryResult<Vec<Interval>> {
        let query = Query::new(text)?;
        self.find_ranges(&query, t0, t1).collect()
    }

    /// Samples of `name` over `[t0, t1)`, optionally limited to the spans
    /// where `cond` holds
    ///
    /// The first sample is the value in effect at `t0`, moved forward to
    /// `t0` when it was recorded earlier.
    pub fn fetch(
        &self,
        name: &str,
        t0: i64,
        t1: i64,
        cond: Option<&str>,
    ) -> QueryResult<Vec<Sample>> {
        let condition = cond.map(Query::new).transpose()?;

        let mut samples = self.source.fetch(name, t0, t1)?;
        let anchor = samples
            .partition_point(|s| s.timestamp <= t0)
            .saturating_sub(1);
        samples.drain(..anchor);
        samples.retain(|s| s.timestamp < t1);
        if let Some(first) = samples.first_mut() {
            first.timestamp = first.timestamp.max(t0);
        }
        tracing::debug!(name, t0, t1, count = samples.len(), "Fetched samples");

        let Some(condition) = condition else {
            return Ok(samples);
        };

        let (values, timestamps) = subsample(&samples, self.find_ranges(&condition, t0, t1))?;
        Ok(timestamps
            .into_iter()
            .zip(values)
            .map(|(timestamp, value)| Sample::new(timestamp, value))
            .collect())
    }

    fn warm(&self, expr: &Expr, t0: i64, t1: i64) {
        for name in expr.variables() {
            if let Err(e) = self.source.fetch(name, t0, t1) {
                tracing::debug!(name, error = %e, "Prefetch failed");
            }
        }
    }
}
