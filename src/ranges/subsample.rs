//! Conditional Sub-sampler

use crate::query::QueryResult;
use crate::ranges::Interval;
use crate::source::Sample;

/// Keep the samples of `series` that fall inside the given intervals
///
/// `series` must be ordered by timestamp and `ranges` ordered and
/// non-overlapping, normally the output of `compress`. For each interval
/// `[start, end)` the samples with `start <= timestamp <= end` are copied;
/// the cursor into `series` only moves forward, and no interval is pulled
/// once the series is exhausted. Returns `(values, timestamps)`.
pub fn subsample<I>(series: &[Sample], ranges: I) -> QueryResult<(Vec<f64>, Vec<i64>)>
where
    I: IntoIterator<Item = QueryResult<Interval>>,
{
    let mut values = Vec::new();
    let mut timestamps = Vec::new();
    let mut ranges = ranges.into_iter();
    let mut cursor = 0;

    while cursor < series.len() {
        let Some(range) = ranges.next() else {
            break;
        };
        let range = range?;

        while cursor < series.len() && series[cursor].timestamp < range.start {
            cursor += 1;
        }
        while cursor < series.len() && series[cursor].timestamp <= range.end {
            values.push(series[cursor].value);
            timestamps.push(series[cursor].timestamp);
            cursor += 1;
        }
    }

    Ok((values, timestamps))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{EvaluationError, QueryError};

    fn series(points: &[(i64, f64)]) -> Vec<Sample> {
        points.iter().copied().map(Sample::from).collect()
    }

    fn ranges(spans: &[(i64, i64)]) -> Vec<QueryResult<Interval>> {
        spans
            .iter()
            .map(|&(start, end)| Ok(Interval::new(start, end, true)))
            .collect()
    }

    #[test]
    fn test_merge_join() {
        let data = series(&[(0, 1.0), (5, 2.0), (10, 3.0), (12, 4.0), (20, 5.0), (25, 6.0)]);
        let (values, timestamps) = subsample(&data, ranges(&[(4, 10), (21, 30)])).unwrap();
        assert_eq!(timestamps, vec![5, 10, 25]);
        assert_eq!(values, vec![2.0, 3.0, 6.0]);
    }

    #[test]
    fn test_never_invents_samples() {
        let data = series(&[(3, 1.0), (9, 2.0), (17, 3.0)]);
        let (_, timestamps) = subsample(&data, ranges(&[(0, 5), (6, 8), (10, 40)])).unwrap();
        assert_eq!(timestamps, vec![3, 17]);
        assert!(timestamps
            .iter()
            .all(|t| data.iter().any(|s| s.timestamp == *t)));
    }

    #[test]
    fn test_stops_when_series_exhausted() {
        let data = series(&[(0, 1.0)]);
        let mut stream = ranges(&[(0, 5)]);
        stream.push(Err(EvaluationError::DivisionByZero { start: 5, end: 10 }.into()));

        // The error is never pulled: the series ran out first
        let (values, _) = subsample(&data, stream).unwrap();
        assert_eq!(values, vec![1.0]);
    }

    #[test]
    fn test_error_is_returned() {
        let data = series(&[(0, 1.0), (10, 2.0)]);
        let mut stream = ranges(&[(0, 5)]);
        stream.push(Err(EvaluationError::DivisionByZero { start: 5, end: 10 }.into()));

        let result = subsample(&data, stream);
        assert!(matches!(
            result,
            Err(QueryError::Evaluation(EvaluationError::DivisionByZero { .. }))
        ));
    }

    #[test]
    fn test_empty_inputs() {
        let (values, timestamps) = subsample(&[], ranges(&[(0, 10)])).unwrap();
        assert!(values.is_empty() && timestamps.is_empty());

        let data = series(&[(0, 1.0)]);
        let (values, _) = subsample(&data, ranges(&[])).unwrap();
        assert!(values.is_empty());
    }

    proptest::prop_compose! {
        /// Ordered series, timestamps may repeat, each value unique
        fn arb_series()(mut stamps in proptest::collection::vec(0i64..200, 0..60)) -> Vec<Sample> {
            stamps.sort_unstable();
            stamps
                .into_iter()
                .enumerate()
                .map(|(i, t)| Sample::new(t, i as f64))
                .collect()
        }
    }

    proptest::prop_compose! {
        /// Ordered, non-overlapping spans cut from distinct points
        fn arb_spans()(points in proptest::collection::btree_set(-10i64..210, 0..20)) -> Vec<(i64, i64)> {
            let points: Vec<i64> = points.into_iter().collect();
            points.chunks_exact(2).map(|pair| (pair[0], pair[1])).collect()
        }
    }

    proptest::proptest! {
        #[test]
        fn subsample_copies_exactly_the_covered_samples(
            data in arb_series(),
            spans in arb_spans(),
        ) {
            let (values, timestamps) = subsample(&data, ranges(&spans)).unwrap();
            assert_eq!(values.len(), timestamps.len());

            // Every output pair is a sample of the series, in series order
            let expected: Vec<&Sample> = data
                .iter()
                .filter(|s| spans.iter().any(|&(a, b)| a <= s.timestamp && s.timestamp <= b))
                .collect();
            assert_eq!(
                values,
                expected.iter().map(|s| s.value).collect::<Vec<_>>()
            );
            assert_eq!(
                timestamps,
                expected.iter().map(|s| s.timestamp).collect::<Vec<_>>()
            );
        }
    }
}
