//! Interval Compressor
//!
//! Drops intervals whose value is `false` and merges touching intervals that
//! carry exactly equal values.

use crate::query::{QueryError, QueryResult};
use crate::ranges::Interval;
use std::iter::FusedIterator;

/// Compress an interval stream
///
/// A pending interval is flushed before a terminal error is forwarded;
/// nothing follows the error.
pub fn compress<I>(ranges: I) -> Compress<I::IntoIter>
where
    I: IntoIterator<Item = QueryResult<Interval>>,
{
    Compress {
        inner: ranges.into_iter(),
        pending: None,
        failed: None,
        done: false,
    }
}

/// Iterator returned by [`compress`]
pub struct Compress<I> {
    inner: I,
    pending: Option<Interval>,
    failed: Option<QueryError>,
    done: bool,
}

impl<I> Iterator for Compress<I>
where
    I: Iterator<Item = QueryResult<Interval>>,
{
    type Item = QueryResult<Interval>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.failed.take() {
            self.done = true;
            return Some(Err(e));
        }
        if self.done {
            return None;
        }

        loop {
            match self.inner.next() {
                Some(Ok(current)) => {
                    if current.value.is_false() {
                        continue;
                    }
                    match self.pending.take() {
                        Some(mut previous)
                            if previous.end == current.start
                                && previous.value == current.value =>
                        {
                            previous.end = current.end;
                            self.pending = Some(previous);
                        }
                        Some(previous) => {
                            self.pending = Some(current);
                            return Some(Ok(previous));
                        }
                        None => self.pending = Some(current),
                    }
                }
                Some(Err(e)) => match self.pending.take() {
                    Some(previous) => {
                        self.failed = Some(e);
                        return Some(Ok(previous));
                    }
                    None => {
                        self.done = true;
                        return Some(Err(e));
                    }
                },
                None => {
                    self.done = true;
                    return self.pending.take().map(Ok);
                }
            }
        }
    }
}

impl<I> FusedIterator for Compress<I> where I: Iterator<Item = QueryResult<Interval>> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::EvaluationError;
    use crate::ranges::Value;

    fn ok(intervals: &[Interval]) -> Vec<QueryResult<Interval>> {
        intervals.iter().copied().map(Ok).collect()
    }

    fn compressed(intervals: &[Interval]) -> Vec<Interval> {
        compress(ok(intervals)).map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_drops_false_and_merges_true() {
        let stream = [
            Interval::new(0, 10, false),
            Interval::new(10, 15, true),
            Interval::new(15, 20, false),
            Interval::new(20, 30, false),
        ];
        assert_eq!(compressed(&stream), vec![Interval::new(10, 15, true)]);

        let stream = [
            Interval::new(0, 5, true),
            Interval::new(5, 10, true),
            Interval::new(10, 12, false),
            Interval::new(12, 20, true),
        ];
        assert_eq!(
            compressed(&stream),
            vec![Interval::new(0, 10, true), Interval::new(12, 20, true)]
        );
    }

    #[test]
    fn test_merges_equal_numbers_only() {
        let stream = [
            Interval::new(0, 5, 1.0),
            Interval::new(5, 10, 1.0),
            Interval::new(10, 20, 2.0),
            Interval::new(20, 30, 0.0),
        ];
        assert_eq!(
            compressed(&stream),
            vec![
                Interval::new(0, 10, 1.0),
                Interval::new(10, 20, 2.0),
                Interval::new(20, 30, 0.0),
            ]
        );

        // 1.0 and true never merge
        let stream = [Interval::new(0, 5, 1.0), Interval::new(5, 10, true)];
        assert_eq!(compressed(&stream).len(), 2);
    }

    #[test]
    fn test_idempotent() {
        let stream = [
            Interval::new(0, 3, true),
            Interval::new(3, 7, true),
            Interval::new(7, 9, false),
            Interval::new(9, 11, 4.0),
            Interval::new(11, 13, 4.0),
            Interval::new(13, 20, true),
        ];
        let once = compressed(&stream);
        let twice: Vec<Interval> = compress(compress(ok(&stream)))
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(once, twice);
        assert!(once.iter().all(|i| i.value != Value::Bool(false)));
    }

    #[test]
    fn test_empty() {
        assert!(compressed(&[]).is_empty());
        assert!(compressed(&[Interval::new(0, 10, false)]).is_empty());
    }

    #[test]
    fn test_flushes_before_error() {
        let mut stream = ok(&[Interval::new(0, 5, true), Interval::new(5, 10, true)]);
        stream.push(Err(EvaluationError::DivisionByZero { start: 10, end: 20 }.into()));
        stream.push(Ok(Interval::new(20, 30, true)));

        let out: Vec<_> = compress(stream).collect();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap(), &Interval::new(0, 10, true));
        assert!(matches!(
            out[1],
            Err(QueryError::Evaluation(EvaluationError::DivisionByZero { .. }))
        ));
    }

    proptest::prop_compose! {
        /// Touching intervals from 0 with a handful of repeating values
        fn arb_stream()(
            steps in proptest::collection::vec((1i64..10, 0usize..5), 0..40),
        ) -> Vec<Interval> {
            let choices = [
                Value::Bool(false),
                Value::Bool(true),
                Value::Number(0.0),
                Value::Number(1.0),
                Value::Number(2.0),
            ];
            let mut start = 0;
            steps
                .into_iter()
                .map(|(length, choice)| {
                    let interval = Interval::new(start, start + length, choices[choice]);
                    start += length;
                    interval
                })
                .collect()
        }
    }

    proptest::proptest! {
        #[test]
        fn compress_is_idempotent(stream in arb_stream()) {
            let once = compressed(&stream);
            assert_eq!(compressed(&once), once);
        }

        #[test]
        fn compress_keeps_every_value_but_false(stream in arb_stream()) {
            let once = compressed(&stream);
            assert!(once.iter().all(|i| !i.value.is_false()));
            for pair in once.windows(2) {
                assert!(pair[0].end <= pair[1].start);
                assert!(pair[0].end < pair[1].start || pair[0].value != pair[1].value);
            }

            let kept = |intervals: &[Interval]| -> i64 {
                intervals
                    .iter()
                    .filter(|i| !i.value.is_false())
                    .map(|i| i.end - i.start)
                    .sum()
            };
            assert_eq!(kept(&once[..]), kept(&stream[..]));
        }
    }
}
