//! Range Evaluator
//!
//! Evaluates an expression tree over a window `[t0, t1)` into a lazy stream
//! of contiguous intervals. Every node type is a pull iterator; binary nodes
//! re-evaluate their right operand once per left interval, so the stream of
//! a node never fetches more than the intervals pulled from it require.

use crate::query::{BinaryOp, EvaluationError, Expr, QueryResult, UnaryOp};
use crate::ranges::{Interval, Value, ValueKind};
use crate::source::{Sample, SampleSource};
use std::iter::{self, FusedIterator};

/// Lazy interval stream of one evaluation
///
/// An error is always the last item.
pub type Ranges<'a> = Box<dyn Iterator<Item = QueryResult<Interval>> + 'a>;

/// Evaluate `expr` over `[t0, t1)`, drawing variable samples from `source`
///
/// An empty window (`t0 >= t1`) yields an empty stream. Nothing is fetched
/// until the stream is pulled.
pub fn evaluate<'a>(
    expr: &'a Expr,
    source: &'a dyn SampleSource,
    t0: i64,
    t1: i64,
) -> Ranges<'a> {
    if t0 >= t1 {
        return Box::new(iter::empty());
    }

    let ranges: Ranges<'a> = match expr {
        Expr::Literal(value) => Box::new(iter::once(Ok(Interval::new(t0, t1, *value)))),
        Expr::Variable(name) => Box::new(VariableRanges {
            name,
            source,
            t0,
            t1,
            state: VariableState::Pending,
        }),
        Expr::Unary(op, operand) => {
            let op = *op;
            Box::new(
                evaluate(operand, source, t0, t1)
                    .map(move |interval| interval.and_then(|i| apply_unary(op, i))),
            )
        }
        Expr::Binary(op, left, right) => Box::new(BinaryRanges {
            op: *op,
            right,
            source,
            left: evaluate(left, source, t0, t1),
            segment: None,
        }),
        Expr::Call(name, _) => Box::new(iter::once(Err(
            EvaluationError::UnsupportedFunction(name.clone()).into(),
        ))),
    };

    Box::new(Terminate {
        inner: ranges,
        done: false,
    })
}

/// Ends a stream after its first error
struct Terminate<I> {
    inner: I,
    done: bool,
}

impl<I, T> Iterator for Terminate<I>
where
    I: Iterator<Item = QueryResult<T>>,
{
    type Item = QueryResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.inner.next();
        self.done = !matches!(item, Some(Ok(_)));
        item
    }
}

impl<I, T> FusedIterator for Terminate<I> where I: Iterator<Item = QueryResult<T>> {}

enum VariableState {
    Pending,
    Streaming {
        samples: std::vec::IntoIter<Sample>,
        start: i64,
        value: f64,
    },
    Done,
}

/// Piecewise-constant intervals of one archive variable
struct VariableRanges<'a> {
    name: &'a str,
    source: &'a dyn SampleSource,
    t0: i64,
    t1: i64,
    state: VariableState,
}

fn load_variable(
    source: &dyn SampleSource,
    name: &str,
    t0: i64,
    t1: i64,
) -> QueryResult<VariableState> {
    let mut samples = source.fetch(name, t0, t1)?;
    tracing::debug!(name, t0, t1, count = samples.len(), "Fetched variable");

    // Last sample at or before t0 holds at the window start
    let anchor = samples.partition_point(|s| s.timestamp <= t0);
    if anchor == 0 {
        return Err(EvaluationError::UnknownVariable {
            name: name.to_string(),
            t0,
        }
        .into());
    }

    let value = samples[anchor - 1].value;
    let rest = samples.split_off(anchor);
    Ok(VariableState::Streaming {
        samples: rest.into_iter(),
        start: t0,
        value,
    })
}

impl Iterator for VariableRanges<'_> {
    type Item = QueryResult<Interval>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match &mut self.state {
                VariableState::Pending => {
                    match load_variable(self.source, self.name, self.t0, self.t1) {
                        Ok(state) => self.state = state,
                        Err(e) => {
                            self.state = VariableState::Done;
                            return Some(Err(e));
                        }
                    }
                }
                VariableState::Streaming {
                    samples,
                    start,
                    value,
                } => match samples.next() {
                    Some(sample) if sample.timestamp < self.t1 => {
                        // Same timestamp: the later sample wins
                        if sample.timestamp <= *start {
                            *value = sample.value;
                            continue;
                        }
                        let interval = Interval::new(*start, sample.timestamp, *value);
                        *start = sample.timestamp;
                        *value = sample.value;
                        return Some(Ok(interval));
                    }
                    _ => {
                        let interval = Interval::new(*start, self.t1, *value);
                        self.state = VariableState::Done;
                        return Some(Ok(interval));
                    }
                },
                VariableState::Done => return None,
            }
        }
    }
}

/// Left intervals combined with the right operand evaluated over each of them
struct BinaryRanges<'a> {
    op: BinaryOp,
    right: &'a Expr,
    source: &'a dyn SampleSource,
    left: Ranges<'a>,
    segment: Option<(Value, Ranges<'a>)>,
}

impl Iterator for BinaryRanges<'_> {
    type Item = QueryResult<Interval>;

    fn next(&mut self) -> Option<Self::Item> {
        let op = self.op;
        loop {
            if let Some((left, right)) = self.segment.as_mut() {
                if let Some(item) = right.next() {
                    let left = *left;
                    return Some(item.and_then(|r| {
                        let value = combine(op, left, r.value, r.start, r.end)?;
                        Ok(Interval::new(r.start, r.end, value))
                    }));
                }
                self.segment = None;
            }

            match self.left.next()? {
                Ok(l) => {
                    let right = evaluate(self.right, self.source, l.start, l.end);
                    self.segment = Some((l.value, right));
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

fn apply_unary(op: UnaryOp, interval: Interval) -> QueryResult<Interval> {
    let value = match (op, interval.value) {
        (UnaryOp::Plus, Value::Number(n)) => Value::Number(n),
        (UnaryOp::Neg, Value::Number(n)) => Value::Number(-n),
        (UnaryOp::Not, Value::Bool(b)) => Value::Bool(!b),
        (UnaryOp::Not, found) => {
            return Err(type_mismatch(op.symbol(), ValueKind::Boolean, found).into())
        }
        (_, found) => return Err(type_mismatch(op.symbol(), ValueKind::Number, found).into()),
    };
    Ok(Interval {
        value,
        ..interval
    })
}

/// Apply a binary operator to the values of one interval `[start, end)`
fn combine(
    op: BinaryOp,
    left: Value,
    right: Value,
    start: i64,
    end: i64,
) -> Result<Value, EvaluationError> {
    match op {
        BinaryOp::And => logical(op, left, right, |a, b| a && b),
        BinaryOp::Or => logical(op, left, right, |a, b| a || b),
        BinaryOp::Gt => compare(op, left, right, |a, b| a > b),
        BinaryOp::Gte => compare(op, left, right, |a, b| a >= b),
        BinaryOp::Eq => compare(op, left, right, |a, b| a == b),
        BinaryOp::Ne => compare(op, left, right, |a, b| a != b),
        BinaryOp::Lt => compare(op, left, right, |a, b| a < b),
        BinaryOp::Lte => compare(op, left, right, |a, b| a <= b),
        BinaryOp::Add => arithmetic(op, left, right, |a, b| a + b),
        BinaryOp::Sub => arithmetic(op, left, right, |a, b| a - b),
        BinaryOp::Mul => arithmetic(op, left, right, |a, b| a * b),
        BinaryOp::Pow => arithmetic(op, left, right, f64::powf),
        BinaryOp::Div => divide(op, left, right, (start, end), |a, b| a / b),
        BinaryOp::FloorDiv => divide(op, left, right, (start, end), |a, b| (a / b).floor()),
        BinaryOp::Mod => divide(op, left, right, (start, end), floor_mod),
    }
}

/// Modulo whose result takes the sign of the divisor
fn floor_mod(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && (r < 0.0) != (b < 0.0) {
        r + b
    } else {
        r
    }
}

fn logical(
    op: BinaryOp,
    left: Value,
    right: Value,
    f: impl Fn(bool, bool) -> bool,
) -> Result<Value, EvaluationError> {
    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(f(a, b))),
        (Value::Bool(_), found) | (found, _) => {
            Err(type_mismatch(op.symbol(), ValueKind::Boolean, found))
        }
    }
}

fn numbers(op: BinaryOp, left: Value, right: Value) -> Result<(f64, f64), EvaluationError> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok((a, b)),
        (Value::Number(_), found) | (found, _) => {
            Err(type_mismatch(op.symbol(), ValueKind::Number, found))
        }
    }
}

fn compare(
    op: BinaryOp,
    left: Value,
    right: Value,
    f: impl Fn(f64, f64) -> bool,
) -> Result<Value, EvaluationError> {
    let (a, b) = numbers(op, left, right)?;
    Ok(Value::Bool(f(a, b)))
}

fn arithmetic(
    op: BinaryOp,
    left: Value,
    right: Value,
    f: impl Fn(f64, f64) -> f64,
) -> Result<Value, EvaluationError> {
    let (a, b) = numbers(op, left, right)?;
    Ok(Value::Number(f(a, b)))
}

fn divide(
    op: BinaryOp,
    left: Value,
    right: Value,
    (start, end): (i64, i64),
    f: impl Fn(f64, f64) -> f64,
) -> Result<Value, EvaluationError> {
    let (a, b) = numbers(op, left, right)?;
    if b == 0.0 {
        return Err(EvaluationError::DivisionByZero { start, end });
    }
    Ok(Value::Number(f(a, b)))
}

fn type_mismatch(operator: &'static str, expected: ValueKind, found: Value) -> EvaluationError {
    EvaluationError::TypeMismatch {
        operator,
        expected,
        found: found.kind(),
    }
}
