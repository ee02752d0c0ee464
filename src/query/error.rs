//! Query error types
//!
//! Defines all error conditions that can occur while parsing a query or
//! evaluating it over an archive window.

use crate::ranges::ValueKind;
use crate::source::FetchError;
use thiserror::Error;

/// Grammar violations found by the parser
///
/// Offsets are byte positions in the query text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyntaxError {
    /// A `(` without its `)` or a stray `)`
    #[error("unbalanced parentheses at offset {offset}")]
    UnbalancedParentheses { offset: usize },

    /// Operator text that is not part of the language
    #[error("unknown operator '{operator}' at offset {offset}")]
    UnknownOperator { operator: String, offset: usize },

    /// Missing, misplaced or unreadable operand
    #[error("malformed operand at offset {offset}: {reason}")]
    MalformedOperand { offset: usize, reason: String },
}

/// Failures raised while combining interval streams
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    /// The variable has no sample at or before the window start
    #[error("unknown variable {name}: no sample at or before {t0}")]
    UnknownVariable { name: String, t0: i64 },

    /// `/`, `//` or `%` with a zero divisor
    #[error("division by zero in [{start}, {end})")]
    DivisionByZero { start: i64, end: i64 },

    /// Operand of the wrong kind for the operator
    #[error("type mismatch: '{operator}' expects {expected} operands, found {found}")]
    TypeMismatch {
        operator: &'static str,
        expected: ValueKind,
        found: ValueKind,
    },

    /// Function calls parse but no functions are defined
    #[error("unsupported function: {0}")]
    UnsupportedFunction(String),
}

/// Errors that can occur during query operations
#[derive(Error, Debug)]
pub enum QueryError {
    /// Query text could not be parsed
    #[error("Syntax error: {0}")]
    Syntax(#[from] SyntaxError),

    /// Interval evaluation failed
    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    /// Sample source failure, passed through unchanged
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;
