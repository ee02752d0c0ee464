//! archiveql Query Language
//!
//! Infix expressions over archive variables:
//!
//! - **AST**: expression tree and operator enums
//! - **Parser**: parse query strings into the AST
//! - **Error**: syntax, evaluation and fetch errors
//!
//! # Query Language
//!
//! ```text
//! arithmetic:  + - * / // % **
//! comparison:  > >= == != < <=
//! logical:     && || !
//! ```
//!
//! Variables are archive channel names (`IBCAD00CRCUR6`, `HALLD:p.VAL`);
//! numbers are literals. Parentheses override precedence.
//!
//! # Examples
//!
//! ```rust
//! use archiveql::query::parse;
//!
//! let expr = parse("A > 10 && B < 5").unwrap();
//! assert_eq!(expr.to_string(), "((A > 10) && (B < 5))");
//! ```

mod ast;
mod error;
mod parser;

pub use ast::{BinaryOp, Expr, UnaryOp};
pub use error::{EvaluationError, QueryError, QueryResult, SyntaxError};
pub use parser::parse;
