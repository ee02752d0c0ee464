//! Query Abstract Syntax Tree
//!
//! Defines the expression tree for the archive query language: arithmetic,
//! comparison and logical operators over archive variables and numeric
//! literals.
//!
//! # Example Queries
//!
//! ```text
//! IBCAD00CRCUR6 > 50
//! HALLD:p > 100 && (IBCAD00CRCUR6 - 5) * 2 >= 10
//! !(beam:energy < 11.5)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Binary operators, resolved once at parse time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `//` floor division
    FloorDiv,
    /// `%` floor modulo
    Mod,
    /// `**`
    Pow,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `&&`
    And,
    /// `||`
    Or,
}

impl BinaryOp {
    /// Binding strength; higher binds tighter. Equal ranks group left-to-right.
    pub fn precedence(&self) -> u8 {
        match self {
            Self::Or => 1,
            Self::And => 2,
            Self::Eq | Self::Ne | Self::Lt | Self::Lte | Self::Gt | Self::Gte => 3,
            Self::Add | Self::Sub => 4,
            Self::Mul | Self::Div | Self::FloorDiv | Self::Mod => 5,
            Self::Pow => 6,
        }
    }

    /// Parse from the operator's source symbol
    pub fn from_symbol(s: &str) -> Option<Self> {
        match s {
            "+" => Some(Self::Add),
            "-" => Some(Self::Sub),
            "*" => Some(Self::Mul),
            "/" => Some(Self::Div),
            "//" => Some(Self::FloorDiv),
            "%" => Some(Self::Mod),
            "**" => Some(Self::Pow),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Gte),
            "==" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Lte),
            "&&" => Some(Self::And),
            "||" => Some(Self::Or),
            _ => None,
        }
    }

    /// The operator's source symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::Pow => "**",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Prefix operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    /// `+x`, numeric identity
    Plus,
    /// `-x`, numeric negation
    Neg,
    /// `!x`, logical negation
    Not,
}

impl UnaryOp {
    /// Parse from the operator's source symbol
    pub fn from_symbol(s: &str) -> Option<Self> {
        match s {
            "+" => Some(Self::Plus),
            "-" => Some(Self::Neg),
            "!" => Some(Self::Not),
            _ => None,
        }
    }

    /// The operator's source symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Plus => "+",
            Self::Neg => "-",
            Self::Not => "!",
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A parsed query expression
///
/// The tree is immutable once built and every node owns its children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// Numeric constant
    Literal(f64),
    /// Archive variable, looked up in the sample source
    Variable(String),
    /// Prefix operator applied to an operand
    Unary(UnaryOp, Box<Expr>),
    /// Infix operator applied to two operands
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// Function call; parsed, never evaluated
    Call(String, Vec<Expr>),
}

impl Expr {
    /// Create a literal node
    pub fn literal(value: f64) -> Self {
        Self::Literal(value)
    }

    /// Create a variable node
    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable(name.into())
    }

    /// Create a unary node
    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Self::Unary(op, Box::new(operand))
    }

    /// Create a binary node
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Self::Binary(op, Box::new(left), Box::new(right))
    }

    /// Create a call node
    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::Call(name.into(), args)
    }

    /// True for literals and variables
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Literal(_) | Self::Variable(_))
    }

    /// Distinct variable names in left-to-right order of first appearance
    pub fn variables(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_variables(&mut names);
        names
    }

    fn collect_variables<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Self::Literal(_) => {}
            Self::Variable(name) => {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
            Self::Unary(_, operand) => operand.collect_variables(names),
            Self::Binary(_, left, right) => {
                left.collect_variables(names);
                right.collect_variables(names);
            }
            Self::Call(_, args) => {
                for arg in args {
                    arg.collect_variables(names);
                }
            }
        }
    }

    /// Nesting depth of the tree (a leaf has depth 1)
    pub fn depth(&self) -> usize {
        match self {
            Self::Literal(_) | Self::Variable(_) => 1,
            Self::Unary(_, operand) => 1 + operand.depth(),
            Self::Binary(_, left, right) => 1 + left.depth().max(right.depth()),
            Self::Call(_, args) => 1 + args.iter().map(Expr::depth).max().unwrap_or(0),
        }
    }
}

/// Renders the fully parenthesized form: every binary node is wrapped.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => write!(f, "{}", value),
            Self::Variable(name) => f.write_str(name),
            Self::Unary(op, operand) => write!(f, "{}{}", op, operand),
            Self::Binary(op, left, right) => write!(f, "({} {} {})", left, op, right),
            Self::Call(name, args) => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
        }
    }
}
