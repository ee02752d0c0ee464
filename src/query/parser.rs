//! Query Parser
//!
//! Parses archive query strings into an [`Expr`] tree.
//!
//! # Supported Syntax
//!
//! ```text
//! expr     := operand (binop operand)*
//! operand  := ('+' | '-' | '!')* primary
//! primary  := number | identifier | identifier '(' [expr (',' expr)*] ')' | '(' expr ')'
//! ```
//!
//! Binary operators, lowest to highest precedence:
//!
//! ```text
//! ||   &&   == != < <= > >=   + -   * / // %   **
//! ```
//!
//! Operators of equal precedence group left-to-right, `**` included, so
//! `2**3**2` is `(2**3)**2`. Prefix operators bind tighter than every binary
//! operator: `-2**2` is `(-2)**2`.
//!
//! # Examples
//!
//! ```text
//! IBCAD00CRCUR6 > 50
//! HALLD:p > 100 && (IBCAD00CRCUR6 - 5) * 2 >= 10
//! !(beam:energy < 11.5)
//! ```

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit0, digit1, one_of},
    combinator::{opt, recognize, value},
    sequence::{pair, tuple},
    IResult,
};

use crate::query::ast::{BinaryOp, Expr, UnaryOp};
use crate::query::error::SyntaxError;

/// Deepest expression tree, and deepest nesting of parentheses and prefix
/// operators, accepted before the parser gives up
const MAX_NESTING: usize = 256;

/// Parse a query string into an expression tree
pub fn parse(text: &str) -> Result<Expr, SyntaxError> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err(SyntaxError::MalformedOperand {
            offset: 0,
            reason: "empty expression".to_string(),
        });
    }

    let mut parser = Parser {
        text,
        tokens,
        pos: 0,
        nesting: 0,
    };
    let expr = parser.expression(1)?;

    match parser.next_token() {
        None => Ok(expr),
        Some(Token {
            kind: TokenKind::RParen,
            offset,
            ..
        }) => Err(SyntaxError::UnbalancedParentheses { offset }),
        Some(token) => Err(SyntaxError::MalformedOperand {
            offset: token.offset,
            reason: format!("unexpected '{}'", parser.lexeme(&token)),
        }),
    }
}

impl std::str::FromStr for Expr {
    type Err = SyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Number(f64),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    offset: usize,
    len: usize,
}

impl Token {
    fn end(&self) -> usize {
        self.offset + self.len
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || matches!(c, '.' | ':' | '_')
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | ':' | '_')
}

fn is_operator_char(c: char) -> bool {
    "+-*/%=!<>&|".contains(c)
}

/// Unsigned numeric literal: `12`, `1.5`, `3.`, `.25`, `2e-3`
fn number(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        alt((
            recognize(pair(digit1, opt(pair(char('.'), digit0)))),
            recognize(pair(char('.'), digit1)),
        )),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    )))(input)
}

/// Archive variable name: `[A-Za-z.:_][A-Za-z0-9.:_]*`
fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(take_while1(is_ident_start), take_while(is_ident_char)))(input)
}

/// Operator symbol, longest match first
fn operator(input: &str) -> IResult<&str, &'static str> {
    alt((
        value("**", tag("**")),
        value("//", tag("//")),
        value("==", tag("==")),
        value("!=", tag("!=")),
        value("<=", tag("<=")),
        value(">=", tag(">=")),
        value("&&", tag("&&")),
        value("||", tag("||")),
        value("+", tag("+")),
        value("-", tag("-")),
        value("*", tag("*")),
        value("/", tag("/")),
        value("%", tag("%")),
        value("<", tag("<")),
        value(">", tag(">")),
        value("!", tag("!")),
    ))(input)
}

fn punctuation(input: &str) -> IResult<&str, TokenKind> {
    alt((
        value(TokenKind::LParen, char('(')),
        value(TokenKind::RParen, char(')')),
        value(TokenKind::Comma, char(',')),
    ))(input)
}

fn tokenize(text: &str) -> Result<Vec<Token>, SyntaxError> {
    let mut tokens = Vec::new();
    let mut rest = text.trim_start();

    while !rest.is_empty() {
        let offset = text.len() - rest.len();

        let (tail, kind) = if let Ok((tail, lexeme)) = number(rest) {
            if tail.starts_with(is_ident_char) {
                let run = tail.find(|c: char| !is_ident_char(c)).unwrap_or(tail.len());
                return Err(SyntaxError::MalformedOperand {
                    offset,
                    reason: format!("invalid numeric literal '{}'", &rest[..lexeme.len() + run]),
                });
            }
            let number = lexeme
                .parse::<f64>()
                .map_err(|_| SyntaxError::MalformedOperand {
                    offset,
                    reason: format!("invalid numeric literal '{}'", lexeme),
                })?;
            (tail, TokenKind::Number(number))
        } else if let Ok((tail, name)) = identifier(rest) {
            (tail, TokenKind::Ident(name.to_string()))
        } else if let Ok((tail, symbol)) = operator(rest) {
            (tail, TokenKind::Op(symbol))
        } else if let Ok((tail, kind)) = punctuation(rest) {
            (tail, kind)
        } else {
            return Err(unrecognized(rest, offset));
        };

        tokens.push(Token {
            kind,
            offset,
            len: rest.len() - tail.len(),
        });
        rest = tail.trim_start();
    }

    Ok(tokens)
}

fn unrecognized(rest: &str, offset: usize) -> SyntaxError {
    match rest.chars().next() {
        Some(c) if is_operator_char(c) => {
            let run = rest.find(|c: char| !is_operator_char(c)).unwrap_or(rest.len());
            SyntaxError::UnknownOperator {
                operator: rest[..run].to_string(),
                offset,
            }
        }
        Some(c) => SyntaxError::MalformedOperand {
            offset,
            reason: format!("unexpected character '{}'", c),
        },
        None => SyntaxError::MalformedOperand {
            offset,
            reason: "unexpected end of expression".to_string(),
        },
    }
}

/// Precedence-climbing parser over the token list
struct Parser<'t> {
    text: &'t str,
    tokens: Vec<Token>,
    pos: usize,
    nesting: usize,
}

impl<'t> Parser<'t> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next_token(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn lexeme(&self, token: &Token) -> &'t str {
        &self.text[token.offset..token.end()]
    }

    fn unexpected_end(&self) -> SyntaxError {
        SyntaxError::MalformedOperand {
            offset: self.text.len(),
            reason: "unexpected end of expression".to_string(),
        }
    }

    fn too_deep(&self, offset: usize) -> SyntaxError {
        SyntaxError::MalformedOperand {
            offset,
            reason: format!("expression nested deeper than {} levels", MAX_NESTING),
        }
    }

    fn enter(&mut self) -> Result<(), SyntaxError> {
        self.nesting += 1;
        if self.nesting > MAX_NESTING {
            let offset = self.peek().map(|t| t.offset).unwrap_or(self.text.len());
            return Err(self.too_deep(offset));
        }
        Ok(())
    }

    /// Reject a freshly built node whose tree is too deep to evaluate
    fn bounded(&self, expr: Expr, offset: usize) -> Result<Expr, SyntaxError> {
        if expr.depth() > MAX_NESTING {
            return Err(self.too_deep(offset));
        }
        Ok(expr)
    }

    /// Parse operands joined by operators of at least `min_precedence`
    fn expression(&mut self, min_precedence: u8) -> Result<Expr, SyntaxError> {
        self.enter()?;
        let mut left = self.unary()?;
        // Depth of `left`, kept up to date so long chains are not rescanned
        let mut depth = left.depth();
        while let Some(op) = self.binary_operator()? {
            if op.precedence() < min_precedence {
                break;
            }
            let offset = self.peek().map(|t| t.offset).unwrap_or(self.text.len());
            self.pos += 1;
            let right = self.expression(op.precedence() + 1)?;
            depth = 1 + depth.max(right.depth());
            if depth > MAX_NESTING {
                return Err(self.too_deep(offset));
            }
            left = Expr::binary(op, left, right);
        }

        self.nesting -= 1;
        Ok(left)
    }

    /// Look at the token after an operand without consuming it
    fn binary_operator(&self) -> Result<Option<BinaryOp>, SyntaxError> {
        let Some(token) = self.peek() else {
            return Ok(None);
        };
        match &token.kind {
            TokenKind::RParen | TokenKind::Comma => Ok(None),
            TokenKind::Op(symbol) => BinaryOp::from_symbol(symbol).map(Some).ok_or_else(|| {
                SyntaxError::UnknownOperator {
                    operator: symbol.to_string(),
                    offset: token.offset,
                }
            }),
            _ => Err(SyntaxError::MalformedOperand {
                offset: token.offset,
                reason: format!("expected an operator before '{}'", self.lexeme(token)),
            }),
        }
    }

    fn unary(&mut self) -> Result<Expr, SyntaxError> {
        let Some(token) = self.peek().cloned() else {
            return Err(self.unexpected_end());
        };

        let TokenKind::Op(symbol) = token.kind else {
            return self.primary();
        };
        let Some(op) = UnaryOp::from_symbol(symbol) else {
            return Err(self.misplaced_operator(&token));
        };
        self.pos += 1;
        self.enter()?;
        let operand = self.unary()?;
        self.nesting -= 1;

        // A sign directly on a number is part of the literal
        match (op, operand) {
            (UnaryOp::Neg, Expr::Literal(v)) => Ok(Expr::Literal(-v)),
            (UnaryOp::Plus, Expr::Literal(v)) => Ok(Expr::Literal(v)),
            (op, operand) => self.bounded(Expr::unary(op, operand), token.offset),
        }
    }

    /// A binary-only operator where an operand should start
    fn misplaced_operator(&self, token: &Token) -> SyntaxError {
        let previous = self.pos.checked_sub(1).and_then(|i| self.tokens.get(i));
        match previous {
            Some(prev) if matches!(prev.kind, TokenKind::Op(_)) && prev.end() == token.offset => {
                SyntaxError::UnknownOperator {
                    operator: self.text[prev.offset..token.end()].to_string(),
                    offset: prev.offset,
                }
            }
            _ => SyntaxError::MalformedOperand {
                offset: token.offset,
                reason: format!("missing operand before '{}'", self.lexeme(token)),
            },
        }
    }

    fn primary(&mut self) -> Result<Expr, SyntaxError> {
        let Some(token) = self.next_token() else {
            return Err(self.unexpected_end());
        };
        let (offset, end) = (token.offset, token.end());

        match token.kind {
            TokenKind::Number(v) => Ok(Expr::Literal(v)),
            TokenKind::Ident(name) => match self.peek() {
                Some(next) if next.kind == TokenKind::LParen && next.offset == end => {
                    let open = next.offset;
                    self.pos += 1;
                    self.call(name, open)
                }
                _ => Ok(Expr::Variable(name)),
            },
            TokenKind::LParen => {
                let inner = self.expression(1)?;
                self.close(offset)?;
                Ok(inner)
            }
            TokenKind::RParen | TokenKind::Comma | TokenKind::Op(_) => {
                Err(SyntaxError::MalformedOperand {
                    offset,
                    reason: format!("missing operand before '{}'", &self.text[offset..end]),
                })
            }
        }
    }

    fn close(&mut self, open: usize) -> Result<(), SyntaxError> {
        match self.next_token() {
            Some(Token {
                kind: TokenKind::RParen,
                ..
            }) => Ok(()),
            None => Err(SyntaxError::UnbalancedParentheses { offset: open }),
            Some(token) => Err(SyntaxError::MalformedOperand {
                offset: token.offset,
                reason: format!("unexpected '{}'", self.lexeme(&token)),
            }),
        }
    }

    /// Arguments of `name(`, the opening parenthesis already consumed
    fn call(&mut self, name: String, open: usize) -> Result<Expr, SyntaxError> {
        let mut args = Vec::new();
        if matches!(
            self.peek(),
            Some(Token {
                kind: TokenKind::RParen,
                ..
            })
        ) {
            self.pos += 1;
            return Ok(Expr::call(name, args));
        }
        let offset = open.saturating_sub(name.len());

        loop {
            args.push(self.expression(1)?);
            match self.next_token() {
                Some(Token {
                    kind: TokenKind::Comma,
                    ..
                }) => continue,
                Some(Token {
                    kind: TokenKind::RParen,
                    ..
                }) => return self.bounded(Expr::call(name, args), offset),
                None => return Err(SyntaxError::UnbalancedParentheses { offset: open }),
                Some(token) => {
                    return Err(SyntaxError::MalformedOperand {
                        offset: token.offset,
                        reason: format!("unexpected '{}'", self.lexeme(&token)),
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grouped(text: &str) -> String {
        parse(text).unwrap().to_string()
    }

    #[test]
    fn test_parse_leaves() {
        assert_eq!(parse("42").unwrap(), Expr::Literal(42.0));
        assert_eq!(parse("1.5e3").unwrap(), Expr::Literal(1500.0));
        assert_eq!(parse(".25").unwrap(), Expr::Literal(0.25));
        assert_eq!(parse("3.").unwrap(), Expr::Literal(3.0));
        assert_eq!(parse("-4").unwrap(), Expr::Literal(-4.0));
        assert_eq!(parse("+2e-1").unwrap(), Expr::Literal(0.2));
        assert_eq!(parse("IBCAD00CRCUR6").unwrap(), Expr::variable("IBCAD00CRCUR6"));
        assert_eq!(parse("HALLD:p.VAL").unwrap(), Expr::variable("HALLD:p.VAL"));
        assert_eq!(parse("_x").unwrap(), Expr::variable("_x"));
        assert_eq!(parse(".x").unwrap(), Expr::variable(".x"));
        // Looks numeric but is a name
        assert_eq!(parse("e5").unwrap(), Expr::variable("e5"));
    }

    #[test]
    fn test_parse_precedence() {
        assert_eq!(parse("2+3*4").unwrap(), parse("2+(3*4)").unwrap());
        assert_eq!(grouped("2+3*4"), "(2 + (3 * 4))");
        assert_eq!(grouped("A > 10 && B < 5"), "((A > 10) && (B < 5))");
        assert_eq!(grouped("a || b && c"), "(a || (b && c))");
        assert_eq!(grouped("a && b || c"), "((a && b) || c)");
        assert_eq!(grouped("A + 1 >= B * 2 ** C"), "((A + 1) >= (B * (2 ** C)))");
        assert_eq!(grouped("x % 2 == 0 || y != 1"), "(((x % 2) == 0) || (y != 1))");
    }

    #[test]
    fn test_parse_left_to_right() {
        assert_eq!(grouped("1-2-3"), "((1 - 2) - 3)");
        assert_eq!(grouped("8/4/2"), "((8 / 4) / 2)");
        assert_eq!(grouped("7//2%3*A"), "(((7 // 2) % 3) * A)");
        assert_eq!(grouped("a < b == c"), "((a < b) == c)");
    }

    #[test]
    fn test_parse_power_groups_left() {
        // Exponentiation is not right-associative here
        assert_eq!(parse("2**3**2").unwrap(), parse("(2**3)**2").unwrap());
        assert_ne!(parse("2**3**2").unwrap(), parse("2**(3**2)").unwrap());
        assert_eq!(grouped("2**3**2"), "((2 ** 3) ** 2)");
    }

    #[test]
    fn test_parse_unary() {
        // Prefix binds tighter than **
        assert_eq!(
            parse("-2**2").unwrap(),
            Expr::binary(BinaryOp::Pow, Expr::Literal(-2.0), Expr::Literal(2.0))
        );
        assert_eq!(grouped("-A**2"), "(-A ** 2)");
        assert_eq!(grouped("A*-B"), "(A * -B)");
        assert_eq!(grouped("A - -3"), "(A - -3)");
        assert_eq!(grouped("!(A > 1) || B"), "(!(A > 1) || B)");
        assert_eq!(grouped("- -A"), "--A");
        assert_eq!(grouped("-(A + B)"), "-(A + B)");
        assert_eq!(parse("--3").unwrap(), Expr::Literal(3.0));
        assert_eq!(
            parse("!A").unwrap(),
            Expr::unary(UnaryOp::Not, Expr::variable("A"))
        );
    }

    #[test]
    fn test_parse_nested_parentheses() {
        assert_eq!(grouped("((A))"), "A");
        assert_eq!(grouped("(A + (B - C)) * D"), "((A + (B - C)) * D)");
        assert_eq!(grouped("  ( 1 +2 )  *3 "), "((1 + 2) * 3)");
    }

    #[test]
    fn test_parse_call() {
        assert_eq!(
            parse("f(A, 2+3)").unwrap(),
            Expr::call(
                "f",
                vec![
                    Expr::variable("A"),
                    Expr::binary(BinaryOp::Add, Expr::Literal(2.0), Expr::Literal(3.0)),
                ]
            )
        );
        assert_eq!(parse("now()").unwrap(), Expr::call("now", vec![]));
        assert_eq!(grouped("g(f(A)) > 2 * h(B)"), "(g(f(A)) > (2 * h(B)))");
    }

    #[test]
    fn test_from_str() {
        let expr: Expr = "A + 1".parse().unwrap();
        assert_eq!(expr.to_string(), "(A + 1)");
    }

    #[test]
    fn test_unbalanced_parentheses() {
        assert_eq!(
            parse("(A + B"),
            Err(SyntaxError::UnbalancedParentheses { offset: 0 })
        );
        assert_eq!(
            parse("A + B)"),
            Err(SyntaxError::UnbalancedParentheses { offset: 5 })
        );
        assert_eq!(
            parse("((A)"),
            Err(SyntaxError::UnbalancedParentheses { offset: 0 })
        );
        assert_eq!(
            parse("f(A, B"),
            Err(SyntaxError::UnbalancedParentheses { offset: 1 })
        );
    }

    #[test]
    fn test_unknown_operator() {
        assert_eq!(
            parse("A = B"),
            Err(SyntaxError::UnknownOperator {
                operator: "=".to_string(),
                offset: 2
            })
        );
        assert_eq!(
            parse("A <> B"),
            Err(SyntaxError::UnknownOperator {
                operator: "<>".to_string(),
                offset: 2
            })
        );
        assert!(matches!(
            parse("A & B"),
            Err(SyntaxError::UnknownOperator { .. })
        ));
        assert!(matches!(
            parse("A ! B"),
            Err(SyntaxError::UnknownOperator { .. })
        ));
        assert!(matches!(
            parse("A +* B"),
            Err(SyntaxError::UnknownOperator { .. })
        ));
    }

    #[test]
    fn test_malformed_operand() {
        for text in ["", "   ", "A B", "3abc", "1.5.2", "()", "A +", "A + * B", "f (A)", "f(A,)", "1 $ 2", "A, B"] {
            assert!(
                matches!(parse(text), Err(SyntaxError::MalformedOperand { .. })),
                "expected malformed operand for {:?}, got {:?}",
                text,
                parse(text)
            );
        }
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}1{}", "(".repeat(1000), ")".repeat(1000));
        assert!(matches!(
            parse(&deep),
            Err(SyntaxError::MalformedOperand { .. })
        ));

        let signs = format!("{}A", "-".repeat(1000));
        assert!(matches!(
            parse(&signs),
            Err(SyntaxError::MalformedOperand { .. })
        ));

        let fine = format!("{}1{}", "(".repeat(50), ")".repeat(50));
        assert_eq!(parse(&fine).unwrap(), Expr::Literal(1.0));
    }

    #[test]
    fn test_flat_chain_depth_limit() {
        let long = vec!["1"; 10_000].join("+");
        assert!(matches!(
            parse(&long),
            Err(SyntaxError::MalformedOperand { .. })
        ));

        let conditions = (0..5_000)
            .map(|i| format!("A == {}", i))
            .collect::<Vec<_>>()
            .join(" || ");
        assert!(matches!(
            parse(&conditions),
            Err(SyntaxError::MalformedOperand { .. })
        ));

        // 256 terms fold into a tree exactly MAX_NESTING deep
        let widest = vec!["1"; MAX_NESTING].join("+");
        assert_eq!(parse(&widest).unwrap().depth(), MAX_NESTING);
        let too_wide = vec!["1"; MAX_NESTING + 1].join("+");
        assert!(parse(&too_wide).is_err());
    }

    #[test]
    fn test_depth_limit_across_parentheses() {
        // Each chain stays under the limit on its own, the whole tree does not
        let chain = vec!["A"; 200].join("+");
        let wrapped = format!("{}{}{}", "-(".repeat(100), chain, ")".repeat(100));
        assert!(matches!(
            parse(&wrapped),
            Err(SyntaxError::MalformedOperand { .. })
        ));

        let nested_calls = format!("{}A{}", "f(".repeat(200), ")".repeat(200));
        assert!(parse(&nested_calls).is_ok());
        let chained_call = format!("f({})", vec!["A"; MAX_NESTING].join("+"));
        assert!(parse(&chained_call).is_err());
    }
}
