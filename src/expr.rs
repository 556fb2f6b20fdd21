//! Predicate language over the feature table.
//!
//! A small column-algebra grammar (literals, column names, comparisons,
//! boolean connectives, arithmetic, parentheses, unary minus) parsed into an
//! AST and interpreted against the column arrays into a boolean row mask.
//! There is no dynamic code execution; unknown identifiers fail at parse
//! time with the offending position.
//!
//! Identifiers cover every table column plus:
//! - `MA1` / `MA2` / `MA3` as aliases for the stored EMA price columns
//! - one- and two-bar shifted variants: `open1`, `close2`, `direction1`,
//!   `MA1_1`, `MA3_2`, ...
//! - backtick quoting for punctuated column names: `` `EMA_rrDistance(20)` ``
//!
//! Comparisons against an undefined (warmup/forward-trim) cell are false,
//! matching the NaN semantics of the source data.

use crate::error::{RenkoError, Result};
use crate::table::{shift, FeatureTable};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A named predicate expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalDef {
    pub name: String,
    pub expression: String,
}

/// Row indices matching each named predicate, with per-signal errors kept
/// separate so one bad expression does not sink the batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalMatches {
    pub signals: HashMap<String, Vec<usize>>,
    pub errors: HashMap<String, String>,
}

/// Evaluate every signal against the table.
pub fn evaluate_signals(table: &FeatureTable, signals: &[SignalDef]) -> SignalMatches {
    let mut out = SignalMatches::default();
    for signal in signals {
        if signal.expression.trim().is_empty() {
            continue;
        }
        match matching_indices(table, &signal.expression) {
            Ok(indices) => {
                out.signals.insert(signal.name.clone(), indices);
            }
            Err(e) => {
                out.errors.insert(signal.name.clone(), e.to_string());
            }
        }
    }
    out
}

/// Row indices where the predicate holds.
pub fn matching_indices(table: &FeatureTable, expression: &str) -> Result<Vec<usize>> {
    let mask = evaluate_predicate(table, expression)?;
    Ok(mask
        .iter()
        .enumerate()
        .filter_map(|(i, &m)| if m { Some(i) } else { None })
        .collect())
}

/// Evaluate a predicate string into a boolean row mask.
pub fn evaluate_predicate(table: &FeatureTable, expression: &str) -> Result<Vec<bool>> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
    };
    let ast = parser.parse_expr()?;
    parser.expect_end()?;

    let mut ctx = EvalContext {
        table,
        cache: HashMap::new(),
    };
    ctx.validate(&ast)?;
    match ctx.eval(&ast)? {
        Value::Mask(mask) => Ok(mask),
        Value::Series(_) | Value::Scalar(_) => Err(RenkoError::InvalidExpression {
            position: 0,
            message: "expression is numeric, not a condition".to_string(),
        }),
    }
}

// ── Lexer ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Number(f64),
    Ident(String),
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    And,
    Or,
    Not,
}

#[derive(Debug, Clone)]
struct SpannedTok {
    tok: Tok,
    pos: usize,
}

fn err_at(position: usize, message: impl Into<String>) -> RenkoError {
    RenkoError::InvalidExpression {
        position,
        message: message.into(),
    }
}

fn tokenize(input: &str) -> Result<Vec<SpannedTok>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let pos = i;
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                i += 1;
            }
            '(' => {
                tokens.push(SpannedTok { tok: Tok::LParen, pos });
                i += 1;
            }
            ')' => {
                tokens.push(SpannedTok { tok: Tok::RParen, pos });
                i += 1;
            }
            '+' => {
                tokens.push(SpannedTok { tok: Tok::Plus, pos });
                i += 1;
            }
            '-' => {
                tokens.push(SpannedTok { tok: Tok::Minus, pos });
                i += 1;
            }
            '*' => {
                tokens.push(SpannedTok { tok: Tok::Star, pos });
                i += 1;
            }
            '/' => {
                tokens.push(SpannedTok { tok: Tok::Slash, pos });
                i += 1;
            }
            '&' => {
                tokens.push(SpannedTok { tok: Tok::And, pos });
                i += 1;
            }
            '|' => {
                tokens.push(SpannedTok { tok: Tok::Or, pos });
                i += 1;
            }
            '~' => {
                tokens.push(SpannedTok { tok: Tok::Not, pos });
                i += 1;
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(SpannedTok { tok: Tok::Eq, pos });
                    i += 2;
                } else {
                    return Err(err_at(pos, "single '=' (use '==')"));
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(SpannedTok { tok: Tok::Ne, pos });
                    i += 2;
                } else {
                    return Err(err_at(pos, "unexpected '!'"));
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(SpannedTok { tok: Tok::Le, pos });
                    i += 2;
                } else {
                    tokens.push(SpannedTok { tok: Tok::Lt, pos });
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(SpannedTok { tok: Tok::Ge, pos });
                    i += 2;
                } else {
                    tokens.push(SpannedTok { tok: Tok::Gt, pos });
                    i += 1;
                }
            }
            '`' => {
                let start = i + 1;
                let mut j = start;
                while j < chars.len() && chars[j] != '`' {
                    j += 1;
                }
                if j >= chars.len() {
                    return Err(err_at(pos, "unterminated backtick identifier"));
                }
                let name: String = chars[start..j].iter().collect();
                tokens.push(SpannedTok { tok: Tok::Ident(name), pos });
                i = j + 1;
            }
            _ if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_digit()
                        || chars[i] == '.'
                        || chars[i] == 'e'
                        || chars[i] == 'E'
                        || ((chars[i] == '+' || chars[i] == '-')
                            && matches!(chars.get(i.wrapping_sub(1)).copied(), Some('e' | 'E'))))
                {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| err_at(start, format!("bad number literal '{text}'")))?;
                tokens.push(SpannedTok { tok: Tok::Number(value), pos: start });
            }
            _ if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let tok = match word.as_str() {
                    "and" => Tok::And,
                    "or" => Tok::Or,
                    "not" => Tok::Not,
                    _ => Tok::Ident(word),
                };
                tokens.push(SpannedTok { tok, pos: start });
            }
            _ => return Err(err_at(pos, format!("unexpected character '{c}'"))),
        }
    }
    Ok(tokens)
}

// ── Parser ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone)]
enum Ast {
    Number(f64),
    Column { name: String, pos: usize },
    Neg(Box<Ast>),
    Arith { op: ArithOp, lhs: Box<Ast>, rhs: Box<Ast>, pos: usize },
    Cmp { op: CmpOp, lhs: Box<Ast>, rhs: Box<Ast>, pos: usize },
    And(Box<Ast>, Box<Ast>),
    Or(Box<Ast>, Box<Ast>),
    Not { inner: Box<Ast>, pos: usize },
}

struct Parser<'a> {
    tokens: &'a [SpannedTok],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn peek_pos(&self) -> usize {
        self.tokens.get(self.pos).map(|t| t.pos).unwrap_or(usize::MAX)
    }

    fn advance(&mut self) -> Option<&SpannedTok> {
        let t = self.tokens.get(self.pos);
        self.pos += 1;
        t
    }

    fn expect_end(&self) -> Result<()> {
        if self.pos < self.tokens.len() {
            return Err(err_at(self.tokens[self.pos].pos, "unexpected trailing input"));
        }
        Ok(())
    }

    fn parse_expr(&mut self) -> Result<Ast> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Ast> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&Tok::Or) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Ast::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Ast> {
        let mut lhs = self.parse_not()?;
        while self.peek() == Some(&Tok::And) {
            self.advance();
            let rhs = self.parse_not()?;
            lhs = Ast::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Ast> {
        if self.peek() == Some(&Tok::Not) {
            let pos = self.peek_pos();
            self.advance();
            let inner = self.parse_not()?;
            return Ok(Ast::Not { inner: Box::new(inner), pos });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Ast> {
        let lhs = self.parse_additive()?;
        let op = match self.peek() {
            Some(Tok::Eq) => CmpOp::Eq,
            Some(Tok::Ne) => CmpOp::Ne,
            Some(Tok::Lt) => CmpOp::Lt,
            Some(Tok::Le) => CmpOp::Le,
            Some(Tok::Gt) => CmpOp::Gt,
            Some(Tok::Ge) => CmpOp::Ge,
            _ => return Ok(lhs),
        };
        let pos = self.peek_pos();
        self.advance();
        let rhs = self.parse_additive()?;
        Ok(Ast::Cmp {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            pos,
        })
    }

    fn parse_additive(&mut self) -> Result<Ast> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Plus) => ArithOp::Add,
                Some(Tok::Minus) => ArithOp::Sub,
                _ => break,
            };
            let pos = self.peek_pos();
            self.advance();
            let rhs = self.parse_term()?;
            lhs = Ast::Arith {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Ast> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Star) => ArithOp::Mul,
                Some(Tok::Slash) => ArithOp::Div,
                _ => break,
            };
            let pos = self.peek_pos();
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Ast::Arith {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Ast> {
        if self.peek() == Some(&Tok::Minus) {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Ast::Neg(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Ast> {
        let pos = self.peek_pos();
        match self.advance().map(|t| t.tok.clone()) {
            Some(Tok::Number(v)) => Ok(Ast::Number(v)),
            Some(Tok::Ident(name)) => Ok(Ast::Column { name, pos }),
            Some(Tok::LParen) => {
                let inner = self.parse_expr()?;
                match self.advance().map(|t| t.tok.clone()) {
                    Some(Tok::RParen) => Ok(inner),
                    _ => Err(err_at(pos, "unclosed parenthesis")),
                }
            }
            Some(other) => Err(err_at(pos, format!("unexpected token {other:?}"))),
            None => Err(err_at(pos, "unexpected end of expression")),
        }
    }
}

// ── Interpreter ────────────────────────────────────────────────────────────

enum Value {
    Scalar(f64),
    Series(Vec<Option<f64>>),
    Mask(Vec<bool>),
}

struct EvalContext<'a> {
    table: &'a FeatureTable,
    cache: HashMap<String, Vec<Option<f64>>>,
}

impl<'a> EvalContext<'a> {
    /// Check every identifier against the table schema before evaluating.
    fn validate(&mut self, ast: &Ast) -> Result<()> {
        match ast {
            Ast::Number(_) => Ok(()),
            Ast::Column { name, pos } => {
                if self.resolve(name).is_none() {
                    return Err(err_at(*pos, format!("unknown column '{name}'")));
                }
                Ok(())
            }
            Ast::Neg(inner) => self.validate(inner),
            Ast::Not { inner, .. } => self.validate(inner),
            Ast::Arith { lhs, rhs, .. } | Ast::Cmp { lhs, rhs, .. } => {
                self.validate(lhs)?;
                self.validate(rhs)
            }
            Ast::And(lhs, rhs) | Ast::Or(lhs, rhs) => {
                self.validate(lhs)?;
                self.validate(rhs)
            }
        }
    }

    /// Resolve an identifier: direct column, MA alias, or shifted variant.
    fn resolve(&mut self, name: &str) -> Option<Vec<Option<f64>>> {
        if let Some(cached) = self.cache.get(name) {
            return Some(cached.clone());
        }
        let resolved = self.resolve_uncached(name)?;
        self.cache.insert(name.to_string(), resolved.clone());
        Some(resolved)
    }

    fn resolve_uncached(&self, name: &str) -> Option<Vec<Option<f64>>> {
        if let Some(col) = self.table.column(name) {
            return Some(col.to_vec());
        }

        // MA1/MA2/MA3 alias the stored EMA price columns
        if let Some(k) = ma_alias(name) {
            return self.table.column(&format!("EMA{k}_Price")).map(|c| c.to_vec());
        }

        // MA shifted: MA1_1, MA3_2
        if let Some((k, n)) = name
            .strip_prefix("MA")
            .and_then(|rest| rest.split_once('_'))
            .and_then(|(k, n)| Some((k.parse::<u8>().ok()?, n.parse::<usize>().ok()?)))
        {
            if (1..=3).contains(&k) && (1..=2).contains(&n) {
                return self
                    .table
                    .column(&format!("EMA{k}_Price"))
                    .map(|c| shift(c, n));
            }
        }

        // OHLC/direction shifted: open1, close2, direction1
        for base in ["open", "high", "low", "close", "direction"] {
            for n in 1..=2usize {
                if name == format!("{base}{n}") {
                    return self.table.column(base).map(|c| shift(c, n));
                }
            }
        }

        None
    }

    fn eval(&mut self, ast: &Ast) -> Result<Value> {
        match ast {
            Ast::Number(v) => Ok(Value::Scalar(*v)),
            Ast::Column { name, pos } => self
                .resolve(name)
                .map(Value::Series)
                .ok_or_else(|| err_at(*pos, format!("unknown column '{name}'"))),
            Ast::Neg(inner) => match self.eval(inner)? {
                Value::Scalar(v) => Ok(Value::Scalar(-v)),
                Value::Series(s) => Ok(Value::Series(s.iter().map(|v| v.map(|x| -x)).collect())),
                Value::Mask(_) => Err(err_at(0, "cannot negate a condition")),
            },
            Ast::Arith { op, lhs, rhs, pos } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                apply_arith(*op, lhs, rhs, *pos)
            }
            Ast::Cmp { op, lhs, rhs, pos } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                apply_cmp(*op, lhs, rhs, *pos, self.table.len())
            }
            Ast::And(lhs, rhs) => {
                let lhs = self.mask(lhs)?;
                let rhs = self.mask(rhs)?;
                Ok(Value::Mask(
                    lhs.iter().zip(rhs.iter()).map(|(&a, &b)| a && b).collect(),
                ))
            }
            Ast::Or(lhs, rhs) => {
                let lhs = self.mask(lhs)?;
                let rhs = self.mask(rhs)?;
                Ok(Value::Mask(
                    lhs.iter().zip(rhs.iter()).map(|(&a, &b)| a || b).collect(),
                ))
            }
            Ast::Not { inner, pos } => {
                let inner = self.eval(inner)?;
                match inner {
                    Value::Mask(m) => Ok(Value::Mask(m.iter().map(|&b| !b).collect())),
                    _ => Err(err_at(*pos, "'not' requires a condition")),
                }
            }
        }
    }

    fn mask(&mut self, ast: &Ast) -> Result<Vec<bool>> {
        match self.eval(ast)? {
            Value::Mask(m) => Ok(m),
            _ => Err(err_at(0, "boolean connective requires conditions on both sides")),
        }
    }
}

fn ma_alias(name: &str) -> Option<u8> {
    match name {
        "MA1" => Some(1),
        "MA2" => Some(2),
        "MA3" => Some(3),
        _ => None,
    }
}

fn apply_arith(op: ArithOp, lhs: Value, rhs: Value, pos: usize) -> Result<Value> {
    let f = move |a: f64, b: f64| match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => a / b,
    };
    match (lhs, rhs) {
        (Value::Scalar(a), Value::Scalar(b)) => Ok(Value::Scalar(f(a, b))),
        (Value::Scalar(a), Value::Series(b)) => {
            Ok(Value::Series(b.iter().map(|v| v.map(|x| f(a, x))).collect()))
        }
        (Value::Series(a), Value::Scalar(b)) => {
            Ok(Value::Series(a.iter().map(|v| v.map(|x| f(x, b))).collect()))
        }
        (Value::Series(a), Value::Series(b)) => Ok(Value::Series(
            a.iter()
                .zip(b.iter())
                .map(|(x, y)| match (x, y) {
                    (Some(x), Some(y)) => Some(f(*x, *y)),
                    _ => None,
                })
                .collect(),
        )),
        _ => Err(err_at(pos, "arithmetic requires numeric operands")),
    }
}

fn apply_cmp(op: CmpOp, lhs: Value, rhs: Value, pos: usize, len: usize) -> Result<Value> {
    let f = move |a: f64, b: f64| match op {
        CmpOp::Eq => a == b,
        CmpOp::Ne => a != b,
        CmpOp::Lt => a < b,
        CmpOp::Le => a <= b,
        CmpOp::Gt => a > b,
        CmpOp::Ge => a >= b,
    };
    let mask = match (lhs, rhs) {
        (Value::Scalar(a), Value::Scalar(b)) => vec![f(a, b); len],
        (Value::Scalar(a), Value::Series(b)) => b
            .iter()
            .map(|v| v.map(|x| f(a, x)).unwrap_or(false))
            .collect(),
        (Value::Series(a), Value::Scalar(b)) => a
            .iter()
            .map(|v| v.map(|x| f(x, b)).unwrap_or(false))
            .collect(),
        (Value::Series(a), Value::Series(b)) => a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| match (x, y) {
                (Some(x), Some(y)) => f(*x, *y),
                _ => false,
            })
            .collect(),
        _ => return Err(err_at(pos, "comparison requires numeric operands")),
    };
    Ok(Value::Mask(mask))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renko::WickMode;
    use crate::table::TableSettings;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn test_table() -> FeatureTable {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let n = 5;
        let mut table = FeatureTable::new(
            (0..n).map(|i| t0 + chrono::Duration::minutes(i as i64)).collect(),
            vec![date; n],
            TableSettings {
                adr_period: 14,
                brick_size: 0.001,
                reversal_size: 0.002,
                wick_mode: WickMode::All,
                ma1_period: 20,
                ma2_period: 50,
                ma3_period: 200,
                chop_period: 20,
                smae1_period: 20,
                smae1_deviation: 1.0,
                smae2_period: 50,
                smae2_deviation: 1.0,
                pwap_sigmas: vec![1.0],
            },
        );
        table.push_dense_column("open", vec![1.0, 1.1, 1.2, 1.1, 1.0]);
        table.push_dense_column("close", vec![1.1, 1.2, 1.1, 1.0, 1.1]);
        table.push_dense_column("direction", vec![1.0, 1.0, -1.0, -1.0, 1.0]);
        table.push_column(
            "EMA1_Price",
            vec![None, Some(1.05), Some(1.1), Some(1.12), Some(1.08)],
        );
        table.push_dense_column("State", vec![3.0, 3.0, 3.0, -1.0, -1.0]);
        table.push_column(
            "EMA_rrDistance(20)",
            vec![None, Some(0.5), Some(1.5), Some(-0.5), Some(0.2)],
        );
        table
    }

    #[test]
    fn test_simple_comparison() {
        let table = test_table();
        let idx = matching_indices(&table, "close > 1.1").unwrap();
        assert_eq!(idx, vec![1]);
    }

    #[test]
    fn test_boolean_connectives() {
        let table = test_table();
        let idx = matching_indices(&table, "State == 3 and direction == 1").unwrap();
        assert_eq!(idx, vec![0, 1]);
        let idx = matching_indices(&table, "State == 3 & direction == 1").unwrap();
        assert_eq!(idx, vec![0, 1]);
        let idx = matching_indices(&table, "direction == 1 or State == -1").unwrap();
        assert_eq!(idx, vec![0, 1, 3, 4]);
        let idx = matching_indices(&table, "not direction == 1").unwrap();
        assert_eq!(idx, vec![2, 3]);
    }

    #[test]
    fn test_arithmetic() {
        let table = test_table();
        // close - open > 0 identifies up bars
        let idx = matching_indices(&table, "close - open > 0").unwrap();
        assert_eq!(idx, vec![0, 1, 4]);
        let idx = matching_indices(&table, "(close + open) / 2 >= 1.15").unwrap();
        assert_eq!(idx, vec![1, 2]);
    }

    #[test]
    fn test_ma_alias_and_undefined_cells() {
        let table = test_table();
        // Row 0 has no EMA value: comparison is false there
        let idx = matching_indices(&table, "close > MA1").unwrap();
        assert_eq!(idx, vec![1, 4]);
    }

    #[test]
    fn test_shifted_columns() {
        let table = test_table();
        // Previous bar was an up bar
        let idx = matching_indices(&table, "direction1 == 1").unwrap();
        assert_eq!(idx, vec![1, 2]);
        // Close two bars back
        let idx = matching_indices(&table, "close2 >= 1.1").unwrap();
        assert_eq!(idx, vec![2, 3, 4]);
        // Shifted MA: row 2 sees row 1's EMA
        let idx = matching_indices(&table, "MA1_1 == 1.05").unwrap();
        assert_eq!(idx, vec![2]);
    }

    #[test]
    fn test_backtick_identifier() {
        let table = test_table();
        let idx = matching_indices(&table, "`EMA_rrDistance(20)` > 1").unwrap();
        assert_eq!(idx, vec![2]);
    }

    #[test]
    fn test_unary_minus() {
        let table = test_table();
        let idx = matching_indices(&table, "`EMA_rrDistance(20)` < -0.2").unwrap();
        assert_eq!(idx, vec![3]);
    }

    #[test]
    fn test_unknown_column_fails_with_position() {
        let table = test_table();
        let err = matching_indices(&table, "close > bogus_column").unwrap_err();
        match err {
            RenkoError::InvalidExpression { position, message } => {
                assert_eq!(position, 8);
                assert!(message.contains("bogus_column"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_parse_errors() {
        let table = test_table();
        assert!(matching_indices(&table, "close >").is_err());
        assert!(matching_indices(&table, "close = 1").is_err());
        assert!(matching_indices(&table, "(close > 1").is_err());
        assert!(matching_indices(&table, "close > 1 extra").is_err());
        // A bare numeric expression is not a condition
        assert!(matching_indices(&table, "close + 1").is_err());
    }

    #[test]
    fn test_evaluate_signals_collects_errors() {
        let table = test_table();
        let signals = vec![
            SignalDef {
                name: "good".to_string(),
                expression: "direction == 1".to_string(),
            },
            SignalDef {
                name: "bad".to_string(),
                expression: "nope > 1".to_string(),
            },
            SignalDef {
                name: "blank".to_string(),
                expression: "  ".to_string(),
            },
        ];
        let out = evaluate_signals(&table, &signals);
        assert_eq!(out.signals["good"], vec![0, 1, 4]);
        assert!(out.errors.contains_key("bad"));
        assert!(!out.signals.contains_key("blank"));
        assert!(!out.errors.contains_key("blank"));
    }
}
