//! `code` / `code_polars`: a user-provided `transform` is a small
//! expression DSL, compiled once when the stream is built (so compile
//! errors surface at plan-build time, not on the first chunk) and
//! interpreted per row thereafter. The DSL's AST is walked against a
//! function allowlist before it is accepted, rather than sandboxing an
//! interpreter for a general-purpose language.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::chunk::Chunk;
use crate::operator::{ChunkStream, Operator, OperatorError, OperatorResult};
use crate::operators::map::parse_config;
use crate::operators::util::{batch_to_rows, rows_to_batch, stream_map};

const ALLOWED_FUNCTIONS: &[&str] = &["abs", "upper", "lower", "round", "length", "coalesce"];

#[derive(Debug, Deserialize)]
struct CodeConfig {
    /// output column name -> DSL expression source
    assign: HashMap<String, String>,
}

// ---------------------------------------------------------------------
// Expression DSL: tokenizer, parser, AST allowlist check, evaluator.
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Op(char),
    OpOp(String), // two-char operators: ==, !=, <=, >=, &&, ||
    LParen,
    RParen,
    Comma,
}

fn tokenize(src: &str) -> OperatorResult<Vec<Token>> {
    let mut chars = src.chars().peekable();
    let mut tokens = Vec::new();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '"' | '\'' => {
                let quote = c;
                chars.next();
                let mut s = String::new();
                for ch in chars.by_ref() {
                    if ch == quote {
                        break;
                    }
                    s.push(ch);
                }
                tokens.push(Token::Str(s));
            }
            '0'..='9' => {
                let mut s = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        s.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let n: f64 = s.parse().map_err(|_| OperatorError::InvalidConfig {
                    operator: "code".to_string(),
                    reason: format!("invalid number literal '{s}'"),
                })?;
                tokens.push(Token::Number(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut s = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_alphanumeric() || d == '_' {
                        s.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(s));
            }
            '=' | '!' | '<' | '>' | '&' | '|' => {
                chars.next();
                if let Some(&next) = chars.peek() {
                    let pair = format!("{c}{next}");
                    if matches!(pair.as_str(), "==" | "!=" | "<=" | ">=" | "&&" | "||") {
                        chars.next();
                        tokens.push(Token::OpOp(pair));
                        continue;
                    }
                }
                tokens.push(Token::Op(c));
            }
            '+' | '-' | '*' | '/' => {
                chars.next();
                tokens.push(Token::Op(c));
            }
            other => {
                return Err(OperatorError::InvalidConfig {
                    operator: "code".to_string(),
                    reason: format!("unexpected character '{other}' in expression"),
                })
            }
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone)]
enum Expr {
    Number(f64),
    Str(String),
    Column(String),
    Unary(char, Box<Expr>),
    Binary(Box<Expr>, String, Box<Expr>),
    Call(String, Vec<Expr>),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect_rparen(&mut self) -> OperatorResult<()> {
        match self.next() {
            Some(Token::RParen) => Ok(()),
            _ => Err(OperatorError::InvalidConfig { operator: "code".to_string(), reason: "expected ')'".to_string() }),
        }
    }

    fn parse_expr(&mut self) -> OperatorResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> OperatorResult<Expr> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek(), Some(Token::OpOp(op)) if op == "||") {
            self.next();
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(Box::new(lhs), "||".to_string(), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> OperatorResult<Expr> {
        let mut lhs = self.parse_cmp()?;
        while matches!(self.peek(), Some(Token::OpOp(op)) if op == "&&") {
            self.next();
            let rhs = self.parse_cmp()?;
            lhs = Expr::Binary(Box::new(lhs), "&&".to_string(), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_cmp(&mut self) -> OperatorResult<Expr> {
        let lhs = self.parse_additive()?;
        let op = match self.peek() {
            Some(Token::OpOp(op)) if matches!(op.as_str(), "==" | "!=" | "<=" | ">=") => op.clone(),
            Some(Token::Op(c)) if *c == '<' || *c == '>' => c.to_string(),
            _ => return Ok(lhs),
        };
        self.next();
        let rhs = self.parse_additive()?;
        Ok(Expr::Binary(Box::new(lhs), op, Box::new(rhs)))
    }

    fn parse_additive(&mut self) -> OperatorResult<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            match self.peek() {
                Some(Token::Op(c)) if *c == '+' || *c == '-' => {
                    let op = c.to_string();
                    self.next();
                    let rhs = self.parse_multiplicative()?;
                    lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs));
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> OperatorResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            match self.peek() {
                Some(Token::Op(c)) if *c == '*' || *c == '/' => {
                    let op = c.to_string();
                    self.next();
                    let rhs = self.parse_unary()?;
                    lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs));
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> OperatorResult<Expr> {
        if let Some(Token::Op(c)) = self.peek() {
            if *c == '-' || *c == '!' {
                let c = *c;
                self.next();
                let inner = self.parse_unary()?;
                return Ok(Expr::Unary(c, Box::new(inner)));
            }
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> OperatorResult<Expr> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                self.expect_rparen()?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if matches!(self.peek(), Some(Token::LParen)) {
                    self.next();
                    let mut args = Vec::new();
                    if !matches!(self.peek(), Some(Token::RParen)) {
                        loop {
                            args.push(self.parse_expr()?);
                            match self.peek() {
                                Some(Token::Comma) => {
                                    self.next();
                                }
                                _ => break,
                            }
                        }
                    }
                    self.expect_rparen()?;
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Column(name))
                }
            }
            other => Err(OperatorError::InvalidConfig {
                operator: "code".to_string(),
                reason: format!("unexpected token {other:?} while parsing expression"),
            }),
        }
    }
}

fn parse(src: &str) -> OperatorResult<Expr> {
    let tokens = tokenize(src)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(OperatorError::InvalidConfig {
            operator: "code".to_string(),
            reason: format!("trailing tokens after expression '{src}'"),
        });
    }
    check_allowlist(&expr)?;
    Ok(expr)
}

fn check_allowlist(expr: &Expr) -> OperatorResult<()> {
    match expr {
        Expr::Number(_) | Expr::Str(_) | Expr::Column(_) => Ok(()),
        Expr::Unary(_, inner) => check_allowlist(inner),
        Expr::Binary(lhs, _, rhs) => {
            check_allowlist(lhs)?;
            check_allowlist(rhs)
        }
        Expr::Call(name, args) => {
            if !ALLOWED_FUNCTIONS.contains(&name.as_str()) {
                return Err(OperatorError::InvalidConfig {
                    operator: "code".to_string(),
                    reason: format!("function '{name}' is not in the allowed function set {ALLOWED_FUNCTIONS:?}"),
                });
            }
            for arg in args {
                check_allowlist(arg)?;
            }
            Ok(())
        }
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    v.as_f64()
}

fn eval(expr: &Expr, row: &serde_json::Map<String, Value>) -> OperatorResult<Value> {
    match expr {
        Expr::Number(n) => Ok(serde_json::Number::from_f64(*n).map(Value::Number).unwrap_or(Value::Null)),
        Expr::Str(s) => Ok(Value::from(s.clone())),
        Expr::Column(name) => Ok(row.get(name).cloned().unwrap_or(Value::Null)),
        Expr::Unary(op, inner) => {
            let v = eval(inner, row)?;
            match op {
                '-' => Ok(as_f64(&v).map(|n| Value::from(-n)).unwrap_or(Value::Null)),
                '!' => Ok(Value::from(!v.as_bool().unwrap_or(false))),
                _ => unreachable!("tokenizer only produces -/! unary ops"),
            }
        }
        Expr::Binary(lhs, op, rhs) => {
            let l = eval(lhs, row)?;
            let r = eval(rhs, row)?;
            eval_binary(&l, op, &r)
        }
        Expr::Call(name, args) => {
            let values: Vec<Value> = args.iter().map(|a| eval(a, row)).collect::<OperatorResult<_>>()?;
            eval_call(name, &values)
        }
    }
}

fn eval_binary(l: &Value, op: &str, r: &Value) -> OperatorResult<Value> {
    match op {
        "&&" => Ok(Value::from(l.as_bool().unwrap_or(false) && r.as_bool().unwrap_or(false))),
        "||" => Ok(Value::from(l.as_bool().unwrap_or(false) || r.as_bool().unwrap_or(false))),
        "==" => Ok(Value::from(l == r)),
        "!=" => Ok(Value::from(l != r)),
        "<" | "<=" | ">" | ">=" => {
            let (Some(a), Some(b)) = (as_f64(l), as_f64(r)) else {
                return Ok(Value::Bool(false));
            };
            let result = match op {
                "<" => a < b,
                "<=" => a <= b,
                ">" => a > b,
                ">=" => a >= b,
                _ => unreachable!(),
            };
            Ok(Value::from(result))
        }
        "+" => match (l.as_str(), r.as_str()) {
            (Some(a), Some(b)) => Ok(Value::from(format!("{a}{b}"))),
            _ => Ok(numeric_or_null(as_f64(l), as_f64(r), |a, b| a + b)),
        },
        "-" => Ok(numeric_or_null(as_f64(l), as_f64(r), |a, b| a - b)),
        "*" => Ok(numeric_or_null(as_f64(l), as_f64(r), |a, b| a * b)),
        "/" => Ok(numeric_or_null(as_f64(l), as_f64(r), |a, b| if b == 0.0 { f64::NAN } else { a / b })),
        other => Err(OperatorError::Other(format!("unsupported operator '{other}'"))),
    }
}

fn numeric_or_null(a: Option<f64>, b: Option<f64>, f: impl Fn(f64, f64) -> f64) -> Value {
    match (a, b) {
        (Some(a), Some(b)) => {
            let n = f(a, b);
            if n.is_finite() {
                serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
            } else {
                Value::Null
            }
        }
        _ => Value::Null,
    }
}

fn eval_call(name: &str, args: &[Value]) -> OperatorResult<Value> {
    match name {
        "abs" => Ok(args.first().and_then(as_f64).map(f64::abs).and_then(serde_json::Number::from_f64).map(Value::Number).unwrap_or(Value::Null)),
        "round" => Ok(args.first().and_then(as_f64).map(f64::round).and_then(serde_json::Number::from_f64).map(Value::Number).unwrap_or(Value::Null)),
        "upper" => Ok(args.first().and_then(Value::as_str).map(|s| Value::from(s.to_uppercase())).unwrap_or(Value::Null)),
        "lower" => Ok(args.first().and_then(Value::as_str).map(|s| Value::from(s.to_lowercase())).unwrap_or(Value::Null)),
        "length" => Ok(args.first().and_then(Value::as_str).map(|s| Value::from(s.chars().count() as i64)).unwrap_or(Value::Null)),
        "coalesce" => Ok(args.iter().find(|v| !v.is_null()).cloned().unwrap_or(Value::Null)),
        other => Err(OperatorError::Other(format!("unknown function '{other}' (should have been caught by validation)"))),
    }
}

pub struct CodeOperator {
    name: &'static str,
}

impl CodeOperator {
    pub fn polars() -> Self {
        Self { name: "code_polars" }
    }

    pub fn python_compat() -> Self {
        Self { name: "code" }
    }
}

impl Operator for CodeOperator {
    fn name(&self) -> &'static str {
        self.name
    }

    fn validate_config(&self, config: &Value) -> OperatorResult<()> {
        let cfg: CodeConfig = parse_config(self.name(), config)?;
        if cfg.assign.is_empty() {
            return Err(OperatorError::InvalidConfig {
                operator: self.name().to_string(),
                reason: "assign must not be empty".to_string(),
            });
        }
        for src in cfg.assign.values() {
            parse(src)?;
        }
        Ok(())
    }

    fn transform(&self, input: ChunkStream, config: &Value) -> OperatorResult<ChunkStream> {
        let cfg: CodeConfig = parse_config(self.name(), config).map_err(|e| OperatorError::InvalidConfig {
            operator: self.name().to_string(),
            reason: e.to_string(),
        })?;
        let mut compiled: Vec<(String, Expr)> = Vec::with_capacity(cfg.assign.len());
        for (out, src) in &cfg.assign {
            compiled.push((out.clone(), parse(src)?));
        }

        Ok(stream_map(input, move |chunk| {
            let schema = chunk.schema();
            let mut rows = batch_to_rows(chunk.record_batch());
            for row in rows.iter_mut() {
                for (out, expr) in &compiled {
                    let value = eval(expr, row)?;
                    row.insert(out.clone(), value);
                }
            }

            let mut fields: Vec<arrow::datatypes::Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
            for (out, _) in &compiled {
                if !fields.iter().any(|f| f.name() == out) {
                    let dt = rows
                        .first()
                        .and_then(|r| r.get(out))
                        .map(value_data_type)
                        .unwrap_or(arrow::datatypes::DataType::Utf8);
                    fields.push(arrow::datatypes::Field::new(out, dt, true));
                }
            }
            let out_schema = std::sync::Arc::new(arrow::datatypes::Schema::new(fields));
            Ok(Chunk::new(rows_to_batch(out_schema, &rows)?))
        }))
    }

    fn lineage_map(&self, input_columns: &[String], config: &Value) -> HashMap<String, std::collections::HashSet<String>> {
        let mut map: HashMap<String, std::collections::HashSet<String>> =
            input_columns.iter().map(|c| (c.clone(), std::collections::HashSet::from([c.clone()]))).collect();
        if let Ok(cfg) = parse_config::<CodeConfig>(self.name(), config) {
            for (out, src) in cfg.assign {
                if let Ok(expr) = parse(&src) {
                    map.insert(out, referenced_columns(&expr));
                }
            }
        }
        map
    }
}

fn referenced_columns(expr: &Expr) -> std::collections::HashSet<String> {
    let mut out = std::collections::HashSet::new();
    collect_columns(expr, &mut out);
    out
}

fn collect_columns(expr: &Expr, out: &mut std::collections::HashSet<String>) {
    match expr {
        Expr::Column(name) => {
            out.insert(name.clone());
        }
        Expr::Unary(_, inner) => collect_columns(inner, out),
        Expr::Binary(lhs, _, rhs) => {
            collect_columns(lhs, out);
            collect_columns(rhs, out);
        }
        Expr::Call(_, args) => args.iter().for_each(|a| collect_columns(a, out)),
        Expr::Number(_) | Expr::Str(_) => {}
    }
}

fn value_data_type(value: &Value) -> arrow::datatypes::DataType {
    use arrow::datatypes::DataType;
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => DataType::Int64,
        Value::Number(_) => DataType::Float64,
        Value::Bool(_) => DataType::Boolean,
        _ => DataType::Utf8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, Int64Array, RecordBatch};
    use arrow::datatypes::{DataType, Field, Schema};
    use futures::stream::{self, StreamExt};
    use std::sync::Arc;

    fn batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("a", DataType::Int64, false),
            Field::new("b", DataType::Int64, false),
        ]));
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![2, 3])), Arc::new(Int64Array::from(vec![10, 20]))]).unwrap()
    }

    #[tokio::test]
    async fn computes_derived_column_from_arithmetic_expression() {
        let input: ChunkStream = Box::pin(stream::iter(vec![Ok(Chunk::new(batch()))]));
        let config = serde_json::json!({ "assign": { "total": "a * b" } });
        let out = CodeOperator::python_compat().transform(input, &config).unwrap();
        let chunks: Vec<_> = out.collect().await;
        let result = chunks[0].as_ref().unwrap();
        let idx = result.schema().index_of("total").unwrap();
        let col = result.record_batch().column(idx).as_any().downcast_ref::<Float64Array>().unwrap();
        assert_eq!(col.value(0), 20.0);
        assert_eq!(col.value(1), 60.0);
    }

    #[test]
    fn rejects_functions_outside_the_allowlist() {
        let config = serde_json::json!({ "assign": { "x": "eval(a)" } });
        let err = CodeOperator::python_compat().validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("not in the allowed function set"));
    }
}
