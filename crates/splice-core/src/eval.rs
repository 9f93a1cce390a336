//! In-process evaluation.
//!
//! The pipeline only depends on [`Evaluator`]: evaluate a command, get back a
//! value, a fault, or nothing. [`CalcEvaluator`] is the built-in expression
//! language; [`DisabledEvaluator`] turns in-process evaluation off.
//!
//! The calculator understands numbers, strings, booleans, arithmetic
//! (`+ - * / % **`), comparisons, `&& || !`, a few math functions and
//! `let` bindings that persist between evaluations. Statements are separated
//! by `;` or newlines and the value of the last one is the result.

use std::collections::HashMap;
use std::fmt;

/// Outcome of evaluating a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// The command produced a value.
    Value(String),
    /// The command failed; the text describes the fault.
    Fault(String),
    /// The command produced no value.
    Empty,
}

impl Evaluation {
    /// Text to write back into the document, if any.
    ///
    /// Faults are output too, so they show up in the document.
    pub fn into_output(self) -> Option<String> {
        match self {
            Evaluation::Value(text) | Evaluation::Fault(text) if !text.is_empty() => Some(text),
            _ => None,
        }
    }
}

/// Evaluate a command in-process.
pub trait Evaluator {
    fn evaluate(&mut self, source: &str) -> Evaluation;
}

/// Evaluator that refuses every command.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledEvaluator;

impl Evaluator for DisabledEvaluator {
    fn evaluate(&mut self, _source: &str) -> Evaluation {
        Evaluation::Fault("Error: in-process evaluation is disabled".to_string())
    }
}

/// A calculator value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Str(String),
    Bool(bool),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Bool(_) => "boolean",
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Bool(b) => *b,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::Str(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Format a number the way a script console prints it.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        n.to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
    Sep,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Num(n) => write!(f, "{}", format_number(*n)),
            Token::Str(s) => write!(f, "{:?}", s),
            Token::Ident(name) => f.write_str(name),
            Token::Op(op) => f.write_str(op),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
            Token::Comma => f.write_str(","),
            Token::Sep => f.write_str("end of statement"),
        }
    }
}

const TWO_CHAR_OPS: [&str; 7] = ["**", "==", "!=", "<=", ">=", "&&", "||"];
const ONE_CHAR_OPS: [&str; 9] = ["+", "-", "*", "/", "%", "<", ">", "!", "="];

type Fault = String;

/// Deepest nesting of parentheses and prefix operators accepted.
const MAX_DEPTH: usize = 128;

fn syntax_error(message: impl fmt::Display) -> Fault {
    format!("SyntaxError: {}", message)
}

fn type_error(message: impl fmt::Display) -> Fault {
    format!("TypeError: {}", message)
}

fn tokenize(source: &str) -> Result<Vec<Token>, Fault> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' => i += 1,
            '\n' | ';' => {
                tokens.push(Token::Sep);
                i += 1;
            }
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '"' | '\'' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    let Some(&ch) = chars.get(i) else {
                        return Err(syntax_error("unterminated string literal"));
                    };
                    i += 1;
                    match ch {
                        _ if ch == quote => break,
                        '\\' => {
                            let escaped = chars
                                .get(i)
                                .ok_or_else(|| syntax_error("unterminated string literal"))?;
                            i += 1;
                            text.push(match escaped {
                                'n' => '\n',
                                't' => '\t',
                                other => *other,
                            });
                        }
                        _ => text.push(ch),
                    }
                }
                tokens.push(Token::Str(text));
            }
            _ if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let literal: String = chars[start..i].iter().collect();
                let number = literal
                    .parse::<f64>()
                    .map_err(|_| syntax_error(format!("invalid number '{}'", literal)))?;
                tokens.push(Token::Num(number));
            }
            _ if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            _ => {
                let pair: String = chars[i..(i + 2).min(chars.len())].iter().collect();
                if let Some(op) = TWO_CHAR_OPS.iter().find(|op| **op == pair) {
                    tokens.push(Token::Op(*op));
                    i += 2;
                } else if let Some(op) = ONE_CHAR_OPS.iter().find(|op| op.starts_with(c)) {
                    tokens.push(Token::Op(*op));
                    i += 1;
                } else {
                    return Err(syntax_error(format!("unexpected character '{}'", c)));
                }
            }
        }
    }

    Ok(tokens)
}

/// The built-in calculator.
#[derive(Debug, Clone, Default)]
pub struct CalcEvaluator {
    vars: HashMap<String, Value>,
}

impl CalcEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a `let` binding.
    pub fn var(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    fn run(&mut self, source: &str) -> Result<Option<Value>, Fault> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            depth: 0,
            vars: &mut self.vars,
        };

        let mut last = None;
        while !parser.at_end() {
            if parser.eat(&Token::Sep) {
                continue;
            }
            last = parser.statement()?;
            if !parser.at_end() && !parser.eat(&Token::Sep) {
                return Err(syntax_error(format!("unexpected token '{}'", parser.peek_display())));
            }
        }
        Ok(last)
    }
}

impl Evaluator for CalcEvaluator {
    fn evaluate(&mut self, source: &str) -> Evaluation {
        match self.run(source) {
            Ok(Some(value)) => Evaluation::Value(value.to_string()),
            Ok(None) => Evaluation::Empty,
            Err(fault) => Evaluation::Fault(fault),
        }
    }
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
    vars: &'a mut HashMap<String, Value>,
}

impl Parser<'_> {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_display(&self) -> String {
        self.peek().map_or("end of input".to_string(), |t| t.to_string())
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_op(&mut self, ops: &[&str]) -> Option<&'static str> {
        match self.peek() {
            Some(Token::Op(op)) if ops.contains(op) => {
                let op = *op;
                self.pos += 1;
                Some(op)
            }
            _ => None,
        }
    }

    fn expect(&mut self, token: &Token) -> Result<(), Fault> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(syntax_error(format!(
                "expected '{}' but found '{}'",
                token,
                self.peek_display()
            )))
        }
    }

    fn statement(&mut self) -> Result<Option<Value>, Fault> {
        if self.peek() == Some(&Token::Ident("let".to_string())) {
            self.pos += 1;
            let name = match self.peek() {
                Some(Token::Ident(name)) => name.clone(),
                _ => return Err(syntax_error("expected a name after 'let'")),
            };
            self.pos += 1;
            self.expect(&Token::Op("="))?;
            let value = self.expr()?;
            self.vars.insert(name, value);
            return Ok(None);
        }

        if let (Some(Token::Ident(name)), Some(Token::Op("="))) =
            (self.tokens.get(self.pos), self.tokens.get(self.pos + 1))
        {
            if !self.vars.contains_key(name) {
                return Err(format!("ReferenceError: {} is not defined", name));
            }
            let name = name.clone();
            self.pos += 2;
            let value = self.expr()?;
            self.vars.insert(name, value.clone());
            return Ok(Some(value));
        }

        self.expr().map(Some)
    }

    fn expr(&mut self) -> Result<Value, Fault> {
        self.or()
    }

    fn or(&mut self) -> Result<Value, Fault> {
        let mut left = self.and()?;
        while self.eat_op(&["||"]).is_some() {
            let right = self.and()?;
            left = if left.truthy() { left } else { right };
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Value, Fault> {
        let mut left = self.equality()?;
        while self.eat_op(&["&&"]).is_some() {
            let right = self.equality()?;
            left = if left.truthy() { right } else { left };
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Value, Fault> {
        let mut left = self.comparison()?;
        while let Some(op) = self.eat_op(&["==", "!="]) {
            let right = self.comparison()?;
            let equal = left == right;
            left = Value::Bool(if op == "==" { equal } else { !equal });
        }
        Ok(left)
    }

    fn comparison(&mut self) -> Result<Value, Fault> {
        let mut left = self.additive()?;
        while let Some(op) = self.eat_op(&["<", "<=", ">", ">="]) {
            let right = self.additive()?;
            let ordering = match (&left, &right) {
                (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
                (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                _ => {
                    return Err(type_error(format!(
                        "cannot compare {} with {}",
                        left.type_name(),
                        right.type_name()
                    )));
                }
            };
            let result = ordering.is_some_and(|o| match op {
                "<" => o.is_lt(),
                "<=" => o.is_le(),
                ">" => o.is_gt(),
                _ => o.is_ge(),
            });
            left = Value::Bool(result);
        }
        Ok(left)
    }

    fn additive(&mut self) -> Result<Value, Fault> {
        let mut left = self.multiplicative()?;
        while let Some(op) = self.eat_op(&["+", "-"]) {
            let right = self.multiplicative()?;
            left = match (op, left, right) {
                ("+", Value::Str(a), b) => Value::Str(format!("{}{}", a, b)),
                ("+", a, Value::Str(b)) => Value::Str(format!("{}{}", a, b)),
                (op, a, b) => Value::Number(arith(op, &a, &b)?),
            };
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Value, Fault> {
        let mut left = self.unary()?;
        while let Some(op) = self.eat_op(&["*", "/", "%"]) {
            let right = self.unary()?;
            left = Value::Number(arith(op, &left, &right)?);
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Value, Fault> {
        if self.depth >= MAX_DEPTH {
            return Err(syntax_error("expression nested too deeply"));
        }
        self.depth += 1;
        let result = self.prefixed();
        self.depth -= 1;
        result
    }

    fn prefixed(&mut self) -> Result<Value, Fault> {
        if let Some(op) = self.eat_op(&["-", "!", "+"]) {
            let value = self.unary()?;
            return match (op, value) {
                ("!", v) => Ok(Value::Bool(!v.truthy())),
                ("-", Value::Number(n)) => Ok(Value::Number(-n)),
                ("+", Value::Number(n)) => Ok(Value::Number(n)),
                (op, v) => Err(type_error(format!(
                    "bad operand type for unary {}: {}",
                    op,
                    v.type_name()
                ))),
            };
        }
        self.power()
    }

    fn power(&mut self) -> Result<Value, Fault> {
        let base = self.primary()?;
        if self.eat_op(&["**"]).is_some() {
            let exponent = self.unary()?;
            return Ok(Value::Number(arith("**", &base, &exponent)?));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Value, Fault> {
        let token = self
            .peek()
            .cloned()
            .ok_or_else(|| syntax_error("unexpected end of input"))?;
        self.pos += 1;

        match token {
            Token::Num(n) => Ok(Value::Number(n)),
            Token::Str(s) => Ok(Value::Str(s)),
            Token::LParen => {
                let value = self.expr()?;
                self.expect(&Token::RParen)?;
                Ok(value)
            }
            Token::Ident(name) => {
                if self.eat(&Token::LParen) {
                    let args = self.arguments()?;
                    return call(&name, &args);
                }
                match name.as_str() {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    "PI" => Ok(Value::Number(std::f64::consts::PI)),
                    "E" => Ok(Value::Number(std::f64::consts::E)),
                    _ => self
                        .vars
                        .get(&name)
                        .cloned()
                        .ok_or_else(|| format!("ReferenceError: {} is not defined", name)),
                }
            }
            other => Err(syntax_error(format!("unexpected token '{}'", other))),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Value>, Fault> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            if self.eat(&Token::RParen) {
                return Ok(args);
            }
            self.expect(&Token::Comma)?;
        }
    }
}

fn number(value: &Value, context: &str) -> Result<f64, Fault> {
    match value {
        Value::Number(n) => Ok(*n),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Str(_) => Err(type_error(format!("{} expects numbers, got string", context))),
    }
}

fn arith(op: &str, a: &Value, b: &Value) -> Result<f64, Fault> {
    let context = format!("operator '{}'", op);
    let (x, y) = (number(a, &context)?, number(b, &context)?);
    Ok(match op {
        "+" => x + y,
        "-" => x - y,
        "*" => x * y,
        "/" => x / y,
        "%" => x % y,
        _ => x.powf(y),
    })
}

fn call(name: &str, args: &[Value]) -> Result<Value, Fault> {
    let unary = |f: fn(f64) -> f64| -> Result<Value, Fault> {
        match args {
            [x] => Ok(Value::Number(f(number(x, name)?))),
            _ => Err(type_error(format!("{}() takes 1 argument ({} given)", name, args.len()))),
        }
    };

    match name {
        "abs" => unary(f64::abs),
        "sqrt" => unary(f64::sqrt),
        "floor" => unary(f64::floor),
        "ceil" => unary(f64::ceil),
        "round" => unary(f64::round),
        "pow" => match args {
            [x, y] => Ok(Value::Number(number(x, name)?.powf(number(y, name)?))),
            _ => Err(type_error("pow() takes 2 arguments")),
        },
        "min" | "max" => {
            if args.is_empty() {
                return Err(type_error(format!("{}() expects at least 1 argument", name)));
            }
            let values = args
                .iter()
                .map(|v| number(v, name))
                .collect::<Result<Vec<_>, _>>()?;
            let pick = if name == "min" { f64::min } else { f64::max };
            Ok(Value::Number(values.into_iter().reduce(pick).unwrap_or(f64::NAN)))
        }
        "len" => match args {
            [Value::Str(s)] => Ok(Value::Number(s.chars().count() as f64)),
            _ => Err(type_error("len() expects one string")),
        },
        "str" => match args {
            [v] => Ok(Value::Str(v.to_string())),
            _ => Err(type_error("str() takes 1 argument")),
        },
        _ => Err(format!("ReferenceError: {} is not defined", name)),
    }
}
