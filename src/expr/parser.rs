use serde_json::Value;
use std::fmt;

/// Evaluation errors for the restricted expression grammar
#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    UnexpectedChar(char),
    UnexpectedToken(String),
    UnexpectedEnd,
    UnknownIdentifier(String),
    TypeMismatch(String),
    DivisionByZero,
    InvalidNumber(String),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::UnexpectedChar(c) => write!(f, "unexpected character '{}'", c),
            EvalError::UnexpectedToken(t) => write!(f, "unexpected token '{}'", t),
            EvalError::UnexpectedEnd => write!(f, "unexpected end of expression"),
            EvalError::UnknownIdentifier(name) => {
                write!(f, "unresolved identifier '{}'", name)
            }
            EvalError::TypeMismatch(op) => write!(f, "operands not comparable for '{}'", op),
            EvalError::DivisionByZero => write!(f, "division by zero"),
            EvalError::InvalidNumber(n) => write!(f, "invalid number literal '{}'", n),
        }
    }
}

impl std::error::Error for EvalError {}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    Ident(String),
    Or,
    And,
    Eq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Not,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, EvalError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '0'..='9' => {
                let mut num = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        num.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = num
                    .parse::<f64>()
                    .map_err(|_| EvalError::InvalidNumber(num.clone()))?;
                tokens.push(Token::Number(value));
            }
            '"' | '\'' => {
                let quote = c;
                chars.next();
                let mut s = String::new();
                let mut closed = false;
                while let Some(d) = chars.next() {
                    if d == '\\' {
                        match chars.next() {
                            Some('n') => s.push('\n'),
                            Some('t') => s.push('\t'),
                            Some(other) => s.push(other),
                            None => return Err(EvalError::UnexpectedEnd),
                        }
                    } else if d == quote {
                        closed = true;
                        break;
                    } else {
                        s.push(d);
                    }
                }
                if !closed {
                    return Err(EvalError::UnexpectedEnd);
                }
                tokens.push(Token::Str(s));
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let mut word = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' || d == '.' {
                        word.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match word.as_str() {
                    "true" => tokens.push(Token::Bool(true)),
                    "false" => tokens.push(Token::Bool(false)),
                    "null" | "undefined" => tokens.push(Token::Null),
                    _ => tokens.push(Token::Ident(word)),
                }
            }
            '|' => {
                chars.next();
                if chars.peek() == Some(&'|') {
                    chars.next();
                    tokens.push(Token::Or);
                } else {
                    return Err(EvalError::UnexpectedChar('|'));
                }
            }
            '&' => {
                chars.next();
                if chars.peek() == Some(&'&') {
                    chars.next();
                    tokens.push(Token::And);
                } else {
                    return Err(EvalError::UnexpectedChar('&'));
                }
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    // Tolerate the strict-equality spelling
                    if chars.peek() == Some(&'=') {
                        chars.next();
                    }
                    tokens.push(Token::Eq);
                } else {
                    return Err(EvalError::UnexpectedChar('='));
                }
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    if chars.peek() == Some(&'=') {
                        chars.next();
                    }
                    tokens.push(Token::Ne);
                } else {
                    tokens.push(Token::Not);
                }
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '%' => {
                chars.next();
                tokens.push(Token::Percent);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            other => return Err(EvalError::UnexpectedChar(other)),
        }
    }

    Ok(tokens)
}

/// Evaluate an expression over already-substituted literals.
///
/// The grammar is deliberately restricted to boolean, comparison and
/// arithmetic operators over number/string/bool/null literals. Identifiers
/// that survive substitution fail evaluation rather than resolving to
/// anything.
pub fn evaluate(input: &str) -> Result<Value, EvalError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.parse_or()?;
    match parser.peek() {
        None => Ok(value),
        Some(t) => Err(EvalError::UnexpectedToken(format!("{:?}", t))),
    }
}

/// Truthiness for condition results: bools as-is, numbers nonzero,
/// strings nonempty, null false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Null => false,
        Value::Array(a) => !a.is_empty(),
        Value::Object(_) => true,
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn parse_or(&mut self) -> Result<Value, EvalError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Value::Bool(truthy(&left) || truthy(&right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Value, EvalError> {
        let mut left = self.parse_equality()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let right = self.parse_equality()?;
            left = Value::Bool(truthy(&left) && truthy(&right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Value, EvalError> {
        let mut left = self.parse_comparison()?;
        loop {
            let negate = match self.peek() {
                Some(Token::Eq) => false,
                Some(Token::Ne) => true,
                _ => break,
            };
            self.advance();
            let right = self.parse_comparison()?;
            let equal = values_equal(&left, &right);
            left = Value::Bool(equal != negate);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Value, EvalError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => "<",
                Some(Token::Le) => "<=",
                Some(Token::Gt) => ">",
                Some(Token::Ge) => ">=",
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            let ordering = compare_values(&left, &right, op)?;
            let result = match op {
                "<" => ordering == std::cmp::Ordering::Less,
                "<=" => ordering != std::cmp::Ordering::Greater,
                ">" => ordering == std::cmp::Ordering::Greater,
                _ => ordering != std::cmp::Ordering::Less,
            };
            left = Value::Bool(result);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Value, EvalError> {
        let mut left = self.parse_term()?;
        loop {
            let plus = match self.peek() {
                Some(Token::Plus) => true,
                Some(Token::Minus) => false,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            left = if plus {
                add_values(&left, &right)?
            } else {
                let (a, b) = both_numbers(&left, &right, "-")?;
                number(a - b)
            };
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Value, EvalError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => "*",
                Some(Token::Slash) => "/",
                Some(Token::Percent) => "%",
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            let (a, b) = both_numbers(&left, &right, op)?;
            left = match op {
                "*" => number(a * b),
                "/" => {
                    if b == 0.0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    number(a / b)
                }
                _ => {
                    if b == 0.0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    number(a % b)
                }
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Value, EvalError> {
        match self.peek() {
            Some(Token::Not) => {
                self.advance();
                let v = self.parse_unary()?;
                Ok(Value::Bool(!truthy(&v)))
            }
            Some(Token::Minus) => {
                self.advance();
                let v = self.parse_unary()?;
                match v.as_f64() {
                    Some(n) => Ok(number(-n)),
                    None => Err(EvalError::TypeMismatch("-".to_string())),
                }
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Value, EvalError> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(number(n)),
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::Bool(b)) => Ok(Value::Bool(b)),
            Some(Token::Null) => Ok(Value::Null),
            Some(Token::Ident(name)) => Err(EvalError::UnknownIdentifier(name)),
            Some(Token::LParen) => {
                let value = self.parse_or()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(value),
                    Some(t) => Err(EvalError::UnexpectedToken(format!("{:?}", t))),
                    None => Err(EvalError::UnexpectedEnd),
                }
            }
            Some(t) => Err(EvalError::UnexpectedToken(format!("{:?}", t))),
            None => Err(EvalError::UnexpectedEnd),
        }
    }
}

fn number(n: f64) -> Value {
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare_values(a: &Value, b: &Value, op: &str) -> Result<std::cmp::Ordering, EvalError> {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x
            .partial_cmp(&y)
            .ok_or_else(|| EvalError::TypeMismatch(op.to_string()));
    }
    if let (Value::String(x), Value::String(y)) = (a, b) {
        return Ok(x.cmp(y));
    }
    Err(EvalError::TypeMismatch(op.to_string()))
}

fn add_values(a: &Value, b: &Value) -> Result<Value, EvalError> {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return Ok(number(x + y));
    }
    if let (Value::String(x), Value::String(y)) = (a, b) {
        return Ok(Value::String(format!("{}{}", x, y)));
    }
    Err(EvalError::TypeMismatch("+".to_string()))
}

fn both_numbers(a: &Value, b: &Value, op: &str) -> Result<(f64, f64), EvalError> {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => Ok((x, y)),
        _ => Err(EvalError::TypeMismatch(op.to_string())),
    }
}
