//! Lexer, parser, and evaluator for store expression strings.
//!
//! Covers the subset the data-access layer emits: comparisons
//! (`= <> < <= > >=`), `AND`/`OR`/`NOT`, `BETWEEN`, `begins_with`,
//! `attribute_exists`/`attribute_not_exists`, plus `SET` update
//! expressions. Operands are always a path on the left and a `:value`
//! reference on the right; keywords match case-insensitively.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use idvault_model::{Item, NativeValue};

/// Errors produced during expression parsing or evaluation.
#[derive(Debug, thiserror::Error)]
pub enum ExprError {
    /// An unexpected token was encountered.
    #[error("unexpected token: expected {expected}, found {found}")]
    UnexpectedToken {
        /// What was expected.
        expected: String,
        /// What was found.
        found: String,
    },
    /// The expression ended prematurely.
    #[error("unexpected end of expression")]
    UnexpectedEof,
    /// A `#name` placeholder has no entry in the names map.
    #[error("unresolved expression attribute name: {0}")]
    UnresolvedName(String),
    /// A `:value` placeholder has no entry in the values map.
    #[error("unresolved expression attribute value: {0}")]
    UnresolvedValue(String),
}

/// A comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

/// An attribute reference: a plain name or a `#placeholder`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameRef {
    /// Literal attribute name.
    Plain(String),
    /// `#name` placeholder resolved through the names map.
    Placeholder(String),
}

/// A `:value` placeholder resolved through the values map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueRef(pub String);

/// Condition expression AST.
#[derive(Debug, Clone)]
pub enum Expr {
    /// `path op :value`
    Compare {
        /// Attribute operand.
        path: NameRef,
        /// Operator.
        op: CompareOp,
        /// Value operand.
        value: ValueRef,
    },
    /// `path BETWEEN :low AND :high`
    Between {
        /// Attribute operand.
        path: NameRef,
        /// Lower bound (inclusive).
        low: ValueRef,
        /// Upper bound (inclusive).
        high: ValueRef,
    },
    /// `left AND right`
    And(Box<Expr>, Box<Expr>),
    /// `left OR right`
    Or(Box<Expr>, Box<Expr>),
    /// `NOT expr`
    Not(Box<Expr>),
    /// `attribute_exists(path)`
    Exists(NameRef),
    /// `attribute_not_exists(path)`
    NotExists(NameRef),
    /// `begins_with(path, :value)`
    BeginsWith(NameRef, ValueRef),
}

/// One `SET` action of an update expression.
#[derive(Debug, Clone)]
pub struct SetAction {
    /// Target attribute.
    pub path: NameRef,
    /// Value to assign.
    pub value: ValueRef,
}

/// Parses a condition, filter, or key-condition expression.
pub fn parse_condition(input: &str) -> Result<Expr, ExprError> {
    let tokens = Lexer::new(input).tokenize()?;
    let mut parser = Parser {
        tokens,
        position: 0,
    };
    let expr = parser.parse_or()?;
    parser.expect(&Token::Eof)?;
    Ok(expr)
}

/// Parses an update expression (only `SET` actions are supported).
pub fn parse_update(input: &str) -> Result<Vec<SetAction>, ExprError> {
    let tokens = Lexer::new(input).tokenize()?;
    let mut parser = Parser {
        tokens,
        position: 0,
    };
    parser.expect(&Token::Set)?;
    let mut actions = vec![parser.parse_set_action()?];
    while *parser.peek() == Token::Comma {
        parser.advance();
        actions.push(parser.parse_set_action()?);
    }
    parser.expect(&Token::Eof)?;
    Ok(actions)
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Identifier(String),
    ExprAttrName(String),
    ExprAttrValue(String),
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Comma,
    LParen,
    RParen,
    And,
    Or,
    Not,
    Between,
    Set,
    AttributeExists,
    AttributeNotExists,
    BeginsWith,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identifier(s) => write!(f, "identifier '{s}'"),
            Self::ExprAttrName(s) => write!(f, "#{s}"),
            Self::ExprAttrValue(s) => write!(f, ":{s}"),
            Self::Eq => write!(f, "'='"),
            Self::Ne => write!(f, "'<>'"),
            Self::Lt => write!(f, "'<'"),
            Self::Le => write!(f, "'<='"),
            Self::Gt => write!(f, "'>'"),
            Self::Ge => write!(f, "'>='"),
            Self::Comma => write!(f, "','"),
            Self::LParen => write!(f, "'('"),
            Self::RParen => write!(f, "')'"),
            Self::And => write!(f, "AND"),
            Self::Or => write!(f, "OR"),
            Self::Not => write!(f, "NOT"),
            Self::Between => write!(f, "BETWEEN"),
            Self::Set => write!(f, "SET"),
            Self::AttributeExists => write!(f, "attribute_exists"),
            Self::AttributeNotExists => write!(f, "attribute_not_exists"),
            Self::BeginsWith => write!(f, "begins_with"),
            Self::Eof => write!(f, "EOF"),
        }
    }
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
        }
    }

    fn tokenize(&mut self) -> Result<Vec<Token>, ExprError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let done = tok == Token::Eof;
            tokens.push(tok);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, ExprError> {
        while self.chars.peek().is_some_and(char::is_ascii_whitespace) {
            self.chars.next();
        }

        let Some(&ch) = self.chars.peek() else {
            return Ok(Token::Eof);
        };

        match ch {
            '#' => {
                self.chars.next();
                Ok(Token::ExprAttrName(self.read_identifier()))
            }
            ':' => {
                self.chars.next();
                Ok(Token::ExprAttrValue(self.read_identifier()))
            }
            '=' => {
                self.chars.next();
                Ok(Token::Eq)
            }
            '<' => {
                self.chars.next();
                match self.chars.peek() {
                    Some('>') => {
                        self.chars.next();
                        Ok(Token::Ne)
                    }
                    Some('=') => {
                        self.chars.next();
                        Ok(Token::Le)
                    }
                    _ => Ok(Token::Lt),
                }
            }
            '>' => {
                self.chars.next();
                if self.chars.peek() == Some(&'=') {
                    self.chars.next();
                    Ok(Token::Ge)
                } else {
                    Ok(Token::Gt)
                }
            }
            ',' => {
                self.chars.next();
                Ok(Token::Comma)
            }
            '(' => {
                self.chars.next();
                Ok(Token::LParen)
            }
            ')' => {
                self.chars.next();
                Ok(Token::RParen)
            }
            c if c.is_ascii_alphanumeric() || c == '_' => {
                let word = self.read_identifier();
                Ok(keyword_or_identifier(word))
            }
            other => Err(ExprError::UnexpectedToken {
                expected: "an expression token".to_owned(),
                found: format!("'{other}'"),
            }),
        }
    }

    fn read_identifier(&mut self) -> String {
        let mut out = String::new();
        while self
            .chars
            .peek()
            .is_some_and(|&c| c.is_ascii_alphanumeric() || c == '_')
        {
            out.push(self.chars.next().unwrap_or_default());
        }
        out
    }
}

fn keyword_or_identifier(word: String) -> Token {
    match word.to_ascii_uppercase().as_str() {
        "AND" => Token::And,
        "OR" => Token::Or,
        "NOT" => Token::Not,
        "BETWEEN" => Token::Between,
        "SET" => Token::Set,
        _ => match word.to_ascii_lowercase().as_str() {
            "attribute_exists" => Token::AttributeExists,
            "attribute_not_exists" => Token::AttributeNotExists,
            "begins_with" => Token::BeginsWith,
            _ => Token::Identifier(word),
        },
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens.get(self.position).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        self.position += 1;
        tok
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ExprError> {
        let tok = self.advance();
        if tok == *expected {
            Ok(())
        } else {
            Err(ExprError::UnexpectedToken {
                expected: expected.to_string(),
                found: tok.to_string(),
            })
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_and()?;
        while *self.peek() == Token::Or {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_unary()?;
        while *self.peek() == Token::And {
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        match self.peek().clone() {
            Token::Not => {
                self.advance();
                Ok(Expr::Not(Box::new(self.parse_unary()?)))
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::AttributeExists => {
                self.advance();
                let path = self.parse_parenthesized_name()?;
                Ok(Expr::Exists(path))
            }
            Token::AttributeNotExists => {
                self.advance();
                let path = self.parse_parenthesized_name()?;
                Ok(Expr::NotExists(path))
            }
            Token::BeginsWith => {
                self.advance();
                self.expect(&Token::LParen)?;
                let path = self.parse_name()?;
                self.expect(&Token::Comma)?;
                let value = self.parse_value()?;
                self.expect(&Token::RParen)?;
                Ok(Expr::BeginsWith(path, value))
            }
            _ => self.parse_comparison(),
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let path = self.parse_name()?;

        if *self.peek() == Token::Between {
            self.advance();
            let low = self.parse_value()?;
            self.expect(&Token::And)?;
            let high = self.parse_value()?;
            return Ok(Expr::Between { path, low, high });
        }

        let op = match self.advance() {
            Token::Eq => CompareOp::Eq,
            Token::Ne => CompareOp::Ne,
            Token::Lt => CompareOp::Lt,
            Token::Le => CompareOp::Le,
            Token::Gt => CompareOp::Gt,
            Token::Ge => CompareOp::Ge,
            Token::Eof => return Err(ExprError::UnexpectedEof),
            other => {
                return Err(ExprError::UnexpectedToken {
                    expected: "a comparison operator".to_owned(),
                    found: other.to_string(),
                });
            }
        };

        let value = self.parse_value()?;
        Ok(Expr::Compare { path, op, value })
    }

    fn parse_parenthesized_name(&mut self) -> Result<NameRef, ExprError> {
        self.expect(&Token::LParen)?;
        let path = self.parse_name()?;
        self.expect(&Token::RParen)?;
        Ok(path)
    }

    fn parse_name(&mut self) -> Result<NameRef, ExprError> {
        match self.advance() {
            Token::Identifier(name) => Ok(NameRef::Plain(name)),
            Token::ExprAttrName(name) => Ok(NameRef::Placeholder(name)),
            Token::Eof => Err(ExprError::UnexpectedEof),
            other => Err(ExprError::UnexpectedToken {
                expected: "an attribute path".to_owned(),
                found: other.to_string(),
            }),
        }
    }

    fn parse_value(&mut self) -> Result<ValueRef, ExprError> {
        match self.advance() {
            Token::ExprAttrValue(name) => Ok(ValueRef(name)),
            Token::Eof => Err(ExprError::UnexpectedEof),
            other => Err(ExprError::UnexpectedToken {
                expected: "a :value reference".to_owned(),
                found: other.to_string(),
            }),
        }
    }

    fn parse_set_action(&mut self) -> Result<SetAction, ExprError> {
        let path = self.parse_name()?;
        self.expect(&Token::Eq)?;
        let value = self.parse_value()?;
        Ok(SetAction { path, value })
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Evaluation context binding an item to its placeholder maps.
#[derive(Debug)]
pub struct EvalContext<'a> {
    /// The item under evaluation.
    pub item: &'a Item,
    /// `#name` substitutions.
    pub names: &'a HashMap<String, String>,
    /// `:value` substitutions.
    pub values: &'a HashMap<String, NativeValue>,
}

impl EvalContext<'_> {
    /// Evaluates a condition expression to a boolean.
    pub fn evaluate(&self, expr: &Expr) -> Result<bool, ExprError> {
        match expr {
            Expr::And(left, right) => Ok(self.evaluate(left)? && self.evaluate(right)?),
            Expr::Or(left, right) => Ok(self.evaluate(left)? || self.evaluate(right)?),
            Expr::Not(inner) => Ok(!self.evaluate(inner)?),
            Expr::Exists(path) => Ok(self.attribute(path)?.is_some()),
            Expr::NotExists(path) => Ok(self.attribute(path)?.is_none()),
            Expr::BeginsWith(path, value) => {
                let prefix = self.value(value)?;
                Ok(match (self.attribute(path)?, prefix.as_s()) {
                    (Some(NativeValue::S(s)), Some(p)) => s.starts_with(p),
                    _ => false,
                })
            }
            Expr::Compare { path, op, value } => {
                let expected = self.value(value)?;
                match self.attribute(path)? {
                    // A missing attribute is "not equal" to anything and
                    // fails every other comparison.
                    None => Ok(*op == CompareOp::Ne),
                    Some(actual) => Ok(compare_values(actual, expected, *op)),
                }
            }
            Expr::Between { path, low, high } => {
                let low = self.value(low)?;
                let high = self.value(high)?;
                match self.attribute(path)? {
                    None => Ok(false),
                    Some(actual) => Ok(compare_values(actual, low, CompareOp::Ge)
                        && compare_values(actual, high, CompareOp::Le)),
                }
            }
        }
    }

    /// Applies `SET` actions to a copy of the item.
    pub fn apply_update(&self, actions: &[SetAction]) -> Result<Item, ExprError> {
        let mut updated = self.item.clone();
        for action in actions {
            let name = self.resolve_name(&action.path)?;
            let value = self.value(&action.value)?.clone();
            updated.insert(name.to_owned(), value);
        }
        Ok(updated)
    }

    fn resolve_name<'b>(&'b self, path: &'b NameRef) -> Result<&'b str, ExprError> {
        match path {
            NameRef::Plain(name) => Ok(name),
            NameRef::Placeholder(name) => {
                let key = format!("#{name}");
                self.names
                    .get(&key)
                    .map(String::as_str)
                    .ok_or(ExprError::UnresolvedName(key))
            }
        }
    }

    fn attribute(&self, path: &NameRef) -> Result<Option<&NativeValue>, ExprError> {
        let name = self.resolve_name(path)?;
        Ok(self.item.get(name).filter(|v| !v.is_null()))
    }

    fn value(&self, value: &ValueRef) -> Result<&NativeValue, ExprError> {
        let key = format!(":{}", value.0);
        self.values
            .get(&key)
            .ok_or(ExprError::UnresolvedValue(key))
    }
}

fn compare_values(a: &NativeValue, b: &NativeValue, op: CompareOp) -> bool {
    if op == CompareOp::Eq {
        return values_equal(a, b);
    }
    if op == CompareOp::Ne {
        return !values_equal(a, b);
    }
    let Some(ordering) = value_ordering(a, b) else {
        return false;
    };
    match op {
        CompareOp::Lt => ordering.is_lt(),
        CompareOp::Le => ordering.is_le(),
        CompareOp::Gt => ordering.is_gt(),
        CompareOp::Ge => ordering.is_ge(),
        CompareOp::Eq | CompareOp::Ne => unreachable!("handled above"),
    }
}

fn values_equal(a: &NativeValue, b: &NativeValue) -> bool {
    match (a, b) {
        (NativeValue::N(_), NativeValue::N(_)) => {
            value_ordering(a, b) == Some(Ordering::Equal)
        }
        _ => a == b,
    }
}

/// Comparison order across key-eligible values: strings by bytes, numbers
/// numerically, booleans `false < true`. Mixed kinds do not order.
pub fn value_ordering(a: &NativeValue, b: &NativeValue) -> Option<Ordering> {
    match (a, b) {
        (NativeValue::S(x), NativeValue::S(y)) => Some(x.as_bytes().cmp(y.as_bytes())),
        (NativeValue::N(_), NativeValue::N(_)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (NativeValue::Bool(x), NativeValue::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context_parts() -> (HashMap<String, String>, HashMap<String, NativeValue>) {
        let mut names = HashMap::new();
        names.insert("#version".to_owned(), "version".to_owned());
        names.insert("#pk".to_owned(), "pk".to_owned());
        let mut values = HashMap::new();
        values.insert(":version_1".to_owned(), NativeValue::number(3));
        values.insert(":prefix_1".to_owned(), NativeValue::string("ai#"));
        (names, values)
    }

    fn item(pairs: &[(&str, NativeValue)]) -> Item {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn test_should_evaluate_version_precondition() {
        let (names, values) = context_parts();
        let expr = parse_condition("#version = :version_1").unwrap();

        let current = item(&[("version", NativeValue::number(3))]);
        let ctx = EvalContext {
            item: &current,
            names: &names,
            values: &values,
        };
        assert!(ctx.evaluate(&expr).unwrap());

        let stale = item(&[("version", NativeValue::number(4))]);
        let ctx = EvalContext {
            item: &stale,
            names: &names,
            values: &values,
        };
        assert!(!ctx.evaluate(&expr).unwrap());
    }

    #[test]
    fn test_should_evaluate_attribute_not_exists_on_empty_item() {
        let (names, values) = context_parts();
        let expr = parse_condition("attribute_not_exists(#pk)").unwrap();
        let empty = Item::new();
        let ctx = EvalContext {
            item: &empty,
            names: &names,
            values: &values,
        };
        assert!(ctx.evaluate(&expr).unwrap());
    }

    #[test]
    fn test_should_evaluate_begins_with() {
        let (names, values) = context_parts();
        let expr = parse_condition("begins_with(#pk, :prefix_1)").unwrap();

        let main = item(&[("pk", NativeValue::string("ai#123"))]);
        let ctx = EvalContext {
            item: &main,
            names: &names,
            values: &values,
        };
        assert!(ctx.evaluate(&expr).unwrap());

        let secondary = item(&[("pk", NativeValue::string("un#bob"))]);
        let ctx = EvalContext {
            item: &secondary,
            names: &names,
            values: &values,
        };
        assert!(!ctx.evaluate(&expr).unwrap());
    }

    #[test]
    fn test_should_respect_precedence_and_parentheses() {
        let mut values = HashMap::new();
        values.insert(":a".to_owned(), NativeValue::string("x"));
        values.insert(":b".to_owned(), NativeValue::string("y"));
        let names = HashMap::new();

        let it = item(&[("a", NativeValue::string("x"))]);
        let ctx = EvalContext {
            item: &it,
            names: &names,
            values: &values,
        };

        // a = :a holds, b = :b fails (missing attribute).
        let expr = parse_condition("a = :a OR a = :a AND b = :b").unwrap();
        assert!(ctx.evaluate(&expr).unwrap());

        let expr = parse_condition("(a = :a OR a = :a) AND b = :b").unwrap();
        assert!(!ctx.evaluate(&expr).unwrap());

        let expr = parse_condition("NOT a = :a").unwrap();
        assert!(!ctx.evaluate(&expr).unwrap());
    }

    #[test]
    fn test_should_compare_numbers_numerically_in_between() {
        let mut values = HashMap::new();
        values.insert(":lo".to_owned(), NativeValue::number(2));
        values.insert(":hi".to_owned(), NativeValue::number(10));
        let names = HashMap::new();

        let it = item(&[("n", NativeValue::number(9))]);
        let ctx = EvalContext {
            item: &it,
            names: &names,
            values: &values,
        };
        let expr = parse_condition("n BETWEEN :lo AND :hi").unwrap();
        assert!(ctx.evaluate(&expr).unwrap());
    }

    #[test]
    fn test_should_apply_set_update() {
        let mut names = HashMap::new();
        names.insert("#status".to_owned(), "status".to_owned());
        let mut values = HashMap::new();
        values.insert(":status_1".to_owned(), NativeValue::string("revoked"));

        let it = item(&[
            ("id", NativeValue::string("d1")),
            ("status", NativeValue::string("issued")),
        ]);
        let ctx = EvalContext {
            item: &it,
            names: &names,
            values: &values,
        };
        let actions = parse_update("SET #status = :status_1").unwrap();
        let updated = ctx.apply_update(&actions).unwrap();
        assert_eq!(updated.get("status"), Some(&NativeValue::string("revoked")));
        assert_eq!(updated.get("id"), Some(&NativeValue::string("d1")));
    }

    #[test]
    fn test_should_error_on_unresolved_placeholder() {
        let names = HashMap::new();
        let mut values = HashMap::new();
        values.insert(":v".to_owned(), NativeValue::string("x"));
        let it = Item::new();
        let ctx = EvalContext {
            item: &it,
            names: &names,
            values: &values,
        };
        let expr = parse_condition("#missing = :v").unwrap();
        assert!(matches!(
            ctx.evaluate(&expr),
            Err(ExprError::UnresolvedName(_))
        ));
        let expr = parse_condition("a = :nope").unwrap();
        assert!(matches!(
            ctx.evaluate(&expr),
            Err(ExprError::UnresolvedValue(_))
        ));
    }

    #[test]
    fn test_should_reject_malformed_expressions() {
        assert!(matches!(
            parse_condition("a = "),
            Err(ExprError::UnexpectedEof)
        ));
        assert!(matches!(
            parse_condition("a = :v extra"),
            Err(ExprError::UnexpectedToken { .. })
        ));
        assert!(parse_update("REMOVE a").is_err());
    }
}
