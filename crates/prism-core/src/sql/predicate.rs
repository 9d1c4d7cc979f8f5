use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{QueryError, Result};
use crate::expression::{Expression, Literal, ParameterExpression};
use crate::sql::helpers::validate_path;

/// `left <op> right` comparison used in WHERE and ON clauses.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    left: Expression,
    operator: String, // normalized (UPPERCASE, single spaces)
    right: Expression,
}

impl Predicate {
    pub fn new(left: Expression, operator: &str, right: Expression) -> Result<Self> {
        let operator = normalize_op(operator)?;
        validate_operands(&operator, &right)?;
        Ok(Self {
            left,
            operator,
            right,
        })
    }

    pub fn eq(left: Expression, right: Expression) -> Self {
        Self {
            left,
            operator: "=".to_string(),
            right,
        }
    }

    pub fn left(&self) -> &Expression {
        &self.left
    }

    pub fn operator(&self) -> &str {
        &self.operator
    }

    pub fn right(&self) -> &Expression {
        &self.right
    }

    /// Rebuild with both operands passed through `f`.
    pub fn try_map<F>(&self, mut f: F) -> Result<Self>
    where
        F: FnMut(&Expression) -> Result<Expression>,
    {
        Ok(Self {
            left: f(&self.left)?,
            operator: self.operator.clone(),
            right: f(&self.right)?,
        })
    }
}

impl FromStr for Predicate {
    type Err = QueryError;

    fn from_str(input: &str) -> Result<Self> {
        // Order matters: longest/most specific first.
        static OP_RE: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"(?i)\s+is\s+not\s+|\s+is\s+|<=|>=|<>|!=|=|<|>")
                .expect("operator pattern")
        });

        let s = input.trim();
        let m = OP_RE
            .find(s)
            .ok_or_else(|| QueryError::InvalidPredicate(format!("`{input}`")))?;

        let left_raw = s[..m.start()].trim();
        let op_raw = s[m.start()..m.end()].trim();
        let right_raw = s[m.end()..].trim();

        if left_raw.is_empty() || right_raw.is_empty() {
            return Err(QueryError::InvalidPredicate(format!("`{input}`")));
        }

        Predicate::new(parse_operand(left_raw)?, op_raw, parse_operand(right_raw)?)
    }
}

impl TryFrom<&str> for Predicate {
    type Error = QueryError;
    fn try_from(s: &str) -> Result<Self> {
        Self::from_str(s)
    }
}

impl TryFrom<String> for Predicate {
    type Error = QueryError;
    fn try_from(s: String) -> Result<Self> {
        Self::from_str(&s)
    }
}

impl std::fmt::Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.left, self.operator, self.right)
    }
}

fn normalize_op(op: &str) -> Result<String> {
    let up = op.trim().to_ascii_uppercase();
    let norm = up.split_whitespace().collect::<Vec<_>>().join(" ");
    match norm.as_str() {
        "=" | "!=" | "<>" | "<" | "<=" | ">" | ">=" | "IS" | "IS NOT" => Ok(norm),
        _ => Err(QueryError::InvalidPredicate(format!(
            "unsupported operator `{op}`"
        ))),
    }
}

fn parse_operand(raw: &str) -> Result<Expression> {
    if raw.eq_ignore_ascii_case("NULL") {
        return Ok(Expression::Literal(Literal::Null));
    }
    if raw.eq_ignore_ascii_case("TRUE") || raw.eq_ignore_ascii_case("FALSE") {
        return Ok(Expression::Literal(Literal::Boolean(
            raw.eq_ignore_ascii_case("TRUE"),
        )));
    }
    if let Some(name) = raw.strip_prefix(':') {
        validate_path(name)?;
        return Ok(Expression::Parameter(ParameterExpression::named(name)));
    }
    // quoted string?
    if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        let inner = raw[1..raw.len() - 1].replace("''", "'");
        return Ok(Expression::Literal(Literal::String(inner)));
    }
    // number?
    if raw.as_bytes()[0].is_ascii_digit() || raw.starts_with(['+', '-']) {
        if let Ok(n) = raw.parse::<i64>() {
            return Ok(Expression::Literal(Literal::Integer(n)));
        }
        if raw.parse::<f64>().is_ok() {
            return Ok(Expression::Literal(Literal::Decimal(raw.to_string())));
        }
    }
    // fallback: path
    validate_path(raw)?;
    Ok(Expression::path(raw))
}

fn validate_operands(op: &str, right: &Expression) -> Result<()> {
    let null_right = matches!(right, Expression::Literal(Literal::Null));
    match (op, null_right) {
        ("IS" | "IS NOT", true) => Ok(()),
        ("IS" | "IS NOT", false) => Err(QueryError::InvalidPredicate(format!(
            "operator `{op}` requires NULL"
        ))),
        (_, true) => Err(QueryError::InvalidPredicate(
            "only IS / IS NOT allowed with NULL".to_string(),
        )),
        _ => Ok(()),
    }
}
