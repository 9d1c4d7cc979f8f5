//! Expression tree.
//!
//! Expressions are a closed sum type; renderers and transformers match on the
//! variant instead of dispatching through a visitor. `Display` renders the raw
//! textual form, which is what unresolved aliases are looked up by.

use std::fmt;

use crate::join::JoinNodeId;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Path(PathExpression),
    Function(FunctionExpression),
    Parameter(ParameterExpression),
    Array(ArrayExpression),
    Literal(Literal),
    Subquery(Box<SubqueryExpression>),
}

impl Expression {
    /// Unbound path from dotted text.
    pub fn path(path: &str) -> Self {
        Expression::Path(PathExpression::new(path))
    }

    pub fn function(name: &str, args: Vec<Expression>) -> Self {
        Expression::Function(FunctionExpression::new(name, args))
    }

    pub fn parameter(name: &str) -> Self {
        Expression::Parameter(ParameterExpression::named(name))
    }

    pub fn string(value: &str) -> Self {
        Expression::Literal(Literal::String(value.to_string()))
    }

    pub fn integer(value: i64) -> Self {
        Expression::Literal(Literal::Integer(value))
    }

    pub fn as_path(&self) -> Option<&PathExpression> {
        match self {
            Expression::Path(p) => Some(p),
            _ => None,
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Path(p) => p.fmt(f),
            Expression::Function(func) => func.fmt(f),
            Expression::Parameter(p) => p.fmt(f),
            Expression::Array(a) => a.fmt(f),
            Expression::Literal(l) => l.fmt(f),
            Expression::Subquery(s) => s.fmt(f),
        }
    }
}

/// A dotted path. When `base_node` is set the path has been resolved against the
/// join tree and renders as `<alias>[.<field>]`; otherwise it is a raw reference
/// (for instance a select alias) that renders as its text.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PathExpression {
    elements: Vec<String>,
    base_node: Option<JoinNodeId>,
    field: Option<String>,
    collection_key_path: bool,
    used_in_collection_function: bool,
}

impl PathExpression {
    pub fn new(path: &str) -> Self {
        Self {
            elements: path.split('.').map(str::to_string).collect(),
            ..Default::default()
        }
    }

    /// Path bound to a join node, optionally dereferencing one field.
    pub fn bound(path: &str, base_node: JoinNodeId, field: Option<&str>) -> Self {
        Self {
            base_node: Some(base_node),
            field: field.map(str::to_string),
            ..Self::new(path)
        }
    }

    pub fn elements(&self) -> &[String] {
        &self.elements
    }

    pub fn path(&self) -> String {
        self.elements.join(".")
    }

    pub fn base_node(&self) -> Option<JoinNodeId> {
        self.base_node
    }

    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    pub fn is_collection_key_path(&self) -> bool {
        self.collection_key_path
    }

    pub fn is_used_in_collection_function(&self) -> bool {
        self.used_in_collection_function
    }

    /// Marks the path as the argument of `KEY()`/`INDEX()`.
    pub fn set_collection_key_path(mut self, value: bool) -> Self {
        self.collection_key_path = value;
        self
    }

    /// Marks the path as wrapped by a collection function such as `VALUE()`.
    pub fn set_used_in_collection_function(mut self, value: bool) -> Self {
        self.used_in_collection_function = value;
        self
    }
}

impl fmt::Display for PathExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    /// `OUTER(expr)`: refers to the enclosing query, renders its argument.
    Outer,
    /// `FUNCTION('name', args...)`: dynamic call of a named database function.
    Dynamic,
    Ordinary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionExpression {
    name: String,
    args: Vec<Expression>,
}

impl FunctionExpression {
    pub fn new(name: &str, args: Vec<Expression>) -> Self {
        Self {
            name: name.to_string(),
            args,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[Expression] {
        &self.args
    }

    pub fn kind(&self) -> FunctionKind {
        if self.name.eq_ignore_ascii_case("OUTER") {
            FunctionKind::Outer
        } else if self.name.eq_ignore_ascii_case("FUNCTION") {
            FunctionKind::Dynamic
        } else {
            FunctionKind::Ordinary
        }
    }

    /// Name carried by the first argument of a dynamic call, quotes stripped.
    pub fn dynamic_function_name(&self) -> Option<String> {
        match self.args.first()? {
            Expression::Literal(Literal::String(s)) => Some(s.clone()),
            other => Some(unwrap_string_literal(&other.to_string()).to_string()),
        }
    }
}

impl fmt::Display for FunctionExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str(")")
    }
}

fn unwrap_string_literal(s: &str) -> &str {
    if s.len() >= 2 && s.starts_with('\'') && s.ends_with('\'') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterExpression {
    name: Option<String>,
    value: Option<Value>,
}

impl ParameterExpression {
    pub fn named(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            value: None,
        }
    }

    pub fn unnamed() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }
}

impl fmt::Display for ParameterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, ":{name}"),
            None => f.write_str("?"),
        }
    }
}

/// `base[index]`, an indexed access into a collection or map.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayExpression {
    pub base: PathExpression,
    pub index: Box<Expression>,
}

impl fmt::Display for ArrayExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.base, self.index)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Integer(i64),
    /// Kept as written so precision is not lost.
    Decimal(String),
    Boolean(bool),
    Null,
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Literal::Integer(n) => write!(f, "{n}"),
            Literal::Decimal(d) => f.write_str(d),
            Literal::Boolean(true) => f.write_str("TRUE"),
            Literal::Boolean(false) => f.write_str("FALSE"),
            Literal::Null => f.write_str("NULL"),
        }
    }
}

/// Correlated subquery over an entity, used by expression rewrites.
#[derive(Debug, Clone, PartialEq)]
pub struct SubqueryExpression {
    pub select: Expression,
    pub from_entity: String,
    pub from_alias: String,
    /// `(relation path, alias)` pairs rendered as LEFT JOINs.
    pub joins: Vec<(String, String)>,
    /// Equalities rendered into the WHERE clause, AND-ed.
    pub correlations: Vec<(Expression, Expression)>,
}

impl fmt::Display for SubqueryExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(SELECT {} FROM {} {}",
            self.select, self.from_entity, self.from_alias
        )?;
        for (path, alias) in &self.joins {
            write!(f, " LEFT JOIN {path} {alias}")?;
        }
        for (i, (left, right)) in self.correlations.iter().enumerate() {
            f.write_str(if i == 0 { " WHERE " } else { " AND " })?;
            write!(f, "{left} = {right}")?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_raw_text() {
        let e = Expression::function(
            "CONCAT",
            vec![Expression::path("d.name"), Expression::string("x'y")],
        );
        assert_eq!(e.to_string(), "CONCAT(d.name,'x''y')");
        assert_eq!(Expression::parameter("p").to_string(), ":p");
    }

    #[test]
    fn function_kinds() {
        assert_eq!(
            FunctionExpression::new("outer", vec![]).kind(),
            FunctionKind::Outer
        );
        let dynamic = FunctionExpression::new(
            "FUNCTION",
            vec![Expression::string("my_fn"), Expression::integer(1)],
        );
        assert_eq!(dynamic.kind(), FunctionKind::Dynamic);
        assert_eq!(dynamic.dynamic_function_name().as_deref(), Some("my_fn"));
        assert_eq!(
            FunctionExpression::new("UPPER", vec![]).kind(),
            FunctionKind::Ordinary
        );
    }

    #[test]
    fn array_display() {
        let a = ArrayExpression {
            base: PathExpression::new("d.contacts"),
            index: Box::new(Expression::integer(1)),
        };
        assert_eq!(a.to_string(), "d.contacts[1]");
    }
}
