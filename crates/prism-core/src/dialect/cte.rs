//! WITH clause rendering.

use crate::dialect::DbmsDialect;
use crate::error::{QueryError, Result};
use crate::sql::helpers::validate_ident;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CteDefinition {
    name: String,
    columns: Vec<String>,
    body: String,
    recursive: bool,
}

impl CteDefinition {
    pub fn new<I, S>(name: &str, columns: I, body: &str) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        validate_ident(name)?;
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        for column in &columns {
            validate_ident(column)?;
        }
        Ok(Self {
            name: name.to_string(),
            columns,
            body: body.to_string(),
            recursive: false,
        })
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn is_recursive(&self) -> bool {
        self.recursive
    }
}

/// `with [recursive] a(x, y) AS(\n...\n),\nb(z) AS(\n...\n)\n`, or `None` when
/// there are no CTEs.
pub fn render_with_clause(dialect: &dyn DbmsDialect, ctes: &[CteDefinition]) -> Result<Option<String>> {
    if ctes.is_empty() {
        return Ok(None);
    }
    if !dialect.supports_with_clause() {
        return Err(QueryError::Configuration(format!(
            "the {} dialect does not support WITH clauses",
            dialect.name()
        )));
    }

    let recursive = ctes.iter().any(CteDefinition::is_recursive);
    let mut sb = String::new();
    sb.push_str(dialect.with_clause(recursive));
    sb.push(' ');
    for (i, cte) in ctes.iter().enumerate() {
        if i > 0 {
            sb.push_str(",\n");
        }
        sb.push_str(&cte.name);
        sb.push('(');
        sb.push_str(&cte.columns.join(", "));
        sb.push(')');
        sb.push_str(" AS(\n");
        sb.push_str(&cte.body);
        sb.push_str("\n)");
    }
    sb.push('\n');
    Ok(Some(sb))
}
