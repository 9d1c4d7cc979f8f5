//! DBMS dialects: turn a dialect-neutral rendered statement into SQL the target
//! database accepts (WITH clause, LIMIT/OFFSET, RETURNING, set operations).

pub mod cte;
mod mysql;
mod postgres;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{QueryError, Result};

pub use cte::{render_with_clause, CteDefinition};
pub use mysql::MySqlDialect;
pub use postgres::PostgresDialect;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DbmsStatementType {
    #[default]
    Select,
    Insert,
    Update,
    Delete,
}

impl fmt::Display for DbmsStatementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DbmsStatementType::Select => "SELECT",
            DbmsStatementType::Insert => "INSERT",
            DbmsStatementType::Update => "UPDATE",
            DbmsStatementType::Delete => "DELETE",
        })
    }
}

/// Which side of a modification a consumer of a CTE wants to observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DbmsModificationState {
    Old,
    New,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetOperationType {
    Union,
    UnionAll,
    Intersect,
    IntersectAll,
    Except,
    ExceptAll,
}

impl SetOperationType {
    pub fn keyword(self) -> &'static str {
        match self {
            SetOperationType::Union => "UNION",
            SetOperationType::UnionAll => "UNION ALL",
            SetOperationType::Intersect => "INTERSECT",
            SetOperationType::IntersectAll => "INTERSECT ALL",
            SetOperationType::Except => "EXCEPT",
            SetOperationType::ExceptAll => "EXCEPT ALL",
        }
    }

    pub fn is_intersect(self) -> bool {
        matches!(self, SetOperationType::Intersect | SetOperationType::IntersectAll)
    }

    pub fn is_except(self) -> bool {
        matches!(self, SetOperationType::Except | SetOperationType::ExceptAll)
    }
}

/// Everything `append_extended_sql` needs besides the statement text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtendedSqlRequest {
    pub statement_type: DbmsStatementType,
    pub is_subquery: bool,
    pub is_embedded: bool,
    pub with_clause: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub returning_columns: Option<Vec<String>>,
    /// Requested modification states mapped to the CTE name that exposes them.
    pub modification_states: BTreeMap<DbmsModificationState, String>,
}

impl ExtendedSqlRequest {
    pub fn new(statement_type: DbmsStatementType) -> Self {
        Self {
            statement_type,
            ..Default::default()
        }
    }

    pub fn subquery(mut self, is_subquery: bool) -> Self {
        self.is_subquery = is_subquery;
        self
    }

    pub fn embedded(mut self, is_embedded: bool) -> Self {
        self.is_embedded = is_embedded;
        self
    }

    pub fn with_clause(mut self, with_clause: Option<String>) -> Self {
        self.with_clause = with_clause;
        self
    }

    pub fn limit(mut self, limit: Option<String>, offset: Option<String>) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    pub fn returning<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.returning_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn include_state(mut self, state: DbmsModificationState, cte_name: &str) -> Self {
        self.modification_states.insert(state, cte_name.to_string());
        self
    }
}

/// Per database-family SQL rendering rules. The provided methods implement the
/// default dialect; implementations override what their database does
/// differently.
pub trait DbmsDialect: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn supports_with_clause(&self) -> bool {
        true
    }

    fn supports_returning_columns(&self) -> bool {
        false
    }

    fn supports_modification_query_in_with_clause(&self) -> bool {
        false
    }

    fn supports_intersect(&self) -> bool {
        true
    }

    fn supports_except(&self) -> bool {
        true
    }

    fn with_clause(&self, recursive: bool) -> &'static str {
        if recursive {
            "with recursive"
        } else {
            "with"
        }
    }

    fn append_limit(&self, sb: &mut String, _is_subquery: bool, limit: &str, offset: Option<&str>) {
        sb.push_str(" limit ");
        sb.push_str(limit);
        if let Some(offset) = offset {
            sb.push_str(" offset ");
            sb.push_str(offset);
        }
    }

    /// Finish `sb` for its position in the statement. Returns additional CTEs
    /// (name to body) the caller must register, which is empty unless the
    /// dialect had to synthesize a modification state.
    fn append_extended_sql(
        &self,
        sb: &mut String,
        request: &ExtendedSqlRequest,
    ) -> Result<BTreeMap<String, String>> {
        if request.is_subquery {
            sb.insert(0, '(');
        }
        if let Some(with_clause) = &request.with_clause {
            sb.insert_str(0, with_clause);
        }
        if let Some(limit) = &request.limit {
            self.append_limit(sb, request.is_subquery, limit, request.offset.as_deref());
        }
        if request.is_subquery {
            sb.push(')');
        }
        Ok(BTreeMap::new())
    }

    /// Render a set operation over already rendered operands, optionally
    /// ordered and limited as a whole.
    #[allow(clippy::too_many_arguments)]
    fn append_set(
        &self,
        sb: &mut String,
        set_type: SetOperationType,
        is_subquery: bool,
        operands: &[String],
        order_by: &[String],
        limit: Option<&str>,
        offset: Option<&str>,
    ) -> Result<()> {
        if (set_type.is_intersect() && !self.supports_intersect())
            || (set_type.is_except() && !self.supports_except())
        {
            return Err(QueryError::Configuration(format!(
                "{} is not supported by the {} dialect",
                set_type.keyword(),
                self.name()
            )));
        }

        if is_subquery {
            sb.push('(');
        }
        if !operands.is_empty() {
            let has_outer_clause = limit.is_some() || !order_by.is_empty();
            self.append_set_operands(sb, set_type.keyword(), is_subquery, operands, has_outer_clause);
            if !order_by.is_empty() {
                sb.push_str(" order by ");
                sb.push_str(&order_by.join(", "));
            }
            if let Some(limit) = limit {
                self.append_limit(sb, is_subquery, limit, offset);
            }
        }
        if is_subquery {
            sb.push(')');
        }
        Ok(())
    }

    fn append_set_operands(
        &self,
        sb: &mut String,
        operator: &str,
        _is_subquery: bool,
        operands: &[String],
        _has_outer_clause: bool,
    ) {
        for (i, operand) in operands.iter().enumerate() {
            if i > 0 {
                sb.push('\n');
                sb.push_str(operator);
                sb.push('\n');
            }
            sb.push_str(operand);
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefaultDialect;

impl DbmsDialect for DefaultDialect {
    fn name(&self) -> &'static str {
        "default"
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    #[default]
    Default,
    Postgres,
    MySql,
}

impl DialectKind {
    pub fn create(self) -> Arc<dyn DbmsDialect> {
        match self {
            DialectKind::Default => Arc::new(DefaultDialect),
            DialectKind::Postgres => Arc::new(PostgresDialect),
            DialectKind::MySql => Arc::new(MySqlDialect),
        }
    }
}

impl FromStr for DialectKind {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(DialectKind::Default),
            "postgres" | "postgresql" => Ok(DialectKind::Postgres),
            "mysql" => Ok(DialectKind::MySql),
            other => Err(QueryError::Configuration(format!(
                "unknown dialect `{other}`"
            ))),
        }
    }
}
