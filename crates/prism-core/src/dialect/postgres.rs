use std::collections::BTreeMap;

use tracing::debug;

use super::{DbmsDialect, DbmsModificationState, DbmsStatementType, ExtendedSqlRequest};
use crate::error::{QueryError, Result};
use crate::sql::helpers::index_of_ignore_case;

/// PostgreSQL family: data-modifying CTEs with RETURNING.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostgresDialect;

impl DbmsDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn supports_returning_columns(&self) -> bool {
        true
    }

    fn supports_modification_query_in_with_clause(&self) -> bool {
        true
    }

    fn append_extended_sql(
        &self,
        sb: &mut String,
        request: &ExtendedSqlRequest,
    ) -> Result<BTreeMap<String, String>> {
        // Side effects of one CTE branch are invisible to its siblings, so the
        // new state has to be rebuilt from the returned rows.
        if let Some(new_cte) = request.modification_states.get(&DbmsModificationState::New) {
            let columns = request.returning_columns.as_deref().ok_or_else(|| {
                QueryError::Configuration(format!(
                    "returning columns are required to expose the new state of `{new_cte}`"
                ))
            })?;

            let mut modification = String::with_capacity(sb.len() + columns.len() * 30);
            modification.push_str(sb);
            modification.push_str(" returning *");
            sb.clear();

            if request.is_subquery {
                sb.push('(');
            }
            if request.statement_type == DbmsStatementType::Delete {
                append_select_columns_from_table(request.statement_type, &modification, sb, columns)?;
                sb.push_str("\nexcept\n");
                append_select_columns_from_cte(sb, columns, new_cte);
            } else {
                append_select_columns_from_cte(sb, columns, new_cte);
                sb.push_str("\nunion\n");
                append_select_columns_from_table(request.statement_type, &modification, sb, columns)?;
            }
            if request.is_subquery {
                sb.push(')');
            }

            debug!(cte = %new_cte, statement = %request.statement_type, "synthesized new-state CTE");
            let mut extra = BTreeMap::new();
            extra.insert(new_cte.clone(), modification);
            return Ok(extra);
        }

        if request.is_subquery {
            sb.insert(0, '(');
        }
        if let Some(with_clause) = &request.with_clause {
            sb.insert_str(0, with_clause);
        }
        if let Some(limit) = &request.limit {
            self.append_limit(sb, request.is_subquery, limit, request.offset.as_deref());
        }
        if request.is_embedded {
            if let Some(columns) = &request.returning_columns {
                sb.push_str(" returning ");
                sb.push_str(&columns.join(","));
            }
        }
        if request.is_subquery {
            sb.push(')');
        }
        Ok(BTreeMap::new())
    }

    fn append_set_operands(
        &self,
        sb: &mut String,
        operator: &str,
        _is_subquery: bool,
        operands: &[String],
        has_outer_clause: bool,
    ) {
        for (i, operand) in operands.iter().enumerate() {
            if i > 0 {
                sb.push('\n');
                sb.push_str(operator);
                sb.push('\n');
            }
            // give a trailing ORDER BY / LIMIT an unambiguous target
            if has_outer_clause && !operand.starts_with('(') {
                sb.push('(');
                sb.push_str(operand);
                sb.push(')');
            } else {
                sb.push_str(operand);
            }
        }
    }
}

fn append_select_columns_from_cte(sb: &mut String, columns: &[String], cte_name: &str) {
    sb.push_str("select ");
    sb.push_str(&columns.join(","));
    sb.push_str(" from ");
    sb.push_str(cte_name);
}

fn append_select_columns_from_table(
    statement_type: DbmsStatementType,
    modification: &str,
    sb: &mut String,
    columns: &[String],
) -> Result<()> {
    let table = modified_table_name(statement_type, modification)?;
    sb.push_str(" select ");
    sb.push_str(&columns.join(","));
    sb.push_str(" from ");
    sb.push_str(table);
    Ok(())
}

/// Locate the modified table by keyword scan of the rendered statement: the
/// token after the first `from`/`update`/`into`, ending at the next space (or
/// `(` for INSERT). A table name containing the keyword earlier in the text
/// confuses the scan.
pub(crate) fn modified_table_name(statement_type: DbmsStatementType, sql: &str) -> Result<&str> {
    let needle = match statement_type {
        DbmsStatementType::Delete => "from",
        DbmsStatementType::Update => "update",
        DbmsStatementType::Insert => "into",
        DbmsStatementType::Select => {
            return Err(QueryError::UnsupportedStatementType(statement_type.to_string()))
        }
    };
    let position = index_of_ignore_case(sql, needle).ok_or_else(|| {
        QueryError::Configuration(format!(
            "no `{needle}` keyword in {statement_type} statement `{sql}`"
        ))
    })?;
    let after = &sql[position + needle.len()..];
    // skip the single separator after the keyword, whatever its width
    let rest = after
        .char_indices()
        .nth(1)
        .map_or("", |(offset, _)| &after[offset..]);
    let mut end = rest.find(' ').unwrap_or(rest.len());
    if statement_type == DbmsStatementType::Insert {
        if let Some(paren) = rest[..end].find('(') {
            end = paren;
        }
    }
    Ok(&rest[..end])
}
