use super::DbmsDialect;

/// MySQL: `LIMIT offset, count`, no RETURNING, no INTERSECT/EXCEPT.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MySqlDialect;

impl DbmsDialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn supports_intersect(&self) -> bool {
        false
    }

    fn supports_except(&self) -> bool {
        false
    }

    fn append_limit(&self, sb: &mut String, _is_subquery: bool, limit: &str, offset: Option<&str>) {
        sb.push_str(" limit ");
        if let Some(offset) = offset {
            sb.push_str(offset);
            sb.push_str(", ");
        }
        sb.push_str(limit);
    }
}
