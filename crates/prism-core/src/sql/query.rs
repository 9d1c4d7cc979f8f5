use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use metrics::counter;
use tracing::debug;

use super::generator::{FunctionRegistry, QueryGenerator};
use super::helpers::{validate_ident, validate_path};
use super::size::{ClauseType, ExpressionTransformer, SizeTransformer};
use super::Predicate;
use crate::alias::{AliasInfo, AliasManager};
use crate::dialect::{
    render_with_clause, CteDefinition, DbmsDialect, DbmsStatementType, ExtendedSqlRequest,
};
use crate::error::{QueryError, Result};
use crate::expression::{Expression, FunctionExpression, PathExpression};
use crate::join::{JoinKind, JoinNodeId, JoinTree, JoinType};
use crate::metamodel::EntityMetamodel;
use crate::provider::JpaProvider;
use crate::value::Value;

/// Bootstrap-time collaborators shared by every query built against one
/// metamodel.
#[derive(Clone)]
pub struct QueryContext {
    metamodel: Arc<EntityMetamodel>,
    provider: Arc<dyn JpaProvider>,
    functions: Arc<FunctionRegistry>,
    resolve_select_aliases: bool,
    alias_prefix: Option<String>,
}

impl fmt::Debug for QueryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryContext")
            .field("functions", &self.functions)
            .field("resolve_select_aliases", &self.resolve_select_aliases)
            .field("alias_prefix", &self.alias_prefix)
            .finish_non_exhaustive()
    }
}

impl QueryContext {
    pub fn new(metamodel: Arc<EntityMetamodel>, provider: Arc<dyn JpaProvider>) -> Self {
        Self {
            metamodel,
            provider,
            functions: Arc::new(FunctionRegistry::default()),
            resolve_select_aliases: true,
            alias_prefix: None,
        }
    }

    pub fn with_functions(mut self, functions: FunctionRegistry) -> Self {
        self.functions = Arc::new(functions);
        self
    }

    pub fn with_resolve_select_aliases(mut self, resolve: bool) -> Self {
        self.resolve_select_aliases = resolve;
        self
    }

    pub fn with_alias_prefix(mut self, prefix: Option<&str>) -> Self {
        self.alias_prefix = prefix.map(str::to_string);
        self
    }

    pub fn metamodel(&self) -> &EntityMetamodel {
        &self.metamodel
    }

    pub fn provider(&self) -> &dyn JpaProvider {
        self.provider.as_ref()
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Generator configured with this context's settings over one query scope.
    pub fn generator<'a>(
        &'a self,
        aliases: &'a AliasManager,
        join_tree: &'a JoinTree,
    ) -> QueryGenerator<'a> {
        QueryGenerator::new(aliases, join_tree, self.provider.as_ref(), &self.functions)
            .with_resolve_select_aliases(self.resolve_select_aliases)
            .with_alias_prefix(self.alias_prefix.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq)]
struct SelectItem {
    expression: Expression,
    alias: Option<String>,
}

/// Rendered statement plus the parameter values to bind.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub parameters: BTreeMap<String, Value>,
    /// CTEs the dialect synthesized while rendering, by name.
    pub extra_ctes: BTreeMap<String, String>,
}

/// A copy-on-write object that holds an assembled query. Every builder method
/// returns a new query and leaves the receiver untouched.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    context: Arc<QueryContext>,
    join_tree: Arc<JoinTree>,
    aliases: Arc<AliasManager>,
    select: Arc<Vec<SelectItem>>,
    where_: Arc<Vec<Predicate>>,
    group_by: Arc<Vec<Expression>>,
    order_by: Arc<Vec<(Expression, bool)>>,
    parameters: Arc<BTreeMap<String, Value>>,
    first_result: Option<usize>,
    max_results: Option<usize>,
}

impl QueryBuilder {
    /// Creates a query selecting from `entity` aliased as `alias`.
    pub fn new(context: Arc<QueryContext>, entity: &str, alias: &str) -> Result<Self> {
        let empty = Self {
            context,
            join_tree: Default::default(),
            aliases: Default::default(),
            select: Default::default(),
            where_: Default::default(),
            group_by: Default::default(),
            order_by: Default::default(),
            parameters: Default::default(),
            first_result: None,
            max_results: None,
        };
        empty.from(entity, alias)
    }

    /// Adds another root to the FROM clause.
    pub fn from(&self, entity: &str, alias: &str) -> Result<Self> {
        validate_ident(alias)?;
        self.context.metamodel.entity(entity)?;
        let mut rv = self.clone();
        let id = Arc::make_mut(&mut rv.join_tree).add_root(entity, alias);
        Arc::make_mut(&mut rv.aliases).register_join(alias, id)?;
        Ok(rv)
    }

    /// Joins the relation `path` (`alias.relation`) as `alias`.
    pub fn join(&self, path: &str, alias: &str, join_type: JoinType) -> Result<Self> {
        self.add_relation_join(path, alias, join_type, false)
    }

    /// Like [`QueryBuilder::join`] but fetches the joined relation.
    pub fn fetch(&self, path: &str, alias: &str, join_type: JoinType) -> Result<Self> {
        self.add_relation_join(path, alias, join_type, true)
    }

    /// Joins an unrelated `entity` constrained by the `on` predicates, which may
    /// reference the new alias.
    pub fn join_on<I, S>(
        &self,
        base_alias: &str,
        entity: &str,
        alias: &str,
        join_type: JoinType,
        on: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: TryInto<Predicate, Error = QueryError>,
    {
        validate_ident(alias)?;
        self.context.metamodel.entity(entity)?;
        let parent = self.join_node(base_alias)?;
        let mut rv = self.clone();
        let id = Arc::make_mut(&mut rv.join_tree).add_entity_join(
            parent,
            entity,
            alias,
            join_type,
            Vec::new(),
        )?;
        Arc::make_mut(&mut rv.aliases).register_join(alias, id)?;

        let on = on
            .into_iter()
            .map(|s| s.try_into().and_then(|p| rv.bind_predicate(&p)))
            .collect::<Result<Vec<_>>>()?;
        if on.is_empty() {
            return Err(QueryError::InvalidPredicate(format!(
                "entity join `{alias}` needs an ON condition"
            )));
        }
        let tree = Arc::make_mut(&mut rv.join_tree);
        for predicate in on {
            tree.add_on(id, predicate)?;
        }
        Ok(rv)
    }

    /// Adds an ON predicate to the join aliased `alias`; predicates are AND-ed.
    pub fn on<S>(&self, alias: &str, predicate: S) -> Result<Self>
    where
        S: TryInto<Predicate, Error = QueryError>,
    {
        let id = self.join_node(alias)?;
        let predicate = self.bind_predicate(&predicate.try_into()?)?;
        let mut rv = self.clone();
        Arc::make_mut(&mut rv.join_tree).add_on(id, predicate)?;
        Ok(rv)
    }

    /// Adds a select item, optionally aliased so later clauses can refer to it.
    pub fn select(&self, expression: Expression, alias: Option<&str>) -> Result<Self> {
        let expression = self.bind_expression(&expression)?;
        let mut rv = self.clone();
        if let Some(alias) = alias {
            validate_ident(alias)?;
            Arc::make_mut(&mut rv.aliases).register_select(alias, expression.clone())?;
        }
        Arc::make_mut(&mut rv.select).push(SelectItem {
            expression,
            alias: alias.map(str::to_string),
        });
        Ok(rv)
    }

    pub fn select_path(&self, path: &str, alias: Option<&str>) -> Result<Self> {
        self.select(Expression::Path(self.path(path)?), alias)
    }

    /// Restricts the query; predicates are AND-ed.
    pub fn where_<S>(&self, predicate: S) -> Result<Self>
    where
        S: TryInto<Predicate, Error = QueryError>,
    {
        self.where_predicate(predicate.try_into()?)
    }

    pub fn where_predicate(&self, predicate: Predicate) -> Result<Self> {
        let predicate = self.bind_predicate(&predicate)?;
        let mut rv = self.clone();
        Arc::make_mut(&mut rv.where_).push(predicate);
        Ok(rv)
    }

    pub fn group_by(&self, path: &str) -> Result<Self> {
        self.group_by_expression(Expression::path(path))
    }

    pub fn group_by_expression(&self, expression: Expression) -> Result<Self> {
        let expression = self.bind_expression(&expression)?;
        let mut rv = self.clone();
        Arc::make_mut(&mut rv.group_by).push(expression);
        Ok(rv)
    }

    pub fn order_by(&self, path: &str, asc: bool) -> Result<Self> {
        self.order_by_expression(Expression::path(path), asc)
    }

    pub fn order_by_expression(&self, expression: Expression, asc: bool) -> Result<Self> {
        let expression = self.bind_expression(&expression)?;
        let mut rv = self.clone();
        Arc::make_mut(&mut rv.order_by).push((expression, asc));
        Ok(rv)
    }

    pub fn set_parameter(&self, name: &str, value: impl Into<Value>) -> Result<Self> {
        validate_ident(name)?;
        let mut rv = self.clone();
        Arc::make_mut(&mut rv.parameters).insert(name.to_string(), value.into());
        Ok(rv)
    }

    pub fn first_result(&self, first: usize) -> Self {
        let mut rv = self.clone();
        rv.first_result = Some(first);
        rv
    }

    pub fn max_results(&self, max: usize) -> Self {
        let mut rv = self.clone();
        rv.max_results = Some(max);
        rv
    }

    pub fn get_first_result(&self) -> Option<usize> {
        self.first_result
    }

    pub fn get_max_results(&self) -> Option<usize> {
        self.max_results
    }

    pub fn parameters(&self) -> &BTreeMap<String, Value> {
        &self.parameters
    }

    pub fn join_tree(&self) -> &JoinTree {
        &self.join_tree
    }

    pub fn aliases(&self) -> &AliasManager {
        &self.aliases
    }

    pub fn context(&self) -> &QueryContext {
        &self.context
    }

    /// Resolve dotted `text` against the query's aliases. A join alias head
    /// yields a bound path whose remainder is the field; a bare select alias
    /// stays unbound.
    pub fn path(&self, text: &str) -> Result<PathExpression> {
        validate_path(text)?;
        let (head, rest) = match text.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (text, None),
        };
        match (self.aliases.get_alias_info(head), rest) {
            (Some(AliasInfo::Join(info)), rest) => {
                let node = self.join_tree.node(info.node())?;
                if let Some(rest) = rest {
                    self.context.metamodel.resolve_path(node.entity(), rest)?;
                }
                Ok(PathExpression::bound(text, info.node(), rest))
            }
            (Some(AliasInfo::Select(_)), None) => Ok(PathExpression::new(text)),
            _ => Err(QueryError::UnknownAlias(head.to_string())),
        }
    }

    /// Render the query text with the resolving generator.
    pub fn to_query_string(&self) -> Result<String> {
        let generator = self
            .context
            .generator(&self.aliases, &self.join_tree)
            .with_parameters(&self.parameters);
        let size = SizeTransformer::new(&self.context.metamodel, &self.join_tree, &self.aliases);
        let prefix = self.context.alias_prefix.as_deref().unwrap_or("");

        let mut sql = String::from("SELECT ");
        if self.select.is_empty() {
            let roots: Vec<String> = self
                .join_tree
                .roots()
                .map(|root| format!("{prefix}{}", root.alias()))
                .collect();
            sql.push_str(&roots.join(", "));
        } else {
            for (i, item) in self.select.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                let expression = size.transform(&item.expression, ClauseType::Select, false)?;
                generator.render(&expression, &mut sql)?;
                if let Some(alias) = &item.alias {
                    sql.push_str(" AS ");
                    sql.push_str(alias);
                }
            }
        }

        sql.push_str(" FROM ");
        for (i, root) in self.join_tree.roots().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(root.entity());
            sql.push(' ');
            sql.push_str(prefix);
            sql.push_str(root.alias());
            self.render_joins(root.id(), &generator, &size, &mut sql)?;
        }

        if !self.where_.is_empty() {
            sql.push_str(" WHERE ");
            for (i, predicate) in self.where_.iter().enumerate() {
                if i > 0 {
                    sql.push_str(" AND ");
                }
                let predicate =
                    predicate.try_map(|e| size.transform(e, ClauseType::Where, false))?;
                generator.render_predicate(&predicate, &mut sql)?;
            }
        }

        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            for (i, expression) in self.group_by.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                let expression = size.transform(expression, ClauseType::GroupBy, false)?;
                generator.render(&expression, &mut sql)?;
            }
        }

        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            for (i, (expression, asc)) in self.order_by.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                let expression = size.transform(expression, ClauseType::OrderBy, false)?;
                generator.render(&expression, &mut sql)?;
                sql.push_str(if *asc { " ASC" } else { " DESC" });
            }
        }

        counter!("prism_statements_generated_total").increment(1);
        debug!(query = %sql, "generated query");
        Ok(sql)
    }

    /// Render and shape the query for `dialect`: WITH clause from `ctes`,
    /// LIMIT/OFFSET from first/max results.
    pub fn to_statement(&self, dialect: &dyn DbmsDialect, ctes: &[CteDefinition]) -> Result<Statement> {
        let mut sql = self.to_query_string()?;
        if self.max_results.is_none() && self.first_result.is_some() {
            return Err(QueryError::Configuration(
                "first result needs max results to render an offset".to_string(),
            ));
        }
        let limit = self.max_results.map(|max| max.to_string());
        let offset = self.first_result.map(|first| first.to_string());
        let request = ExtendedSqlRequest::new(DbmsStatementType::Select)
            .with_clause(render_with_clause(dialect, ctes)?)
            .limit(limit, offset);
        let extra_ctes = dialect.append_extended_sql(&mut sql, &request)?;
        Ok(Statement {
            sql,
            parameters: (*self.parameters).clone(),
            extra_ctes,
        })
    }

    fn render_joins(
        &self,
        root: JoinNodeId,
        generator: &QueryGenerator<'_>,
        size: &SizeTransformer<'_>,
        sql: &mut String,
    ) -> Result<()> {
        let prefix = self.context.alias_prefix.as_deref().unwrap_or("");
        for node in self.join_tree.nodes() {
            if matches!(node.kind(), JoinKind::Root) || self.root_of(node.id())? != root {
                continue;
            }
            sql.push(' ');
            sql.push_str(node.join_type().keyword());
            if node.is_fetch() {
                sql.push_str(" FETCH");
            }
            sql.push(' ');
            match node.kind() {
                JoinKind::Relation { parent, tree_node } => {
                    sql.push_str(prefix);
                    sql.push_str(self.join_tree.node(*parent)?.alias());
                    sql.push('.');
                    sql.push_str(tree_node.relation_name());
                }
                JoinKind::Entity { .. } => sql.push_str(node.entity()),
                JoinKind::Root => {}
            }
            sql.push(' ');
            sql.push_str(prefix);
            sql.push_str(node.alias());

            for (i, predicate) in node.on().iter().enumerate() {
                sql.push_str(if i == 0 { " ON " } else { " AND " });
                let predicate = predicate.try_map(|e| size.transform(e, ClauseType::Join, false))?;
                generator.render_predicate(&predicate, sql)?;
            }
        }
        Ok(())
    }

    fn root_of(&self, mut id: JoinNodeId) -> Result<JoinNodeId> {
        while let Some(parent) = self.join_tree.node(id)?.parent() {
            id = parent;
        }
        Ok(id)
    }

    fn join_node(&self, alias: &str) -> Result<JoinNodeId> {
        match self.aliases.get_alias_info(alias) {
            Some(AliasInfo::Join(info)) => Ok(info.node()),
            _ => Err(QueryError::UnknownAlias(alias.to_string())),
        }
    }

    fn add_relation_join(
        &self,
        path: &str,
        alias: &str,
        join_type: JoinType,
        fetch: bool,
    ) -> Result<Self> {
        validate_path(path)?;
        validate_ident(alias)?;
        let (base, relation) = path
            .split_once('.')
            .ok_or_else(|| QueryError::InvalidIdentifier(format!("`{path}` is not `alias.relation`")))?;
        validate_ident(relation)?;

        let parent = self.join_node(base)?;
        let entity = self.join_tree.node(parent)?.entity();
        let attribute = self.context.metamodel.attribute(entity, relation)?.clone();

        let mut rv = self.clone();
        let id = Arc::make_mut(&mut rv.join_tree).add_relation(parent, &attribute, alias, join_type, fetch)?;
        Arc::make_mut(&mut rv.aliases).register_join(alias, id)?;
        Ok(rv)
    }

    fn bind_predicate(&self, predicate: &Predicate) -> Result<Predicate> {
        predicate.try_map(|e| self.bind_expression(e))
    }

    /// Resolve every unbound path in `expression` against the query's aliases.
    fn bind_expression(&self, expression: &Expression) -> Result<Expression> {
        match expression {
            Expression::Path(path) if path.base_node().is_none() => {
                let bound = self
                    .path(&path.path())?
                    .set_collection_key_path(path.is_collection_key_path())
                    .set_used_in_collection_function(path.is_used_in_collection_function());
                Ok(Expression::Path(bound))
            }
            Expression::Function(function) => {
                let name = function.name().to_ascii_uppercase();
                let key_function = matches!(name.as_str(), "KEY" | "INDEX");
                let collection_function = key_function || matches!(name.as_str(), "VALUE" | "ENTRY");
                let args = function
                    .args()
                    .iter()
                    .map(|arg| match arg {
                        Expression::Path(path) if collection_function => {
                            let marked = path
                                .clone()
                                .set_collection_key_path(key_function || path.is_collection_key_path())
                                .set_used_in_collection_function(true);
                            self.bind_expression(&Expression::Path(marked))
                        }
                        other => self.bind_expression(other),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Expression::Function(FunctionExpression::new(function.name(), args)))
            }
            other => Ok(other.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{MySqlDialect, PostgresDialect};
    use crate::metamodel::fixtures::document_metamodel;
    use crate::provider::ProviderProfile;

    fn context(provider: ProviderProfile) -> Arc<QueryContext> {
        Arc::new(
            QueryContext::new(Arc::new(document_metamodel()), Arc::new(provider))
                .with_functions(FunctionRegistry::new(["my_fn"])),
        )
    }

    #[test]
    fn builder_is_copy_on_write() {
        let base = QueryBuilder::new(context(ProviderProfile::standard()), "Document", "d").unwrap();
        let filtered = base.where_("d.age > 18").unwrap();
        assert_eq!(base.to_query_string().unwrap(), "SELECT d FROM Document d");
        assert_eq!(
            filtered.to_query_string().unwrap(),
            "SELECT d FROM Document d WHERE d.age > 18"
        );
    }

    #[test]
    fn renders_joins_selects_and_ordering() {
        let q = QueryBuilder::new(context(ProviderProfile::standard()), "Document", "d")
            .unwrap()
            .join("d.owner", "o", JoinType::Inner)
            .unwrap()
            .fetch("d.partners", "s", JoinType::Left)
            .unwrap()
            .select_path("d.name", Some("n"))
            .unwrap()
            .select_path("o.name", None)
            .unwrap()
            .where_("d.id = :id")
            .unwrap()
            .group_by("n")
            .unwrap()
            .order_by("n", false)
            .unwrap();
        assert_eq!(
            q.to_query_string().unwrap(),
            "SELECT d.name AS n, o.name FROM Document d JOIN d.owner o \
             LEFT JOIN FETCH d.partners s WHERE d.id = :id GROUP BY d.name ORDER BY d.name DESC"
        );
    }

    #[test]
    fn select_alias_resolution_can_be_disabled() {
        let ctx = Arc::new(
            QueryContext::new(
                Arc::new(document_metamodel()),
                Arc::new(ProviderProfile::standard()),
            )
            .with_resolve_select_aliases(false),
        );
        let q = QueryBuilder::new(ctx, "Document", "d")
            .unwrap()
            .select_path("d.name", Some("n"))
            .unwrap()
            .order_by("n", true)
            .unwrap();
        assert_eq!(
            q.to_query_string().unwrap(),
            "SELECT d.name AS n FROM Document d ORDER BY n ASC"
        );
    }

    #[test]
    fn indexed_joins_render_value_function() {
        let q = QueryBuilder::new(context(ProviderProfile::standard()), "Document", "d")
            .unwrap()
            .join("d.people", "p", JoinType::Left)
            .unwrap()
            .select_path("p", None)
            .unwrap()
            .select(
                Expression::function("INDEX", vec![Expression::path("p")]),
                None,
            )
            .unwrap();
        assert_eq!(
            q.to_query_string().unwrap(),
            "SELECT VALUE(p), INDEX(p) FROM Document d LEFT JOIN d.people p"
        );
    }

    #[test]
    fn entity_joins_bind_on_predicates() {
        let q = QueryBuilder::new(context(ProviderProfile::standard()), "Document", "d")
            .unwrap()
            .join_on("d", "Person", "x", JoinType::Left, ["x.name = d.name"])
            .unwrap();
        assert_eq!(
            q.to_query_string().unwrap(),
            "SELECT d FROM Document d LEFT JOIN Person x ON x.name = d.name"
        );
        let empty: [&str; 0] = [];
        assert!(QueryBuilder::new(context(ProviderProfile::standard()), "Document", "d")
            .unwrap()
            .join_on("d", "Person", "x", JoinType::Left, empty)
            .is_err());
    }

    #[test]
    fn relation_joins_accept_extra_on_predicates() {
        let base = QueryBuilder::new(context(ProviderProfile::standard()), "Document", "d")
            .unwrap()
            .join("d.owner", "o", JoinType::Left)
            .unwrap();
        let q = base
            .on("o", "o.name = :name")
            .unwrap()
            .on("o", "o.id > 0")
            .unwrap();
        assert_eq!(
            q.to_query_string().unwrap(),
            "SELECT d FROM Document d LEFT JOIN d.owner o ON o.name = :name AND o.id > 0"
        );
        assert_eq!(
            base.to_query_string().unwrap(),
            "SELECT d FROM Document d LEFT JOIN d.owner o"
        );
        assert!(base.on("d", "d.id = 1").is_err());
        assert!(base.on("missing", "d.id = 1").is_err());
    }

    #[test]
    fn join_table_key_columns_index_list_joins() {
        let base = QueryBuilder::new(context(ProviderProfile::standard()), "Document", "d").unwrap();
        let q = base
            .join("d.tagged", "t", JoinType::Left)
            .unwrap()
            .select_path("t", None)
            .unwrap();
        assert_eq!(
            q.to_query_string().unwrap(),
            "SELECT VALUE(t) FROM Document d LEFT JOIN d.tagged t"
        );

        let id = q.join_tree().find_by_alias("t").unwrap();
        let tree_node = q.join_tree().node(id).unwrap().parent_tree_node().unwrap();
        assert!(tree_node.is_indexed());
        let table = tree_node.join_table().unwrap();
        assert_eq!(table.table_name(), "document_tagged");
        assert!(table.has_key_columns());

        let q = base
            .join("d.peopleBag", "b", JoinType::Left)
            .unwrap()
            .select_path("b", None)
            .unwrap();
        assert_eq!(
            q.to_query_string().unwrap(),
            "SELECT b FROM Document d LEFT JOIN d.peopleBag b"
        );
        let id = q.join_tree().find_by_alias("b").unwrap();
        assert!(q.join_tree().node(id).unwrap().parent_tree_node().unwrap().join_table().is_none());
    }

    #[test]
    fn size_is_rewritten_outside_select() {
        let q = QueryBuilder::new(context(ProviderProfile::standard()), "Document", "d")
            .unwrap()
            .select(
                Expression::function("SIZE", vec![Expression::path("d.people")]),
                None,
            )
            .unwrap()
            .order_by_expression(
                Expression::function("SIZE", vec![Expression::path("d.people")]),
                false,
            )
            .unwrap();
        assert_eq!(
            q.to_query_string().unwrap(),
            "SELECT SIZE(d.people) FROM Document d ORDER BY \
             (SELECT COUNT(d_people) FROM Document d_base LEFT JOIN d_base.people d_people \
             WHERE d_base.id = d.id) DESC"
        );
    }

    #[test]
    fn aliases_must_be_unique_and_known() {
        let q = QueryBuilder::new(context(ProviderProfile::standard()), "Document", "d").unwrap();
        assert!(matches!(
            q.join("d.owner", "d", JoinType::Inner),
            Err(QueryError::DuplicateAlias(_))
        ));
        assert!(matches!(
            q.where_("z.name = 'a'"),
            Err(QueryError::UnknownAlias(a)) if a == "z"
        ));
        assert!(q.join("d.missing", "m", JoinType::Inner).is_err());
        assert!(q.from("Nope", "n").is_err());
    }

    #[test]
    fn dynamic_functions_and_list_parameters() {
        let q = QueryBuilder::new(context(ProviderProfile::hibernate()), "Document", "d")
            .unwrap()
            .select(
                Expression::function(
                    "FUNCTION",
                    vec![Expression::string("my_fn"), Expression::path("d.name")],
                ),
                None,
            )
            .unwrap()
            .where_predicate(
                Predicate::new(Expression::path("d.id"), "=", Expression::parameter("ids")).unwrap(),
            )
            .unwrap()
            .set_parameter("ids", vec![1i64, 2, 3])
            .unwrap();
        assert_eq!(
            q.to_query_string().unwrap(),
            "SELECT my_fn(d.name) FROM Document d WHERE d.id = (:ids)"
        );
    }

    #[test]
    fn statements_carry_limits_ctes_and_parameters() {
        let q = QueryBuilder::new(context(ProviderProfile::standard()), "Document", "d")
            .unwrap()
            .where_("d.age >= :min")
            .unwrap()
            .set_parameter("min", 21i64)
            .unwrap()
            .first_result(20)
            .max_results(10);

        let statement = q.to_statement(&PostgresDialect, &[]).unwrap();
        assert_eq!(
            statement.sql,
            "SELECT d FROM Document d WHERE d.age >= :min limit 10 offset 20"
        );
        assert_eq!(statement.parameters.get("min"), Some(&Value::Int(21)));

        let statement = q.to_statement(&MySqlDialect, &[]).unwrap();
        assert!(statement.sql.ends_with(" limit 20, 10"));

        let cte = CteDefinition::new("recent", ["id"], "select id from document").unwrap();
        let statement = q.max_results(5).first_result(0).to_statement(&PostgresDialect, &[cte]).unwrap();
        assert!(statement
            .sql
            .starts_with("with recent(id) AS(\nselect id from document\n)\nSELECT d FROM Document d"));

        let offset_only = QueryBuilder::new(context(ProviderProfile::standard()), "Document", "d")
            .unwrap()
            .first_result(3);
        assert!(offset_only.to_statement(&PostgresDialect, &[]).is_err());
    }

    #[test]
    fn alias_prefix_applies_to_every_alias() {
        let ctx = Arc::new(
            QueryContext::new(
                Arc::new(document_metamodel()),
                Arc::new(ProviderProfile::standard()),
            )
            .with_alias_prefix(Some("sub_")),
        );
        let q = QueryBuilder::new(ctx, "Document", "d")
            .unwrap()
            .join("d.owner", "o", JoinType::Inner)
            .unwrap()
            .select_path("o.name", None)
            .unwrap();
        assert_eq!(
            q.to_query_string().unwrap(),
            "SELECT sub_o.name FROM Document sub_d JOIN sub_d.owner sub_o"
        );
    }
}
