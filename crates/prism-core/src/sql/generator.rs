//! Resolving query generator: renders expression trees to query text.

use std::collections::{BTreeMap, HashSet};

use crate::alias::{AliasInfo, AliasManager};
use crate::error::{QueryError, Result};
use crate::expression::{
    Expression, FunctionExpression, FunctionKind, ParameterExpression, PathExpression,
    SubqueryExpression,
};
use crate::join::JoinTree;
use crate::provider::JpaProvider;
use crate::sql::Predicate;
use crate::value::Value;

/// Names of database functions registered for custom invocation. Lookups are
/// case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionRegistry {
    names: HashSet<String>,
}

impl FunctionRegistry {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|n| n.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn register(&mut self, name: &str) {
        self.names.insert(name.to_ascii_lowercase());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Renders expressions against one query scope: its alias manager and join tree.
///
/// Rendering never mutates the tree, so the same tree rendered twice under the
/// same alias state yields identical text.
pub struct QueryGenerator<'a> {
    alias_manager: &'a AliasManager,
    join_tree: &'a JoinTree,
    provider: &'a dyn JpaProvider,
    registered_functions: &'a FunctionRegistry,
    parameters: Option<&'a BTreeMap<String, Value>>,
    resolve_select_aliases: bool,
    alias_prefix: Option<String>,
}

impl<'a> QueryGenerator<'a> {
    pub fn new(
        alias_manager: &'a AliasManager,
        join_tree: &'a JoinTree,
        provider: &'a dyn JpaProvider,
        registered_functions: &'a FunctionRegistry,
    ) -> Self {
        Self {
            alias_manager,
            join_tree,
            provider,
            registered_functions,
            parameters: None,
            resolve_select_aliases: true,
            alias_prefix: None,
        }
    }

    /// Parameter values consulted when an expression carries none itself.
    pub fn with_parameters(mut self, parameters: &'a BTreeMap<String, Value>) -> Self {
        self.parameters = Some(parameters);
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

    pub fn is_resolve_select_aliases(&self) -> bool {
        self.resolve_select_aliases
    }

    pub fn set_resolve_select_aliases(&mut self, resolve: bool) {
        self.resolve_select_aliases = resolve;
    }

    pub fn alias_prefix(&self) -> Option<&str> {
        self.alias_prefix.as_deref()
    }

    pub fn set_alias_prefix(&mut self, prefix: Option<&str>) {
        self.alias_prefix = prefix.map(str::to_string);
    }

    pub fn generate(&self, expression: &Expression) -> Result<String> {
        let mut sb = String::new();
        self.render(expression, &mut sb)?;
        Ok(sb)
    }

    pub fn generate_predicate(&self, predicate: &Predicate) -> Result<String> {
        let mut sb = String::new();
        self.render_predicate(predicate, &mut sb)?;
        Ok(sb)
    }

    pub fn render(&self, expression: &Expression, sb: &mut String) -> Result<()> {
        match expression {
            Expression::Path(path) => self.render_path(path, sb),
            Expression::Function(function) => self.render_function(function, sb),
            Expression::Parameter(parameter) => self.render_parameter(parameter, sb),
            Expression::Array(array) => Err(QueryError::UnresolvedArray(array.to_string())),
            Expression::Literal(literal) => {
                sb.push_str(&literal.to_string());
                Ok(())
            }
            Expression::Subquery(subquery) => self.render_subquery(subquery, sb),
        }
    }

    pub fn render_predicate(&self, predicate: &Predicate, sb: &mut String) -> Result<()> {
        self.render(predicate.left(), sb)?;
        sb.push(' ');
        sb.push_str(predicate.operator());
        sb.push(' ');
        self.render(predicate.right(), sb)
    }

    fn render_function(&self, expression: &FunctionExpression, sb: &mut String) -> Result<()> {
        let args = expression.args();
        match expression.kind() {
            FunctionKind::Outer => {
                if let Some(inner) = args.first() {
                    self.render(inner, sb)?;
                }
                Ok(())
            }
            FunctionKind::Dynamic => {
                let function_name = expression
                    .dynamic_function_name()
                    .ok_or_else(|| QueryError::UnknownFunction(expression.to_string()))?;
                if self.registered_functions.contains(&function_name) {
                    sb.push_str(
                        &self
                            .provider
                            .custom_function_invocation(&function_name, args.len()),
                    );
                    if args.len() > 1 {
                        self.render(&args[1], sb)?;
                        for arg in &args[2..] {
                            sb.push(',');
                            self.render(arg, sb)?;
                        }
                    }
                    sb.push(')');
                    Ok(())
                } else if self.provider.supports_dynamic_function() {
                    sb.push_str("FUNCTION('");
                    sb.push_str(&function_name);
                    sb.push('\'');
                    for arg in args.iter().skip(1) {
                        sb.push(',');
                        self.render(arg, sb)?;
                    }
                    sb.push(')');
                    Ok(())
                } else {
                    Err(QueryError::UnknownFunction(function_name))
                }
            }
            FunctionKind::Ordinary => {
                sb.push_str(expression.name());
                sb.push('(');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        sb.push(',');
                    }
                    self.render(arg, sb)?;
                }
                sb.push(')');
                Ok(())
            }
        }
    }

    fn render_path(&self, expression: &PathExpression, sb: &mut String) -> Result<()> {
        let Some(base) = expression.base_node() else {
            if self.resolve_select_aliases {
                let text = expression.path();
                if let Some(AliasInfo::Select(info)) = self.alias_manager.get_alias_info(&text) {
                    // only path-typed aliases are substituted, so no cycle through
                    // computed expressions is possible
                    if let Expression::Path(aliased) = info.expression() {
                        if aliased.base_node().is_some() || aliased.path() != text {
                            return self.render_path(aliased, sb);
                        }
                    }
                }
            }
            sb.push_str(&expression.path());
            return Ok(());
        };

        let node = self.join_tree.node(base)?;
        let value_function = match expression.field() {
            None => {
                self.needs_value_function(expression)?
                    && !expression.is_used_in_collection_function()
                    && self.provider.collection_value_function().is_some()
            }
            Some(_) => {
                self.needs_value_function(expression)?
                    && self.provider.collection_value_function().is_some()
            }
        };

        if value_function {
            if let Some(function) = self.provider.collection_value_function() {
                sb.push_str(function);
                sb.push('(');
            }
        }
        if let Some(prefix) = &self.alias_prefix {
            sb.push_str(prefix);
        }
        sb.push_str(node.alias());
        if value_function {
            sb.push(')');
        }
        if let Some(field) = expression.field() {
            sb.push('.');
            sb.push_str(field);
        }
        Ok(())
    }

    fn needs_value_function(&self, expression: &PathExpression) -> Result<bool> {
        let Some(base) = expression.base_node() else {
            return Ok(false);
        };
        let node = self.join_tree.node(base)?;
        Ok(!expression.is_collection_key_path()
            && node
                .parent_tree_node()
                .is_some_and(|tree_node| tree_node.is_indexed()))
    }

    fn render_parameter(&self, expression: &ParameterExpression, sb: &mut String) -> Result<()> {
        let name = expression
            .name()
            .ok_or_else(|| QueryError::UnsatisfiedParameter("<unnamed>".to_string()))?;
        let value = expression
            .value()
            .or_else(|| self.parameters.and_then(|params| params.get(name)));
        let needs_brackets = self.provider.needs_brackets_for_list_parameter()
            && value
                .and_then(Value::as_list)
                .is_some_and(|items| items.len() > 1);

        if needs_brackets {
            sb.push('(');
        }
        sb.push(':');
        sb.push_str(name);
        if needs_brackets {
            sb.push(')');
        }
        Ok(())
    }

    fn render_subquery(&self, subquery: &SubqueryExpression, sb: &mut String) -> Result<()> {
        sb.push_str("(SELECT ");
        self.render(&subquery.select, sb)?;
        sb.push_str(" FROM ");
        sb.push_str(&subquery.from_entity);
        sb.push(' ');
        sb.push_str(&subquery.from_alias);
        for (path, alias) in &subquery.joins {
            sb.push_str(" LEFT JOIN ");
            sb.push_str(path);
            sb.push(' ');
            sb.push_str(alias);
        }
        for (i, (left, right)) in subquery.correlations.iter().enumerate() {
            sb.push_str(if i == 0 { " WHERE " } else { " AND " });
            self.render(left, sb)?;
            sb.push_str(" = ");
            self.render(right, sb)?;
        }
        sb.push(')');
        Ok(())
    }
}
