//! Alias bookkeeping for a query scope.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{QueryError, Result};
use crate::expression::Expression;
use crate::join::JoinNodeId;

/// A select-clause item that carries an alias.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectInfo {
    alias: String,
    expression: Expression,
}

impl SelectInfo {
    pub fn new(alias: &str, expression: Expression) -> Self {
        Self {
            alias: alias.to_string(),
            expression,
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinAliasInfo {
    alias: String,
    node: JoinNodeId,
}

impl JoinAliasInfo {
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn node(&self) -> JoinNodeId {
        self.node
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AliasInfo {
    Select(SelectInfo),
    Join(JoinAliasInfo),
}

impl AliasInfo {
    pub fn alias(&self) -> &str {
        match self {
            AliasInfo::Select(s) => s.alias(),
            AliasInfo::Join(j) => j.alias(),
        }
    }
}

/// Aliases of one query scope. A subquery scope sees its parent's aliases and
/// may not shadow them.
#[derive(Debug, Clone, Default)]
pub struct AliasManager {
    aliases: BTreeMap<String, AliasInfo>,
    parent: Option<Arc<AliasManager>>,
}

impl AliasManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parent(parent: Arc<AliasManager>) -> Self {
        Self {
            aliases: BTreeMap::new(),
            parent: Some(parent),
        }
    }

    pub fn register_select(&mut self, alias: &str, expression: Expression) -> Result<()> {
        self.register(AliasInfo::Select(SelectInfo::new(alias, expression)))
    }

    pub fn register_join(&mut self, alias: &str, node: JoinNodeId) -> Result<()> {
        self.register(AliasInfo::Join(JoinAliasInfo {
            alias: alias.to_string(),
            node,
        }))
    }

    fn register(&mut self, info: AliasInfo) -> Result<()> {
        let alias = info.alias().to_string();
        if self.get_alias_info(&alias).is_some() {
            return Err(QueryError::DuplicateAlias(alias));
        }
        self.aliases.insert(alias, info);
        Ok(())
    }

    /// Lookup in this scope, then in enclosing scopes.
    pub fn get_alias_info(&self, alias: &str) -> Option<&AliasInfo> {
        self.aliases
            .get(alias)
            .or_else(|| self.parent.as_ref().and_then(|p| p.get_alias_info(alias)))
    }

    pub fn is_alias_available(&self, alias: &str) -> bool {
        self.get_alias_info(alias).is_none()
    }

    /// Generate an unused alias derived from `base` (`base`, `base_1`, ...).
    pub fn generate_alias(&self, base: &str) -> String {
        if self.is_alias_available(base) {
            return base.to_string();
        }
        let mut i = 1usize;
        loop {
            let candidate = format!("{base}_{i}");
            if self.is_alias_available(&candidate) {
                return candidate;
            }
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_are_unique_across_scopes() {
        let mut outer = AliasManager::new();
        outer.register_join("d", JoinNodeId(0)).unwrap();
        outer
            .register_select("n", Expression::path("d.name"))
            .unwrap();
        assert!(matches!(
            outer.register_join("n", JoinNodeId(1)),
            Err(QueryError::DuplicateAlias(a)) if a == "n"
        ));

        let mut inner = AliasManager::with_parent(Arc::new(outer));
        assert!(inner.register_join("d", JoinNodeId(2)).is_err());
        inner.register_join("d2", JoinNodeId(2)).unwrap();
        assert!(matches!(inner.get_alias_info("n"), Some(AliasInfo::Select(_))));
    }

    #[test]
    fn generated_aliases_skip_taken_names() {
        let mut m = AliasManager::new();
        m.register_join("d_base", JoinNodeId(0)).unwrap();
        m.register_join("d_base_1", JoinNodeId(1)).unwrap();
        assert_eq!(m.generate_alias("d_base"), "d_base_2");
        assert_eq!(m.generate_alias("free"), "free");
    }
}
