//! Clause-aware expression rewrites.

use crate::alias::AliasManager;
use crate::error::{QueryError, Result};
use crate::expression::{Expression, FunctionExpression, PathExpression, SubqueryExpression};
use crate::join::JoinTree;
use crate::metamodel::EntityMetamodel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClauseType {
    Select,
    Join,
    Where,
    GroupBy,
    Having,
    OrderBy,
}

pub trait ExpressionTransformer {
    fn transform(
        &self,
        original: &Expression,
        clause: ClauseType,
        join_required: bool,
    ) -> Result<Expression>;
}

/// Rewrites `SIZE(alias.collection)` into a correlated COUNT subquery so the
/// outer query does not need to join and group the collection. The select
/// clause is left alone.
pub struct SizeTransformer<'a> {
    metamodel: &'a EntityMetamodel,
    join_tree: &'a JoinTree,
    aliases: &'a AliasManager,
}

impl<'a> SizeTransformer<'a> {
    pub fn new(
        metamodel: &'a EntityMetamodel,
        join_tree: &'a JoinTree,
        aliases: &'a AliasManager,
    ) -> Self {
        Self {
            metamodel,
            join_tree,
            aliases,
        }
    }

    fn rewrite(&self, expression: &Expression) -> Result<Expression> {
        match expression {
            Expression::Function(function) if function.name().eq_ignore_ascii_case("SIZE") => {
                match function.args() {
                    [Expression::Path(path)] if path.base_node().is_some() => {
                        self.size_subquery(path)
                    }
                    _ => Ok(expression.clone()),
                }
            }
            Expression::Function(function) => {
                let args = function
                    .args()
                    .iter()
                    .map(|arg| self.rewrite(arg))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Expression::Function(FunctionExpression::new(function.name(), args)))
            }
            _ => Ok(expression.clone()),
        }
    }

    fn size_subquery(&self, path: &PathExpression) -> Result<Expression> {
        let Some(base) = path.base_node() else {
            return Ok(Expression::Path(path.clone()));
        };
        let owner = self.join_tree.node(base)?;
        let collection = path.field().ok_or_else(|| {
            QueryError::Metamodel(format!(
                "SIZE needs a collection attribute, got alias `{}`",
                owner.alias()
            ))
        })?;
        let entity = self.metamodel.entity(owner.entity())?;
        let attribute = self.metamodel.attribute(owner.entity(), collection)?;
        if attribute.collection_kind().is_none() {
            return Err(QueryError::Metamodel(format!(
                "SIZE argument `{}.{collection}` is not a collection",
                owner.alias()
            )));
        }

        let base_alias = self.aliases.generate_alias(&format!("{}_base", owner.alias()));
        let join_alias = self
            .aliases
            .generate_alias(&format!("{}_{}", owner.alias(), collection));
        let id = entity.id_attribute.as_str();

        Ok(Expression::Subquery(Box::new(SubqueryExpression {
            select: Expression::function("COUNT", vec![Expression::path(&join_alias)]),
            from_entity: entity.name.clone(),
            from_alias: base_alias.clone(),
            joins: vec![(format!("{base_alias}.{collection}"), join_alias)],
            correlations: vec![(
                Expression::path(&format!("{base_alias}.{id}")),
                Expression::Path(PathExpression::bound(
                    &format!("{}.{id}", owner.alias()),
                    base,
                    Some(id),
                )),
            )],
        })))
    }
}

impl ExpressionTransformer for SizeTransformer<'_> {
    fn transform(
        &self,
        original: &Expression,
        clause: ClauseType,
        _join_required: bool,
    ) -> Result<Expression> {
        // select items are transformed separately
        if clause == ClauseType::Select {
            return Ok(original.clone());
        }
        self.rewrite(original)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::join::JoinType;
    use crate::metamodel::fixtures::document_metamodel;
    use crate::provider::ProviderProfile;
    use crate::sql::{FunctionRegistry, QueryGenerator};

    #[test]
    fn size_becomes_correlated_count_outside_select() {
        let mm = document_metamodel();
        let mut tree = JoinTree::new();
        let mut aliases = AliasManager::new();
        let d = tree.add_root("Document", "d");
        aliases.register_join("d", d).unwrap();

        let size = Expression::function(
            "SIZE",
            vec![Expression::Path(PathExpression::bound("d.people", d, Some("people")))],
        );
        let transformer = SizeTransformer::new(&mm, &tree, &aliases);

        let untouched = transformer.transform(&size, ClauseType::Select, false).unwrap();
        assert_eq!(untouched, size);

        let wrapped = Expression::function("COALESCE", vec![size.clone(), Expression::integer(0)]);
        let rewritten = transformer.transform(&wrapped, ClauseType::OrderBy, false).unwrap();

        let provider = ProviderProfile::standard();
        let functions = FunctionRegistry::default();
        let g = QueryGenerator::new(&aliases, &tree, &provider, &functions);
        assert_eq!(
            g.generate(&rewritten).unwrap(),
            "COALESCE((SELECT COUNT(d_people) FROM Document d_base \
             LEFT JOIN d_base.people d_people WHERE d_base.id = d.id),0)"
        );
    }

    #[test]
    fn size_of_basic_attribute_is_rejected() {
        let mm = document_metamodel();
        let mut tree = JoinTree::new();
        let aliases = AliasManager::new();
        let d = tree.add_root("Document", "d");
        let owner = tree
            .add_relation(d, mm.attribute("Document", "owner").unwrap(), "o", JoinType::Inner, false)
            .unwrap();
        let transformer = SizeTransformer::new(&mm, &tree, &aliases);
        let size = Expression::function(
            "SIZE",
            vec![Expression::Path(PathExpression::bound("o.name", owner, Some("name")))],
        );
        assert!(transformer.transform(&size, ClauseType::Where, true).is_err());
    }
}
