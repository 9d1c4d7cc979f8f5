//! Join-tree model of a query's FROM clause.
//!
//! Nodes live in an arena owned by the [`JoinTree`] and are addressed by
//! [`JoinNodeId`]. A relation node remembers the [`JoinTreeNode`] that links it to
//! its parent, which is what decides whether a bare alias needs a collection
//! value function when rendered.

use crate::error::{QueryError, Result};
use crate::join_table::JoinTable;
use crate::metamodel::{CollectionKind, EntityAttribute};
use crate::sql::Predicate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JoinNodeId(pub(crate) usize);

impl JoinNodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
}

impl JoinType {
    pub fn keyword(self) -> &'static str {
        match self {
            JoinType::Inner => "JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
        }
    }
}

/// The relation a child join node was reached through.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinTreeNode {
    relation_name: String,
    collection: Option<CollectionKind>,
    indexed: bool,
    join_table: Option<JoinTable>,
}

impl JoinTreeNode {
    pub fn new(relation_name: &str, collection: Option<CollectionKind>, indexed: bool) -> Self {
        Self {
            relation_name: relation_name.to_string(),
            collection,
            indexed,
            join_table: None,
        }
    }

    pub fn from_attribute(attribute: &EntityAttribute) -> Self {
        Self {
            relation_name: attribute.name.clone(),
            collection: attribute.collection_kind(),
            indexed: attribute.is_indexed(),
            join_table: attribute.join_table().cloned(),
        }
    }

    pub fn relation_name(&self) -> &str {
        &self.relation_name
    }

    pub fn collection(&self) -> Option<CollectionKind> {
        self.collection
    }

    pub fn is_collection(&self) -> bool {
        self.collection.is_some()
    }

    pub fn is_map(&self) -> bool {
        self.collection == Some(CollectionKind::Map)
    }

    /// Keyed (map) or index-column list relation.
    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    pub fn join_table(&self) -> Option<&JoinTable> {
        self.join_table.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinKind {
    Root,
    Relation {
        parent: JoinNodeId,
        tree_node: JoinTreeNode,
    },
    Entity {
        parent: JoinNodeId,
        on: Vec<Predicate>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinNode {
    id: JoinNodeId,
    alias: String,
    entity: String,
    kind: JoinKind,
    join_type: JoinType,
    fetch: bool,
    on: Vec<Predicate>,
}

impl JoinNode {
    pub fn id(&self) -> JoinNodeId {
        self.id
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Entity type reachable through this node.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn kind(&self) -> &JoinKind {
        &self.kind
    }

    pub fn join_type(&self) -> JoinType {
        self.join_type
    }

    pub fn is_fetch(&self) -> bool {
        self.fetch
    }

    pub fn parent(&self) -> Option<JoinNodeId> {
        match &self.kind {
            JoinKind::Root => None,
            JoinKind::Relation { parent, .. } | JoinKind::Entity { parent, .. } => Some(*parent),
        }
    }

    pub fn parent_tree_node(&self) -> Option<&JoinTreeNode> {
        match &self.kind {
            JoinKind::Relation { tree_node, .. } => Some(tree_node),
            _ => None,
        }
    }

    /// Extra ON predicates of a relation join, or the join condition of an
    /// entity join.
    pub fn on(&self) -> &[Predicate] {
        match &self.kind {
            JoinKind::Entity { on, .. } => on,
            _ => &self.on,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinTree {
    nodes: Vec<JoinNode>,
}

impl JoinTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_root(&mut self, entity: &str, alias: &str) -> JoinNodeId {
        self.push(alias, entity, JoinKind::Root, JoinType::Inner, false)
    }

    /// Join `parent.<attribute>`; the child is typed by the attribute's target.
    pub fn add_relation(
        &mut self,
        parent: JoinNodeId,
        attribute: &EntityAttribute,
        alias: &str,
        join_type: JoinType,
        fetch: bool,
    ) -> Result<JoinNodeId> {
        self.node(parent)?;
        let entity = attribute.target().ok_or_else(|| {
            QueryError::Metamodel(format!(
                "cannot join basic attribute `{}`",
                attribute.name
            ))
        })?;
        let kind = JoinKind::Relation {
            parent,
            tree_node: JoinTreeNode::from_attribute(attribute),
        };
        Ok(self.push(alias, entity, kind, join_type, fetch))
    }

    /// Ad-hoc join of an unrelated entity constrained by `on`.
    pub fn add_entity_join(
        &mut self,
        parent: JoinNodeId,
        entity: &str,
        alias: &str,
        join_type: JoinType,
        on: Vec<Predicate>,
    ) -> Result<JoinNodeId> {
        self.node(parent)?;
        Ok(self.push(alias, entity, JoinKind::Entity { parent, on }, join_type, false))
    }

    /// Append an ON predicate to an existing non-root join.
    pub fn add_on(&mut self, id: JoinNodeId, predicate: Predicate) -> Result<()> {
        let node = self
            .nodes
            .get_mut(id.0)
            .ok_or(QueryError::UnknownJoinNode(id.0))?;
        match &mut node.kind {
            JoinKind::Root => Err(QueryError::InvalidPredicate(format!(
                "root `{}` cannot carry an ON clause",
                node.alias
            ))),
            JoinKind::Entity { on, .. } => {
                on.push(predicate);
                Ok(())
            }
            JoinKind::Relation { .. } => {
                node.on.push(predicate);
                Ok(())
            }
        }
    }

    pub fn node(&self, id: JoinNodeId) -> Result<&JoinNode> {
        self.nodes.get(id.0).ok_or(QueryError::UnknownJoinNode(id.0))
    }

    pub fn contains(&self, id: JoinNodeId) -> bool {
        id.0 < self.nodes.len()
    }

    pub fn find_by_alias(&self, alias: &str) -> Option<JoinNodeId> {
        self.nodes.iter().find(|n| n.alias == alias).map(|n| n.id)
    }

    /// Nodes in insertion order, which is parent-before-child.
    pub fn nodes(&self) -> impl Iterator<Item = &JoinNode> {
        self.nodes.iter()
    }

    pub fn roots(&self) -> impl Iterator<Item = &JoinNode> {
        self.nodes.iter().filter(|n| matches!(n.kind, JoinKind::Root))
    }

    pub fn children(&self, parent: JoinNodeId) -> impl Iterator<Item = &JoinNode> {
        self.nodes.iter().filter(move |n| n.parent() == Some(parent))
    }

    fn push(
        &mut self,
        alias: &str,
        entity: &str,
        kind: JoinKind,
        join_type: JoinType,
        fetch: bool,
    ) -> JoinNodeId {
        let id = JoinNodeId(self.nodes.len());
        self.nodes.push(JoinNode {
            id,
            alias: alias.to_string(),
            entity: entity.to_string(),
            kind,
            join_type,
            fetch,
            on: Vec::new(),
        });
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metamodel::fixtures::document_metamodel;

    #[test]
    fn relation_nodes_carry_tree_node_flags() {
        let mm = document_metamodel();
        let mut tree = JoinTree::new();
        let root = tree.add_root("Document", "d");
        let people = mm.attribute("Document", "people").unwrap();
        let p = tree
            .add_relation(root, people, "p", JoinType::Left, false)
            .unwrap();
        let partners = mm.attribute("Document", "partners").unwrap();
        let s = tree
            .add_relation(root, partners, "s", JoinType::Inner, false)
            .unwrap();

        let p_node = tree.node(p).unwrap();
        assert_eq!(p_node.entity(), "Person");
        assert_eq!(p_node.parent(), Some(root));
        assert!(p_node.parent_tree_node().unwrap().is_indexed());
        assert!(!tree.node(s).unwrap().parent_tree_node().unwrap().is_indexed());
        assert_eq!(tree.children(root).count(), 2);
        assert_eq!(tree.find_by_alias("s"), Some(s));
    }

    #[test]
    fn basic_attributes_cannot_be_joined() {
        let mm = document_metamodel();
        let mut tree = JoinTree::new();
        let root = tree.add_root("Document", "d");
        let name = mm.attribute("Document", "name").unwrap();
        assert!(tree
            .add_relation(root, name, "n", JoinType::Inner, false)
            .is_err());
    }

    #[test]
    fn unknown_nodes_are_reported() {
        let tree = JoinTree::new();
        assert!(matches!(
            tree.node(JoinNodeId(3)),
            Err(QueryError::UnknownJoinNode(3))
        ));
    }
}
