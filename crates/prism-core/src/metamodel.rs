//! Mapped entity metamodel.
//!
//! Describes the object/relational schema the query layer works against: entity
//! types, their id attribute and attributes, and for plural attributes the
//! collection kind, index column and join table. Built once at bootstrap and
//! shared read-only afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{QueryError, Result};
use crate::join_table::JoinTable;
use crate::sql::helpers::validate_path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    List,
    Set,
    Map,
    Bag,
}

/// Attribute metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttributeModel {
    Basic {
        #[serde(default)]
        column: Option<String>,
    },
    Association {
        target: String,
    },
    Plural {
        collection: CollectionKind,
        target: String,
        /// Present when the list is ordered by a dedicated index column.
        #[serde(default)]
        index_column: Option<String>,
        #[serde(default)]
        join_table: Option<JoinTable>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityAttribute {
    pub name: String,
    #[serde(flatten)]
    pub model: AttributeModel,
}

impl EntityAttribute {
    pub fn basic(name: &str) -> Self {
        Self {
            name: name.to_string(),
            model: AttributeModel::Basic { column: None },
        }
    }

    pub fn association(name: &str, target: &str) -> Self {
        Self {
            name: name.to_string(),
            model: AttributeModel::Association {
                target: target.to_string(),
            },
        }
    }

    pub fn plural(name: &str, collection: CollectionKind, target: &str) -> Self {
        Self {
            name: name.to_string(),
            model: AttributeModel::Plural {
                collection,
                target: target.to_string(),
                index_column: None,
                join_table: None,
            },
        }
    }

    pub fn with_index_column(mut self, column: &str) -> Self {
        if let AttributeModel::Plural { index_column, .. } = &mut self.model {
            *index_column = Some(column.to_string());
        }
        self
    }

    pub fn with_join_table(mut self, table: JoinTable) -> Self {
        if let AttributeModel::Plural { join_table, .. } = &mut self.model {
            *join_table = Some(table);
        }
        self
    }

    pub fn collection_kind(&self) -> Option<CollectionKind> {
        match &self.model {
            AttributeModel::Plural { collection, .. } => Some(*collection),
            _ => None,
        }
    }

    /// Entity reached by traversing this attribute, if it is an association.
    pub fn target(&self) -> Option<&str> {
        match &self.model {
            AttributeModel::Basic { .. } => None,
            AttributeModel::Association { target } | AttributeModel::Plural { target, .. } => {
                Some(target)
            }
        }
    }

    pub fn join_table(&self) -> Option<&JoinTable> {
        match &self.model {
            AttributeModel::Plural { join_table, .. } => join_table.as_ref(),
            _ => None,
        }
    }

    /// Maps and index-column lists are accessed by key/index.
    pub fn is_indexed(&self) -> bool {
        match &self.model {
            AttributeModel::Plural {
                collection: CollectionKind::Map,
                ..
            } => true,
            AttributeModel::Plural {
                collection: CollectionKind::List,
                index_column,
                join_table,
                ..
            } => {
                index_column.is_some()
                    || join_table.as_ref().is_some_and(JoinTable::has_key_columns)
            }
            _ => false,
        }
    }
}

impl std::fmt::Display for EntityAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        match &self.model {
            AttributeModel::Basic { column: Some(c) } => write!(f, " @{c}"),
            AttributeModel::Basic { column: None } => Ok(()),
            AttributeModel::Association { target } => write!(f, " -> {target}"),
            AttributeModel::Plural {
                collection, target, ..
            } => write!(f, " -> {collection:?}<{target}>"),
        }
    }
}

/// Entity metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityType {
    pub name: String,
    pub table: String,
    pub id_attribute: String,
    pub attributes: Vec<EntityAttribute>,
}

impl EntityType {
    /// Lookup an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&EntityAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct EntityMetamodel {
    entities: BTreeMap<String, EntityType>,
}

impl EntityMetamodel {
    pub fn new(entities: impl IntoIterator<Item = EntityType>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for entity in entities {
            if entity.attribute(&entity.id_attribute).is_none() {
                return Err(QueryError::Metamodel(format!(
                    "entity `{}` declares id attribute `{}` which it does not have",
                    entity.name, entity.id_attribute
                )));
            }
            let name = entity.name.clone();
            if map.insert(name.clone(), entity).is_some() {
                return Err(QueryError::Metamodel(format!(
                    "entity `{name}` is declared twice"
                )));
            }
        }
        Ok(Self { entities: map })
    }

    /// Load the metamodel from a JSON array of entity types.
    pub fn from_json(json: &str) -> Result<Self> {
        let entities: Vec<EntityType> = serde_json::from_str(json)
            .map_err(|e| QueryError::Metamodel(format!("invalid metamodel json: {e}")))?;
        Self::new(entities)
    }

    pub fn entity(&self, name: &str) -> Result<&EntityType> {
        self.entities
            .get(name)
            .ok_or_else(|| QueryError::Metamodel(format!("Entity `{name}` not found")))
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityType> {
        self.entities.values()
    }

    pub fn attribute(&self, entity: &str, attribute: &str) -> Result<&EntityAttribute> {
        self.entity(entity)?.attribute(attribute).ok_or_else(|| {
            QueryError::Metamodel(format!("`{attribute}` is not an attribute of `{entity}`"))
        })
    }

    /// Walk a dotted attribute path starting at `entity`.
    pub fn resolve_path(&self, entity: &str, path: &str) -> Result<Vec<&EntityAttribute>> {
        validate_path(path)?;
        let mut current = entity;
        let mut out = Vec::new();
        let segments: Vec<&str> = path.split('.').collect();
        for (i, segment) in segments.iter().enumerate() {
            let attribute = self.attribute(current, segment)?;
            out.push(attribute);
            if i + 1 < segments.len() {
                current = attribute.target().ok_or_else(|| {
                    QueryError::Metamodel(format!(
                        "cannot dereference basic attribute `{segment}` in `{path}`"
                    ))
                })?;
            }
        }
        Ok(out)
    }

    /// Whether `mapping` on `entity` ends in a list that is ordered by an index
    /// column. Mappings that are not plain attribute paths are never indexed.
    pub fn is_indexed_list(&self, entity: &str, mapping: &str) -> Result<bool> {
        if validate_path(mapping).is_err() {
            return Ok(false);
        }
        let attributes = self.resolve_path(entity, mapping)?;
        Ok(attributes.last().is_some_and(|a| {
            a.collection_kind() == Some(CollectionKind::List) && a.is_indexed()
        }))
    }

    pub fn join_table(&self, entity: &str, attribute: &str) -> Option<&JoinTable> {
        self.entities
            .get(entity)
            .and_then(|e| e.attribute(attribute))
            .and_then(EntityAttribute::join_table)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// `document_tagged(document_id, tagged_id, tagged_idx)`.
    pub fn tagged_join_table() -> JoinTable {
        let columns = |pairs: &[(&str, &str)]| {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>()
        };
        JoinTable::new(
            "document_tagged",
            ["id".to_string()].into(),
            columns(&[("document_id", "id")]),
            Some(columns(&[("tagged_idx", "tagged_idx")])),
            Some(columns(&[("tagged_idx", "integer")])),
            ["id".to_string()].into(),
            columns(&[("tagged_id", "id")]),
        )
    }

    /// Document/Person schema shared by tests across the crate.
    pub fn document_metamodel() -> EntityMetamodel {
        let person = EntityType {
            name: "Person".into(),
            table: "person".into(),
            id_attribute: "id".into(),
            attributes: vec![
                EntityAttribute::basic("id"),
                EntityAttribute::basic("name"),
                EntityAttribute::association("partnerDocument", "Document"),
            ],
        };
        let document = EntityType {
            name: "Document".into(),
            table: "document".into(),
            id_attribute: "id".into(),
            attributes: vec![
                EntityAttribute::basic("id"),
                EntityAttribute::basic("name"),
                EntityAttribute::basic("age"),
                EntityAttribute::association("owner", "Person"),
                EntityAttribute::plural("people", CollectionKind::List, "Person")
                    .with_index_column("people_idx"),
                EntityAttribute::plural("peopleBag", CollectionKind::List, "Person"),
                EntityAttribute::plural("tagged", CollectionKind::List, "Person")
                    .with_join_table(tagged_join_table()),
                EntityAttribute::plural("partners", CollectionKind::Set, "Person"),
                EntityAttribute::plural("contacts", CollectionKind::Map, "Person"),
            ],
        };
        EntityMetamodel::new([person, document]).expect("valid fixture")
    }
}
