//! Entity-view metamodel.
//!
//! View types are declared as [`ViewTypeDescriptor`]s and validated once against
//! the entity metamodel into immutable [`ManagedViewType`]s. Everything derived
//! here (attribute positions, list indexing, correlation mappers) is computed at
//! build time and shared read-only by every view instance.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use prism_core::{EntityMetamodel, QueryBuilder, QueryContext};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::collection::{factory_for, CollectionType, PluralObjectFactory};
use crate::correlation::{CorrelationProviderRegistry, ExpressionCorrelationMapper};
use crate::error::{Result, ViewError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttributeMapping {
    /// Attribute path on the view's entity.
    Path { mapping: String },
    /// Fetched through a named correlation provider.
    Correlated {
        provider: String,
        basis: String,
        #[serde(default)]
        result: String,
        #[serde(default)]
        fetches: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    pub name: String,
    #[serde(flatten)]
    pub mapping: AttributeMapping,
    #[serde(default)]
    pub id: bool,
    #[serde(default)]
    pub updatable: bool,
    #[serde(default)]
    pub collection: Option<CollectionType>,
    #[serde(default)]
    pub ignore_index: bool,
    #[serde(default)]
    pub ordered: bool,
}

impl AttributeDescriptor {
    pub fn path(name: &str, mapping: &str) -> Self {
        Self::with_mapping(
            name,
            AttributeMapping::Path {
                mapping: mapping.to_string(),
            },
        )
    }

    pub fn correlated(name: &str, provider: &str, basis: &str, result: &str) -> Self {
        Self::with_mapping(
            name,
            AttributeMapping::Correlated {
                provider: provider.to_string(),
                basis: basis.to_string(),
                result: result.to_string(),
                fetches: Vec::new(),
            },
        )
    }

    fn with_mapping(name: &str, mapping: AttributeMapping) -> Self {
        Self {
            name: name.to_string(),
            mapping,
            id: false,
            updatable: false,
            collection: None,
            ignore_index: false,
            ordered: false,
        }
    }

    pub fn as_id(mut self) -> Self {
        self.id = true;
        self
    }

    pub fn with_updatable(mut self, updatable: bool) -> Self {
        self.updatable = updatable;
        self
    }

    pub fn with_collection(mut self, collection: CollectionType) -> Self {
        self.collection = Some(collection);
        self
    }

    pub fn with_ignore_index(mut self) -> Self {
        self.ignore_index = true;
        self
    }

    pub fn with_ordered(mut self) -> Self {
        self.ordered = true;
        self
    }

    pub fn with_fetches<I: IntoIterator<Item = S>, S: Into<String>>(mut self, fetches: I) -> Self {
        if let AttributeMapping::Correlated { fetches: f, .. } = &mut self.mapping {
            f.extend(fetches.into_iter().map(Into::into));
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewTypeDescriptor {
    pub name: String,
    pub entity: String,
    pub attributes: Vec<AttributeDescriptor>,
}

impl ViewTypeDescriptor {
    pub fn new(name: &str, entity: &str, attributes: Vec<AttributeDescriptor>) -> Self {
        Self {
            name: name.to_string(),
            entity: entity.to_string(),
            attributes,
        }
    }

    /// Load view type declarations from a JSON array.
    pub fn list_from_json(json: &str) -> Result<Vec<Self>> {
        serde_json::from_str(json)
            .map_err(|e| ViewError::Metamodel(format!("invalid view descriptor json: {e}")))
    }
}

/// One attribute of a managed view type.
#[derive(Debug, Clone)]
pub struct MethodAttribute {
    name: String,
    position: usize,
    mapping: AttributeMapping,
    id: bool,
    updatable: bool,
    collection: Option<CollectionType>,
    indexed: bool,
    ordered: bool,
    sorted: bool,
    correlation: Option<ExpressionCorrelationMapper>,
}

impl MethodAttribute {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position in the view type, which is also the slot in instance state.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn mapping(&self) -> &AttributeMapping {
        &self.mapping
    }

    pub fn mapping_path(&self) -> Option<&str> {
        match &self.mapping {
            AttributeMapping::Path { mapping } => Some(mapping),
            AttributeMapping::Correlated { .. } => None,
        }
    }

    pub fn is_id(&self) -> bool {
        self.id
    }

    pub fn is_updatable(&self) -> bool {
        self.updatable
    }

    pub fn collection_type(&self) -> Option<CollectionType> {
        self.collection
    }

    pub fn is_collection(&self) -> bool {
        self.collection.is_some()
    }

    /// List backed by an index column.
    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    pub fn is_ordered(&self) -> bool {
        self.ordered
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    pub fn collection_factory(&self) -> Option<&'static dyn PluralObjectFactory> {
        self.collection.map(factory_for)
    }

    pub fn correlation_mapper(&self) -> Option<&ExpressionCorrelationMapper> {
        self.correlation.as_ref()
    }
}

#[derive(Debug, Clone)]
pub struct ManagedViewType {
    name: String,
    entity: String,
    attributes: Vec<MethodAttribute>,
    id_position: Option<usize>,
}

impl ManagedViewType {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn attributes(&self) -> &[MethodAttribute] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&MethodAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn id_attribute(&self) -> Option<&MethodAttribute> {
        self.id_position.map(|position| &self.attributes[position])
    }

    pub fn is_updatable(&self) -> bool {
        self.attributes.iter().any(|a| a.updatable && !a.id)
    }

    /// Updatable non-id attributes, in declaration order.
    pub fn updatable_attributes(&self) -> impl Iterator<Item = &MethodAttribute> {
        self.attributes.iter().filter(|a| a.updatable && !a.id)
    }

    /// Query selecting every attribute of the view from its entity.
    pub fn create_query(&self, context: Arc<QueryContext>, alias: &str) -> Result<QueryBuilder> {
        let mut query = QueryBuilder::new(context, &self.entity, alias)?;
        for attribute in &self.attributes {
            query = match (&attribute.mapping, &attribute.correlation) {
                (AttributeMapping::Path { mapping }, _) => {
                    query.select_path(&format!("{alias}.{mapping}"), None)?
                }
                (AttributeMapping::Correlated { .. }, Some(mapper)) => {
                    mapper.clone().with_join_base(alias).apply_mapping(&query)?
                }
                (AttributeMapping::Correlated { provider, .. }, None) => {
                    return Err(ViewError::Metamodel(format!(
                        "attribute `{}` has no mapper for provider `{provider}`",
                        attribute.name
                    )))
                }
            };
        }
        Ok(query)
    }
}

/// Every managed view type, by name.
#[derive(Debug, Clone, Default)]
pub struct ViewMetamodel {
    views: BTreeMap<String, Arc<ManagedViewType>>,
}

impl ViewMetamodel {
    pub fn build<I>(
        descriptors: I,
        entities: &EntityMetamodel,
        correlations: &CorrelationProviderRegistry,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = ViewTypeDescriptor>,
    {
        let mut views = BTreeMap::new();
        for descriptor in descriptors {
            let view = build_view(descriptor, entities, correlations)?;
            let name = view.name.clone();
            if views.insert(name.clone(), Arc::new(view)).is_some() {
                return Err(ViewError::Metamodel(format!(
                    "view type `{name}` is declared twice"
                )));
            }
        }
        info!(views = views.len(), "Built entity-view metamodel");
        Ok(Self { views })
    }

    pub fn view(&self, name: &str) -> Result<Arc<ManagedViewType>> {
        self.views
            .get(name)
            .cloned()
            .ok_or_else(|| ViewError::Metamodel(format!("View type `{name}` not found")))
    }

    pub fn views(&self) -> impl Iterator<Item = &Arc<ManagedViewType>> {
        self.views.values()
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

fn build_view(
    descriptor: ViewTypeDescriptor,
    entities: &EntityMetamodel,
    correlations: &CorrelationProviderRegistry,
) -> Result<ManagedViewType> {
    let ViewTypeDescriptor {
        name: view,
        entity,
        attributes: declared,
    } = descriptor;
    entities.entity(&entity)?;

    let mut seen = BTreeSet::new();
    let mut attributes = Vec::with_capacity(declared.len());
    let mut id_position = None;

    for (position, attribute) in declared.into_iter().enumerate() {
        if !seen.insert(attribute.name.clone()) {
            return Err(ViewError::Metamodel(format!(
                "attribute `{}` is declared twice on `{view}`",
                attribute.name
            )));
        }
        if attribute.id {
            if id_position.is_some() {
                return Err(ViewError::Metamodel(format!(
                    "view type `{view}` declares more than one id attribute"
                )));
            }
            id_position = Some(position);
        }
        if attribute.updatable && attribute.collection.is_some() {
            return Err(ViewError::Metamodel(format!(
                "collection attribute `{}` on `{view}` cannot be updatable",
                attribute.name
            )));
        }

        let correlation = match &attribute.mapping {
            AttributeMapping::Path { mapping } => {
                entities.resolve_path(&entity, mapping)?;
                None
            }
            AttributeMapping::Correlated {
                provider,
                basis,
                result,
                fetches,
            } => {
                if attribute.updatable {
                    return Err(ViewError::Metamodel(format!(
                        "correlated attribute `{}` on `{view}` cannot be updatable",
                        attribute.name
                    )));
                }
                let registered = correlations.get(provider).ok_or_else(|| {
                    ViewError::Metamodel(format!(
                        "correlation provider `{provider}` used by `{view}.{}` is not registered",
                        attribute.name
                    ))
                })?;
                Some(ExpressionCorrelationMapper::new(
                    provider,
                    registered,
                    "",
                    &attribute.name,
                    basis,
                    result,
                    fetches.clone(),
                ))
            }
        };

        // Index lookups are resolved once here, never per query.
        let (indexed, ordered, sorted) = match attribute.collection {
            Some(CollectionType::List) => {
                let indexed = !attribute.ignore_index
                    && match &attribute.mapping {
                        AttributeMapping::Path { mapping } => {
                            entities.is_indexed_list(&entity, mapping)?
                        }
                        AttributeMapping::Correlated { .. } => false,
                    };
                (indexed, !indexed, false)
            }
            Some(CollectionType::SortedSet) => (false, false, true),
            Some(CollectionType::Set) | Some(CollectionType::Map) => {
                (false, attribute.ordered, false)
            }
            None => (false, false, false),
        };

        attributes.push(MethodAttribute {
            name: attribute.name,
            position,
            mapping: attribute.mapping,
            id: attribute.id,
            updatable: attribute.updatable,
            collection: attribute.collection,
            indexed,
            ordered,
            sorted,
            correlation,
        });
    }

    let managed = ManagedViewType {
        name: view,
        entity,
        attributes,
        id_position,
    };
    if managed.is_updatable() && managed.id_position.is_none() {
        return Err(ViewError::Metamodel(format!(
            "updatable view type `{}` needs an id attribute",
            managed.name
        )));
    }
    Ok(managed)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::correlation::EntityCorrelationProvider;
    use prism_core::{CollectionKind, EntityAttribute, EntityType, ProviderProfile};

    /// Document/Person schema shared by the crate's tests.
    pub fn entity_metamodel() -> EntityMetamodel {
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
                EntityAttribute::plural("partners", CollectionKind::Set, "Person"),
            ],
        };
        EntityMetamodel::new([person, document]).expect("valid fixture")
    }

    pub fn query_context() -> Arc<QueryContext> {
        Arc::new(QueryContext::new(
            Arc::new(entity_metamodel()),
            Arc::new(ProviderProfile::standard()),
        ))
    }

    pub fn correlations() -> CorrelationProviderRegistry {
        let mut registry = CorrelationProviderRegistry::new();
        registry
            .register(
                "partnerOf",
                Arc::new(EntityCorrelationProvider::new("Person", "partnerDocument")),
            )
            .expect("fresh registry");
        registry
    }

    /// `[id, name, age, ownerName]` with name and age updatable.
    pub fn document_view() -> ViewTypeDescriptor {
        ViewTypeDescriptor::new(
            "DocumentView",
            "Document",
            vec![
                AttributeDescriptor::path("id", "id").as_id(),
                AttributeDescriptor::path("name", "name").with_updatable(true),
                AttributeDescriptor::path("age", "age").with_updatable(true),
                AttributeDescriptor::path("ownerName", "owner.name"),
            ],
        )
    }

    pub fn view_metamodel() -> ViewMetamodel {
        ViewMetamodel::build([document_view()], &entity_metamodel(), &correlations())
            .expect("valid views")
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    fn build(descriptor: ViewTypeDescriptor) -> Result<ViewMetamodel> {
        ViewMetamodel::build([descriptor], &entity_metamodel(), &correlations())
    }

    #[test]
    fn assigns_positions_and_id() {
        let views = view_metamodel();
        let view = views.view("DocumentView").unwrap();
        assert_eq!(view.entity(), "Document");
        assert_eq!(view.id_attribute().map(MethodAttribute::name), Some("id"));
        assert_eq!(view.attribute("age").unwrap().position(), 2);
        assert!(view.is_updatable());
        let updatable: Vec<_> = view.updatable_attributes().map(|a| a.name()).collect();
        assert_eq!(updatable, vec!["name", "age"]);
        assert!(views.view("Missing").is_err());
    }

    #[test]
    fn list_indexing_is_resolved_at_build_time() {
        let views = build(ViewTypeDescriptor::new(
            "CollectionsView",
            "Document",
            vec![
                AttributeDescriptor::path("people", "people").with_collection(CollectionType::List),
                AttributeDescriptor::path("unindexed", "people")
                    .with_collection(CollectionType::List)
                    .with_ignore_index(),
                AttributeDescriptor::path("bag", "peopleBag").with_collection(CollectionType::List),
                AttributeDescriptor::path("partners", "partners")
                    .with_collection(CollectionType::SortedSet),
                AttributeDescriptor::path("partnerSet", "partners")
                    .with_collection(CollectionType::Set)
                    .with_ordered(),
            ],
        ))
        .unwrap();
        let view = views.view("CollectionsView").unwrap();

        let people = view.attribute("people").unwrap();
        assert!(people.is_indexed() && !people.is_ordered());
        let unindexed = view.attribute("unindexed").unwrap();
        assert!(!unindexed.is_indexed() && unindexed.is_ordered());
        let bag = view.attribute("bag").unwrap();
        assert!(!bag.is_indexed() && bag.is_ordered());
        let partners = view.attribute("partners").unwrap();
        assert!(partners.is_sorted() && !partners.is_ordered());
        assert!(view.attribute("partnerSet").unwrap().is_ordered());
        assert!(!view.is_updatable());
        assert_eq!(
            partners
                .collection_factory()
                .map(|f| f.create_collection(0).collection_type()),
            Some(CollectionType::SortedSet)
        );
    }

    #[test]
    fn validates_descriptors() {
        let unresolved = ViewTypeDescriptor::new(
            "Broken",
            "Document",
            vec![AttributeDescriptor::path("title", "title")],
        );
        assert!(build(unresolved).is_err());

        let no_id = ViewTypeDescriptor::new(
            "NoId",
            "Document",
            vec![AttributeDescriptor::path("name", "name").with_updatable(true)],
        );
        assert!(matches!(build(no_id), Err(ViewError::Metamodel(_))));

        let updatable_correlation = ViewTypeDescriptor::new(
            "Correlated",
            "Document",
            vec![
                AttributeDescriptor::path("id", "id").as_id(),
                AttributeDescriptor::correlated("partners", "partnerOf", "id", "name")
                    .with_updatable(true),
            ],
        );
        assert!(build(updatable_correlation).is_err());

        let unknown_provider = ViewTypeDescriptor::new(
            "Unknown",
            "Document",
            vec![AttributeDescriptor::correlated("partners", "nope", "id", "")],
        );
        assert!(build(unknown_provider).is_err());

        let two_ids = ViewTypeDescriptor::new(
            "TwoIds",
            "Document",
            vec![
                AttributeDescriptor::path("id", "id").as_id(),
                AttributeDescriptor::path("other", "name").as_id(),
            ],
        );
        assert!(build(two_ids).is_err());
    }

    #[test]
    fn view_query_selects_paths_and_correlations() {
        let views = build(ViewTypeDescriptor::new(
            "PartnersView",
            "Document",
            vec![
                AttributeDescriptor::path("id", "id").as_id(),
                AttributeDescriptor::path("ownerName", "owner.name"),
                AttributeDescriptor::correlated("partnerNames", "partnerOf", "id", "name")
                    .with_collection(CollectionType::Set),
            ],
        ))
        .unwrap();
        let query = views
            .view("PartnersView")
            .unwrap()
            .create_query(query_context(), "d")
            .unwrap();
        assert_eq!(
            query.to_query_string().unwrap(),
            "SELECT d.id, d.owner.name, corr_partnerNames.name FROM Document d \
             LEFT JOIN Person corr_partnerNames ON corr_partnerNames.partnerDocument = d.id"
        );
    }

    #[test]
    fn descriptors_deserialize() {
        let json = r#"{
            "name": "DocumentView", "entity": "Document",
            "attributes": [
                {"name": "id", "kind": "path", "mapping": "id", "id": true},
                {"name": "partners", "kind": "correlated", "provider": "partnerOf",
                 "basis": "id", "collection": "set"}
            ]
        }"#;
        let descriptor = ViewTypeDescriptor::list_from_json(&format!("[{json}]"))
            .unwrap()
            .remove(0);
        assert!(descriptor.attributes[0].id);
        assert_eq!(
            descriptor.attributes[1].mapping,
            AttributeMapping::Correlated {
                provider: "partnerOf".into(),
                basis: "id".into(),
                result: String::new(),
                fetches: Vec::new(),
            }
        );
        assert!(build(descriptor).is_ok());
    }
}
