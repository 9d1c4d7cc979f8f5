//! Empty collection factories for plural view attributes.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use prism_core::Value;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionType {
    List,
    Set,
    SortedSet,
    Map,
}

pub type ValueComparator = Arc<dyn Fn(&Value, &Value) -> Ordering + Send + Sync>;

/// Collection instance backing a plural attribute.
#[derive(Clone)]
pub enum PluralCollection {
    List(Vec<Value>),
    /// Insertion ordered, no duplicates.
    Set(Vec<Value>),
    SortedSet(SortedSet),
    /// Entries keyed by value, insertion ordered.
    Map(Vec<(Value, Value)>),
}

impl PluralCollection {
    pub fn collection_type(&self) -> CollectionType {
        match self {
            PluralCollection::List(_) => CollectionType::List,
            PluralCollection::Set(_) => CollectionType::Set,
            PluralCollection::SortedSet(_) => CollectionType::SortedSet,
            PluralCollection::Map(_) => CollectionType::Map,
        }
    }

    /// Add an element; returns false when a set already holds it or the
    /// collection is a map.
    pub fn add(&mut self, value: Value) -> bool {
        match self {
            PluralCollection::List(items) => {
                items.push(value);
                true
            }
            PluralCollection::Set(items) => {
                if items.contains(&value) {
                    false
                } else {
                    items.push(value);
                    true
                }
            }
            PluralCollection::SortedSet(set) => set.insert(value),
            PluralCollection::Map(_) => false,
        }
    }

    /// Put a map entry, returning the replaced value. Non-map collections
    /// ignore the call.
    pub fn put(&mut self, key: Value, value: Value) -> Option<Value> {
        let PluralCollection::Map(entries) = self else {
            return None;
        };
        match entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                entries.push((key, value));
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PluralCollection::List(items) | PluralCollection::Set(items) => items.len(),
            PluralCollection::SortedSet(set) => set.len(),
            PluralCollection::Map(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fill from a loaded value: a list for element collections, an object or
    /// a list of `[key, value]` pairs for maps.
    pub fn extend_from_value(&mut self, value: &Value) {
        let is_map = self.collection_type() == CollectionType::Map;
        match value {
            Value::Object(map) if is_map => {
                for (k, v) in map {
                    self.put(Value::from(k.as_str()), v.clone());
                }
            }
            Value::List(pairs) if is_map => {
                for pair in pairs {
                    if let Some([k, v]) = pair.as_list() {
                        self.put(k.clone(), v.clone());
                    }
                }
            }
            Value::List(items) => {
                for item in items {
                    self.add(item.clone());
                }
            }
            Value::Null => {}
            single => {
                self.add(single.clone());
            }
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            PluralCollection::List(items) | PluralCollection::Set(items) => {
                Value::List(items.clone())
            }
            PluralCollection::SortedSet(set) => Value::List(set.items.clone()),
            PluralCollection::Map(entries) => Value::List(
                entries
                    .iter()
                    .map(|(k, v)| Value::List(vec![k.clone(), v.clone()]))
                    .collect(),
            ),
        }
    }
}

impl fmt::Debug for PluralCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PluralCollection")
            .field(&self.collection_type())
            .field(&self.to_value())
            .finish()
    }
}

/// Comparator-ordered set without duplicates.
#[derive(Clone)]
pub struct SortedSet {
    items: Vec<Value>,
    comparator: ValueComparator,
}

impl SortedSet {
    pub fn insert(&mut self, value: Value) -> bool {
        let comparator = &self.comparator;
        match self.items.binary_search_by(|probe| comparator(probe, &value)) {
            Ok(_) => false,
            Err(position) => {
                self.items.insert(position, value);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.items.iter()
    }
}

pub trait PluralObjectFactory: Send + Sync {
    fn create_collection(&self, size: usize) -> PluralCollection;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ListFactory;

impl PluralObjectFactory for ListFactory {
    fn create_collection(&self, size: usize) -> PluralCollection {
        PluralCollection::List(Vec::with_capacity(size))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SetFactory;

impl PluralObjectFactory for SetFactory {
    fn create_collection(&self, size: usize) -> PluralCollection {
        PluralCollection::Set(Vec::with_capacity(size))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MapFactory;

impl PluralObjectFactory for MapFactory {
    fn create_collection(&self, size: usize) -> PluralCollection {
        PluralCollection::Map(Vec::with_capacity(size))
    }
}

#[derive(Clone)]
pub struct SortedSetFactory {
    comparator: ValueComparator,
}

static NATURAL: Lazy<SortedSetFactory> = Lazy::new(|| SortedSetFactory {
    comparator: Arc::new(|a: &Value, b: &Value| a.total_cmp(b)),
});

impl SortedSetFactory {
    pub fn new(comparator: ValueComparator) -> Self {
        Self { comparator }
    }

    /// Shared factory ordering elements by their natural order.
    pub fn natural() -> &'static SortedSetFactory {
        &NATURAL
    }
}

impl fmt::Debug for SortedSetFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortedSetFactory").finish_non_exhaustive()
    }
}

impl PluralObjectFactory for SortedSetFactory {
    fn create_collection(&self, size: usize) -> PluralCollection {
        PluralCollection::SortedSet(SortedSet {
            items: Vec::with_capacity(size),
            comparator: self.comparator.clone(),
        })
    }
}

/// Factory for the collection type of an attribute.
pub fn factory_for(collection: CollectionType) -> &'static dyn PluralObjectFactory {
    match collection {
        CollectionType::List => &ListFactory,
        CollectionType::Set => &SetFactory,
        CollectionType::SortedSet => SortedSetFactory::natural(),
        CollectionType::Map => &MapFactory,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sets_deduplicate_in_insertion_order() {
        let mut set = SetFactory.create_collection(4);
        assert!(set.add(Value::from("b")));
        assert!(set.add(Value::from("a")));
        assert!(!set.add(Value::from("b")));
        assert_eq!(set.to_value(), Value::from(vec!["b", "a"]));
    }

    #[test]
    fn natural_sorted_set_orders_values() {
        let mut set = SortedSetFactory::natural().create_collection(0);
        set.extend_from_value(&Value::from(vec![3i64, 1, 2, 1]));
        assert_eq!(set.len(), 3);
        assert_eq!(set.to_value(), Value::from(vec![1i64, 2, 3]));
    }

    #[test]
    fn custom_comparator_is_used() {
        let reversed = SortedSetFactory::new(Arc::new(|a: &Value, b: &Value| b.total_cmp(a)));
        let mut set = reversed.create_collection(0);
        set.extend_from_value(&Value::from(vec!["a", "c", "b"]));
        assert_eq!(set.to_value(), Value::from(vec!["c", "b", "a"]));
    }

    #[test]
    fn maps_replace_existing_keys() {
        let mut map = factory_for(CollectionType::Map).create_collection(2);
        assert_eq!(map.put(Value::from("home"), Value::Int(1)), None);
        assert_eq!(map.put(Value::from("home"), Value::Int(2)), Some(Value::Int(1)));
        assert!(!map.add(Value::Int(3)));
        assert_eq!(map.len(), 1);
        assert_eq!(map.collection_type(), CollectionType::Map);
    }
}
