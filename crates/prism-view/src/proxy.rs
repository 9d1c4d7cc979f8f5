//! Updatable view instances and their dirty state.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use prism_core::Value;

use crate::accessor::{AttributeAccessor, ObjectAttributeAccessor};
use crate::error::{Result, ViewError};
use crate::metamodel::{AttributeMapping, ManagedViewType};

/// A changed attribute value, stamped so a later change to the same slot can
/// be told apart from the one captured in a snapshot.
#[derive(Debug, Clone, PartialEq)]
struct DirtySlot {
    value: Value,
    stamp: u64,
}

#[derive(Debug)]
struct InstanceState {
    /// One value per view attribute, id included.
    initial: Vec<Value>,
    /// One slot per updatable non-id attribute.
    dirty: Vec<Option<DirtySlot>>,
    next_stamp: u64,
}

/// Copy of an instance's state taken before an update is bound.
#[derive(Debug, Clone, PartialEq)]
pub struct DirtySnapshot {
    initial: Vec<Value>,
    dirty: Vec<Option<DirtySlot>>,
}

impl DirtySnapshot {
    pub fn initial_value(&self, position: usize) -> Value {
        self.initial.get(position).cloned().unwrap_or_default()
    }

    pub fn dirty_value(&self, index: usize) -> Option<&Value> {
        self.dirty.get(index)?.as_ref().map(|slot| &slot.value)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.iter().any(Option::is_some)
    }
}

/// A materialized view instance. Clones share the same state.
#[derive(Clone)]
pub struct ViewInstance {
    view: Arc<ManagedViewType>,
    /// Dirty slot index to attribute position.
    tracked: Arc<Vec<usize>>,
    state: Arc<Mutex<InstanceState>>,
}

impl ViewInstance {
    /// Instance over `initial`, one value per attribute of `view`.
    pub fn new(view: Arc<ManagedViewType>, initial: Vec<Value>) -> Result<Self> {
        if initial.len() != view.attributes().len() {
            return Err(ViewError::Metamodel(format!(
                "view type `{}` has {} attributes but {} values were given",
                view.name(),
                view.attributes().len(),
                initial.len()
            )));
        }
        let tracked: Vec<usize> = view.updatable_attributes().map(|a| a.position()).collect();
        let state = InstanceState {
            initial,
            dirty: vec![None; tracked.len()],
            next_stamp: 0,
        };
        Ok(Self {
            view,
            tracked: Arc::new(tracked),
            state: Arc::new(Mutex::new(state)),
        })
    }

    /// Read every path-mapped attribute from a loaded entity object.
    /// Correlated attributes start out empty.
    pub fn from_entity(view: Arc<ManagedViewType>, entity: &Value) -> Result<Self> {
        let mut initial = Vec::with_capacity(view.attributes().len());
        for attribute in view.attributes() {
            let loaded = match attribute.mapping() {
                AttributeMapping::Path { mapping } => ObjectAttributeAccessor::new(mapping)
                    .get_value(Some(entity))?
                    .unwrap_or_default(),
                AttributeMapping::Correlated { .. } => Value::Null,
            };
            let value = match attribute.collection_factory() {
                Some(factory) => {
                    let mut collection = factory.create_collection(0);
                    collection.extend_from_value(&loaded);
                    collection.to_value()
                }
                None => loaded,
            };
            initial.push(value);
        }
        Self::new(view, initial)
    }

    pub fn view(&self) -> &Arc<ManagedViewType> {
        &self.view
    }

    pub fn id(&self) -> Option<Value> {
        let position = self.view.id_attribute()?.position();
        self.lock().initial.get(position).cloned()
    }

    /// Current value of `attribute`: the changed value if dirty, else the
    /// loaded one.
    pub fn get(&self, attribute: &str) -> Result<Value> {
        let position = self.position(attribute)?;
        let state = self.lock();
        let dirty = self
            .tracked
            .iter()
            .position(|p| *p == position)
            .and_then(|index| state.dirty[index].as_ref());
        Ok(match dirty {
            Some(slot) => slot.value.clone(),
            None => state.initial[position].clone(),
        })
    }

    pub fn set(&self, attribute: &str, value: impl Into<Value>) -> Result<()> {
        let position = self.position(attribute)?;
        let index = self
            .tracked
            .iter()
            .position(|p| *p == position)
            .ok_or_else(|| ViewError::NotUpdatable {
                view: self.view.name().to_string(),
                attribute: attribute.to_string(),
            })?;
        let mut state = self.lock();
        let stamp = state.next_stamp;
        state.next_stamp += 1;
        state.dirty[index] = Some(DirtySlot {
            value: value.into(),
            stamp,
        });
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.lock().dirty.iter().any(Option::is_some)
    }

    pub fn snapshot(&self) -> DirtySnapshot {
        let state = self.lock();
        DirtySnapshot {
            initial: state.initial.clone(),
            dirty: state.dirty.clone(),
        }
    }

    /// Clear the dirty markers captured in `snapshot`, keeping their values as
    /// the new initial state. Slots changed after the snapshot stay dirty.
    pub fn clear_dirty(&self, snapshot: &DirtySnapshot) {
        let mut state = self.lock();
        let state = &mut *state;
        for (index, captured) in snapshot.dirty.iter().enumerate() {
            let Some(captured) = captured else {
                continue;
            };
            let Some(slot) = state.dirty.get_mut(index) else {
                continue;
            };
            if slot.as_ref().map(|s| s.stamp) != Some(captured.stamp) {
                continue;
            }
            if let (Some(committed), Some(position)) = (slot.take(), self.tracked.get(index)) {
                state.initial[*position] = committed.value;
            }
        }
    }

    fn position(&self, attribute: &str) -> Result<usize> {
        self.view
            .attribute(attribute)
            .map(|a| a.position())
            .ok_or_else(|| ViewError::UnknownAttribute {
                view: self.view.name().to_string(),
                attribute: attribute.to_string(),
            })
    }

    fn lock(&self) -> MutexGuard<'_, InstanceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ViewInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewInstance")
            .field("view", &self.view.name())
            .field("state", &*self.lock())
            .finish()
    }
}
