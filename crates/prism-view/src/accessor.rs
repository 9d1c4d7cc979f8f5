//! Attribute accessors over loaded entity objects.

use std::fmt;
use std::sync::Arc;

use anyhow::anyhow;
use prism_core::Value;

use crate::error::{Result, ViewError};

const ACCESS_FAILED: &str = "Couldn't access entity attribute value!";

pub trait AttributeAccessor: Send + Sync {
    /// Value of the attribute, `None` when the object is absent or the
    /// attribute is unset.
    fn get_value(&self, object: Option<&Value>) -> Result<Option<Value>>;

    /// Value of the attribute, created through the accessor's default and
    /// stored on the object when unset.
    fn get_or_create_value(&self, object: &mut Value) -> Result<Value>;

    fn set_value(&self, object: &mut Value, value: Value) -> Result<()>;
}

pub type DefaultValue = Arc<dyn Fn() -> Value + Send + Sync>;

/// Reads and writes a dotted attribute path on an object value.
#[derive(Clone)]
pub struct ObjectAttributeAccessor {
    path: Vec<String>,
    default: Option<DefaultValue>,
}

impl ObjectAttributeAccessor {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.split('.').map(str::to_string).collect(),
            default: None,
        }
    }

    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn path(&self) -> String {
        self.path.join(".")
    }

    fn descend<'a>(&self, object: &'a Value) -> Result<Option<&'a Value>> {
        let mut current = object;
        for segment in &self.path {
            match current {
                Value::Null => return Ok(None),
                Value::Object(map) => match map.get(segment) {
                    Some(next) => current = next,
                    None => return Ok(None),
                },
                other => {
                    return Err(ViewError::access(
                        ACCESS_FAILED,
                        anyhow!("`{segment}` cannot be read from a {} value", other.kind()),
                    ))
                }
            }
        }
        Ok(Some(current))
    }
}

impl AttributeAccessor for ObjectAttributeAccessor {
    fn get_value(&self, object: Option<&Value>) -> Result<Option<Value>> {
        let Some(object) = object else {
            return Ok(None);
        };
        Ok(self
            .descend(object)?
            .filter(|value| !value.is_null())
            .cloned())
    }

    fn get_or_create_value(&self, object: &mut Value) -> Result<Value> {
        if let Some(value) = self.get_value(Some(object))? {
            return Ok(value);
        }
        let Some(default) = &self.default else {
            return Ok(Value::Null);
        };
        let value = default();
        self.set_value(object, value.clone())?;
        Ok(value)
    }

    fn set_value(&self, object: &mut Value, value: Value) -> Result<()> {
        let Some((last, parents)) = self.path.split_last() else {
            return Ok(());
        };
        let mut current = object;
        for segment in parents {
            if current.is_null() {
                *current = Value::Object(Default::default());
            }
            let kind = current.kind();
            let Some(map) = current.as_object_mut() else {
                return Err(ViewError::access(
                    format!("Couldn't map value [{value}] to entity attribute!"),
                    anyhow!("`{segment}` cannot be written on a {kind} value"),
                ));
            };
            current = map.entry(segment.clone()).or_insert(Value::Null);
        }
        if current.is_null() {
            *current = Value::Object(Default::default());
        }
        let kind = current.kind();
        match current.as_object_mut() {
            Some(map) => {
                map.insert(last.clone(), value);
                Ok(())
            }
            None => Err(ViewError::access(
                format!("Couldn't map value [{value}] to entity attribute!"),
                anyhow!("`{last}` cannot be written on a {kind} value"),
            )),
        }
    }
}

impl fmt::Debug for ObjectAttributeAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectAttributeAccessor")
            .field("path", &self.path())
            .field("default", &self.default.is_some())
            .finish()
    }
}
