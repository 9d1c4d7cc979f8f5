//! Structural description of collection join tables.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A many-to-many / element-collection join table.
///
/// Column mappings are keyed by the join table's column names; values are the
/// column names on the owner (id mappings), the key target (key mappings) or the
/// target (target mappings) table. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinTable {
    table_name: String,
    id_attribute_names: BTreeSet<String>,
    id_column_mappings: BTreeMap<String, String>,
    #[serde(default)]
    key_column_mappings: Option<BTreeMap<String, String>>,
    #[serde(default)]
    key_column_types: Option<BTreeMap<String, String>>,
    target_attribute_names: BTreeSet<String>,
    target_column_mappings: BTreeMap<String, String>,
}

impl JoinTable {
    pub fn new(
        table_name: impl Into<String>,
        id_attribute_names: BTreeSet<String>,
        id_column_mappings: BTreeMap<String, String>,
        key_column_mappings: Option<BTreeMap<String, String>>,
        key_column_types: Option<BTreeMap<String, String>>,
        target_attribute_names: BTreeSet<String>,
        target_column_mappings: BTreeMap<String, String>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            id_attribute_names,
            id_column_mappings,
            key_column_mappings,
            key_column_types,
            target_attribute_names,
            target_column_mappings,
        }
    }

    /// The name of the join table.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Id attribute names of the owning entity that map to the join table.
    pub fn id_attribute_names(&self) -> &BTreeSet<String> {
        &self.id_attribute_names
    }

    /// Join table column -> owner table column.
    pub fn id_column_mappings(&self) -> &BTreeMap<String, String> {
        &self.id_column_mappings
    }

    /// Join table key/index column -> key target column. A simple key/index maps
    /// the column to itself. `None` when the collection has no key or index.
    pub fn key_column_mappings(&self) -> Option<&BTreeMap<String, String>> {
        self.key_column_mappings.as_ref()
    }

    /// Column types of the key/index columns, if any.
    pub fn key_column_types(&self) -> Option<&BTreeMap<String, String>> {
        self.key_column_types.as_ref()
    }

    /// Id attribute names of the target entity that map to the join table.
    pub fn target_attribute_names(&self) -> &BTreeSet<String> {
        &self.target_attribute_names
    }

    /// Join table column -> target table column.
    pub fn target_column_mappings(&self) -> &BTreeMap<String, String> {
        &self.target_column_mappings
    }

    /// Whether the join table carries a map key or list index column.
    pub fn has_key_columns(&self) -> bool {
        self.key_column_mappings
            .as_ref()
            .is_some_and(|mappings| !mappings.is_empty())
    }
}
