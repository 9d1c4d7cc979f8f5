//! Full-entity UPDATE synthesis for updatable view types.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use prism_core::Value;
use prism_shared::ViewMetrics;
use tracing::{info, instrument, warn};

use crate::error::{Result, ViewError};
use crate::metamodel::{ManagedViewType, ViewMetamodel};
use crate::proxy::{DirtySnapshot, ViewInstance};
use crate::tx::{TransactionContext, TransactionStatus, TransactionSynchronization};

/// One UPDATE statement per view type, covering every updatable non-id
/// attribute, bound by id.
#[derive(Debug)]
pub struct FullEntityViewUpdater {
    view: Arc<ManagedViewType>,
    update_query: String,
    id_parameter: String,
    id_position: usize,
    parameter_names: Vec<String>,
    dirty_state_index_to_initial_state_index: Vec<usize>,
}

impl FullEntityViewUpdater {
    pub fn new(view: Arc<ManagedViewType>) -> Result<Self> {
        let id = view.id_attribute().ok_or_else(|| {
            ViewError::Metamodel(format!("view type `{}` has no id attribute", view.name()))
        })?;
        let id_mapping = id.mapping_path().ok_or_else(|| {
            ViewError::Metamodel(format!(
                "id attribute `{}` of `{}` must map an entity path",
                id.name(),
                view.name()
            ))
        })?;

        let mut sb = format!("UPDATE {} SET ", view.entity());
        let mut parameter_names = Vec::new();
        let mut mapping = Vec::new();
        for attribute in view.updatable_attributes() {
            let Some(path) = attribute.mapping_path() else {
                continue;
            };
            if !mapping.is_empty() {
                sb.push_str(", ");
            }
            sb.push_str(path);
            sb.push_str(" = :");
            sb.push_str(attribute.name());
            parameter_names.push(attribute.name().to_string());
            mapping.push(attribute.position());
        }
        if mapping.is_empty() {
            return Err(ViewError::Metamodel(format!(
                "view type `{}` has no updatable attributes",
                view.name()
            )));
        }
        sb.push_str(" WHERE ");
        sb.push_str(id_mapping);
        sb.push_str(" = :");
        sb.push_str(id.name());

        Ok(Self {
            id_parameter: id.name().to_string(),
            id_position: id.position(),
            update_query: sb,
            parameter_names,
            dirty_state_index_to_initial_state_index: mapping,
            view,
        })
    }

    pub fn view(&self) -> &Arc<ManagedViewType> {
        &self.view
    }

    pub fn update_query(&self) -> &str {
        &self.update_query
    }

    /// Attribute position in the initial state for each dirty slot.
    pub fn dirty_state_index_to_initial_state_index(&self) -> &[usize] {
        &self.dirty_state_index_to_initial_state_index
    }

    /// Id first, then each column's dirty value or, when clean, its initial
    /// value.
    pub fn bindings(&self, snapshot: &DirtySnapshot) -> Vec<(String, Value)> {
        let mut bindings = Vec::with_capacity(self.parameter_names.len() + 1);
        bindings.push((self.id_parameter.clone(), snapshot.initial_value(self.id_position)));
        for (dirty_index, initial_index) in self
            .dirty_state_index_to_initial_state_index
            .iter()
            .enumerate()
        {
            let value = snapshot
                .dirty_value(dirty_index)
                .cloned()
                .unwrap_or_else(|| snapshot.initial_value(*initial_index));
            bindings.push((self.parameter_names[dirty_index].clone(), value));
        }
        bindings
    }

    /// Write `instance` back in the active transaction. Exactly one row must be
    /// affected; its dirty markers are cleared once the transaction commits.
    #[instrument(skip(self, tx, instance), fields(view = %self.view.name()))]
    pub fn execute_update(&self, tx: &dyn TransactionContext, instance: &ViewInstance) -> Result<()> {
        let view = self.view.name();
        if instance.view().name() != view {
            return Err(ViewError::Metamodel(format!(
                "updater for `{view}` cannot update a `{}` instance",
                instance.view().name()
            )));
        }
        if !tx.is_active() {
            ViewMetrics::update_failed(view, "inactive_transaction");
            return Err(ViewError::TransactionNotActive);
        }

        let started = Instant::now();
        let snapshot = instance.snapshot();
        let bindings = self.bindings(&snapshot);
        let rows = match tx.execute_update(&self.update_query, &bindings) {
            Ok(rows) => rows,
            Err(e) => {
                ViewMetrics::update_failed(view, "provider_error");
                return Err(ViewError::Provider(e));
            }
        };
        let elapsed = started.elapsed();

        if rows != 1 {
            warn!(rows, "Update did not affect exactly one row");
            ViewMetrics::update_failed(view, "row_count");
            return Err(ViewError::UnexpectedRowCount {
                expected: 1,
                actual: rows,
            });
        }

        tx.register_synchronization(Box::new(ClearDirtySynchronization {
            instance: instance.clone(),
            snapshot,
        }))
        .map_err(ViewError::Provider)?;

        ViewMetrics::update_succeeded(view, elapsed);
        info!(elapsed_ms = elapsed.as_millis() as u64, "Updated entity view");
        Ok(())
    }
}

/// Clears the snapshotted dirty markers after a successful commit.
struct ClearDirtySynchronization {
    instance: ViewInstance,
    snapshot: DirtySnapshot,
}

impl TransactionSynchronization for ClearDirtySynchronization {
    fn after_completion(&self, status: TransactionStatus) {
        if status == TransactionStatus::Committed {
            self.instance.clear_dirty(&self.snapshot);
        }
    }
}

/// Updaters for every updatable view type, built once.
#[derive(Debug, Default)]
pub struct UpdaterRegistry {
    updaters: BTreeMap<String, Arc<FullEntityViewUpdater>>,
}

impl UpdaterRegistry {
    pub fn build(views: &ViewMetamodel) -> Result<Self> {
        let mut updaters = BTreeMap::new();
        for view in views.views().filter(|v| v.is_updatable()) {
            let updater = FullEntityViewUpdater::new(view.clone())?;
            updaters.insert(view.name().to_string(), Arc::new(updater));
        }
        info!(updaters = updaters.len(), "Built entity-view updaters");
        Ok(Self { updaters })
    }

    pub fn get(&self, view: &str) -> Option<Arc<FullEntityViewUpdater>> {
        self.updaters.get(view).cloned()
    }

    pub fn len(&self) -> usize {
        self.updaters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updaters.is_empty()
    }

    /// Update `instance` with the updater of its view type.
    pub fn execute_update(&self, tx: &dyn TransactionContext, instance: &ViewInstance) -> Result<()> {
        let name = instance.view().name();
        let updater = self.updaters.get(name).ok_or_else(|| {
            ViewError::Metamodel(format!("view type `{name}` is not updatable"))
        })?;
        updater.execute_update(tx, instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metamodel::fixtures::view_metamodel;
    use crate::tx::MockTransactionContext;
    use std::sync::Mutex;

    type Captured = Arc<Mutex<Vec<Box<dyn TransactionSynchronization>>>>;

    fn registry() -> (ViewMetamodel, UpdaterRegistry) {
        let views = view_metamodel();
        let updaters = UpdaterRegistry::build(&views).unwrap();
        (views, updaters)
    }

    fn instance(views: &ViewMetamodel) -> ViewInstance {
        ViewInstance::new(
            views.view("DocumentView").unwrap(),
            vec![Value::Int(1), "A".into(), "B".into(), "Alice".into()],
        )
        .unwrap()
    }

    fn capture(tx: &mut MockTransactionContext) -> Captured {
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));
        let sink = captured.clone();
        tx.expect_register_synchronization().times(1).returning(move |sync| {
            sink.lock().unwrap().push(sync);
            Ok(())
        });
        captured
    }

    #[test]
    fn builds_one_statement_per_view() {
        let (_, updaters) = registry();
        let updater = updaters.get("DocumentView").unwrap();
        assert_eq!(
            updater.update_query(),
            "UPDATE Document SET name = :name, age = :age WHERE id = :id"
        );
        assert_eq!(updater.dirty_state_index_to_initial_state_index(), &[1, 2]);
        assert_eq!(updaters.len(), 1);
    }

    #[test]
    fn binds_dirty_values_over_initial_state() {
        let (views, updaters) = registry();
        let doc = instance(&views);
        doc.set("age", "X").unwrap();

        let mut tx = MockTransactionContext::new();
        tx.expect_is_active().return_const(true);
        tx.expect_execute_update()
            .withf(|statement, bindings| {
                statement == "UPDATE Document SET name = :name, age = :age WHERE id = :id"
                    && bindings
                        == [
                            ("id".to_string(), Value::Int(1)),
                            ("name".to_string(), Value::from("A")),
                            ("age".to_string(), Value::from("X")),
                        ]
            })
            .times(1)
            .returning(|_, _| Ok(1));
        let captured = capture(&mut tx);

        updaters.execute_update(&tx, &doc).unwrap();
        assert_eq!(captured.lock().unwrap().len(), 1);
        assert!(doc.is_dirty());
    }

    #[test]
    fn commit_clears_only_snapshotted_markers() {
        let (views, updaters) = registry();
        let doc = instance(&views);
        doc.set("name", "N").unwrap();

        let mut tx = MockTransactionContext::new();
        tx.expect_is_active().return_const(true);
        tx.expect_execute_update().returning(|_, _| Ok(1));
        let captured = capture(&mut tx);
        updaters.execute_update(&tx, &doc).unwrap();

        doc.set("age", "late").unwrap();
        let sync = captured.lock().unwrap().pop().unwrap();
        sync.before_completion();
        sync.after_completion(TransactionStatus::Committed);

        assert_eq!(doc.get("name").unwrap(), Value::from("N"));
        assert_eq!(doc.snapshot().dirty_value(0), None);
        assert_eq!(doc.snapshot().dirty_value(1), Some(&Value::from("late")));
    }

    #[test]
    fn rollback_keeps_dirty_markers() {
        let (views, updaters) = registry();
        let doc = instance(&views);
        doc.set("name", "N").unwrap();

        let mut tx = MockTransactionContext::new();
        tx.expect_is_active().return_const(true);
        tx.expect_execute_update().returning(|_, _| Ok(1));
        let captured = capture(&mut tx);
        updaters.execute_update(&tx, &doc).unwrap();

        let sync = captured.lock().unwrap().pop().unwrap();
        sync.after_completion(TransactionStatus::RolledBack);
        assert_eq!(doc.snapshot().dirty_value(0), Some(&Value::from("N")));
    }

    #[test]
    fn inactive_transaction_issues_no_query() {
        let (views, updaters) = registry();
        let mut tx = MockTransactionContext::new();
        tx.expect_is_active().return_const(false);
        tx.expect_execute_update().never();
        tx.expect_register_synchronization().never();

        let err = updaters.execute_update(&tx, &instance(&views)).unwrap_err();
        assert!(matches!(err, ViewError::TransactionNotActive));
    }

    #[test]
    fn row_count_mismatch_is_fatal() {
        let (views, updaters) = registry();
        for rows in [0u64, 2] {
            let mut tx = MockTransactionContext::new();
            tx.expect_is_active().return_const(true);
            tx.expect_execute_update().returning(move |_, _| Ok(rows));
            tx.expect_register_synchronization().never();

            let err = updaters.execute_update(&tx, &instance(&views)).unwrap_err();
            assert!(matches!(
                err,
                ViewError::UnexpectedRowCount { expected: 1, actual } if actual == rows
            ));
        }
    }

    #[test]
    fn provider_failures_are_wrapped() {
        let (views, updaters) = registry();
        let mut tx = MockTransactionContext::new();
        tx.expect_is_active().return_const(true);
        tx.expect_execute_update()
            .returning(|_, _| Err(anyhow::anyhow!("connection reset")));

        let err = updaters.execute_update(&tx, &instance(&views)).unwrap_err();
        assert!(matches!(err, ViewError::Provider(_)));
    }

    #[test]
    fn read_only_views_have_no_updater() {
        let (views, updaters) = registry();
        assert!(updaters.get("Missing").is_none());
        let view = views.view("DocumentView").unwrap();
        assert!(FullEntityViewUpdater::new(view).is_ok());
    }
}
