//! Startup wiring: every registry is built once from configuration and shared
//! read-only afterwards.

use std::sync::Arc;

use anyhow::Context;
use prism_core::{
    CteDefinition, DbmsDialect, DialectKind, EntityMetamodel, FunctionRegistry, ProviderKind,
    ProviderProfile, QueryBuilder, QueryContext, Statement,
};
use prism_shared::{PrismConfig, ProviderConfig};
use prism_view::{
    CorrelationProviderRegistry, ManagedViewType, TransactionContext, UpdaterRegistry,
    ViewInstance, ViewMetamodel, ViewTypeDescriptor,
};
use tracing::info;

/// Query context, dialect, view metamodel and updaters of one application.
pub struct Runtime {
    context: Arc<QueryContext>,
    dialect: Arc<dyn DbmsDialect>,
    views: ViewMetamodel,
    updaters: UpdaterRegistry,
}

impl Runtime {
    /// Build every registry from `config` and the mapped schema.
    pub fn from_config(
        config: &PrismConfig,
        entities: EntityMetamodel,
        view_descriptors: Vec<ViewTypeDescriptor>,
        correlations: CorrelationProviderRegistry,
    ) -> anyhow::Result<Self> {
        let provider = provider_profile(&config.provider)?;
        let dialect = config
            .dialect
            .kind
            .parse::<DialectKind>()
            .context("Invalid dialect configuration")?
            .create();

        let views = ViewMetamodel::build(view_descriptors, &entities, &correlations)
            .context("Failed to build the entity-view metamodel")?;
        let updaters =
            UpdaterRegistry::build(&views).context("Failed to build entity-view updaters")?;

        let context = QueryContext::new(Arc::new(entities), Arc::new(provider))
            .with_functions(FunctionRegistry::new(&config.query.registered_functions))
            .with_resolve_select_aliases(config.query.resolve_select_aliases)
            .with_alias_prefix(config.query.alias_prefix.as_deref());

        info!(
            provider = %config.provider.profile,
            dialect = dialect.name(),
            views = views.len(),
            updaters = updaters.len(),
            "Prism runtime ready"
        );

        Ok(Self {
            context: Arc::new(context),
            dialect,
            views,
            updaters,
        })
    }

    /// Shared query context handed to query builders.
    pub fn context(&self) -> &Arc<QueryContext> {
        &self.context
    }

    /// Mapped entity metamodel.
    pub fn metamodel(&self) -> &EntityMetamodel {
        self.context.metamodel()
    }

    /// Configured SQL dialect.
    pub fn dialect(&self) -> &dyn DbmsDialect {
        self.dialect.as_ref()
    }

    /// Managed view types.
    pub fn views(&self) -> &ViewMetamodel {
        &self.views
    }

    /// Managed view type by name.
    pub fn view(&self, name: &str) -> prism_view::Result<Arc<ManagedViewType>> {
        self.views.view(name)
    }

    /// Updaters of the updatable view types.
    pub fn updaters(&self) -> &UpdaterRegistry {
        &self.updaters
    }

    /// Query over `entity` aliased as `alias`.
    pub fn query(&self, entity: &str, alias: &str) -> prism_core::Result<QueryBuilder> {
        QueryBuilder::new(self.context.clone(), entity, alias)
    }

    /// Query selecting every attribute of the named view.
    pub fn view_query(&self, view: &str, alias: &str) -> prism_view::Result<QueryBuilder> {
        self.views.view(view)?.create_query(self.context.clone(), alias)
    }

    /// Render `query` in the configured dialect.
    pub fn statement(
        &self,
        query: &QueryBuilder,
        ctes: &[CteDefinition],
    ) -> prism_core::Result<Statement> {
        query.to_statement(self.dialect.as_ref(), ctes)
    }

    /// Write a view instance back in the active transaction.
    pub fn execute_update(
        &self,
        tx: &dyn TransactionContext,
        instance: &ViewInstance,
    ) -> prism_view::Result<()> {
        self.updaters.execute_update(tx, instance)
    }
}

/// Provider preset with the configured overrides applied. An empty collection
/// value function disables value wrapping.
pub fn provider_profile(config: &ProviderConfig) -> anyhow::Result<ProviderProfile> {
    let kind = config
        .profile
        .parse::<ProviderKind>()
        .context("Invalid provider configuration")?;
    let mut profile = ProviderProfile::preset(kind);
    if let Some(supported) = config.supports_dynamic_function {
        profile = profile.with_dynamic_function(supported);
    }
    if let Some(function) = &config.collection_value_function {
        let function = function.trim();
        profile = profile.with_collection_value_function((!function.is_empty()).then_some(function));
    }
    if let Some(brackets) = config.list_parameter_brackets {
        profile = profile.with_list_parameter_brackets(brackets);
    }
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::{JoinType, Value};

    const ENTITIES: &str = r#"[
        {"name": "Person", "table": "person", "id_attribute": "id", "attributes": [
            {"name": "id", "kind": "basic"},
            {"name": "name", "kind": "basic"}
        ]},
        {"name": "Document", "table": "document", "id_attribute": "id", "attributes": [
            {"name": "id", "kind": "basic"},
            {"name": "name", "kind": "basic"},
            {"name": "owner", "kind": "association", "target": "Person"},
            {"name": "people", "kind": "plural", "collection": "list",
             "target": "Person", "index_column": "people_idx"}
        ]}
    ]"#;

    const VIEWS: &str = r#"[{
        "name": "DocumentView", "entity": "Document",
        "attributes": [
            {"name": "id", "kind": "path", "mapping": "id", "id": true},
            {"name": "name", "kind": "path", "mapping": "name", "updatable": true}
        ]
    }]"#;

    fn runtime(config: &PrismConfig) -> Runtime {
        Runtime::from_config(
            config,
            EntityMetamodel::from_json(ENTITIES).unwrap(),
            ViewTypeDescriptor::list_from_json(VIEWS).unwrap(),
            CorrelationProviderRegistry::new(),
        )
        .unwrap()
    }

    #[test]
    fn builds_registries_from_defaults() {
        let runtime = runtime(&PrismConfig::default());
        assert_eq!(runtime.dialect().name(), "default");
        assert_eq!(runtime.views().len(), 1);
        let updater = runtime.updaters().get("DocumentView").unwrap();
        assert_eq!(updater.update_query(), "UPDATE Document SET name = :name WHERE id = :id");
        assert_eq!(runtime.metamodel().entities().count(), 2);
    }

    #[test]
    fn renders_with_configured_provider_and_dialect() {
        let mut config = PrismConfig::default();
        config.dialect.kind = "postgres".to_string();
        config.provider.profile = "standard".to_string();
        let runtime = runtime(&config);

        let query = runtime
            .query("Document", "d")
            .unwrap()
            .join("d.people", "p", JoinType::Left)
            .unwrap()
            .select_path("p", None)
            .unwrap()
            .where_("d.id = :id")
            .unwrap()
            .set_parameter("id", 7)
            .unwrap()
            .max_results(10);
        let statement = runtime.statement(&query, &[]).unwrap();
        assert_eq!(
            statement.sql,
            "SELECT VALUE(p) FROM Document d LEFT JOIN d.people p WHERE d.id = :id limit 10"
        );
        assert_eq!(statement.parameters.get("id"), Some(&Value::Int(7)));
    }

    #[test]
    fn view_queries_select_every_attribute() {
        let runtime = runtime(&PrismConfig::default());
        let query = runtime.view_query("DocumentView", "d").unwrap();
        assert_eq!(query.to_query_string().unwrap(), "SELECT d.id, d.name FROM Document d");
        assert!(runtime.view_query("Missing", "d").is_err());
    }

    #[test]
    fn provider_overrides_apply_over_the_preset() {
        let mut config = PrismConfig::default().provider;
        config.profile = "standard".to_string();
        config.collection_value_function = Some(String::new());
        config.list_parameter_brackets = Some(true);
        let profile = provider_profile(&config).unwrap();
        assert_eq!(profile.collection_value_function, None);
        assert!(profile.list_parameter_brackets);

        config.profile = "toplink".to_string();
        assert!(provider_profile(&config).is_err());
    }

    #[test]
    fn invalid_dialect_is_reported() {
        let mut config = PrismConfig::default();
        config.dialect.kind = "oracle".to_string();
        let result = Runtime::from_config(
            &config,
            EntityMetamodel::from_json(ENTITIES).unwrap(),
            Vec::new(),
            CorrelationProviderRegistry::new(),
        );
        assert!(result.is_err());
    }
}
