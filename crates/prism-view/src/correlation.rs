//! Correlated attribute fetching.
//!
//! A correlation provider joins an entity that has no mapped relation to the
//! view's entity. Providers are looked up by name from a registry built at
//! startup and applied through a [`CorrelationBuilder`] wrapping the query.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use prism_core::{JoinType, Predicate, QueryBuilder, QueryError};
use tracing::debug;

use crate::error::{Result, ViewError};

pub trait CorrelationProvider: Send + Sync + fmt::Debug {
    /// Correlate the target entity against `correlation_expression`, the
    /// basis expression rendered against the query's join base.
    fn apply_correlation(
        &self,
        builder: &mut CorrelationBuilder,
        correlation_expression: &str,
    ) -> Result<()>;
}

/// Query handle given to a correlation provider.
#[derive(Debug)]
pub struct CorrelationBuilder {
    query: QueryBuilder,
    join_base: String,
    correlation_alias: String,
    correlated: Option<String>,
}

impl CorrelationBuilder {
    pub fn new(query: QueryBuilder, join_base: &str, correlation_alias: &str) -> Self {
        Self {
            query,
            join_base: join_base.to_string(),
            correlation_alias: correlation_alias.to_string(),
            correlated: None,
        }
    }

    pub fn query(&self) -> &QueryBuilder {
        &self.query
    }

    pub fn set_query(&mut self, query: QueryBuilder) {
        self.query = query;
    }

    /// Alias the correlated entity is joined under.
    pub fn correlation_alias(&self) -> &str {
        &self.correlation_alias
    }

    pub fn correlated_entity(&self) -> Option<&str> {
        self.correlated.as_deref()
    }

    /// Left-join `entity` as the correlation alias. May be called once.
    pub fn correlate<I, S>(&mut self, entity: &str, on: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: TryInto<Predicate, Error = QueryError>,
    {
        if let Some(existing) = &self.correlated {
            return Err(ViewError::Metamodel(format!(
                "correlation alias `{}` already correlates `{existing}`",
                self.correlation_alias
            )));
        }
        self.query = self.query.join_on(
            &self.join_base,
            entity,
            &self.correlation_alias,
            JoinType::Left,
            on,
        )?;
        self.correlated = Some(entity.to_string());
        Ok(())
    }

    pub fn into_query(self) -> QueryBuilder {
        self.query
    }
}

/// Correlates `entity` by equating its `attribute` with the basis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityCorrelationProvider {
    entity: String,
    attribute: String,
}

impl EntityCorrelationProvider {
    pub fn new(entity: &str, attribute: &str) -> Self {
        Self {
            entity: entity.to_string(),
            attribute: attribute.to_string(),
        }
    }
}

impl CorrelationProvider for EntityCorrelationProvider {
    fn apply_correlation(
        &self,
        builder: &mut CorrelationBuilder,
        correlation_expression: &str,
    ) -> Result<()> {
        let on = format!(
            "{}.{} = {correlation_expression}",
            builder.correlation_alias(),
            self.attribute
        );
        builder.correlate(&self.entity, [on])
    }
}

/// Correlation providers by name.
#[derive(Debug, Clone, Default)]
pub struct CorrelationProviderRegistry {
    providers: BTreeMap<String, Arc<dyn CorrelationProvider>>,
}

impl CorrelationProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, provider: Arc<dyn CorrelationProvider>) -> Result<()> {
        if self.providers.contains_key(name) {
            return Err(ViewError::Metamodel(format!(
                "correlation provider `{name}` is registered twice"
            )));
        }
        self.providers.insert(name.to_string(), provider);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CorrelationProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Applies a correlated attribute mapping to a view query.
#[derive(Clone)]
pub struct ExpressionCorrelationMapper {
    provider_name: String,
    provider: Arc<dyn CorrelationProvider>,
    join_base: String,
    attribute: String,
    basis: String,
    result: String,
    fetches: Vec<String>,
}

impl ExpressionCorrelationMapper {
    pub fn new(
        provider_name: &str,
        provider: Arc<dyn CorrelationProvider>,
        join_base: &str,
        attribute: &str,
        basis: &str,
        result: &str,
        fetches: Vec<String>,
    ) -> Self {
        Self {
            provider_name: provider_name.to_string(),
            provider,
            join_base: join_base.to_string(),
            attribute: attribute.to_string(),
            basis: basis.to_string(),
            result: result.to_string(),
            fetches,
        }
    }

    pub fn with_join_base(mut self, join_base: &str) -> Self {
        self.join_base = join_base.to_string();
        self
    }

    fn correlation_expression(&self) -> String {
        if self.basis.is_empty() {
            self.join_base.clone()
        } else {
            format!("{}.{}", self.join_base, self.basis)
        }
    }

    /// Correlate, fetch and select the correlation result on `query`.
    pub fn apply_mapping(&self, query: &QueryBuilder) -> Result<QueryBuilder> {
        let original_first = query.get_first_result();
        let original_max = query.get_max_results();

        let correlation_alias = query
            .aliases()
            .generate_alias(&format!("corr_{}", self.attribute));
        let mut builder = CorrelationBuilder::new(query.clone(), &self.join_base, &correlation_alias);
        self.provider
            .apply_correlation(&mut builder, &self.correlation_expression())?;
        let mut query = builder.into_query();

        if query.get_first_result() != original_first || query.get_max_results() != original_max {
            return Err(ViewError::CorrelationLimitMisuse(self.provider_name.clone()));
        }

        for fetch in &self.fetches {
            let mut parent = correlation_alias.clone();
            for segment in fetch.split('.') {
                let alias = query.aliases().generate_alias(&format!("{parent}_{segment}"));
                query = query.fetch(&format!("{parent}.{segment}"), &alias, JoinType::Left)?;
                parent = alias;
            }
        }

        let result = if self.result.is_empty() {
            correlation_alias
        } else {
            format!("{correlation_alias}.{}", self.result)
        };
        debug!(attribute = %self.attribute, provider = %self.provider_name, result = %result, "applied correlation");
        Ok(query.select_path(&result, None)?)
    }
}

impl fmt::Debug for ExpressionCorrelationMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionCorrelationMapper")
            .field("provider", &self.provider_name)
            .field("attribute", &self.attribute)
            .field("basis", &self.basis)
            .field("result", &self.result)
            .field("fetches", &self.fetches)
            .finish()
    }
}
