//! Entity views for Prism: view metamodel, dirty tracking and update synthesis

pub mod accessor;
pub mod collection;
pub mod correlation;
pub mod error;
pub mod metamodel;
pub mod proxy;
pub mod tx;
pub mod update;

pub use accessor::{AttributeAccessor, ObjectAttributeAccessor};
pub use collection::{
    CollectionType, ListFactory, MapFactory, PluralCollection, PluralObjectFactory, SetFactory,
    SortedSetFactory,
};
pub use correlation::{
    CorrelationBuilder, CorrelationProvider, CorrelationProviderRegistry,
    EntityCorrelationProvider, ExpressionCorrelationMapper,
};
pub use error::{Result, ViewError};
pub use metamodel::{
    AttributeDescriptor, AttributeMapping, ManagedViewType, MethodAttribute, ViewMetamodel,
    ViewTypeDescriptor,
};
pub use proxy::{DirtySnapshot, ViewInstance};
pub use tx::{TransactionContext, TransactionStatus, TransactionSynchronization};
pub use update::{FullEntityViewUpdater, UpdaterRegistry};
