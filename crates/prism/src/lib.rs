//! `prism`: convenience façade over `prism-core`, `prism-view` and `prism-shared`.

#![deny(missing_docs)]

/// Re-export everything from prism-core at the crate root, so users can `use prism::*;`.
#[doc(inline)]
pub use prism_core::*;

/// Query-tree and SQL generation core as a nested module.
pub use prism_core as core;

/// Entity views: metamodel, dirty tracking and updaters.
pub use prism_view as view;

/// Configuration and observability.
pub use prism_shared as shared;

pub use prism_shared::{ObservabilitySystem, PrismConfig};
pub use prism_view::{
    CorrelationProviderRegistry, TransactionContext, ViewError, ViewInstance, ViewMetamodel,
    ViewTypeDescriptor,
};

mod runtime;

pub use runtime::{provider_profile, Runtime};
