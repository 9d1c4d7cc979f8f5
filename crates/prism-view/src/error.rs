//! Error types for Prism entity views

use prism_core::QueryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ViewError {
    #[error("Transaction is not active!")]
    TransactionNotActive,

    #[error("Update did not work! Expected to update {expected} row but was: {actual}")]
    UnexpectedRowCount { expected: u64, actual: u64 },

    #[error(
        "Correlation provider `{0}` wrongly uses first result or max results on the query builder"
    )]
    CorrelationLimitMisuse(String),

    #[error("{message}")]
    Access {
        message: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("View metamodel error: {0}")]
    Metamodel(String),

    #[error("Unknown attribute `{attribute}` on view `{view}`")]
    UnknownAttribute { view: String, attribute: String },

    #[error("Attribute `{attribute}` on view `{view}` is not updatable")]
    NotUpdatable { view: String, attribute: String },

    #[error("Transaction collaborator failed: {0}")]
    Provider(#[source] anyhow::Error),

    #[error(transparent)]
    Query(#[from] QueryError),
}

impl ViewError {
    pub(crate) fn access(message: impl Into<String>, source: anyhow::Error) -> Self {
        ViewError::Access {
            message: message.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ViewError>;
