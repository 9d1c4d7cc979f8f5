//! Error types for Prism core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Unknown function [{0}] is used!")]
    UnknownFunction(String),

    #[error("Unsatisfied parameter: {0}")]
    UnsatisfiedParameter(String),

    #[error("Unsupported statement type: {0}")]
    UnsupportedStatementType(String),

    #[error("Alias `{0}` is already registered in this query scope")]
    DuplicateAlias(String),

    #[error("Unknown alias `{0}`")]
    UnknownAlias(String),

    #[error("Join node #{0} does not exist in the join tree")]
    UnknownJoinNode(usize),

    #[error("Array expression `{0}` must be resolved to a join before generation")]
    UnresolvedArray(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Invalid predicate: {0}")]
    InvalidPredicate(String),

    #[error("Metamodel error: {0}")]
    Metamodel(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, QueryError>;

