//! Query-tree resolution and SQL generation for Prism

pub mod alias;
pub mod dialect;
pub mod error;
pub mod expression;
pub mod join;
pub mod join_table;
pub mod metamodel;
pub mod provider;
pub mod sql;
pub mod value;

pub use alias::{AliasInfo, AliasManager, SelectInfo};
pub use dialect::{
    CteDefinition, DbmsDialect, DbmsModificationState, DbmsStatementType, DefaultDialect,
    DialectKind, ExtendedSqlRequest, MySqlDialect, PostgresDialect, SetOperationType,
};
pub use error::*;
pub use expression::{
    ArrayExpression, Expression, FunctionExpression, FunctionKind, Literal, ParameterExpression,
    PathExpression, SubqueryExpression,
};
pub use join::{JoinKind, JoinNode, JoinNodeId, JoinTree, JoinTreeNode, JoinType};
pub use join_table::JoinTable;
pub use metamodel::{AttributeModel, CollectionKind, EntityAttribute, EntityMetamodel, EntityType};
pub use provider::{CustomFunctionStyle, JpaProvider, ProviderKind, ProviderProfile};
pub use sql::{
    ClauseType, ExpressionTransformer, FunctionRegistry, Predicate, QueryBuilder, QueryContext,
    QueryGenerator, SizeTransformer, Statement,
};
pub use value::{Value, ValueKind};
