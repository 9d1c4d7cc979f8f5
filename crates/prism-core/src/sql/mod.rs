pub mod generator;
pub mod helpers;
mod predicate;
pub mod query;
pub mod size;

pub use generator::{FunctionRegistry, QueryGenerator};
pub use predicate::Predicate;
pub use query::{QueryBuilder, QueryContext, Statement};
pub use size::{ClauseType, ExpressionTransformer, SizeTransformer};
