//! Query request types and the request builder

mod builder;
mod request;

pub use builder::{BuildParams, QueryBuilder};
pub use request::{Aggregation, Condition, ConditionValue, Operator, QueryRequest};
