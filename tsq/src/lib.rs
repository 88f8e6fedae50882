//! Time-series queries answered by an HTTP analytic query backend
//!
//! `tsq` translates a generic time-series question (a model, a set of keys,
//! a time range and an aggregation) into the column-oriented request the
//! backend understands, sends it, and folds the flat rows it gets back into
//! a result keyed by each grouping level.
//!
//! # Pipeline
//!
//! 1. [`model`] maps a [`TsdbModel`] onto its group-by and aggregate columns
//! 2. [`keys`] flattens caller keys into filter values
//! 3. [`resolve`] works out which projects the query must be scoped to
//! 4. [`query`] assembles the [`QueryRequest`]
//! 5. [`transport`] posts it to the backend
//! 6. [`response`] validates and scrubs the returned rows
//! 7. [`nest`] re-nests the rows into a [`Nested`] tree
//! 8. [`engine`] reshapes the tree per operation
//!
//! The engine is read-only. Data is assumed to be materialized in the
//! backend already.

pub mod config;
pub mod engine;
pub mod error;
pub mod keys;
pub mod model;
pub mod nest;
pub mod query;
pub mod resolve;
pub mod response;
pub mod transport;

pub use config::Config;
pub use engine::{SeriesQuery, TsdbEngine};
pub use error::{Error, Result};
pub use keys::{Key, KeySet, NormalizedKeys};
pub use model::{ColumnPair, TsdbModel};
pub use nest::Nested;
pub use query::{Aggregation, Condition, QueryRequest};
pub use resolve::{EnvironmentResolver, IssueResolver, PartitionResolver, StaticCatalog};
pub use transport::{HttpTransport, Transport};
