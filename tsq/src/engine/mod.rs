//! The query engine: request, round trip, validation and nesting
//!
//! Every public operation lives in [`ops`] and performs exactly one backend
//! round trip through [`TsdbEngine::get_data`].

mod ops;

pub use ops::{
    normalize_to_rollup, FrequencySeries, FrequencyTotals, RankedSeries, RankedValues, Series,
    Totals,
};

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::config::{Config, RollupConfig};
use crate::error::Result;
use crate::keys::KeySet;
use crate::model::TsdbModel;
use crate::nest::{nest, Nested};
use crate::query::{Aggregation, BuildParams, QueryBuilder, QueryRequest};
use crate::resolve::{EnvironmentResolver, IssueResolver, PartitionResolver};
use crate::response::{validate_and_scrub, QueryResponse};
use crate::transport::{HttpTransport, Transport};

/// The question shared by every operation
#[derive(Debug, Clone)]
pub struct SeriesQuery {
    pub model: TsdbModel,
    pub keys: KeySet,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Bucket width in seconds
    pub rollup: Option<u64>,
    pub environment_id: Option<u64>,
}

impl SeriesQuery {
    pub fn new(model: TsdbModel, keys: KeySet, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            model,
            keys,
            start,
            end,
            rollup: None,
            environment_id: None,
        }
    }

    pub fn rollup(mut self, seconds: u64) -> Self {
        self.rollup = Some(seconds);
        self
    }

    pub fn environment(mut self, environment_id: u64) -> Self {
        self.environment_id = Some(environment_id);
        self
    }
}

/// The lookups the engine depends on
#[derive(Clone)]
pub struct Resolvers {
    pub environments: Arc<dyn EnvironmentResolver>,
    pub issues: Arc<dyn IssueResolver>,
    pub partitions: Arc<dyn PartitionResolver>,
}

impl Resolvers {
    /// Use one object for all three lookups
    pub fn shared<C>(resolver: Arc<C>) -> Self
    where
        C: EnvironmentResolver + IssueResolver + PartitionResolver + 'static,
    {
        Self {
            environments: resolver.clone(),
            issues: resolver.clone(),
            partitions: resolver,
        }
    }
}

/// Read-only time-series store backed by the query service.
///
/// Holds no per-request state and can be shared across tasks.
pub struct TsdbEngine {
    query_url: String,
    rollups: Vec<RollupConfig>,
    transport: Arc<dyn Transport>,
    resolvers: Resolvers,
}

impl TsdbEngine {
    pub fn new(config: &Config, transport: Arc<dyn Transport>, resolvers: Resolvers) -> Self {
        let mut rollups = config.rollups.clone();
        rollups.sort_by_key(|r| r.seconds);
        Self {
            query_url: config.backend.query_url(),
            rollups,
            transport,
            resolvers,
        }
    }

    /// Engine talking HTTP to the configured backend
    pub fn connect(config: &Config, resolvers: Resolvers) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(&config.backend)?);
        Ok(Self::new(config, transport, resolvers))
    }

    pub fn query_url(&self) -> &str {
        &self.query_url
    }

    /// Configured rollups, finest first
    pub fn get_rollups(&self) -> &[RollupConfig] {
        &self.rollups
    }

    /// The backend can bucket on any granularity, so this is always the
    /// finest configured rollup.
    pub fn get_optimal_rollup(&self, _start: DateTime<Utc>) -> u64 {
        self.rollups
            .first()
            .map(|r| r.seconds)
            .unwrap_or_else(|| Config::default().finest_rollup())
    }

    /// Build the request an operation would send, without sending it.
    pub async fn build_request(
        &self,
        query: &SeriesQuery,
        aggregation: Aggregation,
        group_on_model: bool,
        group_on_time: bool,
    ) -> Result<Option<QueryRequest>> {
        let builder = QueryBuilder::new(
            self.resolvers.environments.as_ref(),
            self.resolvers.issues.as_ref(),
            self.resolvers.partitions.as_ref(),
        );
        let params = BuildParams {
            model: query.model,
            keys: &query.keys,
            start: query.start,
            end: query.end,
            rollup: query.rollup,
            environment_id: query.environment_id,
            aggregation,
            group_on_model,
            group_on_time,
        };
        builder.build(&params).await
    }

    /// Run one query and nest its rows.
    ///
    /// `None` means the model is unsupported. Ungrouped queries with no rows
    /// come back as a null leaf.
    pub async fn get_data(
        &self,
        query: &SeriesQuery,
        aggregation: Aggregation,
        group_on_model: bool,
        group_on_time: bool,
    ) -> Result<Option<Nested>> {
        let Some(request) = self
            .build_request(query, aggregation, group_on_model, group_on_time)
            .await?
        else {
            return Ok(None);
        };

        let body = serde_json::to_value(&request)?;
        let response = self.transport.post(&self.query_url, &body).await?;
        let response = QueryResponse::from_value(response)?;
        let rows = validate_and_scrub(response, &request.groupby)?;
        debug!(rows = rows.len(), "Query returned");

        let nested = nest(rows, &request.groupby)?;
        Ok(Some(nested.unwrap_or(Nested::Leaf(Value::Null))))
    }
}
