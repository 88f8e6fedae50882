//! Assembles backend requests from model, keys and operation flags

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, warn};

use super::request::{Aggregation, Condition, QueryRequest};
use crate::error::Result;
use crate::keys::{Key, KeySet};
use crate::model::{columns_for, TsdbModel, ENVIRONMENT_COLUMN, ISSUE_COLUMN, TIME_COLUMN};
use crate::resolve::{resolve_partitions, EnvironmentResolver, IssueResolver, PartitionResolver};

/// Everything an operation decides before a request is built
#[derive(Debug, Clone)]
pub struct BuildParams<'a> {
    pub model: TsdbModel,
    pub keys: &'a KeySet,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub rollup: Option<u64>,
    pub environment_id: Option<u64>,
    pub aggregation: Aggregation,
    pub group_on_model: bool,
    pub group_on_time: bool,
}

/// Builds [`QueryRequest`]s, consulting collaborators for environment names,
/// project scope and issue fingerprints.
pub struct QueryBuilder<'a> {
    environments: &'a dyn EnvironmentResolver,
    issues: &'a dyn IssueResolver,
    partitions: &'a dyn PartitionResolver,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(
        environments: &'a dyn EnvironmentResolver,
        issues: &'a dyn IssueResolver,
        partitions: &'a dyn PartitionResolver,
    ) -> Self {
        Self {
            environments,
            issues,
            partitions,
        }
    }

    /// Build the request for `params`, or `None` if the model is unsupported.
    pub async fn build(&self, params: &BuildParams<'_>) -> Result<Option<QueryRequest>> {
        let Some(columns) = columns_for(params.model) else {
            warn!(model = %params.model, "Model not supported by the query backend");
            return Ok(None);
        };

        let normalized = params.keys.normalize();
        let keys_map: Vec<(&str, &[Key])> = [
            (columns.group, normalized.top.as_deref()),
            (columns.aggregate, normalized.second.as_deref()),
        ]
        .into_iter()
        .filter_map(|(column, ids)| Some((column?, ids?)))
        .collect();

        let mut conditions: Vec<Condition> = keys_map
            .iter()
            .map(|(column, ids)| Condition::is_in(column, ids.to_vec()))
            .collect();

        let mut groupby = Vec::new();
        if params.group_on_model {
            if let Some(group) = columns.group {
                groupby.push(group.to_string());
            }
        }
        if params.group_on_time {
            groupby.push(TIME_COLUMN.to_string());
        }

        let mut aggregateby = columns.aggregate.map(str::to_string);
        if params.aggregation == Aggregation::Count {
            // COUNT(column) is answered as COUNT() GROUP BY column.
            if let Some(column) = aggregateby.take() {
                groupby.push(column);
            }
        }

        if let Some(environment_id) = params.environment_id {
            let name = self.environments.name_for(environment_id).await?;
            conditions.push(Condition::equals(ENVIRONMENT_COLUMN, name));
        }

        let project = resolve_partitions(&keys_map, self.partitions).await?;
        if project.is_empty() {
            debug!(model = %params.model, "Query resolved to an empty project scope");
        }

        let references_issues = groupby.iter().any(|c| c == ISSUE_COLUMN)
            || aggregateby.as_deref() == Some(ISSUE_COLUMN)
            || conditions.iter().any(|c| c.column == ISSUE_COLUMN);

        // TODO: narrow the fingerprint map to the issues named in `conditions`;
        // the whole project scope is sent today.
        let issues = if references_issues {
            Some(self.issues.fingerprints_for(&project).await?.into_iter().collect())
        } else {
            None
        };

        let request = QueryRequest {
            from_date: isoformat(&params.start),
            to_date: isoformat(&params.end),
            conditions,
            groupby,
            project: project.into_iter().collect(),
            aggregation: params.aggregation,
            aggregateby,
            granularity: params.rollup,
            issues,
        };

        debug!(
            model = %params.model,
            aggregation = %request.aggregation,
            groupby = ?request.groupby,
            projects = request.project.len(),
            "Built query request"
        );

        Ok(Some(request))
    }
}

fn isoformat(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}
