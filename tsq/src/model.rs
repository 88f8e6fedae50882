//! Model registry: which backend columns answer questions about a model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Column names with special meaning to the engine
pub const PROJECT_COLUMN: &str = "project_id";
pub const ISSUE_COLUMN: &str = "issue";
pub const TIME_COLUMN: &str = "time";
pub const ENVIRONMENT_COLUMN: &str = "environment";
pub const AGGREGATE_COLUMN: &str = "aggregate";

/// What a time series describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TsdbModel {
    Project,
    Group,
    Release,
    UsersAffectedByGroup,
    UsersAffectedByProject,
    FrequentEnvironmentsByGroup,
    FrequentReleasesByGroup,
    FrequentIssuesByProject,
    // Outcome counters kept by other stores; the backend has no columns for them.
    ProjectTotalReceived,
    ProjectTotalRejected,
    OrganizationTotalReceived,
    KeyTotalReceived,
}

impl TsdbModel {
    pub const ALL: [TsdbModel; 12] = [
        TsdbModel::Project,
        TsdbModel::Group,
        TsdbModel::Release,
        TsdbModel::UsersAffectedByGroup,
        TsdbModel::UsersAffectedByProject,
        TsdbModel::FrequentEnvironmentsByGroup,
        TsdbModel::FrequentReleasesByGroup,
        TsdbModel::FrequentIssuesByProject,
        TsdbModel::ProjectTotalReceived,
        TsdbModel::ProjectTotalRejected,
        TsdbModel::OrganizationTotalReceived,
        TsdbModel::KeyTotalReceived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TsdbModel::Project => "project",
            TsdbModel::Group => "group",
            TsdbModel::Release => "release",
            TsdbModel::UsersAffectedByGroup => "users_affected_by_group",
            TsdbModel::UsersAffectedByProject => "users_affected_by_project",
            TsdbModel::FrequentEnvironmentsByGroup => "frequent_environments_by_group",
            TsdbModel::FrequentReleasesByGroup => "frequent_releases_by_group",
            TsdbModel::FrequentIssuesByProject => "frequent_issues_by_project",
            TsdbModel::ProjectTotalReceived => "project_total_received",
            TsdbModel::ProjectTotalRejected => "project_total_rejected",
            TsdbModel::OrganizationTotalReceived => "organization_total_received",
            TsdbModel::KeyTotalReceived => "key_total_received",
        }
    }

    /// Backend columns for this model, `None` if the backend cannot answer it
    pub fn columns(&self) -> Option<ColumnPair> {
        let pair = match self {
            TsdbModel::Project => ColumnPair::new(Some(PROJECT_COLUMN), None),
            TsdbModel::Group => ColumnPair::new(Some(ISSUE_COLUMN), None),
            TsdbModel::Release => ColumnPair::new(Some("release"), None),
            TsdbModel::UsersAffectedByGroup => ColumnPair::new(Some(ISSUE_COLUMN), Some("user_id")),
            TsdbModel::UsersAffectedByProject => {
                ColumnPair::new(Some(PROJECT_COLUMN), Some("user_id"))
            }
            TsdbModel::FrequentEnvironmentsByGroup => {
                ColumnPair::new(Some(ISSUE_COLUMN), Some(ENVIRONMENT_COLUMN))
            }
            TsdbModel::FrequentReleasesByGroup => {
                ColumnPair::new(Some(ISSUE_COLUMN), Some("release"))
            }
            TsdbModel::FrequentIssuesByProject => {
                ColumnPair::new(Some(PROJECT_COLUMN), Some(ISSUE_COLUMN))
            }
            TsdbModel::ProjectTotalReceived
            | TsdbModel::ProjectTotalRejected
            | TsdbModel::OrganizationTotalReceived
            | TsdbModel::KeyTotalReceived => return None,
        };
        Some(pair)
    }
}

impl fmt::Display for TsdbModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TsdbModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TsdbModel::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| format!("unknown model '{}'", s))
    }
}

/// `(group_column, aggregate_column)` for a model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnPair {
    pub group: Option<&'static str>,
    pub aggregate: Option<&'static str>,
}

impl ColumnPair {
    const fn new(group: Option<&'static str>, aggregate: Option<&'static str>) -> Self {
        Self { group, aggregate }
    }
}

/// Registry lookup. `None` means the model is unsupported and callers should
/// return an empty result rather than fail.
pub fn columns_for(model: TsdbModel) -> Option<ColumnPair> {
    model.columns()
}
