//! In-memory collaborator backed by a YAML catalog file

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use super::{EnvironmentResolver, IssueFingerprints, IssueResolver, PartitionResolver};
use crate::error::{Error, Result};
use crate::keys::Key;
use crate::model::ISSUE_COLUMN;

/// Static lookup tables for environments, issues and entity ownership.
///
/// ```yaml
/// environments:
///   7: production
/// issues:          # project -> issue -> fingerprint hashes
///   1:
///     101: [a1b2c3, d4e5f6]
/// owners:          # column -> entity id -> owning project
///   release:
///     "1.0.0": 1
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StaticCatalog {
    #[serde(default)]
    pub environments: BTreeMap<u64, String>,
    #[serde(default)]
    pub issues: BTreeMap<Key, BTreeMap<Key, Vec<String>>>,
    #[serde(default)]
    pub owners: BTreeMap<String, BTreeMap<Key, Key>>,
}

impl StaticCatalog {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn with_environment(mut self, id: u64, name: impl Into<String>) -> Self {
        self.environments.insert(id, name.into());
        self
    }

    pub fn with_issue(mut self, project: Key, issue: Key, fingerprints: Vec<String>) -> Self {
        self.issues.entry(project).or_default().insert(issue, fingerprints);
        self
    }

    pub fn with_owner(mut self, column: &str, id: Key, project: Key) -> Self {
        self.owners.entry(column.to_string()).or_default().insert(id, project);
        self
    }

    fn issue_project(&self, issue: &Key) -> Option<&Key> {
        self.issues
            .iter()
            .find(|(_, issues)| issues.contains_key(issue))
            .map(|(project, _)| project)
    }
}

#[async_trait]
impl EnvironmentResolver for StaticCatalog {
    async fn name_for(&self, environment_id: u64) -> Result<String> {
        self.environments
            .get(&environment_id)
            .cloned()
            .ok_or(Error::EnvironmentNotFound(environment_id))
    }
}

#[async_trait]
impl IssueResolver for StaticCatalog {
    async fn fingerprints_for(&self, project_ids: &BTreeSet<Key>) -> Result<IssueFingerprints> {
        let mut result = IssueFingerprints::new();
        for project in project_ids {
            if let Some(issues) = self.issues.get(project) {
                for (issue, hashes) in issues {
                    result
                        .entry(issue.clone())
                        .or_default()
                        .extend(hashes.iter().cloned());
                }
            }
        }
        Ok(result)
    }
}

#[async_trait]
impl PartitionResolver for StaticCatalog {
    async fn partitions_for(&self, column: &str, ids: &[Key]) -> Result<BTreeSet<Key>> {
        let owners = self.owners.get(column);
        let mut projects = BTreeSet::new();
        for id in ids {
            let owner = owners.and_then(|o| o.get(id)).or_else(|| {
                if column == ISSUE_COLUMN {
                    self.issue_project(id)
                } else {
                    None
                }
            });
            if let Some(project) = owner {
                projects.insert(project.clone());
            }
        }
        Ok(projects)
    }
}
