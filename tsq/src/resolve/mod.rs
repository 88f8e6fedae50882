//! External lookups and partition (project) scope resolution
//!
//! The engine never talks to a persistent store directly. Environments,
//! issue fingerprints and entity-to-project ownership come from the
//! collaborator traits defined here.

mod catalog;

pub use catalog::StaticCatalog;

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::Result;
use crate::keys::Key;
use crate::model::PROJECT_COLUMN;

/// Issue id to the fingerprint hashes grouped under it
pub type IssueFingerprints = BTreeMap<Key, Vec<String>>;

/// Resolves an environment id to its name
#[async_trait]
pub trait EnvironmentResolver: Send + Sync {
    /// Fails with [`crate::Error::EnvironmentNotFound`] for unknown ids
    async fn name_for(&self, environment_id: u64) -> Result<String>;
}

/// Resolves the issue definitions of a set of projects
#[async_trait]
pub trait IssueResolver: Send + Sync {
    async fn fingerprints_for(&self, project_ids: &BTreeSet<Key>) -> Result<IssueFingerprints>;
}

/// Maps entity ids in some column back to the projects that own them
#[async_trait]
pub trait PartitionResolver: Send + Sync {
    /// An empty set means no mapping is known for `column`.
    async fn partitions_for(&self, column: &str, ids: &[Key]) -> Result<BTreeSet<Key>>;
}

/// Resolver for backends with no cross-entity knowledge
pub struct NoPartitions;

#[async_trait]
impl PartitionResolver for NoPartitions {
    async fn partitions_for(&self, _column: &str, _ids: &[Key]) -> Result<BTreeSet<Key>> {
        Ok(BTreeSet::new())
    }
}

/// Compute the project scope implied by the filtered columns.
///
/// Each `(column, ids)` pair implies a project set: the ids themselves for
/// the project column, otherwise whatever `resolver` reports. Columns that
/// imply nothing are skipped and the rest are intersected. With no
/// contributing column the scope is empty.
pub async fn resolve_partitions(
    keys_map: &[(&str, &[Key])],
    resolver: &dyn PartitionResolver,
) -> Result<BTreeSet<Key>> {
    let mut scope: Option<BTreeSet<Key>> = None;

    for (column, ids) in keys_map {
        let implied: BTreeSet<Key> = if *column == PROJECT_COLUMN {
            ids.iter().cloned().collect()
        } else {
            resolver.partitions_for(column, ids).await?
        };

        if implied.is_empty() {
            continue;
        }

        scope = Some(match scope {
            Some(current) => current.intersection(&implied).cloned().collect(),
            None => implied,
        });
    }

    Ok(scope.unwrap_or_default())
}
