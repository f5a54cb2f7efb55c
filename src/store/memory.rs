//! In-memory experiment store using `DashMap`.
//!
//! Default backend for tests and single-process deployments; data is lost
//! on process restart.

use dashmap::DashMap;

use super::{sort_and_limit, ExperimentFilter, ExperimentPatch, ExperimentStore, OrderBy};
use crate::experiment::Experiment;
use crate::{Error, Result};

/// In-memory experiment store backed by a concurrent hashmap.
///
/// Records are stored and returned by value, so a caller holding a record
/// never observes later writes.
///
/// # Example
///
/// ```rust
/// use ab_engine::store::{ExperimentStore, MemoryExperimentStore};
///
/// # async fn example() -> ab_engine::Result<()> {
/// let store = MemoryExperimentStore::new();
/// assert!(store.get("missing").await?.is_none());
/// assert!(store.is_empty());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MemoryExperimentStore {
    experiments: DashMap<String, Experiment>,
}

impl MemoryExperimentStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            experiments: DashMap::new(),
        }
    }

    /// Create with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            experiments: DashMap::with_capacity(capacity),
        }
    }

    /// Get the number of stored experiments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.experiments.len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
    }

    /// Remove every record.
    pub fn clear(&self) {
        self.experiments.clear();
    }
}

impl Default for MemoryExperimentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ExperimentStore for MemoryExperimentStore {
    async fn get(&self, id: &str) -> Result<Option<Experiment>> {
        Ok(self.experiments.get(id).map(|e| e.value().clone()))
    }

    async fn put(&self, experiment: Experiment) -> Result<()> {
        self.experiments
            .insert(experiment.id().to_string(), experiment);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.experiments.remove(id).is_some())
    }

    async fn list(
        &self,
        filter: &ExperimentFilter,
        order: OrderBy,
        limit: Option<usize>,
    ) -> Result<Vec<Experiment>> {
        let matching = self
            .experiments
            .iter()
            .filter(|e| filter.matches(e.value()))
            .map(|e| e.value().clone())
            .collect();
        Ok(sort_and_limit(matching, order, limit))
    }

    async fn update(&self, id: &str, patch: ExperimentPatch) -> Result<Experiment> {
        let mut entry = self
            .experiments
            .get_mut(id)
            .ok_or_else(|| Error::ExperimentNotFound(id.to_string()))?;
        entry.apply_patch(patch);
        Ok(entry.value().clone())
    }

    async fn count(&self, filter: &ExperimentFilter) -> Result<usize> {
        Ok(self
            .experiments
            .iter()
            .filter(|e| filter.matches(e.value()))
            .count())
    }
}
