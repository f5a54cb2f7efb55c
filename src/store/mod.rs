//! Experiment storage contract
//!
//! The engine never owns its records; it goes through an injected
//! [`ExperimentStore`]. Two backends ship with the crate:
//!
//! - [`MemoryExperimentStore`]: concurrent hashmap, data lost on restart
//! - [`JsonFileStore`]: one JSON document per experiment in a directory
//!
//! # Example
//!
//! ```rust
//! use ab_engine::experiment::{ExperimentConfig, Variation};
//! use ab_engine::store::{ExperimentFilter, ExperimentStore, MemoryExperimentStore, OrderBy};
//!
//! # async fn example() -> ab_engine::Result<()> {
//! let store = MemoryExperimentStore::new();
//! let (experiment, _) = ExperimentConfig::builder("exp-1", "CTA", "page-1")
//!     .variation(Variation::builder("a", "c-1", 50.0).control().build())
//!     .variation(Variation::new("b", "c-2", 50.0))
//!     .build()
//!     .validate()?;
//!
//! store.put(experiment).await?;
//! assert!(store.get("exp-1").await?.is_some());
//! assert_eq!(store.count(&ExperimentFilter::default()).await?, 1);
//!
//! let listed = store.list(&ExperimentFilter::default(), OrderBy::Name, Some(10)).await?;
//! assert_eq!(listed.len(), 1);
//! # Ok(())
//! # }
//! ```

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryExperimentStore;

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::experiment::{Experiment, ExperimentResults, ExperimentStatus, Metric, StatusChange};
use crate::{Error, Result};

/// Partial update of an experiment record. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExperimentPatch {
    /// New name
    pub name: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New status
    pub status: Option<ExperimentStatus>,
    /// New overall traffic share
    pub traffic_allocation: Option<f64>,
    /// New goal list
    pub metrics: Option<Vec<Metric>>,
    /// New start date
    pub start_date: Option<DateTime<Utc>>,
    /// New end date
    pub end_date: Option<DateTime<Utc>>,
    /// Replacement results block
    pub results: Option<ExperimentResults>,
    /// Replacement audit trail
    pub status_history: Option<Vec<StatusChange>>,
}

/// Predicate for `list` and `count`. Empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExperimentFilter {
    /// Only experiments in this status
    pub status: Option<ExperimentStatus>,
    /// Only experiments whose base content or any variation content matches
    pub content_id: Option<String>,
}

impl ExperimentFilter {
    /// Filter on status.
    #[must_use]
    pub const fn with_status(mut self, status: ExperimentStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Filter on referenced content.
    #[must_use]
    pub fn with_content_id(mut self, content_id: impl Into<String>) -> Self {
        self.content_id = Some(content_id.into());
        self
    }

    /// Whether `experiment` satisfies every set predicate.
    #[must_use]
    pub fn matches(&self, experiment: &Experiment) -> bool {
        self.status.map_or(true, |s| experiment.status() == s)
            && self
                .content_id
                .as_deref()
                .map_or(true, |c| experiment.references_content(c))
    }
}

/// Result ordering for `list`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderBy {
    /// Oldest first
    CreatedAsc,
    /// Newest first (default)
    #[default]
    CreatedDesc,
    /// Alphabetical by name, then id
    Name,
}

/// Sort `experiments` by `order` and truncate to `limit`.
pub(crate) fn sort_and_limit(
    mut experiments: Vec<Experiment>,
    order: OrderBy,
    limit: Option<usize>,
) -> Vec<Experiment> {
    match order {
        OrderBy::CreatedAsc => experiments.sort_by(|a, b| {
            a.created_date()
                .cmp(&b.created_date())
                .then_with(|| a.id().cmp(b.id()))
        }),
        OrderBy::CreatedDesc => experiments.sort_by(|a, b| {
            b.created_date()
                .cmp(&a.created_date())
                .then_with(|| a.id().cmp(b.id()))
        }),
        OrderBy::Name => {
            experiments.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.id().cmp(b.id())));
        }
    }
    if let Some(limit) = limit {
        experiments.truncate(limit);
    }
    experiments
}

/// Keyed storage of experiment records.
///
/// Implementations must make `put` atomic per record: a concurrent `get`
/// observes either the previous record or the new one, never a mix. The
/// engine relies on this to publish counters and their derived statistics
/// together.
pub trait ExperimentStore: Send + Sync {
    /// Get an experiment by id. Returns `None` if it doesn't exist.
    fn get(&self, id: &str) -> impl Future<Output = Result<Option<Experiment>>> + Send;

    /// Insert or replace a record, keyed by its id.
    fn put(&self, experiment: Experiment) -> impl Future<Output = Result<()>> + Send;

    /// Remove a record. Returns whether anything was removed.
    fn delete(&self, id: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Records matching `filter`, ordered, at most `limit` of them.
    fn list(
        &self,
        filter: &ExperimentFilter,
        order: OrderBy,
        limit: Option<usize>,
    ) -> impl Future<Output = Result<Vec<Experiment>>> + Send;

    /// Merge `patch` into the stored record and return the result.
    ///
    /// The default reads, patches and writes back; backends with an
    /// in-place update should override it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExperimentNotFound`] for an unknown id.
    fn update(
        &self,
        id: &str,
        patch: ExperimentPatch,
    ) -> impl Future<Output = Result<Experiment>> + Send {
        async move {
            let mut experiment = self
                .get(id)
                .await?
                .ok_or_else(|| Error::ExperimentNotFound(id.to_string()))?;
            experiment.apply_patch(patch);
            self.put(experiment.clone()).await?;
            Ok(experiment)
        }
    }

    /// Number of records matching `filter`.
    fn count(&self, filter: &ExperimentFilter) -> impl Future<Output = Result<usize>> + Send {
        async move { Ok(self.list(filter, OrderBy::default(), None).await?.len()) }
    }
}
