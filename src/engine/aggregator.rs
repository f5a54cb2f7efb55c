//! Read path: fresh statistics for callers.
//!
//! `record_event` only refreshes the touched variation and the totals.
//! Reads of a live (non-completed) experiment run the full computation,
//! and write it back when anything derived changed, so lift, p-values and
//! the winner always reflect the latest committed event.

use tracing::debug;

use super::ExperimentEngine;
use crate::experiment::{Experiment, ExperimentResults};
use crate::store::{ExperimentFilter, ExperimentStore, OrderBy};
use crate::{stats, Error, Result};

impl<S: ExperimentStore> ExperimentEngine<S> {
    /// Fetch an experiment with up-to-date statistics.
    ///
    /// # Errors
    ///
    /// - [`Error::ExperimentNotFound`] for an unknown id
    /// - storage errors from the backing store
    pub async fn get_experiment(&self, id: &str) -> Result<Experiment> {
        if !self.config.recompute_on_read {
            return self.load(id).await;
        }

        let _guard = self.locks.acquire(id).await;
        let mut experiment = self.load(id).await?;
        if experiment.status().is_terminal() {
            return Ok(experiment);
        }

        let Some(mut fresh) = stats::compute_experiment_results(&experiment) else {
            return Ok(experiment);
        };
        let Some(stored) = experiment.results() else {
            return Ok(experiment);
        };

        let stamp = fresh.last_updated;
        fresh.last_updated = stored.last_updated;
        if &fresh == stored {
            return Ok(experiment);
        }

        fresh.last_updated = stamp;
        experiment.set_results(fresh);
        self.commit(experiment.clone()).await?;
        debug!(experiment_id = %id, "statistics refreshed on read");
        Ok(experiment)
    }

    /// Fetch only the results block of an experiment.
    ///
    /// # Errors
    ///
    /// - [`Error::ExperimentNotFound`] for an unknown id
    /// - [`Error::NotInitialized`] if the record carries no results
    pub async fn get_experiment_results(&self, id: &str) -> Result<ExperimentResults> {
        self.get_experiment(id)
            .await?
            .results()
            .cloned()
            .ok_or_else(|| Error::NotInitialized(id.to_string()))
    }

    /// List stored experiments, newest first.
    ///
    /// Records are returned as stored, without the read-time recomputation
    /// that [`get_experiment`](Self::get_experiment) performs.
    ///
    /// # Errors
    ///
    /// Storage errors from the backing store.
    pub async fn list_experiments(
        &self,
        filter: &ExperimentFilter,
        limit: Option<usize>,
    ) -> Result<Vec<Experiment>> {
        self.with_deadline(self.store.list(filter, OrderBy::CreatedDesc, limit))
            .await
    }

    /// Count stored experiments matching `filter`.
    ///
    /// # Errors
    ///
    /// Storage errors from the backing store.
    pub async fn count_experiments(&self, filter: &ExperimentFilter) -> Result<usize> {
        self.with_deadline(self.store.count(filter)).await
    }
}
