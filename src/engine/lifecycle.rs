//! Experiment lifecycle: creation, state transitions, updates, deletion.

use tracing::{info, warn};

use super::{ExperimentEngine, ExperimentEvent, Outcome};
use crate::experiment::{
    Experiment, ExperimentConfig, ExperimentStatus, ExperimentUpdate, Warning,
};
use crate::store::ExperimentStore;
use crate::{stats, Error, Result};

fn invalid_state(experiment: &Experiment, operation: &'static str) -> Error {
    Error::InvalidState {
        experiment_id: experiment.id().to_string(),
        status: experiment.status(),
        operation,
    }
}

impl<S: ExperimentStore> ExperimentEngine<S> {
    /// Validate `config` and persist a new experiment.
    ///
    /// The experiment starts in `draft`, or `running` when the config asks
    /// to start immediately. Results are initialized to zero for every
    /// variation.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] for a malformed config or an id already in use;
    ///   nothing is written
    /// - storage errors from the backing store
    pub async fn create_experiment(&self, config: ExperimentConfig) -> Result<Outcome<Experiment>> {
        let (experiment, warnings) = config.validate()?;
        let id = experiment.id().to_string();

        let _guard = self.locks.acquire(&id).await;
        if self.with_deadline(self.store.get(&id)).await?.is_some() {
            return Err(Error::Validation(format!("experiment id '{id}' already exists")));
        }
        self.commit(experiment.clone()).await?;

        info!(
            experiment_id = %id,
            status = %experiment.status(),
            variations = experiment.variations().len(),
            "experiment created"
        );
        for warning in &warnings {
            warn!(experiment_id = %id, %warning, "experiment created with warning");
        }

        self.notifier.publish(ExperimentEvent::Created {
            experiment_id: id.clone(),
        });
        if experiment.status() == ExperimentStatus::Running {
            self.notifier
                .publish(ExperimentEvent::Started { experiment_id: id });
        }

        Ok(Outcome {
            value: experiment,
            warnings,
        })
    }

    /// Move a draft or paused experiment to `running` and stamp its start.
    ///
    /// # Errors
    ///
    /// - [`Error::ExperimentNotFound`] for an unknown id
    /// - [`Error::InvalidState`] if already running or completed
    pub async fn start_experiment(&self, id: &str) -> Result<Experiment> {
        let _guard = self.locks.acquire(id).await;
        let mut experiment = self.load(id).await?;

        match experiment.status() {
            ExperimentStatus::Running | ExperimentStatus::Completed => {
                return Err(invalid_state(&experiment, "start"));
            }
            ExperimentStatus::Draft | ExperimentStatus::Paused => {}
        }

        experiment.transition(ExperimentStatus::Running, None);
        self.commit(experiment.clone()).await?;

        info!(experiment_id = %id, "experiment started");
        self.notifier.publish(ExperimentEvent::Started {
            experiment_id: id.to_string(),
        });
        Ok(experiment)
    }

    /// Pause a non-terminal experiment, recording `reason` in its history.
    ///
    /// # Errors
    ///
    /// - [`Error::ExperimentNotFound`] for an unknown id
    /// - [`Error::InvalidState`] if the experiment is completed
    pub async fn stop_experiment(&self, id: &str, reason: Option<&str>) -> Result<Experiment> {
        let _guard = self.locks.acquire(id).await;
        let mut experiment = self.load(id).await?;

        if experiment.status().is_terminal() {
            return Err(invalid_state(&experiment, "stop"));
        }

        let reason = reason.map(str::to_string);
        experiment.transition(ExperimentStatus::Paused, reason.clone());
        self.commit(experiment.clone()).await?;

        info!(experiment_id = %id, reason = reason.as_deref().unwrap_or(""), "experiment stopped");
        self.notifier.publish(ExperimentEvent::Stopped {
            experiment_id: id.to_string(),
            reason,
        });
        Ok(experiment)
    }

    /// Finalize a running or paused experiment.
    ///
    /// Statistics are recomputed from the counters. When
    /// `winning_variation` is given it overrides the computed winner.
    /// A [`Warning::NotSignificant`] is attached when no variation reached
    /// significance.
    ///
    /// # Errors
    ///
    /// - [`Error::ExperimentNotFound`] for an unknown id
    /// - [`Error::VariationNotFound`] if `winning_variation` is not part of it
    /// - [`Error::InvalidState`] for draft or completed experiments
    /// - [`Error::NotInitialized`] if the record carries no results
    pub async fn complete_experiment(
        &self,
        id: &str,
        winning_variation: Option<&str>,
    ) -> Result<Outcome<Experiment>> {
        let _guard = self.locks.acquire(id).await;
        let mut experiment = self.load(id).await?;

        match experiment.status() {
            ExperimentStatus::Running | ExperimentStatus::Paused => {}
            ExperimentStatus::Draft | ExperimentStatus::Completed => {
                return Err(invalid_state(&experiment, "complete"));
            }
        }
        if let Some(winner) = winning_variation {
            if experiment.variation(winner).is_none() {
                return Err(Error::VariationNotFound {
                    experiment_id: id.to_string(),
                    variation_id: winner.to_string(),
                });
            }
        }

        let mut results = stats::compute_experiment_results(&experiment)
            .ok_or_else(|| Error::NotInitialized(id.to_string()))?;
        if let Some(winner) = winning_variation {
            results.winning_variation = Some(winner.to_string());
        }

        let mut warnings = Vec::new();
        if !results.statistical_significance {
            warn!(experiment_id = %id, "completing experiment without a significant result");
            warnings.push(Warning::NotSignificant);
        }

        let winner = results.winning_variation.clone();
        experiment.set_results(results);
        experiment.transition(ExperimentStatus::Completed, None);
        self.commit(experiment.clone()).await?;

        info!(
            experiment_id = %id,
            winning_variation = winner.as_deref().unwrap_or("none"),
            "experiment completed"
        );
        self.notifier.publish(ExperimentEvent::Completed {
            experiment_id: id.to_string(),
            winning_variation: winner,
        });
        Ok(Outcome {
            value: experiment,
            warnings,
        })
    }

    /// Change name, description, traffic allocation, end date or metrics.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] for a blank name or allocation outside 0-100
    /// - [`Error::ExperimentNotFound`] for an unknown id
    /// - [`Error::InvalidState`] while running or once completed
    pub async fn update_experiment(&self, id: &str, update: ExperimentUpdate) -> Result<Experiment> {
        let patch = update.into_patch()?;

        let _guard = self.locks.acquire(id).await;
        let experiment = self.load(id).await?;
        match experiment.status() {
            ExperimentStatus::Running | ExperimentStatus::Completed => {
                return Err(invalid_state(&experiment, "update"));
            }
            ExperimentStatus::Draft | ExperimentStatus::Paused => {}
        }

        let updated = self.with_deadline(self.store.update(id, patch)).await?;

        info!(experiment_id = %id, "experiment updated");
        self.notifier.publish(ExperimentEvent::Updated {
            experiment_id: id.to_string(),
        });
        Ok(updated)
    }

    /// Remove an experiment. A running experiment requires `force`.
    ///
    /// # Errors
    ///
    /// - [`Error::ExperimentNotFound`] for an unknown id
    /// - [`Error::InvalidState`] for a running experiment without `force`
    pub async fn delete_experiment(&self, id: &str, force: bool) -> Result<()> {
        let guard = self.locks.acquire(id).await;
        let experiment = self.load(id).await?;

        if experiment.status() == ExperimentStatus::Running && !force {
            return Err(invalid_state(&experiment, "delete"));
        }

        self.with_deadline(self.store.delete(id)).await?;
        self.locks.release(id);
        drop(guard);

        info!(experiment_id = %id, force, "experiment deleted");
        self.notifier.publish(ExperimentEvent::Deleted {
            experiment_id: id.to_string(),
        });
        Ok(())
    }
}
