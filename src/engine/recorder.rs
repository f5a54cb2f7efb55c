//! Outcome event ingestion.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ExperimentEngine, ExperimentEvent};
use crate::experiment::{Experiment, ExperimentResults, VariationResult};
use crate::store::ExperimentStore;
use crate::{stats, Error, Result};

/// Kind of outcome attributed to a variation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A visitor was exposed to the variation.
    Visitor,
    /// An exposed visitor converted.
    Conversion,
    /// Revenue attributed to the variation; carries a value.
    Revenue,
}

/// One event in a batch passed to [`ExperimentEngine::record_events`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeEvent {
    /// Variation the event is attributed to
    pub variation_id: String,
    /// Kind of outcome
    pub kind: EventKind,
    /// Amount for revenue events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl OutcomeEvent {
    /// A visitor exposure.
    #[must_use]
    pub fn visitor(variation_id: impl Into<String>) -> Self {
        Self {
            variation_id: variation_id.into(),
            kind: EventKind::Visitor,
            value: None,
        }
    }

    /// A conversion.
    #[must_use]
    pub fn conversion(variation_id: impl Into<String>) -> Self {
        Self {
            variation_id: variation_id.into(),
            kind: EventKind::Conversion,
            value: None,
        }
    }

    /// A revenue amount.
    #[must_use]
    pub fn revenue(variation_id: impl Into<String>, amount: f64) -> Self {
        Self {
            variation_id: variation_id.into(),
            kind: EventKind::Revenue,
            value: Some(amount),
        }
    }
}

/// Revenue must be a finite, non-negative amount; other kinds ignore it.
fn checked_value(kind: EventKind, value: Option<f64>) -> Result<f64> {
    match kind {
        EventKind::Visitor | EventKind::Conversion => Ok(0.0),
        EventKind::Revenue => match value {
            Some(v) if v.is_finite() && v >= 0.0 => Ok(v),
            Some(v) => Err(Error::Validation(format!(
                "revenue must be a non-negative number, got {v}"
            ))),
            None => Err(Error::Validation("revenue event requires a value".into())),
        },
    }
}

/// Apply one event to its variation and refresh that variation's rate and
/// interval. Totals are left to the caller.
fn apply(
    results: &mut ExperimentResults,
    experiment_id: &str,
    variation_id: &str,
    kind: EventKind,
    amount: f64,
) -> Result<()> {
    let result = results
        .variation_mut(variation_id)
        .ok_or_else(|| Error::NotInitialized(experiment_id.to_string()))?;
    match kind {
        EventKind::Visitor => result.visitors = result.visitors.saturating_add(1),
        EventKind::Conversion => result.conversions = result.conversions.saturating_add(1),
        EventKind::Revenue => result.revenue = Some(result.revenue.unwrap_or(0.0) + amount),
    }
    stats::refresh_variation(result);
    Ok(())
}

/// Every variation must have at least as many visitors as conversions once
/// the pending events are applied.
fn ensure_conversions_covered(results: &ExperimentResults, experiment_id: &str) -> Result<()> {
    match results
        .variation_results
        .iter()
        .find(|r| r.conversions > r.visitors)
    {
        Some(r) => Err(Error::Validation(format!(
            "variation '{}' of experiment '{experiment_id}' would have {} conversions for {} visitors",
            r.variation_id, r.conversions, r.visitors
        ))),
        None => Ok(()),
    }
}

fn ensure_recordable(experiment: &Experiment, variation_id: &str) -> Result<()> {
    if experiment.status().is_terminal() {
        return Err(Error::InvalidState {
            experiment_id: experiment.id().to_string(),
            status: experiment.status(),
            operation: "record events for",
        });
    }
    if experiment.variation(variation_id).is_none() {
        return Err(Error::VariationNotFound {
            experiment_id: experiment.id().to_string(),
            variation_id: variation_id.to_string(),
        });
    }
    Ok(())
}

impl<S: ExperimentStore> ExperimentEngine<S> {
    /// Record one outcome event and return the variation's updated numbers.
    ///
    /// Visitor and conversion events add one to their counter; revenue
    /// events add `value`. The variation's rate and interval and the
    /// experiment totals are recomputed and committed together under the
    /// experiment's lock, so concurrent calls never lose an increment.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] for a missing, negative or non-finite revenue
    ///   value, or a conversion with no visitor left to attribute it to
    /// - [`Error::ExperimentNotFound`] / [`Error::VariationNotFound`] for unknown ids
    /// - [`Error::InvalidState`] once the experiment is completed
    /// - [`Error::NotInitialized`] if the record carries no results
    pub async fn record_event(
        &self,
        experiment_id: &str,
        variation_id: &str,
        kind: EventKind,
        value: Option<f64>,
    ) -> Result<VariationResult> {
        let amount = checked_value(kind, value)?;

        let _guard = self.locks.acquire(experiment_id).await;
        let mut experiment = self.load(experiment_id).await?;
        ensure_recordable(&experiment, variation_id)?;

        let results = experiment
            .results_mut()
            .ok_or_else(|| Error::NotInitialized(experiment_id.to_string()))?;
        apply(results, experiment_id, variation_id, kind, amount)?;
        ensure_conversions_covered(results, experiment_id)?;
        stats::refresh_totals(results);
        results.last_updated = Utc::now();

        let updated = results
            .variation(variation_id)
            .cloned()
            .ok_or_else(|| Error::NotInitialized(experiment_id.to_string()))?;
        self.commit(experiment).await?;

        debug!(
            experiment_id,
            variation_id,
            event = ?kind,
            visitors = updated.visitors,
            conversions = updated.conversions,
            "outcome recorded"
        );
        self.notifier.publish(ExperimentEvent::EventRecorded {
            experiment_id: experiment_id.to_string(),
            variation_id: variation_id.to_string(),
            event: kind,
        });
        Ok(updated)
    }

    /// Record a batch of events with a single commit.
    ///
    /// The whole batch is validated before anything is applied; one bad
    /// event rejects the batch. Conversions are checked against visitors
    /// after the whole batch, so a batch may list a conversion before the
    /// visitor it belongs to.
    ///
    /// # Errors
    ///
    /// Same as [`record_event`](Self::record_event), for any event in the batch.
    pub async fn record_events(
        &self,
        experiment_id: &str,
        events: &[OutcomeEvent],
    ) -> Result<ExperimentResults> {
        let amounts = events
            .iter()
            .map(|e| checked_value(e.kind, e.value))
            .collect::<Result<Vec<_>>>()?;

        let _guard = self.locks.acquire(experiment_id).await;
        let mut experiment = self.load(experiment_id).await?;
        for event in events {
            ensure_recordable(&experiment, &event.variation_id)?;
        }

        let results = experiment
            .results_mut()
            .ok_or_else(|| Error::NotInitialized(experiment_id.to_string()))?;
        for (event, amount) in events.iter().zip(amounts) {
            apply(results, experiment_id, &event.variation_id, event.kind, amount)?;
        }
        ensure_conversions_covered(results, experiment_id)?;
        stats::refresh_totals(results);
        results.last_updated = Utc::now();

        let snapshot = results.clone();
        self.commit(experiment).await?;

        debug!(experiment_id, events = events.len(), "outcome batch recorded");
        for event in events {
            self.notifier.publish(ExperimentEvent::EventRecorded {
                experiment_id: experiment_id.to_string(),
                variation_id: event.variation_id.clone(),
                event: event.kind,
            });
        }
        Ok(snapshot)
    }
}
