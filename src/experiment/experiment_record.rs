//! Experiment - root entity of the A/B testing schema

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ExperimentResults, Variation};
use crate::store::ExperimentPatch;

/// Lifecycle state of an experiment.
///
/// ```text
/// draft ──start──> running ──stop──> paused
///                    ^  │              │
///                    └──┼────start─────┘
///                       └──complete──> completed (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentStatus {
    /// Configured but not yet collecting traffic.
    Draft,
    /// Collecting traffic.
    Running,
    /// Temporarily halted.
    Paused,
    /// Finished; results are final.
    Completed,
}

impl ExperimentStatus {
    /// Lowercase name as it appears in serialized records.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }

    /// `completed` admits no further transitions.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named goal tracked by the experiment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Metric {
    /// Goal name, e.g. `"signup"`
    pub name: String,
    /// Optional free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Metric {
    /// Create a metric with just a name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }
}

/// Audit entry for a status transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusChange {
    /// Status before the transition
    pub from: ExperimentStatus,
    /// Status after the transition
    pub to: ExperimentStatus,
    /// When the transition happened
    pub at: DateTime<Utc>,
    /// Caller-supplied reason, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A controlled experiment comparing two or more variations.
///
/// Instances are produced by validating an [`ExperimentConfig`](super::ExperimentConfig);
/// once created, `results` is always present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Experiment {
    id: String,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    status: ExperimentStatus,
    base_content_id: String,
    variations: Vec<Variation>,
    traffic_allocation: f64,
    #[serde(default)]
    metrics: Vec<Metric>,
    start_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end_date: Option<DateTime<Utc>>,
    created_date: DateTime<Utc>,
    #[serde(default)]
    results: Option<ExperimentResults>,
    #[serde(default)]
    status_history: Vec<StatusChange>,
}

impl Experiment {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn assemble(
        id: String,
        name: String,
        description: Option<String>,
        status: ExperimentStatus,
        base_content_id: String,
        variations: Vec<Variation>,
        traffic_allocation: f64,
        metrics: Vec<Metric>,
        end_date: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        let results = ExperimentResults::initialize(&variations);
        Self {
            id,
            name,
            description,
            status,
            base_content_id,
            variations,
            traffic_allocation,
            metrics,
            start_date: now,
            end_date,
            created_date: now,
            results: Some(results),
            status_history: Vec::new(),
        }
    }

    /// Get the experiment ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the experiment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the description, if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Get the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> ExperimentStatus {
        self.status
    }

    /// Get the opaque reference to the content under test.
    #[must_use]
    pub fn base_content_id(&self) -> &str {
        &self.base_content_id
    }

    /// Get the variations in configured order.
    #[must_use]
    pub fn variations(&self) -> &[Variation] {
        &self.variations
    }

    /// Look up a variation by id.
    #[must_use]
    pub fn variation(&self, variation_id: &str) -> Option<&Variation> {
        self.variations.iter().find(|v| v.id() == variation_id)
    }

    /// The control variation: the flagged one, else the first.
    #[must_use]
    pub fn control(&self) -> Option<&Variation> {
        self.variations
            .iter()
            .find(|v| v.is_control())
            .or_else(|| self.variations.first())
    }

    /// Share of all traffic entering the experiment, in percent.
    #[must_use]
    pub const fn traffic_allocation(&self) -> f64 {
        self.traffic_allocation
    }

    /// Get the tracked goals.
    #[must_use]
    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    /// Creation time, restamped when the experiment starts.
    #[must_use]
    pub const fn start_date(&self) -> DateTime<Utc> {
        self.start_date
    }

    /// Get the end date, if set.
    #[must_use]
    pub const fn end_date(&self) -> Option<DateTime<Utc>> {
        self.end_date
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_date(&self) -> DateTime<Utc> {
        self.created_date
    }

    /// Get the results block.
    #[must_use]
    pub const fn results(&self) -> Option<&ExperimentResults> {
        self.results.as_ref()
    }

    /// Get the status transition audit trail, oldest first.
    #[must_use]
    pub fn status_history(&self) -> &[StatusChange] {
        &self.status_history
    }

    /// Whether `content_id` is the base content or any variation's content.
    #[must_use]
    pub fn references_content(&self, content_id: &str) -> bool {
        self.base_content_id == content_id
            || self.variations.iter().any(|v| v.content_id() == content_id)
    }

    /// Apply a partial update in place. Absent fields are left untouched.
    pub fn apply_patch(&mut self, patch: ExperimentPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(description) = patch.description {
            self.description = Some(description);
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(traffic_allocation) = patch.traffic_allocation {
            self.traffic_allocation = traffic_allocation;
        }
        if let Some(metrics) = patch.metrics {
            self.metrics = metrics;
        }
        if let Some(start_date) = patch.start_date {
            self.start_date = start_date;
        }
        if let Some(end_date) = patch.end_date {
            self.end_date = Some(end_date);
        }
        if let Some(results) = patch.results {
            self.results = Some(results);
        }
        if let Some(history) = patch.status_history {
            self.status_history = history;
        }
    }

    pub(crate) fn results_mut(&mut self) -> Option<&mut ExperimentResults> {
        self.results.as_mut()
    }

    pub(crate) fn set_results(&mut self, results: ExperimentResults) {
        self.results = Some(results);
    }

    /// Move to `to`, appending an audit entry.
    pub(crate) fn transition(&mut self, to: ExperimentStatus, reason: Option<String>) {
        let now = Utc::now();
        self.status_history.push(StatusChange {
            from: self.status,
            to,
            at: now,
            reason,
        });
        self.status = to;
        match to {
            ExperimentStatus::Running => self.start_date = now,
            ExperimentStatus::Completed => self.end_date = Some(now),
            ExperimentStatus::Draft | ExperimentStatus::Paused => {}
        }
    }
}
