//! Experiment configuration - validated input for creation and updates

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Experiment, ExperimentStatus, Metric, Variation};
use crate::store::ExperimentPatch;
use crate::{Error, Result};

/// Tolerance when checking that allocations add up to 100 percent.
const ALLOCATION_EPSILON: f64 = 1e-6;

/// Non-fatal condition attached to a successful operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Warning {
    /// No variation was flagged as control; the first one was designated.
    ControlAssigned {
        /// Variation that became the control
        variation_id: String,
    },
    /// The experiment completed without a statistically significant result.
    NotSignificant,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ControlAssigned { variation_id } => write!(
                f,
                "no control variation specified; '{variation_id}' was designated as control"
            ),
            Self::NotSignificant => f.write_str("results are not statistically significant"),
        }
    }
}

/// Request to create an experiment.
///
/// Building a config never fails; [`ExperimentConfig::validate`] checks it
/// and produces the experiment record.
#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    id: String,
    name: String,
    description: Option<String>,
    base_content_id: String,
    variations: Vec<Variation>,
    traffic_allocation: f64,
    metrics: Vec<Metric>,
    end_date: Option<DateTime<Utc>>,
    start_immediately: bool,
}

impl ExperimentConfig {
    /// Create a builder with the required identifiers.
    ///
    /// # Arguments
    ///
    /// * `id` - Unique identifier for the experiment
    /// * `name` - Human-readable name
    /// * `base_content_id` - Opaque reference to the content under test
    #[must_use]
    pub fn builder(
        id: impl Into<String>,
        name: impl Into<String>,
        base_content_id: impl Into<String>,
    ) -> ExperimentConfigBuilder {
        ExperimentConfigBuilder::new(id, name, base_content_id)
    }

    /// Get the requested experiment ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the experiment should start running on creation.
    #[must_use]
    pub const fn start_immediately(&self) -> bool {
        self.start_immediately
    }

    /// Check every creation precondition and build the experiment.
    ///
    /// Preconditions: non-empty id and name, at least two variations,
    /// unique variation ids, allocations summing to 100, at most one
    /// control. Without a control the first variation is designated and a
    /// [`Warning::ControlAssigned`] is returned alongside the record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] describing the first violated
    /// precondition.
    pub fn validate(self) -> Result<(Experiment, Vec<Warning>)> {
        if self.id.trim().is_empty() {
            return Err(Error::Validation("experiment id is required".into()));
        }
        if self.name.trim().is_empty() {
            return Err(Error::Validation("experiment name is required".into()));
        }
        if self.variations.len() < 2 {
            return Err(Error::Validation(format!(
                "at least 2 variations are required, got {}",
                self.variations.len()
            )));
        }
        validate_allocation(self.traffic_allocation, "experiment")?;

        let mut seen = HashSet::with_capacity(self.variations.len());
        for variation in &self.variations {
            if variation.id().trim().is_empty() {
                return Err(Error::Validation("variation id is required".into()));
            }
            if !seen.insert(variation.id()) {
                return Err(Error::Validation(format!(
                    "duplicate variation id '{}'",
                    variation.id()
                )));
            }
            validate_allocation(variation.traffic_allocation(), variation.id())?;
        }

        let total: f64 = self
            .variations
            .iter()
            .map(Variation::traffic_allocation)
            .sum();
        if (total - 100.0).abs() > ALLOCATION_EPSILON {
            return Err(Error::Validation(format!(
                "variation traffic allocations must sum to 100, got {total}"
            )));
        }

        let controls = self.variations.iter().filter(|v| v.is_control()).count();
        if controls > 1 {
            return Err(Error::Validation(format!(
                "exactly one control variation is allowed, got {controls}"
            )));
        }

        let mut variations = self.variations;
        let mut warnings = Vec::new();
        if controls == 0 {
            let first = &mut variations[0];
            first.mark_control();
            warnings.push(Warning::ControlAssigned {
                variation_id: first.id().to_string(),
            });
        }

        let status = if self.start_immediately {
            ExperimentStatus::Running
        } else {
            ExperimentStatus::Draft
        };

        let experiment = Experiment::assemble(
            self.id,
            self.name,
            self.description,
            status,
            self.base_content_id,
            variations,
            self.traffic_allocation,
            self.metrics,
            self.end_date,
        );
        Ok((experiment, warnings))
    }
}

fn validate_allocation(allocation: f64, owner: &str) -> Result<()> {
    if allocation.is_finite() && (0.0..=100.0).contains(&allocation) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "traffic allocation for '{owner}' must be within 0-100, got {allocation}"
        )))
    }
}

/// Builder for `ExperimentConfig`.
#[derive(Debug)]
pub struct ExperimentConfigBuilder {
    config: ExperimentConfig,
}

impl ExperimentConfigBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        base_content_id: impl Into<String>,
    ) -> Self {
        Self {
            config: ExperimentConfig {
                id: id.into(),
                name: name.into(),
                description: None,
                base_content_id: base_content_id.into(),
                variations: Vec::new(),
                traffic_allocation: 100.0,
                metrics: Vec::new(),
                end_date: None,
                start_immediately: false,
            },
        }
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.config.description = Some(description.into());
        self
    }

    /// Append a variation.
    #[must_use]
    pub fn variation(mut self, variation: Variation) -> Self {
        self.config.variations.push(variation);
        self
    }

    /// Append several variations, preserving order.
    #[must_use]
    pub fn variations(mut self, variations: impl IntoIterator<Item = Variation>) -> Self {
        self.config.variations.extend(variations);
        self
    }

    /// Set the overall traffic share (defaults to 100).
    #[must_use]
    pub const fn traffic_allocation(mut self, percent: f64) -> Self {
        self.config.traffic_allocation = percent;
        self
    }

    /// Append a tracked goal.
    #[must_use]
    pub fn metric(mut self, metric: Metric) -> Self {
        self.config.metrics.push(metric);
        self
    }

    /// Set a planned end date.
    #[must_use]
    pub const fn end_date(mut self, end_date: DateTime<Utc>) -> Self {
        self.config.end_date = Some(end_date);
        self
    }

    /// Create the experiment in `running` instead of `draft`.
    #[must_use]
    pub const fn start_immediately(mut self, value: bool) -> Self {
        self.config.start_immediately = value;
        self
    }

    /// Build the `ExperimentConfig`.
    #[must_use]
    pub fn build(self) -> ExperimentConfig {
        self.config
    }
}

/// Fields a caller may change on a non-running experiment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExperimentUpdate {
    name: Option<String>,
    description: Option<String>,
    traffic_allocation: Option<f64>,
    end_date: Option<DateTime<Utc>>,
    metrics: Option<Vec<Metric>>,
}

impl ExperimentUpdate {
    /// Empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Replace the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Replace the overall traffic share.
    #[must_use]
    pub const fn traffic_allocation(mut self, percent: f64) -> Self {
        self.traffic_allocation = Some(percent);
        self
    }

    /// Replace the end date.
    #[must_use]
    pub const fn end_date(mut self, end_date: DateTime<Utc>) -> Self {
        self.end_date = Some(end_date);
        self
    }

    /// Replace the tracked goals.
    #[must_use]
    pub fn metrics(mut self, metrics: Vec<Metric>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Whether no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.traffic_allocation.is_none()
            && self.end_date.is_none()
            && self.metrics.is_none()
    }

    /// Check field values and convert into a store patch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a blank name or an allocation
    /// outside 0-100.
    pub fn into_patch(self) -> Result<ExperimentPatch> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(Error::Validation("experiment name is required".into()));
            }
        }
        if let Some(allocation) = self.traffic_allocation {
            validate_allocation(allocation, "experiment")?;
        }
        Ok(ExperimentPatch {
            name: self.name,
            description: self.description,
            traffic_allocation: self.traffic_allocation,
            end_date: self.end_date,
            metrics: self.metrics,
            ..ExperimentPatch::default()
        })
    }
}
