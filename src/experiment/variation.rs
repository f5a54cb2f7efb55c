//! Variation - one version of content under test

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single arm of an experiment.
///
/// Each variation points at an opaque content reference and receives a
/// share of the experiment's traffic. Exactly one variation per experiment
/// is the control.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Variation {
    id: String,
    name: String,
    content_id: String,
    traffic_allocation: f64,
    #[serde(default)]
    properties: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    is_control: bool,
}

impl Variation {
    /// Create a non-control variation named after its id.
    ///
    /// # Arguments
    ///
    /// * `id` - Identifier, unique within the experiment
    /// * `content_id` - Opaque reference to the content being shown
    /// * `traffic_allocation` - Share of traffic in percent (0-100)
    #[must_use]
    pub fn new(id: impl Into<String>, content_id: impl Into<String>, traffic_allocation: f64) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            content_id: content_id.into(),
            traffic_allocation,
            properties: BTreeMap::new(),
            is_control: false,
        }
    }

    /// Create a builder for a variation with optional fields.
    #[must_use]
    pub fn builder(
        id: impl Into<String>,
        content_id: impl Into<String>,
        traffic_allocation: f64,
    ) -> VariationBuilder {
        VariationBuilder::new(id, content_id, traffic_allocation)
    }

    /// Get the variation ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the opaque content reference.
    #[must_use]
    pub fn content_id(&self) -> &str {
        &self.content_id
    }

    /// Get the traffic share in percent.
    #[must_use]
    pub const fn traffic_allocation(&self) -> f64 {
        self.traffic_allocation
    }

    /// Get the free-form properties.
    #[must_use]
    pub const fn properties(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.properties
    }

    /// Whether this variation is the experiment's baseline.
    #[must_use]
    pub const fn is_control(&self) -> bool {
        self.is_control
    }

    pub(crate) fn mark_control(&mut self) {
        self.is_control = true;
    }
}

/// Builder for `Variation`.
#[derive(Debug)]
pub struct VariationBuilder {
    variation: Variation,
}

impl VariationBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(id: impl Into<String>, content_id: impl Into<String>, traffic_allocation: f64) -> Self {
        Self {
            variation: Variation::new(id, content_id, traffic_allocation),
        }
    }

    /// Set the display name (defaults to the id).
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.variation.name = name.into();
        self
    }

    /// Designate this variation as the control.
    #[must_use]
    pub const fn control(mut self) -> Self {
        self.variation.is_control = true;
        self
    }

    /// Attach a free-form property.
    #[must_use]
    pub fn property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.variation.properties.insert(key.into(), value);
        self
    }

    /// Build the `Variation`.
    #[must_use]
    pub fn build(self) -> Variation {
        self.variation
    }
}
