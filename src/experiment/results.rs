//! Results - per-variation counters and derived statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Variation;

/// Range estimate of a conversion rate, in percent.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfidenceInterval {
    /// Lower bound (percent, 0-100)
    pub lower: f64,
    /// Upper bound (percent, 0-100)
    pub upper: f64,
}

impl ConfidenceInterval {
    /// Whether `rate` (percent) falls inside the interval.
    #[must_use]
    pub fn contains(&self, rate: f64) -> bool {
        self.lower <= rate && rate <= self.upper
    }

    /// Width of the interval in percentage points.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// Counters and statistics for one variation.
///
/// `visitors`, `conversions` and `revenue` only ever grow. The remaining
/// fields are derived and are rewritten by the statistics engine whenever
/// the counters change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VariationResult {
    /// Variation these numbers belong to
    pub variation_id: String,
    /// Exposure count
    pub visitors: u64,
    /// Conversion count
    pub conversions: u64,
    /// `conversions / visitors` in percent
    pub conversion_rate: f64,
    /// Accumulated revenue, absent until the first revenue event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revenue: Option<f64>,
    /// 95% Wilson score interval around `conversion_rate`
    pub confidence_interval: ConfidenceInterval,
    /// Percent change of `conversion_rate` versus the control
    pub relative_lift: f64,
    /// Two-tailed p-value against the control
    pub p_value: f64,
}

impl VariationResult {
    /// Zeroed result for a freshly created variation.
    #[must_use]
    pub fn new(variation_id: impl Into<String>) -> Self {
        Self {
            variation_id: variation_id.into(),
            visitors: 0,
            conversions: 0,
            conversion_rate: 0.0,
            revenue: None,
            confidence_interval: ConfidenceInterval::default(),
            relative_lift: 0.0,
            p_value: 1.0,
        }
    }

    /// Average revenue per exposure (0 without visitors).
    #[must_use]
    pub fn revenue_per_visitor(&self) -> f64 {
        if self.visitors == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let visitors = self.visitors as f64;
        self.revenue.unwrap_or(0.0) / visitors
    }
}

/// Aggregate outcome of an experiment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentResults {
    /// Sum of visitors across variations
    pub total_visitors: u64,
    /// Sum of conversions across variations
    pub total_conversions: u64,
    /// Overall conversion rate in percent
    pub conversion_rate: f64,
    /// Heuristic 0-100 score; see `stats::heuristic_confidence`
    pub confidence: f64,
    /// Whether any variation beats the control at p < 0.05
    pub statistical_significance: bool,
    /// Id of the winning variation, when significant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winning_variation: Option<String>,
    /// One entry per variation, in variation order
    pub variation_results: Vec<VariationResult>,
    /// Time of the last mutation or recomputation
    pub last_updated: DateTime<Utc>,
}

impl ExperimentResults {
    /// Zeroed results covering every variation, in order.
    #[must_use]
    pub fn initialize(variations: &[Variation]) -> Self {
        Self {
            total_visitors: 0,
            total_conversions: 0,
            conversion_rate: 0.0,
            confidence: 0.0,
            statistical_significance: false,
            winning_variation: None,
            variation_results: variations
                .iter()
                .map(|v| VariationResult::new(v.id()))
                .collect(),
            last_updated: Utc::now(),
        }
    }

    /// Look up the result for a variation.
    #[must_use]
    pub fn variation(&self, variation_id: &str) -> Option<&VariationResult> {
        self.variation_results
            .iter()
            .find(|r| r.variation_id == variation_id)
    }

    /// Mutable lookup of the result for a variation.
    pub fn variation_mut(&mut self, variation_id: &str) -> Option<&mut VariationResult> {
        self.variation_results
            .iter_mut()
            .find(|r| r.variation_id == variation_id)
    }
}
