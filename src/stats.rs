//! Statistics engine for experiment analysis
//!
//! Pure functions only: no I/O, no clocks except the `last_updated` stamp,
//! and every function is total. Division by zero is guarded explicitly and
//! yields the neutral value (`0` for rates and lift, `1.0` for p-values).
//!
//! ## Methods
//!
//! - Confidence interval: Wilson score interval at 95% (z = 1.96)
//! - Significance: two-tailed two-proportion z-test with pooled variance
//! - Normal CDF: Abramowitz-Stegun polynomial approximation (26.2.17)
//!
//! The CDF coefficients are pinned. Swapping in a different approximation
//! moves p-values near the 0.05 boundary and changes which experiments are
//! reported as significant.

use chrono::Utc;

use crate::experiment::{ConfidenceInterval, Experiment, ExperimentResults, VariationResult};

/// z-score for a two-sided 95% interval.
pub const Z_95: f64 = 1.96;

/// p-values strictly below this are significant.
pub const SIGNIFICANCE_LEVEL: f64 = 0.05;

const CDF_P: f64 = 0.231_641_9;
const CDF_D: f64 = 0.398_942_3;
const CDF_B1: f64 = 0.319_381_5;
const CDF_B2: f64 = -0.356_563_8;
const CDF_B3: f64 = 1.781_478;
const CDF_B4: f64 = -1.821_256;
const CDF_B5: f64 = 1.330_274;

/// Visitor count above which an inconclusive experiment scores 80.
const CONFIDENCE_VISITOR_THRESHOLD: u64 = 100;
const CONFIDENCE_SIGNIFICANT: f64 = 95.0;
const CONFIDENCE_HIGH_TRAFFIC: f64 = 80.0;
const CONFIDENCE_LOW_TRAFFIC_CAP: u64 = 50;

#[allow(clippy::cast_precision_loss)]
const fn as_f64(n: u64) -> f64 {
    n as f64
}

/// Standard normal cumulative distribution function.
#[must_use]
pub fn normal_cdf(x: f64) -> f64 {
    let t = 1.0 / CDF_P.mul_add(x.abs(), 1.0);
    let d = CDF_D * (-x * x / 2.0).exp();
    let prob = d
        * t
        * (CDF_B1 + t * (CDF_B2 + t * (CDF_B3 + t * (CDF_B4 + t * CDF_B5))));
    if x > 0.0 {
        1.0 - prob
    } else {
        prob
    }
}

/// Conversion rate in percent; 0 when there are no visitors.
#[must_use]
pub fn conversion_rate(conversions: u64, visitors: u64) -> f64 {
    if visitors == 0 {
        return 0.0;
    }
    as_f64(conversions) / as_f64(visitors) * 100.0
}

/// 95% Wilson score interval for a conversion rate, in percent.
///
/// Returns `{0, 0}` when there are no visitors. The observed proportion is
/// capped at 1, so the bounds are always finite and within `[0, 100]`.
#[must_use]
pub fn confidence_interval(conversions: u64, visitors: u64) -> ConfidenceInterval {
    if visitors == 0 {
        return ConfidenceInterval::default();
    }

    let n = as_f64(visitors);
    let p = (as_f64(conversions) / n).min(1.0);
    let z2 = Z_95 * Z_95;

    let center = p + z2 / (2.0 * n);
    let margin = Z_95 * ((p * (1.0 - p) + z2 / (4.0 * n)) / n).sqrt();
    let denom = 1.0 + z2 / n;

    ConfidenceInterval {
        lower: ((center - margin) / denom * 100.0).clamp(0.0, 100.0),
        upper: ((center + margin) / denom * 100.0).clamp(0.0, 100.0),
    }
}

/// Percent change of `variation`'s conversion rate relative to `control`.
///
/// Returns 0 when the control has not converted anyone.
#[must_use]
pub fn relative_lift(variation: &VariationResult, control: &VariationResult) -> f64 {
    if control.conversions == 0 || control.visitors == 0 {
        return 0.0;
    }
    (variation.conversion_rate - control.conversion_rate) / control.conversion_rate * 100.0
}

/// Two-tailed p-value of a two-proportion z-test. Symmetric in its inputs.
///
/// Returns 1.0 when either side has no visitors or the pooled standard
/// error is zero.
#[must_use]
pub fn p_value(a: &VariationResult, b: &VariationResult) -> f64 {
    if a.visitors == 0 || b.visitors == 0 {
        return 1.0;
    }

    let n_a = as_f64(a.visitors);
    let n_b = as_f64(b.visitors);
    let p_a = as_f64(a.conversions) / n_a;
    let p_b = as_f64(b.conversions) / n_b;

    let pooled = as_f64(a.conversions + b.conversions) / as_f64(a.visitors + b.visitors);
    let se = (pooled * (1.0 - pooled) * (1.0 / n_a + 1.0 / n_b)).sqrt();
    // NaN when conversions exceed visitors; treat as no evidence.
    if se == 0.0 || se.is_nan() {
        return 1.0;
    }

    let z = (p_a - p_b).abs() / se;
    2.0 * (1.0 - normal_cdf(z))
}

/// Heuristic 0-100 score summarizing how settled the results look.
///
/// This is not a statistical quantity: 95 when significant, otherwise 80
/// above 100 total visitors, otherwise the visitor count capped at 50.
#[must_use]
pub fn heuristic_confidence(significant: bool, total_visitors: u64) -> f64 {
    if significant {
        CONFIDENCE_SIGNIFICANT
    } else if total_visitors > CONFIDENCE_VISITOR_THRESHOLD {
        CONFIDENCE_HIGH_TRAFFIC
    } else {
        as_f64(total_visitors.min(CONFIDENCE_LOW_TRAFFIC_CAP))
    }
}

/// Recompute a variation's rate and interval from its counters.
pub fn refresh_variation(result: &mut VariationResult) {
    result.conversion_rate = conversion_rate(result.conversions, result.visitors);
    result.confidence_interval = confidence_interval(result.conversions, result.visitors);
}

/// Recompute experiment-level totals and the overall conversion rate.
pub fn refresh_totals(results: &mut ExperimentResults) {
    results.total_visitors = results.variation_results.iter().map(|r| r.visitors).sum();
    results.total_conversions = results
        .variation_results
        .iter()
        .map(|r| r.conversions)
        .sum();
    results.conversion_rate = conversion_rate(results.total_conversions, results.total_visitors);
}

/// Full recomputation of an experiment's statistics.
///
/// Every variation's rate and interval is refreshed; every non-control
/// variation additionally gets lift and p-value against the control (the
/// flagged variation, else the first). The winner is the significant
/// variation with the highest conversion rate, earliest in variation order
/// on ties. Returns `None` when the experiment has no results block.
#[must_use]
pub fn compute_experiment_results(experiment: &Experiment) -> Option<ExperimentResults> {
    let mut results = experiment.results()?.clone();
    let control_id = experiment.control()?.id();

    for result in &mut results.variation_results {
        refresh_variation(result);
    }

    let control = results
        .variation(control_id)
        .cloned()
        .unwrap_or_else(|| VariationResult::new(control_id));

    let mut significant = false;
    let mut winner: Option<(usize, f64)> = None;
    for (index, result) in results.variation_results.iter_mut().enumerate() {
        if result.variation_id == control_id {
            result.relative_lift = 0.0;
            result.p_value = 1.0;
            continue;
        }
        result.relative_lift = relative_lift(result, &control);
        result.p_value = p_value(result, &control);

        if result.p_value < SIGNIFICANCE_LEVEL {
            significant = true;
            // Strictly greater keeps the earliest variation on ties.
            if winner.map_or(true, |(_, best)| result.conversion_rate > best) {
                winner = Some((index, result.conversion_rate));
            }
        }
    }

    refresh_totals(&mut results);
    results.statistical_significance = significant;
    results.winning_variation =
        winner.map(|(index, _)| results.variation_results[index].variation_id.clone());
    results.confidence = heuristic_confidence(significant, results.total_visitors);
    results.last_updated = Utc::now();

    Some(results)
}
