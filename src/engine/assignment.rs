//! Deterministic visitor-to-variation assignment.
//!
//! A visitor always lands in the same variation of a given experiment:
//! `(experiment_id, visitor_id)` is hashed into a bucket in `[0, 100)` and
//! the bucket is matched against the cumulative variation allocations. A
//! second, independently salted bucket gates participation by the
//! experiment's overall traffic allocation.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

use super::ExperimentEngine;
use crate::experiment::{Experiment, ExperimentStatus, Variation};
use crate::store::ExperimentStore;
use crate::{Error, Result};

const BUCKETS: u64 = 10_000;
const GATE_SALT: &str = "traffic";
const SPLIT_SALT: &str = "variation";

/// Finalizer from SplitMix64; spreads Fx output across the low bits.
const fn mix(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Bucket in `[0, 100)` with two decimals of resolution.
fn bucket(salt: &str, experiment_id: &str, visitor_id: &str) -> f64 {
    let mut hasher = FxHasher::default();
    salt.hash(&mut hasher);
    experiment_id.hash(&mut hasher);
    visitor_id.hash(&mut hasher);
    #[allow(clippy::cast_precision_loss)]
    let slot = (mix(hasher.finish()) % BUCKETS) as f64;
    slot / 100.0
}

/// Pick the variation for `visitor_id`, or `None` if the visitor falls
/// outside the experiment's traffic allocation.
#[must_use]
pub(crate) fn assign<'a>(experiment: &'a Experiment, visitor_id: &str) -> Option<&'a Variation> {
    if bucket(GATE_SALT, experiment.id(), visitor_id) >= experiment.traffic_allocation() {
        return None;
    }

    let point = bucket(SPLIT_SALT, experiment.id(), visitor_id);
    let mut cumulative = 0.0;
    for variation in experiment.variations() {
        cumulative += variation.traffic_allocation();
        if point < cumulative {
            return Some(variation);
        }
    }
    // Rounding in the allocations can leave a sliver below 100.
    experiment
        .variations()
        .iter()
        .rev()
        .find(|v| v.traffic_allocation() > 0.0)
}

impl<S: ExperimentStore> ExperimentEngine<S> {
    /// Assign a visitor to a variation of a running experiment.
    ///
    /// The result is stable for a given `(experiment_id, visitor_id)` pair.
    /// Returns `Ok(None)` when the visitor is outside the experiment's
    /// traffic allocation.
    ///
    /// # Errors
    ///
    /// - [`Error::ExperimentNotFound`] for an unknown id
    /// - [`Error::InvalidState`] unless the experiment is running
    pub async fn assign_variation(
        &self,
        experiment_id: &str,
        visitor_id: &str,
    ) -> Result<Option<Variation>> {
        let experiment = self.load(experiment_id).await?;
        if experiment.status() != ExperimentStatus::Running {
            return Err(Error::InvalidState {
                experiment_id: experiment_id.to_string(),
                status: experiment.status(),
                operation: "assign visitors to",
            });
        }
        Ok(assign(&experiment, visitor_id).cloned())
    }
}
