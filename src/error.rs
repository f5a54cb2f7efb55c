//! Error types for the experiment engine
//!
//! Every failure maps onto one of four caller-facing kinds: validation,
//! not-found, invalid-state, or storage. The `is_*` helpers perform that
//! classification so transports can translate errors without matching on
//! every variant.

use std::time::Duration;

use thiserror::Error;

use crate::experiment::ExperimentStatus;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Experiment engine error types
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed experiment configuration. Nothing was persisted.
    #[error("Invalid experiment configuration: {0}")]
    Validation(String),

    /// Unknown experiment id
    #[error("Experiment not found: {0}")]
    ExperimentNotFound(String),

    /// Variation id is not part of the referenced experiment
    #[error("Variation {variation_id} not found in experiment {experiment_id}")]
    VariationNotFound {
        /// Experiment that was searched
        experiment_id: String,
        /// Variation id that was requested
        variation_id: String,
    },

    /// Operation is not allowed in the experiment's current lifecycle state
    #[error("Cannot {operation} experiment {experiment_id} while it is {status}")]
    InvalidState {
        /// Experiment the operation targeted
        experiment_id: String,
        /// Status at the time of the call
        status: ExperimentStatus,
        /// Operation that was rejected
        operation: &'static str,
    },

    /// Experiment exists but carries no results block
    #[error("Experiment {0} has no initialized results")]
    NotInitialized(String),

    /// Persistence layer failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Persistence call exceeded the configured deadline.
    ///
    /// The engine stops waiting and drops the call. Backends that cannot
    /// cancel a write already committing (see `JsonFileStore`) may still
    /// apply it, so the outcome should be confirmed with a read before retrying.
    #[error("Storage operation timed out after {0:?}")]
    StoreTimeout(Duration),

    /// Record (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for malformed-configuration errors.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// True when an experiment or variation id was unknown.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ExperimentNotFound(_) | Self::VariationNotFound { .. }
        )
    }

    /// True when the lifecycle state forbids the operation.
    #[must_use]
    pub const fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. } | Self::NotInitialized(_))
    }

    /// True for persistence failures, including timeouts and codec errors.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::StoreTimeout(_) | Self::Serialization(_) | Self::Io(_)
        )
    }
}
