//! Experiment Schema
//!
//! Data structures for controlled A/B experiments: the experiment record,
//! its variations, and the counters and statistics collected per variation.
//!
//! ## Schema Overview
//!
//! ```text
//! Experiment (1) ──< Variation (N, exactly one control)
//!      │
//!      └── ExperimentResults (1) ──< VariationResult (N, same order)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use ab_engine::experiment::{ExperimentConfig, ExperimentStatus, Variation};
//!
//! let (experiment, warnings) = ExperimentConfig::builder("exp-001", "Homepage CTA", "page-42")
//!     .variation(Variation::builder("control", "page-42", 50.0).control().build())
//!     .variation(Variation::new("v2", "page-42-b", 50.0))
//!     .build()
//!     .validate()?;
//!
//! assert!(warnings.is_empty());
//! assert_eq!(experiment.status(), ExperimentStatus::Draft);
//! # Ok::<(), ab_engine::Error>(())
//! ```

mod config;
mod experiment_record;
mod results;
mod variation;

pub use config::{ExperimentConfig, ExperimentConfigBuilder, ExperimentUpdate, Warning};
pub use experiment_record::{Experiment, ExperimentStatus, Metric, StatusChange};
pub use results::{ConfidenceInterval, ExperimentResults, VariationResult};
pub use variation::{Variation, VariationBuilder};
