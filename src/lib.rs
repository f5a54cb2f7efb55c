//! # ab-engine: A/B Experiment Management and Statistical Analysis
//!
//! Manages controlled experiments that compare content variations, ingests
//! outcome events (exposures, conversions, revenue) and computes the
//! statistics needed to call a winner: Wilson confidence intervals,
//! two-proportion z-test p-values, relative lift and significance.
//!
//! ## Design Principles
//!
//! - **Injected storage**: the engine talks to an [`store::ExperimentStore`],
//!   never to a hidden global collection
//! - **Pure statistics**: [`stats`] is arithmetic only and total over its inputs
//! - **No lost updates**: mutations on one experiment are serialized and
//!   committed with a single write; distinct experiments never contend
//!
//! ## Example Usage
//!
//! ```rust
//! use ab_engine::engine::{EventKind, ExperimentEngine};
//! use ab_engine::experiment::{ExperimentConfig, Variation};
//! use ab_engine::store::MemoryExperimentStore;
//!
//! # async fn example() -> ab_engine::Result<()> {
//! let engine = ExperimentEngine::new(MemoryExperimentStore::new());
//!
//! let config = ExperimentConfig::builder("cta-1", "Homepage CTA", "home")
//!     .variation(Variation::builder("control", "home", 50.0).control().build())
//!     .variation(Variation::new("v2", "home-green", 50.0))
//!     .build();
//! engine.create_experiment(config).await?;
//! engine.start_experiment("cta-1").await?;
//!
//! engine.record_event("cta-1", "control", EventKind::Visitor, None).await?;
//! let outcome = engine.complete_experiment("cta-1", None).await?;
//! println!("winner: {:?}", outcome.value.results().and_then(|r| r.winning_variation.clone()));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod engine;
pub mod error;
pub mod experiment;
pub mod stats;
pub mod store;

pub use engine::{EngineConfig, ExperimentEngine, Outcome};
pub use error::{Error, Result};
