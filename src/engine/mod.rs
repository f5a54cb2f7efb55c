//! Experiment engine: lifecycle, event recording and result aggregation
//!
//! [`ExperimentEngine`] is the only entry point callers need. It wraps an
//! injected [`ExperimentStore`] and adds:
//!
//! - configuration validation and the status state machine
//! - event ingestion with per-experiment serialization
//! - statistics recomputation on write, on read and at completion
//! - an optional broadcast channel of [`ExperimentEvent`]s
//!
//! ## Consistency
//!
//! Every mutation takes the experiment's lock, loads the record, applies
//! the change and all derived statistics in memory, and commits with a
//! single `put`. If the store fails, nothing is committed. A timeout drops
//! the pending `put`; see [`Error::StoreTimeout`] for backends that may
//! still finish it.
//!
//! # Example
//!
//! ```rust
//! use ab_engine::engine::{EventKind, ExperimentEngine};
//! use ab_engine::experiment::{ExperimentConfig, Variation};
//! use ab_engine::store::MemoryExperimentStore;
//!
//! # async fn example() -> ab_engine::Result<()> {
//! let engine = ExperimentEngine::new(MemoryExperimentStore::new());
//! let config = ExperimentConfig::builder("exp-1", "Homepage CTA", "page-1")
//!     .variation(Variation::builder("control", "page-1", 50.0).control().build())
//!     .variation(Variation::new("v2", "page-1-b", 50.0))
//!     .start_immediately(true)
//!     .build();
//!
//! engine.create_experiment(config).await?;
//! engine.record_event("exp-1", "v2", EventKind::Visitor, None).await?;
//! engine.record_event("exp-1", "v2", EventKind::Conversion, None).await?;
//!
//! let results = engine.get_experiment_results("exp-1").await?;
//! assert_eq!(results.total_visitors, 1);
//! # Ok(())
//! # }
//! ```

mod aggregator;
mod assignment;
mod lifecycle;
mod locks;
mod notify;
mod recorder;

pub use notify::ExperimentEvent;
pub use recorder::{EventKind, OutcomeEvent};

use std::future::Future;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::warn;

use crate::experiment::{Experiment, Warning};
use crate::store::ExperimentStore;
use crate::{Error, Result};
use locks::ExperimentLocks;
use notify::Notifier;

/// Default buffer of the notification channel.
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 256;

/// Tunables for [`ExperimentEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Deadline for each store call; `None` waits indefinitely.
    pub store_timeout: Option<Duration>,
    /// Events a slow subscriber may lag before losing the oldest.
    pub notification_capacity: usize,
    /// Recompute and persist full statistics when reading a live experiment.
    pub recompute_on_read: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_timeout: None,
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
            recompute_on_read: true,
        }
    }
}

/// Value returned together with non-fatal warnings.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    /// The operation's result
    pub value: T,
    /// Conditions the caller should surface but that did not fail the call
    pub warnings: Vec<Warning>,
}

impl<T> Outcome<T> {
    /// Wrap a value with no warnings.
    pub const fn clean(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    /// Whether any warning was attached.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// A/B experiment engine over a pluggable store.
///
/// Share between tasks with `Arc<ExperimentEngine<S>>`; all operations take
/// `&self`.
#[derive(Debug)]
pub struct ExperimentEngine<S> {
    store: S,
    config: EngineConfig,
    locks: ExperimentLocks,
    notifier: Notifier,
}

impl<S: ExperimentStore> ExperimentEngine<S> {
    /// Create an engine with the default configuration.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self::builder(store).build()
    }

    /// Create an engine builder.
    #[must_use]
    pub fn builder(store: S) -> EngineBuilder<S> {
        EngineBuilder {
            store,
            config: EngineConfig::default(),
        }
    }

    /// Borrow the underlying store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Get the active configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Receive every [`ExperimentEvent`] published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ExperimentEvent> {
        self.notifier.subscribe()
    }

    /// Run a store call under the configured deadline.
    ///
    /// On expiry the call's future is dropped; the record is left as the
    /// backend had it unless the backend was already past its commit point.
    async fn with_deadline<T>(&self, call: impl Future<Output = Result<T>> + Send) -> Result<T> {
        match self.config.store_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
                warn!(timeout = ?limit, "experiment store call timed out");
                Err(Error::StoreTimeout(limit))
            }),
            None => call.await,
        }
    }

    /// Load a record or fail with `ExperimentNotFound`.
    async fn load(&self, id: &str) -> Result<Experiment> {
        self.with_deadline(self.store.get(id))
            .await?
            .ok_or_else(|| Error::ExperimentNotFound(id.to_string()))
    }

    /// Persist a fully updated record in one write.
    async fn commit(&self, experiment: Experiment) -> Result<()> {
        self.with_deadline(self.store.put(experiment)).await
    }
}

/// Builder for [`ExperimentEngine`].
#[derive(Debug)]
pub struct EngineBuilder<S> {
    store: S,
    config: EngineConfig,
}

impl<S: ExperimentStore> EngineBuilder<S> {
    /// Fail store calls that take longer than `limit`.
    #[must_use]
    pub const fn store_timeout(mut self, limit: Duration) -> Self {
        self.config.store_timeout = Some(limit);
        self
    }

    /// Set the notification buffer size.
    #[must_use]
    pub const fn notification_capacity(mut self, capacity: usize) -> Self {
        self.config.notification_capacity = capacity;
        self
    }

    /// Toggle recomputation on read.
    #[must_use]
    pub const fn recompute_on_read(mut self, value: bool) -> Self {
        self.config.recompute_on_read = value;
        self
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the engine.
    #[must_use]
    pub fn build(self) -> ExperimentEngine<S> {
        ExperimentEngine {
            notifier: Notifier::new(self.config.notification_capacity),
            store: self.store,
            config: self.config,
            locks: ExperimentLocks::new(),
        }
    }
}
