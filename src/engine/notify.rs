//! Outbound lifecycle notifications.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use super::EventKind;

/// Notification published after an operation has been committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExperimentEvent {
    /// Experiment was created.
    Created {
        /// Experiment id
        experiment_id: String,
    },
    /// Experiment entered `running`.
    Started {
        /// Experiment id
        experiment_id: String,
    },
    /// Experiment entered `paused`.
    Stopped {
        /// Experiment id
        experiment_id: String,
        /// Caller-supplied reason
        reason: Option<String>,
    },
    /// Experiment entered `completed`.
    Completed {
        /// Experiment id
        experiment_id: String,
        /// Winner in the final results
        winning_variation: Option<String>,
    },
    /// Mutable fields were changed.
    Updated {
        /// Experiment id
        experiment_id: String,
    },
    /// Experiment was removed.
    Deleted {
        /// Experiment id
        experiment_id: String,
    },
    /// An outcome event was applied.
    EventRecorded {
        /// Experiment id
        experiment_id: String,
        /// Variation the event was attributed to
        variation_id: String,
        /// Kind of outcome
        event: EventKind,
    },
}

/// Fan-out of [`ExperimentEvent`]s to any number of subscribers.
///
/// Publishing never waits: with no subscribers the event is dropped, and a
/// subscriber that falls more than `capacity` events behind loses the
/// oldest ones.
#[derive(Debug)]
pub(crate) struct Notifier {
    sender: broadcast::Sender<ExperimentEvent>,
}

impl Notifier {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ExperimentEvent> {
        self.sender.subscribe()
    }

    pub(crate) fn publish(&self, event: ExperimentEvent) {
        if self.sender.send(event).is_err() {
            trace!("no notification subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers() {
        let notifier = Notifier::new(4);
        notifier.publish(ExperimentEvent::Created {
            experiment_id: "exp-1".into(),
        });
    }

    #[tokio::test]
    async fn test_subscriber_receives() {
        let notifier = Notifier::new(4);
        let mut rx = notifier.subscribe();
        notifier.publish(ExperimentEvent::Deleted {
            experiment_id: "exp-1".into(),
        });
        assert_eq!(
            rx.recv().await.unwrap(),
            ExperimentEvent::Deleted {
                experiment_id: "exp-1".into()
            }
        );
    }
}
