//! Experiment lifecycle tests
//!
//! Creation, the status state machine, updates and deletion, driven through
//! `ExperimentEngine` over the in-memory store.

use ab_engine::engine::{ExperimentEngine, ExperimentEvent};
use ab_engine::experiment::{
    ConfidenceInterval, ExperimentConfig, ExperimentStatus, ExperimentUpdate, Metric, Variation,
    Warning,
};
use ab_engine::store::{ExperimentFilter, ExperimentStore, MemoryExperimentStore};
use ab_engine::Error;

fn engine() -> ExperimentEngine<MemoryExperimentStore> {
    ExperimentEngine::new(MemoryExperimentStore::new())
}

fn homepage_cta(id: &str) -> ExperimentConfig {
    ExperimentConfig::builder(id, "Homepage CTA", "home")
        .description("Button copy test")
        .variation(
            Variation::builder("control", "home", 50.0)
                .name("Original")
                .control()
                .build(),
        )
        .variation(Variation::builder("v2", "home-green", 50.0).name("Green").build())
        .metric(Metric::new("signup"))
        .build()
}

// =============================================================================
// Creation
// =============================================================================

#[tokio::test]
async fn test_create_homepage_cta_draft() {
    let engine = engine();
    let outcome = engine.create_experiment(homepage_cta("exp-1")).await.unwrap();

    assert!(!outcome.has_warnings());
    let experiment = outcome.value;
    assert_eq!(experiment.status(), ExperimentStatus::Draft);
    assert_eq!(experiment.name(), "Homepage CTA");

    let results = experiment.results().expect("results initialized at creation");
    assert_eq!(results.total_visitors, 0);
    assert_eq!(results.total_conversions, 0);
    assert!(results.conversion_rate.abs() < f64::EPSILON);
    assert_eq!(results.variation_results.len(), 2);
    for result in &results.variation_results {
        assert_eq!(result.visitors, 0);
        assert_eq!(result.conversions, 0);
        assert!((result.p_value - 1.0).abs() < f64::EPSILON);
        assert_eq!(result.confidence_interval, ConfidenceInterval { lower: 0.0, upper: 0.0 });
    }

    let stored = engine.store().get("exp-1").await.unwrap().unwrap();
    assert_eq!(stored, experiment);
}

#[tokio::test]
async fn test_create_start_immediately() {
    let engine = engine();
    let config = ExperimentConfig::builder("exp-1", "Live", "home")
        .variation(Variation::builder("a", "c-a", 50.0).control().build())
        .variation(Variation::new("b", "c-b", 50.0))
        .start_immediately(true)
        .build();

    let experiment = engine.create_experiment(config).await.unwrap().value;
    assert_eq!(experiment.status(), ExperimentStatus::Running);
}

#[tokio::test]
async fn test_create_without_control_warns() {
    let engine = engine();
    let config = ExperimentConfig::builder("exp-1", "No control", "home")
        .variation(Variation::new("a", "c-a", 60.0))
        .variation(Variation::new("b", "c-b", 40.0))
        .build();

    let outcome = engine.create_experiment(config).await.unwrap();
    assert_eq!(
        outcome.warnings,
        vec![Warning::ControlAssigned {
            variation_id: "a".into()
        }]
    );
    let controls: Vec<_> = outcome
        .value
        .variations()
        .iter()
        .filter(|v| v.is_control())
        .map(Variation::id)
        .collect();
    assert_eq!(controls, vec!["a"]);
}

#[tokio::test]
async fn test_create_rejects_allocation_not_100() {
    let engine = engine();
    let config = ExperimentConfig::builder("exp-1", "Bad split", "home")
        .variation(Variation::new("a", "c-a", 40.0))
        .variation(Variation::new("b", "c-b", 40.0))
        .build();

    let err = engine.create_experiment(config).await.unwrap_err();
    assert!(err.is_validation());
    assert!(engine.store().is_empty());
}

#[tokio::test]
async fn test_create_rejects_missing_name() {
    let engine = engine();
    let config = ExperimentConfig::builder("exp-1", "", "home")
        .variation(Variation::new("a", "c-a", 50.0))
        .variation(Variation::new("b", "c-b", 50.0))
        .build();

    assert!(matches!(
        engine.create_experiment(config).await,
        Err(Error::Validation(_))
    ));
    assert!(engine.store().is_empty());
}

// =============================================================================
// State machine
// =============================================================================

#[tokio::test]
async fn test_start_already_running_fails() {
    let engine = engine();
    engine.create_experiment(homepage_cta("exp-1")).await.unwrap();
    engine.start_experiment("exp-1").await.unwrap();

    let err = engine.start_experiment("exp-1").await.unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidState {
            status: ExperimentStatus::Running,
            operation: "start",
            ..
        }
    ));
}

#[tokio::test]
async fn test_stop_records_reason() {
    let engine = engine();
    engine.create_experiment(homepage_cta("exp-1")).await.unwrap();
    engine.start_experiment("exp-1").await.unwrap();

    let paused = engine
        .stop_experiment("exp-1", Some("traffic spike"))
        .await
        .unwrap();
    assert_eq!(paused.status(), ExperimentStatus::Paused);

    let last = paused.status_history().last().unwrap();
    assert_eq!(last.from, ExperimentStatus::Running);
    assert_eq!(last.to, ExperimentStatus::Paused);
    assert_eq!(last.reason.as_deref(), Some("traffic spike"));
}

#[tokio::test]
async fn test_stop_unknown_experiment() {
    let engine = engine();
    let err = engine.stop_experiment("missing", None).await.unwrap_err();
    assert!(matches!(err, Error::ExperimentNotFound(id) if id == "missing"));
}

#[tokio::test]
async fn test_stop_draft_pauses() {
    let engine = engine();
    engine.create_experiment(homepage_cta("exp-1")).await.unwrap();
    let paused = engine.stop_experiment("exp-1", None).await.unwrap();
    assert_eq!(paused.status(), ExperimentStatus::Paused);
}

#[tokio::test]
async fn test_complete_is_terminal() {
    let engine = engine();
    engine.create_experiment(homepage_cta("exp-1")).await.unwrap();
    engine.start_experiment("exp-1").await.unwrap();

    let outcome = engine.complete_experiment("exp-1", None).await.unwrap();
    assert_eq!(outcome.value.status(), ExperimentStatus::Completed);
    assert!(outcome.value.end_date().is_some());
    assert_eq!(outcome.warnings, vec![Warning::NotSignificant]);

    assert!(engine.start_experiment("exp-1").await.unwrap_err().is_invalid_state());
    assert!(engine.stop_experiment("exp-1", None).await.unwrap_err().is_invalid_state());
    assert!(engine
        .complete_experiment("exp-1", None)
        .await
        .unwrap_err()
        .is_invalid_state());
}

#[tokio::test]
async fn test_complete_from_paused_with_explicit_winner() {
    let engine = engine();
    engine.create_experiment(homepage_cta("exp-1")).await.unwrap();
    engine.start_experiment("exp-1").await.unwrap();
    engine.stop_experiment("exp-1", None).await.unwrap();

    let outcome = engine.complete_experiment("exp-1", Some("v2")).await.unwrap();
    let results = outcome.value.results().unwrap();
    assert_eq!(results.winning_variation.as_deref(), Some("v2"));
    assert!(!results.statistical_significance);
    assert!(outcome.has_warnings());
}

// =============================================================================
// Update
// =============================================================================

#[tokio::test]
async fn test_update_running_fails_and_leaves_record() {
    let engine = engine();
    engine.create_experiment(homepage_cta("exp-1")).await.unwrap();
    let running = engine.start_experiment("exp-1").await.unwrap();

    let err = engine
        .update_experiment("exp-1", ExperimentUpdate::new().name("Renamed"))
        .await
        .unwrap_err();
    assert!(err.is_invalid_state());

    let stored = engine.store().get("exp-1").await.unwrap().unwrap();
    assert_eq!(stored, running);
}

#[tokio::test]
async fn test_update_merges_allowed_fields() {
    let engine = engine();
    let created = engine.create_experiment(homepage_cta("exp-1")).await.unwrap().value;
    let end = created.created_date() + chrono::Duration::days(14);

    let updated = engine
        .update_experiment(
            "exp-1",
            ExperimentUpdate::new()
                .name("Homepage CTA v2")
                .description("Second round")
                .traffic_allocation(25.0)
                .end_date(end)
                .metrics(vec![Metric::new("purchase")]),
        )
        .await
        .unwrap();

    assert_eq!(updated.name(), "Homepage CTA v2");
    assert_eq!(updated.description(), Some("Second round"));
    assert!((updated.traffic_allocation() - 25.0).abs() < f64::EPSILON);
    assert_eq!(updated.end_date(), Some(end));
    assert_eq!(updated.metrics(), &[Metric::new("purchase")]);

    // Everything else is untouched.
    assert_eq!(updated.status(), ExperimentStatus::Draft);
    assert_eq!(updated.variations(), created.variations());
    assert_eq!(updated.results(), created.results());
}

#[tokio::test]
async fn test_update_paused_allowed() {
    let engine = engine();
    engine.create_experiment(homepage_cta("exp-1")).await.unwrap();
    engine.start_experiment("exp-1").await.unwrap();
    engine.stop_experiment("exp-1", None).await.unwrap();

    let updated = engine
        .update_experiment("exp-1", ExperimentUpdate::new().name("Paused rename"))
        .await
        .unwrap();
    assert_eq!(updated.name(), "Paused rename");
}

// =============================================================================
// Delete / get / list
// =============================================================================

#[tokio::test]
async fn test_delete_running_requires_force() {
    let engine = engine();
    engine.create_experiment(homepage_cta("exp-1")).await.unwrap();
    engine.start_experiment("exp-1").await.unwrap();

    let err = engine.delete_experiment("exp-1", false).await.unwrap_err();
    assert!(err.is_invalid_state());
    assert!(engine.get_experiment("exp-1").await.is_ok());

    engine.delete_experiment("exp-1", true).await.unwrap();
    let err = engine.get_experiment("exp-1").await.unwrap_err();
    assert!(matches!(err, Error::ExperimentNotFound(_)));
}

#[tokio::test]
async fn test_delete_draft_without_force() {
    let engine = engine();
    engine.create_experiment(homepage_cta("exp-1")).await.unwrap();
    engine.delete_experiment("exp-1", false).await.unwrap();
    assert!(engine.store().is_empty());

    assert!(engine
        .delete_experiment("exp-1", false)
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_list_and_count_with_filters() {
    let engine = engine();
    engine.create_experiment(homepage_cta("exp-1")).await.unwrap();
    engine.create_experiment(homepage_cta("exp-2")).await.unwrap();
    engine
        .create_experiment(
            ExperimentConfig::builder("exp-3", "Pricing", "pricing")
                .variation(Variation::builder("a", "pricing", 50.0).control().build())
                .variation(Variation::new("b", "pricing-annual", 50.0))
                .build(),
        )
        .await
        .unwrap();
    engine.start_experiment("exp-2").await.unwrap();

    let running = ExperimentFilter::default().with_status(ExperimentStatus::Running);
    let listed = engine.list_experiments(&running, None).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id(), "exp-2");

    let by_content = ExperimentFilter::default().with_content_id("home-green");
    assert_eq!(engine.count_experiments(&by_content).await.unwrap(), 2);

    let limited = engine
        .list_experiments(&ExperimentFilter::default(), Some(2))
        .await
        .unwrap();
    assert_eq!(limited.len(), 2);
    assert_eq!(
        engine
            .count_experiments(&ExperimentFilter::default())
            .await
            .unwrap(),
        3
    );
}

// =============================================================================
// Notifications
// =============================================================================

#[tokio::test]
async fn test_lifecycle_notifications() {
    let engine = engine();
    let mut events = engine.subscribe();

    engine.create_experiment(homepage_cta("exp-1")).await.unwrap();
    engine.start_experiment("exp-1").await.unwrap();
    engine.stop_experiment("exp-1", Some("freeze")).await.unwrap();
    engine.complete_experiment("exp-1", None).await.unwrap();
    engine.delete_experiment("exp-1", false).await.unwrap();

    let id = || "exp-1".to_string();
    assert_eq!(events.recv().await.unwrap(), ExperimentEvent::Created { experiment_id: id() });
    assert_eq!(events.recv().await.unwrap(), ExperimentEvent::Started { experiment_id: id() });
    assert_eq!(
        events.recv().await.unwrap(),
        ExperimentEvent::Stopped {
            experiment_id: id(),
            reason: Some("freeze".into())
        }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        ExperimentEvent::Completed {
            experiment_id: id(),
            winning_variation: None
        }
    );
    assert_eq!(events.recv().await.unwrap(), ExperimentEvent::Deleted { experiment_id: id() });
}

#[tokio::test]
async fn test_failed_operation_publishes_nothing() {
    let engine = engine();
    let mut events = engine.subscribe();

    let _ = engine.start_experiment("missing").await;
    assert!(events.try_recv().is_err());
}
