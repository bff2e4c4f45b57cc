use super::*;

#[test]
fn test_counter_increment() {
    WATCH_EXITS.with_label_values(&["metrics_test"]).inc();
    WATCH_EXITS.with_label_values(&["metrics_test"]).inc();

    let value = WATCH_EXITS.with_label_values(&["metrics_test"]).get();
    assert!(value >= 2, "Counter should increment correctly");
}

#[test]
fn test_gather_metrics_renders_registered_names() {
    WATCH_EVENTS_DELIVERED.with_label_values(&["create"]).inc();
    ACTIVE_WATCH_WORKERS.get();

    let body = gather_metrics();

    assert!(body.contains("watcher_events_delivered"), "Missing watcher_events_delivered");
    assert!(body.contains("watcher_active_workers"), "Missing watcher_active_workers");
}
