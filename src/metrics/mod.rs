use lazy_static::lazy_static;
use prometheus::register_int_counter_vec;
use prometheus::register_int_gauge;
use prometheus::Encoder;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::TextEncoder;

#[cfg(test)]
mod metrics_test;

lazy_static! {
    pub static ref ACTIVE_WATCH_WORKERS: IntGauge = register_int_gauge!(
        "watcher_active_workers",
        "Number of watch workers currently running"
    )
    .expect("metric can not be created");

    pub static ref WATCH_EVENTS_DELIVERED: IntCounterVec = register_int_counter_vec!(
        "watcher_events_delivered",
        "Notifications handed to listeners",
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref WATCH_EXITS: IntCounterVec = register_int_counter_vec!(
        "watcher_exits",
        "Watch workers that have exited",
        &["cause"]
    )
    .expect("metric can not be created");
}

/// Renders the default registry in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!("could not encode metrics: {}", e);
        return String::default();
    }
    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("metrics could not be from_utf8'd: {}", e);
        String::default()
    })
}
