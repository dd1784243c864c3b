use axum_prometheus::metrics::{counter, gauge};

/// Records a successful increment and publishes the new value.
pub fn increment(value: i64) {
    counter!("counter_increments_total").increment(1);
    value_read(value);
}

/// Publishes the last value seen by the api.
pub fn value_read(value: i64) {
    // gauges hold f64, exact up to 2^53
    gauge!("counter_value").set(value as f64);
}

/// Counts a storage failure by kind.
pub fn store_error(kind: &'static str) {
    counter!("counter_store_errors_total", "kind" => kind).increment(1);
}
