use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::register_histogram_vec;
use prometheus::register_int_counter;
use prometheus::Encoder;
use prometheus::HistogramVec;
use prometheus::IntCounter;
use prometheus::TextEncoder;

#[cfg(test)]
mod metrics_test;

lazy_static! {
    pub static ref LOCK_CONTENTION_TOTAL: IntCounter = register_int_counter!(
        "turnstile_lock_contention_total",
        "Lease acquisitions rejected because another holder owned the game"
    )
    .expect("metric can not be created");

    pub static ref VERSION_CONFLICT_TOTAL: IntCounter = register_int_counter!(
        "turnstile_version_conflict_total",
        "Atomic attempts whose expected version did not match the stored one"
    )
    .expect("metric can not be created");

    pub static ref ATOMIC_OPERATION_DURATION_MS: HistogramVec = register_histogram_vec!(
        "turnstile_atomic_operation_duration_ms",
        "Histogram of atomic operation duration in ms",
        &["outcome"],
        exponential_buckets(1.0, 2.0, 15).unwrap()
    )
    .expect("metric can not be created");

    pub static ref EVENTS_DISPATCHED_TOTAL: IntCounter = register_int_counter!(
        "turnstile_events_dispatched_total",
        "Events persisted and fanned out to subscribers"
    )
    .expect("metric can not be created");

    pub static ref HANDLER_FAILURES_TOTAL: IntCounter = register_int_counter!(
        "turnstile_handler_failures_total",
        "Subscriber invocations that returned an error or panicked"
    )
    .expect("metric can not be created");

    pub static ref EVENTS_DROPPED_TOTAL: IntCounter = register_int_counter!(
        "turnstile_events_dropped_total",
        "Events dropped after exhausting persistence retries"
    )
    .expect("metric can not be created");
}

/// Render the default registry in the Prometheus text format
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&prometheus::gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
