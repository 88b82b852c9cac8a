use super::*;

#[test]
fn gather_text_includes_registered_metrics() {
    LOCK_CONTENTION_TOTAL.inc();
    ATOMIC_OPERATION_DURATION_MS
        .with_label_values(&["success"])
        .observe(3.0);

    let text = gather_text();

    assert!(text.contains("turnstile_lock_contention_total"));
    assert!(text.contains("turnstile_atomic_operation_duration_ms"));
}
