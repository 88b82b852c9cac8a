use std::time::Duration;

use super::*;

#[test]
fn manual_clock_only_moves_when_advanced() {
    let clock = ManualClock::new(1_000);
    assert_eq!(clock.now_ms(), 1_000);
    assert_eq!(clock.now_ms(), 1_000);

    clock.advance(Duration::from_secs(30));
    assert_eq!(clock.now_ms(), 31_000);

    clock.set(5);
    assert_eq!(clock.now_ms(), 5);
}

#[test]
fn system_clock_is_after_epoch() {
    assert!(SystemClock.now_ms() > 1_600_000_000_000);
}
