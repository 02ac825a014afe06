// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn fake_clock_advances() {
    let clock = FakeClock::new();
    let t0 = clock.now();
    let e0 = clock.epoch_ms();

    clock.advance(Duration::from_secs(5));

    assert_eq!(clock.now() - t0, Duration::from_secs(5));
    assert_eq!(clock.epoch_ms() - e0, 5_000);
    assert_eq!(clock.epoch_s(), e0 / 1000 + 5);
}

#[test]
fn fake_clock_wall_time_is_settable() {
    let clock = FakeClock::new();
    clock.set_hms(3, 15, 40);
    assert_eq!(clock.local_hms(), (3, 15, 40));
}

#[test]
fn system_clock_reports_sane_values() {
    let clock = SystemClock;
    assert!(clock.epoch_ms() > 1_600_000_000_000);
    let (h, m, s) = clock.local_hms();
    assert!(h < 24 && m < 60 && s < 61);
}
