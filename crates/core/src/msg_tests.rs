// SPDX-License-Identifier: MIT

use super::*;
use yare::parameterized;

#[parameterized(
    emerg = { 0, Severity::Emergency },
    err = { 3, Severity::Error },
    debug = { 7, Severity::Debug },
)]
fn severity_round_trips_numeric(n: u8, expected: Severity) {
    let sev = Severity::from_num(n).unwrap();
    assert_eq!(sev, expected);
    assert_eq!(sev.as_num(), n);
}

#[test]
fn severity_out_of_range_is_none() {
    assert!(Severity::from_num(8).is_none());
}

#[test]
fn severity_orders_numerically() {
    // "at or above threshold" means numerically >=
    assert!(Severity::Debug > Severity::Info);
    assert!(Severity::Emergency < Severity::Error);
}

#[test]
fn priority_splits_pri_byte() {
    // 165 = facility 20 (local4), severity 5 (notice)
    let pri = Priority::from_pri(165);
    assert_eq!(pri.facility, Facility(20));
    assert_eq!(pri.severity, Severity::Notice);
    assert_eq!(pri.to_pri(), 165);
}

#[test]
fn dup_with_text_replaces_text_and_timestamps() {
    let orig = MsgRecord::builder().text("original").build();
    let dup = orig.dup_with_text("repeated 3 times", 2_000_000);

    assert_eq!(dup.text, "repeated 3 times");
    assert_eq!(dup.received_at, 2_000_000);
    assert_eq!(dup.host, orig.host);
    // the original is untouched
    assert_eq!(orig.text, "original");
}

#[test]
fn repeats_requires_same_origin_and_text() {
    let a = MsgRecord::builder().text("same").build();
    let b = MsgRecord::builder().text("same").build();
    let c = MsgRecord::builder().text("different").build();
    let d = MsgRecord::builder().text("same").host("other-host").build();

    assert!(a.repeats(&b));
    assert!(!a.repeats(&c));
    assert!(!a.repeats(&d));
}

#[test]
fn record_serde_round_trip() {
    let rec = MsgRecord::builder()
        .text("hello")
        .structured_data("[x@1 k=\"v\"]")
        .mark(false)
        .build();

    let json = serde_json::to_string(&rec).unwrap();
    let back: MsgRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(back, rec);
}
