// SPDX-License-Identifier: MIT

use super::*;
use yare::parameterized;

#[test]
fn defaults_derive_watermarks_from_capacity() {
    let params = QueueParams::default();
    assert_eq!(params.capacity, 1000);
    assert_eq!(params.effective_high_mark(), 800);
    assert_eq!(params.effective_low_mark(), 200);
    assert_eq!(params.effective_discard_mark(), 980);
    assert_eq!(params.effective_full_delay_mark(), 970);
    assert_eq!(params.effective_light_delay_mark(), 700);
}

#[test]
fn explicit_watermarks_win_over_derived() {
    let params = QueueParams::default().capacity(100).high_mark(80).low_mark(10);
    assert_eq!(params.effective_high_mark(), 80);
    assert_eq!(params.effective_low_mark(), 10);
}

#[test]
fn disk_queues_pin_one_worker() {
    let params = QueueParams::default().queue_type(QueueType::Disk).num_workers(8);
    assert_eq!(params.effective_num_workers(), 1);
}

#[parameterized(
    zero_capacity = { QueueParams::default().capacity(0) },
    zero_batch = { QueueParams::default().deq_batch_size(0) },
    disk_without_prefix = { QueueParams::default().queue_type(QueueType::Disk) },
    mark_over_capacity = { QueueParams::default().capacity(10).high_mark(11) },
    bad_window = { QueueParams::default().deq_window(25, 4) },
)]
fn validate_rejects(params: QueueParams) {
    assert!(params.validate().is_err());
}

#[test]
fn direct_queues_skip_validation() {
    let params = QueueParams::default().queue_type(QueueType::Direct).capacity(0);
    assert!(params.validate().is_ok());
}

#[test]
fn da_capable_needs_memory_type_and_prefix() {
    assert!(!QueueParams::default().da_capable());
    assert!(QueueParams::default().file_prefix("/tmp/q").da_capable());
    assert!(!QueueParams::default()
        .queue_type(QueueType::Disk)
        .file_prefix("/tmp/q")
        .da_capable());
}

#[test]
fn params_deserialize_from_toml() {
    let params: QueueParams = toml::from_str(
        r#"
            type = "linked-list"
            capacity = 5000
            deq-batch-size = 64
            discard-severity = "info"
            save-on-shutdown = true
            deq-window = { from-hour = 22, to-hour = 4 }
        "#,
    )
    .unwrap();
    assert_eq!(params.queue_type, QueueType::LinkedList);
    assert_eq!(params.capacity, 5000);
    assert_eq!(params.deq_batch_size, 64);
    assert_eq!(params.discard_severity, Some(rill_core::Severity::Info));
    assert!(params.save_on_shutdown);
    assert_eq!(params.deq_window, Some(DeqWindow { from_hour: 22, to_hour: 4 }));
}
