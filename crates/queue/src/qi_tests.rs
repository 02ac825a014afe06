// SPDX-License-Identifier: MIT

use super::*;
use crate::stream::StreamPos;
use tempfile::tempdir;

fn sample() -> QueueInfo {
    QueueInfo {
        queue_type: QueueType::Disk,
        phys_size: 42,
        bytes_on_disk: 4096,
        bytes_read: 512,
        write: StreamPos { file_num: 3, offset: 100 },
        read_del: StreamPos { file_num: 2, offset: 7 },
    }
}

#[test]
fn absent_sidecar_is_clean_start() {
    let dir = tempdir().unwrap();
    let prefix = dir.path().join("q");
    assert!(QueueInfo::load(&prefix).unwrap().is_none());
    assert!(!QueueInfo::exists(&prefix));
}

#[test]
fn save_load_round_trip() {
    let dir = tempdir().unwrap();
    let prefix = dir.path().join("q");
    sample().save(&prefix).unwrap();

    assert!(QueueInfo::exists(&prefix));
    let loaded = QueueInfo::load(&prefix).unwrap().unwrap();
    assert_eq!(loaded, sample());
}

#[test]
fn save_overwrites_previous_checkpoint() {
    let dir = tempdir().unwrap();
    let prefix = dir.path().join("q");
    sample().save(&prefix).unwrap();

    let mut updated = sample();
    updated.phys_size = 7;
    updated.save(&prefix).unwrap();

    assert_eq!(QueueInfo::load(&prefix).unwrap().unwrap().phys_size, 7);
}

#[test]
fn remove_is_idempotent() {
    let dir = tempdir().unwrap();
    let prefix = dir.path().join("q");
    sample().save(&prefix).unwrap();

    QueueInfo::remove(&prefix).unwrap();
    assert!(!QueueInfo::exists(&prefix));
    QueueInfo::remove(&prefix).unwrap();
}
