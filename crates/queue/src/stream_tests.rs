// SPDX-License-Identifier: MIT

use super::*;
use tempfile::tempdir;

fn prefix(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("q")
}

#[test]
fn write_then_read_in_order() {
    let dir = tempdir().unwrap();
    let mut writer = SegmentWriter::create(prefix(&dir), 1024 * 1024);
    for rec in ["one", "two", "three"] {
        writer.append(rec.as_bytes()).unwrap();
    }

    let start = StreamPos { file_num: 1, offset: 0 };
    let mut reader = SegmentReader::at(prefix(&dir), start, false);
    let mut seen = Vec::new();
    while let Some((line, _)) = reader.next_record(writer.pos()).unwrap() {
        seen.push(String::from_utf8(line).unwrap());
    }
    assert_eq!(seen, ["one", "two", "three"]);
}

#[test]
fn reader_stops_at_write_head() {
    let dir = tempdir().unwrap();
    let mut writer = SegmentWriter::create(prefix(&dir), 1024 * 1024);
    writer.append(b"only").unwrap();

    let mut reader = SegmentReader::at(prefix(&dir), StreamPos { file_num: 1, offset: 0 }, false);
    assert!(reader.next_record(writer.pos()).unwrap().is_some());
    assert!(reader.next_record(writer.pos()).unwrap().is_none());

    // more data appears, the same reader picks it up
    writer.append(b"later").unwrap();
    let (line, _) = reader.next_record(writer.pos()).unwrap().unwrap();
    assert_eq!(line, b"later");
}

#[test]
fn writer_rotates_at_max_file_size() {
    let dir = tempdir().unwrap();
    let mut writer = SegmentWriter::create(prefix(&dir), 16);
    for i in 0..6 {
        writer.append(format!("record-{i}").as_bytes()).unwrap();
    }
    assert!(writer.pos().file_num > 1);

    // all records still readable across the segment boundary
    let mut reader = SegmentReader::at(prefix(&dir), StreamPos { file_num: 1, offset: 0 }, false);
    let mut count = 0;
    while reader.next_record(writer.pos()).unwrap().is_some() {
        count += 1;
    }
    assert_eq!(count, 6);
}

#[test]
fn delete_head_unlinks_consumed_segments() {
    let dir = tempdir().unwrap();
    let mut writer = SegmentWriter::create(prefix(&dir), 16);
    for i in 0..6 {
        writer.append(format!("record-{i}").as_bytes()).unwrap();
    }
    let first_segment = segment_path(&prefix(&dir), 1);
    assert!(first_segment.exists());

    let mut del = SegmentReader::at(prefix(&dir), StreamPos { file_num: 1, offset: 0 }, true);
    while del.next_record(writer.pos()).unwrap().is_some() {}
    assert!(!first_segment.exists());
}

#[test]
fn resume_truncates_torn_tail() {
    let dir = tempdir().unwrap();
    let pos = {
        let mut writer = SegmentWriter::create(prefix(&dir), 1024 * 1024);
        writer.append(b"committed").unwrap();
        let pos = writer.pos();
        writer.append(b"torn-after-checkpoint").unwrap();
        pos
    };

    let mut writer = SegmentWriter::resume(prefix(&dir), 1024 * 1024, pos).unwrap();
    writer.append(b"fresh").unwrap();

    let mut reader = SegmentReader::at(prefix(&dir), StreamPos { file_num: 1, offset: 0 }, false);
    let mut seen = Vec::new();
    while let Some((line, _)) = reader.next_record(writer.pos()).unwrap() {
        seen.push(String::from_utf8(line).unwrap());
    }
    assert_eq!(seen, ["committed", "fresh"]);
}
