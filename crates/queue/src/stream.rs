// SPDX-License-Identifier: MIT

//! Rotating segment files backing disk queues.
//!
//! A queue's payload lives in numbered segments
//! (`<prefix>.00000001`, `<prefix>.00000002`, …), each a sequence of
//! newline-delimited JSON records. One writer appends at the head;
//! two readers trail it: the dequeue head (hands records to
//! workers) and the delete head (reclaims committed records and
//! unlinks exhausted segments).
//!
//! All access is serialized by the owning queue's mutex, so a
//! record line is always fully written before any reader can reach
//! its offset.

use rill_core::PersistError;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Position inside a segment stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamPos {
    pub file_num: u32,
    pub offset: u64,
}

pub(crate) fn segment_path(prefix: &Path, file_num: u32) -> PathBuf {
    let stem = prefix
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "queue".to_string());
    prefix.with_file_name(format!("{stem}.{file_num:08}"))
}

/// Append head of a segment stream.
#[derive(Debug)]
pub(crate) struct SegmentWriter {
    prefix: PathBuf,
    max_file_size: u64,
    pos: StreamPos,
    file: Option<File>,
}

impl SegmentWriter {
    /// Start a fresh stream at segment 1, offset 0.
    pub fn create(prefix: PathBuf, max_file_size: u64) -> Self {
        Self {
            prefix,
            max_file_size,
            pos: StreamPos { file_num: 1, offset: 0 },
            file: None,
        }
    }

    /// Reopen an existing stream at a persisted position. Any bytes
    /// past the position (torn writes after the last checkpoint) are
    /// truncated away.
    pub fn resume(prefix: PathBuf, max_file_size: u64, pos: StreamPos) -> Result<Self, PersistError> {
        let path = segment_path(&prefix, pos.file_num);
        let file = OpenOptions::new().write(true).create(true).open(&path)?;
        file.set_len(pos.offset)?;
        let mut file = file;
        file.seek(SeekFrom::Start(pos.offset))?;
        Ok(Self { prefix, max_file_size, pos, file: Some(file) })
    }

    pub fn pos(&self) -> StreamPos {
        self.pos
    }

    /// Append one record line; returns the bytes written including
    /// the terminating newline.
    pub fn append(&mut self, record: &[u8]) -> Result<u64, PersistError> {
        if self.pos.offset >= self.max_file_size && self.pos.offset > 0 {
            self.rotate();
        }
        if self.file.is_none() {
            let path = segment_path(&self.prefix, self.pos.file_num);
            let file = OpenOptions::new().append(true).create(true).open(&path)?;
            self.file = Some(file);
        }
        // unwrap-free: the branch above just filled it
        let Some(file) = self.file.as_mut() else {
            return Err(PersistError::Io(std::io::Error::other("segment writer lost its file")));
        };
        file.write_all(record)?;
        file.write_all(b"\n")?;
        file.flush()?;
        let written = record.len() as u64 + 1;
        self.pos.offset += written;
        Ok(written)
    }

    fn rotate(&mut self) {
        self.file = None;
        self.pos.file_num += 1;
        self.pos.offset = 0;
    }
}

/// A trailing read head over the segment stream.
#[derive(Debug)]
pub(crate) struct SegmentReader {
    prefix: PathBuf,
    pos: StreamPos,
    reader: Option<BufReader<File>>,
    /// Unlink a segment once this head has consumed it (the delete
    /// head reclaims disk space; the dequeue head must not).
    unlink_consumed: bool,
}

impl SegmentReader {
    pub fn at(prefix: PathBuf, pos: StreamPos, unlink_consumed: bool) -> Self {
        Self { prefix, pos, reader: None, unlink_consumed }
    }

    pub fn pos(&self) -> StreamPos {
        self.pos
    }

    /// Rewind (or jump) this head to another position.
    pub fn seek_to(&mut self, pos: StreamPos) {
        self.reader = None;
        self.pos = pos;
    }

    /// Read the next record line, or `None` when caught up with the
    /// write head. Returns the line bytes (without newline) and the
    /// on-disk length consumed.
    pub fn next_record(&mut self, write_pos: StreamPos) -> Result<Option<(Vec<u8>, u64)>, PersistError> {
        loop {
            if self.pos == write_pos {
                return Ok(None);
            }
            if self.reader.is_none() {
                let path = segment_path(&self.prefix, self.pos.file_num);
                let mut file = File::open(&path)?;
                file.seek(SeekFrom::Start(self.pos.offset))?;
                self.reader = Some(BufReader::new(file));
            }
            let Some(reader) = self.reader.as_mut() else {
                continue;
            };
            let mut line = String::new();
            let n = reader.read_line(&mut line)?;
            if n == 0 {
                // end of this segment
                if self.pos.file_num < write_pos.file_num {
                    self.advance_segment();
                    continue;
                }
                return Ok(None);
            }
            self.pos.offset += n as u64;
            let mut bytes = line.into_bytes();
            if bytes.last() == Some(&b'\n') {
                bytes.pop();
            }
            return Ok(Some((bytes, n as u64)));
        }
    }

    fn advance_segment(&mut self) {
        self.reader = None;
        if self.unlink_consumed {
            let path = segment_path(&self.prefix, self.pos.file_num);
            if let Err(err) = fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), %err, "could not unlink consumed segment");
            }
        }
        self.pos.file_num += 1;
        self.pos.offset = 0;
    }
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
