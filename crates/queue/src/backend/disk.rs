// SPDX-License-Identifier: MIT

//! Disk backend: JSON-lines segment files plus the queue-info
//! sidecar for restart.

use crate::qi::QueueInfo;
use crate::stream::{SegmentReader, SegmentWriter, StreamPos};
use rill_core::{Msg, MsgRecord, PersistError};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug)]
pub(crate) struct DiskStore {
    prefix: PathBuf,
    write: SegmentWriter,
    /// Dequeue head; never unlinks segments.
    read_deq: SegmentReader,
    /// Delete head; unlinks segments it finishes.
    read_del: SegmentReader,
    bytes_on_disk: u64,
    bytes_read: u64,
}

impl DiskStore {
    /// Fresh store with no prior state.
    pub fn create(prefix: PathBuf, max_file_size: u64) -> Self {
        let start = StreamPos { file_num: 1, offset: 0 };
        Self {
            write: SegmentWriter::create(prefix.clone(), max_file_size),
            read_deq: SegmentReader::at(prefix.clone(), start, false),
            read_del: SegmentReader::at(prefix.clone(), start, true),
            prefix,
            bytes_on_disk: 0,
            bytes_read: 0,
        }
    }

    /// Rehydrate from a persisted sidecar. The dequeue head restarts
    /// at the delete head, so any batch that was in flight at
    /// shutdown is redelivered.
    pub fn resume(prefix: PathBuf, max_file_size: u64, info: &QueueInfo) -> Result<Self, PersistError> {
        let write = SegmentWriter::resume(prefix.clone(), max_file_size, info.write)?;
        Ok(Self {
            read_deq: SegmentReader::at(prefix.clone(), info.read_del, false),
            read_del: SegmentReader::at(prefix.clone(), info.read_del, true),
            prefix,
            write,
            bytes_on_disk: info.bytes_on_disk,
            bytes_read: info.bytes_read,
        })
    }

    pub fn add(&mut self, msg: &Msg) -> Result<(), PersistError> {
        let line = serde_json::to_vec(msg.as_ref())?;
        let written = self.write.append(&line)?;
        self.bytes_on_disk += written;
        Ok(())
    }

    pub fn deq(&mut self) -> Result<Option<Msg>, PersistError> {
        match self.read_deq.next_record(self.write.pos())? {
            None => Ok(None),
            Some((line, _len)) => {
                let rec: MsgRecord = serde_json::from_slice(&line)?;
                Ok(Some(Arc::new(rec)))
            }
        }
    }

    pub fn del(&mut self) -> Result<(), PersistError> {
        if let Some((_, len)) = self.read_del.next_record(self.write.pos())? {
            self.bytes_read += len;
            self.bytes_on_disk = self.bytes_on_disk.saturating_sub(len);
        }
        Ok(())
    }

    /// Rewind the dequeue head to the delete head. Disk queues run a
    /// single worker, so everything logically dequeued belongs to
    /// the one batch being requeued.
    pub fn requeue(&mut self, n: usize) -> usize {
        self.read_deq.seek_to(self.read_del.pos());
        n
    }

    pub fn bytes_on_disk(&self) -> u64 {
        self.bytes_on_disk
    }

    /// Sidecar snapshot of the current stream state.
    pub fn queue_info(&self, queue_type: crate::params::QueueType, phys_size: usize) -> QueueInfo {
        QueueInfo {
            queue_type,
            phys_size,
            bytes_on_disk: self.bytes_on_disk,
            bytes_read: self.bytes_read,
            write: self.write.pos(),
            read_del: self.read_del.pos(),
        }
    }

    /// Remove all remaining segment files (queue shut down empty).
    pub fn discard_files(&self) {
        let from = self.read_del.pos().file_num;
        let to = self.write.pos().file_num;
        for num in from..=to {
            let path = crate::stream::segment_path(&self.prefix, num);
            if path.exists() {
                if let Err(err) = std::fs::remove_file(&path) {
                    tracing::warn!(path = %path.display(), %err, "could not remove drained segment");
                }
            }
        }
    }
}
