// SPDX-License-Identifier: MIT

//! Queue configuration surface.

use rill_core::{AdmissionError, Severity};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Queue storage backend selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueType {
    /// Pre-allocated ring buffer, O(1), bounded.
    #[default]
    FixedArray,
    /// Grow-on-demand store with a lagging delete head.
    LinkedList,
    /// On-disk segment files with a queue-info sidecar.
    Disk,
    /// No buffering: the producer runs the consumer synchronously.
    Direct,
}

rill_core::simple_display! {
    QueueType {
        FixedArray => "fixed-array",
        LinkedList => "linked-list",
        Disk => "disk",
        Direct => "direct",
    }
}

/// Dequeue time window in local wall-clock hours.
///
/// `from = 22, to = 4` means "run from 10pm through 4am", i.e. the
/// window may wrap midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeqWindow {
    pub from_hour: u32,
    pub to_hour: u32,
}

/// Per-queue options (§ configuration surface).
///
/// Water-marks left unset derive from capacity at start; see the
/// accessor methods for the percentages.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct QueueParams {
    #[serde(rename = "type")]
    pub queue_type: QueueType,
    /// Maximum number of records held (physical size bound).
    pub capacity: usize,
    pub deq_batch_size: usize,
    pub high_mark: Option<usize>,
    pub low_mark: Option<usize>,
    pub discard_mark: Option<usize>,
    pub full_delay_mark: Option<usize>,
    pub light_delay_mark: Option<usize>,
    /// Records at or above this severity are dropped at the discard
    /// mark. `None` disables severity discard entirely.
    pub discard_severity: Option<Severity>,
    pub num_workers: usize,
    /// Ramp factor for elastic worker scaling: one worker advised
    /// per this many queued records. 0 pins a single worker.
    pub min_msgs_per_worker: usize,
    /// Spool path prefix, e.g. `/var/spool/rill/actq`. Required for
    /// disk queues; enables disk-assist on memory queues.
    pub file_prefix: Option<PathBuf>,
    pub max_file_size: u64,
    /// Disk budget across all segments. 0 = unlimited.
    pub max_disk_bytes: u64,
    /// Persist the queue-info sidecar every N updates. 0 = only at
    /// shutdown.
    pub persist_update_count: usize,
    pub save_on_shutdown: bool,
    pub queue_shutdown_timeout_ms: u64,
    pub action_shutdown_timeout_ms: u64,
    /// Worker inactivity timeout: an idle worker past this exits.
    pub worker_shutdown_timeout_ms: u64,
    pub enqueue_timeout_ms: u64,
    /// Post-consume sleep in microseconds to cap throughput.
    pub deq_slowdown_us: u64,
    pub deq_window: Option<DeqWindow>,
}

impl Default for QueueParams {
    fn default() -> Self {
        Self {
            queue_type: QueueType::FixedArray,
            capacity: 1000,
            deq_batch_size: 8,
            high_mark: None,
            low_mark: None,
            discard_mark: None,
            full_delay_mark: None,
            light_delay_mark: None,
            discard_severity: None,
            num_workers: 1,
            min_msgs_per_worker: 100,
            file_prefix: None,
            max_file_size: 1024 * 1024,
            max_disk_bytes: 0,
            persist_update_count: 0,
            save_on_shutdown: false,
            queue_shutdown_timeout_ms: 1500,
            action_shutdown_timeout_ms: 1000,
            worker_shutdown_timeout_ms: 60_000,
            enqueue_timeout_ms: 2000,
            deq_slowdown_us: 0,
            deq_window: None,
        }
    }
}

impl QueueParams {
    rill_core::setters! {
        set {
            queue_type: QueueType,
            capacity: usize,
            deq_batch_size: usize,
            num_workers: usize,
            min_msgs_per_worker: usize,
            max_file_size: u64,
            max_disk_bytes: u64,
            persist_update_count: usize,
            save_on_shutdown: bool,
            queue_shutdown_timeout_ms: u64,
            action_shutdown_timeout_ms: u64,
            worker_shutdown_timeout_ms: u64,
            enqueue_timeout_ms: u64,
            deq_slowdown_us: u64,
        }
    }

    pub fn file_prefix(mut self, v: impl Into<PathBuf>) -> Self {
        self.file_prefix = Some(v.into());
        self
    }

    pub fn discard_severity(mut self, v: Severity) -> Self {
        self.discard_severity = Some(v);
        self
    }

    pub fn high_mark(mut self, v: usize) -> Self {
        self.high_mark = Some(v);
        self
    }

    pub fn low_mark(mut self, v: usize) -> Self {
        self.low_mark = Some(v);
        self
    }

    pub fn discard_mark(mut self, v: usize) -> Self {
        self.discard_mark = Some(v);
        self
    }

    pub fn full_delay_mark(mut self, v: usize) -> Self {
        self.full_delay_mark = Some(v);
        self
    }

    pub fn light_delay_mark(mut self, v: usize) -> Self {
        self.light_delay_mark = Some(v);
        self
    }

    pub fn deq_window(mut self, from_hour: u32, to_hour: u32) -> Self {
        self.deq_window = Some(DeqWindow { from_hour, to_hour });
        self
    }

    pub fn effective_high_mark(&self) -> usize {
        self.high_mark.unwrap_or(self.capacity * 80 / 100)
    }

    pub fn effective_low_mark(&self) -> usize {
        self.low_mark.unwrap_or(self.capacity * 20 / 100)
    }

    pub fn effective_discard_mark(&self) -> usize {
        self.discard_mark.unwrap_or(self.capacity * 98 / 100)
    }

    pub fn effective_full_delay_mark(&self) -> usize {
        self.full_delay_mark.unwrap_or(self.capacity * 97 / 100)
    }

    pub fn effective_light_delay_mark(&self) -> usize {
        self.light_delay_mark.unwrap_or(self.capacity * 70 / 100)
    }

    /// Worker count cap: disk queues pin exactly one worker.
    pub fn effective_num_workers(&self) -> usize {
        match self.queue_type {
            QueueType::Disk => 1,
            _ => self.num_workers.max(1),
        }
    }

    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }

    pub fn queue_shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_shutdown_timeout_ms)
    }

    pub fn action_shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.action_shutdown_timeout_ms)
    }

    pub fn worker_shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_shutdown_timeout_ms)
    }

    pub fn deq_slowdown(&self) -> Option<Duration> {
        (self.deq_slowdown_us > 0).then(|| Duration::from_micros(self.deq_slowdown_us))
    }

    pub fn validate(&self) -> Result<(), AdmissionError> {
        if self.queue_type == QueueType::Direct {
            return Ok(());
        }
        if self.capacity == 0 {
            return Err(AdmissionError::InvalidParams("capacity must be > 0".into()));
        }
        if self.deq_batch_size == 0 {
            return Err(AdmissionError::InvalidParams("deq-batch-size must be > 0".into()));
        }
        if self.queue_type == QueueType::Disk && self.file_prefix.is_none() {
            return Err(AdmissionError::InvalidParams(
                "disk queues require a file-prefix".into(),
            ));
        }
        if self.queue_type == QueueType::Disk && self.max_file_size < 1024 {
            return Err(AdmissionError::InvalidParams(
                "max-file-size must be at least 1 KiB".into(),
            ));
        }
        for (name, mark) in [
            ("high-mark", self.effective_high_mark()),
            ("discard-mark", self.effective_discard_mark()),
            ("full-delay-mark", self.effective_full_delay_mark()),
            ("light-delay-mark", self.effective_light_delay_mark()),
        ] {
            if mark > self.capacity {
                return Err(AdmissionError::InvalidParams(format!(
                    "{name} exceeds capacity"
                )));
            }
        }
        if let Some(win) = &self.deq_window {
            if win.from_hour > 23 || win.to_hour > 23 {
                return Err(AdmissionError::InvalidParams(
                    "dequeue window hours must be 0-23".into(),
                ));
            }
        }
        Ok(())
    }

    /// True when this queue may spill to a disk child above the
    /// high water-mark.
    pub fn da_capable(&self) -> bool {
        matches!(self.queue_type, QueueType::FixedArray | QueueType::LinkedList)
            && self.file_prefix.is_some()
    }
}

#[cfg(test)]
#[path = "params_tests.rs"]
mod tests;
