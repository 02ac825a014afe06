// SPDX-License-Identifier: MIT

//! Error taxonomy shared across the queue and action engines.

use thiserror::Error;

/// Enqueue admission failures, returned to the submitting input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// Capacity (or disk budget) stayed exhausted past the enqueue
    /// timeout; the record was dropped.
    #[error("queue full, record dropped after enqueue timeout")]
    Full,
    /// Record discarded at the discard water-mark because its
    /// severity was at or above the discard threshold.
    #[error("queue near full, record discarded by severity")]
    FullDropped,
    #[error("queue not started")]
    NotStarted,
    #[error("invalid queue parameters: {0}")]
    InvalidParams(String),
}

/// Persistence failures on disk-backed queues.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("queue file i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("queue file encoding: {0}")]
    Codec(#[from] serde_json::Error),
    /// The sidecar records a different queue type than configured.
    /// The queue refuses to start rather than misread the store.
    #[error("persisted queue type '{found}' does not match configured '{expected}'")]
    TypeMismatch { expected: String, found: String },
}

/// Failures surfaced by a consumer while processing a batch.
/// Handled locally by the queue's worker; never returned to inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Output temporarily unavailable; the action went to retry.
    #[error("action suspended")]
    Suspended,
    /// The batch is bad and the action transiently unusable.
    #[error("action failed for this batch")]
    ActionFailed,
    /// The action is out of service until reload.
    #[error("action disabled")]
    Disabled,
    /// Processing was cut short by an immediate shutdown.
    #[error("aborted by shutdown")]
    ForceTerminate,
}
