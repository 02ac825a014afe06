// SPDX-License-Identifier: MIT

//! Queue lifecycle errors.

use rill_core::{AdmissionError, PersistError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Admission(#[from] AdmissionError),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("queue already started")]
    AlreadyStarted,
}
