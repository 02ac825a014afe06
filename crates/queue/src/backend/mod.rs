// SPDX-License-Identifier: MIT

//! Queue storage backends.
//!
//! A tagged variant instead of a trait object: the per-backend state
//! sits inline, and dispatch is a `match` in the hot path.
//!
//! The common contract is `add` / `deq` / `del` / `requeue`:
//! `deq` hands out a record without removing it, `del` removes the
//! oldest record once its batch committed, and `requeue` rewinds the
//! dequeue head so logically dequeued records are redelivered.

mod array;
mod disk;
mod list;

pub(crate) use array::ArrayStore;
pub(crate) use disk::DiskStore;
pub(crate) use list::ListStore;

use rill_core::{Msg, PersistError};

#[derive(Debug)]
pub(crate) enum Backend {
    Array(ArrayStore),
    List(ListStore),
    Disk(DiskStore),
    /// No storage: the producer runs the consumer synchronously.
    Direct,
}

impl Backend {
    pub fn add(&mut self, msg: Msg) -> Result<(), PersistError> {
        match self {
            Backend::Array(store) => {
                store.add(msg);
                Ok(())
            }
            Backend::List(store) => {
                store.add(msg);
                Ok(())
            }
            Backend::Disk(store) => store.add(&msg),
            Backend::Direct => Ok(()),
        }
    }

    pub fn deq(&mut self) -> Result<Option<Msg>, PersistError> {
        match self {
            Backend::Array(store) => Ok(store.deq()),
            Backend::List(store) => Ok(store.deq()),
            Backend::Disk(store) => store.deq(),
            Backend::Direct => Ok(None),
        }
    }

    pub fn del(&mut self) -> Result<(), PersistError> {
        match self {
            Backend::Array(store) => {
                store.del();
                Ok(())
            }
            Backend::List(store) => {
                store.del();
                Ok(())
            }
            Backend::Disk(store) => store.del(),
            Backend::Direct => Ok(()),
        }
    }

    /// Rewind the dequeue head by up to `n` records; returns how
    /// many were actually rewound.
    pub fn requeue(&mut self, n: usize) -> usize {
        match self {
            Backend::Array(store) => store.requeue(n),
            Backend::List(store) => store.requeue(n),
            Backend::Disk(store) => store.requeue(n),
            Backend::Direct => 0,
        }
    }

    pub fn bytes_on_disk(&self) -> u64 {
        match self {
            Backend::Disk(store) => store.bytes_on_disk(),
            _ => 0,
        }
    }

    pub(crate) fn disk(&self) -> Option<&DiskStore> {
        match self {
            Backend::Disk(store) => Some(store),
            _ => None,
        }
    }
}
