// SPDX-License-Identifier: MIT

//! Batches: ordered runs of record slots dequeued and committed together.

use crate::error::DispatchError;
use crate::msg::Msg;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-slot processing state.
///
/// States only progress `Ready → Submitted → Committed` or
/// `Ready → Bad`/`Discarded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Ready,
    Submitted,
    Committed,
    Discarded,
    Bad,
}

crate::simple_display! {
    SlotState {
        Ready => "rdy",
        Submitted => "sub",
        Committed => "comm",
        Discarded => "disc",
        Bad => "bad",
    }
}

/// Action parameters rendered ahead of the output call, per the
/// action's parameter-passing mode. `Record` passing needs no
/// buffer: the module receives the record reference itself.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderedParams {
    Rendered(Vec<String>),
    Lists(Vec<Vec<String>>),
    Record,
}

/// One record inside a batch.
#[derive(Debug, Clone)]
pub struct BatchSlot {
    pub msg: Msg,
    pub state: SlotState,
    /// Did the active rule's filter match this record?
    pub filter_matched: bool,
    /// Set when a previous action left this record unhandled;
    /// consumed by conditional-on-prior-fail actions.
    pub prev_was_suspended: bool,
    /// Rendered output parameters, dropped again after commit.
    pub params: Option<RenderedParams>,
}

impl BatchSlot {
    pub fn new(msg: Msg) -> Self {
        Self {
            msg,
            state: SlotState::Ready,
            filter_matched: true,
            prev_was_suspended: false,
            params: None,
        }
    }
}

/// An ordered run of slots dequeued together and committed as a unit.
#[derive(Debug, Clone)]
pub struct Batch {
    pub slots: Vec<BatchSlot>,
    /// Monotonically increasing dequeue id, assigned by the queue.
    pub deq_id: u64,
    /// Index below which every slot has been resolved.
    pub done_up_to: usize,
    shutdown: Arc<AtomicBool>,
}

impl Batch {
    pub fn new(shutdown: Arc<AtomicBool>) -> Self {
        Self { slots: Vec::new(), deq_id: 0, done_up_to: 0, shutdown }
    }

    pub fn with_capacity(shutdown: Arc<AtomicBool>, cap: usize) -> Self {
        Self { slots: Vec::with_capacity(cap), deq_id: 0, done_up_to: 0, shutdown }
    }

    /// Build a single-record batch, as used by direct queues.
    pub fn single(msg: Msg, shutdown: Arc<AtomicBool>) -> Self {
        let mut batch = Self::new(shutdown);
        batch.push(msg);
        batch
    }

    pub fn push(&mut self, msg: Msg) {
        self.slots.push(BatchSlot::new(msg));
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// True once an immediate shutdown has been requested on the
    /// owning queue. Checked between slots so long batches abort.
    pub fn shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Set a slot's state, never downgrading a discard.
    pub fn set_state(&mut self, idx: usize, state: SlotState) {
        if let Some(slot) = self.slots.get_mut(idx) {
            if slot.state != SlotState::Discarded {
                slot.state = state;
            }
        }
    }

    /// Number of slots not yet in a terminal state.
    pub fn unresolved(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| {
                s.filter_matched
                    && matches!(s.state, SlotState::Ready | SlotState::Submitted)
            })
            .count()
    }

    /// Drop all rendered parameter buffers.
    pub fn release_params(&mut self) {
        for slot in &mut self.slots {
            slot.params = None;
        }
    }
}

/// The queue's downstream: receives dequeued batches for processing.
///
/// Implementations resolve every matched slot to a terminal state
/// before returning; the queue driver then reclaims the batch.
pub trait Consumer: Send + Sync {
    fn process(&self, batch: &mut Batch) -> Result<(), DispatchError>;
}

#[cfg(test)]
#[path = "batch_tests.rs"]
mod tests;
