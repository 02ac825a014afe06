// SPDX-License-Identifier: MIT

//! Fixed-array backend: a pre-allocated ring buffer.
//!
//! Three cursors walk the ring: `tail` (insert), `deq_head`
//! (dequeue) and `del_head` (delete). The delete head lags the
//! dequeue head so records survive until their batch commits.

use rill_core::Msg;

#[derive(Debug)]
pub(crate) struct ArrayStore {
    buf: Vec<Option<Msg>>,
    tail: usize,
    deq_head: usize,
    del_head: usize,
}

impl ArrayStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![None; capacity.max(1)],
            tail: 0,
            deq_head: 0,
            del_head: 0,
        }
    }

    fn bump(&self, idx: usize) -> usize {
        (idx + 1) % self.buf.len()
    }

    /// Caller guarantees the ring has room (the queue enforces
    /// capacity before calling).
    pub fn add(&mut self, msg: Msg) {
        self.buf[self.tail] = Some(msg);
        self.tail = self.bump(self.tail);
    }

    /// Hand out the record at the dequeue head without removing it.
    pub fn deq(&mut self) -> Option<Msg> {
        let msg = self.buf[self.deq_head].clone()?;
        self.deq_head = self.bump(self.deq_head);
        Some(msg)
    }

    /// Drop the oldest record (its batch committed).
    pub fn del(&mut self) {
        self.buf[self.del_head] = None;
        self.del_head = self.bump(self.del_head);
    }

    /// Caller guarantees `n` does not exceed the number of
    /// logically dequeued records still in the ring.
    pub fn requeue(&mut self, n: usize) -> usize {
        let len = self.buf.len();
        self.deq_head = (self.deq_head + len - (n % len)) % len;
        n
    }
}

#[cfg(test)]
#[path = "array_tests.rs"]
mod tests;
