// SPDX-License-Identifier: MIT

//! Linked-list backend: grows on demand, bounded only by the
//! queue's capacity check.
//!
//! The store keeps every record from the delete head onward;
//! `deq_pos` marks how far dequeuing has run ahead of deletion.

use rill_core::Msg;
use std::collections::VecDeque;

#[derive(Debug, Default)]
pub(crate) struct ListStore {
    items: VecDeque<Msg>,
    /// Index of the next record to dequeue, relative to the delete
    /// head at the front.
    deq_pos: usize,
}

impl ListStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, msg: Msg) {
        self.items.push_back(msg);
    }

    pub fn deq(&mut self) -> Option<Msg> {
        let msg = self.items.get(self.deq_pos).cloned()?;
        self.deq_pos += 1;
        Some(msg)
    }

    pub fn del(&mut self) {
        if self.items.pop_front().is_some() {
            self.deq_pos = self.deq_pos.saturating_sub(1);
        }
    }

    pub fn requeue(&mut self, n: usize) -> usize {
        let rewound = n.min(self.deq_pos);
        self.deq_pos -= rewound;
        rewound
    }
}

#[cfg(test)]
#[path = "list_tests.rs"]
mod tests;
