// SPDX-License-Identifier: MIT

use super::*;
use crate::test_support::msg;

fn flag() -> Arc<AtomicBool> {
    Arc::new(AtomicBool::new(false))
}

#[test]
fn push_creates_ready_matched_slots() {
    let mut batch = Batch::new(flag());
    batch.push(msg("a"));
    batch.push(msg("b"));

    assert_eq!(batch.len(), 2);
    for slot in &batch.slots {
        assert_eq!(slot.state, SlotState::Ready);
        assert!(slot.filter_matched);
        assert!(!slot.prev_was_suspended);
    }
}

#[test]
fn set_state_never_downgrades_discard() {
    let mut batch = Batch::new(flag());
    batch.push(msg("a"));
    batch.set_state(0, SlotState::Discarded);
    batch.set_state(0, SlotState::Committed);

    assert_eq!(batch.slots[0].state, SlotState::Discarded);
}

#[test]
fn unresolved_counts_ready_and_submitted_matched_slots() {
    let mut batch = Batch::new(flag());
    for t in ["a", "b", "c", "d"] {
        batch.push(msg(t));
    }
    batch.set_state(0, SlotState::Committed);
    batch.set_state(1, SlotState::Submitted);
    batch.slots[2].filter_matched = false;

    // slot 1 (submitted) and slot 3 (ready) remain
    assert_eq!(batch.unresolved(), 2);
}

#[test]
fn shutdown_handle_is_shared() {
    let flag = flag();
    let batch = Batch::single(msg("a"), Arc::clone(&flag));

    assert!(!batch.shutting_down());
    flag.store(true, Ordering::Relaxed);
    assert!(batch.shutting_down());
}

#[test]
fn release_params_drops_rendered_buffers() {
    let mut batch = Batch::new(flag());
    batch.push(msg("a"));
    batch.slots[0].params = Some(RenderedParams::Rendered(vec!["x".into()]));

    batch.release_params();
    assert!(batch.slots[0].params.is_none());
}
