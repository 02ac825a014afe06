// SPDX-License-Identifier: MIT

use super::*;
use rill_core::test_support::msg;

#[test]
fn delete_lags_dequeue() {
    let mut store = ListStore::new();
    for t in ["a", "b", "c"] {
        store.add(msg(t));
    }

    assert_eq!(store.deq().unwrap().text, "a");
    assert_eq!(store.deq().unwrap().text, "b");
    // delete the oldest while "c" is still undequeued
    store.del();
    assert_eq!(store.deq().unwrap().text, "c");
    assert!(store.deq().is_none());
    store.del();
    store.del();
}

#[test]
fn requeue_redelivers_in_order() {
    let mut store = ListStore::new();
    for t in ["a", "b", "c"] {
        store.add(msg(t));
    }
    store.deq();
    store.deq();

    assert_eq!(store.requeue(5), 2);
    assert_eq!(store.deq().unwrap().text, "a");
    assert_eq!(store.deq().unwrap().text, "b");
}
