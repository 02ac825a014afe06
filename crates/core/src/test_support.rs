// SPDX-License-Identifier: MIT

//! Test helpers shared with downstream crates via the
//! `test-support` feature.

use crate::msg::{Facility, FlowClass, Msg, MsgRecord, Priority, Severity};
use std::sync::Arc;

/// A record with the given text and builder defaults otherwise.
pub fn msg(text: impl Into<String>) -> Msg {
    Arc::new(MsgRecord::builder().text(text).build())
}

/// A record with the given severity.
pub fn msg_with_severity(text: impl Into<String>, severity: Severity) -> Msg {
    Arc::new(
        MsgRecord::builder()
            .text(text)
            .pri(Priority { facility: Facility(1), severity })
            .build(),
    )
}

/// A record with the given flow-control class.
pub fn msg_with_flow(text: impl Into<String>, flow: FlowClass) -> Msg {
    Arc::new(MsgRecord::builder().text(text).flow(flow).build())
}

/// A mark-ticker heartbeat record.
pub fn mark_msg(at_epoch_s: u64) -> Msg {
    Arc::new(
        MsgRecord::builder()
            .text("-- MARK --")
            .mark(true)
            .received_at(at_epoch_s)
            .originated_at(at_epoch_s)
            .build(),
    )
}

#[cfg(any(test, feature = "test-support"))]
pub mod strategies {
    use super::*;
    use proptest::prelude::*;

    pub fn severity() -> impl Strategy<Value = Severity> {
        (0u8..8).prop_map(|n| Severity::from_num(n).unwrap_or(Severity::Notice))
    }

    pub fn flow_class() -> impl Strategy<Value = FlowClass> {
        prop_oneof![
            Just(FlowClass::NoDelay),
            Just(FlowClass::LightDelay),
            Just(FlowClass::FullDelay),
        ]
    }
}
