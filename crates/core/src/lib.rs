// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rill-core: shared data model for the rill event router.

pub mod macros;

pub mod batch;
pub mod clock;
pub mod error;
pub mod msg;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use batch::{Batch, BatchSlot, Consumer, RenderedParams, SlotState};
pub use clock::{Clock, FakeClock, SystemClock};
pub use error::{AdmissionError, DispatchError, PersistError};
#[cfg(any(test, feature = "test-support"))]
pub use msg::MsgBuilder;
pub use msg::{Facility, FlowClass, Msg, MsgRecord, Priority, Severity};
