// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rill-queue: the queue engine driving rill's action pipeline.
//!
//! A [`Queue`] buffers records between producers and a
//! [`rill_core::Consumer`], in one of four backends (ring buffer,
//! linked list, disk segments, or direct pass-through), drains via
//! an elastic worker pool, and may overflow to a paired disk queue
//! above the high water-mark (disk-assist).

mod backend;
pub mod error;
pub mod params;
pub mod qi;
pub mod queue;
pub mod stream;
pub mod wti;
pub mod wtp;

pub use error::QueueError;
pub use params::{DeqWindow, QueueParams, QueueType};
pub use qi::QueueInfo;
pub use queue::{Enqueued, Queue};
pub use stream::StreamPos;
pub use wtp::{PoolState, WorkerPool};
