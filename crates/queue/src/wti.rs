// SPDX-License-Identifier: MIT

//! Worker instance: one pool thread's identity, scratch state, and
//! main loop.

use crate::wtp::{IdleWake, PoolState, WorkStatus, WorkerPool};
use rill_core::Batch;
use std::sync::Arc;

/// Per-worker state handed to the pool client on every call.
#[derive(Debug)]
pub struct WorkerInst {
    pub id: usize,
    pub label: String,
    /// The batch processed last round. It stays logically dequeued
    /// until the next fetch (or worker exit) reclaims it, which is
    /// what lets retries halve-and-resubmit without losing records.
    pub pending: Option<Batch>,
}

impl WorkerInst {
    pub(crate) fn new(id: usize, pool_name: &str) -> Self {
        Self { id, label: format!("{pool_name}/w{id}"), pending: None }
    }
}

/// Worker main loop.
///
/// Cooperative throughout: shutdown is observed between work units
/// and inside the client's own wait points; there is no forced
/// thread cancellation. The outer loop re-enters when the
/// inactivity guard would otherwise leave freshly advised work
/// without any worker.
pub(crate) fn run(pool: Arc<WorkerPool>, mut wti: WorkerInst) {
    tracing::debug!(worker = %wti.label, "worker starting");

    'guard: loop {
        let mut idle_timed_out = false;
        loop {
            pool.client().rate_limit();

            if pool.state() == PoolState::ShutdownImmediate {
                break;
            }

            let status = pool.client().do_work(&mut wti);
            pool.clear_inactivity_guard();
            match status {
                WorkStatus::Busy => {
                    idle_timed_out = false;
                }
                WorkStatus::Terminate => break,
                WorkStatus::Idle => {
                    if pool.state() != PoolState::Running || idle_timed_out {
                        break;
                    }
                    let wake = pool.client().idle_wait(pool.idle_timeout());
                    if wake == IdleWake::TimedOut && !pool.client().always_running() {
                        idle_timed_out = true;
                    }
                }
            }
        }

        if pool.exit_or_rerun() {
            continue 'guard;
        }
        break;
    }

    pool.client().on_worker_exit(&mut wti);
    pool.worker_terminated();
    tracing::debug!(worker = %wti.label, "worker terminated");
}
