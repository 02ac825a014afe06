// SPDX-License-Identifier: MIT

//! Worker thread pool: elastic scheduling of queue workers.
//!
//! The pool owns thread lifecycle, scaling and shutdown signalling.
//! Blocking for work is delegated to the client via [`PoolClient::idle_wait`]
//! so the "is there work?" re-check happens under the client's own
//! mutex and wakeups cannot be missed.

use crate::wti::{self, WorkerInst};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Pool lifecycle state. Strictly increasing during shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PoolState {
    Running,
    /// Finish queued work, then exit when idle.
    Shutdown,
    /// Exit at the next check, abandoning further work.
    ShutdownImmediate,
}

rill_core::simple_display! {
    PoolState {
        Running => "running",
        Shutdown => "shutdown",
        ShutdownImmediate => "shutdown-immediate",
    }
}

/// What a worker accomplished in one loop turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkStatus {
    /// Processed a batch; come back for more.
    Busy,
    /// Nothing to do right now.
    Idle,
    /// This worker is no longer needed.
    Terminate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleWake {
    Woken,
    TimedOut,
}

/// The pool's employer: a queue driving its consumer.
pub trait PoolClient: Send + Sync + 'static {
    /// Fetch and process one unit of work. Called with no pool
    /// locks held.
    fn do_work(&self, wti: &mut WorkerInst) -> WorkStatus;

    /// Block until work may be available or the timeout elapses.
    /// Implementations re-check for work under their own mutex
    /// before sleeping.
    fn idle_wait(&self, timeout: Duration) -> IdleWake;

    /// Optional pre-work hook (dequeue time window etc.).
    fn rate_limit(&self) {}

    /// Always-running workers never leave on inactivity; they exit
    /// only on shutdown or an explicit `Terminate`. Used for the
    /// disk-assist pump, which must outlive quiet spells.
    fn always_running(&self) -> bool {
        false
    }

    /// Called once as a worker leaves, with the worker's scratch
    /// state; restores queue invariants for any pending batch.
    fn on_worker_exit(&self, wti: &mut WorkerInst);

    /// Broadcast every wait point so parked workers observe a state
    /// change.
    fn wake_all(&self);
}

struct PoolCtl {
    state: PoolState,
    current: usize,
    next_worker_id: usize,
    /// Set when a worker is spawned, cleared once it runs. Prevents
    /// the lone new worker exiting before it observes the work that
    /// triggered its creation.
    inactivity_guard: bool,
}

pub struct WorkerPool {
    name: String,
    max_workers: usize,
    idle_timeout: Duration,
    client: Arc<dyn PoolClient>,
    ctl: Mutex<PoolCtl>,
    terminated: Condvar,
}

impl WorkerPool {
    pub fn new(
        name: impl Into<String>,
        max_workers: usize,
        idle_timeout: Duration,
        client: Arc<dyn PoolClient>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            max_workers: max_workers.max(1),
            idle_timeout,
            client,
            ctl: Mutex::new(PoolCtl {
                state: PoolState::Running,
                current: 0,
                next_worker_id: 0,
                inactivity_guard: false,
            }),
            terminated: Condvar::new(),
        })
    }

    pub(crate) fn client(&self) -> &Arc<dyn PoolClient> {
        &self.client
    }

    pub(crate) fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn state(&self) -> PoolState {
        self.ctl.lock().state
    }

    pub fn current_workers(&self) -> usize {
        self.ctl.lock().current
    }

    /// Raise the pool state (never downgrades) and wake all parked
    /// workers so they observe it.
    pub fn set_state(&self, state: PoolState) {
        {
            let mut ctl = self.ctl.lock();
            if state > ctl.state {
                ctl.state = state;
                tracing::debug!(pool = %self.name, %state, "pool state raised");
            }
        }
        self.client.wake_all();
    }

    /// Ensure up to `n` workers are running (clamped to the
    /// configured maximum). A no-op once shutdown has begun.
    pub fn advise_max_workers(self: &Arc<Self>, n: usize) {
        if n == 0 {
            return;
        }
        let wanted = n.min(self.max_workers);
        let mut ctl = self.ctl.lock();
        if ctl.state != PoolState::Running {
            return;
        }
        while ctl.current < wanted {
            if !self.spawn_worker(&mut ctl) {
                break;
            }
        }
        // raise the guard even when no spawn was needed: a worker
        // that is just now exiting will re-enter its loop instead of
        // leaving the advised work stranded
        ctl.inactivity_guard = true;
    }

    fn spawn_worker(self: &Arc<Self>, ctl: &mut PoolCtl) -> bool {
        let id = ctl.next_worker_id;
        ctl.next_worker_id += 1;
        let wti = WorkerInst::new(id, &self.name);
        let pool = Arc::clone(self);
        let spawned = std::thread::Builder::new()
            .name(wti.label.clone())
            .spawn(move || wti::run(pool, wti));
        match spawned {
            Ok(_handle) => {
                ctl.current += 1;
                ctl.inactivity_guard = true;
                tracing::debug!(pool = %self.name, worker = id, count = ctl.current, "worker spawned");
                true
            }
            Err(err) => {
                tracing::warn!(pool = %self.name, %err, "could not spawn worker thread");
                false
            }
        }
    }

    pub(crate) fn clear_inactivity_guard(&self) {
        self.ctl.lock().inactivity_guard = false;
    }

    /// Called by a worker about to leave its loop. Returns true when
    /// the worker must re-enter instead: it is the last one and the
    /// inactivity guard says work may have been advised for it.
    pub(crate) fn exit_or_rerun(&self) -> bool {
        let mut ctl = self.ctl.lock();
        if ctl.current == 1 && ctl.inactivity_guard && ctl.state == PoolState::Running {
            ctl.inactivity_guard = false;
            return true;
        }
        false
    }

    pub(crate) fn worker_terminated(&self) {
        let mut ctl = self.ctl.lock();
        ctl.current = ctl.current.saturating_sub(1);
        if ctl.current == 0 {
            self.terminated.notify_all();
        }
    }

    /// Raise the state and wait for all workers to terminate.
    /// `timeout = None` waits without bound. Returns true when the
    /// pool fully drained in time.
    pub fn shutdown(&self, target: PoolState, timeout: Option<Duration>) -> bool {
        self.set_state(target);
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut ctl = self.ctl.lock();
        while ctl.current > 0 {
            match deadline {
                Some(deadline) => {
                    if self.terminated.wait_until(&mut ctl, deadline).timed_out() {
                        tracing::debug!(
                            pool = %self.name,
                            remaining = ctl.current,
                            "pool shutdown timed out"
                        );
                        return false;
                    }
                }
                None => self.terminated.wait(&mut ctl),
            }
        }
        true
    }
}

#[cfg(test)]
#[path = "wtp_tests.rs"]
mod tests;
