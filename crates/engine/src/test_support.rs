// SPDX-License-Identifier: MIT

//! Mock output module shared with downstream crates via the
//! `test-support` feature.

use crate::output::{DoActionResult, OutputModule, TxResult};
use parking_lot::Mutex;
use rill_core::{Msg, RenderedParams};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared view on a [`MockOutput`]'s journal and call counters.
#[derive(Clone, Default)]
pub struct MockHandle {
    inner: Arc<MockShared>,
}

struct MockShared {
    journal: Mutex<Vec<String>>,
    do_plan: Mutex<VecDeque<DoActionResult>>,
    resume_plan: Mutex<VecDeque<TxResult>>,
    /// While false, do-action parks, like a wedged output target.
    gate_open: std::sync::atomic::AtomicBool,
    /// Every Nth do-action call reports Suspended (0 = never).
    fail_every: AtomicUsize,
    do_calls: AtomicUsize,
    resume_calls: AtomicUsize,
    begin_calls: AtomicUsize,
    end_calls: AtomicUsize,
    hup_calls: AtomicUsize,
}

impl Default for MockShared {
    fn default() -> Self {
        Self {
            journal: Mutex::new(Vec::new()),
            do_plan: Mutex::new(VecDeque::new()),
            resume_plan: Mutex::new(VecDeque::new()),
            gate_open: std::sync::atomic::AtomicBool::new(true),
            fail_every: AtomicUsize::new(0),
            do_calls: AtomicUsize::new(0),
            resume_calls: AtomicUsize::new(0),
            begin_calls: AtomicUsize::new(0),
            end_calls: AtomicUsize::new(0),
            hup_calls: AtomicUsize::new(0),
        }
    }
}

impl MockHandle {
    /// Park every do-action call until [`Self::open_gate`].
    pub fn close_gate(&self) {
        self.inner.gate_open.store(false, Ordering::SeqCst);
    }

    pub fn open_gate(&self) {
        self.inner.gate_open.store(true, Ordering::SeqCst);
    }

    /// Lines the module "wrote" (first rendered param, or the
    /// record text for record passing).
    pub fn journal(&self) -> Vec<String> {
        self.inner.journal.lock().clone()
    }

    /// Queue explicit do-action results, consumed before any
    /// `fail_every` behaviour; when exhausted, calls return Ok.
    pub fn plan_do_results(&self, results: impl IntoIterator<Item = DoActionResult>) {
        self.inner.do_plan.lock().extend(results);
    }

    /// Queue explicit try-resume results; when exhausted, Ok.
    pub fn plan_resume_results(&self, results: impl IntoIterator<Item = TxResult>) {
        self.inner.resume_plan.lock().extend(results);
    }

    /// Make every Nth do-action call report Suspended.
    pub fn fail_every(&self, n: usize) {
        self.inner.fail_every.store(n, Ordering::SeqCst);
    }

    pub fn do_calls(&self) -> usize {
        self.inner.do_calls.load(Ordering::SeqCst)
    }

    pub fn resume_calls(&self) -> usize {
        self.inner.resume_calls.load(Ordering::SeqCst)
    }

    pub fn begin_calls(&self) -> usize {
        self.inner.begin_calls.load(Ordering::SeqCst)
    }

    pub fn end_calls(&self) -> usize {
        self.inner.end_calls.load(Ordering::SeqCst)
    }

    pub fn hup_calls(&self) -> usize {
        self.inner.hup_calls.load(Ordering::SeqCst)
    }
}

/// Scriptable in-memory output module.
pub struct MockOutput {
    inner: Arc<MockShared>,
}

impl MockOutput {
    /// Build a module plus the handle tests observe it through.
    pub fn new() -> (Box<dyn OutputModule>, MockHandle) {
        let handle = MockHandle::default();
        (Box::new(Self { inner: Arc::clone(&handle.inner) }), handle)
    }
}

impl OutputModule for MockOutput {
    fn begin_transaction(&mut self) -> TxResult {
        self.inner.begin_calls.fetch_add(1, Ordering::SeqCst);
        TxResult::Ok
    }

    fn do_action(&mut self, msg: &Msg, params: &RenderedParams) -> DoActionResult {
        while !self.inner.gate_open.load(Ordering::SeqCst) {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        let call = self.inner.do_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let result = self.inner.do_plan.lock().pop_front().unwrap_or_else(|| {
            let every = self.inner.fail_every.load(Ordering::SeqCst);
            if every > 0 && call % every == 0 {
                DoActionResult::Suspended
            } else {
                DoActionResult::Ok
            }
        });
        if matches!(result, DoActionResult::Ok | DoActionResult::DeferCommit) {
            let line = match params {
                RenderedParams::Rendered(strings) => {
                    strings.first().cloned().unwrap_or_else(|| msg.text.clone())
                }
                RenderedParams::Lists(lists) => lists
                    .first()
                    .map(|words| words.join(" "))
                    .unwrap_or_else(|| msg.text.clone()),
                RenderedParams::Record => msg.text.clone(),
            };
            self.inner.journal.lock().push(line);
        }
        result
    }

    fn end_transaction(&mut self) -> TxResult {
        self.inner.end_calls.fetch_add(1, Ordering::SeqCst);
        TxResult::Ok
    }

    fn try_resume(&mut self) -> TxResult {
        self.inner.resume_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.resume_plan.lock().pop_front().unwrap_or(TxResult::Ok)
    }

    fn hup(&mut self) {
        self.inner.hup_calls.fetch_add(1, Ordering::SeqCst);
    }
}
