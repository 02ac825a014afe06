// SPDX-License-Identifier: MIT

//! The action engine: executes batches of matching records against
//! one output module, transactionally, with suspend/retry,
//! duplicate suppression, and rate gating.
//!
//! Two locks, two sides. The *gate* mutex guards submit-side state
//! (duplicate snapshot, gating clocks) and serializes the complex
//! submission path. The *exec* mutex guards the state machine and
//! the module itself, so non-thread-safe modules never see
//! concurrent entry. A direct-queue submission acquires gate then
//! exec; the exec side never takes gate.

use crate::output::{DoActionResult, OutputModule, ParamPassing, TxResult};
use crate::template::Template;
use parking_lot::Mutex;
use rill_core::{
    Batch, BatchSlot, Clock, Consumer, DispatchError, Msg, RenderedParams, SlotState, SystemClock,
};
use rill_queue::{Enqueued, Queue, QueueError, QueueParams, QueueType};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Repeat-flush back-off steps in seconds; the last value repeats.
const REPEAT_INTERVALS: [u64; 4] = [30, 60, 120, 600];

/// Consecutive "false OK" try-resume results tolerated before the
/// engine treats OK as suspended, breaking tight spin loops on
/// modules that report recovery they cannot deliver.
const FALSE_OK_LIMIT: u32 = 1000;

/// Per-action options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ActionParams {
    pub name: String,
    pub resume_interval_ms: u64,
    /// Retries per resume cycle before the action suspends;
    /// -1 retries forever.
    pub resume_retry_count: i32,
    /// Emit only every Nth matching record. 0 or 1 disables.
    pub exec_every_nth: u32,
    /// Idle gap that resets the Nth-occurrence counter. 0 disables.
    pub exec_every_nth_timeout_s: u64,
    /// Minimum seconds between executions. 0 disables.
    pub exec_once_interval_s: u64,
    /// Suppress duplicate records, flushing a repeat marker.
    pub reduce_repeated: bool,
    pub write_all_mark_msgs: bool,
    /// Execute only when the previous action left the record
    /// unhandled (failover chains).
    pub exec_when_prev_suspended: bool,
    /// Mark-ticker period, for the "recently written" test.
    pub mark_interval_s: u64,
    pub param_passing: ParamPassing,
    /// This action's own queue.
    pub queue: QueueParams,
}

impl Default for ActionParams {
    fn default() -> Self {
        Self {
            name: "action".into(),
            resume_interval_ms: 30_000,
            resume_retry_count: 0,
            exec_every_nth: 0,
            exec_every_nth_timeout_s: 0,
            exec_once_interval_s: 0,
            reduce_repeated: false,
            write_all_mark_msgs: false,
            exec_when_prev_suspended: false,
            mark_interval_s: 1200,
            param_passing: ParamPassing::Rendered,
            queue: QueueParams::default().queue_type(QueueType::Direct),
        }
    }
}

impl ActionParams {
    rill_core::setters! {
        into { name: String }
        set {
            resume_interval_ms: u64,
            resume_retry_count: i32,
            exec_every_nth: u32,
            exec_every_nth_timeout_s: u64,
            exec_once_interval_s: u64,
            reduce_repeated: bool,
            write_all_mark_msgs: bool,
            exec_when_prev_suspended: bool,
            mark_interval_s: u64,
            param_passing: ParamPassing,
            queue: QueueParams,
        }
    }
}

/// Action engine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    /// Enabled and ready for a transaction.
    Rdy,
    /// Inside a transaction.
    Itx,
    /// Actively retrying after a suspension.
    Rtry,
    /// Suspended until the resume timestamp passes.
    Susp,
    /// Disabled until reload; terminal.
    Died,
    /// Transient post-commit state.
    Comm,
}

rill_core::simple_display! {
    ActionState {
        Rdy => "rdy",
        Itx => "itx",
        Rtry => "rtry",
        Susp => "susp",
        Died => "died",
        Comm => "comm",
    }
}

/// Submission fast paths, selected once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubmitMode {
    /// No per-record features in play; straight to the queue.
    Firehose,
    /// Firehose plus the mark-suppression check.
    NotAllMark,
    /// Duplicate suppression, interval gating, or failover chains.
    Complex,
}

/// Internal processing results, mirroring the output contract plus
/// the engine's own verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActionRet {
    Ok,
    DeferCommit,
    PreviousCommitted,
    Suspended,
    ActionFailed,
    Discard,
    Failed,
    ForceTerm,
}

/// Exec-side state: the module and its transaction state machine.
struct ExecState {
    module: Box<dyn OutputModule>,
    state: ActionState,
    /// try-resume OKs not yet confirmed by a working do-action.
    resume_ok_in_row: u32,
    /// Failed resume cycles; stretches the suspend interval.
    n_resume_retries: u32,
    resume_at_ms: u64,
    had_auto_commit: bool,
}

/// Submit-side state: duplicate snapshot and gating clocks.
struct GateState {
    prev_msg: Option<Msg>,
    prev_count: u32,
    repeat_step: usize,
    last_exec_s: u64,
    nth_count: u32,
    nth_last_s: u64,
    /// Now, cached once per submitted batch.
    act_now_s: Option<u64>,
}

pub(crate) struct ActionCore<C: Clock> {
    name: String,
    params: ActionParams,
    templates: Vec<Arc<dyn Template>>,
    clock: C,
    exec: Mutex<ExecState>,
    gate: Mutex<GateState>,
    /// Last-write epoch seconds, shared mark-suppression timestamp.
    /// Updated by compare-and-swap so concurrent submitters of one
    /// batch never double-count.
    last_write_s: AtomicU64,
    submit_mode: SubmitMode,
}

/// A bound output invocation with its own queue, templates and
/// retry policy.
pub struct Action<C: Clock = SystemClock> {
    core: Arc<ActionCore<C>>,
    queue: Queue<C>,
}

impl<C: Clock> Clone for Action<C> {
    fn clone(&self) -> Self {
        Self { core: Arc::clone(&self.core), queue: self.queue.clone() }
    }
}

struct ActionConsumer<C: Clock>(Arc<ActionCore<C>>);

impl<C: Clock> Consumer for ActionConsumer<C> {
    fn process(&self, batch: &mut Batch) -> Result<(), DispatchError> {
        self.0.process_batch(batch)
    }
}

impl<C: Clock> Action<C> {
    pub fn new(
        params: ActionParams,
        templates: Vec<Arc<dyn Template>>,
        module: Box<dyn OutputModule>,
        clock: C,
    ) -> Result<Self, QueueError> {
        let complex = params.exec_when_prev_suspended
            || params.exec_every_nth > 1
            || params.exec_once_interval_s > 0
            || params.reduce_repeated;
        let submit_mode = if complex {
            SubmitMode::Complex
        } else if !params.write_all_mark_msgs {
            SubmitMode::NotAllMark
        } else {
            SubmitMode::Firehose
        };

        let name = params.name.clone();
        let queue_params = params.queue.clone();
        let core = Arc::new(ActionCore {
            name: name.clone(),
            params,
            templates,
            clock: clock.clone(),
            exec: Mutex::new(ExecState {
                module,
                state: ActionState::Rdy,
                resume_ok_in_row: 0,
                n_resume_retries: 0,
                resume_at_ms: 0,
                had_auto_commit: false,
            }),
            gate: Mutex::new(GateState {
                prev_msg: None,
                prev_count: 0,
                repeat_step: 0,
                last_exec_s: 0,
                nth_count: 0,
                nth_last_s: 0,
                act_now_s: None,
            }),
            last_write_s: AtomicU64::new(0),
            submit_mode,
        });
        tracing::debug!(action = %name, mode = ?submit_mode, "action constructed");

        let queue = Queue::new(
            format!("action.{name}"),
            queue_params,
            Arc::new(ActionConsumer(Arc::clone(&core))),
            clock,
        )?;
        Ok(Self { core, queue })
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn state(&self) -> ActionState {
        self.core.exec.lock().state
    }

    pub fn queue(&self) -> &Queue<C> {
        &self.queue
    }

    /// Identity for dedup across rules sharing one action.
    pub(crate) fn core_ptr(&self) -> *const () {
        Arc::as_ptr(&self.core).cast()
    }

    pub fn start(&self) -> Result<(), QueueError> {
        self.queue.start()
    }

    pub fn stop(&self) -> Result<(), QueueError> {
        self.queue.stop()
    }

    /// Advisory reload: flush duplicate-suppression state, then
    /// pass HUP to the module under the exec mutex.
    pub fn hup(&self) {
        {
            let mut gate = self.core.gate.lock();
            gate.act_now_s = None;
            if gate.prev_count > 0 {
                self.write_to_action(&mut gate, None);
            }
        }
        self.core.exec.lock().module.hup();
    }

    /// Submit a dispatched batch to this action, via the submission
    /// variant chosen at construction.
    pub fn submit(&self, batch: &mut Batch) {
        match self.core.submit_mode {
            SubmitMode::Firehose => self.submit_firehose(batch),
            SubmitMode::NotAllMark => self.submit_not_all_mark(batch),
            SubmitMode::Complex => self.submit_complex(batch),
        }
    }

    /// Fast path: every matched record goes straight to the queue.
    fn submit_firehose(&self, batch: &mut Batch) {
        if self.queue.queue_type() == QueueType::Direct {
            if let Err(err) = self.queue.enqueue_direct_batch(batch) {
                tracing::debug!(action = %self.core.name, %err, "direct submission failed");
            }
            return;
        }
        for i in 0..batch.len() {
            if batch.shutting_down() {
                break;
            }
            if batch.slots[i].filter_matched && batch.slots[i].state != SlotState::Discarded {
                self.enqueue_single(Arc::clone(&batch.slots[i].msg));
            }
        }
    }

    /// Firehose plus mark handling: when this action wrote recently,
    /// mark records are masked out for the whole batch. The decision
    /// rides on a CAS of the shared last-write timestamp, so
    /// concurrent batches never double-count.
    fn submit_not_all_mark(&self, batch: &mut Batch) {
        let mut saved: Vec<(usize, bool)> = Vec::new();
        let mut write_marks: Option<bool> = None;
        for i in 0..batch.len() {
            if !batch.slots[i].msg.mark {
                continue;
            }
            let write = *write_marks.get_or_insert_with(|| {
                self.core
                    .mark_write_due(self.core.clock.epoch_s(), batch.slots[i].msg.originated_at)
            });
            if !write {
                saved.push((i, batch.slots[i].filter_matched));
                batch.slots[i].filter_matched = false;
            }
        }

        self.submit_firehose(batch);

        for (i, was) in saved {
            batch.slots[i].filter_matched = was;
        }
    }

    /// Full-feature path: duplicate suppression, interval gating,
    /// Nth-occurrence gating and failover chains, one record at a
    /// time under the gate mutex.
    fn submit_complex(&self, batch: &mut Batch) {
        let mut gate = self.core.gate.lock();
        for i in 0..batch.len() {
            if batch.shutting_down() {
                break;
            }
            let eligible = {
                let slot = &batch.slots[i];
                slot.filter_matched
                    && slot.state != SlotState::Discarded
                    && (!self.core.params.exec_when_prev_suspended || slot.prev_was_suspended)
            };
            if eligible {
                self.call_action(&mut gate, batch, i);
            }
        }
    }

    /// One record through mark gating and duplicate suppression,
    /// then on to the queue.
    fn call_action(&self, gate: &mut GateState, batch: &mut Batch, idx: usize) {
        let core = &self.core;
        let msg = Arc::clone(&batch.slots[idx].msg);
        gate.act_now_s = None;
        let now = core.act_now(gate);

        // don't write marks to recently-written outputs
        if !core.params.write_all_mark_msgs
            && msg.mark
            && now.saturating_sub(core.last_write_s.load(Ordering::SeqCst))
                < core.params.mark_interval_s / 2
        {
            return;
        }

        let ret;
        if core.params.reduce_repeated
            && !msg.mark
            && gate.prev_msg.as_deref().is_some_and(|prev| prev.repeats(&msg))
        {
            gate.prev_count += 1;
            // keep the newest copy so the eventual flush carries a
            // fresh timestamp
            gate.prev_msg = Some(msg);
            tracing::debug!(action = %core.name, count = gate.prev_count, "suppressing repeated record");
            if now > core.repeat_due_s(gate) {
                ret = self.write_to_action(gate, Some((batch, idx)));
                core.repeat_backoff(gate);
            } else {
                ret = ActionRet::Ok;
            }
        } else {
            // flush any pending repeat run before the new record
            if gate.prev_msg.is_some() && gate.prev_count > 0 {
                self.write_to_action(gate, Some((batch, idx)));
            }
            gate.prev_msg = Some(msg);
            gate.prev_count = 0;
            gate.repeat_step = 0;
            ret = self.write_to_action(gate, Some((batch, idx)));
        }

        // keep failover bookkeeping current
        match ret {
            ActionRet::Ok => batch.slots[idx].prev_was_suspended = false,
            ActionRet::ActionFailed => batch.slots[idx].prev_was_suspended = true,
            _ => {}
        }
    }

    /// Gate and enqueue the action's pending record (the duplicate
    /// snapshot). Replaces it with a "message repeated N times"
    /// duplicate when a repeat run is being flushed.
    fn write_to_action(&self, gate: &mut GateState, ctx: Option<(&mut Batch, usize)>) -> ActionRet {
        let core = &self.core;
        let now = core.act_now(gate);
        let params = &core.params;

        // every-Nth-occurrence gating
        if params.exec_every_nth > 1 {
            if params.exec_every_nth_timeout_s > 0
                && now.saturating_sub(gate.nth_last_s) > params.exec_every_nth_timeout_s
            {
                tracing::debug!(action = %core.name, "nth-occurrence window idle, counter reset");
                gate.nth_count = 0;
            }
            gate.nth_last_s = now;
            if gate.nth_count < params.exec_every_nth - 1 {
                gate.nth_count += 1;
                return ActionRet::Ok;
            }
            gate.nth_count = 0;
        }

        let Some(pending) = gate.prev_msg.clone() else {
            return ActionRet::Ok;
        };
        let msg: Msg = if gate.prev_count > 1 {
            let original: String = pending.text.chars().take(800).collect();
            Arc::new(pending.dup_with_text(
                format!("message repeated {} times: [{}]", gate.prev_count, original),
                now,
            ))
        } else {
            pending
        };

        // not yet time to run again
        if params.exec_once_interval_s > 0 && params.exec_once_interval_s + gate.last_exec_s > now {
            tracing::debug!(action = %core.name, "exec-once interval not yet expired, dropping");
            gate.last_exec_s = now;
            return ActionRet::Ok;
        }
        gate.last_exec_s = now;
        core.last_write_s.store(msg.originated_at, Ordering::SeqCst);

        let ret = match ctx {
            Some((batch, idx))
                if params.exec_when_prev_suspended
                    && batch.slots[idx].prev_was_suspended
                    && self.queue.queue_type() == QueueType::Direct =>
            {
                // the suspended flag must survive into the direct
                // batch or the failover condition is lost downstream
                let mut single = Batch::single(msg, batch.shutdown_handle());
                single.slots[0].prev_was_suspended = true;
                match self.queue.enqueue_direct_batch(&mut single) {
                    Ok(()) => ActionRet::Ok,
                    Err(DispatchError::ForceTerminate) => ActionRet::ForceTerm,
                    Err(_) => ActionRet::ActionFailed,
                }
            }
            _ => self.enqueue_single(msg),
        };
        if ret == ActionRet::Ok {
            gate.prev_count = 0;
        }
        ret
    }

    fn enqueue_single(&self, msg: Msg) -> ActionRet {
        if self.queue.queue_type() == QueueType::Direct {
            let mut single = Batch::single(msg, Arc::new(AtomicBool::new(false)));
            return match self.queue.enqueue_direct_batch(&mut single) {
                Ok(()) => {
                    if single.slots[0].state == SlotState::Bad {
                        ActionRet::ActionFailed
                    } else {
                        ActionRet::Ok
                    }
                }
                Err(DispatchError::ForceTerminate) => ActionRet::ForceTerm,
                Err(_) => ActionRet::ActionFailed,
            };
        }
        match self.queue.enqueue(msg) {
            Ok(Enqueued::Queued) | Ok(Enqueued::Delivered) => ActionRet::Ok,
            Err(err) => {
                tracing::debug!(action = %self.core.name, %err, "action queue rejected record");
                ActionRet::ActionFailed
            }
        }
    }
}

impl<C: Clock> ActionCore<C> {
    /// Per-batch driver, run by the action queue's worker:
    /// prepare, submit, commit, release.
    fn process_batch(&self, batch: &mut Batch) -> Result<(), DispatchError> {
        self.prepare_batch(batch);
        let sd = batch.shutdown_handle();

        let mut exec = self.exec.lock();
        let mut ret = self.submit_batch(&mut exec, &sd, batch, batch.len());
        if !matches!(ret, ActionRet::ForceTerm) {
            ret = self.finish_batch(&mut exec, &sd, batch);
        }
        drop(exec);

        batch.release_params();
        match ret {
            ActionRet::ForceTerm => Err(DispatchError::ForceTerminate),
            ActionRet::ActionFailed => Err(DispatchError::ActionFailed),
            ActionRet::Suspended => Err(DispatchError::Suspended),
            _ => Ok(()),
        }
    }

    /// Render per-slot parameters and reset slot states.
    fn prepare_batch(&self, batch: &mut Batch) {
        batch.done_up_to = 0;
        for slot in &mut batch.slots {
            if !slot.filter_matched || slot.state == SlotState::Discarded {
                continue;
            }
            slot.state = SlotState::Ready;
            slot.params = Some(match self.params.param_passing {
                ParamPassing::Rendered => RenderedParams::Rendered(
                    self.templates.iter().map(|t| t.render(&slot.msg)).collect(),
                ),
                ParamPassing::Lists => RenderedParams::Lists(
                    self.templates
                        .iter()
                        .map(|t| {
                            t.render(&slot.msg).split_whitespace().map(str::to_owned).collect()
                        })
                        .collect(),
                ),
                ParamPassing::Record => RenderedParams::Record,
            });
        }
    }

    /// Submit the next `n_elem` unresolved slots, recursively
    /// halving on a permanent mid-batch failure to isolate the
    /// offending record.
    fn submit_batch(
        &self,
        exec: &mut ExecState,
        sd: &Arc<AtomicBool>,
        batch: &mut Batch,
        n_elem: usize,
    ) -> ActionRet {
        let was_done_to = batch.done_up_to;
        loop {
            if sd.load(Ordering::Relaxed) {
                return ActionRet::ForceTerm;
            }
            let mut ret = self.try_do_action(exec, sd, batch, n_elem);
            if ret == ActionRet::ForceTerm {
                return ret;
            }
            if matches!(
                ret,
                ActionRet::Ok | ActionRet::PreviousCommitted | ActionRet::DeferCommit
            ) {
                ret = self.finish_batch(exec, sd, batch);
            }
            match ret {
                ActionRet::Ok | ActionRet::PreviousCommitted | ActionRet::DeferCommit => {
                    return ActionRet::Ok
                }
                ActionRet::ForceTerm => return ActionRet::ForceTerm,
                ActionRet::Suspended => {
                    // the action went to retry; run the full
                    // remainder again once it recovers
                    continue;
                }
                ActionRet::ActionFailed => {
                    // everything not yet committed is bad
                    let end = (was_done_to + n_elem).min(batch.len());
                    for i in batch.done_up_to..end {
                        let state = batch.slots[i].state;
                        if state != SlotState::Discarded && state != SlotState::Committed {
                            batch.slots[i].state = SlotState::Bad;
                            batch.slots[i].prev_was_suspended = true;
                        }
                    }
                    return ActionRet::ActionFailed;
                }
                _ => {
                    // permanent single-call failure
                    if n_elem <= 1 {
                        batch.set_state(batch.done_up_to, SlotState::Bad);
                        batch.done_up_to += 1;
                        return ActionRet::Ok;
                    }
                    let half = n_elem / 2;
                    let first = self.submit_batch(exec, sd, batch, half);
                    if first == ActionRet::ForceTerm {
                        return first;
                    }
                    let second = self.submit_batch(exec, sd, batch, n_elem - half);
                    if second == ActionRet::ForceTerm {
                        return second;
                    }
                    return ActionRet::Ok;
                }
            }
        }
    }

    /// Walk slots while the transaction stays open, tracking the
    /// committed-up-to horizon.
    fn try_do_action(
        &self,
        exec: &mut ExecState,
        sd: &Arc<AtomicBool>,
        batch: &mut Batch,
        n_elem: usize,
    ) -> ActionRet {
        let mut i = batch.done_up_to;
        let mut processed = 0;
        let mut committed_up_to = i;
        let mut ret = ActionRet::Ok;

        'slots: while processed < n_elem && i < batch.len() {
            if sd.load(Ordering::Relaxed) {
                batch.done_up_to = committed_up_to;
                return ActionRet::ForceTerm;
            }
            let eligible = {
                let slot = &batch.slots[i];
                slot.filter_matched
                    && slot.state != SlotState::Discarded
                    && (!self.params.exec_when_prev_suspended || slot.prev_was_suspended)
            };
            if eligible {
                let call = self.process_msg(exec, sd, &mut batch.slots[i]);
                match call {
                    ActionRet::Ok => {
                        // unmatched slots advance the horizon but
                        // keep their state
                        while committed_up_to <= i {
                            if batch.slots[committed_up_to].filter_matched {
                                batch.set_state(committed_up_to, SlotState::Committed);
                            }
                            committed_up_to += 1;
                        }
                    }
                    ActionRet::PreviousCommitted => {
                        while committed_up_to < i {
                            if batch.slots[committed_up_to].filter_matched {
                                batch.set_state(committed_up_to, SlotState::Committed);
                            }
                            committed_up_to += 1;
                        }
                        batch.slots[i].state = SlotState::Submitted;
                    }
                    ActionRet::DeferCommit => {
                        batch.slots[i].state = SlotState::Submitted;
                    }
                    ActionRet::Discard => {
                        batch.slots[i].state = SlotState::Discarded;
                    }
                    other => {
                        ret = other;
                        break 'slots;
                    }
                }
            }
            i += 1;
            processed += 1;
        }

        batch.done_up_to = committed_up_to;
        ret
    }

    /// Ready the action (resume, begin transaction) and run one
    /// do-action call.
    fn process_msg(
        &self,
        exec: &mut ExecState,
        sd: &Arc<AtomicBool>,
        slot: &mut BatchSlot,
    ) -> ActionRet {
        if self.prepare(exec, sd) == ActionRet::ForceTerm {
            return ActionRet::ForceTerm;
        }
        if exec.state == ActionState::Itx {
            return self.call_do_action(exec, slot);
        }
        self.ret_code(exec)
    }

    /// Recover the action if needed and open a transaction.
    fn prepare(&self, exec: &mut ExecState, sd: &Arc<AtomicBool>) -> ActionRet {
        if self.try_resume_engine(exec, sd) == ActionRet::ForceTerm {
            return ActionRet::ForceTerm;
        }
        if exec.state == ActionState::Rdy {
            match exec.module.begin_transaction() {
                TxResult::Ok => self.set_state(exec, ActionState::Itx),
                TxResult::Suspended => self.retry(exec),
                TxResult::Disable => self.disable(exec),
            }
        }
        ActionRet::Ok
    }

    fn call_do_action(&self, exec: &mut ExecState, slot: &mut BatchSlot) -> ActionRet {
        exec.had_auto_commit = false;
        let params = slot.params.clone().unwrap_or(RenderedParams::Record);
        match exec.module.do_action(&slot.msg, &params) {
            DoActionResult::Ok => {
                self.committed(exec);
                exec.resume_ok_in_row = 0;
            }
            DoActionResult::DeferCommit => {
                exec.resume_ok_in_row = 0;
            }
            DoActionResult::PreviousCommitted => {
                exec.had_auto_commit = true;
                exec.resume_ok_in_row = 0;
            }
            DoActionResult::Suspended => self.retry(exec),
            DoActionResult::Disable => self.disable(exec),
            DoActionResult::Discard => return ActionRet::Discard,
            DoActionResult::Failed => return ActionRet::Failed,
        }
        self.ret_code(exec)
    }

    /// Close the transaction and flag the batch accordingly.
    fn finish_batch(
        &self,
        exec: &mut ExecState,
        sd: &Arc<AtomicBool>,
        batch: &mut Batch,
    ) -> ActionRet {
        if exec.state == ActionState::Rdy {
            return ActionRet::Ok;
        }
        if self.prepare(exec, sd) == ActionRet::ForceTerm {
            return ActionRet::ForceTerm;
        }
        if exec.state == ActionState::Itx {
            match exec.module.end_transaction() {
                TxResult::Ok => {
                    self.committed(exec);
                    for i in 0..batch.len() {
                        if batch.slots[i].filter_matched {
                            batch.set_state(i, SlotState::Committed);
                            batch.slots[i].prev_was_suspended = false;
                        }
                    }
                }
                TxResult::Suspended => self.retry(exec),
                TxResult::Disable => self.disable(exec),
            }
        }
        self.ret_code(exec)
    }

    /// Map the engine state to the caller-visible verdict.
    fn ret_code(&self, exec: &mut ExecState) -> ActionRet {
        match exec.state {
            ActionState::Rdy | ActionState::Comm => ActionRet::Ok,
            ActionState::Itx => {
                if exec.had_auto_commit {
                    exec.had_auto_commit = false;
                    ActionRet::PreviousCommitted
                } else {
                    ActionRet::DeferCommit
                }
            }
            ActionState::Rtry => ActionRet::Suspended,
            ActionState::Susp | ActionState::Died => ActionRet::ActionFailed,
        }
    }

    /// If suspended past the resume time, move to retry; if
    /// retrying, run the resume cycle.
    fn try_resume_engine(&self, exec: &mut ExecState, sd: &Arc<AtomicBool>) -> ActionRet {
        if exec.state == ActionState::Susp && self.clock.epoch_ms() > exec.resume_at_ms {
            self.set_state(exec, ActionState::Rtry);
        }
        if exec.state == ActionState::Rtry {
            return self.do_retry(exec, sd);
        }
        ActionRet::Ok
    }

    /// The retry cycle: poll try-resume up to the configured count,
    /// sleeping the resume interval between attempts. Guards
    /// against modules whose try-resume lies: after
    /// [`FALSE_OK_LIMIT`] unconfirmed OKs the next OK is treated as
    /// suspended.
    fn do_retry(&self, exec: &mut ExecState, sd: &Arc<AtomicBool>) -> ActionRet {
        let mut retries: i32 = 0;
        while !sd.load(Ordering::Relaxed) && exec.state == ActionState::Rtry {
            let result = exec.module.try_resume();
            let treat_ok_as_susp = exec.resume_ok_in_row >= FALSE_OK_LIMIT
                && exec.resume_ok_in_row % FALSE_OK_LIMIT == 0;
            if treat_ok_as_susp {
                tracing::warn!(
                    action = %self.name,
                    "module keeps reporting resume success without delivering, treating as suspended"
                );
                exec.resume_ok_in_row = 0;
            }
            match result {
                TxResult::Ok if !treat_ok_as_susp => {
                    self.set_state(exec, ActionState::Rdy);
                }
                TxResult::Disable => self.disable(exec),
                _ => {
                    if self.params.resume_retry_count != -1
                        && retries >= self.params.resume_retry_count
                    {
                        self.suspend(exec);
                    } else {
                        exec.n_resume_retries += 1;
                        retries += 1;
                        if self.interruptible_sleep(
                            Duration::from_millis(self.params.resume_interval_ms),
                            sd,
                        ) {
                            return ActionRet::ForceTerm;
                        }
                    }
                }
            }
        }
        if sd.load(Ordering::Relaxed) && exec.state == ActionState::Rtry {
            return ActionRet::ForceTerm;
        }
        if exec.state == ActionState::Rdy {
            exec.n_resume_retries = 0;
        }
        ActionRet::Ok
    }

    /// Sleep in small slices, returning true if shutdown arrived.
    fn interruptible_sleep(&self, total: Duration, sd: &Arc<AtomicBool>) -> bool {
        let mut remaining = total;
        while remaining > Duration::ZERO {
            if sd.load(Ordering::Relaxed) {
                return true;
            }
            let slice = remaining.min(Duration::from_millis(50));
            std::thread::sleep(slice);
            remaining = remaining.saturating_sub(slice);
        }
        sd.load(Ordering::Relaxed)
    }

    fn set_state(&self, exec: &mut ExecState, state: ActionState) {
        exec.state = state;
        tracing::debug!(action = %self.name, %state, "action state transition");
    }

    fn committed(&self, exec: &mut ExecState) {
        self.set_state(exec, ActionState::Comm);
        self.set_state(exec, ActionState::Rdy);
    }

    fn retry(&self, exec: &mut ExecState) {
        self.set_state(exec, ActionState::Rtry);
        exec.resume_ok_in_row += 1;
    }

    fn disable(&self, exec: &mut ExecState) {
        tracing::error!(action = %self.name, "module disabled the action until reload");
        self.set_state(exec, ActionState::Died);
    }

    /// Suspend with back-off: every ten failed resume cycles
    /// stretches the interval another notch.
    fn suspend(&self, exec: &mut ExecState) {
        let factor = u64::from(exec.n_resume_retries / 10 + 1);
        exec.resume_at_ms = self.clock.epoch_ms() + self.params.resume_interval_ms * factor;
        self.set_state(exec, ActionState::Susp);
        tracing::debug!(action = %self.name, resume_at_ms = exec.resume_at_ms, "action suspended");
    }

    /// Now in epoch seconds, computed once per submitted batch.
    fn act_now(&self, gate: &mut GateState) -> u64 {
        match gate.act_now_s {
            Some(now) => now,
            None => {
                let now = self.clock.epoch_s();
                gate.act_now_s = Some(now);
                now
            }
        }
    }

    /// When is the suppressed-repeat run due for a flush?
    fn repeat_due_s(&self, gate: &GateState) -> u64 {
        self.last_write_s.load(Ordering::SeqCst)
            + REPEAT_INTERVALS[gate.repeat_step.min(REPEAT_INTERVALS.len() - 1)]
    }

    fn repeat_backoff(&self, gate: &mut GateState) {
        if gate.repeat_step + 1 < REPEAT_INTERVALS.len() {
            gate.repeat_step += 1;
        }
    }

    /// CAS on the shared last-write timestamp: decide once per batch
    /// whether marks are due, racing cleanly with other submitters.
    fn mark_write_due(&self, now_s: u64, msg_time_s: u64) -> bool {
        loop {
            let last = self.last_write_s.load(Ordering::SeqCst);
            let due = now_s.saturating_sub(last) >= self.params.mark_interval_s / 2;
            if self
                .last_write_s
                .compare_exchange(last, msg_time_s, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                if !due {
                    tracing::debug!(action = %self.name, "output written recently, masking mark records");
                }
                return due;
            }
        }
    }
}

#[cfg(test)]
#[path = "action_tests.rs"]
mod tests;
