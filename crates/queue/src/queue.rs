// SPDX-License-Identifier: MIT

//! The queue engine: polymorphic buffering between producers and a
//! batch consumer, with flow-control aware admission, deferred
//! deletion, disk-assist overflow, and phased shutdown.
//!
//! Locking discipline: the queue mutex (`QueueCore::state`) protects
//! sizes, the backend, and the to-delete list. It is released before
//! the consumer runs, so output I/O never holds the queue lock. The
//! pools mutex is only taken while the state mutex is *not* held.

use crate::backend::{ArrayStore, Backend, DiskStore, ListStore};
use crate::error::QueueError;
use crate::params::{DeqWindow, QueueParams, QueueType};
use crate::qi::QueueInfo;
use crate::wti::WorkerInst;
use crate::wtp::{IdleWake, PoolClient, PoolState, WorkStatus, WorkerPool};
use parking_lot::{Condvar, Mutex};
use rill_core::{
    AdmissionError, Batch, Clock, Consumer, DispatchError, FlowClass, Msg, SlotState, SystemClock,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Outcome of a successful enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// Buffered; a worker will pick it up.
    Queued,
    /// Direct queue: the consumer already ran on the caller's thread.
    Delivered,
}

/// Mutable queue state, all guarded by the queue mutex.
struct QueueState {
    backend: Backend,
    /// Records physically in the store.
    phys: usize,
    /// Records dequeued but not yet deleted.
    log_deq: usize,
    /// Next dequeue id to hand out.
    deq_id_next: u64,
    /// Dequeue id whose physical deletion is due next.
    deq_id_del: u64,
    /// Commits that arrived out of `deq_id` order, waiting their turn.
    to_delete: std::collections::BTreeMap<u64, usize>,
    updates_since_persist: usize,
    runs_da: bool,
}

impl QueueState {
    fn logical_size(&self) -> usize {
        self.phys.saturating_sub(self.log_deq)
    }
}

struct Pools<C: Clock> {
    reg: Option<Arc<WorkerPool>>,
    da: Option<Arc<WorkerPool>>,
    da_child: Option<Queue<C>>,
}

impl<C: Clock> Default for Pools<C> {
    fn default() -> Self {
        Self { reg: None, da: None, da_child: None }
    }
}

pub(crate) struct QueueCore<C: Clock> {
    name: String,
    params: QueueParams,
    clock: C,
    consumer: Arc<dyn Consumer>,
    state: Mutex<QueueState>,
    not_empty: Condvar,
    not_full: Condvar,
    below_full_dly: Condvar,
    below_light_dly: Condvar,
    pools: Mutex<Pools<C>>,
    started: AtomicBool,
    /// Accept records but run no consumers (spill target mode).
    enq_only: AtomicBool,
    /// Set at the top of `stop()`.
    stopping: AtomicBool,
    /// Batches abort between slots once this is set (phase 3+).
    shutdown_immediate: Arc<AtomicBool>,
    /// Lock-free mirrors for the admission fast path.
    phys_hint: AtomicUsize,
    runs_da_hint: AtomicBool,
    /// Disk-assist start failed once; do not retry every enqueue.
    da_broken: AtomicBool,
    /// DA children point back at their parent so a drained child can
    /// wake the parent's pump for teardown.
    parent: Mutex<Option<Weak<QueueCore<C>>>>,
}

/// Handle to a queue. Clones share the same underlying queue.
pub struct Queue<C: Clock = SystemClock> {
    core: Arc<QueueCore<C>>,
}

impl<C: Clock> Clone for Queue<C> {
    fn clone(&self) -> Self {
        Self { core: Arc::clone(&self.core) }
    }
}

impl<C: Clock> Queue<C> {
    pub fn new(
        name: impl Into<String>,
        params: QueueParams,
        consumer: Arc<dyn Consumer>,
        clock: C,
    ) -> Result<Self, QueueError> {
        params.validate()?;
        Ok(Self {
            core: Arc::new(QueueCore {
                name: name.into(),
                params,
                clock,
                consumer,
                state: Mutex::new(QueueState {
                    backend: Backend::Direct,
                    phys: 0,
                    log_deq: 0,
                    deq_id_next: 1,
                    deq_id_del: 1,
                    to_delete: std::collections::BTreeMap::new(),
                    updates_since_persist: 0,
                    runs_da: false,
                }),
                not_empty: Condvar::new(),
                not_full: Condvar::new(),
                below_full_dly: Condvar::new(),
                below_light_dly: Condvar::new(),
                pools: Mutex::new(Pools::default()),
                started: AtomicBool::new(false),
                enq_only: AtomicBool::new(false),
                stopping: AtomicBool::new(false),
                shutdown_immediate: Arc::new(AtomicBool::new(false)),
                phys_hint: AtomicUsize::new(0),
                runs_da_hint: AtomicBool::new(false),
                da_broken: AtomicBool::new(false),
                parent: Mutex::new(None),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn queue_type(&self) -> QueueType {
        self.core.params.queue_type
    }

    pub fn params(&self) -> &QueueParams {
        &self.core.params
    }

    /// Records buffered and not yet handed to a worker.
    pub fn logical_len(&self) -> usize {
        self.core.state.lock().logical_size()
    }

    /// Records physically present, including in-flight batches.
    pub fn physical_len(&self) -> usize {
        self.core.state.lock().phys
    }

    pub fn bytes_on_disk(&self) -> u64 {
        self.core.state.lock().backend.bytes_on_disk()
    }

    pub fn runs_da(&self) -> bool {
        self.core.runs_da_hint.load(Ordering::Relaxed)
    }

    /// Construct the backend (rehydrating a disk store from its
    /// sidecar when present) and arm the worker pool.
    pub fn start(&self) -> Result<(), QueueError> {
        let core = &self.core;
        if core.started.load(Ordering::SeqCst) {
            return Err(QueueError::AlreadyStarted);
        }

        if core.params.queue_type == QueueType::Direct {
            core.started.store(true, Ordering::SeqCst);
            return Ok(());
        }

        let (backend, phys) = core.build_backend()?;
        {
            let mut st = core.state.lock();
            st.backend = backend;
            st.phys = phys;
        }
        core.phys_hint.store(phys, Ordering::Relaxed);

        {
            let reg = WorkerPool::new(
                format!("{}/wtp", core.name),
                core.params.effective_num_workers(),
                core.params.worker_shutdown_timeout(),
                Arc::new(RegClient { core: Arc::downgrade(core) }),
            );
            core.pools.lock().reg = Some(reg);
        }
        core.started.store(true, Ordering::SeqCst);
        tracing::info!(queue = %core.name, qtype = %core.params.queue_type, size = phys, "queue started");

        // a leftover sidecar on a DA-capable queue means the last
        // run spilled to disk; resume draining it now
        if core.params.da_capable() {
            if let Some(prefix) = &core.params.file_prefix {
                if QueueInfo::exists(prefix) {
                    tracing::info!(queue = %core.name, "found spill from previous run, resuming disk-assist");
                    if let Err(err) = self.start_da() {
                        tracing::error!(queue = %core.name, %err, "could not resume disk-assist");
                    }
                }
            }
        }
        if phys > 0 {
            self.advise_workers();
        }
        Ok(())
    }

    /// Enqueue one record, honouring its flow-control class.
    pub fn enqueue(&self, msg: Msg) -> Result<Enqueued, AdmissionError> {
        let flow = msg.flow;
        self.enqueue_flow(msg, flow)
    }

    /// Enqueue with an explicit flow class (disk-assist pumps force
    /// `NoDelay` regardless of the record's own class).
    pub fn enqueue_flow(&self, msg: Msg, flow: FlowClass) -> Result<Enqueued, AdmissionError> {
        let core = &self.core;
        if !core.started.load(Ordering::SeqCst) {
            return Err(AdmissionError::NotStarted);
        }
        if core.params.queue_type == QueueType::Direct {
            let mut batch = Batch::single(msg, Arc::clone(&core.shutdown_immediate));
            if let Err(err) = core.consumer.process(&mut batch) {
                tracing::debug!(queue = %core.name, %err, "direct consumer reported failure");
            }
            return Ok(Enqueued::Delivered);
        }

        // discard-by-severity check, deliberately against the lock-free
        // mirrors: a slightly stale size only shifts the boundary by a
        // record or two, and discarding is erratic by nature
        core.check_discard(
            core.phys_hint.load(Ordering::Relaxed),
            core.runs_da_hint.load(Ordering::Relaxed),
            &msg,
        )?;

        let mut st = loop {
            let st = core.state.lock();
            let need_da = core.params.da_capable()
                && !st.runs_da
                && !core.da_broken.load(Ordering::Relaxed)
                && st.phys >= core.params.effective_high_mark();
            if !need_da {
                break st;
            }
            drop(st);
            if let Err(err) = self.start_da() {
                tracing::error!(queue = %core.name, %err, "disk-assist start failed, continuing in memory");
                core.da_broken.store(true, Ordering::Relaxed);
            }
        };

        // advanced flow control: delayable sources park here
        match flow {
            FlowClass::FullDelay => {
                while st.phys >= core.params.effective_full_delay_mark()
                    && !core.stopping.load(Ordering::Relaxed)
                {
                    tracing::debug!(queue = %core.name, "full-delay mark reached, blocking producer");
                    core.below_full_dly.wait(&mut st);
                }
            }
            FlowClass::LightDelay => {
                if st.phys >= core.params.effective_light_delay_mark()
                    && !core.stopping.load(Ordering::Relaxed)
                {
                    tracing::debug!(queue = %core.name, "light-delay mark reached, blocking briefly");
                    core.below_light_dly.wait_for(&mut st, Duration::from_secs(1));
                }
            }
            FlowClass::NoDelay => {}
        }

        // basic flow control: the queue must have room
        loop {
            let disk_full = core.params.max_disk_bytes > 0
                && st.backend.bytes_on_disk() > core.params.max_disk_bytes;
            if st.phys < core.params.capacity && !disk_full {
                break;
            }
            let timed_out = core
                .not_full
                .wait_for(&mut st, core.params.enqueue_timeout())
                .timed_out();
            if timed_out {
                let disk_full = core.params.max_disk_bytes > 0
                    && st.backend.bytes_on_disk() > core.params.max_disk_bytes;
                if st.phys >= core.params.capacity || disk_full {
                    tracing::warn!(queue = %core.name, "enqueue timeout on full queue, dropping record");
                    return Err(AdmissionError::Full);
                }
            }
        }

        if let Err(err) = st.backend.add(msg) {
            tracing::error!(queue = %core.name, %err, "backend rejected record");
            return Err(AdmissionError::Full);
        }
        st.phys += 1;
        core.phys_hint.store(st.phys, Ordering::Relaxed);
        core.maybe_checkpoint(&mut st, 1);
        drop(st);

        core.not_empty.notify_one();
        self.advise_workers();
        Ok(Enqueued::Queued)
    }

    /// Direct queues only: run the consumer on a caller-built batch,
    /// preserving per-slot flags such as `prev_was_suspended`.
    pub fn enqueue_direct_batch(&self, batch: &mut Batch) -> Result<(), DispatchError> {
        self.core.consumer.process(batch)
    }

    /// Stop accepting consumer work; records continue to be accepted.
    pub(crate) fn set_enq_only(&self) {
        self.core.enq_only.store(true, Ordering::SeqCst);
        self.core.wake_all();
        if let Some(reg) = self.core.pools.lock().reg.clone() {
            reg.set_state(PoolState::Shutdown);
        }
        tracing::debug!(queue = %self.core.name, "switched to enqueue-only mode");
    }

    /// Phased shutdown: drain, spill (if configured), force, persist.
    pub fn stop(&self) -> Result<(), QueueError> {
        let core = &self.core;
        if core.params.queue_type == QueueType::Direct {
            core.started.store(false, Ordering::SeqCst);
            return Ok(());
        }
        if !core.started.load(Ordering::SeqCst) || core.stopping.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::debug!(queue = %core.name, "initiating shutdown sequence");
        core.wake_all();

        let (reg, da, _) = core.snapshot_pools();

        // phase 1: let workers drain naturally within the queue timeout
        let deadline = Instant::now() + core.params.queue_shutdown_timeout();
        if core.runs_da_hint.load(Ordering::Relaxed) {
            if let Some(da) = &da {
                da.advise_max_workers(1);
            }
        }
        let mut drained = true;
        if let Some(reg) = &reg {
            drained = reg.shutdown(PoolState::Shutdown, Some(core.params.queue_shutdown_timeout()));
        }
        if drained && core.runs_da_hint.load(Ordering::Relaxed) {
            if let Some(da) = &da {
                da.shutdown(
                    PoolState::Shutdown,
                    Some(deadline.saturating_duration_since(Instant::now())),
                );
            }
        }

        // phase 2: spill what remains to the disk child
        if let Some(reg) = &reg {
            reg.set_state(PoolState::ShutdownImmediate);
        }
        if core.params.da_capable()
            && core.params.save_on_shutdown
            && core.state.lock().phys > 0
        {
            if !core.runs_da_hint.load(Ordering::Relaxed) {
                if let Err(err) = self.start_da() {
                    tracing::error!(queue = %core.name, %err, "cannot spill on shutdown");
                }
            }
            let (_, da, child) = core.snapshot_pools();
            if let Some(child) = &child {
                child.set_enq_only();
            }
            if let Some(da) = &da {
                tracing::info!(queue = %core.name, "save-on-shutdown: spilling remainder to disk");
                da.advise_max_workers(1);
                // deliberately unbounded: abandoning the spill would
                // silently lose records
                da.shutdown(PoolState::Shutdown, None);
            }
        }

        // phase 3: force remaining workers out within the action timeout
        if core.state.lock().phys > 0 {
            if let Some(reg) = &reg {
                if reg.current_workers() > 0 {
                    reg.shutdown(
                        PoolState::ShutdownImmediate,
                        Some(core.params.action_shutdown_timeout()),
                    );
                }
            }
            let (_, da, _) = core.snapshot_pools();
            if let Some(da) = &da {
                if da.current_workers() > 0 {
                    da.shutdown(
                        PoolState::ShutdownImmediate,
                        Some(core.params.action_shutdown_timeout()),
                    );
                }
            }
        }

        // phase 4: cooperative cancellation - batches abort between
        // slots, condvars are broadcast, stragglers get a short grace
        core.shutdown_immediate.store(true, Ordering::SeqCst);
        core.wake_all();
        let (_, da_now, _) = core.snapshot_pools();
        for pool in [&reg, &da_now] {
            if let Some(pool) = pool {
                if !pool.shutdown(PoolState::ShutdownImmediate, Some(Duration::from_millis(100))) {
                    tracing::warn!(
                        queue = %core.name,
                        "worker still inside its consumer at shutdown, detaching"
                    );
                }
            }
        }

        let (_, _, child) = core.snapshot_pools();
        if let Some(child) = &child {
            if let Err(err) = child.stop() {
                tracing::error!(queue = %core.name, %err, "error stopping disk-assist child");
            }
        }

        {
            let mut st = core.state.lock();
            core.persist_final(&mut st);
            tracing::info!(queue = %core.name, remaining = st.phys, "queue stopped");
        }
        core.started.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Spin up the disk child and hand consumption to the DA worker.
    fn start_da(&self) -> Result<(), QueueError> {
        let core = &self.core;
        let mut pools = core.pools.lock();
        if core.state.lock().runs_da {
            return Ok(());
        }

        let child = match &pools.da_child {
            Some(child) => child.clone(),
            None => {
                let prefix = core.params.file_prefix.clone().ok_or_else(|| {
                    AdmissionError::InvalidParams("disk-assist requires a file-prefix".into())
                })?;
                let child_params = QueueParams::default()
                    .queue_type(QueueType::Disk)
                    .capacity(core.params.capacity.max(1000))
                    .deq_batch_size(core.params.deq_batch_size)
                    .max_file_size(core.params.max_file_size)
                    .max_disk_bytes(core.params.max_disk_bytes)
                    .persist_update_count(core.params.persist_update_count)
                    .queue_shutdown_timeout_ms(core.params.queue_shutdown_timeout_ms)
                    .action_shutdown_timeout_ms(core.params.action_shutdown_timeout_ms)
                    .enqueue_timeout_ms(core.params.enqueue_timeout_ms)
                    .file_prefix(prefix);
                let child = Queue::new(
                    format!("{}[DA]", core.name),
                    child_params,
                    Arc::clone(&core.consumer),
                    core.clock.clone(),
                )?;
                *child.core.parent.lock() = Some(Arc::downgrade(core));
                child.start()?;
                pools.da_child = Some(child.clone());
                child
            }
        };

        let da_pool = match &pools.da {
            Some(pool) => Arc::clone(pool),
            None => {
                let pool = WorkerPool::new(
                    format!("{}/wtpDA", core.name),
                    1,
                    Duration::from_secs(1),
                    Arc::new(DaClient { core: Arc::downgrade(core), child: child.clone() }),
                );
                pools.da = Some(Arc::clone(&pool));
                pool
            }
        };
        drop(pools);

        core.state.lock().runs_da = true;
        core.runs_da_hint.store(true, Ordering::Relaxed);
        tracing::info!(queue = %core.name, "disk-assist mode started");
        da_pool.advise_max_workers(1);
        Ok(())
    }

    fn advise_workers(&self) {
        self.core.advise_workers();
    }
}

impl<C: Clock> QueueCore<C> {
    fn build_backend(&self) -> Result<(Backend, usize), QueueError> {
        match self.params.queue_type {
            QueueType::FixedArray => Ok((Backend::Array(ArrayStore::new(self.params.capacity)), 0)),
            QueueType::LinkedList => Ok((Backend::List(ListStore::new()), 0)),
            QueueType::Disk => {
                let prefix: PathBuf = self.params.file_prefix.clone().ok_or_else(|| {
                    AdmissionError::InvalidParams("disk queues require a file-prefix".into())
                })?;
                match QueueInfo::load(&prefix)? {
                    Some(info) => {
                        if info.queue_type != QueueType::Disk {
                            return Err(rill_core::PersistError::TypeMismatch {
                                expected: QueueType::Disk.to_string(),
                                found: info.queue_type.to_string(),
                            }
                            .into());
                        }
                        let store =
                            DiskStore::resume(prefix, self.params.max_file_size, &info)?;
                        tracing::info!(
                            queue = %self.name,
                            records = info.phys_size,
                            "rehydrated disk queue from sidecar"
                        );
                        Ok((Backend::Disk(store), info.phys_size))
                    }
                    None => Ok((
                        Backend::Disk(DiskStore::create(prefix, self.params.max_file_size)),
                        0,
                    )),
                }
            }
            QueueType::Direct => Ok((Backend::Direct, 0)),
        }
    }

    fn check_discard(&self, phys: usize, runs_da: bool, msg: &Msg) -> Result<(), AdmissionError> {
        let Some(threshold) = self.params.discard_severity else {
            return Ok(());
        };
        let mark = self.params.effective_discard_mark();
        if mark > 0 && phys >= mark && !runs_da && msg.severity() >= threshold {
            tracing::debug!(
                queue = %self.name,
                size = phys,
                severity = %msg.severity(),
                "queue near full, discarding by severity"
            );
            return Err(AdmissionError::FullDropped);
        }
        Ok(())
    }

    /// Pull up to a batch of records off the store. Records whose
    /// severity triggers discard at dequeue stay in the batch as
    /// `Discarded` so deletion accounting stays aligned.
    fn fetch_locked(&self, st: &mut QueueState) -> Option<Batch> {
        if st.logical_size() == 0 {
            return None;
        }
        let max = self.params.deq_batch_size;
        let mut batch = Batch::with_capacity(Arc::clone(&self.shutdown_immediate), max);
        while batch.len() < max && st.logical_size() > 0 {
            match st.backend.deq() {
                Ok(Some(msg)) => {
                    st.log_deq += 1;
                    let discard = self.check_discard(st.phys, st.runs_da, &msg).is_err();
                    batch.push(msg);
                    if discard {
                        let idx = batch.len() - 1;
                        batch.slots[idx].state = SlotState::Discarded;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    tracing::error!(queue = %self.name, %err, "dequeue failed, skipping rest of batch");
                    break;
                }
            }
        }
        if batch.is_empty() {
            return None;
        }
        batch.deq_id = st.deq_id_next;
        st.deq_id_next += 1;
        Some(batch)
    }

    /// Physically remove a committed batch, honouring `deq_id`
    /// order via the to-delete list.
    fn reclaim(&self, st: &mut QueueState, deq_id: u64, count: usize) {
        if deq_id == st.deq_id_del {
            self.delete_run(st, count);
            loop {
                let Some((&id, &cnt)) = st.to_delete.iter().next() else {
                    break;
                };
                if id != st.deq_id_del {
                    break;
                }
                st.to_delete.remove(&id);
                self.delete_run(st, cnt);
            }
        } else {
            st.to_delete.insert(deq_id, count);
        }
    }

    fn reclaim_batch(&self, st: &mut QueueState, batch: &Batch) {
        self.reclaim(st, batch.deq_id, batch.len());
    }

    fn delete_run(&self, st: &mut QueueState, n: usize) {
        for _ in 0..n {
            if let Err(err) = st.backend.del() {
                tracing::error!(queue = %self.name, %err, "delete failed, store may hold stale records");
                break;
            }
        }
        st.phys = st.phys.saturating_sub(n);
        st.log_deq = st.log_deq.saturating_sub(n);
        st.deq_id_del += 1;
        self.phys_hint.store(st.phys, Ordering::Relaxed);
        self.maybe_checkpoint(st, n);

        self.not_full.notify_all();
        if st.phys < self.params.effective_full_delay_mark() {
            self.below_full_dly.notify_all();
        }
        if st.phys < self.params.effective_light_delay_mark() {
            self.below_light_dly.notify_all();
        }
        if st.phys == 0 {
            // a drained DA child wakes the parent's pump so it can
            // notice and tear disk-assist down
            let parent = self.parent.lock().clone();
            if let Some(parent) = parent.and_then(|weak| weak.upgrade()) {
                parent.not_empty.notify_all();
            }
        }
    }

    /// Give an aborted batch's uncommitted tail back to the store.
    /// Only possible for the newest dequeue with nothing queued
    /// behind it; otherwise the whole batch is reclaimed
    /// (at-least-once permits the redelivery that avoids).
    fn requeue_batch(&self, st: &mut QueueState, batch: &Batch) {
        let total = batch.len();
        let done = batch.done_up_to.min(total);
        let tail = total - done;
        let newest = batch.deq_id + 1 == st.deq_id_next;
        if tail > 0 && newest && st.to_delete.is_empty() {
            let rewound = st.backend.requeue(tail);
            st.log_deq = st.log_deq.saturating_sub(rewound);
            self.reclaim(st, batch.deq_id, total - rewound);
            self.not_empty.notify_one();
            tracing::debug!(queue = %self.name, rewound, "requeued aborted batch tail");
        } else {
            self.reclaim(st, batch.deq_id, total);
        }
    }

    fn maybe_checkpoint(&self, st: &mut QueueState, n_updates: usize) {
        st.updates_since_persist += n_updates;
        if self.params.persist_update_count == 0
            || st.updates_since_persist < self.params.persist_update_count
        {
            return;
        }
        st.updates_since_persist = 0;
        self.persist_sidecar(st);
    }

    fn persist_sidecar(&self, st: &QueueState) {
        let Some(prefix) = &self.params.file_prefix else {
            return;
        };
        let Some(disk) = st.backend.disk() else {
            return;
        };
        let info = disk.queue_info(self.params.queue_type, st.phys);
        if let Err(err) = info.save(prefix) {
            tracing::error!(queue = %self.name, %err, "could not checkpoint queue info");
        }
    }

    /// Final persistence at shutdown. An empty disk queue removes
    /// its sidecar and segments; a non-empty one persists so the
    /// next run resumes it. Memory queues lose what remains, which
    /// is the documented save-on-shutdown=false behaviour.
    fn persist_final(&self, st: &mut QueueState) {
        match &st.backend {
            Backend::Disk(disk) => {
                let Some(prefix) = &self.params.file_prefix else {
                    return;
                };
                if st.phys == 0 {
                    if let Err(err) = QueueInfo::remove(prefix) {
                        tracing::warn!(queue = %self.name, %err, "could not remove queue sidecar");
                    }
                    disk.discard_files();
                } else {
                    let info = disk.queue_info(self.params.queue_type, st.phys);
                    match info.save(prefix) {
                        Ok(()) => {
                            tracing::info!(queue = %self.name, records = st.phys, "persisted queue for next run")
                        }
                        Err(err) => {
                            tracing::error!(queue = %self.name, %err, "persist failed, queued data lost")
                        }
                    }
                }
            }
            _ => {
                if st.phys > 0 {
                    tracing::warn!(
                        queue = %self.name,
                        lost = st.phys,
                        "memory queue shut down non-empty, records lost"
                    );
                }
            }
        }
    }

    fn snapshot_pools(&self) -> (Option<Arc<WorkerPool>>, Option<Arc<WorkerPool>>, Option<Queue<C>>) {
        let pools = self.pools.lock();
        (pools.reg.clone(), pools.da.clone(), pools.da_child.clone())
    }

    fn wake_all(&self) {
        self.not_empty.notify_all();
        self.not_full.notify_all();
        self.below_full_dly.notify_all();
        self.below_light_dly.notify_all();
    }

    /// Make sure enough workers run for the backlog: one per
    /// `min_msgs_per_worker` queued records, one for disk queues,
    /// exactly one DA pump while disk-assist is active.
    fn advise_workers(&self) {
        if self.enq_only.load(Ordering::Relaxed) {
            return;
        }
        let (logical, runs_da) = {
            let st = self.state.lock();
            (st.logical_size(), st.runs_da)
        };
        let pools = self.pools.lock();
        if runs_da {
            if let Some(da) = &pools.da {
                da.advise_max_workers(1);
            }
        } else if let Some(reg) = &pools.reg {
            let n = if self.params.queue_type == QueueType::Disk
                || self.params.min_msgs_per_worker == 0
            {
                1
            } else {
                logical / self.params.min_msgs_per_worker + 1
            };
            reg.advise_max_workers(n);
        }
    }

    /// Disk-assist finished draining: hand consumption back to the
    /// regular workers.
    fn finish_da(&self) {
        self.runs_da_hint.store(false, Ordering::Relaxed);
        // hold the pools lock across the child stop so a concurrent
        // start_da cannot reopen the spool files mid-teardown
        let mut pools = self.pools.lock();
        pools.da = None;
        if let Some(child) = pools.da_child.take() {
            if let Err(err) = child.stop() {
                tracing::error!(queue = %self.name, %err, "error stopping drained disk-assist child");
            }
        }
        drop(pools);
        tracing::info!(queue = %self.name, "disk-assist mode ended");
        self.advise_workers();
    }

    /// Sleep until the dequeue window opens (minute-accurate), in
    /// cooperative chunks so shutdown is never blocked on it.
    fn window_sleep(&self) {
        let Some(win) = &self.params.deq_window else {
            return;
        };
        let mut remaining = window_delay_secs(win, self.clock.local_hms());
        if remaining == 0 {
            return;
        }
        tracing::info!(queue = %self.name, delay_s = remaining, "outside dequeue time window, sleeping");
        // only an immediate shutdown interrupts the window sleep;
        // orderly shutdown phases (including spill) run around it
        while remaining > 0 && !self.shutdown_immediate.load(Ordering::Relaxed) {
            std::thread::sleep(Duration::from_millis(250));
            remaining = window_delay_secs(win, self.clock.local_hms());
        }
    }
}

/// Seconds until the dequeue window opens; 0 when inside it.
fn window_delay_secs(win: &DeqWindow, (hour, minute, second): (u32, u32, u32)) -> u64 {
    let inside = if win.to_hour < win.from_hour {
        // wraps midnight, e.g. 22 -> 4
        hour >= win.from_hour || hour < win.to_hour
    } else {
        hour >= win.from_hour && hour < win.to_hour
    };
    if inside || win.from_hour == win.to_hour {
        return 0;
    }
    let hours_until = if hour < win.from_hour {
        win.from_hour - hour
    } else {
        24 - hour + win.from_hour
    };
    // already part-way into the current hour
    (u64::from(hours_until) * 3600).saturating_sub(u64::from(minute) * 60 + u64::from(second))
}

/// Pool client for regular workers: dequeue a batch, run the
/// consumer, reclaim on the next turn.
struct RegClient<C: Clock> {
    core: Weak<QueueCore<C>>,
}

impl<C: Clock> PoolClient for RegClient<C> {
    fn do_work(&self, wti: &mut WorkerInst) -> WorkStatus {
        let Some(core) = self.core.upgrade() else {
            return WorkStatus::Terminate;
        };
        let mut st = core.state.lock();
        if let Some(batch) = wti.pending.take() {
            core.reclaim_batch(&mut st, &batch);
        }
        if core.enq_only.load(Ordering::Relaxed) {
            return WorkStatus::Terminate;
        }
        if st.runs_da {
            // the DA pump owns consumption now
            return WorkStatus::Terminate;
        }
        let Some(mut batch) = core.fetch_locked(&mut st) else {
            return WorkStatus::Idle;
        };
        core.maybe_checkpoint(&mut st, batch.len());
        drop(st);

        match core.consumer.process(&mut batch) {
            Ok(()) => {}
            Err(DispatchError::ForceTerminate) => {
                let mut st = core.state.lock();
                core.requeue_batch(&mut st, &batch);
                return WorkStatus::Terminate;
            }
            Err(err) => {
                tracing::debug!(queue = %core.name, %err, "consumer reported batch failure");
            }
        }
        wti.pending = Some(batch);

        if let Some(slowdown) = core.params.deq_slowdown() {
            std::thread::sleep(slowdown);
        }
        WorkStatus::Busy
    }

    fn idle_wait(&self, timeout: Duration) -> IdleWake {
        let Some(core) = self.core.upgrade() else {
            return IdleWake::Woken;
        };
        let mut st = core.state.lock();
        if st.logical_size() > 0 || core.stopping.load(Ordering::Relaxed) {
            return IdleWake::Woken;
        }
        if core.not_empty.wait_for(&mut st, timeout).timed_out() {
            IdleWake::TimedOut
        } else {
            IdleWake::Woken
        }
    }

    fn rate_limit(&self) {
        if let Some(core) = self.core.upgrade() {
            core.window_sleep();
        }
    }

    fn on_worker_exit(&self, wti: &mut WorkerInst) {
        let (Some(core), Some(batch)) = (self.core.upgrade(), wti.pending.take()) else {
            return;
        };
        let mut st = core.state.lock();
        core.reclaim_batch(&mut st, &batch);
    }

    fn wake_all(&self) {
        if let Some(core) = self.core.upgrade() {
            core.wake_all();
        }
    }
}

/// Pool client for the single disk-assist pump: drains the memory
/// store into the disk child, which runs the real consumer.
struct DaClient<C: Clock> {
    core: Weak<QueueCore<C>>,
    child: Queue<C>,
}

impl<C: Clock> PoolClient for DaClient<C> {
    fn do_work(&self, wti: &mut WorkerInst) -> WorkStatus {
        let Some(core) = self.core.upgrade() else {
            return WorkStatus::Terminate;
        };
        let mut st = core.state.lock();
        if let Some(batch) = wti.pending.take() {
            core.reclaim_batch(&mut st, &batch);
        }
        if !st.runs_da {
            return WorkStatus::Terminate;
        }
        if st.logical_size() == 0 {
            if st.phys == 0 && self.child.logical_len() == 0 && self.child.physical_len() == 0 {
                st.runs_da = false;
                drop(st);
                core.finish_da();
                return WorkStatus::Terminate;
            }
            return WorkStatus::Idle;
        }
        let Some(batch) = core.fetch_locked(&mut st) else {
            return WorkStatus::Idle;
        };
        core.maybe_checkpoint(&mut st, batch.len());
        drop(st);

        let mut sent = 0;
        for slot in &batch.slots {
            if slot.state == SlotState::Discarded {
                sent += 1;
                continue;
            }
            match self.child.enqueue_flow(Arc::clone(&slot.msg), FlowClass::NoDelay) {
                Ok(_) => sent += 1,
                Err(err) => {
                    tracing::warn!(queue = %core.name, %err, "disk-assist child rejected record");
                    break;
                }
            }
        }

        if sent < batch.len() {
            let mut batch = batch;
            batch.done_up_to = sent;
            let mut st = core.state.lock();
            core.requeue_batch(&mut st, &batch);
            // give the child room before trying again
            return WorkStatus::Idle;
        }
        wti.pending = Some(batch);
        WorkStatus::Busy
    }

    fn idle_wait(&self, timeout: Duration) -> IdleWake {
        let Some(core) = self.core.upgrade() else {
            return IdleWake::Woken;
        };
        let mut st = core.state.lock();
        if st.logical_size() > 0 || core.stopping.load(Ordering::Relaxed) {
            return IdleWake::Woken;
        }
        if core.not_empty.wait_for(&mut st, timeout).timed_out() {
            IdleWake::TimedOut
        } else {
            IdleWake::Woken
        }
    }

    fn always_running(&self) -> bool {
        true
    }

    fn on_worker_exit(&self, wti: &mut WorkerInst) {
        let (Some(core), Some(batch)) = (self.core.upgrade(), wti.pending.take()) else {
            return;
        };
        let mut st = core.state.lock();
        core.reclaim_batch(&mut st, &batch);
    }

    fn wake_all(&self) {
        if let Some(core) = self.core.upgrade() {
            core.wake_all();
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
