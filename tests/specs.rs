// SPDX-License-Identifier: MIT

//! End-to-end scenarios across the router, action engine and queue
//! engine, exercised through public APIs only.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use rill_core::test_support::{msg, msg_with_flow};
use rill_core::{Batch, Consumer, DispatchError, FakeClock, FlowClass, SlotState, SystemClock};
use rill_engine::test_support::MockOutput;
use rill_engine::{Action, ActionParams, ActionState, FnTemplate, MatchAll, Rule, Router, Ruleset};
use rill_queue::{Queue, QueueParams, QueueType};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter("warn").try_init();
}

fn wait_until(deadline_ms: u64, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_millis(deadline_ms);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    cond()
}

fn text_template() -> Vec<Arc<dyn rill_engine::Template>> {
    vec![Arc::new(FnTemplate::new(|m| m.text.clone()))]
}

fn texts(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("m{i:05}")).collect()
}

/// Firehose path: 1000 distinct records, module called once each,
/// in order, queue quiescent afterwards.
#[test]
fn firehose_delivers_everything_in_order() {
    init_tracing();
    let (module, handle) = MockOutput::new();
    let action = Action::new(
        ActionParams::default()
            .name("firehose")
            .write_all_mark_msgs(true),
        text_template(),
        module,
        SystemClock,
    )
    .unwrap();

    let router = Router::builder(SystemClock)
        .main_queue(QueueParams::default().capacity(2000))
        .ruleset(Ruleset::new("default").rule(Rule::new(MatchAll).action(action)))
        .build()
        .unwrap();
    router.start().unwrap();

    for t in texts(1000) {
        router.submit(msg(t)).unwrap();
    }

    assert!(wait_until(10_000, || handle.journal().len() == 1000));
    assert_eq!(handle.journal(), texts(1000));
    assert!(wait_until(2_000, || router.main_queue().logical_len() == 0));
    router.stop().unwrap();
}

/// Duplicate suppression: 100 identical records then one different
/// one yield the first record, a repeat marker, and the newcomer.
#[test]
fn duplicate_suppression_emits_repeat_marker() {
    init_tracing();
    let (module, handle) = MockOutput::new();
    let action = Action::new(
        ActionParams::default().name("dedup").reduce_repeated(true),
        text_template(),
        module,
        FakeClock::new(),
    )
    .unwrap();

    let router = Router::builder(FakeClock::new())
        .main_queue(QueueParams::default().queue_type(QueueType::Direct))
        .ruleset(Ruleset::new("default").rule(Rule::new(MatchAll).action(action)))
        .build()
        .unwrap();
    router.start().unwrap();

    for _ in 0..100 {
        router.submit(msg("disk is on fire")).unwrap();
    }
    router.submit(msg("all is well again")).unwrap();

    assert_eq!(
        handle.journal(),
        vec![
            "disk is on fire".to_string(),
            "message repeated 99 times: [disk is on fire]".to_string(),
            "all is well again".to_string(),
        ]
    );
    router.stop().unwrap();
}

/// Nth-occurrence gating: with every-5th configured, 12 records
/// produce exactly the 5th and 10th.
#[test]
fn nth_occurrence_gating_emits_fifth_and_tenth() {
    init_tracing();
    let (module, handle) = MockOutput::new();
    let action = Action::new(
        ActionParams::default().name("nth").exec_every_nth(5),
        text_template(),
        module,
        FakeClock::new(),
    )
    .unwrap();

    let router = Router::builder(FakeClock::new())
        .main_queue(QueueParams::default().queue_type(QueueType::Direct))
        .ruleset(Ruleset::new("default").rule(Rule::new(MatchAll).action(action)))
        .build()
        .unwrap();
    router.start().unwrap();

    for i in 1..=12 {
        router.submit(msg(format!("evt{i}"))).unwrap();
    }

    assert_eq!(handle.journal(), vec!["evt5", "evt10"]);
    router.stop().unwrap();
}

/// Disk-assist spill and recovery: a memory action queue whose
/// worker cannot run (dequeue window closed) overflows to disk,
/// spills the rest at shutdown, and the next run delivers all 500
/// in order.
#[test]
fn da_spill_survives_restart() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("actq");

    // a window that is never open right now
    let (hour, _, _) = {
        use rill_core::Clock;
        SystemClock.local_hms()
    };
    let closed_from = (hour + 2) % 24;
    let closed_to = (hour + 4) % 24;

    let first_run_queue = QueueParams::default()
        .capacity(100)
        .high_mark(80)
        .deq_batch_size(8)
        .enqueue_timeout_ms(2000)
        .queue_shutdown_timeout_ms(100)
        .action_shutdown_timeout_ms(100)
        .save_on_shutdown(true)
        .file_prefix(prefix.clone())
        .deq_window(closed_from, closed_to);

    {
        let (module, handle) = MockOutput::new();
        // the output target is wedged for the whole first run
        handle.close_gate();
        let action = Action::new(
            ActionParams::default()
                .name("spooler")
                .write_all_mark_msgs(true)
                .queue(first_run_queue),
            text_template(),
            module,
            SystemClock,
        )
        .unwrap();
        action.start().unwrap();

        let mut batch = Batch::new(Arc::new(AtomicBool::new(false)));
        for t in texts(500) {
            batch.push(msg(t));
        }
        action.submit(&mut batch);

        assert!(action.queue().runs_da());
        action.stop().unwrap();
        // nothing was consumed: the window never opened
        assert!(handle.journal().is_empty());
    }
    assert!(rill_queue::QueueInfo::exists(&prefix));

    // second run: no window, same prefix - everything drains
    let second_run_queue = QueueParams::default()
        .capacity(100)
        .high_mark(80)
        .queue_shutdown_timeout_ms(2000)
        .file_prefix(prefix.clone());
    let (module, handle) = MockOutput::new();
    let action = Action::new(
        ActionParams::default()
            .name("spooler")
            .write_all_mark_msgs(true)
            .queue(second_run_queue),
        text_template(),
        module,
        SystemClock,
    )
    .unwrap();
    action.start().unwrap();

    assert!(wait_until(15_000, || handle.journal().len() == 500));
    assert_eq!(handle.journal(), texts(500));
    assert!(wait_until(5_000, || !action.queue().runs_da()));
    action.stop().unwrap();
    assert!(!rill_queue::QueueInfo::exists(&prefix));
}

/// Suspend/retry: a module failing every 5th call recovers on
/// resume; all 20 records are delivered and the action never dies.
#[test]
fn suspended_module_recovers_and_queue_drains() {
    init_tracing();
    let (module, handle) = MockOutput::new();
    handle.fail_every(5);
    let action = Action::new(
        ActionParams::default()
            .name("flaky")
            .resume_interval_ms(50)
            .resume_retry_count(3),
        text_template(),
        module,
        SystemClock,
    )
    .unwrap();
    let probe = action.clone();

    let router = Router::builder(SystemClock)
        .main_queue(QueueParams::default().capacity(100))
        .ruleset(Ruleset::new("default").rule(Rule::new(MatchAll).action(action)))
        .build()
        .unwrap();
    router.start().unwrap();

    for t in texts(20) {
        router.submit(msg(t)).unwrap();
    }

    assert!(wait_until(10_000, || handle.journal().len() == 20));
    assert_eq!(handle.journal(), texts(20));
    // four failures, four resume probes, never terminal
    assert!(handle.resume_calls() >= 4);
    assert!(probe.state() != ActionState::Died);
    router.stop().unwrap();
}

/// Consumer whose gate blocks delivery until released; commits
/// every slot once open.
struct GateConsumer {
    open: AtomicBool,
    seen: parking_lot::Mutex<Vec<String>>,
}

impl GateConsumer {
    fn new(open: bool) -> Arc<Self> {
        Arc::new(Self { open: AtomicBool::new(open), seen: parking_lot::Mutex::new(Vec::new()) })
    }
}

impl Consumer for GateConsumer {
    fn process(&self, batch: &mut Batch) -> Result<(), DispatchError> {
        while !self.open.load(Ordering::SeqCst) {
            if batch.shutting_down() {
                return Err(DispatchError::ForceTerminate);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        for i in 0..batch.len() {
            if batch.slots[i].state != SlotState::Discarded {
                self.seen.lock().push(batch.slots[i].msg.text.clone());
            }
            batch.set_state(i, SlotState::Committed);
        }
        batch.done_up_to = batch.len();
        Ok(())
    }
}

/// Flow control: with the queue between the full-delay mark and
/// capacity, a no-delay record is admitted immediately while a
/// full-delay record blocks until the queue drains below the mark.
#[test]
fn full_delay_blocks_while_no_delay_passes() {
    init_tracing();
    let consumer = GateConsumer::new(false);
    let queue = Queue::new(
        "flow",
        QueueParams::default()
            .capacity(10)
            .full_delay_mark(5)
            .light_delay_mark(5)
            .queue_shutdown_timeout_ms(100)
            .action_shutdown_timeout_ms(100),
        consumer.clone(),
        SystemClock,
    )
    .unwrap();
    queue.start().unwrap();

    for t in texts(5) {
        queue.enqueue(msg(t)).unwrap();
    }
    assert!(wait_until(1000, || queue.physical_len() == 5));

    let blocked = Arc::new(AtomicBool::new(true));
    let blocked_flag = Arc::clone(&blocked);
    let producer = {
        let queue = queue.clone();
        std::thread::spawn(move || {
            let result = queue.enqueue(msg_with_flow("patient", FlowClass::FullDelay));
            blocked_flag.store(false, Ordering::SeqCst);
            result
        })
    };

    // the full-delay producer parks at the mark...
    std::thread::sleep(Duration::from_millis(150));
    assert!(blocked.load(Ordering::SeqCst));

    // ...while a no-delay record sails through
    queue.enqueue(msg_with_flow("urgent", FlowClass::NoDelay)).unwrap();

    // releasing the consumer drains the queue and unblocks the wait
    consumer.open.store(true, Ordering::SeqCst);
    assert!(wait_until(5_000, || !blocked.load(Ordering::SeqCst)));
    producer.join().expect("producer thread").unwrap();

    assert!(wait_until(5_000, || consumer.seen.lock().len() == 7));
    queue.stop().unwrap();
}
