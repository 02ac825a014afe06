// SPDX-License-Identifier: MIT

use super::*;
use crate::action::ActionParams;
use crate::ruleset::{MatchAll, Rule, Ruleset};
use crate::template::FnTemplate;
use crate::test_support::{MockHandle, MockOutput};
use rill_core::test_support::msg;
use rill_core::{FakeClock, MsgRecord};
use rill_queue::{QueueParams, QueueType};

fn make_action(name: &str, clock: &FakeClock) -> (Action<FakeClock>, MockHandle) {
    let (module, handle) = MockOutput::new();
    let action = Action::new(
        ActionParams::default().name(name),
        vec![Arc::new(FnTemplate::new(|m| m.text.clone()))],
        module,
        clock.clone(),
    )
    .unwrap();
    (action, handle)
}

/// Direct main queue: submissions run the whole pipeline on the
/// caller's thread, so asserts need no waiting.
fn direct_main() -> QueueParams {
    QueueParams::default().queue_type(QueueType::Direct)
}

#[test]
fn submit_runs_default_ruleset() {
    let clock = FakeClock::new();
    let (action, handle) = make_action("out", &clock);
    let router = Router::builder(clock)
        .main_queue(direct_main())
        .ruleset(Ruleset::new("default").rule(Rule::new(MatchAll).action(action)))
        .build()
        .unwrap();
    router.start().unwrap();

    router.submit(msg("one")).unwrap();
    router.submit(msg("two")).unwrap();

    assert_eq!(handle.journal(), vec!["one", "two"]);
    router.stop().unwrap();
}

#[test]
fn records_follow_their_bound_ruleset() {
    let clock = FakeClock::new();
    let (default_action, default_handle) = make_action("default-out", &clock);
    let (audit_action, audit_handle) = make_action("audit-out", &clock);

    let router = Router::builder(clock)
        .main_queue(direct_main())
        .ruleset(Ruleset::new("default").rule(Rule::new(MatchAll).action(default_action)))
        .ruleset(Ruleset::new("audit").rule(Rule::new(MatchAll).action(audit_action)))
        .default_ruleset("default")
        .build()
        .unwrap();
    router.start().unwrap();

    router.submit(msg("plain")).unwrap();
    router
        .submit(Arc::new(MsgRecord::builder().text("secure").ruleset("audit").build()))
        .unwrap();
    // unknown bindings fall back to the default ruleset
    router
        .submit(Arc::new(MsgRecord::builder().text("stray").ruleset("missing").build()))
        .unwrap();

    assert_eq!(default_handle.journal(), vec!["plain", "stray"]);
    assert_eq!(audit_handle.journal(), vec!["secure"]);
    router.stop().unwrap();
}

#[test]
fn buffered_main_queue_drains_on_stop() {
    let clock = FakeClock::new();
    let (action, handle) = make_action("out", &clock);
    let router = Router::builder(clock)
        .main_queue(QueueParams::default().capacity(100))
        .ruleset(Ruleset::new("default").rule(Rule::new(MatchAll).action(action)))
        .build()
        .unwrap();
    router.start().unwrap();

    for i in 0..20 {
        router.submit(msg(format!("r{i}"))).unwrap();
    }
    router.stop().unwrap();

    assert_eq!(handle.journal().len(), 20);
}

#[test]
fn build_rejects_unknown_default() {
    let clock = FakeClock::new();
    let result = Router::builder(clock)
        .ruleset(Ruleset::<FakeClock>::new("only"))
        .default_ruleset("absent")
        .build();
    assert!(result.is_err());
}

#[test]
fn hup_fans_out_to_every_action() {
    let clock = FakeClock::new();
    let (a1, h1) = make_action("a1", &clock);
    let (a2, h2) = make_action("a2", &clock);
    let router = Router::builder(clock)
        .main_queue(direct_main())
        .ruleset(
            Ruleset::new("default")
                .rule(Rule::new(MatchAll).action(a1))
                .rule(Rule::new(MatchAll).action(a2)),
        )
        .build()
        .unwrap();
    router.start().unwrap();

    router.hup();
    assert_eq!(h1.hup_calls(), 1);
    assert_eq!(h2.hup_calls(), 1);
    router.stop().unwrap();
}
