// SPDX-License-Identifier: MIT

use super::*;
use crate::action::ActionParams;
use crate::template::FnTemplate;
use crate::test_support::{MockHandle, MockOutput};
use rill_core::test_support::{msg, msg_with_severity};
use rill_core::{Batch, FakeClock};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

fn make_action(name: &str, clock: &FakeClock) -> (Action<FakeClock>, MockHandle) {
    let (module, handle) = MockOutput::new();
    let action = Action::new(
        ActionParams::default().name(name),
        vec![Arc::new(FnTemplate::new(|m| m.text.clone()))],
        module,
        clock.clone(),
    )
    .unwrap();
    action.start().unwrap();
    (action, handle)
}

fn batch_of(msgs: Vec<rill_core::Msg>) -> Batch {
    let mut batch = Batch::new(Arc::new(AtomicBool::new(false)));
    for m in msgs {
        batch.slots.push(rill_core::BatchSlot::new(m));
    }
    batch
}

#[test]
fn filter_routes_only_matching_records() {
    let clock = FakeClock::new();
    let (action, handle) = make_action("chatty", &clock);
    // notice-or-numerically-above: error (3) stays out
    let ruleset = Ruleset::new("default")
        .rule(Rule::new(SeverityAtLeast(Severity::Notice)).action(action));

    let mut batch = batch_of(vec![
        msg_with_severity("boom", Severity::Error),
        msg_with_severity("fine", Severity::Notice),
        msg_with_severity("meh", Severity::Debug),
    ]);
    ruleset.process(&mut batch);

    assert_eq!(handle.journal(), vec!["fine", "meh"]);
    assert!(!batch.slots[0].filter_matched);
}

#[test]
fn rules_run_in_order_with_independent_filters() {
    let clock = FakeClock::new();
    let (all_action, all_handle) = make_action("all", &clock);
    let (app_action, app_handle) = make_action("app", &clock);

    let ruleset = Ruleset::new("default")
        .rule(Rule::new(MatchAll).action(all_action))
        .rule(
            Rule::new(FnFilter::new(|m| m.app == "sshd")).action(app_action),
        );

    let mut sshd = msg("login failed");
    {
        let rec = Arc::make_mut(&mut sshd);
        rec.app = "sshd".into();
    }
    let mut batch = batch_of(vec![msg("hello"), sshd]);
    ruleset.process(&mut batch);

    assert_eq!(all_handle.journal(), vec!["hello", "login failed"]);
    assert_eq!(app_handle.journal(), vec!["login failed"]);
}

#[test]
fn discard_rule_stops_later_rules_for_that_record() {
    let clock = FakeClock::new();
    let (action, handle) = make_action("rest", &clock);

    let ruleset = Ruleset::new("default")
        .rule(Rule::new(FnFilter::new(|m| m.text.contains("noise"))).discard())
        .rule(Rule::new(MatchAll).action(action));

    let mut batch = batch_of(vec![msg("noise: chatter"), msg("keep me")]);
    ruleset.process(&mut batch);

    assert_eq!(handle.journal(), vec!["keep me"]);
    assert_eq!(batch.slots[0].state, rill_core::SlotState::Discarded);
}

#[test]
fn one_rule_fans_out_to_multiple_actions() {
    let clock = FakeClock::new();
    let (first, first_handle) = make_action("first", &clock);
    let (second, second_handle) = make_action("second", &clock);

    let ruleset =
        Ruleset::new("default").rule(Rule::new(MatchAll).action(first).action(second));

    let mut batch = batch_of(vec![msg("fan-out")]);
    ruleset.process(&mut batch);

    assert_eq!(first_handle.journal(), vec!["fan-out"]);
    assert_eq!(second_handle.journal(), vec!["fan-out"]);
}
