// SPDX-License-Identifier: MIT

//! Rulesets: ordered filter → action rules evaluated per record.

use crate::action::Action;
use rill_core::{Batch, Clock, MsgRecord, Severity, SlotState, SystemClock};

/// The filter seam. Only the match verdict matters to the engine;
/// property comparisons and expression trees live outside the core.
pub trait Filter: Send + Sync {
    fn matches(&self, msg: &MsgRecord) -> bool;
}

/// Matches every record (the `*.*` selector).
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchAll;

impl Filter for MatchAll {
    fn matches(&self, _msg: &MsgRecord) -> bool {
        true
    }
}

/// Matches records at or above a severity (numerically >=, so
/// "info and above" includes debug).
#[derive(Debug, Clone, Copy)]
pub struct SeverityAtLeast(pub Severity);

impl Filter for SeverityAtLeast {
    fn matches(&self, msg: &MsgRecord) -> bool {
        msg.severity() >= self.0
    }
}

/// Closure-backed filter for embedders and tests.
pub struct FnFilter(Box<dyn Fn(&MsgRecord) -> bool + Send + Sync>);

impl FnFilter {
    pub fn new(f: impl Fn(&MsgRecord) -> bool + Send + Sync + 'static) -> Self {
        Self(Box::new(f))
    }
}

impl Filter for FnFilter {
    fn matches(&self, msg: &MsgRecord) -> bool {
        (self.0)(msg)
    }
}

/// One rule: a filter and the actions it fans out to, or a discard
/// terminator.
pub struct Rule<C: Clock = SystemClock> {
    filter: Box<dyn Filter>,
    actions: Vec<Action<C>>,
    discard: bool,
}

impl<C: Clock> Rule<C> {
    pub fn new(filter: impl Filter + 'static) -> Self {
        Self { filter: Box::new(filter), actions: Vec::new(), discard: false }
    }

    pub fn action(mut self, action: Action<C>) -> Self {
        self.actions.push(action);
        self
    }

    /// Matching records stop here; later rules never see them.
    pub fn discard(mut self) -> Self {
        self.discard = true;
        self
    }

    pub(crate) fn actions(&self) -> &[Action<C>] {
        &self.actions
    }
}

/// An ordered list of rules bound to inputs by name.
pub struct Ruleset<C: Clock = SystemClock> {
    name: String,
    rules: Vec<Rule<C>>,
}

impl<C: Clock> Ruleset<C> {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), rules: Vec::new() }
    }

    pub fn rule(mut self, rule: Rule<C>) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn rules(&self) -> &[Rule<C>] {
        &self.rules
    }

    /// Run a batch through every rule in order: evaluate the filter
    /// per record, fan matching records out to the rule's actions,
    /// honour discards.
    pub fn process(&self, batch: &mut Batch) {
        for rule in &self.rules {
            if batch.shutting_down() {
                return;
            }
            let mut any = false;
            for slot in &mut batch.slots {
                slot.filter_matched =
                    slot.state != SlotState::Discarded && rule.filter.matches(&slot.msg);
                any |= slot.filter_matched;
            }
            if !any {
                continue;
            }
            if rule.discard {
                let mut dropped = 0;
                for slot in &mut batch.slots {
                    if slot.filter_matched {
                        slot.state = SlotState::Discarded;
                        dropped += 1;
                    }
                }
                tracing::debug!(ruleset = %self.name, dropped, "discard rule matched");
                continue;
            }
            for action in &rule.actions {
                action.submit(batch);
            }
        }
    }
}

#[cfg(test)]
#[path = "ruleset_tests.rs"]
mod tests;
