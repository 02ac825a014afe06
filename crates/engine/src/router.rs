// SPDX-License-Identifier: MIT

//! The input-facing entry point: a main queue whose consumer binds
//! each record to its ruleset and runs the rules.

use crate::action::Action;
use crate::ruleset::Ruleset;
use rill_core::{AdmissionError, Batch, Clock, Consumer, DispatchError, Msg, SystemClock};
use rill_queue::{Enqueued, Queue, QueueError, QueueParams};
use std::collections::HashMap;
use std::sync::Arc;

struct Registry<C: Clock> {
    rulesets: HashMap<String, Ruleset<C>>,
    default: String,
}

impl<C: Clock> Registry<C> {
    /// Input-assigned ruleset, or the default. `None` only if the
    /// registry is empty, which the builder rejects.
    fn resolve(&self, msg: &Msg) -> Option<&Ruleset<C>> {
        msg.ruleset
            .as_ref()
            .and_then(|name| self.rulesets.get(name.as_str()))
            .or_else(|| self.rulesets.get(&self.default))
    }
}

/// Main-queue consumer: split the batch into per-ruleset runs and
/// dispatch each through its rules.
struct Dispatcher<C: Clock>(Arc<Registry<C>>);

impl<C: Clock> Consumer for Dispatcher<C> {
    fn process(&self, batch: &mut Batch) -> Result<(), DispatchError> {
        let mut i = 0;
        while i < batch.len() {
            if batch.shutting_down() {
                return Err(DispatchError::ForceTerminate);
            }
            let key = batch.slots[i].msg.ruleset.clone();
            let mut j = i + 1;
            while j < batch.len() && batch.slots[j].msg.ruleset == key {
                j += 1;
            }

            let Some(ruleset) = self.0.resolve(&batch.slots[i].msg) else {
                tracing::warn!("no ruleset resolvable, dropping run");
                i = j;
                continue;
            };
            if i == 0 && j == batch.len() {
                ruleset.process(batch);
            } else {
                // mixed-binding batch: dispatch a contiguous run and
                // fold the slot outcomes back in
                let mut sub = Batch::new(batch.shutdown_handle());
                sub.slots = batch.slots[i..j].to_vec();
                ruleset.process(&mut sub);
                for (offset, slot) in sub.slots.into_iter().enumerate() {
                    batch.slots[i + offset] = slot;
                }
            }
            i = j;
        }
        Ok(())
    }
}

/// The router: named rulesets, a default, and the buffering main
/// queue in front of them.
pub struct Router<C: Clock = SystemClock> {
    main: Queue<C>,
    actions: Vec<Action<C>>,
}

impl<C: Clock> Router<C> {
    pub fn builder(clock: C) -> RouterBuilder<C> {
        RouterBuilder {
            clock,
            main_params: QueueParams::default(),
            rulesets: Vec::new(),
            default: None,
        }
    }

    /// Start every action queue, then the main queue.
    pub fn start(&self) -> Result<(), QueueError> {
        for action in &self.actions {
            action.start()?;
        }
        self.main.start()
    }

    /// Submit a parsed record. Only admission status is reported;
    /// once buffered there is no acknowledgement to the caller.
    pub fn submit(&self, msg: Msg) -> Result<Enqueued, AdmissionError> {
        self.main.enqueue(msg)
    }

    /// Drain and stop the main queue, then every action.
    pub fn stop(&self) -> Result<(), QueueError> {
        self.main.stop()?;
        for action in &self.actions {
            if let Err(err) = action.stop() {
                tracing::error!(action = %action.name(), %err, "error stopping action");
            }
        }
        Ok(())
    }

    /// Fan the advisory reload signal out to every action.
    pub fn hup(&self) {
        tracing::info!("reload signal, notifying all actions");
        for action in &self.actions {
            action.hup();
        }
    }

    pub fn main_queue(&self) -> &Queue<C> {
        &self.main
    }

    pub fn actions(&self) -> &[Action<C>] {
        &self.actions
    }
}

pub struct RouterBuilder<C: Clock> {
    clock: C,
    main_params: QueueParams,
    rulesets: Vec<Ruleset<C>>,
    default: Option<String>,
}

impl<C: Clock> RouterBuilder<C> {
    pub fn main_queue(mut self, params: QueueParams) -> Self {
        self.main_params = params;
        self
    }

    pub fn ruleset(mut self, ruleset: Ruleset<C>) -> Self {
        self.rulesets.push(ruleset);
        self
    }

    /// Name the ruleset records fall back to. Defaults to the first
    /// ruleset added.
    pub fn default_ruleset(mut self, name: impl Into<String>) -> Self {
        self.default = Some(name.into());
        self
    }

    pub fn build(self) -> Result<Router<C>, QueueError> {
        let default = match self.default {
            Some(name) => name,
            None => self
                .rulesets
                .first()
                .map(|rs| rs.name().to_string())
                .ok_or_else(|| {
                    AdmissionError::InvalidParams("router needs at least one ruleset".into())
                })?,
        };
        if !self.rulesets.iter().any(|rs| rs.name() == default) {
            return Err(AdmissionError::InvalidParams(format!(
                "default ruleset '{default}' is not defined"
            ))
            .into());
        }

        // collect each distinct action for lifecycle management
        let mut actions: Vec<Action<C>> = Vec::new();
        for ruleset in &self.rulesets {
            for rule in ruleset.rules() {
                for action in rule.actions() {
                    if !actions.iter().any(|a| a.core_ptr() == action.core_ptr()) {
                        actions.push(action.clone());
                    }
                }
            }
        }

        let registry = Arc::new(Registry {
            rulesets: self
                .rulesets
                .into_iter()
                .map(|rs| (rs.name().to_string(), rs))
                .collect(),
            default,
        });
        let main = Queue::new(
            "main",
            self.main_params,
            Arc::new(Dispatcher(Arc::clone(&registry))),
            self.clock,
        )?;
        Ok(Router { main, actions })
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
