// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rill-engine: actions, rulesets and the router entry point.
//!
//! An [`Action`] binds an [`output::OutputModule`] to its own queue
//! and drives it through the transactional state machine; a
//! [`Ruleset`] fans matching records out to actions; the [`Router`]
//! is what inputs submit parsed records to.

pub mod action;
pub mod output;
pub mod router;
pub mod ruleset;
pub mod template;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use action::{Action, ActionParams, ActionState};
pub use output::{DoActionResult, OutputModule, ParamPassing, TxResult};
pub use router::{Router, RouterBuilder};
pub use ruleset::{Filter, FnFilter, MatchAll, Rule, Ruleset, SeverityAtLeast};
pub use template::{FnTemplate, Template, TextTemplate};
