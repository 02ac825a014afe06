// SPDX-License-Identifier: MIT

//! Output-module contract.
//!
//! Modules are assumed non-thread-safe: the owning action guards
//! every call with its mutex, so implementations never see
//! concurrent entry.

use rill_core::{Msg, RenderedParams};

/// Result of `begin_transaction` / `end_transaction` / `try_resume`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxResult {
    Ok,
    /// Target temporarily unreachable; the action suspends and
    /// retries later.
    Suspended,
    /// Unrecoverable module fault; the action dies until reload.
    Disable,
}

/// Result of a `do_action` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoActionResult {
    /// Record written and committed.
    Ok,
    /// Record accepted, commit deferred to `end_transaction`.
    DeferCommit,
    /// This record is pending, but all earlier records of the
    /// transaction just committed implicitly.
    PreviousCommitted,
    Suspended,
    Disable,
    /// The module consumed and intentionally dropped the record.
    Discard,
    /// Permanent failure of this call; no retry will help. The
    /// engine isolates the failing record by halving the batch.
    Failed,
}

/// How an action hands parameters to its module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParamPassing {
    /// One rendered string per template.
    #[default]
    Rendered,
    /// One word-list per template.
    Lists,
    /// The record reference itself; no rendering.
    Record,
}

/// A bound output: file writer, forwarder, database emitter, etc.
///
/// The transactional contract: `begin_transaction`, any number of
/// `do_action` calls, then `end_transaction`. A module without real
/// transactions simply keeps the defaults and commits per record.
pub trait OutputModule: Send {
    fn begin_transaction(&mut self) -> TxResult {
        TxResult::Ok
    }

    fn do_action(&mut self, msg: &Msg, params: &RenderedParams) -> DoActionResult;

    fn end_transaction(&mut self) -> TxResult {
        TxResult::Ok
    }

    /// Probe whether a suspended target recovered.
    fn try_resume(&mut self) -> TxResult {
        TxResult::Ok
    }

    /// Advisory reload signal (log rotation and the like).
    fn hup(&mut self) {}
}
