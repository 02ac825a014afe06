// SPDX-License-Identifier: MIT

//! Parsed log record, shared by reference between queues and actions.
//!
//! A record is immutable once parsed. Sharing goes through [`Msg`]
//! (an `Arc`); anything that needs to change record content makes a
//! duplicate first (see [`MsgRecord::dup_with_text`]).

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shared handle to an immutable record.
pub type Msg = Arc<MsgRecord>;

/// Syslog severity. Numerically ordered: 0 = emergency … 7 = debug,
/// so "severity at or above a threshold" means `as_num() >=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Info,
    Debug,
}

impl Severity {
    pub fn as_num(self) -> u8 {
        self as u8
    }

    pub fn from_num(n: u8) -> Option<Self> {
        match n {
            0 => Some(Self::Emergency),
            1 => Some(Self::Alert),
            2 => Some(Self::Critical),
            3 => Some(Self::Error),
            4 => Some(Self::Warning),
            5 => Some(Self::Notice),
            6 => Some(Self::Info),
            7 => Some(Self::Debug),
            _ => None,
        }
    }
}

crate::simple_display! {
    Severity {
        Emergency => "emerg",
        Alert => "alert",
        Critical => "crit",
        Error => "err",
        Warning => "warning",
        Notice => "notice",
        Info => "info",
        Debug => "debug",
    }
}

/// Syslog facility code (0–23).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Facility(pub u8);

/// Parsed PRI value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Priority {
    pub facility: Facility,
    pub severity: Severity,
}

impl Priority {
    /// Split a raw `<PRI>` byte into facility and severity.
    pub fn from_pri(pri: u8) -> Self {
        Self {
            facility: Facility(pri >> 3),
            severity: Severity::from_num(pri & 0x07).unwrap_or(Severity::Notice),
        }
    }

    pub fn to_pri(self) -> u8 {
        (self.facility.0 << 3) | self.severity.as_num()
    }
}

impl Default for Priority {
    fn default() -> Self {
        // user.notice, the classic default
        Self { facility: Facility(1), severity: Severity::Notice }
    }
}

/// A record's tolerance for enqueue backpressure.
///
/// Sources that cannot block (UDP-style) submit `NoDelay`; sources
/// that may be paused briefly use `LightDelay`; sources that are
/// safe to stall indefinitely (file readers) use `FullDelay`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlowClass {
    #[default]
    NoDelay,
    LightDelay,
    FullDelay,
}

crate::simple_display! {
    FlowClass {
        NoDelay => "no-delay",
        LightDelay => "light-delay",
        FullDelay => "full-delay",
    }
}

/// A parsed log record.
///
/// Field bytes are never mutated after parse; the whole struct is
/// `Serialize`/`Deserialize` so disk queues can persist records
/// verbatim across restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgRecord {
    /// Raw wire bytes as received, before parsing.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub raw: Vec<u8>,
    pub pri: Priority,
    /// Epoch seconds at reception.
    pub received_at: u64,
    /// Epoch seconds claimed by the originator.
    pub originated_at: u64,
    pub host: SmolStr,
    pub app: SmolStr,
    pub procid: SmolStr,
    pub msgid: SmolStr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_data: Option<String>,
    /// Optional key/value bag attached by inputs or modifiers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vars: Option<BTreeMap<SmolStr, String>>,
    /// The free-form MSG part.
    pub text: String,
    #[serde(default)]
    pub flow: FlowClass,
    /// Periodic heartbeat record from the mark ticker.
    #[serde(default)]
    pub mark: bool,
    /// Ruleset bound by the input; `None` selects the default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ruleset: Option<SmolStr>,
}

impl MsgRecord {
    pub fn severity(&self) -> Severity {
        self.pri.severity
    }

    /// Duplicate this record with new text and fresh timestamps.
    ///
    /// Used for the "message repeated N times" marker: the original
    /// must not be touched because other actions still reference it.
    pub fn dup_with_text(&self, text: impl Into<String>, now_epoch_s: u64) -> MsgRecord {
        MsgRecord {
            raw: Vec::new(),
            text: text.into(),
            received_at: now_epoch_s,
            originated_at: now_epoch_s,
            ..self.clone()
        }
    }

    /// True when `other` repeats this record: same origin
    /// (host, app, procid) and identical message text.
    pub fn repeats(&self, other: &MsgRecord) -> bool {
        self.text == other.text
            && self.host == other.host
            && self.app == other.app
            && self.procid == other.procid
    }
}

crate::builder! {
    pub struct MsgBuilder => MsgRecord {
        into {
            host: SmolStr = "host1",
            app: SmolStr = "app",
            procid: SmolStr = "4242",
            msgid: SmolStr = "-",
            text: String = "test message",
        }
        set {
            raw: Vec<u8> = Vec::new(),
            pri: Priority = Priority::default(),
            received_at: u64 = 1_000_000,
            originated_at: u64 = 1_000_000,
            flow: FlowClass = FlowClass::NoDelay,
            mark: bool = false,
        }
        option {
            structured_data: String = None,
            vars: BTreeMap<SmolStr, String> = None,
            ruleset: SmolStr = None,
        }
    }
}

#[cfg(test)]
#[path = "msg_tests.rs"]
mod tests;
