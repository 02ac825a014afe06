// SPDX-License-Identifier: MIT

//! Template seam. The real template language lives outside the
//! core; actions only need "record in, string out".

use rill_core::MsgRecord;

pub trait Template: Send + Sync {
    fn render(&self, msg: &MsgRecord) -> String;
}

/// The classic file-output shape: `host app[procid]: text`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextTemplate;

impl Template for TextTemplate {
    fn render(&self, msg: &MsgRecord) -> String {
        format!("{} {}[{}]: {}", msg.host, msg.app, msg.procid, msg.text)
    }
}

/// Adapter for closure-defined templates, mostly used in tests and
/// simple embedders.
pub struct FnTemplate(Box<dyn Fn(&MsgRecord) -> String + Send + Sync>);

impl FnTemplate {
    pub fn new(f: impl Fn(&MsgRecord) -> String + Send + Sync + 'static) -> Self {
        Self(Box::new(f))
    }
}

impl Template for FnTemplate {
    fn render(&self, msg: &MsgRecord) -> String {
        (self.0)(msg)
    }
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
