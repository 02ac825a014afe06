// SPDX-License-Identifier: MIT

use super::*;
use rill_core::MsgRecord;

#[test]
fn text_template_renders_classic_shape() {
    let msg = MsgRecord::builder()
        .host("web1")
        .app("nginx")
        .procid("812")
        .text("worker exited")
        .build();
    assert_eq!(TextTemplate.render(&msg), "web1 nginx[812]: worker exited");
}

#[test]
fn fn_template_delegates_to_closure() {
    let tpl = FnTemplate::new(|msg| msg.text.to_uppercase());
    let msg = MsgRecord::builder().text("quiet").build();
    assert_eq!(tpl.render(&msg), "QUIET");
}
