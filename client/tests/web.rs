//! In-browser smoke tests. These only compile for wasm and run under
//! `wasm-pack test --headless`.

#![cfg(target_arch = "wasm32")]

use vorma_client::{read_scroll_state, save_scroll_state, ScrollState};
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

#[wasm_bindgen_test]
fn decodes_html_entities_via_the_dom() {
    assert_eq!(
        vorma_client::render::decode_title("Fish &amp; Chips &lt;3"),
        "Fish & Chips <3"
    );
}

#[wasm_bindgen_test]
fn scroll_state_round_trips_through_session_storage() {
    save_scroll_state("web-k", ScrollState::Position { x: 10.0, y: 20.0 });
    assert_eq!(
        read_scroll_state("web-k"),
        Some(ScrollState::Position { x: 10.0, y: 20.0 })
    );
}
