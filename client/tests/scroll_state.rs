//! Scroll-state store invariants: bounds, eviction order, and the
//! persisted shapes.

mod common;

use vorma_client::{read_scroll_state, save_scroll_state, ScrollState};

#[test]
fn round_trips_positions_and_hashes() {
    common::setup();

    save_scroll_state("k1", ScrollState::Position { x: 123.0, y: 456.0 });
    save_scroll_state("k2", ScrollState::Hash { hash: "bio".into() });

    assert_eq!(
        read_scroll_state("k1"),
        Some(ScrollState::Position { x: 123.0, y: 456.0 })
    );
    assert_eq!(
        read_scroll_state("k2"),
        Some(ScrollState::Hash { hash: "bio".into() })
    );
    assert_eq!(read_scroll_state("missing"), None);
}

#[test]
fn resaving_a_key_moves_it_to_the_back() {
    common::setup();

    save_scroll_state("a", ScrollState::Position { x: 0.0, y: 1.0 });
    save_scroll_state("b", ScrollState::Position { x: 0.0, y: 2.0 });
    save_scroll_state("a", ScrollState::Position { x: 0.0, y: 3.0 });

    // fill to the bound; "b" (now oldest) goes first
    for i in 0..48 {
        save_scroll_state(&format!("fill{i}"), ScrollState::Position { x: 0.0, y: 0.0 });
    }
    save_scroll_state("overflow", ScrollState::Position { x: 0.0, y: 0.0 });

    assert_eq!(read_scroll_state("b"), None);
    assert_eq!(
        read_scroll_state("a"),
        Some(ScrollState::Position { x: 0.0, y: 3.0 })
    );
}

#[test]
fn the_map_never_exceeds_fifty_entries() {
    common::setup();

    for i in 0..60 {
        save_scroll_state(&format!("k{i}"), ScrollState::Position { x: 0.0, y: i as f64 });
    }

    // the ten oldest were evicted in order
    for i in 0..10 {
        assert_eq!(read_scroll_state(&format!("k{i}")), None, "k{i} should be gone");
    }
    for i in 10..60 {
        assert!(read_scroll_state(&format!("k{i}")).is_some(), "k{i} should remain");
    }
}

#[test]
fn scroll_states_serialize_in_the_wire_shape() {
    let position = serde_json::to_value(ScrollState::Position { x: 1.5, y: 2.0 }).unwrap();
    assert_eq!(position, serde_json::json!({"x": 1.5, "y": 2.0}));

    let hash = serde_json::to_value(ScrollState::Hash { hash: "top".into() }).unwrap();
    assert_eq!(hash, serde_json::json!({"hash": "top"}));

    let parsed: ScrollState = serde_json::from_value(serde_json::json!({"hash": "h"})).unwrap();
    assert_eq!(parsed, ScrollState::Hash { hash: "h".into() });
    let parsed: ScrollState = serde_json::from_value(serde_json::json!({"x": 3.0, "y": 4.0})).unwrap();
    assert_eq!(parsed, ScrollState::Position { x: 3.0, y: 4.0 });
}
