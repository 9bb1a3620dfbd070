//! Per-history-entry scroll persistence, plus the short-lived record that
//! survives a full page refresh.
//!
//! Two structures live in session storage: an ordered map from history-entry
//! key to [`ScrollState`] (bounded, FIFO eviction), and a single
//! `{x, y, unix, href}` record written on `beforeunload` and consumed within
//! a few seconds by the next boot of the same URL.

use crate::helpers;
use serde::{Deserialize, Serialize};

/// Session-storage key of the per-entry scroll map.
pub const STORAGE_KEY_MAP: &str = "__core__scrollStateMap";
/// Session-storage key of the page-refresh record.
pub const STORAGE_KEY_PAGE_REFRESH: &str = "__core__pageRefreshScrollState";

/// The map never holds more than this many entries; the oldest go first.
const MAX_ENTRIES: usize = 50;

/// How long a page-refresh record stays restorable.
const PAGE_REFRESH_MAX_AGE_MS: f64 = 5_000.0;

/// Where a page should be scrolled: exact coordinates, or an element id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScrollState {
    Position { x: f64, y: f64 },
    Hash { hash: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PageRefreshScrollState {
    x: f64,
    y: f64,
    unix: f64,
    href: String,
}

/// Persists the scroll state for a history-entry key, evicting the oldest
/// entry past the bound.
pub fn save_scroll_state(key: &str, state: ScrollState) {
    let mut entries = read_map();
    entries.retain(|(k, _)| k != key);
    entries.push((key.to_string(), state));
    while entries.len() > MAX_ENTRIES {
        entries.remove(0);
    }
    write_map(&entries);
}

/// Reads the scroll state saved for a history-entry key.
pub fn read_scroll_state(key: &str) -> Option<ScrollState> {
    read_map()
        .into_iter()
        .find_map(|(k, state)| (k == key).then_some(state))
}

/// Saves the window's current scroll position under the given entry key.
/// No-op outside the browser.
pub(crate) fn save_current_for(key: &str) {
    if let Some((x, y)) = current_position() {
        save_scroll_state(key, ScrollState::Position { x, y });
    }
}

fn read_map() -> Vec<(String, ScrollState)> {
    session_get(STORAGE_KEY_MAP)
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default()
}

fn write_map(entries: &[(String, ScrollState)]) {
    if let Ok(serialized) = serde_json::to_string(entries) {
        session_set(STORAGE_KEY_MAP, &serialized);
    }
}

/// Writes the page-refresh record for the current URL. Wired to
/// `beforeunload` by [`crate::history`].
#[cfg(target_arch = "wasm32")]
pub(crate) fn write_page_refresh_state() {
    let Some((x, y)) = current_position() else {
        return;
    };
    let href = helpers::window().location().href().unwrap_or_default();
    let record = PageRefreshScrollState {
        x,
        y,
        unix: helpers::unix_ms(),
        href,
    };
    if let Ok(serialized) = serde_json::to_string(&record) {
        session_set(STORAGE_KEY_PAGE_REFRESH, &serialized);
    }
}

/// If a fresh page-refresh record exists for the current URL, restores its
/// coordinates on the next animation frame and deletes it. Stale or
/// mismatched records are left to age out.
pub(crate) fn restore_page_refresh_state() {
    let Some(record) = session_get(STORAGE_KEY_PAGE_REFRESH)
        .and_then(|raw| serde_json::from_str::<PageRefreshScrollState>(&raw).ok())
    else {
        return;
    };
    if record.href != current_href() {
        return;
    }
    if helpers::unix_ms() - record.unix > PAGE_REFRESH_MAX_AGE_MS {
        return;
    }
    session_remove(STORAGE_KEY_PAGE_REFRESH);
    helpers::request_animation_frame(move || {
        apply_scroll_state(Some(&ScrollState::Position {
            x: record.x,
            y: record.y,
        }));
    });
}

/// Applies a scroll state to the window: coordinates scroll there, a hash
/// scrolls its element into view, and no state falls back to the element
/// referenced by `window.location.hash` (when present).
pub fn apply_scroll_state(state: Option<&ScrollState>) {
    #[cfg(target_arch = "wasm32")]
    {
        match state {
            Some(ScrollState::Position { x, y }) => {
                helpers::window().scroll_to_with_x_and_y(*x, *y);
            }
            Some(ScrollState::Hash { hash }) => scroll_to_element_id(hash),
            None => {
                let hash = helpers::window()
                    .location()
                    .hash()
                    .unwrap_or_default();
                if let Some(id) = hash.strip_prefix('#') {
                    let id = js_sys::decode_uri_component(id)
                        .ok()
                        .and_then(|decoded| decoded.as_string())
                        .unwrap_or_else(|| id.to_string());
                    scroll_to_element_id(&id);
                }
            }
        }

        fn scroll_to_element_id(id: &str) {
            if let Some(el) = helpers::document().get_element_by_id(id) {
                el.scroll_into_view();
            }
        }
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        _ = state;
    }
}

/// The window's scroll position, when there is a window.
pub(crate) fn current_position() -> Option<(f64, f64)> {
    #[cfg(target_arch = "wasm32")]
    {
        let window = helpers::window();
        Some((
            window.scroll_x().unwrap_or_default(),
            window.scroll_y().unwrap_or_default(),
        ))
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        None
    }
}

fn current_href() -> String {
    #[cfg(target_arch = "wasm32")]
    {
        helpers::window().location().href().unwrap_or_default()
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        crate::runtime::current_url().to_string()
    }
}

// --- storage seam -----------------------------------------------------------

#[cfg(not(target_arch = "wasm32"))]
thread_local! {
    static MEMORY_STORAGE: std::cell::RefCell<std::collections::HashMap<String, String>> =
        std::cell::RefCell::new(std::collections::HashMap::new());
}

fn session_get(key: &str) -> Option<String> {
    #[cfg(target_arch = "wasm32")]
    {
        helpers::window()
            .session_storage()
            .ok()
            .flatten()
            .and_then(|storage| storage.get_item(key).ok().flatten())
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        MEMORY_STORAGE.with(|map| map.borrow().get(key).cloned())
    }
}

fn session_set(key: &str, value: &str) {
    #[cfg(target_arch = "wasm32")]
    {
        if let Ok(Some(storage)) = helpers::window().session_storage() {
            _ = storage.set_item(key, value);
        }
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        MEMORY_STORAGE.with(|map| map.borrow_mut().insert(key.to_string(), value.to_string()));
    }
}

fn session_remove(key: &str) {
    #[cfg(target_arch = "wasm32")]
    {
        if let Ok(Some(storage)) = helpers::window().session_storage() {
            _ = storage.remove_item(key);
        }
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        MEMORY_STORAGE.with(|map| map.borrow_mut().remove(key));
    }
}

/// Drops both persisted structures. Used when the runtime is reset.
pub(crate) fn reset_storage() {
    session_remove(STORAGE_KEY_MAP);
    session_remove(STORAGE_KEY_PAGE_REFRESH);
}
