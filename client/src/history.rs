//! The thin wrapper over the browser history stack.
//!
//! Keeps the "last known location" (including a per-entry key) in the
//! runtime, pushes/replaces entries on commit, and turns POP transitions
//! into `browserHistory` navigations — carrying the scroll state saved for
//! the target entry. Hash-only POPs scroll without fetching.
//!
//! Entry state written to the browser is `{"k": key, "u": userState}`, so
//! keys survive reloads and back/forward traversals.

use crate::{
    runtime::{self, HistoryState, NavLocation},
    scroll,
};
use url::Url;

#[cfg(target_arch = "wasm32")]
use crate::{
    helpers,
    nav::{self, BeginNavigationProps, NavigationProps, NavigationType},
    urls,
};
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::{JsCast, JsValue};

/// Property of the history-state envelope holding the entry key.
#[cfg(target_arch = "wasm32")]
const STATE_KEY_PROP: &str = "k";
/// Property of the history-state envelope holding the user state.
#[cfg(target_arch = "wasm32")]
const STATE_USER_PROP: &str = "u";

/// Wires the adapter to the browser: manual scroll restoration, the
/// `vorma_reload` strip, the popstate listener, and the `beforeunload`
/// scroll writer. Off the browser only the runtime defaults apply.
pub(crate) fn init() {
    #[cfg(target_arch = "wasm32")]
    {
        let window = helpers::window();
        if let Ok(history) = window.history() {
            _ = history.set_scroll_restoration(web_sys::ScrollRestoration::Manual);
        }

        let (origin, mut location) = read_window_location();
        let (key, user_state) = read_history_state();
        location.key = key.unwrap_or_else(runtime::new_history_key);
        location.state = user_state;

        // boot is the one moment we rewrite the URL silently: assign the
        // entry its key and drop any vorma_reload marker
        let stripped = Url::parse(&format!("{origin}{}", location.to_full_path()))
            .ok()
            .map(|mut url| {
                urls::remove_query_param(&mut url, urls::QUERY_RELOAD);
                url
            });
        if let Some(url) = stripped {
            location.pathname = url.path().to_string();
            location.search = url.query().map(|q| format!("?{q}")).unwrap_or_default();
            replace_browser_entry(&location, &origin);
        }

        runtime::with(|rt| {
            *rt.origin.borrow_mut() = origin;
            *rt.location.borrow_mut() = location;
        });

        let popstate = helpers::window_event_listener_untyped("popstate", move |_| {
            handle_popstate();
        });
        std::mem::forget(popstate);

        let unload = helpers::window_event_listener_untyped("beforeunload", move |_| {
            scroll::write_page_refresh_state();
        });
        std::mem::forget(unload);
    }
}

/// Commits a navigation's history update: push for a different URL (unless
/// the caller asked to replace), replace otherwise. Pushing first saves the
/// departing entry's scroll state; keys are preserved when the URL is
/// unchanged (the POP-driven re-commit case), minted fresh otherwise.
/// Emits `location` whenever the key or the visible URL changed.
pub(crate) fn commit_navigation(target: &Url, replace: bool, state: HistoryState) {
    let previous = runtime::get_location();
    let current_url = runtime::current_url();
    let same_url = target.as_str() == current_url.as_str();
    let do_replace = replace || same_url;

    if !do_replace {
        scroll::save_current_for(&previous.key);
    }

    let key = if same_url {
        previous.key.clone()
    } else {
        runtime::new_history_key()
    };
    let location = NavLocation {
        pathname: target.path().to_string(),
        search: target.query().map(|q| format!("?{q}")).unwrap_or_default(),
        hash: target
            .fragment()
            .filter(|f| !f.is_empty())
            .map(|f| format!("#{f}"))
            .unwrap_or_default(),
        key: key.clone(),
        state,
    };
    let origin = target.origin().ascii_serialization();

    #[cfg(target_arch = "wasm32")]
    {
        if do_replace {
            replace_browser_entry(&location, &origin);
        } else {
            push_browser_entry(&location, &origin);
        }
    }

    let changed = key != previous.key || location.to_full_path() != previous.to_full_path();
    runtime::with(|rt| {
        *rt.origin.borrow_mut() = origin;
        *rt.location.borrow_mut() = location;
    });
    if changed {
        runtime::with(|rt| rt.bus.borrow().emit_location());
    }
}

/// Commits a same-document hash change (a fragment-only link click): a push
/// with no fetch, followed by the hash scroll.
#[cfg(target_arch = "wasm32")]
pub(crate) fn commit_hash_change(target: &Url) {
    let previous = runtime::get_location();
    scroll::save_current_for(&previous.key);
    commit_navigation(target, false, HistoryState::default());
    scroll::apply_scroll_state(None);
}

#[cfg(target_arch = "wasm32")]
fn handle_popstate() {
    let (origin, mut location) = read_window_location();
    let (key, user_state) = read_history_state();
    location.key = key.unwrap_or_else(runtime::new_history_key);
    location.state = user_state;

    let previous = runtime::get_location();
    let key_changed = location.key != previous.key;
    let path_or_search_changed =
        location.pathname != previous.pathname || location.search != previous.search;
    let hash_changed = location.hash != previous.hash;

    if path_or_search_changed || hash_changed {
        scroll::save_current_for(&previous.key);
    }

    let saved = scroll::read_scroll_state(&location.key);
    let href = format!("{origin}{}", location.to_full_path());

    runtime::with(|rt| {
        *rt.origin.borrow_mut() = origin;
        *rt.location.borrow_mut() = location;
    });
    if key_changed {
        runtime::with(|rt| rt.bus.borrow().emit_location());
    }

    if path_or_search_changed {
        let begun = nav::begin(BeginNavigationProps {
            href,
            nav_type: NavigationType::BrowserHistory,
            props: NavigationProps {
                saved_scroll: saved,
                ..Default::default()
            },
        });
        any_spawner::Executor::spawn_local(async move {
            nav::drive(begun).await;
        });
    } else if hash_changed {
        scroll::apply_scroll_state(None);
    }
}

#[cfg(target_arch = "wasm32")]
fn read_window_location() -> (String, NavLocation) {
    let location = helpers::window().location();
    let origin = location.origin().unwrap_or_default();
    let pathname = location.pathname().unwrap_or_else(|_| "/".into());
    let search = location.search().unwrap_or_default();
    let hash = location.hash().unwrap_or_default();
    (
        origin,
        NavLocation {
            pathname,
            search,
            hash,
            key: String::new(),
            state: HistoryState::default(),
        },
    )
}

#[cfg(target_arch = "wasm32")]
fn read_history_state() -> (Option<String>, HistoryState) {
    let raw = helpers::window()
        .history()
        .ok()
        .and_then(|history| history.state().ok());
    let Some(raw) = raw else {
        return (None, HistoryState::default());
    };
    if raw.is_null() || raw.is_undefined() {
        return (None, HistoryState::default());
    }
    let key = js_sys::Reflect::get(&raw, &JsValue::from_str(STATE_KEY_PROP))
        .ok()
        .and_then(|value| value.as_string());
    let user = js_sys::Reflect::get(&raw, &JsValue::from_str(STATE_USER_PROP))
        .ok()
        .filter(|value| !value.is_undefined());
    (key, HistoryState::new(user))
}

#[cfg(target_arch = "wasm32")]
fn envelope(location: &NavLocation) -> JsValue {
    let envelope = js_sys::Object::new();
    _ = js_sys::Reflect::set(
        &envelope,
        &JsValue::from_str(STATE_KEY_PROP),
        &JsValue::from_str(&location.key),
    );
    let user = location.state.to_js_value();
    if !user.is_undefined() {
        _ = js_sys::Reflect::set(&envelope, &JsValue::from_str(STATE_USER_PROP), &user);
    }
    envelope.unchecked_into()
}

#[cfg(target_arch = "wasm32")]
fn push_browser_entry(location: &NavLocation, origin: &str) {
    if let Ok(history) = helpers::window().history() {
        let url = format!("{origin}{}", location.to_full_path());
        _ = history.push_state_with_url(&envelope(location), "", Some(&url));
    }
}

#[cfg(target_arch = "wasm32")]
fn replace_browser_entry(location: &NavLocation, origin: &str) {
    if let Ok(history) = helpers::window().history() {
        let url = format!("{origin}{}", location.to_full_path());
        _ = history.replace_state_with_url(&envelope(location), "", Some(&url));
    }
}
