//! # Vorma client navigation core
//!
//! The browser-side navigation engine of the Vorma server-driven web
//! framework: it turns user intent (link clicks, programmatic navigations,
//! back/forward, form submissions, revalidations, hover prefetches) into a
//! coordinated sequence of fetches, asset preloads, state updates, and host
//! re-renders — while keeping the busy indicator flicker-free and exactly
//! one committed page state visible at a time.
//!
//! The crate renders nothing itself. The host supplies three callbacks via
//! [`ClientOptions`]: a re-render function (fed a [`RenderView`]), a module
//! loader (fed resolved import URLs), and an optional `<head>` updater. In
//! return it gets [`navigate`], [`revalidate`], [`submit`], hover
//! [`get_prefetch_handlers`], and the four framework events (`status`,
//! `route-change`, `location`, `build-id`).
//!
//! ```no_run
//! use vorma_client::{init, navigate, ClientOptions, NavigateOptions};
//!
//! init(ClientOptions::builder().build_id("b1").build());
//!
//! # async fn go() {
//! let result = navigate("/users/4", NavigateOptions::default()).await;
//! assert!(result.did_navigate);
//! # }
//! ```

pub mod abort;
pub mod assets;
pub mod client;
pub mod errors;
pub mod events;
pub mod helpers;
mod history;
pub mod link;
pub mod logging;
pub mod matcher;
pub mod nav;
pub mod params;
pub mod redirects;
pub mod render;
pub mod runtime;
pub mod scroll;
pub mod urls;

pub use client::{NavigationRequest, RequestBody, ServerClient, ServerResponse};
pub use errors::{ClientError, NavigationError, RenderError, SubmitError};
pub use events::{BuildIdEvent, EventSubscription, RouteChangeEvent};
pub use link::{get_prefetch_handlers, PrefetchConfig, PrefetchHandlers};
pub use nav::{
    begin_navigation, clear_all, navigate, revalidate,
    status::{get_status, Status},
    submit::{submit, submit_json, SubmitInit, SubmitOptions},
    BeginNavigationProps, NavigateOptions, NavigationControl, NavigationIntent, NavigationOutcome,
    NavigationPhase, NavigationProps, NavigationResult, NavigationType,
};
pub use params::ParamsMap;
pub use redirects::{RedirectData, RedirectKind};
pub use render::{ErrorBoundary, RenderView};
pub use runtime::{
    get_build_id, get_location, register_client_loader, set_server_client, ClientLoaderArgs,
    ClientOptions, HistoryState, NavLocation, RoutePayload, ServerLoaderData, TitlePayload,
};
pub use scroll::{apply_scroll_state, read_scroll_state, save_scroll_state, ScrollState};

use serde_json::Value;

/// Boots the navigation core.
///
/// Seeds the runtime from the server-rendered document (build id, initial
/// payload), wires the history adapter, the delegated link-click listener,
/// the scroll store, and restores any fresh page-refresh scroll position.
/// Safe to call again with new options; the listeners are only installed
/// once.
pub fn init(options: ClientOptions) {
    #[cfg(target_arch = "wasm32")]
    {
        _ = any_spawner::Executor::init_wasm_bindgen();
    }

    let initial_payload = options.initial_payload.clone();
    let build_id = options.build_id.clone();
    runtime::with(|rt| {
        *rt.build_id.borrow_mut() = build_id;
        *rt.config.borrow_mut() = options;
    });

    if let Some(payload) = initial_payload {
        seed_initial_route(&payload);
    }

    let first_init = !runtime::with(|rt| rt.initialized.replace(true));
    if first_init {
        history::init();
        #[cfg(target_arch = "wasm32")]
        link::init();

        // the store applies every commit's scroll hint
        let subscription = runtime::with(|rt| {
            rt.bus
                .borrow()
                .on_route_change(|ev| scroll::apply_scroll_state(ev.scroll_state.as_ref()))
        });
        std::mem::forget(subscription);

        scroll::restore_page_refresh_state();
    }
}

fn seed_initial_route(payload: &RoutePayload) {
    runtime::merge_module_records(payload);
    runtime::with(|rt| {
        *rt.route.borrow_mut() = runtime::RouteState {
            matched_patterns: payload.matched_patterns.clone(),
            loaders_data: payload.loaders_data.clone(),
            client_loaders_data: vec![Value::Null; payload.matched_patterns.len()],
            params: payload.params.clone(),
            splat_values: payload.splat_values.clone(),
            has_root_data: payload.has_root_data,
            outermost_error_idx: payload.outermost_server_error_idx,
        };
    });
}

/// Subscribes to the `status` event. The listener stays registered until
/// the returned handle is removed.
pub fn on_status(cb: impl Fn(&Status) + 'static) -> EventSubscription {
    runtime::with(|rt| rt.bus.borrow().on_status(cb))
}

/// Subscribes to the `route-change` event, emitted once per committed
/// navigation.
pub fn on_route_change(cb: impl Fn(&RouteChangeEvent) + 'static) -> EventSubscription {
    runtime::with(|rt| rt.bus.borrow().on_route_change(cb))
}

/// Subscribes to the `location` event; subscribers re-read
/// [`get_location`] when it fires.
pub fn on_location(cb: impl Fn(&()) + 'static) -> EventSubscription {
    runtime::with(|rt| rt.bus.borrow().on_location(cb))
}

/// Subscribes to the `build-id` event.
pub fn on_build_id(cb: impl Fn(&BuildIdEvent) + 'static) -> EventSubscription {
    runtime::with(|rt| rt.bus.borrow().on_build_id(cb))
}
