//! The commit step: turn a successful navigation outcome into the visible
//! page.
//!
//! Order matters and is fixed: commit global route state, load modules,
//! resolve the error boundary, run the host's re-render (inside a view
//! transition when enabled and the navigation is user-visible), update
//! history, set the title, apply CSS, emit `route-change` with a scroll
//! hint, and hand the `<head>` sections to the host. Global route state is
//! mutated *only* here — never while a fetch is in flight.

use crate::{
    assets,
    errors::RenderError,
    events::RouteChangeEvent,
    history,
    nav::{EntryRef, NavigationSuccess, NavigationType},
    params::ParamsMap,
    runtime::{self, RouteState},
    scroll::ScrollState,
};
use serde_json::Value;
use std::rc::Rc;

/// What the host's re-render callback receives: the complete description of
/// the route to mount.
#[derive(Clone)]
pub struct RenderView {
    pub matched_patterns: Vec<String>,
    pub loaders_data: Vec<Value>,
    pub client_loaders_data: Vec<Value>,
    pub params: ParamsMap,
    pub splat_values: Vec<String>,
    /// Resolved (prefixed) import URLs, aligned with `matched_patterns`.
    pub import_urls: Vec<String>,
    pub export_keys: Vec<String>,
    pub error_boundary: ErrorBoundary,
    pub has_root_data: bool,
}

/// Which error boundary wraps the failed segment, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorBoundary {
    /// No server error to display.
    None,
    /// The route at `idx` supplies its own boundary export.
    Route {
        idx: usize,
        import_url: String,
        export_key: String,
    },
    /// Out-of-range index or no boundary export: the host falls back to its
    /// built-in boundary.
    Default { idx: usize },
}

pub(crate) async fn render_navigation(
    entry: &EntryRef,
    success: &Rc<NavigationSuccess>,
    loader_data: &Rc<Vec<(String, Value)>>,
) -> Result<(), RenderError> {
    let payload = &success.payload;

    // align client-loader results with the payload's pattern order
    let client_loaders_data: Vec<Value> = payload
        .matched_patterns
        .iter()
        .map(|pattern| {
            loader_data
                .iter()
                .find_map(|(candidate, data)| (candidate == pattern).then(|| data.clone()))
                .unwrap_or(Value::Null)
        })
        .collect();

    runtime::with(|rt| {
        *rt.route.borrow_mut() = RouteState {
            matched_patterns: payload.matched_patterns.clone(),
            loaders_data: payload.loaders_data.clone(),
            client_loaders_data: client_loaders_data.clone(),
            params: payload.params.clone(),
            splat_values: payload.splat_values.clone(),
            has_root_data: payload.has_root_data,
            outermost_error_idx: payload.outermost_server_error_idx,
        };
    });

    let import_urls: Vec<String> = payload
        .import_urls
        .iter()
        .map(|import_url| assets::resolve_asset_url(import_url))
        .collect();

    let (render_cb, load_modules, update_head) = runtime::with(|rt| {
        let config = rt.config.borrow();
        (
            config.render.clone(),
            config.load_modules.clone(),
            config.update_head.clone(),
        )
    });

    if let Some(load_modules) = load_modules {
        load_modules(import_urls.clone())
            .await
            .map_err(RenderError::ModuleLoad)?;
    }

    let view = RenderView {
        matched_patterns: payload.matched_patterns.clone(),
        loaders_data: payload.loaders_data.clone(),
        client_loaders_data,
        params: payload.params.clone(),
        splat_values: payload.splat_values.clone(),
        import_urls,
        export_keys: payload.export_keys.clone(),
        error_boundary: resolve_error_boundary(payload),
        has_root_data: payload.has_root_data,
    };

    if let Some(render_cb) = render_cb {
        let commit = render_cb(view);
        if use_view_transition(entry.nav_type()) {
            commit_with_view_transition(commit).await?;
        } else {
            commit.await.map_err(RenderError::Render)?;
        }
    }

    let props = entry.props();
    history::commit_navigation(entry.target_url(), props.replace, props.state.clone());

    if let Some(title) = &payload.title {
        set_document_title(&title.dangerous_inner_html);
    }

    if let Some(bundles) = &payload.css_bundles {
        assets::apply_css(bundles);
    }

    let event = RouteChangeEvent {
        scroll_state: scroll_hint(entry),
    };
    runtime::with(|rt| rt.bus.borrow().emit_route_change(&event));

    if let Some(update_head) = update_head {
        update_head(
            payload.meta_head_els.as_ref().unwrap_or(&Value::Null),
            payload.rest_head_els.as_ref().unwrap_or(&Value::Null),
        );
    }

    Ok(())
}

/// Resolves the error-boundary component by index and export key, falling
/// back to the host default when the index is out of range or the route
/// carries no boundary export.
fn resolve_error_boundary(payload: &crate::runtime::RoutePayload) -> ErrorBoundary {
    let Some(idx) = payload.outermost_server_error_idx else {
        return ErrorBoundary::None;
    };
    let Some(pattern) = payload.matched_patterns.get(idx) else {
        return ErrorBoundary::Default { idx };
    };
    let record = runtime::with(|rt| rt.modules.borrow().get(pattern).cloned());
    match record {
        Some(record) => match record.error_export_key {
            Some(export_key) => ErrorBoundary::Route {
                idx,
                import_url: assets::resolve_asset_url(&record.import_url),
                export_key,
            },
            None => ErrorBoundary::Default { idx },
        },
        None => ErrorBoundary::Default { idx },
    }
}

/// Where the page should scroll after this commit.
fn scroll_hint(entry: &EntryRef) -> Option<ScrollState> {
    let fragment = entry
        .target_url()
        .fragment()
        .filter(|f| !f.is_empty())
        .map(str::to_string);
    let props = entry.props();
    match entry.nav_type() {
        NavigationType::UserNavigation | NavigationType::Redirect | NavigationType::Action => {
            match fragment {
                Some(hash) => Some(ScrollState::Hash { hash }),
                None if props.scroll_to_top == Some(false) => None,
                None => Some(ScrollState::Position { x: 0.0, y: 0.0 }),
            }
        }
        NavigationType::BrowserHistory => props
            .saved_scroll
            .clone()
            .or(fragment.map(|hash| ScrollState::Hash { hash })),
        NavigationType::Revalidation | NavigationType::Prefetch => None,
    }
}

fn use_view_transition(nav_type: NavigationType) -> bool {
    let enabled = runtime::with(|rt| rt.config.borrow().use_view_transitions);
    enabled
        && !matches!(
            nav_type,
            NavigationType::Prefetch | NavigationType::Revalidation
        )
}

/// Runs the commit inside `document.startViewTransition` when the browser
/// has it, awaiting the transition's `finished` promise. Strictly additive:
/// unsupported browsers (and non-browser targets) fall through to a plain
/// commit.
async fn commit_with_view_transition(
    commit: futures::future::LocalBoxFuture<'static, Result<(), String>>,
) -> Result<(), RenderError> {
    #[cfg(target_arch = "wasm32")]
    {
        use js_sys::{Function, Promise, Reflect};
        use std::cell::RefCell;
        use wasm_bindgen::{closure::Closure, JsCast, JsValue};
        use wasm_bindgen_futures::{future_to_promise, JsFuture};

        let document: JsValue = crate::helpers::document().into();
        let start = Reflect::get(&document, &JsValue::from_str("startViewTransition"))
            .ok()
            .and_then(|value| value.dyn_into::<Function>().ok());
        let Some(start) = start else {
            return commit.await.map_err(RenderError::Render);
        };

        let result = Rc::new(RefCell::new(Ok(())));
        let pending = Rc::new(RefCell::new(Some(commit)));

        let update = {
            let result = Rc::clone(&result);
            let pending = Rc::clone(&pending);
            Closure::once_into_js(move || -> JsValue {
                let Some(commit) = pending.borrow_mut().take() else {
                    return JsValue::UNDEFINED;
                };
                let promise = future_to_promise(async move {
                    *result.borrow_mut() = commit.await;
                    Ok(JsValue::UNDEFINED)
                });
                promise.into()
            })
        };

        match start.call1(&document, &update) {
            Ok(transition) => {
                if let Ok(finished) = Reflect::get(&transition, &JsValue::from_str("finished")) {
                    if let Ok(promise) = finished.dyn_into::<Promise>() {
                        _ = JsFuture::from(promise).await;
                    }
                }
                // the browser never ran our callback (pathological, but
                // recoverable): commit without the transition
                if let Some(commit) = pending.borrow_mut().take() {
                    return commit.await.map_err(RenderError::Render);
                }
                let outcome = result.borrow().clone();
                outcome.map_err(RenderError::Render)
            }
            Err(_) => match pending.borrow_mut().take() {
                Some(commit) => commit.await.map_err(RenderError::Render),
                None => Ok(()),
            },
        }
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        commit.await.map_err(RenderError::Render)
    }
}

/// Expands HTML entities in a payload title and assigns `document.title`.
fn set_document_title(encoded: &str) {
    let decoded = decode_title(encoded);
    #[cfg(target_arch = "wasm32")]
    crate::helpers::document().set_title(&decoded);
    #[cfg(not(target_arch = "wasm32"))]
    drop(decoded);
}

/// Decodes HTML entities via a temporary `<textarea>` in the browser; a
/// minimal named-entity table covers other targets.
pub fn decode_title(encoded: &str) -> String {
    #[cfg(target_arch = "wasm32")]
    {
        use wasm_bindgen::JsCast;

        if let Ok(el) = crate::helpers::document().create_element("textarea") {
            if let Ok(textarea) = el.dyn_into::<web_sys::HtmlTextAreaElement>() {
                textarea.set_inner_html(encoded);
                return textarea.value();
            }
        }
        encoded.to_string()
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        encoded
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&amp;", "&")
    }
}
