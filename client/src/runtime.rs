//! The process-wide state container.
//!
//! Everything mutable and singular lives here behind one `thread_local!`:
//! the build id, the pattern→module map, the current matched route, the
//! navigation slots, the event bus, and the host configuration. Access goes
//! through [`with`]; UI layers never reach in directly, and tests replace
//! the whole container per case via [`reset`].
//!
//! The mutation discipline is: route state is written only during the commit
//! step of a navigation (see [`crate::render`]), never while a fetch is in
//! flight. The runtime is single-threaded, so that discipline is all the
//! locking we need.

use crate::{
    abort::AbortHandle,
    client::{default_client, ServerClient},
    events::EventBus,
    helpers,
    params::ParamsMap,
    render::RenderView,
};
use futures::future::{LocalBoxFuture, Shared};
use send_wrapper::SendWrapper;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    rc::Rc,
};
use typed_builder::TypedBuilder;
use url::Url;
use wasm_bindgen::JsValue;

/// The JSON document a route handler produces for a navigation fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RoutePayload {
    pub matched_patterns: Vec<String>,
    pub loaders_data: Vec<Value>,
    #[serde(rename = "importURLs")]
    pub import_urls: Vec<String>,
    pub export_keys: Vec<String>,
    pub error_export_keys: Vec<String>,
    pub outermost_server_error_idx: Option<usize>,
    pub has_root_data: bool,
    pub params: ParamsMap,
    pub splat_values: Vec<String>,
    pub deps: Option<Vec<String>>,
    pub css_bundles: Option<Vec<String>>,
    pub title: Option<TitlePayload>,
    pub meta_head_els: Option<Value>,
    pub rest_head_els: Option<Value>,
}

/// An HTML-encoded page title.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitlePayload {
    #[serde(rename = "dangerousInnerHTML")]
    pub dangerous_inner_html: String,
}

/// Opaque history state supplied by the host, mirroring
/// [`history.state`](https://developer.mozilla.org/en-US/docs/Web/API/History/state).
#[derive(Debug, Clone, Default)]
pub struct HistoryState(Option<SendWrapper<JsValue>>);

impl HistoryState {
    pub fn new(state: Option<JsValue>) -> Self {
        Self(state.map(SendWrapper::new))
    }

    pub fn to_js_value(&self) -> JsValue {
        match &self.0 {
            Some(v) => (**v).clone(),
            None => JsValue::UNDEFINED,
        }
    }

    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }
}

impl PartialEq for HistoryState {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_ref().map(|n| n.as_ref()) == other.0.as_ref().map(|n| n.as_ref())
    }
}

/// A snapshot of the current location, equivalent to the local parts of the
/// browser's [`Location`](https://developer.mozilla.org/en-US/docs/Web/API/Location)
/// plus the history entry's key and state.
#[derive(Debug, Clone, PartialEq)]
pub struct NavLocation {
    /// The path, not containing the query string or hash fragment.
    pub pathname: String,
    /// The raw query string, `?`-prefixed when nonempty.
    pub search: String,
    /// The hash fragment, `#`-prefixed when nonempty.
    pub hash: String,
    /// A stable identifier for this history entry.
    pub key: String,
    /// The opaque state stored with the entry.
    pub state: HistoryState,
}

impl Default for NavLocation {
    fn default() -> Self {
        Self {
            pathname: "/".into(),
            search: String::new(),
            hash: String::new(),
            key: "default".into(),
            state: HistoryState::default(),
        }
    }
}

impl NavLocation {
    /// The path + query + fragment, as one string.
    pub fn to_full_path(&self) -> String {
        format!("{}{}{}", self.pathname, self.search, self.hash)
    }
}

/// One entry of the pattern→module map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleRecord {
    pub import_url: String,
    pub export_key: String,
    pub error_export_key: Option<String>,
}

/// The committed route: what the visible page is currently rendered from.
#[derive(Debug, Clone, Default)]
pub(crate) struct RouteState {
    pub matched_patterns: Vec<String>,
    pub loaders_data: Vec<Value>,
    pub client_loaders_data: Vec<Value>,
    pub params: ParamsMap,
    pub splat_values: Vec<String>,
    pub has_root_data: bool,
    pub outermost_error_idx: Option<usize>,
}

/// What a client loader receives when its pattern matches a navigation.
pub struct ClientLoaderArgs {
    pub params: ParamsMap,
    pub splat_values: Vec<String>,
    /// Resolves once the server responds; never rejects (sentinel empties on
    /// failure).
    pub server_data: ServerDataFuture,
    /// The owning navigation's cancel token.
    pub abort: AbortHandle,
}

/// The slice of the server response handed to one client loader.
#[derive(Debug, Clone, Default)]
pub struct ServerLoaderData {
    pub matched_patterns: Vec<String>,
    /// This pattern's server loader data, if any.
    pub loader_data: Option<Value>,
    pub root_data: Option<Value>,
    pub build_id: String,
}

/// The future client loaders receive as `server_data`.
pub type ServerDataFuture = Shared<LocalBoxFuture<'static, ServerLoaderData>>;

/// A user-supplied client loader, registered per route pattern.
pub type ClientLoaderFn = Rc<dyn Fn(ClientLoaderArgs) -> LocalBoxFuture<'static, Option<Value>>>;

/// The host's re-render entry point.
pub type RenderCallback = Rc<dyn Fn(RenderView) -> LocalBoxFuture<'static, Result<(), String>>>;

/// The host's module loader: resolves import URLs to live component objects
/// on the host's side.
pub type ModuleLoaderCallback = Rc<dyn Fn(Vec<String>) -> LocalBoxFuture<'static, Result<(), String>>>;

/// The host's `<head>` element differ, fed the `metaHeadEls` / `restHeadEls`
/// sections of the payload.
pub type HeadUpdateCallback = Rc<dyn Fn(&Value, &Value)>;

/// Host configuration handed to [`crate::init`].
#[derive(Clone, TypedBuilder)]
pub struct ClientOptions {
    /// The build id embedded in the server-rendered document.
    #[builder(default, setter(into))]
    pub build_id: String,
    /// The deployment id, when the host runs behind a rolling deploy.
    #[builder(default, setter(strip_option, into))]
    pub deployment_id: Option<String>,
    /// Development mode: asset URLs resolve against the dev server, and every
    /// import URL is preloaded rather than the payload's dependency list.
    #[builder(default)]
    pub is_dev: bool,
    /// Prefix prepended to asset URLs in production builds.
    #[builder(default, setter(into))]
    pub public_path_prefix: String,
    /// Origin asset URLs resolve against in development.
    #[builder(default, setter(strip_option, into))]
    pub dev_server_origin: Option<String>,
    /// Wrap user-visible commits in a view transition when the browser
    /// supports it.
    #[builder(default)]
    pub use_view_transitions: bool,
    /// The payload the server rendered the initial document from.
    #[builder(default, setter(strip_option))]
    pub initial_payload: Option<RoutePayload>,
    #[builder(default, setter(strip_option))]
    pub render: Option<RenderCallback>,
    #[builder(default, setter(strip_option))]
    pub load_modules: Option<ModuleLoaderCallback>,
    #[builder(default, setter(strip_option))]
    pub update_head: Option<HeadUpdateCallback>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions::builder().build()
    }
}

impl std::fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientOptions")
            .field("build_id", &self.build_id)
            .field("deployment_id", &self.deployment_id)
            .field("is_dev", &self.is_dev)
            .field("public_path_prefix", &self.public_path_prefix)
            .field("dev_server_origin", &self.dev_server_origin)
            .field("use_view_transitions", &self.use_view_transitions)
            .finish_non_exhaustive()
    }
}

pub(crate) struct Runtime {
    pub config: RefCell<ClientOptions>,
    pub client: RefCell<Rc<dyn ServerClient>>,
    pub build_id: RefCell<String>,
    pub route: RefCell<RouteState>,
    pub modules: RefCell<HashMap<String, ModuleRecord>>,
    pub client_loaders: RefCell<HashMap<String, ClientLoaderFn>>,
    pub origin: RefCell<String>,
    pub location: RefCell<NavLocation>,
    pub nav: RefCell<crate::nav::NavState>,
    pub status: RefCell<crate::nav::status::StatusDispatchState>,
    pub bus: RefCell<EventBus>,
    pub assets: RefCell<crate::assets::AssetRegistry>,
    pub initialized: Cell<bool>,
    next_key: Cell<u64>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            config: RefCell::new(ClientOptions::default()),
            client: RefCell::new(default_client()),
            build_id: RefCell::new(String::new()),
            route: RefCell::new(RouteState::default()),
            modules: RefCell::new(HashMap::new()),
            client_loaders: RefCell::new(HashMap::new()),
            origin: RefCell::new("http://localhost".into()),
            location: RefCell::new(NavLocation::default()),
            nav: RefCell::new(Default::default()),
            status: RefCell::new(Default::default()),
            bus: RefCell::new(EventBus::default()),
            assets: RefCell::new(Default::default()),
            initialized: Cell::new(false),
            next_key: Cell::new(1),
        }
    }
}

thread_local! {
    static RUNTIME: Runtime = Runtime::default();
}

/// Runs `f` with the runtime container.
pub(crate) fn with<R>(f: impl FnOnce(&Runtime) -> R) -> R {
    RUNTIME.with(f)
}

/// Replaces the transport. The default is the browser `fetch` client on
/// wasm; tests and custom hosts install their own.
pub fn set_server_client(client: Rc<dyn ServerClient>) {
    with(|rt| *rt.client.borrow_mut() = client);
}

/// Swaps the runtime back to its initial state, dropping every slot,
/// listener, and cached record. Intended for tests, which replace the
/// container wholesale per case.
#[doc(hidden)]
pub fn reset() {
    with(|rt| {
        *rt.config.borrow_mut() = ClientOptions::default();
        *rt.client.borrow_mut() = default_client();
        rt.build_id.borrow_mut().clear();
        *rt.route.borrow_mut() = RouteState::default();
        rt.modules.borrow_mut().clear();
        rt.client_loaders.borrow_mut().clear();
        *rt.origin.borrow_mut() = "http://localhost".into();
        *rt.location.borrow_mut() = NavLocation::default();
        *rt.nav.borrow_mut() = Default::default();
        *rt.status.borrow_mut() = Default::default();
        *rt.bus.borrow_mut() = EventBus::default();
        *rt.assets.borrow_mut() = Default::default();
        rt.initialized.set(false);
    });
    crate::scroll::reset_storage();
}

/// The build id currently in effect.
pub fn get_build_id() -> String {
    with(|rt| rt.build_id.borrow().clone())
}

/// The last known location.
pub fn get_location() -> NavLocation {
    with(|rt| rt.location.borrow().clone())
}

/// The current location as an absolute URL.
pub(crate) fn current_url() -> Url {
    with(|rt| {
        let origin = rt.origin.borrow();
        let loc = rt.location.borrow();
        let href = format!("{}{}", origin, loc.to_full_path());
        Url::parse(&href).unwrap_or_else(|_| {
            Url::parse("http://localhost/").expect("fallback URL is valid")
        })
    })
}

/// A fresh history-entry key.
pub(crate) fn new_history_key() -> String {
    with(|rt| {
        let n = rt.next_key.get();
        rt.next_key.set(n + 1);
        format!("{:x}-{n:06x}", helpers::unix_ms() as u64)
    })
}

/// Registers a client loader for a route pattern. The loader runs on every
/// navigation whose matched chain contains the pattern, concurrently with
/// the server fetch.
pub fn register_client_loader(
    pattern: impl Into<String>,
    loader: impl Fn(ClientLoaderArgs) -> LocalBoxFuture<'static, Option<Value>> + 'static,
) {
    with(|rt| {
        rt.client_loaders
            .borrow_mut()
            .insert(pattern.into(), Rc::new(loader))
    });
}

/// Merges a payload's pattern→module mappings into the registry. Patterns
/// whose error export key is the empty string carry no error boundary.
pub(crate) fn merge_module_records(payload: &RoutePayload) {
    with(|rt| {
        let mut modules = rt.modules.borrow_mut();
        for (idx, pattern) in payload.matched_patterns.iter().enumerate() {
            let Some(import_url) = payload.import_urls.get(idx) else {
                continue;
            };
            modules.insert(
                pattern.clone(),
                ModuleRecord {
                    import_url: import_url.clone(),
                    export_key: payload
                        .export_keys
                        .get(idx)
                        .cloned()
                        .unwrap_or_else(|| "default".into()),
                    error_export_key: payload
                        .error_export_keys
                        .get(idx)
                        .filter(|k| !k.is_empty())
                        .cloned(),
                },
            );
        }
    });
}

/// Every pattern with a known module mapping or a registered client loader.
pub(crate) fn known_patterns() -> Vec<String> {
    with(|rt| {
        let mut patterns: Vec<String> = rt.modules.borrow().keys().cloned().collect();
        for pattern in rt.client_loaders.borrow().keys() {
            if !patterns.contains(pattern) {
                patterns.push(pattern.clone());
            }
        }
        patterns
    })
}
