//! Anchor-click interception and hover/focus prefetching.
//!
//! A single delegated `click` listener on the window turns eligible anchor
//! clicks into SPA navigations. Hover/focus prefetching goes through
//! [`get_prefetch_handlers`], which begins a prefetch after a short delay
//! and upgrades it in place when the link is actually clicked.

use crate::{
    helpers::TimeoutHandle,
    nav::{self, BeginNavigationProps, EntryRef, NavigationProps, NavigationType, PrefetchHooks},
};
use any_spawner::Executor;
use std::{
    cell::{Cell, RefCell},
    rc::Rc,
    time::Duration,
};

/// How long a link must stay hovered before its prefetch starts.
const DEFAULT_PREFETCH_DELAY: Duration = Duration::from_millis(100);

/// Installs the delegated anchor-click listener.
#[cfg(target_arch = "wasm32")]
pub(crate) fn init() {
    let handle = crate::helpers::window_event_listener_untyped("click", handle_anchor_click);
    std::mem::forget(handle);
}

/// Decides whether a click is ours to handle, and handles it.
///
/// The browser keeps the event when: the link leaves our origin or uses a
/// non-http(s) scheme, a modifier key is held, the button is not primary,
/// the anchor targets another browsing context, or it is a download.
/// Fragment-only changes update history and scroll without a fetch.
#[cfg(target_arch = "wasm32")]
fn handle_anchor_click(ev: web_sys::Event) {
    use wasm_bindgen::JsCast;

    let ev = ev.unchecked_into::<web_sys::MouseEvent>();
    if ev.default_prevented()
        || ev.button() != 0
        || ev.meta_key()
        || ev.alt_key()
        || ev.ctrl_key()
        || ev.shift_key()
    {
        return;
    }

    let composed_path = ev.composed_path();
    let mut a: Option<web_sys::HtmlAnchorElement> = None;
    for i in 0..composed_path.length() {
        if let Ok(el) = composed_path
            .get(i)
            .dyn_into::<web_sys::HtmlAnchorElement>()
        {
            a = Some(el);
        }
    }
    let Some(a) = a else {
        return;
    };

    let target = a.target();
    if !target.is_empty() && target != "_self" {
        return;
    }
    if a.has_attribute("download") {
        return;
    }
    let rel = a.get_attribute("rel").unwrap_or_default();
    if rel.split([' ', '\t']).any(|p| p == "external") {
        return;
    }

    let href = a.href();
    if href.is_empty() {
        return;
    }
    let Ok(url) = url::Url::parse(&href) else {
        return;
    };
    if !crate::urls::is_http_like(&url) {
        return;
    }
    let current = crate::runtime::current_url();
    if !crate::urls::same_origin(&url, &current) {
        return;
    }

    if crate::urls::fragment_only_change(&url, &current) {
        ev.prevent_default();
        crate::history::commit_hash_change(&url);
        return;
    }

    ev.prevent_default();
    Executor::spawn_local(async move {
        nav::navigate(&href, nav::NavigateOptions::default()).await;
    });
}

/// Configuration for [`get_prefetch_handlers`].
#[derive(Clone, Default)]
pub struct PrefetchConfig {
    pub href: String,
    /// Hover delay before the prefetch begins. Defaults to 100 ms.
    pub delay_ms: Option<u64>,
    /// Runs once, just before the prefetch (or click navigation) begins.
    pub before_begin: Option<Rc<dyn Fn()>>,
    /// Runs just before the upgraded navigation commits.
    pub before_render: Option<Rc<dyn Fn()>>,
    /// Runs after the upgraded navigation committed.
    pub after_render: Option<Rc<dyn Fn()>>,
}

impl PrefetchConfig {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            ..Default::default()
        }
    }
}

/// Creates hover/focus prefetch handlers for one link.
pub fn get_prefetch_handlers(config: PrefetchConfig) -> PrefetchHandlers {
    let delay = config
        .delay_ms
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_PREFETCH_DELAY);
    PrefetchHandlers {
        inner: Rc::new(PrefetchInner {
            href: config.href,
            delay,
            before_begin: config.before_begin,
            hooks: PrefetchHooks {
                before_render: config.before_render,
                after_render: config.after_render,
            },
            timer: RefCell::new(None),
            entry: RefCell::new(None),
            began: Cell::new(false),
        }),
    }
}

/// Handlers for one prefetchable link: wire `start` to hover/focus, `stop`
/// to their opposites, and `on_click` to click.
#[derive(Clone)]
pub struct PrefetchHandlers {
    inner: Rc<PrefetchInner>,
}

struct PrefetchInner {
    href: String,
    delay: Duration,
    before_begin: Option<Rc<dyn Fn()>>,
    hooks: PrefetchHooks,
    timer: RefCell<Option<TimeoutHandle>>,
    entry: RefCell<Option<EntryRef>>,
    began: Cell<bool>,
}

impl PrefetchInner {
    fn fire_before_begin(&self) {
        if !self.began.replace(true) {
            if let Some(cb) = &self.before_begin {
                cb();
            }
        }
    }

    fn begin_prefetch(self: &Rc<Self>) {
        *self.timer.borrow_mut() = None;
        if self.entry.borrow().is_some() {
            return;
        }
        self.fire_before_begin();
        let begun = nav::begin(BeginNavigationProps {
            href: self.href.clone(),
            nav_type: NavigationType::Prefetch,
            props: NavigationProps {
                hooks: self.hooks.clone(),
                ..Default::default()
            },
        });
        *self.entry.borrow_mut() = begun.entry;
    }
}

impl PrefetchHandlers {
    /// Begins the prefetch after the configured delay. Safe to call
    /// repeatedly; only one timer and one prefetch are live at a time.
    pub fn start(&self) {
        if self.inner.timer.borrow().is_some() || self.inner.entry.borrow().is_some() {
            return;
        }
        let inner = Rc::clone(&self.inner);
        let handle = crate::helpers::set_timeout_with_handle(
            move || inner.begin_prefetch(),
            self.inner.delay,
        );
        if let Ok(handle) = handle {
            *self.inner.timer.borrow_mut() = Some(handle);
        }
    }

    /// Cancels a pending timer and aborts the prefetch if it has not been
    /// upgraded by a click.
    pub fn stop(&self) {
        if let Some(timer) = self.inner.timer.borrow_mut().take() {
            timer.clear();
        }
        if let Some(entry) = self.inner.entry.borrow_mut().take() {
            nav::abort_prefetch(&entry, "stopped");
        }
        self.inner.began.set(false);
    }

    /// The click handler: upgrades the prefetch (or starts a navigation
    /// outright) toward this link's href.
    #[cfg(target_arch = "wasm32")]
    pub fn on_click(&self, ev: &web_sys::Event) {
        ev.prevent_default();
        self.activate();
    }

    /// The programmatic equivalent of a click.
    pub fn activate(&self) {
        if let Some(timer) = self.inner.timer.borrow_mut().take() {
            timer.clear();
        }
        self.inner.fire_before_begin();
        self.inner.entry.borrow_mut().take();
        let begun = nav::begin(BeginNavigationProps {
            href: self.inner.href.clone(),
            nav_type: NavigationType::UserNavigation,
            props: NavigationProps {
                hooks: self.inner.hooks.clone(),
                ..Default::default()
            },
        });
        Executor::spawn_local(async move {
            nav::drive(begun).await;
        });
    }
}
