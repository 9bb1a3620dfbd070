//! The navigation state manager.
//!
//! All in-flight work lives in exactly one of three slots: the single active
//! navigation, the prefetch cache (keyed by target URL), or the single
//! pending revalidation — plus the submission table. Slotting enforces the
//! single-writer rule on the visible page: beginning a user navigation
//! evicts everything that does not target the same URL, and an in-flight
//! prefetch for the clicked URL is upgraded in place so its fetch is reused
//! rather than reissued.

pub mod fetch;
pub mod status;
pub mod submit;

use crate::{
    abort::AbortHandle,
    client::ServerResponse,
    events::BuildIdEvent,
    helpers,
    redirects::{self, RedirectData},
    runtime::{self, HistoryState, RoutePayload},
    scroll::ScrollState,
    urls,
};
use any_spawner::Executor;
use futures::{
    channel::oneshot,
    future::{LocalBoxFuture, Shared},
    FutureExt,
};
use serde_json::Value;
use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    rc::Rc,
};
use url::Url;

/// Repeated revalidation requests inside this window merge into one.
pub(crate) const REVALIDATION_COALESCE_MS: f64 = 8.0;

/// What kind of event produced a navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationType {
    UserNavigation,
    BrowserHistory,
    Revalidation,
    Redirect,
    Prefetch,
    /// Slotted like the default case, but never attempts the client-only
    /// skip. Begun through [`begin_navigation`](crate::begin_navigation) by
    /// host flows that must observe the server even when cached route data
    /// could satisfy the navigation.
    Action,
}

/// What the navigation will do on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationIntent {
    /// Prefetch; do not commit.
    None,
    /// Commit and update history.
    Navigate,
    /// Commit only if the URL is unchanged.
    Revalidate,
}

/// Lifecycle state. Monotonic; an entry's phase only ever advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NavigationPhase {
    Fetching,
    Waiting,
    Rendering,
    Complete,
}

/// Optional callbacks around a prefetch-driven navigation's lifecycle.
#[derive(Clone, Default)]
pub struct PrefetchHooks {
    pub before_render: Option<Rc<dyn Fn()>>,
    pub after_render: Option<Rc<dyn Fn()>>,
}

/// Presentation options carried by a navigation. Overwritten wholesale when
/// a prefetch is upgraded by a click.
#[derive(Clone, Default)]
pub struct NavigationProps {
    /// `Some(false)` suppresses the default scroll-to-top on commit.
    pub scroll_to_top: Option<bool>,
    /// Replace the current history entry instead of pushing.
    pub replace: bool,
    /// Opaque state for the history entry.
    pub state: HistoryState,
    /// For POP-driven navigations: the scroll state saved for the target
    /// history entry.
    pub saved_scroll: Option<ScrollState>,
    /// Depth of the soft-redirect chain that produced this navigation.
    pub redirect_count: u32,
    pub hooks: PrefetchHooks,
}

impl std::fmt::Debug for NavigationProps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavigationProps")
            .field("scroll_to_top", &self.scroll_to_top)
            .field("replace", &self.replace)
            .field("saved_scroll", &self.saved_scroll)
            .field("redirect_count", &self.redirect_count)
            .finish_non_exhaustive()
    }
}

/// Arguments to [`begin_navigation`](crate::begin_navigation).
#[derive(Debug)]
pub struct BeginNavigationProps {
    pub href: String,
    pub nav_type: NavigationType,
    pub props: NavigationProps,
}

/// The control handle of a begun navigation: its cancel token plus its
/// outcome future. Cloneable; every clone observes the same navigation.
#[derive(Clone)]
pub struct NavigationControl {
    pub(crate) abort: AbortHandle,
    pub(crate) outcome: Shared<oneshot::Receiver<NavigationOutcome>>,
}

impl NavigationControl {
    /// Cancels the navigation.
    pub fn abort(&self, reason: &str) {
        self.abort.abort(reason);
    }

    /// Resolves with the navigation's outcome. Cancelled navigations
    /// resolve as [`NavigationOutcome::Aborted`].
    pub async fn outcome(&self) -> NavigationOutcome {
        self.outcome
            .clone()
            .await
            .unwrap_or(NavigationOutcome::Aborted)
    }
}

/// How a navigation's fetch concluded.
#[derive(Clone)]
pub enum NavigationOutcome {
    Aborted,
    Redirect {
        data: RedirectData,
        /// The presentation options of the navigation that was redirected,
        /// preserved across the chain.
        props: NavigationProps,
        /// The build id the redirecting response reported.
        build_id: Option<String>,
    },
    Success(Rc<NavigationSuccess>),
}

/// Everything needed to commit a successful fetch.
pub struct NavigationSuccess {
    /// `None` when the outcome was synthesized by the client-only skip.
    pub response: Option<Rc<ServerResponse>>,
    pub payload: RoutePayload,
    /// CSS preloads started for the payload's bundles.
    pub css_promises: Vec<crate::assets::CssPreload>,
    /// The joined client-loader results, keyed by pattern.
    pub client_loader: ClientLoaderFuture,
}

/// Joined client-loader results: `(pattern, data)` pairs.
pub type ClientLoaderFuture = Shared<LocalBoxFuture<'static, Rc<Vec<(String, Value)>>>>;

pub(crate) struct NavigationEntry {
    control: NavigationControl,
    nav_type: Cell<NavigationType>,
    intent: Cell<NavigationIntent>,
    phase: Cell<NavigationPhase>,
    started_at: f64,
    /// Immutable for the entry's lifetime.
    target_url: Url,
    /// The location when the navigation began; revalidations commit only if
    /// it still matches.
    origin_url: Url,
    props: RefCell<NavigationProps>,
    driven: Cell<bool>,
}

pub(crate) type EntryRef = Rc<NavigationEntry>;

impl NavigationEntry {
    pub fn abort_handle(&self) -> &AbortHandle {
        &self.control.abort
    }

    pub fn nav_type(&self) -> NavigationType {
        self.nav_type.get()
    }

    pub fn intent(&self) -> NavigationIntent {
        self.intent.get()
    }

    pub fn phase(&self) -> NavigationPhase {
        self.phase.get()
    }

    pub fn target_url(&self) -> &Url {
        &self.target_url
    }

    pub fn props(&self) -> NavigationProps {
        self.props.borrow().clone()
    }

    /// Advances the phase; backward transitions are ignored.
    pub fn advance_phase(&self, phase: NavigationPhase) {
        if phase > self.phase.get() {
            self.phase.set(phase);
            status::schedule_status_dispatch();
        }
    }

    fn upgrade_to_user_navigation(&self, props: NavigationProps) {
        self.nav_type.set(NavigationType::UserNavigation);
        self.intent.set(NavigationIntent::Navigate);
        *self.props.borrow_mut() = props;
    }
}

/// A live submission.
pub(crate) struct SubmissionRecord {
    pub id: u64,
    /// `Some` for dedupe-keyed submissions (`"submission:" + key`).
    pub key: Option<String>,
    pub abort: AbortHandle,
    #[allow(dead_code)]
    pub started_at: f64,
    pub skip_indicator: bool,
}

/// The slot table. Owned exclusively by the manager; entries never outlive
/// their navigation except inside the prefetch cache.
#[derive(Default)]
pub struct NavState {
    pub(crate) active: Option<EntryRef>,
    pub(crate) prefetches: HashMap<String, EntryRef>,
    pub(crate) revalidation: Option<EntryRef>,
    pub(crate) submissions: Vec<SubmissionRecord>,
    pub(crate) next_submission_id: u64,
}

/// A begun navigation, as the internal drivers see it.
pub(crate) struct BegunNavigation {
    pub entry: Option<EntryRef>,
    pub control: NavigationControl,
}

/// Options for [`navigate`](crate::navigate).
#[derive(Clone, Default)]
pub struct NavigateOptions {
    pub replace: bool,
    /// `Some(false)` keeps the current scroll position on commit.
    pub scroll_to_top: Option<bool>,
    pub state: HistoryState,
}

/// The result of [`navigate`](crate::navigate).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationResult {
    /// Whether a commit (DOM + history + events) actually happened.
    pub did_navigate: bool,
}

/// Navigates to `href`, driving the navigation to completion.
pub async fn navigate(href: &str, options: NavigateOptions) -> NavigationResult {
    let begun = begin(BeginNavigationProps {
        href: href.to_string(),
        nav_type: NavigationType::UserNavigation,
        props: NavigationProps {
            scroll_to_top: options.scroll_to_top,
            replace: options.replace,
            state: options.state,
            ..Default::default()
        },
    });
    NavigationResult {
        did_navigate: drive(begun).await,
    }
}

/// Refetches the current location and commits the result, unless the
/// location changes underneath it. Calls within the coalescing window share
/// one fetch.
pub async fn revalidate() {
    let begun = begin(BeginNavigationProps {
        href: String::new(),
        nav_type: NavigationType::Revalidation,
        props: NavigationProps::default(),
    });
    drive(begun).await;
}

/// Begins (or coalesces into) a revalidation without waiting for it.
pub(crate) fn spawn_revalidation() {
    let begun = begin(BeginNavigationProps {
        href: String::new(),
        nav_type: NavigationType::Revalidation,
        props: NavigationProps::default(),
    });
    Executor::spawn_local(async move {
        drive(begun).await;
    });
}

/// Slots a navigation per its type and returns its control handle.
///
/// Commit-intent navigations (everything but prefetches) are driven to
/// completion by an internal task, so host-begun navigations — browser
/// history replays, `Action`s — commit without the caller touching the
/// outcome. Prefetches stay un-driven: their entry waits in the cache for
/// an upgrading click.
pub fn begin_navigation(props: BeginNavigationProps) -> NavigationControl {
    let begun = begin(props);
    let control = begun.control.clone();
    let commit_intent = begun
        .entry
        .as_ref()
        .map(|entry| entry.intent() != NavigationIntent::None)
        .unwrap_or(false);
    if commit_intent {
        Executor::spawn_local(async move {
            drive(begun).await;
        });
    }
    control
}

/// Aborts every live navigation and submission and empties all slots.
pub fn clear_all() {
    let (entries, submissions) = runtime::with(|rt| {
        let mut nav = rt.nav.borrow_mut();
        let mut entries: Vec<EntryRef> = Vec::new();
        entries.extend(nav.active.take());
        entries.extend(nav.revalidation.take());
        entries.extend(nav.prefetches.drain().map(|(_, entry)| entry));
        let submissions: Vec<SubmissionRecord> = nav.submissions.drain(..).collect();
        (entries, submissions)
    });
    for entry in entries {
        entry.control.abort("cleared");
    }
    for submission in submissions {
        submission.abort.abort("cleared");
    }
    status::schedule_status_dispatch();
}

pub(crate) fn begin(props: BeginNavigationProps) -> BegunNavigation {
    let BeginNavigationProps {
        href,
        nav_type,
        props,
    } = props;
    let current = runtime::current_url();

    if nav_type == NavigationType::Revalidation {
        return begin_revalidation(current, props);
    }

    let target = match urls::absolutize(&href, &current) {
        Ok(target) => target,
        Err(e) => {
            crate::error!("Navigation failed: invalid URL {href:?}: {e}");
            return resolved_aborted();
        }
    };

    match nav_type {
        NavigationType::UserNavigation => begin_user_navigation(target, props),
        NavigationType::Prefetch => begin_prefetch(target, current, props),
        NavigationType::Revalidation => unreachable!("handled above"),
        NavigationType::BrowserHistory | NavigationType::Redirect | NavigationType::Action => {
            begin_default(target, nav_type, props)
        }
    }
}

fn begin_user_navigation(target: Url, props: NavigationProps) -> BegunNavigation {
    let target_str = target.to_string();

    // 1. an active navigation already targeting T is left untouched
    if let Some(active) = runtime::with(|rt| rt.nav.borrow().active.clone()) {
        if active.target_url.as_str() == target_str {
            return BegunNavigation {
                control: active.control.clone(),
                entry: Some(active),
            };
        }
    }

    // 2. evict everything not targeting T
    let evicted = runtime::with(|rt| {
        let mut nav = rt.nav.borrow_mut();
        let mut evicted: Vec<EntryRef> = Vec::new();
        if let Some(active) = nav.active.take() {
            evicted.push(active);
        }
        let stale: Vec<String> = nav
            .prefetches
            .keys()
            .filter(|url| url.as_str() != target_str)
            .cloned()
            .collect();
        for url in stale {
            if let Some(entry) = nav.prefetches.remove(&url) {
                evicted.push(entry);
            }
        }
        if nav
            .revalidation
            .as_ref()
            .map(|entry| entry.target_url.as_str() != target_str)
            .unwrap_or(false)
        {
            evicted.extend(nav.revalidation.take());
        }
        evicted
    });
    for entry in evicted {
        entry.control.abort("superseded");
    }

    // 3./4. upgrade a matching prefetch or revalidation in place: same
    // entry, same in-flight fetch, new intent and presentation options
    let upgraded = runtime::with(|rt| {
        let mut nav = rt.nav.borrow_mut();
        let entry = nav
            .prefetches
            .remove(&target_str)
            .or_else(|| nav.revalidation.take_if(|e| e.target_url.as_str() == target_str));
        if let Some(entry) = &entry {
            nav.active = Some(Rc::clone(entry));
        }
        entry
    });
    if let Some(entry) = upgraded {
        entry.upgrade_to_user_navigation(props);
        status::schedule_status_dispatch();
        return BegunNavigation {
            control: entry.control.clone(),
            entry: Some(entry),
        };
    }

    // 5. a fresh active navigation
    let (entry, control) = create_and_spawn(
        target,
        NavigationType::UserNavigation,
        NavigationIntent::Navigate,
        props,
    );
    runtime::with(|rt| rt.nav.borrow_mut().active = Some(Rc::clone(&entry)));
    status::schedule_status_dispatch();
    BegunNavigation {
        entry: Some(entry),
        control,
    }
}

fn begin_prefetch(target: Url, current: Url, props: NavigationProps) -> BegunNavigation {
    let target_str = target.to_string();

    if let Some(existing) = runtime::with(|rt| {
        let nav = rt.nav.borrow();
        nav.active
            .clone()
            .filter(|entry| entry.target_url.as_str() == target_str)
            .or_else(|| nav.prefetches.get(&target_str).cloned())
            .or_else(|| {
                nav.revalidation
                    .clone()
                    .filter(|entry| entry.target_url.as_str() == target_str)
            })
    }) {
        return BegunNavigation {
            control: existing.control.clone(),
            entry: Some(existing),
        };
    }

    // prefetching the page we are on is pointless
    if urls::equal_ignoring_fragment(&target, &current) {
        return resolved_aborted();
    }

    let (entry, control) = create_and_spawn(
        target,
        NavigationType::Prefetch,
        NavigationIntent::None,
        props,
    );
    runtime::with(|rt| {
        rt.nav
            .borrow_mut()
            .prefetches
            .insert(target_str, Rc::clone(&entry))
    });
    // prefetches never touch the status
    BegunNavigation {
        entry: Some(entry),
        control,
    }
}

fn begin_revalidation(current: Url, props: NavigationProps) -> BegunNavigation {
    let now = helpers::now();

    if let Some(pending) = runtime::with(|rt| rt.nav.borrow().revalidation.clone()) {
        if now - pending.started_at <= REVALIDATION_COALESCE_MS {
            return BegunNavigation {
                control: pending.control.clone(),
                entry: Some(pending),
            };
        }
    }

    let evicted = runtime::with(|rt| rt.nav.borrow_mut().revalidation.take());
    if let Some(entry) = evicted {
        entry.control.abort("superseded");
    }

    let (entry, control) = create_and_spawn(
        current,
        NavigationType::Revalidation,
        NavigationIntent::Revalidate,
        props,
    );
    runtime::with(|rt| rt.nav.borrow_mut().revalidation = Some(Rc::clone(&entry)));
    status::schedule_status_dispatch();
    BegunNavigation {
        entry: Some(entry),
        control,
    }
}

fn begin_default(target: Url, nav_type: NavigationType, props: NavigationProps) -> BegunNavigation {
    let evicted = runtime::with(|rt| rt.nav.borrow_mut().active.take());
    if let Some(entry) = evicted {
        entry.control.abort("superseded");
    }

    let (entry, control) = create_and_spawn(target, nav_type, NavigationIntent::Navigate, props);
    runtime::with(|rt| rt.nav.borrow_mut().active = Some(Rc::clone(&entry)));
    status::schedule_status_dispatch();
    BegunNavigation {
        entry: Some(entry),
        control,
    }
}

fn create_and_spawn(
    target: Url,
    nav_type: NavigationType,
    intent: NavigationIntent,
    props: NavigationProps,
) -> (EntryRef, NavigationControl) {
    let abort = AbortHandle::new();
    let (tx, rx) = oneshot::channel();
    let control = NavigationControl {
        abort,
        outcome: rx.shared(),
    };
    let entry = Rc::new(NavigationEntry {
        control: control.clone(),
        nav_type: Cell::new(nav_type),
        intent: Cell::new(intent),
        phase: Cell::new(NavigationPhase::Fetching),
        started_at: helpers::now(),
        target_url: target,
        origin_url: runtime::current_url(),
        props: RefCell::new(props),
        driven: Cell::new(false),
    });
    let task_entry = Rc::clone(&entry);
    Executor::spawn_local(async move {
        fetch::run_fetch_task(task_entry, tx).await;
    });
    (entry, control)
}

/// A control that resolves as `Aborted` without any entry or fetch behind
/// it.
fn resolved_aborted() -> BegunNavigation {
    let (tx, rx) = oneshot::channel();
    _ = tx.send(NavigationOutcome::Aborted);
    BegunNavigation {
        entry: None,
        control: NavigationControl {
            abort: AbortHandle::new(),
            outcome: rx.shared(),
        },
    }
}

/// Awaits a begun navigation's outcome and carries it through redirects and
/// the commit protocol. Returns whether a commit happened.
pub(crate) fn drive(begun: BegunNavigation) -> LocalBoxFuture<'static, bool> {
    Box::pin(async move {
        let Some(entry) = begun.entry else {
            _ = begun.control.outcome().await;
            return false;
        };

        // exactly one driver processes an entry; later callers (a second
        // click on the same link, a coalesced revalidation) just observe
        let already_driven = entry.driven.replace(true);
        let outcome = begun.control.outcome().await;
        if already_driven {
            return matches!(outcome, NavigationOutcome::Success(_));
        }

        match outcome {
            NavigationOutcome::Aborted => {
                remove_entry(&entry);
                status::schedule_status_dispatch();
                false
            }
            NavigationOutcome::Redirect {
                data,
                props,
                build_id,
            } => {
                if let Some(new_id) = &build_id {
                    maybe_update_build_id(new_id);
                }
                let redirect_count = props.redirect_count;
                remove_entry(&entry);
                status::schedule_status_dispatch();
                redirects::effectuate_redirect_data(data, redirect_count, props).await
            }
            NavigationOutcome::Success(success) => {
                process_successful_navigation(entry, success, false).await
            }
        }
    })
}

/// Re-enters the lifecycle for an internal soft redirect, preserving the
/// original navigation's presentation options.
pub(crate) fn follow_internal_redirect(
    to: String,
    mut props: NavigationProps,
    redirect_count: u32,
) -> LocalBoxFuture<'static, bool> {
    props.redirect_count = redirect_count;
    let begun = begin(BeginNavigationProps {
        href: to,
        nav_type: NavigationType::Redirect,
        props,
    });
    drive(begun)
}

/// The completion protocol for a successful fetch.
///
/// `as_prefetch` is set when the fetch task processes its own pure-prefetch
/// outcome; it pins the early return at the no-render step even if a click
/// upgrades the entry mid-flight (the upgrading driver re-processes and
/// renders).
pub(crate) async fn process_successful_navigation(
    entry: EntryRef,
    success: Rc<NavigationSuccess>,
    as_prefetch: bool,
) -> bool {
    let payload = &success.payload;
    let response_build_id = success
        .response
        .as_ref()
        .and_then(|response| response.build_id().map(str::to_string));
    let current_build = runtime::get_build_id();

    // module-map merges and CSS application are only sound when the assets
    // on disk still belong to the build we know about
    let build_matches = response_build_id
        .as_deref()
        .map(|id| id == current_build)
        .unwrap_or(true);
    if build_matches {
        runtime::merge_module_records(payload);
        if let Some(bundles) = &payload.css_bundles {
            // even for prefetches, so their CSS is warm before any click
            crate::assets::apply_css(bundles);
        }
    }

    if entry.intent() == NavigationIntent::Revalidate && location_moved_since(&entry) {
        finish_entry(&entry, as_prefetch);
        return false;
    }

    entry.advance_phase(NavigationPhase::Waiting);

    if let Some(new_id) = &response_build_id {
        maybe_update_build_id(new_id);
    }

    let loader_data = success.client_loader.clone().await;

    for promise in &success.css_promises {
        if let Err(e) = promise.clone().await {
            // stylesheets are best-effort; the commit proceeds without them
            crate::warn!("{e}");
        }
    }

    if as_prefetch || entry.intent() == NavigationIntent::None {
        entry.advance_phase(NavigationPhase::Complete);
        return false;
    }

    if entry.intent() == NavigationIntent::Revalidate && location_moved_since(&entry) {
        finish_entry(&entry, as_prefetch);
        return false;
    }

    entry.advance_phase(NavigationPhase::Rendering);
    let hooks = entry.props.borrow().hooks.clone();
    if let Some(cb) = &hooks.before_render {
        cb();
    }

    let rendered = crate::render::render_navigation(&entry, &success, &loader_data).await;
    entry.advance_phase(NavigationPhase::Complete);

    let committed = match rendered {
        Ok(()) => {
            if let Some(cb) = &hooks.after_render {
                cb();
            }
            true
        }
        Err(e) => {
            crate::error!("Navigation failed: {e}");
            false
        }
    };

    finish_entry(&entry, as_prefetch);
    committed
}

fn location_moved_since(entry: &NavigationEntry) -> bool {
    runtime::current_url().as_str() != entry.origin_url.as_str()
}

/// Step-10 cleanup: drop the entry from its slot unless it is a pure
/// prefetch, whose cached outcome can still serve a subsequent click.
fn finish_entry(entry: &EntryRef, as_prefetch: bool) {
    if !(as_prefetch || entry.intent() == NavigationIntent::None) {
        remove_entry(entry);
    }
    status::schedule_status_dispatch();
}

/// Removes the entry from whichever slot still holds it.
pub(crate) fn remove_entry(entry: &EntryRef) {
    runtime::with(|rt| {
        let mut nav = rt.nav.borrow_mut();
        if nav
            .active
            .as_ref()
            .map(|held| Rc::ptr_eq(held, entry))
            .unwrap_or(false)
        {
            nav.active = None;
        }
        if nav
            .revalidation
            .as_ref()
            .map(|held| Rc::ptr_eq(held, entry))
            .unwrap_or(false)
        {
            nav.revalidation = None;
        }
        nav.prefetches.retain(|_, held| !Rc::ptr_eq(held, entry));
    });
}

/// Evicts and aborts a prefetch that has not been upgraded. Used by the
/// hover handlers' `stop()`.
pub(crate) fn abort_prefetch(entry: &EntryRef, reason: &str) {
    if entry.intent() != NavigationIntent::None {
        return;
    }
    remove_entry(entry);
    entry.control.abort(reason);
}

/// On a build-id change: emit the event (before any dependent work), then
/// adopt the new id for subsequent requests.
pub(crate) fn maybe_update_build_id(new_id: &str) {
    let old_id = runtime::get_build_id();
    if new_id == old_id {
        return;
    }
    runtime::with(|rt| *rt.build_id.borrow_mut() = new_id.to_string());
    let event = BuildIdEvent {
        old_id,
        new_id: new_id.to_string(),
    };
    runtime::with(|rt| rt.bus.borrow().emit_build_id(&event));
}
