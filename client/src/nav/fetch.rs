//! The fetch phase of a navigation: the client-only skip check, the JSON
//! fetch (through the redirect resolver), client-loader dispatch, and asset
//! preload kickoff.

use super::{
    ClientLoaderFuture, EntryRef, NavigationIntent, NavigationOutcome, NavigationSuccess,
    NavigationType,
};
use crate::{
    abort::AbortHandle,
    assets,
    errors::NavigationError,
    matcher,
    redirects::{self, HandleRedirectsArgs, RedirectData},
    runtime::{self, ClientLoaderArgs, RoutePayload, ServerDataFuture, ServerLoaderData},
    urls,
};
use futures::{
    channel::oneshot,
    future::{LocalBoxFuture, Shared},
    FutureExt,
};
use serde_json::Value;
use std::{collections::HashSet, rc::Rc};
use url::Url;

/// The task spawned for every slotted navigation. Resolves the outcome for
/// whoever drives the entry; pure prefetches drive their own completion so
/// their assets warm up without a caller.
pub(crate) async fn run_fetch_task(entry: EntryRef, tx: oneshot::Sender<NavigationOutcome>) {
    match fetch_outcome(&entry).await {
        Ok(outcome) => {
            let aborted = matches!(outcome, NavigationOutcome::Aborted);
            let success = match &outcome {
                NavigationOutcome::Success(success) => Some(Rc::clone(success)),
                _ => None,
            };
            let is_prefetch = entry.intent() == NavigationIntent::None;
            _ = tx.send(outcome);
            if is_prefetch {
                if let Some(success) = success {
                    super::process_successful_navigation(entry, success, true).await;
                } else if aborted {
                    // nothing cacheable came of it; let a click refetch
                    super::remove_entry(&entry);
                }
            }
        }
        Err(NavigationError::Aborted) => {
            super::remove_entry(&entry);
            super::status::schedule_status_dispatch();
            // the receiver observes the dropped sender as an abort
        }
        Err(e) => {
            super::remove_entry(&entry);
            super::status::schedule_status_dispatch();
            crate::error!("Navigation failed: {e}");
        }
    }
}

async fn fetch_outcome(entry: &EntryRef) -> Result<NavigationOutcome, NavigationError> {
    let nav_type = entry.nav_type();
    let target = entry.target_url().clone();

    // prefetches must produce a real server payload to be worth caching,
    // and actions exist precisely to observe the server
    if !matches!(nav_type, NavigationType::Prefetch | NavigationType::Action) {
        if let Some(success) = try_client_only_skip(&target) {
            return Ok(NavigationOutcome::Success(Rc::new(success)));
        }
    }

    let build_id = runtime::get_build_id();
    let deployment_id = if nav_type == NavigationType::Revalidation {
        runtime::with(|rt| rt.config.borrow().deployment_id.clone())
    } else {
        None
    };
    let request_url = urls::to_json_request_url(&target, &build_id, deployment_id.as_deref());

    // client loaders run concurrently with the server fetch; each gets a
    // future onto its slice of the (eventual) response
    let (server_tx, server_data) = server_data_master();
    let client_loader = start_client_loaders(&target, entry.abort_handle(), server_data);

    let resolution = redirects::handle_redirects(HandleRedirectsArgs {
        abort: entry.abort_handle().clone(),
        url: request_url,
        is_prefetch: nav_type == NavigationType::Prefetch,
        redirect_count: entry.props().redirect_count,
        request_init: None,
    })
    .await;

    let resolution = match resolution {
        Ok(resolution) => resolution,
        Err(e) => {
            resolve_empty(server_tx);
            return Err(e.into());
        }
    };

    if entry.abort_handle().is_aborted() {
        resolve_empty(server_tx);
        return Err(NavigationError::Aborted);
    }

    let response = resolution.response;

    if let Some(redirect) = resolution.redirect {
        resolve_empty(server_tx);
        return Ok(match redirect {
            // the browser already followed; rendering again would double up
            RedirectData::Did => NavigationOutcome::Aborted,
            data @ RedirectData::Should { .. } => NavigationOutcome::Redirect {
                data,
                props: entry.props(),
                build_id: response.build_id().map(str::to_string),
            },
        });
    }

    if !response.ok && response.status != 304 {
        resolve_empty(server_tx);
        return Err(NavigationError::NetworkStatus(response.status));
    }

    if response.body_is_empty() {
        resolve_empty(server_tx);
        return Err(NavigationError::EmptyBody);
    }

    let payload: RoutePayload =
        match serde_json::from_str(response.body.as_deref().unwrap_or_default()) {
            Ok(payload) => payload,
            Err(e) => {
                resolve_empty(server_tx);
                return Err(NavigationError::Deserialization(e.to_string()));
            }
        };

    _ = server_tx.send(snapshot_for_loaders(
        &payload,
        response.build_id().unwrap_or_default(),
    ));

    begin_asset_preloads(&payload);
    let css_promises = payload
        .css_bundles
        .iter()
        .flatten()
        .map(|bundle| assets::preload_css(bundle))
        .collect();

    Ok(NavigationOutcome::Success(Rc::new(NavigationSuccess {
        response: Some(response),
        payload,
        css_promises,
        client_loader,
    })))
}

/// The client-only skip: when the registry alone can produce the next page
/// (same matched chain, no loader inputs changed, every pattern mapped),
/// synthesize a success from cached data without touching the network.
fn try_client_only_skip(target: &Url) -> Option<NavigationSuccess> {
    let route = runtime::with(|rt| rt.route.borrow().clone());
    if route.matched_patterns.is_empty() {
        return None;
    }

    let registered = runtime::known_patterns();
    let matched = matcher::match_registered_patterns(&registered, target.path())?;

    // the chain must be the current chain: that is the only case where "no
    // server loader added or removed" is decidable without a manifest
    if matched.chain != route.matched_patterns {
        return None;
    }

    let modules = runtime::with(|rt| rt.modules.borrow().clone());
    if matched
        .chain
        .iter()
        .any(|pattern| !modules.contains_key(pattern))
    {
        return None;
    }

    let has_server_loader = route.loaders_data.iter().any(|data| !data.is_null());
    let client_loader_patterns: HashSet<String> =
        runtime::with(|rt| rt.client_loaders.borrow().keys().cloned().collect());
    let has_client_loader = matched
        .chain
        .iter()
        .any(|pattern| client_loader_patterns.contains(pattern));

    if has_server_loader || has_client_loader {
        // loader inputs must be identical: same search params, same dynamic
        // params
        let current = runtime::current_url();
        if target.query() != current.query() {
            return None;
        }
        if matched.params != route.params {
            return None;
        }
    }

    let payload = RoutePayload {
        matched_patterns: route.matched_patterns.clone(),
        loaders_data: route.loaders_data.clone(),
        import_urls: matched
            .chain
            .iter()
            .map(|pattern| modules[pattern].import_url.clone())
            .collect(),
        export_keys: matched
            .chain
            .iter()
            .map(|pattern| modules[pattern].export_key.clone())
            .collect(),
        error_export_keys: matched
            .chain
            .iter()
            .map(|pattern| {
                modules[pattern]
                    .error_export_key
                    .clone()
                    .unwrap_or_default()
            })
            .collect(),
        outermost_server_error_idx: route.outermost_error_idx,
        has_root_data: route.has_root_data,
        params: matched.params,
        splat_values: matched.splat_values,
        ..Default::default()
    };

    let cached: Rc<Vec<(String, Value)>> = Rc::new(
        route
            .matched_patterns
            .iter()
            .cloned()
            .zip(route.client_loaders_data.iter().cloned())
            .collect(),
    );
    let client_loader: ClientLoaderFuture = {
        let fut: LocalBoxFuture<'static, Rc<Vec<(String, Value)>>> =
            Box::pin(async move { cached });
        fut.shared()
    };

    Some(NavigationSuccess {
        response: None,
        payload,
        css_promises: Vec::new(),
        client_loader,
    })
}

/// What one response looks like before it is sliced per loader.
#[derive(Debug, Clone, Default)]
struct ServerSnapshot {
    matched_patterns: Vec<String>,
    loaders_data: Vec<Value>,
    root_data: Option<Value>,
    build_id: String,
}

type ServerMaster = Shared<LocalBoxFuture<'static, ServerSnapshot>>;

/// A future over the eventual response that resolves with sentinel empties
/// on failure; it never rejects, so client loaders can await it blindly.
fn server_data_master() -> (oneshot::Sender<ServerSnapshot>, ServerMaster) {
    let (tx, rx) = oneshot::channel();
    let fut: LocalBoxFuture<'static, ServerSnapshot> =
        Box::pin(async move { rx.await.unwrap_or_default() });
    (tx, fut.shared())
}

fn resolve_empty(tx: oneshot::Sender<ServerSnapshot>) {
    _ = tx.send(ServerSnapshot::default());
}

fn snapshot_for_loaders(payload: &RoutePayload, build_id: &str) -> ServerSnapshot {
    ServerSnapshot {
        matched_patterns: payload.matched_patterns.clone(),
        loaders_data: payload.loaders_data.clone(),
        root_data: payload
            .has_root_data
            .then(|| payload.loaders_data.first().cloned())
            .flatten(),
        build_id: build_id.to_string(),
    }
}

/// Invokes every registered client loader whose pattern matches the target,
/// and joins their results.
fn start_client_loaders(
    target: &Url,
    abort: &AbortHandle,
    master: ServerMaster,
) -> ClientLoaderFuture {
    let mut invocations = Vec::new();

    let registered = runtime::known_patterns();
    if let Some(matched) = matcher::match_registered_patterns(&registered, target.path()) {
        let loaders = runtime::with(|rt| rt.client_loaders.borrow().clone());
        for pattern in &matched.chain {
            let Some(loader) = loaders.get(pattern) else {
                continue;
            };
            let server_data: ServerDataFuture = {
                let master = master.clone();
                let pattern = pattern.clone();
                let fut: LocalBoxFuture<'static, ServerLoaderData> = Box::pin(async move {
                    let snapshot = master.await;
                    let idx = snapshot
                        .matched_patterns
                        .iter()
                        .position(|candidate| *candidate == pattern);
                    ServerLoaderData {
                        matched_patterns: snapshot.matched_patterns.clone(),
                        loader_data: idx
                            .and_then(|i| snapshot.loaders_data.get(i).cloned())
                            .filter(|data| !data.is_null()),
                        root_data: snapshot.root_data.clone(),
                        build_id: snapshot.build_id.clone(),
                    }
                });
                fut.shared()
            };
            let args = ClientLoaderArgs {
                params: matched.params.clone(),
                splat_values: matched.splat_values.clone(),
                server_data,
                abort: abort.clone(),
            };
            let pattern = pattern.clone();
            let invocation = loader(args);
            invocations.push(async move { (pattern, invocation.await) });
        }
    }

    let fut: LocalBoxFuture<'static, Rc<Vec<(String, Value)>>> = Box::pin(async move {
        let results = futures::future::join_all(invocations).await;
        Rc::new(
            results
                .into_iter()
                .map(|(pattern, data)| (pattern, data.unwrap_or(Value::Null)))
                .collect(),
        )
    });
    fut.shared()
}

/// Starts module preloads for the payload: its dependency list in
/// production, every unique import URL in development.
fn begin_asset_preloads(payload: &RoutePayload) {
    let is_dev = runtime::with(|rt| rt.config.borrow().is_dev);
    if is_dev {
        let mut seen = HashSet::new();
        for import_url in &payload.import_urls {
            if !import_url.is_empty() && seen.insert(import_url) {
                assets::preload_module(import_url);
            }
        }
    } else if let Some(deps) = &payload.deps {
        for dep in deps {
            assets::preload_module(dep);
        }
    }
}
