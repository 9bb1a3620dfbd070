//! Redirect classification and follow-through.
//!
//! The server signals redirects to SPA-aware clients through custom headers
//! (`X-Vorma-Reload`, `X-Client-Redirect`) rather than HTTP 30x, so the
//! client can decide between another SPA fetch, a full-document load, or
//! leaving the origin entirely. Header precedence, highest first: the reload
//! header, the platform's own `redirected` flag on GET-like requests, then
//! the client-redirect header.

use crate::{
    abort::AbortHandle,
    client::{
        NavigationRequest, RequestBody, ServerResponse, HEADER_ACCEPTS_CLIENT_REDIRECT,
        HEADER_CLIENT_REDIRECT, HEADER_RELOAD,
    },
    errors::ClientError,
    nav::NavigationProps,
    runtime, urls,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use url::Url;

/// Soft-redirect chains abort past this depth.
pub const MAX_REDIRECTS: u32 = 10;

/// How a redirect target should be followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// Full-document load of a same-app path (`X-Vorma-Reload`).
    ForcedInternal,
    /// Another SPA fetch within this origin.
    Internal,
    /// Hand the browser to another origin.
    External,
}

/// The classification of a response's redirect signals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectData {
    /// The platform fetch already followed an HTTP redirect; there is
    /// nothing left for us to do (and nothing safe to double-render).
    Did,
    /// The client should effectuate a redirect to `to` (absolute).
    Should { kind: RedirectKind, to: String },
}

/// Arguments to [`handle_redirects`].
pub struct HandleRedirectsArgs {
    pub abort: AbortHandle,
    /// The fully-built request URL.
    pub url: Url,
    pub is_prefetch: bool,
    pub redirect_count: u32,
    /// Method/body/headers for submissions; `None` issues a plain GET.
    pub request_init: Option<RequestInit>,
}

/// The user-supplied parts of a submission request.
#[derive(Default)]
pub struct RequestInit {
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

/// What a resolved fetch hands back to the caller.
pub struct RedirectResolution {
    pub redirect: Option<RedirectData>,
    pub response: Rc<ServerResponse>,
}

/// Issues the fetch and classifies any redirect signals on the response.
pub async fn handle_redirects(args: HandleRedirectsArgs) -> Result<RedirectResolution, ClientError> {
    let HandleRedirectsArgs {
        abort,
        url,
        is_prefetch: _,
        redirect_count: _,
        request_init,
    } = args;

    let mut request = match request_init {
        None => NavigationRequest::get(url, abort),
        Some(init) => {
            let mut request = NavigationRequest {
                url,
                method: if init.method.is_empty() {
                    "GET".into()
                } else {
                    init.method.to_ascii_uppercase()
                },
                headers: init.headers,
                body: init.body,
                abort,
            };
            request.headers.retain(|(name, _)| {
                !name.eq_ignore_ascii_case(HEADER_ACCEPTS_CLIENT_REDIRECT)
            });
            request
        }
    };
    request = request.header(HEADER_ACCEPTS_CLIENT_REDIRECT, "1");
    let is_get_like = request.is_get_like();

    let client = runtime::with(|rt| Rc::clone(&rt.client.borrow()));
    let response = client.send(request).await?;
    let redirect = classify_redirect(&response, is_get_like);

    Ok(RedirectResolution {
        redirect,
        response: Rc::new(response),
    })
}

fn classify_redirect(response: &ServerResponse, is_get_like: bool) -> Option<RedirectData> {
    let current = runtime::current_url();

    if let Some(path) = response.header(HEADER_RELOAD) {
        let to = urls::absolutize(path, &current).ok()?;
        return Some(RedirectData::Should {
            kind: RedirectKind::ForcedInternal,
            to: to.to_string(),
        });
    }

    if response.redirected && is_get_like {
        return Some(RedirectData::Did);
    }

    if let Some(target) = response.header(HEADER_CLIENT_REDIRECT) {
        let Ok(to) = urls::absolutize(target, &current) else {
            crate::debug_warn!("ignoring unparseable redirect target: {target}");
            return None;
        };
        // non-http(s) targets (mailto: etc.) are ignored; the navigation
        // proceeds with the response body it already has
        if !urls::is_http_like(&to) {
            return None;
        }
        let kind = if urls::same_origin(&to, &current) {
            RedirectKind::Internal
        } else {
            RedirectKind::External
        };
        return Some(RedirectData::Should {
            kind,
            to: to.to_string(),
        });
    }

    None
}

/// Follows a `Should` redirect: forced-internal and external targets leave
/// through `window.location`; internal targets re-enter the navigation
/// lifecycle with an incremented depth counter. Returns whether an SPA
/// commit happened.
pub(crate) fn effectuate_redirect_data(
    data: RedirectData,
    redirect_count: u32,
    original_props: NavigationProps,
) -> LocalBoxFuture<'static, bool> {
    Box::pin(async move {
        let RedirectData::Should { kind, to } = data else {
            return false;
        };
        match kind {
            RedirectKind::ForcedInternal => {
                let Ok(target) = Url::parse(&to) else {
                    return false;
                };
                let build_id = runtime::get_build_id();
                let reload = urls::to_reload_url(&target, &build_id);
                assign_location(reload.as_str());
                false
            }
            RedirectKind::External => {
                assign_location(&to);
                false
            }
            RedirectKind::Internal => {
                let next = redirect_count + 1;
                if next > MAX_REDIRECTS {
                    crate::error!("Too many redirects");
                    return false;
                }
                crate::nav::follow_internal_redirect(to, original_props, next).await
            }
        }
    })
}

/// Assigns `window.location`, triggering a full document load.
fn assign_location(href: &str) {
    #[cfg(target_arch = "wasm32")]
    {
        _ = crate::helpers::window().location().assign(href);
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        crate::debug_warn!("full-document redirect to {href} suppressed off-browser");
    }
}
