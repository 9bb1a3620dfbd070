//! Mutation submissions and their revalidation handoff.
//!
//! Submissions bypass the slots: any number run concurrently, keyed either
//! by a user-supplied deduplication key (a resubmission aborts its
//! predecessor) or by a fresh unique key. A successful non-GET submission
//! triggers a revalidation *before* returning, so the busy indicator hands
//! off submitting → revalidating → idle without an all-clear gap in
//! between.

use super::{status, NavigationProps, SubmissionRecord};
use crate::{
    abort::AbortHandle,
    client::{RequestBody, HEADER_DEPLOYMENT_ID},
    errors::SubmitError,
    helpers,
    redirects::{self, HandleRedirectsArgs, RedirectData, RequestInit},
    runtime, urls,
};
use serde::Serialize;
use serde_json::Value;

/// The user-controllable parts of a submission request.
#[derive(Default)]
pub struct SubmitInit {
    /// HTTP method; defaults to GET when empty.
    pub method: String,
    pub headers: Vec<(String, String)>,
    /// `FormData` and strings pass through untouched; use
    /// [`submit_json`] for everything else.
    pub body: Option<RequestBody>,
}

impl SubmitInit {
    pub fn method(method: &str) -> Self {
        Self {
            method: method.to_string(),
            ..Default::default()
        }
    }
}

/// Options for [`submit`].
#[derive(Debug, Clone)]
pub struct SubmitOptions {
    /// Submissions sharing a key dedupe: a resubmission aborts the one in
    /// flight.
    pub dedupe_key: Option<String>,
    /// Keep this submission out of the global busy indicator.
    pub skip_global_loading_indicator: bool,
    /// Revalidate after a successful non-GET submission. Defaults to true.
    pub revalidate: bool,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            dedupe_key: None,
            skip_global_loading_indicator: false,
            revalidate: true,
        }
    }
}

/// Submits a request and surfaces the parsed JSON response.
///
/// Redirect responses are effectuated and surface as `Ok(None)`; non-OK
/// statuses and transport failures surface as errors. An aborted submission
/// (explicit or deduped) is `Err(SubmitError::Aborted)`, with no logging.
pub async fn submit(
    url: &str,
    init: SubmitInit,
    options: SubmitOptions,
) -> Result<Option<Value>, SubmitError> {
    let abort = AbortHandle::new();
    let key = options
        .dedupe_key
        .as_ref()
        .map(|key| format!("submission:{key}"));

    let (id, deduped) = runtime::with(|rt| {
        let mut nav = rt.nav.borrow_mut();
        let id = nav.next_submission_id;
        nav.next_submission_id += 1;
        let deduped = key.as_ref().and_then(|key| {
            nav.submissions
                .iter()
                .position(|held| held.key.as_deref() == Some(key))
                .map(|pos| nav.submissions.remove(pos))
        });
        nav.submissions.push(SubmissionRecord {
            id,
            key: key.clone(),
            abort: abort.clone(),
            started_at: helpers::now(),
            skip_indicator: options.skip_global_loading_indicator,
        });
        (id, deduped)
    });
    if let Some(prior) = deduped {
        prior.abort.abort("deduped");
    }
    status::schedule_status_dispatch();

    let result = submit_inner(url, init, &options, &abort).await;

    runtime::with(|rt| {
        rt.nav
            .borrow_mut()
            .submissions
            .retain(|held| held.id != id)
    });
    status::schedule_status_dispatch();

    result
}

/// The caller layer that JSON-stringifies arbitrary serializable bodies.
pub async fn submit_json(
    url: &str,
    method: &str,
    body: &impl Serialize,
    options: SubmitOptions,
) -> Result<Option<Value>, SubmitError> {
    let value = serde_json::to_value(body).map_err(|e| SubmitError::Network(e.to_string()))?;
    submit(
        url,
        SubmitInit {
            method: method.to_string(),
            headers: Vec::new(),
            body: Some(RequestBody::Json(value)),
        },
        options,
    )
    .await
}

async fn submit_inner(
    url: &str,
    init: SubmitInit,
    options: &SubmitOptions,
    abort: &AbortHandle,
) -> Result<Option<Value>, SubmitError> {
    let current = runtime::current_url();
    let target =
        urls::absolutize(url, &current).map_err(|e| SubmitError::Network(e.to_string()))?;

    let method = if init.method.is_empty() {
        "GET".to_string()
    } else {
        init.method.to_ascii_uppercase()
    };
    let mut headers = init.headers;
    if let Some(deployment_id) = runtime::with(|rt| rt.config.borrow().deployment_id.clone()) {
        headers.push((HEADER_DEPLOYMENT_ID.to_string(), deployment_id));
    }

    let resolution = redirects::handle_redirects(HandleRedirectsArgs {
        abort: abort.clone(),
        url: target,
        is_prefetch: false,
        redirect_count: 0,
        request_init: Some(RequestInit {
            method: method.clone(),
            headers,
            body: init.body,
        }),
    })
    .await
    .map_err(SubmitError::from)?;

    if abort.is_aborted() {
        return Err(SubmitError::Aborted);
    }

    let response = resolution.response;
    if let Some(new_id) = response.build_id() {
        super::maybe_update_build_id(new_id);
    }

    if let Some(redirect @ RedirectData::Should { .. }) = resolution.redirect {
        redirects::effectuate_redirect_data(redirect, 0, NavigationProps::default()).await;
        return Ok(None);
    }

    if !response.ok {
        return Err(SubmitError::Status(response.status));
    }

    let data = match response.body.as_deref() {
        None => None,
        Some(body) if body.trim().is_empty() => None,
        Some(body) => Some(
            serde_json::from_str::<Value>(body)
                .map_err(|e| SubmitError::Network(format!("could not parse response: {e}")))?,
        ),
    };

    // begun synchronously, so the indicator is already "revalidating" when
    // "submitting" clears
    if method != "GET" && options.revalidate {
        super::spawn_revalidation();
    }

    Ok(data)
}
