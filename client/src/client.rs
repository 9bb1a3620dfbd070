//! The transport seam between the navigation core and the Vorma server.
//!
//! Everything that leaves the process goes through a [`ServerClient`]. In the
//! browser that is [`FetchClient`], a thin layer over `gloo_net`; tests and
//! exotic hosts install their own implementation via
//! [`crate::runtime::set_server_client`].

use crate::{abort::AbortHandle, errors::ClientError};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use url::Url;

/// Response header naming the server's current build artifact set.
pub const HEADER_BUILD_ID: &str = "x-vorma-build-id";
/// Response header carrying a soft redirect target.
pub const HEADER_CLIENT_REDIRECT: &str = "x-client-redirect";
/// Response header forcing a full-document reload to the given path.
pub const HEADER_RELOAD: &str = "x-vorma-reload";
/// Request header telling the server to redirect via the custom headers
/// above instead of HTTP 30x.
pub const HEADER_ACCEPTS_CLIENT_REDIRECT: &str = "x-accepts-client-redirect";
/// Request header sticking submissions to one deployment during a rolling
/// upgrade.
pub const HEADER_DEPLOYMENT_ID: &str = "x-deployment-id";

/// A request as the navigation core hands it to the transport.
pub struct NavigationRequest {
    pub url: Url,
    /// Uppercase HTTP method.
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    /// Cancel token; the transport must fail with [`ClientError::Aborted`]
    /// once it fires.
    pub abort: AbortHandle,
}

impl NavigationRequest {
    pub fn get(url: Url, abort: AbortHandle) -> Self {
        Self {
            url,
            method: "GET".into(),
            headers: Vec::new(),
            body: None,
            abort,
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Whether the request is a GET-like (safe) method.
    pub fn is_get_like(&self) -> bool {
        matches!(self.method.as_str(), "GET" | "HEAD")
    }
}

/// Submission bodies. `FormData` and strings pass through to the platform
/// untouched; [`RequestBody::Json`] is serialized (and content-typed) by the
/// transport.
pub enum RequestBody {
    Text(String),
    Json(serde_json::Value),
    #[cfg(target_arch = "wasm32")]
    FormData(web_sys::FormData),
}

/// What came back, flattened to the parts the core consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerResponse {
    pub status: u16,
    pub ok: bool,
    /// Whether the platform fetch already followed an HTTP redirect.
    pub redirected: bool,
    /// The final response URL.
    pub url: String,
    /// Lowercased header names.
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl ServerResponse {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find_map(|(k, v)| (*k == name).then_some(v.as_str()))
    }

    /// The build id the server reported, if any.
    pub fn build_id(&self) -> Option<&str> {
        self.header(HEADER_BUILD_ID)
    }

    /// Whether the body is missing or whitespace-only.
    pub fn body_is_empty(&self) -> bool {
        self.body
            .as_deref()
            .map(|b| b.trim().is_empty())
            .unwrap_or(true)
    }
}

/// The object-safe transport trait.
pub trait ServerClient {
    fn send(
        &self,
        request: NavigationRequest,
    ) -> LocalBoxFuture<'static, Result<ServerResponse, ClientError>>;
}

/// The default transport for the current target.
pub(crate) fn default_client() -> Rc<dyn ServerClient> {
    #[cfg(target_arch = "wasm32")]
    {
        Rc::new(FetchClient)
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        Rc::new(UnconfiguredClient)
    }
}

/// Off the browser there is no ambient transport; anything that actually
/// tries to hit the network fails until a client is installed.
#[cfg(not(target_arch = "wasm32"))]
struct UnconfiguredClient;

#[cfg(not(target_arch = "wasm32"))]
impl ServerClient for UnconfiguredClient {
    fn send(
        &self,
        _request: NavigationRequest,
    ) -> LocalBoxFuture<'static, Result<ServerResponse, ClientError>> {
        Box::pin(async {
            Err(ClientError::Network(
                "no server client configured for this target".into(),
            ))
        })
    }
}

/// The browser transport, over `gloo_net`'s `fetch` bindings.
#[cfg(target_arch = "wasm32")]
pub struct FetchClient;

#[cfg(target_arch = "wasm32")]
impl ServerClient for FetchClient {
    fn send(
        &self,
        request: NavigationRequest,
    ) -> LocalBoxFuture<'static, Result<ServerResponse, ClientError>> {
        use gloo_net::http::{Method, RequestBuilder};

        Box::pin(async move {
            let method = match request.method.as_str() {
                "GET" => Method::GET,
                "HEAD" => Method::HEAD,
                "POST" => Method::POST,
                "PUT" => Method::PUT,
                "DELETE" => Method::DELETE,
                "PATCH" => Method::PATCH,
                "OPTIONS" => Method::OPTIONS,
                other => {
                    return Err(ClientError::Network(format!(
                        "unsupported method: {other}"
                    )))
                }
            };

            let abort = request.abort.clone();
            let signal = abort.signal();
            let mut builder = RequestBuilder::new(request.url.as_str())
                .method(method)
                .abort_signal(Some(&signal));
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }

            let built = match request.body {
                None => builder.build(),
                Some(RequestBody::Text(text)) => builder.body(text),
                Some(RequestBody::Json(value)) => {
                    let json = serde_json::to_string(&value)
                        .map_err(|e| ClientError::Network(e.to_string()))?;
                    builder
                        .header("content-type", "application/json")
                        .body(json)
                }
                Some(RequestBody::FormData(form_data)) => builder.body(form_data),
            }
            .map_err(|e| ClientError::Network(e.to_string()))?;

            let response = built.send().await.map_err(|e| {
                if abort.is_aborted() {
                    ClientError::Aborted
                } else {
                    ClientError::Network(e.to_string())
                }
            })?;

            let mut headers = Vec::new();
            for name in [
                HEADER_BUILD_ID,
                HEADER_CLIENT_REDIRECT,
                HEADER_RELOAD,
                "content-type",
            ] {
                if let Some(value) = response.headers().get(name) {
                    headers.push((name.to_string(), value));
                }
            }

            let status = response.status();
            let ok = response.ok();
            let redirected = response.redirected();
            let url = response.url();
            let body = response.text().await.ok();

            Ok(ServerResponse {
                status,
                ok,
                redirected,
                url,
                headers,
                body,
            })
        })
    }
}
