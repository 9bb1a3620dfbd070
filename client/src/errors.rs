//! Error types for navigations, submissions, and the transport layer.

use thiserror::Error;

/// Errors surfaced by the transport layer ([`crate::client::ServerClient`]).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The request's cancel token fired.
    #[error("Aborted")]
    Aborted,
    /// The fetch itself failed (DNS, connection reset, CORS, ...).
    #[error("network error: {0}")]
    Network(String),
}

/// Everything that can go wrong between starting a navigation and committing
/// it. Aborts are swallowed silently; the rest are logged once and leave the
/// current page untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NavigationError {
    /// The navigation's cancel token fired.
    #[error("Aborted")]
    Aborted,
    /// The underlying fetch failed.
    #[error("network error: {0}")]
    Network(String),
    /// The server said OK but sent nothing to render.
    #[error("response body was empty")]
    EmptyBody,
    /// Non-OK response status (other than 304).
    #[error("unexpected response status {0}")]
    NetworkStatus(u16),
    /// The response body was not the JSON document we expected.
    #[error("could not deserialize response: {0}")]
    Deserialization(String),
    /// A soft-redirect chain exceeded the fixed depth limit.
    #[error("too many redirects")]
    TooManyRedirects,
}

impl From<ClientError> for NavigationError {
    fn from(value: ClientError) -> Self {
        match value {
            ClientError::Aborted => NavigationError::Aborted,
            ClientError::Network(msg) => NavigationError::Network(msg),
        }
    }
}

/// Errors returned from [`crate::submit`]. The `Display` impl is the
/// user-visible error string (`"Aborted"`, `"404"`, ...).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// The submission was aborted, either explicitly or by a deduplicating
    /// resubmission.
    #[error("Aborted")]
    Aborted,
    /// The server answered with a non-OK status.
    #[error("{0}")]
    Status(u16),
    /// The fetch failed or the response was unusable.
    #[error("{0}")]
    Network(String),
}

impl From<ClientError> for SubmitError {
    fn from(value: ClientError) -> Self {
        match value {
            ClientError::Aborted => SubmitError::Aborted,
            ClientError::Network(msg) => SubmitError::Network(msg),
        }
    }
}

/// Failures inside the commit step. These force the navigation's phase to
/// `Complete` and leave the visible page unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// The host's module loader could not resolve an import URL.
    #[error("module load failed: {0}")]
    ModuleLoad(String),
    /// The host's re-render callback reported failure.
    #[error("re-render failed: {0}")]
    Render(String),
}
