//! Shared harness for the navigation scenario tests: a scripted transport,
//! an executor pump, and payload builders.

#![allow(dead_code)]

use futures::{future::LocalBoxFuture, FutureExt};
use serde_json::json;
use std::{
    cell::RefCell,
    collections::VecDeque,
    future::Future,
    rc::Rc,
};
use vorma_client::{
    ClientError, ClientOptions, NavigationRequest, ServerClient, ServerResponse,
};

/// One recorded request, flattened for assertions.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
}

/// A scripted response step.
pub enum Script {
    /// Resolve immediately with this response.
    Respond(ServerResponse),
    /// Resolve when (and if) the test releases the paired sender; abortable
    /// in the meantime.
    Manual(futures::channel::oneshot::Receiver<ServerResponse>),
}

/// A `ServerClient` that records every request and replays a script,
/// falling back to a default payload once the script is exhausted.
pub struct StubClient {
    pub requests: Rc<RefCell<Vec<RecordedRequest>>>,
    script: RefCell<VecDeque<Script>>,
    fallback: ServerResponse,
}

impl StubClient {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            requests: Rc::new(RefCell::new(Vec::new())),
            script: RefCell::new(VecDeque::new()),
            fallback: ok_response(payload_json("Home", &["/"])),
        })
    }

    pub fn push(&self, step: Script) {
        self.script.borrow_mut().push_back(step);
    }

    pub fn request_count(&self) -> usize {
        self.requests.borrow().len()
    }
}

impl ServerClient for StubClient {
    fn send(
        &self,
        request: NavigationRequest,
    ) -> LocalBoxFuture<'static, Result<ServerResponse, ClientError>> {
        self.requests.borrow_mut().push(RecordedRequest {
            url: request.url.to_string(),
            method: request.method.clone(),
            headers: request.headers.clone(),
        });
        let step = self.script.borrow_mut().pop_front();
        let abort = request.abort.clone();
        match step {
            None => {
                let response = self.fallback.clone();
                Box::pin(async move { Ok(response) })
            }
            Some(Script::Respond(response)) => Box::pin(async move { Ok(response) }),
            Some(Script::Manual(rx)) => Box::pin(async move {
                let aborted = abort.aborted().fuse();
                futures::pin_mut!(aborted);
                let mut rx = rx.fuse();
                futures::select! {
                    response = rx => match response {
                        Ok(response) => Ok(response),
                        Err(_) => Err(ClientError::Network("script hung up".into())),
                    },
                    _ = aborted => Err(ClientError::Aborted),
                }
            }),
        }
    }
}

/// Initializes the executor and a clean runtime with the given build id,
/// installing a fresh stub transport. Returns the stub.
pub fn setup() -> Rc<StubClient> {
    _ = any_spawner::Executor::init_futures_executor();
    vorma_client::runtime::reset();
    vorma_client::init(ClientOptions::builder().build_id("b1").build());
    let stub = StubClient::new();
    vorma_client::set_server_client(stub.clone());
    stub
}

/// Runs queued local tasks until nothing more can make progress.
pub fn pump() {
    for _ in 0..50 {
        any_spawner::Executor::poll_local();
    }
}

/// Spawns a future and exposes its eventual output to the test.
pub fn spawn_result<F, T>(fut: F) -> Rc<RefCell<Option<T>>>
where
    F: Future<Output = T> + 'static,
    T: 'static,
{
    let slot = Rc::new(RefCell::new(None));
    let out = Rc::clone(&slot);
    any_spawner::Executor::spawn_local(async move {
        *out.borrow_mut() = Some(fut.await);
    });
    slot
}

/// A minimal route payload for the given patterns.
pub fn payload_json(title: &str, patterns: &[&str]) -> String {
    let import_urls: Vec<String> = patterns
        .iter()
        .enumerate()
        .map(|(i, _)| format!("/chunks/route{i}.js"))
        .collect();
    let export_keys: Vec<&str> = patterns.iter().map(|_| "default").collect();
    json!({
        "matchedPatterns": patterns,
        "loadersData": patterns.iter().map(|_| serde_json::Value::Null).collect::<Vec<_>>(),
        "importURLs": import_urls,
        "exportKeys": export_keys,
        "errorExportKeys": patterns.iter().map(|_| "").collect::<Vec<_>>(),
        "hasRootData": false,
        "params": {},
        "splatValues": [],
        "title": { "dangerousInnerHTML": title },
    })
    .to_string()
}

/// A 200 response carrying the current build id and the given body.
pub fn ok_response(body: String) -> ServerResponse {
    ServerResponse {
        status: 200,
        ok: true,
        redirected: false,
        url: String::new(),
        headers: vec![("x-vorma-build-id".into(), "b1".into())],
        body: Some(body),
    }
}

/// A response signalling a soft redirect.
pub fn client_redirect_response(to: &str) -> ServerResponse {
    ServerResponse {
        status: 200,
        ok: true,
        redirected: false,
        url: String::new(),
        headers: vec![
            ("x-vorma-build-id".into(), "b1".into()),
            ("x-client-redirect".into(), to.into()),
        ],
        body: None,
    }
}

/// A manual (test-released) script step; returns the release handle.
pub fn manual_step(stub: &StubClient) -> futures::channel::oneshot::Sender<ServerResponse> {
    let (tx, rx) = futures::channel::oneshot::channel();
    stub.push(Script::Manual(rx));
    tx
}
