//! Cancel tokens for navigations and submissions.
//!
//! In the browser the token wraps an
//! [`AbortController`](https://developer.mozilla.org/en-US/docs/Web/API/AbortController)
//! so cancellation propagates into `fetch`. Elsewhere the same type is a
//! plain flag plus wakeups, which is all client loaders and scripted
//! transports need.

use futures::channel::oneshot;
use std::{
    cell::{Cell, RefCell},
    future::Future,
    rc::Rc,
};
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::UnwrapThrowExt;

/// A cloneable cancel token. All clones observe the same abort.
#[derive(Clone)]
pub struct AbortHandle {
    inner: Rc<AbortInner>,
}

struct AbortInner {
    aborted: Cell<bool>,
    reason: RefCell<Option<String>>,
    waiters: RefCell<Vec<oneshot::Sender<()>>>,
    #[cfg(target_arch = "wasm32")]
    controller: web_sys::AbortController,
}

impl Default for AbortHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortHandle {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(AbortInner {
                aborted: Cell::new(false),
                reason: RefCell::new(None),
                waiters: RefCell::new(Vec::new()),
                #[cfg(target_arch = "wasm32")]
                controller: web_sys::AbortController::new()
                    .expect_throw("could not create `AbortController`"),
            }),
        }
    }

    /// Fires the token. Later calls are no-ops; the first reason wins.
    pub fn abort(&self, reason: &str) {
        if self.inner.aborted.replace(true) {
            return;
        }
        *self.inner.reason.borrow_mut() = Some(reason.to_string());
        #[cfg(target_arch = "wasm32")]
        self.inner.controller.abort();
        for waiter in self.inner.waiters.borrow_mut().drain(..) {
            _ = waiter.send(());
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.get()
    }

    /// The reason passed to [`abort`](Self::abort), if the token has fired.
    pub fn reason(&self) -> Option<String> {
        self.inner.reason.borrow().clone()
    }

    /// The signal to hand to `fetch`.
    #[cfg(target_arch = "wasm32")]
    pub fn signal(&self) -> web_sys::AbortSignal {
        self.inner.controller.signal()
    }

    /// Resolves when the token fires. Never resolves if it never does.
    pub fn aborted(&self) -> impl Future<Output = ()> {
        let rx = if self.inner.aborted.get() {
            None
        } else {
            let (tx, rx) = oneshot::channel();
            self.inner.waiters.borrow_mut().push(tx);
            Some(rx)
        };
        async move {
            match rx {
                None => {}
                Some(rx) => {
                    if rx.await.is_err() {
                        // every clone of the token is gone; nothing can fire it now
                        futures::future::pending::<()>().await;
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for AbortHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbortHandle")
            .field("aborted", &self.inner.aborted.get())
            .finish_non_exhaustive()
    }
}
