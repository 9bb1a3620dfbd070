//! A small set of DOM and scheduling utilities.
//!
//! Everything here is isomorphic: in the browser these call into the real
//! platform APIs, while on other targets (server-side rendering, unit tests)
//! timers resolve on the next executor tick and DOM access is a no-op.

use std::time::Duration;

#[cfg(not(target_arch = "wasm32"))]
use std::{cell::Cell, rc::Rc};
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::{prelude::Closure, JsCast, UnwrapThrowExt};

/// Returns the browser [`Window`](https://developer.mozilla.org/en-US/docs/Web/API/Window).
#[cfg(target_arch = "wasm32")]
pub fn window() -> web_sys::Window {
    web_sys::window().expect_throw("could not access `window`")
}

/// Returns the browser [`Document`](https://developer.mozilla.org/en-US/docs/Web/API/Document).
#[cfg(target_arch = "wasm32")]
pub fn document() -> web_sys::Document {
    window().document().expect_throw("could not access `document`")
}

/// A monotonic timestamp in milliseconds.
///
/// Uses [`Performance.now`](https://developer.mozilla.org/en-US/docs/Web/API/Performance/now)
/// in the browser, falling back to `Date.now()` if the performance API is
/// unavailable.
pub fn now() -> f64 {
    #[cfg(target_arch = "wasm32")]
    {
        window()
            .performance()
            .map(|p| p.now())
            .unwrap_or_else(js_sys::Date::now)
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        use std::time::Instant;
        thread_local! {
            static START: Instant = Instant::now();
        }
        START.with(|start| start.elapsed().as_secs_f64() * 1000.0)
    }
}

/// Wall-clock time in milliseconds since the Unix epoch.
pub fn unix_ms() -> f64 {
    #[cfg(target_arch = "wasm32")]
    {
        js_sys::Date::now()
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64() * 1000.0)
            .unwrap_or_default()
    }
}

/// Handle that is generated by [`set_timeout_with_handle`] and can be used to
/// clear the timeout.
#[derive(Clone, Debug)]
pub struct TimeoutHandle {
    #[cfg(target_arch = "wasm32")]
    id: i32,
    #[cfg(not(target_arch = "wasm32"))]
    cancelled: Rc<Cell<bool>>,
}

impl TimeoutHandle {
    /// Cancels the timeout to which this refers.
    /// See [`clearTimeout()`](https://developer.mozilla.org/en-US/docs/Web/API/clearTimeout)
    pub fn clear(&self) {
        #[cfg(target_arch = "wasm32")]
        window().clear_timeout_with_handle(self.id);
        #[cfg(not(target_arch = "wasm32"))]
        self.cancelled.set(true);
    }
}

/// Executes the given function after the given duration of time has passed.
/// See [`setTimeout()`](https://developer.mozilla.org/en-US/docs/Web/API/setTimeout).
pub fn set_timeout(cb: impl FnOnce() + 'static, duration: Duration) {
    _ = set_timeout_with_handle(cb, duration);
}

/// Executes the given function after the given duration of time has passed,
/// returning a cancelable handle.
///
/// Outside the browser the duration is not observable: the callback runs on
/// the next tick of the configured executor, which preserves ordering (and
/// lets tests drive it deterministically) without a real timer wheel.
pub fn set_timeout_with_handle(
    cb: impl FnOnce() + 'static,
    duration: Duration,
) -> Result<TimeoutHandle, ()> {
    #[cfg(target_arch = "wasm32")]
    {
        let cb = Closure::once_into_js(cb);
        window()
            .set_timeout_with_callback_and_timeout_and_arguments_0(
                cb.as_ref().unchecked_ref(),
                duration.as_millis().try_into().unwrap_throw(),
            )
            .map(|id| TimeoutHandle { id })
            .map_err(|_| ())
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        _ = duration;
        let cancelled = Rc::new(Cell::new(false));
        let handle = TimeoutHandle {
            cancelled: Rc::clone(&cancelled),
        };
        any_spawner::Executor::spawn_local(async move {
            yield_now().await;
            if !cancelled.get() {
                cb();
            }
        });
        Ok(handle)
    }
}

/// Runs the given function before the next repaint, using
/// [`Window.requestAnimationFrame`](https://developer.mozilla.org/en-US/docs/Web/API/window/requestAnimationFrame).
pub fn request_animation_frame(cb: impl FnOnce() + 'static) {
    #[cfg(target_arch = "wasm32")]
    {
        let cb = Closure::once_into_js(cb);
        _ = window().request_animation_frame(cb.as_ref().unchecked_ref());
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        any_spawner::Executor::spawn_local(async move {
            yield_now().await;
            cb();
        });
    }
}

/// A future that returns `Pending` exactly once, then completes.
#[cfg(not(target_arch = "wasm32"))]
fn yield_now() -> impl std::future::Future<Output = ()> {
    use std::{
        future::Future,
        pin::Pin,
        task::{Context, Poll},
    };

    #[derive(Default)]
    struct YieldNow(bool);

    impl Future for YieldNow {
        type Output = ();

        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
            if self.0 {
                Poll::Ready(())
            } else {
                self.0 = true;
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }

    YieldNow::default()
}

/// Adds an event listener to the `Window`, typed as a generic `Event`,
/// returning a cancelable handle.
#[cfg(target_arch = "wasm32")]
pub fn window_event_listener_untyped(
    event_name: &str,
    cb: impl Fn(web_sys::Event) + 'static,
) -> WindowListenerHandle {
    let cb = Closure::wrap(Box::new(cb) as Box<dyn Fn(web_sys::Event)>).into_js_value();
    _ = window().add_event_listener_with_callback(event_name, cb.unchecked_ref());
    let event_name = event_name.to_string();
    WindowListenerHandle(Box::new(move || {
        _ = window().remove_event_listener_with_callback(&event_name, cb.unchecked_ref());
    }))
}

/// A handle that can be called to remove a global event listener.
pub struct WindowListenerHandle(Box<dyn FnOnce()>);

impl std::fmt::Debug for WindowListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("WindowListenerHandle").finish()
    }
}

impl WindowListenerHandle {
    /// Removes the event listener.
    pub fn remove(self) {
        (self.0)()
    }
}
