//! JS-module and CSS-bundle preloading.
//!
//! Preloads are hints (`<link rel="modulepreload">`, `<link rel="preload"
//! as="style">`) inserted while a navigation is still in flight; stylesheets
//! are applied for real at commit. Every operation is idempotent per URL,
//! tracked both in the runtime registry and (in the browser) against the
//! live `<head>`.

use crate::{runtime, urls};
use futures::future::{FutureExt, LocalBoxFuture, Shared};
use std::collections::HashSet;

/// The attribute marking stylesheets the core manages.
pub const CSS_BUNDLE_ATTR: &str = "data-core-css-bundle";

/// URLs already handled, keyed by their raw (unresolved) form.
#[derive(Debug, Default)]
pub(crate) struct AssetRegistry {
    preloaded_modules: HashSet<String>,
    preloaded_css: HashSet<String>,
    applied_css: HashSet<String>,
}

/// A CSS preload in flight; resolves on the link's `load` event.
pub type CssPreload = Shared<LocalBoxFuture<'static, Result<(), String>>>;

/// Resolves an asset reference to a fetchable URL: against the dev server
/// origin in development, the public path prefix in production.
pub fn resolve_asset_url(url: &str) -> String {
    runtime::with(|rt| {
        let config = rt.config.borrow();
        if config.is_dev {
            match &config.dev_server_origin {
                Some(origin) => urls::join_asset_path(origin, url),
                None => urls::join_asset_path(&config.public_path_prefix, url),
            }
        } else {
            urls::join_asset_path(&config.public_path_prefix, url)
        }
    })
}

/// Inserts a `<link rel="modulepreload">` for the URL if one is not already
/// present. Idempotent.
pub fn preload_module(url: &str) {
    let fresh = runtime::with(|rt| {
        rt.assets
            .borrow_mut()
            .preloaded_modules
            .insert(url.to_string())
    });
    if !fresh {
        return;
    }

    #[cfg(target_arch = "wasm32")]
    {
        let resolved = resolve_asset_url(url);
        let head = match crate::helpers::document().head() {
            Some(head) => head,
            None => return,
        };
        let selector = format!("link[rel=\"modulepreload\"][href=\"{resolved}\"]");
        if matches!(head.query_selector(&selector), Ok(Some(_))) {
            return;
        }
        if let Ok(link) = crate::helpers::document().create_element("link") {
            _ = link.set_attribute("rel", "modulepreload");
            _ = link.set_attribute("href", &resolved);
            _ = head.append_child(&link);
        }
    }
}

/// Inserts a `<link rel="preload" as="style">` for the URL and returns a
/// future that resolves when the stylesheet has been fetched (or rejects,
/// as an `Err` string, if the fetch fails). URLs already preloaded resolve
/// immediately.
pub fn preload_css(url: &str) -> CssPreload {
    let fresh = runtime::with(|rt| {
        rt.assets
            .borrow_mut()
            .preloaded_css
            .insert(url.to_string())
    });
    if !fresh {
        return ready_ok();
    }

    #[cfg(target_arch = "wasm32")]
    {
        use futures::channel::oneshot;
        use std::{cell::RefCell, rc::Rc};
        use wasm_bindgen::{closure::Closure, JsCast};

        let resolved = resolve_asset_url(url);
        let head = match crate::helpers::document().head() {
            Some(head) => head,
            None => return ready_ok(),
        };
        let link = match crate::helpers::document().create_element("link") {
            Ok(link) => link,
            Err(_) => return ready_ok(),
        };
        _ = link.set_attribute("rel", "preload");
        _ = link.set_attribute("as", "style");
        _ = link.set_attribute("href", &resolved);

        let (tx, rx) = oneshot::channel::<Result<(), String>>();
        let tx = Rc::new(RefCell::new(Some(tx)));

        let on_load = {
            let tx = Rc::clone(&tx);
            Closure::wrap(Box::new(move |_: web_sys::Event| {
                if let Some(tx) = tx.borrow_mut().take() {
                    _ = tx.send(Ok(()));
                }
            }) as Box<dyn FnMut(web_sys::Event)>)
            .into_js_value()
        };
        let on_error = {
            let tx = Rc::clone(&tx);
            let resolved = resolved.clone();
            Closure::wrap(Box::new(move |_: web_sys::Event| {
                if let Some(tx) = tx.borrow_mut().take() {
                    _ = tx.send(Err(format!("failed to preload {resolved}")));
                }
            }) as Box<dyn FnMut(web_sys::Event)>)
            .into_js_value()
        };
        _ = link.add_event_listener_with_callback("load", on_load.unchecked_ref());
        _ = link.add_event_listener_with_callback("error", on_error.unchecked_ref());
        _ = head.append_child(&link);

        let fut: LocalBoxFuture<'static, Result<(), String>> =
            Box::pin(async move { rx.await.unwrap_or(Ok(())) });
        fut.shared()
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        ready_ok()
    }
}

/// Appends `<link rel="stylesheet">` elements for every bundle not already
/// applied. The raw bundle URL is recorded in [`CSS_BUNDLE_ATTR`] so repeat
/// applications (and server-rendered bundles) are recognized.
pub fn apply_css(urls: &[String]) {
    for url in urls {
        let fresh =
            runtime::with(|rt| rt.assets.borrow_mut().applied_css.insert(url.to_string()));
        if !fresh {
            continue;
        }

        #[cfg(target_arch = "wasm32")]
        {
            let head = match crate::helpers::document().head() {
                Some(head) => head,
                None => continue,
            };
            let selector = format!("link[rel=\"stylesheet\"][{CSS_BUNDLE_ATTR}=\"{url}\"]");
            if matches!(head.query_selector(&selector), Ok(Some(_))) {
                continue;
            }
            if let Ok(link) = crate::helpers::document().create_element("link") {
                _ = link.set_attribute("rel", "stylesheet");
                _ = link.set_attribute("href", &resolve_asset_url(url));
                _ = link.set_attribute(CSS_BUNDLE_ATTR, url);
                _ = head.append_child(&link);
            }
        }
    }
}

fn ready_ok() -> CssPreload {
    let fut: LocalBoxFuture<'static, Result<(), String>> = Box::pin(async { Ok(()) });
    fut.shared()
}
