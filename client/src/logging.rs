//! Console logging for the navigation core.
//!
//! In the browser everything goes through `web_sys::console`, so navigation
//! diagnostics land next to the host application's own logs. On other
//! targets (server-side rendering, the native test suites) messages fall
//! back to standard output/error, keeping test logs readable.

use wasm_bindgen::JsValue;

/// Formats and logs a message at info level.
#[macro_export]
macro_rules! log {
    ($($t:tt)*) => ($crate::logging::console_log(&format_args!($($t)*).to_string()))
}

/// Formats and logs a warning.
#[macro_export]
macro_rules! warn {
    ($($t:tt)*) => ($crate::logging::console_warn(&format_args!($($t)*).to_string()))
}

/// Formats and logs an error.
#[macro_export]
macro_rules! error {
    ($($t:tt)*) => ($crate::logging::console_error(&format_args!($($t)*).to_string()))
}

/// Formats and logs a warning in debug builds; compiles to nothing (beyond
/// evaluating its format arguments' captures) in release builds.
#[macro_export]
macro_rules! debug_warn {
    ($($t:tt)*) => {{
        #[cfg(debug_assertions)]
        $crate::warn!($($t)*);
        #[cfg(not(debug_assertions))]
        {
            _ = format_args!($($t)*);
        }
    }}
}

#[derive(Clone, Copy)]
enum Level {
    Info,
    Warn,
    Error,
}

const fn in_browser() -> bool {
    cfg!(all(
        target_arch = "wasm32",
        not(any(target_os = "emscripten", target_os = "wasi"))
    ))
}

fn write(level: Level, s: &str) {
    if in_browser() {
        let msg = JsValue::from_str(s);
        match level {
            Level::Info => web_sys::console::log_1(&msg),
            Level::Warn => web_sys::console::warn_1(&msg),
            Level::Error => web_sys::console::error_1(&msg),
        }
    } else {
        match level {
            #[allow(clippy::print_stdout)]
            Level::Info => println!("{s}"),
            Level::Warn | Level::Error => eprintln!("{s}"),
        }
    }
}

/// Logs a message to the console (stdout off the browser).
pub fn console_log(s: &str) {
    write(Level::Info, s);
}

/// Logs a warning to the console (stderr off the browser).
pub fn console_warn(s: &str) {
    write(Level::Warn, s);
}

/// Logs an error to the console (stderr off the browser).
pub fn console_error(s: &str) {
    write(Level::Error, s);
}
