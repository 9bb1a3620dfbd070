//! Global busy-indicator state, derived from the live navigation slots.
//!
//! Every slot mutation and phase transition schedules a debounced dispatch;
//! the dispatcher re-derives the status at fire time, compares against the
//! last dispatched value, and suppresses duplicates. [`get_status`] itself is
//! never debounced: it always derives from live state.

use crate::{helpers, runtime};
use std::time::Duration;

/// One dispatch per debounce window, which collapses the flurry of
/// per-phase micro-events to at most one UI update per animation frame.
pub(crate) const STATUS_DEBOUNCE: Duration = Duration::from_millis(8);

/// The shape of the `status` event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Status {
    /// A user-visible navigation is underway.
    pub is_navigating: bool,
    /// At least one submission without `skip_global_loading_indicator` is
    /// in flight.
    pub is_submitting: bool,
    /// A revalidation is underway.
    pub is_revalidating: bool,
}

impl Status {
    /// Whether any part of the indicator is lit.
    pub fn is_busy(&self) -> bool {
        self.is_navigating || self.is_submitting || self.is_revalidating
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatusDispatchState {
    pub scheduled: bool,
    pub last: Option<Status>,
}

/// Derives the live status. Not debounced.
pub fn get_status() -> Status {
    runtime::with(|rt| {
        let nav = rt.nav.borrow();
        Status {
            is_navigating: nav
                .active
                .as_ref()
                .map(|entry| {
                    entry.intent() == crate::nav::NavigationIntent::Navigate
                        && entry.phase() != crate::nav::NavigationPhase::Complete
                })
                .unwrap_or(false),
            is_submitting: nav
                .submissions
                .iter()
                .any(|submission| !submission.skip_indicator),
            is_revalidating: nav
                .revalidation
                .as_ref()
                .map(|entry| entry.phase() != crate::nav::NavigationPhase::Complete)
                .unwrap_or(false),
        }
    })
}

/// Schedules a debounced status dispatch. Repeat calls within the window
/// fold into the pending one.
pub(crate) fn schedule_status_dispatch() {
    let newly_scheduled = runtime::with(|rt| {
        let mut state = rt.status.borrow_mut();
        !std::mem::replace(&mut state.scheduled, true)
    });
    if newly_scheduled {
        helpers::set_timeout(dispatch_now, STATUS_DEBOUNCE);
    }
}

fn dispatch_now() {
    let status = get_status();
    let changed = runtime::with(|rt| {
        let mut state = rt.status.borrow_mut();
        state.scheduled = false;
        if state.last == Some(status) {
            false
        } else {
            state.last = Some(status);
            true
        }
    });
    if changed {
        runtime::with(|rt| rt.bus.borrow().emit_status(&status));
    }
}
