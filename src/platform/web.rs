//! Browser timers and storage

use std::rc::Rc;

use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

use crate::driver::{SharedLifecycle, live_poll_once};
use crate::market::{PollLease, PriceFeed};

/// LocalStorage, if the page has one
pub fn local_storage() -> Option<web_sys::Storage> {
    web_sys::window()
        .and_then(|w| w.local_storage().ok())
        .flatten()
}

/// A `setInterval` registration, cleared on drop
pub struct IntervalHandle {
    id: i32,
    _closure: Closure<dyn FnMut()>,
}

impl IntervalHandle {
    pub fn new(period_ms: u64, callback: impl FnMut() + 'static) -> Option<Self> {
        let window = web_sys::window()?;
        let closure = Closure::<dyn FnMut()>::new(callback);
        let id = window
            .set_interval_with_callback_and_timeout_and_arguments_0(
                closure.as_ref().unchecked_ref(),
                period_ms.min(i32::MAX as u64) as i32,
            )
            .ok()?;
        Some(Self {
            id,
            _closure: closure,
        })
    }
}

impl Drop for IntervalHandle {
    fn drop(&mut self) {
        if let Some(window) = web_sys::window() {
            window.clear_interval_with_handle(self.id);
        }
    }
}

/// Browser counterpart of the native poll task
///
/// Each tick checks the lease before spawning a fetch; the owner drops the
/// handle once the lease is no longer current.
pub struct LivePollInterval {
    lease: PollLease,
    _interval: IntervalHandle,
}

impl LivePollInterval {
    pub fn spawn<F: PriceFeed + 'static>(
        lifecycle: SharedLifecycle,
        feed: Rc<F>,
        lease: PollLease,
    ) -> Option<Self> {
        let interval = IntervalHandle::new(lease.interval_ms, move || {
            if !lifecycle.borrow().is_lease_current(&lease) {
                return;
            }
            let (lifecycle, feed) = (lifecycle.clone(), feed.clone());
            wasm_bindgen_futures::spawn_local(async move {
                let _ = live_poll_once(&lifecycle, &*feed, lease).await;
            });
        })?;
        log::info!(
            "Browser poll timer started for session {} ({} ms)",
            lease.session.0,
            lease.interval_ms
        );
        Some(Self {
            lease,
            _interval: interval,
        })
    }

    pub fn lease(&self) -> PollLease {
        self.lease
    }
}
