//! Tokio timers for the native host
//!
//! Everything runs on a current-thread runtime inside a `LocalSet`, the same
//! single-threaded model the browser gives us.

use std::rc::Rc;
use std::time::Duration;

use tokio::task::{JoinHandle, spawn_local};
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use crate::driver::{SharedLifecycle, live_poll_once};
use crate::market::{PollLease, PriceFeed};

/// Recurring live poll for one lease
///
/// The first poll fires one interval after spawning. Each tick spawns its
/// fetch as a separate task, so a slow response never delays the next tick.
/// The loop exits on the first tick after its lease is revoked, and dropping
/// the handle aborts it immediately.
pub struct LivePollTask {
    lease: PollLease,
    handle: JoinHandle<()>,
}

impl LivePollTask {
    /// Must be called from inside a `LocalSet`
    pub fn spawn<F: PriceFeed + 'static>(
        lifecycle: SharedLifecycle,
        feed: Rc<F>,
        lease: PollLease,
    ) -> Self {
        let period = Duration::from_millis(lease.interval_ms);
        let handle = spawn_local(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !lifecycle.borrow().is_lease_current(&lease) {
                    break;
                }
                let (lifecycle, feed) = (lifecycle.clone(), feed.clone());
                spawn_local(async move {
                    let _ = live_poll_once(&lifecycle, &*feed, lease).await;
                });
            }
            log::debug!("Live poll timer for session {} exited", lease.session.0);
        });
        Self { lease, handle }
    }

    pub fn lease(&self) -> PollLease {
        self.lease
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for LivePollTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
