//! Async glue between a [`PriceFeed`] and the lifecycle
//!
//! Each function takes a ticket from the lifecycle, performs the fetch, and
//! hands the result back. The lifecycle is only borrowed before and after the
//! await, never across it, so any number of these can be in flight on one
//! thread while the frame loop keeps running.

use std::cell::RefCell;
use std::rc::Rc;

use crate::lifecycle::{LifecycleError, SessionLifecycle};
use crate::market::{EntryOutcome, LiveOutcome, PollLease, PriceFeed};
use crate::platform::now_ms;

/// Lifecycle shared between the frame loop and the network clock
pub type SharedLifecycle = Rc<RefCell<SessionLifecycle>>;

pub fn shared(lifecycle: SessionLifecycle) -> SharedLifecycle {
    Rc::new(RefCell::new(lifecycle))
}

/// Select a token and wait for its entry fetch
pub async fn select_token<F: PriceFeed>(
    lifecycle: &SharedLifecycle,
    feed: &F,
    token_id: &str,
) -> Result<EntryOutcome, LifecycleError> {
    let ticket = lifecycle.borrow_mut().select_token(token_id, now_ms())?;
    let result = feed.fetch(&ticket.token_reference).await;
    Ok(lifecycle.borrow_mut().complete_entry(ticket, result, now_ms()))
}

/// Restart the current token with a fresh entry fetch
pub async fn restart<F: PriceFeed>(
    lifecycle: &SharedLifecycle,
    feed: &F,
) -> Result<EntryOutcome, LifecycleError> {
    let ticket = lifecycle.borrow_mut().restart(now_ms())?;
    let result = feed.fetch(&ticket.token_reference).await;
    Ok(lifecycle.borrow_mut().complete_entry(ticket, result, now_ms()))
}

/// One live poll for the timer holding `lease`
///
/// Returns `None` once the lease has been revoked; the timer should stop.
pub async fn live_poll_once<F: PriceFeed>(
    lifecycle: &SharedLifecycle,
    feed: &F,
    lease: PollLease,
) -> Option<LiveOutcome> {
    let ticket = lifecycle.borrow_mut().issue_live_poll(&lease)?;
    let result = feed.fetch(&ticket.token_reference).await;
    Some(
        lifecycle
            .borrow_mut()
            .complete_live_poll(ticket, result, now_ms()),
    )
}

/// Validate, verify and insert a user-supplied token address
pub async fn add_custom_token<F: PriceFeed>(
    lifecycle: &SharedLifecycle,
    feed: &F,
    reference: &str,
    name: Option<&str>,
) -> Result<String, LifecycleError> {
    let reference = lifecycle.borrow().check_custom_token(reference)?;
    let verification = feed.fetch(&reference).await;
    lifecycle
        .borrow_mut()
        .finish_custom_token(&reference, name, verification, now_ms())
}

/// Refresh dashboard previews for every token except the active one
pub async fn refresh_previews<F: PriceFeed>(lifecycle: &SharedLifecycle, feed: &F) {
    let targets = lifecycle.borrow().preview_targets();
    for (id, reference) in targets {
        let result = feed.fetch(&reference).await;
        lifecycle.borrow_mut().record_preview(&id, result);
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use std::collections::VecDeque;

    use tokio::sync::oneshot;
    use tokio::task::{LocalSet, spawn_local, yield_now};

    use super::*;
    use crate::lifecycle::Screen;
    use crate::market::{FeedError, FeedSnapshot, SessionStatus};
    use crate::settings::Settings;

    type Reply = Result<FeedSnapshot, FeedError>;

    /// Feed whose responses are released by the test, in any order
    #[derive(Default)]
    struct ScriptedFeed {
        replies: RefCell<VecDeque<oneshot::Receiver<Reply>>>,
        calls: RefCell<Vec<String>>,
    }

    impl ScriptedFeed {
        /// Queue the next fetch; it resolves when the sender fires
        fn expect(&self) -> oneshot::Sender<Reply> {
            let (tx, rx) = oneshot::channel();
            self.replies.borrow_mut().push_back(rx);
            tx
        }

        fn calls(&self) -> usize {
            self.calls.borrow().len()
        }
    }

    impl PriceFeed for ScriptedFeed {
        async fn fetch(&self, token_reference: &str) -> Reply {
            self.calls.borrow_mut().push(token_reference.to_string());
            let reply = self.replies.borrow_mut().pop_front();
            match reply {
                Some(rx) => rx
                    .await
                    .unwrap_or_else(|_| Err(FeedError::Transport("dropped".to_string()))),
                None => Err(FeedError::Transport("unscripted".to_string())),
            }
        }
    }

    fn snapshot(value: f64) -> FeedSnapshot {
        FeedSnapshot {
            metric_value: value,
            display_symbol: "TEST".to_string(),
            icon_url: None,
            pair_label: None,
            liquidity_value: 1.0,
            unit_price: 1.0,
        }
    }

    /// Let spawned tasks run until the feed has seen `calls` requests
    async fn until_calls(feed: &ScriptedFeed, calls: usize) {
        while feed.calls() < calls {
            yield_now().await;
        }
    }

    fn setup() -> (SharedLifecycle, Rc<ScriptedFeed>) {
        (
            shared(SessionLifecycle::new(Settings::default())),
            Rc::new(ScriptedFeed::default()),
        )
    }

    async fn ready(lifecycle: &SharedLifecycle, feed: &ScriptedFeed, token: &str, value: f64) -> PollLease {
        let tx = feed.expect();
        let _ = tx.send(Ok(snapshot(value)));
        match select_token(lifecycle, feed, token).await {
            Ok(EntryOutcome::Ready(lease)) => lease,
            other => panic!("expected ready, got {:?}", other),
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_slow_entry_for_old_token_is_discarded() {
        LocalSet::new()
            .run_until(async {
                let (lc, feed) = setup();
                let tx_a = feed.expect();
                let tx_b = feed.expect();

                let a = spawn_local({
                    let (lc, feed) = (lc.clone(), feed.clone());
                    async move { select_token(&lc, &*feed, "bonk").await }
                });
                until_calls(&feed, 1).await;
                let b = spawn_local({
                    let (lc, feed) = (lc.clone(), feed.clone());
                    async move { select_token(&lc, &*feed, "wif").await }
                });
                until_calls(&feed, 2).await;

                let _ = tx_b.send(Ok(snapshot(200.0)));
                assert!(matches!(b.await.unwrap(), Ok(EntryOutcome::Ready(_))));
                let _ = tx_a.send(Ok(snapshot(100.0)));
                assert_eq!(a.await.unwrap(), Ok(EntryOutcome::Discarded));

                let lc = lc.borrow();
                let session = lc.session().unwrap();
                assert_eq!(session.token_id(), "wif");
                assert_eq!(session.baseline_value(), 200.0);
                assert_eq!(lc.screen(), Screen::Ready);
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_out_of_order_live_results() {
        LocalSet::new()
            .run_until(async {
                let (lc, feed) = setup();
                let lease = ready(&lc, &feed, "bonk", 100.0).await;

                let tx1 = feed.expect();
                let tx2 = feed.expect();
                let first = spawn_local({
                    let (lc, feed) = (lc.clone(), feed.clone());
                    async move { live_poll_once(&lc, &*feed, lease).await }
                });
                until_calls(&feed, 2).await;
                let second = spawn_local({
                    let (lc, feed) = (lc.clone(), feed.clone());
                    async move { live_poll_once(&lc, &*feed, lease).await }
                });
                until_calls(&feed, 3).await;

                let _ = tx2.send(Ok(snapshot(120.0)));
                assert_eq!(second.await.unwrap(), Some(LiveOutcome::Updated));
                let _ = tx1.send(Ok(snapshot(50.0)));
                assert_eq!(first.await.unwrap(), Some(LiveOutcome::Discarded));

                let lc = lc.borrow();
                let session = lc.session().unwrap();
                assert_eq!(session.current_value(), 120.0);
                assert!((session.multiplier() - 2.0).abs() < 1e-12);
                assert_eq!(session.history().len(), 2);
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_restart_performs_entry_fetch() {
        LocalSet::new()
            .run_until(async {
                let (lc, feed) = setup();
                ready(&lc, &feed, "bonk", 100.0).await;
                assert_eq!(feed.calls(), 1);

                let tx = feed.expect();
                let pending = spawn_local({
                    let (lc, feed) = (lc.clone(), feed.clone());
                    async move { restart(&lc, &*feed).await }
                });
                until_calls(&feed, 2).await;
                assert_eq!(lc.borrow().session().unwrap().status(), SessionStatus::Loading);

                let _ = tx.send(Ok(snapshot(130.0)));
                assert!(matches!(pending.await.unwrap(), Ok(EntryOutcome::Ready(_))));
                assert_eq!(lc.borrow().session().unwrap().baseline_value(), 130.0);
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_live_poll_after_menu_is_refused() {
        LocalSet::new()
            .run_until(async {
                let (lc, feed) = setup();
                let lease = ready(&lc, &feed, "bonk", 100.0).await;
                lc.borrow_mut().abandon_to_menu();
                assert_eq!(live_poll_once(&lc, &*feed, lease).await, None);
                assert_eq!(feed.calls(), 1);
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_add_custom_token_rejects_before_fetching() {
        let (lc, feed) = setup();
        let err = add_custom_token(&lc, &*feed, "bad address", None)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Catalog(_)));
        assert_eq!(feed.calls(), 0);

        let tx = feed.expect();
        let _ = tx.send(Ok(snapshot(42.0)));
        let id = add_custom_token(
            &lc,
            &*feed,
            "So11111111111111111111111111111111111111112",
            Some("Wrapped SOL"),
        )
        .await
        .unwrap();
        assert_eq!(
            lc.borrow().catalog().get(&id).map(|e| e.name.clone()),
            Some("Wrapped SOL".to_string())
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_refresh_previews_skips_active() {
        let (lc, feed) = setup();
        ready(&lc, &feed, "bonk", 100.0).await;
        for _ in 0..2 {
            let _ = feed.expect().send(Ok(snapshot(7.0)));
        }
        refresh_previews(&lc, &*feed).await;
        assert_eq!(feed.calls(), 3);
        let lc = lc.borrow();
        assert!(lc.catalog().get("wif").unwrap().preview.is_some());
        assert!(lc.catalog().get("bonk").unwrap().preview.is_none());
    }
}
