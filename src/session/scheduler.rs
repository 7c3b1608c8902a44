//! Per-session polling tasks.
//!
//! Every live session gets one task on the shared [`TaskTracker`]. The task
//! issues status queries one at a time, feeds answers into the store and
//! stops as soon as the session leaves the pollable states. After that it
//! keeps the finished session around for the retention window and evicts it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::state::{SessionState, Signal};
use super::store::{PollOutcome, SessionStore};
use super::types::{Provider, SessionId};
use crate::config::LoginConfig;
use crate::gateway::{PollMode, ProviderGateway};
use crate::util::timeout::with_timeout;

/// Spawns and owns the polling loops of every session.
#[derive(Clone)]
pub struct PollScheduler {
    gateway: Arc<dyn ProviderGateway>,
    store: Arc<SessionStore>,
    config: Arc<LoginConfig>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl PollScheduler {
    pub fn new(
        gateway: Arc<dyn ProviderGateway>,
        store: Arc<SessionStore>,
        config: Arc<LoginConfig>,
    ) -> Self {
        Self {
            gateway,
            store,
            config,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Token for a new session; cancelled with the scheduler.
    pub fn session_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Start polling `id` until it terminates or `token` is cancelled.
    pub fn spawn(&self, id: SessionId, provider: Provider, token: CancellationToken) {
        let this = self.clone();
        self.tracker.spawn(async move {
            this.poll_loop(&id, provider, &token).await;
            this.evict_after_retention(&id).await;
        });
    }

    /// Run an auxiliary task (e.g. an event forwarder) under the same tracker.
    pub fn spawn_task<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(task);
    }

    /// Cancel every task and wait until all of them have returned.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }

    /// Signal shutdown without waiting.
    pub(crate) fn cancel_all(&self) {
        self.shutdown.cancel();
    }

    async fn poll_loop(&self, id: &SessionId, provider: Provider, token: &CancellationToken) {
        let mode = self.gateway.poll_mode(provider);
        let mut failures: u32 = 0;
        debug!(session_id = %id, %provider, %mode, "poll loop started");

        loop {
            if token.is_cancelled() {
                debug!(session_id = %id, "session cancelled, stopping poll loop");
                return;
            }

            let ticket = match self.store.update(id, |entry| entry.begin_poll()) {
                Some(Ok(Some(ticket))) => ticket,
                Some(Ok(None)) | None => return,
                Some(Err(err)) => {
                    error!(session_id = %id, error = %err, "refusing to poll");
                    return;
                }
            };

            let started = tokio::time::Instant::now();
            // Session cancellation lets the query finish; shutdown does not.
            let result = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    let _ = self.store.update(id, |entry| entry.finish_poll(None, None));
                    return;
                }
                result = with_timeout(self.config.poll_timeout, self.gateway.poll_status(&ticket)) => result,
            };

            let mut backoff = None;
            let (signal, message) = match result {
                Ok(response) => {
                    failures = 0;
                    debug!(session_id = %id, status = %response.status, "poll answered");
                    (Some(Signal::Poll(response.status)), response.message)
                }
                Err(err) if err.is_retryable() => {
                    failures += 1;
                    if failures > self.config.max_transient_failures {
                        warn!(
                            session_id = %id,
                            attempt = failures,
                            error = %err,
                            "giving up after repeated transport failures"
                        );
                        (
                            Some(Signal::TransportExhausted),
                            Some(format!("{failures} consecutive poll failures, last: {err}")),
                        )
                    } else {
                        let delay = self.config.backoff.delay_for(failures);
                        warn!(
                            session_id = %id,
                            attempt = failures,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "poll failed, backing off"
                        );
                        backoff = Some(delay);
                        (None, None)
                    }
                }
                Err(err) => {
                    error!(session_id = %id, error = %err, "provider answer violates protocol");
                    (Some(Signal::ProtocolViolation), Some(err.to_string()))
                }
            };

            let outcome = match self.store.update(id, |entry| entry.finish_poll(signal, message)) {
                Some(Ok(outcome)) => outcome,
                None => return,
                Some(Err(err)) => {
                    error!(session_id = %id, error = %err, "poll answer rejected by state machine");
                    return;
                }
            };

            match outcome {
                PollOutcome::Discarded => {
                    debug!(session_id = %id, "discarding answer for cancelled session");
                    return;
                }
                PollOutcome::Released => {}
                PollOutcome::Applied(t) => {
                    if t.to == SessionState::Succeeded {
                        info!(session_id = %id, "login confirmed");
                    } else if t.changed() {
                        debug!(session_id = %id, from = %t.from, to = %t.to, "state changed");
                    }
                    if !t.polling() {
                        return;
                    }
                }
            }

            let delay = next_delay(backoff, mode, self.config.poll_interval, started.elapsed());
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else if !sleep_unless_cancelled(delay, token).await {
                debug!(session_id = %id, "session cancelled during delay");
                return;
            }
        }
    }

    async fn evict_after_retention(&self, id: &SessionId) {
        tokio::select! {
            _ = self.shutdown.cancelled() => {}
            _ = tokio::time::sleep(self.config.retention) => {
                if self.store.remove(id).is_some() {
                    debug!(session_id = %id, "evicted finished session");
                }
            }
        }
    }
}

/// Pause before the next poll.
///
/// Backoff wins. Interval providers always wait `poll_interval`. A long poll
/// that the provider held for at least `poll_interval` is re-issued at once;
/// one answered sooner is padded so polls never start closer than
/// `poll_interval` apart.
fn next_delay(
    backoff: Option<Duration>,
    mode: PollMode,
    poll_interval: Duration,
    held: Duration,
) -> Duration {
    match (backoff, mode) {
        (Some(delay), _) => delay,
        (None, PollMode::Interval) => poll_interval,
        (None, PollMode::LongPoll) => poll_interval.saturating_sub(held),
    }
}

/// Sleep for `delay`; returns `false` if `token` fired first.
async fn sleep_unless_cancelled(delay: Duration, token: &CancellationToken) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sleep_stops_early_on_cancel() {
        let token = CancellationToken::new();
        let child = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            child.cancel();
        });
        let started = tokio::time::Instant::now();
        assert!(!sleep_unless_cancelled(Duration::from_secs(30), &token).await);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn next_delay_pads_fast_long_polls_only() {
        let interval = Duration::from_secs(3);
        let long = PollMode::LongPoll;
        assert_eq!(next_delay(None, long, interval, Duration::ZERO), interval);
        assert_eq!(
            next_delay(None, long, interval, Duration::from_secs(1)),
            Duration::from_secs(2)
        );
        assert_eq!(next_delay(None, long, interval, Duration::from_secs(25)), Duration::ZERO);
        assert_eq!(
            next_delay(None, PollMode::Interval, interval, Duration::from_secs(25)),
            interval
        );
        let backoff = Some(Duration::from_secs(8));
        assert_eq!(next_delay(backoff, long, interval, Duration::ZERO), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_completes_without_cancel() {
        let token = CancellationToken::new();
        assert!(sleep_unless_cancelled(Duration::from_secs(2), &token).await);
    }
}
