//! State-change events and subscriptions.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::state::SessionState;
use super::types::SessionId;

/// One observed state transition of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionEvent {
    pub session_id: SessionId,
    /// Per-session sequence number, starting at 1.
    pub seq: u64,
    pub from: SessionState,
    pub to: SessionState,
    pub message: Option<String>,
    pub at: DateTime<Utc>,
}

impl SessionEvent {
    pub fn is_terminal(&self) -> bool {
        self.to.is_terminal()
    }
}

/// Callback used for push-style delivery of session events.
pub type SessionEventSink = Arc<dyn Fn(SessionEvent) + Send + Sync>;

/// Ordered stream of a single session's events.
///
/// The stream ends after the terminal event. Dropping it unsubscribes.
#[derive(Debug)]
pub struct SessionEvents {
    rx: UnboundedReceiverStream<SessionEvent>,
}

impl SessionEvents {
    pub(crate) fn channel() -> (mpsc::UnboundedSender<SessionEvent>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            Self {
                rx: UnboundedReceiverStream::new(rx),
            },
        )
    }

    /// A stream that has already ended.
    pub(crate) fn closed() -> Self {
        let (_tx, events) = Self::channel();
        events
    }

    /// Next event, or `None` once the session terminated and every event was
    /// delivered.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.rx.as_mut().recv().await
    }

    /// Next already-delivered event, without waiting.
    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        self.rx.as_mut().try_recv().ok()
    }

    /// Drain every remaining event until the stream ends.
    pub async fn collect_all(mut self) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Some(event) = self.rx.as_mut().recv().await {
            out.push(event);
        }
        out
    }
}

impl Stream for SessionEvents {
    type Item = SessionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx).poll_next(cx)
    }
}

/// Handle for a callback subscription created by
/// [`SessionManager::subscribe_with`](super::SessionManager::subscribe_with).
///
/// Unsubscribing stops delivery; it never cancels the session.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: Uuid,
    token: CancellationToken,
}

impl Subscription {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self {
            id: Uuid::new_v4(),
            token,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn unsubscribe(&self) {
        self.token.cancel();
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }
}
