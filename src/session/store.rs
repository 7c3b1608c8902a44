//! In-memory session registry.
//!
//! The map lock is only held long enough to find an entry; every mutation
//! then runs under that session's own mutex. Two transitions of the same
//! session are therefore serialized while different sessions proceed in
//! parallel.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::events::{SessionEvent, SessionEvents};
use super::state::{transition, SessionState, Signal, Transition};
use super::types::{Session, SessionId};
use crate::error::LoginError;
use crate::gateway::SessionTicket;

/// How many past session ids are remembered for reuse detection.
pub const ISSUED_HISTORY: usize = 4096;

/// Result of finishing a status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The session was cancelled while the query was in flight; the answer
    /// was thrown away.
    Discarded,
    /// The query ended without a provider answer (transient fault).
    Released,
    /// The answer was fed into the state machine.
    Applied(Transition),
}

/// Everything the store owns for one session.
#[derive(Debug)]
pub struct SessionEntry {
    session: Session,
    ticket: SessionTicket,
    cancel: CancellationToken,
    subscribers: Vec<mpsc::UnboundedSender<SessionEvent>>,
    seq: u64,
    in_flight: bool,
}

impl SessionEntry {
    pub fn new(session: Session, ticket: SessionTicket, cancel: CancellationToken) -> Self {
        Self {
            session,
            ticket,
            cancel,
            subscribers: Vec::new(),
            seq: 0,
            in_flight: false,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn ticket(&self) -> &SessionTicket {
        &self.ticket
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_poll_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.iter().filter(|tx| !tx.is_closed()).count()
    }

    /// Register a new subscriber. Terminal sessions hand out an ended stream.
    pub fn subscribe(&mut self) -> SessionEvents {
        if self.session.state.is_terminal() {
            return SessionEvents::closed();
        }
        let (tx, events) = SessionEvents::channel();
        self.subscribers.push(tx);
        events
    }

    /// Run the state machine and, if the state changed, record it and notify
    /// subscribers. Subscribers are released after a terminal transition.
    pub fn apply(&mut self, signal: Signal, message: Option<String>) -> Result<Transition, LoginError> {
        let t = transition(self.session.state, &signal)?;
        if !t.changed() {
            return Ok(t);
        }
        self.session.state = t.to;
        if message.is_some() {
            self.session.message = message.clone();
        }
        if t.to.is_terminal() {
            self.session.finished_at = Some(Utc::now());
        }
        if t.to == SessionState::Cancelled {
            self.session.cancelled = true;
        }
        self.emit(t, message);
        if t.to.is_terminal() {
            self.subscribers.clear();
        }
        Ok(t)
    }

    /// Mark a status query as started.
    ///
    /// Returns `Ok(None)` when the session was cancelled and polling should
    /// simply stop. Starting a second query while one is in flight, or
    /// polling a finished session, is refused.
    pub fn begin_poll(&mut self) -> Result<Option<SessionTicket>, LoginError> {
        if self.session.cancelled {
            return Ok(None);
        }
        if !self.session.state.is_pollable() {
            return Err(LoginError::InvalidState(format!(
                "session {} cannot be polled in state {}",
                self.session.id, self.session.state
            )));
        }
        if self.in_flight {
            return Err(LoginError::InvalidState(format!(
                "session {} already has a poll in flight",
                self.session.id
            )));
        }
        self.in_flight = true;
        self.session.poll_count += 1;
        Ok(Some(self.ticket.clone()))
    }

    /// Mark the in-flight query as finished and apply its answer, unless the
    /// session was cancelled in the meantime.
    pub fn finish_poll(
        &mut self,
        signal: Option<Signal>,
        message: Option<String>,
    ) -> Result<PollOutcome, LoginError> {
        self.in_flight = false;
        self.session.last_polled_at = Some(Utc::now());
        if self.session.cancelled {
            return Ok(PollOutcome::Discarded);
        }
        match signal {
            None => Ok(PollOutcome::Released),
            Some(signal) => self.apply(signal, message).map(PollOutcome::Applied),
        }
    }

    /// Cancel the session. Returns `false` if it had already terminated.
    pub fn cancel(&mut self) -> bool {
        self.cancel.cancel();
        match self.apply(Signal::Cancel, None) {
            Ok(t) => t.changed(),
            Err(_) => false,
        }
    }

    fn emit(&mut self, t: Transition, message: Option<String>) {
        self.seq += 1;
        let event = SessionEvent {
            session_id: self.session.id.clone(),
            seq: self.seq,
            from: t.from,
            to: t.to,
            message,
            at: Utc::now(),
        };
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    sessions: HashMap<SessionId, Arc<Mutex<SessionEntry>>>,
    issued: HashSet<SessionId>,
    issued_order: VecDeque<SessionId>,
    issued_limit: usize,
}

impl StoreInner {
    /// Record `id` as issued, forgetting the oldest ids past the limit.
    fn remember(&mut self, id: SessionId) -> bool {
        if !self.issued.insert(id.clone()) {
            return false;
        }
        self.issued_order.push_back(id);
        while self.issued_order.len() > self.issued_limit {
            match self.issued_order.pop_front() {
                Some(old) => {
                    self.issued.remove(&old);
                }
                None => break,
            }
        }
        true
    }
}

/// Concurrency-safe map from session id to its entry.
#[derive(Debug)]
pub struct SessionStore {
    inner: RwLock<StoreInner>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_issued_limit(ISSUED_HISTORY)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that remembers the last `limit` issued ids once they are removed.
    pub fn with_issued_limit(limit: usize) -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                issued_limit: limit,
                ..StoreInner::default()
            }),
        }
    }

    /// Insert a new session.
    ///
    /// An id still held is always refused. Removed ids are refused while
    /// they are among the last [`ISSUED_HISTORY`] issued, so the history
    /// stays bounded in a long-running process.
    pub fn put(&self, entry: SessionEntry) -> Result<(), LoginError> {
        let id = entry.session.id.clone();
        let mut inner = self.inner.write().unwrap_or_else(|p| p.into_inner());
        if inner.sessions.contains_key(&id) || !inner.remember(id.clone()) {
            return Err(LoginError::Protocol(format!(
                "provider reused session id {id}"
            )));
        }
        inner.sessions.insert(id, Arc::new(Mutex::new(entry)));
        Ok(())
    }

    /// Snapshot of a session.
    pub fn get(&self, id: &SessionId) -> Option<Session> {
        self.update(id, |entry| entry.session.clone())
    }

    /// Run `mutator` with exclusive access to one session.
    ///
    /// Returns `None` if the session is unknown. The mutator must not call
    /// back into the store for the same id.
    pub fn update<R>(&self, id: &SessionId, mutator: impl FnOnce(&mut SessionEntry) -> R) -> Option<R> {
        let entry = self.entry(id)?;
        let mut guard = lock(&entry);
        Some(mutator(&mut guard))
    }

    /// Drop a session from the registry.
    pub fn remove(&self, id: &SessionId) -> Option<Session> {
        let entry = {
            let mut inner = self.inner.write().unwrap_or_else(|p| p.into_inner());
            inner.sessions.remove(id)?
        };
        let guard = lock(&entry);
        Some(guard.session.clone())
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.inner
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .sessions
            .contains_key(id)
    }

    /// Whether `id` is in the issued history, including sessions since removed.
    pub fn was_issued(&self, id: &SessionId) -> bool {
        self.inner
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .issued
            .contains(id)
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.inner
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .sessions
            .keys()
            .cloned()
            .collect()
    }

    /// Snapshots of every stored session, oldest first.
    pub fn snapshot(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self
            .ids()
            .iter()
            .filter_map(|id| self.get(id))
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .sessions
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, id: &SessionId) -> Option<Arc<Mutex<SessionEntry>>> {
        self.inner
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .sessions
            .get(id)
            .cloned()
    }
}

fn lock(entry: &Mutex<SessionEntry>) -> MutexGuard<'_, SessionEntry> {
    entry.lock().unwrap_or_else(|p| p.into_inner())
}
