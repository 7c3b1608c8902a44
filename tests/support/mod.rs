#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use qrlogin::config::LoginConfig;
use qrlogin::error::LoginError;
use qrlogin::gateway::{
    CreatedSession, PollMode, PollResponse, PollStatus, ProviderGateway, SessionTicket,
};
use qrlogin::session::{LoginParams, Provider, SessionEvents, SessionId, SessionManager};
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;

type PollResult = Result<PollResponse, LoginError>;

enum PollStep {
    Answer(PollResult),
    Gate(oneshot::Receiver<PollResult>),
}

/// In-memory gateway that answers from a script.
///
/// Sessions are created as `S1`, `S2`, ... unless a create result is queued.
/// Once the poll script runs dry, further polls hang until the caller's
/// deadline fires.
pub struct ScriptedGateway {
    creates: Mutex<VecDeque<Result<CreatedSession, LoginError>>>,
    polls: Mutex<VecDeque<PollStep>>,
    mode: PollMode,
    create_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    polled: Mutex<Vec<(SessionId, Instant)>>,
    poll_count: watch::Sender<usize>,
}

impl ScriptedGateway {
    pub fn new(mode: PollMode) -> Self {
        Self {
            creates: Mutex::new(VecDeque::new()),
            polls: Mutex::new(VecDeque::new()),
            mode,
            create_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            polled: Mutex::new(Vec::new()),
            poll_count: watch::channel(0).0,
        }
    }

    pub fn long_poll() -> Arc<Self> {
        Arc::new(Self::new(PollMode::LongPoll))
    }

    pub fn interval() -> Arc<Self> {
        Arc::new(Self::new(PollMode::Interval))
    }

    pub fn queue_create(&self, result: Result<CreatedSession, LoginError>) {
        self.creates.lock().unwrap().push_back(result);
    }

    pub fn queue_status(&self, status: PollStatus) {
        self.queue_poll(Ok(PollResponse::new(status)));
    }

    pub fn queue_statuses(&self, statuses: &[PollStatus]) {
        for status in statuses {
            self.queue_status(*status);
        }
    }

    pub fn queue_poll(&self, result: PollResult) {
        self.polls.lock().unwrap().push_back(PollStep::Answer(result));
    }

    /// The next poll blocks until the returned sender fires.
    pub fn hold_poll(&self) -> oneshot::Sender<PollResult> {
        let (tx, rx) = oneshot::channel();
        self.polls.lock().unwrap().push_back(PollStep::Gate(rx));
        tx
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn poll_calls(&self) -> usize {
        *self.poll_count.borrow()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Instants at which each poll was issued, in order.
    pub fn poll_instants(&self) -> Vec<Instant> {
        self.polled.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    pub fn polled_ids(&self) -> Vec<SessionId> {
        self.polled.lock().unwrap().iter().map(|(id, _)| id.clone()).collect()
    }

    /// Resolve once at least `n` polls have been issued.
    pub async fn wait_for_polls(&self, n: usize) {
        let mut rx = self.poll_count.subscribe();
        rx.wait_for(|count| *count >= n).await.unwrap();
    }
}

/// Counts a poll as in flight until its future completes or is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, max: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProviderGateway for ScriptedGateway {
    async fn create_session(&self, _params: &LoginParams) -> Result<CreatedSession, LoginError> {
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let queued = self.creates.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| Ok(CreatedSession::new(format!("S{n}"), format!("code-{n}"))))
    }

    async fn poll_status(&self, ticket: &SessionTicket) -> Result<PollResponse, LoginError> {
        let _guard = InFlight::enter(&self.in_flight, &self.max_in_flight);
        self.polled
            .lock()
            .unwrap()
            .push((ticket.session_id.clone(), Instant::now()));
        self.poll_count.send_modify(|count| *count += 1);

        let step = self.polls.lock().unwrap().pop_front();
        match step {
            Some(PollStep::Answer(result)) => result,
            Some(PollStep::Gate(rx)) => rx
                .await
                .unwrap_or_else(|_| Err(LoginError::Network("gate dropped".to_string()))),
            None => std::future::pending().await,
        }
    }

    fn poll_mode(&self, _provider: Provider) -> PollMode {
        self.mode
    }
}

pub fn manager(gateway: Arc<ScriptedGateway>) -> SessionManager {
    SessionManager::new(gateway, LoginConfig::default())
}

pub fn manager_with(gateway: Arc<ScriptedGateway>, config: LoginConfig) -> SessionManager {
    SessionManager::new(gateway, config)
}

/// `(from, to)` pairs of every event until the stream ends.
pub async fn transitions(
    events: SessionEvents,
) -> Vec<(qrlogin::session::SessionState, qrlogin::session::SessionState)> {
    events
        .collect_all()
        .await
        .into_iter()
        .map(|event| (event.from, event.to))
        .collect()
}
