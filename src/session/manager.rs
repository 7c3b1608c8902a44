//! Session manager: the public façade over store, scheduler and gateway.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::events::{SessionEventSink, SessionEvents, Subscription};
use super::scheduler::PollScheduler;
use super::state::{transition, SessionState, Signal};
use super::store::{SessionEntry, SessionStore};
use super::types::{LoginParams, Session, SessionHandle};
use crate::config::LoginConfig;
use crate::error::LoginError;
use crate::gateway::ProviderGateway;
use crate::util::timeout::with_timeout;

/// A freshly started login: the handle to render and act on, plus the stream
/// of its state changes (first event: `creating → waiting_for_scan`).
#[derive(Debug)]
pub struct LoginSession {
    pub handle: SessionHandle,
    pub events: SessionEvents,
}

/// Starts, observes and cancels QR/device login sessions.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use qrlogin::config::LoginConfig;
/// use qrlogin::gateway::{HttpGateway, HttpGatewayConfig};
/// use qrlogin::session::{LoginApp, LoginParams, SessionManager};
///
/// # async fn run() -> qrlogin::error::Result<()> {
/// let gateway = HttpGateway::new(HttpGatewayConfig::default())?;
/// let manager = SessionManager::new(Arc::new(gateway), LoginConfig::default());
/// let mut login = manager.start(LoginParams::qrcode(LoginApp::Android)).await?;
/// println!("scan: {}", login.handle.code);
/// while let Some(event) = login.events.recv().await {
///     println!("{} -> {}", event.from, event.to);
/// }
/// manager.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct SessionManager {
    gateway: Arc<dyn ProviderGateway>,
    store: Arc<SessionStore>,
    scheduler: PollScheduler,
    config: Arc<LoginConfig>,
}

impl SessionManager {
    pub fn new(gateway: Arc<dyn ProviderGateway>, config: LoginConfig) -> Self {
        let store = Arc::new(SessionStore::new());
        let config = Arc::new(config);
        let scheduler = PollScheduler::new(gateway.clone(), store.clone(), config.clone());
        Self {
            gateway,
            store,
            scheduler,
            config,
        }
    }

    pub fn config(&self) -> &LoginConfig {
        &self.config
    }

    /// Create a session with the provider and start polling it.
    ///
    /// Parameters are validated before any request is made. Creation
    /// failures are returned as-is and never retried.
    pub async fn start(&self, params: LoginParams) -> Result<LoginSession, LoginError> {
        params.validate()?;
        if self.scheduler.is_shut_down() {
            return Err(LoginError::InvalidState(
                "session manager has been shut down".to_string(),
            ));
        }

        let creating = transition(SessionState::Idle, &Signal::Start)?;
        debug!(provider = %params.provider, state = %creating.to, "creating login session");

        let created = with_timeout(self.config.create_timeout, self.gateway.create_session(&params))
            .await
            .and_then(|created| created.validate().map(|()| created));
        let created = match created {
            Ok(created) => created,
            Err(err) => {
                let failed = transition(creating.to, &Signal::CreateFailed)?;
                warn!(provider = %params.provider, state = %failed.to, error = %err, "session creation failed");
                return Err(err);
            }
        };

        let session = Session::new(created.session_id.clone(), &params, created.code.clone());
        let handle = session.handle();
        let token = self.scheduler.session_token();
        let mut entry = SessionEntry::new(session, created.ticket(params.provider), token.clone());
        let events = entry.subscribe();
        entry.apply(Signal::Created, None)?;
        if let Err(err) = self.store.put(entry) {
            token.cancel();
            return Err(err);
        }

        info!(session_id = %handle.id, provider = %params.provider, "login session created");
        self.scheduler.spawn(handle.id.clone(), params.provider, token);
        Ok(LoginSession { handle, events })
    }

    /// Cancel a session. Safe to call repeatedly, after termination, or for
    /// sessions that no longer exist.
    pub fn cancel(&self, handle: &SessionHandle) {
        match self.store.update(&handle.id, |entry| entry.cancel()) {
            Some(true) => info!(session_id = %handle.id, "login session cancelled"),
            Some(false) => debug!(session_id = %handle.id, "cancel on finished session ignored"),
            None => debug!(session_id = %handle.id, "cancel on unknown session ignored"),
        }
    }

    /// Stream of the session's future state changes. Ends immediately for
    /// unknown or already finished sessions.
    pub fn subscribe(&self, handle: &SessionHandle) -> SessionEvents {
        self.store
            .update(&handle.id, |entry| entry.subscribe())
            .unwrap_or_else(SessionEvents::closed)
    }

    /// Push every future state change of the session into `sink` until the
    /// session finishes or [`Subscription::unsubscribe`] is called.
    ///
    /// The forwarder is not tied to shutdown: the terminal `cancelled` event
    /// queued by [`SessionManager::shutdown`] still reaches the sink, after
    /// which the stream ends.
    pub fn subscribe_with(&self, handle: &SessionHandle, sink: SessionEventSink) -> Subscription {
        let mut events = self.subscribe(handle);
        let token = CancellationToken::new();
        let subscription = Subscription::new(token.clone());
        self.scheduler.spawn_task(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => sink(event),
                        None => break,
                    },
                }
            }
        });
        subscription
    }

    /// Current state, or `None` if the session is unknown or was evicted.
    pub fn current_state(&self, handle: &SessionHandle) -> Option<SessionState> {
        self.store.update(&handle.id, |entry| entry.session().state)
    }

    pub fn session(&self, handle: &SessionHandle) -> Option<Session> {
        self.store.get(&handle.id)
    }

    /// Snapshots of every session still held, oldest first.
    pub fn sessions(&self) -> Vec<Session> {
        self.store.snapshot()
    }

    /// Start a fresh session with the same parameters as an expired or failed
    /// one. The old session is dropped once the new one exists; if creation
    /// fails the old snapshot stays readable.
    pub async fn retry(&self, handle: &SessionHandle) -> Result<LoginSession, LoginError> {
        let session = self
            .store
            .get(&handle.id)
            .ok_or_else(|| LoginError::UnknownSession(handle.id.to_string()))?;
        transition(session.state, &Signal::Retry)?;
        debug!(session_id = %handle.id, state = %session.state, "retrying with a new session");
        let retried = self.start(session.params()).await?;
        self.store.remove(&handle.id);
        Ok(retried)
    }

    /// Drop a session from the store, cancelling it first if still live.
    pub fn remove(&self, handle: &SessionHandle) -> Option<Session> {
        self.cancel(handle);
        self.store.remove(&handle.id)
    }

    /// Cancel every live session and wait for all background tasks.
    pub async fn shutdown(&self) {
        for id in self.store.ids() {
            self.store.update(&id, |entry| entry.cancel());
        }
        self.scheduler.shutdown().await;
        debug!("session manager shut down");
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.scheduler.cancel_all();
    }
}
