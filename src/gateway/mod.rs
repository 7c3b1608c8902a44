//! Provider gateway capability: the two network calls the session core
//! depends on, and the typed responses every adapter must produce.

pub mod http;
pub mod normalize;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::LoginError;
use crate::session::types::{LoginParams, Provider, SessionId};

pub use http::{HttpGateway, HttpGatewayConfig};

/// Provider-level answer to "has this code been consumed yet?".
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PollStatus {
    Waiting,
    Scanned,
    Confirmed,
    Expired,
    #[serde(alias = "canceled", alias = "cancelled")]
    #[strum(to_string = "rejected", serialize = "canceled", serialize = "cancelled")]
    Rejected,
}

impl PollStatus {
    /// Map the integer status codes used by QR login endpoints.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Waiting),
            1 => Some(Self::Scanned),
            2 => Some(Self::Confirmed),
            -1 => Some(Self::Expired),
            -2 => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Normalized result of a single status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollResponse {
    pub status: PollStatus,
    pub message: Option<String>,
}

impl PollResponse {
    pub fn new(status: PollStatus) -> Self {
        Self {
            status,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Credentials handed out by the provider at creation and echoed back on
/// every status query. The core never looks inside `params`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTicket {
    pub session_id: SessionId,
    pub provider: Provider,
    pub params: BTreeMap<String, String>,
}

/// Result of a successful `create_session` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedSession {
    pub session_id: SessionId,
    /// Provider-issued scannable payload (rendering it is the caller's job).
    pub code: String,
    /// Extra poll parameters, passed back verbatim in [`SessionTicket::params`].
    pub params: BTreeMap<String, String>,
}

impl CreatedSession {
    pub fn new(session_id: impl Into<SessionId>, code: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            code: code.into(),
            params: BTreeMap::new(),
        }
    }

    /// Reject payloads the provider should never have produced.
    pub fn validate(&self) -> Result<(), LoginError> {
        if self.session_id.as_str().trim().is_empty() {
            return Err(LoginError::Protocol(
                "provider returned an empty session id".to_string(),
            ));
        }
        if self.code.trim().is_empty() {
            return Err(LoginError::Protocol(format!(
                "provider returned an empty code for session {}",
                self.session_id
            )));
        }
        Ok(())
    }

    pub fn ticket(&self, provider: Provider) -> SessionTicket {
        SessionTicket {
            session_id: self.session_id.clone(),
            provider,
            params: self.params.clone(),
        }
    }
}

/// How the provider answers status queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum PollMode {
    /// The provider holds each request open until something changes; poll
    /// again as soon as the previous call returns.
    LongPoll,
    /// The provider answers immediately; wait the configured interval
    /// between queries.
    Interval,
}

/// Outbound capability used by the session core.
///
/// Implementations own all transport details (headers, HTTP-level retries,
/// response shapes). They must translate whatever the provider sends into
/// [`CreatedSession`] / [`PollResponse`] or a [`LoginError`]:
/// `Network`/`Timeout` for transport faults, `Protocol` for responses that
/// cannot be understood.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Issue a new login session and its scannable code.
    async fn create_session(&self, params: &LoginParams) -> Result<CreatedSession, LoginError>;

    /// Ask whether the code of `ticket` has been consumed. May block for a
    /// long-poll interval before answering `Waiting`.
    async fn poll_status(&self, ticket: &SessionTicket) -> Result<PollResponse, LoginError>;

    /// Polling cadence for sessions of `provider`.
    fn poll_mode(&self, _provider: Provider) -> PollMode {
        PollMode::LongPoll
    }
}
