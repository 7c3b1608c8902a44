//! Session state machine.
//!
//! [`transition`] is a pure function from the current state and an observed
//! signal to the next state. Callers own the side effects (storing the new
//! state, emitting an event, stopping the poll loop).

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::LoginError;
use crate::gateway::PollStatus;

/// Lifecycle state of a login session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    Idle,
    Creating,
    WaitingForScan,
    Scanned,
    Succeeded,
    Expired,
    Error,
    Cancelled,
}

impl SessionState {
    /// No further transitions happen from a terminal state (apart from an
    /// explicit retry, which allocates a new session).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Expired | Self::Error | Self::Cancelled
        )
    }

    /// States in which the scheduler keeps querying the provider.
    pub fn is_pollable(&self) -> bool {
        matches!(self, Self::WaitingForScan | Self::Scanned)
    }
}

/// Input driving a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Caller asked for a new session.
    Start,
    /// `create_session` returned a session id and code.
    Created,
    /// `create_session` failed.
    CreateFailed,
    /// A status query answered.
    Poll(PollStatus),
    /// Transient faults exceeded the retry budget.
    TransportExhausted,
    /// The provider answered something that cannot be interpreted.
    ProtocolViolation,
    /// Caller asked for a fresh session after expiry or failure.
    Retry,
    /// Caller cancelled the session.
    Cancel,
}

/// Outcome of applying a [`Signal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: SessionState,
    pub to: SessionState,
}

impl Transition {
    fn to(from: SessionState, to: SessionState) -> Self {
        Self { from, to }
    }

    /// No-op transitions (e.g. `waiting` while already waiting) emit nothing.
    pub fn changed(&self) -> bool {
        self.from != self.to
    }

    /// Whether the scheduler should issue another status query.
    pub fn polling(&self) -> bool {
        self.to.is_pollable()
    }
}

/// Compute the next state.
///
/// Any combination outside the lifecycle (for example a poll result for a
/// session that already finished) is a programming error and reported as
/// [`LoginError::InvalidState`].
pub fn transition(current: SessionState, signal: &Signal) -> Result<Transition, LoginError> {
    use SessionState as S;

    let next = match (current, signal) {
        (S::Idle, Signal::Start) => S::Creating,
        (S::Creating, Signal::Created) => S::WaitingForScan,
        (S::Creating, Signal::CreateFailed) => S::Error,

        (S::WaitingForScan, Signal::Poll(PollStatus::Waiting)) => S::WaitingForScan,
        (S::WaitingForScan, Signal::Poll(PollStatus::Scanned)) => S::Scanned,
        (S::Scanned, Signal::Poll(PollStatus::Scanned)) => S::Scanned,
        (S::Scanned, Signal::Poll(PollStatus::Waiting)) => S::WaitingForScan,
        (S::WaitingForScan | S::Scanned, Signal::Poll(PollStatus::Confirmed)) => S::Succeeded,
        (S::WaitingForScan | S::Scanned, Signal::Poll(PollStatus::Expired)) => S::Expired,
        (
            S::WaitingForScan | S::Scanned,
            Signal::Poll(PollStatus::Rejected)
            | Signal::TransportExhausted
            | Signal::ProtocolViolation,
        ) => S::Error,

        (S::Expired | S::Error, Signal::Retry) => S::Creating,

        (state, Signal::Cancel) if state.is_terminal() => state,
        (_, Signal::Cancel) => S::Cancelled,

        (state, signal) => {
            return Err(LoginError::InvalidState(format!(
                "{signal:?} is not valid in state {state}"
            )))
        }
    };
    Ok(Transition::to(current, next))
}
