//! Login session lifecycle: data model, state machine, store, events,
//! polling and the manager façade.

pub mod events;
pub mod manager;
pub mod scheduler;
pub mod state;
pub mod store;
pub mod types;

pub use events::{SessionEvent, SessionEventSink, SessionEvents, Subscription};
pub use manager::{LoginSession, SessionManager};
pub use scheduler::PollScheduler;
pub use state::{transition, SessionState, Signal, Transition};
pub use store::{PollOutcome, SessionEntry, SessionStore};
pub use types::{LoginApp, LoginParams, Provider, Session, SessionHandle, SessionId};
