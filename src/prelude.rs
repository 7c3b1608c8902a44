//! Convenience re-exports for common use.

pub use crate::config::LoginConfig;
pub use crate::error::{LoginError, Result};
pub use crate::gateway::{
    CreatedSession, HttpGateway, HttpGatewayConfig, PollMode, PollResponse, PollStatus,
    ProviderGateway, SessionTicket,
};
pub use crate::session::{
    LoginApp, LoginParams, LoginSession, Provider, Session, SessionEvent, SessionEvents,
    SessionHandle, SessionId, SessionManager, SessionState, Subscription,
};
