//! Utility modules: backoff and timeout.

pub mod backoff;
pub mod timeout;
