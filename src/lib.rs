//! qrlogin: QR / device login session lifecycle manager.
//!
//! Issues a login session with a provider, polls its status until the user
//! scans and confirms it (or it expires, fails, or is cancelled), and streams
//! every state change to subscribers.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use qrlogin::prelude::*;
//!
//! # async fn example() -> qrlogin::error::Result<()> {
//! let config = LoginConfig::from_env();
//! let gateway = HttpGateway::new(config.gateway.clone())?;
//! let manager = SessionManager::new(Arc::new(gateway), config);
//!
//! let login = manager.start(LoginParams::open_app("100195123")).await?;
//! println!("scan this: {}", login.handle.code);
//! for event in login.events.collect_all().await {
//!     println!("{} -> {}", event.from, event.to);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod gateway;
pub mod prelude;
pub mod session;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
