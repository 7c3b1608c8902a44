//! CLI handlers for `qrlogin login` and `qrlogin apps`.

use std::sync::Arc;

use strum::IntoEnumIterator;

use super::LoginArgs;
use crate::config::LoginConfig;
use crate::gateway::HttpGateway;
use crate::session::{LoginApp, LoginParams, SessionManager, SessionState};

/// Install a stderr `tracing` subscriber filtered by `RUST_LOG` (default `warn`).
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Build the login parameters described by the command line.
pub fn login_params(args: &LoginArgs) -> LoginParams {
    LoginParams {
        provider: args.provider,
        login_app: args.app,
        app_id: args.app_id.clone(),
    }
}

/// Handle `qrlogin login <provider>`.
pub async fn handle_login(args: LoginArgs) -> Result<(), Box<dyn std::error::Error>> {
    let params = login_params(&args);
    params.validate()?;

    let mut config = LoginConfig::layered(args.config.as_deref())?;
    if let Some(url) = args.base_url {
        config.gateway.base_url = url;
    }
    let gateway = HttpGateway::new(config.gateway.clone())?;
    let manager = SessionManager::new(Arc::new(gateway), config);

    let mut login = manager.start(params).await?;
    println!("Session: {}", login.handle.id);
    println!("Scan this code with the provider app:");
    println!("{}", login.handle.code);

    let mut last = SessionState::Creating;
    loop {
        tokio::select! {
            event = login.events.recv() => match event {
                Some(event) => {
                    match &event.message {
                        Some(message) => println!("{} -> {} ({message})", event.from, event.to),
                        None => println!("{} -> {}", event.from, event.to),
                    }
                    last = event.to;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                manager.cancel(&login.handle);
            }
        }
    }
    manager.shutdown().await;

    match last {
        SessionState::Succeeded => {
            println!("Login confirmed.");
            Ok(())
        }
        state => Err(format!("login ended in state {state}").into()),
    }
}

/// Handle `qrlogin apps`.
pub fn handle_apps() {
    for app in LoginApp::iter() {
        let kind = if app.is_terminal() { "app terminal" } else { "web / mini program" };
        println!("{app:<12} {kind}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Provider;

    #[test]
    fn params_follow_arguments() {
        let args = LoginArgs {
            provider: Provider::AppTerminal,
            app: Some(LoginApp::Tv),
            app_id: None,
            base_url: None,
            config: None,
        };
        let params = login_params(&args);
        assert_eq!(params, LoginParams::app_terminal(LoginApp::Tv));
        assert!(params.validate().is_ok());
    }
}
