//! CLI entry point for qrlogin.

pub mod login;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::session::{LoginApp, Provider};

/// qrlogin CLI
#[derive(Parser, Debug)]
#[command(name = "qrlogin", version, about = "QR / device login from the terminal")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a login session and wait for it to finish
    Login(LoginArgs),
    /// List the login apps a session can be issued for
    Apps,
}

/// Arguments for `qrlogin login`.
#[derive(Parser, Debug)]
pub struct LoginArgs {
    /// Login surface (qrcode, app_terminal, open_app)
    pub provider: Provider,

    /// Login app to issue the code for (e.g. web, android, tv)
    #[arg(short, long)]
    pub app: Option<LoginApp>,

    /// Third-party application id (open_app only)
    #[arg(long)]
    pub app_id: Option<String>,

    /// Provider endpoint, overrides config and QRLOGIN_BASE_URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// Config file (defaults to ~/.qrlogin/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parse_login_with_app() {
        let cli = Cli::try_parse_from(["qrlogin", "login", "qrcode", "--app", "android"]).unwrap();
        match cli.command {
            Commands::Login(args) => {
                assert_eq!(args.provider, Provider::Qrcode);
                assert_eq!(args.app, Some(LoginApp::Android));
                assert!(args.app_id.is_none());
            }
            other => panic!("expected Login, got {other:?}"),
        }
    }

    #[test]
    fn parse_login_open_app_with_overrides() {
        let cli = Cli::try_parse_from([
            "qrlogin",
            "login",
            "open_app",
            "--app-id",
            "100195123",
            "--base-url",
            "http://localhost:9000",
            "--config",
            "/tmp/qrlogin.toml",
        ])
        .unwrap();
        match cli.command {
            Commands::Login(args) => {
                assert_eq!(args.provider, Provider::OpenApp);
                assert_eq!(args.app_id.as_deref(), Some("100195123"));
                assert_eq!(args.base_url.as_deref(), Some("http://localhost:9000"));
                assert_eq!(args.config, Some(PathBuf::from("/tmp/qrlogin.toml")));
            }
            other => panic!("expected Login, got {other:?}"),
        }
    }

    #[test]
    fn parse_apps() {
        let cli = Cli::try_parse_from(["qrlogin", "apps"]).unwrap();
        assert!(matches!(cli.command, Commands::Apps));
    }

    #[test]
    fn unknown_provider_is_rejected() {
        assert!(Cli::try_parse_from(["qrlogin", "login", "sms"]).is_err());
    }

    #[test]
    fn unknown_app_is_rejected() {
        assert!(Cli::try_parse_from(["qrlogin", "login", "qrcode", "--app", "fridge"]).is_err());
    }
}
