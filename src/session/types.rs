//! Session data model: identifiers, login surfaces and snapshots.

use std::fmt;

use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use super::state::SessionState;
use crate::error::LoginError;

/// Opaque, provider-assigned session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Supported login surfaces.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Provider {
    /// Standard QR code scanned by the provider's phone app.
    Qrcode,
    /// QR login that simulates one of the provider's installed app terminals.
    AppTerminal,
    /// Device login on behalf of a registered third-party application.
    OpenApp,
}

/// Client surface a QR session is issued for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LoginApp {
    Web,
    Android,
    Ios,
    Ipad,
    Tv,
    Harmony,
    Qandroid,
    Windows,
    Mac,
    Linux,
    Wechatmini,
    Alipaymini,
}

impl LoginApp {
    /// Installed-app surfaces; browser and mini-program logins are not.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Web | Self::Wechatmini | Self::Alipaymini)
    }
}

/// Caller-supplied parameters for a new login attempt.
///
/// # Example
/// ```
/// use qrlogin::session::{LoginApp, LoginParams, Provider};
///
/// let params = LoginParams::builder()
///     .provider(Provider::Qrcode)
///     .login_app(LoginApp::Android)
///     .build();
/// assert!(params.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
pub struct LoginParams {
    pub provider: Provider,
    pub login_app: Option<LoginApp>,
    pub app_id: Option<String>,
}

impl LoginParams {
    pub fn qrcode(login_app: LoginApp) -> Self {
        Self {
            provider: Provider::Qrcode,
            login_app: Some(login_app),
            app_id: None,
        }
    }

    pub fn app_terminal(login_app: LoginApp) -> Self {
        Self {
            provider: Provider::AppTerminal,
            login_app: Some(login_app),
            app_id: None,
        }
    }

    pub fn open_app(app_id: impl Into<String>) -> Self {
        Self {
            provider: Provider::OpenApp,
            login_app: None,
            app_id: Some(app_id.into()),
        }
    }

    /// Check provider-specific requirements before any request is issued.
    pub fn validate(&self) -> Result<(), LoginError> {
        match self.provider {
            Provider::Qrcode => Ok(()),
            Provider::AppTerminal => match self.login_app {
                None => Err(LoginError::Param(
                    "app_terminal login requires a login app".to_string(),
                )),
                Some(app) if !app.is_terminal() => Err(LoginError::Param(format!(
                    "login app '{app}' cannot act as an app terminal"
                ))),
                Some(_) => Ok(()),
            },
            Provider::OpenApp => {
                let app_id = self.app_id.as_deref().map(str::trim).unwrap_or_default();
                if app_id.is_empty() {
                    return Err(LoginError::Param(
                        "open_app login requires an app id".to_string(),
                    ));
                }
                if !app_id.chars().all(|c| c.is_ascii_alphanumeric()) {
                    return Err(LoginError::Param(format!(
                        "app id '{app_id}' must be alphanumeric"
                    )));
                }
                Ok(())
            }
        }
    }

    /// Login app actually sent to the provider.
    pub fn effective_login_app(&self) -> Option<LoginApp> {
        match self.provider {
            Provider::Qrcode => Some(self.login_app.unwrap_or(LoginApp::Web)),
            Provider::AppTerminal => self.login_app,
            Provider::OpenApp => None,
        }
    }
}

/// Point-in-time snapshot of one login attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub id: SessionId,
    pub provider: Provider,
    pub login_app: Option<LoginApp>,
    pub app_id: Option<String>,
    pub code: String,
    pub state: SessionState,
    /// Last message reported by the provider or the scheduler.
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_polled_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub poll_count: u32,
    pub cancelled: bool,
}

impl Session {
    pub(crate) fn new(id: SessionId, params: &LoginParams, code: String) -> Self {
        Self {
            id,
            provider: params.provider,
            login_app: params.effective_login_app(),
            app_id: params.app_id.as_deref().map(|id| id.trim().to_string()),
            code,
            state: SessionState::Creating,
            message: None,
            created_at: Utc::now(),
            last_polled_at: None,
            finished_at: None,
            poll_count: 0,
            cancelled: false,
        }
    }

    /// Parameters that would start an equivalent session.
    pub fn params(&self) -> LoginParams {
        LoginParams {
            provider: self.provider,
            login_app: self.login_app,
            app_id: self.app_id.clone(),
        }
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            id: self.id.clone(),
            provider: self.provider,
            code: self.code.clone(),
        }
    }
}

/// Caller-side reference to a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    pub id: SessionId,
    pub provider: Provider,
    /// Scannable payload to render for the device.
    pub code: String,
}
