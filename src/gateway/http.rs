//! HTTP adapter for [`ProviderGateway`].
//!
//! Creates sessions with a JSON POST and queries status with a GET that
//! echoes the ticket parameters. Status codes and bodies are mapped onto
//! [`LoginError`] so the scheduler can tell retryable failures apart.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{normalize, CreatedSession, PollMode, PollResponse, ProviderGateway, SessionTicket};
use crate::error::LoginError;
use crate::session::types::{LoginApp, LoginParams, Provider};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";
const DEFAULT_CREATE_PATH: &str = "/login/qrcode/session";
const DEFAULT_STATUS_PATH: &str = "/login/qrcode/status";

/// Endpoint settings for [`HttpGateway`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpGatewayConfig {
    pub base_url: String,
    pub create_path: String,
    pub status_path: String,
    /// Whether the status endpoint holds requests open (long poll). Off by
    /// default; an endpoint that answers at once is then polled every
    /// `poll_interval`.
    pub long_poll: bool,
    pub user_agent: Option<String>,
}

impl Default for HttpGatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            create_path: DEFAULT_CREATE_PATH.to_string(),
            status_path: DEFAULT_STATUS_PATH.to_string(),
            long_poll: false,
            user_agent: None,
        }
    }
}

impl HttpGatewayConfig {
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_long_poll(mut self, long_poll: bool) -> Self {
        self.long_poll = long_poll;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// JSON-over-HTTP provider gateway.
///
/// Creates sessions with `POST {base_url}{create_path}` and queries them with
/// `GET {base_url}{status_path}?session_id=...`, forwarding ticket params as
/// extra query parameters.
///
/// # Example
/// ```no_run
/// use qrlogin::gateway::{HttpGateway, HttpGatewayConfig};
///
/// let gateway = HttpGateway::new(
///     HttpGatewayConfig::default().with_base_url("https://login.example.com"),
/// )?;
/// # Ok::<(), qrlogin::error::LoginError>(())
/// ```
pub struct HttpGateway {
    client: reqwest::Client,
    config: HttpGatewayConfig,
}

impl HttpGateway {
    pub fn new(config: HttpGatewayConfig) -> Result<Self, LoginError> {
        let mut builder = reqwest::Client::builder();
        if let Some(agent) = &config.user_agent {
            builder = builder.user_agent(agent.clone());
        }
        let client = builder
            .build()
            .map_err(|err| LoginError::Configuration(err.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn with_client(client: reqwest::Client, config: HttpGatewayConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &HttpGatewayConfig {
        &self.config
    }
}

#[derive(Debug, Serialize)]
struct CreateRequest<'a> {
    provider: Provider,
    #[serde(skip_serializing_if = "Option::is_none")]
    login_app: Option<LoginApp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    app_id: Option<&'a str>,
}

#[async_trait]
impl ProviderGateway for HttpGateway {
    async fn create_session(&self, params: &LoginParams) -> Result<CreatedSession, LoginError> {
        let body = CreateRequest {
            provider: params.provider,
            login_app: params.effective_login_app(),
            app_id: params.app_id.as_deref().map(str::trim),
        };
        let resp = self
            .client
            .post(self.config.url(&self.config.create_path))
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await?;
        let value = read_json(resp, "create session").await?;
        normalize::created_session(&value)
    }

    async fn poll_status(&self, ticket: &SessionTicket) -> Result<PollResponse, LoginError> {
        let mut query: Vec<(&str, &str)> = vec![("session_id", ticket.session_id.as_str())];
        query.extend(
            ticket
                .params
                .iter()
                .map(|(key, value)| (key.as_str(), value.as_str())),
        );
        let resp = self
            .client
            .get(self.config.url(&self.config.status_path))
            .header("Accept", "application/json")
            .query(&query)
            .send()
            .await?;
        let value = read_json(resp, "poll status").await?;
        normalize::poll_response(&value)
    }

    fn poll_mode(&self, _provider: Provider) -> PollMode {
        if self.config.long_poll {
            PollMode::LongPoll
        } else {
            PollMode::Interval
        }
    }
}

async fn read_json(resp: reqwest::Response, what: &str) -> Result<Value, LoginError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(classify_status(status, what, &body));
    }
    let text = resp.text().await?;
    serde_json::from_str(&text)
        .map_err(|err| LoginError::Protocol(format!("{what} returned invalid JSON: {err}")))
}

fn classify_status(status: StatusCode, what: &str, body: &str) -> LoginError {
    let transient = status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error();
    if transient {
        LoginError::Network(format!("{what} request failed with status {status}"))
    } else {
        LoginError::Protocol(format!(
            "{what} request failed with status {status}: {}",
            body.chars().take(200).collect::<String>()
        ))
    }
}
