use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use qrlogin::config::LoginConfig;
use qrlogin::error::LoginError;
use qrlogin::gateway::{
    HttpGateway, HttpGatewayConfig, PollMode, PollStatus, ProviderGateway, SessionTicket,
};
use qrlogin::session::{LoginApp, LoginParams, Provider, SessionId, SessionManager, SessionState};
use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gateway(server: &MockServer) -> HttpGateway {
    HttpGateway::new(HttpGatewayConfig::default().with_base_url(server.uri())).unwrap()
}

fn ticket(id: &str, params: &[(&str, &str)]) -> SessionTicket {
    SessionTicket {
        session_id: SessionId::new(id),
        provider: Provider::Qrcode,
        params: params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

#[tokio::test]
async fn create_session_posts_params_and_reads_enveloped_answer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login/qrcode/session"))
        .and(body_json(json!({ "provider": "qrcode", "login_app": "android" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "state": 1,
            "code": 0,
            "data": {
                "uid": "U-42",
                "time": 1700000000,
                "sign": "f00d",
                "qrcode": "https://provider.test/qr/U-42"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let created = gateway(&server)
        .create_session(&LoginParams::qrcode(LoginApp::Android))
        .await
        .unwrap();

    assert_eq!(created.session_id, SessionId::new("U-42"));
    assert_eq!(created.code, "https://provider.test/qr/U-42");
    assert_eq!(created.params.get("sign").map(String::as_str), Some("f00d"));
    assert_eq!(created.params.get("time").map(String::as_str), Some("1700000000"));
    assert!(!created.params.contains_key("uid"));
}

#[tokio::test]
async fn open_app_create_sends_trimmed_app_id_without_login_app() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login/qrcode/session"))
        .and(body_json(json!({ "provider": "open_app", "app_id": "100195123" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "session_id": "D-1",
            "code": "device-code"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let created = gateway(&server)
        .create_session(&LoginParams::open_app(" 100195123 "))
        .await
        .unwrap();
    assert_eq!(created.session_id, SessionId::new("D-1"));
}

#[tokio::test]
async fn poll_status_echoes_ticket_params() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/login/qrcode/status"))
        .and(query_param("session_id", "U-42"))
        .and(query_param("sign", "f00d"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "state": 1,
            "data": { "status": 1, "msg": "scanned, confirm on phone" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = gateway(&server)
        .poll_status(&ticket("U-42", &[("sign", "f00d")]))
        .await
        .unwrap();
    assert_eq!(response.status, PollStatus::Scanned);
    assert_eq!(response.message.as_deref(), Some("scanned, confirm on phone"));
}

#[tokio::test]
async fn server_errors_are_transient_and_client_errors_are_protocol_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/login/qrcode/status"))
        .and(query_param("session_id", "busy"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/login/qrcode/status"))
        .and(query_param("session_id", "gone"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such session"))
        .mount(&server)
        .await;

    let gw = gateway(&server);
    let busy = gw.poll_status(&ticket("busy", &[])).await.unwrap_err();
    assert!(matches!(busy, LoginError::Network(_)));
    assert!(busy.is_retryable());

    let gone = gw.poll_status(&ticket("gone", &[])).await.unwrap_err();
    assert!(matches!(gone, LoginError::Protocol(ref msg) if msg.contains("no such session")));
    assert!(!gone.is_retryable());
}

#[tokio::test]
async fn unparseable_bodies_are_protocol_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/login/qrcode/status"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/login/qrcode/session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "state": 1 })))
        .mount(&server)
        .await;

    let gw = gateway(&server);
    assert!(matches!(
        gw.poll_status(&ticket("S1", &[])).await,
        Err(LoginError::Protocol(_))
    ));
    assert!(matches!(
        gw.create_session(&LoginParams::qrcode(LoginApp::Web)).await,
        Err(LoginError::Protocol(_))
    ));
}

#[tokio::test]
async fn unreachable_provider_is_a_network_error() {
    let gw = HttpGateway::new(HttpGatewayConfig::default().with_base_url("http://127.0.0.1:9"))
        .unwrap();
    let err = gw.poll_status(&ticket("S1", &[])).await.unwrap_err();
    assert!(err.is_retryable());
}

#[test]
fn poll_mode_follows_long_poll_flag() {
    let short = HttpGateway::new(HttpGatewayConfig::default()).unwrap();
    let long = HttpGateway::new(HttpGatewayConfig::default().with_long_poll(true)).unwrap();
    assert_eq!(long.poll_mode(Provider::Qrcode), PollMode::LongPoll);
    assert_eq!(short.poll_mode(Provider::Qrcode), PollMode::Interval);
}

#[tokio::test]
async fn manager_drives_http_session_to_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login/qrcode/session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "uid": "U-7", "sign": "s1", "qrcode": "qr-U-7" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/login/qrcode/status"))
        .and(query_param("session_id", "U-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "status": 0 } })))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/login/qrcode/status"))
        .and(query_param("session_id", "U-7"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "data": { "status": "confirmed" } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let gateway_config = HttpGatewayConfig::default()
        .with_base_url(server.uri())
        .with_long_poll(false);
    let config = LoginConfig::default()
        .with_poll_interval(Duration::from_millis(10))
        .with_gateway(gateway_config.clone());
    let manager = SessionManager::new(Arc::new(HttpGateway::new(gateway_config).unwrap()), config);

    let login = manager
        .start(LoginParams::qrcode(LoginApp::Web))
        .await
        .unwrap();
    assert_eq!(login.handle.code, "qr-U-7");

    let events = tokio::time::timeout(Duration::from_secs(5), login.events.collect_all())
        .await
        .unwrap();
    let states: Vec<SessionState> = events.iter().map(|event| event.to).collect();
    assert_eq!(states, vec![SessionState::WaitingForScan, SessionState::Succeeded]);

    manager.shutdown().await;
}
