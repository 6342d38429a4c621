//! Integration tests for `MailNotifier` against a wiremock mail API.
//!
//! Each test starts a mock server, points the notifier at it, and checks
//! the request it receives and how the response status is reported.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use docgate::{Delivery, MailConfig, MailNotifier, Notifier, NotifyError, OtpCode};

fn notifier(server: &MockServer) -> MailNotifier {
    let config = MailConfig {
        api_url: server.uri(),
        api_key: "re_test_key".into(),
        from: "Statements <statements@example.com>".into(),
        site_url: Some("https://statements.example.com".into()),
        timeout: Duration::from_secs(2),
    };
    MailNotifier::new(config).expect("notifier builds")
}

fn delivery() -> Delivery {
    Delivery {
        contact: "patient@example.com".into(),
        resource_id: 1,
        title: "January 2025 Statement".into(),
        secret: OtpCode::from("042911"),
        expires_at: Utc.with_ymd_and_hms(2025, 1, 31, 10, 5, 0).unwrap(),
    }
}

#[tokio::test]
async fn sends_code_with_bearer_key() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/emails"))
        .and(header("Authorization", "Bearer re_test_key"))
        .and(body_partial_json(serde_json::json!({
            "from": "Statements <statements@example.com>",
            "to": ["patient@example.com"],
            "subject": "Your statement: January 2025 Statement",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "49a3999c-0ce1-4ea6-ab68-afcd6dc2e794"
        })))
        .expect(1)
        .mount(&server)
        .await;

    notifier(&server).send(delivery()).await.expect("delivered");

    let requests = server.received_requests().await.expect("recording enabled");
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let html = body["html"].as_str().unwrap();
    assert!(html.contains("042911"));
    assert!(html.contains("https://statements.example.com/statements/verify?id=1"));
    assert!(html.contains("2025-01-31 10:05 UTC"));
}

#[tokio::test]
async fn trailing_slash_in_api_url_is_ignored() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "x"})))
        .expect(1)
        .mount(&server)
        .await;

    let config = MailConfig {
        api_url: format!("{}/", server.uri()),
        ..MailConfig::new("re_test_key", "statements@example.com")
    };
    let notifier = MailNotifier::new(config).unwrap();
    assert!(notifier.send(delivery()).await.is_ok());
}

#[tokio::test]
async fn client_error_is_a_rejection() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(422).set_body_json(serde_json::json!({
            "name": "validation_error",
            "message": "Invalid `to` field."
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = notifier(&server).send(delivery()).await.unwrap_err();
    match err {
        NotifyError::Rejected(reason) => {
            assert!(reason.contains("422"));
            assert!(reason.contains("validation_error"));
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn server_error_is_a_transport_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
        .expect(1)
        .mount(&server)
        .await;

    let err = notifier(&server).send(delivery()).await.unwrap_err();
    assert!(matches!(err, NotifyError::Transport(reason) if reason.contains("503")));
}

#[tokio::test]
async fn slow_gateway_times_out_as_transport_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let config = MailConfig {
        api_url: server.uri(),
        timeout: Duration::from_millis(200),
        ..MailConfig::new("re_test_key", "statements@example.com")
    };
    let err = MailNotifier::new(config).unwrap().send(delivery()).await.unwrap_err();
    assert!(matches!(err, NotifyError::Transport(_)));
}

#[tokio::test]
async fn unreachable_gateway_is_a_transport_failure() {
    // Bind and release a port so nothing is listening on it.
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();

    let config = MailConfig {
        api_url: format!("http://127.0.0.1:{port}"),
        timeout: Duration::from_secs(2),
        ..MailConfig::new("re_test_key", "statements@example.com")
    };
    let err = MailNotifier::new(config).unwrap().send(delivery()).await.unwrap_err();
    assert!(matches!(err, NotifyError::Transport(_)));
}
