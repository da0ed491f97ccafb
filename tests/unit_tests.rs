use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{DateTime, Utc};
use propane_bot::{
    create_app, error::BotError, parse_payload, web::PropaneResponse, AppConfig, ChatResponder,
    CylinderProfile, MqttListener, BrokerAddress, ReadingStore, Supervisor, WebConfig, Worker,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

fn test_store() -> Arc<ReadingStore> {
    let profile = CylinderProfile::new(20.0, 60.0, 5.0).unwrap();
    Arc::new(ReadingStore::new(profile, chrono_tz::America::Chicago))
}

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

async fn get(app: Router, uri: &str) -> (StatusCode, Option<String>, String) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, content_type, String::from_utf8(body.to_vec()).unwrap())
}

/// Scale payload through to the chat reply
#[test]
fn test_payload_to_summary() {
    let store = test_store();
    let listener = MqttListener::new(
        Arc::clone(&store),
        BrokerAddress::parse("tcp://localhost:1883").unwrap(),
        "propane",
        "test-client",
    );

    let reading = tokio_test::assert_ok!(listener.handle_payload(b"1577640142,50.0"));
    assert_eq!(reading.weight, 50.0);
    assert_eq!(reading.remaining_percent, 78.0);

    let responder = ChatResponder::new(Arc::clone(&store));
    assert_eq!(
        responder.reply_to_message("hey, !weight?").unwrap(),
        "Well, as of Sun Dec 29 11:22AM 2019 the cylinder weighs 50 lbs which kinda translates into 78% remaining"
    );
    assert!(responder.reply_to_message("how's the grill?").is_none());
}

#[test]
fn test_malformed_payload_leaves_store_untouched() {
    let store = test_store();
    store.set(40.0, at(1_600_000_000));

    let listener = MqttListener::new(
        Arc::clone(&store),
        BrokerAddress::parse("broker").unwrap(),
        "propane",
        "test-client",
    );
    for payload in [&b"garbage"[..], b"abc,50", b"1577640142,heavy", b"1577640142"] {
        assert!(matches!(
            listener.handle_payload(payload),
            Err(BotError::MalformedTelemetry { .. })
        ));
    }

    assert_eq!(store.get().weight, 40.0);
    assert_eq!(store.get().timestamp, at(1_600_000_000));
}

#[test]
fn test_parse_payload_scenarios() {
    let event = parse_payload(b"1577640142,32.5").unwrap();
    assert_eq!(event.timestamp, at(1_577_640_142));
    assert_eq!(event.weight, 32.5);

    let event = parse_payload(b"1577640142,32.5,extra,fields").unwrap();
    assert_eq!(event.weight, 32.5);

    assert!(parse_payload(b"").is_err());
    assert!(parse_payload(b" 1577640142,32.5").is_err());
}

#[test]
fn test_calibration_files() {
    let profile = CylinderProfile::from_json(
        r#"{"tareweight": 17.0, "fullweight": 37.0}"#,
    )
    .unwrap();
    assert_eq!(profile.remaining_percent(17.0), 0.0);
    assert_eq!(profile.remaining_percent(37.0), 100.0);
    assert_eq!(profile.remaining_percent(27.0), 50.0);

    assert!(CylinderProfile::from_json(r#"{"tareweight": 37.0, "fullweight": 17.0}"#).is_err());
}

#[test]
fn test_app_config_example() {
    let config = AppConfig::from_json(
        r#"{
            "mqtt": { "server": "tcp://10.0.0.5:1883", "topic": "home/propane", "clientId": "grill" },
            "slack": { "apiToken": "xoxb-token" }
        }"#,
    )
    .unwrap();
    assert_eq!(config.mqtt.client_id(), "grill");
    assert_eq!(config.mqtt.broker().unwrap().port, 1883);
    assert!(config.discord.is_none());
    assert_eq!(config.web.bind_address(), "0.0.0.0:8080");
}

#[tokio::test]
async fn test_json_zero_state() {
    let app = create_app(&WebConfig::default(), test_store());
    let (status, content_type, body) = get(app, "/api/propane").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/json"));

    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["weight"].as_f64(), Some(0.0));
    assert_eq!(json["remaining"].as_f64(), Some(0.0));
    assert_eq!(json["timestamp"], "1969-12-31T18:00:00-06:00");
    assert!(json["message"]
        .as_str()
        .unwrap()
        .starts_with("Well, as of Wed Dec 31 06:00PM 1969"));
}

#[tokio::test]
async fn test_json_after_reading() {
    let store = test_store();
    store.set(50.0, at(1_577_640_142));
    let app = create_app(&WebConfig::default(), Arc::clone(&store));

    let (status, _, body) = get(app, "/api/propane").await;
    assert_eq!(status, StatusCode::OK);

    let response: PropaneResponse = serde_json::from_str(&body).unwrap();
    assert_eq!(
        response,
        PropaneResponse {
            weight: 50.0,
            timestamp: "2019-12-29T11:22:22-06:00".to_string(),
            remaining: 78.0,
            message: store.summary(),
        }
    );
}

#[tokio::test]
async fn test_text_endpoint() {
    let store = test_store();
    store.set(50.0, at(1_577_640_142));
    let app = create_app(&WebConfig::default(), Arc::clone(&store));

    let (status, content_type, body) = get(app, "/propane").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().starts_with("text/plain"));
    assert_eq!(body, store.summary());
}

#[tokio::test]
async fn test_dashboard_and_health() {
    let store = test_store();
    let app = create_app(&WebConfig::default(), Arc::clone(&store));

    let (status, content_type, body) = get(app.clone(), "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().starts_with("text/html"));
    assert!(body.contains("/api/propane"));

    let (status, _, body) = get(app.clone(), "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["has_reading"], false);

    store.set(30.0, at(1_577_640_142));
    let (_, _, body) = get(app, "/api/health").await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["has_reading"], true);
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let app = create_app(&WebConfig::default(), test_store());
    let (status, _, _) = get(app, "/api/butane").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cors_header() {
    let request = || {
        Request::builder()
            .uri("/api/propane")
            .header(header::ORIGIN, "http://example.com")
            .body(Body::empty())
            .unwrap()
    };

    let app = create_app(&WebConfig::default(), test_store());
    let response = app.oneshot(request()).await.unwrap();
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "*"
    );

    let app = create_app(&WebConfig::default().with_cors(false), test_store());
    let response = app.oneshot(request()).await.unwrap();
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}

struct WaitForShutdown;

#[async_trait]
impl Worker for WaitForShutdown {
    fn name(&self) -> &'static str {
        "waiter"
    }

    async fn run(self: Box<Self>, shutdown: CancellationToken) -> propane_bot::Result<()> {
        shutdown.cancelled().await;
        Ok(())
    }
}

struct BrokerDown;

#[async_trait]
impl Worker for BrokerDown {
    fn name(&self) -> &'static str {
        "broken"
    }

    async fn run(self: Box<Self>, _shutdown: CancellationToken) -> propane_bot::Result<()> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Err(BotError::connection_error("broker went away"))
    }
}

/// One failing worker brings the rest down and its error is reported
#[tokio::test]
async fn test_supervisor_fails_fast() {
    let token = CancellationToken::new();
    let mut supervisor = Supervisor::new(token.clone());
    supervisor.spawn(WaitForShutdown);
    supervisor.spawn(WaitForShutdown);
    supervisor.spawn(WaitForShutdown);
    supervisor.spawn(BrokerDown);
    assert_eq!(supervisor.len(), 4);

    let result = tokio::time::timeout(Duration::from_secs(5), supervisor.wait())
        .await
        .unwrap();
    assert!(matches!(result, Err(BotError::Connection(_))));
    assert!(token.is_cancelled());
}

#[tokio::test]
async fn test_supervisor_clean_shutdown() {
    let token = CancellationToken::new();
    let mut supervisor = Supervisor::new(token.clone());
    for _ in 0..4 {
        supervisor.spawn(WaitForShutdown);
    }

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let result = tokio::time::timeout(Duration::from_secs(5), supervisor.wait())
        .await
        .unwrap();
    tokio_test::assert_ok!(result);
}
