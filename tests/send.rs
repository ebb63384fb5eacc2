//! Send orchestration tests against a fake SparkPost API.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::post;
use axum::Router;
use serde_json::{json, Value};
use sparkpost_relay::{
    CallbackTransport, ContactRef, DncLedger, DncReason, Error, Message, RecipientKind, RecipientMetadata, Region,
    SendEvent, SendListener, SendResult, SparkpostConfig, SparkpostTransport, Transport,
    ValidationError,
};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tracing_test::traced_test;

/// Canned answers and a log of what the fake vendor received.
#[derive(Clone)]
struct FakeVendor {
    preview: (u16, Value),
    transmission: (u16, Value),
    requests: Arc<Mutex<Vec<(String, Value, Option<String>)>>>,
}

impl FakeVendor {
    fn accepting(total: usize) -> Self {
        Self {
            preview: (200, json!({"results": {"subject": "ok"}})),
            transmission: (
                200,
                json!({"results": {"total_rejected_recipients": 0, "total_accepted_recipients": total, "id": "11668787484950529"}}),
            ),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn paths(&self) -> Vec<String> {
        self.requests.lock().unwrap().iter().map(|r| r.0.clone()).collect()
    }

    fn body(&self, path: &str) -> Value {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.0 == path)
            .map(|r| r.1.clone())
            .unwrap()
    }

    fn record(&self, path: &str, headers: &HeaderMap, body: Value) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        self.requests.lock().unwrap().push((path.to_string(), body, auth));
    }
}

fn reply((status, body): (u16, Value)) -> Response {
    (StatusCode::from_u16(status).unwrap(), Json(body)).into_response()
}

async fn preview_handler(
    State(vendor): State<FakeVendor>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    vendor.record("preview", &headers, body);
    reply(vendor.preview.clone())
}

async fn transmission_handler(
    State(vendor): State<FakeVendor>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    vendor.record("transmissions", &headers, body);
    reply(vendor.transmission.clone())
}

async fn start_vendor(vendor: FakeVendor) -> SocketAddr {
    let app = Router::new()
        .route("/api/v1/utils/content-previewer", post(preview_handler))
        .route("/api/v1/transmissions", post(transmission_handler))
        .with_state(vendor);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn config(addr: SocketAddr) -> SparkpostConfig {
    SparkpostConfig {
        api_key: "test-key".to_string(),
        base_url: Some(format!("http://{addr}/api/v1/")),
        ..Default::default()
    }
}

fn message() -> Message {
    let mut message = Message::builder()
        .from("Sender <sender@example.com>")
        .to("amy@example.com")
        .cc("carl@example.com")
        .subject("Hi {firstname}")
        .html("<p>Hello {firstname}</p>")
        .build()
        .unwrap();
    message.add_metadata(
        "amy@example.com",
        RecipientMetadata {
            tokens: BTreeMap::from([("{firstname}".to_string(), "Amy".to_string())]),
            lead_id: Some(42),
            email_id: Some(7),
            hash_id: Some("h-amy".to_string()),
            ..Default::default()
        },
    );
    message
}

#[derive(Default)]
struct Recorder {
    cancel: bool,
    before: Mutex<Vec<SendEvent>>,
    after: Mutex<Vec<SendEvent>>,
}

impl SendListener for Recorder {
    fn before_send(&self, event: &SendEvent) -> bool {
        self.before.lock().unwrap().push(event.clone());
        !self.cancel
    }

    fn send_performed(&self, event: &SendEvent) {
        self.after.lock().unwrap().push(event.clone());
    }
}

#[tokio::test]
async fn test_accepted_count_and_success_event() {
    let vendor = FakeVendor::accepting(3);
    let addr = start_vendor(vendor.clone()).await;
    let recorder = Arc::new(Recorder::default());
    let transport = SparkpostTransport::new(&config(addr), Arc::new(DncLedger::new()))
        .unwrap()
        .with_listener(recorder.clone());

    let mut message = message();
    let sent = transport.send(&mut message).await.unwrap();

    assert_eq!(sent, 3);
    assert_eq!(vendor.paths(), vec!["preview", "transmissions"]);

    let after = recorder.after.lock().unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].result, SendResult::Success);
    assert_eq!(after[0].recipients, vec!["amy@example.com", "carl@example.com"]);

    // Metadata does not survive the send.
    assert!(message.metadata().is_empty());
}

#[tokio::test]
async fn test_wire_payloads() {
    let vendor = FakeVendor::accepting(2);
    let addr = start_vendor(vendor.clone()).await;
    let transport = SparkpostTransport::new(&config(addr), Arc::new(DncLedger::new())).unwrap();

    transport.send(&mut message()).await.unwrap();

    let preview = vendor.body("preview");
    assert!(preview.get("recipients").is_none());
    assert_eq!(preview["substitution_data"], json!({"FIRSTNAME": "Amy"}));

    let transmission = vendor.body("transmissions");
    assert_eq!(transmission["content"]["subject"], json!("Hi {{{ FIRSTNAME }}}"));
    assert_eq!(transmission["campaign_id"], json!("7"));
    assert_eq!(transmission["recipients"][0]["metadata"]["hashId"], json!("h-amy"));
    assert_eq!(transmission["recipients"][1]["header_to"], json!("amy@example.com"));

    let auth = vendor.requests.lock().unwrap()[0].2.clone();
    assert_eq!(auth.as_deref(), Some("test-key"));
}

#[tokio::test]
async fn test_zero_accepted_reports_failure() {
    let vendor = FakeVendor::accepting(0);
    let addr = start_vendor(vendor).await;
    let recorder = Arc::new(Recorder::default());
    let transport = SparkpostTransport::new(&config(addr), Arc::new(DncLedger::new()))
        .unwrap()
        .with_listener(recorder.clone());

    assert_eq!(transport.send(&mut message()).await.unwrap(), 0);
    assert_eq!(recorder.after.lock().unwrap()[0].result, SendResult::Failed);
}

#[tokio::test]
async fn test_cancelled_send_makes_no_call() {
    let vendor = FakeVendor::accepting(3);
    let addr = start_vendor(vendor.clone()).await;
    let recorder = Arc::new(Recorder {
        cancel: true,
        ..Default::default()
    });
    let transport = SparkpostTransport::new(&config(addr), Arc::new(DncLedger::new()))
        .unwrap()
        .with_listener(recorder.clone());

    let mut message = message();
    assert_eq!(transport.send(&mut message).await.unwrap(), 0);
    assert!(vendor.paths().is_empty());
    assert_eq!(recorder.before.lock().unwrap().len(), 1);
    assert!(recorder.after.lock().unwrap().is_empty());
    assert!(message.metadata().is_empty());
}

#[tokio::test]
#[traced_test]
async fn test_preview_forbidden_only_warns() {
    let mut vendor = FakeVendor::accepting(1);
    vendor.preview = (403, json!({"errors": [{"message": "Forbidden."}]}));
    let addr = start_vendor(vendor.clone()).await;
    let transport = SparkpostTransport::new(&config(addr), Arc::new(DncLedger::new())).unwrap();

    assert_eq!(transport.send(&mut message()).await.unwrap(), 1);
    assert_eq!(vendor.paths(), vec!["preview", "transmissions"]);
    assert!(logs_contain("Templates: Preview"));
}

#[tokio::test]
#[traced_test]
async fn test_preview_server_error_does_not_block_send() {
    let mut vendor = FakeVendor::accepting(2);
    vendor.preview = (500, json!({}));
    let addr = start_vendor(vendor.clone()).await;
    let transport = SparkpostTransport::new(&config(addr), Arc::new(DncLedger::new())).unwrap();

    assert_eq!(transport.send(&mut message()).await.unwrap(), 2);
    assert_eq!(vendor.paths(), vec!["preview", "transmissions"]);
    assert!(logs_contain("HTTP 500"));
}

#[tokio::test]
async fn test_invalid_template_aborts_before_transmission() {
    let mut vendor = FakeVendor::accepting(1);
    vendor.preview = (
        422,
        json!({"errors": [{"message": "substitution language syntax error in template content", "description": "Error while compiling header Subject", "code": "3000"}]}),
    );
    let addr = start_vendor(vendor.clone()).await;
    let transport = SparkpostTransport::new(&config(addr), Arc::new(DncLedger::new())).unwrap();

    let err = transport.send(&mut message()).await.unwrap_err();

    assert!(matches!(err, Error::Transport { .. }));
    assert_eq!(
        err.validation(),
        Some(&ValidationError::TemplateInvalid(
            "Error while compiling header Subject".to_string()
        ))
    );
    assert_eq!(err.to_string(), "Error while compiling header Subject");
    assert_eq!(vendor.paths(), vec!["preview"]);
}

#[tokio::test]
async fn test_missing_subject_makes_no_call() {
    let vendor = FakeVendor::accepting(1);
    let addr = start_vendor(vendor.clone()).await;
    let transport = SparkpostTransport::new(&config(addr), Arc::new(DncLedger::new())).unwrap();

    let mut message = Message::builder()
        .from("sender@example.com")
        .to("amy@example.com")
        .text("no subject")
        .build()
        .unwrap();
    let err = transport.send(&mut message).await.unwrap_err();

    assert_eq!(err.validation(), Some(&ValidationError::MissingSubject));
    assert!(vendor.paths().is_empty());
}

#[tokio::test]
async fn test_invalid_recipient_records_immediate_bounce() {
    let mut vendor = FakeVendor::accepting(0);
    vendor.transmission = (
        400,
        json!({"errors": [{"message": "Invalid recipient", "code": "1902"}]}),
    );
    let addr = start_vendor(vendor).await;
    let ledger = Arc::new(DncLedger::new());
    let recorder = Arc::new(Recorder::default());
    let transport = SparkpostTransport::new(&config(addr), ledger.clone())
        .unwrap()
        .with_listener(recorder.clone());

    let err = transport.send(&mut message()).await.unwrap_err();

    assert_eq!(err.to_string(), "Invalid recipient");
    let entries = ledger.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].target, ContactRef::ContactId(42));
    assert_eq!(entries[0].reason, DncReason::Bounced);
    assert_eq!(entries[0].email_id, Some(7));
    assert_eq!(entries[0].comments, "Invalid recipient");
    assert!(recorder.after.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_other_vendor_errors_do_not_touch_contacts() {
    let mut vendor = FakeVendor::accepting(0);
    vendor.transmission = (
        400,
        json!({"errors": [{"description": "Unconfigured Sending Domain", "message": "invalid data format/type", "code": 7001}]}),
    );
    let addr = start_vendor(vendor).await;
    let ledger = Arc::new(DncLedger::new());
    let transport = SparkpostTransport::new(&config(addr), ledger.clone()).unwrap();

    let err = transport.send(&mut message()).await.unwrap_err();

    assert_eq!(err.to_string(), "Unconfigured Sending Domain");
    assert!(ledger.is_empty());
}

#[tokio::test]
async fn test_unreachable_vendor_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let transport = SparkpostTransport::new(&config(addr), Arc::new(DncLedger::new())).unwrap();
    let err = transport.send(&mut message()).await.unwrap_err();

    assert!(matches!(err, Error::Transport { source: Some(_), .. }));
}

#[test]
fn test_missing_api_key_is_a_config_error() {
    let result = SparkpostTransport::new(&SparkpostConfig::default(), Arc::new(DncLedger::new()));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_batch_limits() {
    let transport = SparkpostTransport::new(
        &SparkpostConfig {
            api_key: "k".to_string(),
            ..Default::default()
        },
        Arc::new(DncLedger::new()),
    )
    .unwrap();

    assert_eq!(transport.max_batch_limit(), 5000);
    assert_eq!(
        transport.batch_recipient_count(&message(), 1, RecipientKind::To),
        3
    );
}

#[test]
fn test_region_hosts() {
    assert_eq!(Region::from_name(Some("eu")).host(), "api.eu.sparkpost.com");
    assert_eq!(Region::from_name(Some("EU")), Region::Eu);
    assert_eq!(Region::from_name(Some("apac")).host(), "api.sparkpost.com");
    assert_eq!(Region::from_name(None), Region::Us);

    let config = SparkpostConfig {
        region: Region::Eu,
        ..Default::default()
    };
    assert_eq!(config.endpoint(), "https://api.eu.sparkpost.com/api/v1");
}

#[test]
fn test_webhook_shares_the_transport_contacts() {
    let ledger = Arc::new(DncLedger::new());
    let transport = SparkpostTransport::new(
        &SparkpostConfig {
            api_key: "k".to_string(),
            ..Default::default()
        },
        ledger.clone(),
    )
    .unwrap();
    let webhook = transport.webhook();

    let applied = webhook.process_callback(&json!([{"msys": {"message_event": {
        "type": "bounce",
        "bounce_class": 10,
        "rcpt_to": "amy@example.com",
        "raw_reason": "550 unknown user"
    }}}]));

    assert_eq!(webhook.callback_path(), "sparkpost");
    assert_eq!(applied, 1);
    assert_eq!(
        ledger.entries()[0].target,
        ContactRef::Address("amy@example.com".to_string())
    );
}
