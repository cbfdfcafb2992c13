use super::web::{build_router, pairing_status_json, qr_status_json};
use super::*;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex as StdMutex;
use tower::ServiceExt;

const OWN_JID: &str = "254700000001@s.whatsapp.net";
const BLOB: &str = "WHIZBOT_c2Vzc2lvbg==";

/// Records what the flow did with the client.
#[derive(Default)]
struct Probe {
    destroyed: AtomicUsize,
    sent: StdMutex<Vec<(String, String)>>,
}

struct FakeSession {
    probe: Arc<Probe>,
    fail_send: bool,
}

#[async_trait]
impl LinkSession for FakeSession {
    async fn own_jid(&self) -> Option<String> {
        Some(OWN_JID.into())
    }

    async fn send_text(&self, jid: &str, text: &str) -> Result<(), WhizError> {
        if self.fail_send {
            return Err(WhizError::Transport("not connected".into()));
        }
        self.probe
            .sent
            .lock()
            .unwrap()
            .push((jid.to_string(), text.to_string()));
        Ok(())
    }

    async fn capture_session(&self) -> Result<String, WhizError> {
        Ok(BLOB.into())
    }

    async fn destroy(&self) -> Result<(), WhizError> {
        self.probe.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Backend whose attempts emit `script` immediately, then whatever the test pushes.
#[derive(Default)]
struct FakeBackend {
    probe: Arc<Probe>,
    script: Vec<LinkEvent>,
    fail_start: bool,
    fail_send: bool,
    starts: AtomicUsize,
    events: StdMutex<Option<mpsc::Sender<LinkEvent>>>,
}

impl FakeBackend {
    fn scripted(script: Vec<LinkEvent>) -> Self {
        Self {
            script,
            ..Default::default()
        }
    }

    /// Feed an event into the most recent attempt.
    fn push(&self, event: LinkEvent) {
        let tx = self.events.lock().unwrap().clone().unwrap();
        tx.try_send(event).unwrap();
    }
}

#[async_trait]
impl LinkBackend for FakeBackend {
    async fn start(
        &self,
        _method: &LinkMethod,
        session_dir: &Path,
    ) -> Result<(Box<dyn LinkSession>, mpsc::Receiver<LinkEvent>), WhizError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            return Err(WhizError::Link("browser missing".into()));
        }
        std::fs::create_dir_all(session_dir)?;
        std::fs::write(session_dir.join("whatsapp.db"), b"session")?;

        let (tx, rx) = mpsc::channel(16);
        for event in &self.script {
            tx.send(event.clone()).await.unwrap();
        }
        *self.events.lock().unwrap() = Some(tx);
        let session = FakeSession {
            probe: self.probe.clone(),
            fail_send: self.fail_send,
        };
        Ok((Box::new(session), rx))
    }
}

fn flow(backend: &Arc<FakeBackend>, dir: &Path, timeout: Duration) -> Arc<LinkFlow> {
    let backend: Arc<dyn LinkBackend> = backend.clone();
    Arc::new(LinkFlow::new("test", backend, dir.join("qr"), timeout).with_confirm_delay(Duration::ZERO))
}

/// Wait until the flow reports a status matching `pred`.
async fn settle(flow: &LinkFlow, pred: impl Fn(&LinkStatus) -> bool) -> LinkStatus {
    let mut rx = flow.subscribe();
    let _ = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| pred(s))).await;
    flow.status()
}

/// Give spawned tasks a chance to finish their teardown.
async fn quiesce() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

// --- LinkStatus ---

#[test]
fn test_status_classification() {
    assert!(!LinkStatus::Idle.is_active());
    assert!(LinkStatus::Initializing.is_active());
    assert!(LinkStatus::QrReady("x".into()).is_active());
    assert!(LinkStatus::Authenticated.is_active());
    assert!(LinkStatus::Delivered.is_terminal());
    assert!(LinkStatus::Error("x".into()).is_terminal());
    assert!(LinkStatus::DeliveryFailed("x".into()).is_authenticated());
    assert_eq!(LinkStatus::DeliveryFailed("boom".into()).error(), Some("boom"));
}

#[test]
fn test_confirmation_texts() {
    assert!(confirmation_text(&LinkMethod::Qr).starts_with("*QR HAS BEEN SCANNED SUCCESSFULLY* ✅"));
    let pairing = confirmation_text(&LinkMethod::PairingCode {
        phone_number: "254700000001".into(),
    });
    assert!(pairing.starts_with("*SUCCESS PAIRING CODE WAS CORRECT* ✅"));
    assert!(pairing.ends_with("*WHIZ BOT* 🥀"));
}

// --- State machine ---

#[tokio::test]
async fn test_qr_event_enters_qr_ready() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend::scripted(vec![LinkEvent::Qr("2@abc,def".into())]));
    let flow = flow(&backend, tmp.path(), Duration::from_secs(30));

    flow.start(LinkMethod::Qr).await.unwrap();

    let status = settle(&flow, |s| matches!(s, LinkStatus::QrReady(_))).await;
    assert_eq!(status, LinkStatus::QrReady("2@abc,def".into()));
    assert!(flow.session_dir().exists());
}

#[tokio::test]
async fn test_authenticated_delivers_exactly_once() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend::scripted(vec![
        LinkEvent::Qr("2@abc".into()),
        LinkEvent::Authenticated,
        LinkEvent::Authenticated,
    ]));
    let flow = flow(&backend, tmp.path(), Duration::from_secs(30));

    flow.start(LinkMethod::Qr).await.unwrap();
    let status = settle(&flow, LinkStatus::is_terminal).await;
    quiesce().await;

    assert_eq!(status, LinkStatus::Delivered);
    let sent = backend.probe.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0], (OWN_JID.to_string(), BLOB.to_string()));
    assert_eq!(sent[1].1, confirmation_text(&LinkMethod::Qr));
    assert_eq!(backend.probe.destroyed.load(Ordering::SeqCst), 1);
    assert!(!flow.session_dir().exists());
}

#[tokio::test]
async fn test_timeout_errors_with_one_teardown() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend::scripted(vec![LinkEvent::Qr("2@abc".into())]));
    let flow = flow(&backend, tmp.path(), Duration::from_millis(100));

    flow.start(LinkMethod::Qr).await.unwrap();
    let status = settle(&flow, LinkStatus::is_terminal).await;
    quiesce().await;

    assert_eq!(status, LinkStatus::Error(TIMEOUT_TEXT.into()));
    assert_eq!(backend.probe.destroyed.load(Ordering::SeqCst), 1);
    assert!(!flow.session_dir().exists());
}

#[tokio::test]
async fn test_teardown_twice_is_harmless() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend::scripted(vec![LinkEvent::Qr("2@abc".into())]));
    let flow = flow(&backend, tmp.path(), Duration::from_secs(30));

    flow.start(LinkMethod::Qr).await.unwrap();
    settle(&flow, |s| matches!(s, LinkStatus::QrReady(_))).await;

    flow.reset().await;
    flow.reset().await;

    assert_eq!(flow.status(), LinkStatus::Idle);
    assert_eq!(backend.probe.destroyed.load(Ordering::SeqCst), 1);
    assert!(!flow.session_dir().exists());
}

#[tokio::test]
async fn test_reset_on_idle_flow_without_client() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend::default());
    let flow = flow(&backend, tmp.path(), Duration::from_secs(30));

    flow.reset().await;
    assert_eq!(flow.status(), LinkStatus::Idle);
    assert_eq!(backend.probe.destroyed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_auth_failure_is_terminal() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend::scripted(vec![
        LinkEvent::Qr("2@abc".into()),
        LinkEvent::AuthFailure("bad code".into()),
        LinkEvent::Qr("2@late".into()),
    ]));
    let flow = flow(&backend, tmp.path(), Duration::from_secs(30));

    flow.start(LinkMethod::Qr).await.unwrap();
    let status = settle(&flow, LinkStatus::is_terminal).await;
    quiesce().await;

    assert_eq!(
        status,
        LinkStatus::Error("Authentication Failed: bad code. Please try again.".into())
    );
    assert_eq!(backend.probe.destroyed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_disconnect_before_auth_is_error() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend::scripted(vec![LinkEvent::Disconnected(
        "stream closed".into(),
    )]));
    let flow = flow(&backend, tmp.path(), Duration::from_secs(30));

    flow.start(LinkMethod::Qr).await.unwrap();
    let status = settle(&flow, LinkStatus::is_terminal).await;
    assert_eq!(status, LinkStatus::Error(DISCONNECTED_TEXT.into()));
}

#[tokio::test]
async fn test_disconnect_after_delivery_keeps_success() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend::scripted(vec![LinkEvent::Authenticated]));
    let flow = flow(&backend, tmp.path(), Duration::from_secs(30));

    flow.start(LinkMethod::Qr).await.unwrap();
    settle(&flow, LinkStatus::is_terminal).await;
    backend.push(LinkEvent::Disconnected("logged out".into()));
    quiesce().await;

    assert_eq!(flow.status(), LinkStatus::Delivered);
}

#[tokio::test]
async fn test_delivery_failure_reported_as_authenticated_error() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend {
        script: vec![LinkEvent::PairingCode("ABCD-1234".into()), LinkEvent::Authenticated],
        fail_send: true,
        ..Default::default()
    });
    let flow = flow(&backend, tmp.path(), Duration::from_secs(30));

    flow.start(LinkMethod::PairingCode {
        phone_number: "254700000001".into(),
    })
    .await
    .unwrap();
    let status = settle(&flow, LinkStatus::is_terminal).await;

    let LinkStatus::DeliveryFailed(msg) = status else {
        panic!("expected delivery failure, got {status:?}");
    };
    assert!(msg.starts_with("Failed to send session/info to your WhatsApp: "));
}

#[tokio::test]
async fn test_active_flow_rejects_second_attempt() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend::scripted(vec![LinkEvent::Qr("2@abc".into())]));
    let flow = flow(&backend, tmp.path(), Duration::from_secs(30));

    flow.start(LinkMethod::Qr).await.unwrap();
    let err = flow.begin().await.unwrap_err();
    assert!(err.to_string().contains(CONFLICT_TEXT));
    assert_eq!(backend.starts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_errored_flow_can_restart() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend::scripted(vec![LinkEvent::AuthFailure(
        "expired".into(),
    )]));
    let flow = flow(&backend, tmp.path(), Duration::from_secs(30));

    let first = flow.start(LinkMethod::Qr).await.unwrap();
    settle(&flow, LinkStatus::is_terminal).await;
    let second = flow.begin().await.unwrap();

    assert!(second > first);
    assert_eq!(flow.status(), LinkStatus::Initializing);
}

#[tokio::test]
async fn test_stale_events_are_ignored_after_reset() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend::default());
    let flow = flow(&backend, tmp.path(), Duration::from_secs(30));

    flow.start(LinkMethod::Qr).await.unwrap();
    flow.reset().await;
    backend.push(LinkEvent::Authenticated);
    quiesce().await;

    assert_eq!(flow.status(), LinkStatus::Idle);
    assert!(backend.probe.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_backend_start_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend {
        fail_start: true,
        ..Default::default()
    });
    let flow = flow(&backend, tmp.path(), Duration::from_secs(30));

    flow.start(LinkMethod::Qr).await.unwrap();
    let status = flow.status();
    let LinkStatus::Error(msg) = status else {
        panic!("expected error, got {status:?}");
    };
    assert!(msg.starts_with("Failed to initialize WhatsApp client for QR"));
}

// --- Status payloads ---

#[test]
fn test_qr_status_payloads() {
    let idle = qr_status_json(&LinkStatus::Idle);
    assert_eq!(idle["status"], "waiting");
    assert_eq!(idle["error"], "Waiting for QR code generation...");

    let ready = qr_status_json(&LinkStatus::QrReady("2@abc".into()));
    assert_eq!(ready["status"], "qr_ready");
    assert!(ready["qrData"]
        .as_str()
        .unwrap()
        .starts_with("data:image/png;base64,"));

    let failed = qr_status_json(&LinkStatus::DeliveryFailed("oops".into()));
    assert_eq!(failed["status"], "authenticated");
    assert_eq!(failed["error"], "oops");

    let done = qr_status_json(&LinkStatus::Delivered);
    assert_eq!(done["status"], "authenticated");
    assert!(done["error"].is_null());
}

#[test]
fn test_pairing_status_payloads() {
    assert_eq!(pairing_status_json(&LinkStatus::Idle)["status"], "idle");
    let issued = pairing_status_json(&LinkStatus::CodeIssued("ABCD-1234".into()));
    assert_eq!(issued["status"], "code_issued");
    assert_eq!(issued["pairingCode"], "ABCD-1234");
    assert_eq!(
        pairing_status_json(&LinkStatus::Delivered)["message"],
        "Successfully authenticated with pairing code."
    );
    assert_eq!(
        pairing_status_json(&LinkStatus::Initializing)["message"],
        "Pairing client is initializing..."
    );
}

// --- HTTP ---

fn linker(backend: &Arc<FakeBackend>, dir: &Path) -> Arc<Linker> {
    let backend: Arc<dyn LinkBackend> = backend.clone();
    Arc::new(Linker::new(backend, dir, Duration::from_secs(30)))
}

async fn body_json(resp: axum::http::Response<Body>) -> Value {
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

fn pairing_request(body: &str) -> Request<Body> {
    Request::post("/api/request-pairing-code")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_request_pairing_code_requires_number() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend::default());
    let app = build_router(linker(&backend, tmp.path()));

    let resp = app
        .oneshot(pairing_request(r#"{"phoneNumber": "+ -"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let json = body_json(resp).await;
    assert_eq!(json["message"], "Phone number is required.");
    assert_eq!(backend.starts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_request_pairing_code_issues_then_conflicts() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend::scripted(vec![LinkEvent::PairingCode(
        "ABCD-1234".into(),
    )]));
    let app = build_router(linker(&backend, tmp.path()));

    let resp = app
        .clone()
        .oneshot(pairing_request(r#"{"phoneNumber": "+254 700-000-001"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "code_issued");
    assert_eq!(json["pairingCode"], "ABCD-1234");

    let resp = app
        .clone()
        .oneshot(pairing_request(r#"{"phoneNumber": "254700000001"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = app
        .clone()
        .oneshot(Request::post("/api/new-pairing-session").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["status"], "reset");

    let resp = app
        .oneshot(Request::get("/api/pairing-auth-status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["status"], "idle");
}

#[tokio::test]
async fn test_request_pairing_code_without_code_is_processing() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend::default());
    let app = build_router(linker(&backend, tmp.path()));

    let resp = app
        .oneshot(pairing_request(r#"{"phoneNumber": "254700000001"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    assert_eq!(body_json(resp).await["status"], "processing");
}

#[tokio::test]
async fn test_request_pairing_code_start_failure_is_500() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend {
        fail_start: true,
        ..Default::default()
    });
    let app = build_router(linker(&backend, tmp.path()));

    let resp = app
        .oneshot(pairing_request(r#"{"phoneNumber": "254700000001"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(resp).await;
    assert!(json["message"]
        .as_str()
        .unwrap()
        .starts_with("Failed to initialize WhatsApp client for PairingCode"));
}

#[tokio::test]
async fn test_qr_link_page_starts_flow() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend::scripted(vec![LinkEvent::Qr("2@abc".into())]));
    let linker = linker(&backend, tmp.path());
    let app = build_router(linker.clone());

    let resp = app
        .clone()
        .oneshot(Request::get("/qr-link").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    settle(&linker.qr, |s| matches!(s, LinkStatus::QrReady(_))).await;
    let resp = app
        .oneshot(Request::get("/api/get-qr").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["status"], "qr_ready");
    assert_eq!(backend.starts.load(Ordering::SeqCst), 1);
    assert_eq!(linker.pairing.status(), LinkStatus::Idle);
}

#[tokio::test]
async fn test_auth_status_reports_qr_flow() {
    let tmp = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend::default());
    let app = build_router(linker(&backend, tmp.path()));

    let resp = app
        .oneshot(Request::get("/api/auth-status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["isAuthenticated"], false);
    assert!(json["error"].is_null());
}
