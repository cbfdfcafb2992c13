//! HTTP surface of the session generator.

use super::{LinkFlow, LinkStatus, Linker};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{Html, Json},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use whiz_channels::whatsapp::qr_data_url;
use whiz_core::config::{digits_only, LinkerConfig};
use whiz_core::link::LinkMethod;

/// How long `request-pairing-code` waits for the code before answering `processing`.
const CODE_WAIT: Duration = Duration::from_millis(1500);

#[derive(Debug, Default, Deserialize)]
struct PairingRequest {
    #[serde(rename = "phoneNumber")]
    phone_number: Option<String>,
}

/// Claim the QR flow and start it in the background.
async fn start_qr(flow: &Arc<LinkFlow>) {
    match flow.begin().await {
        Ok(generation) => {
            tokio::spawn(flow.clone().launch(generation, LinkMethod::Qr));
        }
        Err(e) => debug!("QR flow not restarted: {e}"),
    }
}

/// `GET /qr-link`: (re)starts the QR flow when it is idle or failed.
async fn qr_link(State(linker): State<Arc<Linker>>) -> Html<&'static str> {
    match linker.qr.status() {
        LinkStatus::Idle => start_qr(&linker.qr).await,
        LinkStatus::Error(e) => {
            info!("previous QR attempt failed ({e}), reinitializing");
            start_qr(&linker.qr).await;
        }
        _ => {}
    }
    Html(QR_PAGE)
}

/// `GET /pairing-code-link`: clears a stale pairing error.
async fn pairing_link(State(linker): State<Arc<Linker>>) -> Html<&'static str> {
    if matches!(linker.pairing.status(), LinkStatus::Error(_)) {
        info!("clearing previous pairing error");
        linker.pairing.reset().await;
    }
    Html(PAIRING_PAGE)
}

pub(crate) fn qr_status_json(status: &LinkStatus) -> Value {
    match status {
        s if s.is_authenticated() => {
            json!({"status": "authenticated", "qrData": null, "error": s.error()})
        }
        LinkStatus::Error(e) => json!({"status": "error", "qrData": null, "error": e}),
        LinkStatus::QrReady(qr) => match qr_data_url(qr) {
            Ok(url) => json!({"status": "qr_ready", "qrData": url, "error": null}),
            Err(e) => {
                warn!("QR image generation failed: {e}");
                json!({"status": "error", "qrData": null, "error": "Error generating QR code image."})
            }
        },
        LinkStatus::Initializing | LinkStatus::CodeIssued(_) => {
            json!({"status": "initializing", "qrData": null, "error": null})
        }
        _ => json!({
            "status": "waiting",
            "qrData": null,
            "error": "Waiting for QR code generation...",
        }),
    }
}

/// `GET /api/get-qr`
async fn get_qr(State(linker): State<Arc<Linker>>) -> Json<Value> {
    Json(qr_status_json(&linker.qr.status()))
}

/// `GET /api/auth-status`
async fn auth_status(State(linker): State<Arc<Linker>>) -> Json<Value> {
    let status = linker.qr.status();
    Json(json!({
        "isAuthenticated": status.is_authenticated(),
        "error": status.error(),
    }))
}

/// `POST /api/new-qr-session`
async fn new_qr_session(State(linker): State<Arc<Linker>>) -> Json<Value> {
    info!("new QR session requested");
    linker.qr.reset().await;
    start_qr(&linker.qr).await;
    Json(json!({
        "status": "reinitializing",
        "message": "New QR session is being initialized. Please wait.",
    }))
}

/// `POST /api/request-pairing-code` with `{"phoneNumber": "..."}`.
async fn request_pairing_code(
    State(linker): State<Arc<Linker>>,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let request: PairingRequest = serde_json::from_slice(&body).unwrap_or_default();
    let phone_number = digits_only(request.phone_number.as_deref().unwrap_or_default());
    if phone_number.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"status": "error", "message": "Phone number is required."})),
        );
    }

    let flow = &linker.pairing;
    let generation = match flow.begin().await {
        Ok(g) => g,
        Err(_) => {
            return (
                StatusCode::CONFLICT,
                Json(json!({"status": "error", "message": super::CONFLICT_TEXT})),
            );
        }
    };

    info!("pairing code requested for {phone_number}");
    let mut updates = flow.subscribe();
    flow.clone()
        .launch(generation, LinkMethod::PairingCode { phone_number })
        .await;
    let settled = tokio::time::timeout(
        CODE_WAIT,
        updates.wait_for(|s| matches!(s, LinkStatus::CodeIssued(_)) || s.is_terminal()),
    )
    .await
    .is_ok();
    debug!("pairing code wait settled: {settled}");

    match flow.status() {
        LinkStatus::CodeIssued(code) => (
            StatusCode::OK,
            Json(json!({
                "status": "code_issued",
                "message": "Pairing code issued. Check below.",
                "pairingCode": code,
            })),
        ),
        LinkStatus::Error(e) | LinkStatus::DeliveryFailed(e) => {
            error!("pairing request failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"status": "error", "message": e})),
            )
        }
        _ => (
            StatusCode::ACCEPTED,
            Json(json!({
                "status": "processing",
                "message": "Processing request... If no code appears shortly, check server logs or try again.",
            })),
        ),
    }
}

pub(crate) fn pairing_status_json(status: &LinkStatus) -> Value {
    match status {
        s if s.is_authenticated() => json!({
            "status": "authenticated",
            "message": s.error().unwrap_or("Successfully authenticated with pairing code."),
        }),
        LinkStatus::Error(e) => json!({"status": "error", "message": e}),
        LinkStatus::CodeIssued(code) => json!({
            "status": "code_issued",
            "pairingCode": code,
            "message": "Pairing code issued. Please enter it on your phone.",
        }),
        LinkStatus::Initializing | LinkStatus::QrReady(_) => json!({
            "status": "initializing",
            "message": "Pairing client is initializing...",
        }),
        _ => json!({"status": "idle", "message": "Submit your phone number to start."}),
    }
}

/// `GET /api/pairing-auth-status`
async fn pairing_auth_status(State(linker): State<Arc<Linker>>) -> Json<Value> {
    Json(pairing_status_json(&linker.pairing.status()))
}

/// `POST /api/new-pairing-session`
async fn new_pairing_session(State(linker): State<Arc<Linker>>) -> Json<Value> {
    info!("new pairing session requested");
    linker.pairing.reset().await;
    Json(json!({
        "status": "reset",
        "message": "Pairing session reset. Please submit your phone number again.",
    }))
}

pub(crate) fn build_router(linker: Arc<Linker>) -> Router {
    Router::new()
        .route("/", get(|| async { Html(INDEX_PAGE) }))
        .route("/qr-link", get(qr_link))
        .route("/pairing-code-link", get(pairing_link))
        .route("/api/get-qr", get(get_qr))
        .route("/api/auth-status", get(auth_status))
        .route("/api/new-qr-session", post(new_qr_session))
        .route("/api/request-pairing-code", post(request_pairing_code))
        .route("/api/pairing-auth-status", get(pairing_auth_status))
        .route("/api/new-pairing-session", post(new_pairing_session))
        .layer(axum::extract::DefaultBodyLimit::max(16 * 1024))
        .with_state(linker)
}

/// Run the session generator until Ctrl-C, then tear both flows down.
pub async fn serve(config: &LinkerConfig, linker: Arc<Linker>) -> anyhow::Result<()> {
    let app = build_router(linker.clone());
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("session generator failed to bind to {addr}: {e}"))?;

    info!("Whiz Session Generator running on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for Ctrl-C: {e}");
            }
        })
        .await?;

    info!("Shutting down session generator...");
    linker.qr.reset().await;
    linker.pairing.reset().await;
    Ok(())
}

const INDEX_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Whiz Session Generator Home</title>
<style>
body { font-family: sans-serif; background: #0b141a; color: #e9edef; text-align: center; padding: 2em; }
a.button { display: inline-block; margin: 1em; padding: 1em 2em; background: #00a884; color: #fff; border-radius: 8px; text-decoration: none; }
</style>
</head>
<body>
<h1>WHIZ BOT Session Generator</h1>
<p>Link your WhatsApp account to get a session ID for your bot.</p>
<a class="button" href="/qr-link">Link with QR Code</a>
<a class="button" href="/pairing-code-link">Link with Pairing Code</a>
</body>
</html>
"#;

const QR_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Link with QR Code</title>
<style>
body { font-family: sans-serif; background: #0b141a; color: #e9edef; text-align: center; padding: 2em; }
img { background: #fff; padding: 1em; border-radius: 8px; }
button { padding: .8em 1.6em; }
</style>
</head>
<body>
<h1>Link with QR Code</h1>
<p>Open WhatsApp → Linked devices → Link a device, then scan the code.</p>
<div id="qr"></div>
<p id="status">Initializing...</p>
<button onclick="newSession()">New QR session</button>
<p><a href="/">Back</a></p>
<script>
async function poll() {
  try {
    const res = await fetch('/api/get-qr');
    const data = await res.json();
    const qr = document.getElementById('qr');
    const status = document.getElementById('status');
    if (data.status === 'qr_ready') {
      qr.innerHTML = '<img src="' + data.qrData + '" alt="QR code">';
      status.textContent = 'Scan the QR code with WhatsApp.';
    } else if (data.status === 'authenticated') {
      qr.innerHTML = '';
      status.textContent = data.error || 'Linked! Your session ID was sent to your WhatsApp.';
      return;
    } else if (data.status === 'error') {
      qr.innerHTML = '';
      status.textContent = data.error;
      return;
    } else {
      status.textContent = data.error || 'Initializing...';
    }
  } catch (e) {
    document.getElementById('status').textContent = 'Connection lost, retrying...';
  }
  setTimeout(poll, 3000);
}
async function newSession() {
  await fetch('/api/new-qr-session', { method: 'POST' });
  setTimeout(poll, 1000);
}
poll();
</script>
</body>
</html>
"#;

const PAIRING_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Link with Pairing Code</title>
<style>
body { font-family: sans-serif; background: #0b141a; color: #e9edef; text-align: center; padding: 2em; }
#code { font-size: 2em; letter-spacing: .2em; font-weight: bold; }
input, button { padding: .8em; }
</style>
</head>
<body>
<h1>Link with Pairing Code</h1>
<p>Enter your number in international format, without the leading +.</p>
<form onsubmit="requestCode(event)">
<input id="phone" placeholder="254700000000" required>
<button type="submit">Get code</button>
</form>
<p id="code"></p>
<p id="status"></p>
<button onclick="resetSession()">Start over</button>
<p><a href="/">Back</a></p>
<script>
let polling = null;
async function requestCode(event) {
  event.preventDefault();
  const phoneNumber = document.getElementById('phone').value;
  const res = await fetch('/api/request-pairing-code', {
    method: 'POST',
    headers: { 'Content-Type': 'application/json' },
    body: JSON.stringify({ phoneNumber })
  });
  const data = await res.json();
  document.getElementById('status').textContent = data.message;
  if (data.pairingCode) document.getElementById('code').textContent = data.pairingCode;
  if (!polling) polling = setInterval(poll, 3000);
}
async function poll() {
  const res = await fetch('/api/pairing-auth-status');
  const data = await res.json();
  document.getElementById('status').textContent = data.message;
  if (data.pairingCode) document.getElementById('code').textContent = data.pairingCode;
  if (data.status === 'authenticated' || data.status === 'error') {
    clearInterval(polling);
    polling = null;
  }
}
async function resetSession() {
  await fetch('/api/new-pairing-session', { method: 'POST' });
  document.getElementById('code').textContent = '';
  document.getElementById('status').textContent = 'Submit your phone number to start.';
}
</script>
</body>
</html>
"#;
