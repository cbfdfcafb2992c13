//! Bot status server: health text, a log viewer page and a JSON log snapshot.
//!
//! Spawned as a background task by `whiz start`.

use axum::{
    extract::State,
    response::{Html, Json},
    routing::get,
    Router,
};
use serde_json::{json, Value};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};
use whiz_channels::whatsapp::WhatsAppTransport;
use whiz_core::{
    config::WebConfig, format::format_uptime, logbuf::LogBuffer, traits::Transport,
};

/// Shared state for status handlers.
#[derive(Clone)]
pub struct StatusState {
    name: String,
    logs: LogBuffer,
    started: Instant,
    transport: Option<Arc<dyn Transport>>,
}

impl StatusState {
    pub fn new(
        name: &str,
        logs: LogBuffer,
        started: Instant,
        transport: Option<Arc<dyn Transport>>,
    ) -> Self {
        Self {
            name: name.to_string(),
            logs,
            started,
            transport,
        }
    }

    fn connection(&self) -> &'static str {
        match &self.transport {
            Some(t) => match t.as_any().downcast_ref::<WhatsAppTransport>() {
                Some(wa) if wa.is_connected() => "connected",
                Some(_) => "disconnected",
                None => "unknown",
            },
            None => "not_configured",
        }
    }
}

/// `GET /`: plain-text health check.
async fn health(State(state): State<StatusState>) -> String {
    format!(
        "{} is running ✅\nWhatsApp: {}\nUptime: {}",
        state.name,
        state.connection(),
        format_uptime(state.started.elapsed())
    )
}

/// `GET /api/logs`: buffered log entries, oldest first.
async fn logs_json(State(state): State<StatusState>) -> Json<Value> {
    let entries = state.logs.snapshot();
    Json(json!({
        "count": entries.len(),
        "capacity": state.logs.capacity(),
        "logs": entries,
    }))
}

/// `GET /logs`: the same entries rendered as an HTML page.
async fn logs_page(State(state): State<StatusState>) -> Html<String> {
    Html(render_logs_page(&state))
}

fn render_logs_page(state: &StatusState) -> String {
    let entries = state.logs.snapshot();
    let mut rows = String::new();
    for entry in entries.iter().rev() {
        let _ = writeln!(
            rows,
            "<tr class=\"{level}\"><td>{ts}</td><td>{level}</td><td><pre>{msg}</pre></td></tr>",
            ts = entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            level = escape_html(&entry.level),
            msg = escape_html(&entry.message),
        );
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta http-equiv="refresh" content="10">
<title>{name} logs</title>
<style>
body {{ font-family: monospace; background: #111; color: #ddd; }}
table {{ border-collapse: collapse; width: 100%; }}
td {{ border-bottom: 1px solid #333; padding: 4px; vertical-align: top; }}
pre {{ margin: 0; white-space: pre-wrap; }}
.ERROR {{ color: #f66; }}
.WARN {{ color: #fc6; }}
</style>
</head>
<body>
<h1>{name}</h1>
<p>Uptime: {uptime} | WhatsApp: {conn} | Showing {count}/{capacity} most recent entries</p>
<table>
{rows}</table>
</body>
</html>
"#,
        name = escape_html(&state.name),
        uptime = format_uptime(state.started.elapsed()),
        conn = state.connection(),
        count = entries.len(),
        capacity = state.logs.capacity(),
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn build_router(state: StatusState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/logs", get(logs_page))
        .route("/api/logs", get(logs_json))
        .with_state(state)
}

/// Start the status server. Runs until the process exits.
pub async fn serve(config: WebConfig, state: StatusState) {
    let app = build_router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Status server failed to bind to {addr}: {e}");
            return;
        }
    };

    info!("Status server listening on {addr}");

    if let Err(e) = axum::serve(listener, app).await {
        error!("Status server error: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockTransport;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use whiz_core::logbuf::LogEntry;

    fn test_router(logs: LogBuffer, transport: Option<Arc<dyn Transport>>) -> Router {
        build_router(StatusState::new("WHIZ-MD", logs, Instant::now(), transport))
    }

    async fn body_string(resp: axum::http::Response<Body>) -> String {
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health_text() {
        let app = test_router(LogBuffer::default(), None);
        let req = Request::get("/").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let text = body_string(resp).await;
        assert!(text.starts_with("WHIZ-MD is running"));
        assert!(text.contains("WhatsApp: not_configured"));
    }

    #[tokio::test]
    async fn test_health_with_foreign_transport() {
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::default());
        let app = test_router(LogBuffer::default(), Some(transport));
        let req = Request::get("/").body(Body::empty()).unwrap();
        let text = body_string(app.oneshot(req).await.unwrap()).await;
        assert!(text.contains("WhatsApp: unknown"));
    }

    #[tokio::test]
    async fn test_logs_json_snapshot() {
        let logs = LogBuffer::new(2);
        logs.append(LogEntry::new("INFO", "first"));
        logs.append(LogEntry::new("WARN", "second"));
        logs.append(LogEntry::new("ERROR", "third"));
        let app = test_router(logs, None);

        let req = Request::get("/api/logs").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let json: Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(json["count"], 2);
        assert_eq!(json["capacity"], 2);
        assert_eq!(json["logs"][0]["message"], "second");
        assert_eq!(json["logs"][1]["level"], "ERROR");
    }

    #[tokio::test]
    async fn test_logs_page_escapes_messages() {
        let logs = LogBuffer::default();
        logs.append(LogEntry::new("INFO", "<script>alert(1)</script>"));
        let app = test_router(logs, None);

        let req = Request::get("/logs").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let html = body_string(resp).await;
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("Showing 1/200"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html(r#"a & "b" <c>"#), "a &amp; &quot;b&quot; &lt;c&gt;");
    }
}
