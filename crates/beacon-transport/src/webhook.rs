//! Webhook transport: the HTTP surface an agent exposes to the internet
//! (`/beacon/health`, `/.well-known/beacon.json`, `/beacon/inbox`) and
//! the client side that posts envelopes to a peer's webhook.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use beacon_codec::{decode_envelopes, AgentCard, Envelope};
use beacon_core::time::now_s;

use crate::error::TransportResult;

const USER_AGENT: &str = concat!("Beacon/", env!("CARGO_PKG_VERSION"), " (beacon-node)");
const DEFAULT_SEND_TIMEOUT_S: u64 = 15;

/// Per-envelope outcome reported back to a webhook POST caller.
#[derive(Debug, Clone, Serialize)]
pub struct IngestResult {
    pub nonce: String,
    pub kind: String,
    pub verified: Option<bool>,
}

/// The capability the webhook server's `/beacon/inbox` handler delegates
/// to. `beacon-inbox`'s `Inbox` is the production implementation; this
/// indirection keeps the transport crate ignorant of inbox persistence.
#[async_trait]
pub trait InboundSink: Send + Sync {
    async fn ingest(&self, platform: &str, from: &str, text: &str, envelopes: Vec<Envelope>) -> Vec<IngestResult>;
}

struct ServerState {
    identity_agent_id: Option<String>,
    agent_card: Option<AgentCard>,
    sink: Arc<dyn InboundSink>,
}

pub struct WebhookServer {
    router: Router,
}

impl WebhookServer {
    pub fn new(identity_agent_id: Option<String>, agent_card: Option<AgentCard>, sink: Arc<dyn InboundSink>) -> Self {
        let state = Arc::new(ServerState {
            identity_agent_id,
            agent_card,
            sink,
        });
        let router = Router::new()
            .route("/beacon/health", get(health))
            .route("/.well-known/beacon.json", get(agent_card))
            .route("/beacon/inbox", post(inbox))
            .with_state(state);
        Self { router }
    }

    /// Bind and serve until the process is killed or the listener errors.
    pub async fn serve(self, bind_addr: SocketAddr) -> TransportResult<()> {
        let listener = tokio::net::TcpListener::bind(bind_addr).await?;
        axum::serve(listener, self.router)
            .await
            .map_err(|e| crate::error::TransportError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        Ok(())
    }
}

async fn health(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let mut body = serde_json::json!({
        "ok": true,
        "beacon_version": env!("CARGO_PKG_VERSION"),
    });
    if let Some(agent_id) = &state.identity_agent_id {
        body["agent_id"] = Value::String(agent_id.clone());
    }
    (StatusCode::OK, Json(body))
}

async fn agent_card(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    match &state.agent_card {
        Some(card) => (StatusCode::OK, Json(serde_json::to_value(card).unwrap())).into_response(),
        None => (StatusCode::NOT_FOUND, Json(serde_json::json!({"error": "No agent card configured"}))).into_response(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InboxBody {
    Envelope(Envelope),
    Wrapped { text: String },
    Many(Vec<Envelope>),
    Raw(String),
}

async fn inbox(State(state): State<Arc<ServerState>>, body: String) -> impl IntoResponse {
    let envelopes: Vec<Envelope> = match serde_json::from_str::<InboxBody>(&body) {
        Ok(InboxBody::Envelope(env)) => vec![env],
        Ok(InboxBody::Many(envs)) => envs,
        Ok(InboxBody::Wrapped { text }) => decode_envelopes(&text),
        Ok(InboxBody::Raw(_)) | Err(_) => decode_envelopes(&body),
    };

    if envelopes.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": "No beacon envelopes found"})));
    }

    let results = state.sink.ingest("webhook", "webhook", &body, envelopes).await;
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "ok": true,
            "received": results.len(),
            "results": results,
        })),
    )
}

/// POST an envelope to a peer's `/beacon/inbox` endpoint.
pub async fn send(url: &str, envelope: &Envelope) -> TransportResult<Value> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(DEFAULT_SEND_TIMEOUT_S))
        .build()?;
    let resp = client
        .post(url)
        .header("Content-Type", "application/json")
        .header("User-Agent", USER_AGENT)
        .json(envelope)
        .send()
        .await?;
    let status = resp.status();
    match resp.json::<Value>().await {
        Ok(body) => Ok(body),
        Err(_) => Ok(serde_json::json!({"ok": status.is_success(), "status": status.as_u16()})),
    }
}

pub fn now() -> i64 {
    now_s()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingSink {
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl InboundSink for RecordingSink {
        async fn ingest(&self, platform: &str, from: &str, _text: &str, envelopes: Vec<Envelope>) -> Vec<IngestResult> {
            self.calls.lock().unwrap().push((platform.to_string(), from.to_string()));
            envelopes
                .into_iter()
                .map(|e| IngestResult { nonce: e.nonce, kind: e.kind, verified: None })
                .collect()
        }
    }

    #[tokio::test]
    async fn health_reports_ok_and_agent_id() {
        let sink = Arc::new(RecordingSink { calls: Mutex::new(Vec::new()) });
        let server = WebhookServer::new(Some("bcn_test".to_string()), None, sink);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, server.router).await.unwrap();
        });

        let resp = reqwest::get(format!("http://{addr}/beacon/health")).await.unwrap();
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["ok"], true);
        assert_eq!(body["agent_id"], "bcn_test");
    }

    #[tokio::test]
    async fn inbox_ingests_single_envelope() {
        let sink = Arc::new(RecordingSink { calls: Mutex::new(Vec::new()) });
        let server = WebhookServer::new(None, None, sink.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, server.router).await.unwrap();
        });

        let env = Envelope::new("hello", "n1").with_field("text", "hi");
        let client = reqwest::Client::new();
        let resp = client
            .post(format!("http://{addr}/beacon/inbox"))
            .json(&env)
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success());
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["received"], 1);
        assert_eq!(sink.calls.lock().unwrap().len(), 1);
    }
}
