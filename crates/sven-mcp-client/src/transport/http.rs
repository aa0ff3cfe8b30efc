// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Streamable-HTTP MCP transport: a single endpoint, POST per request, a
//! response that is either a plain JSON-RPC object or an SSE stream.
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::Error;
use crate::transport::{dispatch_inbound, ConnectionShared};
use sven_config::{AuthKind, ServerConfig};

use super::Transport;

const SESSION_HEADER: &str = "mcp-session-id";

pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    auth: Option<String>,
    session_id: AsyncMutex<Option<String>>,
    shared: Arc<ConnectionShared>,
}

impl HttpTransport {
    pub fn new(cfg: &ServerConfig, secret: Option<String>, shared: Arc<ConnectionShared>) -> Result<Self, Error> {
        let url = cfg
            .url
            .clone()
            .ok_or_else(|| Error::ConfigInvalid(format!("server `{}` has no url", cfg.name)))?;
        let auth = match cfg.auth_kind {
            AuthKind::Bearer => Some(format!("Bearer {}", secret.unwrap_or_default())),
            AuthKind::None => None,
        };
        Ok(Self { client: reqwest::Client::new(), url, auth, session_id: AsyncMutex::new(None), shared })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, frame: Value) -> Result<(), Error> {
        let request_id = frame.get("id").and_then(Value::as_u64);

        let mut req = self
            .client
            .post(&self.url)
            .header("Accept", "application/json, text/event-stream")
            .json(&frame);
        if let Some(auth) = &self.auth {
            req = req.header("Authorization", auth);
        }
        if let Some(session) = self.session_id.lock().await.clone() {
            req = req.header(SESSION_HEADER, session);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| Error::TransportError(format!("http request failed: {e}")))?;

        if let Some(session) = resp.headers().get(SESSION_HEADER) {
            if let Ok(s) = session.to_str() {
                *self.session_id.lock().await = Some(s.to_string());
            }
        }

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(Error::TransportError(format!("http status {status}")));
        }

        let content_type = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if content_type.contains("text/event-stream") {
            let body = resp
                .text()
                .await
                .map_err(|e| Error::TransportError(format!("failed to read SSE body: {e}")))?;
            consume_sse_body(&self.shared, &body, request_id);
        } else {
            let body: Value = resp
                .json()
                .await
                .map_err(|e| Error::ProtocolError(format!("malformed JSON response: {e}")))?;
            dispatch_inbound(&self.shared, body);
        }

        Ok(())
    }

    async fn dispose(&self) {}
}

/// Parse a full SSE body (the streamable-HTTP response is read to
/// completion, not incrementally) and dispatch every `data:` payload that
/// decodes as JSON. Notifications not matching `request_id` are logged by
/// `dispatch_inbound` as unmatched.
fn consume_sse_body(shared: &ConnectionShared, body: &str, _request_id: Option<u64>) {
    for line in body.lines() {
        let Some(data) = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")) else {
            continue;
        };
        let data = data.trim();
        if data.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(data) {
            Ok(v) => dispatch_inbound(shared, v),
            Err(_) => shared.logs.push(format!("malformed SSE payload: {data}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ConnectionShared;

    #[test]
    fn consume_sse_body_dispatches_matching_response() {
        let shared = ConnectionShared::new();
        let body = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"ok\":true}}\n\n";
        consume_sse_body(&shared, body, Some(1));
        assert!(shared.correlation.in_flight_count() == 0);
    }

    #[test]
    fn consume_sse_body_skips_malformed_lines() {
        let shared = ConnectionShared::new();
        consume_sse_body(&shared, "data: not json\n", None);
        assert!(!shared.logs.is_empty());
    }
}

