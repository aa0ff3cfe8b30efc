// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Legacy SSE MCP transport: a long-lived `GET {url}/sse` event stream plus
//! `POST {url}/message` for outbound requests.
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::error::Error;
use crate::transport::{dispatch_inbound, ConnectionShared};
use crate::types::ConnectionStatus;
use sven_config::{AuthKind, ServerConfig};

use super::Transport;

pub struct LegacySseTransport {
    client: reqwest::Client,
    message_url: String,
    auth: Option<String>,
    endpoint_session: AsyncMutex<Option<String>>,
    cancel: mpsc::Sender<()>,
}

impl LegacySseTransport {
    pub fn connect(cfg: &ServerConfig, secret: Option<String>, shared: Arc<ConnectionShared>) -> Result<Arc<Self>, Error> {
        let base = cfg
            .url
            .clone()
            .ok_or_else(|| Error::ConfigInvalid(format!("server `{}` has no url", cfg.name)))?;
        let auth = match cfg.auth_kind {
            AuthKind::Bearer => Some(format!("Bearer {}", secret.unwrap_or_default())),
            AuthKind::None => None,
        };
        let sse_url = format!("{}/sse", base.trim_end_matches('/'));
        let message_url = format!("{}/message", base.trim_end_matches('/'));

        let (cancel_tx, cancel_rx) = mpsc::channel(1);
        let transport = Arc::new(Self {
            client: reqwest::Client::new(),
            message_url,
            auth: auth.clone(),
            endpoint_session: AsyncMutex::new(None),
            cancel: cancel_tx,
        });

        spawn_event_reader(transport.client.clone(), sse_url, auth, shared, Arc::clone(&transport), cancel_rx);
        Ok(transport)
    }
}

fn spawn_event_reader(
    client: reqwest::Client,
    sse_url: String,
    auth: Option<String>,
    shared: Arc<ConnectionShared>,
    transport: Arc<LegacySseTransport>,
    mut cancel_rx: mpsc::Receiver<()>,
) {
    tokio::spawn(async move {
        let mut req = client.get(&sse_url);
        if let Some(auth) = &auth {
            req = req.header("Authorization", auth.clone());
        }
        let resp = match req.send().await {
            Ok(r) => r,
            Err(e) => {
                shared.logs.push(format!("legacy sse connect failed: {e}"));
                shared.set_status(ConnectionStatus::Error);
                return;
            }
        };

        let mut byte_stream = resp.bytes_stream();
        let mut buf = String::new();
        let mut pending_event: Option<String> = None;

        loop {
            tokio::select! {
                _ = cancel_rx.recv() => break,
                chunk = byte_stream.next() => {
                    let Some(chunk) = chunk else { break };
                    let Ok(bytes) = chunk else { break };
                    buf.push_str(&String::from_utf8_lossy(&bytes));
                    while let Some(pos) = buf.find('\n') {
                        let line = buf[..pos].trim_end_matches('\r').to_string();
                        buf = buf[pos + 1..].to_string();
                        handle_line(&line, &mut pending_event, &shared, &transport).await;
                    }
                }
            }
        }
        shared.set_status(ConnectionStatus::Stopped);
        shared.correlation.drain_with_error(|| Error::TransportError("transport closed".into()));
    });
}

async fn handle_line(
    line: &str,
    pending_event: &mut Option<String>,
    shared: &Arc<ConnectionShared>,
    transport: &Arc<LegacySseTransport>,
) {
    if let Some(event) = line.strip_prefix("event: ").or_else(|| line.strip_prefix("event:")) {
        *pending_event = Some(event.trim().to_string());
        return;
    }
    let Some(data) = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")) else {
        return;
    };
    let data = data.trim();
    let event = pending_event.take().unwrap_or_else(|| "message".to_string());

    if event == "endpoint" {
        *transport.endpoint_session.lock().await = Some(data.to_string());
        shared.set_status(ConnectionStatus::Connected);
        return;
    }
    match serde_json::from_str::<Value>(data) {
        Ok(v) => dispatch_inbound(shared, v),
        Err(_) => shared.logs.push(format!("malformed legacy-sse payload: {data}")),
    }
}

#[async_trait]
impl Transport for LegacySseTransport {
    async fn send(&self, frame: Value) -> Result<(), Error> {
        let mut req = self.client.post(&self.message_url).json(&frame);
        if let Some(auth) = &self.auth {
            req = req.header("Authorization", auth);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| Error::TransportError(format!("legacy-sse post failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(Error::TransportError(format!("legacy-sse post status {}", resp.status())));
        }
        Ok(())
    }

    async fn dispose(&self) {
        let _ = self.cancel.send(()).await;
    }
}
