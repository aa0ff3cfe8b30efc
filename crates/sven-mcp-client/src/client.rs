// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Transport-agnostic JSON-RPC 2.0 client: the `initialize` handshake,
//! `tools/list`, `tools/call`, and request/response correlation.
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::Error;
use crate::transport::{ConnectionShared, Transport};
use crate::types::{ConnectionStatus, ToolDescriptor};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const PROTOCOL_VERSION: &str = "2024-11-05";

pub struct McpClient {
    transport: Arc<dyn Transport>,
    shared: Arc<ConnectionShared>,
}

impl McpClient {
    pub fn new(transport: Arc<dyn Transport>, shared: Arc<ConnectionShared>) -> Self {
        Self { transport, shared }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.status()
    }

    pub fn logs(&self, max_lines: usize) -> Vec<String> {
        self.shared.logs.tail(max_lines)
    }

    /// Perform the `initialize` handshake, then best-effort-send
    /// `notifications/initialized`. A server that rejects the notification
    /// is logged, not treated as fatal.
    pub async fn initialize(&self) -> Result<Value, Error> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": { "name": "mcp-chat-core", "version": env!("CARGO_PKG_VERSION") },
        });
        let result = self.request("initialize", params).await?;

        if let Err(e) = self.notify("notifications/initialized", json!({})).await {
            warn!(error = %e, "notifications/initialized was rejected by server");
        }
        self.shared.set_status(ConnectionStatus::Connected);
        Ok(result)
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, Error> {
        let result = self.request("tools/list", json!({})).await?;
        match result.get("tools").and_then(Value::as_array) {
            Some(tools) => Ok(tools
                .iter()
                .filter_map(|t| serde_json::from_value::<ToolDescriptor>(t.clone()).ok())
                .collect()),
            None => {
                warn!("tools/list response missing `tools` array");
                Ok(Vec::new())
            }
        }
    }

    pub async fn call_tool(&self, name: &str, args: Value) -> Result<Value, Error> {
        let params = json!({ "name": name, "arguments": args });
        self.request("tools/call", params).await
    }

    pub async fn dispose(&self) {
        self.transport.dispose().await;
        self.shared
            .correlation
            .drain_with_error(|| Error::TransportError("transport closed".into()));
        self.shared.set_status(ConnectionStatus::Stopped);
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, Error> {
        let (id, rx) = self.shared.correlation.register();
        let frame = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        debug!(method, id, "sending MCP request");

        if let Err(e) = self.transport.send(frame).await {
            self.shared.correlation.fulfill(id, Err(Error::TransportError(e.to_string())));
            return Err(e);
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::TransportError("response channel closed".into())),
            Err(_) => Err(Error::Timeout(REQUEST_TIMEOUT)),
        }
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), Error> {
        let frame = json!({ "jsonrpc": "2.0", "method": method, "params": params });
        self.transport.send(frame).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct FakeTransport {
        shared: Arc<ConnectionShared>,
        outbound: Mutex<Vec<Value>>,
        responder: mpsc::UnboundedSender<Value>,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn send(&self, frame: Value) -> Result<(), Error> {
            self.outbound.lock().unwrap().push(frame.clone());
            if let Some(id) = frame.get("id").cloned() {
                let method = frame.get("method").and_then(Value::as_str).unwrap_or("");
                let response = match method {
                    "initialize" => json!({"jsonrpc":"2.0","id":id,"result":{"capabilities":{}}}),
                    "tools/list" => json!({"jsonrpc":"2.0","id":id,"result":{"tools":[{"name":"echo"}]}}),
                    "tools/call" => json!({"jsonrpc":"2.0","id":id,"result":{"content":[{"type":"text","text":"ok"}]}}),
                    _ => json!({"jsonrpc":"2.0","id":id,"result":{}}),
                };
                let _ = self.responder.send(response);
            }
            Ok(())
        }

        async fn dispose(&self) {}
    }

    fn make_client() -> (McpClient, mpsc::UnboundedReceiver<Value>) {
        let shared = Arc::new(ConnectionShared::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(FakeTransport { shared: Arc::clone(&shared), outbound: Mutex::new(vec![]), responder: tx });
        let transport_dyn: Arc<dyn Transport> = transport.clone();
        let shared_for_pump = Arc::clone(&shared);
        // Drive responses into dispatch_inbound as if a reader task delivered them.
        tokio::spawn(async move {
            let mut rx = rx;
            while let Some(v) = rx.recv().await {
                crate::transport::dispatch_inbound(&shared_for_pump, v);
            }
        });
        (McpClient::new(transport_dyn, shared), mpsc::unbounded_channel().1)
    }

    #[tokio::test]
    async fn initialize_marks_connection_connected() {
        let (client, _unused) = make_client();
        let result = client.initialize().await.unwrap();
        assert!(result.get("capabilities").is_some());
        assert_eq!(client.status(), ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn list_tools_parses_descriptor_array() {
        let (client, _unused) = make_client();
        let tools = client.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "echo");
    }

    #[tokio::test]
    async fn call_tool_returns_raw_result() {
        let (client, _unused) = make_client();
        let result = client.call_tool("echo", json!({"text": "foo"})).await.unwrap();
        assert_eq!(result["content"][0]["text"], "ok");
    }
}
