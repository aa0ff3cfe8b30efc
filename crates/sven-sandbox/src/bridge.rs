// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Ephemeral loopback-only HTTP server that routes sandboxed code's tool
//! calls through the MCP manager.
use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sven_mcp_client::McpManager;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::warn;

#[derive(Deserialize)]
struct CallToolRequest {
    tool: String,
    args: Value,
}

#[derive(Serialize)]
struct CallToolResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// One loopback-only HTTP server, bound for the lifetime of a single
/// `execute_code` call.
pub struct ToolBridge {
    pub port: u16,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl ToolBridge {
    pub async fn start(mcp: Arc<McpManager>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let app = Router::new().route("/call-tool", post(call_tool)).with_state(mcp);
        let handle = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = server.await {
                warn!(error = %e, "sandbox tool bridge exited with an error");
            }
        });

        Ok(Self { port, shutdown: Some(shutdown_tx), handle })
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = self.handle.await;
    }
}

async fn call_tool(State(mcp): State<Arc<McpManager>>, Json(req): Json<CallToolRequest>) -> Json<CallToolResponse> {
    match mcp.call_tool_by_name_async(&req.tool, req.args).await {
        Ok(result) => Json(CallToolResponse { result: Some(result), error: None }),
        Err(e) => Json(CallToolResponse { result: None, error: Some(e.to_string()) }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sven_mcp_client::SecretLookup;

    struct NoSecrets;
    impl SecretLookup for NoSecrets {
        fn get(&self, _name: &str) -> Option<String> {
            None
        }
    }

    #[tokio::test]
    async fn start_binds_an_ephemeral_loopback_port() {
        let mcp = Arc::new(McpManager::new(std::env::temp_dir().join("nonexistent.json"), Arc::new(NoSecrets)));
        let bridge = ToolBridge::start(mcp).await.unwrap();
        assert!(bridge.port > 0);
        bridge.shutdown().await;
    }
}
