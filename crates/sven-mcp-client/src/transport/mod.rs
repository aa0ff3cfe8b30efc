// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod http;
pub mod legacy_sse;
pub mod stdio;

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::correlation::CorrelationMap;
use crate::error::Error;
use crate::types::{ConnectionStatus, LogRing};

/// State shared between a connection's background reader task and its
/// `McpClient` front-end: the log ring, the request-id correlation map, and
/// the connection's current status.
#[derive(Default)]
pub struct ConnectionShared {
    pub logs: LogRing,
    pub correlation: CorrelationMap,
    pub status: Mutex<ConnectionStatus>,
}

impl ConnectionShared {
    pub fn new() -> Self {
        Self {
            logs: LogRing::default(),
            correlation: CorrelationMap::new(),
            status: Mutex::new(ConnectionStatus::Connecting),
        }
    }

    pub fn set_status(&self, status: ConnectionStatus) {
        *self.status.lock().unwrap() = status;
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.lock().unwrap()
    }
}

/// Capability a concrete wire carrier provides to the transport-agnostic
/// JSON-RPC client layer: send a framed JSON-RPC object, and dispose of the
/// underlying connection. Inbound frames and lifecycle transitions are
/// dispatched directly into the shared [`ConnectionShared`] by each
/// transport's own background reader task, not through this trait.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, frame: Value) -> Result<(), Error>;
    async fn dispose(&self);
}

/// Route one inbound JSON-RPC object: responses (carrying `id` and either
/// `result` or `error`) fulfil the correlation slot; anything else is a
/// notification and is recorded as a log line.
pub(crate) fn dispatch_inbound(shared: &ConnectionShared, v: Value) {
    let id = v.get("id").and_then(Value::as_u64);
    match id {
        Some(id) if v.get("result").is_some() || v.get("error").is_some() => {
            let result = if let Some(err) = v.get("error") {
                let msg = err
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown JSON-RPC error")
                    .to_string();
                Err(Error::ProtocolError(msg))
            } else {
                Ok(v.get("result").cloned().unwrap_or(Value::Null))
            };
            if !shared.correlation.fulfill(id, result) {
                shared.logs.push(format!("unmatched response for id {id}"));
            }
        }
        _ => {
            let method = v.get("method").and_then(Value::as_str).unwrap_or("<notification>");
            shared.logs.push(format!("notification: {method}"));
        }
    }
}
