// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid MCP config: {0}")]
    ConfigInvalid(String),

    #[error("transport error: {0}")]
    TransportError(String),

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("server `{0}` is not connected")]
    NotConnected(String),

    #[error("no connected server exposes tool `{0}`")]
    ToolNotFound(String),

    #[error("gateway returned an error: {0}")]
    GatewayError(String),

    #[error("operation cancelled")]
    Cancelled,
}
