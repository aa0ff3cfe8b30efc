// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Code-mode sandbox: synthesizes a workspace of tool wrapper modules from
//! the connected MCP catalog and executes model-submitted code against it
//! through an ephemeral loopback bridge.
mod bridge;
mod identifiers;
mod runner;
mod workspace;

pub use bridge::ToolBridge;
pub use identifiers::{sanitize_ascii, sanitize_identifier};
pub use runner::SandboxRunner;
pub use workspace::Workspace;
