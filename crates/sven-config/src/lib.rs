// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod loader;
mod mcp;
mod schema;

pub use loader::{load, load_with_provenance, LoadedConfig};
pub use mcp::{load_servers, stable_server_id, AuthKind, ServerConfig, ServerKind};
pub use schema::*;
