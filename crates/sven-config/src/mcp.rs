// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Read-only loader for the MCP server definitions file.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use md5::{Digest, Md5};
use serde::Deserialize;
use tracing::warn;

/// Kind of transport a server entry is reached over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerKind {
    Stdio,
    Http,
    LegacySse,
}

/// How a server authenticates an http/legacy-sse connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthKind {
    #[default]
    None,
    Bearer,
}

/// A single entry from the `mcpServers` map, fully resolved with defaults
/// applied and a stable identifier attached.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub id: String,
    pub name: String,
    pub kind: ServerKind,
    pub auto_start: bool,
    pub disabled: bool,

    // stdio
    pub command: Option<String>,
    pub args: Vec<String>,
    pub cwd: Option<String>,
    pub env: HashMap<String, String>,

    // http / legacy-sse
    pub url: Option<String>,
    pub auth_kind: AuthKind,
    pub auth_secret_name: Option<String>,
}

/// Stable identifier for a server: the MD5 digest of its logical name,
/// formatted as a 32-character hex string. Deterministic across reloads so
/// ids survive as long as the server's name is unchanged.
pub fn stable_server_id(name: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(name.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Deserialize)]
struct RawFile {
    #[serde(default, rename = "mcpServers")]
    mcp_servers: HashMap<String, RawServer>,
}

#[derive(Debug, Deserialize)]
struct RawServer {
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    cwd: Option<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    url: Option<String>,
    #[serde(default)]
    auth: Option<String>,
    #[serde(default, rename = "authSecretName")]
    auth_secret_name: Option<String>,
    #[serde(default = "default_true")]
    #[serde(rename = "autoStart")]
    auto_start: bool,
    #[serde(default)]
    disabled: bool,
    /// Legacy SSE servers are distinguished by an explicit transport hint;
    /// anything with a `url` and no hint defaults to streamable HTTP.
    #[serde(default)]
    transport: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Parse the `{"mcpServers": {...}}` document at `path` into a registry of
/// resolved server configs, sorted by name for deterministic iteration
/// order. Malformed individual entries are skipped and logged; the file
/// itself is never written back.
pub fn load_servers(path: &Path) -> anyhow::Result<Vec<ServerConfig>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading MCP server config {}", path.display()))?;
    parse_servers(&text)
}

fn parse_servers(text: &str) -> anyhow::Result<Vec<ServerConfig>> {
    let raw: RawFile = serde_json::from_str(text).context("parsing MCP server config JSON")?;

    let mut out = Vec::new();
    let mut names: Vec<&String> = raw.mcp_servers.keys().collect();
    names.sort();

    for name in names {
        let entry = &raw.mcp_servers[name];
        match resolve_entry(name, entry) {
            Ok(cfg) => out.push(cfg),
            Err(e) => warn!(server = %name, error = %e, "skipping invalid MCP server entry"),
        }
    }
    Ok(out)
}

fn resolve_entry(name: &str, raw: &RawServer) -> anyhow::Result<ServerConfig> {
    let id = stable_server_id(name);

    let (kind, auth_kind) = if let Some(url) = &raw.url {
        let _ = url;
        let kind = match raw.transport.as_deref() {
            Some("legacy-sse") | Some("sse") => ServerKind::LegacySse,
            _ => ServerKind::Http,
        };
        let auth_kind = match raw.auth.as_deref() {
            Some("bearer") => AuthKind::Bearer,
            _ => AuthKind::None,
        };
        (kind, auth_kind)
    } else if raw.command.is_some() {
        (ServerKind::Stdio, AuthKind::None)
    } else {
        anyhow::bail!("entry `{name}` has neither `command` nor `url`");
    };

    Ok(ServerConfig {
        id,
        name: name.to_string(),
        kind,
        auto_start: raw.auto_start,
        disabled: raw.disabled,
        command: raw.command.clone(),
        args: raw.args.clone(),
        cwd: raw.cwd.clone(),
        env: raw.env.clone(),
        url: raw.url.clone(),
        auth_kind,
        auth_secret_name: raw.auth_secret_name.clone(),
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_id_is_deterministic() {
        assert_eq!(stable_server_id("echo"), stable_server_id("echo"));
        assert_ne!(stable_server_id("echo"), stable_server_id("calc"));
    }

    #[test]
    fn stable_id_is_32_hex_chars() {
        let id = stable_server_id("echo");
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn parses_stdio_entry_with_defaults() {
        let json = r#"{"mcpServers": {"echo": {"command": "echo-server", "args": ["--stdio"]}}}"#;
        let servers = parse_servers(json).unwrap();
        assert_eq!(servers.len(), 1);
        let s = &servers[0];
        assert_eq!(s.name, "echo");
        assert_eq!(s.kind, ServerKind::Stdio);
        assert!(s.auto_start);
        assert!(!s.disabled);
        assert_eq!(s.command.as_deref(), Some("echo-server"));
        assert_eq!(s.args, vec!["--stdio".to_string()]);
    }

    #[test]
    fn parses_http_entry_with_bearer_auth() {
        let json = r#"{"mcpServers": {"remote": {"url": "https://x/mcp", "auth": "bearer", "authSecretName": "remote-key"}}}"#;
        let servers = parse_servers(json).unwrap();
        let s = &servers[0];
        assert_eq!(s.kind, ServerKind::Http);
        assert_eq!(s.auth_kind, AuthKind::Bearer);
        assert_eq!(s.auth_secret_name.as_deref(), Some("remote-key"));
    }

    #[test]
    fn parses_legacy_sse_transport_hint() {
        let json = r#"{"mcpServers": {"old": {"url": "https://x", "transport": "legacy-sse"}}}"#;
        let servers = parse_servers(json).unwrap();
        assert_eq!(servers[0].kind, ServerKind::LegacySse);
    }

    #[test]
    fn disabled_entry_is_retained_but_not_auto_started() {
        let json =
            r#"{"mcpServers": {"off": {"command": "x", "disabled": true, "autoStart": true}}}"#;
        let servers = parse_servers(json).unwrap();
        assert_eq!(servers.len(), 1);
        assert!(servers[0].disabled);
    }

    #[test]
    fn entry_missing_command_and_url_is_skipped_not_fatal() {
        let json = r#"{"mcpServers": {"bad": {"args": ["x"]}, "good": {"command": "ok"}}}"#;
        let servers = parse_servers(json).unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].name, "good");
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let json = r#"{"mcpServers": {"echo": {"command": "x", "someFutureField": 123}}}"#;
        let servers = parse_servers(json).unwrap();
        assert_eq!(servers.len(), 1);
    }

    #[test]
    fn empty_registry_parses_to_empty_vec() {
        let json = r#"{"mcpServers": {}}"#;
        let servers = parse_servers(json).unwrap();
        assert!(servers.is_empty());
    }

    #[test]
    fn servers_are_sorted_by_name() {
        let json = r#"{"mcpServers": {"zeta": {"command": "z"}, "alpha": {"command": "a"}}}"#;
        let servers = parse_servers(json).unwrap();
        assert_eq!(servers[0].name, "alpha");
        assert_eq!(servers[1].name, "zeta");
    }
}
