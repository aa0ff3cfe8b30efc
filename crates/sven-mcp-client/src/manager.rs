// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The MCP Manager: registry, connection lifecycle, aggregate tool catalog,
//! and name-based tool dispatch across servers.
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use sven_config::{load_servers, ServerConfig, ServerKind};

use crate::client::McpClient;
use crate::error::Error;
use crate::transport::{http::HttpTransport, legacy_sse::LegacySseTransport, stdio::StdioTransport, ConnectionShared};
use crate::types::{ConnectionStatus, ToolLocator};

/// Looks up a server's API key/bearer secret by the `authSecretName` stored
/// in its config entry. Kept generic so the manager does not depend on a
/// concrete secret backend.
pub trait SecretLookup: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
}

struct Entry {
    config: ServerConfig,
    client: Option<Arc<McpClient>>,
    /// Set while a `start_server` call for this id is past the no-op check
    /// but hasn't yet stored its connection. Lets concurrent callers see an
    /// in-progress start as a no-op instead of racing a second connection.
    connecting: bool,
}

pub struct McpManager {
    config_path: PathBuf,
    secrets: Arc<dyn SecretLookup>,
    connections: RwLock<HashMap<String, Entry>>,
}

impl McpManager {
    pub fn new(config_path: PathBuf, secrets: Arc<dyn SecretLookup>) -> Self {
        Self { config_path, secrets, connections: RwLock::new(HashMap::new()) }
    }

    /// Re-read the config file and refresh the registry. Existing live
    /// connections for entries that still exist are left untouched; entries
    /// removed from the file are dropped from the registry (their
    /// connections, if any, are disposed).
    pub async fn list_servers(&self) -> Result<Vec<ServerConfig>, Error> {
        let servers = load_servers(&self.config_path)
            .map_err(|e| Error::ConfigInvalid(e.to_string()))?;

        let mut connections = self.connections.write().await;
        let live_ids: std::collections::HashSet<String> = servers.iter().map(|s| s.id.clone()).collect();
        let stale: Vec<String> = connections.keys().filter(|id| !live_ids.contains(*id)).cloned().collect();
        for id in stale {
            if let Some(entry) = connections.remove(&id) {
                if let Some(client) = entry.client {
                    client.dispose().await;
                }
            }
        }
        for server in &servers {
            connections
                .entry(server.id.clone())
                .or_insert_with(|| Entry { config: server.clone(), client: None, connecting: false });
        }
        Ok(servers)
    }

    /// Launch background bring-up of every non-disabled, auto-start entry.
    /// Never blocks the caller: each server's `initialize` handshake runs on
    /// its own spawned task.
    pub async fn start_auto_start_servers(self: &Arc<Self>) -> Result<(), Error> {
        let servers = self.list_servers().await?;
        for server in servers {
            if server.disabled || !server.auto_start {
                continue;
            }
            let this = Arc::clone(self);
            let id = server.id.clone();
            tokio::spawn(async move {
                if let Err(e) = this.start_server(&id).await {
                    warn!(server = %id, error = %e, "failed to auto-start MCP server");
                }
            });
        }
        Ok(())
    }

    /// Idempotent: a second call while the first is still connecting, or
    /// once connected, is a no-op. The whole start is serialized against
    /// other mutations by committing a `connecting` placeholder under the
    /// write lock before the slow transport/handshake work, then
    /// re-acquiring the write lock to store (or discard) the result; there
    /// is no window where two callers both pass the no-op check.
    pub async fn start_server(&self, id: &str) -> Result<(), Error> {
        let config = {
            let mut connections = self.connections.write().await;
            let entry = connections.get_mut(id).ok_or_else(|| Error::ConfigInvalid(format!("unknown server `{id}`")))?;
            if entry.client.is_some() || entry.connecting {
                return Ok(()); // already started or already starting: no-op
            }
            entry.connecting = true;
            entry.config.clone()
        };

        let result = self.connect(&config).await;

        let mut connections = self.connections.write().await;
        match connections.get_mut(id) {
            Some(entry) => {
                entry.connecting = false;
                match result {
                    Ok(client) => {
                        entry.client = Some(client);
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
            None => {
                // Entry was dropped by a concurrent `list_servers` reload
                // while we were connecting; dispose rather than leak.
                if let Ok(client) = &result {
                    client.dispose().await;
                }
                result.map(|_| ())
            }
        }
    }

    async fn connect(&self, config: &ServerConfig) -> Result<Arc<McpClient>, Error> {
        let shared = Arc::new(ConnectionShared::new());
        let secret = config.auth_secret_name.as_deref().and_then(|name| self.secrets.get(name));

        let transport: Arc<dyn crate::transport::Transport> = match config.kind {
            ServerKind::Stdio => StdioTransport::spawn(config, Arc::clone(&shared))?,
            ServerKind::Http => Arc::new(HttpTransport::new(config, secret, Arc::clone(&shared))?),
            ServerKind::LegacySse => LegacySseTransport::connect(config, secret, Arc::clone(&shared))?,
        };

        let client = Arc::new(McpClient::new(transport, Arc::clone(&shared)));
        client.initialize().await?;
        info!(server = %config.name, "MCP server connected");
        Ok(client)
    }

    pub async fn stop_server(&self, id: &str) -> Result<(), Error> {
        let mut connections = self.connections.write().await;
        if let Some(entry) = connections.get_mut(id) {
            if let Some(client) = entry.client.take() {
                client.dispose().await;
            }
        }
        Ok(())
    }

    pub async fn get_status(&self, id: &str) -> Result<ConnectionStatus, Error> {
        let connections = self.connections.read().await;
        let entry = connections.get(id).ok_or_else(|| Error::ConfigInvalid(format!("unknown server `{id}`")))?;
        Ok(entry.client.as_ref().map(|c| c.status()).unwrap_or(ConnectionStatus::Stopped))
    }

    pub async fn get_logs(&self, id: &str, max_lines: usize) -> Result<Vec<String>, Error> {
        let connections = self.connections.read().await;
        let entry = connections.get(id).ok_or_else(|| Error::ConfigInvalid(format!("unknown server `{id}`")))?;
        Ok(entry.client.as_ref().map(|c| c.logs(max_lines)).unwrap_or_default())
    }

    pub async fn list_tools_async(&self, id: &str) -> Result<Vec<crate::types::ToolDescriptor>, Error> {
        let client = self.connected_client(id).await?;
        client.list_tools().await
    }

    pub async fn call_tool_async(&self, id: &str, name: &str, args: serde_json::Value) -> Result<serde_json::Value, Error> {
        let client = self.connected_client(id).await?;
        client.call_tool(name, args).await
    }

    /// Concurrent fan-out of `ListTools` across every connected server.
    /// Returned order is registry order, not completion order; failures from
    /// individual servers are logged and drop that server's contribution.
    pub async fn get_all_tools_async(&self) -> Vec<ToolLocator> {
        let snapshot: Vec<(String, String, Arc<McpClient>)> = {
            let connections = self.connections.read().await;
            connections
                .values()
                .filter_map(|e| {
                    let client = e.client.as_ref()?;
                    (client.status() == ConnectionStatus::Connected)
                        .then(|| (e.config.id.clone(), e.config.name.clone(), Arc::clone(client)))
                })
                .collect()
        };

        let fan_out = snapshot.into_iter().map(|(id, name, client)| async move {
            match client.list_tools().await {
                Ok(tools) => tools
                    .into_iter()
                    .map(|descriptor| ToolLocator { server_id: id.clone(), server_name: name.clone(), descriptor })
                    .collect::<Vec<_>>(),
                Err(e) => {
                    warn!(server = %name, error = %e, "ListTools failed during aggregate catalog build");
                    Vec::new()
                }
            }
        });

        futures::future::join_all(fan_out).await.into_iter().flatten().collect()
    }

    /// Resolve `name` against the aggregate catalog, recomputed fresh for
    /// this call, and dispatch to the owning server. Ties are resolved by
    /// first-match in registry iteration order; the collision is logged.
    pub async fn call_tool_by_name_async(&self, name: &str, args: serde_json::Value) -> Result<serde_json::Value, Error> {
        let catalog = self.get_all_tools_async().await;
        let mut matches = catalog.iter().filter(|t| t.descriptor.name == name);
        let first = matches.next().ok_or_else(|| Error::ToolNotFound(name.to_string()))?;
        if matches.next().is_some() {
            warn!(tool = %name, "tool name collision across MCP servers; first registry match wins");
        }
        self.call_tool_async(&first.server_id, name, args).await
    }

    async fn connected_client(&self, id: &str) -> Result<Arc<McpClient>, Error> {
        let connections = self.connections.read().await;
        let entry = connections.get(id).ok_or_else(|| Error::ConfigInvalid(format!("unknown server `{id}`")))?;
        let client = entry.client.clone().ok_or_else(|| Error::NotConnected(id.to_string()))?;
        if client.status() != ConnectionStatus::Connected {
            return Err(Error::NotConnected(id.to_string()));
        }
        Ok(client)
    }
}
