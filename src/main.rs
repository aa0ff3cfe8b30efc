// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Process entry: loads configuration, starts the MCP manager, and drives a
//! minimal stdin/stdout turn loop. A stand-in caller for the RPC dispatcher
//! that sits in front of the orchestrator in a full deployment.
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use sven_core::{
    CodeSandbox, ConversationStore, EnvSecretStore, InMemoryConversationStore, SecretStore, TurnEvent,
    TurnOrchestrator,
};
use sven_mcp_client::{McpManager, SecretLookup};
use sven_model::GatewayClient;
use sven_sandbox::SandboxRunner;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mcp-chat-core", about = "Local MCP-aware chat orchestration core")]
struct Cli {
    /// Override the gateway/workspace config file (searched layers still apply beneath it).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Path to the MCP server registry JSON file.
    #[arg(long, default_value = "mcp-servers.json")]
    mcp_config: PathBuf,
    /// Override RUST_LOG-style filtering.
    #[arg(long)]
    log_level: Option<String>,
    /// Ship only the two synthetic code-mode tools instead of the full catalog.
    #[arg(long)]
    code_mode: bool,
}

/// Reads provider secrets directly from `SVEN_SECRET_<NAME>` environment
/// variables; the MCP manager needs a synchronous lookup, unlike the
/// orchestrator's async `SecretStore`.
struct EnvSecretLookup;

impl SecretLookup for EnvSecretLookup {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(format!("SVEN_SECRET_{}", name.to_uppercase())).ok()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match &cli.log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = sven_config::load(cli.config.as_deref())?;
    let secrets = EnvSecretStore::new();
    let gateway_secret = secrets.get(&config.gateway.secret_name).await;
    if gateway_secret.is_none() {
        warn!(secret_name = %config.gateway.secret_name, "no gateway secret configured; requests will be unauthenticated");
    }
    let gateway = Arc::new(GatewayClient::new(&config.gateway, gateway_secret));

    let mcp = Arc::new(McpManager::new(cli.mcp_config.clone(), Arc::new(EnvSecretLookup)));
    if let Err(e) = mcp.start_auto_start_servers().await {
        warn!(error = %e, "failed to start one or more auto-start MCP servers");
    }

    let sandbox: Arc<dyn CodeSandbox> = Arc::new(SandboxRunner::new(Arc::clone(&mcp)));
    let store: Arc<dyn ConversationStore> = Arc::new(InMemoryConversationStore::new());
    let orchestrator =
        TurnOrchestrator::new(gateway, Arc::clone(&mcp), sandbox, Arc::clone(&store), config.gateway.default_model.clone());

    let conversation = store.create_conversation("repl").await;
    info!(conversation_id = %conversation.id, code_mode = cli.code_mode, "ready; type a message and press enter");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (_cancel_tx, cancel_rx) = tokio::sync::oneshot::channel();
        let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();
        let print_task = tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                print_event(&event);
            }
        });

        match orchestrator
            .run_turn(&conversation.id, line, None, cli.code_mode, cancel_rx, events_tx)
            .await
        {
            Ok(_) => {}
            Err(e) => warn!(error = %e, "turn failed"),
        }
        let _ = print_task.await;
    }

    Ok(())
}

fn print_event(event: &TurnEvent) {
    match event {
        TurnEvent::Start { .. } => {}
        TurnEvent::Delta { text, .. } => {
            print!("{text}");
            let _ = std::io::Write::flush(&mut std::io::stdout());
        }
        TurnEvent::Reasoning { .. } => {}
        TurnEvent::ToolCallStart { tool_name, .. } => println!("\n[calling {tool_name}]"),
        TurnEvent::ToolCallResult { tool_name, success, .. } => {
            println!("[{tool_name} {}]", if *success { "ok" } else { "failed" })
        }
        TurnEvent::Done { .. } => println!(),
    }
}
