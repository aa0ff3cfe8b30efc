// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Line-framed JSON-RPC 2.0 over a child process's stdin/stdout.
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::error::Error;
use crate::transport::{dispatch_inbound, ConnectionShared};
use crate::types::ConnectionStatus;
use sven_config::ServerConfig;

use super::Transport;

pub struct StdioTransport {
    child: AsyncMutex<Child>,
    stdin: AsyncMutex<tokio::process::ChildStdin>,
    shared: Arc<ConnectionShared>,
}

impl StdioTransport {
    pub fn spawn(cfg: &ServerConfig, shared: Arc<ConnectionShared>) -> Result<Arc<Self>, Error> {
        let command = cfg
            .command
            .as_deref()
            .ok_or_else(|| Error::ConfigInvalid(format!("server `{}` has no command", cfg.name)))?;

        let mut builder = Command::new(command);
        builder
            .args(&cfg.args)
            .envs(&cfg.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &cfg.cwd {
            builder.current_dir(cwd);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            unsafe {
                builder.pre_exec(|| {
                    // Detach into a new session so signals sent to the
                    // parent's terminal (Ctrl-C) don't also reach this
                    // child; it is reaped explicitly via `dispose`.
                    if libc::setsid() == -1 {
                        return Err(std::io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }

        let mut child = builder
            .spawn()
            .map_err(|e| Error::TransportError(format!("failed to spawn `{command}`: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::TransportError("child has no stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::TransportError("child has no stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::TransportError("child has no stderr".into()))?;

        let transport = Arc::new(Self {
            child: AsyncMutex::new(child),
            stdin: AsyncMutex::new(stdin),
            shared: Arc::clone(&shared),
        });

        spawn_stdout_reader(stdout, Arc::clone(&shared));
        spawn_stderr_reader(stderr, Arc::clone(&shared));
        spawn_exit_watcher(Arc::clone(&transport), shared);

        Ok(transport)
    }
}

fn spawn_stdout_reader(stdout: tokio::process::ChildStdout, shared: Arc<ConnectionShared>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Value>(trimmed) {
                        Ok(v) => dispatch_inbound(&shared, v),
                        Err(_) => shared.logs.push(format!("(stdout) {trimmed}")),
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    shared.logs.push(format!("stdout read error: {e}"));
                    break;
                }
            }
        }
    });
}

fn spawn_stderr_reader(stderr: tokio::process::ChildStderr, shared: Arc<ConnectionShared>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            shared.logs.push(format!("(stderr) {line}"));
        }
    });
}

fn spawn_exit_watcher(transport: Arc<StdioTransport>, shared: Arc<ConnectionShared>) {
    tokio::spawn(async move {
        let status = transport.child.lock().await.wait().await;
        match status {
            Ok(s) => debug!(exit_status = %s, "mcp stdio server exited"),
            Err(e) => warn!(error = %e, "error waiting for mcp stdio server"),
        }
        shared.set_status(ConnectionStatus::Stopped);
        shared
            .correlation
            .drain_with_error(|| Error::TransportError("transport closed".into()));
    });
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&self, frame: Value) -> Result<(), Error> {
        let mut line = serde_json::to_string(&frame)
            .map_err(|e| Error::ProtocolError(format!("failed to encode request: {e}")))?;
        line.push('\n');
        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::TransportError(format!("stdin write failed: {e}")))
    }

    async fn dispose(&self) {
        let mut child = self.child.lock().await;
        let _ = child.start_kill();
        let _ = child.wait().await;
    }
}
