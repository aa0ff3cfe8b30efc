// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Spawns the code-runner child process for one `execute_code` call, enforces
//! the wall-clock timeout, and tears down the bridge and temp code file.
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sven_core::{CodeSandbox, ExecResult};
use sven_mcp_client::McpManager;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::bridge::ToolBridge;
use crate::workspace::Workspace;

const EXECUTION_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_RUNNER_COMMAND: &str = "node";

/// Drives code-mode execution: a persistent per-session [`Workspace`], a
/// fresh [`ToolBridge`] per call, and a sandboxed child process running the
/// submitted code against it.
pub struct SandboxRunner {
    mcp: Arc<McpManager>,
    runner_command: String,
    workspace: Mutex<Option<Workspace>>,
}

impl SandboxRunner {
    pub fn new(mcp: Arc<McpManager>) -> Self {
        Self { mcp, runner_command: DEFAULT_RUNNER_COMMAND.to_string(), workspace: Mutex::new(None) }
    }

    pub fn with_runner_command(mut self, command: impl Into<String>) -> Self {
        self.runner_command = command.into();
        self
    }

    /// Tear down the session workspace. Call once the session ends.
    pub async fn cleanup(&self) {
        self.workspace.lock().await.take();
    }

    async fn ensure_workspace(&self) -> anyhow::Result<()> {
        let mut guard = self.workspace.lock().await;
        if guard.is_none() {
            let catalog = self.mcp.get_all_tools_async().await;
            *guard = Some(Workspace::prepare(&catalog)?);
        }
        Ok(())
    }
}

#[async_trait]
impl CodeSandbox for SandboxRunner {
    async fn execute_code(&self, code: &str) -> ExecResult {
        if let Err(e) = self.ensure_workspace().await {
            return failure(format!("failed to prepare sandbox workspace: {e}"));
        }

        let bridge = match ToolBridge::start(Arc::clone(&self.mcp)).await {
            Ok(b) => b,
            Err(e) => return failure(format!("failed to start tool bridge: {e}")),
        };
        let port = bridge.port;

        let (code_path, workspace_dir) = {
            let guard = self.workspace.lock().await;
            let workspace = guard.as_ref().expect("workspace ensured above");
            match workspace.write_code(code) {
                Ok(p) => (p, workspace.path().to_path_buf()),
                Err(e) => {
                    bridge.shutdown().await;
                    return failure(format!("failed to write sandbox code: {e}"));
                }
            }
        };

        let mut command = Command::new(&self.runner_command);
        command
            .arg(&code_path)
            .current_dir(&workspace_dir)
            .env("SVEN_BRIDGE_PORT", port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            unsafe {
                command.pre_exec(|| {
                    if libc::setsid() == -1 {
                        return Err(std::io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }

        let run_result = match command.spawn() {
            Ok(child) => run_with_timeout(child).await,
            Err(e) => Err(anyhow::anyhow!("failed to spawn code runner `{}`: {e}", self.runner_command)),
        };

        bridge.shutdown().await;
        let _ = tokio::fs::remove_file(&code_path).await;

        match run_result {
            Ok((stdout, success)) => ExecResult { stdout, success },
            Err(e) => failure(e.to_string()),
        }
    }
}

fn failure(message: String) -> ExecResult {
    ExecResult { stdout: format!("Error: {message}"), success: false }
}

async fn run_with_timeout(child: Child) -> anyhow::Result<(String, bool)> {
    let pid = child.id();
    let wait = child.wait_with_output();

    match tokio::time::timeout(EXECUTION_TIMEOUT, wait).await {
        Ok(Ok(output)) => {
            let mut stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            let stderr = String::from_utf8_lossy(&output.stderr);
            for line in stderr.lines().filter(|l| !is_benign_warning(l)) {
                stdout.push('\n');
                stdout.push_str(line);
            }
            Ok((stdout, output.status.success()))
        }
        Ok(Err(e)) => Err(anyhow::anyhow!("code runner failed: {e}")),
        Err(_) => {
            if let Some(pid) = pid {
                kill_process_tree(pid);
            }
            Err(anyhow::anyhow!("code execution timed out after {}s", EXECUTION_TIMEOUT.as_secs()))
        }
    }
}

fn is_benign_warning(line: &str) -> bool {
    line.contains("ExperimentalWarning")
}

#[cfg(unix)]
fn kill_process_tree(pid: u32) {
    unsafe {
        libc::kill(-(pid as i32), libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_tree(_pid: u32) {}

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

    fn manager() -> Arc<McpManager> {
        Arc::new(McpManager::new(std::env::temp_dir().join("nonexistent-sandbox-test.json"), Arc::new(NoSecrets)))
    }

    #[tokio::test]
    async fn execute_code_reports_failure_when_runner_binary_is_missing() {
        let runner = SandboxRunner::new(manager()).with_runner_command("definitely-not-a-real-binary");
        let result = runner.execute_code("console.log(1)").await;
        assert!(!result.success);
        assert!(result.stdout.starts_with("Error:"));
    }

    #[test]
    fn benign_warning_lines_are_recognized() {
        assert!(is_benign_warning("(node:123) ExperimentalWarning: foo"));
        assert!(!is_benign_warning("TypeError: bar"));
    }
}
