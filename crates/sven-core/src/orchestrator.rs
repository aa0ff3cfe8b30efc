// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The turn orchestrator: drives one user turn end to end, covering model
//! streaming, tool dispatch, cancellation, and persistence.
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::warn;

use sven_mcp_client::McpManager;
use sven_model::{CompletionRequest, GatewayClient, Message, StreamChunk, ToolCall, Usage};

use crate::code_mode::{search_tools, synthetic_tools, DetailLevel, EXECUTE_CODE_TOOL, SEARCH_TOOLS_TOOL};
use crate::events::TurnEvent;
use crate::store::ConversationStore;
use crate::tool_translation::translate_catalog;

pub const MAX_TOOL_CALLS: u32 = 30;
pub const TOOL_RESULT_DISPLAY_CAP: usize = 2048;

/// Result of one sandboxed code execution.
pub struct ExecResult {
    pub stdout: String,
    pub success: bool,
}

/// The code-mode execution backend. Implemented by `sven-sandbox`; kept as a
/// trait here so the orchestrator does not depend on sandbox internals
/// (workspace synthesis, child-process lifecycle, loopback bridge).
#[async_trait]
pub trait CodeSandbox: Send + Sync {
    async fn execute_code(&self, code: &str) -> ExecResult;
}

pub struct TurnOrchestrator {
    gateway: Arc<GatewayClient>,
    mcp: Arc<McpManager>,
    sandbox: Arc<dyn CodeSandbox>,
    store: Arc<dyn ConversationStore>,
    default_model: String,
    live_turns: Mutex<HashSet<String>>,
}

impl TurnOrchestrator {
    pub fn new(
        gateway: Arc<GatewayClient>,
        mcp: Arc<McpManager>,
        sandbox: Arc<dyn CodeSandbox>,
        store: Arc<dyn ConversationStore>,
        default_model: String,
    ) -> Self {
        Self { gateway, mcp, sandbox, store, default_model, live_turns: Mutex::new(HashSet::new()) }
    }

    /// Drive one user turn. Rejects if a turn is already in flight for this
    /// conversation.
    pub async fn run_turn(
        &self,
        conversation_id: &str,
        user_text: &str,
        model: Option<&str>,
        code_mode: bool,
        cancel: oneshot::Receiver<()>,
        events: mpsc::UnboundedSender<TurnEvent>,
    ) -> anyhow::Result<(String, Usage)> {
        {
            let mut live = self.live_turns.lock().await;
            if !live.insert(conversation_id.to_string()) {
                anyhow::bail!("a turn is already in flight for conversation `{conversation_id}`");
            }
        }
        let result = self
            .run_turn_inner(conversation_id, user_text, model, code_mode, cancel, events)
            .await;
        self.live_turns.lock().await.remove(conversation_id);
        result
    }

    async fn run_turn_inner(
        &self,
        conversation_id: &str,
        user_text: &str,
        model: Option<&str>,
        code_mode: bool,
        mut cancel: oneshot::Receiver<()>,
        events: mpsc::UnboundedSender<TurnEvent>,
    ) -> anyhow::Result<(String, Usage)> {
        let model = model.unwrap_or(&self.default_model).to_string();

        self.store.append_message(conversation_id, "user", user_text, None).await;
        let placeholder = self.store.append_message(conversation_id, "assistant", "", Some(&model)).await;
        let message_id = placeholder.id.clone();
        emit(&events, TurnEvent::Start { message_id: message_id.clone() });

        let mut history: Vec<Message> = self
            .store
            .list_messages(conversation_id)
            .await
            .iter()
            .map(|m| Message { role: m.role_enum(), content: m.content.clone() })
            .collect();

        let mut assembled = String::new();
        let mut usage_totals = Usage::default();
        let mut tool_calls_made = 0u32;

        loop {
            // Treat both an explicit send(()) and a dropped sender as
            // cancellation: a plain `.is_ok()` check would miss the latter.
            match cancel.try_recv() {
                Err(TryRecvError::Empty) => {}
                _ => return self.finalize_cancelled(&message_id, assembled, &events).await,
            }

            let tools = if code_mode {
                synthetic_tools()
            } else {
                let catalog = tokio::select! {
                    biased;
                    _ = &mut cancel => return self.finalize_cancelled(&message_id, assembled, &events).await,
                    catalog = self.mcp.get_all_tools_async() => catalog,
                };
                translate_catalog(&catalog)
            };
            let req = CompletionRequest { model: model.clone(), messages: history.clone(), tools, stream: true };

            let stream_result = tokio::select! {
                biased;
                _ = &mut cancel => None,
                result = self.gateway.stream_completion(&req) => Some(result),
            };
            let mut stream = match stream_result {
                None => return self.finalize_cancelled(&message_id, assembled, &events).await,
                Some(Err(e)) => {
                    return self.finalize_gateway_error(&message_id, assembled, &e, &events).await;
                }
                Some(Ok(s)) => s,
            };

            let mut pending_tool: Option<ToolCall> = None;
            let stream_outcome = loop {
                let next = tokio::select! {
                    biased;
                    _ = &mut cancel => break Ok(None),
                    item = stream.next() => item,
                };
                match next {
                    None => break Ok(Some(())), // stream closed without an explicit Done
                    Some(Err(e)) => break Err(e),
                    Some(Ok(StreamChunk::Content(text))) => {
                        assembled.push_str(&text);
                        emit(&events, TurnEvent::Delta { message_id: message_id.clone(), text });
                    }
                    Some(Ok(StreamChunk::Reasoning(text))) => {
                        emit(&events, TurnEvent::Reasoning { message_id: message_id.clone(), text });
                    }
                    Some(Ok(StreamChunk::ToolCallAssembled(tc))) => {
                        pending_tool = Some(tc);
                    }
                    Some(Ok(StreamChunk::Done(usage))) => {
                        if let Some(u) = usage {
                            accumulate(&mut usage_totals, &u);
                        }
                        break Ok(Some(()));
                    }
                }
            };

            match stream_outcome {
                Ok(None) => return self.finalize_cancelled(&message_id, assembled, &events).await,
                Err(e) => return self.finalize_gateway_error(&message_id, assembled, &e, &events).await,
                Ok(Some(())) => {}
            }

            let Some(tool_call) = pending_tool else {
                self.store.update_message_content(&message_id, &assembled).await;
                emit(&events, TurnEvent::Done { message_id: message_id.clone(), usage: Some(usage_totals) });
                return Ok((assembled, usage_totals));
            };

            if tool_calls_made >= MAX_TOOL_CALLS {
                assembled.push_str("\n\n[maximum tool calls reached]");
                self.store.update_message_content(&message_id, &assembled).await;
                emit(&events, TurnEvent::Done { message_id: message_id.clone(), usage: Some(usage_totals) });
                return Ok((assembled, usage_totals));
            }
            tool_calls_made += 1;

            emit(&events, TurnEvent::ToolCallStart {
                message_id: message_id.clone(),
                tool_name: tool_call.name.clone(),
                args_raw: tool_call.arguments_json.clone(),
            });

            let dispatch_result = tokio::select! {
                biased;
                _ = &mut cancel => None,
                result = self.dispatch_tool(&tool_call, code_mode) => Some(result),
            };
            let Some((result_text, success)) = dispatch_result else {
                return self.finalize_cancelled(&message_id, assembled, &events).await;
            };

            emit(&events, TurnEvent::ToolCallResult {
                message_id: message_id.clone(),
                tool_name: tool_call.name.clone(),
                result_text: truncate_for_display(&result_text, TOOL_RESULT_DISPLAY_CAP),
                success,
            });

            history.push(Message::assistant(format!("[Called {}]", tool_call.name)));
            history.push(Message::user(format!("Tool result for {}:\n{}", tool_call.name, result_text)));
        }
    }

    /// Dispatch one assembled tool call. Direct mode routes by name through
    /// the aggregate catalog; code mode routes `execute_code` to the sandbox
    /// and `search_tools` to a catalog search, both bypassing the MCP
    /// manager for everything else a model might hallucinate.
    async fn dispatch_tool(&self, tc: &ToolCall, code_mode: bool) -> (String, bool) {
        if code_mode {
            return self.dispatch_code_mode_tool(tc).await;
        }
        let args: Value = match serde_json::from_str(&tc.arguments_json) {
            Ok(v) => v,
            Err(e) => return (format!("Error: invalid tool arguments: {e}"), false),
        };
        match self.mcp.call_tool_by_name_async(&tc.name, args).await {
            Ok(result) => (extract_result_text(&result), true),
            Err(e) => (format!("Error: {e}"), false),
        }
    }

    async fn dispatch_code_mode_tool(&self, tc: &ToolCall) -> (String, bool) {
        let args: Value = match serde_json::from_str(&tc.arguments_json) {
            Ok(v) => v,
            Err(e) => return (format!("Error: invalid tool arguments: {e}"), false),
        };
        match tc.name.as_str() {
            EXECUTE_CODE_TOOL => {
                let Some(code) = args.get("code").and_then(Value::as_str) else {
                    return ("Error: execute_code requires a `code` string argument".to_string(), false);
                };
                let result = self.sandbox.execute_code(code).await;
                (result.stdout, result.success)
            }
            SEARCH_TOOLS_TOOL => {
                let query = args.get("query").and_then(Value::as_str).unwrap_or("");
                let detail = args
                    .get("detail_level")
                    .and_then(Value::as_str)
                    .map(DetailLevel::parse)
                    .unwrap_or(DetailLevel::Name);
                let catalog = self.mcp.get_all_tools_async().await;
                (search_tools(&catalog, query, detail), true)
            }
            other => (format!("Error: unknown code-mode tool `{other}`"), false),
        }
    }

    async fn finalize_cancelled(
        &self,
        message_id: &str,
        assembled: String,
        events: &mpsc::UnboundedSender<TurnEvent>,
    ) -> anyhow::Result<(String, Usage)> {
        self.store.update_message_content(message_id, &assembled).await;
        emit(events, TurnEvent::Done { message_id: message_id.to_string(), usage: None });
        Ok((assembled, Usage::default()))
    }

    async fn finalize_gateway_error(
        &self,
        message_id: &str,
        mut assembled: String,
        err: &anyhow::Error,
        events: &mpsc::UnboundedSender<TurnEvent>,
    ) -> anyhow::Result<(String, Usage)> {
        warn!(error = %err, "chat stream failed; finalizing turn with partial content");
        assembled.push_str(&format!("\n\n[Error: {err}]"));
        self.store.update_message_content(message_id, &assembled).await;
        emit(events, TurnEvent::Done { message_id: message_id.to_string(), usage: None });
        Ok((assembled, Usage::default()))
    }
}

fn emit(events: &mpsc::UnboundedSender<TurnEvent>, event: TurnEvent) {
    if events.send(event).is_err() {
        warn!("turn event bus has no subscriber; dropping event");
    }
}

fn accumulate(totals: &mut Usage, delta: &Usage) {
    totals.input_tokens += delta.input_tokens;
    totals.output_tokens += delta.output_tokens;
    totals.reasoning_tokens += delta.reasoning_tokens;
    totals.total_tokens += delta.total_tokens;
}

/// An MCP tool result is expected to carry `{content: [{type: "text", text}]}`;
/// concatenate the text items. Fall back to the raw JSON when the shape
/// doesn't match.
fn extract_result_text(result: &Value) -> String {
    if let Some(items) = result.get("content").and_then(Value::as_array) {
        let texts: Vec<&str> = items.iter().filter_map(|item| item.get("text").and_then(Value::as_str)).collect();
        if !texts.is_empty() {
            return texts.join("\n");
        }
    }
    result.to_string()
}

fn truncate_for_display(s: &str, cap: usize) -> String {
    if s.len() <= cap {
        return s.to_string();
    }
    let mut end = cap;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &s[..end])
}
