// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Streaming client for an OpenAI-compatible chat-completions gateway.
//!
//! Consumes a server-sent-events body, decoding text/reasoning deltas and
//! streamed tool-call fragments into a finite sequence of [`StreamChunk`]
//! values. Tool-call arguments are a JSON text streamed as a sequence of
//! substrings; they are only parsed once assembly completes, never mid-stream.

use std::pin::Pin;

use anyhow::{bail, Context};
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use sven_config::GatewayConfig;
use tracing::{debug, trace, warn};

use crate::{CompletionRequest, Message, StreamChunk, ToolCall, Usage};

pub type ChunkStream = Pin<Box<dyn Stream<Item = anyhow::Result<StreamChunk>> + Send>>;

/// Thin HTTP client for the configured chat-completions gateway.
pub struct GatewayClient {
    base_url: String,
    secret: Option<String>,
    auth_prefix: String,
    http_referer: Option<String>,
    x_title: Option<String>,
    client: reqwest::Client,
}

impl GatewayClient {
    pub fn new(cfg: &GatewayConfig, secret: Option<String>) -> Self {
        Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            secret,
            auth_prefix: cfg.auth_header_value_prefix.clone(),
            http_referer: cfg.http_referer.clone(),
            x_title: cfg.x_title.clone(),
            client: reqwest::Client::new(),
        }
    }

    /// Open a streaming chat-completions request and return the parsed
    /// chunk stream. The HTTP response itself is validated eagerly (a
    /// non-2xx status is a `GatewayError`); parsing of the SSE body happens
    /// lazily as the stream is polled.
    pub async fn stream_completion(&self, req: &CompletionRequest) -> anyhow::Result<ChunkStream> {
        let messages: Vec<Value> = req.messages.iter().map(message_to_json).collect();
        let tools: Vec<Value> = req
            .tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();

        let mut body = json!({
            "model": req.model,
            "messages": messages,
            "stream": true,
            "stream_options": { "include_usage": true },
        });
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }

        debug!(model = %req.model, tool_count = tools.len(), message_count = messages.len(), "opening chat completion stream");
        trace!(request_body = ?body, "full completion request");

        let url = format!("{}/chat/completions", self.base_url);
        let mut http_req = self.client.post(&url).json(&body);
        if let Some(secret) = &self.secret {
            http_req = http_req.header(
                "Authorization",
                format!("{} {}", self.auth_prefix, secret),
            );
        }
        if let Some(referer) = &self.http_referer {
            http_req = http_req.header("HTTP-Referer", referer.as_str());
        }
        if let Some(title) = &self.x_title {
            http_req = http_req.header("X-Title", title.as_str());
        }

        let resp = http_req
            .send()
            .await
            .with_context(|| format!("chat completion request to {url} failed"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("gateway error {status}: {text}");
        }

        let byte_stream = resp.bytes_stream();
        let stream = byte_stream
            .scan(SseParser::default(), |parser, chunk| {
                let chunks = match chunk {
                    Ok(bytes) => parser.feed(&String::from_utf8_lossy(&bytes)),
                    Err(e) => vec![Err(anyhow::anyhow!(e))],
                };
                std::future::ready(Some(chunks))
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(stream))
    }
}

fn message_to_json(m: &Message) -> Value {
    json!({ "role": role_str(m.role), "content": m.content })
}

fn role_str(r: crate::Role) -> &'static str {
    match r {
        crate::Role::System => "system",
        crate::Role::User => "user",
        crate::Role::Assistant => "assistant",
        crate::Role::Tool => "tool",
    }
}

#[derive(Debug, Default, Clone)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Stateful SSE-to-`StreamChunk` decoder.
///
/// Holds the partial trailing line across TCP chunks and the in-progress
/// tool-call assembly across multiple deltas.
#[derive(Default)]
struct SseParser {
    line_buf: String,
    pending_tool: Option<PendingToolCall>,
    usage: Option<Usage>,
    finished: bool,
}

impl SseParser {
    fn feed(&mut self, new_bytes: &str) -> Vec<anyhow::Result<StreamChunk>> {
        if self.finished {
            return Vec::new();
        }
        self.line_buf.push_str(new_bytes);
        let mut out = Vec::new();
        while let Some(nl_pos) = self.line_buf.find('\n') {
            let line = self.line_buf[..nl_pos].trim_end_matches('\r').to_string();
            self.line_buf = self.line_buf[nl_pos + 1..].to_string();
            if let Some(result) = self.handle_line(&line) {
                let is_done = matches!(result, Ok(StreamChunk::Done(_)));
                out.push(result);
                if is_done {
                    self.finished = true;
                    break;
                }
            }
        }
        out
    }

    fn handle_line(&mut self, line: &str) -> Option<anyhow::Result<StreamChunk>> {
        // Skip blank lines and SSE comments (keep-alive pings).
        if line.is_empty() || line.starts_with(':') {
            return None;
        }
        let data = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:"))?.trim();
        if data.is_empty() {
            return None;
        }
        if data == "[DONE]" {
            return Some(Ok(StreamChunk::Done(self.usage.take())));
        }
        let v: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => return Some(Err(anyhow::anyhow!("malformed SSE payload: {e}"))),
        };
        self.handle_payload(&v)
    }

    fn handle_payload(&mut self, v: &Value) -> Option<anyhow::Result<StreamChunk>> {
        let choices = v.get("choices").and_then(Value::as_array);

        if choices.map(|c| c.is_empty()).unwrap_or(true) {
            // Trailing usage-only frame: no choices, just accounting.
            if let Some(usage) = v.get("usage").filter(|u| !u.is_null()) {
                self.usage = Some(parse_usage(usage));
            }
            return None;
        }
        let choice = &choices.unwrap()[0];
        let finish_reason = choice.get("finish_reason").and_then(Value::as_str);

        match finish_reason {
            Some("tool_calls") => {
                let call = self.pending_tool.take().unwrap_or_default();
                if call.name.is_empty() {
                    warn!("tool_calls finish reason with no assembled tool name");
                }
                Some(Ok(StreamChunk::ToolCallAssembled(ToolCall {
                    id: call.id,
                    name: call.name,
                    arguments_json: call.arguments,
                })))
            }
            Some("stop") => {
                if let Some(usage) = v.get("usage").filter(|u| !u.is_null()) {
                    self.usage = Some(parse_usage(usage));
                }
                Some(Ok(StreamChunk::Done(self.usage.take())))
            }
            Some(_other) => Some(Ok(StreamChunk::Done(self.usage.take()))),
            None => self.handle_delta(choice.get("delta").unwrap_or(&Value::Null)),
        }
    }

    fn handle_delta(&mut self, delta: &Value) -> Option<anyhow::Result<StreamChunk>> {
        if let Some(tool_calls) = delta.get("tool_calls").and_then(Value::as_array) {
            if let Some(tc) = tool_calls.first() {
                let entry = self.pending_tool.get_or_insert_with(PendingToolCall::default);
                if let Some(id) = tc.get("id").and_then(Value::as_str) {
                    if !id.is_empty() {
                        entry.id = id.to_string();
                    }
                }
                if let Some(name) = tc.get("function").and_then(|f| f.get("name")).and_then(Value::as_str) {
                    if !name.is_empty() {
                        entry.name = name.to_string();
                    }
                }
                if let Some(args) = tc.get("function").and_then(|f| f.get("arguments")).and_then(Value::as_str) {
                    entry.arguments.push_str(args);
                }
            }
            return None;
        }

        if let Some(reasoning) = delta
            .get("reasoning_content")
            .and_then(Value::as_str)
            .or_else(|| delta.get("reasoning").and_then(Value::as_str))
        {
            if !reasoning.is_empty() {
                return Some(Ok(StreamChunk::Reasoning(reasoning.to_string())));
            }
        }

        if let Some(text) = delta.get("content").and_then(Value::as_str) {
            if !text.is_empty() {
                return Some(Ok(StreamChunk::Content(text.to_string())));
            }
        }
        None
    }
}

fn parse_usage(u: &Value) -> Usage {
    let input = u.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0) as u32;
    let output = u.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0) as u32;
    let reasoning = u
        .get("completion_tokens_details")
        .and_then(|d| d.get("reasoning_tokens"))
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;
    let total = u
        .get("total_tokens")
        .and_then(Value::as_u64)
        .map(|t| t as u32)
        .unwrap_or(input + output);
    Usage { input_tokens: input, output_tokens: output, reasoning_tokens: reasoning, total_tokens: total }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(json: &str) -> String {
        format!("data: {json}\n")
    }

    #[test]
    fn plain_text_deltas_then_stop_with_usage() {
        let mut p = SseParser::default();
        let mut out = Vec::new();
        out.extend(p.feed(&frame(r#"{"choices":[{"delta":{"content":"Hi"}}]}"#)));
        out.extend(p.feed(&frame(r#"{"choices":[{"delta":{"content":"!"}}]}"#)));
        out.extend(p.feed(&frame(
            r#"{"choices":[{"delta":{},"finish_reason":"stop"}],"usage":{"prompt_tokens":7,"completion_tokens":2,"total_tokens":9}}"#,
        )));
        assert_eq!(out.len(), 3);
        assert!(matches!(out[0].as_ref().unwrap(), StreamChunk::Content(s) if s == "Hi"));
        assert!(matches!(out[1].as_ref().unwrap(), StreamChunk::Content(s) if s == "!"));
        match out[2].as_ref().unwrap() {
            StreamChunk::Done(Some(usage)) => {
                assert_eq!(usage.input_tokens, 7);
                assert_eq!(usage.output_tokens, 2);
                assert_eq!(usage.total_tokens, 9);
            }
            other => panic!("expected Done with usage, got {other:?}"),
        }
    }

    #[test]
    fn done_sentinel_with_no_usage_ever_seen_is_empty_usage() {
        let mut p = SseParser::default();
        let out = p.feed(&format!("data: [DONE]\n"));
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0].as_ref().unwrap(), StreamChunk::Done(None)));
    }

    #[test]
    fn tool_call_assembled_across_multiple_frames() {
        let mut p = SseParser::default();
        let mut out = Vec::new();
        out.extend(p.feed(&frame(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"echo","arguments":""}}]}}]}"#,
        )));
        out.extend(p.feed(&frame(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"text\":"}}]}}]}"#,
        )));
        out.extend(p.feed(&frame(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"foo\"}"}}]}}]}"#,
        )));
        out.extend(p.feed(&frame(
            r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
        )));
        assert_eq!(out.len(), 1);
        match out[0].as_ref().unwrap() {
            StreamChunk::ToolCallAssembled(call) => {
                assert_eq!(call.id, "call_1");
                assert_eq!(call.name, "echo");
                assert_eq!(call.arguments_json, r#"{"text":"foo"}"#);
            }
            other => panic!("expected ToolCallAssembled, got {other:?}"),
        }
    }

    #[test]
    fn incomplete_line_is_buffered_across_feeds() {
        let mut p = SseParser::default();
        let whole = frame(r#"{"choices":[{"delta":{"content":"hello"}}]}"#);
        let (first_half, second_half) = whole.split_at(whole.len() / 2);
        let out1 = p.feed(first_half);
        assert!(out1.is_empty(), "incomplete line must not yield a chunk");
        let out2 = p.feed(second_half);
        assert_eq!(out2.len(), 1);
        assert!(matches!(out2[0].as_ref().unwrap(), StreamChunk::Content(s) if s == "hello"));
    }

    #[test]
    fn sse_comment_and_blank_lines_are_skipped() {
        let mut p = SseParser::default();
        let out = p.feed(": keep-alive\n\ndata: [DONE]\n");
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0].as_ref().unwrap(), StreamChunk::Done(None)));
    }

    #[test]
    fn other_finish_reason_yields_done_with_no_tool_call() {
        let mut p = SseParser::default();
        let out = p.feed(&frame(r#"{"choices":[{"delta":{},"finish_reason":"content_filter"}]}"#));
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0].as_ref().unwrap(), StreamChunk::Done(None)));
    }

    #[test]
    fn parser_ignores_further_frames_after_done() {
        let mut p = SseParser::default();
        let mut out = Vec::new();
        out.extend(p.feed(&frame(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#)));
        out.extend(p.feed(&frame(r#"{"choices":[{"delta":{"content":"late"}}]}"#)));
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn reasoning_delta_emitted_separately_from_content() {
        let mut p = SseParser::default();
        let out = p.feed(&frame(r#"{"choices":[{"delta":{"reasoning_content":"thinking..."}}]}"#));
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0].as_ref().unwrap(), StreamChunk::Reasoning(s) if s == "thinking..."));
    }

    #[test]
    fn message_to_json_roundtrips_role_and_content() {
        let m = Message::user("hi there");
        let v = message_to_json(&m);
        assert_eq!(v["role"], "user");
        assert_eq!(v["content"], "hi there");
    }
}
