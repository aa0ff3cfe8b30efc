// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::VecDeque;
use std::sync::Mutex;

use serde_json::Value;

/// Maximum number of log lines kept per connection; oldest entries are
/// dropped once the buffer is full.
pub const LOG_RING_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Stopped,
    Connecting,
    Connected,
    Error,
}

/// Single bounded ring buffer of log lines, single-writer / copy-on-read.
#[derive(Debug, Default)]
pub struct LogRing {
    lines: Mutex<VecDeque<String>>,
}

impl LogRing {
    pub fn push(&self, line: impl Into<String>) {
        let mut lines = self.lines.lock().unwrap();
        if lines.len() >= LOG_RING_CAPACITY {
            lines.pop_front();
        }
        lines.push_back(line.into());
    }

    /// Return up to `max_lines` of the most recent log lines, oldest first.
    pub fn tail(&self, max_lines: usize) -> Vec<String> {
        let lines = self.lines.lock().unwrap();
        let skip = lines.len().saturating_sub(max_lines);
        lines.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A tool a server exposes, as returned by `tools/list`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "inputSchema")]
    pub input_schema: Option<Value>,
}

/// A resolved tool together with the server that owns it; returned from the
/// manager's aggregate catalog so callers can route a call back to the
/// correct server.
#[derive(Debug, Clone)]
pub struct ToolLocator {
    pub server_id: String,
    pub server_name: String,
    pub descriptor: ToolDescriptor,
}
