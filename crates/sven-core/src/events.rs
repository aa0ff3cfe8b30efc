// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use sven_model::Usage;

/// Events emitted by the turn orchestrator during a single turn.
/// Consumers (RPC dispatcher, demo REPL) subscribe to these to drive output.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// A new assistant message has been created for this turn.
    Start { message_id: String },
    /// A text chunk streamed from the model.
    Delta { message_id: String, text: String },
    /// A reasoning/thinking chunk from the model. Never persisted.
    Reasoning { message_id: String, text: String },
    /// The model requested a tool call.
    ToolCallStart {
        message_id: String,
        tool_name: String,
        args_raw: String,
    },
    /// A tool call finished, successfully or not.
    ToolCallResult {
        message_id: String,
        tool_name: String,
        result_text: String,
        success: bool,
    },
    /// The turn has finished; usage totals accumulated across every model
    /// call made during the turn (empty when cancelled or never reported).
    Done {
        message_id: String,
        usage: Option<Usage>,
    },
}
