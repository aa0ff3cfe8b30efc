// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod code_mode;
mod events;
mod orchestrator;
mod store;
mod tool_translation;

pub use code_mode::{search_tools, synthetic_tools, DetailLevel, EXECUTE_CODE_TOOL, SEARCH_TOOLS_TOOL};
pub use events::TurnEvent;
pub use orchestrator::{CodeSandbox, ExecResult, TurnOrchestrator, MAX_TOOL_CALLS, TOOL_RESULT_DISPLAY_CAP};
pub use store::{
    Conversation, ConversationStore, EnvSecretStore, InMemoryConversationStore, SecretStore, StoredMessage,
};
pub use tool_translation::translate_catalog;
