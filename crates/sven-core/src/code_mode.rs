// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Code mode: instead of shipping the full tool catalog to the model, attach
//! exactly two synthetic tools and let the model discover/call real tools
//! through the sandbox bridge.
use serde_json::json;
use sven_mcp_client::ToolLocator;
use sven_model::ToolSchema;

pub const EXECUTE_CODE_TOOL: &str = "execute_code";
pub const SEARCH_TOOLS_TOOL: &str = "search_tools";

/// The two synthetic tools attached to a code-mode request, in place of the
/// full aggregate catalog.
pub fn synthetic_tools() -> Vec<ToolSchema> {
    vec![
        ToolSchema {
            name: EXECUTE_CODE_TOOL.to_string(),
            description: "Run a short program against the connected MCP tools. \
                Tool wrappers are available as importable modules in the sandbox workspace."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": { "code": { "type": "string" } },
                "required": ["code"],
                "additionalProperties": false,
            }),
        },
        ToolSchema {
            name: SEARCH_TOOLS_TOOL.to_string(),
            description: "Search the catalog of tools available in the sandbox workspace.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "detail_level": { "type": "string", "enum": ["name", "description", "full"] },
                },
                "required": ["query"],
                "additionalProperties": false,
            }),
        },
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailLevel {
    Name,
    Description,
    Full,
}

impl DetailLevel {
    pub fn parse(s: &str) -> Self {
        match s {
            "description" => Self::Description,
            "full" => Self::Full,
            _ => Self::Name,
        }
    }
}

/// Search the aggregate tool catalog by substring match on tool name and
/// description, rendering each hit at the requested detail level.
pub fn search_tools(catalog: &[ToolLocator], query: &str, detail: DetailLevel) -> String {
    let query_lower = query.to_lowercase();
    let hits: Vec<&ToolLocator> = catalog
        .iter()
        .filter(|loc| {
            query_lower.is_empty()
                || loc.descriptor.name.to_lowercase().contains(&query_lower)
                || loc
                    .descriptor
                    .description
                    .as_deref()
                    .map(|d| d.to_lowercase().contains(&query_lower))
                    .unwrap_or(false)
        })
        .collect();

    if hits.is_empty() {
        return "No matching tools found.".to_string();
    }

    hits.iter()
        .map(|loc| render_hit(loc, detail))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_hit(loc: &ToolLocator, detail: DetailLevel) -> String {
    match detail {
        DetailLevel::Name => loc.descriptor.name.clone(),
        DetailLevel::Description => format!(
            "{}: {}",
            loc.descriptor.name,
            loc.descriptor.description.as_deref().unwrap_or("(no description)")
        ),
        DetailLevel::Full => format!(
            "{}: {}\nschema: {}",
            loc.descriptor.name,
            loc.descriptor.description.as_deref().unwrap_or("(no description)"),
            loc.descriptor
                .input_schema
                .as_ref()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "{}".to_string())
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sven_mcp_client::ToolDescriptor;

    fn locator(name: &str, desc: &str) -> ToolLocator {
        ToolLocator {
            server_id: "s".into(),
            server_name: "srv".into(),
            descriptor: ToolDescriptor { name: name.into(), description: Some(desc.into()), input_schema: None },
        }
    }

    #[test]
    fn synthetic_tools_has_exactly_two_entries() {
        let tools = synthetic_tools();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, EXECUTE_CODE_TOOL);
        assert_eq!(tools[1].name, SEARCH_TOOLS_TOOL);
    }

    #[test]
    fn search_by_name_matches_case_insensitively() {
        let catalog = vec![locator("Echo", "echoes text"), locator("calc", "does math")];
        let result = search_tools(&catalog, "echo", DetailLevel::Name);
        assert_eq!(result, "Echo");
    }

    #[test]
    fn search_by_description_matches() {
        let catalog = vec![locator("a", "performs arithmetic"), locator("b", "reverses a string")];
        let result = search_tools(&catalog, "arithmetic", DetailLevel::Name);
        assert_eq!(result, "a");
    }

    #[test]
    fn empty_query_returns_everything() {
        let catalog = vec![locator("a", "x"), locator("b", "y")];
        let result = search_tools(&catalog, "", DetailLevel::Name);
        assert_eq!(result, "a\nb");
    }

    #[test]
    fn no_match_returns_placeholder() {
        let catalog = vec![locator("a", "x")];
        let result = search_tools(&catalog, "zzz", DetailLevel::Name);
        assert_eq!(result, "No matching tools found.");
    }

    #[test]
    fn detail_level_parses_with_name_fallback() {
        assert_eq!(DetailLevel::parse("full"), DetailLevel::Full);
        assert_eq!(DetailLevel::parse("bogus"), DetailLevel::Name);
    }
}
