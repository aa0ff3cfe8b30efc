// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Translation from MCP `ToolDescriptor`s to the gateway's function-calling
//! tool shape.
use serde_json::json;
use sven_mcp_client::ToolLocator;
use sven_model::ToolSchema;
use tracing::warn;

/// Build the gateway tool catalog from the manager's aggregate tool list.
/// Tools with an empty name are dropped and logged; `inputSchema` is given a
/// default `type: "object"` and `additionalProperties: false` is forced so
/// providers that validate strictly don't reject the definition.
pub fn translate_catalog(locators: &[ToolLocator]) -> Vec<ToolSchema> {
    locators
        .iter()
        .filter_map(|loc| translate_one(loc))
        .collect()
}

fn translate_one(loc: &ToolLocator) -> Option<ToolSchema> {
    if loc.descriptor.name.is_empty() {
        warn!(server = %loc.server_name, "dropping tool with empty name from aggregate catalog");
        return None;
    }
    let mut parameters = loc.descriptor.input_schema.clone().unwrap_or_else(|| json!({}));
    if !parameters.is_object() {
        parameters = json!({});
    }
    let obj = parameters.as_object_mut().expect("forced to object above");
    obj.entry("type").or_insert_with(|| json!("object"));
    obj.insert("additionalProperties".to_string(), json!(false));

    Some(ToolSchema {
        name: loc.descriptor.name.clone(),
        description: loc.descriptor.description.clone().unwrap_or_default(),
        parameters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sven_mcp_client::ToolDescriptor;

    fn locator(name: &str, schema: Option<serde_json::Value>) -> ToolLocator {
        ToolLocator {
            server_id: "srv1".into(),
            server_name: "srv".into(),
            descriptor: ToolDescriptor { name: name.into(), description: Some("desc".into()), input_schema: schema },
        }
    }

    #[test]
    fn empty_name_tool_is_dropped() {
        let out = translate_catalog(&[locator("", None)]);
        assert!(out.is_empty());
    }

    #[test]
    fn missing_schema_defaults_to_object() {
        let out = translate_catalog(&[locator("echo", None)]);
        assert_eq!(out[0].parameters["type"], "object");
        assert_eq!(out[0].parameters["additionalProperties"], false);
    }

    #[test]
    fn existing_schema_gets_additional_properties_forced_false() {
        let schema = json!({"type": "object", "properties": {"text": {"type": "string"}}, "additionalProperties": true});
        let out = translate_catalog(&[locator("echo", Some(schema))]);
        assert_eq!(out[0].parameters["additionalProperties"], false);
        assert!(out[0].parameters["properties"]["text"].is_object());
    }

    #[test]
    fn preserves_name_and_description() {
        let out = translate_catalog(&[locator("search", None)]);
        assert_eq!(out[0].name, "search");
        assert_eq!(out[0].description, "desc");
    }
}
