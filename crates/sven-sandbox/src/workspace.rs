// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Synthesizes the per-session code-mode workspace: a bridge module plus one
//! tool wrapper per connected MCP tool, grouped by server.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use sven_mcp_client::ToolLocator;
use tempfile::TempDir;
use tracing::debug;

use crate::identifiers::{sanitize_ascii, sanitize_identifier};

const BRIDGE_SOURCE: &str = r#"const PORT = process.env.SVEN_BRIDGE_PORT;

export async function callTool(name, args) {
  const res = await fetch(`http://127.0.0.1:${PORT}/call-tool`, {
    method: "POST",
    headers: { "content-type": "application/json" },
    body: JSON.stringify({ tool: name, args }),
  });
  const body = await res.json();
  if (body.error) {
    throw new Error(body.error);
  }
  return body.result;
}

export function extractText(result) {
  if (result && Array.isArray(result.content)) {
    return result.content
      .filter((item) => item && item.type === "text")
      .map((item) => item.text)
      .join("\n");
  }
  return JSON.stringify(result);
}
"#;

/// The synthesized workspace for one session's code-mode executions.
/// Persists across turns and is torn down with `Cleanup` (the `TempDir`
/// drop).
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Build the workspace tree from the current aggregate tool catalog.
    pub fn prepare(catalog: &[ToolLocator]) -> anyhow::Result<Self> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("bridge.mjs"), BRIDGE_SOURCE)?;
        std::fs::write(dir.path().join("package.json"), package_json())?;

        type ToolEntry = (String, String, String, Option<serde_json::Value>);
        let mut servers: BTreeMap<String, (String, Vec<ToolEntry>)> = BTreeMap::new();
        for locator in catalog {
            let server_ident = sanitize_identifier(&locator.server_name);
            let tool_ident = sanitize_identifier(&locator.descriptor.name);
            let description = sanitize_ascii(locator.descriptor.description.as_deref().unwrap_or(""));
            servers.entry(server_ident).or_insert_with(|| (locator.server_name.clone(), Vec::new())).1.push((
                tool_ident,
                locator.descriptor.name.clone(),
                description,
                locator.descriptor.input_schema.clone(),
            ));
        }

        for (server_ident, (server_name, tools)) in &servers {
            let server_dir = dir.path().join("servers").join(server_ident);
            let tools_dir = server_dir.join("tools");
            std::fs::create_dir_all(&tools_dir)?;

            for (tool_ident, original_name, description, schema) in tools {
                std::fs::write(
                    tools_dir.join(format!("{tool_ident}.mjs")),
                    tool_module_source(tool_ident, original_name, description, schema.as_ref()),
                )?;
            }
            let index_entries: Vec<(String, String, String)> =
                tools.iter().map(|(ident, orig, desc, _)| (ident.clone(), orig.clone(), desc.clone())).collect();
            std::fs::write(server_dir.join("index.mjs"), index_module_source(&index_entries))?;
            debug!(server = %server_name, tool_count = tools.len(), "synthesized code-mode tool module");
        }

        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_code(&self, code: &str) -> anyhow::Result<PathBuf> {
        let path = self.dir.path().join("main.mjs");
        std::fs::write(&path, code)?;
        Ok(path)
    }
}

fn package_json() -> String {
    serde_json::json!({
        "type": "module",
        "name": "sven-sandbox-workspace",
        "private": true,
    })
    .to_string()
}

fn tool_module_source(
    tool_ident: &str,
    original_name: &str,
    description: &str,
    input_schema: Option<&serde_json::Value>,
) -> String {
    let name_literal = serde_json::to_string(original_name).expect("string always serializes");
    let type_name = format!("{}Input", capitalize_first(tool_ident));
    let typedef = input_type_jsdoc(&type_name, input_schema);
    format!(
        "// {description}\nimport {{ callTool }} from \"../../../bridge.mjs\";\n\n{typedef}\n/**\n * @param {{{type_name}}} input\n */\nexport default async function tool(input) {{\n  return callTool({name_literal}, input);\n}}\n"
    )
}

fn capitalize_first(ident: &str) -> String {
    let mut chars = ident.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Render the tool's JSON Schema input shape as a JSDoc `@typedef`, the
/// closest thing to a type declaration a plain `.mjs` module can carry.
/// Unknown or absent schemas fall back to a bare `Object` typedef so every
/// wrapper still has a name to reference from its `@param`.
fn input_type_jsdoc(type_name: &str, schema: Option<&serde_json::Value>) -> String {
    let properties = schema.and_then(|s| s.get("properties")).and_then(|p| p.as_object());
    let Some(properties) = properties else {
        return format!("/** @typedef {{Object}} {type_name} */\n");
    };
    let required: Vec<&str> = schema
        .and_then(|s| s.get("required"))
        .and_then(|r| r.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    let mut lines = vec![format!("/**\n * @typedef {{Object}} {type_name}")];
    for (name, prop) in properties {
        let js_type = json_schema_type_to_jsdoc(prop);
        let field = if required.contains(&name.as_str()) { name.clone() } else { format!("[{name}]") };
        let description = prop.get("description").and_then(|d| d.as_str()).unwrap_or("");
        lines.push(format!(" * @property {{{js_type}}} {field} {description}").trim_end().to_string());
    }
    lines.push(" */".to_string());
    lines.join("\n") + "\n"
}

fn json_schema_type_to_jsdoc(prop: &serde_json::Value) -> &'static str {
    match prop.get("type").and_then(|t| t.as_str()) {
        Some("string") => "string",
        Some("number") | Some("integer") => "number",
        Some("boolean") => "boolean",
        Some("array") => "Array",
        Some("object") => "Object",
        _ => "*",
    }
}

fn index_module_source(tools: &[(String, String, String)]) -> String {
    tools
        .iter()
        .map(|(ident, _, _)| format!("export {{ default as {ident} }} from \"./tools/{ident}.mjs\";\n"))
        .collect()
}
