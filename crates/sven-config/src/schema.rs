// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

fn default_secret_name() -> String {
    "OpenRouter".into()
}

fn default_auth_prefix() -> String {
    "Bearer".into()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Connection settings for the chat-completions gateway the turn
/// orchestrator talks to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of the OpenAI-compatible chat-completions endpoint.
    pub base_url: String,
    /// Model forwarded in the request body when the caller does not
    /// override it.
    pub default_model: String,
    /// Key under which the bearer token is stored in the secret store.
    #[serde(default = "default_secret_name")]
    pub secret_name: String,
    /// Value prefix placed before the secret in the `Authorization` header.
    #[serde(default = "default_auth_prefix")]
    pub auth_header_value_prefix: String,
    /// Optional `HTTP-Referer` identification header.
    #[serde(default)]
    pub http_referer: Option<String>,
    /// Optional `X-Title` identification header.
    #[serde(default)]
    pub x_title: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".into(),
            default_model: "openai/gpt-4o-mini".into(),
            secret_name: default_secret_name(),
            auth_header_value_prefix: default_auth_prefix(),
            http_referer: None,
            x_title: None,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_base_url_is_openrouter() {
        let c = Config::default();
        assert_eq!(c.gateway.base_url, "https://openrouter.ai/api/v1");
    }

    #[test]
    fn config_default_secret_name_is_openrouter() {
        let c = Config::default();
        assert_eq!(c.gateway.secret_name, "OpenRouter");
    }

    #[test]
    fn config_default_auth_prefix_is_bearer() {
        let c = Config::default();
        assert_eq!(c.gateway.auth_header_value_prefix, "Bearer");
    }

    #[test]
    fn config_default_no_identification_headers() {
        let c = Config::default();
        assert!(c.gateway.http_referer.is_none());
        assert!(c.gateway.x_title.is_none());
    }

    #[test]
    fn config_partial_yaml_fills_in_defaults() {
        let yaml_str = "gateway:\n  base_url: http://localhost:11434/v1\n  default_model: llama3.2\n";
        let c: Config = serde_yaml::from_str(yaml_str).unwrap();
        assert_eq!(c.gateway.base_url, "http://localhost:11434/v1");
        assert_eq!(c.gateway.secret_name, "OpenRouter");
        assert_eq!(c.gateway.auth_header_value_prefix, "Bearer");
    }

    #[test]
    fn config_deserialises_identification_headers() {
        let yaml_str = "gateway:\n  base_url: https://x\n  default_model: m\n  http_referer: https://example.com\n  x_title: demo\n";
        let c: Config = serde_yaml::from_str(yaml_str).unwrap();
        assert_eq!(c.gateway.http_referer.as_deref(), Some("https://example.com"));
        assert_eq!(c.gateway.x_title.as_deref(), Some("demo"));
    }

    #[test]
    fn config_serialises_to_valid_yaml() {
        let c = Config::default();
        let yaml_str = serde_yaml::to_string(&c).unwrap();
        assert!(yaml_str.contains("base_url"));
        assert!(yaml_str.contains("openrouter"));
    }
}
