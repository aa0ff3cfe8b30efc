// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use tracing::debug;

use crate::Config;

/// Ordered list of config file locations searched from lowest to highest priority.
/// Later files override earlier ones.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("/etc/mcp-chat-core/config.yaml"));
    paths.push(PathBuf::from("/etc/mcp-chat-core/config.yml"));

    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/mcp-chat-core/config.yaml"));
        paths.push(home.join(".config/mcp-chat-core/config.yml"));
    }
    if let Some(cfg) = dirs::config_dir() {
        paths.push(cfg.join("mcp-chat-core/config.yaml"));
        paths.push(cfg.join("mcp-chat-core/config.yml"));
    }

    paths.push(PathBuf::from(".mcp-chat-core/config.yaml"));
    paths.push(PathBuf::from(".mcp-chat-core/config.yml"));

    paths
}

/// The merged gateway config plus which files actually contributed to it, in
/// merge order (lowest to highest priority). Lets a caller report where a
/// given setting came from instead of just the final merged value.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub layers: Vec<PathBuf>,
}

/// Load configuration by merging all discovered YAML files, then validating
/// the result. The `extra` argument may provide an explicit path (e.g. the
/// `--config` CLI flag); an explicit path that doesn't exist is an error,
/// unlike the well-known search locations, which are silently skipped when
/// absent.
pub fn load(extra: Option<&Path>) -> anyhow::Result<Config> {
    Ok(load_with_provenance(extra)?.config)
}

/// Same as [`load`], but also reports which files were actually merged in.
pub fn load_with_provenance(extra: Option<&Path>) -> anyhow::Result<LoadedConfig> {
    let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());
    let mut layers = Vec::new();

    for path in config_search_paths() {
        if path.is_file() {
            let layer = read_layer(&path)?;
            merge_yaml(&mut merged, layer);
            layers.push(path);
        }
    }

    if let Some(p) = extra {
        let layer = read_layer(p)?;
        merge_yaml(&mut merged, layer);
        layers.push(p.to_path_buf());
    }

    debug!(layers = ?layers, "merged config layers");

    let config: Config = if matches!(merged, serde_yaml::Value::Mapping(ref m) if m.is_empty()) {
        Config::default()
    } else {
        serde_yaml::from_value(merged).unwrap_or_default()
    };
    validate(&config)?;

    Ok(LoadedConfig { config, layers })
}

fn read_layer(path: &Path) -> anyhow::Result<serde_yaml::Value> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Reject a merged config the gateway client couldn't make a request with.
/// Malformed *files* already fail during parsing above; this catches
/// semantically invalid values that parse fine but aren't usable, e.g. an
/// empty base URL from a layer that only meant to override `default_model`.
fn validate(config: &Config) -> anyhow::Result<()> {
    let base_url = config.gateway.base_url.trim();
    if base_url.is_empty() {
        bail!("gateway.base_url must not be empty");
    }
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        bail!("gateway.base_url must start with http:// or https://, got `{base_url}`");
    }
    if config.gateway.default_model.trim().is_empty() {
        bail!("gateway.default_model must not be empty");
    }
    Ok(())
}

/// Deep-merge `src` into `dst`; src wins on scalar conflicts.
fn merge_yaml(dst: &mut serde_yaml::Value, src: serde_yaml::Value) {
    match (dst, src) {
        (serde_yaml::Value::Mapping(d), serde_yaml::Value::Mapping(s)) => {
            for (k, v) in s {
                let entry = d.entry(k).or_insert(serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
                merge_yaml(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn val(s: &str) -> serde_yaml::Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn merge_scalar_src_wins() {
        let mut dst = val("x: 1");
        let src = val("x: 2");
        merge_yaml(&mut dst, src);
        assert_eq!(dst["x"].as_i64(), Some(2));
    }

    #[test]
    fn merge_preserves_keys_not_in_src() {
        let mut dst = val("a: 1\nb: 2");
        let src = val("b: 99");
        merge_yaml(&mut dst, src);
        assert_eq!(dst["a"].as_i64(), Some(1));
        assert_eq!(dst["b"].as_i64(), Some(99));
    }

    #[test]
    fn merge_nested_tables() {
        let mut dst = val("gateway:\n  base_url: a\n  default_model: m1");
        let src = val("gateway:\n  default_model: m2");
        merge_yaml(&mut dst, src);
        assert_eq!(dst["gateway"]["base_url"].as_str(), Some("a"));
        assert_eq!(dst["gateway"]["default_model"].as_str(), Some("m2"));
    }

    #[test]
    fn load_returns_error_when_explicit_path_missing() {
        let result = load(Some(Path::new("/tmp/mcp_chat_core_nonexistent_config_xyz.yaml")));
        assert!(result.is_err());
    }

    #[test]
    fn load_with_no_extra_path_returns_defaults() {
        let cfg = load(None).unwrap();
        assert_eq!(cfg.gateway.default_model, "openai/gpt-4o-mini");
    }

    #[test]
    fn load_explicit_file_overrides_defaults() {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "gateway:\n  base_url: http://localhost:1234/v1\n  default_model: test-model").unwrap();
        let cfg = load(Some(f.path())).unwrap();
        assert_eq!(cfg.gateway.base_url, "http://localhost:1234/v1");
        assert_eq!(cfg.gateway.default_model, "test-model");
    }

    #[test]
    fn load_with_provenance_reports_the_explicit_layer() {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "gateway:\n  base_url: http://localhost:1234/v1\n  default_model: test-model").unwrap();
        let loaded = load_with_provenance(Some(f.path())).unwrap();
        assert_eq!(loaded.layers.last(), Some(&f.path().to_path_buf()));
    }

    #[test]
    fn load_rejects_empty_base_url() {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "gateway:\n  base_url: \"\"\n  default_model: m").unwrap();
        let err = load(Some(f.path())).unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn load_rejects_base_url_without_scheme() {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "gateway:\n  base_url: localhost:1234/v1\n  default_model: m").unwrap();
        let err = load(Some(f.path())).unwrap_err();
        assert!(err.to_string().contains("http"));
    }
}
