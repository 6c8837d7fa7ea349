//! Index and ingest pipeline templates.
//!
//! Templates use `{{.Name}}` placeholders so existing ConfigMap templates keep
//! working. Rendered output is compacted to a single line before submission.

use crate::error::{OperatorError, Result};
use regex::{Captures, Regex};
use std::collections::BTreeMap;

/// Index definition used when neither the ConfigMap nor the spec supplies one
pub const DEFAULT_INDEX_TEMPLATE: &str = r#"{
	"settings": {
		"index": {
			"number_of_shards": {{.ElasticSearchIndexShards}},
			"number_of_replicas": {{.ElasticSearchIndexReplicas}},
			"default_pipeline": "{{.ElasticSearchPipeline}}"
		}
	},
	"mappings": {
		"_meta": {
			"xjoin_index": "{{.ElasticSearchIndex}}"
		},
		"dynamic": false,
		"properties": {
			"id": {"type": "keyword"}
		}
	}
}"#;

/// Ingest pipeline installed alongside every index generation
pub const DEFAULT_PIPELINE_TEMPLATE: &str = r#"{
	"description": "xjoin ingest pipeline for {{.ElasticSearchIndex}}",
	"processors": [
		{"set": {"field": "_source.xjoin_version", "value": "{{.ElasticSearchPipeline}}"}}
	]
}"#;

/// Substitute every placeholder and strip newlines and tabs.
///
/// A placeholder without a value is a configuration error rather than an
/// empty string, so a typo in a template never reaches the search engine.
pub fn render_template(template: &str, params: &BTreeMap<String, String>) -> Result<String> {
    let placeholder = Regex::new(r"\{\{\s*\.([A-Za-z0-9_]+)\s*\}\}")
        .map_err(|e| OperatorError::Configuration(format!("template pattern: {}", e)))?;

    let mut missing = Vec::new();
    let rendered = placeholder.replace_all(template, |caps: &Captures| {
        let key = &caps[1];
        match params.get(key) {
            Some(value) => value.clone(),
            None => {
                missing.push(key.to_string());
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        return Err(OperatorError::Configuration(format!(
            "template references unknown parameters: {}",
            missing.join(", ")
        )));
    }

    Ok(rendered.replace(['\n', '\r', '\t'], ""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("ElasticSearchIndex".to_string(), "xjoinindexpipeline.hosts.1".to_string()),
            ("ElasticSearchPipeline".to_string(), "xjoinindexpipeline.hosts.1".to_string()),
            ("ElasticSearchIndexShards".to_string(), "3".to_string()),
            ("ElasticSearchIndexReplicas".to_string(), "1".to_string()),
        ])
    }

    #[test]
    fn test_render_default_index_template() {
        let body = render_template(DEFAULT_INDEX_TEMPLATE, &params()).unwrap();
        assert!(!body.contains('\n'));
        assert!(!body.contains('\t'));
        assert!(!body.contains("{{"));

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["settings"]["index"]["number_of_shards"], 3);
        assert_eq!(json["settings"]["index"]["default_pipeline"], "xjoinindexpipeline.hosts.1");
        assert_eq!(json["mappings"]["_meta"]["xjoin_index"], "xjoinindexpipeline.hosts.1");
    }

    #[test]
    fn test_render_pipeline_template() {
        let body = render_template(DEFAULT_PIPELINE_TEMPLATE, &params()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(json["processors"].is_array());
    }

    #[test]
    fn test_whitespace_inside_braces_is_accepted() {
        let body = render_template("{\"i\": \"{{ .ElasticSearchIndex }}\"}", &params()).unwrap();
        assert_eq!(body, "{\"i\": \"xjoinindexpipeline.hosts.1\"}");
    }

    #[test]
    fn test_unknown_placeholder_is_rejected() {
        let err = render_template("{{.Nope}} {{.AlsoNope}}", &params()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Nope"));
        assert!(msg.contains("AlsoNope"));
    }
}
