//! XJoinIndexPipeline Custom Resource Definition
//!
//! An index pipeline materialises one generation of a search index. Several
//! generations of the same pipeline coexist as `<prefix>.<version>` indices
//! until older ones are retired.

use super::{PipelineCondition, ValidationResponse};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// XJoinIndexPipeline is the Schema for the xjoinindexpipelines API
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "xjoin.cloud.redhat.com",
    version = "v1alpha1",
    kind = "XJoinIndexPipeline",
    namespaced,
    status = "IndexPipelineStatus",
    shortname = "xjoinip",
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Index","type":"string","jsonPath":".status.activeIndex"}"#,
    printcolumn = r#"{"name":"Validation","type":"string","jsonPath":".status.validationResponse.result"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct IndexPipelineSpec {
    /// Pipeline version stamped onto every generated resource
    pub version: String,

    /// Avro schema of the joined documents
    pub avro_schema: String,

    /// Skip reconciliation while true
    #[serde(default)]
    pub pause: bool,

    /// Overrides the index template from the operator configuration
    #[serde(default)]
    pub index_template: Option<String>,
}

/// Status of the XJoinIndexPipeline
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct IndexPipelineStatus {
    /// Version currently serving reads; its index is never retired
    #[serde(default)]
    pub active_version: Option<String>,

    /// Full name of the index for `active_version`
    #[serde(default)]
    pub active_index: Option<String>,

    /// Versions whose components may still exist, oldest first
    #[serde(default)]
    pub versions: Vec<String>,

    /// Live document count of `active_index`
    #[serde(default)]
    pub document_count: Option<i64>,

    /// Last verdict reported by the validation job
    #[serde(default)]
    pub validation_response: Option<ValidationResponse>,

    /// Version the last verdict was produced for
    #[serde(default)]
    pub validated_version: Option<String>,

    #[serde(default)]
    pub conditions: Vec<PipelineCondition>,

    #[serde(default)]
    pub observed_generation: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_pipeline_spec_defaults() {
        let json = r#"{"version": "1700000000", "avroSchema": "{}"}"#;
        let spec: IndexPipelineSpec = serde_json::from_str(json).unwrap();
        assert!(!spec.pause);
        assert!(spec.index_template.is_none());
    }

    #[test]
    fn test_index_pipeline_status_validation_response() {
        let json = r#"{"validationResponse": {"result": "pass", "message": "ok"}}"#;
        let status: IndexPipelineStatus = serde_json::from_str(json).unwrap();
        let response = status.validation_response.unwrap();
        assert_eq!(response.result, "pass");
        assert!(status.conditions.is_empty());
        assert!(status.versions.is_empty());
        assert!(status.validated_version.is_none());
    }
}
