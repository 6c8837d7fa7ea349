//! XJoinIndexValidator Custom Resource Definition
//!
//! A validator shares its name and version with the index pipeline it
//! checks. It owns at most one validation job at a time.

use super::PipelineCondition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// XJoinIndexValidator is the Schema for the xjoinindexvalidators API
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "xjoin.cloud.redhat.com",
    version = "v1alpha1",
    kind = "XJoinIndexValidator",
    namespaced,
    status = "IndexValidatorStatus",
    shortname = "xjoiniv",
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.validationPodStatus"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct IndexValidatorSpec {
    /// Version of the index pipeline being validated
    pub version: String,

    /// Avro schema handed to the validation job
    pub avro_schema: String,

    /// Index to validate; defaults to the pipeline's index for `version`
    #[serde(default)]
    pub index_name: Option<String>,

    #[serde(default)]
    pub pause: bool,
}

/// Status of the XJoinIndexValidator
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct IndexValidatorStatus {
    /// Last phase reported by the orchestrator: "", "running", "failed" or a verdict
    #[serde(default)]
    pub validation_pod_status: String,

    #[serde(default)]
    pub conditions: Vec<PipelineCondition>,

    #[serde(default)]
    pub last_updated: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validator_spec_defaults() {
        let json = r#"{"version": "1", "avroSchema": "{}"}"#;
        let spec: IndexValidatorSpec = serde_json::from_str(json).unwrap();
        assert!(spec.index_name.is_none());
        assert!(!spec.pause);
    }

    #[test]
    fn test_validator_status_default_phase_is_empty() {
        assert_eq!(IndexValidatorStatus::default().validation_pod_status, "");
    }
}
