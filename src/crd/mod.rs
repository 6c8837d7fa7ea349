//! Custom Resource Definitions for the xjoin operator
//!
//! Defines the CRDs that the operator manages:
//! - XJoinDataSourcePipeline: schema, topic and CDC connector for one source table
//! - XJoinIndexPipeline: schema, topic and search index for one index generation
//! - XJoinIndexValidator: validation job comparing an index with its sources

mod datasource_pipeline;
mod index_pipeline;
mod index_validator;

pub use datasource_pipeline::{
    DataSourcePipelineSpec, DataSourcePipelineStatus, DatabaseConnection, SecretKeyReference,
    XJoinDataSourcePipeline,
};
pub use index_pipeline::{IndexPipelineSpec, IndexPipelineStatus, XJoinIndexPipeline};
pub use index_validator::{IndexValidatorSpec, IndexValidatorStatus, XJoinIndexValidator};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition attached to an xjoin resource status
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PipelineCondition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last time the condition transitioned
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Human-readable message
    #[serde(default)]
    pub message: Option<String>,
}

/// Verdict printed by the validation job as its last output line
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResponse {
    /// Verdict, e.g. "pass" or "fail"
    pub result: String,

    /// Human-readable summary
    #[serde(default)]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Validator specific detail, kept opaque
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}
