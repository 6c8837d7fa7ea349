//! XJoinDataSourcePipeline Custom Resource Definition
//!
//! A data source pipeline captures changes from one database table into a
//! versioned Kafka topic, registering the Avro schema that describes it.

use super::PipelineCondition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// XJoinDataSourcePipeline is the Schema for the xjoindatasourcepipelines API
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "xjoin.cloud.redhat.com",
    version = "v1alpha1",
    kind = "XJoinDataSourcePipeline",
    namespaced,
    status = "DataSourcePipelineStatus",
    shortname = "xjoindsp",
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Paused","type":"boolean","jsonPath":".spec.pause"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DataSourcePipelineSpec {
    /// Pipeline version stamped onto every generated resource
    pub version: String,

    /// Avro schema describing the captured rows
    pub avro_schema: String,

    /// Skip reconciliation while true
    #[serde(default)]
    pub pause: bool,

    /// Source database coordinates
    #[serde(default)]
    pub database: DatabaseConnection,
}

/// Connection parameters handed to the Debezium connector
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConnection {
    #[serde(default)]
    pub hostname: String,

    #[serde(default = "default_database_port")]
    pub port: String,

    #[serde(default)]
    pub name: String,

    /// Fully-qualified table, e.g. "public.hosts"
    #[serde(default)]
    pub table: String,

    #[serde(default)]
    pub username: String,

    /// Secret holding the password; only the reference reaches the connector
    #[serde(default)]
    pub password_secret: SecretKeyReference,
}

/// A key inside a Secret in the pipeline's namespace
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyReference {
    pub name: String,

    #[serde(default = "default_password_key")]
    pub key: String,
}

impl Default for SecretKeyReference {
    fn default() -> Self {
        Self {
            name: String::new(),
            key: default_password_key(),
        }
    }
}

/// Status of the XJoinDataSourcePipeline
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct DataSourcePipelineStatus {
    /// Version that last converged
    #[serde(default)]
    pub active_version: Option<String>,

    /// Versions whose components may still exist, oldest first
    #[serde(default)]
    pub versions: Vec<String>,

    #[serde(default)]
    pub conditions: Vec<PipelineCondition>,

    #[serde(default)]
    pub observed_generation: Option<i64>,
}

fn default_database_port() -> String {
    "5432".to_string()
}

fn default_password_key() -> String {
    "db.password".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datasource_spec_defaults() {
        let json = r#"{"version": "1700000000", "avroSchema": "{}"}"#;
        let spec: DataSourcePipelineSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.version, "1700000000");
        assert!(!spec.pause);
        assert_eq!(spec.database.port, "5432");
    }

    #[test]
    fn test_datasource_database_block() {
        let json = r#"{
            "version": "1",
            "avroSchema": "{}",
            "database": {"hostname": "db", "name": "hosts", "table": "public.hosts"}
        }"#;
        let spec: DataSourcePipelineSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.database.hostname, "db");
        assert_eq!(spec.database.table, "public.hosts");
    }

    #[test]
    fn test_password_is_a_secret_reference() {
        let json = r#"{
            "version": "1",
            "avroSchema": "{}",
            "database": {"hostname": "db", "passwordSecret": {"name": "hosts-db"}}
        }"#;
        let spec: DataSourcePipelineSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.database.password_secret.name, "hosts-db");
        assert_eq!(spec.database.password_secret.key, "db.password");
    }
}
