//! Operator-level configuration
//!
//! Flags double as environment variables so the operator can be configured
//! from its Deployment manifest. Per-pipeline values layered on top of these
//! defaults live in [`crate::parameters`].

use crate::validation::FailedJobPolicy;
use clap::Parser;
use std::time::Duration;

/// xjoin Kubernetes operator
#[derive(Parser, Debug, Clone)]
#[command(name = "xjoin-operator")]
#[command(version, about = "Kubernetes operator for xjoin CDC-to-search pipelines")]
pub struct OperatorConfig {
    /// Namespace to watch (empty for all namespaces)
    #[arg(long, env = "WATCH_NAMESPACE", default_value = "")]
    pub namespace: String,

    /// Seconds between steady-state reconcile passes
    #[arg(long, env = "XJOIN_REQUEUE_SECONDS", default_value_t = 30)]
    pub requeue_seconds: u64,

    /// ConfigMap holding per-namespace pipeline parameters
    #[arg(long, env = "XJOIN_CONFIG_MAP", default_value = "xjoin")]
    pub config_map: String,

    /// Secret with the Elasticsearch endpoint, username and password
    #[arg(long, env = "XJOIN_ELASTICSEARCH_SECRET", default_value = "xjoin-elasticsearch")]
    pub elasticsearch_secret: String,

    /// Image run by validation jobs
    #[arg(
        long,
        env = "XJOIN_VALIDATION_IMAGE",
        default_value = "quay.io/cloudservices/xjoin-validation:latest"
    )]
    pub validation_image: String,

    /// What to do with a validation job that ended in the Failed phase
    #[arg(long, env = "XJOIN_FAILED_JOB_POLICY", value_enum, default_value_t = FailedJobPolicy::Retain)]
    pub failed_job_policy: FailedJobPolicy,

    #[arg(long, env = "XJOIN_SCHEMA_REGISTRY_PROTOCOL", default_value = "http")]
    pub schema_registry_protocol: String,

    #[arg(long, env = "XJOIN_SCHEMA_REGISTRY_HOST", default_value = "xjoin-apicurio-service")]
    pub schema_registry_host: String,

    #[arg(long, env = "XJOIN_SCHEMA_REGISTRY_PORT", default_value = "10000")]
    pub schema_registry_port: String,

    /// Strimzi Kafka cluster owning the topics
    #[arg(long, env = "XJOIN_KAFKA_CLUSTER", default_value = "xjoin-kafka-cluster")]
    pub kafka_cluster: String,

    /// Strimzi Kafka Connect cluster running the connectors
    #[arg(long, env = "XJOIN_CONNECT_CLUSTER", default_value = "xjoin-kafka-connect")]
    pub connect_cluster: String,
}

impl OperatorConfig {
    /// Delay before the next steady-state pass.
    pub fn requeue_interval(&self) -> Duration {
        Duration::from_secs(self.requeue_seconds)
    }

    /// Namespace filter, `None` meaning every namespace.
    pub fn watched_namespace(&self) -> Option<&str> {
        if self.namespace.is_empty() {
            None
        } else {
            Some(&self.namespace)
        }
    }
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self::parse_from(["xjoin-operator"])
    }
}
