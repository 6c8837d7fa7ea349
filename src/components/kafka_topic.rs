//! Versioned Kafka topic, declared as a Strimzi KafkaTopic.

use super::strimzi::{cluster_labels, StrimziResource};
use super::Component;
use crate::error::Result;
use async_trait::async_trait;
use kube::Client;

pub struct KafkaTopic {
    resource: StrimziResource,
    resource_prefix: String,
    kafka_cluster: String,
    partitions: i32,
    replicas: i32,
}

impl KafkaTopic {
    pub fn new(
        client: Client,
        namespace: &str,
        resource_prefix: impl Into<String>,
        kafka_cluster: impl Into<String>,
        partitions: i32,
        replicas: i32,
    ) -> Self {
        Self {
            resource: StrimziResource::new(client, namespace, "KafkaTopic"),
            resource_prefix: resource_prefix.into(),
            kafka_cluster: kafka_cluster.into(),
            partitions,
            replicas,
        }
    }
}

/// Topic name for `version`.
pub fn topic_name(resource_prefix: &str, version: &str) -> String {
    format!("{}.{}", resource_prefix, version)
}

/// KafkaTopic spec for a compacted CDC topic.
pub fn topic_spec(topic: &str, partitions: i32, replicas: i32) -> serde_json::Value {
    serde_json::json!({
        "topicName": topic,
        "partitions": partitions,
        "replicas": replicas,
        "config": {
            "cleanup.policy": "compact,delete",
            "retention.ms": "1209600000",
        }
    })
}

#[async_trait]
impl Component for KafkaTopic {
    fn kind(&self) -> &'static str {
        "KafkaTopic"
    }

    fn name(&self, version: &str) -> String {
        topic_name(&self.resource_prefix, version)
    }

    async fn create(&self, version: &str) -> Result<()> {
        let name = self.name(version);
        let spec = topic_spec(&name, self.partitions, self.replicas);
        self.resource
            .ensure(&name, cluster_labels(&self.kafka_cluster), spec)
            .await
    }

    async fn delete(&self, version: &str) -> Result<()> {
        self.resource.remove(&self.name(version)).await
    }

    async fn exists(&self, version: &str) -> Result<bool> {
        self.resource.exists(&self.name(version)).await
    }
}
