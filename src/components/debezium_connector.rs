//! Debezium Postgres connector, declared as a Strimzi KafkaConnector.
//!
//! Every captured table is rerouted into the pipeline's versioned topic.

use super::kafka_topic::topic_name;
use super::strimzi::{cluster_labels, StrimziResource};
use super::Component;
use crate::crd::{DatabaseConnection, SecretKeyReference};
use crate::error::Result;
use async_trait::async_trait;
use kube::Client;

const CONNECTOR_CLASS: &str = "io.debezium.connector.postgresql.PostgresConnector";
const AVRO_CONVERTER: &str = "io.confluent.connect.avro.AvroConverter";

pub struct DebeziumConnector {
    resource: StrimziResource,
    namespace: String,
    resource_prefix: String,
    connect_cluster: String,
    database: DatabaseConnection,
    schema_registry_url: String,
}

impl DebeziumConnector {
    pub fn new(
        client: Client,
        namespace: &str,
        resource_prefix: impl Into<String>,
        connect_cluster: impl Into<String>,
        database: DatabaseConnection,
        schema_registry_url: impl Into<String>,
    ) -> Self {
        Self {
            resource: StrimziResource::new(client, namespace, "KafkaConnector"),
            namespace: namespace.to_string(),
            resource_prefix: resource_prefix.into(),
            connect_cluster: connect_cluster.into(),
            database,
            schema_registry_url: schema_registry_url.into(),
        }
    }
}

/// Replication slot names only allow lowercase letters, digits and underscores.
pub fn slot_name(connector: &str) -> String {
    connector
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

/// Placeholder resolved by the Connect cluster's Kubernetes secrets config
/// provider, so the password never appears in the connector resource.
pub fn secret_placeholder(namespace: &str, secret: &SecretKeyReference) -> String {
    format!("${{secrets:{}/{}:{}}}", namespace, secret.name, secret.key)
}

/// KafkaConnector spec routing `database` changes into `topic`.
pub fn connector_spec(
    namespace: &str,
    connector: &str,
    topic: &str,
    database: &DatabaseConnection,
    schema_registry_url: &str,
) -> serde_json::Value {
    serde_json::json!({
        "class": CONNECTOR_CLASS,
        "tasksMax": 1,
        "config": {
            "database.hostname": database.hostname,
            "database.port": database.port,
            "database.user": database.username,
            "database.password": secret_placeholder(namespace, &database.password_secret),
            "database.dbname": database.name,
            "table.include.list": database.table,
            "plugin.name": "pgoutput",
            "slot.name": slot_name(connector),
            "topic.prefix": connector,
            "key.converter": AVRO_CONVERTER,
            "key.converter.schema.registry.url": schema_registry_url,
            "value.converter": AVRO_CONVERTER,
            "value.converter.schema.registry.url": schema_registry_url,
            "transforms": "reroute",
            "transforms.reroute.type": "io.debezium.transforms.ByLogicalTableRouter",
            "transforms.reroute.topic.regex": ".*",
            "transforms.reroute.topic.replacement": topic,
        }
    })
}

#[async_trait]
impl Component for DebeziumConnector {
    fn kind(&self) -> &'static str {
        "DebeziumConnector"
    }

    fn name(&self, version: &str) -> String {
        format!("{}.{}", self.resource_prefix, version)
    }

    async fn create(&self, version: &str) -> Result<()> {
        let name = self.name(version);
        let topic = topic_name(&self.resource_prefix, version);
        let spec = connector_spec(&self.namespace, &name, &topic, &self.database, &self.schema_registry_url);
        self.resource
            .ensure(&name, cluster_labels(&self.connect_cluster), spec)
            .await
    }

    async fn delete(&self, version: &str) -> Result<()> {
        self.resource.remove(&self.name(version)).await
    }

    async fn exists(&self, version: &str) -> Result<bool> {
        self.resource.exists(&self.name(version)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_name_is_sanitised() {
        assert_eq!(slot_name("xjoindatasourcepipeline.Hosts-v2.17"), "xjoindatasourcepipeline_hosts_v2_17");
    }

    #[test]
    fn test_connector_spec_routes_into_topic() {
        let db = DatabaseConnection {
            hostname: "host-inventory-db".to_string(),
            port: "5432".to_string(),
            name: "insights".to_string(),
            table: "public.hosts".to_string(),
            username: "insights".to_string(),
            password_secret: SecretKeyReference {
                name: "host-inventory-db".to_string(),
                key: "db.password".to_string(),
            },
        };
        let spec = connector_spec("xjoin", "dsp.hosts.1", "dsp.hosts.1", &db, "http://registry:8081");
        assert_eq!(spec["class"], CONNECTOR_CLASS);
        assert_eq!(spec["config"]["table.include.list"], "public.hosts");
        assert_eq!(spec["config"]["transforms.reroute.topic.replacement"], "dsp.hosts.1");
        assert_eq!(spec["config"]["slot.name"], "dsp_hosts_1");
        assert_eq!(spec["config"]["value.converter.schema.registry.url"], "http://registry:8081");
    }

    #[test]
    fn test_password_is_referenced_not_inlined() {
        let db = DatabaseConnection {
            password_secret: SecretKeyReference {
                name: "hosts-db".to_string(),
                key: "password".to_string(),
            },
            ..Default::default()
        };
        let spec = connector_spec("xjoin", "dsp.hosts.1", "dsp.hosts.1", &db, "http://registry:8081");
        assert_eq!(spec["config"]["database.password"], "${secrets:xjoin/hosts-db:password}");
    }
}
