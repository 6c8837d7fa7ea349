//! Per-pipeline parameters
//!
//! Values are resolved in layers, later layers winning:
//! operator flags, then the namespace's xjoin ConfigMap, then the custom
//! resource spec.

use crate::config::OperatorConfig;
use crate::deadline::bounded;
use crate::elasticsearch::DEFAULT_INDEX_TEMPLATE;
use crate::error::{OperatorError, Result};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::Api;
use kube::Client;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::debug;

// ConfigMap keys
const KEY_SCHEMA_REGISTRY_PROTOCOL: &str = "schema.registry.protocol";
const KEY_SCHEMA_REGISTRY_HOST: &str = "schema.registry.host";
const KEY_SCHEMA_REGISTRY_PORT: &str = "schema.registry.port";
const KEY_KAFKA_CLUSTER: &str = "kafka.cluster";
const KEY_CONNECT_CLUSTER: &str = "connect.cluster";
const KEY_TOPIC_PARTITIONS: &str = "kafka.topic.partitions";
const KEY_TOPIC_REPLICAS: &str = "kafka.topic.replicas";
const KEY_ELASTICSEARCH_SECRET: &str = "elasticsearch.secret.name";
const KEY_INDEX_TEMPLATE: &str = "elasticsearch.index.template";
const KEY_INDEX_SHARDS: &str = "elasticsearch.index.shards";
const KEY_INDEX_REPLICAS: &str = "elasticsearch.index.replicas";
const KEY_VALIDATION_IMAGE: &str = "validation.image";

/// Schema registry coordinates, also handed to validation jobs
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaRegistryParams {
    pub protocol: String,
    pub host: String,
    pub port: String,
}

impl SchemaRegistryParams {
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }
}

/// Fields a custom resource contributes to its parameters
#[derive(Debug, Clone, Default)]
pub struct SpecOverrides {
    pub version: String,
    pub pause: bool,
    pub avro_schema: String,
    pub index_template: Option<String>,
}

/// Fully resolved parameters for one reconcile pass
#[derive(Debug, Clone)]
pub struct PipelineParameters {
    pub version: String,
    pub pause: bool,
    pub avro_schema: String,
    pub schema_registry: SchemaRegistryParams,
    pub kafka_cluster: String,
    pub connect_cluster: String,
    pub topic_partitions: i32,
    pub topic_replicas: i32,
    pub elasticsearch_secret: String,
    pub index_template: String,
    pub index_shards: i32,
    pub index_replicas: i32,
    pub validation_image: String,
}

impl PipelineParameters {
    /// Operator-level defaults; version and schema still unset.
    pub fn defaults(config: &OperatorConfig) -> Self {
        Self {
            version: String::new(),
            pause: false,
            avro_schema: String::new(),
            schema_registry: SchemaRegistryParams {
                protocol: config.schema_registry_protocol.clone(),
                host: config.schema_registry_host.clone(),
                port: config.schema_registry_port.clone(),
            },
            kafka_cluster: config.kafka_cluster.clone(),
            connect_cluster: config.connect_cluster.clone(),
            topic_partitions: 1,
            topic_replicas: 1,
            elasticsearch_secret: config.elasticsearch_secret.clone(),
            index_template: DEFAULT_INDEX_TEMPLATE.to_string(),
            index_shards: 3,
            index_replicas: 1,
            validation_image: config.validation_image.clone(),
        }
    }

    /// Layer the namespace ConfigMap over the current values.
    pub fn apply_config_map(&mut self, data: &BTreeMap<String, String>) -> Result<()> {
        let text = |key: &str, target: &mut String| {
            if let Some(v) = data.get(key) {
                *target = v.clone();
            }
        };
        text(KEY_SCHEMA_REGISTRY_PROTOCOL, &mut self.schema_registry.protocol);
        text(KEY_SCHEMA_REGISTRY_HOST, &mut self.schema_registry.host);
        text(KEY_SCHEMA_REGISTRY_PORT, &mut self.schema_registry.port);
        text(KEY_KAFKA_CLUSTER, &mut self.kafka_cluster);
        text(KEY_CONNECT_CLUSTER, &mut self.connect_cluster);
        text(KEY_ELASTICSEARCH_SECRET, &mut self.elasticsearch_secret);
        text(KEY_INDEX_TEMPLATE, &mut self.index_template);
        text(KEY_VALIDATION_IMAGE, &mut self.validation_image);

        parse_into(data, KEY_TOPIC_PARTITIONS, &mut self.topic_partitions)?;
        parse_into(data, KEY_TOPIC_REPLICAS, &mut self.topic_replicas)?;
        parse_into(data, KEY_INDEX_SHARDS, &mut self.index_shards)?;
        parse_into(data, KEY_INDEX_REPLICAS, &mut self.index_replicas)?;
        Ok(())
    }

    /// Layer the resource spec over the current values.
    pub fn apply_spec(&mut self, spec: SpecOverrides) -> Result<()> {
        if spec.version.trim().is_empty() {
            return Err(OperatorError::Configuration(
                "spec.version must not be empty".to_string(),
            ));
        }
        if spec.version.contains('.') {
            return Err(OperatorError::Configuration(format!(
                "spec.version {:?} must not contain dots",
                spec.version
            )));
        }
        self.version = spec.version;
        self.pause = spec.pause;
        self.avro_schema = spec.avro_schema;
        if let Some(template) = spec.index_template {
            self.index_template = template;
        }
        Ok(())
    }

    /// Values substituted into the index template besides the index and pipeline names.
    pub fn template_parameters(&self) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert("ElasticSearchIndexShards".to_string(), self.index_shards.to_string());
        params.insert("ElasticSearchIndexReplicas".to_string(), self.index_replicas.to_string());
        params
    }
}

fn parse_into<T: FromStr>(data: &BTreeMap<String, String>, key: &str, target: &mut T) -> Result<()> {
    if let Some(raw) = data.get(key) {
        *target = raw.trim().parse().map_err(|_| {
            OperatorError::Configuration(format!("{} has invalid value {:?}", key, raw))
        })?;
    }
    Ok(())
}

/// Resolve parameters for a resource living in `namespace`.
pub async fn load(
    client: &Client,
    namespace: &str,
    config: &OperatorConfig,
    spec: SpecOverrides,
) -> Result<PipelineParameters> {
    let mut params = PipelineParameters::defaults(config);

    let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
    let config_map = bounded("get config map", config_maps.get_opt(&config.config_map)).await?;

    match config_map.and_then(|cm| cm.data) {
        Some(data) => params.apply_config_map(&data)?,
        None => debug!(namespace = %namespace, config_map = %config.config_map, "No xjoin ConfigMap, using operator defaults"),
    }

    params.apply_spec(spec)?;
    Ok(params)
}
