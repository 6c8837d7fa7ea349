//! XJoinDataSourcePipeline reconciliation
//!
//! A data source pipeline version consists of, in creation order: the Avro
//! schema, the Kafka topic it describes and the Debezium connector writing
//! into that topic.

use super::{patch_status, versions_patch, KubeStore, PipelineBlueprint, ReconcileDriver};
use crate::components::{AvroSchema, ComponentManager, DebeziumConnector, KafkaTopic, SchemaRegistryClient};
use crate::conditions::{build_condition, set_condition, CONDITION_READY, CONDITION_TRUE, DATASOURCE_PIPELINE_FINALIZER};
use crate::config::OperatorConfig;
use crate::crd::{PipelineCondition, XJoinDataSourcePipeline};
use crate::error::Result;
use crate::parameters::{self, PipelineParameters, SpecOverrides};
use async_trait::async_trait;
use kube::{Client, ResourceExt};
use std::sync::Arc;

pub type DataSourcePipelineDriver =
    ReconcileDriver<XJoinDataSourcePipeline, KubeStore<XJoinDataSourcePipeline>, DataSourcePipelineBlueprint>;

/// Prefix of every external resource owned by the pipeline `name`.
pub fn resource_prefix(name: &str) -> String {
    format!("xjoindatasourcepipeline.{}", name)
}

pub struct DataSourcePipelineBlueprint {
    client: Client,
    config: Arc<OperatorConfig>,
}

impl DataSourcePipelineBlueprint {
    pub fn new(client: Client, config: Arc<OperatorConfig>) -> Self {
        Self { client, config }
    }

    /// Driver wired to the Kubernetes API.
    pub fn driver(client: Client, config: Arc<OperatorConfig>) -> DataSourcePipelineDriver {
        let requeue = config.requeue_interval();
        ReconcileDriver::new(
            KubeStore::new(client.clone()),
            Self::new(client, config),
            DATASOURCE_PIPELINE_FINALIZER,
            requeue,
        )
    }
}

/// Status after a converged pass.
fn ready_status_patch(
    current: &[PipelineCondition],
    version: &str,
    generation: Option<i64>,
) -> serde_json::Value {
    let mut conditions = current.to_vec();
    set_condition(
        &mut conditions,
        build_condition(CONDITION_READY, CONDITION_TRUE, "Converged", "All components exist"),
    );
    serde_json::json!({
        "status": {
            "activeVersion": version,
            "conditions": conditions,
            "observedGeneration": generation,
        }
    })
}

#[async_trait]
impl PipelineBlueprint<XJoinDataSourcePipeline> for DataSourcePipelineBlueprint {
    fn kind(&self) -> &'static str {
        "XJoinDataSourcePipeline"
    }

    async fn parameters(&self, resource: &XJoinDataSourcePipeline) -> Result<PipelineParameters> {
        let namespace = resource.namespace().unwrap_or_default();
        let spec = SpecOverrides {
            version: resource.spec.version.clone(),
            pause: resource.spec.pause,
            avro_schema: resource.spec.avro_schema.clone(),
            index_template: None,
        };
        parameters::load(&self.client, &namespace, &self.config, spec).await
    }

    async fn components(
        &self,
        resource: &XJoinDataSourcePipeline,
        params: &PipelineParameters,
        version: &str,
    ) -> Result<ComponentManager> {
        let namespace = resource.namespace().unwrap_or_default();
        let prefix = resource_prefix(&resource.name_any());
        let registry = SchemaRegistryClient::new(&params.schema_registry)?;

        let mut manager = ComponentManager::new(version);
        manager.add_component(AvroSchema::new(registry, prefix.clone(), params.avro_schema.clone()));
        manager.add_component(KafkaTopic::new(
            self.client.clone(),
            &namespace,
            prefix.clone(),
            params.kafka_cluster.clone(),
            params.topic_partitions,
            params.topic_replicas,
        ));
        manager.add_component(DebeziumConnector::new(
            self.client.clone(),
            &namespace,
            prefix,
            params.connect_cluster.clone(),
            resource.spec.database.clone(),
            params.schema_registry.base_url(),
        ));
        Ok(manager)
    }

    fn recorded_versions(&self, resource: &XJoinDataSourcePipeline) -> Vec<String> {
        resource.status.as_ref().map(|s| s.versions.clone()).unwrap_or_default()
    }

    async fn record_versions(&self, resource: &XJoinDataSourcePipeline, versions: &[String]) -> Result<()> {
        patch_status(&self.client, resource, "patch data source pipeline versions", &versions_patch(versions)).await
    }

    async fn after_converge(&self, resource: &XJoinDataSourcePipeline, params: &PipelineParameters) -> Result<()> {
        let current = resource
            .status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default();
        let patch = ready_status_patch(current, &params.version, resource.metadata.generation);
        patch_status(&self.client, resource, "patch data source pipeline status", &patch).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::CONDITION_FALSE;

    #[test]
    fn test_resource_prefix() {
        assert_eq!(resource_prefix("hosts"), "xjoindatasourcepipeline.hosts");
    }

    #[test]
    fn test_ready_status_patch_replaces_stale_ready_condition() {
        let stale = build_condition(CONDITION_READY, CONDITION_FALSE, "Pending", "waiting");
        let patch = ready_status_patch(&[stale], "1700000000", Some(3));

        assert_eq!(patch["status"]["activeVersion"], "1700000000");
        assert_eq!(patch["status"]["observedGeneration"], 3);
        let conditions = patch["status"]["conditions"].as_array().unwrap();
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0]["status"], CONDITION_TRUE);
    }
}
