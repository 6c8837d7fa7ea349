//! XJoinIndexPipeline reconciliation
//!
//! An index pipeline version consists of the Avro schema, the Kafka topic of
//! joined documents and the search index (with its ingest pipeline). Index
//! generations of the same pipeline coexist until a pass finds them neither
//! current nor active, at which point they are retired. A version becomes
//! active once the validator reports "pass" for it.

use super::{patch_status, versions_patch, KubeStore, PipelineBlueprint, ReconcileDriver};
use crate::components::{AvroSchema, ComponentManager, ElasticsearchIndex, KafkaTopic, SchemaRegistryClient};
use crate::conditions::{build_condition, set_condition, CONDITION_READY, CONDITION_TRUE, INDEX_PIPELINE_FINALIZER};
use crate::config::OperatorConfig;
use crate::crd::{IndexPipelineStatus, XJoinIndexPipeline};
use crate::elasticsearch::{HttpTransport, SearchIndexManager};
use crate::error::Result;
use crate::parameters::{self, PipelineParameters, SpecOverrides};
use async_trait::async_trait;
use kube::{Client, ResourceExt};
use std::sync::Arc;
use tracing::info;

pub type IndexPipelineDriver =
    ReconcileDriver<XJoinIndexPipeline, KubeStore<XJoinIndexPipeline>, IndexPipelineBlueprint>;

/// Prefix of every external resource owned by the pipeline `name`.
pub fn resource_prefix(name: &str) -> String {
    format!("xjoinindexpipeline.{}", name)
}

pub struct IndexPipelineBlueprint {
    client: Client,
    config: Arc<OperatorConfig>,
}

impl IndexPipelineBlueprint {
    pub fn new(client: Client, config: Arc<OperatorConfig>) -> Self {
        Self { client, config }
    }

    /// Driver wired to the Kubernetes API.
    pub fn driver(client: Client, config: Arc<OperatorConfig>) -> IndexPipelineDriver {
        let requeue = config.requeue_interval();
        ReconcileDriver::new(
            KubeStore::new(client.clone()),
            Self::new(client, config),
            INDEX_PIPELINE_FINALIZER,
            requeue,
        )
    }

    async fn index_manager(
        &self,
        resource: &XJoinIndexPipeline,
        params: &PipelineParameters,
    ) -> Result<SearchIndexManager> {
        let namespace = resource.namespace().unwrap_or_default();
        let transport =
            HttpTransport::from_secret(&self.client, &namespace, &params.elasticsearch_secret).await?;
        Ok(SearchIndexManager::new(
            Arc::new(transport),
            resource_prefix(&resource.name_any()),
            params.index_template.clone(),
            params.template_parameters(),
        ))
    }
}

/// Delete every index generation of the manager's prefix not named in
/// `keep_versions`, together with its ingest pipeline. Returns the deleted
/// index names.
pub async fn retire_generations(manager: &SearchIndexManager, keep_versions: &[&str]) -> Result<Vec<String>> {
    let stale = manager.stale_indices(keep_versions).await?;
    for index in &stale {
        manager.delete_index_by_full_name(index).await?;
        if let Some(version) = manager.owned_version(index) {
            manager.delete_pipeline(version).await?;
        }
        info!(index = %index, "Retired index generation");
    }
    Ok(stale)
}

/// Version serving reads after this pass.
///
/// The current version takes over once the last verdict is a pass for it;
/// until then the previous active version keeps serving. The first version
/// of a pipeline is active right away.
fn next_active_version(status: Option<&IndexPipelineStatus>, version: &str) -> String {
    let Some(status) = status else {
        return version.to_string();
    };
    let validated = status.validated_version.as_deref() == Some(version)
        && status.validation_response.as_ref().is_some_and(|r| r.result == "pass");
    match &status.active_version {
        Some(active) if !validated => active.clone(),
        _ => version.to_string(),
    }
}

/// Status after a converged pass; `index` belongs to `active_version`.
fn converged_status_patch(
    status: Option<&IndexPipelineStatus>,
    active_version: &str,
    index: &str,
    document_count: i64,
    generation: Option<i64>,
) -> serde_json::Value {
    let mut conditions = status.map(|s| s.conditions.clone()).unwrap_or_default();
    set_condition(
        &mut conditions,
        build_condition(CONDITION_READY, CONDITION_TRUE, "Converged", "All components exist"),
    );

    serde_json::json!({
        "status": {
            "activeVersion": active_version,
            "activeIndex": index,
            "documentCount": document_count,
            "conditions": conditions,
            "observedGeneration": generation,
        }
    })
}

#[async_trait]
impl PipelineBlueprint<XJoinIndexPipeline> for IndexPipelineBlueprint {
    fn kind(&self) -> &'static str {
        "XJoinIndexPipeline"
    }

    async fn parameters(&self, resource: &XJoinIndexPipeline) -> Result<PipelineParameters> {
        let namespace = resource.namespace().unwrap_or_default();
        let spec = SpecOverrides {
            version: resource.spec.version.clone(),
            pause: resource.spec.pause,
            avro_schema: resource.spec.avro_schema.clone(),
            index_template: resource.spec.index_template.clone(),
        };
        parameters::load(&self.client, &namespace, &self.config, spec).await
    }

    async fn components(
        &self,
        resource: &XJoinIndexPipeline,
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
            prefix,
            params.kafka_cluster.clone(),
            params.topic_partitions,
            params.topic_replicas,
        ));
        manager.add_component(ElasticsearchIndex::new(self.index_manager(resource, params).await?));
        Ok(manager)
    }

    fn recorded_versions(&self, resource: &XJoinIndexPipeline) -> Vec<String> {
        resource.status.as_ref().map(|s| s.versions.clone()).unwrap_or_default()
    }

    async fn record_versions(&self, resource: &XJoinIndexPipeline, versions: &[String]) -> Result<()> {
        patch_status(&self.client, resource, "patch index pipeline versions", &versions_patch(versions)).await
    }

    fn retained_versions(&self, resource: &XJoinIndexPipeline, params: &PipelineParameters) -> Vec<String> {
        let active = next_active_version(resource.status.as_ref(), &params.version);
        vec![params.version.clone(), active]
    }

    async fn after_converge(&self, resource: &XJoinIndexPipeline, params: &PipelineParameters) -> Result<()> {
        let es = self.index_manager(resource, params).await?;
        let status = resource.status.as_ref();
        let active = next_active_version(status, &params.version);

        // Sweeps generations that were never recorded
        retire_generations(&es, &[params.version.as_str(), active.as_str()]).await?;

        let index = es.es_index_name(&active);
        let count = es.count_index(&index).await?;
        let patch = converged_status_patch(status, &active, &index, count, resource.metadata.generation);
        patch_status(&self.client, resource, "patch index pipeline status", &patch).await
    }

    /// The owner is going away, so no generation is kept.
    async fn before_release(&self, resource: &XJoinIndexPipeline, params: &PipelineParameters) -> Result<()> {
        let es = self.index_manager(resource, params).await?;
        retire_generations(&es, &[]).await?;
        Ok(())
    }
}
