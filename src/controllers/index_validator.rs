//! XJoinIndexValidator reconciliation
//!
//! Drives the validation job of the index pipeline sharing the validator's
//! name and mirrors the job phase onto the validator status.

use super::index_pipeline::resource_prefix;
use super::{error_policy_backoff, KubeStore, ResourceStore};
use crate::conditions::{
    build_condition, has_finalizer, set_condition, CONDITION_FALSE, CONDITION_TRUE, CONDITION_VALID,
    INDEX_VALIDATOR_FINALIZER,
};
use crate::config::OperatorConfig;
use crate::crd::{IndexValidatorStatus, XJoinIndexValidator};
use crate::deadline::bounded;
use crate::elasticsearch::es_index_name;
use crate::error::{OperatorError, Result};
use crate::parameters::{self, PipelineParameters, SpecOverrides};
use crate::validation::{
    IndexPipelineStatusSink, PodJobRuntime, ValidationJobSpec, ValidationOrchestrator, ValidationOutcome,
};
use chrono::Utc;
use futures::StreamExt;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher::Config;
use kube::{Client, ResourceExt};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Context for the index validator controller
pub struct IndexValidatorController {
    client: Client,
    config: Arc<OperatorConfig>,
    store: KubeStore<XJoinIndexValidator>,
    orchestrator: ValidationOrchestrator,
}

impl IndexValidatorController {
    pub fn new(client: Client, config: Arc<OperatorConfig>) -> Self {
        let orchestrator = ValidationOrchestrator::new(
            Arc::new(PodJobRuntime::new(client.clone())),
            Arc::new(IndexPipelineStatusSink::new(client.clone())),
            config.failed_job_policy,
        );
        Self {
            store: KubeStore::new(client.clone()),
            client,
            config,
            orchestrator,
        }
    }

    /// Run the index validator controller
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let validators: Api<XJoinIndexValidator> = match self.config.watched_namespace() {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        };

        info!("Starting XJoinIndexValidator controller");

        Controller::new(validators, Config::default())
            .shutdown_on_signal()
            .run(
                |validator, ctx| async move { ctx.reconcile(validator).await },
                |validator, error, ctx| {
                    warn!("Reconciliation error: {}", error);
                    error_policy_backoff(validator, error, ctx)
                },
                Arc::clone(&self),
            )
            .for_each(|result| async move {
                match result {
                    Ok((obj, _action)) => debug!("Reconciled validator: {}", obj.name),
                    Err(e) => error!("Reconciliation failed: {:?}", e),
                }
            })
            .await;

        Ok(())
    }

    async fn reconcile(&self, validator: Arc<XJoinIndexValidator>) -> std::result::Result<Action, OperatorError> {
        let name = validator.name_any();
        let namespace = validator.namespace().unwrap_or_default();

        let Some(validator) = self.store.fetch(&namespace, &name).await? else {
            return Ok(Action::await_change());
        };
        let finalized = has_finalizer(validator.metadata.finalizers.as_deref(), INDEX_VALIDATOR_FINALIZER);

        if validator.metadata.deletion_timestamp.is_some() {
            if finalized {
                info!(namespace = %namespace, name = %name, "Removing validation jobs before release");
                self.orchestrator.cleanup(&namespace, &name).await?;
                self.store.remove_finalizer(&validator, INDEX_VALIDATOR_FINALIZER).await?;
            }
            return Ok(Action::await_change());
        }

        if validator.spec.pause {
            info!(namespace = %namespace, name = %name, "Paused, skipping validation");
            return Ok(Action::await_change());
        }

        if !finalized {
            self.store.add_finalizer(&validator, INDEX_VALIDATOR_FINALIZER).await?;
        }

        let spec = SpecOverrides {
            version: validator.spec.version.clone(),
            pause: validator.spec.pause,
            avro_schema: validator.spec.avro_schema.clone(),
            index_template: None,
        };
        let params = parameters::load(&self.client, &namespace, &self.config, spec).await?;
        let job = job_spec(&validator, &namespace, &params);

        let outcome = self.orchestrator.reconcile(&job).await?;
        info!(namespace = %namespace, name = %name, phase = %outcome.phase(), "Validation pass finished");

        let patch = validator_status_patch(validator.status.as_ref(), &outcome);
        let validators: Api<XJoinIndexValidator> = Api::namespaced(self.client.clone(), &namespace);
        bounded(
            "patch index validator status",
            validators.patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch)),
        )
        .await?;

        Ok(Action::requeue(self.config.requeue_interval()))
    }
}

/// Job validating the index of the pipeline named like `validator`.
fn job_spec(validator: &XJoinIndexValidator, namespace: &str, params: &PipelineParameters) -> ValidationJobSpec {
    let owner = validator.name_any();
    let index_name = validator
        .spec
        .index_name
        .clone()
        .unwrap_or_else(|| es_index_name(&resource_prefix(&owner), &params.version));

    ValidationJobSpec {
        owner,
        namespace: namespace.to_string(),
        version: params.version.clone(),
        image: params.validation_image.clone(),
        elasticsearch_secret: params.elasticsearch_secret.clone(),
        index_name,
        schema_registry: params.schema_registry.clone(),
        avro_schema: params.avro_schema.clone(),
    }
}

fn validator_status_patch(status: Option<&IndexValidatorStatus>, outcome: &ValidationOutcome) -> serde_json::Value {
    let mut conditions = status.map(|s| s.conditions.clone()).unwrap_or_default();
    if let ValidationOutcome::Completed(response) = outcome {
        let (value, reason) = if response.result == "pass" {
            (CONDITION_TRUE, "ValidationPassed")
        } else {
            (CONDITION_FALSE, "ValidationFailed")
        };
        set_condition(&mut conditions, build_condition(CONDITION_VALID, value, reason, &response.message));
    }

    serde_json::json!({
        "status": {
            "validationPodStatus": outcome.phase(),
            "conditions": conditions,
            "lastUpdated": Utc::now().to_rfc3339(),
        }
    })
}
