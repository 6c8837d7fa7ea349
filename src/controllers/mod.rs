//! Controllers for the xjoin operator
//!
//! Pipeline kinds share one [`ReconcileDriver`]: it fetches the resource,
//! resolves its parameters, rebuilds the component set for the current
//! version, tears down versions no longer retained and runs the finalizer
//! protocol around it. What differs per kind
//! lives in a [`PipelineBlueprint`]. The validator kind has its own loop.

mod datasource_pipeline;
mod index_pipeline;
mod index_validator;

pub use datasource_pipeline::{DataSourcePipelineBlueprint, DataSourcePipelineDriver};
pub use index_pipeline::{retire_generations, IndexPipelineBlueprint, IndexPipelineDriver};
pub use index_validator::IndexValidatorController;

use crate::components::ComponentManager;
use crate::conditions::{has_finalizer, without_finalizer};
use crate::deadline::bounded;
use crate::error::{ComponentFailure, OperatorError, Result};
use crate::parameters::PipelineParameters;
use async_trait::async_trait;
use futures::StreamExt;
use kube::api::{Api, Patch, PatchParams};
use kube::core::NamespaceResourceScope;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher::Config;
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How a finished pass wants to be scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Run again after the delay
    Requeue(Duration),
    /// Run again only when the resource changes
    AwaitChange,
}

impl From<PassOutcome> for Action {
    fn from(outcome: PassOutcome) -> Self {
        match outcome {
            PassOutcome::Requeue(after) => Action::requeue(after),
            PassOutcome::AwaitChange => Action::await_change(),
        }
    }
}

/// Requeue delay after a failed pass.
pub fn error_policy_backoff<K, C>(_obj: Arc<K>, error: &OperatorError, _ctx: Arc<C>) -> Action {
    match error {
        OperatorError::Conflict(_) => Action::requeue(Duration::from_secs(5)),
        OperatorError::Configuration(_) => Action::requeue(Duration::from_secs(300)),
        _ => Action::requeue(Duration::from_secs(30)),
    }
}

/// Read and finalizer access to reconciled resources.
#[async_trait]
pub trait ResourceStore<K: Send + Sync>: Send + Sync {
    /// `None` when the resource no longer exists
    async fn fetch(&self, namespace: &str, name: &str) -> Result<Option<K>>;

    async fn add_finalizer(&self, resource: &K, token: &str) -> Result<()>;

    async fn remove_finalizer(&self, resource: &K, token: &str) -> Result<()>;
}

/// [`ResourceStore`] backed by the Kubernetes API
pub struct KubeStore<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeStore<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }

    fn api(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

impl<K> KubeStore<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static,
{
    /// Replace the finalizer list, failing with `Conflict` if the resource changed since it was read.
    async fn write_finalizers(&self, resource: &K, finalizers: Vec<String>) -> Result<()> {
        let namespace = resource.namespace().unwrap_or_default();
        let patch = serde_json::json!({
            "metadata": {
                "resourceVersion": resource.resource_version(),
                "finalizers": finalizers,
            }
        });
        bounded(
            "patch finalizers",
            self.api(&namespace)
                .patch(&resource.name_any(), &PatchParams::default(), &Patch::Merge(&patch)),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl<K> ResourceStore<K> for KubeStore<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static,
{
    async fn fetch(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        bounded("get resource", self.api(namespace).get_opt(name)).await
    }

    async fn add_finalizer(&self, resource: &K, token: &str) -> Result<()> {
        let mut finalizers = resource.finalizers().to_vec();
        finalizers.push(token.to_string());
        self.write_finalizers(resource, finalizers).await
    }

    async fn remove_finalizer(&self, resource: &K, token: &str) -> Result<()> {
        let finalizers = without_finalizer(resource.meta().finalizers.as_deref(), token);
        self.write_finalizers(resource, finalizers).await
    }
}

/// Merge-patch the status subresource of `resource`.
pub async fn patch_status<K>(client: &Client, resource: &K, operation: &str, patch: &serde_json::Value) -> Result<()>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    let namespace = resource.namespace().unwrap_or_default();
    let api: Api<K> = Api::namespaced(client.clone(), &namespace);
    bounded(
        operation,
        api.patch_status(&resource.name_any(), &PatchParams::default(), &Patch::Merge(patch)),
    )
    .await?;
    Ok(())
}

/// Status patch replacing the recorded version list.
pub fn versions_patch(versions: &[String]) -> serde_json::Value {
    serde_json::json!({ "status": { "versions": versions } })
}

/// Per-kind pieces of a pipeline reconcile pass.
#[async_trait]
pub trait PipelineBlueprint<K: Send + Sync>: Send + Sync {
    /// Kind label used in logs
    fn kind(&self) -> &'static str;

    async fn parameters(&self, resource: &K) -> Result<PipelineParameters>;

    /// Components of `version`, in creation order.
    async fn components(&self, resource: &K, params: &PipelineParameters, version: &str) -> Result<ComponentManager>;

    /// Versions whose components may still exist, as recorded on status.
    fn recorded_versions(&self, resource: &K) -> Vec<String>;

    /// Persist the versions whose components may exist.
    async fn record_versions(&self, resource: &K, versions: &[String]) -> Result<()>;

    /// Versions whose components survive this pass; the current version always does.
    fn retained_versions(&self, _resource: &K, params: &PipelineParameters) -> Vec<String> {
        vec![params.version.clone()]
    }

    /// Runs after every component converged and retired versions were removed.
    async fn after_converge(&self, _resource: &K, _params: &PipelineParameters) -> Result<()> {
        Ok(())
    }

    /// Runs after every version was deleted and before the finalizer is released.
    async fn before_release(&self, _resource: &K, _params: &PipelineParameters) -> Result<()> {
        Ok(())
    }
}

/// The control loop shared by pipeline kinds.
pub struct ReconcileDriver<K, S, B> {
    store: S,
    blueprint: B,
    finalizer: &'static str,
    requeue: Duration,
    _kind: PhantomData<fn() -> K>,
}

impl<K, S, B> ReconcileDriver<K, S, B>
where
    K: Resource + Send + Sync,
    S: ResourceStore<K>,
    B: PipelineBlueprint<K>,
{
    pub fn new(store: S, blueprint: B, finalizer: &'static str, requeue: Duration) -> Self {
        Self {
            store,
            blueprint,
            finalizer,
            requeue,
            _kind: PhantomData,
        }
    }

    /// One pass for `namespace/name`.
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<PassOutcome> {
        let kind = self.blueprint.kind();
        let Some(resource) = self.store.fetch(namespace, name).await? else {
            debug!(kind, namespace = %namespace, name = %name, "Resource gone, nothing to do");
            return Ok(PassOutcome::AwaitChange);
        };

        let params = self.blueprint.parameters(&resource).await?;
        if params.pause {
            info!(kind, namespace = %namespace, name = %name, "Paused, skipping reconcile");
            return Ok(PassOutcome::AwaitChange);
        }

        let components = self.blueprint.components(&resource, &params, &params.version).await?;
        debug!(
            kind,
            namespace = %namespace,
            name = %name,
            version = %components.version(),
            components = ?components.labels(),
            "Component set built"
        );
        let finalized = has_finalizer(resource.meta().finalizers.as_deref(), self.finalizer);
        let recorded = self.blueprint.recorded_versions(&resource);

        if resource.meta().deletion_timestamp.is_some() {
            if !finalized {
                return Ok(PassOutcome::AwaitChange);
            }
            info!(kind, namespace = %namespace, name = %name, version = %params.version, "Finalizing");
            self.delete_versions(&resource, &params, components, &recorded).await?;
            self.blueprint.before_release(&resource, &params).await?;
            self.store.remove_finalizer(&resource, self.finalizer).await?;
            info!(kind, namespace = %namespace, name = %name, "Finalizer removed");
            return Ok(PassOutcome::AwaitChange);
        }

        if !finalized {
            self.store.add_finalizer(&resource, self.finalizer).await?;
        }

        // Record before creating, so a version that never converges is still found later
        let mut live = recorded.clone();
        if !live.contains(&params.version) {
            live.push(params.version.clone());
            self.blueprint.record_versions(&resource, &live).await?;
        }

        components.create_all().await?;

        let retained = self.blueprint.retained_versions(&resource, &params);
        let retired: Vec<String> = live
            .iter()
            .filter(|v| **v != params.version && !retained.contains(v))
            .cloned()
            .collect();
        if !retired.is_empty() {
            for version in &retired {
                self.blueprint
                    .components(&resource, &params, version)
                    .await?
                    .delete_all()
                    .await?;
                info!(kind, namespace = %namespace, name = %name, version = %version, "Retired version");
            }
            live.retain(|v| !retired.contains(v));
            self.blueprint.record_versions(&resource, &live).await?;
        }

        self.blueprint.after_converge(&resource, &params).await?;
        info!(kind, namespace = %namespace, name = %name, version = %params.version, "Reconciled");
        Ok(PassOutcome::Requeue(self.requeue))
    }

    /// Delete the components of the current and every recorded version,
    /// newest first, collecting failures across versions.
    async fn delete_versions(
        &self,
        resource: &K,
        params: &PipelineParameters,
        current: ComponentManager,
        recorded: &[String],
    ) -> Result<()> {
        let mut failures = Vec::new();
        let mut collect = |result: Result<()>, version: &str| match result {
            Ok(()) => {}
            Err(OperatorError::Components(f)) => failures.extend(f),
            Err(error) => failures.push(ComponentFailure {
                component: format!("version {}", version),
                error,
            }),
        };

        collect(current.delete_all().await, &params.version);
        for version in recorded.iter().rev().filter(|v| **v != params.version) {
            let result = match self.blueprint.components(resource, params, version).await {
                Ok(manager) => manager.delete_all().await,
                Err(e) => Err(e),
            };
            collect(result, version);
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(OperatorError::Components(failures))
        }
    }
}

impl<K, S, B> ReconcileDriver<K, S, B>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    S: ResourceStore<K> + 'static,
    B: PipelineBlueprint<K> + 'static,
{
    async fn reconcile_object(&self, obj: Arc<K>) -> Result<Action> {
        let namespace = obj.namespace().unwrap_or_default();
        let outcome = self.reconcile(&namespace, &obj.name_any()).await?;
        Ok(outcome.into())
    }

    /// Watch `api` until shutdown.
    pub async fn run(self: Arc<Self>, api: Api<K>) -> Result<()> {
        let kind = self.blueprint.kind();
        info!("Starting {} controller", kind);

        Controller::new(api, Config::default())
            .shutdown_on_signal()
            .run(
                |obj, ctx| async move { ctx.reconcile_object(obj).await },
                |obj, error, ctx| {
                    warn!("Reconciliation error: {}", error);
                    error_policy_backoff(obj, error, ctx)
                },
                Arc::clone(&self),
            )
            .for_each(move |result| async move {
                match result {
                    Ok((obj, _action)) => debug!("Reconciled {}: {}", kind, obj.name),
                    Err(e) => error!("Reconciliation failed: {:?}", e),
                }
            })
            .await;

        Ok(())
    }
}
