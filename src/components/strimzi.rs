//! Strimzi custom resources managed as dynamic objects.

use crate::deadline::bounded;
use crate::error::{OperatorError, Result};
use kube::api::{Api, DeleteParams, PostParams};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::Client;
use std::collections::BTreeMap;
use tracing::{debug, info};

pub const STRIMZI_GROUP: &str = "kafka.strimzi.io";
pub const STRIMZI_VERSION: &str = "v1beta2";
pub const STRIMZI_CLUSTER_LABEL: &str = "strimzi.io/cluster";

/// Create/delete/get for one Strimzi kind in one namespace
#[derive(Clone)]
pub struct StrimziResource {
    api: Api<DynamicObject>,
    resource: ApiResource,
    namespace: String,
}

impl StrimziResource {
    pub fn new(client: Client, namespace: &str, kind: &str) -> Self {
        let gvk = GroupVersionKind::gvk(STRIMZI_GROUP, STRIMZI_VERSION, kind);
        let resource = ApiResource::from_gvk(&gvk);
        let api = Api::namespaced_with(client, namespace, &resource);
        Self {
            api,
            resource,
            namespace: namespace.to_string(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.resource.kind
    }

    pub async fn exists(&self, name: &str) -> Result<bool> {
        let found = bounded("get strimzi resource", self.api.get_opt(name)).await?;
        Ok(found.is_some())
    }

    /// Create the object unless it already exists.
    pub async fn ensure(
        &self,
        name: &str,
        labels: BTreeMap<String, String>,
        spec: serde_json::Value,
    ) -> Result<()> {
        if self.exists(name).await? {
            debug!(kind = %self.kind(), name = %name, "Strimzi resource already present");
            return Ok(());
        }

        let mut object = DynamicObject::new(name, &self.resource).within(&self.namespace);
        object.metadata.labels = Some(labels);
        object.data = serde_json::json!({ "spec": spec });

        let created = bounded(
            "create strimzi resource",
            self.api.create(&PostParams::default(), &object),
        )
        .await;

        match created {
            Ok(_) => {
                info!(kind = %self.kind(), namespace = %self.namespace, name = %name, "Created Strimzi resource");
                Ok(())
            }
            // Lost a race with another writer; the object is there either way
            Err(OperatorError::Conflict(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Delete the object; a missing object is not an error.
    pub async fn remove(&self, name: &str) -> Result<()> {
        let deleted = bounded(
            "delete strimzi resource",
            self.api.delete(name, &DeleteParams::default()),
        )
        .await;

        match deleted {
            Ok(_) => {
                info!(kind = %self.kind(), namespace = %self.namespace, name = %name, "Deleted Strimzi resource");
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Labels binding a Strimzi object to its cluster.
pub fn cluster_labels(cluster: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(STRIMZI_CLUSTER_LABEL.to_string(), cluster.to_string())])
}
