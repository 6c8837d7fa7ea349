//! Validation jobs and the substrate that runs them.
//!
//! Jobs run as bare pods with restart policy `Never`. The validator image
//! prints its verdict as the last line of its log, which is the only channel
//! it offers, so [`PodJobRuntime::output`] reads the full log.

use crate::deadline::bounded;
use crate::error::Result;
use crate::parameters::SchemaRegistryParams;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    Container, EnvVar, EnvVarSource, Pod, PodSpec, SecretKeySelector,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, ListParams, LogParams, PostParams};
use kube::{Client, ResourceExt};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Label binding a validation pod to the resource that owns it
pub const OWNER_LABEL: &str = "xjoin.index";

/// Annotation naming the pipeline version a validation pod checks
pub const VERSION_ANNOTATION: &str = "xjoin.cloud.redhat.com/version";

const CONTAINER_NAME: &str = "xjoin-validation";
const MAX_LABEL_VALUE: usize = 63;

/// Owner label value for `owner`.
///
/// Names longer than a label value allows keep a readable head and end in a
/// digest of the full name, so distinct owners never share a value.
pub fn owner_label_value(owner: &str) -> String {
    if owner.len() <= MAX_LABEL_VALUE {
        return owner.to_string();
    }
    let digest = hex::encode(Sha256::digest(owner.as_bytes()));
    let head: String = owner.chars().take(MAX_LABEL_VALUE - 13).collect();
    let head = head.trim_end_matches(|c: char| !c.is_ascii_alphanumeric());
    format!("{}-{}", head, &digest[..12])
}

/// Deterministic job name for `owner`; dots are not allowed in container names.
pub fn validation_job_name(owner: &str) -> String {
    format!("xjoin-validation-{}", owner).replace('.', "-")
}

/// Lifecycle phase reported by the substrate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl JobPhase {
    pub fn from_pod_phase(phase: Option<&str>) -> Self {
        match phase {
            Some("Pending") => JobPhase::Pending,
            Some("Running") => JobPhase::Running,
            Some("Succeeded") => JobPhase::Succeeded,
            Some("Failed") => JobPhase::Failed,
            _ => JobPhase::Unknown,
        }
    }
}

/// Name and phase of an existing job
#[derive(Debug, Clone, PartialEq)]
pub struct JobHandle {
    pub name: String,
    pub phase: JobPhase,
    /// Pipeline version the job was launched for
    pub version: Option<String>,
}

/// Everything needed to launch one validation job
#[derive(Debug, Clone)]
pub struct ValidationJobSpec {
    pub owner: String,
    pub namespace: String,
    /// Pipeline version whose index is checked
    pub version: String,
    pub image: String,
    /// Secret with `endpoint`, `username` and `password` keys
    pub elasticsearch_secret: String,
    pub index_name: String,
    pub schema_registry: SchemaRegistryParams,
    pub avro_schema: String,
}

impl ValidationJobSpec {
    pub fn job_name(&self) -> String {
        validation_job_name(&self.owner)
    }

    fn owner_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(OWNER_LABEL.to_string(), owner_label_value(&self.owner))])
    }

    fn secret_env(&self, name: &str, key: &str) -> EnvVar {
        EnvVar {
            name: name.to_string(),
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: Some(self.elasticsearch_secret.clone()),
                    key: key.to_string(),
                    optional: None,
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn env(&self) -> Vec<EnvVar> {
        let plain = |name: &str, value: &str| EnvVar {
            name: name.to_string(),
            value: Some(value.to_string()),
            ..Default::default()
        };
        vec![
            self.secret_env("ELASTICSEARCH_URL", "endpoint"),
            self.secret_env("ELASTICSEARCH_USERNAME", "username"),
            self.secret_env("ELASTICSEARCH_PASSWORD", "password"),
            plain("ELASTICSEARCH_INDEX", &self.index_name),
            plain("SCHEMA_REGISTRY_PROTOCOL", &self.schema_registry.protocol),
            plain("SCHEMA_REGISTRY_HOST", &self.schema_registry.host),
            plain("SCHEMA_REGISTRY_PORT", &self.schema_registry.port),
            plain("AVRO_SCHEMA", &self.avro_schema),
        ]
    }

    /// Pod running the validator once.
    pub fn to_pod(&self) -> Pod {
        let name = self.job_name();
        Pod {
            metadata: ObjectMeta {
                name: Some(name),
                namespace: Some(self.namespace.clone()),
                labels: Some(self.owner_labels()),
                annotations: Some(BTreeMap::from([(VERSION_ANNOTATION.to_string(), self.version.clone())])),
                ..Default::default()
            },
            spec: Some(PodSpec {
                restart_policy: Some("Never".to_string()),
                containers: vec![Container {
                    name: CONTAINER_NAME.to_string(),
                    image: Some(self.image.clone()),
                    image_pull_policy: Some("Always".to_string()),
                    env: Some(self.env()),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// Runs validation jobs.
#[async_trait]
pub trait JobRuntime: Send + Sync {
    /// Jobs carrying the owner label for `owner`
    async fn list_owned(&self, namespace: &str, owner: &str) -> Result<Vec<JobHandle>>;

    async fn get(&self, namespace: &str, name: &str) -> Result<JobHandle>;

    async fn create(&self, spec: &ValidationJobSpec) -> Result<()>;

    /// Complete combined output of the job
    async fn output(&self, namespace: &str, name: &str) -> Result<String>;

    /// Delete the job; a missing job is not an error.
    async fn delete(&self, namespace: &str, name: &str) -> Result<()>;
}

/// Runs validation jobs as pods
pub struct PodJobRuntime {
    client: Client,
}

impl PodJobRuntime {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn handle(pod: &Pod) -> JobHandle {
    let phase = pod.status.as_ref().and_then(|s| s.phase.as_deref());
    JobHandle {
        name: pod.name_any(),
        phase: JobPhase::from_pod_phase(phase),
        version: pod.annotations().get(VERSION_ANNOTATION).cloned(),
    }
}

#[async_trait]
impl JobRuntime for PodJobRuntime {
    async fn list_owned(&self, namespace: &str, owner: &str) -> Result<Vec<JobHandle>> {
        let selector = format!("{}={}", OWNER_LABEL, owner_label_value(owner));
        let pods = bounded(
            "list validation pods",
            self.pods(namespace).list(&ListParams::default().labels(&selector)),
        )
        .await?;
        Ok(pods.items.iter().map(handle).collect())
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<JobHandle> {
        let pod = bounded("get validation pod", self.pods(namespace).get(name)).await?;
        Ok(handle(&pod))
    }

    async fn create(&self, spec: &ValidationJobSpec) -> Result<()> {
        let pod = spec.to_pod();
        bounded(
            "create validation pod",
            self.pods(&spec.namespace).create(&PostParams::default(), &pod),
        )
        .await?;
        info!(namespace = %spec.namespace, pod = %spec.job_name(), index = %spec.index_name, "Created validation pod");
        Ok(())
    }

    async fn output(&self, namespace: &str, name: &str) -> Result<String> {
        bounded(
            "read validation pod logs",
            self.pods(namespace).logs(name, &LogParams::default()),
        )
        .await
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        match bounded(
            "delete validation pod",
            self.pods(namespace).delete(name, &DeleteParams::default()),
        )
        .await
        {
            Ok(_) => {
                info!(namespace = %namespace, pod = %name, "Deleted validation pod");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!(namespace = %namespace, pod = %name, "Validation pod already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ValidationJobSpec {
        ValidationJobSpec {
            owner: "xjoin.inventory.hosts".to_string(),
            namespace: "xjoin".to_string(),
            version: "1".to_string(),
            image: "quay.io/cloudservices/xjoin-validation:latest".to_string(),
            elasticsearch_secret: "xjoin-elasticsearch".to_string(),
            index_name: "xjoinindexpipeline.xjoin.inventory.hosts.1".to_string(),
            schema_registry: SchemaRegistryParams {
                protocol: "http".to_string(),
                host: "registry".to_string(),
                port: "8081".to_string(),
            },
            avro_schema: "{\"type\":\"record\"}".to_string(),
        }
    }

    #[test]
    fn test_job_name_replaces_dots() {
        assert_eq!(validation_job_name("a.b.c"), "xjoin-validation-a-b-c");
        assert_eq!(validation_job_name("hosts"), "xjoin-validation-hosts");
    }

    #[test]
    fn test_pod_phase_mapping() {
        assert_eq!(JobPhase::from_pod_phase(Some("Succeeded")), JobPhase::Succeeded);
        assert_eq!(JobPhase::from_pod_phase(Some("Failed")), JobPhase::Failed);
        assert_eq!(JobPhase::from_pod_phase(Some("Running")), JobPhase::Running);
        assert_eq!(JobPhase::from_pod_phase(None), JobPhase::Unknown);
    }

    #[test]
    fn test_short_owner_is_its_own_label_value() {
        assert_eq!(owner_label_value("xjoin.inventory.hosts"), "xjoin.inventory.hosts");
    }

    #[test]
    fn test_long_owner_label_value_fits_and_stays_distinct() {
        let a = format!("{}.hosts", "x".repeat(70));
        let b = format!("{}.systems", "x".repeat(70));

        let (va, vb) = (owner_label_value(&a), owner_label_value(&b));

        assert!(va.len() <= 63, "{}", va);
        assert!(vb.len() <= 63, "{}", vb);
        assert_ne!(va, vb);
        assert!(va.starts_with("xxxx"));
        assert!(va.chars().last().unwrap().is_ascii_alphanumeric());
        assert_eq!(va, owner_label_value(&a));
    }

    #[test]
    fn test_long_owner_pod_labels_use_hashed_value() {
        let mut spec = spec();
        spec.owner = "a".repeat(80);
        let pod = spec.to_pod();
        let label = pod.metadata.labels.unwrap().get(OWNER_LABEL).cloned().unwrap();
        assert_eq!(label, owner_label_value(&spec.owner));
        assert_eq!(pod.spec.unwrap().containers[0].name, "xjoin-validation");
    }

    #[test]
    fn test_pod_carries_owner_label_and_never_restarts() {
        let pod = spec().to_pod();
        assert_eq!(pod.metadata.name.as_deref(), Some("xjoin-validation-xjoin-inventory-hosts"));
        assert_eq!(
            pod.metadata.labels.unwrap().get(OWNER_LABEL).map(String::as_str),
            Some("xjoin.inventory.hosts")
        );
        assert_eq!(
            pod.metadata.annotations.unwrap().get(VERSION_ANNOTATION).map(String::as_str),
            Some("1")
        );
        let pod_spec = pod.spec.unwrap();
        assert_eq!(pod_spec.restart_policy.as_deref(), Some("Never"));
        assert_eq!(pod_spec.containers.len(), 1);
    }

    #[test]
    fn test_pod_env() {
        let container = spec().to_pod().spec.unwrap().containers.remove(0);
        let env = container.env.unwrap();
        let by_name = |n: &str| env.iter().find(|e| e.name == n).cloned().unwrap();

        let url = by_name("ELASTICSEARCH_URL");
        let secret = url.value_from.unwrap().secret_key_ref.unwrap();
        assert_eq!(secret.name.as_deref(), Some("xjoin-elasticsearch"));
        assert_eq!(secret.key, "endpoint");

        assert_eq!(
            by_name("ELASTICSEARCH_INDEX").value.as_deref(),
            Some("xjoinindexpipeline.xjoin.inventory.hosts.1")
        );
        assert_eq!(by_name("SCHEMA_REGISTRY_PORT").value.as_deref(), Some("8081"));
        assert_eq!(by_name("AVRO_SCHEMA").value.as_deref(), Some("{\"type\":\"record\"}"));
    }
}
