//! Pipeline components
//!
//! A component is one idempotently managed sub-resource of a pipeline
//! version: a schema registration, a Kafka topic, a CDC connector or a search
//! index. The [`ComponentManager`] owns the ordered set for one version and
//! is rebuilt on every reconcile pass.

mod avro_schema;
mod debezium_connector;
mod elasticsearch_index;
mod kafka_topic;
mod strimzi;

pub use avro_schema::{AvroSchema, SchemaRegistryClient};
pub use debezium_connector::DebeziumConnector;
pub use elasticsearch_index::ElasticsearchIndex;
pub use kafka_topic::KafkaTopic;
pub use strimzi::StrimziResource;

use crate::error::{ComponentFailure, OperatorError, Result};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// One sub-resource of a pipeline version.
///
/// `create` on an existing resource and `delete` on a missing one must both
/// succeed, so any pass can be retried from scratch.
#[async_trait]
pub trait Component: Send + Sync {
    /// Short kind label used in logs and aggregated errors
    fn kind(&self) -> &'static str;

    /// External name of the resource for `version`
    fn name(&self, version: &str) -> String;

    async fn create(&self, version: &str) -> Result<()>;

    async fn delete(&self, version: &str) -> Result<()>;

    async fn exists(&self, version: &str) -> Result<bool>;
}

/// Ordered components of one pipeline version.
///
/// Creation follows registration order because later components depend on
/// earlier ones (a connector writes into a topic). Deletion runs in reverse.
pub struct ComponentManager {
    version: String,
    components: Vec<Box<dyn Component>>,
}

impl ComponentManager {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            components: Vec::new(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Append a component; no deduplication is performed.
    pub fn add_component(&mut self, component: impl Component + 'static) {
        self.components.push(Box::new(component));
    }

    /// `kind/name` of every component in registration order.
    pub fn labels(&self) -> Vec<String> {
        self.components.iter().map(|c| self.label(c.as_ref())).collect()
    }

    fn label(&self, component: &dyn Component) -> String {
        format!("{}/{}", component.kind(), component.name(&self.version))
    }

    /// Create every component in registration order.
    ///
    /// A failure does not stop the remaining components; all failures are
    /// returned together.
    pub async fn create_all(&self) -> Result<()> {
        let mut failures = Vec::new();
        for component in &self.components {
            let label = self.label(component.as_ref());
            match component.create(&self.version).await {
                Ok(()) => debug!(component = %label, "Component converged"),
                Err(error) => {
                    warn!(component = %label, error = %error, "Failed to create component");
                    failures.push(ComponentFailure { component: label, error });
                }
            }
        }
        finish(failures, "created", &self.version, self.components.len())
    }

    /// Delete every component in reverse registration order.
    pub async fn delete_all(&self) -> Result<()> {
        let mut failures = Vec::new();
        for component in self.components.iter().rev() {
            let label = self.label(component.as_ref());
            match component.delete(&self.version).await {
                Ok(()) => debug!(component = %label, "Component deleted"),
                Err(error) => {
                    warn!(component = %label, error = %error, "Failed to delete component");
                    failures.push(ComponentFailure { component: label, error });
                }
            }
        }
        finish(failures, "deleted", &self.version, self.components.len())
    }
}

fn finish(failures: Vec<ComponentFailure>, verb: &str, version: &str, total: usize) -> Result<()> {
    if failures.is_empty() {
        info!(version = %version, count = total, "All components {}", verb);
        Ok(())
    } else {
        Err(OperatorError::Components(failures))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records every call into a shared journal.
    pub(crate) struct RecordingComponent {
        pub id: &'static str,
        pub journal: Arc<Mutex<Vec<String>>>,
        pub fail_create: bool,
        pub fail_delete: bool,
    }

    impl RecordingComponent {
        pub fn new(id: &'static str, journal: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                id,
                journal: journal.clone(),
                fail_create: false,
                fail_delete: false,
            }
        }
    }

    #[async_trait]
    impl Component for RecordingComponent {
        fn kind(&self) -> &'static str {
            "Recording"
        }

        fn name(&self, version: &str) -> String {
            format!("{}.{}", self.id, version)
        }

        async fn create(&self, _version: &str) -> Result<()> {
            self.journal.lock().unwrap().push(format!("create {}", self.id));
            if self.fail_create {
                return Err(OperatorError::Http(format!("{} unreachable", self.id)));
            }
            Ok(())
        }

        async fn delete(&self, _version: &str) -> Result<()> {
            self.journal.lock().unwrap().push(format!("delete {}", self.id));
            if self.fail_delete {
                return Err(OperatorError::Http(format!("{} unreachable", self.id)));
            }
            Ok(())
        }

        async fn exists(&self, _version: &str) -> Result<bool> {
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingComponent;
    use super::*;
    use std::sync::{Arc, Mutex};

    fn manager_with(journal: &Arc<Mutex<Vec<String>>>, failing: &[&str]) -> ComponentManager {
        let mut manager = ComponentManager::new("1700000000");
        for id in ["A", "B", "C"] {
            let mut component = RecordingComponent::new(id, journal);
            component.fail_create = failing.contains(&id);
            component.fail_delete = failing.contains(&id);
            manager.add_component(component);
        }
        manager
    }

    #[tokio::test]
    async fn test_create_all_runs_in_registration_order() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        manager_with(&journal, &[]).create_all().await.unwrap();
        assert_eq!(*journal.lock().unwrap(), vec!["create A", "create B", "create C"]);
    }

    #[tokio::test]
    async fn test_delete_all_runs_in_reverse_order() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        manager_with(&journal, &[]).delete_all().await.unwrap();
        assert_eq!(*journal.lock().unwrap(), vec!["delete C", "delete B", "delete A"]);
    }

    #[tokio::test]
    async fn test_create_all_continues_and_aggregates_failures() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let err = manager_with(&journal, &["A", "C"]).create_all().await.unwrap_err();

        assert_eq!(*journal.lock().unwrap(), vec!["create A", "create B", "create C"]);
        match err {
            OperatorError::Components(failures) => {
                let names: Vec<_> = failures.iter().map(|f| f.component.as_str()).collect();
                assert_eq!(names, vec!["Recording/A.1700000000", "Recording/C.1700000000"]);
            }
            other => panic!("expected component failures, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delete_all_keeps_reverse_order_despite_failures() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let err = manager_with(&journal, &["B"]).delete_all().await.unwrap_err();

        assert_eq!(*journal.lock().unwrap(), vec!["delete C", "delete B", "delete A"]);
        assert!(err.to_string().contains("Recording/B.1700000000"));
    }

    #[test]
    fn test_labels_follow_registration() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let manager = manager_with(&journal, &[]);
        assert_eq!(manager.version(), "1700000000");
        assert_eq!(
            manager.labels(),
            vec!["Recording/A.1700000000", "Recording/B.1700000000", "Recording/C.1700000000"]
        );
    }

    #[tokio::test]
    async fn test_empty_manager_converges_trivially() {
        let manager = ComponentManager::new("v1");
        assert!(manager.labels().is_empty());
        manager.create_all().await.unwrap();
        manager.delete_all().await.unwrap();
    }
}
