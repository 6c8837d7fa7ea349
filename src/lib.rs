//! xjoin Kubernetes Operator
//!
//! Reconciles change-data-capture pipelines that feed versioned search
//! indices, and validates each index generation against its sources.
//!
//! ## Custom Resources
//!
//! - `XJoinDataSourcePipeline`: Avro schema, Kafka topic and Debezium connector for one table
//! - `XJoinIndexPipeline`: Avro schema, Kafka topic and Elasticsearch index for one generation
//! - `XJoinIndexValidator`: validation job comparing an index with its sources
//!
//! ## Example
//!
//! ```yaml
//! apiVersion: xjoin.cloud.redhat.com/v1alpha1
//! kind: XJoinIndexPipeline
//! metadata:
//!   name: hosts
//! spec:
//!   version: "1700000000"
//!   avroSchema: '{"type":"record","name":"hosts","fields":[]}'
//! ```

pub mod components;
pub mod conditions;
pub mod config;
pub mod controllers;
pub mod crd;
pub mod deadline;
pub mod elasticsearch;
pub mod error;
pub mod parameters;
pub mod validation;

pub use components::{Component, ComponentManager};
pub use config::OperatorConfig;
pub use controllers::{
    DataSourcePipelineBlueprint, IndexPipelineBlueprint, IndexValidatorController, ReconcileDriver,
};
pub use crd::{
    DataSourcePipelineSpec, DataSourcePipelineStatus, IndexPipelineSpec, IndexPipelineStatus,
    IndexValidatorSpec, IndexValidatorStatus, ValidationResponse, XJoinDataSourcePipeline,
    XJoinIndexPipeline, XJoinIndexValidator,
};
pub use elasticsearch::SearchIndexManager;
pub use error::{OperatorError, Result};
pub use validation::{FailedJobPolicy, ValidationOrchestrator, ValidationOutcome};
