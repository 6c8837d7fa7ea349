//! Avro schema registration in a Confluent-compatible schema registry.

use super::Component;
use crate::deadline::EXTERNAL_CALL_TIMEOUT;
use crate::error::{OperatorError, Result};
use crate::parameters::SchemaRegistryParams;
use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, info};

const REGISTRY_CONTENT_TYPE: &str = "application/vnd.schemaregistry.v1+json";

/// Minimal client for the subject endpoints of a schema registry
#[derive(Clone)]
pub struct SchemaRegistryClient {
    base_url: String,
    client: reqwest::Client,
}

impl SchemaRegistryClient {
    pub fn new(params: &SchemaRegistryParams) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(EXTERNAL_CALL_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: params.base_url(),
            client,
        })
    }

    fn subject_url(&self, subject: &str) -> String {
        format!("{}/subjects/{}", self.base_url.trim_end_matches('/'), subject)
    }

    /// Register `schema` under `subject`; registering an identical schema again
    /// returns the existing id.
    pub async fn register(&self, subject: &str, schema: &str) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/versions", self.subject_url(subject)))
            .header(reqwest::header::CONTENT_TYPE, REGISTRY_CONTENT_TYPE)
            .json(&serde_json::json!({ "schema": schema }))
            .send()
            .await?;
        check(response, "register schema").await
    }

    pub async fn subject_exists(&self, subject: &str) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}/versions", self.subject_url(subject)))
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => check(response, "get subject").await.map(|_| false),
        }
    }

    /// Soft-delete then hard-delete `subject`; a missing subject is not an error.
    pub async fn delete_subject(&self, subject: &str) -> Result<()> {
        for query in ["", "?permanent=true"] {
            let response = self
                .client
                .delete(format!("{}{}", self.subject_url(subject), query))
                .send()
                .await?;
            if response.status() == StatusCode::NOT_FOUND {
                continue;
            }
            check(response, "delete subject").await?;
        }
        Ok(())
    }
}

async fn check(response: reqwest::Response, operation: &str) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(OperatorError::SchemaRegistry {
        operation: operation.to_string(),
        status: status.as_u16(),
        body,
    })
}

/// Value schema of a versioned topic
pub struct AvroSchema {
    registry: SchemaRegistryClient,
    resource_prefix: String,
    schema: String,
}

impl AvroSchema {
    pub fn new(
        registry: SchemaRegistryClient,
        resource_prefix: impl Into<String>,
        schema: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            resource_prefix: resource_prefix.into(),
            schema: schema.into(),
        }
    }
}

/// Subject holding the value schema of the topic for `version`.
pub fn subject_name(resource_prefix: &str, version: &str) -> String {
    format!("{}.{}-value", resource_prefix, version)
}

#[async_trait]
impl Component for AvroSchema {
    fn kind(&self) -> &'static str {
        "AvroSchema"
    }

    fn name(&self, version: &str) -> String {
        subject_name(&self.resource_prefix, version)
    }

    async fn create(&self, version: &str) -> Result<()> {
        let subject = self.name(version);
        self.registry.register(&subject, &self.schema).await?;
        info!(subject = %subject, "Registered Avro schema");
        Ok(())
    }

    async fn delete(&self, version: &str) -> Result<()> {
        let subject = self.name(version);
        self.registry.delete_subject(&subject).await?;
        debug!(subject = %subject, "Deleted Avro schema subject");
        Ok(())
    }

    async fn exists(&self, version: &str) -> Result<bool> {
        self.registry.subject_exists(&self.name(version)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SchemaRegistryParams {
        SchemaRegistryParams {
            protocol: "http".to_string(),
            host: "registry".to_string(),
            port: "8081".to_string(),
        }
    }

    #[test]
    fn test_subject_follows_topic_name() {
        assert_eq!(
            subject_name("xjoindatasourcepipeline.hosts", "1700000000"),
            "xjoindatasourcepipeline.hosts.1700000000-value"
        );
    }

    #[test]
    fn test_subject_url() {
        let client = SchemaRegistryClient::new(&params()).unwrap();
        assert_eq!(client.subject_url("a.1-value"), "http://registry:8081/subjects/a.1-value");
    }

    #[test]
    fn test_component_name() {
        let schema = AvroSchema::new(
            SchemaRegistryClient::new(&params()).unwrap(),
            "xjoinindexpipeline.hosts",
            "{}",
        );
        assert_eq!(schema.kind(), "AvroSchema");
        assert_eq!(schema.name("v1"), "xjoinindexpipeline.hosts.v1-value");
    }
}
