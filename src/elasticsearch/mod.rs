//! Elasticsearch access
//!
//! [`EsTransport`] is the seam between index lifecycle logic and the wire:
//! [`HttpTransport`] talks to a real cluster with reqwest, tests substitute
//! an in-memory engine.

mod index;
mod template;

#[cfg(test)]
pub(crate) mod testing;

pub use index::{es_index_name, es_pipeline_name, SearchIndexManager};
pub use template::{render_template, DEFAULT_INDEX_TEMPLATE, DEFAULT_PIPELINE_TEMPLATE};

use crate::deadline::{bounded, EXTERNAL_CALL_TIMEOUT};
use crate::error::{OperatorError, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::Client;
use reqwest::Method;
use tracing::debug;

/// A single REST call against the search engine
#[derive(Debug, Clone, PartialEq)]
pub struct EsRequest {
    pub method: Method,
    /// Path and query string, starting with `/`
    pub path: String,
    pub body: Option<String>,
}

impl EsRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: String) -> Self {
        self.body = Some(body);
        self
    }
}

/// Status and raw body of a search engine answer
#[derive(Debug, Clone)]
pub struct EsResponse {
    pub status: u16,
    pub body: String,
}

impl EsResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// `error.type` of an Elasticsearch error body, if any.
    pub fn error_type(&self) -> Option<String> {
        serde_json::from_str::<serde_json::Value>(&self.body)
            .ok()?
            .pointer("/error/type")?
            .as_str()
            .map(str::to_string)
    }

    pub(crate) fn into_error(self, operation: &str) -> OperatorError {
        OperatorError::Elasticsearch {
            operation: operation.to_string(),
            status: self.status,
            body: self.body,
        }
    }
}

/// Sends requests to a search engine.
#[async_trait]
pub trait EsTransport: Send + Sync {
    async fn send(&self, request: EsRequest) -> Result<EsResponse>;
}

/// reqwest-backed transport with basic auth
#[derive(Clone)]
pub struct HttpTransport {
    base_url: String,
    username: String,
    password: String,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(EXTERNAL_CALL_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.into(),
            username: username.into(),
            password: password.into(),
            client,
        })
    }

    /// Build a transport from a Secret holding `endpoint`, `username` and `password`.
    pub async fn from_secret(client: &Client, namespace: &str, secret_name: &str) -> Result<Self> {
        let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
        let secret = bounded("get elasticsearch secret", secrets.get(secret_name)).await?;

        let data = secret.data.unwrap_or_default();
        let field = |key: &str| -> Result<String> {
            let bytes = data.get(key).ok_or_else(|| {
                OperatorError::Configuration(format!(
                    "secret {}/{} has no {} key",
                    namespace, secret_name, key
                ))
            })?;
            String::from_utf8(bytes.0.clone()).map_err(|_| {
                OperatorError::Configuration(format!(
                    "secret {}/{} key {} is not UTF-8",
                    namespace, secret_name, key
                ))
            })
        };

        let endpoint = field("endpoint")?;
        // Clusters without security have no credentials
        let username = field("username").unwrap_or_default();
        let password = field("password").unwrap_or_default();
        Self::new(endpoint, username, password)
    }
}

#[async_trait]
impl EsTransport for HttpTransport {
    async fn send(&self, request: EsRequest) -> Result<EsResponse> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), request.path);
        debug!(method = %request.method, url = %url, "Elasticsearch request");

        let mut builder = self.client.request(request.method, &url);
        if !self.username.is_empty() {
            builder = builder.basic_auth(&self.username, Some(&self.password));
        }
        if let Some(body) = request.body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(EsResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_type_is_extracted() {
        let resp = EsResponse {
            status: 400,
            body: r#"{"error":{"type":"resource_already_exists_exception","reason":"x"},"status":400}"#
                .to_string(),
        };
        assert_eq!(resp.error_type().as_deref(), Some("resource_already_exists_exception"));
        assert!(!resp.is_success());
    }

    #[test]
    fn test_error_type_tolerates_plain_bodies() {
        let resp = EsResponse {
            status: 502,
            body: "Bad Gateway".to_string(),
        };
        assert!(resp.error_type().is_none());
    }

    #[test]
    fn test_into_error_keeps_context() {
        let resp = EsResponse {
            status: 500,
            body: "boom".to_string(),
        };
        let msg = resp.into_error("delete index").to_string();
        assert!(msg.contains("delete index"));
        assert!(msg.contains("500"));
    }
}
