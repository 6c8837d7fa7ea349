//! Versioned search index lifecycle.
//!
//! Every generation of a pipeline gets its own index named
//! `<resourcePrefix>.<version>`. The same dotted format is the wildcard used
//! to enumerate a prefix's generations, so it must never change.

use super::template::{render_template, DEFAULT_PIPELINE_TEMPLATE};
use super::{EsRequest, EsTransport};
use crate::error::{OperatorError, Result};
use reqwest::Method;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

const ALREADY_EXISTS: &str = "resource_already_exists_exception";

/// Full index name for one pipeline version.
pub fn es_index_name(resource_prefix: &str, version: &str) -> String {
    format!("{}.{}", resource_prefix, version)
}

/// Ingest pipeline name for one pipeline version.
pub fn es_pipeline_name(resource_prefix: &str, version: &str) -> String {
    format!("{}.{}", resource_prefix, version)
}

#[derive(Deserialize)]
struct CatIndexRow {
    index: String,
}

/// Index CRUD scoped to one resource prefix
#[derive(Clone)]
pub struct SearchIndexManager {
    transport: Arc<dyn EsTransport>,
    resource_prefix: String,
    index_template: String,
    template_parameters: BTreeMap<String, String>,
}

impl SearchIndexManager {
    pub fn new(
        transport: Arc<dyn EsTransport>,
        resource_prefix: impl Into<String>,
        index_template: impl Into<String>,
        template_parameters: BTreeMap<String, String>,
    ) -> Self {
        Self {
            transport,
            resource_prefix: resource_prefix.into(),
            index_template: index_template.into(),
            template_parameters,
        }
    }

    pub fn es_index_name(&self, version: &str) -> String {
        es_index_name(&self.resource_prefix, version)
    }

    pub fn es_pipeline_name(&self, version: &str) -> String {
        es_pipeline_name(&self.resource_prefix, version)
    }

    /// Whether `name` exists; a 404 is `false`, not an error.
    pub async fn index_exists(&self, name: &str) -> Result<bool> {
        let resp = self
            .transport
            .send(EsRequest::new(Method::HEAD, format!("/{}", name)))
            .await?;
        if resp.is_success() {
            Ok(true)
        } else if resp.is_not_found() {
            Ok(false)
        } else {
            Err(resp.into_error("index exists"))
        }
    }

    fn render_parameters(&self, version: &str) -> BTreeMap<String, String> {
        let mut params = self.template_parameters.clone();
        params.insert("ElasticSearchIndex".to_string(), self.es_index_name(version));
        params.insert("ElasticSearchPipeline".to_string(), self.es_pipeline_name(version));
        params
    }

    /// Create the index for `version` from the template.
    ///
    /// An index that already exists counts as created.
    pub async fn create_index(&self, version: &str) -> Result<()> {
        let name = self.es_index_name(version);
        let body = render_template(&self.index_template, &self.render_parameters(version))?;

        let resp = self
            .transport
            .send(EsRequest::new(Method::PUT, format!("/{}", name)).with_body(body))
            .await?;

        if resp.is_success() {
            info!(index = %name, "Created Elasticsearch index");
            Ok(())
        } else if resp.status == 400 && resp.error_type().as_deref() == Some(ALREADY_EXISTS) {
            debug!(index = %name, "Elasticsearch index already exists");
            Ok(())
        } else {
            Err(resp.into_error("create index"))
        }
    }

    /// Delete an index by its full name; missing indices and "" are no-ops.
    pub async fn delete_index_by_full_name(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Ok(());
        }

        let resp = self
            .transport
            .send(EsRequest::new(Method::DELETE, format!("/{}", name)))
            .await?;

        if resp.is_success() {
            info!(index = %name, "Deleted Elasticsearch index");
            Ok(())
        } else if resp.is_not_found() {
            debug!(index = %name, "Elasticsearch index already gone");
            Ok(())
        } else {
            Err(resp.into_error("delete index"))
        }
    }

    pub async fn delete_index(&self, version: &str) -> Result<()> {
        self.delete_index_by_full_name(&self.es_index_name(version))
            .await
    }

    /// Install (or overwrite) the ingest pipeline for `version`.
    pub async fn create_pipeline(&self, version: &str) -> Result<()> {
        let name = self.es_pipeline_name(version);
        let body = render_template(DEFAULT_PIPELINE_TEMPLATE, &self.render_parameters(version))?;
        let resp = self
            .transport
            .send(EsRequest::new(Method::PUT, format!("/_ingest/pipeline/{}", name)).with_body(body))
            .await?;
        if resp.is_success() {
            Ok(())
        } else {
            Err(resp.into_error("create ingest pipeline"))
        }
    }

    pub async fn delete_pipeline(&self, version: &str) -> Result<()> {
        let name = self.es_pipeline_name(version);
        let resp = self
            .transport
            .send(EsRequest::new(Method::DELETE, format!("/_ingest/pipeline/{}", name)))
            .await?;
        if resp.is_success() || resp.is_not_found() {
            Ok(())
        } else {
            Err(resp.into_error("delete ingest pipeline"))
        }
    }

    pub async fn pipeline_exists(&self, version: &str) -> Result<bool> {
        let name = self.es_pipeline_name(version);
        let resp = self
            .transport
            .send(EsRequest::new(Method::GET, format!("/_ingest/pipeline/{}", name)))
            .await?;
        if resp.is_success() {
            Ok(true)
        } else if resp.is_not_found() {
            Ok(false)
        } else {
            Err(resp.into_error("get ingest pipeline"))
        }
    }

    /// Names of every index owned by this prefix.
    pub async fn list_indices(&self) -> Result<Vec<String>> {
        let path = format!("/_cat/indices/{}.*?format=JSON&h=index", self.resource_prefix);
        let resp = self.transport.send(EsRequest::new(Method::GET, path)).await?;
        if !resp.is_success() {
            return Err(resp.into_error("list indices"));
        }

        let rows: Vec<CatIndexRow> = serde_json::from_str(&resp.body)?;
        Ok(rows.into_iter().map(|row| row.index).collect())
    }

    /// Live document count of one index.
    pub async fn count_index(&self, name: &str) -> Result<i64> {
        let path = format!("/_cat/count/{}?format=JSON", name);
        let resp = self.transport.send(EsRequest::new(Method::GET, path)).await?;
        if !resp.is_success() {
            return Err(resp.into_error("count index"));
        }
        parse_count(name, &resp.body)
    }

    /// Version of `index` when this prefix owns it.
    ///
    /// The wildcard listing also matches pipelines whose name extends this
    /// one with a dot (`a.b` and `a.b.c`); versions never contain dots, so
    /// those are rejected here.
    pub fn owned_version<'a>(&self, index: &'a str) -> Option<&'a str> {
        index
            .strip_prefix(self.resource_prefix.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
            .filter(|version| !version.is_empty() && !version.contains('.'))
    }

    /// Owned indices whose version is not in `keep_versions`.
    pub async fn stale_indices(&self, keep_versions: &[&str]) -> Result<Vec<String>> {
        Ok(self
            .list_indices()
            .await?
            .into_iter()
            .filter(|index| {
                self.owned_version(index)
                    .is_some_and(|version| !keep_versions.contains(&version))
            })
            .collect())
    }
}

/// Decode a `_cat/count` answer: a one-element array whose `count` is a numeric string.
fn parse_count(index: &str, body: &str) -> Result<i64> {
    let rows: Vec<serde_json::Value> = serde_json::from_str(body)?;
    let row = rows.first().ok_or_else(|| {
        OperatorError::Decode(format!("empty count response for index {}", index))
    })?;
    let raw = row.get("count").and_then(|v| v.as_str()).ok_or_else(|| {
        OperatorError::Decode(format!("count response for index {} has no count field", index))
    })?;
    raw.parse::<i64>().map_err(|_| {
        OperatorError::Decode(format!("count {:?} for index {} is not numeric", raw, index))
    })
}
