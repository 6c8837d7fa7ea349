//! In-memory search engine for tests.

use super::{EsRequest, EsResponse, EsTransport};
use crate::error::Result;
use async_trait::async_trait;
use reqwest::Method;
use std::collections::BTreeSet;
use std::sync::Mutex;

#[derive(Default)]
struct EngineState {
    indices: BTreeSet<String>,
    pipelines: BTreeSet<String>,
    requests: Vec<EsRequest>,
    fail_next: Option<EsResponse>,
    count_body: Option<String>,
}

/// Answers the subset of the REST API the operator uses.
#[derive(Default)]
pub(crate) struct FakeEngine {
    state: Mutex<EngineState>,
}

impl FakeEngine {
    pub fn indices(&self) -> Vec<String> {
        self.state.lock().unwrap().indices.iter().cloned().collect()
    }

    pub fn requests(&self) -> Vec<EsRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn insert_index(&self, name: &str) {
        self.state.lock().unwrap().indices.insert(name.to_string());
    }

    pub fn fail_next(&self, status: u16, body: &str) {
        self.state.lock().unwrap().fail_next = Some(EsResponse {
            status,
            body: body.to_string(),
        });
    }

    pub fn set_count_body(&self, body: &str) {
        self.state.lock().unwrap().count_body = Some(body.to_string());
    }
}

fn reply(status: u16, body: &str) -> EsResponse {
    EsResponse {
        status,
        body: body.to_string(),
    }
}

#[async_trait]
impl EsTransport for FakeEngine {
    async fn send(&self, request: EsRequest) -> Result<EsResponse> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(request.clone());
        if let Some(failure) = state.fail_next.take() {
            return Ok(failure);
        }

        let path = request.path.split('?').next().unwrap_or_default().to_string();

        if let Some(name) = path.strip_prefix("/_ingest/pipeline/") {
            let name = name.to_string();
            return Ok(match request.method {
                Method::PUT => {
                    state.pipelines.insert(name);
                    reply(200, r#"{"acknowledged":true}"#)
                }
                Method::DELETE if state.pipelines.remove(&name) => reply(200, r#"{"acknowledged":true}"#),
                Method::GET if state.pipelines.contains(&name) => reply(200, "{}"),
                _ => reply(404, "{}"),
            });
        }

        if let Some(pattern) = path.strip_prefix("/_cat/indices/") {
            let prefix = pattern.trim_end_matches('*');
            let rows: Vec<serde_json::Value> = state
                .indices
                .iter()
                .filter(|i| i.starts_with(prefix))
                .map(|i| serde_json::json!({ "index": i }))
                .collect();
            return Ok(reply(200, &serde_json::Value::Array(rows).to_string()));
        }

        if path.starts_with("/_cat/count/") {
            let body = state
                .count_body
                .clone()
                .unwrap_or_else(|| r#"[{"count":"0"}]"#.to_string());
            return Ok(reply(200, &body));
        }

        let name = path.trim_start_matches('/').to_string();
        Ok(match request.method {
            Method::HEAD if state.indices.contains(&name) => reply(200, ""),
            Method::PUT if state.indices.contains(&name) => reply(
                400,
                r#"{"error":{"type":"resource_already_exists_exception"},"status":400}"#,
            ),
            Method::PUT => {
                state.indices.insert(name);
                reply(200, r#"{"acknowledged":true}"#)
            }
            Method::DELETE if state.indices.remove(&name) => reply(200, r#"{"acknowledged":true}"#),
            _ => reply(404, r#"{"error":{"type":"index_not_found_exception"},"status":404}"#),
        })
    }
}
