//! Writing validation verdicts onto index pipeline status.

use crate::conditions::{build_condition, set_condition, CONDITION_FALSE, CONDITION_TRUE, CONDITION_VALID};
use crate::crd::{ValidationResponse, XJoinIndexPipeline};
use crate::deadline::bounded;
use crate::error::Result;
use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, ResourceExt};
use tracing::info;

/// Receives decoded verdicts.
///
/// Implementations must fail with [`crate::error::OperatorError::Conflict`] when another
/// writer changed the resource first, leaving status untouched.
#[async_trait]
pub trait ValidationStatusSink: Send + Sync {
    /// Store `response`, produced by validating `version` of `owner`.
    async fn record(&self, namespace: &str, owner: &str, version: &str, response: &ValidationResponse) -> Result<()>;
}

/// Stores the verdict on the XJoinIndexPipeline sharing the validator's name
pub struct IndexPipelineStatusSink {
    client: Client,
}

impl IndexPipelineStatusSink {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Status patch carrying the verdict, guarded by `resource_version`.
pub fn validation_status_patch(
    pipeline: &XJoinIndexPipeline,
    version: &str,
    response: &ValidationResponse,
) -> serde_json::Value {
    let mut conditions = pipeline
        .status
        .as_ref()
        .map(|s| s.conditions.clone())
        .unwrap_or_default();
    let (status, reason) = if response.result == "pass" {
        (CONDITION_TRUE, "ValidationPassed")
    } else {
        (CONDITION_FALSE, "ValidationFailed")
    };
    set_condition(&mut conditions, build_condition(CONDITION_VALID, status, reason, &response.message));

    serde_json::json!({
        "metadata": { "resourceVersion": pipeline.resource_version() },
        "status": {
            "validationResponse": response,
            "validatedVersion": version,
            "conditions": conditions,
        }
    })
}

#[async_trait]
impl ValidationStatusSink for IndexPipelineStatusSink {
    async fn record(&self, namespace: &str, owner: &str, version: &str, response: &ValidationResponse) -> Result<()> {
        let pipelines: Api<XJoinIndexPipeline> = Api::namespaced(self.client.clone(), namespace);
        let pipeline = bounded("get index pipeline", pipelines.get(owner)).await?;

        let patch = validation_status_patch(&pipeline, version, response);
        bounded(
            "patch index pipeline status",
            pipelines.patch_status(owner, &PatchParams::default(), &Patch::Merge(&patch)),
        )
        .await?;
        info!(namespace = %namespace, pipeline = %owner, version = %version, result = %response.result, "Recorded validation response");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::IndexPipelineSpec;

    fn pipeline() -> XJoinIndexPipeline {
        let mut p = XJoinIndexPipeline::new(
            "hosts",
            IndexPipelineSpec {
                version: "1".to_string(),
                avro_schema: "{}".to_string(),
                pause: false,
                index_template: None,
            },
        );
        p.metadata.resource_version = Some("4711".to_string());
        p
    }

    #[test]
    fn test_patch_is_guarded_by_resource_version() {
        let response = ValidationResponse {
            result: "pass".to_string(),
            message: "ok".to_string(),
            ..Default::default()
        };
        let patch = validation_status_patch(&pipeline(), "1", &response);
        assert_eq!(patch["metadata"]["resourceVersion"], "4711");
        assert_eq!(patch["status"]["validationResponse"]["result"], "pass");
        assert_eq!(patch["status"]["validatedVersion"], "1");
        assert_eq!(patch["status"]["conditions"][0]["type"], CONDITION_VALID);
        assert_eq!(patch["status"]["conditions"][0]["status"], CONDITION_TRUE);
    }

    #[test]
    fn test_failing_verdict_sets_condition_false() {
        let response = ValidationResponse {
            result: "fail".to_string(),
            message: "3 documents missing".to_string(),
            ..Default::default()
        };
        let patch = validation_status_patch(&pipeline(), "1", &response);
        assert_eq!(patch["status"]["conditions"][0]["status"], CONDITION_FALSE);
        assert_eq!(patch["status"]["conditions"][0]["message"], "3 documents missing");
    }
}
