//! Validation job orchestration
//!
//! One validation job per owning index pipeline. Each pass either creates the
//! job, observes it while it runs, or consumes its verdict:
//!
//! ```text
//! Absent -> Created -> Running -> Succeeded | Failed
//! ```
//!
//! A verdict is written onto the owner's status before the job is removed, so
//! a pass that dies in between finds the finished job again and retries.

mod job;
mod response;
mod status;

pub use job::{
    owner_label_value, validation_job_name, JobHandle, JobPhase, JobRuntime, PodJobRuntime, ValidationJobSpec,
    OWNER_LABEL, VERSION_ANNOTATION,
};
pub use response::decode_validation_output;
pub use status::{validation_status_patch, IndexPipelineStatusSink, ValidationStatusSink};

use crate::crd::ValidationResponse;
use crate::error::Result;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Handling of jobs that end in the Failed phase.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailedJobPolicy {
    /// Leave the job in place; every later pass reports "failed" again.
    #[default]
    Retain,
    /// Delete the job so the next pass launches a fresh one.
    DeleteAndRetry,
}

/// What a single orchestration pass observed.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    /// A job was launched during this pass
    Created,
    /// A job exists and has not finished
    Running,
    /// The job ended without producing a verdict
    Failed,
    /// The job finished and its verdict was recorded
    Completed(ValidationResponse),
}

impl ValidationOutcome {
    /// Phase string reported on the validator status.
    ///
    /// Empty while a freshly created job has not been observed yet.
    pub fn phase(&self) -> &str {
        match self {
            ValidationOutcome::Created => "",
            ValidationOutcome::Running => "running",
            ValidationOutcome::Failed => "failed",
            ValidationOutcome::Completed(response) => &response.result,
        }
    }
}

pub struct ValidationOrchestrator {
    runtime: Arc<dyn JobRuntime>,
    status: Arc<dyn ValidationStatusSink>,
    failed_job_policy: FailedJobPolicy,
}

impl ValidationOrchestrator {
    pub fn new(
        runtime: Arc<dyn JobRuntime>,
        status: Arc<dyn ValidationStatusSink>,
        failed_job_policy: FailedJobPolicy,
    ) -> Self {
        Self {
            runtime,
            status,
            failed_job_policy,
        }
    }

    /// Advance the job for `spec.owner` by one step.
    pub async fn reconcile(&self, spec: &ValidationJobSpec) -> Result<ValidationOutcome> {
        let owned = self.runtime.list_owned(&spec.namespace, &spec.owner).await?;
        let expected = spec.job_name();

        let Some(existing) = owned
            .iter()
            .find(|job| job.name == expected)
            .or_else(|| owned.first())
        else {
            self.runtime.create(spec).await?;
            return Ok(ValidationOutcome::Created);
        };
        if owned.len() > 1 {
            warn!(owner = %spec.owner, jobs = owned.len(), "More than one validation job owned");
        }

        let job = self.runtime.get(&spec.namespace, &existing.name).await?;
        match job.phase {
            JobPhase::Succeeded => self.consume(spec, &job).await,
            JobPhase::Failed => {
                warn!(owner = %spec.owner, job = %job.name, "Validation job failed");
                if self.failed_job_policy == FailedJobPolicy::DeleteAndRetry {
                    self.runtime.delete(&spec.namespace, &job.name).await?;
                }
                Ok(ValidationOutcome::Failed)
            }
            phase => {
                debug!(owner = %spec.owner, job = %job.name, ?phase, "Validation job in progress");
                Ok(ValidationOutcome::Running)
            }
        }
    }

    async fn consume(&self, spec: &ValidationJobSpec, job: &JobHandle) -> Result<ValidationOutcome> {
        let output = self.runtime.output(&spec.namespace, &job.name).await?;
        let response = decode_validation_output(&output)?;
        // The spec may have moved on since the job was launched
        let version = job.version.as_deref().unwrap_or(&spec.version);

        if let Err(e) = self.status.record(&spec.namespace, &spec.owner, version, &response).await {
            if e.is_conflict() {
                error!(owner = %spec.owner, job = %job.name, "Validation response lost a status update race");
            }
            return Err(e);
        }

        self.runtime.delete(&spec.namespace, &job.name).await?;
        info!(owner = %spec.owner, version = %version, result = %response.result, "Validation completed");
        Ok(ValidationOutcome::Completed(response))
    }

    /// Remove every job owned by `owner`.
    pub async fn cleanup(&self, namespace: &str, owner: &str) -> Result<()> {
        for job in self.runtime.list_owned(namespace, owner).await? {
            self.runtime.delete(namespace, &job.name).await?;
        }
        Ok(())
    }
}
