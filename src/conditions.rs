//! Kubernetes-standard status condition helpers
//!
//! Condition types, finalizer tokens and the helpers that maintain condition
//! lists on xjoin resource statuses.

use crate::crd::PipelineCondition;
use chrono::Utc;

// Condition status values
pub const CONDITION_TRUE: &str = "True";
pub const CONDITION_FALSE: &str = "False";

// Shared condition types
pub const CONDITION_READY: &str = "Ready";
pub const CONDITION_VALID: &str = "Valid";

// Finalizer names
pub const DATASOURCE_PIPELINE_FINALIZER: &str = "finalizer.xjoin.datasourcepipeline.cloud.redhat.com";
pub const INDEX_PIPELINE_FINALIZER: &str = "finalizer.xjoin.indexpipeline.cloud.redhat.com";
pub const INDEX_VALIDATOR_FINALIZER: &str = "finalizer.xjoin.indexvalidator.cloud.redhat.com";

/// Build a condition stamped with the current time.
pub fn build_condition(
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) -> PipelineCondition {
    PipelineCondition {
        r#type: condition_type.to_string(),
        status: status.to_string(),
        last_transition_time: Some(Utc::now().to_rfc3339()),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
    }
}

/// Set or update a condition, preserving lastTransitionTime when the status is unchanged.
pub fn set_condition(conditions: &mut Vec<PipelineCondition>, new: PipelineCondition) {
    match conditions.iter_mut().find(|c| c.r#type == new.r#type) {
        Some(existing) if existing.status == new.status => {
            existing.reason = new.reason;
            existing.message = new.message;
        }
        Some(existing) => *existing = new,
        None => conditions.push(new),
    }
}

/// Whether `finalizers` already carries `token`.
pub fn has_finalizer(finalizers: Option<&[String]>, token: &str) -> bool {
    finalizers.unwrap_or_default().iter().any(|f| f == token)
}

/// `finalizers` with `token` removed, order preserved.
pub fn without_finalizer(finalizers: Option<&[String]>, token: &str) -> Vec<String> {
    finalizers
        .unwrap_or_default()
        .iter()
        .filter(|f| f.as_str() != token)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_condition() {
        let cond = build_condition(CONDITION_READY, CONDITION_TRUE, "Converged", "all components created");
        assert_eq!(cond.r#type, "Ready");
        assert_eq!(cond.status, "True");
        assert!(cond.last_transition_time.is_some());
        assert_eq!(cond.reason.as_deref(), Some("Converged"));
    }

    #[test]
    fn test_set_condition_preserves_transition_time_on_same_status() {
        let mut conditions = vec![PipelineCondition {
            r#type: CONDITION_VALID.to_string(),
            status: CONDITION_TRUE.to_string(),
            last_transition_time: Some("2024-01-01T00:00:00Z".to_string()),
            reason: Some("First".to_string()),
            message: Some("first".to_string()),
        }];

        set_condition(&mut conditions, build_condition(CONDITION_VALID, CONDITION_TRUE, "Second", "second"));

        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].last_transition_time.as_deref(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(conditions[0].reason.as_deref(), Some("Second"));
    }

    #[test]
    fn test_set_condition_replaces_on_status_change() {
        let mut conditions = vec![PipelineCondition {
            r#type: CONDITION_READY.to_string(),
            status: CONDITION_FALSE.to_string(),
            last_transition_time: Some("2024-01-01T00:00:00Z".to_string()),
            reason: None,
            message: None,
        }];

        set_condition(&mut conditions, build_condition(CONDITION_READY, CONDITION_TRUE, "Ok", "ok"));

        assert_eq!(conditions[0].status, "True");
        assert_ne!(conditions[0].last_transition_time.as_deref(), Some("2024-01-01T00:00:00Z"));
    }

    #[test]
    fn test_finalizer_helpers() {
        let tokens = vec!["other".to_string(), INDEX_PIPELINE_FINALIZER.to_string()];
        assert!(has_finalizer(Some(&tokens), INDEX_PIPELINE_FINALIZER));
        assert!(!has_finalizer(None, INDEX_PIPELINE_FINALIZER));
        assert_eq!(without_finalizer(Some(&tokens), INDEX_PIPELINE_FINALIZER), vec!["other".to_string()]);
    }
}
