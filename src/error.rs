//! Error types for the xjoin operator

use std::time::Duration;

/// Result type alias for operator operations
pub type Result<T> = std::result::Result<T, OperatorError>;

/// Errors that can occur during operator operations
#[derive(Debug, thiserror::Error)]
pub enum OperatorError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    KubeApi(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(String),

    /// Elasticsearch answered with a status the caller does not accept
    #[error("Elasticsearch {operation} failed with status {status}: {body}")]
    Elasticsearch {
        operation: String,
        status: u16,
        body: String,
    },

    /// Schema registry answered with a status the caller does not accept
    #[error("Schema registry {operation} failed with status {status}: {body}")]
    SchemaRegistry {
        operation: String,
        status: u16,
        body: String,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A payload was well-formed JSON but not the expected shape
    #[error("Decode error: {0}")]
    Decode(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A concurrent writer changed the resource first
    #[error("Conflict: {0}")]
    Conflict(String),

    /// An external call exceeded its deadline
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// One or more pipeline components failed to converge
    #[error("{} component(s) failed: {}", .0.len(), summarize(.0))]
    Components(Vec<ComponentFailure>),
}

/// A single member failure reported by a component set.
#[derive(Debug)]
pub struct ComponentFailure {
    pub component: String,
    pub error: OperatorError,
}

fn summarize(failures: &[ComponentFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.component, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

impl OperatorError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, OperatorError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, OperatorError::Conflict(_))
    }
}

impl From<kube::Error> for OperatorError {
    fn from(err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(ae) if ae.code == 404 => OperatorError::NotFound(ae.message.clone()),
            kube::Error::Api(ae) if ae.code == 409 => OperatorError::Conflict(ae.message.clone()),
            _ => OperatorError::KubeApi(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for OperatorError {
    fn from(err: serde_json::Error) -> Self {
        OperatorError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for OperatorError {
    fn from(err: reqwest::Error) -> Self {
        OperatorError::Http(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("status {}", code),
            reason: String::new(),
            code,
        })
    }

    #[test]
    fn test_kube_not_found_is_classified() {
        let err = OperatorError::from(api_error(404));
        assert!(err.is_not_found());
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_kube_conflict_is_classified() {
        let err = OperatorError::from(api_error(409));
        assert!(err.is_conflict());
    }

    #[test]
    fn test_other_kube_errors_stay_generic() {
        let err = OperatorError::from(api_error(500));
        assert!(matches!(err, OperatorError::KubeApi(_)));
    }

    #[test]
    fn test_component_failures_are_listed() {
        let err = OperatorError::Components(vec![
            ComponentFailure {
                component: "KafkaTopic/a.1".to_string(),
                error: OperatorError::Http("refused".to_string()),
            },
            ComponentFailure {
                component: "AvroSchema/a.1".to_string(),
                error: OperatorError::NotFound("subject".to_string()),
            },
        ]);
        let msg = err.to_string();
        assert!(msg.starts_with("2 component(s) failed"));
        assert!(msg.contains("KafkaTopic/a.1: HTTP error: refused"));
        assert!(msg.contains("AvroSchema/a.1"));
    }
}
