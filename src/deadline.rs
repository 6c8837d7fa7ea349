//! Bounded external calls.
//!
//! Every request against the search engine, the schema registry or the
//! Kubernetes API runs inside [`bounded`], so a pass never waits longer than
//! [`EXTERNAL_CALL_TIMEOUT`] on a single call.

use crate::error::{OperatorError, Result};
use std::future::Future;
use std::time::Duration;

/// Ceiling applied to every external call.
pub const EXTERNAL_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Run `fut` with the default deadline.
pub async fn bounded<T, E, F>(operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: Into<OperatorError>,
{
    bounded_for(operation, EXTERNAL_CALL_TIMEOUT, fut).await
}

/// Run `fut`, failing with [`OperatorError::Timeout`] after `after`.
pub async fn bounded_for<T, E, F>(operation: &str, after: Duration, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: Into<OperatorError>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(OperatorError::Timeout {
            operation: operation.to_string(),
            after,
        }),
    }
}
