//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap a single outbound call with its deadline
//! - Cancel only that call when the deadline passes
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from network errors

use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;

use crate::transport::types::TransportError;

/// Run `fut` under `deadline`, mapping expiry to [`TransportError::Timeout`].
pub async fn with_deadline<T, F>(endpoint: &str, deadline: Duration, fut: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout {
            endpoint: endpoint.to_string(),
            after: deadline,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::types::ErrorKind;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_exceeded_is_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, TransportError>(())
        };
        let err = with_deadline("GET /slow", Duration::from_secs(1), slow).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.endpoint(), "GET /slow");
    }

    #[tokio::test]
    async fn test_inner_result_passes_through() {
        let ok = with_deadline("GET /fast", Duration::from_secs(1), async { Ok::<_, TransportError>(5) }).await;
        assert_eq!(ok.unwrap(), 5);
    }
}
