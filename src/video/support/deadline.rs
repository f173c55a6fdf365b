use std::future::Future;
use std::time::Duration;

use crate::video::error::StudioError;

/// Await `fut`, failing with [`StudioError::Timeout`] once `limit` elapses.
/// `None` waits indefinitely.
pub async fn with_deadline<T, F>(
    limit: Option<Duration>,
    operation: &'static str,
    fut: F,
) -> Result<T, StudioError>
where
    F: Future<Output = Result<T, StudioError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| StudioError::Timeout {
                operation,
                seconds: limit.as_secs(),
            })?,
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unbounded_waits_for_result() {
        let value = with_deadline(None, "render", async { Ok::<_, StudioError>(3) })
            .await
            .unwrap();
        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn bounded_times_out() {
        let err = with_deadline(Some(Duration::from_millis(5)), "render", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, StudioError>(())
        })
        .await
        .unwrap_err();
        assert_eq!(
            err,
            StudioError::Timeout {
                operation: "render",
                seconds: 0
            }
        );
    }
}
