//! Text fragment streams produced by generation backends

use super::error::BackendError;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::time::Duration;

/// Lazy, finite, non-restartable sequence of text fragments from one call
pub type TextStream = BoxStream<'static, Result<String, BackendError>>;

/// Builds a stream from already-known fragments
pub fn from_fragments<I>(fragments: I) -> TextStream
where
    I: IntoIterator<Item = Result<String, BackendError>>,
    I::IntoIter: Send + 'static,
{
    stream::iter(fragments).boxed()
}

/// Ends the stream with `TimeoutError` when no fragment arrives within `timeout`
pub fn with_idle_timeout(inner: TextStream, timeout: Duration) -> TextStream {
    stream::unfold(Some(inner), move |state| async move {
        let mut inner = state?;
        match tokio::time::timeout(timeout, inner.next()).await {
            Ok(Some(item)) => Some((item, Some(inner))),
            Ok(None) => None,
            Err(_) => Some((
                Err(BackendError::TimeoutError {
                    seconds: timeout.as_secs(),
                }),
                None,
            )),
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_idle_timeout_passes_fragments_through() {
        let inner = from_fragments(vec![Ok("a".to_string()), Ok("b".to_string())]);
        let collected: Vec<_> = with_idle_timeout(inner, Duration::from_secs(5))
            .collect()
            .await;

        assert_eq!(collected, vec![Ok("a".to_string()), Ok("b".to_string())]);
    }

    #[tokio::test]
    async fn test_idle_timeout_fires_on_stall() {
        let stalled = stream::once(async { Ok("first".to_string()) })
            .chain(stream::pending())
            .boxed();

        let collected: Vec<_> = with_idle_timeout(stalled, Duration::from_millis(20))
            .collect()
            .await;

        assert_eq!(collected.len(), 2);
        assert_eq!(collected[0], Ok("first".to_string()));
        assert!(matches!(
            collected[1],
            Err(BackendError::TimeoutError { .. })
        ));
    }
}
