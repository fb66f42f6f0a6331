//! シグナル呼び出しのタイムアウト・再試行・キャンセル

use crate::config::Config;
use crate::error::{MatchError, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 一時的な障害に対する再試行ポリシー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::ZERO,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// `is_transient()` なエラーのみ再試行する
    pub async fn run<T, F, Fut>(&self, signal: &'static str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::debug!(signal, attempt, error = %e, "再試行");
                    tokio::time::sleep(self.backoff).await;
                }
                other => return other,
            }
        }
    }
}

/// 1シグナル分の呼び出しを、タイムアウトとキャンセルの下で実行
///
/// 再試行はタイムアウトの内側で行うので、合計時間は `timeout` を超えない。
pub async fn guarded<T, F, Fut>(
    signal: &'static str,
    timeout: Duration,
    retry: &RetryPolicy,
    cancel: &CancellationToken,
    op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(MatchError::Cancelled),
        result = tokio::time::timeout(timeout, retry.run(signal, op)) => match result {
            Ok(r) => r,
            Err(_) => Err(MatchError::Timeout {
                signal,
                seconds: timeout.as_secs(),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = fast_retry(2)
            .run("embedding", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(MatchError::EmbeddingServiceUnavailable("503".into()))
                } else {
                    Ok(42)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_retry_for_non_transient() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = fast_retry(3)
            .run("landmarks", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(MatchError::NoFaceDetected)
            })
            .await;
        assert!(matches!(result, Err(MatchError::NoFaceDetected)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = fast_retry(1)
            .run("vision", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(MatchError::VisionServiceUnavailable("down".into()))
            })
            .await;
        assert!(matches!(result, Err(MatchError::VisionServiceUnavailable(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_guarded_timeout() {
        let cancel = CancellationToken::new();
        let result: Result<()> = guarded(
            "vision",
            Duration::from_millis(20),
            &RetryPolicy::none(),
            &cancel,
            || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
        )
        .await;
        assert!(matches!(result, Err(MatchError::Timeout { signal: "vision", .. })));
    }

    #[tokio::test]
    async fn test_guarded_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = guarded(
            "embedding",
            Duration::from_secs(5),
            &RetryPolicy::none(),
            &cancel,
            || async { Ok(1) },
        )
        .await;
        assert!(matches!(result, Err(MatchError::Cancelled)));
    }
}
