//! 认证失败重放
//!
//! 一次逻辑调用最多重放一次：
//! 首次尝试 -> (认证失败) 失效并刷新令牌 -> 重放 -> 返回结果。
//! 非认证错误以及重放中的任何错误都原样返回。

use crate::backends::BackendResult;
use crate::processor::GatewayError;
use crate::providers::{AccessToken, TokenManager};
use std::future::Future;
use std::sync::Arc;

/// 重试阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPhase {
    FirstAttempt,
    Refresh,
    Replay,
}

#[derive(Clone)]
pub struct RetryCoordinator {
    tokens: Arc<TokenManager>,
}

impl RetryCoordinator {
    pub fn new(tokens: Arc<TokenManager>) -> Self {
        Self { tokens }
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// 以当前令牌执行操作，认证失败时刷新令牌并重放一次
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, GatewayError>
    where
        F: FnMut(AccessToken) -> Fut,
        Fut: Future<Output = BackendResult<T>>,
    {
        let mut token = self.tokens.get_token().await?;
        let mut phase = RetryPhase::FirstAttempt;

        loop {
            match phase {
                RetryPhase::FirstAttempt => match operation(token.clone()).await {
                    Ok(value) => return Ok(value),
                    Err(e) if e.is_auth_failure() => {
                        tracing::warn!("[RETRY] 后端拒绝令牌，刷新后重放: {}", e);
                        phase = RetryPhase::Refresh;
                    }
                    Err(e) => return Err(e.into()),
                },
                RetryPhase::Refresh => {
                    self.tokens.invalidate_rejected(&token).await;
                    token = self.tokens.get_token().await?;
                    phase = RetryPhase::Replay;
                }
                RetryPhase::Replay => {
                    return match operation(token.clone()).await {
                        Ok(value) => {
                            tracing::info!("[RETRY] 刷新令牌后重放成功");
                            Ok(value)
                        }
                        Err(e) => {
                            tracing::warn!("[RETRY] 重放失败，不再重试: {}", e);
                            Err(e.into())
                        }
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{BackendError, BackendErrorKind};
    use crate::testing::CountingTokenSource;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn coordinator() -> (RetryCoordinator, Arc<CountingTokenSource>) {
        let source = Arc::new(CountingTokenSource::new());
        let manager = Arc::new(TokenManager::new(source.clone()));
        (RetryCoordinator::new(manager), source)
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let (retry, source) = coordinator();
        let attempts = AtomicU32::new(0);

        let result = retry
            .execute(|_token| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, BackendError>("ok") }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_auth_failure_refreshes_and_replays_once() {
        let (retry, source) = coordinator();
        let seen = Mutex::new(Vec::new());

        let result = retry
            .execute(|token| {
                seen.lock().unwrap().push(token.secret().to_string());
                let first = token.secret() == "token-1";
                async move {
                    if first {
                        Err(BackendError::from_status(401, "expired"))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(*seen.lock().unwrap(), vec!["token-1", "token-2"]);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_auth_failure_on_replay_is_surfaced() {
        let (retry, _source) = coordinator();
        let attempts = AtomicU32::new(0);

        let result: Result<(), _> = retry
            .execute(|_token| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(BackendError::from_status(401, "still expired")) }
            })
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, GatewayError::AuthExpiredUpstream(_)));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_auth_failure_not_retried() {
        let (retry, source) = coordinator();
        let attempts = AtomicU32::new(0);

        let result: Result<(), _> = retry
            .execute(|_token| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(BackendError::new(BackendErrorKind::Timeout, "slow")) }
            })
            .await;

        assert!(matches!(result.unwrap_err(), GatewayError::Timeout(_)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_replay_error_kind_preserved() {
        let (retry, _source) = coordinator();

        let result: Result<(), _> = retry
            .execute(|token| {
                let first = token.secret() == "token-1";
                async move {
                    if first {
                        Err(BackendError::from_status(401, ""))
                    } else {
                        Err(BackendError::from_status(429, "busy"))
                    }
                }
            })
            .await;

        assert!(matches!(result.unwrap_err(), GatewayError::RateLimited(_)));
    }
}
