//! 容错机制属性测试
//!
//! 使用 proptest 进行属性测试

use crate::backends::{BackendError, BackendErrorKind};
use crate::providers::TokenManager;
use crate::resilience::RetryCoordinator;
use crate::testing::CountingTokenSource;
use proptest::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Ok,
    AuthFailure,
    OtherFailure(BackendErrorKind),
}

fn arb_outcome() -> impl Strategy<Value = Outcome> {
    prop_oneof![
        Just(Outcome::Ok),
        Just(Outcome::AuthFailure),
        Just(Outcome::OtherFailure(BackendErrorKind::RateLimited)),
        Just(Outcome::OtherFailure(BackendErrorKind::Timeout)),
        Just(Outcome::OtherFailure(BackendErrorKind::MalformedUpstream)),
        Just(Outcome::OtherFailure(BackendErrorKind::Unknown)),
    ]
}

fn to_result(outcome: Outcome) -> Result<u32, BackendError> {
    match outcome {
        Outcome::Ok => Ok(7),
        Outcome::AuthFailure => Err(BackendError::from_status(401, "")),
        Outcome::OtherFailure(kind) => Err(BackendError::new(kind, "scripted")),
    }
}

proptest! {
    /// 对于任意的后端结果序列，一次逻辑调用最多尝试两次，
    /// 且只有首次尝试为认证失败时才会重放
    #[test]
    fn prop_at_most_one_replay(
        outcomes in proptest::collection::vec(arb_outcome(), 1..6)
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();

        let (result, attempts, acquisitions) = rt.block_on(async {
            let source = Arc::new(CountingTokenSource::new());
            let retry = RetryCoordinator::new(Arc::new(TokenManager::new(source.clone())));
            let attempt = AtomicU32::new(0);

            let result = retry
                .execute(|_token| {
                    let i = attempt.fetch_add(1, Ordering::SeqCst) as usize;
                    let outcome = outcomes[i.min(outcomes.len() - 1)];
                    async move { to_result(outcome) }
                })
                .await;

            (result, attempt.load(Ordering::SeqCst), source.calls())
        });

        prop_assert!(attempts <= 2);
        prop_assert!(acquisitions <= 2);

        let first_is_auth = matches!(outcomes[0], Outcome::AuthFailure);
        prop_assert_eq!(attempts == 2, first_is_auth);

        let last = outcomes[(attempts as usize - 1).min(outcomes.len() - 1)];
        match last {
            Outcome::Ok => prop_assert_eq!(result.ok(), Some(7)),
            _ => prop_assert!(result.is_err()),
        }
    }
}
