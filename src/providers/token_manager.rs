//! 令牌管理器
//!
//! 缓存唯一的后端访问令牌，按需刷新。
//!
//! - 缓存缺失或即将过期时同步换取新令牌
//! - 并发调用者共享同一次换取结果
//! - 换取失败不会缓存任何令牌
//! - 连续失败达到阈值时输出告警日志

use super::traits::{AccessToken, TokenError, TokenSource};
use chrono::Duration;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// 默认安全余量（秒）
pub const DEFAULT_REFRESH_MARGIN_SECS: i64 = 30;
/// 默认告警阈值
pub const DEFAULT_ALARM_AFTER_FAILURES: u32 = 3;

pub struct TokenManager {
    source: Arc<dyn TokenSource>,
    /// 锁在换取期间保持，使并发调用者排队等待同一次结果
    slot: Mutex<Option<AccessToken>>,
    margin: Duration,
    consecutive_failures: AtomicU32,
    alarm_after_failures: u32,
}

impl TokenManager {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            slot: Mutex::new(None),
            margin: Duration::seconds(DEFAULT_REFRESH_MARGIN_SECS),
            consecutive_failures: AtomicU32::new(0),
            alarm_after_failures: DEFAULT_ALARM_AFTER_FAILURES,
        }
    }

    pub fn with_margin(mut self, margin: Duration) -> Self {
        self.margin = margin;
        self
    }

    pub fn with_alarm_threshold(mut self, failures: u32) -> Self {
        self.alarm_after_failures = failures.max(1);
        self
    }

    /// 获取有效令牌
    ///
    /// 返回的令牌保证在安全余量之后仍然有效。
    pub async fn get_token(&self) -> Result<AccessToken, TokenError> {
        let mut slot = self.slot.lock().await;

        if let Some(token) = slot.as_ref() {
            if token.is_valid_for(self.margin) {
                return Ok(token.clone());
            }
            tracing::info!(
                "[TOKEN] 令牌即将过期 (expires_at={})，重新获取",
                token.expires_at()
            );
        }
        *slot = None;

        tracing::info!("[TOKEN] 正在从 {} 获取访问令牌", self.source.name());
        match self.source.acquire().await {
            Ok(token) => {
                let previous = self.consecutive_failures.swap(0, Ordering::SeqCst);
                if previous > 0 {
                    tracing::info!("[TOKEN] 令牌获取恢复，此前连续失败 {} 次", previous);
                }
                tracing::info!("[TOKEN] 令牌获取成功，过期时间 {}", token.expires_at());
                *slot = Some(token.clone());
                Ok(token)
            }
            Err(e) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= self.alarm_after_failures {
                    tracing::error!(
                        consecutive_failures = failures,
                        alarm = true,
                        "[TOKEN] 令牌连续获取失败 {} 次: {}",
                        failures,
                        e
                    );
                } else {
                    tracing::warn!("[TOKEN] 令牌获取失败 (第 {} 次): {}", failures, e);
                }
                Err(e)
            }
        }
    }

    /// 强制丢弃缓存令牌
    pub async fn invalidate(&self) {
        let mut slot = self.slot.lock().await;
        if slot.take().is_some() {
            tracing::info!("[TOKEN] 缓存令牌已失效");
        }
    }

    /// 仅当缓存的仍是被后端拒绝的那个令牌时才丢弃
    ///
    /// 并发请求同时收到 401 时，只有第一个会触发重新换取。
    pub async fn invalidate_rejected(&self, rejected: &AccessToken) {
        let mut slot = self.slot.lock().await;
        let is_same = slot
            .as_ref()
            .map(|cached| cached.secret() == rejected.secret())
            .unwrap_or(false);
        if is_same {
            *slot = None;
            tracing::info!("[TOKEN] 被后端拒绝的令牌已失效");
        } else {
            tracing::debug!("[TOKEN] 令牌已被其他请求替换，跳过失效");
        }
    }

    /// 当前连续失败次数
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    /// 是否已有缓存令牌（不检查有效期）
    pub async fn has_cached_token(&self) -> bool {
        self.slot.lock().await.is_some()
    }
}
