//! 认证码令牌来源
//!
//! 以配置的授权码向令牌端点换取访问令牌：
//! `POST token_url {"code": ...}` -> `{"data": {"access_token": ..., "expires_in": ...}}`

use super::traits::{AccessToken, TokenError, TokenSource};
use crate::logger::sanitize_log_message;
use crate::models::backend::{TokenEnvelope, TokenRequest};
use async_trait::async_trait;
use chrono::Duration;
use reqwest::Client;

pub struct AuthCodeTokenSource {
    client: Client,
    token_url: String,
    auth_code: String,
    /// 响应未给出 expires_in 时使用
    default_ttl: Duration,
    timeout: std::time::Duration,
}

impl AuthCodeTokenSource {
    pub fn new(client: Client, token_url: impl Into<String>, auth_code: impl Into<String>) -> Self {
        Self {
            client,
            token_url: token_url.into(),
            auth_code: auth_code.into(),
            default_ttl: Duration::minutes(30),
            timeout: std::time::Duration::from_secs(10),
        }
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn parse_token(&self, body: &str) -> Result<AccessToken, TokenError> {
        let malformed = |message: String| {
            tracing::warn!(
                "[AUTH_CODE] {}，响应体: {}",
                message,
                sanitize_log_message(body)
            );
            TokenError::Malformed { message }
        };

        let envelope: TokenEnvelope = serde_json::from_str(body)
            .map_err(|e| {
                malformed(format!(
                    "无法解析令牌响应 (line {}, column {})",
                    e.line(),
                    e.column()
                ))
            })?;

        if let Some(code) = envelope.error_code.filter(|c| *c != 0 && *c != 200) {
            return Err(malformed(format!(
                "令牌端点返回错误码 {}: {}",
                code,
                envelope.message.unwrap_or_default()
            )));
        }

        let data = envelope
            .data
            .ok_or_else(|| malformed("响应中没有 data".to_string()))?;

        let ttl = match data.expires_in_secs().filter(|secs| *secs > 0) {
            Some(secs) => Duration::try_seconds(secs)
                .ok_or_else(|| malformed(format!("expires_in 超出范围: {}", secs)))?,
            None => self.default_ttl,
        };

        let value = data
            .access_token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| malformed("响应中没有 access_token".to_string()))?;

        AccessToken::try_new(value, ttl)
            .ok_or_else(|| malformed(format!("expires_in 超出范围: {}s", ttl.num_seconds())))
    }
}

#[async_trait]
impl TokenSource for AuthCodeTokenSource {
    async fn acquire(&self) -> Result<AccessToken, TokenError> {
        let resp = self
            .client
            .post(&self.token_url)
            .timeout(self.timeout)
            .header("Accept", "application/json")
            .json(&TokenRequest {
                code: &self.auth_code,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TokenError::Timeout
                } else {
                    TokenError::Network(e.to_string())
                }
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| {
            if e.is_timeout() {
                TokenError::Timeout
            } else {
                TokenError::Network(e.to_string())
            }
        })?;

        if !status.is_success() {
            tracing::error!(
                "[AUTH_CODE] 令牌端点返回 {}: {}",
                status.as_u16(),
                sanitize_log_message(&body)
            );
            return Err(TokenError::Status {
                status: status.as_u16(),
                body: sanitize_log_message(&body),
            });
        }

        self.parse_token(&body)
    }

    fn name(&self) -> &'static str {
        "auth_code"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source_for(server: &MockServer) -> AuthCodeTokenSource {
        AuthCodeTokenSource::new(
            Client::new(),
            format!("{}/token", server.uri()),
            "code-123",
        )
    }

    #[tokio::test]
    async fn test_acquire_success_with_expiry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_json(serde_json::json!({"code": "code-123"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"access_token": "tok-1", "expires_in": 3600}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let token = source_for(&server).acquire().await.unwrap();
        assert_eq!(token.secret(), "tok-1");
        let ttl = token.expires_at() - token.acquired_at();
        assert_eq!(ttl.num_seconds(), 3600);
    }

    #[tokio::test]
    async fn test_acquire_uses_default_ttl() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"access_token": "tok-2"}
            })))
            .mount(&server)
            .await;

        let token = source_for(&server)
            .with_default_ttl(Duration::minutes(5))
            .acquire()
            .await
            .unwrap();
        assert_eq!((token.expires_at() - token.acquired_at()).num_minutes(), 5);
    }

    #[tokio::test]
    async fn test_acquire_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let err = source_for(&server).acquire().await.unwrap_err();
        match err {
            TokenError::Status { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "unavailable");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_acquire_missing_token_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": {}})),
            )
            .mount(&server)
            .await;

        let err = source_for(&server).acquire().await.unwrap_err();
        assert!(matches!(err, TokenError::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_acquire_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(std::time::Duration::from_millis(500))
                    .set_body_json(serde_json::json!({"data": {"access_token": "late"}})),
            )
            .mount(&server)
            .await;

        let err = source_for(&server)
            .with_timeout(std::time::Duration::from_millis(50))
            .acquire()
            .await
            .unwrap_err();
        assert!(matches!(err, TokenError::Timeout));
    }

    #[tokio::test]
    async fn test_expires_in_as_string() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"access_token": "tok-3", "expires_in": "3600"}
            })))
            .mount(&server)
            .await;

        let token = source_for(&server).acquire().await.unwrap();
        assert_eq!((token.expires_at() - token.acquired_at()).num_seconds(), 3600);
    }

    #[tokio::test]
    async fn test_unparseable_expires_in_uses_default_ttl() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"access_token": "tok-4", "expires_in": "soon"}
            })))
            .mount(&server)
            .await;

        let token = source_for(&server)
            .with_default_ttl(Duration::minutes(7))
            .acquire()
            .await
            .unwrap();
        assert_eq!((token.expires_at() - token.acquired_at()).num_minutes(), 7);
    }

    #[tokio::test]
    async fn test_huge_expires_in_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"access_token": "tok", "expires_in": i64::MAX}
            })))
            .mount(&server)
            .await;

        let err = source_for(&server).acquire().await.unwrap_err();
        assert!(matches!(err, TokenError::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_malformed_payload_never_reaches_client_envelope() {
        use crate::processor::GatewayError;

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "errorCode": 500,
                "data": {"access_token": "LIVE-SECRET-TOKEN", "expires_in": 3600}
            })))
            .mount(&server)
            .await;

        let err = source_for(&server).acquire().await.unwrap_err();
        assert!(matches!(err, TokenError::Malformed { .. }));

        let envelope = GatewayError::from(err).to_json().to_string();
        assert!(!envelope.contains("LIVE-SECRET-TOKEN"));
        assert!(envelope.contains("token_acquisition_failed"));
    }
}
