//! 配置管理
//!
//! 配置来源按优先级从低到高：
//! 1. 内置默认值
//! 2. YAML 配置文件（`BRIDGECAST_CONFIG` 或 `~/.bridgecast/config.yaml`）
//! 3. 环境变量（启动时先加载 `.env`）

use crate::resilience::TimeoutConfig;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// 配置文件路径环境变量
pub const CONFIG_PATH_ENV: &str = "BRIDGECAST_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub timeouts: TimeoutConfig,
    pub token: TokenConfig,
    pub translation: TranslationConfig,
    pub embeddings: EmbeddingConfig,
    pub logging: LoggingConfig,
    /// `/v1/models` 暴露的模型 id，为空时使用内置目录
    pub models: Vec<String>,
}

// ============================================================================
// 子配置
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 请求体大小上限（字节）
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            body_limit_bytes: 16 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 流式模式
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// 调用后端流式端点
    #[default]
    Native,
    /// 调用非流式端点后切分内容模拟流式输出
    Simulated,
}

impl std::str::FromStr for StreamMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "native" => Ok(StreamMode::Native),
            "simulated" => Ok(StreamMode::Simulated),
            other => Err(format!("未知的流式模式: {}", other)),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub token_url: String,
    pub chat_url: String,
    /// 流式端点，未配置时使用 chat_url
    pub chat_stream_url: Option<String>,
    pub embedding_url: String,
    pub auth_code: String,
    /// 是否校验后端 TLS 证书
    pub verify_tls: bool,
    /// 出站认证头名称
    pub auth_header: String,
    /// 出站认证头前缀，例如 `"Bearer "`；默认直接发送令牌原文
    pub auth_prefix: String,
    pub stream_mode: StreamMode,
    /// 模拟流式时切分的片段数
    pub simulated_chunks: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            token_url: String::new(),
            chat_url: String::new(),
            chat_stream_url: None,
            embedding_url: String::new(),
            auth_code: String::new(),
            verify_tls: false,
            auth_header: "Authorization".to_string(),
            auth_prefix: String::new(),
            stream_mode: StreamMode::Native,
            simulated_chunks: 5,
        }
    }
}

impl BackendConfig {
    pub fn stream_url(&self) -> &str {
        self.chat_stream_url.as_deref().unwrap_or(&self.chat_url)
    }
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("token_url", &self.token_url)
            .field("chat_url", &self.chat_url)
            .field("chat_stream_url", &self.chat_stream_url)
            .field("embedding_url", &self.embedding_url)
            .field("auth_code", &"***")
            .field("verify_tls", &self.verify_tls)
            .field("auth_header", &self.auth_header)
            .field("stream_mode", &self.stream_mode)
            .field("simulated_chunks", &self.simulated_chunks)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// 令牌响应未给出有效期时的默认值（秒）
    pub default_ttl_secs: i64,
    /// 过期前的安全余量（秒）
    pub refresh_margin_secs: i64,
    /// 连续获取失败多少次后告警
    pub alarm_after_failures: u32,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 1800,
            refresh_margin_secs: 30,
            alarm_after_failures: 3,
        }
    }
}

/// 未知请求字段的处理策略
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExtraFieldPolicy {
    /// 丢弃后端不认识的字段
    #[default]
    Drop,
    /// 后端接受超集时原样透传
    Passthrough,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    pub default_temperature: f32,
    pub default_top_p: f32,
    pub default_max_tokens: u32,
    pub default_repetition_penalty: f32,
    /// 后端是否支持工具调用
    pub supports_tools: bool,
    /// 后端是否支持图片输入
    pub supports_images: bool,
    pub extra_fields: ExtraFieldPolicy,
    /// 客户端模型 id 到后端模型 id 的映射
    pub model_map: HashMap<String, String>,
    /// 后端未返回用量时是否本地估算
    pub usage_estimation: bool,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            default_temperature: 0.8,
            default_top_p: 0.8,
            default_max_tokens: 1024,
            default_repetition_penalty: 1.1,
            supports_tools: true,
            supports_images: false,
            extra_fields: ExtraFieldPolicy::Drop,
            model_map: HashMap::new(),
            usage_estimation: true,
        }
    }
}

impl TranslationConfig {
    /// 映射后的后端模型 id
    pub fn backend_model<'a>(&'a self, model: &'a str) -> &'a str {
        self.model_map.get(model).map(String::as_str).unwrap_or(model)
    }
}

/// 向量维度处理策略
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DimensionPolicy {
    /// 原样返回后端向量
    #[default]
    Passthrough,
    /// 后端未按请求维度返回时截断并重新归一化
    Truncate,
}

impl std::str::FromStr for DimensionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "passthrough" => Ok(DimensionPolicy::Passthrough),
            "truncate" => Ok(DimensionPolicy::Truncate),
            other => Err(format!("未知的维度策略: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub dimension_policy: DimensionPolicy,
    /// 单个请求内并发的后端调用数
    pub max_concurrency: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimension_policy: DimensionPolicy::Passthrough,
            max_concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// 输出 JSON 格式日志
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ============================================================================
// 加载与校验
// ============================================================================

/// 配置校验错误
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("缺少必需配置项: {0}")]
    Missing(&'static str),

    #[error("配置项 {field} 不是有效的 HTTP 地址: {value}")]
    InvalidUrl { field: &'static str, value: String },

    #[error("配置项 {field} 无效: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

impl GatewayConfig {
    /// 按默认值、配置文件、环境变量的顺序加载并校验
    pub fn load() -> anyhow::Result<Self> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => {
                tracing::info!("[CONFIG] 加载配置文件 {}", path.display());
                Self::from_yaml_file(&path)?
            }
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// 默认配置文件路径
    pub fn config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Some(PathBuf::from(path));
        }
        dirs::home_dir().map(|home| home.join(".bridgecast").join("config.yaml"))
    }

    pub fn from_yaml_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("解析配置文件失败: {}", path.display()))
    }

    pub fn from_yaml_str(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// 用环境变量覆盖配置
    pub fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("APP_HOST") {
            self.server.host = v;
        }
        if let Some(v) = get("PORT") {
            self.server.port = v.trim().parse().context("PORT 必须是端口号")?;
        }
        if let Some(v) = get("TOKEN_URL") {
            self.backend.token_url = v;
        }
        if let Some(v) = get("CHAT_API_URL") {
            self.backend.chat_url = v;
        }
        if let Some(v) = get("CHAT_STREAM_API_URL") {
            self.backend.chat_stream_url = Some(v);
        }
        if let Some(v) = get("EMBEDDING_API_URL") {
            self.backend.embedding_url = v;
        }
        if let Some(v) = get("AUTH_CODE") {
            self.backend.auth_code = v;
        }
        if let Some(v) = get("VERIFY_SSL") {
            self.backend.verify_tls = parse_bool(&v).context("VERIFY_SSL 必须是布尔值")?;
        }
        if let Some(v) = get("STREAM_MODE") {
            self.backend.stream_mode = v.parse().map_err(anyhow::Error::msg)?;
        }
        if let Some(v) = get("REQUEST_TIMEOUT_SECS") {
            self.timeouts.request_timeout_ms = parse_secs(&v).context("REQUEST_TIMEOUT_SECS")?;
        }
        if let Some(v) = get("TOKEN_TIMEOUT_SECS") {
            self.timeouts.token_timeout_ms = parse_secs(&v).context("TOKEN_TIMEOUT_SECS")?;
        }
        if let Some(v) = get("STREAM_IDLE_TIMEOUT_SECS") {
            self.timeouts.stream_idle_timeout_ms =
                parse_secs(&v).context("STREAM_IDLE_TIMEOUT_SECS")?;
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.logging.level = v.trim().to_lowercase();
        }
        if let Some(v) = get("LOG_JSON") {
            self.logging.json = parse_bool(&v).context("LOG_JSON 必须是布尔值")?;
        }
        if let Some(v) = get("EMBEDDING_DIMENSION_POLICY") {
            self.embeddings.dimension_policy = v.parse().map_err(anyhow::Error::msg)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("token_url", &self.backend.token_url)?;
        check_url("chat_url", &self.backend.chat_url)?;
        if let Some(url) = &self.backend.chat_stream_url {
            check_url("chat_stream_url", url)?;
        }
        check_url("embedding_url", &self.backend.embedding_url)?;

        if self.backend.auth_code.trim().is_empty() {
            return Err(ConfigError::Missing("auth_code"));
        }
        if self.backend.auth_header.trim().is_empty() {
            return Err(ConfigError::Missing("auth_header"));
        }
        if self.backend.simulated_chunks == 0 {
            return Err(ConfigError::Invalid {
                field: "simulated_chunks",
                reason: "必须大于 0".to_string(),
            });
        }

        let timeouts = [
            ("request_timeout_ms", self.timeouts.request_timeout_ms),
            ("token_timeout_ms", self.timeouts.token_timeout_ms),
            ("stream_idle_timeout_ms", self.timeouts.stream_idle_timeout_ms),
            ("connect_timeout_ms", self.timeouts.connect_timeout_ms),
        ];
        for (field, value) in timeouts {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "超时必须大于 0".to_string(),
                });
            }
        }

        if self.embeddings.max_concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "max_concurrency",
                reason: "必须大于 0".to_string(),
            });
        }
        if self.token.default_ttl_secs <= self.token.refresh_margin_secs {
            return Err(ConfigError::Invalid {
                field: "default_ttl_secs",
                reason: "必须大于 refresh_margin_secs".to_string(),
            });
        }
        Ok(())
    }
}

fn check_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Missing(field));
    }
    if !(value.starts_with("http://") || value.starts_with("https://")) {
        return Err(ConfigError::InvalidUrl {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

fn parse_bool(value: &str) -> anyhow::Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("无法解析布尔值: {}", other),
    }
}

fn parse_secs(value: &str) -> anyhow::Result<u64> {
    let secs: u64 = value.trim().parse()?;
    Ok(secs * 1000)
}
