//! 后端令牌管理
//!
//! - `traits`: `AccessToken` 与 `TokenSource` 接口
//! - `auth_code`: 授权码换令牌的 HTTP 实现
//! - `token_manager`: 令牌缓存与并发刷新

pub mod auth_code;
pub mod token_manager;
pub mod traits;

pub use auth_code::AuthCodeTokenSource;
pub use token_manager::TokenManager;
pub use traits::{AccessToken, TokenError, TokenSource};
