//! 容错机制模块
//!
//! 提供认证失败重放和超时控制功能

mod retry;
mod timeout;

pub use retry::{RetryCoordinator, RetryPhase};
pub use timeout::{next_with_idle_timeout, with_timeout, TimeoutConfig, TimeoutError};

#[cfg(test)]
mod tests;
