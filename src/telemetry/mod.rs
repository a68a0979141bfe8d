//! 用量估算

mod tokens;

pub use tokens::{TokenEstimator, TokenEstimatorError};
