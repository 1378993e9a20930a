//! Vigil - MACD/KDJ signal scanner and holdings monitor for crypto futures

pub mod config;
pub mod error;
pub mod services;
pub mod sources;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, Result};
pub use types::*;
