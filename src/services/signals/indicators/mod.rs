//! Technical indicator implementations.

pub mod ema;
pub mod kdj;
pub mod macd;

pub use ema::{ema, ema_span, Smoothing};
pub use kdj::Kdj;
pub use macd::Macd;
