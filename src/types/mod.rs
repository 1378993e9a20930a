pub mod candle;
pub mod notification;
pub mod position;
pub mod signal;

pub use candle::*;
pub use notification::*;
pub use position::*;
pub use signal::*;
