//! Trading signals service module.
//!
//! Indicator calculations (MACD, KDJ), crossover and divergence detection,
//! five-wave structure matching, and the composite buy/sell evaluator.
//! Everything here is pure: callers pass candle series in and get values out.

pub mod crossover;
pub mod divergence;
pub mod evaluator;
pub mod indicators;
pub mod waves;

pub use crossover::{detect_cross, detect_cross_with_axis, find_previous_cross, ZeroAxis};
pub use divergence::{analyze_divergence, detect_divergence, long_term_trend};
pub use evaluator::{evaluate_position, SignalEvaluator};
pub use indicators::{Kdj, Macd};
pub use waves::{
    classify_breakout, find_breakout_candidate, identify_wave_points,
    matches_five_wave_low_pattern,
};
