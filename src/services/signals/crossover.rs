//! Line/signal crossover detection.
//!
//! The latest bar is treated as still forming: a cross is only reported once
//! it is visible between the third-to-last and second-to-last points.

use crate::types::{CrossEvent, CrossKind};

/// Side of the zero axis a cross value must be on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZeroAxis {
    Any,
    Below,
    Above,
}

impl ZeroAxis {
    fn admits(&self, value: f64) -> bool {
        match self {
            ZeroAxis::Any => true,
            ZeroAxis::Below => value < 0.0,
            ZeroAxis::Above => value > 0.0,
        }
    }
}

/// Cross completed between `i - 1` and `i`, if any. Equality is never a cross.
fn cross_at(line: &[f64], signal: &[f64], i: usize) -> Option<CrossKind> {
    let (prev_line, prev_signal) = (line[i - 1], signal[i - 1]);
    let (cur_line, cur_signal) = (line[i], signal[i]);

    if prev_line < prev_signal && cur_line > cur_signal {
        Some(CrossKind::Golden)
    } else if prev_line > prev_signal && cur_line < cur_signal {
        Some(CrossKind::Death)
    } else {
        None
    }
}

/// Most recent completed cross, judged on `[-3]` and `[-2]`.
pub fn detect_cross(line: &[f64], signal: &[f64]) -> Option<CrossEvent> {
    let len = line.len().min(signal.len());
    if len < 3 {
        return None;
    }

    let index = len - 2;
    cross_at(line, signal, index).map(|kind| CrossEvent {
        index,
        kind,
        value_at_cross: line[index],
    })
}

/// [`detect_cross`] with a zero-axis condition on the cross value.
pub fn detect_cross_with_axis(line: &[f64], signal: &[f64], axis: ZeroAxis) -> Option<CrossEvent> {
    detect_cross(line, signal).filter(|event| axis.admits(event.value_at_cross))
}

/// Nearest earlier cross of `kind` before the current one.
///
/// Walks back from `len - 4` to `1`, so the bars the current cross was judged
/// on are never reused.
pub fn find_previous_cross(
    line: &[f64],
    signal: &[f64],
    kind: CrossKind,
    axis: ZeroAxis,
) -> Option<CrossEvent> {
    let len = line.len().min(signal.len());
    if len < 5 {
        return None;
    }

    (1..=len - 4).rev().find_map(|i| {
        let hit = cross_at(line, signal, i)? == kind && axis.admits(line[i]);
        hit.then(|| CrossEvent {
            index: i,
            kind,
            value_at_cross: line[i],
        })
    })
}

/// Every cross in the series in index order, including one on the latest bar.
pub fn scan_crosses(line: &[f64], signal: &[f64]) -> Vec<CrossEvent> {
    let len = line.len().min(signal.len());
    (1..len)
        .filter_map(|i| {
            cross_at(line, signal, i).map(|kind| CrossEvent {
                index: i,
                kind,
                value_at_cross: line[i],
            })
        })
        .collect()
}
