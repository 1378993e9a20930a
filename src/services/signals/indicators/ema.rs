//! Exponential moving averages.
//!
//! Both smoothing conventions use the recursive form without reweighting of
//! the early terms: `ema[0] = x[0]`, `ema[i] = x[i] * alpha + ema[i - 1] * (1 - alpha)`.

/// How the smoothing factor is derived.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Smoothing {
    /// `alpha = 2 / (span + 1)`; used for MACD.
    Span(usize),
    /// Centre of mass, `alpha = 1 / (1 + com)`; used for KDJ.
    CenterOfMass(f64),
}

impl Smoothing {
    pub fn alpha(&self) -> f64 {
        match *self {
            Smoothing::Span(span) => 2.0 / (span as f64 + 1.0),
            Smoothing::CenterOfMass(com) => 1.0 / (1.0 + com),
        }
    }
}

/// EMA of `values`, same length as the input. Empty in, empty out.
pub fn ema(values: &[f64], smoothing: Smoothing) -> Vec<f64> {
    let alpha = smoothing.alpha();
    let mut out = Vec::with_capacity(values.len());

    let mut iter = values.iter();
    let Some(&first) = iter.next() else {
        return out;
    };
    out.push(first);

    let mut prev = first;
    for &value in iter {
        prev = value * alpha + prev * (1.0 - alpha);
        out.push(prev);
    }

    out
}

/// Span-style EMA, the convention MACD uses.
pub fn ema_span(values: &[f64], span: usize) -> Vec<f64> {
    ema(values, Smoothing::Span(span))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alpha_conventions() {
        assert!((Smoothing::Span(9).alpha() - 0.2).abs() < 1e-12);
        assert!((Smoothing::CenterOfMass(2.0).alpha() - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_first_value_seeds_ema() {
        let out = ema_span(&[10.0, 20.0], 3);
        assert_eq!(out[0], 10.0);
        // alpha = 0.5
        assert!((out[1] - 15.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_input() {
        assert!(ema_span(&[], 12).is_empty());
    }

    #[test]
    fn test_ema_is_causal() {
        let base: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0).collect();
        let mut mutated = base.clone();
        for v in mutated.iter_mut().skip(40) {
            *v *= 3.0;
        }

        let a = ema(&base, Smoothing::Span(26));
        let b = ema(&mutated, Smoothing::Span(26));
        for i in 0..40 {
            assert_eq!(a[i].to_bits(), b[i].to_bits(), "prefix changed at {}", i);
        }
        assert_ne!(a[59], b[59]);
    }
}
