//! Detector — the dominance-shift rule.

use crate::attribution::AttributionResult;

/// Verdict produced by applying the dominance-shift rule to an
/// [`AttributionResult`].
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    /// Whether at least one span was flagged.
    pub detected: bool,
    /// 0-based indices (into `untrusted_spans`) of flagged spans, in
    /// ascending order.
    pub flagged_span_indices: Vec<usize>,
    /// `max` normalized delta across flagged spans. `0.0` and meaningless
    /// when `detected` is `false` — never consulted in that case.
    pub dominant_delta: f64,
    /// The normalized user delta this verdict was computed against.
    pub user_delta: f64,
}

/// Apply the dominance-shift rule with margin `tau` to `attribution`.
///
/// Span `i` is flagged iff `span_deltas[i] > user_delta - tau` (strict;
/// ties do not flag). `tau` is clamped to `0.0` if negative — callers
/// validate `margin_tau >= 0` at configuration time, but this function
/// stays total.
#[must_use]
pub fn detect(attribution: &AttributionResult, tau: f64) -> DetectionResult {
    let tau = tau.max(0.0);
    let threshold = attribution.user_delta - tau;

    let flagged_span_indices: Vec<usize> = attribution
        .span_deltas
        .iter()
        .enumerate()
        .filter(|(_, delta)| **delta > threshold)
        .map(|(i, _)| i)
        .collect();

    let detected = !flagged_span_indices.is_empty();
    let dominant_delta = if detected {
        flagged_span_indices
            .iter()
            .map(|&i| attribution.span_deltas[i])
            .fold(f64::NEG_INFINITY, f64::max)
    } else {
        0.0
    };

    DetectionResult {
        detected,
        flagged_span_indices,
        dominant_delta,
        user_delta: attribution.user_delta,
    }
}
