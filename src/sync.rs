//! Tempo correction for narration audio.
//!
//! The narration comes back from text-to-speech at whatever length the voice
//! engine decides, so before muxing we stretch it to the video's timeline.
//! FFmpeg's `atempo` filter only accepts factors in `[0.5, 2.0]`, which means
//! larger corrections have to be expressed as a chain of filters.

use std::fmt;

/// Smallest factor a single `atempo` stage accepts.
pub const MIN_FACTOR: f64 = 0.5;

/// Largest factor a single `atempo` stage accepts.
pub const MAX_FACTOR: f64 = 2.0;

/// Slack around the range bounds so values like 2.0000000001 don't add a stage.
const EPSILON: f64 = 1e-9;

/// Decimal digits kept on the final (remainder) factor.
const PRECISION_DIGITS: i32 = 6;

/// How much faster (> 1) or slower (< 1) the audio must play to match the video.
///
/// Always finite and strictly positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoRatio(f64);

impl TempoRatio {
    pub const IDENTITY: TempoRatio = TempoRatio(1.0);

    /// Wrap a raw ratio, collapsing anything non-finite or non-positive to identity.
    pub fn new(ratio: f64) -> Self {
        if ratio.is_finite() && ratio > 0.0 {
            TempoRatio(ratio)
        } else {
            Self::IDENTITY
        }
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn is_identity(&self) -> bool {
        self.0 == 1.0
    }
}

impl Default for TempoRatio {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl fmt::Display for TempoRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}x", self.0)
    }
}

fn usable_duration(seconds: Option<f64>) -> Option<f64> {
    seconds.filter(|s| s.is_finite() && *s > 0.0)
}

/// Compute the tempo ratio that makes audio of `audio` seconds last `video` seconds.
///
/// Missing, zero, negative, or non-finite durations yield the identity ratio.
pub fn compute_ratio(video: Option<f64>, audio: Option<f64>) -> TempoRatio {
    match (usable_duration(video), usable_duration(audio)) {
        (Some(v), Some(a)) => TempoRatio::new(v / a),
        _ => TempoRatio::IDENTITY,
    }
}

/// Ordered `atempo` factors whose product is the target ratio.
///
/// Never empty; every factor lies in `[MIN_FACTOR, MAX_FACTOR]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterChain {
    factors: Vec<f64>,
}

impl FilterChain {
    pub fn factors(&self) -> &[f64] {
        &self.factors
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    /// Combined stretch applied by the whole chain.
    pub fn product(&self) -> f64 {
        self.factors.iter().product()
    }

    /// Render as a single comma-joined FFmpeg audio filter expression.
    pub fn to_filter_expr(&self) -> String {
        self.factors
            .iter()
            .map(|f| format!("atempo={f:.6}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_filter_expr())
    }
}

fn round_factor(value: f64) -> f64 {
    let scale = 10f64.powi(PRECISION_DIGITS);
    (value * scale).round() / scale
}

/// Decompose `ratio` into `atempo` stages using x2 / x0.5 steps.
///
/// Invalid ratios collapse to the identity chain `[1.0]`, and a ratio of 1.0
/// still yields one stage.
pub fn build_chain(ratio: f64) -> FilterChain {
    if !ratio.is_finite() || ratio <= 0.0 {
        return FilterChain { factors: vec![1.0] };
    }

    let mut factors = Vec::new();
    let mut remaining = ratio;

    while remaining > MAX_FACTOR + EPSILON {
        factors.push(MAX_FACTOR);
        remaining /= MAX_FACTOR;
    }
    while remaining < MIN_FACTOR - EPSILON {
        factors.push(MIN_FACTOR);
        remaining /= MIN_FACTOR;
    }

    factors.push(round_factor(remaining).clamp(MIN_FACTOR, MAX_FACTOR));

    FilterChain { factors }
}
