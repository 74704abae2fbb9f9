//! Piecewise-linear approximation of black-box resources.
//!
//! A black box can only be sampled, so conditions over it are solved on a
//! chain of secants: straight lines through samples taken at the start and
//! end of each segment. Segment length comes from a [`SamplingStrategy`],
//! either a fixed period or an adaptive one that looks for the longest
//! segment whose estimated error stays under a bound.

use orrery_types::{Duration, Window};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dynamics::{BlackBox, Dynamics as _, Expiry, RealDynamics};
use crate::error::ResourceError;

/// Most segments produced for one approximation.
const MAX_SEGMENTS: usize = 100_000;

/// Bisection steps in the adaptive interval search.
const ROOT_FIND_ITERATIONS: usize = 100;

/// Bounds for adaptive sampling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SecantConfig {
    /// Largest acceptable error of a secant over its segment.
    #[serde(default = "default_max_error")]
    pub max_error: f64,
    /// Shortest segment.
    #[serde(default = "default_min_sample_period", with = "orrery_types::duration::text")]
    pub min_sample_period: Duration,
    /// Longest segment.
    #[serde(default = "default_max_sample_period", with = "orrery_types::duration::text")]
    pub max_sample_period: Duration,
}

const fn default_max_error() -> f64 {
    1e-3
}

const fn default_min_sample_period() -> Duration {
    Duration::SECOND
}

const fn default_max_sample_period() -> Duration {
    Duration::HOUR
}

impl Default for SecantConfig {
    fn default() -> Self {
        Self {
            max_error: default_max_error(),
            min_sample_period: default_min_sample_period(),
            max_sample_period: default_max_sample_period(),
        }
    }
}

impl SecantConfig {
    /// Check that the bounds describe a usable search.
    pub fn validate(&self) -> Result<(), ResourceError> {
        let invalid = |reason: &str| {
            Err(ResourceError::InvalidSecantConfig {
                reason: reason.to_owned(),
            })
        };
        if self.max_error.is_nan() || self.max_error <= 0.0 {
            return invalid("max_error must be positive");
        }
        if !self.min_sample_period.is_positive() {
            return invalid("min_sample_period must be positive");
        }
        if self.max_sample_period.shorter_than(self.min_sample_period) {
            return invalid("max_sample_period must be at least min_sample_period");
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Error estimates
// ----------------------------------------------------------------------

/// Ways to estimate how far a secant strays from the function it replaces.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorEstimate {
    /// Fit a quadratic at the segment midpoint from finite differences and
    /// take the largest gap between it and the secant.
    Quadratic,
    /// Sample the gap between function and secant at evenly spaced points.
    SampledMaximum {
        /// Interior points sampled.
        samples: u32,
    },
    /// Treat the error bound as relative to the value at the midpoint.
    /// `epsilon` keeps the bound from collapsing near zero.
    Relative {
        /// Absolute estimate being scaled.
        inner: Box<ErrorEstimate>,
        /// Smallest magnitude treated as distinct from zero.
        epsilon: f64,
    },
}

impl ErrorEstimate {
    /// A relative version of `inner`.
    pub fn relative(inner: Self, epsilon: f64) -> Self {
        Self::Relative {
            inner: Box::new(inner),
            epsilon,
        }
    }

    /// Estimated error of the secant over the first `interval` seconds of
    /// `dynamics`, scaled so that comparing against `max_error` is
    /// meaningful.
    pub fn estimate(&self, dynamics: &BlackBox, interval: f64, max_error: f64) -> f64 {
        match self {
            Self::Quadratic => quadratic_error(dynamics, interval),
            Self::SampledMaximum { samples } => sampled_error(dynamics, interval, *samples),
            Self::Relative { inner, epsilon } => {
                let magnitude = dynamics.value_at(seconds(interval / 2.0)).abs();
                let absolute_bound = max_error * (magnitude + epsilon);
                if absolute_bound > 0.0 {
                    inner.estimate(dynamics, interval, absolute_bound) * max_error / absolute_bound
                } else {
                    f64::INFINITY
                }
            }
        }
    }
}

fn seconds(quantity: f64) -> Duration {
    Duration::round_nearest(quantity, Duration::SECOND)
}

fn quadratic_error(dynamics: &BlackBox, interval: f64) -> f64 {
    let half = interval / 2.0;
    let step = interval / 4.0;
    let at = |t: f64| dynamics.value_at(seconds(t));

    // Second-order expansion around the midpoint: a x^2 + b x + c with
    // x measured from the midpoint, minus the secant.
    let (before, middle, after) = (at(half - step), at(half), at(half + step));
    let slope = (after - before) / (2.0 * step);
    let curvature = (-2.0_f64).mul_add(middle, after + before) / (step * step);

    let line = secant(dynamics, seconds(interval));
    let secant_middle = line.rate.mul_add(half, line.initial);
    let a = curvature / 2.0;
    let b = slope - line.rate;
    let c = middle - secant_middle;

    let gap = |x: f64| a.mul_add(x * x, b.mul_add(x, c)).abs();
    let mut worst = gap(-half).max(gap(half));
    if a.abs() > f64::EPSILON {
        let extremum = -b / (2.0 * a);
        if extremum.abs() < half {
            worst = worst.max(gap(extremum));
        }
    }
    worst
}

fn sampled_error(dynamics: &BlackBox, interval: f64, samples: u32) -> f64 {
    let line = secant(dynamics, seconds(interval));
    let steps = samples.saturating_add(1);
    (1..steps)
        .map(|i| {
            let t = interval * f64::from(i) / f64::from(steps);
            (dynamics.value_at(seconds(t)) - line.value_at(seconds(t))).abs()
        })
        .fold(0.0, f64::max)
}

/// The line through `dynamics` now and `interval` from now.
pub fn secant(dynamics: &BlackBox, interval: Duration) -> RealDynamics {
    let start = dynamics.value_at(Duration::ZERO);
    if !interval.is_positive() {
        return RealDynamics::constant(start);
    }
    let end = dynamics.value_at(interval);
    RealDynamics::linear(start, (end - start) / interval.ratio_over(Duration::SECOND))
}

// ----------------------------------------------------------------------
// Sampling strategies
// ----------------------------------------------------------------------

/// How long each secant segment should be.
#[derive(Debug, Clone, PartialEq)]
pub enum SamplingStrategy {
    /// Every segment has the same length.
    Uniform {
        /// Segment length.
        period: Duration,
    },
    /// Segments are as long as the error estimate allows.
    Adaptive {
        /// Error bound and segment-length limits.
        config: SecantConfig,
        /// How segment error is estimated.
        estimate: ErrorEstimate,
    },
}

impl SamplingStrategy {
    /// Fixed-period sampling. The period must be positive.
    pub fn uniform(period: Duration) -> Result<Self, ResourceError> {
        if !period.is_positive() {
            return Err(ResourceError::InvalidSecantConfig {
                reason: format!("sampling period {period} must be positive"),
            });
        }
        Ok(Self::Uniform { period })
    }

    /// Error-bounded sampling.
    pub fn adaptive(config: SecantConfig, estimate: ErrorEstimate) -> Result<Self, ResourceError> {
        config.validate()?;
        Ok(Self::Adaptive { config, estimate })
    }

    /// Length of the next segment of `dynamics`, given that it stops being
    /// valid at `expiry`.
    pub fn interval(&self, dynamics: &BlackBox, expiry: Expiry) -> Duration {
        let limit = expiry.bound();
        let chosen = match self {
            Self::Uniform { period } => (*period).min(limit),
            Self::Adaptive { config, estimate } => {
                let lower = config.min_sample_period.min(limit);
                let upper = config.max_sample_period.min(limit);
                bounded_interval(dynamics, config.max_error, estimate, lower, upper)
            }
        };
        chosen.max(Duration::EPSILON)
    }
}

/// Longest interval in `[lower, upper]` whose error estimate stays within
/// `max_error`, by bisection on `max_error - estimate(t)`.
fn bounded_interval(
    dynamics: &BlackBox,
    max_error: f64,
    estimate: &ErrorEstimate,
    lower: Duration,
    upper: Duration,
) -> Duration {
    let slack = |t: f64| max_error - estimate.estimate(dynamics, t, max_error);
    let (mut lo, mut hi) = (lower.ratio_over(Duration::SECOND), upper.ratio_over(Duration::SECOND));
    let (slack_lo, slack_hi) = (slack(lo), slack(hi));

    if slack_hi >= 0.0 {
        return upper;
    }
    if slack_lo.is_nan() || slack_lo < 0.0 {
        debug!(%lower, "secant error bound exceeded at the shortest interval");
        return lower;
    }
    for _ in 0..ROOT_FIND_ITERATIONS {
        let mid = lo + (hi - lo) / 2.0;
        if slack(mid) >= 0.0 {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo < 1e-6 {
            break;
        }
    }
    Duration::round_downward(lo, Duration::SECOND).max(lower).min(upper)
}

/// Secant segments over a horizon.
#[derive(Debug, Clone, PartialEq)]
pub struct Approximation {
    /// Segments in order, each with the line that replaces the black box
    /// over it.
    pub segments: Vec<(Window, RealDynamics)>,
    /// End of the last segment when the segment cap stopped the
    /// approximation short of the horizon.
    pub truncated_at: Option<Duration>,
}

impl Approximation {
    /// How long the segments describe the black box. Past a truncation
    /// point nothing is known, so the approximation expires there.
    pub const fn expiry(&self) -> Expiry {
        match self.truncated_at {
            Some(end) => Expiry::at(end),
            None => Expiry::NEVER,
        }
    }
}

/// Cover `horizon` with secant segments of `dynamics`.
///
/// Lines are expressed in the same offsets as `horizon`: the line for
/// segment `[s, e]` is extrapolated back to offset zero, so it can be
/// solved over `[s, e]` unchanged. At most `MAX_SEGMENTS` segments are
/// produced; when the cap is hit the result records where it stopped.
pub fn approximate(
    dynamics: &BlackBox,
    horizon: Window,
    expiry: Expiry,
    strategy: &SamplingStrategy,
) -> Approximation {
    let mut segments = Vec::new();
    let mut truncated_at = None;
    if horizon.is_empty() {
        return Approximation { segments, truncated_at };
    }
    let mut cursor = horizon.start();
    loop {
        let here = dynamics.step(cursor);
        let remaining = horizon.end().saturating_minus(cursor);
        if !remaining.is_positive() {
            segments.push((Window::at(cursor), anchored(RealDynamics::constant(here.extract()), cursor)));
            break;
        }
        let length = strategy.interval(&here, expiry.minus(cursor)).min(remaining);
        let end = cursor.saturating_plus(length);
        segments.push((Window::between(cursor, end), anchored(secant(&here, length), cursor)));
        if end >= horizon.end() {
            break;
        }
        if segments.len() >= MAX_SEGMENTS {
            warn!(stopped = %end, horizon_end = %horizon.end(), "secant approximation truncated");
            truncated_at = Some(end);
            break;
        }
        cursor = end;
    }
    Approximation { segments, truncated_at }
}

/// Re-express a line whose origin is `origin` as one whose origin is zero.
fn anchored(line: RealDynamics, origin: Duration) -> RealDynamics {
    RealDynamics::linear((-line.rate).mul_add(origin.ratio_over(Duration::SECOND), line.initial), line.rate)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn secs(n: i64) -> Duration {
        Duration::of(n, Duration::SECOND)
    }

    fn square() -> BlackBox {
        BlackBox::new(|t| t.ratio_over(Duration::SECOND).powi(2))
    }

    #[test]
    fn config_validation_rejects_bad_bounds() {
        assert!(SecantConfig::default().validate().is_ok());
        let zero_error = SecantConfig {
            max_error: 0.0,
            ..SecantConfig::default()
        };
        assert!(zero_error.validate().is_err());
        let inverted = SecantConfig {
            min_sample_period: secs(10),
            max_sample_period: secs(1),
            ..SecantConfig::default()
        };
        assert!(matches!(
            inverted.validate(),
            Err(ResourceError::InvalidSecantConfig { .. })
        ));
        assert!(SamplingStrategy::uniform(Duration::ZERO).is_err());
    }

    #[test]
    fn secant_passes_through_both_samples() {
        let line = secant(&square(), secs(2));
        assert_eq!(line.initial, 0.0);
        assert_eq!(line.rate, 2.0);
    }

    #[test]
    fn quadratic_estimate_is_exact_for_parabolas() {
        // The secant of t^2 over [0, T] is off by T^2 / 4 at the midpoint.
        let error = ErrorEstimate::Quadratic.estimate(&square(), 4.0, 1.0);
        assert!((error - 4.0).abs() < 1e-9);
        let sampled = ErrorEstimate::SampledMaximum { samples: 7 }.estimate(&square(), 4.0, 1.0);
        assert!((sampled - 4.0).abs() < 1e-9);
    }

    #[test]
    fn adaptive_interval_respects_the_error_bound() {
        let config = SecantConfig {
            max_error: 0.25,
            min_sample_period: Duration::MILLISECOND,
            max_sample_period: secs(100),
        };
        let strategy = SamplingStrategy::adaptive(config, ErrorEstimate::Quadratic).unwrap();
        // T^2 / 4 <= 0.25 gives T <= 1s.
        let interval = strategy.interval(&square(), Expiry::NEVER);
        assert!(interval <= Duration::of(1_001, Duration::MILLISECOND));
        assert!(interval > Duration::of(990, Duration::MILLISECOND));

        let clipped = strategy.interval(&square(), Expiry::at(Duration::of(500, Duration::MILLISECOND)));
        assert_eq!(clipped, Duration::of(500, Duration::MILLISECOND));
    }

    #[test]
    fn linear_black_box_uses_the_longest_interval() {
        let line = BlackBox::new(|t| 3.0 * t.ratio_over(Duration::SECOND));
        let config = SecantConfig {
            max_error: 1e-6,
            min_sample_period: secs(1),
            max_sample_period: secs(60),
        };
        let strategy = SamplingStrategy::adaptive(config, ErrorEstimate::relative(ErrorEstimate::Quadratic, 1e-9)).unwrap();
        assert_eq!(strategy.interval(&line, Expiry::NEVER), secs(60));
    }

    #[test]
    fn uniform_segments_cover_the_horizon() {
        let strategy = SamplingStrategy::uniform(secs(3)).unwrap();
        let approximation = approximate(&square(), Window::between(secs(0), secs(10)), Expiry::NEVER, &strategy);
        assert_eq!(approximation.truncated_at, None);
        assert_eq!(approximation.expiry(), Expiry::NEVER);
        let segments = approximation.segments;
        let bounds: Vec<Window> = segments.iter().map(|(w, _)| *w).collect();
        assert_eq!(
            bounds,
            vec![
                Window::between(secs(0), secs(3)),
                Window::between(secs(3), secs(6)),
                Window::between(secs(6), secs(9)),
                Window::between(secs(9), secs(10)),
            ]
        );
        // Each line agrees with the function at both ends of its segment.
        for (window, line) in &segments {
            for t in [window.start(), window.end()] {
                let exact = t.ratio_over(Duration::SECOND).powi(2);
                assert!((line.value_at(t) - exact).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn capped_approximation_reports_where_it_stopped() {
        let strategy = SamplingStrategy::uniform(secs(1)).unwrap();
        let cap = i64::try_from(MAX_SEGMENTS).unwrap();
        let horizon = Window::between(secs(0), secs(cap.saturating_mul(2)));
        let approximation = approximate(&square(), horizon, Expiry::NEVER, &strategy);
        assert_eq!(approximation.segments.len(), MAX_SEGMENTS);
        assert_eq!(approximation.truncated_at, Some(secs(cap)));
        assert_eq!(approximation.expiry(), Expiry::at(secs(cap)));
    }
}
