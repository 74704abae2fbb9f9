//! Conditions: predicates over resources, solved for the time they hold.
//!
//! A [`Condition`] is evaluated at a history node over a horizon of time
//! offsets relative to that node. It answers with the [`Windows`] during
//! which it holds and with the [`Expiry`] of the dynamics it looked at;
//! past the expiry the answer says nothing, so windows are clipped to it.
//!
//! # Boundary policy
//!
//! Windows are the closure of the satisfying set, rounded inward to whole
//! microseconds, then clipped to the horizon with both ends inclusive.
//! `linear(0, 1) > 5` over `[0s, 10s]` is therefore `[5s, 10s]`, and `>`
//! and `>=` give the same windows.

use core::cmp::Ordering;
use core::fmt;
use std::sync::Arc;

use orrery_timeline::Querier;
use orrery_types::{Duration, Window, Windows};
use serde::{Deserialize, Serialize};

use crate::dynamics::{BlackBox, Discrete, Expiry, RealDynamics};
use crate::error::ResourceError;
use crate::resource::SharedResource;
use crate::secant::{SamplingStrategy, approximate};

/// Result of evaluating a [`Condition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Satisfaction {
    /// Offsets from the query node at which the condition holds.
    pub windows: Windows,
    /// When the answer has to be recomputed.
    pub expiry: Expiry,
}

impl Satisfaction {
    /// An answer that never expires.
    pub const fn persistent(windows: Windows) -> Self {
        Self {
            windows,
            expiry: Expiry::NEVER,
        }
    }
}

/// A predicate over resources that can be solved for when it holds.
pub trait Condition: Send + Sync {
    /// Solve the condition over `horizon`, given as offsets from the
    /// querier's node.
    fn evaluate(&self, querier: &Querier<'_>, horizon: Window) -> Result<Satisfaction, ResourceError>;

    /// Windows within `horizon` during which the condition holds.
    fn when_satisfied(&self, querier: &Querier<'_>, horizon: Window) -> Result<Windows, ResourceError> {
        Ok(self.evaluate(querier, horizon)?.windows)
    }

    /// Earliest offset within `horizon` at which the condition holds.
    fn next_satisfied(&self, querier: &Querier<'_>, horizon: Window) -> Result<Option<Duration>, ResourceError> {
        Ok(self.when_satisfied(querier, horizon)?.min_time_point())
    }
}

/// Shared handle to a condition.
pub type SharedCondition = Arc<dyn Condition>;

/// The part of `horizon` over which dynamics with `expiry` are known.
fn valid_part(horizon: Window, expiry: Expiry) -> Window {
    horizon.greatest_lower_bound(&Window::between(Duration::MIN_VALUE, expiry.bound()))
}

// ----------------------------------------------------------------------
// Comparisons and linear solving
// ----------------------------------------------------------------------

/// Relation between a value and a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// `value > threshold`
    GreaterThan,
    /// `value >= threshold`
    GreaterOrEqual,
    /// `value < threshold`
    LessThan,
    /// `value <= threshold`
    LessOrEqual,
}

impl Comparison {
    /// Whether `value` stands in this relation to `threshold`.
    pub fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::GreaterThan => value > threshold,
            Self::GreaterOrEqual => value >= threshold,
            Self::LessThan => value < threshold,
            Self::LessOrEqual => value <= threshold,
        }
    }

    const fn is_upper(self) -> bool {
        matches!(self, Self::GreaterThan | Self::GreaterOrEqual)
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::GreaterThan => ">",
            Self::GreaterOrEqual => ">=",
            Self::LessThan => "<",
            Self::LessOrEqual => "<=",
        })
    }
}

/// Solve `dynamics <comparison> threshold` exactly over `horizon`.
///
/// The crossing instant is `(threshold - initial) / rate` seconds. Which
/// side of it satisfies the comparison depends on the sign of the rate.
pub fn solve_linear(dynamics: RealDynamics, comparison: Comparison, threshold: f64, horizon: Window) -> Windows {
    if horizon.is_empty() {
        return Windows::new();
    }
    let ascending = match dynamics.rate.partial_cmp(&0.0) {
        Some(Ordering::Greater) => true,
        Some(Ordering::Less) => false,
        _ => {
            return if comparison.holds(dynamics.initial, threshold) {
                Windows::from(horizon)
            } else {
                Windows::new()
            };
        }
    };

    let crossing = (threshold - dynamics.initial) / dynamics.rate;
    let satisfied = if comparison.is_upper() == ascending {
        Window::between(Duration::round_upward(crossing, Duration::SECOND), Duration::MAX_VALUE)
    } else {
        Window::between(Duration::MIN_VALUE, Duration::round_downward(crossing, Duration::SECOND))
    };
    Windows::from(satisfied.greatest_lower_bound(&horizon))
}

// ----------------------------------------------------------------------
// Real conditions
// ----------------------------------------------------------------------

/// Compares a linear resource against a fixed threshold.
pub struct RealCondition {
    resource: SharedResource<RealDynamics>,
    comparison: Comparison,
    threshold: f64,
}

impl RealCondition {
    /// `resource <comparison> threshold`.
    pub fn new(resource: SharedResource<RealDynamics>, comparison: Comparison, threshold: f64) -> Self {
        Self {
            resource,
            comparison,
            threshold,
        }
    }

    /// `resource > threshold`.
    pub fn greater_than(resource: SharedResource<RealDynamics>, threshold: f64) -> Self {
        Self::new(resource, Comparison::GreaterThan, threshold)
    }

    /// `resource < threshold`.
    pub fn less_than(resource: SharedResource<RealDynamics>, threshold: f64) -> Self {
        Self::new(resource, Comparison::LessThan, threshold)
    }
}

impl Condition for RealCondition {
    fn evaluate(&self, querier: &Querier<'_>, horizon: Window) -> Result<Satisfaction, ResourceError> {
        let delimited = self.resource.get_dynamics(querier)?;
        let valid = valid_part(horizon, delimited.expiry);
        Ok(Satisfaction {
            windows: solve_linear(delimited.dynamics, self.comparison, self.threshold, valid),
            expiry: delimited.expiry,
        })
    }
}

impl fmt::Debug for RealCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RealCondition(resource {} {})", self.comparison, self.threshold)
    }
}

// ----------------------------------------------------------------------
// Black-box conditions
// ----------------------------------------------------------------------

/// Compares a black-box resource against a threshold by solving a secant
/// approximation of it segment by segment.
pub struct BlackBoxCondition {
    resource: SharedResource<BlackBox>,
    comparison: Comparison,
    threshold: f64,
    sampling: SamplingStrategy,
}

impl BlackBoxCondition {
    /// `resource <comparison> threshold`, approximated with `sampling`.
    pub fn new(
        resource: SharedResource<BlackBox>,
        comparison: Comparison,
        threshold: f64,
        sampling: SamplingStrategy,
    ) -> Self {
        Self {
            resource,
            comparison,
            threshold,
            sampling,
        }
    }
}

impl Condition for BlackBoxCondition {
    fn evaluate(&self, querier: &Querier<'_>, horizon: Window) -> Result<Satisfaction, ResourceError> {
        let delimited = self.resource.get_dynamics(querier)?;
        let valid = valid_part(horizon, delimited.expiry);
        let approximation = approximate(&delimited.dynamics, valid, delimited.expiry, &self.sampling);
        // Past a truncated approximation the answer is unknown, not false.
        let expiry = delimited.expiry.min(approximation.expiry());
        let windows = approximation
            .segments
            .into_iter()
            .map(|(segment, line)| solve_linear(line, self.comparison, self.threshold, segment))
            .fold(Windows::new(), |acc, piece| acc.union(&piece));
        Ok(Satisfaction { windows, expiry })
    }
}

// ----------------------------------------------------------------------
// Discrete conditions
// ----------------------------------------------------------------------

/// Holds while a discrete resource takes one of a finite set of values.
pub struct DiscreteCondition<T> {
    resource: SharedResource<Discrete<T>>,
    accepted: Vec<T>,
}

impl<T> DiscreteCondition<T> {
    /// Holds while `resource == value`.
    pub fn equal_to(resource: SharedResource<Discrete<T>>, value: T) -> Self {
        Self {
            resource,
            accepted: vec![value],
        }
    }

    /// Holds while `resource` is one of `values`.
    pub fn one_of<I: IntoIterator<Item = T>>(resource: SharedResource<Discrete<T>>, values: I) -> Self {
        Self {
            resource,
            accepted: values.into_iter().collect(),
        }
    }
}

impl<T: PartialEq + Send + Sync> Condition for DiscreteCondition<T> {
    fn evaluate(&self, querier: &Querier<'_>, horizon: Window) -> Result<Satisfaction, ResourceError> {
        let delimited = self.resource.get_dynamics(querier)?;
        let windows = if self.accepted.contains(&delimited.dynamics.0) {
            Windows::from(valid_part(horizon, delimited.expiry))
        } else {
            Windows::new()
        };
        Ok(Satisfaction {
            windows,
            expiry: delimited.expiry,
        })
    }
}

// ----------------------------------------------------------------------
// Combinators
// ----------------------------------------------------------------------

enum Junction {
    And,
    Or,
}

struct Combined {
    junction: Junction,
    left: SharedCondition,
    right: SharedCondition,
}

impl Condition for Combined {
    fn evaluate(&self, querier: &Querier<'_>, horizon: Window) -> Result<Satisfaction, ResourceError> {
        let left = self.left.evaluate(querier, horizon)?;
        let right = self.right.evaluate(querier, horizon)?;
        let expiry = left.expiry.min(right.expiry);
        let windows = match self.junction {
            Junction::And => left.windows.intersect(&right.windows),
            Junction::Or => left.windows.union(&right.windows),
        };
        Ok(Satisfaction {
            windows: windows.intersect_window(&valid_part(horizon, expiry)),
            expiry,
        })
    }
}

struct Negated(SharedCondition);

impl Condition for Negated {
    fn evaluate(&self, querier: &Querier<'_>, horizon: Window) -> Result<Satisfaction, ResourceError> {
        let inner = self.0.evaluate(querier, horizon)?;
        Ok(Satisfaction {
            windows: inner.windows.complement(&valid_part(horizon, inner.expiry)),
            expiry: inner.expiry,
        })
    }
}

/// Holds when both conditions hold.
pub fn and(left: SharedCondition, right: SharedCondition) -> SharedCondition {
    Arc::new(Combined {
        junction: Junction::And,
        left,
        right,
    })
}

/// Holds when either condition holds.
pub fn or(left: SharedCondition, right: SharedCondition) -> SharedCondition {
    Arc::new(Combined {
        junction: Junction::Or,
        left,
        right,
    })
}

/// Holds when the condition does not.
///
/// The result is the complement of the inner windows on the microsecond
/// line. Inner windows are closed, so a crossing instant they include is
/// excluded here: `not(x > 5)` over a unit ramp holds on `[0, 5s - 1us]`,
/// while `x <= 5` holds on `[0, 5s]`. Write the comparison directly when
/// the boundary matters.
pub fn not(condition: SharedCondition) -> SharedCondition {
    Arc::new(Negated(condition))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use orrery_timeline::{Register, RegisterEffect, RegisterState, Timeline, TimelineError, Topic};
    use orrery_types::StringValueMapper;

    use super::*;
    use crate::dynamics::DelimitedDynamics;
    use crate::resource::{constant, from_cell};

    fn secs(n: i64) -> Duration {
        Duration::of(n, Duration::SECOND)
    }

    fn span(a: i64, b: i64) -> Window {
        Window::between(secs(a), secs(b))
    }

    #[test]
    fn rising_line_crosses_at_threshold() {
        let line = RealDynamics::linear(0.0, 1.0);
        let horizon = span(0, 10);
        assert_eq!(solve_linear(line, Comparison::GreaterThan, 5.0, horizon), Windows::from(span(5, 10)));
        assert_eq!(solve_linear(line, Comparison::GreaterOrEqual, 5.0, horizon), Windows::from(span(5, 10)));
        assert_eq!(solve_linear(line, Comparison::LessThan, 5.0, horizon), Windows::from(span(0, 5)));
    }

    #[test]
    fn falling_line_mirrors_rising_line() {
        let line = RealDynamics::linear(10.0, -2.0);
        let horizon = span(0, 10);
        assert_eq!(solve_linear(line, Comparison::GreaterThan, 4.0, horizon), Windows::from(span(0, 3)));
        assert_eq!(solve_linear(line, Comparison::LessOrEqual, 4.0, horizon), Windows::from(span(3, 10)));
    }

    #[test]
    fn flat_line_is_all_or_nothing() {
        let line = RealDynamics::constant(3.0);
        assert_eq!(solve_linear(line, Comparison::GreaterThan, 2.0, span(0, 4)), Windows::from(span(0, 4)));
        assert!(solve_linear(line, Comparison::GreaterThan, 3.0, span(0, 4)).is_empty());
        assert!(solve_linear(line, Comparison::LessThan, 9.0, Window::EMPTY).is_empty());
    }

    #[test]
    fn crossing_rounds_inward_to_whole_microseconds() {
        // Crosses at 1/3 s.
        let line = RealDynamics::linear(0.0, 3.0);
        let above = solve_linear(line, Comparison::GreaterThan, 1.0, span(0, 1));
        let below = solve_linear(line, Comparison::LessThan, 1.0, span(0, 1));
        assert_eq!(above.min_time_point(), Some(Duration::from_micros(333_334)));
        assert_eq!(below.max_time_point(), Some(Duration::from_micros(333_333)));
    }

    #[test]
    fn crossing_outside_horizon_gives_empty_or_whole() {
        let line = RealDynamics::linear(0.0, 1.0);
        assert!(solve_linear(line, Comparison::GreaterThan, 50.0, span(0, 10)).is_empty());
        assert_eq!(solve_linear(line, Comparison::GreaterThan, -5.0, span(0, 10)), Windows::from(span(0, 10)));
    }

    #[test]
    fn real_condition_clips_to_expiry() {
        let resource: SharedResource<RealDynamics> = Arc::new(|_: &Querier<'_>| -> Result<_, TimelineError> {
            Ok(DelimitedDynamics::delimited(Expiry::at(secs(7)), RealDynamics::linear(0.0, 1.0)))
        });
        let timeline = Timeline::new();
        let q = timeline.querier(timeline.origin());
        let result = RealCondition::greater_than(resource, 5.0).evaluate(&q, span(0, 10)).unwrap();
        assert_eq!(result.windows, Windows::from(span(5, 7)));
        assert_eq!(result.expiry, Expiry::at(secs(7)));
    }

    #[test]
    fn combinators_follow_window_algebra() {
        let timeline = Timeline::new();
        let q = timeline.querier(timeline.origin());
        let line = constant(RealDynamics::linear(0.0, 1.0));
        let above: SharedCondition = Arc::new(RealCondition::greater_than(Arc::clone(&line), 2.0));
        let below: SharedCondition = Arc::new(RealCondition::less_than(line, 6.0));

        let both = and(Arc::clone(&above), Arc::clone(&below));
        assert_eq!(both.when_satisfied(&q, span(0, 10)).unwrap(), Windows::from(span(2, 6)));

        let either = or(Arc::clone(&above), Arc::clone(&below));
        assert_eq!(either.when_satisfied(&q, span(0, 10)).unwrap(), Windows::from(span(0, 10)));

        let outside = not(both);
        let expected: Windows = [
            Window::between(secs(0), secs(2).saturating_minus(Duration::EPSILON)),
            Window::between(secs(6).saturating_plus(Duration::EPSILON), secs(10)),
        ]
        .into_iter()
        .collect();
        assert_eq!(outside.when_satisfied(&q, span(0, 10)).unwrap(), expected);
        assert_eq!(above.next_satisfied(&q, span(0, 10)).unwrap(), Some(secs(2)));
    }

    #[test]
    fn discrete_condition_checks_membership() {
        let mut timeline = Timeline::new();
        let topic: Topic<String> = Topic::new();
        let cell = timeline.allocate(
            RegisterState {
                value: "off".to_owned(),
                conflicted: false,
            },
            Register::new(StringValueMapper),
            |value: &String| RegisterEffect::set(value.clone()),
            topic,
        );
        let mode = from_cell(cell, |state: &RegisterState<String>| Discrete(state.value.clone()));
        let q = timeline.querier(timeline.origin());

        let is_on = DiscreteCondition::equal_to(Arc::clone(&mode), "on".to_owned());
        assert!(is_on.when_satisfied(&q, span(0, 5)).unwrap().is_empty());

        let is_known = DiscreteCondition::one_of(mode, ["on".to_owned(), "off".to_owned()]);
        assert_eq!(is_known.when_satisfied(&q, span(0, 5)).unwrap(), Windows::from(span(0, 5)));
    }
}
