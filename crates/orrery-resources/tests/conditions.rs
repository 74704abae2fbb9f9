//! Condition solving against resources backed by real cells.
//!
//! Covers the documented crossing example, agreement between the exact
//! linear solver and the secant solver on a black box that happens to be
//! linear, window properties over seeded random lines, and black boxes
//! too long to approximate in one pass.

#![allow(clippy::unwrap_used, clippy::float_cmp)]

use std::sync::Arc;

use orrery_resources::resource::{constant, from_cell};
use orrery_resources::{
    BlackBox, BlackBoxCondition, Comparison, Condition, Dynamics, Expiry, RealCondition, RealDynamics,
    SamplingStrategy, SharedResource, not, solve_linear,
};
use orrery_timeline::{Accumulator, AccumulatorEffect, AccumulatorState, Event, Timeline, Topic};
use orrery_types::{Duration, Window, Windows};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn secs(n: i64) -> Duration {
    Duration::of(n, Duration::SECOND)
}

#[test]
fn linear_dynamics_step_by_five_seconds() {
    let stepped = RealDynamics::linear(10.0, 2.0).step(secs(5));
    assert_eq!(stepped.extract(), 20.0);
}

#[test]
fn greater_than_threshold_on_unit_ramp() {
    let timeline = Timeline::new();
    let querier = timeline.querier(timeline.origin());
    let ramp = constant(RealDynamics::linear(0.0, 1.0));
    let condition = RealCondition::greater_than(ramp, 5.0);
    let windows = condition
        .when_satisfied(&querier, Window::between(secs(0), secs(10)))
        .unwrap();
    assert_eq!(windows, Windows::from(Window::between(secs(5), secs(10))));
}

#[test]
fn accumulator_resource_answers_relative_to_the_query_node() {
    let mut timeline = Timeline::new();
    let topic: Topic<AccumulatorEffect> = Topic::new();
    let tank = timeline.allocate(
        AccumulatorState { value: 0.0, rate: 0.0 },
        Accumulator,
        |effect: &AccumulatorEffect| *effect,
        topic,
    );
    let level: SharedResource<RealDynamics> =
        from_cell(tank, |s: &AccumulatorState| RealDynamics::linear(s.value, s.rate));

    let filling = timeline
        .emit(timeline.origin(), Event::new(&topic, AccumulatorEffect::add_rate(2.0)))
        .unwrap();
    let later = timeline.wait(filling, secs(3)).unwrap();

    // Level is 6 at the later node and crosses 10 two seconds after it.
    let full = RealCondition::new(level, Comparison::GreaterOrEqual, 10.0);
    let next = full
        .next_satisfied(&timeline.querier(later), Window::between(Duration::ZERO, secs(60)))
        .unwrap();
    assert_eq!(next, Some(secs(2)));
}

#[test]
fn secant_solver_agrees_with_exact_solver_on_lines() {
    let timeline = Timeline::new();
    let querier = timeline.querier(timeline.origin());
    let horizon = Window::between(secs(0), secs(100));
    let sampling = SamplingStrategy::uniform(secs(7)).unwrap();

    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..50 {
        let initial = f64::from(rng.random_range(-50_i32..50));
        let rate = f64::from(rng.random_range(-4_i32..=4));
        let threshold = f64::from(rng.random_range(-100_i32..100));

        let exact = solve_linear(RealDynamics::linear(initial, rate), Comparison::GreaterThan, threshold, horizon);
        let black_box: SharedResource<BlackBox> =
            constant(BlackBox::new(move |t| rate.mul_add(t.ratio_over(Duration::SECOND), initial)));
        let approximated = BlackBoxCondition::new(black_box, Comparison::GreaterThan, threshold, sampling.clone())
            .when_satisfied(&querier, horizon)
            .unwrap();
        assert_eq!(approximated, exact, "initial={initial} rate={rate} threshold={threshold}");
    }
}

#[test]
fn solved_windows_stay_inside_the_horizon_and_satisfy_the_comparison() {
    let mut rng = StdRng::seed_from_u64(5);
    let comparisons = [
        Comparison::GreaterThan,
        Comparison::GreaterOrEqual,
        Comparison::LessThan,
        Comparison::LessOrEqual,
    ];
    for _ in 0..500 {
        let line = RealDynamics::linear(rng.random_range(-10.0..10.0), rng.random_range(-3.0..3.0));
        let threshold = rng.random_range(-20.0..20.0);
        let comparison = *comparisons.get(rng.random_range(0..comparisons.len())).unwrap();
        let start = secs(rng.random_range(-5..5));
        let horizon = Window::between(start, start.saturating_plus(secs(rng.random_range(0..20))));

        let windows = solve_linear(line, comparison, threshold, horizon);
        assert!(Windows::from(horizon).includes(&windows));
        assert!(windows.len() <= 1);
        if let Some(window) = windows.first() {
            // Interior points strictly satisfy the comparison; the closure
            // may add the crossing instant itself.
            let half = Duration::from_micros(window.duration().micros().checked_div(2).unwrap());
            let middle = window.start().saturating_plus(half);
            if window.duration() > Duration::MILLISECOND {
                assert!(comparison.holds(line.step(middle).extract(), threshold));
            }
        }
    }
}

#[test]
fn conditions_are_object_safe() {
    let ramp = constant(RealDynamics::linear(0.0, 1.0));
    let shared: Arc<dyn Condition> = Arc::new(RealCondition::less_than(ramp, 1.0));
    let timeline = Timeline::new();
    let windows = shared
        .when_satisfied(&timeline.querier(timeline.origin()), Window::between(secs(0), secs(4)))
        .unwrap();
    assert_eq!(windows, Windows::from(Window::between(secs(0), secs(1))));
}

#[test]
fn truncated_black_box_expires_where_sampling_stopped() {
    let mut timeline = Timeline::new();
    let ticks: Topic<AccumulatorEffect> = Topic::new();
    let clock = timeline.allocate(
        AccumulatorState { value: 0.0, rate: 1.0 },
        Accumulator,
        |effect: &AccumulatorEffect| *effect,
        ticks,
    );
    let elapsed: SharedResource<BlackBox> = from_cell(clock, |s: &AccumulatorState| {
        let origin = s.value;
        BlackBox::new(move |t| origin + t.ratio_over(Duration::SECOND))
    });
    let late = BlackBoxCondition::new(
        elapsed,
        Comparison::GreaterThan,
        150_000.0,
        SamplingStrategy::uniform(Duration::SECOND).unwrap(),
    );

    // One pass covers only the first 100000 one-second segments.
    let first = late
        .evaluate(&timeline.querier(timeline.origin()), Window::between(secs(0), secs(200_000)))
        .unwrap();
    assert!(first.windows.is_empty());
    assert_eq!(first.expiry, Expiry::at(secs(100_000)));

    // Solving again from the expiry finds the crossing.
    let resumed = timeline.wait(timeline.origin(), secs(100_000)).unwrap();
    let second = late
        .evaluate(&timeline.querier(resumed), Window::between(secs(0), secs(100_000)))
        .unwrap();
    assert_eq!(second.expiry, Expiry::NEVER);
    let crossing = second.windows.min_time_point().unwrap();
    assert!(crossing >= secs(50_000));
    assert!(crossing <= secs(50_000).saturating_plus(Duration::EPSILON));
    assert_eq!(second.windows.max_time_point(), Some(secs(100_000)));
}

#[test]
fn negation_is_the_microsecond_complement() {
    let timeline = Timeline::new();
    let querier = timeline.querier(timeline.origin());
    let horizon = Window::between(secs(0), secs(10));
    let ramp = || constant(RealDynamics::linear(0.0, 1.0));

    let negated = not(Arc::new(RealCondition::greater_than(ramp(), 5.0)))
        .when_satisfied(&querier, horizon)
        .unwrap();
    let at_most = RealCondition::new(ramp(), Comparison::LessOrEqual, 5.0)
        .when_satisfied(&querier, horizon)
        .unwrap();

    // The closure of `> 5` already holds the crossing, so its complement
    // stops one microsecond short of it.
    assert_eq!(
        negated,
        Windows::from(Window::between(secs(0), secs(5).saturating_minus(Duration::EPSILON)))
    );
    assert_eq!(at_most, Windows::from(Window::between(secs(0), secs(5))));
}
