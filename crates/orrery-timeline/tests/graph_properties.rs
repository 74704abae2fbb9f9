//! Property tests for event graphs over seeded random inputs.
//!
//! Covers the persistence encoding (`unflatten` is a left inverse of
//! `flatten` on fanout graphs) and the effect-algebra laws of the stock
//! cells when evaluated through whole graphs.

#![allow(clippy::unwrap_used)]

use orrery_timeline::{
    Counter, EffectTrait, Event, EventGraph, Register, RegisterEffect, RegisterState,
    SumEffectTrait, Timeline, Topic, flatten, unflatten,
};
use orrery_types::StringValueMapper;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A random fanout graph: a run of atoms optionally ending in a fan-out
/// whose branches are themselves fanout graphs.
fn fanout_graph(rng: &mut StdRng, depth: u32, next: &mut u32) -> EventGraph<String> {
    let mut segments = Vec::new();
    let atoms = rng.random_range(1..4);
    for _ in 0..atoms {
        *next += 1;
        segments.push(EventGraph::atom(format!("e{next}")));
    }
    if depth > 0 && rng.random_bool(0.6) {
        let branches = rng.random_range(2..4);
        let fan = EventGraph::concurrently_all((0..branches).map(|_| fanout_graph(rng, depth - 1, next)));
        segments.push(fan);
    }
    EventGraph::sequentially_all(segments)
}

#[test]
fn unflatten_inverts_flatten_on_fanout_graphs() {
    let mut rng = StdRng::seed_from_u64(2024);
    for _ in 0..500 {
        let mut next = 0;
        let graph = fanout_graph(&mut rng, 3, &mut next);
        let flat = flatten(&graph).unwrap();
        assert_eq!(flat.len(), graph.len());
        let rebuilt = unflatten(flat).unwrap();
        assert_eq!(rebuilt.to_string(), graph.to_string());
    }
}

#[test]
fn sum_effects_commute_through_graph_evaluation() {
    let mut rng = StdRng::seed_from_u64(77);
    let effects = SumEffectTrait;
    for _ in 0..200 {
        let a: i64 = rng.random_range(-100..100);
        let b: i64 = rng.random_range(-100..100);
        let ab = EventGraph::concurrently(EventGraph::atom(a), EventGraph::atom(b));
        let ba = EventGraph::concurrently(EventGraph::atom(b), EventGraph::atom(a));
        let id = |x: &i64| *x;
        assert_eq!(ab.evaluate(&effects, &id), ba.evaluate(&effects, &id));
        assert_eq!(effects.sequentially(&effects.empty(), &a), a);
        assert_eq!(effects.concurrently(&effects.empty(), &a), a);
    }
}

#[test]
fn concurrent_adds_reach_initial_plus_both_regardless_of_order() {
    for (first, second) in [(3, 7), (7, 3)] {
        let mut timeline = Timeline::new();
        let topic: Topic<i64> = Topic::new();
        let cell = timeline.allocate(10, Counter, |delta: &i64| *delta, topic);
        let base = timeline.origin();

        timeline.emit(base, Event::new(&topic, first)).unwrap();
        timeline.emit(base, Event::new(&topic, second)).unwrap();
        let graph = timeline.graph_since(base).unwrap();
        let tip = timeline.commit(base, graph).unwrap();
        assert_eq!(timeline.get(tip, &cell).unwrap(), 20);
    }
}

#[test]
fn concurrent_register_writes_conflict_through_the_timeline() {
    let mut timeline = Timeline::new();
    let topic: Topic<String> = Topic::new();
    let cell = timeline.allocate(
        RegisterState {
            value: "idle".to_owned(),
            conflicted: false,
        },
        Register::new(StringValueMapper),
        |value: &String| RegisterEffect::set(value.clone()),
        topic,
    );
    let base = timeline.origin();
    timeline.emit(base, Event::new(&topic, "on".to_owned())).unwrap();
    timeline.emit(base, Event::new(&topic, "off".to_owned())).unwrap();
    let tip = timeline.commit(base, timeline.graph_since(base).unwrap()).unwrap();

    let state = timeline.get(tip, &cell).unwrap();
    assert_eq!(state.value, "idle");
    assert!(state.conflicted);

    let after = timeline.emit(tip, Event::new(&topic, "on".to_owned())).unwrap();
    let state = timeline.get(after, &cell).unwrap();
    assert_eq!(state.value, "on");
    assert!(!state.conflicted);
}
