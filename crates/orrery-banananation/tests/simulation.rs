//! End-to-end runs of the banana mission model through `simulate`.
//!
//! Each test builds a fresh model, simulates a small plan, and checks the
//! activity records, the event log, the sampled profiles, and the
//! constraint report.

#![allow(clippy::unwrap_used, clippy::float_cmp)]

use chrono::{DateTime, Utc};
use orrery_banananation::build;
use orrery_engine::{ActivityCall, Schedule, ScheduledActivity, SimulationError, SimulationResults, simulate};
use orrery_resources::SecantConfig;
use orrery_types::{ActivityDirectiveId, ActivityInstanceId, Duration, SerializedValue};

fn secs(n: i64) -> Duration {
    Duration::of(n, Duration::SECOND)
}

fn hours(n: i64) -> Duration {
    Duration::of(n, Duration::HOUR)
}

fn plan(entries: Vec<(Duration, ActivityCall)>) -> Schedule {
    entries
        .into_iter()
        .zip(1_u64..)
        .map(|((start_offset, activity), id)| {
            (ActivityDirectiveId(id), ScheduledActivity {
                start_offset,
                activity,
            })
        })
        .collect()
}

fn run(schedule: &Schedule, duration: Duration, period: Duration) -> Result<SimulationResults, SimulationError> {
    simulate(
        build(SecantConfig::default()).unwrap(),
        schedule,
        DateTime::<Utc>::UNIX_EPOCH,
        duration,
        period,
    )
}

fn reals(results: &SimulationResults, resource: &str) -> Vec<f64> {
    results
        .timelines
        .get(resource)
        .unwrap()
        .iter()
        .map(|value| value.as_real().unwrap())
        .collect()
}

#[test]
fn bite_with_no_arguments_commits_its_default() {
    let schedule = plan(vec![(Duration::ZERO, ActivityCall::new("BiteBanana"))]);
    let results = run(&schedule, hours(1), Duration::of(30, Duration::MINUTE)).unwrap();

    assert_eq!(results.simulated_activities.len(), 1);
    let bite = results.simulated_activities.get(&ActivityInstanceId(0)).unwrap();
    assert_eq!(bite.type_name, "BiteBanana");
    assert_eq!(bite.directive_id, Some(ActivityDirectiveId(1)));
    assert_eq!(bite.arguments.get("biteSize"), Some(&SerializedValue::Real(1.0)));
    assert_eq!(bite.arguments.len(), 1);
    assert_eq!(bite.duration, Duration::ZERO);
    assert_eq!(
        bite.computed_attributes,
        SerializedValue::map([("biteSizeWasBig", SerializedValue::Boolean(false))])
    );

    let input = results
        .events
        .iter()
        .find(|event| event.topic == "ActivityType.Input.BiteBanana")
        .unwrap();
    assert_eq!(input.value.to_string(), r#"{"biteSize":1.0}"#);
    assert_eq!(input.offset, Duration::ZERO);
    let fruit = results.events.iter().find(|event| event.topic == "fruit").unwrap();
    assert_eq!(fruit.transaction_index, input.transaction_index);
    assert_eq!(fruit.value.to_string(), r#"{"rate":0.0,"value":-1.0}"#);

    assert_eq!(results.timestamps.len(), 3);
    assert_eq!(reals(&results, "/fruit"), [3.0, 3.0, 3.0]);
    assert_eq!(reals(&results, "/peel"), [4.0, 4.0, 4.0]);
    assert!(results.constraint_violations.is_empty());
    assert!(results.validation_failures.is_empty());
}

#[test]
fn peel_at_five_seconds_drops_fruit_and_peel() {
    let schedule = plan(vec![(secs(5), ActivityCall::new("PeelBanana"))]);
    let results = run(&schedule, secs(10), secs(5)).unwrap();

    assert_eq!(results.timestamps, [Duration::ZERO, secs(5), secs(10)]);
    assert_eq!(reals(&results, "/fruit"), [4.0, 3.0, 3.0]);
    assert_eq!(reals(&results, "/peel"), [4.0, 3.0, 3.0]);

    let peel = results.simulated_activities.get(&ActivityInstanceId(0)).unwrap();
    assert_eq!(peel.arguments.get("peelDirection"), Some(&SerializedValue::from("fromStem")));
    assert_eq!(peel.start_offset, secs(5));
}

#[test]
fn peeling_from_the_tip_spares_the_fruit() {
    let schedule = plan(vec![(
        secs(1),
        ActivityCall::new("PeelBanana").with("peelDirection", "fromTip"),
    )]);
    let results = run(&schedule, secs(2), secs(1)).unwrap();
    assert_eq!(reals(&results, "/fruit"), [4.0, 4.0, 4.0]);
    assert_eq!(reals(&results, "/peel"), [4.0, 3.0, 3.0]);
}

#[test]
fn overeating_violates_the_fruit_constraint() {
    let bite = |size: f64| ActivityCall::new("BiteBanana").with("biteSize", size);
    let schedule = plan(vec![
        (secs(1), bite(2.0)),
        (secs(2), bite(2.0)),
        (secs(3), bite(2.0)),
        (secs(4), bite(-1.0)),
    ]);
    let results = run(&schedule, secs(10), secs(1)).unwrap();

    assert_eq!(reals(&results, "/fruit").last(), Some(&-1.0));
    assert_eq!(results.simulated_activities.len(), 4);
    assert_eq!(
        results.validation_failures.get(&ActivityDirectiveId(4)),
        Some(&vec!["bite size must be positive".to_owned()])
    );
    assert_eq!(results.validation_failures.len(), 1);

    assert_eq!(results.constraint_violations.len(), 1);
    let violation = results.constraint_violations.first().unwrap();
    assert_eq!(violation.name, "fruit is never negative");
    assert_eq!(violation.windows.min_time_point(), Some(secs(3)));
    assert_eq!(violation.windows.max_time_point(), Some(secs(10)));
}

#[test]
fn growing_raises_fruit_linearly_and_uses_plants() {
    let schedule = plan(vec![(
        Duration::ZERO,
        ActivityCall::new("GrowBanana").with("quantity", 2_i64),
    )]);
    let results = run(&schedule, hours(1), Duration::of(30, Duration::MINUTE)).unwrap();

    let fruit = reals(&results, "/fruit");
    let expected = [4.0, 5.0, 6.0];
    assert_eq!(fruit.len(), expected.len());
    for (sample, want) in fruit.iter().zip(expected) {
        assert!((sample - want).abs() < 1e-9, "{sample} != {want}");
    }
    assert_eq!(
        results.timelines.get("/plant").unwrap(),
        &vec![SerializedValue::Int(198); 3]
    );

    let grow = results.simulated_activities.get(&ActivityInstanceId(0)).unwrap();
    assert_eq!(grow.duration, hours(1));
    assert_eq!(
        grow.arguments.get("growingDuration"),
        Some(&SerializedValue::Int(hours(1).micros()))
    );
}

#[test]
fn growing_past_the_horizon_is_unfinished() {
    let schedule = plan(vec![(
        Duration::ZERO,
        ActivityCall::new("GrowBanana").with("growingDuration", hours(2).micros()),
    )]);
    let results = run(&schedule, hours(1), hours(1)).unwrap();
    assert!(results.simulated_activities.is_empty());
    assert!(results.unfinished_activities.contains_key(&ActivityInstanceId(0)));
    let fruit = reals(&results, "/fruit");
    assert!((fruit.last().unwrap() - 4.5).abs() < 1e-9);
}

#[test]
fn plants_take_root_while_the_sun_is_high() {
    let results = run(&Schedule::new(), hours(24), hours(1)).unwrap();

    let plants: Vec<i64> = results
        .timelines
        .get("/plant")
        .unwrap()
        .iter()
        .map(|value| value.as_int().unwrap())
        .collect();
    assert_eq!(plants.len(), 25);
    assert_eq!(plants.get(2), Some(&200));
    assert_eq!(plants.get(3), Some(&201));
    assert_eq!(plants.last(), Some(&208));

    let sunlight = reals(&results, "/sunlight");
    assert!((sunlight.get(6).unwrap() - 1.0).abs() < 1e-9);
    assert_eq!(sunlight.get(18), Some(&0.0));

    let growth_events = results.events.iter().filter(|event| event.topic == "plant").count();
    assert_eq!(growth_events, 8);
}

#[test]
fn selling_to_a_stranger_violates_the_producer_constraint() {
    let schedule = plan(vec![
        (secs(2), ActivityCall::new("ChangeProducer").with("producer", "Banana Republic")),
        (secs(6), ActivityCall::new("ChangeProducer")),
    ]);
    let results = run(&schedule, secs(10), secs(2)).unwrap();

    let producers: Vec<&str> = results
        .timelines
        .get("/producer")
        .unwrap()
        .iter()
        .map(|value| value.as_str().unwrap())
        .collect();
    assert_eq!(producers, ["Chiquita", "Banana Republic", "Banana Republic", "Dole", "Dole", "Dole"]);

    let violation = results
        .constraint_violations
        .iter()
        .find(|violation| violation.name == "producer is known")
        .unwrap();
    assert_eq!(violation.windows.min_time_point(), Some(secs(2)));
    assert_eq!(
        violation.windows.max_time_point(),
        Some(secs(6).saturating_minus(Duration::EPSILON))
    );
}

#[test]
fn peeling_a_bare_banana_stops_the_run() {
    let schedule = plan((1..=5).map(|n| (secs(n), ActivityCall::new("PeelBanana"))).collect());
    let error = run(&schedule, secs(10), secs(1)).unwrap_err();
    assert!(matches!(
        error,
        SimulationError::TaskFailed {
            activity: Some(ActivityInstanceId(4)),
            ..
        }
    ));
    if let SimulationError::TaskFailed { time, trace, .. } = error {
        assert_eq!(time, secs(5));
        assert!(trace.contains("peel="));
    }
}

#[test]
fn unknown_arguments_are_rejected_before_the_run() {
    let schedule = plan(vec![(
        Duration::ZERO,
        ActivityCall::new("BiteBanana").with("biteSizee", 1.0),
    )]);
    let error = run(&schedule, secs(10), secs(1)).unwrap_err();
    assert!(matches!(error, SimulationError::Instantiation { .. }));
}

#[test]
fn results_serialize_to_json() {
    let schedule = plan(vec![(Duration::ZERO, ActivityCall::new("ParameterTest").with("required", true))]);
    let results = run(&schedule, secs(1), secs(1)).unwrap();
    let json = serde_json::to_value(&results).unwrap();

    let activity = json
        .get("simulated_activities")
        .and_then(|activities| activities.get("0"))
        .unwrap();
    assert_eq!(activity.get("type").and_then(|t| t.as_str()), Some("ParameterTest"));
    assert_eq!(
        activity.pointer("/arguments/size").and_then(|size| size.as_str()),
        Some("medium")
    );
    assert!(json.get("timelines").and_then(|t| t.get("/sunlight")).is_some());
}
