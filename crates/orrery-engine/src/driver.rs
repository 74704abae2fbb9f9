//! The `simulate` entry point and its results.
//!
//! A run instantiates every scheduled activity up front, so malformed
//! arguments are reported before any simulation state is touched. It then
//! starts the daemons, runs the engine to the end of the plan, and samples
//! every exported resource at the requested period. The results carry the
//! resource profiles, the activity records, the event log of the exported
//! topics, and the constraint violations.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use orrery_timeline::flatten;
use orrery_types::{ActivityDirectiveId, ActivityInstanceId, Duration, SerializedValue, ValueSchema};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::{ConstraintViolation, SimulationEngine};
use crate::error::SimulationError;
use crate::model::MissionModel;
use crate::task::{ActivityCall, Arguments};

/// One plan entry: an activity and when to start it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledActivity {
    /// Start, as an offset from the start of the plan.
    pub start_offset: Duration,
    /// The activity to run.
    #[serde(flatten)]
    pub activity: ActivityCall,
}

/// A plan: activities keyed by directive id.
pub type Schedule = BTreeMap<ActivityDirectiveId, ScheduledActivity>;

/// An activity that ran to completion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulatedActivity {
    /// Plan entry, for activities that came from the plan.
    pub directive_id: Option<ActivityDirectiveId>,
    /// Activity type name.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Effective arguments.
    pub arguments: Arguments,
    /// Start offset.
    pub start_offset: Duration,
    /// How long the activity ran.
    pub duration: Duration,
    /// Activity that spawned or called this one.
    pub parent: Option<ActivityInstanceId>,
    /// Value the activity completed with.
    pub computed_attributes: SerializedValue,
}

/// An activity still running when the plan ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnfinishedActivity {
    /// Plan entry, for activities that came from the plan.
    pub directive_id: Option<ActivityDirectiveId>,
    /// Activity type name.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Effective arguments.
    pub arguments: Arguments,
    /// Start offset.
    pub start_offset: Duration,
    /// Activity that spawned or called this one.
    pub parent: Option<ActivityInstanceId>,
}

/// One event on an exported topic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    /// Wall-clock time of the event.
    pub real_time: DateTime<Utc>,
    /// Offset from the start of the plan.
    pub offset: Duration,
    /// Position of the event within its commit.
    pub causal_time: String,
    /// Index of the commit the event belongs to.
    pub transaction_index: usize,
    /// Export name of the topic.
    pub topic: String,
    /// Serialized payload.
    pub value: SerializedValue,
}

/// An exported topic and the shape of its events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicDescription {
    /// Export name.
    pub name: String,
    /// Schema of the serialized events.
    pub schema: ValueSchema,
}

/// Everything a run produces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResults {
    /// Wall-clock time of offset zero.
    pub start_time: DateTime<Utc>,
    /// Length of the plan.
    pub duration: Duration,
    /// Offsets at which resources were sampled.
    pub timestamps: Vec<Duration>,
    /// Samples of each exported resource, aligned with `timestamps`.
    pub timelines: BTreeMap<String, Vec<SerializedValue>>,
    /// Constraints that failed, with where they failed.
    pub constraint_violations: Vec<ConstraintViolation>,
    /// Activities that finished.
    pub simulated_activities: BTreeMap<ActivityInstanceId, SimulatedActivity>,
    /// Activities still running at the end of the plan.
    pub unfinished_activities: BTreeMap<ActivityInstanceId, UnfinishedActivity>,
    /// Events on exported topics, in commit order.
    pub events: Vec<EventRecord>,
    /// The exported topics.
    pub topics: Vec<TopicDescription>,
    /// Validation messages for plan entries that reported any.
    pub validation_failures: BTreeMap<ActivityDirectiveId, Vec<String>>,
}

fn sample_times(duration: Duration, period: Duration) -> Vec<Duration> {
    let mut times = Vec::new();
    let mut time = Duration::ZERO;
    while time.shorter_than(duration) {
        times.push(time);
        time = time.saturating_plus(period);
    }
    times.push(duration);
    times
}

fn real_time(start: DateTime<Utc>, offset: Duration) -> Result<DateTime<Utc>, SimulationError> {
    start
        .checked_add_signed(TimeDelta::microseconds(offset.micros()))
        .ok_or(SimulationError::TimeOutOfRange { offset })
}

/// Simulate `schedule` against `model` for `duration`, sampling every
/// exported resource each `sampling_period`.
pub fn simulate(
    model: MissionModel,
    schedule: &Schedule,
    start_time: DateTime<Utc>,
    duration: Duration,
    sampling_period: Duration,
) -> Result<SimulationResults, SimulationError> {
    if !sampling_period.is_positive() {
        return Err(SimulationError::InvalidSamplingPeriod {
            period: sampling_period,
        });
    }
    info!(
        activities = schedule.len(),
        %duration,
        %sampling_period,
        %start_time,
        "Simulation requested"
    );

    let mut engine = SimulationEngine::new(model);
    let registry = Arc::clone(engine.registry());

    let mut validation_failures = BTreeMap::new();
    for (&directive, entry) in schedule {
        let spec = registry
            .activity_type(&entry.activity.type_name)
            .map_err(|source| SimulationError::Instantiation { directive, source })?;
        let effective = spec
            .effective_arguments(&entry.activity.arguments)
            .map_err(|source| SimulationError::Instantiation { directive, source })?;
        let failures = spec.validation_failures(&effective);
        if !failures.is_empty() {
            debug!(%directive, ?failures, "Activity failed validation");
            validation_failures.insert(directive, failures);
        }
        engine
            .schedule_activity(Some(directive), &entry.activity, entry.start_offset.max(Duration::ZERO))
            .map_err(|source| SimulationError::Instantiation { directive, source })?;
    }
    engine.spawn_daemons();
    engine.run_until(duration)?;

    // Resource profiles.
    let timestamps = sample_times(duration, sampling_period);
    let mut timelines: BTreeMap<String, Vec<SerializedValue>> = registry
        .resources()
        .keys()
        .map(|name| (name.clone(), Vec::with_capacity(timestamps.len())))
        .collect();
    for &time in &timestamps {
        let node = engine.node_at(time)?;
        let querier = engine.timeline().querier(node);
        for (name, resource) in registry.resources() {
            let sample = resource.sample(&querier)?;
            if let Some(profile) = timelines.get_mut(name) {
                profile.push(sample);
            }
        }
    }

    let constraint_violations = engine.constraint_violations(duration)?;

    // Activity records.
    let mut simulated_activities = BTreeMap::new();
    let mut unfinished_activities = BTreeMap::new();
    for (&id, record) in engine.activities() {
        if record.start.longer_than(duration) {
            continue;
        }
        match (record.end, &record.computed_attributes) {
            (Some(end), Some(attributes)) => {
                simulated_activities.insert(id, SimulatedActivity {
                    directive_id: record.directive,
                    type_name: record.type_name.clone(),
                    arguments: record.arguments.clone(),
                    start_offset: record.start,
                    duration: end.saturating_minus(record.start),
                    parent: record.parent,
                    computed_attributes: attributes.clone(),
                });
            }
            _ => {
                unfinished_activities.insert(id, UnfinishedActivity {
                    directive_id: record.directive,
                    type_name: record.type_name.clone(),
                    arguments: record.arguments.clone(),
                    start_offset: record.start,
                    parent: record.parent,
                });
            }
        }
    }

    // Event log.
    let mut events = Vec::new();
    for (transaction_index, commit) in engine.commits().iter().enumerate() {
        for (causal_time, event) in flatten(&commit.graph)? {
            let Some(topic) = registry.exported_topic(&event) else {
                continue;
            };
            let Some(value) = topic.serialize(&event) else {
                continue;
            };
            events.push(EventRecord {
                real_time: real_time(start_time, commit.time)?,
                offset: commit.time,
                causal_time: causal_time.to_string(),
                transaction_index,
                topic: topic.name().to_owned(),
                value,
            });
        }
    }

    let topics = registry
        .topics()
        .iter()
        .map(|topic| TopicDescription {
            name: topic.name().to_owned(),
            schema: topic.schema().clone(),
        })
        .collect();

    info!(
        simulated = simulated_activities.len(),
        unfinished = unfinished_activities.len(),
        events = events.len(),
        violations = constraint_violations.len(),
        "Simulation complete"
    );

    Ok(SimulationResults {
        start_time,
        duration,
        timestamps,
        timelines,
        constraint_violations,
        simulated_activities,
        unfinished_activities,
        events,
        topics,
        validation_failures,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn samples_cover_both_ends_of_the_plan() {
        let times = sample_times(Duration::from_micros(25), Duration::from_micros(10));
        assert_eq!(
            times,
            vec![
                Duration::ZERO,
                Duration::from_micros(10),
                Duration::from_micros(20),
                Duration::from_micros(25),
            ]
        );
        let exact = sample_times(Duration::from_micros(20), Duration::from_micros(10));
        assert_eq!(exact.last(), Some(&Duration::from_micros(20)));
        assert_eq!(exact.len(), 3);
    }

    #[test]
    fn schedule_entries_read_from_json() {
        let json = r#"{"7":{"start_offset":1000000,"type":"BiteBanana","arguments":{"biteSize":2.0}}}"#;
        let schedule: Schedule = serde_json::from_str(json).unwrap();
        let entry = schedule.get(&ActivityDirectiveId(7)).unwrap();
        assert_eq!(entry.start_offset, Duration::SECOND);
        assert_eq!(entry.activity.type_name, "BiteBanana");
        assert_eq!(entry.activity.arguments.get("biteSize"), Some(&SerializedValue::Real(2.0)));
    }
}
