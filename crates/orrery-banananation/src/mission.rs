//! Cells, topics, and resources of the banana plantation.
//!
//! | Resource     | Cell                   | Initial     |
//! |--------------|------------------------|-------------|
//! | `/fruit`     | accumulator            | 4.0         |
//! | `/peel`      | accumulator            | 4.0         |
//! | `/plant`     | counter                | 200         |
//! | `/producer`  | register               | `Chiquita`  |
//! | `/sunlight`  | black box over a clock | 0.0         |
//!
//! The sun is known only as a function of time. A clock accumulator that
//! nothing ever writes to supplies the time, so the engine can ask how
//! bright it is at any node without the model emitting anything.
//!
//! # Design Principles
//!
//! - The [`Mission`] handle is `Copy`. Activities capture it by value and
//!   read or write through its cell ids and topics.
//! - Resources are derived on demand from the cells, never stored.

use core::f64::consts::TAU;
use std::sync::Arc;

use orrery_engine::{BoxedTask, CoroutineContext, CoroutineTask, Initializer, TaskError};
use orrery_resources::resource::from_cell;
use orrery_resources::{
    BlackBox, BlackBoxCondition, Comparison, Discrete, DiscreteCondition, ErrorEstimate, RealCondition,
    RealDynamics, SharedCondition, SharedResource,
};
use orrery_timeline::{
    Accumulator, AccumulatorEffect, AccumulatorState, CellId, Counter, Register, RegisterEffect, RegisterState,
    Topic,
};
use orrery_types::{
    Duration, IntValueMapper, MapperError, RealValueMapper, SerializedValue, StringValueMapper, ValueMapper,
    ValueSchema,
};
use tracing::debug;

use crate::error::BananaError;

/// Fruit on the bunch at the start of a plan.
pub const INITIAL_FRUIT: f64 = 4.0;

/// Peel on the bunch at the start of a plan.
pub const INITIAL_PEEL: f64 = 4.0;

/// Plants on the plantation at the start of a plan.
pub const INITIAL_PLANTS: i64 = 200;

/// Producer at the start of a plan.
pub const INITIAL_PRODUCER: &str = "Chiquita";

/// Producers the plantation is allowed to sell to.
pub const KNOWN_PRODUCERS: [&str; 3] = ["Chiquita", "Dole", "Del Monte"];

/// Sunlight above which plants grow.
pub const SUNNY: f64 = 0.5;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Fraction of full sun `seconds` after the start of the plan: one sine
/// arch per day, clipped to zero overnight.
pub fn daylight(seconds: f64) -> f64 {
    (TAU * seconds / SECONDS_PER_DAY).sin().max(0.0)
}

/// Handles to everything the activities touch.
#[derive(Clone, Copy)]
pub struct Mission {
    /// Edible fruit.
    pub fruit: CellId<AccumulatorState>,
    /// Peel left to remove.
    pub peel: CellId<AccumulatorState>,
    /// Plants in the ground.
    pub plant: CellId<i64>,
    /// Who the bunch is sold to.
    pub producer: CellId<RegisterState<String>>,
    /// Seconds since the start of the plan.
    pub clock: CellId<AccumulatorState>,
    /// Changes to the fruit.
    pub fruit_effects: Topic<AccumulatorEffect>,
    /// Changes to the peel.
    pub peel_effects: Topic<AccumulatorEffect>,
    /// Plants added (positive) or used up (negative).
    pub plant_delta: Topic<i64>,
    /// New producer names.
    pub producer_set: Topic<String>,
}

impl Mission {
    /// Allocate the cells, export topics and resources, and register the
    /// daemon and constraints.
    pub fn register(init: &mut Initializer) -> Result<Self, BananaError> {
        let fruit_effects = Topic::new();
        let peel_effects = Topic::new();
        let plant_delta = Topic::new();
        let producer_set = Topic::new();

        let fruit = init.allocate(
            AccumulatorState {
                value: INITIAL_FRUIT,
                rate: 0.0,
            },
            Accumulator,
            |effect: &AccumulatorEffect| *effect,
            fruit_effects,
        );
        let peel = init.allocate(
            AccumulatorState {
                value: INITIAL_PEEL,
                rate: 0.0,
            },
            Accumulator,
            |effect: &AccumulatorEffect| *effect,
            peel_effects,
        );
        let plant = init.allocate(INITIAL_PLANTS, Counter, |delta: &i64| *delta, plant_delta);
        let producer = init.allocate(
            RegisterState {
                value: INITIAL_PRODUCER.to_owned(),
                conflicted: false,
            },
            Register::new(StringValueMapper),
            |name: &String| RegisterEffect::set(name.clone()),
            producer_set,
        );
        let clock = init.allocate(
            AccumulatorState { value: 0.0, rate: 1.0 },
            Accumulator,
            |effect: &AccumulatorEffect| *effect,
            Topic::<AccumulatorEffect>::new(),
        );

        let mission = Self {
            fruit,
            peel,
            plant,
            producer,
            clock,
            fruit_effects,
            peel_effects,
            plant_delta,
            producer_set,
        };

        init.topic("fruit", fruit_effects, AccumulatorEffectMapper);
        init.topic("peel", peel_effects, AccumulatorEffectMapper);
        init.topic("plant", plant_delta, IntValueMapper);
        init.topic("producer", producer_set, StringValueMapper);

        init.resource("/fruit", mission.fruit(), RealValueMapper);
        init.resource("/peel", mission.peel(), RealValueMapper);
        init.resource("/plant", mission.plant(), IntValueMapper);
        init.resource("/producer", mission.producer(), StringValueMapper);
        init.resource("/sunlight", mission.sunlight(), RealValueMapper);

        let sampling = init.adaptive_sampling(ErrorEstimate::Quadratic)?;
        let sunny: SharedCondition = Arc::new(BlackBoxCondition::new(
            mission.sunlight(),
            Comparison::GreaterThan,
            SUNNY,
            sampling,
        ));
        init.daemon("photosynthesis", move || -> BoxedTask {
            let sunny = Arc::clone(&sunny);
            Box::new(CoroutineTask::new(move |ctx| photosynthesis(ctx, sunny, plant_delta)))
        });

        init.constraint(
            "fruit is never negative",
            Arc::new(RealCondition::new(mission.fruit(), Comparison::GreaterOrEqual, 0.0)),
        );
        init.constraint(
            "producer is known",
            Arc::new(DiscreteCondition::one_of(
                mission.producer(),
                KNOWN_PRODUCERS.map(str::to_owned),
            )),
        );

        debug!(
            fruit = INITIAL_FRUIT,
            peel = INITIAL_PEEL,
            plants = INITIAL_PLANTS,
            producer = INITIAL_PRODUCER,
            "Plantation registered"
        );
        Ok(mission)
    }

    /// Fruit as a linear resource.
    pub fn fruit(&self) -> SharedResource<RealDynamics> {
        linear(self.fruit)
    }

    /// Peel as a linear resource.
    pub fn peel(&self) -> SharedResource<RealDynamics> {
        linear(self.peel)
    }

    /// Plant count.
    pub fn plant(&self) -> SharedResource<Discrete<i64>> {
        from_cell(self.plant, |count: &i64| Discrete(*count))
    }

    /// Current producer.
    pub fn producer(&self) -> SharedResource<Discrete<String>> {
        from_cell(self.producer, |state: &RegisterState<String>| Discrete(state.value.clone()))
    }

    /// Sunlight, as a function of time from the querier's node.
    pub fn sunlight(&self) -> SharedResource<BlackBox> {
        from_cell(self.clock, |clock: &AccumulatorState| {
            let origin = clock.value;
            BlackBox::new(move |elapsed: Duration| daylight(origin + elapsed.ratio_over(Duration::SECOND)))
        })
    }
}

fn linear(cell: CellId<AccumulatorState>) -> SharedResource<RealDynamics> {
    from_cell(cell, |state: &AccumulatorState| RealDynamics::linear(state.value, state.rate))
}

/// While the sun is up, one new plant takes root every hour.
async fn photosynthesis(
    ctx: CoroutineContext,
    sunny: SharedCondition,
    plants: Topic<i64>,
) -> Result<SerializedValue, TaskError> {
    loop {
        ctx.wait_until(Arc::clone(&sunny)).await?;
        ctx.emit(&plants, 1).await?;
        ctx.delay(Duration::HOUR).await?;
    }
}

/// Serializes accumulator effects as `{"value": .., "rate": ..}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccumulatorEffectMapper;

impl ValueMapper<AccumulatorEffect> for AccumulatorEffectMapper {
    fn value_schema(&self) -> ValueSchema {
        ValueSchema::structure([("value", ValueSchema::Real), ("rate", ValueSchema::Real)])
    }

    fn serialize_value(&self, effect: &AccumulatorEffect) -> SerializedValue {
        SerializedValue::map([
            ("value", SerializedValue::Real(effect.value_delta)),
            ("rate", SerializedValue::Real(effect.rate_delta)),
        ])
    }

    fn deserialize_value(&self, value: &SerializedValue) -> Result<AccumulatorEffect, MapperError> {
        let fields = value.as_map().ok_or(MapperError::UnexpectedKind {
            expected: "struct",
            found: value.kind(),
        })?;
        let field = |name: &str| {
            fields
                .get(name)
                .map_or(Ok(0.0), |field| RealValueMapper.deserialize_value(field))
        };
        Ok(AccumulatorEffect {
            value_delta: field("value")?,
            rate_delta: field("rate")?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn sun_rises_at_midnight_and_peaks_at_six() {
        assert_eq!(daylight(0.0), 0.0);
        assert!((daylight(6.0 * 3600.0) - 1.0).abs() < 1e-12);
        assert_eq!(daylight(18.0 * 3600.0), 0.0);
        assert!(daylight(2.5 * 3600.0) > SUNNY);
        assert!(daylight(3600.0) < SUNNY);
    }

    #[test]
    fn effect_mapper_round_trips_and_tolerates_missing_fields() {
        let effect = AccumulatorEffect {
            value_delta: -1.5,
            rate_delta: 0.25,
        };
        let serialized = AccumulatorEffectMapper.serialize_value(&effect);
        assert_eq!(AccumulatorEffectMapper.deserialize_value(&serialized).unwrap(), effect);
        assert!(AccumulatorEffectMapper.value_schema().validate(&serialized));

        let partial = SerializedValue::map([("value", SerializedValue::Real(2.0))]);
        assert_eq!(
            AccumulatorEffectMapper.deserialize_value(&partial).unwrap(),
            AccumulatorEffect::add_value(2.0)
        );
        assert!(AccumulatorEffectMapper.deserialize_value(&SerializedValue::Real(2.0)).is_err());
    }

    #[test]
    fn register_exports_every_resource() {
        let mut init = Initializer::new();
        Mission::register(&mut init).unwrap();
        let model = init.build();
        let names: Vec<&str> = model.registry().resources().keys().map(String::as_str).collect();
        assert_eq!(names, ["/fruit", "/peel", "/plant", "/producer", "/sunlight"]);
        assert_eq!(model.registry().daemons().len(), 1);
        assert_eq!(model.registry().constraints().len(), 2);
    }
}
