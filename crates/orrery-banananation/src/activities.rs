//! Activity types of the banana plantation.
//!
//! | Activity         | Parameters (defaults)                         | Task style |
//! |------------------|-----------------------------------------------|------------|
//! | `BiteBanana`     | `biteSize` (1.0)                              | step fn    |
//! | `PeelBanana`     | `peelDirection` (`fromStem`)                  | replaying  |
//! | `GrowBanana`     | `quantity` (1), `growingDuration` (1 h)       | coroutine  |
//! | `ChangeProducer` | `producer` (`Dole`)                           | step fn    |
//! | `ParameterTest`  | one of every schema                           | step fn    |

use orrery_engine::{
    ActivityTypeSpec, BoxedTask, CoroutineContext, CoroutineTask, Initializer, InstantiationError, ReplayingTask,
    StepFn, Task, TaskError, TaskStatus, argument,
};
use orrery_timeline::AccumulatorEffect;
use orrery_types::{
    Duration, DurationValueMapper, IntValueMapper, RealValueMapper, SerializedValue, StringValueMapper, ValueSchema,
};
use tracing::debug;

use crate::mission::Mission;

/// Type name of the bite activity.
pub const BITE_BANANA: &str = "BiteBanana";
/// Type name of the peel activity.
pub const PEEL_BANANA: &str = "PeelBanana";
/// Type name of the grow activity.
pub const GROW_BANANA: &str = "GrowBanana";
/// Type name of the producer change activity.
pub const CHANGE_PRODUCER: &str = "ChangeProducer";
/// Type name of the parameter exerciser.
pub const PARAMETER_TEST: &str = "ParameterTest";

/// Fruit lost when peeling from the stem squashes the tip.
const MASHED_BANANA_AMOUNT: f64 = 1.0;

/// Bites larger than this are reported as big.
const BIG_BITE: f64 = 1.0;

/// Register every activity type against `mission`.
pub fn register_all(init: &mut Initializer, mission: Mission) -> Result<(), InstantiationError> {
    for spec in [
        bite_banana(mission),
        peel_banana(mission),
        grow_banana(mission),
        change_producer(mission),
        parameter_test(),
    ] {
        let name = spec.name().to_owned();
        init.activity_type(spec)?;
        debug!(activity_type = %name, "Activity type registered");
    }
    Ok(())
}

fn boxed<T: Task + 'static>(task: T) -> BoxedTask {
    Box::new(task)
}

/// Take a bite: the fruit drops by `biteSize`.
pub fn bite_banana(mission: Mission) -> ActivityTypeSpec {
    ActivityTypeSpec::new(BITE_BANANA, move |args| {
        let bite = argument(BITE_BANANA, args, "biteSize", &RealValueMapper)?;
        Ok(boxed(StepFn::new(move |_, scheduler| {
            scheduler.emit(&mission.fruit_effects, AccumulatorEffect::add_value(-bite))?;
            Ok(TaskStatus::Completed(SerializedValue::map([(
                "biteSizeWasBig",
                SerializedValue::Boolean(bite > BIG_BITE),
            )])))
        })))
    })
    .parameter_with_default("biteSize", ValueSchema::Real, 1.0)
    .validator(|args| match args.get("biteSize").and_then(SerializedValue::as_real) {
        Some(size) if size <= 0.0 => vec!["bite size must be positive".to_owned()],
        _ => Vec::new(),
    })
    .computed_attributes(ValueSchema::structure([("biteSizeWasBig", ValueSchema::Boolean)]))
}

/// Peel one strip. Peeling from the stem mashes some of the fruit.
///
/// Fails if there is no peel left.
pub fn peel_banana(mission: Mission) -> ActivityTypeSpec {
    ActivityTypeSpec::new(PEEL_BANANA, move |args| {
        let direction = argument(PEEL_BANANA, args, "peelDirection", &StringValueMapper)?;
        let from_stem = direction == "fromStem";
        Ok(boxed(ReplayingTask::new(move |ctx| {
            let peel = ctx.get(&mission.peel)?;
            if peel.value < 1.0 {
                return Err(TaskError::failed(format!("no peel left to remove ({})", peel.value)).into());
            }
            if from_stem {
                ctx.emit(&mission.fruit_effects, AccumulatorEffect::add_value(-MASHED_BANANA_AMOUNT))?;
            }
            ctx.emit(&mission.peel_effects, AccumulatorEffect::add_value(-1.0))?;
            Ok(SerializedValue::Null)
        })))
    })
    .parameter_with_default(
        "peelDirection",
        ValueSchema::variant(["fromStem", "fromTip"]),
        "fromStem",
    )
}

/// Grow `quantity` bananas over `growingDuration`, using up one plant per
/// banana.
pub fn grow_banana(mission: Mission) -> ActivityTypeSpec {
    ActivityTypeSpec::new(GROW_BANANA, move |args| {
        let quantity = argument(GROW_BANANA, args, "quantity", &IntValueMapper)?;
        let growing = argument(GROW_BANANA, args, "growingDuration", &DurationValueMapper)?;
        let unconstructable = |reason: &str| InstantiationError::Unconstructable {
            type_name: GROW_BANANA.to_owned(),
            reason: reason.to_owned(),
        };
        let bananas = i32::try_from(quantity)
            .ok()
            .ok_or_else(|| unconstructable("quantity out of range"))?;
        if !growing.is_positive() {
            return Err(unconstructable("growing duration must be positive"));
        }
        Ok(boxed(CoroutineTask::new(move |ctx| grow(ctx, mission, quantity, bananas, growing))))
    })
    .parameter_with_default("quantity", ValueSchema::Int, 1_i64)
    .parameter_with_default("growingDuration", ValueSchema::Duration, Duration::HOUR.micros())
    .validator(|args| {
        let mut failures = Vec::new();
        if args.get("quantity").and_then(SerializedValue::as_int).is_some_and(|q| q <= 0) {
            failures.push("quantity must be positive".to_owned());
        }
        if args
            .get("growingDuration")
            .and_then(SerializedValue::as_int)
            .is_some_and(|micros| micros <= 0)
        {
            failures.push("growing duration must be positive".to_owned());
        }
        failures
    })
}

async fn grow(
    ctx: CoroutineContext,
    mission: Mission,
    plants: i64,
    bananas: i32,
    growing: Duration,
) -> Result<SerializedValue, TaskError> {
    let rate = f64::from(bananas) / growing.ratio_over(Duration::SECOND);
    ctx.emit(&mission.plant_delta, plants.saturating_neg()).await?;
    ctx.emit(&mission.fruit_effects, AccumulatorEffect::add_rate(rate)).await?;
    ctx.delay(growing).await?;
    ctx.emit(&mission.fruit_effects, AccumulatorEffect::add_rate(-rate)).await?;
    Ok(SerializedValue::Null)
}

/// Sell the bunch to someone else.
pub fn change_producer(mission: Mission) -> ActivityTypeSpec {
    ActivityTypeSpec::new(CHANGE_PRODUCER, move |args| {
        let producer = argument(CHANGE_PRODUCER, args, "producer", &StringValueMapper)?;
        Ok(boxed(StepFn::new(move |_, scheduler| {
            scheduler.emit(&mission.producer_set, producer.clone())?;
            Ok(TaskStatus::Completed(SerializedValue::Null))
        })))
    })
    .parameter_with_default("producer", ValueSchema::String, "Dole")
}

/// Declares one parameter of every schema and does nothing with them.
pub fn parameter_test() -> ActivityTypeSpec {
    ActivityTypeSpec::new(PARAMETER_TEST, |_| {
        Ok(boxed(StepFn::new(|_, _| Ok(TaskStatus::Completed(SerializedValue::Null)))))
    })
    .parameter_with_default("primitiveDouble", ValueSchema::Real, 2.5)
    .parameter_with_default("primitiveInt", ValueSchema::Int, 7_i64)
    .parameter_with_default("primitiveBoolean", ValueSchema::Boolean, true)
    .parameter_with_default("string", ValueSchema::String, "h")
    .parameter_with_default("duration", ValueSchema::Duration, Duration::SECOND.micros())
    .parameter_with_default(
        "doubleList",
        ValueSchema::series(ValueSchema::Real),
        vec![SerializedValue::Real(1.0), SerializedValue::Real(2.0)],
    )
    .parameter_with_default(
        "stringList",
        ValueSchema::series(ValueSchema::String),
        vec![SerializedValue::from("a"), SerializedValue::from("b")],
    )
    .parameter_with_default(
        "record",
        ValueSchema::structure([("x", ValueSchema::Real), ("y", ValueSchema::Int)]),
        SerializedValue::map([("x", SerializedValue::Real(0.5)), ("y", SerializedValue::Int(2))]),
    )
    .parameter_with_default(
        "size",
        ValueSchema::variant(["small", "medium", "large"]),
        "medium",
    )
    .parameter("required", ValueSchema::Boolean)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use orrery_engine::Arguments;

    use super::*;

    fn mission() -> Mission {
        Mission::register(&mut Initializer::new()).unwrap()
    }

    #[test]
    fn bite_validation_rejects_non_positive_sizes() {
        let spec = bite_banana(mission());
        let negative = Arguments::from([("biteSize".to_owned(), SerializedValue::Real(-1.0))]);
        let effective = spec.effective_arguments(&negative).unwrap();
        assert_eq!(spec.validation_failures(&effective), ["bite size must be positive"]);
        let default = spec.effective_arguments(&Arguments::new()).unwrap();
        assert!(spec.validation_failures(&default).is_empty());
    }

    #[test]
    fn peel_direction_must_be_a_known_variant() {
        let spec = peel_banana(mission());
        let sideways = Arguments::from([("peelDirection".to_owned(), SerializedValue::from("sideways"))]);
        assert!(matches!(
            spec.instantiate(&sideways),
            Err(InstantiationError::IllTyped { .. })
        ));
    }

    #[test]
    fn grow_rejects_zero_duration_at_construction() {
        let spec = grow_banana(mission());
        let instant = Arguments::from([("growingDuration".to_owned(), SerializedValue::Int(0))]);
        let effective = spec.effective_arguments(&instant).unwrap();
        assert_eq!(spec.validation_failures(&effective), ["growing duration must be positive"]);
        assert!(matches!(
            spec.instantiate(&instant),
            Err(InstantiationError::Unconstructable { .. })
        ));
    }

    #[test]
    fn parameter_test_requires_its_one_undefaulted_parameter() {
        let spec = parameter_test();
        assert_eq!(spec.missing_arguments(&Arguments::new()), ["required"]);
        let supplied = Arguments::from([("required".to_owned(), SerializedValue::Boolean(false))]);
        let (effective, _) = spec.instantiate(&supplied).unwrap();
        assert_eq!(effective.len(), spec.parameters().len());
        assert_eq!(effective.get("size"), Some(&SerializedValue::from("medium")));
    }
}
