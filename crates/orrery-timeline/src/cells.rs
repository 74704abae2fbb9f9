//! Stock cell types for mission models.
//!
//! - [`Register`] holds a discrete value replaced by `set` events. Two
//!   concurrent sets of different values leave the value alone and raise a
//!   sticky `conflicted` flag, cleared only by a later set.
//! - [`Counter`] holds an integer moved by additive deltas.
//! - [`Accumulator`] holds a real value that grows linearly at a rate;
//!   effects add to the value and to the rate.

use core::marker::PhantomData;

use orrery_types::{Duration, MapperError, SerializedValue, ValueMapper};

use crate::cell::CellType;
use crate::effect::{EffectTrait, SumEffectTrait};

// ----------------------------------------------------------------------
// Register
// ----------------------------------------------------------------------

/// State of a [`Register`].
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterState<T> {
    /// Current value.
    pub value: T,
    /// Whether concurrent writes disagreed since the last set.
    pub conflicted: bool,
}

/// Effect on a [`Register`].
///
/// `set` is the last value written, if any; `conflicted` records a
/// disagreement after that write.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterEffect<T> {
    /// Value written, if any.
    pub set: Option<T>,
    /// Whether a conflict happened after the write.
    pub conflicted: bool,
}

impl<T> RegisterEffect<T> {
    /// The no-op effect.
    pub const fn unchanged() -> Self {
        Self {
            set: None,
            conflicted: false,
        }
    }

    /// An authoritative write.
    pub const fn set(value: T) -> Self {
        Self {
            set: Some(value),
            conflicted: false,
        }
    }

    const fn is_unchanged(&self) -> bool {
        self.set.is_none() && !self.conflicted
    }
}

/// Effect algebra for [`RegisterEffect`].
pub struct RegisterEffectTrait<T> {
    _values: PhantomData<fn() -> T>,
}

impl<T> Default for RegisterEffectTrait<T> {
    fn default() -> Self {
        Self {
            _values: PhantomData,
        }
    }
}

impl<T: Clone + PartialEq> EffectTrait<RegisterEffect<T>> for RegisterEffectTrait<T> {
    fn empty(&self) -> RegisterEffect<T> {
        RegisterEffect::unchanged()
    }

    fn sequentially(&self, prefix: &RegisterEffect<T>, suffix: &RegisterEffect<T>) -> RegisterEffect<T> {
        if suffix.set.is_some() {
            return suffix.clone();
        }
        RegisterEffect {
            set: prefix.set.clone(),
            conflicted: prefix.conflicted || suffix.conflicted,
        }
    }

    fn concurrently(&self, left: &RegisterEffect<T>, right: &RegisterEffect<T>) -> RegisterEffect<T> {
        if left.is_unchanged() {
            return right.clone();
        }
        if right.is_unchanged() {
            return left.clone();
        }
        // Both branches did something. They agree only if both are clean
        // writes of the same value.
        match (&left.set, &right.set) {
            (Some(a), Some(b)) if a == b && !left.conflicted && !right.conflicted => left.clone(),
            _ => RegisterEffect {
                set: None,
                conflicted: true,
            },
        }
    }
}

/// A register over values of `T`, serialized through `M`.
pub struct Register<T, M> {
    mapper: M,
    effects: RegisterEffectTrait<T>,
}

impl<T, M> Register<T, M> {
    /// Create a register cell type using `mapper` for serialization.
    pub fn new(mapper: M) -> Self {
        Self {
            mapper,
            effects: RegisterEffectTrait::default(),
        }
    }
}

impl<T, M> CellType for Register<T, M>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    M: ValueMapper<T> + 'static,
{
    type State = RegisterState<T>;
    type Effect = RegisterEffect<T>;

    fn effect_trait(&self) -> &dyn EffectTrait<Self::Effect> {
        &self.effects
    }

    fn duplicate(&self, state: &Self::State) -> Self::State {
        state.clone()
    }

    fn apply(&self, state: &mut Self::State, effect: &Self::Effect) {
        match &effect.set {
            Some(value) => {
                state.value = value.clone();
                state.conflicted = effect.conflicted;
            }
            None => state.conflicted |= effect.conflicted,
        }
    }

    fn step(&self, _state: &mut Self::State, _elapsed: Duration) {}

    fn serialize(&self, state: &Self::State) -> SerializedValue {
        SerializedValue::map([
            ("value", self.mapper.serialize_value(&state.value)),
            ("conflicted", SerializedValue::Boolean(state.conflicted)),
        ])
    }

    fn deserialize(&self, value: &SerializedValue) -> Result<Self::State, MapperError> {
        let fields = value.as_map().ok_or(MapperError::UnexpectedKind {
            expected: "map",
            found: value.kind(),
        })?;
        let inner = fields.get("value").unwrap_or(&SerializedValue::Null);
        let conflicted = fields
            .get("conflicted")
            .and_then(SerializedValue::as_bool)
            .unwrap_or(false);
        Ok(RegisterState {
            value: self.mapper.deserialize_value(inner)?,
            conflicted,
        })
    }
}

// ----------------------------------------------------------------------
// Counter
// ----------------------------------------------------------------------

/// An integer cell moved by additive deltas.
#[derive(Debug, Clone, Copy, Default)]
pub struct Counter;

impl CellType for Counter {
    type State = i64;
    type Effect = i64;

    fn effect_trait(&self) -> &dyn EffectTrait<i64> {
        &SumEffectTrait
    }

    fn duplicate(&self, state: &i64) -> i64 {
        *state
    }

    fn apply(&self, state: &mut i64, effect: &i64) {
        *state = state.saturating_add(*effect);
    }

    fn step(&self, _state: &mut i64, _elapsed: Duration) {}

    fn serialize(&self, state: &i64) -> SerializedValue {
        SerializedValue::Int(*state)
    }

    fn deserialize(&self, value: &SerializedValue) -> Result<i64, MapperError> {
        value.as_int().ok_or(MapperError::UnexpectedKind {
            expected: "int",
            found: value.kind(),
        })
    }
}

// ----------------------------------------------------------------------
// Accumulator
// ----------------------------------------------------------------------

/// State of an [`Accumulator`]: a value and its rate of change per second.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AccumulatorState {
    /// Current value.
    pub value: f64,
    /// Change in value per simulated second.
    pub rate: f64,
}

/// Additive change to an [`AccumulatorState`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AccumulatorEffect {
    /// Added to the value.
    pub value_delta: f64,
    /// Added to the rate.
    pub rate_delta: f64,
}

impl AccumulatorEffect {
    /// Change the value by `delta`.
    pub const fn add_value(delta: f64) -> Self {
        Self {
            value_delta: delta,
            rate_delta: 0.0,
        }
    }

    /// Change the rate by `delta`.
    pub const fn add_rate(delta: f64) -> Self {
        Self {
            value_delta: 0.0,
            rate_delta: delta,
        }
    }
}

struct AccumulatorEffectTrait;

impl EffectTrait<AccumulatorEffect> for AccumulatorEffectTrait {
    fn empty(&self) -> AccumulatorEffect {
        AccumulatorEffect::default()
    }

    fn sequentially(&self, prefix: &AccumulatorEffect, suffix: &AccumulatorEffect) -> AccumulatorEffect {
        AccumulatorEffect {
            value_delta: prefix.value_delta + suffix.value_delta,
            rate_delta: prefix.rate_delta + suffix.rate_delta,
        }
    }

    fn concurrently(&self, left: &AccumulatorEffect, right: &AccumulatorEffect) -> AccumulatorEffect {
        self.sequentially(left, right)
    }
}

/// A real value integrating a piecewise-constant rate.
#[derive(Debug, Clone, Copy, Default)]
pub struct Accumulator;

impl CellType for Accumulator {
    type State = AccumulatorState;
    type Effect = AccumulatorEffect;

    fn effect_trait(&self) -> &dyn EffectTrait<AccumulatorEffect> {
        &AccumulatorEffectTrait
    }

    fn duplicate(&self, state: &AccumulatorState) -> AccumulatorState {
        *state
    }

    fn apply(&self, state: &mut AccumulatorState, effect: &AccumulatorEffect) {
        state.value += effect.value_delta;
        state.rate += effect.rate_delta;
    }

    fn step(&self, state: &mut AccumulatorState, elapsed: Duration) {
        if elapsed.is_zero() {
            return;
        }
        state.value = state.rate.mul_add(elapsed.ratio_over(Duration::SECOND), state.value);
    }

    fn serialize(&self, state: &AccumulatorState) -> SerializedValue {
        SerializedValue::map([
            ("value", SerializedValue::Real(state.value)),
            ("rate", SerializedValue::Real(state.rate)),
        ])
    }

    fn deserialize(&self, value: &SerializedValue) -> Result<AccumulatorState, MapperError> {
        let field = |name: &str| {
            value
                .as_map()
                .and_then(|fields| fields.get(name))
                .and_then(SerializedValue::as_real)
                .ok_or(MapperError::UnexpectedKind {
                    expected: "accumulator state",
                    found: value.kind(),
                })
        };
        Ok(AccumulatorState {
            value: field("value")?,
            rate: field("rate")?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use orrery_types::IntValueMapper;

    use super::*;

    type IntRegister = Register<i64, IntValueMapper>;

    #[test]
    fn register_concurrent_conflict_is_commutative_and_associative() {
        let t = RegisterEffectTrait::<i64>::default();
        let samples = [
            RegisterEffect::unchanged(),
            RegisterEffect::set(1),
            RegisterEffect::set(2),
            RegisterEffect { set: None, conflicted: true },
            RegisterEffect { set: Some(1), conflicted: true },
        ];
        for a in &samples {
            assert_eq!(t.concurrently(&t.empty(), a), *a);
            assert_eq!(t.sequentially(&t.empty(), a), *a);
            assert_eq!(t.sequentially(a, &t.empty()), *a);
            for b in &samples {
                assert_eq!(t.concurrently(a, b), t.concurrently(b, a));
                for c in &samples {
                    assert_eq!(
                        t.concurrently(&t.concurrently(a, b), c),
                        t.concurrently(a, &t.concurrently(b, c))
                    );
                }
            }
        }
    }

    #[test]
    fn register_conflict_is_sticky_until_set() {
        let cell = IntRegister::new(IntValueMapper);
        let t = cell.effect_trait();
        let mut state = RegisterState { value: 0, conflicted: false };

        cell.apply(&mut state, &t.concurrently(&RegisterEffect::set(1), &RegisterEffect::set(2)));
        assert_eq!(state, RegisterState { value: 0, conflicted: true });

        cell.apply(&mut state, &RegisterEffect::unchanged());
        assert!(state.conflicted);

        cell.apply(&mut state, &RegisterEffect::set(5));
        assert_eq!(state, RegisterState { value: 5, conflicted: false });
    }

    #[test]
    fn register_serialization_round_trip() {
        let cell = IntRegister::new(IntValueMapper);
        let state = RegisterState { value: 9, conflicted: true };
        let back = cell.deserialize(&cell.serialize(&state)).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn accumulator_steps_linearly() {
        let cell = Accumulator;
        let mut state = AccumulatorState { value: 10.0, rate: 2.0 };
        cell.step(&mut state, Duration::ZERO);
        assert_eq!(state.value, 10.0);
        cell.step(&mut state, Duration::of(5, Duration::SECOND));
        assert_eq!(state.value, 20.0);
        cell.apply(&mut state, &AccumulatorEffect::add_rate(-2.0));
        cell.step(&mut state, Duration::SECOND);
        assert_eq!(state.value, 20.0);
    }

    #[test]
    fn counter_deserialize_rejects_non_int() {
        assert!(Counter.deserialize(&SerializedValue::Real(1.0)).is_err());
        assert_eq!(Counter.deserialize(&SerializedValue::Int(3)).unwrap(), 3);
    }
}
