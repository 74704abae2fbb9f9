//! Time-varying values and how long they stay valid.
//!
//! A [`Dynamics`] is a value that evolves on its own as time passes:
//! `extract` reads it now, `step` moves it forward. Resources hand out
//! dynamics wrapped in [`DelimitedDynamics`], whose [`Expiry`] says how
//! long the law holds before the resource has to be queried again.

use core::cmp::Ordering;
use core::fmt;
use std::sync::Arc;

use orrery_types::Duration;
use serde::{Deserialize, Serialize};

/// A value that evolves with elapsed time.
pub trait Dynamics: Clone + Send + Sync + 'static {
    /// The instantaneous value type.
    type Value;

    /// The value now.
    fn extract(&self) -> Self::Value;

    /// The dynamics `elapsed` from now.
    #[must_use]
    fn step(&self, elapsed: Duration) -> Self;
}

// ----------------------------------------------------------------------
// Real dynamics
// ----------------------------------------------------------------------

/// A real value changing at a constant rate per second.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RealDynamics {
    /// Value now.
    pub initial: f64,
    /// Change per simulated second.
    pub rate: f64,
}

impl RealDynamics {
    /// A value that never changes.
    pub const fn constant(value: f64) -> Self {
        Self {
            initial: value,
            rate: 0.0,
        }
    }

    /// A value starting at `initial` and changing by `rate` per second.
    pub const fn linear(initial: f64, rate: f64) -> Self {
        Self { initial, rate }
    }

    /// Pointwise sum.
    #[must_use]
    pub fn plus(self, other: Self) -> Self {
        Self::linear(self.initial + other.initial, self.rate + other.rate)
    }

    /// Pointwise difference.
    #[must_use]
    pub fn minus(self, other: Self) -> Self {
        Self::linear(self.initial - other.initial, self.rate - other.rate)
    }

    /// Pointwise scaling.
    #[must_use]
    pub fn scaled_by(self, scalar: f64) -> Self {
        Self::linear(self.initial * scalar, self.rate * scalar)
    }

    /// Value `elapsed` from now.
    pub fn value_at(&self, elapsed: Duration) -> f64 {
        self.rate.mul_add(elapsed.ratio_over(Duration::SECOND), self.initial)
    }
}

impl Dynamics for RealDynamics {
    type Value = f64;

    fn extract(&self) -> f64 {
        self.initial
    }

    fn step(&self, elapsed: Duration) -> Self {
        Self::linear(self.value_at(elapsed), self.rate)
    }
}

// ----------------------------------------------------------------------
// Discrete dynamics
// ----------------------------------------------------------------------

/// A value that only changes when an event changes it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Discrete<T>(pub T);

impl<T: Clone + Send + Sync + 'static> Dynamics for Discrete<T> {
    type Value = T;

    fn extract(&self) -> T {
        self.0.clone()
    }

    fn step(&self, _elapsed: Duration) -> Self {
        self.clone()
    }
}

// ----------------------------------------------------------------------
// Black-box dynamics
// ----------------------------------------------------------------------

/// A real value known only through point samples.
///
/// The function maps an offset from the moment the dynamics were produced
/// to a value. Nothing about its shape is known, so conditions over it are
/// solved by approximation.
#[derive(Clone)]
pub struct BlackBox {
    function: Arc<dyn Fn(Duration) -> f64 + Send + Sync>,
    offset: Duration,
}

impl BlackBox {
    /// Wrap a sampling function.
    pub fn new<F: Fn(Duration) -> f64 + Send + Sync + 'static>(function: F) -> Self {
        Self {
            function: Arc::new(function),
            offset: Duration::ZERO,
        }
    }

    /// Value `elapsed` from now.
    pub fn value_at(&self, elapsed: Duration) -> f64 {
        (self.function)(self.offset.saturating_plus(elapsed))
    }
}

impl Dynamics for BlackBox {
    type Value = f64;

    fn extract(&self) -> f64 {
        self.value_at(Duration::ZERO)
    }

    fn step(&self, elapsed: Duration) -> Self {
        Self {
            function: Arc::clone(&self.function),
            offset: self.offset.saturating_plus(elapsed),
        }
    }
}

impl fmt::Debug for BlackBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlackBox")
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

// ----------------------------------------------------------------------
// Expiry
// ----------------------------------------------------------------------

/// How long, from now, a dynamics stays valid. `None` means forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Expiry(Option<Duration>);

impl Expiry {
    /// Valid forever.
    pub const NEVER: Self = Self(None);

    /// Valid until `elapsed` from now.
    pub const fn at(elapsed: Duration) -> Self {
        Self(Some(elapsed))
    }

    /// The expiry time, if any.
    pub const fn value(self) -> Option<Duration> {
        self.0
    }

    /// Whether this never expires.
    pub const fn is_never(self) -> bool {
        self.0.is_none()
    }

    /// The earlier of two expiries.
    #[must_use]
    pub fn min(self, other: Self) -> Self {
        Ord::min(self, other)
    }

    /// The same expiry seen `elapsed` later.
    #[must_use]
    pub const fn minus(self, elapsed: Duration) -> Self {
        match self.0 {
            Some(at) => Self(Some(at.saturating_minus(elapsed))),
            None => Self(None),
        }
    }

    /// Latest instant at which the dynamics are still valid, for clipping
    /// windows.
    pub const fn bound(self) -> Duration {
        match self.0 {
            Some(at) => at,
            None => Duration::MAX_VALUE,
        }
    }
}

impl PartialOrd for Expiry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Finite expiries order by time; [`Expiry::NEVER`] is greatest.
impl Ord for Expiry {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.0, other.0) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => a.cmp(&b),
        }
    }
}

/// A dynamics paired with the span over which it holds.
#[derive(Debug, Clone, PartialEq)]
pub struct DelimitedDynamics<D> {
    /// The law.
    pub dynamics: D,
    /// When the law stops holding.
    pub expiry: Expiry,
}

impl<D> DelimitedDynamics<D> {
    /// Dynamics valid forever.
    pub const fn persistent(dynamics: D) -> Self {
        Self {
            dynamics,
            expiry: Expiry::NEVER,
        }
    }

    /// Dynamics valid until `expiry`.
    pub const fn delimited(expiry: Expiry, dynamics: D) -> Self {
        Self { dynamics, expiry }
    }

    /// Transform the dynamics, keeping the expiry.
    pub fn map<E, F: FnOnce(D) -> E>(self, f: F) -> DelimitedDynamics<E> {
        DelimitedDynamics {
            dynamics: f(self.dynamics),
            expiry: self.expiry,
        }
    }

    /// Combine with another delimited dynamics. The result expires when
    /// either input does.
    pub fn combine<B, E, F: FnOnce(D, B) -> E>(self, other: DelimitedDynamics<B>, f: F) -> DelimitedDynamics<E> {
        DelimitedDynamics {
            dynamics: f(self.dynamics, other.dynamics),
            expiry: self.expiry.min(other.expiry),
        }
    }
}
