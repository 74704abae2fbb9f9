//! Resource dynamics and condition solving for Orrery.
//!
//! Resources turn cell state into time-varying values; conditions ask when
//! those values satisfy a predicate.
//!
//! - [`dynamics`] -- [`Dynamics`] laws (linear, discrete, black-box) and
//!   [`DelimitedDynamics`] with their [`Expiry`].
//! - [`resource`] -- the [`Resource`] trait and helpers that build
//!   resources from cells and from other resources.
//! - [`condition`] -- the [`Condition`] trait, exact solving for linear
//!   dynamics, discrete membership, and `and` / `or` / `not`.
//! - [`secant`] -- piecewise-linear approximation of black boxes with
//!   uniform or error-bounded adaptive sampling.
//!
//! # Design Principles
//!
//! - Evaluation is read-only. Resources and conditions only ever see a
//!   [`orrery_timeline::Querier`], never a scheduler.
//! - Answers carry their expiry. A condition never claims anything about
//!   time past the point where the dynamics it read stop being valid.

pub mod condition;
pub mod dynamics;
pub mod error;
pub mod resource;
pub mod secant;

pub use condition::{
    BlackBoxCondition, Comparison, Condition, DiscreteCondition, RealCondition, Satisfaction,
    SharedCondition, and, not, or, solve_linear,
};
pub use dynamics::{BlackBox, DelimitedDynamics, Discrete, Dynamics, Expiry, RealDynamics};
pub use error::ResourceError;
pub use resource::{Resource, SharedResource};
pub use secant::{Approximation, ErrorEstimate, SamplingStrategy, SecantConfig, approximate, secant};
