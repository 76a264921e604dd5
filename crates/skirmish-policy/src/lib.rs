//! `skirmish-policy` – the decision engine.
//!
//! Maps an [`Observation`] onto a [`Decision`]. Every implementation sits
//! behind the [`Policy`] capability so the server never knows which one it is
//! talking to.
//!
//! # Modules
//!
//! - [`heuristic`] – [`HeuristicPolicy`]: the built-in, ordered
//!   first-match rule chain, with an injectable [`CoinFlip`] for the one
//!   randomised rule.
//! - [`model`] – [`ModelPolicy`]: an external inference endpoint reached
//!   over HTTP. Any inference failure is answered by the heuristic instead.
//! - [`select`] – [`select_policy`]: the one-shot startup loader that picks
//!   the active policy and degrades to the heuristic when the model cannot
//!   be loaded.

pub mod heuristic;
pub mod model;
pub mod select;

pub use heuristic::{CoinFlip, FixedCoin, HeuristicPolicy, Rule, ThreadRngCoin};
pub use model::{ModelPolicy, ModelSettings};
pub use select::{PolicyKind, Selection, select_policy};

use skirmish_types::{Decision, Observation};

/// A function-shaped capability: `observation → decision`.
///
/// Implementations must be total. A policy that cannot reach a verdict
/// returns a default decision rather than failing.
pub trait Policy: Send + Sync {
    /// Short name used in logs (e.g. `"heuristic"`).
    fn name(&self) -> &str;

    /// Choose an action for `observation`.
    fn decide(&self, observation: &Observation) -> Decision;
}

/// Adapts a plain closure into a [`Policy`].
///
/// ```rust
/// use skirmish_policy::{FnPolicy, Policy};
/// use skirmish_types::{Action, Decision, Observation};
///
/// let always_flee = FnPolicy::new("coward", |_obs: &Observation| {
///     Decision::new(Action::Flee, 1.0)
/// });
/// assert_eq!(always_flee.decide(&Observation::default()).action, Action::Flee);
/// ```
pub struct FnPolicy<F> {
    name: String,
    decide: F,
}

impl<F> FnPolicy<F>
where
    F: Fn(&Observation) -> Decision + Send + Sync,
{
    pub fn new(name: impl Into<String>, decide: F) -> Self {
        Self {
            name: name.into(),
            decide,
        }
    }
}

impl<F> Policy for FnPolicy<F>
where
    F: Fn(&Observation) -> Decision + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn decide(&self, observation: &Observation) -> Decision {
        (self.decide)(observation)
    }
}
