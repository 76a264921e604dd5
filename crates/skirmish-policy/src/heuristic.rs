//! [`HeuristicPolicy`] – the built-in rule chain.
//!
//! Rules are evaluated top to bottom; the first one that matches decides and
//! nothing after it is consulted.
//!
//! | # | Rule             | Condition                                   | Action                | Confidence |
//! |---|------------------|---------------------------------------------|-----------------------|-----------:|
//! | 1 | `CriticalHealth` | `bot_health ≤ 4`                            | `flee`                | 0.99 |
//! | 2 | `NoHostile`      | no hostile                                  | `idle`                | 0.95 |
//! | 3 | –                | decode hostile and entities, count nearby   | –                     | –    |
//! | 4 | `Swarmed`        | ≥ 3 entities closer than 8 and health < 15  | `flee`                | 0.85 |
//! | 5 | `TargetBehind`   | `abs(angle) > 90`                           | `strafe_left`         | 0.7  |
//! | 6 | `ClosingIn`      | `distance > 6`                              | `attack`              | 0.6  |
//! | 7 | `CloseStrike`    | `distance ≤ 3` and `abs(angle) < 45`        | `attack`              | 0.95 |
//! | 8 | `MidRangeJitter` | `distance ≤ 6`                              | coin flip strafe      | 0.75 |
//! | 9 | `Default`        | anything else                               | `attack`              | 0.6  |
//!
//! The hostile and the entity list are only decoded at step 3. When either is
//! malformed, [`Policy::decide`] answers with [`Decision::fallback`]; rules 1
//! and 2 never look at them.
//!
//! # Example
//!
//! ```rust
//! use skirmish_policy::{FixedCoin, HeuristicPolicy, Rule};
//! use skirmish_types::{Action, Hostile, Observation};
//!
//! let policy = HeuristicPolicy::with_coin(FixedCoin(true));
//! let obs = Observation::default()
//!     .with_health(5.0)
//!     .with_hostile(Hostile { distance: 3.0, angle: 10.0 });
//! let (rule, decision) = policy.evaluate(&obs).unwrap();
//! assert_eq!(rule, Rule::CloseStrike);
//! assert_eq!(decision.action, Action::Attack);
//! ```

use rand::Rng;
use skirmish_types::{Action, Decision, Entity, Hostile, Observation, SkirmishError};
use tracing::{debug, warn};

use crate::Policy;

/// At or below this health the agent always flees.
pub const CRITICAL_HEALTH: f64 = 4.0;
/// Below this health a swarm triggers a retreat.
pub const SWARM_HEALTH_CEILING: f64 = 15.0;
/// Entities strictly closer than this count towards a swarm.
pub const NEARBY_RADIUS: f64 = 8.0;
/// Number of nearby entities that makes a swarm.
pub const SWARM_SIZE: usize = 3;

// ─────────────────────────────────────────────────────────────────────────────
// Randomness
// ─────────────────────────────────────────────────────────────────────────────

/// Source of the unbiased binary choice used by the mid-range rule.
pub trait CoinFlip: Send + Sync {
    /// Return `true` or `false` with equal probability.
    fn flip(&self) -> bool;
}

/// Coin backed by the thread-local RNG. Never seeded from request content.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngCoin;

impl CoinFlip for ThreadRngCoin {
    fn flip(&self) -> bool {
        rand::thread_rng().gen_bool(0.5)
    }
}

/// Coin that always lands the same way.
#[derive(Debug, Clone, Copy)]
pub struct FixedCoin(pub bool);

impl CoinFlip for FixedCoin {
    fn flip(&self) -> bool {
        self.0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Rule
// ─────────────────────────────────────────────────────────────────────────────

/// The rule that produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    CriticalHealth,
    NoHostile,
    Swarmed,
    TargetBehind,
    ClosingIn,
    CloseStrike,
    MidRangeJitter,
    Default,
}

impl Rule {
    pub fn name(&self) -> &'static str {
        match self {
            Rule::CriticalHealth => "critical_health",
            Rule::NoHostile => "no_hostile",
            Rule::Swarmed => "swarmed",
            Rule::TargetBehind => "target_behind",
            Rule::ClosingIn => "closing_in",
            Rule::CloseStrike => "close_strike",
            Rule::MidRangeJitter => "mid_range_jitter",
            Rule::Default => "default",
        }
    }
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HeuristicPolicy
// ─────────────────────────────────────────────────────────────────────────────

/// Stateless rule-based policy.
#[derive(Debug, Clone, Default)]
pub struct HeuristicPolicy<C = ThreadRngCoin> {
    coin: C,
}

impl HeuristicPolicy {
    /// Heuristic with the thread-RNG coin.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<C: CoinFlip> HeuristicPolicy<C> {
    /// Heuristic with a caller-supplied coin (tests use [`FixedCoin`]).
    pub fn with_coin(coin: C) -> Self {
        Self { coin }
    }

    /// Run the rule chain and report which rule fired.
    ///
    /// # Errors
    ///
    /// [`SkirmishError::Decode`] when rules 1 and 2 do not apply and the
    /// hostile or the entity list is malformed.
    pub fn evaluate(&self, obs: &Observation) -> Result<(Rule, Decision), SkirmishError> {
        let health = obs.bot_health;

        if health <= CRITICAL_HEALTH {
            return Ok((Rule::CriticalHealth, Decision::new(Action::Flee, 0.99)));
        }
        let Some(hostile) = obs.hostile()? else {
            return Ok((Rule::NoHostile, Decision::new(Action::Idle, 0.95)));
        };
        let entities = obs.entities()?;
        Ok(self.engage(health, hostile, &entities))
    }

    /// Rules 4 to 9, for a hostile that is known to be present.
    pub fn engage(&self, health: f64, hostile: Hostile, entities: &[Entity]) -> (Rule, Decision) {
        let dist = hostile.distance;
        let angle = hostile.angle.abs();
        let nearby_count = entities
            .iter()
            .filter(|e| e.distance < NEARBY_RADIUS)
            .count();

        if nearby_count >= SWARM_SIZE && health < SWARM_HEALTH_CEILING {
            return (Rule::Swarmed, Decision::new(Action::Flee, 0.85));
        }
        if angle > 90.0 {
            return (Rule::TargetBehind, Decision::new(Action::StrafeLeft, 0.7));
        }
        if dist > 6.0 {
            return (Rule::ClosingIn, Decision::new(Action::Attack, 0.6));
        }
        if dist <= 3.0 && angle < 45.0 {
            return (Rule::CloseStrike, Decision::new(Action::Attack, 0.95));
        }
        if dist <= 6.0 {
            let action = if self.coin.flip() {
                Action::StrafeLeft
            } else {
                Action::StrafeRight
            };
            return (Rule::MidRangeJitter, Decision::new(action, 0.75));
        }
        // Only reachable when the comparisons above are all false (NaN).
        (Rule::Default, Decision::new(Action::Attack, 0.6))
    }
}

impl<C: CoinFlip> Policy for HeuristicPolicy<C> {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn decide(&self, observation: &Observation) -> Decision {
        match self.evaluate(observation) {
            Ok((rule, decision)) => {
                debug!(rule = %rule, action = %decision.action, "heuristic rule matched");
                decision
            }
            Err(e) => {
                warn!(error = %e, "observation unusable; answering with fallback");
                Decision::fallback()
            }
        }
    }
}
