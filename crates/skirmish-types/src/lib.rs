//! `skirmish-types` – wire data model shared by every Skirmish crate.
//!
//! An [`Observation`] is the combat snapshot a game bridge submits for one
//! request; a [`Decision`] is what the policy answers. Both are plain serde
//! records that live for exactly one connection.

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Health assumed when the bridge omits `bot_health`.
pub const DEFAULT_HEALTH: f64 = 20.0;

/// Distance assumed for an entity that does not report one. Far enough that
/// it never counts as nearby.
pub const UNKNOWN_ENTITY_DISTANCE: f64 = 99.0;

fn default_health() -> f64 {
    DEFAULT_HEALTH
}

fn unknown_distance() -> f64 {
    UNKNOWN_ENTITY_DISTANCE
}

fn no_entities() -> Value {
    Value::Array(Vec::new())
}

/// Decode an informational field, keeping the default when it has the wrong
/// shape. Nothing decides on these fields, so a bad one must not sink the
/// whole request.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

fn distance_object(distance: f64) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("distance".to_string(), Value::from(distance));
    fields
}

// ─────────────────────────────────────────────────────────────────────────────
// Observation
// ─────────────────────────────────────────────────────────────────────────────

/// Snapshot of the agent's combat situation, as sent by the game bridge.
///
/// Only `bot_health` is checked when the request is decoded. `nearest_hostile`
/// and `all_entities` stay as raw JSON until a rule asks for them through
/// [`Observation::hostile`] and [`Observation::entities`], so a request that
/// is settled by health alone never fails on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Observation {
    /// Current health in `[0, 20]`.
    #[serde(default = "default_health")]
    pub bot_health: f64,
    #[serde(default, deserialize_with = "lenient")]
    #[schemars(with = "Option<f64>")]
    pub bot_food: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    #[schemars(with = "Option<Position>")]
    pub bot_pos: Option<Position>,
    /// `None` (or JSON `null`) means no hostile threat.
    #[serde(default)]
    #[schemars(with = "Option<Hostile>")]
    pub nearest_hostile: Option<Value>,
    #[serde(default = "no_entities")]
    #[schemars(with = "Vec<Entity>")]
    pub all_entities: Value,
    #[serde(default, deserialize_with = "lenient")]
    #[schemars(with = "bool")]
    pub has_sword: bool,
    #[serde(default, deserialize_with = "lenient")]
    #[schemars(with = "bool")]
    pub has_shield: bool,
    #[serde(default, deserialize_with = "lenient")]
    #[schemars(with = "bool")]
    pub has_bow: bool,
}

impl Default for Observation {
    fn default() -> Self {
        Self {
            bot_health: DEFAULT_HEALTH,
            bot_food: None,
            bot_pos: None,
            nearest_hostile: None,
            all_entities: no_entities(),
            has_sword: false,
            has_shield: false,
            has_bow: false,
        }
    }
}

impl Observation {
    /// Decode the nearest hostile, if any.
    ///
    /// # Errors
    ///
    /// [`SkirmishError::Decode`] when the field is present but is not an
    /// object with a numeric `distance`.
    pub fn hostile(&self) -> Result<Option<Hostile>, SkirmishError> {
        self.nearest_hostile
            .as_ref()
            .map(Hostile::deserialize)
            .transpose()
            .map_err(|e| SkirmishError::Decode(format!("nearest_hostile: {e}")))
    }

    /// Decode the surrounding entities.
    ///
    /// # Errors
    ///
    /// [`SkirmishError::Decode`] when `all_entities` is not a list of objects
    /// or an entry carries a non-numeric `distance`.
    pub fn entities(&self) -> Result<Vec<Entity>, SkirmishError> {
        Vec::<Entity>::deserialize(&self.all_entities)
            .map_err(|e| SkirmishError::Decode(format!("all_entities: {e}")))
    }

    pub fn with_health(mut self, health: f64) -> Self {
        self.bot_health = health;
        self
    }

    pub fn with_hostile(mut self, hostile: Hostile) -> Self {
        let mut fields = distance_object(hostile.distance);
        fields.insert("angle".to_string(), Value::from(hostile.angle));
        self.nearest_hostile = Some(Value::Object(fields));
        self
    }

    pub fn with_entities(mut self, entities: &[Entity]) -> Self {
        self.all_entities = entities
            .iter()
            .map(|e| Value::Object(distance_object(e.distance)))
            .collect();
        self
    }
}

/// World position of the agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Position {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

/// The nearest threatening entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Hostile {
    /// Distance in blocks; required.
    pub distance: f64,
    /// Bearing relative to the agent's facing, in degrees.
    #[serde(default)]
    pub angle: f64,
}

/// Any entity near the agent. Fields other than `distance` are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Entity {
    #[serde(default = "unknown_distance")]
    pub distance: f64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Decision
// ─────────────────────────────────────────────────────────────────────────────

/// The fixed set of actions a policy may choose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Attack,
    StrafeLeft,
    StrafeRight,
    Flee,
    /// Reserved: the built-in heuristic never emits it.
    UseItem,
    Idle,
}

impl Action {
    /// Wire name of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Attack => "attack",
            Action::StrafeLeft => "strafe_left",
            Action::StrafeRight => "strafe_right",
            Action::Flee => "flee",
            Action::UseItem => "use_item",
            Action::Idle => "idle",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chosen action with a relative certainty score in `(0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Decision {
    pub action: Action,
    pub confidence: f64,
}

impl Decision {
    pub fn new(action: Action, confidence: f64) -> Self {
        Self { action, confidence }
    }

    /// The low-confidence `idle` answer sent when a request cannot be processed.
    pub fn fallback() -> Self {
        Self::new(Action::Idle, 0.5)
    }

    /// `true` when `confidence` lies in `(0, 1]`.
    pub fn has_valid_confidence(&self) -> bool {
        self.confidence > 0.0 && self.confidence <= 1.0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Error type spanning transport, decoding, model and configuration failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SkirmishError {
    #[error("Bind Error: {0}")]
    Bind(String),

    #[error("I/O Error: {0}")]
    Io(String),

    #[error("Decode Error: {0}")]
    Decode(String),

    #[error("Model Unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Model Inference Failed: {0}")]
    ModelInference(String),

    #[error("Config Error: {0}")]
    Config(String),
}
