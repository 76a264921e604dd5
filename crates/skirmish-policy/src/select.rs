//! Startup policy selection.
//!
//! [`select_policy`] runs once, before the listener starts. Its result is
//! shared read-only by every connection for the life of the process.

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use skirmish_types::SkirmishError;
use tracing::{info, warn};

use crate::{HeuristicPolicy, ModelPolicy, ModelSettings, Policy};

/// Which policy the operator asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    #[default]
    Heuristic,
    #[serde(alias = "vpt")]
    Model,
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyKind::Heuristic => write!(f, "heuristic"),
            PolicyKind::Model => write!(f, "model"),
        }
    }
}

impl FromStr for PolicyKind {
    type Err = SkirmishError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "heuristic" => Ok(PolicyKind::Heuristic),
            "model" | "vpt" => Ok(PolicyKind::Model),
            other => Err(SkirmishError::Config(format!("unknown policy '{other}'"))),
        }
    }
}

/// Outcome of startup selection.
#[derive(Clone)]
pub struct Selection {
    /// What the operator asked for.
    pub requested: PolicyKind,
    /// What will actually answer requests.
    pub policy: Arc<dyn Policy>,
}

impl Selection {
    /// Name of the active policy.
    pub fn active(&self) -> &str {
        self.policy.name()
    }

    /// `true` when the requested policy could not be honoured.
    pub fn degraded(&self) -> bool {
        self.requested == PolicyKind::Model && self.active() != "model"
    }
}

impl std::fmt::Debug for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selection")
            .field("requested", &self.requested)
            .field("active", &self.active())
            .finish()
    }
}

/// Pick the active policy.
///
/// Never fails: any problem with the model degrades to [`HeuristicPolicy`]
/// with a warning. A healthy model only answers requests when
/// [`ModelSettings::route_decisions`] is set.
pub fn select_policy(kind: PolicyKind, settings: &ModelSettings) -> Selection {
    let heuristic = || -> Arc<dyn Policy> { Arc::new(HeuristicPolicy::new()) };

    let policy: Arc<dyn Policy> = match kind {
        PolicyKind::Heuristic => heuristic(),
        PolicyKind::Model => match ModelPolicy::load(settings.clone()) {
            Err(e) => {
                warn!(error = %e, "model unavailable; using heuristic");
                heuristic()
            }
            Ok(_) if !settings.route_decisions => {
                warn!(
                    model = %settings.name,
                    "model loaded but route_decisions is off; using heuristic"
                );
                heuristic()
            }
            Ok(model) => Arc::new(model),
        },
    };

    let selection = Selection {
        requested: kind,
        policy,
    };
    info!(requested = %selection.requested, active = selection.active(), "policy selected");
    selection
}
