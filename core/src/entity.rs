//! Every simulation object lives in the registry as one of these variants.

use crate::{
    headquarters::Headquarters,
    incident::{Firing, Intervention},
    patrol::Patrol,
    types::{Coordinate, EntityId, SimTime},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Patrol,
    Intervention,
    Firing,
    Headquarters,
}

impl EntityKind {
    pub fn is_incident(&self) -> bool {
        matches!(self, Self::Intervention | Self::Firing)
    }
}

#[derive(Debug)]
pub enum Entity {
    Patrol(Patrol),
    Intervention(Intervention),
    Firing(Firing),
    Headquarters(Headquarters),
}

impl Entity {
    pub fn id(&self) -> EntityId {
        match self {
            Self::Patrol(p)       => p.id,
            Self::Intervention(i) => i.id,
            Self::Firing(f)       => f.id,
            Self::Headquarters(h) => h.id,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Patrol(_)       => EntityKind::Patrol,
            Self::Intervention(_) => EntityKind::Intervention,
            Self::Firing(_)       => EntityKind::Firing,
            Self::Headquarters(_) => EntityKind::Headquarters,
        }
    }

    pub fn position(&self) -> Coordinate {
        match self {
            Self::Patrol(p)       => p.position(),
            Self::Intervention(i) => i.position,
            Self::Firing(f)       => f.position,
            Self::Headquarters(h) => h.position,
        }
    }

    /// Incidents report their activity flag; everything else is always active.
    pub fn is_active(&self) -> bool {
        match self {
            Self::Intervention(i) => i.core.active,
            Self::Firing(f)       => f.core.active,
            _                     => true,
        }
    }

    pub fn incident_start(&self) -> Option<SimTime> {
        match self {
            Self::Intervention(i) => Some(i.core.start_time),
            Self::Firing(f)       => Some(f.core.start_time),
            _                     => None,
        }
    }

    pub fn as_headquarters(&self) -> Option<&Headquarters> {
        match self {
            Self::Headquarters(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_patrol(&self) -> Option<&Patrol> {
        match self {
            Self::Patrol(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_patrol_mut(&mut self) -> Option<&mut Patrol> {
        match self {
            Self::Patrol(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_firing(&self) -> Option<&Firing> {
        match self {
            Self::Firing(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_firing_mut(&mut self) -> Option<&mut Firing> {
        match self {
            Self::Firing(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_intervention(&self) -> Option<&Intervention> {
        match self {
            Self::Intervention(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_intervention_mut(&mut self) -> Option<&mut Intervention> {
        match self {
            Self::Intervention(i) => Some(i),
            _ => None,
        }
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}#{} at {}", self.kind(), self.id(), self.position())
    }
}

/// What the registry should do with an entity after one of its steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Keep,
    Remove,
}
