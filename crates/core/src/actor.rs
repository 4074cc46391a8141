//! Actor identity recorded against every transition.
//!
//! Authentication happens outside the core. Callers pass in the already-authenticated identity
//! and the core records the actor id on status history and in event frames.

use crate::{FlowError, FlowResult};
use flow_uuid::ActorId;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Staff role of the actor performing an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    FrontDesk,
    Nurse,
    Physician,
    Coordinator,
    /// Automated or scripted changes (CLI replays, maintenance jobs).
    System,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::FrontDesk => "front_desk",
            ActorRole::Nurse => "nurse",
            ActorRole::Physician => "physician",
            ActorRole::Coordinator => "coordinator",
            ActorRole::System => "system",
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActorRole {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "front_desk" => Ok(ActorRole::FrontDesk),
            "nurse" => Ok(ActorRole::Nurse),
            "physician" => Ok(ActorRole::Physician),
            "coordinator" => Ok(ActorRole::Coordinator),
            "system" => Ok(ActorRole::System),
            other => Err(FlowError::Validation(format!("unknown actor role '{other}'"))),
        }
    }
}

/// Authenticated staff identity acting on the queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(id: ActorId, role: ActorRole) -> Self {
        Self { id, role }
    }

    /// Build an actor from raw header/CLI values.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Identifier`] for a non-canonical id and
    /// [`FlowError::Validation`] for an unknown role.
    pub fn parse(id: &str, role: &str) -> FlowResult<Self> {
        Ok(Self {
            id: ActorId::parse(id.trim())?,
            role: role.parse()?,
        })
    }
}
