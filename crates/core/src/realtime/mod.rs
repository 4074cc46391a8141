//! Tenant-scoped change propagation.
//!
//! Every committed mutation produces a [`FlowEvent`] (journey actions produce exactly one),
//! wrapped in a sequenced [`FlowEventFrame`] and broadcast on the tenant's [`TenantEventBus`].
//! Frames carry the full post-commit records so a viewer can update its replica without a
//! follow-up read.

mod bus;
mod view;

pub use bus::TenantEventBus;
pub use view::{QueueView, ViewUpdate};

use crate::encounter::Encounter;
use crate::journey::JourneyAction;
use crate::queue::{QueueEntry, QueueStatus};
use chrono::{DateTime, Utc};
use flow_uuid::{ActorId, TenantId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowEvent {
    EntryAdded {
        entry: QueueEntry,
    },
    EntryUpdated {
        entry: QueueEntry,
    },
    JourneyAdvanced {
        action: JourneyAction,
        from: QueueStatus,
        entry: QueueEntry,
        encounter: Option<Encounter>,
        actor_id: ActorId,
    },
    EncounterChanged {
        encounter: Encounter,
    },
    /// Authoritative pending entries after a manual reorder.
    QueueReordered {
        entries: Vec<QueueEntry>,
    },
}

impl FlowEvent {
    /// Name used for the SSE `event:` field.
    pub fn event_name(&self) -> &'static str {
        match self {
            FlowEvent::EntryAdded { .. } => "entry_added",
            FlowEvent::EntryUpdated { .. } => "entry_updated",
            FlowEvent::JourneyAdvanced { .. } => "journey_advanced",
            FlowEvent::EncounterChanged { .. } => "encounter_changed",
            FlowEvent::QueueReordered { .. } => "queue_reordered",
        }
    }

    /// Queue entries carried by this event.
    pub fn entries(&self) -> Vec<&QueueEntry> {
        match self {
            FlowEvent::EntryAdded { entry }
            | FlowEvent::EntryUpdated { entry }
            | FlowEvent::JourneyAdvanced { entry, .. } => vec![entry],
            FlowEvent::QueueReordered { entries } => entries.iter().collect(),
            FlowEvent::EncounterChanged { .. } => Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEventFrame {
    pub sequence: u64,
    pub tenant_id: TenantId,
    pub emitted_at: DateTime<Utc>,
    pub event: FlowEvent,
}
