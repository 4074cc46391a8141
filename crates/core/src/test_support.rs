//! Shared fixtures for unit tests.

use crate::actor::{Actor, ActorRole};
use crate::clock::ManualClock;
use crate::config::CoreConfig;
use crate::directory::{InMemoryDirectory, PatientSummary};
use crate::tenant::TenantFlow;
use chrono::{DateTime, TimeZone, Utc};
use flow_types::NonEmptyText;
use flow_uuid::{ActorId, PatientId, TenantId, Uuid};
use std::sync::Arc;

pub(crate) struct Fixture {
    pub flow: Arc<TenantFlow>,
    pub clock: Arc<ManualClock>,
    pub clock_start: DateTime<Utc>,
    pub patients: Vec<PatientId>,
    pub front_desk: Actor,
    pub nurse: Actor,
    pub physician: Actor,
    pub coordinator: Actor,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(CoreConfig::default())
    }

    pub fn with_config(config: CoreConfig) -> Self {
        let tenant_id = TenantId::from_uuid(Uuid::from_u128(0x7e));
        let patients: Vec<PatientId> = (1..=5)
            .map(|n| PatientId::from_uuid(Uuid::from_u128(0x100 + n)))
            .collect();

        let mut directory = InMemoryDirectory::new();
        for (n, patient_id) in patients.iter().enumerate() {
            directory.insert(
                tenant_id,
                PatientSummary {
                    patient_id: *patient_id,
                    display_name: NonEmptyText::new(format!("Patient {}", n + 1))
                        .expect("fixture name"),
                    contact: None,
                },
            );
        }

        let clock_start = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(clock_start));
        let flow = Arc::new(
            TenantFlow::open(tenant_id, config, clock.clone(), Arc::new(directory))
                .expect("open tenant"),
        );

        let actor = |n: u128, role| Actor::new(ActorId::from_uuid(Uuid::from_u128(n)), role);
        Self {
            flow,
            clock,
            clock_start,
            patients,
            front_desk: actor(0xa1, ActorRole::FrontDesk),
            nurse: actor(0xa2, ActorRole::Nurse),
            physician: actor(0xa3, ActorRole::Physician),
            coordinator: actor(0xa4, ActorRole::Coordinator),
        }
    }
}
