//! Per-tenant state and the registry that owns it.
//!
//! Each tenant is an isolated [`TenantFlow`]: its own queue and encounter stores behind one
//! mutex, its own event topic, and (optionally) its own snapshot file. All writes go through
//! [`TenantFlow::transact`], which stages changes on a copy of the state and only swaps the copy
//! in once every check has passed and the snapshot (if any) is on disk.

use crate::clock::Clock;
use crate::config::CoreConfig;
use crate::directory::PatientDirectory;
use crate::encounter::EncounterStore;
use crate::queue::QueueStore;
use crate::realtime::{FlowEvent, TenantEventBus};
use crate::snapshot::SnapshotStore;
use crate::{FlowError, FlowResult};
use chrono::{DateTime, Utc};
use flow_uuid::TenantId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TenantState {
    pub queue: QueueStore,
    pub encounters: EncounterStore,
}

/// A unit of work against staged tenant state.
pub(crate) struct Txn<'a> {
    pub state: &'a mut TenantState,
    pub now: DateTime<Utc>,
    events: Vec<FlowEvent>,
}

impl Txn<'_> {
    pub fn emit(&mut self, event: FlowEvent) {
        self.events.push(event);
    }
}

#[derive(Debug)]
pub struct TenantFlow {
    tenant_id: TenantId,
    config: CoreConfig,
    state: Mutex<TenantState>,
    bus: TenantEventBus,
    clock: Arc<dyn Clock>,
    directory: Arc<dyn PatientDirectory>,
    snapshots: Option<SnapshotStore>,
}

impl TenantFlow {
    /// Open a tenant, restoring its snapshot when persistence is configured.
    ///
    /// # Errors
    ///
    /// Returns a storage error if an existing snapshot cannot be read.
    pub fn open(
        tenant_id: TenantId,
        config: CoreConfig,
        clock: Arc<dyn Clock>,
        directory: Arc<dyn PatientDirectory>,
    ) -> FlowResult<Self> {
        let snapshots = config.snapshot_root().map(SnapshotStore::new);
        let (state, last_sequence) = match &snapshots {
            Some(store) => match store.load(&tenant_id)? {
                Some(snapshot) => {
                    tracing::info!(
                        tenant = %tenant_id,
                        entries = snapshot.state.queue.len(),
                        encounters = snapshot.state.encounters.len(),
                        "restored tenant snapshot"
                    );
                    (snapshot.state, snapshot.last_sequence)
                }
                None => (TenantState::default(), 0),
            },
            None => (TenantState::default(), 0),
        };

        let bus = TenantEventBus::new(
            tenant_id,
            config.event_history_capacity(),
            config.broadcast_capacity(),
            last_sequence,
        );

        Ok(Self {
            tenant_id,
            config,
            state: Mutex::new(state),
            bus,
            clock,
            directory,
            snapshots,
        })
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn events(&self) -> &TenantEventBus {
        &self.bus
    }

    pub(crate) fn directory(&self) -> &dyn PatientDirectory {
        self.directory.as_ref()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn lock(&self) -> FlowResult<MutexGuard<'_, TenantState>> {
        self.state.lock().map_err(|_| {
            FlowError::Corrupt(format!("tenant {} state lock poisoned", self.tenant_id))
        })
    }

    /// Run `f` against a staged copy of the tenant state.
    ///
    /// On success the copy is persisted (if configured), swapped in, and the collected events are
    /// published, all before the lock is released. On error nothing changes.
    pub(crate) fn transact<T>(
        &self,
        f: impl FnOnce(&mut Txn<'_>) -> FlowResult<T>,
    ) -> FlowResult<T> {
        let mut guard = self.lock()?;
        let mut staged = guard.clone();
        let now = self.clock.now();

        let mut txn = Txn {
            state: &mut staged,
            now,
            events: Vec::new(),
        };
        let out = f(&mut txn)?;
        let events = txn.events;

        if let Some(store) = &self.snapshots {
            let last_sequence = self.bus.last_sequence() + events.len() as u64;
            store.save(&self.tenant_id, last_sequence, now, &staged)?;
        }

        *guard = staged;
        for event in events {
            self.bus.publish(event, now);
        }
        Ok(out)
    }

    /// Read a consistent view of the tenant state.
    pub fn read<T>(&self, f: impl FnOnce(&TenantState) -> T) -> FlowResult<T> {
        let guard = self.lock()?;
        Ok(f(&guard))
    }

    /// Read state together with the sequence it reflects, for seeding a [`crate::QueueView`].
    pub fn read_at_sequence<T>(&self, f: impl FnOnce(&TenantState) -> T) -> FlowResult<(T, u64)> {
        let guard = self.lock()?;
        Ok((f(&guard), self.bus.last_sequence()))
    }
}

/// Map from tenant id to its isolated flow.
#[derive(Debug)]
pub struct FlowRegistry {
    config: CoreConfig,
    clock: Arc<dyn Clock>,
    directory: Arc<dyn PatientDirectory>,
    tenants: RwLock<HashMap<TenantId, Arc<TenantFlow>>>,
}

impl FlowRegistry {
    pub fn new(
        config: CoreConfig,
        clock: Arc<dyn Clock>,
        directory: Arc<dyn PatientDirectory>,
    ) -> Self {
        Self {
            config,
            clock,
            directory,
            tenants: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Open `tenant_id`, or return it if already registered.
    pub fn register_tenant(&self, tenant_id: TenantId) -> FlowResult<Arc<TenantFlow>> {
        let mut tenants = self
            .tenants
            .write()
            .map_err(|_| FlowError::Corrupt("tenant registry lock poisoned".into()))?;
        if let Some(existing) = tenants.get(&tenant_id) {
            return Ok(Arc::clone(existing));
        }

        let flow = Arc::new(TenantFlow::open(
            tenant_id,
            self.config.clone(),
            Arc::clone(&self.clock),
            Arc::clone(&self.directory),
        )?);
        tenants.insert(tenant_id, Arc::clone(&flow));
        tracing::info!(tenant = %tenant_id, "registered tenant");
        Ok(flow)
    }

    pub fn tenant(&self, tenant_id: &TenantId) -> FlowResult<Arc<TenantFlow>> {
        let tenants = self
            .tenants
            .read()
            .map_err(|_| FlowError::Corrupt("tenant registry lock poisoned".into()))?;
        tenants
            .get(tenant_id)
            .cloned()
            .ok_or_else(|| FlowError::not_found("tenant", tenant_id))
    }

    pub fn tenant_ids(&self) -> Vec<TenantId> {
        let tenants = match self.tenants.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut ids: Vec<TenantId> = tenants.keys().copied().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::directory::InMemoryDirectory;
    use flow_uuid::Uuid;

    fn registry() -> FlowRegistry {
        FlowRegistry::new(
            CoreConfig::default(),
            Arc::new(SystemClock),
            Arc::new(InMemoryDirectory::new()),
        )
    }

    #[test]
    fn unknown_tenant_is_not_found() {
        let registry = registry();
        let err = registry
            .tenant(&TenantId::from_uuid(Uuid::from_u128(3)))
            .unwrap_err();
        assert!(matches!(err, FlowError::NotFound { entity: "tenant", .. }));
    }

    #[test]
    fn registering_twice_returns_the_same_flow() {
        let registry = registry();
        let id = TenantId::from_uuid(Uuid::from_u128(3));
        let first = registry.register_tenant(id).unwrap();
        let second = registry.register_tenant(id).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.tenant_ids(), vec![id]);
    }

    #[test]
    fn failed_transaction_changes_nothing() {
        let registry = registry();
        let flow = registry
            .register_tenant(TenantId::from_uuid(Uuid::from_u128(3)))
            .unwrap();

        let result: FlowResult<()> = flow.transact(|txn| {
            txn.state.queue = QueueStore::new();
            txn.emit(FlowEvent::QueueReordered { entries: Vec::new() });
            Err(FlowError::Validation("abort".into()))
        });
        assert!(result.is_err());
        assert_eq!(flow.events().last_sequence(), 0);
    }

    #[test]
    fn snapshot_restores_state_and_sequence() {
        use crate::actor::Actor;
        use crate::queue::{NewEntry, QueueStatus};
        use crate::test_support::Fixture;

        let temp = tempfile::tempdir().unwrap();
        let config = CoreConfig::new(
            Some(temp.path().to_path_buf()),
            CoreConfig::default().utc_offset(),
            16,
            16,
        )
        .unwrap();
        let fx = Fixture::with_config(config.clone());
        let actor: Actor = fx.nurse;

        let entry = fx
            .flow
            .add_entry(
                NewEntry {
                    patient_id: fx.patients[0],
                    ..Default::default()
                },
                &actor,
            )
            .unwrap();
        fx.flow.call(&entry.id, QueueStatus::Waiting, &actor).unwrap();
        assert_eq!(fx.flow.events().last_sequence(), 2);

        let reopened = TenantFlow::open(
            fx.flow.tenant_id(),
            config,
            fx.clock.clone(),
            Arc::new(InMemoryDirectory::new()),
        )
        .unwrap();
        assert_eq!(reopened.events().last_sequence(), 2);
        let restored = reopened.get_entry(&entry.id).unwrap();
        assert_eq!(restored.status, QueueStatus::Called);
        assert_eq!(restored, fx.flow.get_entry(&entry.id).unwrap());
    }
}
