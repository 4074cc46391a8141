use super::{Change, EntryFilter, EntryPatch, NewEntry, QueueEntry, QueueStatus};
use crate::actor::Actor;
use crate::ordering;
use crate::realtime::FlowEvent;
use crate::tenant::{TenantFlow, Txn};
use crate::validation::{normalise_free_text, validate_manual_order};
use crate::{FlowError, FlowResult};
use flow_uuid::EntryId;
use std::collections::HashSet;

impl TenantFlow {
    /// Register an arrival. The entry starts `waiting` with a store-assigned arrival time.
    ///
    /// # Errors
    ///
    /// [`FlowError::Validation`] if the patient is unknown to this tenant's directory, already
    /// has an open entry, or the reason is not acceptable free text.
    pub fn add_entry(&self, new: NewEntry, actor: &Actor) -> FlowResult<QueueEntry> {
        let tenant_id = self.tenant_id();
        if self.directory().lookup(&tenant_id, &new.patient_id).is_none() {
            return Err(FlowError::Validation(format!(
                "patient {} is not registered with tenant {tenant_id}",
                new.patient_id
            )));
        }
        let reason = normalise_free_text("reason", new.reason)?;

        let entry = self.transact(|txn| {
            if let Some(open) = txn.state.queue.active_for_patient(&new.patient_id) {
                return Err(FlowError::Validation(format!(
                    "patient {} already has an open queue entry {} ({})",
                    new.patient_id, open.id, open.status
                )));
            }

            let entry = QueueEntry {
                id: EntryId::new(),
                tenant_id,
                patient_id: new.patient_id,
                status: QueueStatus::Waiting,
                priority: new.priority,
                arrival_time: txn.now,
                ready_at: None,
                manual_order: None,
                reason,
                notes: None,
                assigned_practitioner: None,
                encounter_id: None,
                version: 1,
                updated_at: txn.now,
            };
            txn.state.queue.insert(entry.clone());
            txn.emit(FlowEvent::EntryAdded {
                entry: entry.clone(),
            });
            Ok(entry)
        })?;

        tracing::info!(
            tenant = %tenant_id,
            entry = %entry.id,
            actor = %actor.id,
            priority = %entry.priority,
            "patient arrived"
        );
        Ok(entry)
    }

    /// Edit priority, notes, reason, manual order or assignment of an open entry.
    ///
    /// # Errors
    ///
    /// - [`FlowError::Validation`] for an empty patch or invalid field values.
    /// - [`FlowError::NotFound`] if the entry does not exist.
    /// - [`FlowError::InvalidState`] if the entry is terminal.
    /// - [`FlowError::StaleState`] if `expected_version` no longer matches.
    pub fn update_entry(
        &self,
        id: &EntryId,
        mut patch: EntryPatch,
        actor: &Actor,
    ) -> FlowResult<QueueEntry> {
        if patch.is_empty() {
            return Err(FlowError::Validation("patch changes nothing".into()));
        }
        patch.notes = normalise_change("notes", patch.notes)?;
        patch.reason = normalise_change("reason", patch.reason)?;
        if let Change::Set(position) = patch.manual_order {
            validate_manual_order(position)?;
        }

        let entry = self.transact(|txn| {
            let entry = txn.state.queue.apply_patch(id, patch, txn.now)?.clone();
            txn.emit(FlowEvent::EntryUpdated {
                entry: entry.clone(),
            });
            Ok(entry)
        })?;

        tracing::info!(
            tenant = %self.tenant_id(),
            entry = %id,
            actor = %actor.id,
            version = entry.version,
            "queue entry updated"
        );
        Ok(entry)
    }

    pub fn get_entry(&self, id: &EntryId) -> FlowResult<QueueEntry> {
        self.read(|state| state.queue.require(id).cloned())?
    }

    pub fn list_entries(&self, filter: &EntryFilter) -> FlowResult<Vec<QueueEntry>> {
        self.read(|state| state.queue.list(filter))
    }

    /// Pending entries in "who is next" order.
    pub fn ordered_queue(&self) -> FlowResult<Vec<QueueEntry>> {
        self.read(|state| {
            ordering::order_queue(state.queue.iter())
                .into_iter()
                .cloned()
                .collect()
        })
    }

    pub fn next_patient(&self) -> FlowResult<Option<QueueEntry>> {
        self.read(|state| ordering::next_patient(state.queue.iter()).cloned())
    }

    /// 1-based queue position of a pending entry.
    pub fn position_of(&self, id: &EntryId) -> FlowResult<Option<usize>> {
        self.read(|state| {
            state.queue.require(id)?;
            Ok(ordering::position_of(state.queue.iter(), id))
        })?
    }

    /// Manual drag-and-drop: the listed entries take positions 1..n in the given order and any
    /// other pending entry loses its override.
    ///
    /// Returns the resulting queue order, which is also broadcast.
    ///
    /// # Errors
    ///
    /// - [`FlowError::Validation`] for an empty or duplicated id list.
    /// - [`FlowError::NotFound`] for an unknown id.
    /// - [`FlowError::InvalidState`] if a listed entry is no longer waiting or called.
    pub fn reorder(&self, ids: &[EntryId], actor: &Actor) -> FlowResult<Vec<QueueEntry>> {
        if ids.is_empty() {
            return Err(FlowError::Validation(
                "reorder needs at least one entry".into(),
            ));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = ids.iter().find(|id| !seen.insert(**id)) {
            return Err(FlowError::Validation(format!(
                "entry {dup} listed more than once"
            )));
        }

        let ordered = self.transact(|txn| {
            for (index, id) in ids.iter().enumerate() {
                let position = i32::try_from(index + 1).map_err(|_| {
                    FlowError::Validation("too many entries to reorder".into())
                })?;
                txn.state
                    .queue
                    .set_manual_order(id, Some(position), txn.now)?;
            }
            clear_overrides_except(txn, ids)?;

            let ordered: Vec<QueueEntry> = ordering::order_queue(txn.state.queue.iter())
                .into_iter()
                .cloned()
                .collect();
            txn.emit(FlowEvent::QueueReordered {
                entries: ordered.clone(),
            });
            Ok(ordered)
        })?;

        tracing::info!(
            tenant = %self.tenant_id(),
            actor = %actor.id,
            count = ids.len(),
            "queue reordered"
        );
        Ok(ordered)
    }

    /// Drop every manual override so the queue falls back to priority and arrival order.
    pub fn clear_manual_order(&self, actor: &Actor) -> FlowResult<Vec<QueueEntry>> {
        let ordered = self.transact(|txn| {
            let changed = clear_overrides_except(txn, &[])?;
            let ordered: Vec<QueueEntry> = ordering::order_queue(txn.state.queue.iter())
                .into_iter()
                .cloned()
                .collect();
            if changed > 0 {
                txn.emit(FlowEvent::QueueReordered {
                    entries: ordered.clone(),
                });
            }
            Ok(ordered)
        })?;

        tracing::info!(
            tenant = %self.tenant_id(),
            actor = %actor.id,
            "manual queue order cleared"
        );
        Ok(ordered)
    }
}

fn clear_overrides_except(txn: &mut Txn<'_>, keep: &[EntryId]) -> FlowResult<usize> {
    let overridden: Vec<EntryId> = txn
        .state
        .queue
        .pending()
        .filter(|e| e.manual_order.is_some() && !keep.contains(&e.id))
        .map(|e| e.id)
        .collect();
    for id in &overridden {
        txn.state.queue.set_manual_order(id, None, txn.now)?;
    }
    Ok(overridden.len())
}

fn normalise_change(field: &str, change: Change<String>) -> FlowResult<Change<String>> {
    match change {
        Change::Set(text) => Ok(match normalise_free_text(field, Some(text))? {
            Some(text) => Change::Set(text),
            None => Change::Clear,
        }),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Fixture;
    use crate::FlowEventFrame;
    use chrono::Duration;
    use flow_types::Priority;

    fn new_entry(fx: &Fixture, n: usize, priority: i64) -> NewEntry {
        NewEntry {
            patient_id: fx.patients[n],
            priority: Priority::new(priority).unwrap(),
            reason: Some("  follow-up ".into()),
        }
    }

    #[test]
    fn add_entry_stamps_arrival_and_broadcasts() {
        let fx = Fixture::new();
        let mut rx = fx.flow.events().subscribe();

        let entry = fx.flow.add_entry(new_entry(&fx, 0, 2), &fx.front_desk).unwrap();
        assert_eq!(entry.status, QueueStatus::Waiting);
        assert_eq!(entry.arrival_time, fx.clock_start);
        assert_eq!(entry.reason.as_deref(), Some("follow-up"));

        let frame: FlowEventFrame = rx.try_recv().unwrap();
        assert_eq!(frame.sequence, 1);
        assert!(matches!(frame.event, FlowEvent::EntryAdded { .. }));
    }

    #[test]
    fn unknown_patient_is_rejected() {
        let fx = Fixture::new();
        let new = NewEntry {
            patient_id: flow_uuid::PatientId::new(),
            ..Default::default()
        };
        let err = fx.flow.add_entry(new, &fx.front_desk).unwrap_err();
        assert!(matches!(err, FlowError::Validation(_)));
    }

    #[test]
    fn second_open_entry_for_a_patient_is_rejected() {
        let fx = Fixture::new();
        fx.flow.add_entry(new_entry(&fx, 0, 3), &fx.front_desk).unwrap();
        let err = fx
            .flow
            .add_entry(new_entry(&fx, 0, 3), &fx.front_desk)
            .unwrap_err();
        assert!(matches!(err, FlowError::Validation(_)));
    }

    #[test]
    fn update_sets_and_clears_fields() {
        let fx = Fixture::new();
        let entry = fx.flow.add_entry(new_entry(&fx, 0, 3), &fx.front_desk).unwrap();

        let patch = EntryPatch {
            priority: Some(Priority::new(1).unwrap()),
            notes: Change::Set("needs wheelchair".into()),
            manual_order: Change::Set(2),
            ..Default::default()
        };
        let updated = fx.flow.update_entry(&entry.id, patch, &fx.nurse).unwrap();
        assert_eq!(updated.priority.value(), 1);
        assert_eq!(updated.notes.as_deref(), Some("needs wheelchair"));
        assert_eq!(updated.manual_order, Some(2));
        assert_eq!(updated.version, entry.version + 1);

        let patch = EntryPatch {
            notes: Change::Set("   ".into()),
            manual_order: Change::Clear,
            ..Default::default()
        };
        let cleared = fx.flow.update_entry(&entry.id, patch, &fx.nurse).unwrap();
        assert_eq!(cleared.notes, None);
        assert_eq!(cleared.manual_order, None);
    }

    #[test]
    fn empty_patch_and_bad_manual_order_are_validation_errors() {
        let fx = Fixture::new();
        let entry = fx.flow.add_entry(new_entry(&fx, 0, 3), &fx.front_desk).unwrap();

        let err = fx
            .flow
            .update_entry(&entry.id, EntryPatch::default(), &fx.nurse)
            .unwrap_err();
        assert!(matches!(err, FlowError::Validation(_)));

        let patch = EntryPatch {
            manual_order: Change::Set(0),
            ..Default::default()
        };
        let err = fx.flow.update_entry(&entry.id, patch, &fx.nurse).unwrap_err();
        assert!(matches!(err, FlowError::Validation(_)));
    }

    #[test]
    fn reorder_assigns_positions_and_clears_unlisted_overrides() {
        let fx = Fixture::new();
        let a = fx.flow.add_entry(new_entry(&fx, 0, 3), &fx.front_desk).unwrap();
        fx.clock.advance(Duration::minutes(1));
        let b = fx.flow.add_entry(new_entry(&fx, 1, 1), &fx.front_desk).unwrap();
        fx.clock.advance(Duration::minutes(1));
        let c = fx.flow.add_entry(new_entry(&fx, 2, 2), &fx.front_desk).unwrap();

        let patch = EntryPatch {
            manual_order: Change::Set(1),
            ..Default::default()
        };
        fx.flow.update_entry(&c.id, patch, &fx.nurse).unwrap();

        let ordered = fx.flow.reorder(&[a.id], &fx.coordinator).unwrap();
        let ids: Vec<EntryId> = ordered.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);
        assert_eq!(fx.flow.get_entry(&c.id).unwrap().manual_order, None);
        assert_eq!(fx.flow.position_of(&b.id).unwrap(), Some(2));
    }

    #[test]
    fn reorder_rejects_duplicates_and_finished_entries() {
        let fx = Fixture::new();
        let a = fx.flow.add_entry(new_entry(&fx, 0, 3), &fx.front_desk).unwrap();

        let err = fx.flow.reorder(&[a.id, a.id], &fx.coordinator).unwrap_err();
        assert!(matches!(err, FlowError::Validation(_)));

        fx.flow.cancel(&a.id, QueueStatus::Waiting, &fx.front_desk).unwrap();
        let err = fx.flow.reorder(&[a.id], &fx.coordinator).unwrap_err();
        assert!(matches!(err, FlowError::InvalidState { .. }));
    }

    #[test]
    fn clear_manual_order_restores_priority_order() {
        let fx = Fixture::new();
        let a = fx.flow.add_entry(new_entry(&fx, 0, 3), &fx.front_desk).unwrap();
        let b = fx.flow.add_entry(new_entry(&fx, 1, 1), &fx.front_desk).unwrap();
        fx.flow.reorder(&[a.id, b.id], &fx.coordinator).unwrap();
        assert_eq!(fx.flow.next_patient().unwrap().unwrap().id, a.id);

        let ordered = fx.flow.clear_manual_order(&fx.coordinator).unwrap();
        assert_eq!(ordered[0].id, b.id);
        assert!(ordered.iter().all(|e| e.manual_order.is_none()));
    }

    #[test]
    fn list_filters_by_status_and_priority() {
        let fx = Fixture::new();
        let a = fx.flow.add_entry(new_entry(&fx, 0, 3), &fx.front_desk).unwrap();
        fx.flow.add_entry(new_entry(&fx, 1, 1), &fx.front_desk).unwrap();
        fx.flow.call(&a.id, QueueStatus::Waiting, &fx.nurse).unwrap();

        let called = fx
            .flow
            .list_entries(&EntryFilter {
                statuses: vec![QueueStatus::Called],
                ..Default::default()
            })
            .unwrap();
        assert_eq!(called.len(), 1);
        assert_eq!(called[0].id, a.id);

        let urgent = fx
            .flow
            .list_entries(&EntryFilter {
                priority: Some(Priority::new(1).unwrap()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(urgent.len(), 1);
    }
}
