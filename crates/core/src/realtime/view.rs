use super::FlowEventFrame;
use crate::ordering::order_queue;
use crate::queue::QueueEntry;
use flow_uuid::{EntryId, TenantId};
use std::collections::BTreeMap;

/// What [`QueueView::apply`] did with a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewUpdate {
    Applied,
    /// Another tenant's frame, or one already seen.
    Ignored,
    /// Frames between the view's sequence and this one were missed. The view is left as it was
    /// and must be reseeded with [`QueueView::resync`] before it accepts frames again.
    NeedsResync { expected: u64, received: u64 },
}

/// Client-side replica of a tenant queue.
///
/// Seeded from a query, then kept current by applying frames from the tenant topic. A viewer
/// dragging rows gets an optimistic local order immediately; the next authoritative frame
/// replaces it with the server's order.
#[derive(Clone, Debug)]
pub struct QueueView {
    tenant_id: TenantId,
    entries: BTreeMap<EntryId, QueueEntry>,
    last_sequence: u64,
    optimistic: Option<Vec<EntryId>>,
    needs_resync: bool,
}

impl QueueView {
    pub fn new(tenant_id: TenantId) -> Self {
        Self::seeded(tenant_id, Vec::new(), 0)
    }

    /// Seed from a snapshot read taken at `last_sequence`.
    pub fn seeded(
        tenant_id: TenantId,
        entries: impl IntoIterator<Item = QueueEntry>,
        last_sequence: u64,
    ) -> Self {
        Self {
            tenant_id,
            entries: entries.into_iter().map(|e| (e.id, e)).collect(),
            last_sequence,
            optimistic: None,
            needs_resync: false,
        }
    }

    /// Replace the replica with a fresh query result taken at `last_sequence`.
    pub fn resync(&mut self, entries: impl IntoIterator<Item = QueueEntry>, last_sequence: u64) {
        *self = Self::seeded(self.tenant_id, entries, last_sequence);
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    pub fn needs_resync(&self) -> bool {
        self.needs_resync
    }

    pub fn has_optimistic_order(&self) -> bool {
        self.optimistic.is_some()
    }

    pub fn entry(&self, id: &EntryId) -> Option<&QueueEntry> {
        self.entries.get(id)
    }

    /// Apply a frame. Frames must arrive in sequence order with no gaps.
    pub fn apply(&mut self, frame: &FlowEventFrame) -> ViewUpdate {
        if frame.tenant_id != self.tenant_id || frame.sequence <= self.last_sequence {
            return ViewUpdate::Ignored;
        }
        let expected = self.last_sequence + 1;
        if self.needs_resync || frame.sequence != expected {
            self.needs_resync = true;
            return ViewUpdate::NeedsResync {
                expected,
                received: frame.sequence,
            };
        }

        for entry in frame.event.entries() {
            self.entries
                .entry(entry.id)
                .and_modify(|known| {
                    if entry.version >= known.version {
                        *known = entry.clone();
                    }
                })
                .or_insert_with(|| entry.clone());
        }
        self.last_sequence = frame.sequence;
        self.optimistic = None;
        ViewUpdate::Applied
    }

    /// Show `ids` first, in the given order, until the server answers.
    pub fn reorder_optimistically(&mut self, ids: Vec<EntryId>) {
        self.optimistic = Some(ids);
    }

    /// The queue as this viewer should render it.
    pub fn order(&self) -> Vec<QueueEntry> {
        let server_order = order_queue(self.entries.values());
        let Some(local) = &self.optimistic else {
            return server_order.into_iter().cloned().collect();
        };

        let mut ordered: Vec<QueueEntry> = local
            .iter()
            .filter_map(|id| self.entries.get(id))
            .filter(|e| e.status.is_pending())
            .cloned()
            .collect();
        for entry in server_order {
            if !local.contains(&entry.id) {
                ordered.push(entry.clone());
            }
        }
        ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::FlowEvent;
    use crate::queue::QueueStatus;
    use chrono::{DateTime, TimeZone, Utc};
    use flow_types::Priority;
    use flow_uuid::{PatientId, Uuid};

    fn tenant() -> TenantId {
        TenantId::from_uuid(Uuid::from_u128(1))
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 8, minute, 0).unwrap()
    }

    fn entry(n: u128, priority: i64, minute: u32) -> QueueEntry {
        QueueEntry {
            id: EntryId::from_uuid(Uuid::from_u128(n)),
            tenant_id: tenant(),
            patient_id: PatientId::from_uuid(Uuid::from_u128(100 + n)),
            status: QueueStatus::Waiting,
            priority: Priority::new(priority).unwrap(),
            arrival_time: at(minute),
            ready_at: None,
            manual_order: None,
            reason: None,
            notes: None,
            assigned_practitioner: None,
            encounter_id: None,
            version: 1,
            updated_at: at(minute),
        }
    }

    fn frame(sequence: u64, event: FlowEvent) -> FlowEventFrame {
        FlowEventFrame {
            sequence,
            tenant_id: tenant(),
            emitted_at: at(30),
            event,
        }
    }

    fn ids(entries: &[QueueEntry]) -> Vec<u128> {
        entries.iter().map(|e| e.id.uuid().as_u128()).collect()
    }

    #[test]
    fn optimistic_order_is_replaced_by_the_server_order() {
        let a = entry(1, 2, 0);
        let b = entry(2, 2, 5);
        let mut view = QueueView::seeded(tenant(), vec![a.clone(), b.clone()], 10);
        assert_eq!(ids(&view.order()), vec![1, 2]);

        view.reorder_optimistically(vec![b.id, a.id]);
        assert_eq!(ids(&view.order()), vec![2, 1]);

        // The server accepted the reorder.
        let mut b2 = b.clone();
        b2.manual_order = Some(1);
        b2.version = 2;
        let mut a2 = a.clone();
        a2.manual_order = Some(2);
        a2.version = 2;
        assert_eq!(
            view.apply(&frame(11, FlowEvent::QueueReordered { entries: vec![b2, a2] })),
            ViewUpdate::Applied
        );

        assert!(!view.has_optimistic_order());
        assert_eq!(ids(&view.order()), vec![2, 1]);
    }

    #[test]
    fn unrelated_frame_still_drops_the_optimistic_order() {
        let a = entry(1, 2, 0);
        let b = entry(2, 2, 5);
        let mut view = QueueView::seeded(tenant(), vec![a.clone(), b.clone()], 10);
        view.reorder_optimistically(vec![b.id, a.id]);

        let c = entry(3, 1, 10);
        view.apply(&frame(11, FlowEvent::EntryAdded { entry: c }));
        assert_eq!(ids(&view.order()), vec![3, 1, 2]);
    }

    #[test]
    fn old_and_foreign_frames_are_ignored() {
        let a = entry(1, 2, 0);
        let mut view = QueueView::seeded(tenant(), vec![a], 10);

        let stale = frame(10, FlowEvent::EntryAdded { entry: entry(2, 1, 1) });
        assert_eq!(view.apply(&stale), ViewUpdate::Ignored);

        let mut foreign = frame(11, FlowEvent::EntryAdded { entry: entry(3, 1, 1) });
        foreign.tenant_id = TenantId::from_uuid(Uuid::from_u128(99));
        assert_eq!(view.apply(&foreign), ViewUpdate::Ignored);
        assert_eq!(view.order().len(), 1);
    }

    #[test]
    fn entries_leaving_the_queue_drop_out_of_the_order() {
        let a = entry(1, 2, 0);
        let mut view = QueueView::seeded(tenant(), vec![a.clone()], 0);

        let mut started = a.clone();
        started.status = QueueStatus::InConsultation;
        started.version = 3;
        view.apply(&frame(1, FlowEvent::EntryUpdated { entry: started }));
        assert!(view.order().is_empty());
    }

    #[test]
    fn skipped_frames_hold_the_view_until_resync() {
        let a = entry(1, 2, 0);
        let b = entry(2, 2, 5);
        let mut view = QueueView::seeded(tenant(), vec![a.clone(), b.clone()], 10);

        // Frame 11 never arrived.
        let c = entry(3, 1, 10);
        let update = view.apply(&frame(12, FlowEvent::EntryAdded { entry: c.clone() }));
        assert_eq!(
            update,
            ViewUpdate::NeedsResync {
                expected: 11,
                received: 12
            }
        );
        assert!(view.needs_resync());
        assert_eq!(view.last_sequence(), 10);
        assert!(view.entry(&c.id).is_none());

        let d = entry(4, 1, 12);
        assert!(matches!(
            view.apply(&frame(13, FlowEvent::EntryAdded { entry: d.clone() })),
            ViewUpdate::NeedsResync { .. }
        ));

        // The server had three entries at sequence 12.
        view.resync(vec![a, b, c], 12);
        assert!(!view.needs_resync());
        assert_eq!(ids(&view.order()), vec![3, 1, 2]);
        assert_eq!(
            view.apply(&frame(13, FlowEvent::EntryAdded { entry: d })),
            ViewUpdate::Applied
        );
        assert_eq!(ids(&view.order()), vec![3, 4, 1, 2]);
    }
}
