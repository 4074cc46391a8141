//! "Who is next" ordering.
//!
//! Pure functions over queue entries; only `waiting` and `called` entries take part:
//!
//! 1. entries with a manual order first, ascending by it;
//! 2. then priority ascending (1 is most urgent), then arrival time ascending;
//! 3. entry id breaks any remaining tie.
//!
//! Equal manual orders fall through to rule 2. The result is deterministic, so every viewer
//! computing it from the same entries gets the same list.

use crate::queue::QueueEntry;
use flow_uuid::EntryId;
use std::cmp::Ordering;

pub fn compare_entries(a: &QueueEntry, b: &QueueEntry) -> Ordering {
    let manual = match (a.manual_order, b.manual_order) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };

    manual
        .then_with(|| a.priority.cmp(&b.priority))
        .then_with(|| a.arrival_time.cmp(&b.arrival_time))
        .then_with(|| a.id.cmp(&b.id))
}

/// Pending entries in queue order.
pub fn order_queue<'a>(entries: impl IntoIterator<Item = &'a QueueEntry>) -> Vec<&'a QueueEntry> {
    let mut pending: Vec<&QueueEntry> = entries
        .into_iter()
        .filter(|e| e.status.is_pending())
        .collect();
    pending.sort_by(|a, b| compare_entries(a, b));
    pending
}

/// Head of the queue.
pub fn next_patient<'a>(entries: impl IntoIterator<Item = &'a QueueEntry>) -> Option<&'a QueueEntry> {
    entries
        .into_iter()
        .filter(|e| e.status.is_pending())
        .min_by(|a, b| compare_entries(a, b))
}

/// 1-based position of `id` in the queue, or `None` if it is not pending.
pub fn position_of<'a>(
    entries: impl IntoIterator<Item = &'a QueueEntry>,
    id: &EntryId,
) -> Option<usize> {
    order_queue(entries)
        .iter()
        .position(|e| e.id == *id)
        .map(|index| index + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueStatus;
    use chrono::{DateTime, TimeZone, Utc};
    use flow_types::Priority;
    use flow_uuid::{PatientId, TenantId, Uuid};

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 8, minute, 0).unwrap()
    }

    fn entry(n: u128, priority: i64, minute: u32, manual: Option<i32>) -> QueueEntry {
        QueueEntry {
            id: EntryId::from_uuid(Uuid::from_u128(n)),
            tenant_id: TenantId::from_uuid(Uuid::from_u128(1)),
            patient_id: PatientId::from_uuid(Uuid::from_u128(100 + n)),
            status: QueueStatus::Waiting,
            priority: Priority::new(priority).unwrap(),
            arrival_time: at(minute),
            ready_at: None,
            manual_order: manual,
            reason: None,
            notes: None,
            assigned_practitioner: None,
            encounter_id: None,
            version: 1,
            updated_at: at(minute),
        }
    }

    fn ids(ordered: &[&QueueEntry]) -> Vec<u128> {
        ordered.iter().map(|e| e.id.uuid().as_u128()).collect()
    }

    #[test]
    fn priority_then_arrival() {
        // A: p3 08:05, B: p1 08:10, C: p3 08:00
        let a = entry(1, 3, 5, None);
        let b = entry(2, 1, 10, None);
        let c = entry(3, 3, 0, None);
        let entries = [a, b, c];
        assert_eq!(ids(&order_queue(&entries)), vec![2, 3, 1]);
    }

    #[test]
    fn manual_order_wins_over_priority() {
        let a = entry(1, 3, 5, None);
        let b = entry(2, 1, 10, None);
        let c = entry(3, 3, 0, Some(1));
        let entries = [a, b, c];
        assert_eq!(ids(&order_queue(&entries)), vec![3, 2, 1]);
    }

    #[test]
    fn equal_manual_orders_fall_through_to_priority() {
        let a = entry(1, 4, 0, Some(2));
        let b = entry(2, 1, 5, Some(2));
        let entries = [a, b];
        assert_eq!(ids(&order_queue(&entries)), vec![2, 1]);
    }

    #[test]
    fn full_ties_break_on_id() {
        let a = entry(9, 2, 0, None);
        let b = entry(4, 2, 0, None);
        let entries = [a, b];
        assert_eq!(ids(&order_queue(&entries)), vec![4, 9]);
    }

    #[test]
    fn only_pending_entries_are_ordered() {
        let mut done = entry(1, 1, 0, None);
        done.status = QueueStatus::InConsultation;
        let mut called = entry(2, 3, 5, None);
        called.status = QueueStatus::Called;
        let entries = [done, called];

        assert_eq!(ids(&order_queue(&entries)), vec![2]);
        assert_eq!(next_patient(&entries).map(|e| e.id), Some(entries[1].id));
        assert_eq!(position_of(&entries, &entries[0].id), None);
        assert_eq!(position_of(&entries, &entries[1].id), Some(1));
    }

    #[test]
    fn ordering_is_idempotent() {
        let entries = [
            entry(1, 3, 5, None),
            entry(2, 1, 10, None),
            entry(3, 3, 0, Some(1)),
            entry(4, 2, 2, None),
        ];
        let once: Vec<QueueEntry> = order_queue(&entries).into_iter().cloned().collect();
        let twice = order_queue(&once);
        assert_eq!(ids(&twice), ids(&order_queue(&entries)));
    }
}
