use super::{FlowEvent, FlowEventFrame};
use chrono::{DateTime, Utc};
use flow_uuid::TenantId;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

/// Broadcast topic for one tenant, with a bounded replay history.
///
/// Sequence numbers start after `start_sequence` and increase by one per frame. Callers publish
/// while holding the tenant lock, so sequence order is commit order.
#[derive(Debug)]
pub struct TenantEventBus {
    tenant_id: TenantId,
    tx: broadcast::Sender<FlowEventFrame>,
    history: Mutex<VecDeque<FlowEventFrame>>,
    history_capacity: usize,
    sequence: AtomicU64,
}

impl TenantEventBus {
    pub fn new(
        tenant_id: TenantId,
        history_capacity: usize,
        broadcast_capacity: usize,
        start_sequence: u64,
    ) -> Self {
        let history_capacity = history_capacity.max(1);
        let (tx, _rx) = broadcast::channel(broadcast_capacity.max(1));
        Self {
            tenant_id,
            tx,
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            history_capacity,
            sequence: AtomicU64::new(start_sequence),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FlowEventFrame> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn last_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    pub fn publish(&self, event: FlowEvent, emitted_at: DateTime<Utc>) -> FlowEventFrame {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let frame = FlowEventFrame {
            sequence,
            tenant_id: self.tenant_id,
            emitted_at,
            event,
        };

        {
            let mut guard = self.history();
            if guard.len() == self.history_capacity {
                guard.pop_front();
            }
            guard.push_back(frame.clone());
        }

        // No subscribers is not an error.
        let _ = self.tx.send(frame.clone());
        tracing::debug!(
            tenant = %self.tenant_id,
            sequence,
            event = frame.event.event_name(),
            "published flow event"
        );
        frame
    }

    /// Retained frames with a sequence greater than `sequence`.
    pub fn history_since(&self, sequence: u64) -> Vec<FlowEventFrame> {
        self.history()
            .iter()
            .filter(|frame| frame.sequence > sequence)
            .cloned()
            .collect()
    }

    fn history(&self) -> MutexGuard<'_, VecDeque<FlowEventFrame>> {
        // Frames are pushed whole, so a poisoned history is still consistent.
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
