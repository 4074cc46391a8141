//! Server-sent event stream of tenant changes.
//!
//! Each SSE message carries one frame: `event:` is the event name, `id:` the frame sequence and
//! `data:` the JSON frame. A reconnecting client sends `Last-Event-ID` and first receives the
//! retained frames after that sequence, then live frames.

use crate::error::ApiError;
use crate::handlers::tenant_flow;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
};
use flow_core::{FlowEventFrame, TenantFlow};
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::{
    wrappers::{errors::BroadcastStreamRecvError, BroadcastStream},
    Stream, StreamExt,
};
use tracing::warn;

const LAST_EVENT_ID_HEADER: &str = "last-event-id";

pub type FrameStream = Pin<Box<dyn Stream<Item = FlowEventFrame> + Send + 'static>>;

#[utoipa::path(
    get,
    path = "/tenants/{tenant}/events",
    params(
        ("tenant" = String, Path, description = "Tenant id"),
        ("last-event-id" = Option<String>, Header, description = "Resume after this sequence")
    ),
    responses(
        (status = 200, description = "text/event-stream of tenant change frames"),
        (status = 404, description = "Unknown tenant")
    )
)]
pub async fn events(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let flow = tenant_flow(&state, &tenant)?;
    let last_sequence = headers
        .get(LAST_EVENT_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.trim().parse::<u64>().ok());

    tracing::debug!(tenant = %flow.tenant_id(), ?last_sequence, "event stream opened");
    let stream = frame_stream(flow, last_sequence)
        .filter_map(|frame| frame_to_event(&frame))
        .map(Ok::<Event, Infallible>);

    Ok(Sse::new(stream).keep_alive(default_keep_alive()))
}

/// Replayed frames after `last_sequence` (if given) followed by live frames, without gaps or
/// duplicates. The stream ends if the subscriber falls behind the broadcast channel.
pub fn frame_stream(flow: Arc<TenantFlow>, last_sequence: Option<u64>) -> FrameStream {
    // Subscribe before reading history so nothing published in between is missed.
    let receiver = flow.events().subscribe();
    let history = match last_sequence {
        Some(sequence) => flow.events().history_since(sequence),
        None => Vec::new(),
    };
    if let (Some(sequence), Some(first)) = (last_sequence, history.first()) {
        if first.sequence > sequence + 1 {
            warn!(
                tenant = %flow.tenant_id(),
                requested = sequence,
                oldest = first.sequence,
                "event history no longer covers the requested sequence"
            );
        }
    }

    let initial_sequence = history
        .last()
        .map(|frame| frame.sequence)
        .or(last_sequence)
        .unwrap_or(0);
    let live = async_stream::stream! {
        let mut live_receiver = BroadcastStream::new(receiver);
        let mut last_seen = initial_sequence;
        while let Some(item) = live_receiver.next().await {
            match item {
                Ok(frame) => {
                    if frame.sequence <= last_seen {
                        continue;
                    }
                    last_seen = frame.sequence;
                    yield frame;
                }
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    // Frames are gone from this receiver; the client reconnects with
                    // Last-Event-ID and is replayed from history.
                    warn!(skipped, last_seen, "event subscriber lagged; closing stream");
                    break;
                }
            }
        }
    };

    Box::pin(tokio_stream::iter(history).chain(live))
}

fn frame_to_event(frame: &FlowEventFrame) -> Option<Event> {
    serde_json::to_string(frame)
        .map_err(|err| {
            warn!("failed to serialize flow event frame: {err}");
            err
        })
        .ok()
        .map(|data| {
            Event::default()
                .event(frame.event.event_name())
                .id(frame.sequence.to_string())
                .data(data)
        })
}

fn default_keep_alive() -> KeepAlive {
    KeepAlive::new()
        .interval(Duration::from_secs(15))
        .text("keep-alive")
}
