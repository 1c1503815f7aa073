//! Server-Sent Events stream for one session.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::response::sse::{Event, Sse};
use futures::stream::{Stream, StreamExt};

use super::api::{ApiError, SharedState};
use crate::pipeline::StreamItem;

/// `GET /api/stream/{id}`: replay, live events, keepalive comments, then `done`.
pub async fn stream_handler(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let items = state
        .orchestrator
        .subscribe(&session_id, state.idle_keepalive)?;
    tracing::debug!(session_id = %session_id, "SSE subscriber attached");
    Ok(Sse::new(items.map(|item| Ok(to_sse_event(&item)))))
}

/// Data-only frames; logged events carry their `seq` as the SSE id.
pub fn to_sse_event(item: &StreamItem) -> Event {
    match item {
        StreamItem::Event(event) => Event::default()
            .id(event.seq.to_string())
            .data(item.to_json().to_string()),
        StreamItem::KeepAlive => Event::default().comment("keepalive"),
        StreamItem::Done(_) => Event::default().data(item.to_json().to_string()),
    }
}
