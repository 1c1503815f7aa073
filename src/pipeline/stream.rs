//! Subscriber stream: replay the log, then follow live events.
//!
//! The stream ends with a `done` marker after a terminal event, or right
//! after the replay when the session had already finished. While nothing
//! happens for `idle`, it yields keepalives instead of closing.

use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use futures::Stream;
use grwm_common::{Event, EventType, SessionStatus};
use serde_json::{Value, json};
use tokio::sync::broadcast::error::RecvError;

use super::session::{Session, Subscription};

#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Event(Event),
    /// Nothing happened for the idle interval. Never logged.
    KeepAlive,
    /// Final marker carrying the session status. Never logged.
    Done(SessionStatus),
}

impl StreamItem {
    pub fn to_json(&self) -> Value {
        match self {
            Self::Event(event) => serde_json::to_value(event).unwrap_or(Value::Null),
            Self::KeepAlive => json!({
                "type": "keepalive",
                "timestamp": chrono::Utc::now(),
            }),
            Self::Done(status) => json!({
                "type": "done",
                "status": status.as_str(),
            }),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }
}

fn terminal_status(event: &Event) -> Option<SessionStatus> {
    match event.event_type {
        EventType::Complete => Some(SessionStatus::Completed),
        EventType::Error => Some(SessionStatus::Error),
        _ => None,
    }
}

pub fn event_stream(session: Arc<Session>, idle: Duration) -> impl Stream<Item = StreamItem> + Send + 'static {
    stream! {
        let Subscription { replay, receiver, status } = session.subscribe();
        let mut last_seq: Option<u64> = None;

        for event in replay {
            last_seq = Some(event.seq);
            yield StreamItem::Event(event);
        }
        // Terminal events from earlier passes stay in the log, so the
        // snapshot status decides whether anything more can arrive.
        if status.is_terminal() {
            yield StreamItem::Done(status);
            return;
        }
        let Some(mut receiver) = receiver else {
            yield StreamItem::Done(status);
            return;
        };

        loop {
            match tokio::time::timeout(idle, receiver.recv()).await {
                Err(_) => yield StreamItem::KeepAlive,
                Ok(Ok(event)) => {
                    if last_seq.is_some_and(|seq| event.seq <= seq) {
                        continue;
                    }
                    last_seq = Some(event.seq);
                    let done = terminal_status(&event);
                    yield StreamItem::Event(event);
                    if let Some(status) = done {
                        yield StreamItem::Done(status);
                        return;
                    }
                }
                Ok(Err(RecvError::Lagged(skipped))) => {
                    tracing::debug!(session_id = %session.id(), skipped, "Subscriber lagged, recovering from log");
                    for event in session.events_after(last_seq) {
                        last_seq = Some(event.seq);
                        let done = terminal_status(&event);
                        yield StreamItem::Event(event);
                        if let Some(status) = done {
                            yield StreamItem::Done(status);
                            return;
                        }
                    }
                }
                Ok(Err(RecvError::Closed)) => {
                    yield StreamItem::Done(session.status());
                    return;
                }
            }
        }
    }
}
