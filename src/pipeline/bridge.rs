//! Event bridge: drains a runner channel into the session log and live channel.

use std::sync::Arc;

use grwm_common::{Document, ErrorInfo, Event, EventType, StageName};
use tokio::sync::mpsc;

use super::runner::RunnerEvent;
use super::session::Session;

#[derive(Clone)]
pub struct EventBridge {
    session: Arc<Session>,
}

impl EventBridge {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Log `event` and publish it live. Never blocks on subscribers; a lagging
    /// receiver loses live events but can re-read them from the log.
    pub fn publish(&self, event: Event) -> u64 {
        let seq = self.session.record(event);
        tracing::trace!(session_id = %self.session.id(), seq, "Event published");
        seq
    }

    /// Relay progress until the runner reports its result.
    pub async fn relay(
        &self,
        stage: StageName,
        mut rx: mpsc::Receiver<RunnerEvent>,
    ) -> Result<Document, ErrorInfo> {
        while let Some(event) = rx.recv().await {
            match event {
                RunnerEvent::Progress(message) => {
                    self.publish(Event::for_stage(EventType::Progress, stage, message));
                }
                RunnerEvent::Finished(result) => return result,
            }
        }
        Err(ErrorInfo::new(stage, "Worker exited without a result"))
    }
}
