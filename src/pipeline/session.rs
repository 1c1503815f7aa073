//! Sessions and the session registry.
//!
//! A [`Session`] owns the event log, the broadcast sender for live
//! subscribers, the status and the document. All of it sits behind one
//! short-lived `std::sync::Mutex`, never held across an `.await`, so that
//! appending to the log, publishing live and snapshotting for a new
//! subscriber are a single atomic step.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use grwm_common::{Document, Event, SessionStatus};
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::errors::PipelineError;

struct SessionState {
    status: SessionStatus,
    /// `None` while a control loop owns the document.
    document: Option<Document>,
    events: Vec<Event>,
    /// Dropped on cleanup, which closes every live receiver.
    sender: Option<broadcast::Sender<Event>>,
    /// Bumped on every pass; delayed tasks only act on the pass they were scheduled for.
    generation: u64,
    loop_active: bool,
}

impl SessionState {
    fn record(&mut self, mut event: Event) -> u64 {
        let seq = self.events.len() as u64;
        event.seq = seq;
        if let Some(sender) = &self.sender {
            // No receivers is fine; the log is the source of truth.
            let _ = sender.send(event.clone());
        }
        self.events.push(event);
        seq
    }
}

/// Everything a new subscriber needs, captured atomically.
pub struct Subscription {
    pub replay: Vec<Event>,
    /// `None` once the session has been closed.
    pub receiver: Option<broadcast::Receiver<Event>>,
    pub status: SessionStatus,
}

pub struct Session {
    id: String,
    created_at: DateTime<Utc>,
    started: Instant,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(id: impl Into<String>, document: Document, broadcast_capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(broadcast_capacity.max(1));
        Self {
            id: id.into(),
            created_at: Utc::now(),
            started: Instant::now(),
            state: Mutex::new(SessionState {
                status: SessionStatus::Starting,
                document: Some(document),
                events: Vec::new(),
                sender: Some(sender),
                generation: 0,
                loop_active: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        // Critical sections never panic midway, so a poisoned state is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Instant after which the session is forced to fail.
    pub fn deadline(&self, budget: Duration) -> Instant {
        self.started + budget
    }

    pub fn status(&self) -> SessionStatus {
        self.lock().status
    }

    pub fn event_count(&self) -> usize {
        self.lock().events.len()
    }

    /// Append to the log and publish live. Returns the assigned `seq`.
    pub fn record(&self, event: Event) -> u64 {
        self.lock().record(event)
    }

    /// Logged events with `seq` greater than `after` (all of them for `None`).
    pub fn events_after(&self, after: Option<u64>) -> Vec<Event> {
        let state = self.lock();
        let start = after.map_or(0, |seq| seq as usize + 1);
        state.events.get(start..).map(<[Event]>::to_vec).unwrap_or_default()
    }

    pub fn subscribe(&self) -> Subscription {
        let state = self.lock();
        Subscription {
            replay: state.events.clone(),
            receiver: state.sender.as_ref().map(broadcast::Sender::subscribe),
            status: state.status,
        }
    }

    /// Take the document for a new control-loop pass.
    ///
    /// Only valid from `expected` with no loop active; `prepare` runs on the
    /// document under the lock before it is handed out. Returns the document
    /// and the pass generation.
    pub fn begin_pass<F>(&self, expected: SessionStatus, prepare: F) -> Result<(Document, u64), PipelineError>
    where
        F: FnOnce(&mut Document),
    {
        let mut state = self.lock();
        if state.status != expected || state.loop_active {
            let actual = if state.loop_active {
                SessionStatus::Running
            } else {
                state.status
            };
            return Err(PipelineError::State {
                session_id: self.id.clone(),
                expected,
                actual,
            });
        }
        let mut document = state
            .document
            .take()
            .ok_or_else(|| PipelineError::Internal(format!("session {} has no document", self.id)))?;
        prepare(&mut document);
        state.status = SessionStatus::Running;
        state.loop_active = true;
        state.generation += 1;
        Ok((document, state.generation))
    }

    /// End a pass: store the document, set the status and log the closing event together.
    pub fn finish_pass(&self, status: SessionStatus, document: Document, event: Event) -> u64 {
        let mut state = self.lock();
        state.status = status;
        state.document = Some(document);
        state.loop_active = false;
        state.record(event)
    }

    /// End a pass that lost its document (a panic in the control loop).
    pub fn abort_pass(&self, event: Event) -> u64 {
        let mut state = self.lock();
        state.status = SessionStatus::Error;
        state.loop_active = false;
        state.record(event)
    }

    /// Fail an idle session still in `expected` for pass `generation`.
    pub fn fail_if_idle(&self, generation: u64, expected: SessionStatus, event: Event) -> bool {
        let mut state = self.lock();
        if state.generation != generation || state.status != expected || state.loop_active {
            return false;
        }
        state.status = SessionStatus::Error;
        state.record(event);
        true
    }

    /// True when pass `generation` ended terminally and nothing has started since.
    pub fn is_idle_terminal(&self, generation: u64) -> bool {
        let state = self.lock();
        state.generation == generation && state.status.is_terminal() && !state.loop_active
    }

    /// Copy of the document; `None` while a control loop owns it.
    pub fn document_snapshot(&self) -> Option<Document> {
        self.lock().document.clone()
    }

    /// Drop the broadcast sender so live receivers observe `Closed`.
    pub fn close(&self) {
        self.lock().sender = None;
    }
}

/// Session id -> session. The only structure shared across sessions.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, session: Arc<Session>) {
        self.lock().insert(session.id().to_string(), session);
    }

    pub fn get(&self, session_id: &str) -> Result<Arc<Session>, PipelineError> {
        self.lock()
            .get(session_id)
            .cloned()
            .ok_or_else(|| PipelineError::NotFound {
                session_id: session_id.to_string(),
            })
    }

    pub fn remove(&self, session_id: &str) -> Option<Arc<Session>> {
        self.lock().remove(session_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
