//! Control loop and the session entry points.
//!
//! One tokio task drives each pass. The task owns the document for the whole
//! pass, so `resume` and `request_revision` are only accepted while no pass
//! is running. A supervising task turns a panic in the loop into a terminal
//! error event for that session only.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use grwm_common::{Document, ErrorInfo, Event, EventType, SessionStatus, StageName};
use serde_json::{Value, json};
use tokio::time::Instant;
use uuid::Uuid;

use super::bridge::EventBridge;
use super::routing::{self, Route};
use super::runner::WorkerRunner;
use super::session::{Session, SessionRegistry};
use super::stream::{StreamItem, event_stream};
use crate::config::{Config, PipelineConfig};
use crate::errors::PipelineError;
use crate::stages::StageSet;
use crate::stages::ghostwriter::{ReadmeStyle, apply_revision_keywords, word_count};

/// Runtime bounds for the control loop, derived from [`PipelineConfig`].
#[derive(Debug, Clone)]
pub struct Limits {
    pub max_retries: u32,
    /// Wall-clock budget from session creation, covering running and suspended time.
    pub session_timeout: Duration,
    pub cleanup_delay: Duration,
    pub broadcast_capacity: usize,
    pub progress_buffer: usize,
}

impl From<&PipelineConfig> for Limits {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            session_timeout: config.session_timeout(),
            cleanup_delay: config.cleanup_delay(),
            broadcast_capacity: config.broadcast_capacity,
            progress_buffer: config.progress_buffer,
        }
    }
}

struct Inner {
    registry: SessionRegistry,
    stages: StageSet,
    runner: WorkerRunner,
    limits: Limits,
}

/// How a pass ended.
enum PassEnd {
    Suspended(Document),
    Completed(Document),
    /// Retries exhausted, or a writing failure.
    Failed(Document, ErrorInfo),
    /// Precondition, timeout or invariant violation.
    Fatal(Document, PipelineError, Option<StageName>),
}

#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(stages: StageSet, limits: Limits) -> Self {
        let runner = WorkerRunner::new(limits.progress_buffer);
        Self {
            inner: Arc::new(Inner {
                registry: SessionRegistry::new(),
                stages,
                runner,
                limits,
            }),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(StageSet::from_config(config), Limits::from(&config.pipeline))
    }

    /// Create a session and start driving it. Must be called within a tokio runtime.
    ///
    /// A `choice` given here is treated as already confirmed, so the pass
    /// runs straight through to writing.
    pub fn start(
        &self,
        subject_id: &str,
        preferences: BTreeMap<String, String>,
        choice: Option<String>,
    ) -> Result<String, PipelineError> {
        let subject_id = subject_id.trim();
        let mut document = Document::new(subject_id, preferences);
        if let Some(choice) = choice {
            document.confirm_choice(choice);
        }

        let session_id = Uuid::new_v4().to_string();
        let session = Arc::new(Session::new(
            session_id.clone(),
            document,
            self.inner.limits.broadcast_capacity,
        ));
        self.inner.registry.insert(Arc::clone(&session));
        EventBridge::new(Arc::clone(&session)).publish(
            Event::pipeline(EventType::Init, format!("Starting pipeline for {}", subject_id))
                .with_payload(json!({ "session_id": session_id, "subject_id": subject_id })),
        );
        tracing::info!(session_id = %session_id, subject_id, "Session created");

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            match session.begin_pass(SessionStatus::Starting, |_| {}) {
                Ok((document, generation)) => spawn_pass(inner, session, document, generation),
                Err(e) => tracing::error!(session_id = %session.id(), error = %e, "Could not begin first pass"),
            }
        });
        Ok(session_id)
    }

    /// Confirm the choice on a suspended session and continue to writing.
    pub fn resume(&self, session_id: &str, choice: &str) -> Result<(), PipelineError> {
        let session = self.inner.registry.get(session_id)?;
        let choice = choice.trim().to_string();
        let (document, generation) = session.begin_pass(SessionStatus::Suspended, |d| {
            d.confirm_choice(choice.clone());
        })?;
        EventBridge::new(Arc::clone(&session)).publish(
            Event::pipeline(EventType::Resumed, format!("Resuming with style '{}'", choice))
                .with_payload(json!({ "choice": choice })),
        );
        tracing::info!(session_id, choice = %choice, "Session resumed");
        spawn_pass(Arc::clone(&self.inner), session, document, generation);
        Ok(())
    }

    /// Re-run the writer on a completed session with new instructions.
    pub fn request_revision(&self, session_id: &str, instructions: &str) -> Result<(), PipelineError> {
        let session = self.inner.registry.get(session_id)?;
        let instructions = instructions.trim().to_string();
        let (document, generation) = session.begin_pass(SessionStatus::Completed, |d| {
            apply_revision_keywords(&mut d.preferences, &instructions);
            d.revision_request = Some(instructions.clone());
        })?;
        EventBridge::new(Arc::clone(&session)).publish(
            Event::for_stage(
                EventType::RevisionStarted,
                StageName::Ghostwriter,
                format!("Revising: {}", instructions),
            )
            .with_payload(json!({
                "instructions": instructions,
                "next_version": document.history.len() + 1,
            })),
        );
        tracing::info!(session_id, "Revision requested");
        spawn_pass(Arc::clone(&self.inner), session, document, generation);
        Ok(())
    }

    pub fn status(&self, session_id: &str) -> Result<SessionStatus, PipelineError> {
        Ok(self.inner.registry.get(session_id)?.status())
    }

    pub fn session(&self, session_id: &str) -> Result<Arc<Session>, PipelineError> {
        self.inner.registry.get(session_id)
    }

    /// Replay plus live events for one session.
    pub fn subscribe(
        &self,
        session_id: &str,
        idle: Duration,
    ) -> Result<impl Stream<Item = StreamItem> + Send + 'static + use<>, PipelineError> {
        let session = self.inner.registry.get(session_id)?;
        Ok(event_stream(session, idle))
    }

    pub fn active_sessions(&self) -> usize {
        self.inner.registry.len()
    }
}

/// Drive one pass on its own task, supervised for panics.
fn spawn_pass(inner: Arc<Inner>, session: Arc<Session>, document: Document, generation: u64) {
    let pass = run_loop(Arc::clone(&inner), Arc::clone(&session), document);
    supervise(inner, session, generation, pass);
}

/// Drive one pass on its own task. A panic in the pass fails this session only.
fn supervise<F>(inner: Arc<Inner>, session: Arc<Session>, generation: u64, pass: F)
where
    F: Future<Output = PassEnd> + Send + 'static,
{
    tokio::spawn(async move {
        let worker = tokio::spawn(pass);
        match worker.await {
            Ok(end) => finish(&inner, &session, end, generation),
            Err(e) => {
                tracing::error!(session_id = %session.id(), error = %e, "Control loop crashed");
                session.abort_pass(
                    Event::pipeline(EventType::Error, "Internal error in the pipeline control loop")
                        .with_payload(json!({ "code": "internal_error" })),
                );
                schedule_cleanup(&inner, Arc::clone(&session), generation);
            }
        }
    });
}

async fn run_loop(inner: Arc<Inner>, session: Arc<Session>, mut document: Document) -> PassEnd {
    let bridge = EventBridge::new(Arc::clone(&session));
    let limits = &inner.limits;
    let deadline = session.deadline(limits.session_timeout);
    let timeout_error = || PipelineError::Timeout {
        session_id: session.id().to_string(),
        budget_secs: limits.session_timeout.as_secs(),
    };
    let mut current_stage = None;

    loop {
        let route = routing::next(&document, limits.max_retries);
        tracing::debug!(session_id = %session.id(), state = route.state_label(), "Routing decision");

        let stage = match route {
            Route::Done => return PassEnd::Completed(document),
            Route::Suspend => return PassEnd::Suspended(document),
            Route::Fail => {
                return match document.error.clone() {
                    Some(error) => PassEnd::Failed(document, error),
                    None => PassEnd::Fatal(
                        document,
                        PipelineError::Internal("routing failed without an error".to_string()),
                        current_stage,
                    ),
                };
            }
            Route::Retry(stage) => {
                document.error = None;
                tracing::info!(session_id = %session.id(), stage = %stage, attempt = document.retry_count + 1, "Retrying stage");
                bridge.publish(
                    Event::for_stage(
                        EventType::Retry,
                        stage,
                        format!(
                            "Retrying {} (attempt {} of {})",
                            stage,
                            document.retry_count + 1,
                            limits.max_retries
                        ),
                    )
                    .with_payload(json!({ "retry_count": document.retry_count })),
                );
                stage
            }
            Route::Run(stage) => stage,
        };

        if let Some(missing) = document.missing_input(stage) {
            return PassEnd::Fatal(
                document,
                PipelineError::Precondition { stage, missing },
                Some(stage),
            );
        }
        current_stage = Some(stage);
        if Instant::now() >= deadline {
            return PassEnd::Fatal(document, timeout_error(), current_stage);
        }

        bridge.publish(
            Event::for_stage(
                EventType::StageStarted,
                stage,
                format!("{} started", stage.state_label()),
            )
            .with_payload(json!({ "state": stage.state_label(), "attempt": document.retry_count + 1 })),
        );
        let was_satisfied = document.is_satisfied(stage);
        let rx = inner.runner.spawn(inner.stages.get(stage), document.clone());
        let result = match tokio::time::timeout_at(deadline, bridge.relay(stage, rx)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(session_id = %session.id(), stage = %stage, "Session timed out mid-stage");
                return PassEnd::Fatal(document, timeout_error(), current_stage);
            }
        };

        match result.and_then(|produced| merge_output(&mut document, stage, produced)) {
            Ok(()) => {
                let mut version = None;
                if stage == StageName::Ghostwriter {
                    let revision = document.revision_request.take();
                    if !was_satisfied {
                        version = document.record_output(revision);
                    }
                }
                if let Err(violation) = document.check_order() {
                    return PassEnd::Fatal(document, PipelineError::Internal(violation), current_stage);
                }
                tracing::info!(session_id = %session.id(), stage = %stage, "Stage complete");
                bridge.publish(
                    Event::for_stage(
                        EventType::StageComplete,
                        stage,
                        format!("{} complete", stage.state_label()),
                    )
                    .with_payload(stage_summary(stage, &document, version)),
                );
            }
            Err(error) => {
                document.retry_count += 1;
                if stage == StageName::Ghostwriter {
                    document.revision_request = None;
                }
                tracing::warn!(
                    session_id = %session.id(),
                    stage = %stage,
                    retry_count = document.retry_count,
                    error = %error.message,
                    "Stage failed"
                );
                bridge.publish(
                    Event::for_stage(EventType::StageFailed, stage, error.message.clone()).with_payload(json!({
                        "retry_count": document.retry_count,
                        "cause": error.cause,
                    })),
                );
                document.error = Some(error);
            }
        }
    }
}

/// Copy only the field `stage` owns from the worker's document.
fn merge_output(document: &mut Document, stage: StageName, produced: Document) -> Result<(), ErrorInfo> {
    let missing = || ErrorInfo::new(stage, "Stage finished without producing its output");
    match stage {
        StageName::Detective => document.gathered_data = Some(produced.gathered_data.ok_or_else(missing)?),
        StageName::Cto => document.analysis = Some(produced.analysis.ok_or_else(missing)?),
        StageName::Ghostwriter => document.output = Some(produced.output.ok_or_else(missing)?),
    }
    Ok(())
}

fn stage_summary(stage: StageName, document: &Document, version: Option<u32>) -> Value {
    match stage {
        StageName::Detective => {
            let data = document.gathered_data.as_ref().unwrap_or(&Value::Null);
            json!({
                "login": data["profile"]["login"],
                "followers": data["profile"]["followers"],
                "repositories": data["owned_repo_count"],
                "total_stars": data["social_proof"]["total_stars"],
            })
        }
        StageName::Cto => {
            let analysis = document.analysis.as_ref().unwrap_or(&Value::Null);
            json!({
                "archetype": analysis["developer_archetype"]["full_title"],
                "grind_score": analysis["grind_score"]["score"],
                "grind_label": analysis["grind_score"]["label"],
                "diversity": analysis["tech_diversity"]["classification"],
            })
        }
        StageName::Ghostwriter => {
            let output = document.output.as_deref().unwrap_or_default();
            json!({
                "length": output.len(),
                "word_count": word_count(output),
                "version": version,
            })
        }
    }
}

fn finish(inner: &Arc<Inner>, session: &Arc<Session>, end: PassEnd, generation: u64) {
    match end {
        PassEnd::Suspended(document) => {
            let options: Vec<Value> = ReadmeStyle::ALL
                .iter()
                .map(|s| json!({ "value": s.as_str(), "description": s.description() }))
                .collect();
            session.finish_pass(
                SessionStatus::Suspended,
                document,
                Event::pipeline(EventType::AwaitingChoice, "Analysis done. Pick a README style to continue.")
                    .with_payload(json!({ "choice": "style", "options": options })),
            );
            tracing::info!(session_id = %session.id(), "Session suspended awaiting choice");
            schedule_expiry(inner, Arc::clone(session), generation);
        }
        PassEnd::Completed(document) => {
            let markdown = document.output.clone().unwrap_or_default();
            let payload = json!({
                "length": markdown.len(),
                "word_count": word_count(&markdown),
                "version": document.history.len(),
                "markdown": markdown,
            });
            session.finish_pass(
                SessionStatus::Completed,
                document,
                Event::pipeline(EventType::Complete, "README ready").with_payload(payload),
            );
            tracing::info!(session_id = %session.id(), "Session completed");
            schedule_cleanup(inner, Arc::clone(session), generation);
        }
        PassEnd::Failed(document, error) => {
            let (stage, message) = (error.stage, error.message.clone());
            let cause = error.cause.clone();
            let failure = PipelineError::from(error);
            let payload = json!({ "code": failure.code(), "retry_count": document.retry_count, "cause": cause });
            tracing::warn!(session_id = %session.id(), error = %failure, "Session failed");
            session.finish_pass(
                SessionStatus::Error,
                document,
                Event::for_stage(EventType::Error, stage, message).with_payload(payload),
            );
            schedule_cleanup(inner, Arc::clone(session), generation);
        }
        PassEnd::Fatal(document, error, stage) => {
            tracing::error!(session_id = %session.id(), error = %error, "Session aborted");
            let tag = stage.map_or(grwm_common::PIPELINE_TAG, |s| s.as_str());
            session.finish_pass(
                SessionStatus::Error,
                document,
                Event::new(EventType::Error, tag, error.to_string()).with_payload(json!({ "code": error.code() })),
            );
            schedule_cleanup(inner, Arc::clone(session), generation);
        }
    }
}

/// Fail a suspended session once its wall-clock budget runs out.
fn schedule_expiry(inner: &Arc<Inner>, session: Arc<Session>, generation: u64) {
    let inner = Arc::clone(inner);
    let deadline = session.deadline(inner.limits.session_timeout);
    tokio::spawn(async move {
        tokio::time::sleep_until(deadline).await;
        let error = PipelineError::Timeout {
            session_id: session.id().to_string(),
            budget_secs: inner.limits.session_timeout.as_secs(),
        };
        let event = Event::pipeline(EventType::Error, error.to_string()).with_payload(json!({ "code": error.code() }));
        if session.fail_if_idle(generation, SessionStatus::Suspended, event) {
            tracing::info!(session_id = %session.id(), "Suspended session expired");
            schedule_cleanup(&inner, session, generation);
        }
    });
}

/// Remove a finished session after the idle delay, unless a new pass started.
fn schedule_cleanup(inner: &Arc<Inner>, session: Arc<Session>, generation: u64) {
    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        tokio::time::sleep(inner.limits.cleanup_delay).await;
        if session.is_idle_terminal(generation) {
            inner.registry.remove(session.id());
            session.close();
            tracing::debug!(session_id = %session.id(), "Session cleaned up");
        }
    });
}
