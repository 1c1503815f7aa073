//! End-to-end pipeline runs through the public API with the real stages
//! and an in-memory GitHub source.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::StreamExt;
use grwm::errors::StageError;
use grwm::pipeline::{Limits, Orchestrator, StreamItem};
use grwm::stages::StageSet;
use grwm::stages::cto::CtoStage;
use grwm::stages::detective::DetectiveStage;
use grwm::stages::ghostwriter::GhostwriterStage;
use grwm::stages::github::{GitHubProfile, GitHubRepo, GitHubSource};
use grwm_common::{Event, EventType, SessionStatus};

/// Fails the first `failures` profile lookups with a network error.
struct FlakySource {
    failures: usize,
    calls: AtomicUsize,
}

impl FlakySource {
    fn new(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
        }
    }
}

impl GitHubSource for FlakySource {
    fn profile(&self, login: &str) -> Result<GitHubProfile, StageError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(StageError::Network("connection reset".to_string()));
        }
        Ok(GitHubProfile {
            login: login.to_string(),
            name: Some("Mona Lisa".to_string()),
            bio: Some("Building developer tools".to_string()),
            followers: 42,
            public_repos: 3,
            ..Default::default()
        })
    }

    fn repositories(&self, login: &str) -> Result<Vec<GitHubRepo>, StageError> {
        let repo = |name: &str, stars: u32, language: &str| GitHubRepo {
            name: name.to_string(),
            description: Some(format!("{} for everyone", name)),
            html_url: format!("https://github.com/{}/{}", login, name),
            stargazers_count: stars,
            forks_count: stars / 10,
            language: Some(language.to_string()),
            pushed_at: Some(chrono::Utc::now().to_rfc3339()),
            ..Default::default()
        };
        Ok(vec![
            repo("spoon-knife", 300, "Rust"),
            repo("hello-world", 120, "Rust"),
            repo("linguist", 80, "TypeScript"),
        ])
    }
}

fn orchestrator(source: FlakySource) -> Orchestrator {
    let stages = StageSet::new(
        Arc::new(DetectiveStage::new(Arc::new(source), 10)),
        Arc::new(CtoStage::new()),
        Arc::new(GhostwriterStage::new()),
    );
    Orchestrator::new(
        stages,
        Limits {
            max_retries: 3,
            session_timeout: Duration::from_secs(30),
            cleanup_delay: Duration::from_secs(30),
            broadcast_capacity: 256,
            progress_buffer: 16,
        },
    )
}

/// Follow one subscription to its `done` marker, answering a suspend with `style`.
async fn drive(orchestrator: &Orchestrator, id: &str, style: &str) -> (Vec<Event>, SessionStatus) {
    let mut items = Box::pin(orchestrator.subscribe(id, Duration::from_secs(5)).unwrap());
    let mut events = Vec::new();
    let status = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(item) = items.next().await {
            match item {
                StreamItem::Event(event) => {
                    if event.event_type == EventType::AwaitingChoice {
                        orchestrator.resume(id, style).unwrap();
                    }
                    events.push(event);
                }
                StreamItem::KeepAlive => {}
                StreamItem::Done(status) => return status,
            }
        }
        panic!("stream ended without done");
    })
    .await
    .expect("pipeline did not finish in time");
    (events, status)
}

fn last_markdown(events: &[Event]) -> String {
    let complete = events
        .iter()
        .rev()
        .find(|e| e.event_type == EventType::Complete)
        .expect("no complete event");
    complete.payload.as_ref().unwrap()["markdown"]
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_flaky_gathering_retries_then_writes_chosen_style() {
    let orchestrator = orchestrator(FlakySource::new(1));
    let id = orchestrator
        .start("monalisa", BTreeMap::new(), None)
        .unwrap();

    let (events, status) = drive(&orchestrator, &id, "detailed").await;
    assert_eq!(status, SessionStatus::Completed);

    let types: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
    assert_eq!(types[0], EventType::Init);
    assert!(types.contains(&EventType::StageFailed));
    assert!(types.contains(&EventType::Retry));
    let suspend = types.iter().position(|t| *t == EventType::AwaitingChoice).unwrap();
    let resumed = types.iter().position(|t| *t == EventType::Resumed).unwrap();
    assert!(suspend < resumed);

    let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
    assert!(seqs.windows(2).all(|w| w[1] == w[0] + 1));

    let markdown = last_markdown(&events);
    assert!(markdown.starts_with("# Hi, I'm Mona Lisa"));
    assert!(markdown.contains("Languages"));
    assert!(markdown.contains("spoon-knife"));
}

#[tokio::test]
async fn test_revision_switches_tone_and_keeps_history() {
    let orchestrator = orchestrator(FlakySource::new(0));
    let id = orchestrator
        .start("monalisa", BTreeMap::new(), Some("modern".to_string()))
        .unwrap();
    let (events, status) = drive(&orchestrator, &id, "modern").await;
    assert_eq!(status, SessionStatus::Completed);
    assert!(!events.iter().any(|e| e.event_type == EventType::AwaitingChoice));

    orchestrator
        .request_revision(&id, "make it more genz please")
        .unwrap();
    let (events, status) = drive(&orchestrator, &id, "modern").await;
    assert_eq!(status, SessionStatus::Completed);
    assert!(events.iter().any(|e| e.event_type == EventType::RevisionStarted));

    let markdown = last_markdown(&events);
    assert!(markdown.starts_with("# yo, i'm Mona Lisa"));
    assert!(markdown.contains("<!-- revision: make it more genz please -->"));

    let document = orchestrator
        .session(&id)
        .unwrap()
        .document_snapshot()
        .unwrap();
    assert_eq!(document.history.len(), 2);
    assert_eq!(document.history[1].version, 2);
    assert_eq!(
        document.history[1].revision_instructions.as_deref(),
        Some("make it more genz please")
    );
}

#[tokio::test]
async fn test_persistent_network_failure_ends_in_error() {
    let orchestrator = orchestrator(FlakySource::new(usize::MAX));
    let id = orchestrator
        .start("monalisa", BTreeMap::new(), None)
        .unwrap();

    let (events, status) = drive(&orchestrator, &id, "modern").await;
    assert_eq!(status, SessionStatus::Error);
    let failures = events
        .iter()
        .filter(|e| e.event_type == EventType::StageFailed)
        .count();
    assert_eq!(failures, 3);
    assert_eq!(events.last().unwrap().event_type, EventType::Error);
    assert_eq!(orchestrator.status(&id).unwrap(), SessionStatus::Error);
}
