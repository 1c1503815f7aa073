//! Pipeline stages.
//!
//! Each stage is a blocking unit of work: it receives the current
//! [`Document`], may perform network I/O, and returns the document with its
//! own output field filled in. Stages never see the session, the event log or
//! the runtime; progress is reported through a [`ProgressSink`] callback.
//!
//! | Stage         | State       | Reads                       | Writes          |
//! |---------------|-------------|-----------------------------|-----------------|
//! | `detective`   | gathering   | `subject_id`                | `gathered_data` |
//! | `cto`         | analyzing   | `gathered_data`             | `analysis`      |
//! | `ghostwriter` | writing     | `gathered_data`, `analysis` | `output`        |

pub mod badges;
pub mod cto;
pub mod detective;
pub mod ghostwriter;
pub mod github;
pub mod llm;

use std::sync::Arc;

use grwm_common::{Document, StageName};

use crate::config::Config;
use crate::errors::StageError;

pub use cto::CtoStage;
pub use detective::DetectiveStage;
pub use ghostwriter::GhostwriterStage;

/// A single pipeline stage.
///
/// `execute` is called on a blocking worker thread, never on the async
/// runtime. Failures must be returned as `Err`; a panic is caught by the
/// worker runner but is treated as a bug.
pub trait Stage: Send + Sync {
    fn name(&self) -> StageName;

    fn execute(&self, document: Document, progress: &ProgressSink) -> Result<Document, StageError>;
}

/// Callback a stage uses to report human-readable progress.
pub struct ProgressSink {
    callback: Box<dyn Fn(&str) + Send + Sync>,
}

impl ProgressSink {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }

    /// A sink that drops every message.
    pub fn discard() -> Self {
        Self::new(|_| {})
    }

    pub fn emit(&self, message: impl AsRef<str>) {
        (self.callback)(message.as_ref());
    }
}

/// The three stage implementations used by one orchestrator.
#[derive(Clone)]
pub struct StageSet {
    detective: Arc<dyn Stage>,
    cto: Arc<dyn Stage>,
    ghostwriter: Arc<dyn Stage>,
}

impl StageSet {
    pub fn new(detective: Arc<dyn Stage>, cto: Arc<dyn Stage>, ghostwriter: Arc<dyn Stage>) -> Self {
        Self {
            detective,
            cto,
            ghostwriter,
        }
    }

    /// Production stages: GitHub REST for gathering, and Gemini for writing
    /// when an API key is configured.
    pub fn from_config(config: &Config) -> Self {
        let github = &config.github;
        let source = Arc::new(github::GitHubClient::new(github));
        let ghostwriter = match llm::GeminiClient::from_config(&config.llm) {
            Some(model) => GhostwriterStage::with_model(Arc::new(model)),
            None => {
                tracing::info!("No Google API key; README writing uses templates");
                GhostwriterStage::new()
            }
        };
        Self::new(
            Arc::new(DetectiveStage::new(source, github.max_repos)),
            Arc::new(CtoStage::new()),
            Arc::new(ghostwriter),
        )
    }

    pub fn get(&self, name: StageName) -> Arc<dyn Stage> {
        match name {
            StageName::Detective => Arc::clone(&self.detective),
            StageName::Cto => Arc::clone(&self.cto),
            StageName::Ghostwriter => Arc::clone(&self.ghostwriter),
        }
    }
}
