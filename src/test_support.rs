//! Scripted stages for driving the runner and orchestrator in tests.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use grwm_common::{Document, StageName};
use serde_json::json;

use crate::errors::StageError;
use crate::stages::{ProgressSink, Stage, StageSet};

/// A stage whose behaviour is fixed up front.
pub struct ScriptedStage {
    name: StageName,
    progress: usize,
    fail_times: usize,
    panic: bool,
    empty_output: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedStage {
    pub fn new(name: StageName) -> Self {
        Self {
            name,
            progress: 1,
            fail_times: 0,
            panic: false,
            empty_output: false,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_progress(mut self, count: usize) -> Self {
        self.progress = count;
        self
    }

    /// Fail the first `times` calls, then succeed.
    pub fn failing(mut self, times: usize) -> Self {
        self.fail_times = times;
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panic = true;
        self
    }

    /// Return `Ok` without filling the stage's output.
    pub fn without_output(mut self) -> Self {
        self.empty_output = true;
        self
    }

    pub fn sleeping(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Stage for ScriptedStage {
    fn name(&self) -> StageName {
        self.name
    }

    fn execute(&self, mut document: Document, progress: &ProgressSink) -> Result<Document, StageError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        for i in 1..=self.progress {
            progress.emit(format!("{} step {}", self.name, i));
        }
        if self.panic {
            panic!("scripted panic");
        }
        if call <= self.fail_times {
            return Err(StageError::Network(format!("scripted failure {}", call)));
        }
        if self.empty_output {
            return Ok(document);
        }
        match self.name {
            StageName::Detective => document.gathered_data = Some(json!({"call": call})),
            StageName::Cto => document.analysis = Some(json!({"call": call})),
            StageName::Ghostwriter => {
                let note = document.revision_request.as_deref().unwrap_or("initial");
                document.output = Some(format!("# README ({}, call {})", note, call));
            }
        }
        Ok(document)
    }
}

/// Handles to the three scripted stages plus the set built from them.
pub struct ScriptedStages {
    pub detective: Arc<ScriptedStage>,
    pub cto: Arc<ScriptedStage>,
    pub ghostwriter: Arc<ScriptedStage>,
}

impl ScriptedStages {
    pub fn new(detective: ScriptedStage, cto: ScriptedStage, ghostwriter: ScriptedStage) -> Self {
        Self {
            detective: Arc::new(detective),
            cto: Arc::new(cto),
            ghostwriter: Arc::new(ghostwriter),
        }
    }

    pub fn happy() -> Self {
        Self::new(
            ScriptedStage::new(StageName::Detective),
            ScriptedStage::new(StageName::Cto),
            ScriptedStage::new(StageName::Ghostwriter),
        )
    }

    pub fn set(&self) -> StageSet {
        StageSet::new(self.detective.clone(), self.cto.clone(), self.ghostwriter.clone())
    }
}

/// A document that has finished gathering and analysis.
pub fn analyzed_document() -> Document {
    let mut doc = Document::new("octocat", BTreeMap::new());
    doc.gathered_data = Some(json!({"call": 1}));
    doc.analysis = Some(json!({"call": 1}));
    doc
}
