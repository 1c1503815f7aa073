//! Worker runner: executes one blocking stage off the async runtime.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use grwm_common::{Document, ErrorInfo};
use tokio::sync::mpsc;

use crate::stages::{ProgressSink, Stage};

/// What a single stage invocation reports, in emission order.
///
/// Every invocation yields zero or more `Progress` followed by exactly one
/// `Finished`.
#[derive(Debug)]
pub enum RunnerEvent {
    Progress(String),
    Finished(Result<Document, ErrorInfo>),
}

#[derive(Debug, Clone)]
pub struct WorkerRunner {
    buffer: usize,
}

impl WorkerRunner {
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
        }
    }

    /// Run `stage` on the blocking pool and return its event channel.
    ///
    /// Progress uses `blocking_send`, so a slow consumer throttles the stage
    /// instead of dropping messages.
    pub fn spawn(&self, stage: Arc<dyn Stage>, document: Document) -> mpsc::Receiver<RunnerEvent> {
        let (tx, rx) = mpsc::channel(self.buffer);
        tokio::task::spawn_blocking(move || {
            let result = run_stage(stage.as_ref(), document, &tx);
            if tx.blocking_send(RunnerEvent::Finished(result)).is_err() {
                tracing::debug!("Runner receiver dropped before the stage finished");
            }
        });
        rx
    }
}

fn run_stage(
    stage: &dyn Stage,
    document: Document,
    tx: &mpsc::Sender<RunnerEvent>,
) -> Result<Document, ErrorInfo> {
    let name = stage.name();
    if document.is_satisfied(name) {
        tracing::debug!(stage = %name, "Stage output already present, skipping");
        let _ = tx.blocking_send(RunnerEvent::Progress(format!(
            "{} output already present, skipping",
            name
        )));
        return Ok(document);
    }

    let progress_tx = tx.clone();
    let sink = ProgressSink::new(move |message| {
        let _ = progress_tx.blocking_send(RunnerEvent::Progress(message.to_string()));
    });

    match catch_unwind(AssertUnwindSafe(|| stage.execute(document, &sink))) {
        Ok(Ok(document)) => Ok(document),
        Ok(Err(e)) => {
            let mut info = ErrorInfo::new(name, e.to_string());
            if let Some(source) = std::error::Error::source(&e) {
                info = info.with_cause(source.to_string());
            }
            Err(info)
        }
        Err(panic) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(stage = %name, panic = %detail, "Stage panicked");
            Err(ErrorInfo::new(name, "Stage crashed unexpectedly").with_cause(detail))
        }
    }
}
