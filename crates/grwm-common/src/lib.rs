//! Shared domain types for the grwm generation pipeline.
//!
//! These types are threaded between the orchestrator, the stage
//! implementations and the HTTP surface. They carry no runtime behaviour
//! beyond small invariant helpers so that every crate can depend on them.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Preference key that holds the README style chosen at the suspend point.
pub const STYLE_PREFERENCE: &str = "style";

// ── Stage names ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    /// Gathering: profile and repository collection.
    Detective,
    /// Analyzing: scoring and classification.
    Cto,
    /// Writing: README rendering.
    Ghostwriter,
}

impl StageName {
    pub const ALL: [StageName; 3] = [Self::Detective, Self::Cto, Self::Ghostwriter];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Detective => "detective",
            Self::Cto => "cto",
            Self::Ghostwriter => "ghostwriter",
        }
    }

    /// Name of the pipeline state this stage runs in.
    pub fn state_label(&self) -> &'static str {
        match self {
            Self::Detective => "gathering",
            Self::Cto => "analyzing",
            Self::Ghostwriter => "writing",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "detective" => Ok(Self::Detective),
            "cto" => Ok(Self::Cto),
            "ghostwriter" => Ok(Self::Ghostwriter),
            _ => Err(format!("Invalid stage: {}", s)),
        }
    }
}

// ── Session status ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Starting,
    Running,
    Suspended,
    Completed,
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Suspended => "suspended",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// `completed` and `error` end a pass; the session becomes eligible for cleanup.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starting" => Ok(Self::Starting),
            "running" => Ok(Self::Running),
            "suspended" => Ok(Self::Suspended),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            _ => Err(format!("Invalid session status: {}", s)),
        }
    }
}

// ── Document ─────────────────────────────────────────────────────────

/// Failure recorded by a stage attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorInfo {
    pub stage: StageName,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl ErrorInfo {
    pub fn new(stage: StageName, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.stage, self.message)
    }
}

/// One produced README, kept forever in `Document::history`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputVersion {
    pub version: u32,
    pub output: String,
    pub preferences: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_instructions: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The payload threaded through the stages of one session.
///
/// Stage outputs must fill in order: `gathered_data`, then `analysis`,
/// then `output`. [`Document::check_order`] reports a violation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    subject_id: String,
    pub preferences: BTreeMap<String, String>,
    #[serde(default)]
    pub gathered_data: Option<Value>,
    #[serde(default)]
    pub analysis: Option<Value>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<ErrorInfo>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub revision_request: Option<String>,
    /// The externally confirmed choice (README style). `None` until confirmed.
    #[serde(default)]
    pub choice: Option<String>,
    #[serde(default)]
    pub history: Vec<OutputVersion>,
}

impl Document {
    pub fn new(subject_id: impl Into<String>, preferences: BTreeMap<String, String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            preferences,
            gathered_data: None,
            analysis: None,
            output: None,
            error: None,
            retry_count: 0,
            revision_request: None,
            choice: None,
            history: Vec::new(),
        }
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn preference(&self, key: &str) -> Option<&str> {
        self.preferences.get(key).map(String::as_str)
    }

    pub fn is_choice_confirmed(&self) -> bool {
        self.choice.is_some()
    }

    /// Confirm the external choice; it also becomes the `style` preference.
    pub fn confirm_choice(&mut self, choice: impl Into<String>) {
        let choice = choice.into();
        self.preferences
            .insert(STYLE_PREFERENCE.to_string(), choice.clone());
        self.choice = Some(choice);
    }

    /// True when the stage's output is already present and no revision is pending.
    pub fn is_satisfied(&self, stage: StageName) -> bool {
        if self.revision_request.is_some() && stage == StageName::Ghostwriter {
            return false;
        }
        match stage {
            StageName::Detective => self.gathered_data.is_some(),
            StageName::Cto => self.analysis.is_some(),
            StageName::Ghostwriter => self.output.is_some(),
        }
    }

    /// Name of the first input the stage needs that is still missing.
    pub fn missing_input(&self, stage: StageName) -> Option<&'static str> {
        match stage {
            StageName::Detective => None,
            StageName::Cto => self.gathered_data.is_none().then_some("gathered_data"),
            StageName::Ghostwriter => {
                if self.gathered_data.is_none() {
                    Some("gathered_data")
                } else if self.analysis.is_none() {
                    Some("analysis")
                } else {
                    None
                }
            }
        }
    }

    /// Verify that stage outputs were filled strictly in order.
    pub fn check_order(&self) -> Result<(), String> {
        if self.analysis.is_some() && self.gathered_data.is_none() {
            return Err("analysis present without gathered_data".to_string());
        }
        if self.output.is_some() && self.analysis.is_none() {
            return Err("output present without analysis".to_string());
        }
        Ok(())
    }

    /// Append the current `output` to `history` and return its version number.
    pub fn record_output(&mut self, revision_instructions: Option<String>) -> Option<u32> {
        let output = self.output.clone()?;
        let version = self.history.len() as u32 + 1;
        self.history.push(OutputVersion {
            version,
            output,
            preferences: self.preferences.clone(),
            revision_instructions,
            created_at: Utc::now(),
        });
        Some(version)
    }
}

// ── Events ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Init,
    StageStarted,
    Progress,
    StageComplete,
    StageFailed,
    Retry,
    AwaitingChoice,
    Resumed,
    RevisionStarted,
    Complete,
    Error,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::StageStarted => "stage_started",
            Self::Progress => "progress",
            Self::StageComplete => "stage_complete",
            Self::StageFailed => "stage_failed",
            Self::Retry => "retry",
            Self::AwaitingChoice => "awaiting_choice",
            Self::Resumed => "resumed",
            Self::RevisionStarted => "revision_started",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    /// Terminal events end a live stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

/// Stage tag used for events that are not tied to a single stage.
pub const PIPELINE_TAG: &str = "pipeline";

/// One entry of a session's event log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Position in the session's event log; assigned when the event is recorded.
    #[serde(default)]
    pub seq: u64,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub stage: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(event_type: EventType, stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            seq: 0,
            event_type,
            stage: stage.into(),
            message: message.into(),
            payload: None,
            timestamp: Utc::now(),
        }
    }

    pub fn for_stage(event_type: EventType, stage: StageName, message: impl Into<String>) -> Self {
        Self::new(event_type, stage.as_str(), message)
    }

    pub fn pipeline(event_type: EventType, message: impl Into<String>) -> Self {
        Self::new(event_type, PIPELINE_TAG, message)
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.event_type.is_terminal()
    }
}
