//! Routing policy: picks what the control loop does next.
//!
//! [`next`] is a pure function of the document and the retry bound. It holds
//! no state, so evaluating it twice on the same document gives the same route.

use grwm_common::{Document, StageName};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Run a stage in normal order.
    Run(StageName),
    /// Re-run a stage after a failure. The caller clears the error first.
    Retry(StageName),
    /// Stop the pass and wait for an external choice.
    Suspend,
    Done,
    Fail,
}

impl Route {
    /// Pipeline state name for logs and events.
    pub fn state_label(&self) -> &'static str {
        match self {
            Self::Run(stage) | Self::Retry(stage) => stage.state_label(),
            Self::Suspend => "awaiting_choice",
            Self::Done => "done",
            Self::Fail => "failed",
        }
    }

    pub fn stage(&self) -> Option<StageName> {
        match self {
            Self::Run(stage) | Self::Retry(stage) => Some(*stage),
            _ => None,
        }
    }
}

/// Decide the next step, in priority order:
///
/// 1. a recorded error: fail once `retry_count` reaches `max_retries`,
///    otherwise retry the earliest stage whose output is missing
///    (a writing failure is never retried),
/// 2. a pending revision re-runs the writer,
/// 3. missing stage outputs run in order,
/// 4. before writing, suspend until the choice is confirmed,
/// 5. done.
pub fn next(document: &Document, max_retries: u32) -> Route {
    if document.error.is_some() {
        if document.retry_count >= max_retries {
            return Route::Fail;
        }
        return if document.gathered_data.is_none() {
            Route::Retry(StageName::Detective)
        } else if document.analysis.is_none() {
            Route::Retry(StageName::Cto)
        } else {
            Route::Fail
        };
    }

    if document.revision_request.is_some() {
        return Route::Run(StageName::Ghostwriter);
    }
    if document.gathered_data.is_none() {
        return Route::Run(StageName::Detective);
    }
    if document.analysis.is_none() {
        return Route::Run(StageName::Cto);
    }
    if document.output.is_none() {
        return if document.is_choice_confirmed() {
            Route::Run(StageName::Ghostwriter)
        } else {
            Route::Suspend
        };
    }
    Route::Done
}

#[cfg(test)]
mod tests {
    use super::*;
    use grwm_common::ErrorInfo;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn doc() -> Document {
        Document::new("octocat", BTreeMap::new())
    }

    fn analyzed() -> Document {
        let mut d = doc();
        d.gathered_data = Some(json!({"repos": 1}));
        d.analysis = Some(json!({"score": 1}));
        d
    }

    #[test]
    fn test_fresh_document_starts_gathering() {
        assert_eq!(next(&doc(), 3), Route::Run(StageName::Detective));
    }

    #[test]
    fn test_stages_run_in_order() {
        let mut d = doc();
        d.gathered_data = Some(json!({}));
        assert_eq!(next(&d, 3), Route::Run(StageName::Cto));
        d.analysis = Some(json!({}));
        d.choice = Some("modern".to_string());
        assert_eq!(next(&d, 3), Route::Run(StageName::Ghostwriter));
        d.output = Some("# hi".to_string());
        assert_eq!(next(&d, 3), Route::Done);
    }

    #[test]
    fn test_unconfirmed_choice_suspends() {
        let d = analyzed();
        assert_eq!(next(&d, 3), Route::Suspend);
        assert_eq!(Route::Suspend.state_label(), "awaiting_choice");
    }

    #[test]
    fn test_error_retries_earliest_missing_stage() {
        let mut d = doc();
        d.error = Some(ErrorInfo::new(StageName::Detective, "timeout"));
        d.retry_count = 1;
        assert_eq!(next(&d, 3), Route::Retry(StageName::Detective));

        d.gathered_data = Some(json!({}));
        d.error = Some(ErrorInfo::new(StageName::Cto, "bad data"));
        assert_eq!(next(&d, 3), Route::Retry(StageName::Cto));
    }

    #[test]
    fn test_error_at_retry_bound_fails() {
        let mut d = doc();
        d.error = Some(ErrorInfo::new(StageName::Detective, "timeout"));
        d.retry_count = 3;
        assert_eq!(next(&d, 3), Route::Fail);
    }

    #[test]
    fn test_writing_error_is_not_retried() {
        let mut d = analyzed();
        d.choice = Some("modern".to_string());
        d.error = Some(ErrorInfo::new(StageName::Ghostwriter, "template blew up"));
        d.retry_count = 1;
        assert_eq!(next(&d, 3), Route::Fail);
    }

    #[test]
    fn test_revision_bypasses_order_but_not_errors() {
        let mut d = analyzed();
        d.output = Some("# v1".to_string());
        d.revision_request = Some("shorter".to_string());
        assert_eq!(next(&d, 3), Route::Run(StageName::Ghostwriter));

        d.error = Some(ErrorInfo::new(StageName::Ghostwriter, "boom"));
        assert_eq!(next(&d, 3), Route::Fail);
    }

    #[test]
    fn test_routing_is_pure() {
        let documents = [doc(), analyzed(), {
            let mut d = analyzed();
            d.error = Some(ErrorInfo::new(StageName::Cto, "x"));
            d
        }];
        for d in &documents {
            let snapshot = d.clone();
            assert_eq!(next(d, 3), next(d, 3));
            assert_eq!(*d, snapshot);
        }
    }
}
