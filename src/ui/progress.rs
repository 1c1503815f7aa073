use console::style;
use grwm_common::{Event, EventType, StageName};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::ui::icons::{CHECK, CROSS, CTO, DETECTIVE, GHOSTWRITER, PAUSE, RETRY, RUNNING, SPARKLE};

/// Terminal UI for `grwm run`, rendered via `indicatif` progress bars.
///
/// Two bars are stacked vertically:
/// - Stage bar: how many of the three stages have completed in this pass
/// - Activity spinner: the current stage and its latest progress message
///
/// Every logged event is also printed as one line above the bars.
pub struct RunUI {
    multi: MultiProgress,
    stage_bar: ProgressBar,
    activity: ProgressBar,
    verbose: bool,
}

impl RunUI {
    pub fn new(subject_id: &str, verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let stage_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let stage_bar = multi.add(ProgressBar::new(StageName::ALL.len() as u64));
        stage_bar.set_style(stage_style);
        stage_bar.set_prefix("Stages");
        stage_bar.set_message(style(subject_id).cyan().to_string());

        let activity_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .expect("progress bar template is a valid static string");

        let activity = multi.add(ProgressBar::new_spinner());
        activity.set_style(activity_style);
        activity.set_prefix("   Now");

        Self {
            multi,
            stage_bar,
            activity,
            verbose,
        }
    }

    /// Print a line via `MultiProgress`, falling back to `eprintln!` if the rich UI fails.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    /// Update the bars for one event and print its line.
    ///
    /// Progress lines are only printed in verbose mode; otherwise they just
    /// replace the spinner message.
    pub fn handle(&self, event: &Event) {
        match event.event_type {
            EventType::StageStarted => {
                self.activity.set_message(format!(
                    "{}{}",
                    stage_icon(&event.stage),
                    style(&event.message).yellow()
                ));
                self.activity.enable_steady_tick(Duration::from_millis(100));
            }
            EventType::Progress => {
                self.activity.set_message(format!(
                    "{}{}",
                    stage_icon(&event.stage),
                    style(&event.message).dim()
                ));
                if !self.verbose {
                    return;
                }
            }
            EventType::StageComplete => self.stage_bar.inc(1),
            EventType::RevisionStarted => {
                // A revision pass only re-runs the writer.
                self.stage_bar.set_position(StageName::ALL.len() as u64 - 1);
            }
            EventType::AwaitingChoice => self.activity.set_message("waiting for a choice"),
            EventType::Complete | EventType::Error => self.activity.disable_steady_tick(),
            _ => {}
        }
        self.print_line(format_event_line(event));
    }

    /// Stop the bars with a success banner.
    pub fn finish(&self, message: &str) {
        self.stage_bar
            .set_position(StageName::ALL.len() as u64);
        self.stage_bar.finish();
        self.activity
            .finish_with_message(format!("{}{}", SPARKLE, style(message).green().bold()));
    }

    /// Stop the bars with a failure banner.
    pub fn fail(&self, reason: &str) {
        self.stage_bar.abandon();
        self.activity
            .abandon_with_message(format!("{}{}", CROSS, style(reason).red().bold()));
    }

    /// Pause the bars while an interactive prompt owns the terminal. The
    /// prompt blocks, so it runs on the blocking pool.
    pub async fn suspend_blocking<R, F>(&self, f: F) -> Result<R, tokio::task::JoinError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let multi = self.multi.clone();
        tokio::task::spawn_blocking(move || multi.suspend(f)).await
    }
}

fn stage_icon(stage: &str) -> String {
    match stage.parse::<StageName>() {
        Ok(StageName::Detective) => DETECTIVE.to_string(),
        Ok(StageName::Cto) => CTO.to_string(),
        Ok(StageName::Ghostwriter) => GHOSTWRITER.to_string(),
        Err(_) => RUNNING.to_string(),
    }
}

/// One printable line for a logged event.
pub fn format_event_line(event: &Event) -> String {
    let (icon, text) = match event.event_type {
        EventType::StageComplete | EventType::Complete => {
            (CHECK.to_string(), style(&event.message).green().to_string())
        }
        EventType::StageFailed | EventType::Error => {
            (CROSS.to_string(), style(&event.message).red().to_string())
        }
        EventType::Retry => (RETRY.to_string(), style(&event.message).yellow().to_string()),
        EventType::AwaitingChoice => {
            (PAUSE.to_string(), style(&event.message).cyan().bold().to_string())
        }
        EventType::Progress => (
            format!("  {} ", style("→").dim()),
            style(&event.message).dim().to_string(),
        ),
        _ => (stage_icon(&event.stage), event.message.clone()),
    };
    format!(
        "{} {}{}",
        style(format!("[{:>3}]", event.seq)).dim(),
        icon,
        text
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(event: &Event) -> String {
        console::strip_ansi_codes(&format_event_line(event)).to_string()
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_suspend_blocking_runs_off_the_runtime_thread() {
        let ui = RunUI::new("octocat", false);
        let caller = std::thread::current().id();
        let worker = ui.suspend_blocking(|| std::thread::current().id()).await.unwrap();
        assert_ne!(worker, caller);
    }

    #[test]
    fn test_event_line_has_seq_and_message() {
        let mut event = Event::for_stage(EventType::StageStarted, StageName::Cto, "Analyzing profile");
        event.seq = 4;
        let line = plain(&event);
        assert!(line.starts_with("[  4]"));
        assert!(line.ends_with("Analyzing profile"));
    }

    #[test]
    fn test_failure_and_complete_lines_keep_message() {
        let failed = Event::for_stage(EventType::StageFailed, StageName::Detective, "rate limited");
        assert!(plain(&failed).contains("rate limited"));

        let done = Event::pipeline(EventType::Complete, "README ready");
        assert!(plain(&done).contains("README ready"));
    }

    #[test]
    fn test_unknown_stage_tag_uses_generic_icon() {
        assert_eq!(stage_icon("pipeline"), RUNNING.to_string());
        assert_eq!(stage_icon("ghostwriter"), GHOSTWRITER.to_string());
    }
}
