//! One in-process pipeline run: `grwm run <username>`.

use anyhow::{Context, Result};
use futures::StreamExt;
use grwm_common::{EventType, SessionStatus};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

use grwm::config::Config;
use grwm::pipeline::{Orchestrator, StreamItem};
use grwm::stages::ghostwriter::{DESCRIPTION_PREFERENCE, ReadmeStyle, TONE_PREFERENCE, Tone};
use grwm::stages::github::is_valid_login;
use grwm::ui::RunUI;

pub struct RunArgs {
    pub username: String,
    pub tone: Option<String>,
    pub style: Option<String>,
    pub description: Option<String>,
    pub out: Option<PathBuf>,
}

pub async fn cmd_run(config: Config, args: RunArgs, verbose: bool) -> Result<()> {
    let username = args.username.trim();
    if !is_valid_login(username) {
        anyhow::bail!("'{}' is not a valid GitHub username", username);
    }

    let mut preferences = BTreeMap::new();
    if let Some(tone) = &args.tone {
        let tone = Tone::from_str(tone).map_err(anyhow::Error::msg)?;
        preferences.insert(TONE_PREFERENCE.to_string(), tone.as_str().to_string());
    }
    if let Some(description) = &args.description {
        preferences.insert(DESCRIPTION_PREFERENCE.to_string(), description.clone());
    }
    let choice = match &args.style {
        Some(style) => Some(
            ReadmeStyle::from_str(style)
                .map_err(anyhow::Error::msg)?
                .as_str()
                .to_string(),
        ),
        None => None,
    };

    if config.github.token.is_none() {
        tracing::warn!("GITHUB_TOKEN not set; unauthenticated requests are rate limited");
    }

    let orchestrator = Orchestrator::from_config(&config);
    let session_id = orchestrator.start(username, preferences, choice)?;
    let mut items = Box::pin(
        orchestrator.subscribe(&session_id, config.pipeline.idle_keepalive())?,
    );
    tracing::debug!(session_id = %session_id, "Run started");

    let ui = RunUI::new(username, verbose);
    let mut markdown: Option<String> = None;
    let mut failure: Option<String> = None;
    let mut final_status = SessionStatus::Error;

    while let Some(item) = items.next().await {
        match item {
            StreamItem::Event(event) => {
                ui.handle(&event);
                match event.event_type {
                    EventType::AwaitingChoice => {
                        let style = ui.suspend_blocking(prompt_style).await.context("Style prompt task failed")??;
                        orchestrator.resume(&session_id, style.as_str())?;
                    }
                    EventType::Complete => {
                        markdown = event
                            .payload
                            .as_ref()
                            .and_then(|p| p["markdown"].as_str())
                            .map(str::to_string);
                    }
                    EventType::Error => failure = Some(event.message.clone()),
                    _ => {}
                }
            }
            StreamItem::KeepAlive => {}
            StreamItem::Done(status) => {
                final_status = status;
                break;
            }
        }
    }

    if final_status != SessionStatus::Completed {
        let reason = failure.unwrap_or_else(|| format!("pipeline ended as {}", final_status));
        ui.fail(&reason);
        anyhow::bail!("README generation failed: {}", reason);
    }

    let markdown = markdown.context("Pipeline completed without a README")?;
    ui.finish("README ready");

    match &args.out {
        Some(path) => {
            std::fs::write(path, &markdown)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
        None => println!("\n{}", markdown),
    }
    Ok(())
}

/// Ask for the README style, or take the default when nobody is at the terminal.
fn prompt_style() -> Result<ReadmeStyle> {
    if !console::user_attended() {
        println!("No terminal attached; using the {} style.", ReadmeStyle::Modern);
        return Ok(ReadmeStyle::Modern);
    }

    use dialoguer::{Select, theme::ColorfulTheme};
    let options: Vec<String> = ReadmeStyle::ALL
        .iter()
        .map(|s| format!("{:<9} {}", s.as_str(), console::style(s.description()).dim()))
        .collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Pick a README style")
        .items(&options)
        .default(0)
        .interact()
        .context("Style prompt failed")?;

    Ok(ReadmeStyle::ALL[selection])
}
