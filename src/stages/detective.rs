//! Gathering stage: collects the subject's public GitHub footprint.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use grwm_common::{Document, StageName};
use serde::{Deserialize, Serialize};

use super::github::{GitHubProfile, GitHubRepo, GitHubSource, is_valid_login};
use super::{ProgressSink, Stage};
use crate::errors::StageError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepoSummary {
    pub name: String,
    pub description: Option<String>,
    pub url: String,
    pub stars: u32,
    pub forks: u32,
    pub primary_language: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub pushed_at: Option<DateTime<Utc>>,
}

impl From<&GitHubRepo> for RepoSummary {
    fn from(repo: &GitHubRepo) -> Self {
        Self {
            name: repo.name.clone(),
            description: repo.description.clone().filter(|d| !d.trim().is_empty()),
            url: repo.html_url.clone(),
            stars: repo.stargazers_count,
            forks: repo.forks_count,
            primary_language: repo.language.clone(),
            topics: repo.topics.clone(),
            pushed_at: repo
                .pushed_at
                .as_deref()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|d| d.with_timezone(&Utc)),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SocialProof {
    pub total_stars: u32,
    pub total_forks: u32,
}

/// Everything the detective hands to the analysis stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatheredData {
    pub profile: GitHubProfile,
    /// Owned, non-fork repositories, most starred first.
    pub repositories: Vec<RepoSummary>,
    /// Count of owned repositories seen, before truncation.
    pub owned_repo_count: u32,
    pub social_proof: SocialProof,
    /// Primary language -> number of owned repositories using it.
    pub languages: BTreeMap<String, u32>,
}

impl GatheredData {
    pub fn from_document(document: &Document) -> Result<Self, StageError> {
        let value = document
            .gathered_data
            .clone()
            .ok_or_else(|| StageError::InvalidInput("gathered data is missing".to_string()))?;
        serde_json::from_value(value).map_err(|source| StageError::Decode {
            what: "gathered data",
            source,
        })
    }

    /// Build from raw API responses, keeping at most `max_repos` repositories.
    pub fn collect(profile: GitHubProfile, repos: &[GitHubRepo], max_repos: usize) -> Self {
        let owned: Vec<&GitHubRepo> = repos.iter().filter(|r| !r.fork).collect();

        let social_proof = SocialProof {
            total_stars: owned.iter().map(|r| r.stargazers_count).sum(),
            total_forks: owned.iter().map(|r| r.forks_count).sum(),
        };

        let mut languages = BTreeMap::new();
        for repo in &owned {
            if let Some(lang) = &repo.language {
                *languages.entry(lang.clone()).or_insert(0) += 1;
            }
        }

        let mut repositories: Vec<RepoSummary> = owned.iter().map(|r| RepoSummary::from(*r)).collect();
        repositories.sort_by(|a, b| b.stars.cmp(&a.stars).then_with(|| a.name.cmp(&b.name)));
        repositories.truncate(max_repos);

        Self {
            profile,
            repositories,
            owned_repo_count: owned.len() as u32,
            social_proof,
            languages,
        }
    }
}

pub struct DetectiveStage {
    source: Arc<dyn GitHubSource>,
    max_repos: usize,
}

impl DetectiveStage {
    pub fn new(source: Arc<dyn GitHubSource>, max_repos: usize) -> Self {
        Self { source, max_repos }
    }
}

impl Stage for DetectiveStage {
    fn name(&self) -> StageName {
        StageName::Detective
    }

    fn execute(&self, mut document: Document, progress: &ProgressSink) -> Result<Document, StageError> {
        let login = document.subject_id().trim().to_string();
        if !is_valid_login(&login) {
            return Err(StageError::InvalidInput(format!(
                "'{}' is not a valid GitHub username",
                login
            )));
        }

        progress.emit(format!("Investigating @{}'s GitHub profile...", login));
        let profile = self.source.profile(&login)?;

        progress.emit(format!("Scanning public repositories of @{}...", login));
        let repos = self.source.repositories(&login)?;

        let data = GatheredData::collect(profile, &repos, self.max_repos);
        progress.emit(format!(
            "Found {} repositories with {} stars",
            data.owned_repo_count, data.social_proof.total_stars
        ));

        document.gathered_data = Some(serde_json::to_value(&data).map_err(|source| {
            StageError::Decode {
                what: "gathered data",
                source,
            }
        })?);
        Ok(document)
    }
}
