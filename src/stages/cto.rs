//! Analyzing stage: deterministic scoring over the gathered data.
//!
//! No network access. Every score is a pure function of [`GatheredData`]
//! and the evaluation time, so the same input always yields the same analysis.

use chrono::{DateTime, Duration, Utc};
use grwm_common::{Document, StageName};
use serde::{Deserialize, Serialize};

use super::detective::{GatheredData, RepoSummary};
use super::{ProgressSink, Stage};
use crate::errors::StageError;

/// Primary-language share at or above which a developer counts as a specialist.
const SPECIALIST_SHARE: f64 = 60.0;
/// Repositories pushed within this window count as recently active.
const ACTIVE_WINDOW_DAYS: i64 = 90;
const KEY_PROJECT_COUNT: usize = 3;
const TOP_LANGUAGE_COUNT: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LanguageShare {
    pub name: String,
    pub repos: u32,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LanguageDominance {
    pub primary_language: Option<LanguageShare>,
    pub top_languages: Vec<LanguageShare>,
    pub is_specialist: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImpactMetrics {
    pub total_stars: u32,
    pub total_forks: u32,
    pub average_stars: f64,
    pub followers: u32,
    pub public_repos: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeyProject {
    pub name: String,
    pub description: Option<String>,
    pub url: String,
    pub stars: u32,
    pub forks: u32,
    pub primary_language: Option<String>,
    pub score: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TechDiversity {
    pub total_languages: u32,
    pub diversity_score: u32,
    pub classification: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GrindScore {
    pub score: f64,
    pub label: String,
    pub emoji: String,
    pub active_repos: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Archetype {
    pub primary: String,
    pub secondary: String,
    pub full_title: String,
}

/// What the CTO hands to the writer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Analysis {
    pub language_dominance: LanguageDominance,
    pub impact_metrics: ImpactMetrics,
    pub key_projects: Vec<KeyProject>,
    pub tech_diversity: TechDiversity,
    pub grind_score: GrindScore,
    pub developer_archetype: Archetype,
    pub summary: String,
}

impl Analysis {
    pub fn from_document(document: &Document) -> Result<Self, StageError> {
        let value = document
            .analysis
            .clone()
            .ok_or_else(|| StageError::InvalidInput("analysis is missing".to_string()))?;
        serde_json::from_value(value).map_err(|source| StageError::Decode {
            what: "analysis",
            source,
        })
    }
}

pub fn analyze(data: &GatheredData, now: DateTime<Utc>) -> Analysis {
    let language_dominance = language_dominance(data);
    let impact_metrics = impact_metrics(data);
    let key_projects = key_projects(&data.repositories);
    let tech_diversity = tech_diversity(data);
    let grind_score = grind_score(&data.repositories, now);
    let developer_archetype = archetype(&language_dominance, &tech_diversity);
    let summary = format!(
        "{} with {} stars across {} repositories",
        developer_archetype.full_title, impact_metrics.total_stars, data.owned_repo_count
    );

    Analysis {
        language_dominance,
        impact_metrics,
        key_projects,
        tech_diversity,
        grind_score,
        developer_archetype,
        summary,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn language_dominance(data: &GatheredData) -> LanguageDominance {
    let total: u32 = data.languages.values().sum();
    let mut shares: Vec<LanguageShare> = data
        .languages
        .iter()
        .map(|(name, repos)| LanguageShare {
            name: name.clone(),
            repos: *repos,
            percentage: if total == 0 {
                0.0
            } else {
                round2(*repos as f64 * 100.0 / total as f64)
            },
        })
        .collect();
    // BTreeMap iteration is alphabetical, so ties stay deterministic.
    shares.sort_by(|a, b| b.repos.cmp(&a.repos));

    let primary_language = shares.first().cloned();
    let is_specialist = primary_language
        .as_ref()
        .is_some_and(|p| p.percentage >= SPECIALIST_SHARE);
    shares.truncate(TOP_LANGUAGE_COUNT);

    LanguageDominance {
        primary_language,
        top_languages: shares,
        is_specialist,
    }
}

fn impact_metrics(data: &GatheredData) -> ImpactMetrics {
    let average_stars = if data.owned_repo_count == 0 {
        0.0
    } else {
        round2(data.social_proof.total_stars as f64 / data.owned_repo_count as f64)
    };
    ImpactMetrics {
        total_stars: data.social_proof.total_stars,
        total_forks: data.social_proof.total_forks,
        average_stars,
        followers: data.profile.followers,
        public_repos: data.profile.public_repos,
    }
}

fn key_projects(repos: &[RepoSummary]) -> Vec<KeyProject> {
    let mut scored: Vec<KeyProject> = repos
        .iter()
        .map(|r| KeyProject {
            name: r.name.clone(),
            description: r.description.clone(),
            url: r.url.clone(),
            stars: r.stars,
            forks: r.forks,
            primary_language: r.primary_language.clone(),
            score: r.stars * 2 + r.forks * 3 + if r.description.is_some() { 10 } else { 0 },
        })
        .collect();
    scored.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));
    scored.truncate(KEY_PROJECT_COUNT);
    scored
}

fn tech_diversity(data: &GatheredData) -> TechDiversity {
    let total_languages = data.languages.len() as u32;
    let diversity_score = total_languages * 10;
    let (classification, description) = if diversity_score < 30 {
        ("Specialist", "Focused expertise in specific technologies")
    } else if diversity_score < 60 {
        ("Versatile Developer", "Comfortable across multiple domains")
    } else {
        ("Full Stack Generalist", "Broad expertise across the entire stack")
    };
    TechDiversity {
        total_languages,
        diversity_score,
        classification: classification.to_string(),
        description: description.to_string(),
    }
}

/// Activity score from push recency: share of recently pushed repositories
/// (up to 60 points) plus 4 points per active repository, capped at 10 repos.
fn grind_score(repos: &[RepoSummary], now: DateTime<Utc>) -> GrindScore {
    let cutoff = now - Duration::days(ACTIVE_WINDOW_DAYS);
    let active = repos
        .iter()
        .filter(|r| r.pushed_at.is_some_and(|p| p >= cutoff))
        .count() as u32;
    let ratio = if repos.is_empty() {
        0.0
    } else {
        active as f64 / repos.len() as f64
    };
    let score = round2(ratio * 60.0 + active.min(10) as f64 * 4.0);

    let (label, emoji) = if score < 20.0 {
        ("Casual", "🌱")
    } else if score < 40.0 {
        ("Active", "🔥")
    } else if score < 60.0 {
        ("Consistent", "💪")
    } else {
        ("Grinder", "🚀")
    };
    GrindScore {
        score,
        label: label.to_string(),
        emoji: emoji.to_string(),
        active_repos: active,
    }
}

fn archetype(languages: &LanguageDominance, diversity: &TechDiversity) -> Archetype {
    let primary = match &languages.primary_language {
        Some(lang) if languages.is_specialist => format!("{} Specialist", lang.name),
        Some(_) if diversity.total_languages >= 4 => "Full Stack Developer".to_string(),
        Some(lang) => format!("{} Developer", lang.name),
        None => "Software Engineer".to_string(),
    };
    let secondary = if diversity.diversity_score > 60 {
        "Polyglot"
    } else if diversity.diversity_score >= 40 {
        "Tech Explorer"
    } else {
        "Focused Engineer"
    };
    Archetype {
        full_title: format!("{} | {}", primary, secondary),
        primary,
        secondary: secondary.to_string(),
    }
}

#[derive(Default)]
pub struct CtoStage;

impl CtoStage {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for CtoStage {
    fn name(&self) -> StageName {
        StageName::Cto
    }

    fn execute(&self, mut document: Document, progress: &ProgressSink) -> Result<Document, StageError> {
        let data = GatheredData::from_document(&document)?;

        progress.emit("Crunching language stats...");
        progress.emit("Finding projects worth bragging about...");
        let analysis = analyze(&data, Utc::now());
        progress.emit(format!(
            "Verdict: {} ({} {})",
            analysis.developer_archetype.full_title,
            analysis.grind_score.label,
            analysis.grind_score.emoji
        ));

        document.analysis = Some(serde_json::to_value(&analysis).map_err(|source| {
            StageError::Decode {
                what: "analysis",
                source,
            }
        })?);
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::detective::tests::{profile, repo};
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap()
    }

    fn data() -> GatheredData {
        let mut stale = repo("stale", 3, 0, Some("Go"));
        stale.pushed_at = Some("2020-01-01T00:00:00Z".to_string());
        GatheredData::collect(
            profile(),
            &[
                repo("big", 100, 10, Some("Rust")),
                repo("mid", 20, 2, Some("Rust")),
                repo("tool", 8, 1, Some("Rust")),
                stale,
            ],
            15,
        )
    }

    #[test]
    fn test_language_dominance_marks_specialist() {
        let analysis = analyze(&data(), now());
        let primary = analysis.language_dominance.primary_language.unwrap();
        assert_eq!(primary.name, "Rust");
        assert_eq!(primary.percentage, 75.0);
        assert!(analysis.language_dominance.is_specialist);
        assert_eq!(analysis.developer_archetype.primary, "Rust Specialist");
    }

    #[test]
    fn test_key_projects_ranked_by_score() {
        let analysis = analyze(&data(), now());
        let names: Vec<&str> = analysis.key_projects.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["big", "mid", "tool"]);
        // 100*2 + 10*3 + 10 for a description
        assert_eq!(analysis.key_projects[0].score, 240);
    }

    #[test]
    fn test_grind_score_counts_recent_pushes() {
        let analysis = analyze(&data(), now());
        assert_eq!(analysis.grind_score.active_repos, 3);
        // 3/4 * 60 + 3 * 4
        assert_eq!(analysis.grind_score.score, 57.0);
        assert_eq!(analysis.grind_score.label, "Consistent");
    }

    #[test]
    fn test_tech_diversity_classification() {
        let analysis = analyze(&data(), now());
        assert_eq!(analysis.tech_diversity.total_languages, 2);
        assert_eq!(analysis.tech_diversity.classification, "Specialist");
    }

    #[test]
    fn test_empty_profile_is_a_software_engineer() {
        let empty = GatheredData::collect(profile(), &[], 15);
        let analysis = analyze(&empty, now());
        assert!(analysis.language_dominance.primary_language.is_none());
        assert_eq!(analysis.impact_metrics.average_stars, 0.0);
        assert_eq!(analysis.grind_score.score, 0.0);
        assert_eq!(analysis.developer_archetype.full_title, "Software Engineer | Focused Engineer");
    }

    #[test]
    fn test_analysis_is_deterministic() {
        assert_eq!(analyze(&data(), now()), analyze(&data(), now()));
    }

    #[test]
    fn test_execute_requires_gathered_data() {
        let err = CtoStage::new()
            .execute(Document::new("octocat", BTreeMap::new()), &ProgressSink::discard())
            .unwrap_err();
        assert!(matches!(err, StageError::InvalidInput(_)));
    }

    #[test]
    fn test_execute_writes_analysis() {
        let mut doc = Document::new("octocat", BTreeMap::new());
        doc.gathered_data = Some(serde_json::to_value(data()).unwrap());
        let doc = CtoStage::new().execute(doc, &ProgressSink::discard()).unwrap();
        let analysis = Analysis::from_document(&doc).unwrap();
        assert_eq!(analysis.impact_metrics.total_stars, 131);
    }
}
