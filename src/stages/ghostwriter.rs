//! Writing stage: turns the gathered data and analysis into the profile README.
//!
//! With a [`TextModel`] configured the README is drafted by the model from a
//! prompt built here, then normalized by [`post_process`]. Without one it is
//! rendered from built-in templates by [`render`].

use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;
use std::sync::Arc;

use grwm_common::{Document, STYLE_PREFERENCE, StageName};

use super::badges;
use super::cto::Analysis;
use super::detective::GatheredData;
use super::llm::TextModel;
use super::{ProgressSink, Stage};
use crate::errors::StageError;

pub const TONE_PREFERENCE: &str = "tone";
pub const DESCRIPTION_PREFERENCE: &str = "description";

const STATS_BASE: &str = "https://github-readme-stats.vercel.app/api";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tone {
    #[default]
    Professional,
    GenZ,
    Minimalist,
    Creative,
}

impl Tone {
    pub const ALL: [Tone; 4] = [Self::Professional, Self::GenZ, Self::Minimalist, Self::Creative];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Professional => "professional",
            Self::GenZ => "genz",
            Self::Minimalist => "minimalist",
            Self::Creative => "creative",
        }
    }

    /// Unknown or missing values fall back to the default tone.
    pub fn from_preference(value: Option<&str>) -> Self {
        value.and_then(|v| v.parse().ok()).unwrap_or_default()
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "professional" => Ok(Self::Professional),
            "genz" | "gen-z" | "gen z" => Ok(Self::GenZ),
            "minimalist" => Ok(Self::Minimalist),
            "creative" => Ok(Self::Creative),
            other => Err(format!("Invalid tone: {}", other)),
        }
    }
}

/// README layout; this is the choice confirmed at the suspend point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadmeStyle {
    #[default]
    Modern,
    Minimal,
    Detailed,
    Creative,
}

impl ReadmeStyle {
    pub const ALL: [ReadmeStyle; 4] = [Self::Modern, Self::Minimal, Self::Detailed, Self::Creative];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Modern => "modern",
            Self::Minimal => "minimal",
            Self::Detailed => "detailed",
            Self::Creative => "creative",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Modern => "Balanced sections with badges and stat cards",
            Self::Minimal => "One-line intro, a few projects, nothing else",
            Self::Detailed => "Everything: language table, activity, all key projects",
            Self::Creative => "Storytelling headings and extra personality",
        }
    }

    pub fn from_preference(value: Option<&str>) -> Self {
        value.and_then(|v| v.parse().ok()).unwrap_or_default()
    }
}

impl fmt::Display for ReadmeStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadmeStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "modern" => Ok(Self::Modern),
            "minimal" => Ok(Self::Minimal),
            "detailed" => Ok(Self::Detailed),
            "creative" => Ok(Self::Creative),
            other => Err(format!("Invalid style: {}", other)),
        }
    }
}

/// Apply tone/style keywords found in revision instructions to `preferences`.
///
/// Returns true when a preference changed. Matching is per word, so
/// "minimalist" selects the tone and "minimal" the style.
pub fn apply_revision_keywords(preferences: &mut BTreeMap<String, String>, instructions: &str) -> bool {
    let words: Vec<String> = instructions
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();

    let mut changed = false;
    let mut set = |key: &str, value: &str| {
        if preferences.get(key).map(String::as_str) != Some(value) {
            preferences.insert(key.to_string(), value.to_string());
            changed = true;
        }
    };
    for word in &words {
        if let Ok(tone) = word.parse::<Tone>() {
            set(TONE_PREFERENCE, tone.as_str());
        }
        if let Ok(style) = word.parse::<ReadmeStyle>() {
            set(STYLE_PREFERENCE, style.as_str());
        }
    }
    changed
}

pub fn word_count(markdown: &str) -> usize {
    markdown.split_whitespace().count()
}

/// Inputs to [`render`], decoded once from the document.
pub struct ReadmeInput<'a> {
    pub data: &'a GatheredData,
    pub analysis: &'a Analysis,
    pub tone: Tone,
    pub style: ReadmeStyle,
    pub description: Option<&'a str>,
    pub revision: Option<&'a str>,
}

pub fn render(input: &ReadmeInput<'_>) -> String {
    let mut md = String::new();
    let login = input.data.profile.login.as_str();
    let display_name = input
        .data
        .profile
        .name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or(login);

    write_header(&mut md, input, display_name);
    if let Some(description) = input.description.filter(|d| !d.trim().is_empty()) {
        let _ = writeln!(md, "{}\n", description.trim());
    }
    write_tech_stack(&mut md, input);
    write_projects(&mut md, input);
    if input.style == ReadmeStyle::Detailed {
        write_languages_table(&mut md, input.analysis);
        write_activity(&mut md, input.analysis);
    }
    write_stats(&mut md, input, login);
    write_footer(&mut md, input.tone, login);

    if let Some(revision) = input.revision {
        // `--` would terminate the comment early.
        let _ = writeln!(md, "\n<!-- revision: {} -->", revision.trim().replace("--", "- -"));
    }
    md.trim_end().to_string() + "\n"
}

fn heading(style: ReadmeStyle, plain: &str, creative: &str) -> String {
    if style == ReadmeStyle::Creative {
        format!("## {}", creative)
    } else {
        format!("## {}", plain)
    }
}

fn write_header(md: &mut String, input: &ReadmeInput<'_>, name: &str) {
    let archetype = &input.analysis.developer_archetype.full_title;
    let title = match input.tone {
        Tone::Professional => format!("# Hi, I'm {}", name),
        Tone::GenZ => format!("# yo, i'm {} 👋", name),
        Tone::Minimalist => format!("# {}", name),
        Tone::Creative => format!("# ✨ Welcome to {}'s corner of the internet", name),
    };
    let _ = writeln!(md, "{}\n", title);

    let tagline = match input.tone {
        Tone::Professional => format!("**{}**", archetype),
        Tone::GenZ => format!("{} fr, no cap", archetype.to_lowercase()),
        Tone::Minimalist => archetype.clone(),
        Tone::Creative => format!("_{}, writing code that tells a story_", archetype),
    };
    let _ = writeln!(md, "{}\n", tagline);

    if input.style != ReadmeStyle::Minimal
        && let Some(bio) = input.data.profile.bio.as_deref().filter(|b| !b.trim().is_empty())
    {
        let _ = writeln!(md, "> {}\n", bio.trim());
    }
}

fn write_tech_stack(md: &mut String, input: &ReadmeInput<'_>) {
    let languages = input
        .analysis
        .language_dominance
        .top_languages
        .iter()
        .map(|l| l.name.as_str());

    let badges = if input.style == ReadmeStyle::Minimal {
        let mut b = badges::tech_stack_badges(languages, std::iter::empty());
        b.truncate(1);
        b
    } else {
        let topics = input
            .data
            .repositories
            .iter()
            .flat_map(|r| r.topics.iter().map(String::as_str));
        badges::tech_stack_badges(languages, topics)
    };
    if badges.is_empty() {
        return;
    }
    let _ = writeln!(md, "{}\n", heading(input.style, "🛠️ Tech Stack", "🧰 The Toolbox"));
    let _ = writeln!(md, "{}\n", badges.join(" "));
}

fn write_projects(md: &mut String, input: &ReadmeInput<'_>) {
    let limit = if input.style == ReadmeStyle::Minimal { 2 } else { 3 };
    let projects: Vec<_> = input.analysis.key_projects.iter().take(limit).collect();
    if projects.is_empty() {
        return;
    }
    let _ = writeln!(md, "{}\n", heading(input.style, "🚀 Featured Projects", "📖 Chapters So Far"));
    for project in projects {
        let description = project.description.as_deref().unwrap_or("No description yet");
        match input.style {
            ReadmeStyle::Detailed => {
                let _ = writeln!(md, "### [{}]({})\n", project.name, project.url);
                let _ = writeln!(md, "{}\n", description);
                let _ = writeln!(
                    md,
                    "- ⭐ {} stars · 🍴 {} forks · {}\n",
                    project.stars,
                    project.forks,
                    project.primary_language.as_deref().unwrap_or("n/a")
                );
            }
            _ => {
                let _ = writeln!(
                    md,
                    "- **[{}]({})**: {} (⭐ {})",
                    project.name, project.url, description, project.stars
                );
            }
        }
    }
    md.push('\n');
}

fn write_languages_table(md: &mut String, analysis: &Analysis) {
    let langs = &analysis.language_dominance.top_languages;
    if langs.is_empty() {
        return;
    }
    let _ = writeln!(md, "## 🧮 Languages\n");
    let _ = writeln!(md, "| Language | Repositories | Share |");
    let _ = writeln!(md, "|---|---|---|");
    for lang in langs {
        let _ = writeln!(md, "| {} | {} | {:.1}% |", lang.name, lang.repos, lang.percentage);
    }
    md.push('\n');
}

fn write_activity(md: &mut String, analysis: &Analysis) {
    let grind = &analysis.grind_score;
    let impact = &analysis.impact_metrics;
    let _ = writeln!(md, "## 📈 Activity\n");
    let _ = writeln!(md, "- {} **{}** (score {:.0})", grind.emoji, grind.label, grind.score);
    let _ = writeln!(md, "- {} repositories pushed in the last 90 days", grind.active_repos);
    let _ = writeln!(
        md,
        "- {} stars and {} forks across public work\n",
        impact.total_stars, impact.total_forks
    );
}

fn write_stats(md: &mut String, input: &ReadmeInput<'_>, login: &str) {
    let _ = writeln!(md, "{}\n", heading(input.style, "📊 GitHub Stats", "📊 By The Numbers"));
    let _ = writeln!(
        md,
        "![{login}'s GitHub Stats]({STATS_BASE}?username={login}&show_icons=true&theme=radical)\n"
    );
    if input.style != ReadmeStyle::Minimal {
        let _ = writeln!(
            md,
            "![Top Languages]({STATS_BASE}/top-langs/?username={login}&layout=compact&theme=radical)\n"
        );
    }
}

fn write_footer(md: &mut String, tone: Tone, login: &str) {
    let line = match tone {
        Tone::Professional => format!("📫 Reach me via [GitHub](https://github.com/{}).", login),
        Tone::GenZ => "ngl, thanks for stopping by ✌️".to_string(),
        Tone::Minimalist => format!("[github.com/{}](https://github.com/{})", login, login),
        Tone::Creative => "🌌 Thanks for reading this far. The next chapter is being written.".to_string(),
    };
    let _ = writeln!(md, "---\n\n{}", line);
}

/// System and user prompts for one drafting request.
pub struct WriterPrompt {
    pub system: String,
    pub user: String,
}

impl WriterPrompt {
    pub fn build(input: &ReadmeInput<'_>) -> Self {
        let login = input.data.profile.login.as_str();
        let analysis = input.analysis;
        let primary = analysis
            .language_dominance
            .primary_language
            .as_ref()
            .map_or("none", |l| l.name.as_str());

        let mut system = String::new();
        let _ = writeln!(
            system,
            "You are an expert README writer creating a GitHub profile README for {}.\n",
            login
        );
        let _ = writeln!(system, "{}\n", tone_instructions(input.tone));
        let _ = writeln!(system, "{}\n", style_instructions(input.style));
        let _ = writeln!(system, "RULES:");
        let _ = writeln!(system, "1. Use only the data provided. No placeholders, no invented projects or numbers.");
        let _ = writeln!(system, "2. Include shields.io badges for the top languages and tools.");
        let _ = writeln!(system, "3. Include a github-readme-stats card for username {}.", login);
        let _ = writeln!(
            system,
            "4. Feature the top {} projects with their descriptions and links.",
            analysis.key_projects.len().min(5)
        );
        let _ = writeln!(
            system,
            "5. Mention social proof: {} stars, {} followers.",
            analysis.impact_metrics.total_stars, analysis.impact_metrics.followers
        );
        let _ = writeln!(system, "6. Answer with the markdown document only.\n");
        let _ = writeln!(system, "STRUCTURE:");
        let _ = writeln!(
            system,
            "- Header with name and a tagline based on the archetype: {}",
            analysis.developer_archetype.full_title
        );
        let _ = writeln!(system, "- About (bio, activity level: {})", analysis.grind_score.label);
        let _ = writeln!(
            system,
            "- Tech stack (primary: {}, diversity: {})",
            primary, analysis.tech_diversity.classification
        );
        let _ = writeln!(system, "- Featured projects");
        let _ = writeln!(system, "- GitHub stats");
        let _ = writeln!(system, "- Connect, when public links exist");

        if let Some(description) = input.description.filter(|d| !d.trim().is_empty()) {
            let _ = write!(
                system,
                "\nUSER REQUIREMENTS:\nThe user asked for the following to be included or emphasized:\n\"{}\"\n\
                 Work it in naturally with the {} layout. Where it conflicts with the layout, the user's request wins.\n",
                description.trim(),
                input.style
            );
        }
        if let Some(revision) = input.revision.filter(|r| !r.trim().is_empty()) {
            let _ = write!(
                system,
                "\nREVISION REQUEST: {}\nApply this change and keep every other section intact.\n",
                revision.trim()
            );
        }

        Self {
            system,
            user: data_summary(input) + "\nWrite the complete README.md in markdown.",
        }
    }
}

fn tone_instructions(tone: Tone) -> &'static str {
    match tone {
        Tone::Professional => {
            "TONE: Professional and polished.\n\
             - Clear, concise, business-appropriate language\n\
             - Lead with achievements and technical depth\n\
             - Few emojis"
        }
        Tone::GenZ => {
            "TONE: Casual and internet-native.\n\
             - Modern slang (lowkey, ngl, fr, no cap) but still readable\n\
             - Short, punchy sentences with some self-aware humor\n\
             - Emojis where they feel natural"
        }
        Tone::Minimalist => {
            "TONE: Minimalist.\n\
             - Ultra-concise, facts over adjectives\n\
             - Emojis only when they carry meaning\n\
             - Let the work speak for itself"
        }
        Tone::Creative => {
            "TONE: Creative.\n\
             - Storytelling and original metaphors\n\
             - Let the personality show\n\
             - Stay credible underneath the flair"
        }
    }
}

fn style_instructions(style: ReadmeStyle) -> &'static str {
    match style {
        ReadmeStyle::Modern => {
            "LAYOUT: Modern.\n\
             - Balanced sections with badges and stat cards\n\
             - Three featured projects as a short list\n\
             - A top-languages card next to the stats card"
        }
        ReadmeStyle::Minimal => {
            "LAYOUT: Minimal.\n\
             - A one-line intro\n\
             - At most two projects\n\
             - One stats card, no extra sections"
        }
        ReadmeStyle::Detailed => {
            "LAYOUT: Detailed.\n\
             - Every key project with its own subsection\n\
             - A language table with repository counts and shares\n\
             - An activity section with recent activity and impact numbers"
        }
        ReadmeStyle::Creative => {
            "LAYOUT: Creative.\n\
             - Storytelling section headings\n\
             - Visual flair such as ASCII art or centered banners, used sparingly\n\
             - Projects framed as chapters"
        }
    }
}

fn data_summary(input: &ReadmeInput<'_>) -> String {
    let profile = &input.data.profile;
    let analysis = input.analysis;
    let login = profile.login.as_str();

    let mut out = String::new();
    let _ = writeln!(out, "USER DATA:");
    let _ = writeln!(out, "- Username: {}", login);
    let _ = writeln!(out, "- Name: {}", or_default(profile.name.as_deref(), login));
    let _ = writeln!(out, "- Bio: {}", or_default(profile.bio.as_deref(), "No bio available"));
    let _ = writeln!(out, "- Location: {}", or_default(profile.location.as_deref(), "Unknown"));
    let _ = writeln!(out, "- Company: {}", or_default(profile.company.as_deref(), "N/A"));
    let _ = writeln!(out, "- Followers: {}", profile.followers);
    let _ = writeln!(out, "- Public repos: {}", profile.public_repos);
    let _ = writeln!(out, "\nDEVELOPER ARCHETYPE: {}", analysis.developer_archetype.full_title);
    let grind = &analysis.grind_score;
    let _ = writeln!(
        out,
        "GRIND SCORE: {:.0} ({} {}), {} repositories active in the last 90 days",
        grind.score, grind.emoji, grind.label, grind.active_repos
    );
    let impact = &analysis.impact_metrics;
    let _ = writeln!(
        out,
        "SOCIAL PROOF: {} stars, {} forks, {:.1} stars per repository",
        impact.total_stars, impact.total_forks, impact.average_stars
    );
    let _ = writeln!(out, "\nTECH STACK:");
    for lang in &analysis.language_dominance.top_languages {
        let _ = writeln!(out, "- {} ({} repos, {:.1}%)", lang.name, lang.repos, lang.percentage);
    }
    let _ = writeln!(out, "- Diversity: {}", analysis.tech_diversity.classification);

    let _ = writeln!(out, "\nTOP PROJECTS:");
    for (i, project) in analysis.key_projects.iter().take(5).enumerate() {
        let _ = writeln!(
            out,
            "{}. {} ({} stars, {} forks, {})",
            i + 1,
            project.name,
            project.stars,
            project.forks,
            project.primary_language.as_deref().unwrap_or("unknown language")
        );
        let _ = writeln!(
            out,
            "   - {}",
            project.description.as_deref().unwrap_or("No description")
        );
        let _ = writeln!(out, "   - {}", project.url);
    }
    out
}

fn or_default<'a>(value: Option<&'a str>, default: &'a str) -> &'a str {
    value.map(str::trim).filter(|v| !v.is_empty()).unwrap_or(default)
}

/// Normalize a model draft: drop a surrounding code fence, and make sure the
/// stats card and a shields.io badge for the primary language are present.
pub fn post_process(draft: &str, login: &str, primary_language: Option<&str>) -> String {
    let mut md = strip_code_fence(draft.trim()).trim().to_string();

    if !md.contains("github-readme-stats") {
        let _ = write!(
            md,
            "\n\n## 📊 GitHub Stats\n\n\
             ![{login}'s GitHub Stats]({STATS_BASE}?username={login}&show_icons=true&theme=radical)"
        );
    }

    if !md.contains("shields.io")
        && let Some(language) = primary_language
    {
        let badge = badges::badge_markdown(language).unwrap_or_else(|| badges::fallback_badge(language));
        md = {
            let mut lines: Vec<&str> = md.lines().collect();
            let at = lines.len().min(2);
            lines.insert(at, &badge);
            lines.join("\n")
        };
    }

    md.trim().to_string() + "\n"
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // The opening fence may carry a language tag such as `markdown`.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body)
}

/// The writing stage. Drafts with a text model when one is set, else renders
/// the built-in templates.
#[derive(Default)]
pub struct GhostwriterStage {
    model: Option<Arc<dyn TextModel>>,
}

impl GhostwriterStage {
    pub fn new() -> Self {
        Self { model: None }
    }

    pub fn with_model(model: Arc<dyn TextModel>) -> Self {
        Self { model: Some(model) }
    }
}

impl Stage for GhostwriterStage {
    fn name(&self) -> StageName {
        StageName::Ghostwriter
    }

    fn execute(&self, mut document: Document, progress: &ProgressSink) -> Result<Document, StageError> {
        let data = GatheredData::from_document(&document)?;
        let analysis = Analysis::from_document(&document)?;
        let tone = Tone::from_preference(document.preference(TONE_PREFERENCE));
        let style = ReadmeStyle::from_preference(document.preference(STYLE_PREFERENCE));

        if let Some(revision) = &document.revision_request {
            progress.emit(format!("Applying revision: {}", revision));
        }
        progress.emit(format!("Writing in a {} voice with the {} layout...", tone, style));

        let input = ReadmeInput {
            data: &data,
            analysis: &analysis,
            tone,
            style,
            description: document.preference(DESCRIPTION_PREFERENCE),
            revision: document.revision_request.as_deref(),
        };
        let markdown = match &self.model {
            Some(model) => {
                progress.emit(format!("Drafting with {}...", model.name()));
                let prompt = WriterPrompt::build(&input);
                let draft = model.generate(&prompt.system, &prompt.user)?;
                let primary = analysis
                    .language_dominance
                    .primary_language
                    .as_ref()
                    .map(|l| l.name.as_str());
                post_process(&draft, &data.profile.login, primary)
            }
            None => render(&input),
        };
        progress.emit(format!("Drafted {} words", word_count(&markdown)));

        document.output = Some(markdown);
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::cto::analyze;
    use crate::stages::detective::tests::{profile, repo};
    use chrono::Utc;
    use std::sync::Mutex;

    /// Records every request and answers with a fixed draft.
    struct CannedModel {
        reply: Result<String, String>,
        requests: Mutex<Vec<(String, String)>>,
    }

    impl CannedModel {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(message.to_string()),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    impl TextModel for CannedModel {
        fn name(&self) -> &str {
            "canned"
        }

        fn generate(&self, system: &str, prompt: &str) -> Result<String, StageError> {
            self.requests
                .lock()
                .unwrap()
                .push((system.to_string(), prompt.to_string()));
            self.reply.clone().map_err(StageError::Model)
        }
    }

    fn ready_document() -> Document {
        let (data, analysis) = fixture();
        let mut doc = Document::new("octocat", BTreeMap::new());
        doc.gathered_data = Some(serde_json::to_value(data).unwrap());
        doc.analysis = Some(serde_json::to_value(analysis).unwrap());
        doc
    }

    fn fixture() -> (GatheredData, Analysis) {
        let mut tagged = repo("cli", 40, 4, Some("Rust"));
        tagged.topics = vec!["docker".to_string(), "todo-app".to_string()];
        let data = GatheredData::collect(
            profile(),
            &[tagged, repo("web", 10, 1, Some("TypeScript")), repo("notes", 2, 0, None)],
            15,
        );
        let analysis = analyze(&data, Utc::now());
        (data, analysis)
    }

    fn render_with(tone: Tone, style: ReadmeStyle, revision: Option<&str>) -> String {
        let (data, analysis) = fixture();
        render(&ReadmeInput {
            data: &data,
            analysis: &analysis,
            tone,
            style,
            description: Some("I build developer tools."),
            revision,
        })
    }

    #[test]
    fn test_tone_and_style_parse_with_defaults() {
        assert_eq!("GenZ".parse::<Tone>().unwrap(), Tone::GenZ);
        assert_eq!(Tone::from_preference(Some("pirate")), Tone::Professional);
        assert_eq!(ReadmeStyle::from_preference(None), ReadmeStyle::Modern);
        assert!("fancy".parse::<ReadmeStyle>().is_err());
    }

    #[test]
    fn test_revision_keywords_switch_tone_and_style() {
        let mut prefs = BTreeMap::new();
        prefs.insert(TONE_PREFERENCE.to_string(), "professional".to_string());
        assert!(apply_revision_keywords(&mut prefs, "Make it minimalist, and use the detailed layout"));
        assert_eq!(prefs.get(TONE_PREFERENCE).unwrap(), "minimalist");
        assert_eq!(prefs.get(STYLE_PREFERENCE).unwrap(), "detailed");
        assert!(!apply_revision_keywords(&mut prefs, "shorter please"));
    }

    #[test]
    fn test_render_always_includes_stats_card() {
        for style in ReadmeStyle::ALL {
            let md = render_with(Tone::Professional, style, None);
            assert!(md.contains("github-readme-stats"), "style {} lost the stats card", style);
            assert!(md.contains("I build developer tools."));
        }
    }

    #[test]
    fn test_render_modern_includes_badges_and_projects() {
        let md = render_with(Tone::Professional, ReadmeStyle::Modern, None);
        assert!(md.starts_with("# Hi, I'm The Octocat"));
        assert!(md.contains("![Rust]"));
        assert!(md.contains("![Docker]"));
        assert!(!md.contains("todo"));
        assert!(md.contains("[cli](https://github.com/octocat/cli)"));
    }

    #[test]
    fn test_render_minimal_is_shorter_than_detailed() {
        let minimal = render_with(Tone::Minimalist, ReadmeStyle::Minimal, None);
        let detailed = render_with(Tone::Minimalist, ReadmeStyle::Detailed, None);
        assert!(word_count(&minimal) < word_count(&detailed));
        assert!(detailed.contains("| Language | Repositories | Share |"));
        assert!(!minimal.contains("top-langs"));
    }

    #[test]
    fn test_render_records_revision_note() {
        let md = render_with(Tone::GenZ, ReadmeStyle::Creative, Some("more emoji -- please"));
        assert!(md.contains("<!-- revision: more emoji - - please -->"));
        assert!(md.contains("📖 Chapters So Far"));
    }

    #[test]
    fn test_execute_writes_output() {
        let (data, analysis) = fixture();
        let mut doc = Document::new("octocat", BTreeMap::new());
        doc.gathered_data = Some(serde_json::to_value(data).unwrap());
        doc.analysis = Some(serde_json::to_value(analysis).unwrap());
        doc.confirm_choice("minimal");

        let doc = GhostwriterStage::new().execute(doc, &ProgressSink::discard()).unwrap();
        let output = doc.output.unwrap();
        assert!(output.contains("# Hi, I'm The Octocat"));
        assert!(!output.contains("top-langs"));
    }

    #[test]
    fn test_prompt_carries_tone_layout_requirements_and_revision() {
        let (data, analysis) = fixture();
        let prompt = WriterPrompt::build(&ReadmeInput {
            data: &data,
            analysis: &analysis,
            tone: Tone::GenZ,
            style: ReadmeStyle::Detailed,
            description: Some("Mention my conference talks"),
            revision: Some("make the intro shorter"),
        });
        assert!(prompt.system.contains("TONE: Casual and internet-native."));
        assert!(prompt.system.contains("LAYOUT: Detailed."));
        assert!(prompt.system.contains("\"Mention my conference talks\""));
        assert!(prompt.system.contains("REVISION REQUEST: make the intro shorter"));
        assert!(prompt.system.contains("github-readme-stats card for username octocat"));
        assert!(prompt.user.contains("- Name: The Octocat"));
        assert!(prompt.user.contains("- Location: Unknown"));
        assert!(prompt.user.contains("1. cli (40 stars, 4 forks, Rust)"));
        assert!(prompt.user.contains("https://github.com/octocat/cli"));
    }

    #[test]
    fn test_prompt_omits_empty_requirements() {
        let (data, analysis) = fixture();
        let prompt = WriterPrompt::build(&ReadmeInput {
            data: &data,
            analysis: &analysis,
            tone: Tone::Professional,
            style: ReadmeStyle::Modern,
            description: Some("   "),
            revision: None,
        });
        assert!(!prompt.system.contains("USER REQUIREMENTS"));
        assert!(!prompt.system.contains("REVISION REQUEST"));
    }

    #[test]
    fn test_post_process_strips_fence_and_adds_missing_sections() {
        let md = post_process("```markdown\n# Hi\nI write Rust.\nMore text\n```\n", "octocat", Some("Rust"));
        let lines: Vec<&str> = md.lines().collect();
        assert_eq!(lines[0], "# Hi");
        assert_eq!(lines[1], "I write Rust.");
        assert!(lines[2].contains("img.shields.io"));
        assert!(md.contains("github-readme-stats.vercel.app/api?username=octocat"));
        assert!(!md.contains("```"));
        assert!(md.ends_with('\n'));
    }

    #[test]
    fn test_post_process_keeps_complete_draft() {
        let draft = "# Hi\n\n![Rust](https://img.shields.io/badge/Rust-orange)\n\n![Stats](https://github-readme-stats.vercel.app/api?username=octocat)";
        assert_eq!(post_process(draft, "octocat", Some("Rust")), format!("{}\n", draft));
    }

    #[test]
    fn test_post_process_without_language_adds_no_badge() {
        let md = post_process("# Hi", "octocat", None);
        assert!(!md.contains("shields.io"));
        assert!(md.starts_with("# Hi\n"));
    }

    #[test]
    fn test_execute_with_model_uses_its_draft() {
        let model = CannedModel::replying("```\n# Hello from the model\n\nBody\n```");
        let mut doc = ready_document();
        doc.confirm_choice("creative");

        let stage = GhostwriterStage::with_model(model.clone());
        let doc = stage.execute(doc, &ProgressSink::discard()).unwrap();
        let output = doc.output.unwrap();
        assert!(output.starts_with("# Hello from the model\n"));
        assert!(output.contains("github-readme-stats"));

        let requests = model.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].0.contains("LAYOUT: Creative."));
    }

    #[test]
    fn test_execute_passes_revision_to_model() {
        let model = CannedModel::replying("# Revised");
        let mut doc = ready_document();
        doc.revision_request = Some("add a section about open source".to_string());

        GhostwriterStage::with_model(model.clone())
            .execute(doc, &ProgressSink::discard())
            .unwrap();
        let requests = model.requests.lock().unwrap();
        assert!(requests[0].0.contains("REVISION REQUEST: add a section about open source"));
    }

    #[test]
    fn test_execute_reports_model_failure() {
        let model = CannedModel::failing("Quota exceeded");
        let err = GhostwriterStage::with_model(model)
            .execute(ready_document(), &ProgressSink::discard())
            .unwrap_err();
        assert!(matches!(err, StageError::Model(_)));
        assert_eq!(err.to_string(), "Model error: Quota exceeded");
    }

    #[test]
    fn test_execute_without_analysis_fails() {
        let (data, _) = fixture();
        let mut doc = Document::new("octocat", BTreeMap::new());
        doc.gathered_data = Some(serde_json::to_value(data).unwrap());
        let err = GhostwriterStage::new()
            .execute(doc, &ProgressSink::discard())
            .unwrap_err();
        assert!(matches!(err, StageError::InvalidInput(_)));
    }
}
