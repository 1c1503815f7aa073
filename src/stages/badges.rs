//! shields.io badge lookup for the tech stack section.

use std::collections::BTreeSet;

/// Badges rendered per README, most relevant first.
pub const MAX_BADGES: usize = 15;

struct Badge {
    key: &'static str,
    label: &'static str,
    color: &'static str,
    logo: &'static str,
    name: &'static str,
}

const fn badge(
    key: &'static str,
    label: &'static str,
    color: &'static str,
    logo: &'static str,
    name: &'static str,
) -> Badge {
    Badge {
        key,
        label,
        color,
        logo,
        name,
    }
}

// Keys are lowercase; lookups normalize `-` and `_` to spaces.
static BADGES: &[Badge] = &[
    // Languages
    badge("python", "python", "3670A0", "python", "Python"),
    badge("javascript", "javascript", "323330", "javascript", "JavaScript"),
    badge("typescript", "typescript", "007ACC", "typescript", "TypeScript"),
    badge("java", "java", "ED8B00", "openjdk", "Java"),
    badge("c", "c", "00599C", "c", "C"),
    badge("c++", "c++", "00599C", "c++", "C++"),
    badge("c#", "c#", "239120", "csharp", "C#"),
    badge("go", "go", "00ADD8", "go", "Go"),
    badge("rust", "rust", "000000", "rust", "Rust"),
    badge("ruby", "ruby", "CC342D", "ruby", "Ruby"),
    badge("php", "php", "777BB4", "php", "PHP"),
    badge("swift", "swift", "F54A2A", "swift", "Swift"),
    badge("kotlin", "kotlin", "7F52FF", "kotlin", "Kotlin"),
    badge("dart", "dart", "0175C2", "dart", "Dart"),
    badge("r", "r", "276DC3", "r", "R"),
    badge("scala", "scala", "DC322F", "scala", "Scala"),
    badge("shell", "shell_script", "121011", "gnu-bash", "Shell Script"),
    badge("lua", "lua", "2C2D72", "lua", "Lua"),
    badge("haskell", "haskell", "5e5086", "haskell", "Haskell"),
    badge("elixir", "elixir", "4B275F", "elixir", "Elixir"),
    badge("zig", "zig", "F7A41D", "zig", "Zig"),
    badge("html", "html5", "E34F26", "html5", "HTML5"),
    badge("css", "css3", "1572B6", "css3", "CSS3"),
    badge("jupyter notebook", "jupyter", "FA0F00", "jupyter", "Jupyter Notebook"),
    // Frontend
    badge("react", "react", "20232a", "react", "React"),
    badge("vue", "vue.js", "35495e", "vuedotjs", "Vue.js"),
    badge("vue.js", "vue.js", "35495e", "vuedotjs", "Vue.js"),
    badge("angular", "angular", "DD0031", "angular", "Angular"),
    badge("svelte", "svelte", "f1413d", "svelte", "Svelte"),
    badge("next.js", "Next", "000000", "next.js", "Next.js"),
    badge("nextjs", "Next", "000000", "next.js", "Next.js"),
    badge("tailwindcss", "tailwindcss", "38B2AC", "tailwind-css", "TailwindCSS"),
    // Backend
    badge("django", "django", "092E20", "django", "Django"),
    badge("flask", "flask", "000000", "flask", "Flask"),
    badge("fastapi", "FastAPI", "005571", "fastapi", "FastAPI"),
    badge("express", "express.js", "404d59", "express", "Express.js"),
    badge("nodejs", "node.js", "6DA55F", "node.js", "Node.js"),
    badge("node", "node.js", "6DA55F", "node.js", "Node.js"),
    badge("spring boot", "spring boot", "6DB33F", "springboot", "Spring Boot"),
    badge("rails", "rails", "CC0000", "ruby-on-rails", "Rails"),
    badge("tokio", "tokio", "000000", "rust", "Tokio"),
    // Data
    badge("postgresql", "postgres", "316192", "postgresql", "PostgreSQL"),
    badge("mysql", "mysql", "4479A1", "mysql", "MySQL"),
    badge("sqlite", "sqlite", "07405e", "sqlite", "SQLite"),
    badge("mongodb", "MongoDB", "4ea94b", "mongodb", "MongoDB"),
    badge("redis", "redis", "DD0031", "redis", "Redis"),
    // Tooling and infra
    badge("docker", "docker", "0db7ed", "docker", "Docker"),
    badge("kubernetes", "kubernetes", "326ce5", "kubernetes", "Kubernetes"),
    badge("terraform", "terraform", "5835CC", "terraform", "Terraform"),
    badge("aws", "AWS", "FF9900", "amazon-aws", "AWS"),
    badge("linux", "linux", "FCC624", "linux", "Linux"),
    badge("graphql", "graphql", "E10098", "graphql", "GraphQL"),
    badge("tensorflow", "tensorflow", "FF6F00", "tensorflow", "TensorFlow"),
    badge("pytorch", "pytorch", "EE4C2C", "pytorch", "PyTorch"),
];

fn normalize(tech: &str) -> String {
    tech.trim().to_lowercase().replace(['-', '_'], " ")
}

fn lookup(tech: &str) -> Option<&'static Badge> {
    let raw = tech.trim().to_lowercase();
    let normalized = normalize(tech);
    BADGES.iter().find(|b| b.key == raw || b.key == normalized)
}

/// Percent-encode the characters shields.io treats specially in a path segment.
fn escape(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for c in segment.chars() {
        match c {
            '-' => out.push_str("--"),
            '_' => out.push_str("__"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '+' => out.push_str("%2B"),
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            '?' => out.push_str("%3F"),
            _ => out.push(c),
        }
    }
    out
}

fn render(label: &str, color: &str, logo: &str, name: &str) -> String {
    format!(
        "![{name}](https://img.shields.io/badge/{label}-%23{color}.svg?style=for-the-badge&logo={logo}&logoColor=white)",
        name = name,
        label = escape(label),
        color = color,
        logo = escape(logo),
    )
}

/// Known technology badge, or `None` when the name is not in the table.
pub fn badge_markdown(tech: &str) -> Option<String> {
    lookup(tech).map(|b| render(b.label, b.color, b.logo, b.name))
}

/// Neutral badge for a language the table does not know.
pub fn fallback_badge(name: &str) -> String {
    let logo = name.trim().to_lowercase();
    render(name.trim(), "555555", &logo, name.trim())
}

/// Badges for languages and topics, deduplicated by display name.
///
/// Languages always get a badge (falling back to a neutral one); topics only
/// when they name a known technology, so project tags like `todo-app` are dropped.
pub fn tech_stack_badges<'a>(
    languages: impl IntoIterator<Item = &'a str>,
    topics: impl IntoIterator<Item = &'a str>,
) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut badges = Vec::new();

    for lang in languages {
        if lang.trim().is_empty() {
            continue;
        }
        let (name, rendered) = match lookup(lang) {
            Some(b) => (b.name.to_string(), render(b.label, b.color, b.logo, b.name)),
            None => (lang.trim().to_string(), fallback_badge(lang)),
        };
        if seen.insert(name) {
            badges.push(rendered);
        }
    }
    for topic in topics {
        if let Some(b) = lookup(topic)
            && seen.insert(b.name.to_string())
        {
            badges.push(render(b.label, b.color, b.logo, b.name));
        }
    }

    badges.truncate(MAX_BADGES);
    badges
}
