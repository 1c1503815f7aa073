//! GitHub REST access for the detective stage.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::config::GitHubConfig;
use crate::errors::StageError;

const USER_AGENT: &str = "grwm-detective";
const REPOS_PER_PAGE: u32 = 100;

/// Public profile fields (subset of `GET /users/{login}`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GitHubProfile {
    pub login: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub blog: Option<String>,
    #[serde(default)]
    pub twitter_username: Option<String>,
    #[serde(default)]
    pub public_repos: u32,
    #[serde(default)]
    pub followers: u32,
    #[serde(default)]
    pub following: u32,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// A repository (subset of `GET /users/{login}/repos`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GitHubRepo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub stargazers_count: u32,
    #[serde(default)]
    pub forks_count: u32,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub pushed_at: Option<String>,
}

/// Where the detective gets its data from.
pub trait GitHubSource: Send + Sync {
    fn profile(&self, login: &str) -> Result<GitHubProfile, StageError>;

    fn repositories(&self, login: &str) -> Result<Vec<GitHubRepo>, StageError>;
}

/// Blocking REST client. A `reqwest::blocking::Client` is built per call so
/// that it is created and dropped on the worker thread, never on the runtime.
pub struct GitHubClient {
    api_url: String,
    token: Option<String>,
    timeout: Duration,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> Self {
        if let Some(token) = &config.token
            && !is_valid_github_token(token)
        {
            tracing::warn!("GitHub token does not have a known prefix; requests may be rejected");
        }
        Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn client(&self) -> Result<Client, StageError> {
        Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(StageError::from)
    }

    fn get<T: serde::de::DeserializeOwned>(
        &self,
        client: &Client,
        path: &str,
        query: &[(&str, String)],
        login: &str,
    ) -> Result<T, StageError> {
        let mut request = client
            .get(format!("{}{}", self.api_url, path))
            .header("Accept", "application/vnd.github+json")
            .query(query);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }
        let response = request.send()?;
        match response.status() {
            StatusCode::NOT_FOUND => {
                return Err(StageError::NotFound(format!("GitHub user @{} not found", login)));
            }
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
                return Err(StageError::Network(
                    "GitHub API rate limit exceeded; configure GITHUB_TOKEN".to_string(),
                ));
            }
            _ => {}
        }
        let response = response.error_for_status()?;
        Ok(response.json::<T>()?)
    }
}

impl GitHubSource for GitHubClient {
    fn profile(&self, login: &str) -> Result<GitHubProfile, StageError> {
        let client = self.client()?;
        self.get(&client, &format!("/users/{}", login), &[], login)
    }

    fn repositories(&self, login: &str) -> Result<Vec<GitHubRepo>, StageError> {
        let client = self.client()?;
        self.get(
            &client,
            &format!("/users/{}/repos", login),
            &[
                ("per_page", REPOS_PER_PAGE.to_string()),
                ("sort", "updated".to_string()),
            ],
            login,
        )
    }
}

/// Known GitHub token prefixes.
/// See: https://github.blog/2021-04-05-behind-githubs-new-authentication-token-formats/
const GITHUB_TOKEN_PREFIXES: &[&str] = &[
    "ghp_",        // Personal access tokens (classic)
    "github_pat_", // Fine-grained personal access tokens
    "gho_",        // OAuth access tokens
    "ghu_",        // GitHub App user-to-server tokens
    "ghs_",        // GitHub App server-to-server tokens
];

/// Format check only; does not verify the token is active.
pub fn is_valid_github_token(token: &str) -> bool {
    GITHUB_TOKEN_PREFIXES
        .iter()
        .any(|prefix| token.starts_with(prefix) && token.len() > prefix.len())
}

/// GitHub logins: 1-39 chars, alphanumeric or single hyphens, no leading/trailing hyphen.
pub fn is_valid_login(login: &str) -> bool {
    !login.is_empty()
        && login.len() <= 39
        && !login.starts_with('-')
        && !login.ends_with('-')
        && !login.contains("--")
        && login.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}
