use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Source-control provider a webhook originated from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Github,
    Gitlab,
    Bitbucket,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Removed,
}

/// One file touched by a commit, with the language detected from its path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub file: String,
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub language: Option<String>,
}

impl FileChange {
    pub fn new(file: impl Into<String>, change_type: ChangeType) -> Self {
        let file = file.into();
        let language = crate::detect_language(&file).map(str::to_string);
        Self {
            file,
            change_type,
            language,
        }
    }
}

/// Canonical form of a pushed commit, provider differences already resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitData {
    pub hash: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub url: String,
    pub author_name: String,
    pub author_email: String,
    pub author_username: Option<String>,
    pub files: Vec<FileChange>,
    /// Deduplicated set of detected languages across `files`, in first-seen order.
    pub languages: Vec<String>,
}

impl CommitData {
    pub fn collect_languages(files: &[FileChange]) -> Vec<String> {
        let mut languages = Vec::new();
        for file in files {
            if let Some(language) = &file.language {
                if !languages.contains(language) {
                    languages.push(language.clone());
                }
            }
        }
        languages
    }
}

/// Repository identity as reported by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoData {
    pub service: Service,
    pub url: String,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    /// Provider-assigned stable id, when the provider has one.
    pub repo_id: Option<i64>,
    pub owner: Option<String>,
    pub forks: Option<i64>,
    pub watchers: Option<i64>,
}

/// The normalized result of one webhook delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub repository: RepoData,
    pub commits: Vec<CommitData>,
    /// GitLab-only: the push rewrote history (neither a new branch nor incremental).
    pub forced: bool,
}

/// Derives the stable fallback identity key for a repository URL.
///
/// Known hosts shorten to a two-letter prefix; everything after the host keeps
/// its path shape with `/` as `-` and `.` as `_`:
/// `https://github.com/julython/julython.org` -> `gh-julython-julython_org`.
pub fn parse_project_slug(url: &str) -> String {
    let without_scheme = match url.find("://") {
        Some(idx) => &url[idx + 3..],
        None => url,
    };
    let without_scheme = without_scheme.trim_matches('/');
    if without_scheme.is_empty() {
        return String::new();
    }

    let (host, path) = match without_scheme.split_once('/') {
        Some((host, path)) => (host, path.trim_matches('/')),
        None => (without_scheme, ""),
    };

    let prefix = match host {
        "github.com" => "gh".to_string(),
        "gitlab.com" => "gl".to_string(),
        "bitbucket.org" => "bb".to_string(),
        other => other.replace('.', "-"),
    };

    if path.is_empty() {
        return prefix;
    }

    format!("{}-{}", prefix, path.replace('/', "-").replace('.', "_"))
}
