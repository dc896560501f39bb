use serde_json::Value;

use super::{parse_timestamp, require_str, str_at, MalformedPayload};
use crate::{
    parse_project_slug, ChangeType, CommitData, FileChange, RepoData, Service, WebhookPayload,
};

/// Normalizes a GitHub push webhook body.
pub fn parse_github(raw: &Value) -> Result<WebhookPayload, MalformedPayload> {
    let repo = raw
        .get("repository")
        .ok_or(MalformedPayload::MissingField("repository"))?;
    let url = require_str(repo, "url", "repository.url")?.to_string();
    let name = require_str(repo, "name", "repository.name")?.to_string();

    let repository = RepoData {
        service: Service::Github,
        slug: parse_project_slug(&url),
        name,
        description: str_at(repo, "description").map(str::to_string),
        repo_id: repo.get("id").and_then(Value::as_i64),
        owner: repo
            .get("owner")
            .and_then(|owner| str_at(owner, "name").or_else(|| str_at(owner, "login")))
            .map(str::to_string),
        forks: repo.get("forks").and_then(Value::as_i64),
        watchers: repo.get("watchers").and_then(Value::as_i64),
        url,
    };

    let mut commits = Vec::new();
    for commit in raw
        .get("commits")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        commits.push(parse_commit(commit)?);
    }

    Ok(WebhookPayload {
        repository,
        commits,
        forced: false,
    })
}

fn parse_commit(commit: &Value) -> Result<CommitData, MalformedPayload> {
    let author = commit.get("author");
    let files = collect_files(commit);
    let languages = CommitData::collect_languages(&files);

    Ok(CommitData {
        hash: require_str(commit, "id", "commits[].id")?.to_string(),
        message: require_str(commit, "message", "commits[].message")?.to_string(),
        timestamp: parse_timestamp(require_str(commit, "timestamp", "commits[].timestamp")?)?,
        url: str_at(commit, "url").unwrap_or_default().to_string(),
        author_name: author
            .and_then(|a| str_at(a, "name"))
            .unwrap_or_default()
            .to_string(),
        author_email: author
            .and_then(|a| str_at(a, "email"))
            .unwrap_or_default()
            .to_string(),
        author_username: author
            .and_then(|a| str_at(a, "username"))
            .map(str::to_string),
        files,
        languages,
    })
}

/// GitHub and GitLab both report changed paths as three flat arrays.
pub(super) fn collect_files(commit: &Value) -> Vec<FileChange> {
    let mut files = Vec::new();
    for (key, change_type) in [
        ("added", ChangeType::Added),
        ("modified", ChangeType::Modified),
        ("removed", ChangeType::Removed),
    ] {
        for path in commit
            .get(key)
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
        {
            files.push(FileChange::new(path, change_type));
        }
    }
    files
}
