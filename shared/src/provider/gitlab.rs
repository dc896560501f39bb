use serde_json::Value;

use super::{github::collect_files, parse_timestamp, require_str, str_at, MalformedPayload};
use crate::{parse_project_slug, CommitData, RepoData, Service, WebhookPayload};

const ZERO_SHA: &str = "0000000000000000000000000000000000000000";

/// Normalizes a GitLab push webhook body.
///
/// Newer payloads carry a `project` object; older ones only `repository`.
/// Either is accepted, preferring `project`.
pub fn parse_gitlab(raw: &Value) -> Result<WebhookPayload, MalformedPayload> {
    let project = raw.get("project");
    let repo = raw.get("repository");
    let source = project
        .or(repo)
        .ok_or(MalformedPayload::MissingField("project"))?;

    let url = project
        .and_then(|p| str_at(p, "web_url"))
        .or_else(|| repo.and_then(|r| str_at(r, "homepage")))
        .or_else(|| repo.and_then(|r| str_at(r, "url")))
        .ok_or(MalformedPayload::MissingField("project.web_url"))?
        .to_string();
    let name = require_str(source, "name", "project.name")?.to_string();

    let repository = RepoData {
        service: Service::Gitlab,
        slug: parse_project_slug(&url),
        name,
        description: str_at(source, "description").map(str::to_string),
        repo_id: project
            .and_then(|p| p.get("id"))
            .or_else(|| raw.get("project_id"))
            .and_then(Value::as_i64),
        owner: project
            .and_then(|p| str_at(p, "namespace"))
            .or_else(|| str_at(raw, "user_name"))
            .map(str::to_string),
        forks: None,
        watchers: None,
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
        forced: is_forced(str_at(raw, "before"), &commits),
        repository,
        commits,
    })
}

/// A zero `before` SHA is a new branch; a `before` matching one of the pushed
/// commits is an ordinary incremental push. Anything else rewrote history.
fn is_forced(before: Option<&str>, commits: &[CommitData]) -> bool {
    match before {
        None => false,
        Some(ZERO_SHA) => false,
        Some(before) => !commits.iter().any(|commit| commit.hash == before),
    }
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
        author_username: None,
        files,
        languages,
    })
}
