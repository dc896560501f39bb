use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use super::{parse_timestamp, require_str, str_at, MalformedPayload};
use crate::{
    parse_project_slug, ChangeType, CommitData, FileChange, RepoData, Service, WebhookPayload,
};

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<([^<>]+)>").unwrap())
}

/// Normalizes a Bitbucket POST-service webhook body.
pub fn parse_bitbucket(raw: &Value) -> Result<WebhookPayload, MalformedPayload> {
    let repo = raw
        .get("repository")
        .ok_or(MalformedPayload::MissingField("repository"))?;
    let absolute_url = require_str(repo, "absolute_url", "repository.absolute_url")?;
    let name = require_str(repo, "name", "repository.name")?.to_string();

    // absolute_url is usually a path to resolve against canon_url, but absolute
    // forms show up too.
    let url = if absolute_url.starts_with("http://") || absolute_url.starts_with("https://") {
        absolute_url.trim_end_matches('/').to_string()
    } else {
        let canon = str_at(raw, "canon_url").unwrap_or("https://bitbucket.org");
        format!(
            "{}/{}",
            canon.trim_end_matches('/'),
            absolute_url.trim_matches('/')
        )
    };

    let repository = RepoData {
        service: Service::Bitbucket,
        slug: parse_project_slug(&url),
        name,
        description: str_at(repo, "website")
            .filter(|website| !website.is_empty())
            .map(str::to_string),
        repo_id: None,
        owner: str_at(repo, "owner").map(str::to_string),
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
        commits.push(parse_commit(commit, &repository.url)?);
    }

    Ok(WebhookPayload {
        repository,
        commits,
        forced: false,
    })
}

fn parse_commit(commit: &Value, repo_url: &str) -> Result<CommitData, MalformedPayload> {
    let node = require_str(commit, "node", "commits[].node")?;
    let hash = str_at(commit, "raw_node").unwrap_or(node).to_string();
    let timestamp_raw = str_at(commit, "utctimestamp")
        .or_else(|| str_at(commit, "timestamp"))
        .ok_or(MalformedPayload::MissingField("commits[].timestamp"))?;

    let raw_author = str_at(commit, "raw_author").unwrap_or_default();
    let (author_name, author_email) = split_raw_author(raw_author);

    let files = collect_files(commit);
    let languages = CommitData::collect_languages(&files);

    Ok(CommitData {
        hash,
        message: require_str(commit, "message", "commits[].message")?.to_string(),
        timestamp: parse_timestamp(timestamp_raw)?,
        url: format!("{}/commits/{}", repo_url, node),
        author_name,
        author_email,
        author_username: str_at(commit, "author").map(str::to_string),
        files,
        languages,
    })
}

/// Bitbucket ships authors as a single `"Name <email>"` string.
fn split_raw_author(raw_author: &str) -> (String, String) {
    let email = email_regex()
        .captures(raw_author)
        .map(|captures| captures[1].trim().to_string())
        .unwrap_or_default();
    let name = raw_author
        .split('<')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();
    (name, email)
}

fn collect_files(commit: &Value) -> Vec<FileChange> {
    commit
        .get("files")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|entry| {
            let file = str_at(entry, "file")?;
            let change_type = str_at(entry, "type")
                .and_then(|kind| ChangeType::from_str(kind).ok())
                .unwrap_or(ChangeType::Modified);
            Some(FileChange::new(file, change_type))
        })
        .collect()
}
