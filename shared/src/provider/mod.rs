use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

use crate::{Service, WebhookPayload};

mod bitbucket;
mod github;
mod gitlab;

pub use bitbucket::parse_bitbucket;
pub use github::parse_github;
pub use gitlab::parse_gitlab;

/// A webhook body that is missing one of the keys the pipeline cannot work
/// without. Anything else (absent optional fields, unknown extras) is
/// tolerated and defaulted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedPayload {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("unparseable timestamp `{0}`")]
    BadTimestamp(String),
}

/// Normalizes a provider webhook body into the canonical payload.
///
/// The provider is selected by the inbound route, never sniffed from the body.
pub fn parse(service: Service, raw: &Value) -> Result<WebhookPayload, MalformedPayload> {
    match service {
        Service::Github => parse_github(raw),
        Service::Gitlab => parse_gitlab(raw),
        Service::Bitbucket => parse_bitbucket(raw),
    }
}

fn str_at<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn require_str<'a>(
    value: &'a Value,
    key: &str,
    full_path: &'static str,
) -> Result<&'a str, MalformedPayload> {
    str_at(value, key).ok_or(MalformedPayload::MissingField(full_path))
}

/// Parses the date strings the three providers emit into UTC: RFC 3339
/// (GitHub/GitLab), space-separated with offset (Bitbucket `utctimestamp`),
/// and naive variants of both, taken as already-UTC.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, MalformedPayload> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%#z") {
        return Ok(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(parsed.and_utc());
        }
    }
    Err(MalformedPayload::BadTimestamp(raw.to_string()))
}
