use serde_json::Value;
use sqlx::types::Json;
use tracing::{instrument, warn};
use uuid::Uuid;

use shared::{provider, CommitData, Service};

use crate::db::types::{Commit, User};
use crate::identity;
use crate::scoring;
use crate::store::{Store, StoreTx};
use crate::types::IngestError;

/// The result of one webhook delivery: which commits were new. Re-delivery of
/// an already-seen payload reports an empty `created` list.
#[derive(Debug)]
pub struct IngestOutcome {
    pub service: Service,
    pub slug: String,
    pub created: Vec<String>,
}

/// Runs the full ingestion pipeline for one webhook body.
///
/// Normalize, upsert the project, then one transaction per commit: dedup
/// insert (a duplicate hash short-circuits before any scoring), identity
/// lookup, and scoring. A failure in one commit's transaction leaves the
/// others untouched; the whole delivery is safe to retry.
#[instrument(skip(store, raw), fields(service = %service))]
pub async fn process_webhook<S: Store>(
    store: &S,
    service: Service,
    raw: &Value,
) -> Result<IngestOutcome, IngestError> {
    let payload = provider::parse(service, raw)?;
    if payload.forced {
        warn!(slug = %payload.repository.slug, "forced push, history rewritten upstream");
    }

    let mut tx = store.begin().await?;
    let project = tx.upsert_project(&payload.repository).await?;
    tx.commit().await?;

    let mut created = Vec::new();
    for data in &payload.commits {
        let mut tx = store.begin().await?;
        let user = resolve_author(&mut tx, service, data).await?;

        let commit = Commit {
            id: Uuid::new_v4(),
            hash: data.hash.clone(),
            project_id: project.id,
            user_id: user.map(|user| user.id),
            game_id: None,
            author_name: data.author_name.clone(),
            author_email: data.author_email.clone(),
            author_username: data.author_username.clone(),
            message: data.message.clone(),
            committed_at: data.timestamp,
            url: data.url.clone(),
            languages: data.languages.clone(),
            files: Json(data.files.clone()),
        };

        if !tx.insert_commit(&commit).await? {
            // Duplicate delivery; nothing to score.
            continue;
        }
        scoring::add_commit(&mut tx, &commit, false).await?;
        tx.commit().await?;
        created.push(commit.hash);
    }

    Ok(IngestOutcome {
        service,
        slug: project.slug,
        created,
    })
}

/// Attributes a commit author to a registered user: verified email first,
/// then the provider username identifier. No match leaves the commit an
/// orphan to be claimed later.
async fn resolve_author<T: StoreTx>(
    tx: &mut T,
    service: Service,
    data: &CommitData,
) -> anyhow::Result<Option<User>> {
    if !data.author_email.is_empty() {
        if let Some(user) = identity::find_by_email(tx, &data.author_email).await? {
            return Ok(Some(user));
        }
    }
    if let Some(username) = &data.author_username {
        if let Some(user) =
            identity::find_by_identifier(tx, &service.to_string(), username).await?
        {
            return Ok(Some(user));
        }
    }
    Ok(None)
}
