use itertools::Itertools;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::types::{Commit, User};
use crate::scoring;
use crate::store::{Store, StoreTx};
use crate::types::IngestError;

pub const EMAIL: &str = "email";

#[derive(Debug, Clone)]
pub struct OauthEmail {
    pub address: String,
    pub verified: bool,
}

/// What an OAuth callback hands us after the provider round-trip.
#[derive(Debug, Clone)]
pub struct OauthProfile {
    /// Identifier type for the provider, e.g. `github` or `gitlab`.
    pub provider: String,
    pub provider_id: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub emails: Vec<OauthEmail>,
}

#[derive(Debug)]
pub struct LoginOutcome {
    pub user: User,
    pub created: bool,
    /// Verified emails that were not linked to this user before this login;
    /// each one may unlock orphan commits.
    pub linked_emails: Vec<String>,
}

pub async fn find_by_identifier<T: StoreTx>(
    tx: &mut T,
    identifier_type: &str,
    value: &str,
) -> anyhow::Result<Option<User>> {
    tx.find_user_by_identifier(identifier_type, value).await
}

pub async fn find_by_email<T: StoreTx>(tx: &mut T, email: &str) -> anyhow::Result<Option<User>> {
    tx.find_user_by_identifier(EMAIL, email).await
}

/// Resolves an OAuth login to a user, registering one when nothing matches.
///
/// Matching order: the `(provider, provider_id)` identifier, then ownership of
/// any presented *verified* email. Unverified emails never participate. Two
/// distinct existing users claiming the presented emails is an ambiguous merge
/// target and fails closed.
#[instrument(skip(tx, profile), fields(provider = %profile.provider, provider_id = %profile.provider_id))]
pub async fn oauth_login_or_register<T: StoreTx>(
    tx: &mut T,
    profile: &OauthProfile,
) -> Result<LoginOutcome, IngestError> {
    let verified: Vec<&str> = profile
        .emails
        .iter()
        .filter(|email| email.verified)
        .map(|email| email.address.as_str())
        .collect();

    if let Some(user) = tx
        .find_user_by_identifier(&profile.provider, &profile.provider_id)
        .await?
    {
        tx.update_user_profile(user.id, &profile.name, profile.avatar_url.as_deref())
            .await?;
        let linked_emails = link_verified_emails(tx, &user, &verified).await?;
        return Ok(LoginOutcome {
            user,
            created: false,
            linked_emails,
        });
    }

    let mut owners: Vec<User> = Vec::new();
    for email in &verified {
        if let Some(owner) = tx.find_user_by_identifier(EMAIL, email).await? {
            if !owners.iter().any(|existing| existing.id == owner.id) {
                owners.push(owner);
            }
        }
    }

    if owners.len() > 1 {
        let ids = owners.iter().map(|user| user.id).join(", ");
        return Err(IngestError::IdentityConflict(format!(
            "verified emails resolve to multiple users: {ids}"
        )));
    }

    if let Some(user) = owners.into_iter().next() {
        tx.link_identifier(user.id, &profile.provider, &profile.provider_id)
            .await?;
        let linked_emails = link_verified_emails(tx, &user, &verified).await?;
        return Ok(LoginOutcome {
            user,
            created: false,
            linked_emails,
        });
    }

    let user = User {
        id: Uuid::new_v4(),
        name: profile.name.clone(),
        avatar_url: profile.avatar_url.clone(),
        is_active: true,
    };
    tx.insert_user(&user).await?;
    tx.link_identifier(user.id, &profile.provider, &profile.provider_id)
        .await?;
    let linked_emails = link_verified_emails(tx, &user, &verified).await?;
    Ok(LoginOutcome {
        user,
        created: true,
        linked_emails,
    })
}

/// Links each verified email to `user`, returning the newly linked ones. An
/// email already owned by a *different* user is a hard error, never a silent
/// reassignment.
async fn link_verified_emails<T: StoreTx>(
    tx: &mut T,
    user: &User,
    verified: &[&str],
) -> Result<Vec<String>, IngestError> {
    let mut linked = Vec::new();
    for email in verified {
        match tx.find_user_by_identifier(EMAIL, email).await? {
            Some(owner) if owner.id == user.id => {}
            Some(owner) => {
                return Err(IngestError::IdentityConflict(format!(
                    "email already belongs to user {}",
                    owner.id
                )));
            }
            None => {
                tx.link_identifier(user.id, EMAIL, email).await?;
                linked.push(email.to_string());
            }
        }
    }
    Ok(linked)
}

/// Claims orphan commits whose author email is one of `emails`, attributing
/// them to `user_id` and re-scoring the player side.
///
/// Each claim is its own transaction; the `UPDATE ... WHERE user_id IS NULL`
/// guard makes a repeated or racing claim skip the commit entirely, so the
/// claim task is idempotent end to end.
#[instrument(skip(store, emails))]
pub async fn claim_orphans<S: Store>(
    store: &S,
    user_id: Uuid,
    emails: &[String],
) -> anyhow::Result<usize> {
    let mut tx = store.begin().await?;
    let orphans = tx.find_orphan_commits_by_emails(emails).await?;
    tx.commit().await?;

    let mut claimed = 0;
    for commit in orphans {
        if claim_one(store, commit, user_id).await? {
            claimed += 1;
        }
    }
    if claimed > 0 {
        info!(%user_id, claimed, "claimed orphan commits");
    }
    Ok(claimed)
}

/// Sweep variant used by the background reconciliation loop: claims every
/// orphan commit whose author email matches any registered email identifier.
pub async fn claim_all_orphans<S: Store>(store: &S) -> anyhow::Result<usize> {
    let mut tx = store.begin().await?;
    let claimable = tx.find_claimable_orphans().await?;
    tx.commit().await?;

    let mut claimed = 0;
    for (commit, user_id) in claimable {
        if claim_one(store, commit, user_id).await? {
            claimed += 1;
        }
    }
    Ok(claimed)
}

async fn claim_one<S: Store>(store: &S, commit: Commit, user_id: Uuid) -> anyhow::Result<bool> {
    let mut tx = store.begin().await?;
    if !tx.attribute_commit(commit.id, user_id).await? {
        // Already claimed by an earlier run or a concurrent task.
        return Ok(false);
    }
    let commit = Commit {
        user_id: Some(user_id),
        ..commit
    };
    scoring::add_commit(&mut tx, &commit, true).await?;
    tx.commit().await?;
    Ok(true)
}
