use anyhow::ensure;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::types::Game;
use crate::store::{Store, StoreTx};

/// Builds a game record, rejecting an empty or inverted window.
pub fn new_game(
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    commit_points: i32,
    project_points: i32,
) -> anyhow::Result<Game> {
    ensure!(start_at < end_at, "game start {start_at} must precede end {end_at}");
    Ok(Game {
        id: Uuid::new_v4(),
        start_at,
        end_at,
        commit_points,
        project_points,
        is_active: true,
    })
}

/// Persists a new game; with `deactivate_others` the new game becomes the only
/// active one, done in the same transaction.
pub async fn create_game<S: Store>(
    store: &S,
    game: Game,
    deactivate_others: bool,
) -> anyhow::Result<Game> {
    let mut tx = store.begin().await?;
    tx.insert_game(&game).await?;
    if deactivate_others {
        tx.deactivate_games_except(game.id).await?;
    }
    tx.commit().await?;
    Ok(game)
}

/// The game to show by default: an open active window if one exists, else the
/// most recently ended game. Scoring never uses the fallback.
pub async fn active_or_latest<S: Store>(
    store: &S,
    at: DateTime<Utc>,
) -> anyhow::Result<Option<Game>> {
    if let Some(game) = store.active_game(at).await? {
        return Ok(Some(game));
    }
    store.latest_ended_game(at).await
}
