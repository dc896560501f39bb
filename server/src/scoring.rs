use tracing::instrument;
use uuid::Uuid;

use crate::db::types::{
    Board, Commit, Game, LanguageBoard, Player, PlayerBoard, AI_ANALYSIS_COMPLETE,
    AI_ANALYSIS_PENDING,
};
use crate::store::{Store, StoreTx};

/// Scores one commit into the aggregates of its game.
///
/// Runs inside the caller's transaction: every Board / LanguageBoard / Player /
/// PlayerBoard change for this commit lands atomically or not at all. Aggregate
/// rows are read with row locks, so two deliveries touching the same project or
/// user serialize while unrelated aggregates proceed in parallel.
///
/// `from_orphan` marks the re-run performed when an orphan commit is claimed:
/// the project and language aggregates were already credited at ingestion and
/// are left untouched, only the player association is new.
///
/// Returns the resolved game, or `None` when the commit falls outside every
/// active game window; such commits stay persisted with a null `game_id` and
/// are never retried.
#[instrument(skip(tx, commit), fields(hash = %commit.hash))]
pub async fn add_commit<T: StoreTx>(
    tx: &mut T,
    commit: &Commit,
    from_orphan: bool,
) -> anyhow::Result<Option<Game>> {
    let game = match commit.game_id {
        // The claim path keeps the game the commit was originally scored
        // into, even if that game has since been deactivated.
        Some(game_id) => tx.find_game_by_id(game_id).await?,
        None => tx.find_active_game_at(commit.committed_at).await?,
    };
    let Some(game) = game else {
        tracing::info!("no active game window, commit persists unscored");
        return Ok(None);
    };
    if commit.game_id.is_none() {
        tx.set_commit_game(commit.id, game.id).await?;
    }

    let mut board_created = false;
    let mut board = match tx.lock_board(game.id, commit.project_id).await? {
        None => {
            let board = Board {
                id: Uuid::new_v4(),
                game_id: game.id,
                project_id: commit.project_id,
                points: game.project_points + game.commit_points,
                potential_points: game.project_points + game.commit_points,
                verified_points: 0,
                commit_count: 1,
                contributor_count: 1,
            };
            tx.insert_board(&board).await?;
            board_created = true;
            board
        }
        Some(mut board) => {
            if !from_orphan {
                board.points += game.commit_points;
                board.potential_points += game.commit_points;
                board.commit_count += 1;
                tx.update_board(&board).await?;
            }
            board
        }
    };

    if !from_orphan {
        for name in &commit.languages {
            if name.is_empty() {
                continue;
            }
            let language = tx.get_or_create_language(name).await?;
            match tx.lock_language_board(game.id, language.id).await? {
                None => {
                    tx.insert_language_board(&LanguageBoard {
                        id: Uuid::new_v4(),
                        game_id: game.id,
                        language_id: language.id,
                        points: game.commit_points,
                        commit_count: 1,
                    })
                    .await?;
                }
                Some(mut language_board) => {
                    language_board.points += game.commit_points;
                    language_board.commit_count += 1;
                    tx.update_language_board(&language_board).await?;
                }
            }
        }
    }

    let Some(user_id) = commit.user_id else {
        return Ok(Some(game));
    };

    match tx.lock_player(game.id, user_id).await? {
        None => {
            // Two first-commits for the same new player racing here trip the
            // (game_id, user_id) unique key; the losing delivery rolls back
            // and is safe to retry.
            let player = Player {
                id: Uuid::new_v4(),
                game_id: game.id,
                user_id,
                points: game.project_points + game.commit_points,
                potential_points: game.project_points + game.commit_points,
                verified_points: 0,
                commit_count: 1,
                project_count: 1,
                ai_analysis_status: AI_ANALYSIS_PENDING.to_string(),
            };
            tx.insert_player(&player).await?;
            tx.insert_player_board(&PlayerBoard {
                id: Uuid::new_v4(),
                player_id: player.id,
                board_id: board.id,
                commit_count: 1,
            })
            .await?;
            // On the claim path the board's seed already counted this
            // author; bumping again would show one human as two.
            if !board_created && !from_orphan {
                board.contributor_count += 1;
                tx.update_board(&board).await?;
            }
        }
        Some(mut player) => {
            match tx.find_player_board(player.id, board.id).await? {
                None => {
                    tx.insert_player_board(&PlayerBoard {
                        id: Uuid::new_v4(),
                        player_id: player.id,
                        board_id: board.id,
                        commit_count: 1,
                    })
                    .await?;
                    player.project_count += 1;
                    if !board_created && !from_orphan {
                        board.contributor_count += 1;
                        tx.update_board(&board).await?;
                    }
                }
                Some(mut player_board) => {
                    player_board.commit_count += 1;
                    tx.update_player_board(&player_board).await?;
                }
            }

            // Authoritative recount from live commit rows rather than an
            // incremental add; correct under concurrent and out-of-order
            // application while the row lock is held.
            let commit_count = tx.count_user_commits_in_game(game.id, user_id).await? as i32;
            player.commit_count = commit_count;
            player.points =
                player.project_count * game.project_points + commit_count * game.commit_points;
            player.potential_points = player.points;
            tx.update_player(&player).await?;
        }
    }

    Ok(Some(game))
}

/// Overlays the AI-analysis verdict on a player's score.
///
/// Replaces rather than compounds: `verified_points` is always recomputed from
/// `potential_points`, so re-running with a new adjustment is idempotent.
pub async fn apply_ai_analysis_adjustment<S: Store>(
    store: &S,
    player_id: Uuid,
    points_adjustment: i32,
) -> anyhow::Result<()> {
    let mut tx = store.begin().await?;
    let Some(mut player) = tx.lock_player_by_id(player_id).await? else {
        anyhow::bail!("unknown player {player_id}");
    };
    player.verified_points = player.potential_points + points_adjustment;
    player.ai_analysis_status = AI_ANALYSIS_COMPLETE.to_string();
    tx.update_player(&player).await?;
    tx.commit().await?;
    Ok(())
}

/// Excludes a user from rankings without touching historical aggregates.
pub async fn deactivate_user<S: Store>(store: &S, user_id: Uuid) -> anyhow::Result<()> {
    let mut tx = store.begin().await?;
    tx.set_user_active(user_id, false).await?;
    tx.commit().await?;
    Ok(())
}

/// Excludes a project from rankings without touching historical aggregates.
pub async fn deactivate_project<S: Store>(store: &S, project_id: Uuid) -> anyhow::Result<()> {
    let mut tx = store.begin().await?;
    tx.set_project_active(project_id, false).await?;
    tx.commit().await?;
    Ok(())
}
