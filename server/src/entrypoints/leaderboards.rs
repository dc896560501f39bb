use chrono::Utc;
use rocket::serde::json::Json;
use rocket::State;
use uuid::Uuid;

use commit_games_server::db::types::Game;
use commit_games_server::db::DB;
use commit_games_server::games;
use commit_games_server::store::Store;

use super::types::{LanguageEntry, PlayerEntry, ProjectEntry};

const DEFAULT_LIMIT: i64 = 50;

/// A requested game id, or the default: the open active game, falling back to
/// the most recently ended one.
async fn resolve_game(db: &State<DB>, game: Option<Uuid>) -> Option<Game> {
    let resolved = match game {
        Some(game_id) => db.find_game(game_id).await,
        None => games::active_or_latest(db.inner(), Utc::now()).await,
    };
    match resolved {
        Ok(game) => game,
        Err(e) => {
            tracing::error!("failed to resolve game: {e:#}");
            None
        }
    }
}

#[utoipa::path(context_path = "/leaderboard", responses(
    (status = 200, description = "Ranked players for a game", body = [PlayerEntry])
))]
#[get("/players?<game>&<limit>")]
async fn get_players(
    db: &State<DB>,
    game: Option<Uuid>,
    limit: Option<i64>,
) -> Option<Json<Vec<PlayerEntry>>> {
    let game = resolve_game(db, game).await?;
    match db
        .player_leaderboard(game.id, limit.unwrap_or(DEFAULT_LIMIT))
        .await
    {
        Ok(records) => Some(Json(
            records
                .into_iter()
                .enumerate()
                .map(|(idx, standing)| PlayerEntry::new(idx + 1, standing))
                .collect(),
        )),
        Err(e) => {
            tracing::error!("failed to get player leaderboard: {e:#}");
            None
        }
    }
}

#[utoipa::path(context_path = "/leaderboard", responses(
    (status = 200, description = "Ranked projects for a game", body = [ProjectEntry])
))]
#[get("/projects?<game>&<limit>")]
async fn get_projects(
    db: &State<DB>,
    game: Option<Uuid>,
    limit: Option<i64>,
) -> Option<Json<Vec<ProjectEntry>>> {
    let game = resolve_game(db, game).await?;
    match db
        .project_leaderboard(game.id, limit.unwrap_or(DEFAULT_LIMIT))
        .await
    {
        Ok(records) => Some(Json(
            records
                .into_iter()
                .enumerate()
                .map(|(idx, standing)| ProjectEntry::new(idx + 1, standing))
                .collect(),
        )),
        Err(e) => {
            tracing::error!("failed to get project leaderboard: {e:#}");
            None
        }
    }
}

#[utoipa::path(context_path = "/leaderboard", responses(
    (status = 200, description = "Ranked languages for a game", body = [LanguageEntry])
))]
#[get("/languages?<game>&<limit>")]
async fn get_languages(
    db: &State<DB>,
    game: Option<Uuid>,
    limit: Option<i64>,
) -> Option<Json<Vec<LanguageEntry>>> {
    let game = resolve_game(db, game).await?;
    match db
        .language_leaderboard(game.id, limit.unwrap_or(DEFAULT_LIMIT))
        .await
    {
        Ok(records) => Some(Json(
            records
                .into_iter()
                .enumerate()
                .map(|(idx, standing)| LanguageEntry::new(idx + 1, standing))
                .collect(),
        )),
        Err(e) => {
            tracing::error!("failed to get language leaderboard: {e:#}");
            None
        }
    }
}

#[utoipa::path(context_path = "/games", responses(
    (status = 200, description = "The game leaderboards default to")
))]
#[get("/current")]
async fn current_game(db: &State<DB>) -> Option<Json<Game>> {
    resolve_game(db, None).await.map(Json)
}

pub fn stage() -> rocket::fairing::AdHoc {
    rocket::fairing::AdHoc::on_ignite("Installing leaderboard entrypoints", |rocket| async {
        rocket
            .mount(
                "/leaderboard",
                rocket::routes![get_players, get_projects, get_languages],
            )
            .mount("/games", rocket::routes![current_game])
    })
}
