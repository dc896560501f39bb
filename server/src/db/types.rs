use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::FileChange;
use sqlx::types::Json;
use uuid::Uuid;

/// A bounded competition period. `start_at < end_at` is enforced both at
/// construction and by a table constraint.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Game {
    pub id: Uuid,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub commit_points: i32,
    pub project_points: i32,
    pub is_active: bool,
}

impl Game {
    /// Half-open containment: `start_at <= at < end_at`.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start_at <= at && at < self.end_at
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub service: String,
    pub url: String,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub repo_id: Option<i64>,
    pub owner: Option<String>,
    pub forks: Option<i64>,
    pub watchers: Option<i64>,
    pub is_active: bool,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub avatar_url: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct UserIdentifier {
    pub id: Uuid,
    pub user_id: Uuid,
    pub identifier_type: String,
    pub value: String,
}

/// One ingested commit. `user_id` stays null for orphans; `game_id` stays
/// null when the commit fell outside every game window.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Commit {
    pub id: Uuid,
    pub hash: String,
    pub project_id: Uuid,
    pub user_id: Option<Uuid>,
    pub game_id: Option<Uuid>,
    pub author_name: String,
    pub author_email: String,
    pub author_username: Option<String>,
    pub message: String,
    pub committed_at: DateTime<Utc>,
    pub url: String,
    pub languages: Vec<String>,
    pub files: Json<Vec<FileChange>>,
}

/// Per-(game, user) running aggregate, created on the user's first scored
/// commit in the game.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Player {
    pub id: Uuid,
    pub game_id: Uuid,
    pub user_id: Uuid,
    pub points: i32,
    pub potential_points: i32,
    pub verified_points: i32,
    pub commit_count: i32,
    pub project_count: i32,
    pub ai_analysis_status: String,
}

pub const AI_ANALYSIS_PENDING: &str = "pending";
pub const AI_ANALYSIS_COMPLETE: &str = "complete";

/// Per-(game, project) aggregate.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Board {
    pub id: Uuid,
    pub game_id: Uuid,
    pub project_id: Uuid,
    pub points: i32,
    pub potential_points: i32,
    pub verified_points: i32,
    pub commit_count: i32,
    pub contributor_count: i32,
}

/// Join aggregate: how many commits one player has on one board. Its absence
/// is what marks "first commit to this project".
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct PlayerBoard {
    pub id: Uuid,
    pub player_id: Uuid,
    pub board_id: Uuid,
    pub commit_count: i32,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Language {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct LanguageBoard {
    pub id: Uuid,
    pub game_id: Uuid,
    pub language_id: Uuid,
    pub points: i32,
    pub commit_count: i32,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct PlayerStanding {
    pub user_id: Uuid,
    pub name: String,
    pub points: i32,
    pub potential_points: i32,
    pub verified_points: i32,
    pub commit_count: i32,
    pub project_count: i32,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct BoardStanding {
    pub project_id: Uuid,
    pub name: String,
    pub slug: String,
    pub points: i32,
    pub potential_points: i32,
    pub verified_points: i32,
    pub commit_count: i32,
    pub contributor_count: i32,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct LanguageStanding {
    pub name: String,
    pub points: i32,
    pub commit_count: i32,
}
