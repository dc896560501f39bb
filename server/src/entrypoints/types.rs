use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use commit_games_server::db::types::{BoardStanding, LanguageStanding, PlayerStanding};
use commit_games_server::ingest::IngestOutcome;

/// The minimal JSON webhook callers see; internal failures never leak detail
/// past this shape.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub provider: String,
    pub project: String,
    pub commits: Vec<String>,
}

impl From<IngestOutcome> for WebhookAck {
    fn from(outcome: IngestOutcome) -> Self {
        Self {
            provider: outcome.service.to_string(),
            project: outcome.slug,
            commits: outcome.created,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PlayerEntry {
    pub rank: u32,
    pub name: String,
    pub points: i32,
    pub potential_points: i32,
    pub verified_points: i32,
    pub commit_count: i32,
    pub project_count: i32,
}

impl PlayerEntry {
    pub fn new(rank: usize, standing: PlayerStanding) -> Self {
        Self {
            rank: rank as u32,
            name: standing.name,
            points: standing.points,
            potential_points: standing.potential_points,
            verified_points: standing.verified_points,
            commit_count: standing.commit_count,
            project_count: standing.project_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProjectEntry {
    pub rank: u32,
    pub name: String,
    pub slug: String,
    pub points: i32,
    pub potential_points: i32,
    pub verified_points: i32,
    pub commit_count: i32,
    pub contributor_count: i32,
}

impl ProjectEntry {
    pub fn new(rank: usize, standing: BoardStanding) -> Self {
        Self {
            rank: rank as u32,
            name: standing.name,
            slug: standing.slug,
            points: standing.points,
            potential_points: standing.potential_points,
            verified_points: standing.verified_points,
            commit_count: standing.commit_count,
            contributor_count: standing.contributor_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LanguageEntry {
    pub rank: u32,
    pub name: String,
    pub points: i32,
    pub commit_count: i32,
}

impl LanguageEntry {
    pub fn new(rank: usize, standing: LanguageStanding) -> Self {
        Self {
            rank: rank as u32,
            name: standing.name,
            points: standing.points,
            commit_count: standing.commit_count,
        }
    }
}
